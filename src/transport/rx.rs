use super::{RxState, Transport};
use crate::driver::CanMessage;
use crate::events::TransportEvent;
use crate::frame::{parse_frame, FlowStatus, Frame, FramePayload};
use crate::time::TimerDriver;
use core::mem;

impl<Time: TimerDriver> Transport<Time> {
    /// Feeds one raw frame into the receive state machine
    ///
    /// Frames not addressed to this conversation are ignored, malformed
    /// frames are dropped with a diagnostic event and no state change.
    pub fn process_rx(&mut self, msg: &CanMessage) {
        if !self.address.is_for_me(msg) {
            return;
        }
        self.expire_rx_timer();

        let frame = match parse_frame(&msg.data, self.address.rx_prefix_size()) {
            Ok(frame) => frame,
            Err(error) => {
                self.emit(TransportEvent::FrameDropped(error));
                return;
            }
        };

        match frame {
            Frame::FlowControl(fc) => {
                // flow control never changes the receive state, it is
                // acted on by the transmit side through the mailbox
                if self.rx_state == RxState::WaitCf
                    && matches!(fc.status, FlowStatus::Wait | FlowStatus::ContinueToSend)
                {
                    // the peer is alive, keep listening
                    self.timer_rx_cf.start(self.time.now());
                }
                self.last_flow_control = Some(fc);
            }
            Frame::Single { data } => self.handle_rx_single_frame(&data),
            Frame::First { total_size, data } => self.handle_rx_first_frame(total_size, &data),
            Frame::Consecutive {
                sequence_number,
                data,
            } => self.handle_rx_consecutive_frame(sequence_number, &data),
        }
    }

    /// Aborts a reassembly whose consecutive frame timeout elapsed
    ///
    /// Sampled from both poll phases so a silent bus still resets the
    /// receive state.
    pub(super) fn expire_rx_timer(&mut self) {
        if self.rx_state == RxState::WaitCf && self.timer_rx_cf.is_expired(self.time.now()) {
            self.emit(TransportEvent::ConsecutiveFrameTimeout);
            self.stop_receiving();
        }
    }

    fn handle_rx_single_frame(&mut self, data: &FramePayload) {
        if self.rx_state != RxState::Idle {
            self.emit(TransportEvent::ReassemblyInterrupted);
        }
        self.stop_receiving();
        self.emit(TransportEvent::ReceiveCompleted { len: data.len() });
        self.rx_queue.push(data.to_vec());
    }

    fn handle_rx_first_frame(&mut self, total_size: u32, data: &FramePayload) {
        if self.rx_state != RxState::Idle {
            self.emit(TransportEvent::ReassemblyInterrupted);
        }
        self.stop_receiving();

        self.rx_frame_len = total_size;
        let take = (total_size as usize).min(data.len());
        self.rx_buffer.extend_from_slice(&data[..take]);

        if self.rx_buffer.len() >= total_size as usize {
            // defensive, a first frame normally always announces more
            // data than it carries
            self.complete_reception();
        } else {
            self.rx_state = RxState::WaitCf;
            self.rx_seq_num = 1;
            // ask the transmit side for a continue to send grant, the
            // CF timer is armed once that grant actually left
            self.pending_flow_control_tx = true;
        }
    }

    fn handle_rx_consecutive_frame(&mut self, sequence_number: u8, data: &FramePayload) {
        if self.rx_state != RxState::WaitCf {
            self.emit(TransportEvent::UnexpectedConsecutiveFrame);
            self.stop_receiving();
            return;
        }
        if sequence_number != self.rx_seq_num {
            self.emit(TransportEvent::SequenceMismatch {
                expected: self.rx_seq_num,
                received: sequence_number,
            });
            self.stop_receiving();
            return;
        }

        self.timer_rx_cf.start(self.time.now());
        self.rx_seq_num = (self.rx_seq_num + 1) % 16;

        // trailing padding must not end up in the message
        let missing = self.rx_frame_len as usize - self.rx_buffer.len();
        let take = missing.min(data.len());
        self.rx_buffer.extend_from_slice(&data[..take]);

        if self.rx_buffer.len() >= self.rx_frame_len as usize {
            self.complete_reception();
        } else {
            self.rx_block_counter += 1;
            if self.config.block_size > 0 && self.rx_block_counter >= self.config.block_size as u32
            {
                self.rx_block_counter = 0;
                self.pending_flow_control_tx = true;
                // paused until the grant has been transmitted, otherwise
                // a pending grant could time the peer out
                self.timer_rx_cf.stop();
            }
        }
    }

    fn complete_reception(&mut self) {
        let message = mem::take(&mut self.rx_buffer);
        self.emit(TransportEvent::ReceiveCompleted { len: message.len() });
        self.rx_queue.push(message);
        self.stop_receiving();
    }
}
