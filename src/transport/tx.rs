use super::{RxState, Transport, TxState};
use crate::address::TargetType;
use crate::driver::CanMessage;
use crate::events::TransportEvent;
use crate::frame::{
    consecutive_frame_payload, first_frame_payload, flow_control_payload, single_frame_payload,
    FlowControl, FlowStatus, MAX_12BIT_LENGTH,
};
use crate::time::TimerDriver;
use alloc::vec::Vec;

impl<Time: TimerDriver> Transport<Time> {
    /// One transmit decision, returns the frame to hand to the adapter
    ///
    /// Flow control sends requested by the receive side always preempt
    /// the transmit state logic, they are time critical for the peer.
    pub fn process_tx(&mut self) -> Option<CanMessage> {
        self.expire_rx_timer();

        if self.pending_flow_control_tx {
            self.pending_flow_control_tx = false;
            let payload = flow_control_payload(
                FlowStatus::ContinueToSend,
                self.config.block_size,
                self.config.st_min_ms,
            );
            if self.rx_state == RxState::WaitCf {
                // the CF timeout starts counting now, not when the
                // grant was requested
                self.timer_rx_cf.start(self.time.now());
            }
            return Some(self.make_tx_msg(&payload, TargetType::Physical));
        }

        if let Some(fc) = self.last_flow_control.take() {
            self.handle_tx_flow_control(&fc);
        }

        if self.timer_rx_fc.is_expired(self.time.now()) {
            self.emit(TransportEvent::FlowControlTimeout);
            self.stop_sending();
        }

        match self.tx_state {
            TxState::Idle => self.handle_tx_idle(),
            // waiting on the peer, nothing to do
            TxState::WaitFc => None,
            TxState::Transmit => self.handle_tx_transmit(),
        }
    }

    fn handle_tx_flow_control(&mut self, fc: &FlowControl) {
        if self.tx_state == TxState::Idle {
            self.emit(TransportEvent::UnexpectedFlowControl);
            return;
        }
        self.timer_rx_fc.stop();

        match fc.status {
            FlowStatus::ContinueToSend => {
                self.wft_counter = 0;
                self.remote_block_size = fc.block_size;
                self.timer_tx_st_min.set_timeout((fc.st_min_us / 1000) as u64);
                self.tx_state = TxState::Transmit;
                self.tx_block_counter = 0;
                // left stopped so the first frame of the block is
                // eligible on the very next poll, pacing starts with it
                self.timer_tx_st_min.stop();
            }
            FlowStatus::Wait => {
                self.wft_counter += 1;
                if self.config.wft_max > 0 && self.wft_counter > self.config.wft_max as u32 {
                    self.emit(TransportEvent::WaitLimitExceeded {
                        limit: self.config.wft_max,
                    });
                    self.stop_sending();
                } else {
                    self.timer_rx_fc.start(self.time.now());
                }
            }
            FlowStatus::Overflow => {
                self.emit(TransportEvent::RemoteOverflow);
                self.stop_sending();
            }
        }
    }

    fn handle_tx_idle(&mut self) -> Option<CanMessage> {
        let payload = self.tx_queue.pop()?;
        self.tx_frame_len = payload.len();
        let capacity = self.capacity();

        let sf_pci_size = if payload.len() > 7 { 2 } else { 1 };
        if payload.len() + sf_pci_size <= capacity {
            let data = single_frame_payload(&payload, capacity).ok()?;
            self.emit(TransportEvent::SendCompleted {
                len: payload.len(),
            });
            return Some(self.make_tx_msg(&data, TargetType::Physical));
        }

        // segmented send, the first frame carries as much as fits
        let ff_pci_size = if payload.len() > MAX_12BIT_LENGTH as usize {
            6
        } else {
            2
        };
        let chunk_size = capacity - ff_pci_size;
        self.tx_buffer.extend_from_slice(&payload[chunk_size..]);
        let data = first_frame_payload(&payload[..chunk_size], payload.len() as u32, capacity).ok()?;

        self.tx_seq_num = 1;
        self.tx_state = TxState::WaitFc;
        self.timer_rx_fc.start(self.time.now());
        Some(self.make_tx_msg(&data, TargetType::Physical))
    }

    fn handle_tx_transmit(&mut self) -> Option<CanMessage> {
        if self.tx_buffer.is_empty() {
            // defensive, the send already completes in the poll that
            // emits the final frame
            self.stop_sending();
            return None;
        }

        let now = self.time.now();
        if self.timer_tx_st_min.is_running() && !self.timer_tx_st_min.is_expired(now) {
            return None;
        }

        let capacity = self.capacity();
        let chunk_size = (capacity - 1).min(self.tx_buffer.len());
        let chunk: Vec<u8> = self.tx_buffer.drain(..chunk_size).collect();
        let data = consecutive_frame_payload(&chunk, self.tx_seq_num, capacity).ok()?;
        self.tx_seq_num = (self.tx_seq_num + 1) % 16;
        self.timer_tx_st_min.start(now);

        let msg = self.make_tx_msg(&data, TargetType::Physical);
        if self.tx_buffer.is_empty() {
            self.emit(TransportEvent::SendCompleted {
                len: self.tx_frame_len,
            });
            self.stop_sending();
        } else {
            self.tx_block_counter += 1;
            if self.remote_block_size > 0 && self.tx_block_counter >= self.remote_block_size as u32
            {
                // block exhausted, wait for the next grant
                self.tx_state = TxState::WaitFc;
                self.timer_rx_fc.start(now);
            }
        }
        Some(msg)
    }
}
