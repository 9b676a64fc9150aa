use crate::address::Address;
use crate::driver::CanDriver;
use crate::time::TimerDriver;
use crate::transport::{Transport, TransportConfig};
use alloc::vec::Vec;

/// Service id of a UDS negative response
pub const NEGATIVE_RESPONSE_SID: u8 = 0x7F;
/// Negative response code "request correctly received, response pending"
pub const NRC_RESPONSE_PENDING: u8 = 0x78;

/// Extra time granted after a response pending negative response
const RESPONSE_PENDING_EXTENSION_MS: u64 = 5000;

/// The request failed on the client side
///
/// Negative responses other than response pending are returned as data,
/// interpreting them is up to the application.
#[derive(Debug, PartialEq, Eq, Clone, Copy, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClientError {
    /// No response arrived within the deadline
    #[error("no response within the deadline")]
    Timeout,
}

/// A UDS (ISO 14229) diagnostic client on top of one [Transport]
///
/// The client owns the CAN driver and pumps the transport itself while
/// waiting for a response. [UdsClient::send_and_receive] busy polls, a
/// [CanDriver] used with this client may pace the loop by sleeping
/// briefly in its receive path when no frame is pending.
pub struct UdsClient<Driver: CanDriver, Time: TimerDriver> {
    transport: Transport<Time>,
    driver: Driver,
    time: Time,
}

impl<Driver: CanDriver, Time: TimerDriver + Clone> UdsClient<Driver, Time> {
    /// Creates a client with the default transport policy
    pub fn new(driver: Driver, address: Address, time: Time) -> Self {
        Self::with_config(driver, address, TransportConfig::default(), time)
    }

    /// Creates a client with an explicit transport policy
    pub fn with_config(
        driver: Driver,
        address: Address,
        config: TransportConfig,
        time: Time,
    ) -> Self {
        Self {
            transport: Transport::with_config(address, config, time.clone()),
            driver,
            time,
        }
    }

    /// Switches the underlying transport between classic CAN and CAN FD
    pub fn set_fd_mode(&mut self, fd: bool) {
        self.transport.set_fd_mode(fd);
    }

    /// Access to the owned transport, for configuration and diagnostics
    pub fn transport(&mut self) -> &mut Transport<Time> {
        &mut self.transport
    }

    /// One pump step moving frames between the driver and the transport
    pub fn process(&mut self) {
        self.transport.process(&mut self.driver);
    }

    /// Sends one request and waits for the correlated response
    ///
    /// Stale responses still queued from earlier exchanges are dropped
    /// before the request is sent. A "response pending" negative
    /// response (0x7F, echoed service id, 0x78) extends the deadline by
    /// 5 seconds; any other response, positive or negative, is final
    /// and returned as received.
    pub fn send_and_receive(
        &mut self,
        request: &[u8],
        timeout_ms: u64,
    ) -> Result<Vec<u8>, ClientError> {
        while self.transport.receive().is_some() {}

        self.transport.send(request);
        let mut deadline = self.time.now().ms() + timeout_ms;

        loop {
            self.process();
            if let Some(response) = self.transport.receive() {
                if is_response_pending(&response, request) {
                    deadline = self.time.now().ms() + RESPONSE_PENDING_EXTENSION_MS;
                    continue;
                }
                return Ok(response);
            }
            if self.time.now().ms() > deadline {
                return Err(ClientError::Timeout);
            }
        }
    }
}

/// True for the negative response asking the client to keep waiting
fn is_response_pending(response: &[u8], request: &[u8]) -> bool {
    response.len() >= 3
        && response[0] == NEGATIVE_RESPONSE_SID
        && Some(&response[1]) == request.first()
        && response[2] == NRC_RESPONSE_PENDING
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AddressingMode;
    use crate::driver::CanMessage;
    use crate::test_utils::frame::can_msg;
    use crate::test_utils::testtime::TestTimer;
    use alloc::vec::Vec;

    /// Scripted peer: advances the shared clock on every poll and
    /// releases prepared responses a configurable delay after it saw
    /// the request frame
    struct EcuSim {
        time: TestTimer,
        responses: Vec<(u64, CanMessage)>,
        pending: Vec<(u64, CanMessage)>,
    }

    impl EcuSim {
        fn new(time: TestTimer) -> Self {
            Self {
                time,
                responses: Vec::new(),
                pending: Vec::new(),
            }
        }
        fn respond_after(&mut self, delay_ms: u64, data: &[u8]) {
            self.responses.push((delay_ms, can_msg(0x702, data)));
        }
    }

    impl CanDriver for EcuSim {
        fn receive(&mut self) -> Option<CanMessage> {
            self.time.advance(1);
            let now = self.time.now().ms();
            let due = self.pending.iter().position(|(at, _)| *at <= now)?;
            Some(self.pending.remove(due).1)
        }
        fn transmit(&mut self, _frame: &CanMessage) -> bool {
            let now = self.time.now().ms();
            for (delay, msg) in self.responses.drain(..) {
                self.pending.push((now + delay, msg));
            }
            true
        }
    }

    fn client(sim: EcuSim, time: TestTimer) -> UdsClient<EcuSim, TestTimer> {
        let address = Address::new(AddressingMode::Normal11Bit, 0x701, 0x702).unwrap();
        UdsClient::new(sim, address, time)
    }

    #[test]
    fn request_and_response() {
        let time = TestTimer::new();
        let mut sim = EcuSim::new(time.clone());
        sim.respond_after(5, &[0x04, 0x62, 0xF0, 0xFA, 0x01]);
        let mut client = client(sim, time);

        let response = client.send_and_receive(&[0x22, 0xF0, 0xFA], 1000);
        assert_eq!(response, Ok(vec![0x62, 0xF0, 0xFA, 0x01]));
    }

    #[test]
    fn negative_response_is_returned_as_data() {
        let time = TestTimer::new();
        let mut sim = EcuSim::new(time.clone());
        sim.respond_after(5, &[0x03, 0x7F, 0x22, 0x31]);
        let mut client = client(sim, time);

        let response = client.send_and_receive(&[0x22, 0xF0, 0xFA], 1000);
        assert_eq!(response, Ok(vec![0x7F, 0x22, 0x31]));
    }

    #[test]
    fn missing_response_times_out() {
        let time = TestTimer::new();
        let sim = EcuSim::new(time.clone());
        let mut client = client(sim, time.clone());

        let response = client.send_and_receive(&[0x10, 0x03], 50);
        assert_eq!(response, Err(ClientError::Timeout));
        assert!(time.now().ms() > 50);
    }

    #[test]
    fn response_pending_extends_the_deadline() {
        let time = TestTimer::new();
        let mut sim = EcuSim::new(time.clone());
        sim.respond_after(5, &[0x03, 0x7F, 0x31, 0x78]);
        // final response far beyond the original deadline but within
        // the 5 second extension
        sim.respond_after(2000, &[0x05, 0x71, 0x01, 0x02, 0x03, 0x00]);
        let mut client = client(sim, time);

        let response = client.send_and_receive(&[0x31, 0x01, 0x02, 0x03], 100);
        assert_eq!(response, Ok(vec![0x71, 0x01, 0x02, 0x03, 0x00]));
    }

    #[test]
    fn stale_responses_are_drained() {
        let time = TestTimer::new();
        let mut sim = EcuSim::new(time.clone());
        sim.respond_after(5, &[0x02, 0x50, 0x03]);
        let mut client = client(sim, time);

        // a stale message from an earlier exchange sits in the queue
        client.transport().process_rx(&can_msg(0x702, &[0x02, 0x50, 0x01]));
        let response = client.send_and_receive(&[0x10, 0x03], 1000);
        assert_eq!(response, Ok(vec![0x50, 0x03]));
    }
}
