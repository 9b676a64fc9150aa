use isotp::address::{Address, AddressingMode};
use isotp::client::UdsClient;
use isotp::driver::{CanDriver, CanMessage};
use isotp::time::{Instant, TimerDriver};
use socketcan::{CanFrame, CanSocket, EmbeddedFrame, Socket};

#[derive(Clone)]
pub struct StdTimer(std::time::Instant);

impl StdTimer {
    pub fn new() -> Self {
        Self(std::time::Instant::now())
    }
}

impl TimerDriver for StdTimer {
    fn now(&self) -> Instant {
        Instant(self.0.elapsed().as_millis() as u64)
    }
}

/// Classic CAN adapter over a (v)can interface
pub struct SocketDriver(CanSocket);

impl CanDriver for SocketDriver {
    fn receive(&mut self) -> Option<CanMessage> {
        match self.0.read_frame() {
            Ok(frame) => Some(CanMessage::new(frame.id(), frame.data(), false)),
            Err(_) => {
                // nothing pending, pace the polling loop
                std::thread::sleep(std::time::Duration::from_millis(1));
                None
            }
        }
    }

    fn transmit(&mut self, frame: &CanMessage) -> bool {
        let Some(frame) = CanFrame::new(frame.id, &frame.data) else {
            return false;
        };
        self.0.write_frame(&frame).is_ok()
    }
}

fn main() {
    let socket = CanSocket::open("vcan0").expect("Could not open socketcan interface");
    socket.set_nonblocking(true).unwrap();

    let address = Address::new(AddressingMode::Normal11Bit, 0x7E0, 0x7E8).unwrap();
    let mut client = UdsClient::new(SocketDriver(socket), address, StdTimer::new());

    // ReadDataByIdentifier, VIN
    match client.send_and_receive(&[0x22, 0xF1, 0x90], 1000) {
        Ok(response) => {
            print!("response:");
            for byte in &response {
                print!(" {byte:02X}");
            }
            println!();
        }
        Err(error) => println!("request failed: {error}"),
    }
}
