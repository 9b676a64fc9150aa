//! Shared fakes for the unit tests

pub mod testtime {
    use crate::time::{Instant, TimerDriver};
    use alloc::rc::Rc;
    use core::cell::Cell;

    /// Manually advanced clock, clones share the same time source
    #[derive(Clone)]
    pub struct TestTimer {
        now_ms: Rc<Cell<u64>>,
    }

    impl TestTimer {
        pub fn new() -> Self {
            Self {
                now_ms: Rc::new(Cell::new(0)),
            }
        }
        pub fn set_time(&mut self, ms: u64) {
            self.now_ms.set(ms);
        }
        pub fn advance(&mut self, ms: u64) {
            self.now_ms.set(self.now_ms.get() + ms);
        }
    }

    impl TimerDriver for TestTimer {
        fn now(&self) -> Instant {
            Instant(self.now_ms.get())
        }
    }
}

pub mod can_driver {
    use crate::driver::{CanDriver, CanMessage};
    use alloc::collections::VecDeque;
    use alloc::rc::Rc;
    use core::cell::RefCell;

    /// In memory bus endpoint, clones share both directions
    #[derive(Clone)]
    pub struct TestDriver {
        rx: Rc<RefCell<VecDeque<CanMessage>>>,
        tx: Rc<RefCell<VecDeque<CanMessage>>>,
    }

    impl TestDriver {
        pub fn new() -> Self {
            Self {
                rx: Rc::new(RefCell::new(VecDeque::new())),
                tx: Rc::new(RefCell::new(VecDeque::new())),
            }
        }
        /// Queues a frame the stack will see on its next receive poll
        pub fn push_can_frame(&mut self, msg: CanMessage) {
            self.rx.borrow_mut().push_back(msg);
        }
        /// Pops the next frame the stack transmitted
        pub fn get_can_frame(&mut self) -> Option<CanMessage> {
            self.tx.borrow_mut().pop_front()
        }
    }

    impl CanDriver for TestDriver {
        fn receive(&mut self) -> Option<CanMessage> {
            self.rx.borrow_mut().pop_front()
        }
        fn transmit(&mut self, frame: &CanMessage) -> bool {
            self.tx.borrow_mut().push_back(frame.clone());
            true
        }
    }
}

pub mod events {
    use crate::events::{EventSink, TransportEvent};
    use alloc::rc::Rc;
    use alloc::vec::Vec;
    use core::cell::RefCell;

    /// Records every emitted event, clones share the same log
    #[derive(Clone)]
    pub struct CollectSink {
        log: Rc<RefCell<Vec<TransportEvent>>>,
    }

    impl CollectSink {
        pub fn new() -> Self {
            Self {
                log: Rc::new(RefCell::new(Vec::new())),
            }
        }
        pub fn events(&self) -> Vec<TransportEvent> {
            self.log.borrow().clone()
        }
    }

    impl EventSink for CollectSink {
        fn on_event(&mut self, event: TransportEvent) {
            self.log.borrow_mut().push(event);
        }
    }
}

pub mod frame {
    use crate::driver::CanMessage;
    use embedded_can::{Id, StandardId};

    /// Classic CAN frame with an 11 bit id
    pub fn can_msg(id: u16, data: &[u8]) -> CanMessage {
        CanMessage::new(Id::Standard(StandardId::new(id).unwrap()), data, false)
    }

    /// CAN FD frame with an 11 bit id
    pub fn fd_msg(id: u16, data: &[u8]) -> CanMessage {
        CanMessage::new(Id::Standard(StandardId::new(id).unwrap()), data, true)
    }
}
