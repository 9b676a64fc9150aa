#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

//! An ISO-TP (ISO 15765-2) transport stack
//!
//! Segments and reassembles messages of up to 4 GiB over classic CAN and
//! CAN FD, with flow control negotiation, all standard addressing modes
//! and a small UDS diagnostic client on top.
//!
//! The stack is polled and never blocks: [transport::Transport::process]
//! performs one receive and one transmit step against a [driver::CanDriver]
//! and an injected [time::TimerDriver] clock, so the crate runs unchanged
//! on an RTOS tick, a bare metal main loop or a host thread.

extern crate alloc;

/// ISO-TP addressing modes and conversation ids
pub mod address;
/// UDS diagnostic client
pub mod client;
/// CAN adapter abstraction
pub mod driver;
/// Structured transport events
pub mod events;
/// Frame level protocol codec
pub mod frame;
/// Monotonic clock abstraction and single shot timers
pub mod time;
/// The transport state machines
pub mod transport;

#[cfg(test)]
mod test_utils;
