//! Link transport: bounded-wait framed senders and receivers.

pub mod link;

pub use link::{FrameReceiver, FrameSender, Recv};
