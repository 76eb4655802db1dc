//! # ringnet
//!
//! Token-ring network simulation over async byte-stream links.
//!
//! A ring is a set of workers connected head-to-tail by unidirectional
//! links. A single token circulates; only the holder may transmit data
//! frames, each of which travels the full ring and returns to its sender
//! carrying an accept/reject status.
//!
//! ## Workers
//!
//! - **[`Node`]** (addresses 1-254): queues messages, transmits while
//!   holding the token, delivers frames addressed to it, drains its own
//!   returning frames.
//! - **[`Monitor`]** (address 0): issues and regenerates the token, drains
//!   orphaned frames, and retires an idle ring with FINISH.
//! - **[`Bridge`]**: joins two rings over a dedicated inter-bridge link,
//!   translating shutdown control between them.
//!
//! ## Example
//!
//! ```ignore
//! use ringnet::{delivery_channel, Monitor, Node, RingConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = RingConfig::new(2, 10);
//!     let (sink, mut deliveries) = delivery_channel();
//!
//!     // Wire monitor -> a -> b -> monitor with duplex links.
//!     let (m_out, a_in) = tokio::io::duplex(4096);
//!     let (a_out, b_in) = tokio::io::duplex(4096);
//!     let (b_out, m_in) = tokio::io::duplex(4096);
//!
//!     let monitor = Monitor::new(config.clone(), m_in, m_out).unwrap();
//!     let mut a = Node::new(1, config.clone(), a_in, a_out, sink.clone()).unwrap();
//!     let b = Node::new(2, config, b_in, b_out, sink).unwrap();
//!
//!     a.enqueue(2, "hello");
//!     tokio::spawn(monitor.run());
//!     tokio::spawn(a.run());
//!     tokio::spawn(b.run());
//!
//!     let record = deliveries.recv().await.unwrap();
//!     assert_eq!(&record.payload[..], b"hello");
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod monitor;
pub mod node;
pub mod protocol;
pub mod sink;
pub mod transport;

pub use bridge::{Bridge, RemoteLink};
pub use config::{FaultConfig, RingConfig, TimingConfig};
pub use error::RingError;
pub use monitor::Monitor;
pub use node::{Node, Outbound, ShutdownReport};
pub use sink::{delivery_channel, Delivery, DeliverySink, DeliveryStream};
