//! Delivery-outcome events.
//!
//! A node emits one [`Delivery`] for every frame it accepts as final
//! recipient. The sink itself is external to the protocol core; the channel
//! handle here is the seam it plugs into.

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;

/// Record of one accepted frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delivery {
    /// Address of the sending node.
    pub source: u8,
    /// Address of the accepting node.
    pub destination: u8,
    /// Declared data length.
    pub size: u8,
    /// The data bytes as carried on the wire.
    pub payload: Bytes,
}

/// Handle a node uses to report deliveries.
pub type DeliverySink = mpsc::UnboundedSender<Delivery>;

/// Receiving end for a delivery sink.
pub type DeliveryStream = mpsc::UnboundedReceiver<Delivery>;

/// Create a delivery channel pair.
pub fn delivery_channel() -> (DeliverySink, DeliveryStream) {
    mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_channel_carries_records() {
        let (sink, mut stream) = delivery_channel();
        let record = Delivery {
            source: 1,
            destination: 2,
            size: 2,
            payload: Bytes::from_static(b"hi"),
        };
        sink.send(record.clone()).unwrap();
        assert_eq!(stream.try_recv().unwrap(), record);
    }
}
