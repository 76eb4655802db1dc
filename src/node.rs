//! Generic ring participant.
//!
//! A node pulls from its predecessor link, classifies each incoming unit
//! (token / kill / addressed-to-self / own frame returning / pass-through),
//! acts, and pushes the result onto its successor link. While holding the
//! token it transmits its own queued messages, up to the configured holding
//! limit per hold.
//!
//! One node is one independent worker: its queues are owned exclusively by
//! its `run` loop and the only communication with the rest of the ring is
//! the bytes on its two links.

use std::collections::VecDeque;

use bytes::Bytes;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};

use crate::config::{fault_fires, RingConfig};
use crate::error::{Result, RingError};
use crate::protocol::{status, Frame, Token, BRIDGE_ADDRESS, MONITOR_ADDRESS};
use crate::sink::{Delivery, DeliverySink};
use crate::transport::{FrameReceiver, FrameSender, Recv};

/// One queued outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Ring address to deliver to.
    pub destination: u8,
    /// Data bytes, at most 254.
    pub payload: Bytes,
}

/// Queue depths left behind when a node shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Messages never transmitted.
    pub pending: usize,
    /// Messages transmitted but never confirmed.
    pub unacked: usize,
}

/// Whether the run loop keeps going after a frame.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Shutdown,
}

/// A generic ring participant.
pub struct Node<R, W> {
    address: u8,
    config: RingConfig,
    rx: FrameReceiver<R>,
    tx: FrameSender<W>,
    sink: DeliverySink,
    holding_token: bool,
    token: Token,
    frames_sent_this_hold: u32,
    pending: VecDeque<Outbound>,
    unacked: VecDeque<Outbound>,
    rng: SmallRng,
}

impl<R, W> Node<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Create a node on the given predecessor/successor link halves.
    ///
    /// The address must be an ordinary member address (1-254); 0 and 255 are
    /// reserved for the monitor and the bridge.
    pub fn new(
        address: u8,
        config: RingConfig,
        reader: R,
        writer: W,
        sink: DeliverySink,
    ) -> Result<Self> {
        if address == MONITOR_ADDRESS || address == BRIDGE_ADDRESS {
            return Err(RingError::Config(format!(
                "address {} is reserved",
                address
            )));
        }
        config.validate()?;
        let rng = match config.fault.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Ok(Self {
            address,
            config,
            rx: FrameReceiver::new(reader),
            tx: FrameSender::new(writer),
            sink,
            holding_token: false,
            token: Token::new(),
            frames_sent_this_hold: 0,
            pending: VecDeque::new(),
            unacked: VecDeque::new(),
            rng,
        })
    }

    /// This node's ring address.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Queue a message for transmission on a future token hold.
    pub fn enqueue(&mut self, destination: u8, payload: impl Into<Bytes>) {
        self.pending.push_back(Outbound {
            destination,
            payload: payload.into(),
        });
    }

    /// Drive the node until a KILL circulates or the predecessor link dies.
    pub async fn run(mut self) -> Result<ShutdownReport> {
        loop {
            if self.holding_token {
                self.transmit_or_release().await;
                continue;
            }

            match self
                .rx
                .recv_frame(self.config.timing.node_header_wait, &self.config.timing)
                .await?
            {
                Recv::Empty => continue,
                Recv::Truncated(header) => {
                    // The header arrived but the frame was lost in flight.
                    // Nothing to forward; the monitor repairs the ring.
                    warn!(
                        address = self.address,
                        source = header.source,
                        "frame body never arrived, discarding header"
                    );
                }
                Recv::Frame(frame) => {
                    if self.handle_frame(frame).await? == Flow::Shutdown {
                        break;
                    }
                }
            }
        }

        if let Err(e) = self.tx.shutdown().await {
            debug!(address = self.address, error = %e, "successor link teardown failed");
        }
        info!(
            address = self.address,
            pending = self.pending.len(),
            unacked = self.unacked.len(),
            "node shut down"
        );
        Ok(ShutdownReport {
            pending: self.pending.len(),
            unacked: self.unacked.len(),
        })
    }

    /// One token-holding step: transmit the next queued message, or release
    /// the token when the holding limit or the queue runs out.
    async fn transmit_or_release(&mut self) {
        let exhausted = self.frames_sent_this_hold >= self.config.token_holding_limit;
        if exhausted || self.pending.is_empty() {
            self.holding_token = false;
            if fault_fires(&mut self.rng, self.config.fault.drop_token) {
                warn!(address = self.address, "dropping the token (fault injection)");
                return;
            }
            if let Err(e) = self.tx.send_token(&self.token).await {
                error!(address = self.address, error = %e, "failed to pass the token");
            }
            return;
        }

        let message = match self.pending.pop_front() {
            Some(m) => m,
            None => return,
        };
        let frame = Frame::data(message.destination, self.address, message.payload.clone());
        if let Err(e) = self.tx.send(&frame).await {
            error!(address = self.address, error = %e, "failed to transmit frame");
            self.pending.push_front(message);
            return;
        }
        self.token.set_used(true);
        self.unacked.push_back(message);
        self.frames_sent_this_hold += 1;
        debug!(
            address = self.address,
            destination = frame.header.destination,
            size = frame.header.size,
            "transmitted data frame"
        );
    }

    async fn handle_frame(&mut self, frame: Frame) -> Result<Flow> {
        if frame.is_kill() {
            info!(address = self.address, "KILL received, shutting down");
            if let Err(e) = self.tx.send_kill().await {
                error!(address = self.address, error = %e, "failed to forward KILL");
            }
            return Ok(Flow::Shutdown);
        }

        if frame.is_token() {
            self.acquire_token(&frame);
            return Ok(Flow::Continue);
        }

        if frame.header.destination == self.address {
            self.deliver(frame).await;
            return Ok(Flow::Continue);
        }

        if frame.header.source == self.address {
            self.complete_circuit(frame).await;
            return Ok(Flow::Continue);
        }

        // Not ours in any way: act as a pipe.
        self.forward(&frame).await;
        Ok(Flow::Continue)
    }

    /// Take ownership of the token and reclaim unconfirmed messages.
    ///
    /// The token arriving behind our own transmissions means any message
    /// still unconfirmed circulated without a status reply; requeue them at
    /// the front in their original relative order.
    fn acquire_token(&mut self, frame: &Frame) {
        self.holding_token = true;
        self.frames_sent_this_hold = 0;
        self.token = Token::from_frame(frame);

        if self.unacked.is_empty() {
            return;
        }
        debug!(
            address = self.address,
            count = self.unacked.len(),
            "requeueing unconfirmed messages for retransmission"
        );
        while let Some(message) = self.unacked.pop_back() {
            self.pending.push_front(message);
        }
    }

    /// Handle a frame addressed to this node.
    async fn deliver(&mut self, mut frame: Frame) {
        if frame.is_marked() {
            // Already accepted or rejected downstream: an orphan making a
            // second pass. Forward untouched, no duplicate delivery.
            debug!(
                address = self.address,
                source = frame.header.source,
                "already-marked frame to self, forwarding unchanged"
            );
            self.forward(&frame).await;
            return;
        }

        if fault_fires(&mut self.rng, self.config.fault.reject_delivery) {
            warn!(
                address = self.address,
                source = frame.header.source,
                "rejecting incoming frame (fault injection)"
            );
            frame.status = status::REJECTED;
        } else {
            frame.status = status::ACCEPTED;
            let record = Delivery {
                source: frame.header.source,
                destination: self.address,
                size: frame.header.size,
                payload: frame.data.clone(),
            };
            if self.sink.send(record).is_err() {
                warn!(address = self.address, "delivery sink closed, record lost");
            }
        }
        // The marked frame travels on around to its source.
        self.forward(&frame).await;
    }

    /// Handle our own frame completing its circuit.
    async fn complete_circuit(&mut self, frame: Frame) {
        match frame.status {
            status::ACCEPTED => {
                self.take_unacked(&frame);
                debug!(
                    address = self.address,
                    destination = frame.header.destination,
                    "frame confirmed delivered"
                );
            }
            status::REJECTED => {
                if let Some(message) = self.take_unacked(&frame) {
                    debug!(
                        address = self.address,
                        destination = frame.header.destination,
                        "frame rejected, requeueing for retransmission"
                    );
                    self.pending.push_front(message);
                }
            }
            _ => {
                // Untouched status on a full circuit: the destination never
                // saw it. Drain with no side effect.
                warn!(
                    address = self.address,
                    destination = frame.header.destination,
                    "own frame returned untouched, draining"
                );
            }
        }

        // The frame drains here unless the node "forgets" to do so.
        if fault_fires(&mut self.rng, self.config.fault.forget_drain) {
            warn!(
                address = self.address,
                "forgetting to drain own frame (fault injection)"
            );
            self.forward(&frame).await;
        }
    }

    /// Find the unconfirmed message matching a returned frame.
    fn take_unacked(&mut self, frame: &Frame) -> Option<Outbound> {
        let index = self.unacked.iter().position(|m| {
            m.destination == frame.header.destination && m.payload == frame.data
        })?;
        self.unacked.remove(index)
    }

    /// Forward a frame, logging and abandoning the attempt on I/O failure.
    async fn forward(&mut self, frame: &Frame) {
        if let Err(e) = self.tx.send(frame).await {
            error!(address = self.address, error = %e, "failed to forward frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FaultConfig, TimingConfig};
    use crate::sink::delivery_channel;
    use std::time::Duration;
    use tokio::io::{duplex, DuplexStream};

    const WAIT: Duration = Duration::from_millis(500);

    struct Harness {
        /// Writes into the node's predecessor link.
        tx: FrameSender<DuplexStream>,
        /// Reads from the node's successor link.
        rx: FrameReceiver<DuplexStream>,
        timing: TimingConfig,
    }

    impl Harness {
        async fn recv(&mut self) -> Frame {
            match self.rx.recv_frame(WAIT, &self.timing).await.unwrap() {
                Recv::Frame(frame) => frame,
                other => panic!("expected a frame, got {:?}", other),
            }
        }

        async fn expect_idle(&mut self) {
            match self
                .rx
                .recv_frame(Duration::from_millis(100), &self.timing)
                .await
                .unwrap()
            {
                Recv::Empty => {}
                other => panic!("expected idle output, got {:?}", other),
            }
        }
    }

    fn spawn_node(
        address: u8,
        config: RingConfig,
    ) -> (
        Harness,
        crate::sink::DeliveryStream,
        tokio::task::JoinHandle<Result<ShutdownReport>>,
    ) {
        spawn_node_with(address, config, Vec::new())
    }

    fn spawn_node_with(
        address: u8,
        config: RingConfig,
        messages: Vec<(u8, &'static str)>,
    ) -> (
        Harness,
        crate::sink::DeliveryStream,
        tokio::task::JoinHandle<Result<ShutdownReport>>,
    ) {
        let (in_tx, in_rx) = duplex(4096);
        let (out_tx, out_rx) = duplex(4096);
        let (sink, stream) = delivery_channel();
        let mut node = Node::new(address, config, in_rx, out_tx, sink).unwrap();
        for (destination, payload) in messages {
            node.enqueue(destination, payload);
        }
        let handle = tokio::spawn(node.run());
        (
            Harness {
                tx: FrameSender::new(in_tx),
                rx: FrameReceiver::new(out_rx),
                timing: TimingConfig::default(),
            },
            stream,
            handle,
        )
    }

    fn test_config() -> RingConfig {
        let mut config = RingConfig::new(2, 2);
        config.fault.seed = Some(42);
        config
    }

    #[test]
    fn test_reserved_addresses_rejected() {
        let (_a, b) = duplex(64);
        let (c, _d) = duplex(64);
        let (sink, _stream) = delivery_channel();
        assert!(Node::new(MONITOR_ADDRESS, test_config(), b, c, sink.clone()).is_err());

        let (_a, b) = duplex(64);
        let (c, _d) = duplex(64);
        assert!(Node::new(BRIDGE_ADDRESS, test_config(), b, c, sink).is_err());
    }

    #[tokio::test]
    async fn test_empty_queue_releases_token_without_data() {
        let (mut harness, _deliveries, _handle) = spawn_node(1, test_config());

        harness.tx.send_token(&Token::new()).await.unwrap();

        // The only thing out should be the token, unused.
        let frame = harness.recv().await;
        assert!(frame.is_token());
        assert!(!Token::from_frame(&frame).used());
        harness.expect_idle().await;
    }

    #[tokio::test]
    async fn test_transmits_queued_then_releases_used_token() {
        let (mut harness, _deliveries, _handle) =
            spawn_node_with(1, test_config(), vec![(2, "hi")]);

        harness.tx.send_token(&Token::new()).await.unwrap();

        let data = harness.recv().await;
        assert!(!data.is_token());
        assert_eq!(data.header.destination, 2);
        assert_eq!(data.header.source, 1);
        assert_eq!(&data.data[..], b"hi");
        assert_eq!(data.status, status::UNTOUCHED);

        let token = harness.recv().await;
        assert!(token.is_token());
        assert!(Token::from_frame(&token).used());
    }

    #[tokio::test]
    async fn test_holding_limit_bounds_transmissions() {
        let config = test_config(); // limit 2
        let (mut harness, _deliveries, _handle) =
            spawn_node_with(1, config, vec![(2, "a"), (2, "b"), (2, "c")]);

        harness.tx.send_token(&Token::new()).await.unwrap();

        assert_eq!(&harness.recv().await.data[..], b"a");
        assert_eq!(&harness.recv().await.data[..], b"b");
        let token = harness.recv().await;
        assert!(token.is_token());
        // Third message waits for the next hold.
        harness.expect_idle().await;
    }

    #[tokio::test]
    async fn test_pass_through_unrelated_frame() {
        let (mut harness, mut deliveries, _handle) = spawn_node(1, test_config());

        let frame = Frame::data(5, 7, "elsewhere");
        harness.tx.send(&frame).await.unwrap();

        assert_eq!(harness.recv().await, frame);
        assert!(deliveries.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_accepts_frame_addressed_to_self() {
        let (mut harness, mut deliveries, _handle) = spawn_node(2, test_config());

        harness.tx.send(&Frame::data(2, 1, "hi")).await.unwrap();

        let marked = harness.recv().await;
        assert_eq!(marked.status, status::ACCEPTED);
        assert_eq!(&marked.data[..], b"hi");

        let record = deliveries.recv().await.unwrap();
        assert_eq!(record.source, 1);
        assert_eq!(record.destination, 2);
        assert_eq!(record.size, 2);
        assert_eq!(&record.payload[..], b"hi");
    }

    #[tokio::test]
    async fn test_marked_frame_to_self_forwarded_unchanged() {
        let (mut harness, mut deliveries, _handle) = spawn_node(2, test_config());

        let mut orphan = Frame::data(2, 1, "old");
        orphan.status = status::ACCEPTED;
        harness.tx.send(&orphan).await.unwrap();

        // Forwarded as-is: no re-marking, no duplicate delivery event.
        assert_eq!(harness.recv().await, orphan);
        assert!(deliveries.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_accepted_circuit_drains_and_clears_unacked() {
        let (mut harness, _deliveries, handle) =
            spawn_node_with(1, test_config(), vec![(2, "hi")]);

        harness.tx.send_token(&Token::new()).await.unwrap();
        let mut data = harness.recv().await;
        let _token = harness.recv().await;

        // Destination accepted it; the frame completes its circuit.
        data.status = status::ACCEPTED;
        harness.tx.send(&data).await.unwrap();
        harness.expect_idle().await; // drained, not forwarded

        harness.tx.send(&Frame::kill()).await.unwrap();
        let kill = harness.recv().await;
        assert!(kill.is_kill());

        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.unacked, 0);
        assert_eq!(report.pending, 0);
    }

    #[tokio::test]
    async fn test_rejected_circuit_requeues_for_retransmission() {
        let (mut harness, _deliveries, _handle) =
            spawn_node_with(1, test_config(), vec![(2, "hi")]);

        harness.tx.send_token(&Token::new()).await.unwrap();
        let mut data = harness.recv().await;
        let token = harness.recv().await;

        data.status = status::REJECTED;
        harness.tx.send(&data).await.unwrap();

        // Next token hold retransmits the rejected message.
        harness.tx.send(&Token::from_frame(&token).to_frame()).await.unwrap();
        let retry = harness.recv().await;
        assert_eq!(&retry.data[..], b"hi");
        assert_eq!(retry.status, status::UNTOUCHED);
    }

    #[tokio::test]
    async fn test_token_return_requeues_unacked_in_order() {
        let mut config = test_config();
        config.token_holding_limit = 3;
        let (mut harness, _deliveries, _handle) =
            spawn_node_with(1, config, vec![(2, "a"), (2, "b")]);

        harness.tx.send_token(&Token::new()).await.unwrap();
        assert_eq!(&harness.recv().await.data[..], b"a");
        assert_eq!(&harness.recv().await.data[..], b"b");
        let _token = harness.recv().await;

        // Token comes back with no status replies in between: both messages
        // must go out again, original order preserved.
        harness.tx.send_token(&Token::new()).await.unwrap();
        assert_eq!(&harness.recv().await.data[..], b"a");
        assert_eq!(&harness.recv().await.data[..], b"b");
    }

    #[tokio::test]
    async fn test_kill_forwarded_then_shutdown() {
        let (mut harness, _deliveries, handle) = spawn_node(1, test_config());

        harness.tx.send(&Frame::kill()).await.unwrap();
        assert!(harness.recv().await.is_kill());

        let report = handle.await.unwrap().unwrap();
        assert_eq!(report, ShutdownReport { pending: 0, unacked: 0 });
    }

    #[tokio::test]
    async fn test_fault_reject_marks_frame_rejected() {
        let mut config = test_config();
        config.fault = FaultConfig {
            reject_delivery: Some(1), // always
            seed: Some(1),
            ..FaultConfig::default()
        };
        let (mut harness, mut deliveries, _handle) = spawn_node(2, config);

        harness.tx.send(&Frame::data(2, 1, "no")).await.unwrap();

        let marked = harness.recv().await;
        assert_eq!(marked.status, status::REJECTED);
        assert!(deliveries.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_fault_forget_drain_reforwards_own_frame() {
        let mut config = test_config();
        config.fault = FaultConfig {
            forget_drain: Some(1), // always
            seed: Some(1),
            ..FaultConfig::default()
        };
        let (mut harness, _deliveries, _handle) =
            spawn_node_with(1, config, vec![(2, "hi")]);

        harness.tx.send_token(&Token::new()).await.unwrap();
        let mut data = harness.recv().await;
        let _token = harness.recv().await;

        data.status = status::ACCEPTED;
        harness.tx.send(&data).await.unwrap();

        // Instead of draining, the frame goes around again.
        assert_eq!(harness.recv().await, data);
    }

    #[tokio::test]
    async fn test_fault_drop_token_suppresses_pass() {
        let mut config = test_config();
        config.fault = FaultConfig {
            drop_token: Some(1), // always
            seed: Some(1),
            ..FaultConfig::default()
        };
        let (mut harness, _deliveries, _handle) = spawn_node(1, config);

        harness.tx.send_token(&Token::new()).await.unwrap();
        harness.expect_idle().await;
    }
}
