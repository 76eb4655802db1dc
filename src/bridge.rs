//! Inter-ring gateway.
//!
//! The bridge occupies one position in its local ring and owns a second,
//! dedicated link pair to a peer bridge on a remote ring. Each loop
//! iteration polls the remote side first, then the ring side, with bounded
//! waits on both, so neither side can starve the other.
//!
//! Inter-bridge control rides in ordinary data frames with source address 0
//! and a single data byte carrying the [`BridgeMessage`] id. A local FINISH
//! is drained from the ring and translated into a control frame for the
//! peer; a KILL control frame from the peer is injected into the local ring
//! as a real KILL.
//!
//! Without a peer the bridge runs in offline mode: ring traffic bound for
//! the remote is discarded, announced once rather than per frame.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};

use crate::config::RingConfig;
use crate::error::Result;
use crate::protocol::{BridgeMessage, Frame};
use crate::transport::{FrameReceiver, FrameSender, Recv};

/// The dedicated link pair to a peer bridge.
pub struct RemoteLink<R, W> {
    rx: FrameReceiver<R>,
    tx: FrameSender<W>,
}

impl<R, W> RemoteLink<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wrap the two halves of the inter-bridge connection.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            rx: FrameReceiver::new(reader),
            tx: FrameSender::new(writer),
        }
    }
}

/// Whether the run loop keeps going after a frame.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Shutdown,
}

/// Gateway between the local ring and a peer ring.
pub struct Bridge<R, W, BR, BW> {
    config: RingConfig,
    ring_rx: FrameReceiver<R>,
    ring_tx: FrameSender<W>,
    remote: Option<RemoteLink<BR, BW>>,
    offline_logged: bool,
}

impl<R, W, BR, BW> Bridge<R, W, BR, BW>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    BR: AsyncRead + Unpin,
    BW: AsyncWrite + Unpin,
{
    /// Create a bridge on its ring link halves, optionally connected to a
    /// peer. `None` starts the bridge in offline mode.
    pub fn new(
        config: RingConfig,
        ring_reader: R,
        ring_writer: W,
        remote: Option<RemoteLink<BR, BW>>,
    ) -> Result<Self> {
        config.validate()?;
        if remote.is_none() {
            info!("bridge starting in offline mode");
        }
        Ok(Self {
            config,
            ring_rx: FrameReceiver::new(ring_reader),
            ring_tx: FrameSender::new(ring_writer),
            remote,
            offline_logged: false,
        })
    }

    /// Shuttle frames between the ring and the peer until a KILL arrives on
    /// either side or the ring link dies.
    ///
    /// A failure on the remote link is not fatal: the bridge drops to
    /// offline mode and keeps serving the ring.
    pub async fn run(mut self) -> Result<()> {
        let poll = self.config.timing.bridge_poll_wait;
        loop {
            // Remote side first; one frame per iteration keeps the two
            // sides interleaved.
            if let Some(frame) = self.poll_remote().await {
                self.handle_remote_frame(frame).await;
                continue;
            }

            match self.ring_rx.recv_frame(poll, &self.config.timing).await? {
                Recv::Empty => continue,
                Recv::Truncated(header) => {
                    warn!(
                        source = header.source,
                        "frame body never arrived on the ring side, discarding header"
                    );
                }
                Recv::Frame(frame) => {
                    if self.handle_ring_frame(frame).await == Flow::Shutdown {
                        break;
                    }
                }
            }
        }

        if let Err(e) = self.ring_tx.shutdown().await {
            debug!(error = %e, "ring link teardown failed");
        }
        if let Some(mut remote) = self.remote.take() {
            if let Err(e) = remote.tx.shutdown().await {
                debug!(error = %e, "remote link teardown failed");
            }
        }
        info!("bridge shut down");
        Ok(())
    }

    /// One bounded receive on the remote link. Any failure there demotes
    /// the bridge to offline mode.
    async fn poll_remote(&mut self) -> Option<Frame> {
        let remote = self.remote.as_mut()?;
        match remote
            .rx
            .recv_frame(self.config.timing.bridge_poll_wait, &self.config.timing)
            .await
        {
            Ok(Recv::Frame(frame)) => Some(frame),
            Ok(Recv::Empty) => None,
            Ok(Recv::Truncated(header)) => {
                warn!(
                    source = header.source,
                    "frame body never arrived from the peer, discarding header"
                );
                None
            }
            Err(e) => {
                warn!(error = %e, "remote link failed, dropping to offline mode");
                self.remote = None;
                None
            }
        }
    }

    async fn handle_ring_frame(&mut self, frame: Frame) -> Flow {
        if frame.is_token() {
            // The token never crosses rings.
            if let Err(e) = self.ring_tx.send(&frame).await {
                error!(error = %e, "failed to pass the token");
            }
            return Flow::Continue;
        }

        if frame.is_finish() {
            // The local ring is idle. Tell the peer and drain the FINISH.
            info!("local ring finished, notifying the peer");
            self.send_remote(&Frame::bridge_control(BridgeMessage::Finish))
                .await;
            return Flow::Continue;
        }

        if frame.is_kill() {
            // The KILL has completed its lap; the ring behind us is already
            // down. Stop here rather than send it around again.
            info!("KILL completed its lap, bridge shutting down");
            return Flow::Shutdown;
        }

        self.send_remote(&frame).await;
        Flow::Continue
    }

    /// React to a frame from the peer. A KILL control becomes a real KILL
    /// on the ring; the bridge itself goes down when that KILL laps back
    /// around on the ring side.
    async fn handle_remote_frame(&mut self, frame: Frame) {
        // Source 0 with a single data byte addresses this bridge itself;
        // anything else is ring traffic to pass through.
        if frame.header.source == 0 && frame.data.len() == 1 {
            match BridgeMessage::from_id(frame.data[0]) {
                Some(BridgeMessage::Kill) => {
                    info!("peer requested shutdown, injecting KILL into the ring");
                    if let Err(e) = self.ring_tx.send_kill().await {
                        error!(error = %e, "failed to inject KILL");
                    }
                }
                Some(BridgeMessage::Finish) => {
                    debug!("peer ring reported finished");
                }
                None => {
                    warn!(id = frame.data[0], "unknown inter-bridge control, ignoring");
                }
            }
            return;
        }

        debug!(
            source = frame.header.source,
            destination = frame.header.destination,
            "forwarding frame from the peer into the ring"
        );
        if let Err(e) = self.ring_tx.send(&frame).await {
            error!(error = %e, "failed to forward peer frame into the ring");
        }
    }

    /// Send toward the peer, discarding quietly in offline mode.
    async fn send_remote(&mut self, frame: &Frame) {
        let remote = match self.remote.as_mut() {
            Some(remote) => remote,
            None => {
                if !self.offline_logged {
                    info!("offline: discarding traffic bound for the peer");
                    self.offline_logged = true;
                }
                return;
            }
        };
        if let Err(e) = remote.tx.send(frame).await {
            warn!(error = %e, "remote link failed, dropping to offline mode");
            self.remote = None;
        }
    }
}
