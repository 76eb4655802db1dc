//! Ring health supervisor.
//!
//! The monitor sits in the ring at address 0 and never originates data of
//! its own. It issues the token, regenerates it when a full watch interval
//! passes without traffic, drains orphaned frames that complete a second
//! lap, and retires an idle ring by replacing the unused token with a
//! FINISH frame.
//!
//! Activity tracking rides on the token itself: nodes set the used flag in
//! the token's status byte when they transmit, and the monitor clears it on
//! every lap. A token that returns with the flag still clear means nobody
//! transmitted for a full rotation.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};

use crate::config::RingConfig;
use crate::error::Result;
use crate::protocol::{Frame, Token, MONITOR_ADDRESS};
use crate::transport::{FrameReceiver, FrameSender, Recv};

/// The ring supervisor node.
pub struct Monitor<R, W> {
    config: RingConfig,
    rx: FrameReceiver<R>,
    tx: FrameSender<W>,
}

impl<R, W> Monitor<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Create the monitor on the given predecessor/successor link halves.
    pub fn new(config: RingConfig, reader: R, writer: W) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            rx: FrameReceiver::new(reader),
            tx: FrameSender::new(writer),
        })
    }

    /// Supervise the ring until a KILL circulates or a link dies.
    ///
    /// The first token is issued here; everything after that is reaction to
    /// what arrives on the predecessor link.
    pub async fn run(mut self) -> Result<()> {
        info!(address = MONITOR_ADDRESS, "monitor issuing the initial token");
        self.issue_token().await;

        loop {
            match self
                .rx
                .recv_frame(self.config.token_watch_wait(), &self.config.timing)
                .await?
            {
                Recv::Empty => {
                    // A full watch interval with no header: the token is
                    // gone. Flush whatever is stuck in flight and reissue.
                    warn!("token lost, draining the ring and issuing a new one");
                    self.drain_ring().await?;
                    self.issue_token().await;
                }
                Recv::Truncated(header) => {
                    // Declared size and delivered bytes disagree. The frame
                    // is corrupt; clean the ring and start fresh.
                    warn!(
                        source = header.source,
                        declared = header.size,
                        "frame shorter than its declared size, draining the ring"
                    );
                    self.drain_ring().await?;
                    self.issue_token().await;
                }
                Recv::Frame(frame) => {
                    if !self.handle_frame(frame).await {
                        break;
                    }
                }
            }
        }

        if let Err(e) = self.tx.shutdown().await {
            debug!(error = %e, "successor link teardown failed");
        }
        info!("monitor shut down");
        Ok(())
    }

    /// React to one complete frame. Returns false on shutdown.
    async fn handle_frame(&mut self, frame: Frame) -> bool {
        if frame.is_kill() {
            info!("KILL received, forwarding and shutting down");
            if let Err(e) = self.tx.send_kill().await {
                error!(error = %e, "failed to forward KILL");
            }
            return false;
        }

        if frame.is_token() {
            let mut token = Token::from_frame(&frame);
            if token.used() {
                // Someone transmitted this lap. Reset the flag and keep the
                // token moving.
                token.set_used(false);
                if let Err(e) = self.tx.send_token(&token).await {
                    error!(error = %e, "failed to pass the token");
                }
                return true;
            }
            // Nobody used the ring for a whole lap: retire it. The token is
            // not forwarded; FINISH takes its place.
            info!("token returned unused, ring is idle, sending FINISH");
            if let Err(e) = self.tx.send_finish().await {
                error!(error = %e, "failed to send FINISH");
            }
            return true;
        }

        if frame.header.monitor_seen() {
            // Second lap past the monitor: the source never drained it.
            warn!(
                source = frame.header.source,
                destination = frame.header.destination,
                "orphaned frame completed a second lap, draining"
            );
            return true;
        }

        // Ordinary traffic: stamp it as seen and send it on.
        let mut frame = frame;
        frame.header.set_monitor_seen(true);
        if let Err(e) = self.tx.send(&frame).await {
            error!(error = %e, "failed to forward frame");
        }
        true
    }

    /// Issue a fresh zero-state token.
    async fn issue_token(&mut self) {
        if let Err(e) = self.tx.send_token(&Token::new()).await {
            error!(error = %e, "failed to issue the token");
        }
    }

    /// Pull bytes off the predecessor link until a full quiet interval
    /// passes, leaving the ring empty.
    async fn drain_ring(&mut self) -> Result<()> {
        let wait = self.config.drain_wait();
        let mut drained = 0usize;
        while self.rx.recv_byte(wait).await?.is_some() {
            drained += 1;
        }
        debug!(bytes = drained, "ring drained");
        Ok(())
    }
}
