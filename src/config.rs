//! Ring configuration.
//!
//! Every worker receives an immutable [`RingConfig`] at construction; there is
//! no process-wide shared state. The timeout constants in [`TimingConfig`]
//! were tuned empirically against simulated rings and are deliberately kept as
//! named, overridable values rather than magic numbers.
//!
//! # Example
//!
//! ```
//! use ringnet::config::RingConfig;
//!
//! let config = RingConfig::new(3, 10);
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use rand::rngs::SmallRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RingError};

/// Default maximum data frames a holder may transmit per token hold.
pub const DEFAULT_TOKEN_HOLDING_LIMIT: u32 = 10;

/// Upper bound on the holding limit. Keeps the watch and drain intervals,
/// which scale with `limit x ring_size`, within sane arithmetic range.
pub const MAX_TOKEN_HOLDING_LIMIT: u32 = 10_000;

/// Default wait for a header at an ordinary node.
pub const DEFAULT_NODE_HEADER_WAIT: Duration = Duration::from_millis(50);

/// Default per-side poll window at the bridge.
pub const DEFAULT_BRIDGE_POLL_WAIT: Duration = Duration::from_millis(100);

/// Default base wait for a frame body once the header has arrived.
pub const DEFAULT_BODY_BASE_WAIT: Duration = Duration::from_millis(200);

/// Default additional body wait per declared data byte.
pub const DEFAULT_BODY_PER_BYTE_WAIT: Duration = Duration::from_millis(20);

/// Default token-watch wait per (holding limit x ring size) unit.
///
/// Must exceed the worst-case time for one full token rotation, or the
/// monitor reports spurious token drops.
pub const DEFAULT_TOKEN_WATCH_PER_UNIT: Duration = Duration::from_millis(165);

/// Default drain wait per (holding limit x ring size) unit.
pub const DEFAULT_DRAIN_PER_UNIT: Duration = Duration::from_millis(50);

/// Timeout constants for bounded-wait receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// How long an ordinary node waits for a header each iteration.
    pub node_header_wait: Duration,
    /// How long the bridge waits on each of its two inputs per iteration.
    pub bridge_poll_wait: Duration,
    /// Base wait for a frame body.
    pub body_base_wait: Duration,
    /// Additional body wait per declared data byte.
    pub body_per_byte_wait: Duration,
    /// Token-watch wait contributed by each unit of `limit x ring_size`.
    pub token_watch_per_unit: Duration,
    /// Drain-read wait contributed by each unit of `limit x ring_size`.
    pub drain_per_unit: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            node_header_wait: DEFAULT_NODE_HEADER_WAIT,
            bridge_poll_wait: DEFAULT_BRIDGE_POLL_WAIT,
            body_base_wait: DEFAULT_BODY_BASE_WAIT,
            body_per_byte_wait: DEFAULT_BODY_PER_BYTE_WAIT,
            token_watch_per_unit: DEFAULT_TOKEN_WATCH_PER_UNIT,
            drain_per_unit: DEFAULT_DRAIN_PER_UNIT,
        }
    }
}

impl TimingConfig {
    /// Wait bound for a frame body of `size` data bytes.
    ///
    /// Scales with the declared size so large frames are not spuriously
    /// treated as lost.
    pub fn body_wait(&self, size: usize) -> Duration {
        self.body_base_wait + self.body_per_byte_wait * size as u32
    }
}

/// Fault-injection hooks for exercising ring recovery.
///
/// Each hook is a "1 in N" chance, disabled when `None`. All hooks default to
/// off; shipping configurations should leave them that way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Chance that a node suppresses the token instead of passing it on.
    pub drop_token: Option<u32>,
    /// Chance that a node rejects a frame addressed to it.
    pub reject_delivery: Option<u32>,
    /// Chance that a node re-forwards its own frame instead of draining it.
    pub forget_drain: Option<u32>,
    /// Seed for the per-worker RNG; random when `None`.
    pub seed: Option<u64>,
}

/// Roll a "1 in N" fault-injection chance.
pub(crate) fn fault_fires(rng: &mut SmallRng, one_in: Option<u32>) -> bool {
    match one_in {
        Some(n) if n > 0 => rng.gen_range(0..n) == 0,
        _ => false,
    }
}

/// Immutable per-worker configuration for a ring participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingConfig {
    /// Number of addressable ring members (excluding the monitor).
    pub ring_size: u32,
    /// Maximum data frames a holder may transmit per token hold.
    pub token_holding_limit: u32,
    /// Timeout constants.
    pub timing: TimingConfig,
    /// Fault-injection hooks.
    pub fault: FaultConfig,
}

impl RingConfig {
    /// Create a configuration with default timing and faults disabled.
    pub fn new(ring_size: u32, token_holding_limit: u32) -> Self {
        Self {
            ring_size,
            token_holding_limit,
            timing: TimingConfig::default(),
            fault: FaultConfig::default(),
        }
    }

    /// Check the configuration for protocol compliance.
    ///
    /// A ring needs 2-254 addressable members and a holding limit of at
    /// least one frame.
    pub fn validate(&self) -> Result<()> {
        if self.ring_size < 2 || self.ring_size > 254 {
            return Err(RingError::Config(format!(
                "ring size {} outside supported range 2-254",
                self.ring_size
            )));
        }
        if self.token_holding_limit == 0 {
            return Err(RingError::Config(
                "token holding limit must be at least 1".to_string(),
            ));
        }
        if self.token_holding_limit > MAX_TOKEN_HOLDING_LIMIT {
            return Err(RingError::Config(format!(
                "token holding limit {} exceeds maximum {}",
                self.token_holding_limit, MAX_TOKEN_HOLDING_LIMIT
            )));
        }
        Ok(())
    }

    /// How long the monitor waits for a header before presuming the token
    /// dropped. Exceeds the worst-case full-rotation time.
    ///
    /// Saturates rather than overflowing on out-of-range inputs.
    pub fn token_watch_wait(&self) -> Duration {
        self.timing
            .token_watch_per_unit
            .saturating_mul(self.token_holding_limit.saturating_mul(self.ring_size))
    }

    /// How long each 1-byte drain read waits before the ring is considered
    /// empty of in-flight bytes.
    pub fn drain_wait(&self) -> Duration {
        self.timing
            .drain_per_unit
            .saturating_mul(self.token_holding_limit.saturating_mul(self.ring_size))
    }
}

impl Default for RingConfig {
    fn default() -> Self {
        Self::new(2, DEFAULT_TOKEN_HOLDING_LIMIT)
    }
}
