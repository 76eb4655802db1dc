//! The circulating permission token.
//!
//! The token is a fixed 6-byte frame: token bit clear, frame control 0,
//! destination/source/size all zero. The only mutable piece is the status
//! byte, whose most significant bit records whether any node transmitted
//! since the monitor last saw the token.

use super::frame::Frame;
use super::wire_format::{status, Header};

/// Transient token state held by the current owner.
///
/// Only the status byte varies between holds; every other field is fixed by
/// the token's wire shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Token {
    status: u8,
}

impl Token {
    /// A fresh zero-state token (used flag clear), as issued by the monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the token state out of a received token frame.
    pub fn from_frame(frame: &Frame) -> Self {
        Self {
            status: frame.status,
        }
    }

    /// Whether any node transmitted while holding the token since the
    /// monitor last cleared the flag.
    #[inline]
    pub fn used(&self) -> bool {
        status::token_used(self.status)
    }

    /// Set or clear the used flag, preserving the rest of the status byte.
    #[inline]
    pub fn set_used(&mut self, used: bool) {
        self.status = status::set_token_used(self.status, used);
    }

    /// Render the token as a wire frame, ready to pass onward.
    pub fn to_frame(&self) -> Frame {
        Frame {
            header: Header::token(),
            data: bytes::Bytes::new(),
            status: self.status,
        }
    }
}
