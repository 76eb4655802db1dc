//! Wire format encoding and decoding.
//!
//! Implements the 5-byte header format:
//! ```text
//! ┌────────────────┬──────────────┬─────────────┬─────────┬────────┐
//! │ Access Control │ Frame Control│ Destination │ Source  │ Size   │
//! │ 1 byte         │ 1 byte       │ 1 byte      │ 1 byte  │ 1 byte │
//! └────────────────┴──────────────┴─────────────┴─────────┴────────┘
//! ```
//!
//! The access-control byte is bit-packed:
//! `[priority:3][monitor:1][token:1][reservation:3]`. A frame is a token iff
//! the token bit is **clear** AND the frame-control byte is 0; data frames
//! set the token bit. After the header come exactly `size` data bytes and a
//! single trailing status byte.

use crate::error::{Result, RingError};

/// Header size in bytes (fixed, exactly 5).
pub const HEADER_SIZE: usize = 5;

/// Bytes a frame carries beyond its data: header plus status byte.
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + 1;

/// Maximum data bytes a frame may declare.
pub const MAX_DATA_SIZE: usize = 254;

/// Reserved address for the monitor and control traffic.
pub const MONITOR_ADDRESS: u8 = 0;

/// Reserved address for the bridge.
pub const BRIDGE_ADDRESS: u8 = 255;

/// Bit layout of the access-control byte.
pub mod access_control {
    /// Priority field, top three bits.
    pub const PRIORITY_MASK: u8 = 0b1110_0000;
    /// Set once the monitor has observed the frame.
    pub const MONITOR_BIT: u8 = 0b0000_1000;
    /// Set on every non-token frame.
    pub const NOT_TOKEN_BIT: u8 = 0b0001_0000;
    /// Reservation field, bottom three bits.
    pub const RESERVATION_MASK: u8 = 0b0000_0111;
}

/// Frame-control byte values.
pub mod frame_control {
    /// Ordinary data frame (also the token's value; the token bit decides).
    pub const DATA: u8 = 0;
    /// Ring-wide shutdown signal.
    pub const KILL: u8 = 2;
    /// Ring-idle notification, raised by the monitor.
    pub const FINISH: u8 = 3;
}

/// Trailing status byte values.
pub mod status {
    /// No node has processed the frame yet.
    pub const UNTOUCHED: u8 = 0;
    /// The destination accepted the frame.
    pub const ACCEPTED: u8 = 2;
    /// The destination rejected the frame.
    pub const REJECTED: u8 = 3;

    /// Token "used since last monitor visit" flag, carried in the MSB.
    pub const TOKEN_USED_BIT: u8 = 0b1000_0000;

    /// Read the token used-flag out of a status byte.
    #[inline]
    pub fn token_used(status: u8) -> bool {
        status & TOKEN_USED_BIT != 0
    }

    /// Set or clear only the token used-flag, preserving the other bits.
    #[inline]
    pub fn set_token_used(status: u8, used: bool) -> u8 {
        if used {
            status | TOKEN_USED_BIT
        } else {
            status & !TOKEN_USED_BIT
        }
    }
}

/// Decoded 5-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Access-control byte (bit-packed, see [`access_control`]).
    pub access_control: u8,
    /// Frame-control byte (see [`frame_control`]).
    pub frame_control: u8,
    /// Destination address.
    pub destination: u8,
    /// Source address.
    pub source: u8,
    /// Declared data length, 0-254. Unsigned on the wire; callers never see
    /// a sign.
    pub size: u8,
}

impl Header {
    /// Header for an ordinary data frame (token bit set, frame control 0).
    pub fn data(destination: u8, source: u8, size: u8) -> Self {
        Self {
            access_control: access_control::NOT_TOKEN_BIT,
            frame_control: frame_control::DATA,
            destination,
            source,
            size,
        }
    }

    /// Header for the token: token bit clear, everything else zero.
    pub fn token() -> Self {
        Self {
            access_control: 0,
            frame_control: frame_control::DATA,
            destination: 0,
            source: 0,
            size: 0,
        }
    }

    /// Header for a zero-field control frame (KILL or FINISH).
    pub fn control(frame_control: u8) -> Self {
        Self {
            access_control: 0,
            frame_control,
            destination: 0,
            source: 0,
            size: 0,
        }
    }

    /// Encode the header to its 5 wire bytes.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        [
            self.access_control,
            self.frame_control,
            self.destination,
            self.source,
            self.size,
        ]
    }

    /// Decode a header from wire bytes.
    ///
    /// Returns `None` if the buffer is shorter than 5 bytes.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            access_control: buf[0],
            frame_control: buf[1],
            destination: buf[2],
            source: buf[3],
            size: buf[4],
        })
    }

    /// True iff this header denotes the token.
    ///
    /// Both the token bit and the frame-control byte must agree; if either
    /// says otherwise the frame is not a token.
    #[inline]
    pub fn is_token(&self) -> bool {
        self.access_control & access_control::NOT_TOKEN_BIT == 0
            && self.frame_control == frame_control::DATA
    }

    /// True iff this is a KILL frame.
    #[inline]
    pub fn is_kill(&self) -> bool {
        self.frame_control == frame_control::KILL
    }

    /// True iff this is a FINISH frame.
    #[inline]
    pub fn is_finish(&self) -> bool {
        self.frame_control == frame_control::FINISH
    }

    /// Priority field (0-7).
    #[inline]
    pub fn priority(&self) -> u8 {
        (self.access_control & access_control::PRIORITY_MASK) >> 5
    }

    /// Whether the monitor has already observed this frame.
    #[inline]
    pub fn monitor_seen(&self) -> bool {
        self.access_control & access_control::MONITOR_BIT != 0
    }

    /// Mark or clear the monitor-seen bit, preserving the other bits.
    #[inline]
    pub fn set_monitor_seen(&mut self, seen: bool) {
        if seen {
            self.access_control |= access_control::MONITOR_BIT;
        } else {
            self.access_control &= !access_control::MONITOR_BIT;
        }
    }

    /// Reservation field (0-7).
    #[inline]
    pub fn reservation(&self) -> u8 {
        self.access_control & access_control::RESERVATION_MASK
    }

    /// Declared data length as a usize, 0-254.
    #[inline]
    pub fn size(&self) -> usize {
        self.size as usize
    }

    /// Validate the header for protocol compliance.
    pub fn validate(&self) -> Result<()> {
        if self.size as usize > MAX_DATA_SIZE {
            return Err(RingError::Protocol(format!(
                "declared size {} exceeds maximum {}",
                self.size, MAX_DATA_SIZE
            )));
        }
        Ok(())
    }
}

/// True iff the slice is exactly one well-formed token header.
///
/// Malformed input (wrong length, empty) is simply not a token.
pub fn is_token(header: &[u8]) -> bool {
    header.len() == HEADER_SIZE && Header::decode(header).is_some_and(|h| h.is_token())
}

/// True iff the slice is exactly one well-formed KILL header.
pub fn is_kill(header: &[u8]) -> bool {
    header.len() == HEADER_SIZE && Header::decode(header).is_some_and(|h| h.is_kill())
}

/// True iff the slice is exactly one well-formed FINISH header.
pub fn is_finish(header: &[u8]) -> bool {
    header.len() == HEADER_SIZE && Header::decode(header).is_some_and(|h| h.is_finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = Header::data(7, 3, 42);
        let encoded = original.encode();
        let decoded = Header::decode(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_header_byte_order() {
        let header = Header {
            access_control: 0x18,
            frame_control: 0x02,
            destination: 0x0A,
            source: 0x0B,
            size: 0x0C,
        };
        let bytes = header.encode();
        assert_eq!(bytes, [0x18, 0x02, 0x0A, 0x0B, 0x0C]);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        assert!(Header::decode(&[0u8; 4]).is_none());
        assert!(Header::decode(&[]).is_none());
    }

    #[test]
    fn test_token_header_recognized() {
        let token = Header::token();
        assert!(token.is_token());
        assert!(!token.is_kill());
        assert!(!token.is_finish());
        assert!(is_token(&token.encode()));
    }

    #[test]
    fn test_data_header_is_not_token() {
        // Token bit set means not a token even with frame control 0.
        let data = Header::data(1, 2, 0);
        assert!(!data.is_token());
    }

    #[test]
    fn test_token_requires_both_markers() {
        // Token bit clear but non-zero frame control: not a token.
        let mut header = Header::token();
        header.frame_control = frame_control::KILL;
        assert!(!header.is_token());
    }

    #[test]
    fn test_kill_and_finish_discrimination() {
        let kill = Header::control(frame_control::KILL);
        let finish = Header::control(frame_control::FINISH);

        assert!(kill.is_kill());
        assert!(!kill.is_finish());
        assert!(!kill.is_token());

        assert!(finish.is_finish());
        assert!(!finish.is_kill());
        assert!(!finish.is_token());

        assert!(is_kill(&kill.encode()));
        assert!(is_finish(&finish.encode()));
    }

    #[test]
    fn test_slice_helpers_reject_malformed() {
        assert!(!is_token(&[]));
        assert!(!is_token(&[0u8; 4]));
        assert!(!is_token(&[0u8; 6]));
        assert!(!is_kill(&[2u8; 4]));
        assert!(!is_finish(&[3u8; 6]));
    }

    #[test]
    fn test_priority_and_reservation_extraction() {
        let header = Header {
            access_control: 0b1011_1101,
            frame_control: 0,
            destination: 0,
            source: 0,
            size: 0,
        };
        assert_eq!(header.priority(), 0b101);
        assert_eq!(header.reservation(), 0b101);
        assert!(header.monitor_seen());
    }

    #[test]
    fn test_monitor_bit_set_and_clear() {
        let mut header = Header::data(1, 2, 3);
        assert!(!header.monitor_seen());

        header.set_monitor_seen(true);
        assert!(header.monitor_seen());
        // The rest of the access-control byte is untouched.
        assert_eq!(
            header.access_control & !access_control::MONITOR_BIT,
            access_control::NOT_TOKEN_BIT
        );

        header.set_monitor_seen(false);
        assert!(!header.monitor_seen());
        assert_eq!(header.access_control, access_control::NOT_TOKEN_BIT);
    }

    #[test]
    fn test_size_is_unsigned() {
        // 0xFE would be negative in a signed byte; here it reads as 254.
        let header = Header::data(1, 2, 0xFE);
        assert_eq!(header.size(), 254);
        assert!(header.validate().is_ok());
    }

    #[test]
    fn test_validate_oversized_rejected() {
        let header = Header::data(1, 2, 255);
        assert!(header.validate().is_err());
    }

    #[test]
    fn test_token_used_bit_idempotent() {
        let st = 0b0000_0011;
        let once = status::set_token_used(st, true);
        let twice = status::set_token_used(once, true);
        assert_eq!(once, twice);
        assert!(status::token_used(once));

        // Clearing restores the original low bits.
        let cleared = status::set_token_used(once, false);
        assert_eq!(cleared, st);
        assert!(!status::token_used(cleared));
    }
}
