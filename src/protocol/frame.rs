//! Frame struct with constructors, parsing, and encoding.
//!
//! A frame is the atomic wire unit: 5-byte header, exactly `size` data
//! bytes, then one trailing status byte. Uses `bytes::Bytes` for zero-copy
//! data sharing.
//!
//! # Example
//!
//! ```
//! use ringnet::protocol::Frame;
//!
//! let frame = Frame::data(2, 1, "hi");
//! assert_eq!(frame.wire_len(), 2 + 6);
//!
//! let bytes = frame.encode();
//! let parsed = Frame::parse(&bytes).unwrap();
//! assert_eq!(parsed, frame);
//! ```

use bytes::Bytes;
use tracing::warn;

use super::wire_format::{
    frame_control, status, Header, FRAME_OVERHEAD, HEADER_SIZE, MAX_DATA_SIZE, MONITOR_ADDRESS,
};

/// Inter-bridge control message, carried as a 1-byte payload in a frame with
/// source address 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeMessage {
    /// The sending ring has no data in flight.
    Finish,
    /// Ring-wide shutdown, to be injected into the receiving ring.
    Kill,
}

impl BridgeMessage {
    /// Wire id of this message.
    pub fn id(&self) -> u8 {
        match self {
            BridgeMessage::Finish => 1,
            BridgeMessage::Kill => 2,
        }
    }

    /// Parse a wire id; unknown ids decode to `None` and are ignored by the
    /// bridge.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(BridgeMessage::Finish),
            2 => Some(BridgeMessage::Kill),
            _ => None,
        }
    }
}

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Data bytes; length always matches `header.size`.
    pub data: Bytes,
    /// Trailing status byte (see [`status`]).
    pub status: u8,
}

impl Frame {
    /// Assemble an ordinary data frame with status untouched.
    ///
    /// Payloads longer than 254 bytes are truncated with a warning; the
    /// declared size always matches the data actually carried.
    pub fn data(destination: u8, source: u8, payload: impl Into<Bytes>) -> Self {
        let mut payload: Bytes = payload.into();
        if payload.len() > MAX_DATA_SIZE {
            warn!(
                source,
                len = payload.len(),
                "payload exceeds {} bytes, truncating",
                MAX_DATA_SIZE
            );
            payload.truncate(MAX_DATA_SIZE);
        }
        Self {
            header: Header::data(destination, source, payload.len() as u8),
            data: payload,
            status: status::UNTOUCHED,
        }
    }

    /// The fixed 6-byte KILL frame.
    pub fn kill() -> Self {
        Self {
            header: Header::control(frame_control::KILL),
            data: Bytes::new(),
            status: status::UNTOUCHED,
        }
    }

    /// The fixed 6-byte FINISH frame.
    pub fn finish() -> Self {
        Self {
            header: Header::control(frame_control::FINISH),
            data: Bytes::new(),
            status: status::UNTOUCHED,
        }
    }

    /// An inter-bridge control frame: source 0, one data byte carrying the
    /// message id.
    pub fn bridge_control(message: BridgeMessage) -> Self {
        Frame::data(MONITOR_ADDRESS, MONITOR_ADDRESS, vec![message.id()])
    }

    /// Rebuild a frame from a separately received header and body
    /// (data + status), as produced by a framed receive.
    ///
    /// Returns `None` if the body does not hold `size` data bytes plus the
    /// status byte.
    pub fn from_parts(header: Header, body: Bytes) -> Option<Self> {
        let size = header.size();
        if body.len() != size + 1 {
            return None;
        }
        let status = body[size];
        Some(Self {
            header,
            data: body.slice(..size),
            status,
        })
    }

    /// Parse a complete frame from wire bytes.
    ///
    /// Returns `None` if the buffer is shorter than the declared
    /// `size + 6` bytes.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let header = Header::decode(buf)?;
        let size = header.size();
        if buf.len() < size + FRAME_OVERHEAD {
            return None;
        }
        Some(Self {
            header,
            data: Bytes::copy_from_slice(&buf[HEADER_SIZE..HEADER_SIZE + size]),
            status: buf[HEADER_SIZE + size],
        })
    }

    /// Encode the frame to its full wire representation.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.wire_len());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.data);
        buf.push(self.status);
        buf
    }

    /// Total on-wire length: `size + 6`.
    #[inline]
    pub fn wire_len(&self) -> usize {
        self.header.size() + FRAME_OVERHEAD
    }

    /// True iff this frame is the token.
    #[inline]
    pub fn is_token(&self) -> bool {
        self.header.is_token()
    }

    /// True iff this is a KILL frame.
    #[inline]
    pub fn is_kill(&self) -> bool {
        self.header.is_kill()
    }

    /// True iff this is a FINISH frame.
    #[inline]
    pub fn is_finish(&self) -> bool {
        self.header.is_finish()
    }

    /// True iff the status byte shows the frame was already processed.
    #[inline]
    pub fn is_marked(&self) -> bool {
        self.status != status::UNTOUCHED
    }
}

/// Extract the data portion of a raw wire frame.
///
/// The data length is taken from the header's declared size. Returns `None`
/// if the buffer is shorter than `size + 6`.
pub fn extract_data(frame: &[u8]) -> Option<&[u8]> {
    let header = Header::decode(frame)?;
    let size = header.size();
    if frame.len() < size + FRAME_OVERHEAD {
        return None;
    }
    Some(&frame[HEADER_SIZE..HEADER_SIZE + size])
}

/// Extract the trailing status byte of a raw wire frame.
///
/// Returns `None` if the buffer is shorter than `size + 6`.
pub fn extract_status(frame: &[u8]) -> Option<u8> {
    let header = Header::decode(frame)?;
    let size = header.size();
    if frame.len() < size + FRAME_OVERHEAD {
        return None;
    }
    Some(frame[HEADER_SIZE + size])
}
