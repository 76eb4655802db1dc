//! Frame codec: wire layout, frame assembly, and the token.
//!
//! Everything here is pure byte manipulation with no I/O.

pub mod frame;
pub mod token;
pub mod wire_format;

pub use frame::{extract_data, extract_status, BridgeMessage, Frame};
pub use token::Token;
pub use wire_format::{
    access_control, frame_control, is_finish, is_kill, is_token, status, Header, BRIDGE_ADDRESS,
    FRAME_OVERHEAD, HEADER_SIZE, MAX_DATA_SIZE, MONITOR_ADDRESS,
};
