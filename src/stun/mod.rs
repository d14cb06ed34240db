//! STUN wire format.
//!
//! # Data Flow
//! ```text
//! ProbeClient::send_probe
//!     → message.rs (build Binding Request, encode header + attributes)
//!     → UDP send_to
//!
//! UDP receive task
//!     → message.rs (parse header, walk attribute TLVs)
//!     → ProbeClient matches transaction ID
//! ```
//!
//! # Design Decisions
//! - Only the header is needed for correlation; attributes are kept raw
//! - MAPPED-ADDRESS and XOR-MAPPED-ADDRESS decoded on demand
//! - Anything that fails header validation is rejected with a typed error

pub mod message;

pub use message::{
    Attribute, MessageType, StunError, StunMessage, TransactionId, HEADER_SIZE, MAGIC_COOKIE,
};
