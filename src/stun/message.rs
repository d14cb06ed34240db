//! STUN message encoding and decoding (RFC 5389 header and attribute layout).

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use thiserror::Error;

/// Fixed magic cookie carried in every RFC 5389 header.
pub const MAGIC_COOKIE: u32 = 0x2112_A442;

/// Size of the fixed message header in bytes.
pub const HEADER_SIZE: usize = 20;

/// MAPPED-ADDRESS attribute type.
pub const ATTR_MAPPED_ADDRESS: u16 = 0x0001;

/// XOR-MAPPED-ADDRESS attribute type.
pub const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;

const FAMILY_IPV4: u8 = 0x01;
const FAMILY_IPV6: u8 = 0x02;

/// Errors raised while decoding a datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StunError {
    /// Fewer bytes than a STUN header.
    #[error("message too short: {0} bytes")]
    TooShort(usize),

    /// The two most significant bits of the type field must be zero.
    #[error("not a STUN message: type field 0x{0:04x}")]
    NotStun(u16),

    /// Magic cookie mismatch.
    #[error("invalid magic cookie 0x{0:08x}")]
    BadCookie(u32),

    /// Length field disagrees with the datagram size or is not 4-byte aligned.
    #[error("length field {declared} does not match {actual} attribute bytes")]
    LengthMismatch { declared: usize, actual: usize },

    /// An attribute header or value runs past the end of the message.
    #[error("attribute 0x{0:04x} is truncated")]
    TruncatedAttribute(u16),
}

/// 96-bit transaction identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId([u8; 12]);

impl TransactionId {
    /// Generate a random transaction ID.
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId({})", self)
    }
}

/// STUN message type (method + class).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    BindingRequest,
    BindingSuccess,
    BindingError,
    Other(u16),
}

impl MessageType {
    pub fn as_u16(self) -> u16 {
        match self {
            MessageType::BindingRequest => 0x0001,
            MessageType::BindingSuccess => 0x0101,
            MessageType::BindingError => 0x0111,
            MessageType::Other(v) => v,
        }
    }

    /// True for success and error responses, i.e. anything that answers a request.
    pub fn is_response(self) -> bool {
        // Class bits live at 0x0100 (C1) and 0x0010 (C0); responses have C1 set.
        self.as_u16() & 0x0100 != 0
    }
}

impl From<u16> for MessageType {
    fn from(val: u16) -> Self {
        match val {
            0x0001 => MessageType::BindingRequest,
            0x0101 => MessageType::BindingSuccess,
            0x0111 => MessageType::BindingError,
            other => MessageType::Other(other),
        }
    }
}

/// A raw attribute TLV. Value excludes padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub kind: u16,
    pub value: Vec<u8>,
}

/// A decoded STUN message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StunMessage {
    pub message_type: MessageType,
    pub transaction_id: TransactionId,
    pub attributes: Vec<Attribute>,
}

impl StunMessage {
    /// A Binding Request with a fresh random transaction ID.
    pub fn binding_request() -> Self {
        Self::binding_request_with_id(TransactionId::random())
    }

    pub fn binding_request_with_id(transaction_id: TransactionId) -> Self {
        Self {
            message_type: MessageType::BindingRequest,
            transaction_id,
            attributes: Vec::new(),
        }
    }

    /// A Binding Success response reporting `mapped` as XOR-MAPPED-ADDRESS.
    pub fn binding_success(transaction_id: TransactionId, mapped: SocketAddr) -> Self {
        Self {
            message_type: MessageType::BindingSuccess,
            transaction_id,
            attributes: vec![Attribute {
                kind: ATTR_XOR_MAPPED_ADDRESS,
                value: encode_address(mapped, Some(&transaction_id)),
            }],
        }
    }

    /// Decode a datagram.
    pub fn parse(data: &[u8]) -> Result<Self, StunError> {
        if data.len() < HEADER_SIZE {
            return Err(StunError::TooShort(data.len()));
        }

        let raw_type = u16::from_be_bytes([data[0], data[1]]);
        if raw_type & 0xC000 != 0 {
            return Err(StunError::NotStun(raw_type));
        }

        let length = u16::from_be_bytes([data[2], data[3]]) as usize;
        let cookie = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if cookie != MAGIC_COOKIE {
            return Err(StunError::BadCookie(cookie));
        }

        let body = &data[HEADER_SIZE..];
        if length % 4 != 0 || body.len() != length {
            return Err(StunError::LengthMismatch {
                declared: length,
                actual: body.len(),
            });
        }

        let mut tid = [0u8; 12];
        tid.copy_from_slice(&data[8..HEADER_SIZE]);

        Ok(Self {
            message_type: MessageType::from(raw_type),
            transaction_id: TransactionId(tid),
            attributes: parse_attributes(body)?,
        })
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let body_len: usize = self
            .attributes
            .iter()
            .map(|a| 4 + padded_len(a.value.len()))
            .sum();

        let mut out = Vec::with_capacity(HEADER_SIZE + body_len);
        out.extend_from_slice(&self.message_type.as_u16().to_be_bytes());
        out.extend_from_slice(&(body_len as u16).to_be_bytes());
        out.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        out.extend_from_slice(&self.transaction_id.0);

        for attr in &self.attributes {
            out.extend_from_slice(&attr.kind.to_be_bytes());
            out.extend_from_slice(&(attr.value.len() as u16).to_be_bytes());
            out.extend_from_slice(&attr.value);
            out.resize(out.len() + padded_len(attr.value.len()) - attr.value.len(), 0);
        }
        out
    }

    /// First attribute of the given type.
    pub fn attribute(&self, kind: u16) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.kind == kind)
    }

    /// Reflexive address reported by the server, preferring XOR-MAPPED-ADDRESS.
    pub fn mapped_address(&self) -> Option<SocketAddr> {
        if let Some(attr) = self.attribute(ATTR_XOR_MAPPED_ADDRESS) {
            return decode_address(&attr.value, Some(&self.transaction_id));
        }
        self.attribute(ATTR_MAPPED_ADDRESS)
            .and_then(|attr| decode_address(&attr.value, None))
    }
}

fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

fn parse_attributes(mut body: &[u8]) -> Result<Vec<Attribute>, StunError> {
    let mut attributes = Vec::new();
    while !body.is_empty() {
        if body.len() < 4 {
            return Err(StunError::TruncatedAttribute(0));
        }
        let kind = u16::from_be_bytes([body[0], body[1]]);
        let len = u16::from_be_bytes([body[2], body[3]]) as usize;
        let padded = padded_len(len);
        if body.len() < 4 + padded {
            return Err(StunError::TruncatedAttribute(kind));
        }
        attributes.push(Attribute {
            kind,
            value: body[4..4 + len].to_vec(),
        });
        body = &body[4 + padded..];
    }
    Ok(attributes)
}

/// Encode an address attribute value. With `xor` set, applies the XOR-MAPPED-ADDRESS mask.
fn encode_address(addr: SocketAddr, xor: Option<&TransactionId>) -> Vec<u8> {
    let mask = xor_mask(xor);
    let port_mask = if xor.is_some() { (MAGIC_COOKIE >> 16) as u16 } else { 0 };

    let mut out = vec![0u8];
    match addr.ip() {
        IpAddr::V4(ip) => {
            out.push(FAMILY_IPV4);
            out.extend_from_slice(&(addr.port() ^ port_mask).to_be_bytes());
            out.extend(ip.octets().iter().zip(mask.iter()).map(|(b, m)| b ^ m));
        }
        IpAddr::V6(ip) => {
            out.push(FAMILY_IPV6);
            out.extend_from_slice(&(addr.port() ^ port_mask).to_be_bytes());
            out.extend(ip.octets().iter().zip(mask.iter()).map(|(b, m)| b ^ m));
        }
    }
    out
}

fn decode_address(value: &[u8], xor: Option<&TransactionId>) -> Option<SocketAddr> {
    if value.len() < 4 {
        return None;
    }
    let mask = xor_mask(xor);
    let port_mask = if xor.is_some() { (MAGIC_COOKIE >> 16) as u16 } else { 0 };
    let port = u16::from_be_bytes([value[2], value[3]]) ^ port_mask;

    match value[1] {
        FAMILY_IPV4 if value.len() >= 8 => {
            let mut octets = [0u8; 4];
            for (i, o) in octets.iter_mut().enumerate() {
                *o = value[4 + i] ^ mask[i];
            }
            Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::from(octets)), port))
        }
        FAMILY_IPV6 if value.len() >= 20 => {
            let mut octets = [0u8; 16];
            for (i, o) in octets.iter_mut().enumerate() {
                *o = value[4 + i] ^ mask[i];
            }
            Some(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port))
        }
        _ => None,
    }
}

/// Cookie followed by transaction ID; all zero when not XOR-ing.
fn xor_mask(xor: Option<&TransactionId>) -> [u8; 16] {
    let mut mask = [0u8; 16];
    if let Some(tid) = xor {
        mask[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
        mask[4..].copy_from_slice(&tid.0);
    }
    mask
}
