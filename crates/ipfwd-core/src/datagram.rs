//! The IPv4 datagram as it flows through the forwarding pipeline.
//!
//! The header is modelled as plain fields; wire serialization and checksums
//! belong to the link/driver side. The header is always the fixed 20 bytes,
//! so the total length is derived from the payload instead of being stored.

use std::net::Ipv4Addr;

use crate::constants::{
    DEFAULT_TTL, FRAGMENT_UNIT, IPV4_HEADER_SIZE, MAX_FRAGMENT_OFFSET, MAX_PAYLOAD_SIZE,
};
use crate::error::DatagramError;
use crate::flags::FragmentFlags;
use crate::types::{DatagramId, FragmentKey};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    id: DatagramId,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub protocol: u8,
    pub ttl: u8,
    pub identification: u16,
    /// Offset of this fragment's payload, in 8-byte units.
    pub fragment_offset: u16,
    pub flags: FragmentFlags,
    pub payload: Vec<u8>,
}

impl Datagram {
    /// Create an unfragmented datagram with the default TTL.
    pub fn new(source: Ipv4Addr, destination: Ipv4Addr, protocol: u8, payload: Vec<u8>) -> Self {
        Self {
            id: DatagramId::default(),
            source,
            destination,
            protocol,
            ttl: DEFAULT_TTL,
            identification: 0,
            fragment_offset: 0,
            flags: FragmentFlags::default(),
            payload,
        }
    }

    /// Like [`Datagram::new`], rejecting payloads that cannot fit one datagram.
    pub fn try_new(
        source: Ipv4Addr,
        destination: Ipv4Addr,
        protocol: u8,
        payload: Vec<u8>,
    ) -> Result<Self, DatagramError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(DatagramError::PayloadTooLarge {
                max: MAX_PAYLOAD_SIZE,
                actual: payload.len(),
            });
        }
        Ok(Self::new(source, destination, protocol, payload))
    }

    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_identification(mut self, identification: u16) -> Self {
        self.identification = identification;
        self
    }

    pub fn with_flags(mut self, flags: FragmentFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_dont_fragment(mut self, dont_fragment: bool) -> Self {
        self.flags.dont_fragment = dont_fragment;
        self
    }

    /// Set the fragment offset from a byte offset, which must be 8-byte aligned.
    pub fn with_fragment_offset_bytes(mut self, offset: usize) -> Result<Self, DatagramError> {
        self.set_fragment_offset_bytes(offset)?;
        Ok(self)
    }

    pub fn id(&self) -> DatagramId {
        self.id
    }

    /// Assign the pipeline identity. Done by the engine on entry.
    pub fn set_id(&mut self, id: DatagramId) {
        self.id = id;
    }

    pub fn header_length(&self) -> usize {
        IPV4_HEADER_SIZE
    }

    /// Header plus payload length in bytes.
    pub fn total_length(&self) -> usize {
        IPV4_HEADER_SIZE + self.payload.len()
    }

    pub fn fragment_offset_bytes(&self) -> usize {
        usize::from(self.fragment_offset) * FRAGMENT_UNIT
    }

    pub fn set_fragment_offset_bytes(&mut self, offset: usize) -> Result<(), DatagramError> {
        let units = offset / FRAGMENT_UNIT;
        if offset % FRAGMENT_UNIT != 0 || units > usize::from(MAX_FRAGMENT_OFFSET) {
            return Err(DatagramError::OffsetOutOfRange(offset as u32));
        }
        self.fragment_offset = units as u16;
        Ok(())
    }

    /// Byte offset one past the last payload byte of this fragment.
    pub fn fragment_end_bytes(&self) -> usize {
        self.fragment_offset_bytes() + self.payload.len()
    }

    /// True when this datagram is a piece of a larger one.
    pub fn is_fragment(&self) -> bool {
        self.flags.more_fragments || self.fragment_offset != 0
    }

    pub fn fragment_key(&self) -> FragmentKey {
        FragmentKey {
            source: self.source,
            destination: self.destination,
            protocol: self.protocol,
            identification: self.identification,
        }
    }

    /// Copy every header field into a new datagram carrying `payload`.
    pub fn with_same_header(&self, payload: Vec<u8>) -> Self {
        Self {
            id: self.id,
            source: self.source,
            destination: self.destination,
            protocol: self.protocol,
            ttl: self.ttl,
            identification: self.identification,
            fragment_offset: self.fragment_offset,
            flags: self.flags,
            payload,
        }
    }
}
