//! Fixed-layout packet, FlowSet, and flow entry headers.

use std::net::Ipv4Addr;

use tartan_bitfield::bitfield;
use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    network_endian::{U16, U32},
};

use super::{
    cursor::{Cursor, EndOfSlice},
    field::Attributes,
};

/// An error reading a header.
#[derive(Debug, Error)]
pub enum HeaderError {
    #[error(transparent)]
    EndOfSlice(#[from] EndOfSlice),
    /// The version field does not match the decoder.
    #[error("Expected version {expected}, found {found}.")]
    UnexpectedVersion { expected: u16, found: u16 },
}

/// Version 5 packet header (24 bytes).
#[repr(C)]
#[derive(
    Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Attributes,
)]
pub struct V5Header {
    #[attribute("version")]
    pub version: U16,
    #[attribute("count")]
    pub count: U16,
    #[attribute("sysUptime")]
    pub sys_uptime: U32,
    #[attribute("unixSecs")]
    pub unix_secs: U32,
    #[attribute("unixNsecs")]
    pub unix_nsecs: U32,
    #[attribute("flowSeq")]
    pub flow_sequence: U32,
    #[attribute("engineType")]
    pub engine_type: u8,
    #[attribute("engineId")]
    pub engine_id: u8,
    pub sampling: U16,
}

impl V5Header {
    pub const VERSION: u16 = 5;
    pub const SIZE: usize = 24;

    /// Read a header, checking its version.
    pub fn read(c: &mut Cursor) -> Result<Self, HeaderError> {
        let header: Self = zerocopy::transmute!(c.take::<{ V5Header::SIZE }>()?);

        match header.version.get() {
            Self::VERSION => Ok(header),
            found => Err(HeaderError::UnexpectedVersion {
                expected: Self::VERSION,
                found,
            }),
        }
    }

    /// Export time in milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        i64::from(self.unix_secs.get()) * 1000 + i64::from(self.unix_nsecs.get()) / 1_000_000
    }

    /// Split the sampling word into its mode and interval.
    pub fn sampling(&self) -> Sampling {
        bitfield! {
            struct SamplingWord(u16) {
                [0..14] interval: u16,
                [14..16] mode: u8,
            }
        }

        let word = SamplingWord(self.sampling.get());

        Sampling {
            mode: word.mode(),
            interval: word.interval(),
        }
    }
}

/// Version 5 sampling configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sampling {
    /// Two-bit sampling mode.
    pub mode: u8,
    /// Fourteen-bit sampling interval.
    pub interval: u16,
}

/// Version 5 flow entry (48 bytes).
#[repr(C)]
#[derive(
    Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Attributes,
)]
pub struct V5Flow {
    #[attribute("srcAddr", ipv4)]
    pub src_addr: [u8; 4],
    #[attribute("dstAddr", ipv4)]
    pub dst_addr: [u8; 4],
    #[attribute("nextHop", ipv4)]
    pub next_hop: [u8; 4],
    #[attribute("input")]
    pub input: U16,
    #[attribute("output")]
    pub output: U16,
    #[attribute("dPkts")]
    pub packets: U32,
    #[attribute("dOctets")]
    pub octets: U32,
    #[attribute("first")]
    pub first: U32,
    #[attribute("last")]
    pub last: U32,
    #[attribute("srcPort")]
    pub src_port: U16,
    #[attribute("dstPort")]
    pub dst_port: U16,
    pub _pad1: u8,
    #[attribute("tcpFlags")]
    pub tcp_flags: u8,
    #[attribute("proto")]
    pub protocol: u8,
    #[attribute("tos")]
    pub tos: u8,
    #[attribute("srcAS")]
    pub src_as: U16,
    #[attribute("dstAS")]
    pub dst_as: U16,
    #[attribute("srcMask")]
    pub src_mask: u8,
    #[attribute("dstMask")]
    pub dst_mask: u8,
    pub _pad2: U16,
}

impl V5Flow {
    pub const SIZE: usize = 48;

    pub fn read(c: &mut Cursor) -> Result<Self, EndOfSlice> {
        Ok(zerocopy::transmute!(c.take::<{ V5Flow::SIZE }>()?))
    }

    /// Uptime ticks between the first and last packet of the flow.
    ///
    /// The tick counters are 32 bits wide and wrap.
    pub fn duration(&self) -> u32 {
        self.last.get().wrapping_sub(self.first.get())
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.src_addr)
    }

    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.dst_addr)
    }
}

/// Version 9 packet header (20 bytes).
#[repr(C)]
#[derive(
    Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Attributes,
)]
pub struct V9Header {
    #[attribute("version")]
    pub version: U16,
    /// Upper bound on the number of FlowSets in the packet.
    pub count: U16,
    #[attribute("sys_uptime")]
    pub sys_uptime: U32,
    pub unix_secs: U32,
    #[attribute("package_sequence")]
    pub package_sequence: U32,
    #[attribute("source_id")]
    pub source_id: U32,
}

impl V9Header {
    pub const VERSION: u16 = 9;
    pub const SIZE: usize = 20;

    /// Read a header, checking its version.
    pub fn read(c: &mut Cursor) -> Result<Self, HeaderError> {
        let header: Self = zerocopy::transmute!(c.take::<{ V9Header::SIZE }>()?);

        match header.version.get() {
            Self::VERSION => Ok(header),
            found => Err(HeaderError::UnexpectedVersion {
                expected: Self::VERSION,
                found,
            }),
        }
    }

    /// Export time in milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        i64::from(self.unix_secs.get()) * 1000
    }
}

/// Version 9 FlowSet header (4 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct FlowSetHeader {
    pub id: U16,
    /// Length of the FlowSet in bytes, including this header.
    pub length: U16,
}

impl FlowSetHeader {
    pub const SIZE: usize = 4;

    pub fn read(c: &mut Cursor) -> Result<Self, EndOfSlice> {
        Ok(zerocopy::transmute!(c.take::<{ FlowSetHeader::SIZE }>()?))
    }

    pub fn kind(&self) -> FlowSetKind {
        match self.id.get() {
            0 => FlowSetKind::Template,
            1 => FlowSetKind::OptionsTemplate,
            id => FlowSetKind::Data(id),
        }
    }
}

/// The contents of a FlowSet, as given by its identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowSetKind {
    Template,
    OptionsTemplate,
    /// Data records laid out by the template with this identifier.
    Data(u16),
}
