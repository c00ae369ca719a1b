//! Decoders that carry template state across packets.
//!
//! Every packet is decoded through a [`DecoderFactory`], which owns the
//! template caches shared by all packets and all exporters. The factory is
//! `Sync`, so a single instance can serve any number of receiving threads.
//!
//! ```
//! let factory = DecoderFactory::new();
//!
//! let n = factory
//!     .new_decoder(&packet, source_ip)
//!     .decode_all(&mut |timestamp: i64, attributes: Vec<Attribute>, text: String| {
//!         batch.push(FlowRecord { timestamp, attributes, text })
//!     });
//! ```
//!
//! Closure sinks must type their parameters, since they cannot be inferred
//! through the [`RecordSink`] implementation.

use std::{net::IpAddr, sync::Arc};

use thiserror::Error;
use tracing::debug;

use crate::{
    Attribute, FlowRecord, RecordSink,
    sans::{
        cursor::{Cursor, EndOfSlice},
        header::{HeaderError, V5Header, V9Header},
    },
};

pub mod cache;
pub mod pending;
pub mod v5;
pub mod v9;

pub use cache::{CacheLimits, FlowsetTemplateCache, OptionsTemplateCache, TemplateKey};
pub use pending::{MissingTemplateCache, PendingFlowSet};
pub use v5::V5Decoder;
pub use v9::V9Decoder;

/// Errors ending the decode of a packet early.
///
/// These never escape [`Decoder::decode_all`], which reports them through
/// `tracing` and keeps the records decoded so far.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    EndOfSlice(#[from] EndOfSlice),
    #[error("Incorrect packet header: {0}")]
    Header(#[from] HeaderError),
    /// A FlowSet declares a length shorter than its own header.
    #[error("FlowSet {id} declares impossible length {length}.")]
    FlowSetLength { id: u16, length: u16 },
}

/// Creates packet decoders bound to a shared set of template caches.
#[derive(Debug, Clone, Default)]
pub struct DecoderFactory {
    templates: Arc<FlowsetTemplateCache>,
    options: Arc<OptionsTemplateCache>,
    missing: Arc<MissingTemplateCache>,
}

impl DecoderFactory {
    /// Create a factory with empty, unbounded caches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a factory with empty caches bounded by limits.
    pub fn with_limits(limits: CacheLimits) -> Self {
        Self::with_caches(
            Arc::new(FlowsetTemplateCache::with_limit(limits.max_templates)),
            Arc::new(OptionsTemplateCache::with_limit(limits.max_templates)),
            Arc::new(MissingTemplateCache::with_limit(limits.max_pending)),
        )
    }

    /// Create a factory over existing caches.
    pub fn with_caches(
        templates: Arc<FlowsetTemplateCache>,
        options: Arc<OptionsTemplateCache>,
        missing: Arc<MissingTemplateCache>,
    ) -> Self {
        Self {
            templates,
            options,
            missing,
        }
    }

    pub fn templates(&self) -> &Arc<FlowsetTemplateCache> {
        &self.templates
    }

    pub fn options(&self) -> &Arc<OptionsTemplateCache> {
        &self.options
    }

    pub fn missing(&self) -> &Arc<MissingTemplateCache> {
        &self.missing
    }

    /// Discard all state learned from, or held for, an exporter address.
    ///
    /// Returns the number of templates and pending FlowSets removed.
    pub fn purge_exporter(&self, source_ip: IpAddr) -> usize {
        self.templates.purge_exporter(source_ip)
            + self.options.purge_exporter(source_ip)
            + self.missing.purge_exporter(source_ip)
    }

    /// Create a decoder for a packet received from an exporter.
    ///
    /// The decoder is chosen by the version field at the start of the packet.
    pub fn new_decoder<'a>(&'a self, bytes: &'a [u8], source_ip: IpAddr) -> Decoder<'a> {
        match Cursor::new(bytes).peek_u16() {
            Some(V5Header::VERSION) => Decoder::V5(V5Decoder::new(bytes, source_ip)),
            Some(V9Header::VERSION) => Decoder::V9(V9Decoder::new(
                bytes,
                source_ip,
                &self.templates,
                &self.options,
                &self.missing,
            )),
            version => Decoder::Unsupported { version, source_ip },
        }
    }
}

/// A decoder for one packet.
#[derive(Debug)]
pub enum Decoder<'a> {
    V5(V5Decoder<'a>),
    V9(V9Decoder<'a>),
    /// A packet of another version, or too short to carry one. Yields no
    /// records.
    Unsupported {
        version: Option<u16>,
        source_ip: IpAddr,
    },
}

impl Decoder<'_> {
    /// The packet's version, if it has one.
    pub fn version(&self) -> Option<u16> {
        match self {
            Self::V5(_) => Some(V5Header::VERSION),
            Self::V9(_) => Some(V9Header::VERSION),
            Self::Unsupported { version, .. } => *version,
        }
    }

    /// Decode every record in the packet, publishing to a sink.
    ///
    /// Malformed input ends decoding early rather than failing. Returns the
    /// number of records published, including any replayed from FlowSets held
    /// for a missing template.
    pub fn decode_all(self, sink: &mut impl RecordSink) -> usize {
        match self {
            Self::V5(decoder) => decoder.decode_all(sink),
            Self::V9(decoder) => decoder.decode_all(sink),
            Self::Unsupported { version, source_ip } => {
                debug!(%source_ip, ?version, "Dropping packet of unsupported NetFlow version.");
                0
            }
        }
    }

    /// Decode every record in the packet into a vector.
    pub fn records(self) -> Vec<FlowRecord> {
        let mut records = Vec::new();

        self.decode_all(&mut |timestamp: i64, attributes: Vec<Attribute>, text: String| {
            records.push(FlowRecord {
                timestamp,
                attributes,
                text,
            })
        });

        records
    }
}
