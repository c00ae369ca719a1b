//! A defensive decoder for Cisco NetFlow version 5 and version 9 export
//! packets.
//!
//! Packets are decoded into flat [`FlowRecord`]s: a timestamp, an ordered list
//! of named [`Attribute`]s, and a short description. Version 9 template state
//! is shared across packets and exporters through caches owned by a
//! [`DecoderFactory`](avec::DecoderFactory).
//!
//! Most users should begin with the factory in the [`avec`] module. If finer
//! control over the wire format is needed, the stateless building blocks live
//! in the [`sans`] module.
//!
//! Decoding never fails outright. Malformed, truncated, or unsupported input
//! degrades to fewer records, with the reason reported through [`tracing`].
//!
//! ## Cargo Features
//!
//! The following crate feature flags are available:
//!
//! - `serde`: derive serialization for records and cache limits.

extern crate self as netflow_decode;

pub mod avec;
pub mod record;
pub mod sans;

pub use record::{Attribute, FlowRecord, RecordSink};
