//! Stateless building blocks for the NetFlow wire format.
//!
//! This module is intended for applications that need fine control over
//! decoding. See [`crate::avec`] for decoders that carry template state across
//! packets.
//!
//! # Architecture
//!
//! Fixed-layout structures (packet headers, FlowSet headers, and version 5
//! flow entries) are plain `zerocopy` types, transmuted from byte arrays taken
//! from a [`Cursor`](cursor::Cursor). Nothing in this module allocates state
//! that outlives a call, and nothing panics on short input: every read returns
//! an [`EndOfSlice`](cursor::EndOfSlice) error instead.
//!
//! Variable-layout structures (templates and options templates) are read
//! record-by-record from a cursor bounded to their enclosing FlowSet.
//!
//! Field values are rendered to strings through the field-type catalogue in
//! the [`field`] module, which also hosts the [`Attributes`](field::Attributes)
//! trait used to turn fixed-layout structures into attribute lists.

pub mod cursor;
pub mod field;
pub mod header;
pub mod template;
