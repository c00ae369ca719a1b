//! Decoded output handed to downstream collaborators.

use std::borrow::Cow;

/// A single named value within a flow record.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Attribute {
    pub name: Cow<'static, str>,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<Cow<'static, str>>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A decoded flow record.
///
/// Header attributes precede per-field attributes, and both keep the order in
/// which they appear on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FlowRecord {
    /// Export time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub attributes: Vec<Attribute>,
    pub text: String,
}

impl FlowRecord {
    /// Look up the value of the first attribute with a name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }
}

/// Receive decoded flow records.
///
/// Implemented for any closure taking the timestamp, attributes, and text of a
/// record.
pub trait RecordSink {
    /// Add a decoded record.
    fn add_record(&mut self, timestamp: i64, attributes: Vec<Attribute>, text: String);
}

impl<F> RecordSink for F
where
    F: FnMut(i64, Vec<Attribute>, String),
{
    fn add_record(&mut self, timestamp: i64, attributes: Vec<Attribute>, text: String) {
        self(timestamp, attributes, text)
    }
}
