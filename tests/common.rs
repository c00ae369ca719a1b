use std::{
    net::{IpAddr, Ipv4Addr},
    path::Path,
};

use csv::ReaderBuilder;
use netflow_decode::{Attribute, RecordSink, avec::DecoderFactory};

const EXPORTER: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));

#[test]
fn decode_v5_core_router() {
    decode_stream("fixtures/v5-core-router.bin");
}

#[test]
fn decode_v9_template_then_data() {
    decode_stream("fixtures/v9-template-then-data.bin");
}

#[test]
fn decode_v9_options_and_late_templates() {
    decode_stream("fixtures/v9-options-and-late-templates.bin");
}

/// Decode a file of packets, each preceded by its big-endian `u16` length,
/// through a single factory.
fn decode_stream(path: &str) {
    let data = std::fs::read(path).unwrap();
    let factory = DecoderFactory::new();
    let mut validator = Validator::new(path);

    let mut r = data.as_slice();
    let mut n = 0;

    while let Some((length, rest)) = r.split_first_chunk::<2>() {
        let (packet, rest) = rest.split_at(u16::from_be_bytes(*length) as usize);
        n += factory
            .new_decoder(packet, EXPORTER)
            .decode_all(&mut validator);
        r = rest;
    }

    assert_eq!(n, validator.1);
    validator.finish();
}

struct Validator(Vec<Vec<String>>, usize);

impl Validator {
    fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().with_extension("csv");

        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .has_headers(false)
            .from_path(path)
            .unwrap();

        let expected: Vec<Vec<String>> = reader
            .records()
            .map(|r| r.unwrap().iter().map(|f| f.to_string()).collect())
            .collect();

        Self(expected, 0)
    }

    fn finish(self) {
        assert!(
            self.0.is_empty(),
            "{} expected records not decoded",
            self.0.len()
        );
    }
}

impl RecordSink for Validator {
    fn add_record(&mut self, timestamp: i64, attributes: Vec<Attribute>, text: String) {
        assert!(!self.0.is_empty(), "unexpected record: {text}");
        let mut row = self.0.remove(0);
        self.1 += 1;

        assert_eq!(row.remove(0), timestamp.to_string());
        assert_eq!(row.remove(0), text);

        let pairs: Vec<_> = row
            .chunks(2)
            .map(|p| (p[0].as_str(), p[1].as_str()))
            .collect();
        let found: Vec<_> = attributes
            .iter()
            .map(|a| (a.name.as_ref(), a.value.as_str()))
            .collect();

        assert_eq!(found, pairs, "record {}", self.1);
    }
}
