//! Version 9 decoder.

use std::{net::IpAddr, sync::Arc};

use either::{
    Either::{self, Left, Right},
    for_both,
};
use tracing::{debug, warn};

use crate::{
    Attribute, RecordSink,
    sans::{
        cursor::Cursor,
        field::Attributes,
        header::{FlowSetHeader, FlowSetKind, V9Header},
        template::{
            OptionsTemplate, Template, TemplateError, read_options_template, read_template,
        },
    },
};

use super::{
    Error,
    cache::{FlowsetTemplateCache, OptionsTemplateCache, TemplateKey},
    pending::{MissingTemplateCache, PendingFlowSet},
};

/// Text of records decoded with an ordinary template.
pub const DATA_TEXT: &str = "Data FlowSet";

/// A template or options template, as found in the caches.
pub type AnyTemplate = Either<Arc<Template>, Arc<OptionsTemplate>>;

/// Header-derived values shared by every record of a packet.
#[derive(Debug, Clone)]
pub struct ExportContext {
    pub timestamp: i64,
    pub attributes: Vec<Attribute>,
    pub source_id: u32,
}

impl ExportContext {
    pub fn new(header: &V9Header) -> Self {
        Self {
            timestamp: header.timestamp(),
            attributes: header.attributes(),
            source_id: header.source_id.get(),
        }
    }
}

/// Find the template for a key, preferring ordinary templates.
pub fn lookup(
    templates: &FlowsetTemplateCache,
    options: &OptionsTemplateCache,
    key: &TemplateKey,
) -> Option<AnyTemplate> {
    templates
        .get(key)
        .map(Left)
        .or_else(|| options.get(key).map(Right))
}

/// Decode the records of a Data FlowSet body, publishing them to a sink.
///
/// Trailing bytes too short for a whole record are padding. Returns the number
/// of records published.
pub fn decode_records(
    template: &AnyTemplate,
    r: &[u8],
    context: &ExportContext,
    sink: &mut impl RecordSink,
) -> usize {
    let record_length = for_both!(template, t => t.total_length());

    if record_length == 0 {
        warn!(
            source_id = context.source_id,
            "Template describes zero-length records; skipping Data FlowSet."
        );
        return 0;
    }

    let mut n = 0;

    for record in r.chunks_exact(record_length) {
        let mut attributes = context.attributes.clone();

        let text = match template {
            Left(template) => {
                template.render(record, &mut attributes);
                DATA_TEXT.to_string()
            }
            Right(template) => template.render(record, &mut attributes),
        };

        sink.add_record(context.timestamp, attributes, text);
        n += 1;
    }

    n
}

/// Decodes a single version 9 packet against shared template caches.
#[derive(Debug)]
pub struct V9Decoder<'a> {
    bytes: &'a [u8],
    source_ip: IpAddr,
    templates: &'a FlowsetTemplateCache,
    options: &'a OptionsTemplateCache,
    missing: &'a MissingTemplateCache,
}

impl<'a> V9Decoder<'a> {
    pub fn new(
        bytes: &'a [u8],
        source_ip: IpAddr,
        templates: &'a FlowsetTemplateCache,
        options: &'a OptionsTemplateCache,
        missing: &'a MissingTemplateCache,
    ) -> Self {
        Self {
            bytes,
            source_ip,
            templates,
            options,
            missing,
        }
    }

    /// Decode every record in the packet, then replay held FlowSets whose
    /// template is now known.
    ///
    /// Returns the number of records published, including replays.
    pub fn decode_all(self, sink: &mut impl RecordSink) -> usize {
        let mut n = 0;

        if let Err(err) = self.decode_packet(sink, &mut n) {
            warn!(source_ip = %self.source_ip, %err, "Stopped decoding NetFlow v9 packet early.");
        }

        n + self
            .missing
            .check_templates(self.templates, self.options, sink)
    }

    fn decode_packet(&self, sink: &mut impl RecordSink, n: &mut usize) -> Result<(), Error> {
        let mut c = Cursor::new(self.bytes);

        let header = V9Header::read(&mut c)?;
        let context = ExportContext::new(&header);

        // The header count bounds the number of FlowSets, not records.
        for _ in 0..header.count.get() {
            if c.remaining() == 0 {
                break;
            }

            let start = c.position();
            let flowset = FlowSetHeader::read(&mut c)?;
            let length = flowset.length.get() as usize;

            if length == 0 {
                debug!(source_ip = %self.source_ip, "Found zero-length FlowSet; ending packet.");
                break;
            }

            if length < FlowSetHeader::SIZE {
                Err(Error::FlowSetLength {
                    id: flowset.id.get(),
                    length: flowset.length.get(),
                })?;
            }

            let end = start + length;

            if end > c.len() {
                warn!(
                    source_ip = %self.source_ip,
                    flowset_id = flowset.id.get(),
                    declared = length,
                    available = c.len() - start,
                    "Truncating FlowSet to the end of the packet."
                );
            }

            let body = &self.bytes[c.position()..end.min(c.len())];

            match flowset.kind() {
                FlowSetKind::Template => self.read_templates(&header, body),
                FlowSetKind::OptionsTemplate => self.read_options_templates(&header, body),
                FlowSetKind::Data(id) => *n += self.decode_data(&header, &context, id, body, sink),
            }

            // Skip padding.
            c.seek(end);
        }

        Ok(())
    }

    fn read_templates(&self, header: &V9Header, body: &[u8]) {
        let mut c = Cursor::new(body);

        while c.remaining() >= 4 {
            match read_template(&mut c) {
                Ok((id, template)) => {
                    let key = TemplateKey::new(header.source_id.get(), id, self.source_ip);
                    if self.templates.insert(key, template) {
                        debug!(
                            source_ip = %self.source_ip,
                            source_id = key.source_id,
                            template_id = id,
                            "Learned template."
                        );
                    }
                }
                Err(TemplateError::ReservedId(id)) => {
                    warn!(
                        source_ip = %self.source_ip,
                        template_id = id,
                        "Ignoring template with reserved identifier."
                    );
                }
                Err(err) => {
                    warn!(source_ip = %self.source_ip, %err, "Truncated Template FlowSet.");
                    break;
                }
            }
        }
    }

    fn read_options_templates(&self, header: &V9Header, body: &[u8]) {
        let mut c = Cursor::new(body);

        while c.remaining() >= 6 {
            match read_options_template(&mut c) {
                Ok((id, template)) => {
                    let key = TemplateKey::new(header.source_id.get(), id, self.source_ip);
                    if self.options.insert(key, template) {
                        debug!(
                            source_ip = %self.source_ip,
                            source_id = key.source_id,
                            template_id = id,
                            "Learned options template."
                        );
                    }
                }
                Err(TemplateError::ReservedId(id)) => {
                    warn!(
                        source_ip = %self.source_ip,
                        template_id = id,
                        "Ignoring options template with reserved identifier."
                    );
                }
                Err(err) => {
                    warn!(source_ip = %self.source_ip, %err, "Truncated Options Template FlowSet.");
                    break;
                }
            }
        }
    }

    fn decode_data(
        &self,
        header: &V9Header,
        context: &ExportContext,
        id: u16,
        body: &[u8],
        sink: &mut impl RecordSink,
    ) -> usize {
        let key = TemplateKey::new(context.source_id, id, self.source_ip);

        match lookup(self.templates, self.options, &key) {
            Some(template) => decode_records(&template, body, context, sink),
            None => {
                debug!(
                    source_ip = %self.source_ip,
                    source_id = key.source_id,
                    template_id = id,
                    "Holding Data FlowSet until its template arrives."
                );

                self.missing.insert(
                    key,
                    PendingFlowSet {
                        header: *header,
                        bytes: body.to_vec(),
                    },
                );

                0
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::FlowRecord;

    const EXPORTER: IpAddr = IpAddr::V4(Ipv4Addr::new(198, 51, 100, 7));

    /// Assembles a version 9 packet FlowSet-by-FlowSet.
    struct Packet(Vec<u8>, u16);

    impl Packet {
        fn new() -> Self {
            let mut r = vec![0, 9, 0, 0];
            r.extend_from_slice(&1_000u32.to_be_bytes()); // sys_uptime
            r.extend_from_slice(&1_700_000_000u32.to_be_bytes()); // unix_secs
            r.extend_from_slice(&5u32.to_be_bytes()); // package_sequence
            r.extend_from_slice(&42u32.to_be_bytes()); // source_id
            Self(r, 0)
        }

        fn flowset(mut self, id: u16, body: &[u8]) -> Self {
            let length = body.len() as u16 + 4;
            self.0.extend_from_slice(&id.to_be_bytes());
            self.0.extend_from_slice(&length.to_be_bytes());
            self.0.extend_from_slice(body);
            self.1 += 1;
            self
        }

        fn raw(mut self, r: &[u8]) -> Self {
            self.0.extend_from_slice(r);
            self.1 += 1;
            self
        }

        fn build(mut self) -> Vec<u8> {
            self.0[2..4].copy_from_slice(&self.1.to_be_bytes());
            self.0
        }
    }

    #[derive(Default)]
    struct Caches {
        templates: FlowsetTemplateCache,
        options: OptionsTemplateCache,
        missing: MissingTemplateCache,
    }

    impl Caches {
        fn decode(&self, r: &[u8]) -> Vec<FlowRecord> {
            let mut records = Vec::new();
            let decoder = V9Decoder::new(
                r,
                EXPORTER,
                &self.templates,
                &self.options,
                &self.missing,
            );

            let n = decoder.decode_all(
                &mut |timestamp: i64, attributes: Vec<Attribute>, text: String| {
                    records.push(FlowRecord {
                        timestamp,
                        attributes,
                        text,
                    })
                },
            );

            assert_eq!(n, records.len());
            records
        }
    }

    // Template 256: PROTOCOL/1, L4_SRC_PORT/2, OUT_BYTES/4.
    const TEMPLATE_256: [u8; 16] = [
        0x01, 0x00, 0x00, 0x03, 0x00, 0x04, 0x00, 0x01, 0x00, 0x07, 0x00, 0x02, 0x00, 0x17, 0x00,
        0x04,
    ];

    const DATA_256: [u8; 16] = [
        6, 0x00, 0x50, 0x00, 0x00, 0x05, 0xDC, // TCP, port 80, 1500 bytes
        17, 0x00, 0x35, 0x00, 0x00, 0x00, 0x40, // UDP, port 53, 64 bytes
        0x00, 0x00, // padding
    ];

    fn pairs(record: &FlowRecord) -> Vec<(&str, &str)> {
        record
            .attributes
            .iter()
            .map(|a| (a.name.as_ref(), a.value.as_str()))
            .collect()
    }

    #[test]
    fn template_before_data() {
        let caches = Caches::default();
        let packet = Packet::new()
            .flowset(0, &TEMPLATE_256)
            .flowset(256, &DATA_256)
            .build();

        let records = caches.decode(&packet);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].timestamp, 1_700_000_000_000);
        assert_eq!(records[0].text, DATA_TEXT);
        assert_eq!(
            pairs(&records[0]),
            [
                ("version", "9"),
                ("sys_uptime", "1000"),
                ("package_sequence", "5"),
                ("source_id", "42"),
                ("PROTOCOL", "6"),
                ("L4_SRC_PORT", "80"),
                ("OUT_BYTES", "1500"),
            ]
        );
        assert_eq!(
            pairs(&records[1])[4..],
            [
                ("PROTOCOL", "17"),
                ("L4_SRC_PORT", "53"),
                ("OUT_BYTES", "64"),
            ]
        );
    }

    #[test]
    fn data_without_template_is_held() {
        let caches = Caches::default();
        let data = Packet::new().flowset(256, &DATA_256).build();

        assert!(caches.decode(&data).is_empty());
        assert!(caches.decode(&data).is_empty());
        assert_eq!(caches.missing.len(), 2);
    }

    #[test]
    fn held_data_replays_when_template_arrives() {
        let caches = Caches::default();

        let data = Packet::new().flowset(256, &DATA_256).build();
        assert!(caches.decode(&data).is_empty());

        let template = Packet::new().flowset(0, &TEMPLATE_256).build();
        let records = caches.decode(&template);

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("L4_SRC_PORT"), Some("53"));
        assert!(caches.missing.is_empty());
    }

    #[test]
    fn data_before_template_in_one_packet() {
        let caches = Caches::default();
        let packet = Packet::new()
            .flowset(256, &DATA_256)
            .flowset(0, &TEMPLATE_256)
            .build();

        assert_eq!(caches.decode(&packet).len(), 2);
    }

    #[test]
    fn templates_are_scoped_to_exporter() {
        let caches = Caches::default();
        caches.decode(&Packet::new().flowset(0, &TEMPLATE_256).build());

        let mut other = Packet::new().flowset(256, &DATA_256).build();
        other[16..20].copy_from_slice(&43u32.to_be_bytes());

        assert!(caches.decode(&other).is_empty());
        assert_eq!(caches.missing.pending_keys()[0].source_id, 43);
    }

    #[test]
    fn options_data_describes_scope() {
        let caches = Caches::default();
        let options = [
            0x01, 0x02, // id 258
            0x00, 0x04, // scope: one field
            0x00, 0x04, // options: one field
            0x00, 0x01, 0x00, 0x04, // System, 4 bytes
            0x00, 0x22, 0x00, 0x02, // SAMPLING_INTERVAL, 2 bytes
            0x00, 0x00, // padding
        ];
        let data = [0, 0, 0, 1, 0x00, 0x64, 0, 0];

        let packet = Packet::new()
            .flowset(1, &options)
            .flowset(258, &data)
            .build();
        let records = caches.decode(&packet);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "Options record for System 1");
        assert_eq!(records[0].attributes.len(), 5);
        assert_eq!(records[0].get("SAMPLING_INTERVAL"), Some("100"));
    }

    #[test]
    fn multiple_templates_in_one_flowset() {
        let caches = Caches::default();
        let mut body = TEMPLATE_256.to_vec();
        body.extend_from_slice(&[0x01, 0x01, 0x00, 0x01, 0x00, 0x08, 0x00, 0x04]);

        caches.decode(&Packet::new().flowset(0, &body).build());

        assert_eq!(caches.templates.len(), 2);
        let records = caches.decode(&Packet::new().flowset(257, &[0xA0, 0, 0, 0x20]).build());
        assert_eq!(records[0].get("IPV4_SRC_ADDR"), Some("160.0.0.32"));
    }

    #[test]
    fn unknown_field_types_use_numeric_names() {
        let caches = Caches::default();
        let template = [0x01, 0x00, 0x00, 0x01, 0x01, 0xF4, 0x00, 0x02];

        let packet = Packet::new()
            .flowset(0, &template)
            .flowset(256, &[0x00, 0x63])
            .build();
        let records = caches.decode(&packet);

        assert_eq!(records[0].get("500"), Some("99"));
    }

    #[test]
    fn zero_length_flowset_ends_packet() {
        let caches = Caches::default();
        let packet = Packet::new()
            .flowset(0, &TEMPLATE_256)
            .raw(&[0x01, 0x00, 0x00, 0x00])
            .flowset(256, &DATA_256)
            .build();

        assert!(caches.decode(&packet).is_empty());
        assert!(caches.missing.is_empty());
    }

    #[test]
    fn short_flowset_length_abandons_packet() {
        let caches = Caches::default();
        let packet = Packet::new()
            .raw(&[0x01, 0x00, 0x00, 0x02])
            .flowset(0, &TEMPLATE_256)
            .build();

        assert!(caches.decode(&packet).is_empty());
        assert!(caches.templates.is_empty());
    }

    #[test]
    fn overlong_flowset_is_truncated() {
        let caches = Caches::default();
        caches.decode(&Packet::new().flowset(0, &TEMPLATE_256).build());

        // Declares 100 bytes, carries one and a half records.
        let packet = Packet::new()
            .raw(&[0x01, 0x00, 0x00, 100])
            .raw(&DATA_256[..10])
            .build();

        assert_eq!(caches.decode(&packet).len(), 1);
    }

    #[test]
    fn header_count_bounds_flowsets() {
        let caches = Caches::default();
        let mut packet = Packet::new()
            .flowset(0, &TEMPLATE_256)
            .flowset(256, &DATA_256)
            .build();
        packet[2..4].copy_from_slice(&1u16.to_be_bytes());

        assert!(caches.decode(&packet).is_empty());
        assert_eq!(caches.templates.len(), 1);
    }

    #[test]
    fn zero_length_template_yields_no_records() {
        let caches = Caches::default();
        let template = [0x01, 0x00, 0x00, 0x01, 0x00, 0x04, 0x00, 0x00];

        let packet = Packet::new()
            .flowset(0, &template)
            .flowset(256, &DATA_256)
            .build();

        assert!(caches.decode(&packet).is_empty());
        assert!(caches.missing.is_empty());
    }

    #[test]
    fn truncated_header_yields_nothing() {
        let caches = Caches::default();
        let packet = Packet::new().build();

        assert!(caches.decode(&packet[..12]).is_empty());
    }
}
