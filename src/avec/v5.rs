//! Version 5 decoder.

use std::net::IpAddr;

use tracing::{trace, warn};

use crate::{
    Attribute, RecordSink,
    sans::{
        cursor::Cursor,
        field::Attributes,
        header::{V5Flow, V5Header},
    },
};

use super::Error;

/// Decodes a single version 5 packet.
///
/// Version 5 has a fixed layout and no templates, so no state is kept between
/// packets.
#[derive(Debug, Clone)]
pub struct V5Decoder<'a> {
    bytes: &'a [u8],
    source_ip: IpAddr,
}

impl<'a> V5Decoder<'a> {
    pub fn new(bytes: &'a [u8], source_ip: IpAddr) -> Self {
        Self { bytes, source_ip }
    }

    /// Decode every flow in the packet, publishing to a sink.
    ///
    /// A truncated packet yields the flows before the truncation. Returns the
    /// number of records published.
    pub fn decode_all(self, sink: &mut impl RecordSink) -> usize {
        let mut n = 0;

        if let Err(err) = self.decode_packet(sink, &mut n) {
            warn!(source_ip = %self.source_ip, %err, "Stopped decoding NetFlow v5 packet early.");
        }

        n
    }

    fn decode_packet(&self, sink: &mut impl RecordSink, n: &mut usize) -> Result<(), Error> {
        let mut c = Cursor::new(self.bytes);

        let header = V5Header::read(&mut c)?;
        let timestamp = header.timestamp();

        let mut context = header.attributes();
        context.push(Attribute::new(
            "samplingInterval",
            header.sampling().interval.to_string(),
        ));

        let count = header.count.get();
        trace!(source_ip = %self.source_ip, count, "Decoding NetFlow v5 packet.");

        for _ in 0..count {
            let flow = V5Flow::read(&mut c)?;

            let mut attributes = context.clone();
            flow.push_attributes(&mut attributes);
            attributes.push(Attribute::new("flowDuration", flow.duration().to_string()));

            let text = format!(
                "NetFlow v5 flow {}:{} -> {}:{} proto {}",
                flow.src_addr(),
                flow.src_port.get(),
                flow.dst_addr(),
                flow.dst_port.get(),
                flow.protocol,
            );

            sink.add_record(timestamp, attributes, text);
            *n += 1;
        }

        Ok(())
    }
}
