//! Field-type catalogue and value rendering.

use std::{
    borrow::Cow,
    fmt,
    net::{Ipv4Addr, Ipv6Addr},
};

use zerocopy::{Immutable, IntoBytes};

use crate::Attribute;

/// Derive [`Attributes`] for a fixed-layout wire structure.
///
/// Add the `attribute("name")` attribute to each field that should appear in
/// the attribute list, optionally followed by a renderer: `unsigned` (the
/// default), `ipv4`, `ipv6`, `mac`, or `string`. Fields are rendered from their
/// big-endian byte representation, so they must implement
/// [`zerocopy::IntoBytes`] and [`zerocopy::Immutable`]. Fields without the
/// attribute are skipped.
///
/// ```
/// #[repr(C)]
/// #[derive(FromBytes, IntoBytes, Immutable, Unaligned, Attributes)]
/// struct Endpoint {
///     #[attribute("address", ipv4)]
///     address: [u8; 4],
///     #[attribute("port")]
///     port: U16,
///     _pad: [u8; 2],
/// }
/// ```
pub use netflow_decode_derive::Attributes;

/// Produce an ordered attribute list.
///
/// See the [`Attributes`](macro@Attributes) derive macro for an automatic
/// implementation of this trait.
pub trait Attributes {
    /// Append attributes, in order, to a list.
    fn push_attributes(&self, out: &mut Vec<Attribute>);

    /// Collect attributes into a new list.
    fn attributes(&self) -> Vec<Attribute> {
        let mut out = Vec::new();
        self.push_attributes(&mut out);
        out
    }
}

/// How a field's raw bytes are turned into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Render {
    /// Big-endian unsigned integer, in decimal.
    Unsigned,
    /// Dotted-quad IPv4 address.
    Ipv4,
    /// Eight colon-separated hexadecimal groups.
    Ipv6,
    /// Colon-separated hexadecimal octets.
    Mac,
    /// Fixed-length text, with trailing NULs removed.
    String,
}

impl Render {
    pub fn render(self, r: &[u8]) -> String {
        match self {
            Self::Unsigned => unsigned(r).to_string(),
            Self::Ipv4 => match <[u8; 4]>::try_from(r) {
                Ok(octets) => Ipv4Addr::from(octets).to_string(),
                Err(_) => unsigned(r).to_string(),
            },
            Self::Ipv6 => match <[u8; 16]>::try_from(r) {
                Ok(octets) => {
                    let segments = Ipv6Addr::from(octets).segments().map(|s| format!("{s:x}"));
                    segments.join(":")
                }
                Err(_) => unsigned(r).to_string(),
            },
            Self::Mac => r
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(":"),
            Self::String => String::from_utf8_lossy(r)
                .trim_end_matches('\0')
                .to_string(),
        }
    }
}

/// Accumulate big-endian bytes, keeping the low 64 bits.
fn unsigned(r: &[u8]) -> u64 {
    r.iter().fold(0, |acc, b| (acc << 8) | u64::from(*b))
}

/// Render a fixed-layout field from its in-memory (wire) bytes.
pub fn render_wire<T: IntoBytes + Immutable + ?Sized>(render: Render, value: &T) -> String {
    render.render(value.as_bytes())
}

/// A catalogued field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldType {
    pub name: &'static str,
    pub render: Render,
}

impl FieldType {
    const fn new(name: &'static str, render: Render) -> Self {
        Self { name, render }
    }

    /// Look up a field-type code in the catalogue.
    pub fn lookup(code: u16) -> Option<Self> {
        CATALOGUE.get(code as usize).copied().flatten()
    }
}

/// The attribute name used for a field-type code.
///
/// Codes outside the catalogue are named by their number.
pub fn field_name(code: u16) -> Cow<'static, str> {
    match FieldType::lookup(code) {
        Some(t) => Cow::Borrowed(t.name),
        None => Cow::Owned(code.to_string()),
    }
}

/// Render a field as an attribute, according to its type code.
pub fn render_field(code: u16, r: &[u8]) -> Attribute {
    let render = FieldType::lookup(code).map_or(Render::Unsigned, |t| t.render);
    Attribute::new(field_name(code), render.render(r))
}

const CATALOGUE_LEN: usize = 105;

static CATALOGUE: [Option<FieldType>; CATALOGUE_LEN] = catalogue();

const fn catalogue() -> [Option<FieldType>; CATALOGUE_LEN] {
    use Render::*;

    let mut t = [None; CATALOGUE_LEN];

    t[1] = Some(FieldType::new("IN_BYTES", Unsigned));
    t[2] = Some(FieldType::new("IN_PKTS", Unsigned));
    t[3] = Some(FieldType::new("FLOWS", Unsigned));
    t[4] = Some(FieldType::new("PROTOCOL", Unsigned));
    t[5] = Some(FieldType::new("SRC_TOS", Unsigned));
    t[6] = Some(FieldType::new("TCP_FLAGS", Unsigned));
    t[7] = Some(FieldType::new("L4_SRC_PORT", Unsigned));
    t[8] = Some(FieldType::new("IPV4_SRC_ADDR", Ipv4));
    t[9] = Some(FieldType::new("SRC_MASK", Unsigned));
    t[10] = Some(FieldType::new("INPUT_SNMP", Unsigned));
    t[11] = Some(FieldType::new("L4_DST_PORT", Unsigned));
    t[12] = Some(FieldType::new("IPV4_DST_ADDR", Ipv4));
    t[13] = Some(FieldType::new("DST_MASK", Unsigned));
    t[14] = Some(FieldType::new("OUTPUT_SNMP", Unsigned));
    t[15] = Some(FieldType::new("IPV4_NEXT_HOP", Ipv4));
    t[16] = Some(FieldType::new("SRC_AS", Unsigned));
    t[17] = Some(FieldType::new("DST_AS", Unsigned));
    t[18] = Some(FieldType::new("BGP_IPV4_NEXT_HOP", Ipv4));
    t[19] = Some(FieldType::new("MUL_DST_PKTS", Unsigned));
    t[20] = Some(FieldType::new("MUL_DST_BYTES", Unsigned));
    t[21] = Some(FieldType::new("LAST_SWITCHED", Unsigned));
    t[22] = Some(FieldType::new("FIRST_SWITCHED", Unsigned));
    t[23] = Some(FieldType::new("OUT_BYTES", Unsigned));
    t[24] = Some(FieldType::new("OUT_PKTS", Unsigned));
    t[25] = Some(FieldType::new("MIN_PKT_LNGTH", Unsigned));
    t[26] = Some(FieldType::new("MAX_PKT_LNGTH", Unsigned));
    t[27] = Some(FieldType::new("IPV6_SRC_ADDR", Ipv6));
    t[28] = Some(FieldType::new("IPV6_DST_ADDR", Ipv6));
    t[29] = Some(FieldType::new("IPV6_SRC_MASK", Unsigned));
    t[30] = Some(FieldType::new("IPV6_DST_MASK", Unsigned));
    t[31] = Some(FieldType::new("IPV6_FLOW_LABEL", Unsigned));
    t[32] = Some(FieldType::new("ICMP_TYPE", Unsigned));
    t[33] = Some(FieldType::new("MUL_IGMP_TYPE", Unsigned));
    t[34] = Some(FieldType::new("SAMPLING_INTERVAL", Unsigned));
    t[35] = Some(FieldType::new("SAMPLING_ALGORITHM", Unsigned));
    t[36] = Some(FieldType::new("FLOW_ACTIVE_TIMEOUT", Unsigned));
    t[37] = Some(FieldType::new("FLOW_INACTIVE_TIMEOUT", Unsigned));
    t[38] = Some(FieldType::new("ENGINE_TYPE", Unsigned));
    t[39] = Some(FieldType::new("ENGINE_ID", Unsigned));
    t[40] = Some(FieldType::new("TOTAL_BYTES_EXP", Unsigned));
    t[41] = Some(FieldType::new("TOTAL_PKTS_EXP", Unsigned));
    t[42] = Some(FieldType::new("TOTAL_FLOWS_EXP", Unsigned));
    t[44] = Some(FieldType::new("IPV4_SRC_PREFIX", Ipv4));
    t[45] = Some(FieldType::new("IPV4_DST_PREFIX", Ipv4));
    t[46] = Some(FieldType::new("MPLS_TOP_LABEL_TYPE", Unsigned));
    t[47] = Some(FieldType::new("MPLS_TOP_LABEL_IP_ADDR", Ipv4));
    t[48] = Some(FieldType::new("FLOW_SAMPLER_ID", Unsigned));
    t[49] = Some(FieldType::new("FLOW_SAMPLER_MODE", Unsigned));
    t[50] = Some(FieldType::new("FLOW_SAMPLER_RANDOM_INTERVAL", Unsigned));
    t[52] = Some(FieldType::new("MIN_TTL", Unsigned));
    t[53] = Some(FieldType::new("MAX_TTL", Unsigned));
    t[54] = Some(FieldType::new("IPV4_IDENT", Unsigned));
    t[55] = Some(FieldType::new("DST_TOS", Unsigned));
    t[56] = Some(FieldType::new("IN_SRC_MAC", Mac));
    t[57] = Some(FieldType::new("OUT_DST_MAC", Mac));
    t[58] = Some(FieldType::new("SRC_VLAN", Unsigned));
    t[59] = Some(FieldType::new("DST_VLAN", Unsigned));
    t[60] = Some(FieldType::new("IP_PROTOCOL_VERSION", Unsigned));
    t[61] = Some(FieldType::new("DIRECTION", Unsigned));
    t[62] = Some(FieldType::new("IPV6_NEXT_HOP", Ipv6));
    t[63] = Some(FieldType::new("BGP_IPV6_NEXT_HOP", Ipv6));
    t[64] = Some(FieldType::new("IPV6_OPTION_HEADERS", Unsigned));
    t[70] = Some(FieldType::new("MPLS_LABEL_1", Unsigned));
    t[71] = Some(FieldType::new("MPLS_LABEL_2", Unsigned));
    t[72] = Some(FieldType::new("MPLS_LABEL_3", Unsigned));
    t[73] = Some(FieldType::new("MPLS_LABEL_4", Unsigned));
    t[74] = Some(FieldType::new("MPLS_LABEL_5", Unsigned));
    t[75] = Some(FieldType::new("MPLS_LABEL_6", Unsigned));
    t[76] = Some(FieldType::new("MPLS_LABEL_7", Unsigned));
    t[77] = Some(FieldType::new("MPLS_LABEL_8", Unsigned));
    t[78] = Some(FieldType::new("MPLS_LABEL_9", Unsigned));
    t[79] = Some(FieldType::new("MPLS_LABEL_10", Unsigned));
    t[80] = Some(FieldType::new("IN_DST_MAC", Mac));
    t[81] = Some(FieldType::new("OUT_SRC_MAC", Mac));
    t[82] = Some(FieldType::new("IF_NAME", String));
    t[83] = Some(FieldType::new("IF_DESC", String));
    t[84] = Some(FieldType::new("SAMPLER_NAME", String));
    t[85] = Some(FieldType::new("IN_PERMANENT_BYTES", Unsigned));
    t[86] = Some(FieldType::new("IN_PERMANENT_PKTS", Unsigned));
    t[88] = Some(FieldType::new("FRAGMENT_OFFSET", Unsigned));
    t[89] = Some(FieldType::new("FORWARDING_STATUS", Unsigned));
    t[90] = Some(FieldType::new("MPLS_PAL_RD", Unsigned));
    t[91] = Some(FieldType::new("MPLS_PREFIX_LEN", Unsigned));
    t[92] = Some(FieldType::new("SRC_TRAFFIC_INDEX", Unsigned));
    t[93] = Some(FieldType::new("DST_TRAFFIC_INDEX", Unsigned));
    t[94] = Some(FieldType::new("APPLICATION_DESCRIPTION", String));
    t[95] = Some(FieldType::new("APPLICATION_TAG", Unsigned));
    t[96] = Some(FieldType::new("APPLICATION_NAME", String));
    t[98] = Some(FieldType::new("POST_IP_DIFF_SERV_CODE_POINT", Unsigned));
    t[99] = Some(FieldType::new("REPLICATION_FACTOR", Unsigned));
    t[102] = Some(FieldType::new("LAYER2_PACKET_SECTION_OFFSET", Unsigned));
    t[103] = Some(FieldType::new("LAYER2_PACKET_SECTION_SIZE", Unsigned));
    t[104] = Some(FieldType::new("LAYER2_PACKET_SECTION_DATA", Unsigned));

    t
}

/// What an options record pertains to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeType {
    System,
    Interface,
    LineCard,
    Cache,
    Template,
    Unknown(u16),
}

impl From<u16> for ScopeType {
    fn from(code: u16) -> Self {
        match code {
            1 => Self::System,
            2 => Self::Interface,
            3 => Self::LineCard,
            4 => Self::Cache,
            5 => Self::Template,
            _ => Self::Unknown(code),
        }
    }
}

impl fmt::Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("System"),
            Self::Interface => f.write_str("Interface"),
            Self::LineCard => f.write_str("Line Card"),
            Self::Cache => f.write_str("Cache"),
            Self::Template => f.write_str("Template"),
            Self::Unknown(code) => write!(f, "Unknown({code})"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn renders_addresses() {
        assert_eq!(
            render_field(8, &[0xA0, 0x00, 0x00, 0x20]).value,
            "160.0.0.32"
        );

        let r: Vec<u8> = (0..16).collect();
        let a = render_field(62, &r);
        assert_eq!(a.name, "IPV6_NEXT_HOP");
        assert_eq!(a.value, "1:203:405:607:809:a0b:c0d:e0f");

        let a = render_field(56, &[0x0a, 0x0b, 0x0c, 0x0d, 0x12, 0x04]);
        assert_eq!(a.name, "IN_SRC_MAC");
        assert_eq!(a.value, "0a:0b:0c:0d:12:04");
    }

    #[test]
    fn ipv6_keeps_zero_groups() {
        let mut r = [0u8; 16];
        r[15] = 1;
        assert_eq!(Render::Ipv6.render(&r), "0:0:0:0:0:0:0:1");
    }

    #[test]
    fn unknown_type_uses_numeric_name() {
        let a = render_field(500, &[0x00, 0x63]);
        assert_eq!(a.name, "500");
        assert_eq!(a.value, "99");

        // Gaps inside the catalogue behave like codes past its end.
        assert_eq!(field_name(43), "43");
        assert_eq!(field_name(0), "0");
    }

    #[test]
    fn unsigned_accumulates_big_endian() {
        assert_eq!(Render::Unsigned.render(&[]), "0");
        assert_eq!(Render::Unsigned.render(&[0x01, 0x00]), "256");
        assert_eq!(Render::Unsigned.render(&[0xFF; 8]), u64::MAX.to_string());
        // Only the low 64 bits survive.
        assert_eq!(
            Render::Unsigned.render(&[0x01, 0, 0, 0, 0, 0, 0, 0, 0x02]),
            "2"
        );
    }

    #[test]
    fn mismatched_address_lengths_fall_back_to_unsigned() {
        assert_eq!(Render::Ipv4.render(&[0x01, 0x02]), "258");
        assert_eq!(Render::Ipv6.render(&[0x00, 0x05]), "5");
    }

    #[test]
    fn strings_drop_trailing_nuls() {
        assert_eq!(render_field(82, b"Gi0/1\0\0\0").value, "Gi0/1");
    }

    #[test]
    fn scope_names() {
        assert_eq!(ScopeType::from(1).to_string(), "System");
        assert_eq!(ScopeType::from(3).to_string(), "Line Card");
        assert_eq!(ScopeType::from(9).to_string(), "Unknown(9)");
    }
}
