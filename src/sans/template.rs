//! Version 9 templates and options templates.

use thiserror::Error;
use tracing::warn;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned, network_endian::U16};

use crate::Attribute;

use super::{
    cursor::{Cursor, EndOfSlice},
    field::{Render, ScopeType, render_field},
};

/// An error reading a template record.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error(transparent)]
    EndOfSlice(#[from] EndOfSlice),
    /// Template identifiers 0 and 1 name FlowSet kinds, not templates.
    #[error("Template identifier {0} is reserved.")]
    ReservedId(u16),
}

/// Whether a template identifier is reserved for FlowSet kinds.
pub const fn is_reserved(id: u16) -> bool {
    id < 2
}

/// The type and width of one field in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateField {
    pub field_type: u16,
    pub length: u16,
}

/// An ordered record layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template {
    fields: Vec<TemplateField>,
    total_length: usize,
}

impl Template {
    pub fn new(fields: Vec<TemplateField>) -> Self {
        let total_length = fields.iter().map(|f| f.length as usize).sum();

        Self {
            fields,
            total_length,
        }
    }

    pub fn fields(&self) -> &[TemplateField] {
        &self.fields
    }

    /// Length in bytes of one record.
    pub fn total_length(&self) -> usize {
        self.total_length
    }

    /// Number of whole records in a run of bytes.
    ///
    /// A template without length describes no records.
    pub fn record_count(&self, available: usize) -> usize {
        available.checked_div(self.total_length).unwrap_or(0)
    }

    /// Render a record's fields as attributes, in template order.
    pub fn render(&self, r: &[u8], out: &mut Vec<Attribute>) {
        let mut c = Cursor::new(r);

        for field in &self.fields {
            let Ok(value) = c.take_slice(field.length as usize) else {
                break;
            };

            out.push(render_field(field.field_type, value));
        }
    }
}

/// A record layout split into a scope and the options measured for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionsTemplate {
    pub scope: Template,
    pub option: Template,
}

impl OptionsTemplate {
    /// Length in bytes of one record.
    pub fn total_length(&self) -> usize {
        self.scope.total_length() + self.option.total_length()
    }

    /// Number of whole records in a run of bytes.
    pub fn record_count(&self, available: usize) -> usize {
        available.checked_div(self.total_length()).unwrap_or(0)
    }

    /// Describe a record's scope and render its options as attributes.
    ///
    /// Returns the scope description.
    pub fn render(&self, r: &[u8], out: &mut Vec<Attribute>) -> String {
        let (scope, option) = r.split_at(self.scope.total_length().min(r.len()));

        let mut c = Cursor::new(scope);
        let mut description = String::from("Options record for ");

        for (i, field) in self.scope.fields().iter().enumerate() {
            let Ok(value) = c.take_slice(field.length as usize) else {
                break;
            };

            if i != 0 {
                description.push_str(", ");
            }

            description.push_str(&format!(
                "{} {}",
                ScopeType::from(field.field_type),
                Render::Unsigned.render(value)
            ));
        }

        self.option.render(option, out);

        description
    }
}

#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
struct TemplateHeader {
    id: U16,
    field_count: U16,
}

#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
struct OptionsTemplateHeader {
    id: U16,
    scope_length: U16,
    option_length: U16,
}

#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
struct FieldSpecifier {
    field_type: U16,
    length: U16,
}

/// Read one record from a Template FlowSet.
///
/// Returns the template identifier and the template.
pub fn read_template(c: &mut Cursor) -> Result<(u16, Template), TemplateError> {
    let TemplateHeader { id, field_count } = zerocopy::transmute!(c.take::<4>()?);
    let id = id.get();

    let template = read_fields(c, id, field_count.get() as usize)?;

    if is_reserved(id) {
        Err(TemplateError::ReservedId(id))?;
    }

    Ok((id, template))
}

/// Read one record from an Options Template FlowSet.
///
/// Returns the template identifier and the options template.
pub fn read_options_template(c: &mut Cursor) -> Result<(u16, OptionsTemplate), TemplateError> {
    let OptionsTemplateHeader {
        id,
        scope_length,
        option_length,
    } = zerocopy::transmute!(c.take::<6>()?);
    let id = id.get();

    let scope = read_fields(c, id, scope_length.get() as usize / 4)?;
    let option = read_fields(c, id, option_length.get() as usize / 4)?;

    if is_reserved(id) {
        Err(TemplateError::ReservedId(id))?;
    }

    Ok((id, OptionsTemplate { scope, option }))
}

fn read_fields(c: &mut Cursor, id: u16, count: usize) -> Result<Template, EndOfSlice> {
    let mut fields = Vec::with_capacity(count.min(c.remaining() / 4));

    for _ in 0..count {
        let FieldSpecifier { field_type, length } = zerocopy::transmute!(c.take::<4>()?);

        if length.get() == 0 {
            warn!(
                template_id = id,
                field_type = field_type.get(),
                "Dropping zero-length template field."
            );
            continue;
        }

        fields.push(TemplateField {
            field_type: field_type.get(),
            length: length.get(),
        });
    }

    Ok(Template::new(fields))
}
