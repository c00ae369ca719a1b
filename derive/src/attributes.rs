use std::collections::HashSet;

use proc_macro::TokenStream;
use quote::quote;
use syn::{
    Data, DeriveInput, Error, Field, Fields, Ident, LitStr, Result, Token,
    parse::{Parse, ParseStream},
};

pub(crate) fn expand_attributes(input: &DeriveInput) -> Result<TokenStream> {
    let Data::Struct(data) = &input.data else {
        Err(Error::new_spanned(input, "`Attributes` may only be derived on structs."))?
    };

    let Fields::Named(fields) = &data.fields else {
        Err(Error::new_spanned(
            input,
            "`Attributes` may only be derived on structs with named fields.",
        ))?
    };

    let fields = fields
        .named
        .iter()
        .map(FieldMetadata::parse)
        .map(Result::transpose)
        .flatten() // Skip fields without an attribute.
        .collect::<Result<Vec<_>>>()?;

    let mut names = HashSet::new();

    for field in &fields {
        if !names.insert(field.attribute.value()) {
            Err(Error::new_spanned(&field.attribute, "Attribute names must be unique."))?;
        }
    }

    let pushes = fields.iter().map(|field| {
        let FieldMetadata {
            name,
            attribute,
            render,
        } = field;

        quote! {
            out.push(::netflow_decode::Attribute::new(
                #attribute,
                ::netflow_decode::sans::field::render_wire(
                    ::netflow_decode::sans::field::Render::#render,
                    &self.#name,
                ),
            ));
        }
    });

    let name = &input.ident;
    let (impl_generics, type_generics, where_clause) = input.generics.split_for_impl();

    let expanded = quote! {
        impl #impl_generics ::netflow_decode::sans::field::Attributes
            for #name #type_generics #where_clause
        {
            #[allow(unused_variables)]
            fn push_attributes(
                &self,
                out: &mut ::std::vec::Vec<::netflow_decode::Attribute>,
            ) {
                #(#pushes)*
            }
        }
    };

    Ok(expanded.into())
}

#[derive(Debug)]
struct FieldMetadata {
    name: Ident,
    attribute: LitStr,
    render: Ident,
}

impl FieldMetadata {
    fn parse(field: &Field) -> Result<Option<Self>> {
        let Some(attr) = field.attrs.iter().find(|a| a.path().is_ident("attribute")) else {
            return Ok(None);
        };

        let Some(name) = field.ident.clone() else {
            Err(Error::new_spanned(field, "Field must be named."))?
        };

        let FieldAttribute { attribute, render } = attr.meta.require_list()?.parse_args()?;

        Ok(Some(Self {
            name,
            attribute,
            render,
        }))
    }
}

#[derive(Debug)]
struct FieldAttribute {
    attribute: LitStr,
    render: Ident,
}

impl Parse for FieldAttribute {
    fn parse(input: ParseStream) -> Result<Self> {
        let attribute = input.parse::<LitStr>()?;

        if attribute.value().is_empty() {
            Err(Error::new_spanned(&attribute, "Attribute name must not be empty."))?;
        }

        let render = if !input.is_empty() {
            input.parse::<Token![,]>()?;
            let ident = input.parse::<Ident>()?;

            let variant = match ident.to_string().as_str() {
                "unsigned" => "Unsigned",
                "ipv4" => "Ipv4",
                "ipv6" => "Ipv6",
                "mac" => "Mac",
                "string" => "String",
                _ => Err(Error::new_spanned(
                    &ident,
                    "Renderer must be one of `unsigned`, `ipv4`, `ipv6`, `mac`, or `string`.",
                ))?,
            };

            Ident::new(variant, ident.span())
        } else {
            Ident::new("Unsigned", attribute.span())
        };

        Ok(Self { attribute, render })
    }
}
