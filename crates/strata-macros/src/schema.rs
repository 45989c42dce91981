//! Schema derive implementation.
//!
//! This module contains the code generation for `#[derive(Schema)]`.

use proc_macro2::TokenStream;
use quote::quote;
use syn::DeriveInput;

use crate::parse::{SchemaField, SchemaStruct};

/// Expands `#[derive(Schema)]`.
///
/// Emits impls of `Schema`, `Merge` and `Nested` for the deriving struct.
pub fn expand_schema(input: TokenStream) -> syn::Result<TokenStream> {
    let input: DeriveInput = syn::parse2(input)?;
    let parsed = SchemaStruct::parse(&input)?;

    let name = &parsed.name;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let checks = parsed.fields.iter().map(field_checks);
    let nested: Vec<&SchemaField> = parsed.fields.iter().filter(|f| f.rules.nested).collect();
    let nested_idents: Vec<_> = nested.iter().map(|f| &f.ident).collect();
    let nested_names: Vec<_> = nested.iter().map(|f| &f.name).collect();
    let merged: Vec<_> = parsed
        .fields
        .iter()
        .filter(|f| !f.rules.no_merge)
        .map(|f| &f.ident)
        .collect();

    Ok(quote! {
        impl #impl_generics ::strata_core::Schema for #name #ty_generics #where_clause {
            fn check_fields(
                &self,
                __path: &str,
                __errors: &mut ::strata_core::ValidationErrors,
            ) {
                #(#checks)*
            }

            fn validate_children(
                &self,
                __path: &str,
                __errors: &mut ::strata_core::ValidationErrors,
            ) {
                #(
                    ::strata_core::Nested::validate_nested(
                        &self.#nested_idents,
                        &::strata_core::validate::join_path(__path, #nested_names),
                        __errors,
                    );
                )*
            }

            fn before_load_children(&mut self) -> ::strata_core::ConfigResult<()> {
                #(::strata_core::Nested::before_load_nested(&mut self.#nested_idents)?;)*
                ::core::result::Result::Ok(())
            }

            fn after_load_children(&mut self) -> ::strata_core::ConfigResult<()> {
                #(::strata_core::Nested::after_load_nested(&mut self.#nested_idents)?;)*
                ::core::result::Result::Ok(())
            }
        }

        impl #impl_generics ::strata_core::Merge for #name #ty_generics #where_clause {
            fn merge_from(&mut self, __defaults: &Self) {
                #(::strata_core::Merge::merge_from(&mut self.#merged, &__defaults.#merged);)*
            }
        }

        impl #impl_generics ::strata_core::Nested for #name #ty_generics #where_clause {
            fn validate_nested(&self, path: &str, errors: &mut ::strata_core::ValidationErrors) {
                ::strata_core::validate_tree(self, path, errors);
            }

            fn before_load_nested(&mut self) -> ::strata_core::ConfigResult<()> {
                ::strata_core::before_load_tree(self)
            }

            fn after_load_nested(&mut self) -> ::strata_core::ConfigResult<()> {
                ::strata_core::after_load_tree(self)
            }
        }
    })
}

/// Generates the rule calls for one field.
fn field_checks(field: &SchemaField) -> TokenStream {
    let ident = &field.ident;
    let name = &field.name;
    let rules = &field.rules;
    let mut calls = Vec::new();

    if rules.required {
        calls.push(quote! {
            ::strata_core::validate::rules::required(&self.#ident, &__field, __errors);
        });
    }
    if let Some(min) = rules.min {
        calls.push(quote! {
            ::strata_core::validate::rules::min(&self.#ident, #min, &__field, __errors);
        });
    }
    if let Some(max) = rules.max {
        calls.push(quote! {
            ::strata_core::validate::rules::max(&self.#ident, #max, &__field, __errors);
        });
    }
    if rules.url {
        calls.push(quote! {
            ::strata_core::validate::rules::url(&self.#ident, &__field, __errors);
        });
    }
    if let Some(allowed) = &rules.one_of {
        calls.push(quote! {
            ::strata_core::validate::rules::one_of(&self.#ident, &[#(#allowed),*], &__field, __errors);
        });
    }

    if calls.is_empty() {
        return TokenStream::new();
    }

    quote! {
        {
            let __field = ::strata_core::validate::join_path(__path, #name);
            #(#calls)*
        }
    }
}
