//! Parsing utilities for the schema derive.
//!
//! This module turns `#[config(...)]` field attributes into [`FieldRules`].

use syn::{
    parse::ParseStream, punctuated::Punctuated, spanned::Spanned, Data, DeriveInput, Expr,
    ExprLit, ExprUnary, Fields, Ident, Lit, LitStr, Meta, Token, UnOp,
};

/// Declarative rules attached to one field.
#[derive(Debug, Default)]
pub struct FieldRules {
    /// `required`
    pub required: bool,
    /// `min = N`
    pub min: Option<f64>,
    /// `max = N`
    pub max: Option<f64>,
    /// `url`
    pub url: bool,
    /// `one_of = "a b c"`, split on whitespace.
    pub one_of: Option<Vec<String>>,
    /// `nested`: descend into this field during validation and hooks.
    pub nested: bool,
    /// `no_merge`: leave this field out of default merging.
    pub no_merge: bool,
}

impl FieldRules {
    /// Collects the rules from every `#[config(...)]` attribute on a field.
    pub fn from_attrs(attrs: &[syn::Attribute]) -> syn::Result<Self> {
        let mut rules = Self::default();

        for attr in attrs.iter().filter(|a| a.path().is_ident("config")) {
            let metas = attr.parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated)?;
            for meta in metas {
                rules.apply(&meta)?;
            }
        }

        if let (Some(min), Some(max)) = (rules.min, rules.max) {
            if min > max {
                return Err(syn::Error::new(
                    attrs.first().map_or_else(proc_macro2::Span::call_site, Spanned::span),
                    format!("min ({min}) is greater than max ({max})"),
                ));
            }
        }

        Ok(rules)
    }

    fn apply(&mut self, meta: &Meta) -> syn::Result<()> {
        match meta {
            Meta::Path(path) => {
                let ident = path
                    .get_ident()
                    .ok_or_else(|| syn::Error::new(path.span(), "expected identifier"))?
                    .to_string();
                match ident.as_str() {
                    "required" => self.required = true,
                    "url" => self.url = true,
                    "nested" => self.nested = true,
                    "no_merge" => self.no_merge = true,
                    _ => {
                        return Err(syn::Error::new(
                            path.span(),
                            format!("unknown config rule: {ident}"),
                        ))
                    }
                }
            }
            Meta::NameValue(nv) => {
                let ident = nv
                    .path
                    .get_ident()
                    .ok_or_else(|| syn::Error::new(nv.path.span(), "expected identifier"))?
                    .to_string();
                match ident.as_str() {
                    "min" => self.min = Some(number(&nv.value)?),
                    "max" => self.max = Some(number(&nv.value)?),
                    "one_of" => {
                        let words: Vec<String> = string(&nv.value)?
                            .split_whitespace()
                            .map(str::to_string)
                            .collect();
                        if words.is_empty() {
                            return Err(syn::Error::new(
                                nv.value.span(),
                                "one_of needs at least one value",
                            ));
                        }
                        self.one_of = Some(words);
                    }
                    _ => {
                        return Err(syn::Error::new(
                            nv.path.span(),
                            format!("unknown config rule: {ident}"),
                        ))
                    }
                }
            }
            Meta::List(list) => {
                return Err(syn::Error::new(list.span(), "expected `rule` or `rule = value`"))
            }
        }
        Ok(())
    }
}

fn number(expr: &Expr) -> syn::Result<f64> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Int(i), ..
        }) => i.base10_parse::<f64>(),
        Expr::Lit(ExprLit {
            lit: Lit::Float(f), ..
        }) => f.base10_parse::<f64>(),
        Expr::Unary(ExprUnary {
            op: UnOp::Neg(_),
            expr,
            ..
        }) => number(expr).map(|n| -n),
        _ => Err(syn::Error::new(expr.span(), "expected numeric literal")),
    }
}

fn string(expr: &Expr) -> syn::Result<String> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Str(s), ..
        }) => Ok(s.value()),
        _ => Err(syn::Error::new(expr.span(), "expected string literal")),
    }
}

/// A parsed field of the deriving struct.
#[derive(Debug)]
pub struct SchemaField {
    /// The Rust field identifier.
    pub ident: Ident,
    /// Name used in violation paths; follows `#[serde(rename = "...")]`.
    pub name: String,
    /// Rules from `#[config(...)]`.
    pub rules: FieldRules,
}

/// Parsed struct information.
#[derive(Debug)]
pub struct SchemaStruct {
    /// The struct name.
    pub name: Ident,
    /// Named fields, in declaration order.
    pub fields: Vec<SchemaField>,
}

impl SchemaStruct {
    /// Parses a derive input, accepting only structs with named fields.
    pub fn parse(input: &DeriveInput) -> syn::Result<Self> {
        let Data::Struct(data) = &input.data else {
            return Err(syn::Error::new(
                input.ident.span(),
                "Schema can only be derived for structs",
            ));
        };
        let Fields::Named(named) = &data.fields else {
            return Err(syn::Error::new(
                input.ident.span(),
                "Schema requires a struct with named fields",
            ));
        };

        let fields = named
            .named
            .iter()
            .map(|field| {
                let ident = field
                    .ident
                    .clone()
                    .ok_or_else(|| syn::Error::new(field.span(), "expected named field"))?;
                let name = serde_rename(&field.attrs)?
                    .unwrap_or_else(|| ident.to_string().trim_start_matches("r#").to_string());
                Ok(SchemaField {
                    ident,
                    name,
                    rules: FieldRules::from_attrs(&field.attrs)?,
                })
            })
            .collect::<syn::Result<Vec<_>>>()?;

        Ok(Self {
            name: input.ident.clone(),
            fields,
        })
    }
}

/// Returns the `rename` value of a field's `#[serde(...)]` attributes.
fn serde_rename(attrs: &[syn::Attribute]) -> syn::Result<Option<String>> {
    let mut rename = None;
    for attr in attrs.iter().filter(|a| a.path().is_ident("serde")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") && meta.input.peek(Token![=]) {
                let value: LitStr = meta.value()?.parse()?;
                rename = Some(value.value());
            } else {
                skip_meta_value(meta.input)?;
            }
            Ok(())
        })?;
    }
    Ok(rename)
}

fn skip_meta_value(input: ParseStream) -> syn::Result<()> {
    if input.peek(Token![=]) {
        input.parse::<Token![=]>()?;
        input.parse::<Expr>()?;
    } else if input.peek(syn::token::Paren) {
        let _content;
        syn::parenthesized!(_content in input);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_parse_field_rules() {
        let attrs: Vec<syn::Attribute> = vec![parse_quote!(#[config(required, min = 1, max = 65535)])];
        let rules = FieldRules::from_attrs(&attrs).unwrap();
        assert!(rules.required);
        assert_eq!(rules.min, Some(1.0));
        assert_eq!(rules.max, Some(65535.0));
        assert!(!rules.nested);
    }

    #[test]
    fn test_parse_one_of_and_negative_bound() {
        let attrs: Vec<syn::Attribute> = vec![
            parse_quote!(#[config(one_of = "debug info warn")]),
            parse_quote!(#[config(min = -10, url)]),
        ];
        let rules = FieldRules::from_attrs(&attrs).unwrap();
        assert_eq!(
            rules.one_of,
            Some(vec!["debug".to_string(), "info".to_string(), "warn".to_string()])
        );
        assert_eq!(rules.min, Some(-10.0));
        assert!(rules.url);
    }

    #[test]
    fn test_unknown_rule_rejected() {
        let attrs: Vec<syn::Attribute> = vec![parse_quote!(#[config(positive)])];
        assert!(FieldRules::from_attrs(&attrs).is_err());
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let attrs: Vec<syn::Attribute> = vec![parse_quote!(#[config(min = 10, max = 1)])];
        assert!(FieldRules::from_attrs(&attrs).is_err());
    }

    #[test]
    fn test_parse_struct_follows_serde_rename() {
        let input: DeriveInput = parse_quote! {
            struct Server {
                #[serde(default, rename = "listen_port", skip_serializing_if = "is_zero")]
                #[config(min = 1)]
                port: i32,
                #[config(nested)]
                tls: TlsConfig,
            }
        };
        let parsed = SchemaStruct::parse(&input).unwrap();
        assert_eq!(parsed.fields.len(), 2);
        assert_eq!(parsed.fields[0].name, "listen_port");
        assert_eq!(parsed.fields[1].name, "tls");
        assert!(parsed.fields[1].rules.nested);
    }

    #[test]
    fn test_enum_rejected() {
        let input: DeriveInput = parse_quote! {
            enum Mode { A, B }
        };
        assert!(SchemaStruct::parse(&input).is_err());
    }
}
