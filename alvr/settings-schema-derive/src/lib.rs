//! Derive macro for `settings_schema::SettingsSchema`.
//!
//! Generates a `schema()` associated function that describes the shape of a
//! settings struct/enum as a `SchemaNode` tree, without touching how the type
//! is (de)serialized. The dashboard/GUI that would consume this tree is out
//! of scope for this crate; the derive exists so `Settings` stays
//! introspectable the way the rest of the settings machinery expects.

use heck::{ToKebabCase, ToSnakeCase};
use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, Type};

fn rename(name: &str) -> String {
    if cfg!(feature = "rename_camel_case") {
        // kept simple: camelCase via kebab-case intermediate
        let kebab = name.to_kebab_case();
        let mut parts = kebab.split('-');
        let mut out = parts.next().unwrap_or_default().to_string();
        for p in parts {
            let mut chars = p.chars();
            if let Some(c) = chars.next() {
                out.push(c.to_ascii_uppercase());
                out.push_str(chars.as_str());
            }
        }
        out
    } else if cfg!(feature = "rename_snake_case") {
        name.to_snake_case()
    } else {
        name.to_string()
    }
}

fn is_option(ty: &Type) -> bool {
    if let Type::Path(p) = ty {
        if let Some(seg) = p.path.segments.last() {
            return seg.ident == "Option";
        }
    }
    false
}

#[proc_macro_derive(SettingsSchema)]
pub fn derive_settings_schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let ident = &input.ident;

    let body = match &input.data {
        Data::Struct(data) => {
            let Fields::Named(fields) = &data.fields else {
                return syn::Error::new_spanned(&input, "SettingsSchema requires named fields")
                    .to_compile_error()
                    .into();
            };

            let entries = fields.named.iter().map(|f| {
                let field_ident = f.ident.as_ref().unwrap();
                let schema_name = rename(&field_ident.to_string());
                let ty = &f.ty;
                if is_option(ty) {
                    quote! {
                        (#schema_name.to_string(), ::settings_schema::SchemaNode::Switch(
                            Box::new(<#ty as ::settings_schema::SettingsSchema>::schema())
                        ))
                    }
                } else {
                    quote! {
                        (#schema_name.to_string(), <#ty as ::settings_schema::SettingsSchema>::schema())
                    }
                }
            });

            quote! {
                ::settings_schema::SchemaNode::Section(vec![#(#entries),*])
            }
        }
        Data::Enum(data) => {
            let variants = data.variants.iter().map(|v| {
                let name = rename(&v.ident.to_string());
                quote! { #name.to_string() }
            });
            quote! {
                ::settings_schema::SchemaNode::Choice(vec![#(#variants),*])
            }
        }
        Data::Union(_) => {
            return syn::Error::new_spanned(&input, "SettingsSchema does not support unions")
                .to_compile_error()
                .into();
        }
    };

    quote! {
        impl ::settings_schema::SettingsSchema for #ident {
            fn schema() -> ::settings_schema::SchemaNode {
                #body
            }
        }
    }
    .into()
}
