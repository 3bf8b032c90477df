use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitStr, parse_macro_input};

pub fn derive_vars_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let mut generics = input.generics.clone();
    for param in generics.type_params_mut() {
        param.bounds.push(syn::parse_quote!(yapl::value::ToValue));
    }
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return syn::Error::new_spanned(name, "Vars requires a struct with named fields")
                    .to_compile_error()
                    .into();
            }
        },
        _ => {
            return syn::Error::new_spanned(name, "Vars only supports structs")
                .to_compile_error()
                .into();
        }
    };

    let mut inserts = Vec::new();
    for field in fields {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let (key, ignore) = match parse_field_attrs(field) {
            Ok(parsed) => parsed,
            Err(e) => return e.to_compile_error().into(),
        };
        if !ignore {
            let key_lit = LitStr::new(&key, Span::call_site());
            inserts.push(quote! {
                map.insert(#key_lit.to_string(), yapl::value::ToValue::to_value(&self.#ident));
            });
        }
    }

    TokenStream::from(quote! {
        impl #impl_generics yapl::value::ToValue for #name #ty_generics #where_clause {
            fn to_value(&self) -> yapl::value::Value {
                let mut map = std::collections::BTreeMap::new();
                #(#inserts)*
                yapl::value::Value::Map(map)
            }
        }
    })
}

/// Reads `#[vars(...)]` on a field: returns the exposed name and whether the
/// field is ignored.
fn parse_field_attrs(field: &syn::Field) -> syn::Result<(String, bool)> {
    let mut name = field
        .ident
        .as_ref()
        .map(|i| i.to_string().trim_start_matches("r#").to_string())
        .unwrap_or_default();
    let mut ignore = false;

    for attr in &field.attrs {
        if !attr.path().is_ident("vars") {
            continue;
        }
        // #[vars("custom_name")]
        if let Ok(s) = attr.parse_args::<LitStr>() {
            name = s.value();
            continue;
        }
        // #[vars(ignore)], #[vars(rename = "custom_name")]
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("ignore") {
                ignore = true;
                Ok(())
            } else if meta.path.is_ident("rename") {
                let s: LitStr = meta.value()?.parse()?;
                name = s.value();
                Ok(())
            } else {
                Err(meta.error("expected `ignore` or `rename = \"...\"`"))
            }
        })?;
    }
    Ok((name, ignore))
}
