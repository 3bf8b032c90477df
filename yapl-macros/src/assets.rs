use glob::glob;
use proc_macro::TokenStream;
use quote::quote;
use std::env;
use std::path::PathBuf;
use syn::{LitStr, parse_macro_input};

pub fn embed_templates_impl(input: TokenStream) -> TokenStream {
    // 1) The glob pattern, relative to the crate root.
    let pattern = parse_macro_input!(input as LitStr);
    let pattern_str = pattern.value();

    // 2) CARGO_MANIFEST_DIR points at the directory holding Cargo.toml.
    let root = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => {
            return syn::Error::new(pattern.span(), "CARGO_MANIFEST_DIR is not set")
                .to_compile_error()
                .into();
        }
    };
    let full_pattern = root.join(&pattern_str);

    // 3) Matching files, sorted so the expansion is stable.
    let mut files: Vec<PathBuf> = match glob(&full_pattern.to_string_lossy()) {
        Ok(paths) => paths
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .collect(),
        Err(e) => {
            return syn::Error::new(pattern.span(), format!("Invalid glob pattern: {}", e))
                .to_compile_error()
                .into();
        }
    };
    files.sort();

    // 4) (relative path, contents) pairs. `include_str!` takes the absolute
    // path and also makes cargo rebuild when a template changes.
    let assets = files.iter().map(|abs| {
        let rel = abs
            .strip_prefix(&root)
            .unwrap_or(abs)
            .to_string_lossy()
            .replace('\\', "/");
        let abs = abs.to_string_lossy().to_string();
        quote! { (#rel, include_str!(#abs)) }
    });

    TokenStream::from(quote! {
        yapl::MemoryLoader::from_assets::<&str, &str>(vec![
            #(#assets),*
        ])
    })
}
