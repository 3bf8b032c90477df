mod assets;
mod vars;

use proc_macro::TokenStream;

/// Implements `yapl::ToValue` for a struct with named fields, so it can be
/// passed as template variables.
///
/// Field attributes:
/// - `#[vars("name")]` or `#[vars(rename = "name")]` exposes the field under another name
/// - `#[vars(ignore)]` hides the field from templates
#[proc_macro_derive(Vars, attributes(vars))]
pub fn derive_vars(input: TokenStream) -> TokenStream {
    vars::derive_vars_impl(input)
}

/// Embeds every file matching a glob pattern (relative to the crate root)
/// and evaluates to a `yapl::MemoryLoader` keyed by the same relative paths.
#[proc_macro]
pub fn embed_templates(input: TokenStream) -> TokenStream {
    assets::embed_templates_impl(input)
}
