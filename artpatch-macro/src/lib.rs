use proc_macro2::Span;
use proc_macro_crate::FoundCrate;
use proc_macro::TokenStream;

mod attrs;
mod hooks;

fn get_artpatch_crate_name() -> syn::Result<syn::Ident> {
    match proc_macro_crate::crate_name("artpatch") {
        Ok(FoundCrate::Itself) => Ok(syn::Ident::new("crate", Span::call_site())),
        Ok(FoundCrate::Name(named)) => Ok(syn::Ident::new(named.as_str(), Span::call_site())),
        Err(e) => Err(syn::Error::new(Span::call_site(), e)),
    }
}

/// Turns a function into the replacement half of an inline hook.
///
/// The function is given the C ABI and, unless `no_original` is passed, a companion module
/// of the same name holding an `ORIGINAL` backup slot for the hook engine to fill in.
/// Inside the body, `original!()` yields that slot typed after the function's own signature,
/// or `None` if the hook has not been installed yet.
#[proc_macro_attribute]
pub fn replacement(attr: TokenStream, item: TokenStream) -> TokenStream {
    hooks::make_replacement(attr, item)
}
