use syn::spanned::Spanned;

use super::attrs::*;

/// Extracts the argument type, rejecting receivers since a replacement is always a free function
fn arg_to_type(input: &syn::FnArg) -> syn::Result<syn::Type> {
    match input {
        syn::FnArg::Receiver(receiver) => {
            Err(syn::Error::new(receiver.span(), "replacement functions cannot take `self`"))
        },
        syn::FnArg::Typed(syn::PatType { pat, ty, .. }) => match &**pat {
            syn::Pat::Ident(_) | syn::Pat::Wild(_) => Ok((**ty).clone()),
            _ => Err(syn::Error::new(pat.span(), "invalid argument pattern"))
        }
    }
}

fn push_original_utils(user_fn: &mut syn::ItemFn) -> syn::Result<()> {
    let base_ident = &user_fn.sig.ident;

    let types = user_fn.sig.inputs
        .iter()
        .map(arg_to_type)
        .collect::<syn::Result<Vec<_>>>()?;

    let outputs = &user_fn.sig.output;

    // The original is foreign code, so calling it is always unsafe regardless
    // of how the replacement itself is declared
    user_fn.block.stmts.insert(0, syn::parse_quote! {
        macro_rules! original {
            () => {
                {
                    #[allow(unused_unsafe)]
                    let original = unsafe {
                        #base_ident::ORIGINAL.get::<unsafe extern "C" fn(#(#types),*) #outputs>()
                    };
                    original
                }
            }
        }
    });

    Ok(())
}

fn make_replacement_internal(
    attrs: ReplacementAttributes,
    mut user_fn: syn::ItemFn,
) -> syn::Result<proc_macro2::TokenStream> {
    let artpatch = crate::get_artpatch_crate_name()?;

    if let Some(abi) = &user_fn.sig.abi {
        return Err(syn::Error::new(abi.span(), "the ABI of a replacement is always set to \"C\""));
    }

    if !user_fn.sig.generics.params.is_empty() {
        return Err(syn::Error::new(user_fn.sig.generics.span(), "replacement functions cannot be generic"));
    }

    // The hook engine jumps straight into this function from VM code, so it has to
    // follow the C calling convention
    user_fn.sig.abi = Some(syn::parse_quote!(extern "C"));

    // Any argument or return type that is not FFI safe becomes a compiler error
    user_fn.attrs.push(syn::parse_quote!(#[deny(improper_ctypes_definitions)]));

    if attrs.no_original.is_some() {
        return Ok(quote::quote!(#user_fn));
    }

    push_original_utils(&mut user_fn)?;

    let vis = &user_fn.vis;
    let base_ident = &user_fn.sig.ident;

    Ok(quote::quote! {
        #[doc(hidden)]
        #[allow(non_snake_case)]
        #vis mod #base_ident {
            /// Filled in by the hook engine with the address of the function that was replaced
            pub static ORIGINAL: #artpatch::hooks::BackupSlot = #artpatch::hooks::BackupSlot::new();
        }

        #user_fn
    })
}

pub fn make_replacement(attr: proc_macro::TokenStream, item: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let attrs = syn::parse_macro_input!(attr as ReplacementAttributes);
    let user_fn = syn::parse_macro_input!(item as syn::ItemFn);

    match make_replacement_internal(attrs, user_fn) {
        Ok(stream) => stream.into(),
        Err(e) => e.into_compile_error().into()
    }
}
