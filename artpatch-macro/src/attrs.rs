use syn::parse::Parse;

pub mod kw {
    syn::custom_keyword!(no_original);
}

pub struct ReplacementAttributes {
    pub no_original: Option<kw::no_original>,
}

impl Parse for ReplacementAttributes {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        if input.is_empty() {
            return Ok(Self { no_original: None });
        }

        let no_original = input.parse::<kw::no_original>()?;

        if !input.is_empty() {
            return Err(syn::Error::new(input.span(), "unexpected tokens after `no_original`"));
        }

        Ok(Self { no_original: Some(no_original) })
    }
}
