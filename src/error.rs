use thiserror::Error;

/// Failure to find a library or a symbol through the dynamic linker.
///
/// A missing symbol is an ordinary outcome: libart's internal names move between
/// platform releases, so callers degrade instead of giving up.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("can't open {path}: {reason}")]
    LibraryNotFound {
        path: String,
        reason: String,
    },

    #[error("can't find {name}: {reason}")]
    SymbolNotFound {
        name: String,
        reason: String,
    },

    #[error("{0:?} contains an interior nul byte")]
    InvalidName(String),
}

/// Reasons a single patch did not take effect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("{patch}: {source}")]
    MissingSymbol {
        patch: &'static str,
        #[source]
        source: ResolveError,
    },

    #[error("{patch}: none of the {tried} known symbol variants are present")]
    NoVariantFound {
        patch: &'static str,
        tried: usize,
    },
}

/// Reasons the installation pass aborted before any patch was attempted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstallError {
    #[error("api level not supported: {0:?}, skip")]
    UnsupportedPlatform(Option<i32>),

    #[error("hook engine unavailable: {0}")]
    HookEngineUnavailable(#[source] ResolveError),

    #[error("libart unavailable: {0}")]
    RuntimeUnavailable(#[source] ResolveError),
}
