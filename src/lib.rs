pub mod config;
pub mod error;
pub mod hooks;
pub mod install;
pub mod patches;
pub mod platform;
pub mod rtld;

#[cfg(test)]
mod testing;

pub use artpatch_macro::replacement;

pub use install::{install_inline_hooks, InstallReport, Installer};
