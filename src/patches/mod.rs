//! The individual libart patches. Each one resolves its own symbols, installs its own
//! hooks, and degrades on its own when the running libart doesn't have what it needs.

pub mod hidden_api;
pub mod runtime;
pub mod same_package;

pub use hidden_api::disable_hidden_api_policy;
pub use runtime::hook_runtime;
pub use same_package::hook_is_in_same_package;

/// What a patch did when it did not fail.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// `hooks` functions were redirected
    Applied { hooks: usize },
    /// The platform has nothing for this patch to do
    Skipped,
}
