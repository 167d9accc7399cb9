//! Turns off hidden API enforcement by making libart's per-member access check always allow.
//!
//! The check was renamed between 9.0 previews and the 9.0 release and has no stable public
//! name, so every known spelling is tried.

use log::{debug, info};

use super::Outcome;
use crate::error::PatchError;
use crate::hooks::InlineHooker;
use crate::platform::Tier;
use crate::replacement;
use crate::rtld::SymbolSource;

const PATCH_NAME: &str = "hidden API policy";

type Stub = extern "C" fn() -> bool;

/// Every known access check, in the order they are tried, with the stub that replaces it.
///
/// New spellings only need a new entry here.
pub const VARIANTS: &[(&str, Stub)] = &[
    // 9.0 previews: ShouldBlockAccessToMember<ArtField>
    (
        "_ZN3art9hiddenapi25ShouldBlockAccessToMemberINS_8ArtFieldEEEbPT_PNS_6ThreadENSt3__18functionIFbS6_EEENS0_12AccessMethodE",
        on_should_deny_access
    ),
    // 9.0 previews: ShouldBlockAccessToMember<ArtMethod>
    (
        "_ZN3art9hiddenapi25ShouldBlockAccessToMemberINS_9ArtMethodEEEbPT_PNS_6ThreadENSt3__18functionIFbS6_EEENS0_12AccessMethodE",
        on_should_deny_access
    ),
    // 9.0 release: detail::GetMemberActionImpl<ArtField>
    (
        "_ZN3art9hiddenapi6detail19GetMemberActionImplINS_8ArtFieldEEENS0_6ActionEPT_NS_20HiddenApiAccessFlags7ApiListES4_NS0_12AccessMethodE",
        on_should_deny_access
    ),
    // 9.0 release: detail::GetMemberActionImpl<ArtMethod>
    (
        "_ZN3art9hiddenapi6detail19GetMemberActionImplINS_9ArtMethodEEENS0_6ActionEPT_NS_20HiddenApiAccessFlags7ApiListES4_NS0_12AccessMethodE",
        on_should_deny_access
    ),
];

/// `false` for the `ShouldBlockAccessToMember` spellings, `Action::kAllow` (0) for
/// `GetMemberActionImpl`. The arguments are never looked at.
#[replacement(no_original)]
fn on_should_deny_access() -> bool {
    false
}

/// Hooks every access check variant present in libart with an always-allow stub.
///
/// Succeeds as long as at least one variant was found. Before 9.0 there is no enforcement
/// and nothing is done.
pub fn disable_hidden_api_policy(
    tier: Tier,
    art: &impl SymbolSource,
    hooker: &impl InlineHooker,
) -> Result<Outcome, PatchError> {
    disable_variants(tier, art, hooker, VARIANTS)
}

fn disable_variants(
    tier: Tier,
    art: &impl SymbolSource,
    hooker: &impl InlineHooker,
    variants: &[(&str, Stub)],
) -> Result<Outcome, PatchError> {
    if !tier.has_hidden_api() {
        return Ok(Outcome::Skipped);
    }

    let mut hooks = 0;
    for (name, stub) in variants {
        match art.find_symbol(name) {
            Ok(target) => {
                // The stub never calls through, so there is no backup to keep
                unsafe { hooker.hook(target, *stub as *const (), None) };
                info!("{} disabled", name);
                hooks += 1;
            },
            Err(e) => debug!("{}", e)
        }
    }

    if hooks == 0 {
        return Err(PatchError::NoVariantFound { patch: PATCH_NAME, tried: variants.len() });
    }

    Ok(Outcome::Applied { hooks })
}
