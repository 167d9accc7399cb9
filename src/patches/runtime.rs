//! Chains `Runtime::DeoptimizeBootImage` onto `Runtime::Init`, so code precompiled into the
//! boot image goes back through the interpreter and can be hooked.

use std::ffi::c_void;

use log::{error, info, warn};

use super::Outcome;
use crate::error::PatchError;
use crate::hooks::{AddressSlot, InlineHooker};
use crate::platform::Tier;
use crate::replacement;
use crate::rtld::{Symbol, SymbolSource};

const PATCH_NAME: &str = "Runtime::Init";

/// `static Runtime* Runtime::instance_`
pub const RUNTIME_INSTANCE: &str = "_ZN3art7Runtime9instance_E";

/// `bool Runtime::Init(RuntimeArgumentMap&&)`
pub const RUNTIME_INIT: &str = "_ZN3art7Runtime4InitEONS_18RuntimeArgumentMapE";

/// `void Runtime::DeoptimizeBootImage()`
pub const DEOPTIMIZE_BOOT_IMAGE: &str = "_ZN3art7Runtime19DeoptimizeBootImageEv";

type DeoptimizeBootImageFn = unsafe extern "C" fn(runtime: *mut c_void);

struct RuntimePatch {
    /// Address of `Runtime::instance_`, for diagnostics only
    instance: AddressSlot,
    deoptimize: AddressSlot,
}

static PATCH: RuntimePatch = RuntimePatch {
    instance: AddressSlot::new(),
    deoptimize: AddressSlot::new(),
};

/// The address of `Runtime::instance_` in the patched libart, if it was found
pub fn runtime_instance() -> Option<Symbol> {
    PATCH.instance.get_raw()
}

#[replacement]
fn on_runtime_init(runtime: *mut c_void, options: *mut c_void) -> bool {
    let Some(original) = original!() else {
        error!("Runtime::Init called before its backup was set");
        return false;
    };

    info!("Runtime::Init starts");
    let result = unsafe { original(runtime, options) };

    // Resolved at install time, but checked on every call
    match unsafe { PATCH.deoptimize.get::<DeoptimizeBootImageFn>() } {
        Some(deoptimize) => {
            info!("DeoptimizeBootImage starts");
            unsafe { deoptimize(runtime) };
            info!("DeoptimizeBootImage finishes");
        },
        None => warn!("DeoptimizeBootImage is not available, skip")
    }

    info!("Runtime::Init finishes");
    result
}

/// Hooks `Runtime::Init` so the boot image is deoptimized right after the runtime comes up.
///
/// Only 8.0 and later have `DeoptimizeBootImage`; on older releases this is skipped.
/// A missing `DeoptimizeBootImage` still installs the hook, which then only calls through.
pub fn hook_runtime(
    tier: Tier,
    art: &impl SymbolSource,
    hooker: &impl InlineHooker,
) -> Result<Outcome, PatchError> {
    if !tier.has_boot_image_deopt() {
        info!("hooking Runtime skipped");
        return Ok(Outcome::Skipped);
    }

    match art.find_symbol(RUNTIME_INSTANCE) {
        Ok(instance) => PATCH.instance.store(Some(instance)),
        Err(e) => warn!("runtime instance not found: {}", e)
    }

    let init = art.find_symbol(RUNTIME_INIT)
        .map_err(|source| PatchError::MissingSymbol { patch: PATCH_NAME, source })?;

    match art.find_symbol(DEOPTIMIZE_BOOT_IMAGE) {
        Ok(deoptimize) => PATCH.deoptimize.store(Some(deoptimize)),
        Err(e) => {
            error!("{}, Runtime::Init will not deoptimize the boot image", e);
            PATCH.deoptimize.store(None);
        }
    }

    info!("start to hook {}", PATCH_NAME);
    unsafe {
        hooker.hook(init, on_runtime_init as *const (), Some(&on_runtime_init::ORIGINAL));
    }
    info!("{} hooked", PATCH_NAME);

    Ok(Outcome::Applied { hooks: 1 })
}
