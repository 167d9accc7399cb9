//! Lets the injected hook classes reach package-private members of any class by making
//! `mirror::Class::IsInSamePackage` answer `true` whenever one side is one of ours.

use std::ffi::{c_char, c_void, CStr};

use log::{debug, error, info};
use once_cell::sync::OnceCell;

use super::Outcome;
use crate::error::PatchError;
use crate::hooks::{AddressSlot, InlineHooker};
use crate::platform::Tier;
use crate::replacement;
use crate::rtld::SymbolSource;

const PATCH_NAME: &str = "IsInSamePackage";

/// `bool mirror::Class::IsInSamePackage(mirror::Class*)`, 5.0 - 7.1
pub const IS_IN_SAME_PACKAGE: &str = "_ZN3art6mirror5Class15IsInSamePackageEPS1_";

/// `bool mirror::Class::IsInSamePackage(ObjPtr<mirror::Class>)`, 8.0 and later
pub const IS_IN_SAME_PACKAGE_OBJ_PTR: &str = "_ZN3art6mirror5Class15IsInSamePackageENS_6ObjPtrIS1_EE";

/// `const char* mirror::Class::GetDescriptor(std::string*)`
pub const GET_DESCRIPTOR: &str =
    "_ZN3art6mirror5Class13GetDescriptorEPNSt3__112basic_stringIcNS2_11char_traitsIcEENS2_9allocatorIcEEEE";

type GetDescriptorFn = unsafe extern "C" fn(klass: *mut c_void, storage: *mut StdString) -> *const c_char;

/// Caller-owned storage for a libc++ `std::string`, which `GetDescriptor` may build the
/// descriptor into.
///
/// Starts out as the empty short string. If the callee grows it past the inline buffer,
/// the heap buffer is released on drop.
#[repr(C)]
struct StdString {
    words: [usize; 3],
}

impl StdString {
    fn new() -> Self {
        Self { words: [0; 3] }
    }

    /// The low bit of the first byte flags the long (heap) representation
    fn is_long(&self) -> bool {
        self.words[0].to_le() & 1 == 1
    }
}

impl Drop for StdString {
    fn drop(&mut self) {
        if self.is_long() {
            // libc++'s operator new is backed by malloc on Android
            unsafe { libc::free(self.words[2] as *mut c_void) };
        }
    }
}

/// State shared between installation and the replacement.
struct SamePackagePatch {
    get_descriptor: AddressSlot,
    markers: OnceCell<Vec<String>>,
}

static PATCH: SamePackagePatch = SamePackagePatch::new();

impl SamePackagePatch {
    const fn new() -> Self {
        Self {
            get_descriptor: AddressSlot::new(),
            markers: OnceCell::new(),
        }
    }

    /// Whether the descriptor of `klass` contains any of the markers
    fn is_marked(&self, get_descriptor: GetDescriptorFn, klass: *mut c_void) -> bool {
        let Some(markers) = self.markers.get() else {
            return false;
        };

        let mut storage = StdString::new();
        let descriptor = unsafe { get_descriptor(klass, &mut storage) };
        if descriptor.is_null() {
            return false;
        }

        let descriptor = unsafe { CStr::from_ptr(descriptor) }.to_bytes();
        markers.iter().any(|marker| contains(descriptor, marker.as_bytes()))
    }

    fn is_in_same_package(&self, this: *mut c_void, that: *mut c_void, original: impl FnOnce() -> bool) -> bool {
        if let Some(get_descriptor) = unsafe { self.get_descriptor.get::<GetDescriptorFn>() } {
            if self.is_marked(get_descriptor, this) || self.is_marked(get_descriptor, that) {
                return true;
            }
        }

        original()
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|window| window == needle)
}

#[replacement]
fn on_is_in_same_package(this: *mut c_void, that: *mut c_void) -> bool {
    PATCH.is_in_same_package(this, that, || match original!() {
        Some(original) => unsafe { original(this, that) },
        None => {
            error!("IsInSamePackage called before its backup was set");
            false
        }
    })
}

/// Replaces `IsInSamePackage` so that classes whose descriptor contains one of `markers`
/// are in every package.
///
/// Nothing is hooked unless both `IsInSamePackage` and `GetDescriptor` resolve.
pub fn hook_is_in_same_package(
    tier: Tier,
    art: &impl SymbolSource,
    hooker: &impl InlineHooker,
    markers: &[String],
) -> Result<Outcome, PatchError> {
    let missing = |source| PatchError::MissingSymbol { patch: PATCH_NAME, source };

    let name = if tier.uses_obj_ptr() {
        IS_IN_SAME_PACKAGE_OBJ_PTR
    } else {
        IS_IN_SAME_PACKAGE
    };

    let target = art.find_symbol(name).map_err(missing)?;
    let get_descriptor = art.find_symbol(GET_DESCRIPTOR).map_err(missing)?;

    if PATCH.markers.set(markers.to_vec()).is_err() {
        debug!("package markers already set, keeping the first ones");
    }
    PATCH.get_descriptor.store(Some(get_descriptor));

    unsafe {
        hooker.hook(target, on_is_in_same_package as *const (), Some(&on_is_in_same_package::ORIGINAL));
    }
    info!("{} hooked at {:#x}", PATCH_NAME, target.addr());

    Ok(Outcome::Applied { hooks: 1 })
}
