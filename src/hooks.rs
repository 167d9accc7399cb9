use std::ffi::c_void;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::error::ResolveError;
use crate::rtld::{Symbol, SymbolSource};

/// The single entry point exported by the inline hook engine.
///
/// Rewrites the code at `target` to jump to `replace`, and if `backup` is not null, stores
/// a callable address of the original function there.
pub type HookFunction = unsafe extern "C" fn(
    target: *mut c_void,
    replace: *mut c_void,
    backup: *mut *mut c_void
);

/// Holds an address a replacement reads at call time, such as a resolved libart function.
///
/// The slot starts out empty and is written once while installing the hook, before the
/// replacement can run. After that it is only ever read, from whichever VM threads call the
/// replacement.
#[repr(transparent)]
#[derive(Debug)]
pub struct AddressSlot(AtomicPtr<c_void>);

/// An [`AddressSlot`] the hook engine fills with the hooked function's original implementation.
pub type BackupSlot = AddressSlot;

impl AddressSlot {
    pub const fn new() -> Self {
        Self(AtomicPtr::new(std::ptr::null_mut()))
    }

    /// The location the hook engine writes the original's address to
    pub fn as_out_ptr(&self) -> *mut *mut c_void {
        self.0.as_ptr()
    }

    pub fn is_set(&self) -> bool {
        !self.0.load(Ordering::Acquire).is_null()
    }

    pub fn get_raw(&self) -> Option<Symbol> {
        Symbol::new(self.0.load(Ordering::Acquire))
    }

    /// Gets the address as a function pointer of type `F`, or `None` if the slot is still empty
    ///
    /// # Safety
    /// `F` has to be a function pointer type matching the function at that address.
    pub unsafe fn get<F: Copy>(&self) -> Option<F> {
        self.get_raw().map(|symbol| symbol.cast::<F>())
    }

    /// Stores an address resolved by this crate rather than by the hook engine
    pub(crate) fn store(&self, address: Option<Symbol>) {
        let ptr = address.map_or(std::ptr::null_mut(), Symbol::as_ptr);
        self.0.store(ptr, Ordering::Release);
    }
}

impl Default for AddressSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Something that can redirect a function to a replacement.
pub trait InlineHooker {
    /// Redirects `target` to `replace`, storing the original into `backup` if one is given.
    ///
    /// Hooks are permanent, there is no way to remove one.
    ///
    /// # Safety
    /// `replace` must have the same ABI and signature as the function at `target`, and
    /// `backup` must outlive every call to `replace`.
    unsafe fn hook(&self, target: Symbol, replace: *const (), backup: Option<&BackupSlot>);
}

/// Adapter over the hook engine's exported entry point.
#[derive(Debug, Copy, Clone)]
pub struct WhaleHooker {
    entry: HookFunction,
}

impl WhaleHooker {
    pub const ENTRY_SYMBOL: &'static str = "WInlineHookFunction";

    pub fn new(entry: HookFunction) -> Self {
        Self { entry }
    }

    /// Resolves the engine's entry point from an already loaded library
    pub fn from_library(library: &impl SymbolSource, entry_symbol: &str) -> Result<Self, ResolveError> {
        let entry = library.find_symbol(entry_symbol)?;
        Ok(Self::new(unsafe { entry.cast::<HookFunction>() }))
    }
}

impl InlineHooker for WhaleHooker {
    unsafe fn hook(&self, target: Symbol, replace: *const (), backup: Option<&BackupSlot>) {
        let backup = backup.map_or(std::ptr::null_mut(), BackupSlot::as_out_ptr);
        (self.entry)(target.as_ptr(), replace as *mut c_void, backup);
    }
}
