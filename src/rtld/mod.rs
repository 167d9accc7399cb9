//! Thin layer over the dynamic linker: opening libraries and resolving symbols by their
//! mangled name, including libart's internal (non-public) C++ symbols.

use std::ffi::{c_void, CStr, CString};
use std::ptr::NonNull;

use crate::error::ResolveError;

/// The address of a resolved symbol. Never null.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Symbol(NonNull<c_void>);

// A symbol is an address inside a mapped library and carries no ownership
unsafe impl Send for Symbol {}
unsafe impl Sync for Symbol {}

impl Symbol {
    pub fn new(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn from_addr(addr: usize) -> Option<Self> {
        Self::new(addr as *mut c_void)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }

    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }

    /// Reinterprets the symbol as a function pointer of type `F`
    ///
    /// # Safety
    /// `F` has to be a function pointer type matching the ABI and signature of the code at
    /// this address.
    pub unsafe fn cast<F: Copy>(self) -> F {
        debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<*mut c_void>());
        let ptr = self.as_ptr();
        std::mem::transmute_copy::<*mut c_void, F>(&ptr)
    }
}

/// Anything symbols can be looked up in by name.
pub trait SymbolSource {
    fn find_symbol(&self, name: &str) -> Result<Symbol, ResolveError>;
}

/// Opens libraries by path.
pub trait DynamicLinker {
    type Library: SymbolSource;

    fn open(&self, path: &str) -> Result<Self::Library, ResolveError>;
}

/// The process' own dynamic linker (`dlopen`/`dlsym`/`dlclose`).
#[derive(Debug, Default, Copy, Clone)]
pub struct SystemLinker;

impl DynamicLinker for SystemLinker {
    type Library = Library;

    fn open(&self, path: &str) -> Result<Library, ResolveError> {
        Library::open(path)
    }
}

/// A library handle returned from `dlopen`, closed again on drop.
#[derive(Debug)]
pub struct Library {
    handle: NonNull<c_void>,
    path: String,
}

impl Library {
    pub fn open(path: &str) -> Result<Self, ResolveError> {
        let c_path = CString::new(path).map_err(|_| ResolveError::InvalidName(path.to_owned()))?;

        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_LAZY | libc::RTLD_GLOBAL) };

        match NonNull::new(handle) {
            Some(handle) => Ok(Self { handle, path: path.to_owned() }),
            None => Err(ResolveError::LibraryNotFound {
                path: path.to_owned(),
                reason: last_error(),
            })
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl SymbolSource for Library {
    fn find_symbol(&self, name: &str) -> Result<Symbol, ResolveError> {
        let c_name = CString::new(name).map_err(|_| ResolveError::InvalidName(name.to_owned()))?;

        // Clear any stale error so the diagnostic below belongs to this lookup
        unsafe { libc::dlerror(); }

        let address = unsafe { libc::dlsym(self.handle.as_ptr(), c_name.as_ptr()) };

        Symbol::new(address).ok_or_else(|| ResolveError::SymbolNotFound {
            name: name.to_owned(),
            reason: last_error(),
        })
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        if unsafe { libc::dlclose(self.handle.as_ptr()) } != 0 {
            log::warn!("dlclose({}) failed: {}", self.path, last_error());
        }
    }
}

/// Takes the pending `dlerror` message, if any
fn last_error() -> String {
    let error = unsafe { libc::dlerror() };
    if error.is_null() {
        "unknown error".to_owned()
    } else {
        unsafe { CStr::from_ptr(error) }.to_string_lossy().into_owned()
    }
}
