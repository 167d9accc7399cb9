//! Mock linker, libraries and hook engine shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::ResolveError;
use crate::hooks::{BackupSlot, InlineHooker};
use crate::rtld::{DynamicLinker, Symbol, SymbolSource};

static TEST_LOCK: Mutex<()> = Mutex::new(());

/// Serialises tests that touch the process-wide backup slots and patch state
pub fn lock() -> MutexGuard<'static, ()> {
    TEST_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default, Clone)]
pub struct MockLibrary {
    symbols: HashMap<String, usize>,
    lookups: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
}

impl MockLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_symbol(mut self, name: &str, addr: usize) -> Self {
        self.symbols.insert(name.to_owned(), addr);
        self
    }

    /// Every name looked up so far, in order
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl SymbolSource for MockLibrary {
    fn find_symbol(&self, name: &str) -> Result<Symbol, ResolveError> {
        self.lookups.lock().unwrap().push(name.to_owned());

        self.symbols
            .get(name)
            .copied()
            .and_then(Symbol::from_addr)
            .ok_or_else(|| ResolveError::SymbolNotFound {
                name: name.to_owned(),
                reason: "undefined symbol".to_owned(),
            })
    }
}

/// Handle given out by [`MockLinker`]; counts as closed once dropped.
#[derive(Debug)]
pub struct MockHandle(MockLibrary);

impl SymbolSource for MockHandle {
    fn find_symbol(&self, name: &str) -> Result<Symbol, ResolveError> {
        self.0.find_symbol(name)
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.0.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
pub struct MockLinker {
    libraries: HashMap<String, MockLibrary>,
    opens: AtomicUsize,
}

impl MockLinker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(mut self, path: &str, library: MockLibrary) -> Self {
        self.libraries.insert(path.to_owned(), library);
        self
    }

    pub fn library(&self, path: &str) -> &MockLibrary {
        &self.libraries[path]
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl DynamicLinker for MockLinker {
    type Library = MockHandle;

    fn open(&self, path: &str) -> Result<MockHandle, ResolveError> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        self.libraries
            .get(path)
            .cloned()
            .map(MockHandle)
            .ok_or_else(|| ResolveError::LibraryNotFound {
                path: path.to_owned(),
                reason: "not found".to_owned(),
            })
    }
}

/// A hook installation as seen by [`RecordingHooker`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledHook {
    pub target: usize,
    pub replace: usize,
    pub has_backup: bool,
}

/// Records every hook request and, where a backup slot is given, fills it with a
/// preconfigured original.
#[derive(Debug, Default)]
pub struct RecordingHooker {
    originals: HashMap<usize, usize>,
    installed: Mutex<Vec<InstalledHook>>,
}

impl RecordingHooker {
    pub fn new() -> Self {
        Self::default()
    }

    /// When `target` gets hooked, hand back `original` as its backup
    pub fn with_original(mut self, target: usize, original: usize) -> Self {
        self.originals.insert(target, original);
        self
    }

    pub fn installed(&self) -> Vec<InstalledHook> {
        self.installed.lock().unwrap().clone()
    }
}

impl InlineHooker for RecordingHooker {
    unsafe fn hook(&self, target: Symbol, replace: *const (), backup: Option<&BackupSlot>) {
        self.installed.lock().unwrap().push(InstalledHook {
            target: target.addr(),
            replace: replace as usize,
            has_backup: backup.is_some(),
        });

        if let Some(backup) = backup {
            let original = self.originals.get(&target.addr()).copied().and_then(Symbol::from_addr);
            backup.store(original);
        }
    }
}
