//! The one-shot installation pass that applies every patch.

use std::sync::Mutex;

use log::{error, info};

use crate::config::Config;
use crate::error::{InstallError, PatchError};
use crate::hooks::WhaleHooker;
use crate::patches::{self, Outcome};
use crate::platform::{self, ApiLevel};
use crate::rtld::{DynamicLinker, SystemLinker};

/// What a completed installation pass did, patch by patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub api_level: ApiLevel,
    pub same_package: Result<Outcome, PatchError>,
    pub runtime: Result<Outcome, PatchError>,
    pub hidden_api: Result<Outcome, PatchError>,
}

impl InstallReport {
    /// Total number of functions that were redirected
    pub fn hooks(&self) -> usize {
        [&self.same_package, &self.runtime, &self.hidden_api]
            .into_iter()
            .map(|result| match result {
                Ok(Outcome::Applied { hooks }) => *hooks,
                _ => 0,
            })
            .sum()
    }
}

/// Drives the patches against libart, at most once.
///
/// Once a pass has run to completion the installer stays installed, no matter how many of
/// the individual patches took effect. A pass that aborts early leaves it uninstalled.
pub struct Installer<L> {
    linker: L,
    installed: Mutex<bool>,
}

impl<L: DynamicLinker> Installer<L> {
    pub const fn new(linker: L) -> Self {
        Self {
            linker,
            installed: Mutex::new(false),
        }
    }

    pub fn is_installed(&self) -> bool {
        *self.installed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs the installation pass.
    ///
    /// # Returns
    /// * `Ok(Some(report))` - The pass ran to completion
    /// * `Ok(None)` - A previous pass already completed, nothing was done
    /// * `Err(InstallError)` - The pass aborted before patching anything
    pub fn install(&self, api_level: Option<ApiLevel>, config: &Config) -> Result<Option<InstallReport>, InstallError> {
        let mut installed = self.installed.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if *installed {
            info!("inline hooks installed, skip");
            return Ok(None);
        }

        info!("start to install inline hooks");
        let report = self.run(api_level, config).map_err(|e| {
            error!("{}", e);
            e
        })?;

        *installed = true;
        info!("install inline hooks done, {} functions hooked", report.hooks());
        Ok(Some(report))
    }

    fn run(&self, api_level: Option<ApiLevel>, config: &Config) -> Result<InstallReport, InstallError> {
        let api_level = match api_level {
            Some(level) if level.tier().is_supported() => level,
            other => return Err(InstallError::UnsupportedPlatform(other.map(|level| level.0))),
        };
        let tier = api_level.tier();
        info!("using api level {} ({:?})", api_level.0, tier);

        let engine = self.linker.open(&config.hook_engine_path)
            .map_err(InstallError::HookEngineUnavailable)?;
        let hooker = WhaleHooker::from_library(&engine, &config.hook_entry_symbol)
            .map_err(InstallError::HookEngineUnavailable)?;

        let art = self.linker.open(&config.art_path)
            .map_err(InstallError::RuntimeUnavailable)?;

        let same_package = patches::hook_is_in_same_package(tier, &art, &hooker, &config.markers);
        log_result("IsInSamePackage", &same_package);

        let runtime = patches::hook_runtime(tier, &art, &hooker);
        log_result("Runtime", &runtime);

        let hidden_api = patches::disable_hidden_api_policy(tier, &art, &hooker);
        log_result("disable_HiddenAPIPolicyImpl", &hidden_api);

        drop(engine);
        drop(art);

        Ok(InstallReport {
            api_level,
            same_package,
            runtime,
            hidden_api,
        })
    }
}

fn log_result(patch: &str, result: &Result<Outcome, PatchError>) {
    match result {
        Ok(Outcome::Applied { hooks }) => info!("{} done, {} hooked", patch, hooks),
        Ok(Outcome::Skipped) => info!("{} skipped on this platform", patch),
        Err(e) => error!("{} failed: {}", patch, e)
    }
}

static INSTALLER: Installer<SystemLinker> = Installer::new(SystemLinker);

/// Applies every patch to the running libart. Safe to call more than once; only the first
/// completed call does anything.
pub fn install_inline_hooks() {
    let api_level = platform::api_level();
    let config = Config::for_api_level(api_level.unwrap_or(ApiLevel::LOLLIPOP));

    // Failures are already logged, and the host keeps running without the bypasses
    let _ = INSTALLER.install(api_level, &config);
}

/// C entry point for the host framework.
#[no_mangle]
pub extern "C" fn artpatch_install_inline_hooks() {
    install_inline_hooks()
}

#[cfg(test)]
mod tests {
    use std::ffi::c_void;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::patches::{hidden_api, runtime, same_package};
    use crate::testing::{self, MockLibrary, MockLinker};

    const ENGINE: &str = "/system/lib64/libwhale.edxp.so";
    const ART: &str = "/system/lib64/libart.so";

    static ENGINE_CALLS: AtomicUsize = AtomicUsize::new(0);

    // Counts hook requests without touching any code or backup slot
    unsafe extern "C" fn counting_engine(_target: *mut c_void, _replace: *mut c_void, _backup: *mut *mut c_void) {
        ENGINE_CALLS.fetch_add(1, Ordering::SeqCst);
    }

    fn config() -> Config {
        Config {
            art_path: ART.to_owned(),
            hook_engine_path: ENGINE.to_owned(),
            ..Config::defaults_for(ApiLevel::PIE)
        }
    }

    fn engine_library() -> MockLibrary {
        MockLibrary::new().with_symbol(WhaleHooker::ENTRY_SYMBOL, counting_engine as *const () as usize)
    }

    fn full_art_library() -> MockLibrary {
        let mut art = MockLibrary::new()
            .with_symbol(same_package::IS_IN_SAME_PACKAGE_OBJ_PTR, 0x1000)
            .with_symbol(same_package::GET_DESCRIPTOR, 0x1100)
            .with_symbol(runtime::RUNTIME_INSTANCE, 0x2000)
            .with_symbol(runtime::RUNTIME_INIT, 0x2100)
            .with_symbol(runtime::DEOPTIMIZE_BOOT_IMAGE, 0x2200);
        for (i, (name, _)) in hidden_api::VARIANTS.iter().enumerate() {
            art = art.with_symbol(name, 0x3000 + i * 0x100);
        }
        art
    }

    fn linker() -> MockLinker {
        MockLinker::new()
            .with_library(ENGINE, engine_library())
            .with_library(ART, full_art_library())
    }

    #[test]
    fn unsupported_platform_loads_nothing() {
        let _lock = testing::lock();
        for level in [None, Some(ApiLevel(0)), Some(ApiLevel(19)), Some(ApiLevel(20))] {
            let installer = Installer::new(linker());

            let err = installer.install(level, &config()).unwrap_err();

            assert_eq!(err, InstallError::UnsupportedPlatform(level.map(|level| level.0)));
            assert_eq!(installer.linker.opens(), 0);
            assert!(!installer.is_installed());
        }
    }

    #[cfg(not(target_os = "android"))]
    #[test]
    fn unparsable_api_level_is_unsupported() {
        let _lock = testing::lock();
        std::env::set_var("ARTPATCH_API_LEVEL", "tiramisu");
        let level = platform::api_level();
        std::env::remove_var("ARTPATCH_API_LEVEL");

        let installer = Installer::new(linker());
        let err = installer.install(level, &config()).unwrap_err();

        assert_eq!(err, InstallError::UnsupportedPlatform(None));
        assert_eq!(installer.linker.opens(), 0);
        assert!(!installer.is_installed());
    }

    #[test]
    fn installs_once() {
        let _lock = testing::lock();
        ENGINE_CALLS.store(0, Ordering::SeqCst);
        let installer = Installer::new(linker());

        let report = installer.install(Some(ApiLevel::PIE), &config()).unwrap().unwrap();
        assert!(installer.is_installed());
        assert_eq!(installer.linker.opens(), 2);
        assert_eq!(report.hooks(), 6);
        assert_eq!(ENGINE_CALLS.load(Ordering::SeqCst), 6);

        assert_eq!(installer.install(Some(ApiLevel::PIE), &config()), Ok(None));
        assert_eq!(installer.linker.opens(), 2);
        assert_eq!(ENGINE_CALLS.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn releases_both_libraries() {
        let _lock = testing::lock();
        let installer = Installer::new(linker());

        installer.install(Some(ApiLevel::OREO), &config()).unwrap();

        assert_eq!(installer.linker.library(ENGINE).closes(), 1);
        assert_eq!(installer.linker.library(ART).closes(), 1);
    }

    #[test]
    fn missing_engine_aborts_without_installing() {
        let _lock = testing::lock();
        let installer = Installer::new(MockLinker::new().with_library(ART, full_art_library()));

        let err = installer.install(Some(ApiLevel::PIE), &config()).unwrap_err();

        assert!(matches!(err, InstallError::HookEngineUnavailable(_)));
        assert!(!installer.is_installed());
        assert_eq!(installer.linker.opens(), 1);

        // Nothing was recorded, so the next call tries again
        assert!(installer.install(Some(ApiLevel::PIE), &config()).is_err());
        assert_eq!(installer.linker.opens(), 2);
    }

    #[test]
    fn missing_entry_point_aborts() {
        let _lock = testing::lock();
        let installer = Installer::new(
            MockLinker::new()
                .with_library(ENGINE, MockLibrary::new())
                .with_library(ART, full_art_library())
        );

        let err = installer.install(Some(ApiLevel::PIE), &config()).unwrap_err();

        assert!(matches!(err, InstallError::HookEngineUnavailable(_)));
        assert!(!installer.is_installed());
        assert_eq!(installer.linker.library(ENGINE).closes(), 1);
    }

    #[test]
    fn missing_art_aborts_and_releases_engine() {
        let _lock = testing::lock();
        let installer = Installer::new(MockLinker::new().with_library(ENGINE, engine_library()));

        let err = installer.install(Some(ApiLevel::PIE), &config()).unwrap_err();

        assert!(matches!(err, InstallError::RuntimeUnavailable(_)));
        assert!(!installer.is_installed());
        assert_eq!(installer.linker.library(ENGINE).closes(), 1);
    }

    #[test]
    fn failing_patches_still_complete_the_pass() {
        let _lock = testing::lock();
        ENGINE_CALLS.store(0, Ordering::SeqCst);
        let installer = Installer::new(
            MockLinker::new()
                .with_library(ENGINE, engine_library())
                .with_library(ART, MockLibrary::new())
        );

        let report = installer.install(Some(ApiLevel::PIE), &config()).unwrap().unwrap();

        assert!(report.same_package.is_err());
        assert!(report.runtime.is_err());
        assert!(report.hidden_api.is_err());
        assert_eq!(report.hooks(), 0);
        assert_eq!(ENGINE_CALLS.load(Ordering::SeqCst), 0);
        assert!(installer.is_installed());
    }

    #[test]
    fn older_platforms_skip_newer_patches() {
        let _lock = testing::lock();
        let art = MockLibrary::new()
            .with_symbol(same_package::IS_IN_SAME_PACKAGE, 0x1000)
            .with_symbol(same_package::GET_DESCRIPTOR, 0x1100);
        let installer = Installer::new(
            MockLinker::new()
                .with_library(ENGINE, engine_library())
                .with_library(ART, art)
        );

        let report = installer.install(Some(ApiLevel::LOLLIPOP), &config()).unwrap().unwrap();

        assert_eq!(report.same_package, Ok(Outcome::Applied { hooks: 1 }));
        assert_eq!(report.runtime, Ok(Outcome::Skipped));
        assert_eq!(report.hidden_api, Ok(Outcome::Skipped));
    }
}
