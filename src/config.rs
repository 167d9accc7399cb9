use crate::hooks::WhaleHooker;
use crate::platform::ApiLevel;

#[cfg(target_pointer_width = "64")]
const LIB_DIR: &str = "lib64";

#[cfg(not(target_pointer_width = "64"))]
const LIB_DIR: &str = "lib";

/// Where to find the libraries the patches need, and who gets to bypass package isolation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Path of libart on this platform release
    pub art_path: String,

    /// Path of the inline hook engine
    pub hook_engine_path: String,

    /// Name of the hook engine's install entry point
    pub hook_entry_symbol: String,

    /// Class descriptor substrings that are treated as being in every package
    pub markers: Vec<String>,
}

impl Config {
    /// Builds the default configuration for the given platform release, then applies any
    /// environment overrides
    pub fn for_api_level(level: ApiLevel) -> Self {
        let mut config = Self::defaults_for(level);
        config.apply_env_overrides();
        config
    }

    /// The stock configuration for the given platform release
    pub fn defaults_for(level: ApiLevel) -> Self {
        let art_path = if level >= ApiLevel::R {
            format!("/apex/com.android.art/{}/libart.so", LIB_DIR)
        } else if level >= ApiLevel::Q {
            format!("/apex/com.android.runtime/{}/libart.so", LIB_DIR)
        } else {
            format!("/system/{}/libart.so", LIB_DIR)
        };

        Self {
            art_path,
            hook_engine_path: format!("/system/{}/libwhale.edxp.so", LIB_DIR),
            hook_entry_symbol: WhaleHooker::ENTRY_SYMBOL.to_owned(),
            markers: vec![
                "EdHooker".to_owned(),
                "com/elderdrivers/riru/".to_owned(),
            ],
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("ARTPATCH_LIBART_PATH") {
            self.art_path = path;
        }
        if let Ok(path) = std::env::var("ARTPATCH_HOOK_ENGINE_PATH") {
            self.hook_engine_path = path;
        }
    }
}
