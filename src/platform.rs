//! Maps the raw Android API level onto the coarse tiers the patches care about.

/// A raw platform release level, as reported by `ro.build.version.sdk`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ApiLevel(pub i32);

impl ApiLevel {
    pub const LOLLIPOP: Self = Self(21);
    pub const OREO: Self = Self(26);
    pub const PIE: Self = Self(28);
    pub const Q: Self = Self(29);
    pub const R: Self = Self(30);

    /// Gets the feature tier for this level
    pub fn tier(self) -> Tier {
        Tier::probe(self.0)
    }
}

/// Coarse ordering of platform releases.
///
/// Each tier switches on a set of libart internals, so the patches decide what to
/// resolve by comparing tiers rather than raw levels.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    /// Older than 5.0, no ART to patch
    Unsupported,
    /// 5.0 - 7.1
    Lollipop,
    /// 8.0 - 8.1, `ObjPtr` calling convention and `DeoptimizeBootImage`
    Oreo,
    /// 9.0 and everything newer, hidden API enforcement
    Pie,
}

impl Tier {
    /// Maps a raw level to a tier. Levels newer than any known release map to the
    /// newest tier.
    pub fn probe(raw: i32) -> Self {
        match raw {
            level if level < ApiLevel::LOLLIPOP.0 => Self::Unsupported,
            level if level < ApiLevel::OREO.0 => Self::Lollipop,
            level if level < ApiLevel::PIE.0 => Self::Oreo,
            _ => Self::Pie,
        }
    }

    pub fn is_supported(self) -> bool {
        self >= Self::Lollipop
    }

    /// Whether `mirror::Class` methods take `ObjPtr<Class>` instead of a raw pointer
    pub fn uses_obj_ptr(self) -> bool {
        self >= Self::Oreo
    }

    pub fn has_boot_image_deopt(self) -> bool {
        self >= Self::Oreo
    }

    pub fn has_hidden_api(self) -> bool {
        self >= Self::Pie
    }
}

/// Queries the API level of the running system.
///
/// Returns `None` if the property is missing or is not a number.
#[cfg(target_os = "android")]
pub fn api_level() -> Option<ApiLevel> {
    use std::ffi::CStr;

    // bionic's PROP_VALUE_MAX
    const PROP_VALUE_MAX: usize = 92;

    let mut value = [0 as libc::c_char; PROP_VALUE_MAX];
    let len = unsafe {
        libc::__system_property_get(
            b"ro.build.version.sdk\0".as_ptr() as *const libc::c_char,
            value.as_mut_ptr()
        )
    };

    if len <= 0 {
        return None;
    }

    let value = unsafe { CStr::from_ptr(value.as_ptr()) };
    value.to_str().ok()?.trim().parse().ok().map(ApiLevel)
}

/// Queries the API level to emulate on a non-Android host, taken from `ARTPATCH_API_LEVEL`.
#[cfg(not(target_os = "android"))]
pub fn api_level() -> Option<ApiLevel> {
    std::env::var("ARTPATCH_API_LEVEL")
        .ok()?
        .trim()
        .parse()
        .ok()
        .map(ApiLevel)
}
