use chrono::{DateTime, Utc};

/// supported C standards
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CStandard {
    C99,
    C11,
}

impl From<&str> for CStandard {
    fn from(s: &str) -> Self {
        match s {
            "c99" => CStandard::C99,
            _ => CStandard::C11, // default to C11
        }
    }
}

impl CStandard {
    /// Value of `__STDC_VERSION__`
    pub fn version(self) -> i64 {
        match self {
            CStandard::C99 => 199901,
            CStandard::C11 => 201112,
        }
    }
}

bitflags::bitflags! {
    /// Conditional features advertised through `__STDC_*__` macros
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct FeatureFlags: u16 {
        const UTF16 = 1 << 0;
        const UTF32 = 1 << 1;
        const IEC559 = 1 << 2;
        const IEC559_COMPLEX = 1 << 3;
        const NO_ATOMICS = 1 << 4;
        const NO_COMPLEX = 1 << 5;
        const NO_THREADS = 1 << 6;
        const NO_VLA = 1 << 7;
    }
}

impl FeatureFlags {
    /// Macro name advertising each flag, in the order they are predefined.
    pub const MACROS: [(FeatureFlags, &'static str); 8] = [
        (FeatureFlags::UTF16, "__STDC_UTF_16__"),
        (FeatureFlags::UTF32, "__STDC_UTF_32__"),
        (FeatureFlags::IEC559, "__STDC_IEC_559__"),
        (FeatureFlags::IEC559_COMPLEX, "__STDC_IEC_559_COMPLEX__"),
        (FeatureFlags::NO_ATOMICS, "__STDC_NO_ATOMICS__"),
        (FeatureFlags::NO_COMPLEX, "__STDC_NO_COMPLEX__"),
        (FeatureFlags::NO_THREADS, "__STDC_NO_THREADS__"),
        (FeatureFlags::NO_VLA, "__STDC_NO_VLA__"),
    ];
}

/// Translation environment: everything the predefined macros depend on.
///
/// Two runs with equal environments produce byte-identical predefined macros.
#[derive(Clone, Debug, PartialEq)]
pub struct Environment {
    pub timestamp: DateTime<Utc>,
    pub hosted: bool,
    pub version: i64,
    pub features: FeatureFlags,
}

impl Default for Environment {
    fn default() -> Self {
        Environment {
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            hosted: true,
            version: CStandard::C11.version(),
            features: FeatureFlags::UTF16
                | FeatureFlags::UTF32
                | FeatureFlags::NO_COMPLEX
                | FeatureFlags::NO_THREADS
                | FeatureFlags::NO_VLA
                | FeatureFlags::NO_ATOMICS,
        }
    }
}

impl Environment {
    pub fn with_standard(standard: CStandard) -> Self {
        Environment {
            version: standard.version(),
            ..Default::default()
        }
    }

    /// Environment stamped with the current wall-clock time.
    pub fn now() -> Self {
        Environment {
            timestamp: Utc::now(),
            ..Default::default()
        }
    }

    /// `__DATE__` spelling, e.g. `Jan  1 1970`.
    pub fn date_string(&self) -> String {
        self.timestamp.format("%b %e %Y").to_string()
    }

    /// `__TIME__` spelling, e.g. `00:00:00`.
    pub fn time_string(&self) -> String {
        self.timestamp.format("%H:%M:%S").to_string()
    }
}
