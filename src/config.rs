use crate::backend::FeatureLevel;
use crate::error::SessionError;

/// Wait bound for one frame acquisition, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u32 = 500;

/// Overrides [`CaptureConfig::timeout_ms`] in [`CaptureConfig::from_env`].
pub const TIMEOUT_ENV_VAR: &str = "DESKTOP_GRAB_TIMEOUT_MS";
/// Overrides [`CaptureConfig::output_index`] in [`CaptureConfig::from_env`].
pub const OUTPUT_INDEX_ENV_VAR: &str = "DESKTOP_GRAB_OUTPUT_INDEX";

/// Settings used when opening a [`CaptureSession`](crate::CaptureSession).
///
/// The defaults capture the first output of the default hardware adapter
/// with a 500 ms wait bound:
///
/// ```rust
/// use desktop_grab::{CaptureConfig, DEFAULT_TIMEOUT_MS};
///
/// let config = CaptureConfig::default();
/// assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
/// assert_eq!(config.output_index, 0);
///
/// let config = CaptureConfig::default().with_timeout_ms(100).with_output_index(1);
/// assert_eq!((config.timeout_ms, config.output_index), (100, 1));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureConfig {
    /// How long one `grab_frame` call blocks waiting for a desktop update.
    pub timeout_ms: u32,
    /// Which output of the device's adapter to duplicate. `0` is the first
    /// enumerated output.
    pub output_index: u32,
    /// Feature levels to try, most preferred first.
    pub feature_levels: Vec<FeatureLevel>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            output_index: 0,
            feature_levels: FeatureLevel::DEFAULT_PREFERENCE.to_vec(),
        }
    }
}

impl CaptureConfig {
    pub fn with_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_output_index(mut self, output_index: u32) -> Self {
        self.output_index = output_index;
        self
    }

    pub fn with_feature_levels(mut self, levels: impl IntoIterator<Item = FeatureLevel>) -> Self {
        self.feature_levels = levels.into_iter().collect();
        self
    }

    /// Default settings with the `DESKTOP_GRAB_*` environment overrides applied.
    ///
    /// Unset variables keep their default. Set but unparsable values are an error.
    pub fn from_env() -> Result<Self, SessionError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`CaptureConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SessionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(timeout_ms) = parse_var(&lookup, TIMEOUT_ENV_VAR)? {
            config.timeout_ms = timeout_ms;
        }
        if let Some(output_index) = parse_var(&lookup, OUTPUT_INDEX_ENV_VAR)? {
            config.output_index = output_index;
        }
        Ok(config)
    }

    /// Checks the settings before any device is created.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.feature_levels.is_empty() {
            return Err(SessionError::InvalidConfig(
                "at least one feature level is required".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<F>(lookup: &F, key: &str) -> Result<Option<u32>, SessionError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<u32>()
        .map(Some)
        .map_err(|_| SessionError::InvalidConfig(format!("{key}={raw:?} is not a valid u32")))
}
