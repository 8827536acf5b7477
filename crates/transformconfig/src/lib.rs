use std::fmt;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

pub const DEFAULT_THREAD_NAME: &str = "pixel-transform";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TransformConfig {
    pub version: u32,
    #[serde(default)]
    pub worker: WorkerSection,
    #[serde(default)]
    pub defaults: Defaults,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            version: 1,
            worker: WorkerSection::default(),
            defaults: Defaults::default(),
        }
    }
}

/// Settings for the thread that serves each pipeline.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkerSection {
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
    #[serde(
        default = "default_join_timeout",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub join_timeout: Duration,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
            join_timeout: default_join_timeout(),
        }
    }
}

/// Initial pipeline state applied before any script step.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default)]
    pub orientation: OrientationSetting,
    #[serde(default)]
    pub rotation: i32,
    #[serde(default, deserialize_with = "deserialize_gravity")]
    pub video_gravity: GravitySetting,
    #[serde(
        default = "default_extent",
        deserialize_with = "deserialize_extent",
        serialize_with = "serialize_extent"
    )]
    pub extent: (u32, u32),
    #[serde(default)]
    pub resample_filter: FilterSetting,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            orientation: OrientationSetting::default(),
            rotation: 0,
            video_gravity: GravitySetting::default(),
            extent: default_extent(),
            resample_filter: FilterSetting::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrientationSetting {
    #[default]
    Up,
    Down,
    Left,
    Right,
    UpMirrored,
    DownMirrored,
    LeftMirrored,
    RightMirrored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GravitySetting {
    #[default]
    ResizeAspect,
    ResizeAspectFill,
    Resize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterSetting {
    Nearest,
    #[default]
    Linear,
    Cubic,
    Lanczos,
}

fn default_thread_name() -> String {
    DEFAULT_THREAD_NAME.to_string()
}

fn default_join_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_extent() -> (u32, u32) {
    (1280, 720)
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Duration::try_from_secs_f64(v)
                .map_err(|err| E::custom(format!("invalid duration {v}: {err}")))
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

fn deserialize_extent<'de, D>(deserializer: D) -> Result<(u32, u32), D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_extent(&raw).map_err(de::Error::custom)
}

fn serialize_extent<S>(value: &(u32, u32), serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format!("{}x{}", value.0, value.1))
}

/// Parses `WIDTHxHEIGHT`, e.g. `1920x1080`.
pub fn parse_extent(raw: &str) -> Result<(u32, u32), String> {
    let normalized = raw.trim().to_ascii_lowercase();
    let (width, height) = normalized
        .split_once('x')
        .ok_or_else(|| format!("invalid extent '{raw}'; expected WIDTHxHEIGHT"))?;
    let width = width
        .trim()
        .parse::<u32>()
        .map_err(|err| format!("invalid extent width in '{raw}': {err}"))?;
    let height = height
        .trim()
        .parse::<u32>()
        .map_err(|err| format!("invalid extent height in '{raw}': {err}"))?;
    Ok((width, height))
}

fn deserialize_gravity<'de, D>(deserializer: D) -> Result<GravitySetting, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_gravity(&raw).map_err(de::Error::custom)
}

fn parse_gravity(raw: &str) -> Result<GravitySetting, String> {
    let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
    match normalized.as_str() {
        "resize_aspect" | "aspect" | "fit" | "letterbox" => Ok(GravitySetting::ResizeAspect),
        "resize_aspect_fill" | "aspect_fill" | "fill" | "crop" => {
            Ok(GravitySetting::ResizeAspectFill)
        }
        "resize" | "stretch" => Ok(GravitySetting::Resize),
        other => Err(format!("invalid video gravity '{other}'")),
    }
}

impl TransformConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: TransformConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn join_timeout(&self) -> Duration {
        self.worker.join_timeout
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        let name = &self.worker.thread_name;
        if name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "worker.thread_name may not be empty".into(),
            ));
        }
        if name.contains('\0') {
            return Err(ConfigError::Invalid(
                "worker.thread_name may not contain NUL bytes".into(),
            ));
        }

        if self.worker.join_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "worker.join_timeout must be greater than zero".into(),
            ));
        }

        if !matches!(self.defaults.rotation, 0 | 90 | 180 | 270) {
            return Err(ConfigError::Invalid(format!(
                "defaults.rotation must be one of 0, 90, 180 or 270; got {}",
                self.defaults.rotation
            )));
        }

        let (width, height) = self.defaults.extent;
        if width == 0 || height == 0 {
            return Err(ConfigError::Invalid(format!(
                "defaults.extent must be non-zero; got {width}x{height}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1

[worker]
thread_name = "gl-transform"
join_timeout = "750ms"

[defaults]
orientation = "left_mirrored"
rotation = 270
video_gravity = "fill"
extent = "1920x1080"
resample_filter = "lanczos"
"#;

    #[test]
    fn parses_sample_config() {
        let config = TransformConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.worker.thread_name, "gl-transform");
        assert_eq!(config.join_timeout(), Duration::from_millis(750));
        assert_eq!(config.defaults.orientation, OrientationSetting::LeftMirrored);
        assert_eq!(config.defaults.rotation, 270);
        assert_eq!(config.defaults.video_gravity, GravitySetting::ResizeAspectFill);
        assert_eq!(config.defaults.extent, (1920, 1080));
        assert_eq!(config.defaults.resample_filter, FilterSetting::Lanczos);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config = TransformConfig::from_toml_str("version = 1").unwrap();
        assert_eq!(config, TransformConfig::default());
        assert_eq!(config.worker.thread_name, DEFAULT_THREAD_NAME);
        assert_eq!(config.defaults.extent, (1280, 720));
    }

    #[test]
    fn join_timeout_accepts_plain_seconds() {
        let config = TransformConfig::from_toml_str(
            r#"
version = 1
[worker]
join_timeout = 5
"#,
        )
        .unwrap();
        assert_eq!(config.join_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn join_timeout_out_of_range_is_a_parse_error() {
        for value in ["inf", "1e300", "nan"] {
            let input = format!("version = 1\n[worker]\njoin_timeout = {value}\n");
            let err = TransformConfig::from_toml_str(&input).unwrap_err();
            assert!(matches!(err, ConfigError::Parse(_)), "{value}: {err}");
        }

        let fractional = TransformConfig::from_toml_str(
            r#"
version = 1
[worker]
join_timeout = 0.25
"#,
        )
        .unwrap();
        assert_eq!(fractional.join_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = TransformConfig::from_toml_str("version = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_rotation_outside_quarter_turns() {
        let err = TransformConfig::from_toml_str(
            r#"
version = 1
[defaults]
rotation = 45
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("rotation"));
    }

    #[test]
    fn rejects_zero_timeout_and_empty_extent() {
        let zero_timeout = r#"
version = 1
[worker]
join_timeout = "0s"
"#;
        assert!(matches!(
            TransformConfig::from_toml_str(zero_timeout).unwrap_err(),
            ConfigError::Invalid(_)
        ));

        let empty_extent = r#"
version = 1
[defaults]
extent = "0x720"
"#;
        assert!(matches!(
            TransformConfig::from_toml_str(empty_extent).unwrap_err(),
            ConfigError::Invalid(_)
        ));
    }

    #[test]
    fn rejects_blank_thread_name() {
        let err = TransformConfig::from_toml_str(
            r#"
version = 1
[worker]
thread_name = "  "
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_extent_is_a_parse_error() {
        let err = TransformConfig::from_toml_str(
            r#"
version = 1
[defaults]
extent = "wide"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn serialises_back_to_parsable_toml() {
        let config = TransformConfig::from_toml_str(SAMPLE).unwrap();
        let rendered = config.to_toml_string().unwrap();
        assert!(rendered.contains("extent = \"1920x1080\""));
        assert_eq!(TransformConfig::from_toml_str(&rendered).unwrap(), config);
    }
}
