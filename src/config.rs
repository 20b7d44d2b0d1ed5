//! Configuration management for ocrlayer

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::ocr::OcrProvider;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub ocr: OcrConfig,
    pub render: RenderConfig,
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    pub engine: OcrProvider,
    /// Tesseract language string, e.g. `chi_sim+eng`
    pub language: String,
    pub psm: u8,
    /// Words below this confidence (0-100) are dropped
    pub min_confidence: f32,
    pub use_gpu: bool,
    pub tesseract_path: String,
    pub tessdata_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    /// Resolution for pages rasterized by MuPDF
    pub render_dpi: f32,
    /// Resolution assumed for images that store none
    pub image_dpi: f32,
    /// Leave pages that already carry text untouched
    pub skip_text: bool,
    pub show_progress: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    /// Use the polling backend instead of native notifications
    pub poll: bool,
    pub poll_interval: Duration,
    /// Interval between file size checks
    pub settle_delay: Duration,
    /// Give up waiting for a file that keeps growing
    pub settle_timeout: Duration,
    /// Repeated events for one path within this window are dropped
    pub debounce: Duration,
    /// Appended to the input stem for output names
    pub output_suffix: String,
    pub process_existing: bool,
}

/// Invalid value in the environment
#[derive(Debug, thiserror::Error)]
#[error("Invalid value for {key}: '{value}' ({reason})")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        OcrConfig {
            engine: OcrProvider::TesseractCli,
            language: "chi_sim+eng".to_string(),
            psm: 3,
            min_confidence: 0.0,
            use_gpu: false,
            tesseract_path: "tesseract".to_string(),
            tessdata_dir: None,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            render_dpi: 300.0,
            image_dpi: 96.0,
            skip_text: false,
            show_progress: true,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchConfig {
            poll: false,
            poll_interval: Duration::from_millis(1000),
            settle_delay: Duration::from_millis(500),
            settle_timeout: Duration::from_secs(60),
            debounce: Duration::from_secs(2),
            output_suffix: "_ocr".to_string(),
            process_existing: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Config {
            ocr: OcrConfig {
                engine: parse(&get, "OCRLAYER_ENGINE", defaults.ocr.engine)?,
                language: get("OCRLAYER_LANG").unwrap_or(defaults.ocr.language),
                psm: parse(&get, "OCRLAYER_PSM", defaults.ocr.psm)?,
                min_confidence: parse(&get, "OCRLAYER_MIN_CONFIDENCE", defaults.ocr.min_confidence)?,
                use_gpu: parse_bool(&get, "OCRLAYER_USE_GPU", defaults.ocr.use_gpu)?,
                tesseract_path: get("TESSERACT_PATH").unwrap_or(defaults.ocr.tesseract_path),
                tessdata_dir: get("TESSDATA_PREFIX").map(PathBuf::from),
            },
            render: RenderConfig {
                render_dpi: parse(&get, "OCRLAYER_RENDER_DPI", defaults.render.render_dpi)?,
                image_dpi: parse(&get, "OCRLAYER_IMAGE_DPI", defaults.render.image_dpi)?,
                skip_text: parse_bool(&get, "OCRLAYER_SKIP_TEXT", defaults.render.skip_text)?,
                show_progress: defaults.render.show_progress,
            },
            watch: WatchConfig {
                poll_interval: parse(&get, "OCRLAYER_POLL_INTERVAL_MS", 0u64)
                    .map(|ms| non_zero_millis(ms, defaults.watch.poll_interval))?,
                settle_delay: parse(&get, "OCRLAYER_SETTLE_MS", 0u64)
                    .map(|ms| non_zero_millis(ms, defaults.watch.settle_delay))?,
                output_suffix: get("OCRLAYER_OUTPUT_SUFFIX").unwrap_or(defaults.watch.output_suffix),
                ..defaults.watch
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |key: &'static str, v: f32| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(ConfigError {
                    key,
                    value: v.to_string(),
                    reason: "must be a positive number".into(),
                })
            }
        };
        positive("OCRLAYER_RENDER_DPI", self.render.render_dpi)?;
        positive("OCRLAYER_IMAGE_DPI", self.render.image_dpi)?;

        if self.ocr.psm > 13 {
            return Err(ConfigError {
                key: "OCRLAYER_PSM",
                value: self.ocr.psm.to_string(),
                reason: "page segmentation mode must be 0-13".into(),
            });
        }
        if !(0.0..=100.0).contains(&self.ocr.min_confidence) {
            return Err(ConfigError {
                key: "OCRLAYER_MIN_CONFIDENCE",
                value: self.ocr.min_confidence.to_string(),
                reason: "must be between 0 and 100".into(),
            });
        }
        Ok(())
    }
}

fn parse<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

fn parse_bool<G>(get: &G, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(value) => {
            let normalized = value.trim().to_ascii_lowercase();
            match normalized.as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError {
                    key,
                    value,
                    reason: "expected true or false".into(),
                }),
            }
        }
    }
}

fn non_zero_millis(ms: u64, default: Duration) -> Duration {
    if ms == 0 {
        default
    } else {
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.ocr.language, "chi_sim+eng");
        assert_eq!(config.ocr.engine, OcrProvider::TesseractCli);
        assert_eq!(config.render.image_dpi, 96.0);
        assert_eq!(config.watch.output_suffix, "_ocr");
        assert!(!config.ocr.use_gpu);
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("OCRLAYER_LANG", "jpn"),
            ("OCRLAYER_ENGINE", "tesseract"),
            ("OCRLAYER_USE_GPU", "yes"),
            ("OCRLAYER_PSM", "6"),
            ("OCRLAYER_SETTLE_MS", "250"),
            ("TESSDATA_PREFIX", "/usr/share/tessdata"),
        ]))
        .unwrap();
        assert_eq!(config.ocr.language, "jpn");
        assert_eq!(config.ocr.engine, OcrProvider::Tesseract);
        assert!(config.ocr.use_gpu);
        assert_eq!(config.ocr.psm, 6);
        assert_eq!(config.watch.settle_delay, Duration::from_millis(250));
        assert_eq!(config.ocr.tessdata_dir, Some(PathBuf::from("/usr/share/tessdata")));
    }

    #[test]
    fn test_invalid_values() {
        let err = Config::from_lookup(lookup(&[("OCRLAYER_RENDER_DPI", "abc")])).unwrap_err();
        assert_eq!(err.key, "OCRLAYER_RENDER_DPI");

        let err = Config::from_lookup(lookup(&[("OCRLAYER_SKIP_TEXT", "maybe")])).unwrap_err();
        assert_eq!(err.key, "OCRLAYER_SKIP_TEXT");

        let err = Config::from_lookup(lookup(&[("OCRLAYER_PSM", "42")])).unwrap_err();
        assert_eq!(err.key, "OCRLAYER_PSM");

        assert!(Config::from_lookup(lookup(&[("OCRLAYER_IMAGE_DPI", "0")])).is_err());
    }
}
