//! Environment-based configuration.
//!
//! All settings are read once, on first use of [`CONFIG`]. An invalid value prints an error naming
//! the variable and exits the process.

use std::env::{self, VarError};
use std::path::PathBuf;
use std::process;
use std::str::FromStr;

use anyhow::{anyhow, Context};
use once_cell::sync::Lazy;

use crate::hand::FingerRules;
use crate::image::JpegBackend;
use crate::model::{DEFAULT_MODEL_PATH, DEFAULT_MODEL_URL};
use crate::report::{MessageStyle, ReportMode};

/// The process-wide configuration, read from the environment.
pub static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// `FINGERTRACK_MODEL_PATH`: where the model bundle is stored.
    pub model_path: PathBuf,
    /// `FINGERTRACK_MODEL_URL`: where the model bundle is downloaded from if missing.
    pub model_url: String,
    /// `FINGERTRACK_PALM_MODEL`: palm detection network to use instead of the bundled one.
    pub palm_model: Option<PathBuf>,
    /// `FINGERTRACK_LANDMARK_MODEL`: landmark network to use instead of the bundled one.
    pub landmark_model: Option<PathBuf>,
    /// `FINGERTRACK_WEBCAM_NAME`: webcam to open. If unset, the first usable device is opened.
    pub webcam_name: Option<String>,
    /// `FINGERTRACK_NUM_HANDS`: maximum number of hands to track.
    pub num_hands: usize,
    /// `FINGERTRACK_REPORT`: when to print finger states.
    pub report: ReportMode,
    /// `FINGERTRACK_MESSAGES`: how hands are named in printed messages.
    pub messages: MessageStyle,
    /// `FINGERTRACK_FINGER_RULES`: which predicates decide whether a finger is up.
    pub finger_rules: FingerRules,
    /// `FINGERTRACK_JPEG_BACKEND`: decoder for webcam frames.
    pub jpeg_backend: JpegBackend,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            model_url: DEFAULT_MODEL_URL.to_string(),
            palm_model: None,
            landmark_model: None,
            webcam_name: None,
            num_hands: 2,
            report: ReportMode::default(),
            messages: MessageStyle::default(),
            finger_rules: FingerRules::default(),
            jpeg_backend: JpegBackend::default(),
        }
    }
}

impl Config {
    fn from_env() -> Self {
        match Self::from_lookup(|var| env::var(var)) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{e:#}; exiting");
                process::exit(1);
            }
        }
    }

    /// Builds a configuration from a variable lookup function such as [`std::env::var`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Result<String, VarError>) -> anyhow::Result<Self> {
        let var = |name: &str| -> anyhow::Result<Option<String>> {
            match lookup(name) {
                Ok(v) => Ok(Some(v)),
                Err(VarError::NotPresent) => Ok(None),
                Err(VarError::NotUnicode(s)) => Err(anyhow!(
                    "invalid value set for `{name}` variable: {}",
                    s.to_string_lossy()
                )),
            }
        };
        let parse = |name: &str| -> anyhow::Result<Option<String>> {
            var(name).map(|v| v.filter(|v| !v.is_empty()))
        };

        let mut config = Self::default();
        if let Some(path) = parse("FINGERTRACK_MODEL_PATH")? {
            config.model_path = path.into();
        }
        if let Some(url) = parse("FINGERTRACK_MODEL_URL")? {
            config.model_url = url;
        }
        config.palm_model = parse("FINGERTRACK_PALM_MODEL")?.map(PathBuf::from);
        config.landmark_model = parse("FINGERTRACK_LANDMARK_MODEL")?.map(PathBuf::from);
        config.webcam_name = parse("FINGERTRACK_WEBCAM_NAME")?;
        if let Some(n) = parse_with("FINGERTRACK_NUM_HANDS", parse("FINGERTRACK_NUM_HANDS")?)? {
            if n == 0 {
                return Err(anyhow!(
                    "invalid value set for `FINGERTRACK_NUM_HANDS` variable: must be at least 1"
                ));
            }
            config.num_hands = n;
        }
        if let Some(mode) = parse_with("FINGERTRACK_REPORT", parse("FINGERTRACK_REPORT")?)? {
            config.report = mode;
        }
        if let Some(style) =
            parse_with("FINGERTRACK_MESSAGES", parse("FINGERTRACK_MESSAGES")?)?
        {
            config.messages = style;
        }
        if let Some(rules) =
            parse_with("FINGERTRACK_FINGER_RULES", parse("FINGERTRACK_FINGER_RULES")?)?
        {
            config.finger_rules = rules;
        }
        if let Some(backend) =
            parse_with("FINGERTRACK_JPEG_BACKEND", parse("FINGERTRACK_JPEG_BACKEND")?)?
        {
            config.jpeg_backend = backend;
        }

        Ok(config)
    }
}

fn parse_with<T>(name: &str, value: Option<String>) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|v| {
            v.parse::<T>()
                .map_err(|e| anyhow!("{e}"))
                .with_context(|| format!("invalid value set for `{name}` variable: '{v}'"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Result<String, VarError> {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |name: &str| vars.get(name).cloned().ok_or(VarError::NotPresent)
    }

    #[test]
    fn defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.model_path, PathBuf::from("hand_landmarker.task"));
        assert_eq!(config.num_hands, 2);
        assert_eq!(config.report, ReportMode::Changes);
        assert_eq!(config.messages, MessageStyle::Numbered);
        assert_eq!(config.finger_rules, FingerRules::Simple);
    }

    #[test]
    fn overrides() {
        let config = Config::from_lookup(lookup(&[
            ("FINGERTRACK_MODEL_PATH", "/tmp/hands.task"),
            ("FINGERTRACK_PALM_MODEL", "palm.onnx"),
            ("FINGERTRACK_WEBCAM_NAME", "Integrated Camera"),
            ("FINGERTRACK_NUM_HANDS", "4"),
            ("FINGERTRACK_REPORT", "every-frame"),
            ("FINGERTRACK_JPEG_BACKEND", "zune-jpeg"),
            ("FINGERTRACK_MESSAGES", "labelled"),
            ("FINGERTRACK_FINGER_RULES", "strict"),
            ("FINGERTRACK_LANDMARK_MODEL", ""),
        ]))
        .unwrap();

        assert_eq!(config.model_path, PathBuf::from("/tmp/hands.task"));
        assert_eq!(config.model_url, DEFAULT_MODEL_URL);
        assert_eq!(config.palm_model, Some(PathBuf::from("palm.onnx")));
        assert_eq!(config.landmark_model, None);
        assert_eq!(config.webcam_name.as_deref(), Some("Integrated Camera"));
        assert_eq!(config.num_hands, 4);
        assert_eq!(config.report, ReportMode::EveryFrame);
        assert_eq!(config.jpeg_backend, JpegBackend::ZuneJpeg);
        assert_eq!(config.messages, MessageStyle::Labelled);
        assert_eq!(config.finger_rules, FingerRules::Strict);
    }

    #[test]
    fn invalid_values_name_the_variable() {
        for (name, value) in [
            ("FINGERTRACK_NUM_HANDS", "two"),
            ("FINGERTRACK_NUM_HANDS", "0"),
            ("FINGERTRACK_REPORT", "always"),
            ("FINGERTRACK_JPEG_BACKEND", "mozjpeg"),
            ("FINGERTRACK_MESSAGES", "verbose"),
            ("FINGERTRACK_FINGER_RULES", "loose"),
        ] {
            let err = Config::from_lookup(lookup(&[(name, value)])).unwrap_err();
            assert!(format!("{err:#}").contains(name), "{err:#}");
        }
    }
}
