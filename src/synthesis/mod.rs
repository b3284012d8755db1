//! Text-to-speech capability consumed by the front ends.
//!
//! The manager is agnostic to what the model does; front ends that serve
//! synthesis requests require the model to implement [`Synthesizer`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::residency::{ModelError, ResidentModel};

/// Non-verbal sound tags that may be embedded in the text.
pub const SUPPORTED_TAGS: &[&str] = &[
    "[clear throat]",
    "[sigh]",
    "[shush]",
    "[cough]",
    "[groan]",
    "[sniff]",
    "[gasp]",
    "[chuckle]",
    "[laugh]",
];

/// Language codes accepted in `language_id`, with English names.
///
/// Only multilingual models honour codes other than `en`.
pub const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[
    ("ar", "Arabic"),
    ("da", "Danish"),
    ("de", "German"),
    ("el", "Greek"),
    ("en", "English"),
    ("es", "Spanish"),
    ("fi", "Finnish"),
    ("fr", "French"),
    ("he", "Hebrew"),
    ("hi", "Hindi"),
    ("it", "Italian"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("ms", "Malay"),
    ("nl", "Dutch"),
    ("no", "Norwegian"),
    ("pl", "Polish"),
    ("pt", "Portuguese"),
    ("ru", "Russian"),
    ("sv", "Swedish"),
    ("sw", "Swahili"),
    ("tr", "Turkish"),
    ("zh", "Chinese"),
];

pub fn is_supported_language(code: &str) -> bool {
    SUPPORTED_LANGUAGES.iter().any(|(c, _)| *c == code)
}

/// A model that turns text into audio.
pub trait Synthesizer: ResidentModel {
    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    fn generate(&self, text: &str, params: &SynthesisParams) -> Result<AudioBuffer, ModelError>;
}

/// Mono PCM samples in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl AudioBuffer {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Sampling parameters for one synthesis call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repetition_penalty: f32,
    /// Expressiveness (standard and multilingual models).
    pub exaggeration: f32,
    pub cfg_weight: f32,
    pub language_id: String,
    /// Reference audio for voice cloning.
    pub audio_prompt_path: Option<PathBuf>,
}

impl Default for SynthesisParams {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            top_p: 0.95,
            top_k: 1000,
            repetition_penalty: 1.2,
            exaggeration: 0.0,
            cfg_weight: 0.0,
            language_id: "en".to_string(),
            audio_prompt_path: None,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SynthesisError {
    #[error("text is required")]
    EmptyText,

    #[error("{field} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("unsupported language_id {0:?}")]
    UnsupportedLanguage(String),
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), SynthesisError> {
    if value.is_nan() || value < min || value > max {
        return Err(SynthesisError::OutOfRange { field, value, min, max });
    }
    Ok(())
}

impl SynthesisParams {
    /// Reject empty text, out-of-range sampling parameters and unknown
    /// language codes.
    pub fn validate(&self, text: &str) -> Result<(), SynthesisError> {
        if text.trim().is_empty() {
            return Err(SynthesisError::EmptyText);
        }
        check_range("temperature", self.temperature.into(), 0.1, 2.0)?;
        check_range("top_p", self.top_p.into(), 0.0, 1.0)?;
        check_range("top_k", self.top_k.into(), 0.0, 1000.0)?;
        check_range("repetition_penalty", self.repetition_penalty.into(), 1.0, 2.0)?;
        check_range("exaggeration", self.exaggeration.into(), 0.0, 1.0)?;
        check_range("cfg_weight", self.cfg_weight.into(), 0.0, 1.0)?;
        if !is_supported_language(&self.language_id) {
            return Err(SynthesisError::UnsupportedLanguage(self.language_id.clone()));
        }
        Ok(())
    }
}
