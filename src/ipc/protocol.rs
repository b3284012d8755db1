//! Wire format and schema validation for IPC messages.
//!
//! # Security
//! - Message size limits prevent memory exhaustion attacks
//! - Size is checked before parsing

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::residency::StatusReport;
use crate::synthesis::{AudioBuffer, SynthesisParams, SUPPORTED_LANGUAGES, SUPPORTED_TAGS};

/// Default maximum encoded message size.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024; // 16 MB

/// Smallest message limit the runtime accepts.
pub const MIN_MESSAGE_SIZE_LIMIT: usize = 4 * 1024;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Unique request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

/// Text-to-speech request from a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizeRequest {
    pub request_id: RequestId,
    pub text: String,
    #[serde(default)]
    pub parameters: SynthesisParams,
}

/// Generated audio returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizeResponse {
    pub request_id: RequestId,
    pub sample_rate: u32,
    pub samples: Vec<f32>,
    pub generation_ms: u64,
}

impl SynthesizeResponse {
    pub fn from_audio(request_id: RequestId, audio: AudioBuffer, generation_ms: u64) -> Self {
        Self {
            request_id,
            sample_rate: audio.sample_rate,
            samples: audio.samples,
            generation_ms,
        }
    }
}

/// One entry of the supported language list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub code: String,
    pub name: String,
}

impl LanguageInfo {
    /// Every language the synthesizer accepts.
    pub fn all() -> Vec<Self> {
        SUPPORTED_LANGUAGES
            .iter()
            .map(|(code, name)| LanguageInfo {
                code: code.to_string(),
                name: name.to_string(),
            })
            .collect()
    }
}

/// Operator-initiated transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionAction {
    Preload,
    Offload,
    Release,
}

/// All possible IPC message types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcMessage {
    #[serde(rename = "status_request")]
    StatusRequest,

    #[serde(rename = "status_response")]
    StatusResponse(StatusReport),

    #[serde(rename = "preload_request")]
    PreloadRequest,

    #[serde(rename = "offload_request")]
    OffloadRequest,

    #[serde(rename = "release_request")]
    ReleaseRequest,

    /// Result of a preload/offload/release, with the status afterwards.
    #[serde(rename = "transition_response")]
    TransitionResponse {
        action: TransitionAction,
        status: StatusReport,
    },

    /// `None` or zero disables the idle timeout.
    #[serde(rename = "idle_timeout_request")]
    IdleTimeoutRequest {
        #[serde(default)]
        timeout_secs: Option<u64>,
    },

    #[serde(rename = "idle_timeout_response")]
    IdleTimeoutResponse { idle_timeout_secs: Option<u64> },

    #[serde(rename = "supported_languages_request")]
    SupportedLanguagesRequest,

    #[serde(rename = "supported_languages_response")]
    SupportedLanguagesResponse { languages: Vec<LanguageInfo> },

    #[serde(rename = "supported_tags_request")]
    SupportedTagsRequest,

    #[serde(rename = "supported_tags_response")]
    SupportedTagsResponse { tags: Vec<String> },

    #[serde(rename = "synthesize_request")]
    SynthesizeRequest(SynthesizeRequest),

    #[serde(rename = "synthesize_response")]
    SynthesizeResponse(SynthesizeResponse),

    #[serde(rename = "error")]
    Error { code: u32, message: String },
}

impl IpcMessage {
    pub fn error(code: u32, message: impl Into<String>) -> Self {
        IpcMessage::Error {
            code,
            message: message.into(),
        }
    }

    pub fn supported_languages() -> Self {
        IpcMessage::SupportedLanguagesResponse {
            languages: LanguageInfo::all(),
        }
    }

    pub fn supported_tags() -> Self {
        IpcMessage::SupportedTagsResponse {
            tags: SUPPORTED_TAGS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// Encode message to JSON bytes with size limit enforcement.
pub fn encode_message(message: &IpcMessage, max: usize) -> Result<Vec<u8>, ProtocolError> {
    let bytes = serde_json::to_vec(message)?;
    if bytes.len() > max {
        return Err(ProtocolError::MessageTooLarge {
            size: bytes.len(),
            max,
        });
    }
    Ok(bytes)
}

/// Encode a response, replacing an oversized one with a 413 error.
pub fn encode_response(message: &IpcMessage, max: usize) -> Result<Vec<u8>, ProtocolError> {
    let bytes = serde_json::to_vec(message)?;
    if bytes.len() > max {
        let error_response = IpcMessage::error(
            413,
            format!("Response too large: {} bytes (max {})", bytes.len(), max),
        );
        return encode_message(&error_response, max);
    }
    Ok(bytes)
}

/// Decode message from JSON bytes with size limit enforcement.
///
/// # Security
/// Size check happens BEFORE parsing to prevent allocation attacks.
pub fn decode_message(bytes: &[u8], max: usize) -> Result<IpcMessage, ProtocolError> {
    if bytes.len() > max {
        return Err(ProtocolError::MessageTooLarge {
            size: bytes.len(),
            max,
        });
    }
    Ok(serde_json::from_slice(bytes)?)
}
