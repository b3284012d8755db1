//! Control-plane client used by the CLI and by other local processes.

use std::path::Path;

use interprocess::local_socket::tokio::{prelude::*, RecvHalf, SendHalf, Stream};
use interprocess::local_socket::{GenericFilePath, ToFsName};
use thiserror::Error;

use super::frame::{read_frame, write_frame, FrameError};
use super::protocol::{
    decode_message, encode_message, IpcMessage, LanguageInfo, ProtocolError, RequestId,
    SynthesizeRequest, SynthesizeResponse, TransitionAction, DEFAULT_MAX_MESSAGE_SIZE,
};
use crate::residency::StatusReport;
use crate::synthesis::SynthesisParams;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Failed to connect to {socket}: {source}")]
    Connect {
        socket: String,
        source: std::io::Error,
    },

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Server closed the connection")]
    Closed,

    #[error("Server error {code}: {message}")]
    Remote { code: u32, message: String },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// A connection to a running server.
pub struct IpcClient {
    recver: RecvHalf,
    sender: SendHalf,
    max_frame_size: usize,
    next_request_id: u64,
}

impl IpcClient {
    pub async fn connect(socket_path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = socket_path.as_ref();
        let connect_err = |source| ClientError::Connect {
            socket: path.display().to_string(),
            source,
        };
        let name = path.to_fs_name::<GenericFilePath>().map_err(connect_err)?;
        let conn = Stream::connect(name).await.map_err(connect_err)?;
        let (recver, sender) = conn.split();

        Ok(Self {
            recver,
            sender,
            max_frame_size: DEFAULT_MAX_MESSAGE_SIZE,
            next_request_id: 1,
        })
    }

    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    /// Send one message and wait for its response.
    ///
    /// `error` responses are returned as [`ClientError::Remote`].
    pub async fn request(&mut self, message: &IpcMessage) -> Result<IpcMessage, ClientError> {
        let bytes = encode_message(message, self.max_frame_size)?;
        write_frame(&mut self.sender, &bytes, self.max_frame_size).await?;

        let response = read_frame(&mut self.recver, self.max_frame_size)
            .await?
            .ok_or(ClientError::Closed)?;
        match decode_message(&response, self.max_frame_size)? {
            IpcMessage::Error { code, message } => Err(ClientError::Remote { code, message }),
            other => Ok(other),
        }
    }

    pub async fn status(&mut self) -> Result<StatusReport, ClientError> {
        match self.request(&IpcMessage::StatusRequest).await? {
            IpcMessage::StatusResponse(report) => Ok(report),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn preload(&mut self) -> Result<StatusReport, ClientError> {
        self.transition(IpcMessage::PreloadRequest, TransitionAction::Preload)
            .await
    }

    pub async fn offload(&mut self) -> Result<StatusReport, ClientError> {
        self.transition(IpcMessage::OffloadRequest, TransitionAction::Offload)
            .await
    }

    pub async fn release(&mut self) -> Result<StatusReport, ClientError> {
        self.transition(IpcMessage::ReleaseRequest, TransitionAction::Release)
            .await
    }

    /// Set the idle timeout in seconds; `None` or zero disables it.
    /// Returns the timeout now in effect.
    pub async fn set_idle_timeout(
        &mut self,
        timeout_secs: Option<u64>,
    ) -> Result<Option<u64>, ClientError> {
        match self
            .request(&IpcMessage::IdleTimeoutRequest { timeout_secs })
            .await?
        {
            IpcMessage::IdleTimeoutResponse { idle_timeout_secs } => Ok(idle_timeout_secs),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn supported_languages(&mut self) -> Result<Vec<LanguageInfo>, ClientError> {
        match self.request(&IpcMessage::SupportedLanguagesRequest).await? {
            IpcMessage::SupportedLanguagesResponse { languages } => Ok(languages),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn supported_tags(&mut self) -> Result<Vec<String>, ClientError> {
        match self.request(&IpcMessage::SupportedTagsRequest).await? {
            IpcMessage::SupportedTagsResponse { tags } => Ok(tags),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn synthesize(
        &mut self,
        text: &str,
        parameters: SynthesisParams,
    ) -> Result<SynthesizeResponse, ClientError> {
        let request_id = RequestId(self.next_request_id);
        self.next_request_id += 1;

        let message = IpcMessage::SynthesizeRequest(SynthesizeRequest {
            request_id,
            text: text.to_string(),
            parameters,
        });
        match self.request(&message).await? {
            IpcMessage::SynthesizeResponse(response) if response.request_id == request_id => {
                Ok(response)
            }
            other => Err(unexpected(&other)),
        }
    }

    async fn transition(
        &mut self,
        message: IpcMessage,
        expected: TransitionAction,
    ) -> Result<StatusReport, ClientError> {
        match self.request(&message).await? {
            IpcMessage::TransitionResponse { action, status } if action == expected => Ok(status),
            other => Err(unexpected(&other)),
        }
    }
}

fn unexpected(message: &IpcMessage) -> ClientError {
    let kind = serde_json::to_value(message)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string());
    ClientError::UnexpectedResponse(kind)
}
