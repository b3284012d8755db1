//! Request/response handling for IPC connections.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use super::protocol::{
    decode_message, encode_response, IpcMessage, ProtocolError, SynthesizeRequest,
    SynthesizeResponse, TransitionAction, DEFAULT_MAX_MESSAGE_SIZE,
};
use crate::residency::{ModelError, ModelLoader, ResidencyError, ResidencyManager};
use crate::synthesis::{AudioBuffer, SynthesisError, SynthesisParams, Synthesizer};

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] SynthesisError),

    #[error(transparent)]
    Residency(#[from] ResidencyError),

    #[error("Inference failed: {0}")]
    Inference(#[from] ModelError),
}

impl HandlerError {
    /// Status code carried in the `error` response.
    pub fn code(&self) -> u32 {
        match self {
            HandlerError::Protocol(ProtocolError::MessageTooLarge { .. }) => 413,
            HandlerError::Protocol(_) | HandlerError::InvalidRequest(_) => 400,
            HandlerError::Residency(ResidencyError::NoLoaderAvailable) => 503,
            HandlerError::Residency(ResidencyError::DrainTimeout { .. }) => 409,
            HandlerError::Residency(_) | HandlerError::Inference(_) => 500,
        }
    }

    fn into_message(self) -> IpcMessage {
        IpcMessage::error(self.code(), self.to_string())
    }
}

/// Configuration for IPC handler.
#[derive(Debug, Clone)]
pub struct IpcHandlerConfig {
    /// Offload to host after every synthesis request.
    pub offload_after_use: bool,
    pub max_message_size: usize,
}

impl Default for IpcHandlerConfig {
    fn default() -> Self {
        Self {
            offload_after_use: false,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// Maps IPC messages onto manager operations.
pub struct IpcHandler<M: Synthesizer> {
    manager: Arc<ResidencyManager<M>>,
    loader: Arc<dyn ModelLoader<M>>,
    config: IpcHandlerConfig,
}

impl<M: Synthesizer> IpcHandler<M> {
    pub fn new(
        manager: Arc<ResidencyManager<M>>,
        loader: Arc<dyn ModelLoader<M>>,
        config: IpcHandlerConfig,
    ) -> Self {
        Self {
            manager,
            loader,
            config,
        }
    }

    pub fn config(&self) -> &IpcHandlerConfig {
        &self.config
    }

    /// Process incoming message bytes and return response bytes.
    ///
    /// Undecodable input yields an `error` response rather than an `Err`;
    /// only a failure to encode the response itself is returned.
    pub async fn process(&self, bytes: &[u8]) -> Result<Vec<u8>, HandlerError> {
        let response = match decode_message(bytes, self.config.max_message_size) {
            Ok(message) => self.handle_message(message).await,
            Err(e) => {
                tracing::debug!(error = %e, "rejecting malformed IPC message");
                HandlerError::from(e).into_message()
            }
        };
        Ok(encode_response(&response, self.config.max_message_size)?)
    }

    /// Dispatch a decoded message.
    pub async fn handle_message(&self, message: IpcMessage) -> IpcMessage {
        match message {
            IpcMessage::StatusRequest => IpcMessage::StatusResponse(self.manager.status().await),

            IpcMessage::PreloadRequest => {
                let result = self.manager.preload(self.loader.clone()).await;
                self.transition_response(TransitionAction::Preload, result).await
            }

            IpcMessage::OffloadRequest => {
                let result = self.manager.offload().await;
                self.transition_response(TransitionAction::Offload, result).await
            }

            IpcMessage::ReleaseRequest => {
                self.manager.release().await;
                self.transition_response(TransitionAction::Release, Ok(())).await
            }

            IpcMessage::IdleTimeoutRequest { timeout_secs } => {
                self.manager
                    .configure_idle_timeout(timeout_secs.map(Duration::from_secs));
                IpcMessage::IdleTimeoutResponse {
                    idle_timeout_secs: self.manager.idle_timeout().map(|t| t.as_secs()),
                }
            }

            IpcMessage::SupportedLanguagesRequest => IpcMessage::supported_languages(),

            IpcMessage::SupportedTagsRequest => IpcMessage::supported_tags(),

            IpcMessage::SynthesizeRequest(request) => match self.handle_synthesize(request).await {
                Ok(response) => IpcMessage::SynthesizeResponse(response),
                Err(e) => e.into_message(),
            },

            _ => IpcMessage::error(400, "Unexpected message type"),
        }
    }

    async fn transition_response(
        &self,
        action: TransitionAction,
        result: Result<(), ResidencyError>,
    ) -> IpcMessage {
        match result {
            Ok(()) => IpcMessage::TransitionResponse {
                action,
                status: self.manager.status().await,
            },
            Err(e) => HandlerError::from(e).into_message(),
        }
    }

    async fn handle_synthesize(
        &self,
        request: SynthesizeRequest,
    ) -> Result<SynthesizeResponse, HandlerError> {
        request.parameters.validate(&request.text)?;

        let started = Instant::now();
        let result = self.generate(request.text, request.parameters).await;

        if self.config.offload_after_use {
            if let Err(e) = self.manager.offload().await {
                tracing::warn!(error = %e, "offload after synthesis failed");
            }
        }

        let audio = result?;
        let generation_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            request_id = request.request_id.0,
            samples = audio.samples.len(),
            generation_ms,
            "synthesis complete"
        );
        Ok(SynthesizeResponse::from_audio(request.request_id, audio, generation_ms))
    }

    async fn generate(
        &self,
        text: String,
        params: SynthesisParams,
    ) -> Result<AudioBuffer, HandlerError> {
        let lease = self.manager.acquire(Some(self.loader.clone())).await?;
        let audio = tokio::task::spawn_blocking(move || lease.generate(&text, &params))
            .await
            .map_err(|e| ModelError::Panicked(e.to_string()))??;
        Ok(audio)
    }
}
