//! IPC module for GG-RESIDENCY.
//!
//! Handles named pipe/Unix socket communication with local callers.
//! This is the ONLY external interface - no HTTP/REST/WebSocket allowed.

mod client;
mod frame;
mod handler;
mod protocol;
mod server;

pub use client::{ClientError, IpcClient};
pub use frame::{read_frame, write_frame, FrameError};
pub use handler::{HandlerError, IpcHandler, IpcHandlerConfig};
pub use protocol::{
    decode_message, encode_message, encode_response, IpcMessage, LanguageInfo, ProtocolError,
    RequestId, SynthesizeRequest, SynthesizeResponse, TransitionAction, DEFAULT_MAX_MESSAGE_SIZE,
    MIN_MESSAGE_SIZE_LIMIT,
};
pub use server::{serve, IpcServerConfig, ServerError};
