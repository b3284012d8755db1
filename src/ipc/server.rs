//! Local-socket server for the control plane.
//!
//! One task per connection; each connection carries any number of
//! request/response frames in sequence. The number of live connections is
//! capped, and excess callers receive a 503 before being dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use interprocess::local_socket::tokio::{prelude::*, Listener, Stream};
use interprocess::local_socket::{GenericFilePath, ListenerOptions, ToFsName};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::frame::{read_frame, write_frame, FrameError};
use super::handler::IpcHandler;
use super::protocol::{encode_message, IpcMessage};
use crate::synthesis::Synthesizer;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Socket {} is already served by another process", .path.display())]
    AddressInUse { path: PathBuf },

    #[error("Failed to bind {}: {source}", .path.display())]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct IpcServerConfig {
    pub socket_path: PathBuf,
    pub max_connections: usize,
    pub max_frame_size: usize,
}

/// Serve `handler` until `shutdown` is cancelled.
///
/// On shutdown the listener stops accepting, in-progress requests finish,
/// and the socket file is removed.
pub async fn serve<M: Synthesizer>(
    config: IpcServerConfig,
    handler: Arc<IpcHandler<M>>,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let listener = bind(&config.socket_path).await?;
    let limit = Arc::new(Semaphore::new(config.max_connections));
    let mut connections = JoinSet::new();
    tracing::info!(
        socket = %config.socket_path.display(),
        max_connections = config.max_connections,
        "IPC server listening"
    );

    loop {
        let conn = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to accept IPC connection");
                    continue;
                }
            },
            // Reap finished connection tasks.
            Some(_) = connections.join_next(), if !connections.is_empty() => continue,
        };

        let Ok(permit) = limit.clone().try_acquire_owned() else {
            tracing::warn!(max = config.max_connections, "connection limit reached, rejecting");
            reject(conn, config.max_frame_size).await;
            continue;
        };

        let handler = handler.clone();
        let shutdown = shutdown.clone();
        let max_frame = config.max_frame_size;
        connections.spawn(async move {
            let _permit = permit;
            if let Err(e) = handle_connection(conn, handler, max_frame, shutdown).await {
                tracing::debug!(error = %e, "IPC connection closed with error");
            }
        });
    }

    tracing::info!(active = connections.len(), "IPC server stopping");
    while connections.join_next().await.is_some() {}
    drop(listener);
    remove_socket_file(&config.socket_path);
    Ok(())
}

async fn bind(path: &Path) -> Result<Listener, ServerError> {
    let bind_err = |source| ServerError::Bind {
        path: path.to_path_buf(),
        source,
    };

    if cfg!(unix) && path.exists() {
        let name = path.to_fs_name::<GenericFilePath>().map_err(bind_err)?;
        if Stream::connect(name).await.is_ok() {
            return Err(ServerError::AddressInUse {
                path: path.to_path_buf(),
            });
        }
        tracing::debug!(socket = %path.display(), "removing stale socket file");
        remove_socket_file(path);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if cfg!(unix) && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(bind_err)?;
        }
    }

    let name = path.to_fs_name::<GenericFilePath>().map_err(bind_err)?;
    ListenerOptions::new()
        .name(name)
        .create_tokio()
        .map_err(bind_err)
}

fn remove_socket_file(path: &Path) {
    if !cfg!(unix) {
        return;
    }
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(socket = %path.display(), error = %e, "failed to remove socket file");
        }
    }
}

async fn reject(conn: Stream, max_frame: usize) {
    let (_, mut sender) = conn.split();
    let message = IpcMessage::error(503, "Too many connections");
    if let Ok(bytes) = encode_message(&message, max_frame) {
        let _ = write_frame(&mut sender, &bytes, max_frame).await;
    }
}

async fn handle_connection<M: Synthesizer>(
    conn: Stream,
    handler: Arc<IpcHandler<M>>,
    max_frame: usize,
    shutdown: CancellationToken,
) -> Result<(), FrameError> {
    let (mut recver, mut sender) = conn.split();

    loop {
        let frame = tokio::select! {
            biased;
            () = shutdown.cancelled() => return Ok(()),
            frame = read_frame(&mut recver, max_frame) => frame,
        };

        let request = match frame {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(()),
            Err(FrameError::TooLarge { size, max }) => {
                // The payload was never read, so the stream is out of sync.
                let message =
                    IpcMessage::error(413, format!("Frame too large: {} bytes (max {})", size, max));
                if let Ok(bytes) = encode_message(&message, max_frame) {
                    write_frame(&mut sender, &bytes, max_frame).await?;
                }
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let response = match handler.process(&request).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode IPC response");
                match encode_message(&IpcMessage::error(e.code(), e.to_string()), max_frame) {
                    Ok(bytes) => bytes,
                    Err(_) => return Ok(()),
                }
            }
        };
        write_frame(&mut sender, &response, max_frame).await?;
    }
}
