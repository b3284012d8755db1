//! End-to-end control plane tests over a real local socket.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use gg_residency::config::EnvConfig;
use gg_residency::ipc::{
    self, ClientError, IpcClient, IpcHandler, IpcHandlerConfig, IpcMessage, IpcServerConfig,
    ServerError,
};
use gg_residency::models::{SimulatedLoader, SimulatedModelConfig, SimulatedVoice};
use gg_residency::residency::{
    ManagerConfig, ModelLoader, NoDeviceRuntime, Residency, ResidencyManager,
};
use gg_residency::synthesis::SynthesisParams;
use gg_residency::{Runtime, ShutdownResult};

fn fast_model() -> SimulatedModelConfig {
    SimulatedModelConfig {
        name: "test-voice".to_string(),
        weights_bytes: 1024,
        load_delay: Duration::ZERO,
        transfer_delay: Duration::ZERO,
        sample_rate: 16_000,
    }
}

struct TestServer {
    socket: PathBuf,
    manager: Arc<ResidencyManager<SimulatedVoice>>,
    shutdown: CancellationToken,
    task: JoinHandle<Result<(), ServerError>>,
    _dir: tempfile::TempDir,
}

impl TestServer {
    async fn start(handler_config: IpcHandlerConfig, max_connections: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("residency.sock");
        let manager = Arc::new(ResidencyManager::new(
            Arc::new(NoDeviceRuntime),
            ManagerConfig::default(),
        ));
        let loader: Arc<dyn ModelLoader<SimulatedVoice>> =
            Arc::new(SimulatedLoader::new(fast_model()));
        let max_frame_size = handler_config.max_message_size;
        let handler = Arc::new(IpcHandler::new(manager.clone(), loader, handler_config));

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(ipc::serve(
            IpcServerConfig {
                socket_path: socket.clone(),
                max_connections,
                max_frame_size,
            },
            handler,
            shutdown.clone(),
        ));

        assert!(wait_for_socket(&socket).await, "server did not come up");
        Self {
            socket,
            manager,
            shutdown,
            task,
            _dir: dir,
        }
    }

    async fn client(&self) -> IpcClient {
        IpcClient::connect(&self.socket).await.unwrap()
    }

    async fn stop(self) -> PathBuf {
        self.shutdown.cancel();
        self.task.await.unwrap().unwrap();
        self.socket
    }
}

async fn wait_for_socket(path: &Path) -> bool {
    for _ in 0..200 {
        if path.exists() && IpcClient::connect(path).await.is_ok() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_transitions_over_socket() {
    let server = TestServer::start(IpcHandlerConfig::default(), 8).await;
    let mut client = server.client().await;

    let status = client.status().await.unwrap();
    assert_eq!(status.residency, Residency::Unloaded);
    assert!(status.model_name.is_none());

    let status = client.preload().await.unwrap();
    assert_eq!(status.residency, Residency::OnDevice);
    assert_eq!(status.model_name.as_deref(), Some("test-voice"));

    let status = client.offload().await.unwrap();
    assert_eq!(status.residency, Residency::OnHost);

    let status = client.release().await.unwrap();
    assert_eq!(status.residency, Residency::Unloaded);
    assert_eq!(server.manager.residency(), Residency::Unloaded);

    let socket = server.stop().await;
    assert!(!socket.exists(), "socket file removed on shutdown");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_idle_timeout_over_socket() {
    let server = TestServer::start(IpcHandlerConfig::default(), 8).await;
    let mut client = server.client().await;

    assert_eq!(client.set_idle_timeout(Some(120)).await.unwrap(), Some(120));
    assert_eq!(client.status().await.unwrap().idle_timeout_secs, Some(120));
    assert_eq!(client.set_idle_timeout(Some(0)).await.unwrap(), None);
    assert_eq!(client.set_idle_timeout(None).await.unwrap(), None);
    assert!(server.manager.idle_timeout().is_none());

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_synthesize_cold_starts_model() {
    let server = TestServer::start(IpcHandlerConfig::default(), 8).await;
    let mut client = server.client().await;

    let response = client
        .synthesize("Hello", SynthesisParams::default())
        .await
        .unwrap();
    assert_eq!(response.sample_rate, 16_000);
    assert_eq!(response.samples.len(), 5 * 1_200);
    assert!(response.samples.iter().all(|s| s.abs() <= 1.0));

    let status = client.status().await.unwrap();
    assert_eq!(status.residency, Residency::OnDevice);
    assert_eq!(status.in_flight, 0);

    client.offload().await.unwrap();
    let again = client
        .synthesize("Hello", SynthesisParams::default())
        .await
        .unwrap();
    assert_eq!(again.samples, response.samples, "output unchanged across offload");

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_offload_after_use() {
    let config = IpcHandlerConfig {
        offload_after_use: true,
        ..Default::default()
    };
    let server = TestServer::start(config, 8).await;
    let mut client = server.client().await;

    client
        .synthesize("One line", SynthesisParams::default())
        .await
        .unwrap();
    assert_eq!(client.status().await.unwrap().residency, Residency::OnHost);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_requests_get_400() {
    let server = TestServer::start(IpcHandlerConfig::default(), 8).await;
    let mut client = server.client().await;

    let err = client
        .synthesize("   ", SynthesisParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Remote { code: 400, .. }));

    let params = SynthesisParams {
        temperature: 5.0,
        ..Default::default()
    };
    let err = client.synthesize("hi", params).await.unwrap_err();
    assert!(matches!(err, ClientError::Remote { code: 400, .. }));

    let err = client
        .request(&IpcMessage::IdleTimeoutResponse {
            idle_timeout_secs: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Remote { code: 400, .. }));

    // The connection survives rejected requests.
    assert_eq!(server.manager.residency(), Residency::Unloaded);
    client.status().await.unwrap();

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_supported_languages_and_tags() {
    let server = TestServer::start(IpcHandlerConfig::default(), 8).await;
    let mut client = server.client().await;

    let languages = client.supported_languages().await.unwrap();
    assert_eq!(languages.len(), 23);
    assert!(languages.iter().any(|l| l.code == "en" && l.name == "English"));

    let tags = client.supported_tags().await.unwrap();
    assert!(tags.contains(&"[chuckle]".to_string()));
    assert_eq!(server.manager.residency(), Residency::Unloaded, "catalog needs no model");

    let french = SynthesisParams {
        language_id: "fr".to_string(),
        ..Default::default()
    };
    client.synthesize("Bonjour", french).await.unwrap();

    let unknown = SynthesisParams {
        language_id: "klingon".to_string(),
        ..Default::default()
    };
    let err = client.synthesize("Qapla", unknown).await.unwrap_err();
    match err {
        ClientError::Remote { code, message } => {
            assert_eq!(code, 400);
            assert!(message.contains("klingon"));
        }
        other => panic!("expected 400, got {:?}", other),
    }

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_oversized_frame_gets_413() {
    let config = IpcHandlerConfig {
        max_message_size: 4096,
        ..Default::default()
    };
    let server = TestServer::start(config, 8).await;
    let mut client = server.client().await.with_max_frame_size(1 << 20);

    let text = "a".repeat(8192);
    let err = client
        .synthesize(&text, SynthesisParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Remote { code: 413, .. }));

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connection_limit_rejects_with_503() {
    let server = TestServer::start(IpcHandlerConfig::default(), 1).await;
    // Let the readiness check's connection finish and return its permit.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut first = server.client().await;
    first.status().await.unwrap();

    let mut second = server.client().await;
    let err = second.status().await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Remote { code: 503, .. } | ClientError::Closed | ClientError::Frame(_)
    ));

    drop(first);
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_second_server_on_live_socket_fails() {
    let server = TestServer::start(IpcHandlerConfig::default(), 8).await;

    let manager = Arc::new(ResidencyManager::new(
        Arc::new(NoDeviceRuntime),
        ManagerConfig::default(),
    ));
    let loader: Arc<dyn ModelLoader<SimulatedVoice>> =
        Arc::new(SimulatedLoader::new(fast_model()));
    let handler = Arc::new(IpcHandler::new(manager, loader, IpcHandlerConfig::default()));
    let result = ipc::serve(
        IpcServerConfig {
            socket_path: server.socket.clone(),
            max_connections: 8,
            max_frame_size: 4096,
        },
        handler,
        CancellationToken::new(),
    )
    .await;
    assert!(matches!(result, Err(ServerError::AddressInUse { .. })));

    server.stop().await;
}

#[tokio::test]
async fn test_handler_rejects_malformed_bytes() {
    let manager = Arc::new(ResidencyManager::new(
        Arc::new(NoDeviceRuntime),
        ManagerConfig::default(),
    ));
    let loader: Arc<dyn ModelLoader<SimulatedVoice>> =
        Arc::new(SimulatedLoader::new(fast_model()));
    let handler = IpcHandler::new(manager, loader, IpcHandlerConfig::default());

    let bytes = handler.process(b"{not json").await.unwrap();
    let response: IpcMessage = serde_json::from_slice(&bytes).unwrap();
    assert!(matches!(response, IpcMessage::Error { code: 400, .. }));

    let bytes = handler
        .process(br#"{"type":"status_request"}"#)
        .await
        .unwrap();
    let response: IpcMessage = serde_json::from_slice(&bytes).unwrap();
    assert!(matches!(response, IpcMessage::StatusResponse(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_runtime_preloads_serves_and_releases() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("runtime.sock");
    let config = EnvConfig {
        socket_path: socket.clone(),
        monitor_interval: Duration::from_millis(50),
        shutdown_timeout: Duration::from_secs(2),
        model: fast_model(),
        ..Default::default()
    };

    let runtime = Runtime::with_device(config, Arc::new(NoDeviceRuntime));
    let manager = runtime.manager().clone();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(runtime.run(shutdown.clone()));

    assert!(wait_for_socket(&socket).await);
    let mut client = IpcClient::connect(&socket).await.unwrap();
    let status = client.status().await.unwrap();
    assert_eq!(status.residency, Residency::OnDevice, "preloaded at startup");
    drop(client);

    shutdown.cancel();
    let result = task.await.unwrap().unwrap();
    assert_eq!(result, ShutdownResult::Complete);
    assert_eq!(manager.residency(), Residency::Unloaded);
    assert!(!socket.exists());
}
