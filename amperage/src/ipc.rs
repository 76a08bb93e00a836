//! IPC interface for Amperage

use crate::controller::{PassSummary, PowerEvent, PowerState};
use crate::platform::CoreInfo;
use crate::tunables::Tunables;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// IPC request types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcRequest {
    /// Get full daemon status
    GetStatus,

    /// Get every tunable
    GetTunables,

    /// Set one tunable by name
    SetTunable { name: String, value: String },

    /// List cores with their state and frequency
    ListCores,

    /// Device is about to suspend
    NotifySuspend,

    /// Device has resumed
    NotifyResume,
}

/// IPC response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum IpcResponse {
    Success { data: serde_json::Value },
    Error { message: String },
}

impl IpcResponse {
    fn success<T: Serialize>(value: T) -> Self {
        match serde_json::to_value(value) {
            Ok(data) => Self::Success { data },
            Err(e) => Self::error(e),
        }
    }

    fn error(e: impl std::fmt::Display) -> Self {
        Self::Error {
            message: e.to_string(),
        }
    }
}

/// Full daemon status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub version: String,
    pub state: PowerState,
    pub total_cores: usize,
    pub online_cores: usize,
    pub tunables: Tunables,
    pub last_pass: Option<PassSummary>,
}

/// IPC handler trait
pub trait IpcHandler: Send + Sync {
    fn get_status(&self) -> Result<DaemonStatus>;
    fn get_tunables(&self) -> Tunables;
    fn set_tunable(&self, name: &str, value: &str) -> Result<Tunables>;
    fn list_cores(&self) -> Vec<CoreInfo>;
    /// Deliver a power event, returning whether a pass ran
    fn notify(&self, event: PowerEvent) -> Result<bool>;
}

/// IPC server
pub struct IpcServer<H: IpcHandler> {
    socket_path: String,
    handler: Arc<H>,
}

impl<H: IpcHandler + 'static> IpcServer<H> {
    pub fn new(socket_path: impl Into<String>, handler: Arc<H>) -> Self {
        Self {
            socket_path: socket_path.into(),
            handler,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let _ = std::fs::remove_file(&self.socket_path);

        if let Some(parent) = std::path::Path::new(&self.socket_path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("Amperage IPC listening on {}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let handler = Arc::clone(&self.handler);
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, handler).await {
                            tracing::error!("Client error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                }
            }
        }
    }
}

async fn handle_client<H: IpcHandler + 'static>(stream: UnixStream, handler: Arc<H>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<IpcRequest>(&line) {
            Ok(request) => {
                // Hotplug passes block on sysfs writes
                let handler = Arc::clone(&handler);
                tokio::task::spawn_blocking(move || process_request(request, handler.as_ref()))
                    .await?
            }
            Err(e) => IpcResponse::Error {
                message: format!("Invalid request: {}", e),
            },
        };

        let response_json = serde_json::to_string(&response)?;
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        line.clear();
    }

    Ok(())
}

fn process_request<H: IpcHandler>(request: IpcRequest, handler: &H) -> IpcResponse {
    match request {
        IpcRequest::GetStatus => match handler.get_status() {
            Ok(status) => IpcResponse::success(status),
            Err(e) => IpcResponse::error(e),
        },

        IpcRequest::GetTunables => IpcResponse::success(handler.get_tunables()),

        IpcRequest::SetTunable { name, value } => match handler.set_tunable(&name, &value) {
            Ok(tunables) => IpcResponse::success(tunables),
            Err(e) => IpcResponse::error(e),
        },

        IpcRequest::ListCores => IpcResponse::success(handler.list_cores()),

        IpcRequest::NotifySuspend => notify(handler, PowerEvent::Suspend),

        IpcRequest::NotifyResume => notify(handler, PowerEvent::Resume),
    }
}

fn notify<H: IpcHandler>(handler: &H, event: PowerEvent) -> IpcResponse {
    match handler.notify(event) {
        Ok(ran) => IpcResponse::success(serde_json::json!({"event": event, "applied": ran})),
        Err(e) => IpcResponse::error(e),
    }
}

/// IPC client
pub struct IpcClient {
    socket_path: String,
}

impl IpcClient {
    pub fn new(socket_path: impl Into<String>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub async fn send(&self, request: IpcRequest) -> Result<IpcResponse> {
        let mut stream = UnixStream::connect(&self.socket_path).await?;

        let request_json = serde_json::to_string(&request)?;
        stream.write_all(request_json.as_bytes()).await?;
        stream.write_all(b"\n").await?;
        stream.flush().await?;

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await?;

        Ok(serde_json::from_str(&line)?)
    }

    async fn request<T: serde::de::DeserializeOwned>(&self, request: IpcRequest) -> Result<T> {
        match self.send(request).await? {
            IpcResponse::Success { data } => Ok(serde_json::from_value(data)?),
            IpcResponse::Error { message } => Err(anyhow::anyhow!(message)),
        }
    }

    pub async fn get_status(&self) -> Result<DaemonStatus> {
        self.request(IpcRequest::GetStatus).await
    }

    pub async fn get_tunables(&self) -> Result<Tunables> {
        self.request(IpcRequest::GetTunables).await
    }

    pub async fn set_tunable(&self, name: &str, value: &str) -> Result<Tunables> {
        self.request(IpcRequest::SetTunable {
            name: name.to_string(),
            value: value.to_string(),
        })
        .await
    }

    pub async fn list_cores(&self) -> Result<Vec<CoreInfo>> {
        self.request(IpcRequest::ListCores).await
    }

    /// Returns whether the daemon ran a pass for `event`
    pub async fn notify(&self, event: PowerEvent) -> Result<bool> {
        let request = match event {
            PowerEvent::Suspend => IpcRequest::NotifySuspend,
            PowerEvent::Resume => IpcRequest::NotifyResume,
        };
        let data: serde_json::Value = self.request(request).await?;
        Ok(data["applied"].as_bool().unwrap_or(false))
    }
}
