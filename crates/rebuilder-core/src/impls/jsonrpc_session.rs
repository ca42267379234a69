//! JsonRpcBuildSystem - hub session over a JSON-RPC 2.0 gateway
//!
//! Calls use the hub's own method names. Positional params are sent as a JSON
//! array, keyword params as an object. Authentication is a bearer token; the
//! session is "logged in" when the hub reports a user for it.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::domain::seek::first_str;
use crate::domain::{RemoteError, RemoteTaskId};
use crate::ports::{BuildRef, BuildSystem};

/// Size of one `uploadFile` chunk before base64.
pub const UPLOAD_CHUNK: usize = 1024 * 1024;

#[derive(Debug, Deserialize)]
struct RpcFault {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<RpcFault>,
}

pub struct JsonRpcBuildSystem {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    next_id: AtomicU64,
}

impl JsonRpcBuildSystem {
    pub fn new(
        endpoint: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, RemoteError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        debug!(method, id, "hub call");

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(transport_error)?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(RemoteError::NotAuthenticated);
            }
            status if status.is_server_error() => {
                return Err(RemoteError::Transport(format!("{method}: hub answered {status}")));
            }
            status => {
                return Err(RemoteError::Fault {
                    code: i64::from(status.as_u16()),
                    message: format!("{method}: hub answered {status}"),
                });
            }
        }

        let reply: RpcResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::malformed(method, e.to_string()))?;
        if let Some(fault) = reply.error {
            return Err(RemoteError::Fault {
                code: fault.code,
                message: fault.message,
            });
        }
        Ok(reply.result)
    }

    async fn logged_in_user(&self) -> Result<Option<String>, RemoteError> {
        let user = self.call("getLoggedInUser", json!([])).await?;
        if user.is_null() {
            return Ok(None);
        }
        Ok(Some(first_str(&user, "name").unwrap_or_default().to_string()))
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Transport(e.to_string())
    }
}

fn optional(value: Value) -> Option<Value> {
    if value.is_null() { None } else { Some(value) }
}

#[async_trait]
impl BuildSystem for JsonRpcBuildSystem {
    async fn is_authenticated(&self) -> Result<bool, RemoteError> {
        Ok(self.logged_in_user().await?.is_some())
    }

    async fn login(&self) -> Result<(), RemoteError> {
        if self.token.is_none() {
            return Err(RemoteError::NotAuthenticated);
        }
        match self.logged_in_user().await? {
            Some(user) => {
                info!(user = %user, hub = %self.endpoint, "authenticated");
                Ok(())
            }
            None => Err(RemoteError::NotAuthenticated),
        }
    }

    async fn latest_rpms(&self, tag: &str, package: &str) -> Result<Value, RemoteError> {
        self.call("getLatestRPMS", json!({"tag": tag, "package": package})).await
    }

    async fn get_build(&self, build: BuildRef<'_>) -> Result<Option<Value>, RemoteError> {
        let param = match build {
            BuildRef::Id(id) => json!(id),
            BuildRef::Nvr(nvr) => json!(nvr),
        };
        Ok(optional(self.call("getBuild", json!([param])).await?))
    }

    async fn inheritance(&self, tag: &str) -> Result<Value, RemoteError> {
        self.call("getInheritanceData", json!([tag])).await
    }

    async fn has_tag_package(&self, tag: &str, package: &str) -> Result<bool, RemoteError> {
        let found = self.call("checkTagPackage", json!([tag, package])).await?;
        found
            .as_bool()
            .ok_or_else(|| {
                RemoteError::malformed("checkTagPackage", format!("expected bool, got {found}"))
            })
    }

    async fn add_tag_package(&self, tag: &str, package: &str) -> Result<(), RemoteError> {
        let owner = self.logged_in_user().await?.ok_or(RemoteError::NotAuthenticated)?;
        self.call(
            "packageListAdd",
            json!({"taginfo": tag, "pkginfo": package, "owner": owner}),
        )
        .await?;
        Ok(())
    }

    async fn submit_build(&self, source: &str, target: &str) -> Result<RemoteTaskId, RemoteError> {
        let id = self.call("build", json!([source, target])).await?;
        id.as_i64()
            .map(RemoteTaskId::new)
            .ok_or_else(|| RemoteError::malformed("build", format!("expected task id, got {id}")))
    }

    async fn task_info(&self, task_id: RemoteTaskId) -> Result<Option<Value>, RemoteError> {
        Ok(optional(self.call("getTaskInfo", json!([task_id.get()])).await?))
    }

    async fn upload(&self, local: &Path, server_dir: &str) -> Result<(), RemoteError> {
        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                RemoteError::malformed("uploadFile", format!("no file name in {}", local.display()))
            })?;
        let mut file = tokio::fs::File::open(local).await?;
        let mut buf = vec![0u8; UPLOAD_CHUNK];
        let mut offset: u64 = 0;
        loop {
            let read = file.read(&mut buf).await?;
            if read == 0 && offset > 0 {
                break;
            }
            let chunk = STANDARD.encode(&buf[..read]);
            self.call(
                "uploadFile",
                json!({
                    "path": server_dir,
                    "name": name,
                    "size": read,
                    "offset": offset,
                    "data": chunk,
                }),
            )
            .await?;
            offset += read as u64;
            if read == 0 {
                break;
            }
        }
        debug!(file = %name, bytes = offset, server_dir, "uploaded");
        Ok(())
    }

    async fn import_rpm(&self, server_dir: &str, file_name: &str) -> Result<(), RemoteError> {
        self.call("importRPM", json!({"path": server_dir, "basename": file_name}))
            .await?;
        Ok(())
    }

    async fn untagged_builds(&self) -> Result<Value, RemoteError> {
        self.call("untaggedBuilds", json!([])).await
    }

    async fn tag_build(&self, tag: &str, nvr: &str) -> Result<(), RemoteError> {
        self.call("tagBuildBypass", json!([tag, nvr])).await?;
        Ok(())
    }

    async fn ready_hosts(&self, arch: &str) -> Result<usize, RemoteError> {
        let hosts = self
            .call(
                "listHosts",
                json!({"arches": [arch], "enabled": true, "ready": true, "channelID": "default"}),
            )
            .await?;
        hosts
            .as_array()
            .map(Vec::len)
            .ok_or_else(|| RemoteError::malformed("listHosts", "expected a list of hosts"))
    }
}
