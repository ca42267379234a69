//! Impls - adapters behind the ports
//!
//! # Production
//! - **JsonRpcBuildSystem**: hub session over JSON-RPC
//! - **HttpArtifactStore**: upstream package store over HTTP
//! - **ListFiles**: completed/failed list files
//! - **LogNotifier**: notices into the tracing log
//!
//! # Doubles
//! - **InMemoryBuildSystem**, **InMemoryArtifactStore**, **InMemoryOutcomeLog**,
//!   **RecordingNotifier**

pub mod http_artifacts;
pub mod inmem_artifacts;
pub mod inmem_build_system;
pub mod jsonrpc_session;
pub mod list_files;
pub mod log_notifier;

pub use self::http_artifacts::HttpArtifactStore;
pub use self::inmem_artifacts::InMemoryArtifactStore;
pub use self::inmem_build_system::{InMemoryBuildSystem, RpmBuild};
pub use self::jsonrpc_session::JsonRpcBuildSystem;
pub use self::list_files::{InMemoryOutcomeLog, ListFiles};
pub use self::log_notifier::{LogNotifier, RecordingNotifier};
