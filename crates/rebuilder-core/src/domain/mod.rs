//! Domain - ドメインモデル（result, state, ids, backlog, seek, errors）

pub mod backlog;
pub mod errors;
pub mod ids;
pub mod result;
pub mod seek;
pub mod state;

pub use backlog::Backlog;
pub use errors::{ErrorKind, RemoteError};
pub use ids::RunId;
pub use result::{BuildJob, BuildResult, RemoteTaskId};
pub use state::{BuildState, RemoteTaskState};
