//! Ports - 再ビルドコアの境界にある抽象化レイヤー
//!
//! 各 trait は外部の協調先を 1 つ隠す：
//! - hub セッション（BuildSystem）
//! - 上流パッケージストア（ArtifactStore）
//! - 通知の配送（Notifier）
//! - 結果の記録（OutcomeLog）

pub mod artifact_store;
pub mod build_system;
pub mod notifier;
pub mod outcome_log;

pub use self::artifact_store::{ArtifactStore, FetchError};
pub use self::build_system::{BuildRef, BuildSystem};
pub use self::notifier::{BuildNotice, Notifier, NotifyError};
pub use self::outcome_log::{OutcomeLog, RecordError};
