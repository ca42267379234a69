//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせて再ビルドのオーケストレーションを実装します。
//!
//! # 主要コンポーネント
//! - **PackageResolver**: パッケージを実際に持つ上流タグの特定
//! - **DuplicateDetector**: 下流に同じビルドが既にあるかの判定
//! - **FastTrackImporter**: アーキテクチャ非依存 RPM の再 import
//! - **TaskWatcher**: 投入済みビルドタスクのポーリング
//! - **RebuildEngine**: パッケージ単位の状態機械
//! - **Dispatcher**: 同時実行数を上限内に保った backlog のスケジューリング
//! - **NotificationPolicy**: 通知に値する結果の判定

pub mod dedup;
pub mod dispatcher;
pub mod fasttrack;
pub mod policy;
pub mod rebuild;
pub mod resolver;
pub mod status;
pub mod watcher;

pub use self::dedup::DuplicateDetector;
pub use self::dispatcher::{CapacityPolicy, DispatchError, DispatchOptions, Dispatcher};
pub use self::fasttrack::{FastTrackImporter, ImportError, ImportOptions};
pub use self::policy::{AlertMode, NotificationPolicy, Trigger, should_notify, task_url};
pub use self::rebuild::{EngineError, ImportTimeoutPolicy, RebuildEngine, RebuildOptions, Strategy};
pub use self::resolver::PackageResolver;
pub use self::status::{RunCounts, RunReport, RunSummary};
pub use self::watcher::{DEFAULT_POLL_INTERVAL, TaskWatcher, WatchError};
