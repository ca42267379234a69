//! rebuilder-core
//!
//! ミラー再ビルドのコア。パッケージごとに下流での再ビルドが必要か判定し、
//! アーキテクチャ非依存のビルドは import で fast-track、それ以外は
//! ソースビルドを投入して、同時実行数を上限内に保つ。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（result, state, ids, backlog, seek, errors）
//! - **ports**: 抽象化レイヤー（BuildSystem, ArtifactStore, Notifier, OutcomeLog）
//! - **app**: アプリケーションロジック（resolver, dedup, rebuild, watcher, dispatcher）
//! - **impls**: 実装（JSON-RPC / HTTP アダプタ、リストファイル、InMemory 実装）

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;
