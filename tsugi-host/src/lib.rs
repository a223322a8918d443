//! Tsugi ホストインターフェース
//!
//! このクレートは、デバッグ対象のランタイム（ホスト）とデバッガコアの境界を定義します。
//! スレッドやオブジェクトへの不透明なハンドル、型リフレクションと条件式評価のトレイト、
//! そしてテーブル駆動の簡易ホスト実装を提供します。

pub mod object;
pub mod reflection;
pub mod static_host;
pub mod thread;

pub use object::ObjectRef;
pub use reflection::{ConditionEvaluator, HostRuntime, TypeReflection};
pub use static_host::{HostError, StaticHost};
pub use thread::ThreadId;

/// ホスト操作の結果型
pub type Result<T> = anyhow::Result<T>;
