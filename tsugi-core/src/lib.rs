//! Tsugi デバッガのコア機能
//!
//! このクレートは、デバッガの中核となるロジックを提供します。
//! ホストランタイムから届く実行イベントを受け取り、スレッドごとのフレームスタックを追跡して、
//! ブレークポイント・キャッチポイント・ステップ実行による停止を判定します。

pub mod breakpoint;
pub mod catchpoint;
pub mod command;
pub mod context;
pub mod debugger;
pub mod errors;
pub mod frame;
pub mod locker;
pub mod manager;
pub mod parse;
mod utils;

pub use breakpoint::{Breakpoint, BreakpointId, BreakpointManager, BreakpointType, HitCondition};
pub use catchpoint::CatchpointManager;
pub use command::{Command, InfoTarget, HELP};
pub use context::{
    ContextFlags, ContextSnapshot, DebugContext, StepKind, StopReason, SteppingState,
    SuspendDecision,
};
pub use debugger::{CommandOutput, Debugger, DebuggerConfig};
pub use errors::DebugError;
pub use frame::{DebugFrame, FrameStack};
pub use locker::{HoldReason, LockedThread, ThreadLocker};
pub use parse::{parse_location, Location};

// 他のクレートから使用するために再エクスポート
pub use tsugi_host::{ObjectRef, ThreadId};

/// デバッガの結果型
pub type Result<T> = anyhow::Result<T>;
