//! エラー定義

use crate::breakpoint::BreakpointId;
use tsugi_host::ThreadId;
use thiserror::Error;

/// デバッガコマンドのエラー
///
/// フックから返るものではありません。イベント処理は常に完了し、
/// 失敗はログに記録されるだけです。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DebugError {
    /// ブレークポイントが見つからない
    #[error("Breakpoint {0} not found")]
    BreakpointNotFound(BreakpointId),

    /// キャッチポイントが見つからない
    #[error("Catchpoint '{0}' not found")]
    CatchpointNotFound(String),

    /// コンテキストが見つからない
    #[error("No debug context for {0}")]
    ContextNotFound(ThreadId),

    /// スレッド番号に対応するコンテキストが見つからない
    #[error("No thread with number {0}")]
    ThreadNumberNotFound(usize),

    /// 既に終了したコンテキストへの操作
    #[error("Debug context for {0} is dead")]
    StaleContext(ThreadId),

    /// ヒット条件の値が不正
    #[error("Invalid hit value {value} for condition '{condition}'")]
    InvalidHitValue { condition: String, value: u32 },

    /// ブレークポイント位置の書式が不正
    #[error("Invalid breakpoint location '{0}'")]
    InvalidLocation(String),

    /// セッションは終了済み
    #[error("Debug session has ended")]
    SessionEnded,
}
