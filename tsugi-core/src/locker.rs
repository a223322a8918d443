//! スレッドロック
//!
//! 実行を許可しないスレッドの一覧を保持します。ブレークポイントやステップ実行とは独立しており、
//! 「停止したスレッドだけを動かす」ために使います。
//!
//! 一覧の操作は全て単一の Mutex で保護され、待機は Condvar で行います。
//! 保持されたスレッドは次のイベントの入口で [`ThreadLocker::wait_turn`] によりブロックされます。

use crate::utils::lock;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::debug;
use tsugi_host::ThreadId;

/// スレッドが保持されている理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldReason {
    /// 制御側から明示的に保持された
    Explicit,
    /// 別のスレッドが停止中のため順番待ちしている
    Queued,
}

/// 保持されたスレッド
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockedThread {
    pub thread: ThreadId,
    pub reason: HoldReason,
}

#[derive(Debug, Default)]
struct LockState {
    /// 明示的に保持されたスレッド（末尾が最も新しい）
    held: Vec<ThreadId>,
    /// 制御中のスレッドの後ろで順番待ちしているスレッド（末尾が最も新しい）
    queued: Vec<ThreadId>,
    /// 停止してコマンド層に制御を渡しているスレッド
    controller: Option<ThreadId>,
    closed: bool,
}

impl LockState {
    fn is_held(&self, thread: ThreadId) -> bool {
        self.held.contains(&thread)
    }

    fn queue(&mut self, thread: ThreadId) {
        if !self.queued.contains(&thread) {
            self.queued.push(thread);
        }
    }

    /// 順番待ちのスレッドを新しい順に解放する
    fn drain_queued(&mut self) -> Vec<ThreadId> {
        self.queued.drain(..).rev().collect()
    }
}

/// スレッドロック
#[derive(Debug, Default)]
pub struct ThreadLocker {
    state: Mutex<LockState>,
    released: Condvar,
}

impl ThreadLocker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            released: Condvar::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, LockState> {
        lock(&self.state)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, LockState>) -> MutexGuard<'a, LockState> {
        self.released
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// スレッドが明示的に保持されているかどうか
    pub fn is_in_locked(&self, thread: ThreadId) -> bool {
        self.state().is_held(thread)
    }

    /// スレッドを保持する（重複は呼び出し側の責任）
    pub fn add_to_locked(&self, thread: ThreadId) {
        let mut state = self.state();
        if state.closed {
            return;
        }
        state.held.push(thread);
        debug!(%thread, "thread locked");
    }

    /// 最も新しく保持されたスレッドを解放して返す
    ///
    /// 順番待ちのスレッドは対象外です。制御中のスレッドが再開するまで待ち続けます。
    pub fn remove_from_locked(&self) -> Option<ThreadId> {
        let mut state = self.state();
        let thread = state.held.pop()?;
        self.released.notify_all();
        debug!(%thread, "thread unlocked");
        Some(thread)
    }

    /// 明示的に保持されているスレッドの一覧（新しい順）
    pub fn locked_threads(&self) -> Vec<ThreadId> {
        self.state().held.iter().rev().copied().collect()
    }

    /// 順番待ちのスレッドの一覧（新しい順）
    pub fn queued_threads(&self) -> Vec<ThreadId> {
        self.state().queued.iter().rev().copied().collect()
    }

    /// 待機させられている全てのスレッドと理由
    ///
    /// 明示的な保持を新しい順に並べ、その後に順番待ちを新しい順に並べます。
    pub fn held_threads(&self) -> Vec<LockedThread> {
        let state = self.state();
        let explicit = state.held.iter().rev().map(|&thread| LockedThread {
            thread,
            reason: HoldReason::Explicit,
        });
        let queued = state.queued.iter().rev().map(|&thread| LockedThread {
            thread,
            reason: HoldReason::Queued,
        });
        explicit.chain(queued).collect()
    }

    /// 明示的な保持を全て新しい順に解放する
    pub fn clear(&self) -> Vec<ThreadId> {
        let mut state = self.state();
        let released: Vec<ThreadId> = state.held.drain(..).rev().collect();
        self.released.notify_all();
        released
    }

    /// スレッドに関する全ての保持を取り除く（スレッド終了時）
    pub fn forget(&self, thread: ThreadId) {
        let mut state = self.state();
        state.held.retain(|&held| held != thread);
        state.queued.retain(|&queued| queued != thread);
        if state.controller == Some(thread) {
            state.controller = None;
            state.drain_queued();
        }
        self.released.notify_all();
    }

    /// 現在制御を持っているスレッド
    pub fn controller(&self) -> Option<ThreadId> {
        self.state().controller
    }

    /// 停止したスレッドが制御を得る
    ///
    /// 別のスレッドが制御中の場合は、順番待ちとして解放を待ちます。
    /// セッション終了済みの場合は false を返します。
    pub fn take_control(&self, thread: ThreadId) -> bool {
        let mut state = self.state();
        loop {
            if state.closed {
                return false;
            }
            match state.controller {
                None => {
                    state.controller = Some(thread);
                    debug!(%thread, "thread took control");
                    return true;
                }
                Some(current) if current == thread => return true,
                Some(_) => {
                    state.queue(thread);
                    state = self.wait(state);
                }
            }
        }
    }

    /// 制御を手放し、順番待ちのスレッドを新しい順に解放する
    ///
    /// `thread` が制御中でなければ何もしません。
    pub fn release_control(&self, thread: ThreadId) -> Vec<ThreadId> {
        let mut state = self.state();
        if state.controller != Some(thread) {
            return Vec::new();
        }
        state.controller = None;
        let released = state.drain_queued();
        self.released.notify_all();
        debug!(%thread, released = released.len(), "thread released control");
        released
    }

    /// イベントの入口で、実行を許可されるまで待機する
    ///
    /// 制御中のスレッド自身がイベントを送ってきた場合は、停止が消化されたものとして制御を手放します。
    /// `is_suspended` は制御側からの停止要求を判定する関数で、ロック保持中に呼ばれます。
    pub fn wait_turn<F>(&self, thread: ThreadId, is_suspended: F)
    where
        F: Fn() -> bool,
    {
        let mut state = self.state();
        if state.controller == Some(thread) {
            state.controller = None;
            state.drain_queued();
            self.released.notify_all();
        }

        loop {
            if state.closed {
                return;
            }

            let held = state.is_held(thread);
            let other_controller = state.controller.is_some_and(|c| c != thread);
            if !held && !other_controller && !is_suspended() {
                state.queued.retain(|&queued| queued != thread);
                return;
            }

            if other_controller && !held && !state.queued.contains(&thread) {
                state.queued.push(thread);
                debug!(%thread, "thread queued behind controller");
            }
            state = self.wait(state);
        }
    }

    /// 保持されていれば待機するかどうか（ブロックしない）
    pub fn would_block(&self, thread: ThreadId) -> bool {
        let state = self.state();
        !state.closed && (state.is_held(thread) || state.controller.is_some_and(|c| c != thread))
    }

    /// 待機中のスレッドに再確認させる
    pub fn notify(&self) {
        let _state = self.state();
        self.released.notify_all();
    }

    /// セッション終了: 全て解放し、以降は誰も待機させない
    pub fn close(&self) {
        let mut state = self.state();
        state.closed = true;
        state.held.clear();
        state.queued.clear();
        state.controller = None;
        self.released.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}
