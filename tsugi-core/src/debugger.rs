//! デバッガのメインロジック
//!
//! ホストからのイベントフックと、コマンド層からの操作を一つのセッションにまとめます。
//! 状態は全てこの構造体が所有し、グローバルな状態は持ちません。

use crate::breakpoint::{Breakpoint, BreakpointId, BreakpointManager, BreakpointType, HitCondition};
use crate::catchpoint::CatchpointManager;
use crate::command::{Command, InfoTarget};
use crate::context::{ContextFlags, ContextSnapshot, DebugContext, StepKind, SuspendDecision};
use crate::errors::DebugError;
use crate::frame::DebugFrame;
use crate::locker::{LockedThread, ThreadLocker};
use crate::manager::{ContextManager, ContextRef};
use crate::parse::Location;
use crate::utils::lock;
use crate::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use tsugi_host::{HostRuntime, ObjectRef, ThreadId};

/// セッションの設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebuggerConfig {
    /// 新しいコンテキストでブレークポイントを照合する
    pub breakpoints_enabled: bool,
    /// 新しいコンテキストをトレースモードで開始する
    pub trace_new_threads: bool,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            breakpoints_enabled: true,
            trace_new_threads: false,
        }
    }
}

impl DebuggerConfig {
    fn context_flags(&self) -> ContextFlags {
        ContextFlags {
            breakpoints_enabled: self.breakpoints_enabled,
            tracing: self.trace_new_threads,
            ..ContextFlags::default()
        }
    }
}

/// コマンド実行の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    /// 設定を変更した
    Updated,
    BreakpointSet(Breakpoint),
    BreakpointDeleted(BreakpointId),
    CatchpointSet(String),
    CatchpointDeleted(String),
    /// スレッドの実行を再開した
    Resumed(ThreadId),
    Breakpoints(Vec<Breakpoint>),
    Catchpoints(Vec<(String, u32)>),
    Threads(Vec<ContextSnapshot>),
    Locked(Vec<LockedThread>),
    ThreadLocked(ThreadId),
    ThreadUnlocked(Option<ThreadId>),
    /// 内側のフレームから順
    Backtrace(Vec<DebugFrame>),
    Help,
    SessionEnded,
}

/// デバッガ
pub struct Debugger {
    /// ホストランタイム
    host: Arc<dyn HostRuntime>,
    /// スレッドごとのコンテキスト
    contexts: ContextManager,
    /// ブレークポイント管理
    breakpoints: Mutex<BreakpointManager>,
    /// キャッチポイント管理
    catchpoints: Mutex<CatchpointManager>,
    /// スレッドロック
    locker: ThreadLocker,
    active: AtomicBool,
    config: DebuggerConfig,
}

impl Debugger {
    /// 新しいデバッガを作成する
    pub fn new(host: Arc<dyn HostRuntime>) -> Self {
        Self::with_config(host, DebuggerConfig::default())
    }

    /// 設定を指定してデバッガを作成する
    pub fn with_config(host: Arc<dyn HostRuntime>, config: DebuggerConfig) -> Self {
        Self {
            host,
            contexts: ContextManager::with_defaults(config.context_flags()),
            breakpoints: Mutex::new(BreakpointManager::new()),
            catchpoints: Mutex::new(CatchpointManager::new()),
            locker: ThreadLocker::new(),
            active: AtomicBool::new(true),
            config,
        }
    }

    pub fn config(&self) -> DebuggerConfig {
        self.config
    }

    /// セッションが有効かどうか
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// セッションを終了する
    ///
    /// 保持中のスレッドを全て起こし、全てのコンテキストを終了済みにします。
    pub fn end_session(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        self.locker.close();
        let count = self.contexts.mark_all_dead();
        info!(contexts = count, "debug session ended");
    }

    // ---- イベントフック ----

    /// イベントの入口: コンテキストを用意し、実行を許可されるまで待つ
    fn enter(&self, thread: ThreadId) -> Option<ContextRef> {
        if !self.is_active() {
            return None;
        }
        let ctx = self.contexts.get_or_create(thread);
        if !self.is_active() {
            // end_session の後に作られたコンテキストは残さない
            self.contexts.remove(thread);
            lock(&ctx).mark_dead();
            return None;
        }
        self.locker
            .wait_turn(thread, || lock(&ctx).is_held_by_suspend());
        self.is_active().then_some(ctx)
    }

    /// 停止する場合は制御を得る
    fn settle(&self, thread: ThreadId, decision: SuspendDecision) -> SuspendDecision {
        if decision.is_continue() {
            return decision;
        }
        if self.locker.take_control(thread) {
            decision
        } else {
            SuspendDecision::CONTINUE
        }
    }

    /// call イベント
    pub fn on_call(&self, thread: ThreadId, frame: DebugFrame) -> SuspendDecision {
        let Some(ctx) = self.enter(thread) else {
            return SuspendDecision::CONTINUE;
        };
        let decision = {
            let mut ctx = lock(&ctx);
            let mut breakpoints = lock(&self.breakpoints);
            ctx.on_call(frame, &mut breakpoints, &*self.host)
        };
        self.settle(thread, decision)
    }

    /// line イベント
    pub fn on_line(&self, thread: ThreadId, file: &str, line: u32) -> SuspendDecision {
        let Some(ctx) = self.enter(thread) else {
            return SuspendDecision::CONTINUE;
        };
        let decision = {
            let mut ctx = lock(&ctx);
            let mut breakpoints = lock(&self.breakpoints);
            ctx.on_line(file, line, &mut breakpoints, &*self.host)
        };
        self.settle(thread, decision)
    }

    /// return イベント
    pub fn on_return(&self, thread: ThreadId) -> SuspendDecision {
        let Some(ctx) = self.enter(thread) else {
            return SuspendDecision::CONTINUE;
        };
        let decision = lock(&ctx).on_return();
        self.settle(thread, decision)
    }

    /// raise イベント
    pub fn on_raise(&self, thread: ThreadId, exception: ObjectRef) -> SuspendDecision {
        let Some(ctx) = self.enter(thread) else {
            return SuspendDecision::CONTINUE;
        };
        let decision = {
            let mut ctx = lock(&ctx);
            let mut catchpoints = lock(&self.catchpoints);
            ctx.on_raise(exception, &mut catchpoints, &*self.host)
        };
        self.settle(thread, decision)
    }

    /// スレッド終了
    pub fn on_thread_end(&self, thread: ThreadId) {
        if let Some(ctx) = self.contexts.remove(thread) {
            lock(&ctx).mark_dead();
            debug!(%thread, "context finished");
        }
        self.locker.forget(thread);
    }

    // ---- コンテキスト操作 ----

    /// 有効なコンテキストに対して操作を行う
    fn with_context<T>(
        &self,
        thread: ThreadId,
        f: impl FnOnce(&mut DebugContext) -> T,
    ) -> Result<T> {
        let ctx = self
            .contexts
            .get(thread)
            .ok_or(DebugError::ContextNotFound(thread))?;
        let mut ctx = lock(&ctx);
        if ctx.is_dead() {
            return Err(DebugError::StaleContext(thread).into());
        }
        Ok(f(&mut ctx))
    }

    /// コンテキストのスナップショット
    pub fn snapshot(&self, thread: ThreadId) -> Option<ContextSnapshot> {
        self.contexts.get(thread).map(|ctx| lock(&ctx).snapshot())
    }

    /// 全てのコンテキストのスナップショット（スレッド番号順）
    pub fn contexts(&self) -> Vec<ContextSnapshot> {
        self.contexts
            .contexts()
            .iter()
            .map(|ctx| lock(ctx).snapshot())
            .collect()
    }

    /// フレーム一覧（内側から順）
    pub fn backtrace(&self, thread: ThreadId) -> Result<Vec<DebugFrame>> {
        self.with_context(thread, |ctx| ctx.stack().iter().cloned().collect())
    }

    pub fn set_step(&self, thread: ThreadId, kind: StepKind, count: u32, force: bool) -> Result<()> {
        self.with_context(thread, |ctx| ctx.set_step(kind, count, force))
    }

    pub fn run_to_line(&self, thread: ThreadId, line: u32) -> Result<()> {
        self.with_context(thread, |ctx| ctx.run_to_line(line))
    }

    /// 停止中のスレッドを再開する
    ///
    /// 停止中だった場合は true を返します。
    pub fn resume(&self, thread: ThreadId) -> Result<bool> {
        let was_suspended = self.with_context(thread, DebugContext::resume)?;
        self.locker.release_control(thread);
        self.locker.notify();
        debug!(%thread, was_suspended, "thread resumed");
        Ok(was_suspended)
    }

    /// 実行中のスレッドを次のイベントで停止させる
    pub fn suspend(&self, thread: ThreadId) -> Result<bool> {
        let suspended = self.with_context(thread, DebugContext::suspend)?;
        debug!(%thread, suspended, "thread suspend requested");
        Ok(suspended)
    }

    pub fn set_ignore(&self, thread: ThreadId, ignore: bool) -> Result<()> {
        self.with_context(thread, |ctx| ctx.set_ignore(ignore))
    }

    /// スレッドが内部コード実行中として無視されているかどうか
    pub fn is_ignored(&self, thread: ThreadId) -> bool {
        self.contexts
            .get(thread)
            .is_some_and(|ctx| lock(&ctx).is_ignored())
    }

    pub fn set_tracing(&self, thread: ThreadId, tracing: bool) -> Result<()> {
        self.with_context(thread, |ctx| ctx.set_tracing(tracing))
    }

    pub fn set_skipped(&self, thread: ThreadId, skipped: bool) -> Result<()> {
        self.with_context(thread, |ctx| ctx.set_skipped(skipped))
    }

    pub fn set_breakpoints_enabled(&self, thread: ThreadId, enabled: bool) -> Result<()> {
        self.with_context(thread, |ctx| ctx.set_breakpoints_enabled(enabled))
    }

    /// ホストから最も内側のフレーム全体を更新する
    ///
    /// フレームがない場合は false を返します。
    pub fn update_frame(&self, thread: ThreadId, frame: DebugFrame) -> Result<bool> {
        self.with_context(thread, |ctx| ctx.update_frame(frame))
    }

    // ---- スレッドロック ----

    pub fn is_in_locked(&self, thread: ThreadId) -> bool {
        self.locker.is_in_locked(thread)
    }

    pub fn add_to_locked(&self, thread: ThreadId) {
        self.locker.add_to_locked(thread);
    }

    pub fn remove_from_locked(&self) -> Option<ThreadId> {
        self.locker.remove_from_locked()
    }

    /// スレッド番号で指定したスレッドを保持する
    pub fn lock_thread(&self, thnum: usize) -> Result<ThreadId> {
        let ctx = self
            .contexts
            .find_by_thnum(thnum)
            .ok_or(DebugError::ThreadNumberNotFound(thnum))?;
        let thread = lock(&ctx).thread();
        self.locker.add_to_locked(thread);
        Ok(thread)
    }

    /// 明示的に保持されているスレッドの一覧（新しい順）
    pub fn locked_threads(&self) -> Vec<ThreadId> {
        self.locker.locked_threads()
    }

    /// 停止中のスレッドの後ろで順番待ちしているスレッド（新しい順）
    pub fn queued_threads(&self) -> Vec<ThreadId> {
        self.locker.queued_threads()
    }

    /// 待機させられている全てのスレッドと理由
    pub fn held_threads(&self) -> Vec<LockedThread> {
        self.locker.held_threads()
    }

    pub fn clear_locked(&self) -> Vec<ThreadId> {
        self.locker.clear()
    }

    /// 現在制御を持っているスレッド
    pub fn controller(&self) -> Option<ThreadId> {
        self.locker.controller()
    }

    /// 次のイベントで待機させられるかどうか（ブロックしない）
    pub fn would_block(&self, thread: ThreadId) -> bool {
        if !self.is_active() {
            return false;
        }
        self.locker.would_block(thread)
            || self
                .contexts
                .get(thread)
                .is_some_and(|ctx| lock(&ctx).is_held_by_suspend())
    }

    // ---- ブレークポイント・キャッチポイント ----

    pub fn add_breakpoint(&self, kind: BreakpointType) -> BreakpointId {
        lock(&self.breakpoints).add(kind)
    }

    /// 位置指定からブレークポイントを追加する
    pub fn break_at(&self, location: &Location) -> Result<Breakpoint> {
        let kind = match location {
            Location::Position { file, line } => BreakpointType::Position {
                source: file.clone(),
                line: *line,
            },
            Location::Method { class_name, method } => BreakpointType::Method {
                class_name: class_name.clone(),
                method: method.clone(),
            },
        };
        let mut breakpoints = lock(&self.breakpoints);
        let id = breakpoints.add(kind);
        breakpoints
            .get(id)
            .cloned()
            .ok_or_else(|| DebugError::BreakpointNotFound(id).into())
    }

    pub fn remove_breakpoint(&self, id: BreakpointId) -> Result<Breakpoint> {
        lock(&self.breakpoints).remove(id)
    }

    pub fn enable_breakpoint(&self, id: BreakpointId) -> Result<()> {
        lock(&self.breakpoints).enable(id)
    }

    pub fn disable_breakpoint(&self, id: BreakpointId) -> Result<()> {
        lock(&self.breakpoints).disable(id)
    }

    pub fn set_condition(&self, id: BreakpointId, condition: Option<String>) -> Result<()> {
        lock(&self.breakpoints).set_condition(id, condition)
    }

    pub fn set_hit_condition(
        &self,
        id: BreakpointId,
        condition: HitCondition,
        value: u32,
    ) -> Result<()> {
        lock(&self.breakpoints).set_hit_condition(id, condition, value)
    }

    pub fn breakpoint(&self, id: BreakpointId) -> Option<Breakpoint> {
        lock(&self.breakpoints).get(id).cloned()
    }

    /// 全てのブレークポイント（登録順）
    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        lock(&self.breakpoints).all().cloned().collect()
    }

    pub fn add_catchpoint(&self, class_name: impl Into<String>) {
        lock(&self.catchpoints).add(class_name);
    }

    pub fn remove_catchpoint(&self, class_name: &str) -> Result<()> {
        lock(&self.catchpoints).remove(class_name)
    }

    pub fn catchpoint_hit_count(&self, class_name: &str) -> Option<u32> {
        lock(&self.catchpoints).hit_count(class_name)
    }

    /// 全てのキャッチポイント（名前順）
    pub fn catchpoints(&self) -> Vec<(String, u32)> {
        lock(&self.catchpoints)
            .all()
            .map(|(name, count)| (name.to_string(), count))
            .collect()
    }

    // ---- コマンド ----

    /// コマンドを実行する
    ///
    /// `thread` はステップ実行やバックトレースなど、スレッドを対象とするコマンドで使われます。
    pub fn execute(&self, thread: ThreadId, command: &Command) -> Result<CommandOutput> {
        if !self.is_active() && !matches!(command, Command::Help | Command::Quit) {
            return Err(DebugError::SessionEnded.into());
        }

        let output = match command {
            Command::Break(location) => CommandOutput::BreakpointSet(self.break_at(location)?),
            Command::Delete(id) => {
                self.remove_breakpoint(*id)?;
                CommandOutput::BreakpointDeleted(*id)
            }
            Command::Enable(id) => {
                self.enable_breakpoint(*id)?;
                CommandOutput::Updated
            }
            Command::Disable(id) => {
                self.disable_breakpoint(*id)?;
                CommandOutput::Updated
            }
            Command::Condition { id, expr } => {
                self.set_condition(*id, expr.clone())?;
                CommandOutput::Updated
            }
            Command::Hit {
                id,
                condition,
                value,
            } => {
                self.set_hit_condition(*id, *condition, *value)?;
                CommandOutput::Updated
            }
            Command::Catch(class_name) => {
                self.add_catchpoint(class_name.as_str());
                CommandOutput::CatchpointSet(class_name.clone())
            }
            Command::Uncatch(class_name) => {
                self.remove_catchpoint(class_name)?;
                CommandOutput::CatchpointDeleted(class_name.clone())
            }
            Command::Step { count, force } => {
                self.set_step(thread, StepKind::Into, *count, *force)?;
                self.resume(thread)?;
                CommandOutput::Resumed(thread)
            }
            Command::Next { count, force } => {
                self.set_step(thread, StepKind::Over, *count, *force)?;
                self.resume(thread)?;
                CommandOutput::Resumed(thread)
            }
            Command::Finish(count) => {
                self.set_step(thread, StepKind::Out, *count, false)?;
                self.resume(thread)?;
                CommandOutput::Resumed(thread)
            }
            Command::Until(line) => {
                self.run_to_line(thread, *line)?;
                self.resume(thread)?;
                CommandOutput::Resumed(thread)
            }
            Command::Continue => {
                self.resume(thread)?;
                CommandOutput::Resumed(thread)
            }
            Command::Lock(thnum) => CommandOutput::ThreadLocked(self.lock_thread(*thnum)?),
            Command::Unlock => CommandOutput::ThreadUnlocked(self.remove_from_locked()),
            Command::Info(target) => match target {
                InfoTarget::Breakpoints => CommandOutput::Breakpoints(self.breakpoints()),
                InfoTarget::Catchpoints => CommandOutput::Catchpoints(self.catchpoints()),
                InfoTarget::Threads => CommandOutput::Threads(self.contexts()),
                InfoTarget::Locked => CommandOutput::Locked(self.held_threads()),
            },
            Command::Backtrace => CommandOutput::Backtrace(self.backtrace(thread)?),
            Command::Help => CommandOutput::Help,
            Command::Quit => {
                self.end_session();
                CommandOutput::SessionEnded
            }
        };
        Ok(output)
    }
}
