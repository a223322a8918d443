//! スレッドごとのデバッグコンテキスト
//!
//! ホストから届く call / line / return / raise イベントを受け取り、
//! フレームスタックを更新したうえで停止すべきかどうかを判定する状態機械です。
//! コンテキストはそのスレッド自身のイベントでのみ更新されます。

use crate::breakpoint::{BreakpointId, BreakpointManager};
use crate::catchpoint::CatchpointManager;
use crate::frame::{DebugFrame, FrameStack};
use std::fmt;
use tracing::{debug, info, warn};
use tsugi_host::{HostRuntime, ObjectRef, ThreadId, TypeReflection};

/// 停止理由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    #[default]
    None,
    Step,
    Breakpoint,
    Catchpoint,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::None => "none",
            StopReason::Step => "step",
            StopReason::Breakpoint => "breakpoint",
            StopReason::Catchpoint => "catchpoint",
        };
        f.write_str(s)
    }
}

/// イベントに対する判定結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuspendDecision {
    pub should_suspend: bool,
    pub reason: StopReason,
}

impl SuspendDecision {
    /// 停止せずに続行する
    pub const CONTINUE: SuspendDecision = SuspendDecision {
        should_suspend: false,
        reason: StopReason::None,
    };

    pub fn suspend(reason: StopReason) -> Self {
        Self {
            should_suspend: true,
            reason,
        }
    }

    pub fn is_continue(&self) -> bool {
        !self.should_suspend
    }
}

/// コンテキストのフラグ
///
/// 互いに独立した状態なので、単一の列挙型ではなく名前付きの真偽値で持ちます。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextFlags {
    /// 停止中
    pub suspended: bool,
    /// 新しい行ごとにトレース出力する
    pub tracing: bool,
    /// デバッガ自身のスレッドなど、イベントを無視するスレッド
    pub skipped: bool,
    /// 内部コード実行中のため停止しない
    pub ignore: bool,
    /// スレッド終了済み
    pub dead: bool,
    /// 制御側から停止されるまで実行中だった
    pub was_running: bool,
    /// ブレークポイントを照合する
    pub breakpoints_enabled: bool,
    /// ステップ実行中
    pub stepped: bool,
    /// 次の call イベントでは停止判定しない
    pub force_move: bool,
    /// キャッチポイントで停止中
    pub catching: bool,
}

impl Default for ContextFlags {
    fn default() -> Self {
        Self {
            suspended: false,
            tracing: false,
            skipped: false,
            ignore: false,
            dead: false,
            was_running: false,
            breakpoints_enabled: true,
            stepped: false,
            force_move: false,
            catching: false,
        }
    }
}

/// ステップ実行の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// 深さに関係なく次の行で停止
    Into,
    /// 開始時の深さ以下の行で停止
    Over,
    /// 指定フレーム数だけ戻ったところで停止
    Out,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepKind::Into => "into",
            StepKind::Over => "over",
            StepKind::Out => "out",
        };
        f.write_str(s)
    }
}

/// ステップ実行の停止点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SteppingState {
    /// 停止までに数える残りの行数
    pub stop_next: Option<u32>,
    /// 行を数える最大の深さ（None なら全ての深さ）
    pub dest_frame: Option<usize>,
    /// 停止する行番号
    pub stop_line: Option<u32>,
    /// return でこの深さ以下になったら停止
    pub stop_frame: Option<usize>,
}

impl SteppingState {
    pub fn is_armed(&self) -> bool {
        self.stop_next.is_some() || self.stop_line.is_some() || self.stop_frame.is_some()
    }
}

/// 制御側から読むためのコンテキストのスナップショット
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSnapshot {
    pub thread: ThreadId,
    pub thnum: usize,
    pub flags: ContextFlags,
    pub stop_reason: StopReason,
    pub frames: Vec<DebugFrame>,
}

impl ContextSnapshot {
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

/// デバッグコンテキスト
#[derive(Debug)]
pub struct DebugContext {
    thread: ThreadId,
    thnum: usize,
    flags: ContextFlags,
    stack: FrameStack,
    stop_reason: StopReason,
    stepping: SteppingState,
    last_file: Option<String>,
    last_line: Option<u32>,
    last_breakpoint: Option<BreakpointId>,
    last_exception: Option<String>,
}

impl DebugContext {
    /// 新しいコンテキストを作成する
    pub fn new(thread: ThreadId, thnum: usize) -> Self {
        Self::with_flags(thread, thnum, ContextFlags::default())
    }

    pub fn with_flags(thread: ThreadId, thnum: usize, flags: ContextFlags) -> Self {
        Self {
            thread,
            thnum,
            flags,
            stack: FrameStack::new(),
            stop_reason: StopReason::None,
            stepping: SteppingState::default(),
            last_file: None,
            last_line: None,
            last_breakpoint: None,
            last_exception: None,
        }
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// 表示用のスレッド番号
    pub fn thnum(&self) -> usize {
        self.thnum
    }

    pub fn flags(&self) -> ContextFlags {
        self.flags
    }

    pub fn stop_reason(&self) -> StopReason {
        self.stop_reason
    }

    pub fn stepping(&self) -> SteppingState {
        self.stepping
    }

    pub fn stack(&self) -> &FrameStack {
        &self.stack
    }

    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    /// 最後に停止したブレークポイント
    pub fn last_breakpoint(&self) -> Option<BreakpointId> {
        self.last_breakpoint
    }

    /// 最後に一致したキャッチポイントのクラス名
    pub fn last_exception(&self) -> Option<&str> {
        self.last_exception.as_deref()
    }

    /// 現在位置（最も内側のフレーム）
    pub fn location(&self) -> Option<(&str, u32)> {
        self.stack.top().map(|f| (f.file.as_str(), f.line))
    }

    pub fn is_ignored(&self) -> bool {
        self.flags.ignore
    }

    pub fn is_dead(&self) -> bool {
        self.flags.dead
    }

    pub fn is_suspended(&self) -> bool {
        self.flags.suspended
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            thread: self.thread,
            thnum: self.thnum,
            flags: self.flags,
            stop_reason: self.stop_reason,
            frames: self.stack.iter().cloned().collect(),
        }
    }

    pub fn set_ignore(&mut self, ignore: bool) {
        self.flags.ignore = ignore;
    }

    pub fn set_tracing(&mut self, tracing: bool) {
        self.flags.tracing = tracing;
    }

    pub fn set_skipped(&mut self, skipped: bool) {
        self.flags.skipped = skipped;
    }

    pub fn set_breakpoints_enabled(&mut self, enabled: bool) {
        self.flags.breakpoints_enabled = enabled;
    }

    /// スレッド終了としてマークする
    ///
    /// 以降のイベントは全て無視され、フレームスタックも変更されません。
    pub fn mark_dead(&mut self) {
        self.flags.dead = true;
        self.flags.suspended = false;
        self.flags.was_running = false;
        self.reset_stepping_stop_points();
    }

    /// 制御側からスレッドを停止状態にする
    ///
    /// 既に停止中の場合は false を返します。
    pub fn suspend(&mut self) -> bool {
        if self.flags.suspended || self.flags.dead {
            return false;
        }
        self.flags.suspended = true;
        self.flags.was_running = true;
        true
    }

    /// 停止状態を解除する
    pub fn resume(&mut self) -> bool {
        let was_suspended = self.flags.suspended;
        self.flags.suspended = false;
        self.flags.was_running = false;
        self.flags.catching = false;
        was_suspended
    }

    /// 制御側が停止させたスレッドで、再開を待つ必要があるかどうか
    pub fn is_held_by_suspend(&self) -> bool {
        self.flags.suspended && self.flags.was_running && !self.flags.dead
    }

    /// 最も内側のフレームを深さを変えずに置き換える
    ///
    /// 同じ呼び出しの中で束縛やレシーバが変わったときにホストが使います。
    /// フレームがない場合や終了済みの場合は false を返します。
    pub fn update_frame(&mut self, frame: DebugFrame) -> bool {
        if self.flags.dead {
            return false;
        }
        let updated = self.stack.update_top(frame);
        if updated {
            debug!(thread = %self.thread, depth = self.stack.depth(), "top frame updated");
        }
        updated
    }

    /// ステップ実行を設定する
    ///
    /// `force` を指定すると次の call イベントで停止判定を行いません。
    pub fn set_step(&mut self, kind: StepKind, count: u32, force: bool) {
        self.reset_stepping_stop_points();

        let count = count.max(1);
        let depth = self.stack.depth();
        match kind {
            StepKind::Into => {
                self.stepping.stop_next = Some(count);
            }
            StepKind::Over => {
                self.stepping.stop_next = Some(count);
                self.stepping.dest_frame = Some(depth);
            }
            StepKind::Out => {
                self.stepping.stop_frame = Some(depth.saturating_sub(count as usize));
            }
        }
        self.flags.stepped = true;
        self.flags.force_move = force;
        debug!(thread = %self.thread, %kind, count, depth, "stepping armed");
    }

    /// 現在の深さ以下で指定行に到達するまで実行する
    pub fn run_to_line(&mut self, line: u32) {
        self.reset_stepping_stop_points();
        self.stepping.stop_line = Some(line);
        self.stepping.dest_frame = Some(self.stack.depth());
        self.flags.stepped = true;
        debug!(thread = %self.thread, line, "run to line armed");
    }

    /// ステップ実行の停止点をクリアする
    pub fn reset_stepping_stop_points(&mut self) {
        self.stepping = SteppingState::default();
        self.flags.stepped = false;
        self.flags.force_move = false;
    }

    fn accepts_events(&self) -> bool {
        !self.flags.dead && !self.flags.skipped
    }

    /// イベントが届いた時点でスレッドは実行中
    ///
    /// 制御側からの停止要求（`was_running`）は次のイベントの入口で待機させるために残します。
    fn begin_event(&mut self) {
        if !self.flags.was_running {
            self.flags.suspended = false;
        }
        self.stop_reason = StopReason::None;
    }

    fn forget_last_line(&mut self) {
        self.last_file = None;
        self.last_line = None;
    }

    fn stop(&mut self, reason: StopReason) -> SuspendDecision {
        self.reset_stepping_stop_points();
        self.flags.suspended = true;
        self.stop_reason = reason;
        match self.location() {
            Some((file, line)) => info!(thread = %self.thread, %reason, "stopped at {}:{}", file, line),
            None => info!(thread = %self.thread, %reason, "stopped"),
        }
        SuspendDecision::suspend(reason)
    }

    /// call イベントを処理する
    ///
    /// メソッドブレークポイントに一致した場合は停止を返します。
    pub fn on_call<H: HostRuntime + ?Sized>(
        &mut self,
        frame: DebugFrame,
        breakpoints: &mut BreakpointManager,
        host: &H,
    ) -> SuspendDecision {
        if !self.accepts_events() {
            return SuspendDecision::CONTINUE;
        }
        self.begin_event();

        let class = frame.defined_class;
        let binding = frame.binding;
        let self_obj = frame.self_obj;
        let method = frame.method_id.clone();
        self.stack.push(frame);
        self.forget_last_line();
        debug!(thread = %self.thread, depth = self.stack.depth(), method = ?method, "frame pushed");

        if self.flags.force_move {
            self.flags.force_move = false;
            return SuspendDecision::CONTINUE;
        }

        if self.flags.ignore || !self.flags.breakpoints_enabled {
            return SuspendDecision::CONTINUE;
        }

        let Some(method) = method else {
            return SuspendDecision::CONTINUE;
        };

        match breakpoints.find_by_method(host, class, &method, binding, self_obj) {
            Some(id) => {
                self.last_breakpoint = Some(id);
                self.stop(StopReason::Breakpoint)
            }
            None => SuspendDecision::CONTINUE,
        }
    }

    /// line イベントを処理する
    pub fn on_line<H: HostRuntime + ?Sized>(
        &mut self,
        file: &str,
        line: u32,
        breakpoints: &mut BreakpointManager,
        host: &H,
    ) -> SuspendDecision {
        if !self.accepts_events() {
            return SuspendDecision::CONTINUE;
        }

        // 同じ位置の重複通知は評価しない
        if self.last_line == Some(line) && self.last_file.as_deref() == Some(file) {
            return SuspendDecision::CONTINUE;
        }

        self.begin_event();
        self.flags.catching = false;
        self.last_file = Some(file.to_string());
        self.last_line = Some(line);

        if !self.stack.update_top_location(file, line) {
            debug!(thread = %self.thread, "line event without a frame, pushing top-level frame");
            self.stack.push(DebugFrame::new(file, line));
        }

        if self.flags.tracing {
            info!(thread = %self.thread, "Tracing: {}:{}", file, line);
        }

        if self.flags.ignore {
            return SuspendDecision::CONTINUE;
        }

        let step_hit = self.advance_stepping(line);

        let binding = self.stack.top().and_then(|f| f.binding);
        let breakpoint = if self.flags.breakpoints_enabled {
            breakpoints.find_by_pos(host, file, line, binding)
        } else {
            None
        };

        if let Some(id) = breakpoint {
            self.last_breakpoint = Some(id);
            self.stop(StopReason::Breakpoint)
        } else if step_hit {
            self.stop(StopReason::Step)
        } else {
            SuspendDecision::CONTINUE
        }
    }

    /// 新しい行でステップ実行の停止点に到達したかどうか
    fn advance_stepping(&mut self, line: u32) -> bool {
        let depth = self.stack.depth();
        let in_scope = self.stepping.dest_frame.map_or(true, |dest| depth <= dest);
        if !in_scope {
            return false;
        }

        let mut hit = false;
        if let Some(remaining) = self.stepping.stop_next {
            let remaining = remaining.saturating_sub(1);
            self.stepping.stop_next = Some(remaining);
            hit |= remaining == 0;
        }
        if self.stepping.stop_line == Some(line) {
            hit = true;
        }
        hit
    }

    /// return イベントを処理する
    pub fn on_return(&mut self) -> SuspendDecision {
        if !self.accepts_events() {
            return SuspendDecision::CONTINUE;
        }
        self.begin_event();

        if self.stack.pop().is_none() {
            warn!(thread = %self.thread, "return event without a matching call frame");
            return SuspendDecision::CONTINUE;
        }
        self.forget_last_line();

        let depth = self.stack.depth();
        debug!(thread = %self.thread, depth, "frame popped");

        if self.flags.ignore {
            return SuspendDecision::CONTINUE;
        }

        match self.stepping.stop_frame {
            Some(target) if depth <= target => self.stop(StopReason::Step),
            _ => SuspendDecision::CONTINUE,
        }
    }

    /// raise イベントを処理する
    pub fn on_raise<R: TypeReflection + ?Sized>(
        &mut self,
        exception: ObjectRef,
        catchpoints: &mut CatchpointManager,
        reflection: &R,
    ) -> SuspendDecision {
        if !self.accepts_events() {
            return SuspendDecision::CONTINUE;
        }
        self.begin_event();

        if self.flags.ignore || self.flags.catching || self.stack.is_empty() {
            return SuspendDecision::CONTINUE;
        }

        match catchpoints.hit(reflection, exception) {
            Some((name, count)) => {
                debug!(thread = %self.thread, class = %name, count, "catchpoint hit");
                self.last_exception = Some(name);
                self.flags.catching = true;
                self.stop(StopReason::Catchpoint)
            }
            None => SuspendDecision::CONTINUE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakpoint::HitCondition;
    use tsugi_host::StaticHost;

    struct Fixture {
        host: StaticHost,
        breakpoints: BreakpointManager,
        catchpoints: CatchpointManager,
        ctx: DebugContext,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                host: StaticHost::new(),
                breakpoints: BreakpointManager::new(),
                catchpoints: CatchpointManager::new(),
                ctx: DebugContext::new(ThreadId(1), 1),
            }
        }

        fn call(&mut self, file: &str, line: u32, method: &str) -> SuspendDecision {
            let frame = DebugFrame::new(file, line).with_method(method);
            self.ctx.on_call(frame, &mut self.breakpoints, &self.host)
        }

        fn line(&mut self, file: &str, line: u32) -> SuspendDecision {
            self.ctx.on_line(file, line, &mut self.breakpoints, &self.host)
        }

        fn ret(&mut self) -> SuspendDecision {
            self.ctx.on_return()
        }
    }

    #[test]
    fn test_balanced_events_leave_empty_stack() {
        let mut f = Fixture::new();
        f.call("a.rb", 1, "outer");
        f.line("a.rb", 2);
        f.call("a.rb", 10, "inner");
        f.line("a.rb", 11);
        f.line("a.rb", 12);
        f.ret();
        f.line("a.rb", 3);
        f.ret();
        assert_eq!(f.ctx.depth(), 0);
    }

    #[test]
    fn test_duplicate_line_suppressed() {
        let mut f = Fixture::new();
        f.breakpoints.add_position("a.rb", 5);
        f.call("a.rb", 1, "run");

        assert!(f.line("a.rb", 5).should_suspend);
        assert!(!f.line("a.rb", 5).should_suspend);
        assert_eq!(f.breakpoints.get(1).unwrap().hit_count, 1);

        // call/return を挟めば再評価される
        f.call("a.rb", 20, "helper");
        f.ret();
        assert!(f.line("a.rb", 5).should_suspend);
    }

    #[test]
    fn test_line_updates_frame_in_place() {
        let mut f = Fixture::new();
        f.call("a.rb", 1, "run");
        f.line("a.rb", 2);
        f.line("b.rb", 3);
        assert_eq!(f.ctx.depth(), 1);
        assert_eq!(f.ctx.location(), Some(("b.rb", 3)));
        assert_eq!(
            f.ctx.stack().top().unwrap().method_id.as_deref(),
            Some("run")
        );
    }

    #[test]
    fn test_line_without_frame_pushes_toplevel() {
        let mut f = Fixture::new();
        f.line("main.rb", 1);
        assert_eq!(f.ctx.depth(), 1);
        assert_eq!(f.ctx.stack().top().unwrap().method_id, None);
    }

    #[test]
    fn test_step_into_enters_calls() {
        let mut f = Fixture::new();
        f.call("a.rb", 1, "run");
        f.line("a.rb", 2);
        f.ctx.set_step(StepKind::Into, 1, false);

        assert!(!f.call("a.rb", 10, "helper").should_suspend);
        let decision = f.line("a.rb", 11);
        assert_eq!(decision, SuspendDecision::suspend(StopReason::Step));
        assert_eq!(f.ctx.depth(), 2);
        assert!(!f.ctx.flags().stepped);
        assert_eq!(f.ctx.stepping(), SteppingState::default());
    }

    #[test]
    fn test_step_into_counts_lines() {
        let mut f = Fixture::new();
        f.call("a.rb", 1, "run");
        f.ctx.set_step(StepKind::Into, 3, false);

        assert!(!f.line("a.rb", 2).should_suspend);
        assert!(!f.line("a.rb", 3).should_suspend);
        assert!(f.line("a.rb", 4).should_suspend);
        assert!(!f.line("a.rb", 5).should_suspend);
    }

    #[test]
    fn test_step_over_skips_deeper_frames() {
        let mut f = Fixture::new();
        f.call("a.rb", 1, "run");
        f.line("a.rb", 2);
        f.ctx.set_step(StepKind::Over, 1, false);

        f.call("a.rb", 10, "helper");
        assert!(!f.line("a.rb", 11).should_suspend);
        assert!(!f.line("a.rb", 12).should_suspend);
        f.ret();
        let decision = f.line("a.rb", 3);
        assert_eq!(decision.reason, StopReason::Step);
        assert_eq!(f.ctx.depth(), 1);
    }

    #[test]
    fn test_step_over_stops_in_caller_after_return() {
        let mut f = Fixture::new();
        f.call("a.rb", 1, "run");
        f.call("a.rb", 10, "helper");
        f.line("a.rb", 11);
        f.ctx.set_step(StepKind::Over, 1, false);

        f.ret();
        assert!(f.line("a.rb", 2).should_suspend);
    }

    #[test]
    fn test_step_out() {
        let mut f = Fixture::new();
        f.call("a.rb", 1, "run");
        f.call("a.rb", 10, "helper");
        f.call("a.rb", 20, "leaf");
        f.line("a.rb", 21);
        f.ctx.set_step(StepKind::Out, 2, false);
        assert_eq!(f.ctx.stepping().stop_frame, Some(1));

        assert!(!f.line("a.rb", 22).should_suspend);
        assert!(!f.ret().should_suspend);
        f.line("a.rb", 11);
        let decision = f.ret();
        assert_eq!(decision, SuspendDecision::suspend(StopReason::Step));
        assert_eq!(f.ctx.depth(), 1);
        assert_eq!(f.ctx.stepping().stop_frame, None);
    }

    #[test]
    fn test_run_to_line() {
        let mut f = Fixture::new();
        f.call("a.rb", 1, "run");
        f.line("a.rb", 2);
        f.ctx.run_to_line(8);

        f.call("a.rb", 30, "helper");
        assert!(!f.line("a.rb", 8).should_suspend);
        f.ret();
        assert!(!f.line("a.rb", 5).should_suspend);
        assert!(f.line("a.rb", 8).should_suspend);
    }

    #[test]
    fn test_breakpoint_takes_precedence_over_step() {
        let mut f = Fixture::new();
        f.breakpoints.add_position("a.rb", 3);
        f.call("a.rb", 1, "run");
        f.line("a.rb", 2);
        f.ctx.set_step(StepKind::Over, 1, false);

        let decision = f.line("a.rb", 3);
        assert_eq!(decision.reason, StopReason::Breakpoint);
        assert_eq!(f.ctx.last_breakpoint(), Some(1));
        assert!(!f.ctx.stepping().is_armed());
    }

    #[test]
    fn test_ignore_never_suspends() {
        let mut f = Fixture::new();
        f.breakpoints.add_position("a.rb", 3);
        f.call("a.rb", 1, "run");
        f.ctx.set_ignore(true);
        assert!(f.ctx.is_ignored());

        assert!(!f.line("a.rb", 3).should_suspend);
        assert_eq!(f.ctx.location(), Some(("a.rb", 3)));

        f.ctx.set_ignore(false);
        assert!(f.line("a.rb", 4).is_continue());
    }

    #[test]
    fn test_breakpoints_disabled_flag() {
        let mut f = Fixture::new();
        f.breakpoints.add_position("a.rb", 3);
        f.ctx.set_breakpoints_enabled(false);
        f.call("a.rb", 1, "run");
        assert!(!f.line("a.rb", 3).should_suspend);
        assert_eq!(f.breakpoints.get(1).unwrap().hit_count, 0);
    }

    #[test]
    fn test_dead_context_is_inert() {
        let mut f = Fixture::new();
        f.breakpoints.add_position("a.rb", 2);
        f.catchpoints.add("Error");
        let error = f.host.define_class("Error", None).unwrap();
        let exc = f.host.instantiate(error);

        f.call("a.rb", 1, "run");
        f.ctx.mark_dead();

        assert!(!f.call("a.rb", 5, "other").should_suspend);
        assert!(!f.line("a.rb", 2).should_suspend);
        assert!(!f.ret().should_suspend);
        let decision = f.ctx.on_raise(exc, &mut f.catchpoints, &f.host);
        assert!(!decision.should_suspend);

        assert_eq!(f.ctx.depth(), 1);
        assert_eq!(f.ctx.location(), Some(("a.rb", 1)));
        assert_eq!(f.breakpoints.get(1).unwrap().hit_count, 0);
        assert_eq!(f.catchpoints.hit_count("Error"), Some(0));
    }

    #[test]
    fn test_empty_stack_return_is_ignored() {
        let mut f = Fixture::new();
        assert!(!f.ret().should_suspend);
        assert_eq!(f.ctx.depth(), 0);
    }

    #[test]
    fn test_method_breakpoint_on_call() {
        let mut f = Fixture::new();
        let foo = f.host.define_class("Foo", None).unwrap();
        f.breakpoints.add_method(Some("Foo"), "bar");

        let frame = DebugFrame::new("foo.rb", 3).with_method("bar").with_class(foo);
        let decision = f.ctx.on_call(frame, &mut f.breakpoints, &f.host);
        assert_eq!(decision, SuspendDecision::suspend(StopReason::Breakpoint));
        assert_eq!(f.ctx.depth(), 1);
    }

    #[test]
    fn test_force_move_skips_one_call() {
        let mut f = Fixture::new();
        let foo = f.host.define_class("Foo", None).unwrap();
        f.breakpoints.add_method(Some("Foo"), "bar");
        f.call("a.rb", 1, "run");
        f.ctx.set_step(StepKind::Into, 1, true);
        assert!(f.ctx.flags().force_move);

        let frame = DebugFrame::new("foo.rb", 3).with_method("bar").with_class(foo);
        assert!(!f.ctx.on_call(frame, &mut f.breakpoints, &f.host).should_suspend);
        assert!(!f.ctx.flags().force_move);
        assert_eq!(f.breakpoints.get(1).unwrap().hit_count, 0);

        // 次の行ではステップで停止する
        assert_eq!(f.line("foo.rb", 4).reason, StopReason::Step);
    }

    #[test]
    fn test_hit_condition_through_context() {
        let mut f = Fixture::new();
        let id = f.breakpoints.add_position("a.rb", 2);
        f.breakpoints
            .set_hit_condition(id, HitCondition::Equal, 2)
            .unwrap();

        let mut stops = Vec::new();
        for _ in 0..3 {
            f.call("a.rb", 1, "run");
            stops.push(f.line("a.rb", 2).should_suspend);
            f.ret();
        }
        assert_eq!(stops, vec![false, true, false]);
    }

    #[test]
    fn test_catchpoint_sets_catching() {
        let mut f = Fixture::new();
        f.host.define_class("Error", None).unwrap();
        f.host.define_class("IOFailure", Some("Error")).unwrap();
        f.catchpoints.add("Error");
        let exc = f.host.instantiate_named("IOFailure").unwrap();

        f.call("a.rb", 1, "run");
        let decision = f.ctx.on_raise(exc, &mut f.catchpoints, &f.host);
        assert_eq!(decision, SuspendDecision::suspend(StopReason::Catchpoint));
        assert!(f.ctx.flags().catching);
        assert_eq!(f.ctx.last_exception(), Some("Error"));

        // 処理中の再送出では停止しない
        assert!(!f.ctx.on_raise(exc, &mut f.catchpoints, &f.host).should_suspend);
        assert_eq!(f.catchpoints.hit_count("Error"), Some(1));

        f.ctx.resume();
        assert!(f.ctx.on_raise(exc, &mut f.catchpoints, &f.host).should_suspend);
        assert_eq!(f.catchpoints.hit_count("Error"), Some(2));
    }

    #[test]
    fn test_catchpoint_requires_frame() {
        let mut f = Fixture::new();
        f.host.define_class("Error", None).unwrap();
        f.catchpoints.add("Error");
        let exc = f.host.instantiate_named("Error").unwrap();

        assert!(!f.ctx.on_raise(exc, &mut f.catchpoints, &f.host).should_suspend);
        assert_eq!(f.catchpoints.hit_count("Error"), Some(0));
    }

    #[test]
    fn test_suspend_and_resume_flags() {
        let mut ctx = DebugContext::new(ThreadId(3), 2);
        assert!(ctx.suspend());
        assert!(!ctx.suspend());
        assert!(ctx.is_held_by_suspend());

        assert!(ctx.resume());
        assert!(!ctx.is_suspended());
        assert!(!ctx.flags().was_running);
    }

    #[test]
    fn test_suspend_request_survives_inflight_event() {
        let mut f = Fixture::new();
        f.call("a.rb", 1, "run");
        assert!(f.ctx.suspend());

        // 要求と入れ違いに届いたイベントでは要求を失わない
        f.line("a.rb", 2);
        assert!(f.ctx.is_held_by_suspend());
        assert!(f.ctx.flags().was_running);

        assert!(f.ctx.resume());
        f.line("a.rb", 3);
        assert!(!f.ctx.is_suspended());
    }

    #[test]
    fn test_update_frame_keeps_depth() {
        let mut f = Fixture::new();
        assert!(!f.ctx.update_frame(DebugFrame::new("a.rb", 1)));

        f.call("a.rb", 1, "run");
        let scope = f.host.define_class("Scope", None).unwrap();
        let binding = f.host.instantiate(scope);
        let frame = DebugFrame::new("a.rb", 4)
            .with_method("run")
            .with_binding(binding);
        assert!(f.ctx.update_frame(frame.clone()));
        assert_eq!(f.ctx.stack().depth(), 1);
        assert_eq!(f.ctx.stack().top(), Some(&frame));

        f.ctx.mark_dead();
        assert!(!f.ctx.update_frame(DebugFrame::new("a.rb", 5)));
    }

    #[test]
    fn test_skipped_context_ignores_events() {
        let mut f = Fixture::new();
        f.ctx.set_skipped(true);
        f.call("a.rb", 1, "run");
        f.line("a.rb", 2);
        assert_eq!(f.ctx.depth(), 0);
    }
}
