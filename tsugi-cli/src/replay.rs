//! イベントスクリプトのリプレイ
//!
//! 全ての論理スレッドを1つの OS スレッドで再生します。保持されているスレッドのイベントは
//! ブロックせずに保留し、保持が解けた時点で順番に送り直します。

use crate::script::{Directive, Event, ScriptLine};
use crate::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};
use tsugi_core::{
    Command, CommandOutput, DebugFrame, Debugger, DebuggerConfig, HoldReason, SuspendDecision,
    ThreadId, HELP,
};
use tsugi_host::{ObjectRef, StaticHost};

/// トップレベルのメソッドを定義するクラス
const TOPLEVEL_CLASS: &str = "main";

/// 停止の記録
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopRecord {
    pub thread: ThreadId,
    pub decision: SuspendDecision,
    pub location: Option<(String, u32)>,
}

/// リプレイの実行器
pub struct Replayer {
    host: Arc<StaticHost>,
    debugger: Debugger,
    /// 保持中のスレッドに送れなかったイベント
    pending: BTreeMap<ThreadId, VecDeque<Event>>,
    last_stopped: Option<ThreadId>,
    stops: Vec<StopRecord>,
    editor: Option<DefaultEditor>,
}

impl Replayer {
    /// 新しい実行器を作成する
    pub fn new(config: DebuggerConfig) -> Result<Self> {
        let host = Arc::new(StaticHost::new());
        host.define_class(TOPLEVEL_CLASS, None)?;
        let debugger = Debugger::with_config(host.clone(), config);
        Ok(Self {
            host,
            debugger,
            pending: BTreeMap::new(),
            last_stopped: None,
            stops: Vec::new(),
            editor: None,
        })
    }

    /// 停止ごとに対話プロンプトを開く
    pub fn interactive(mut self) -> Result<Self> {
        self.editor = Some(DefaultEditor::new()?);
        Ok(self)
    }

    pub fn debugger(&self) -> &Debugger {
        &self.debugger
    }

    /// これまでの停止
    pub fn stops(&self) -> &[StopRecord] {
        &self.stops
    }

    /// 保留中のイベントがあるスレッド
    pub fn blocked_threads(&self) -> Vec<(ThreadId, usize)> {
        self.pending
            .iter()
            .map(|(thread, events)| (*thread, events.len()))
            .collect()
    }

    /// スクリプトを最後まで再生する
    pub fn run(&mut self, script: &[ScriptLine]) -> Result<()> {
        for line in script {
            if !self.debugger.is_active() {
                debug!(line = line.number, "session ended, skipping rest of script");
                break;
            }
            self.apply(line)?;
            self.flush_pending();
        }

        for (thread, count) in self.blocked_threads() {
            warn!(%thread, pending = count, "thread is still held at end of script");
            println!("{} is still held with {} pending event(s)", thread, count);
        }
        self.debugger.end_session();
        Ok(())
    }

    fn apply(&mut self, line: &ScriptLine) -> Result<()> {
        match &line.directive {
            Directive::Class { name, superclass } => {
                self.host.define_class(name, superclass.as_deref())?;
            }
            Directive::Module(name) => {
                self.host.define_module(name);
            }
            Directive::Cond { expr, value } => self.host.set_condition(expr, *value),
            Directive::Event { thread, event } => self.dispatch(*thread, event.clone())?,
            Directive::Command { thread, command } => {
                let thread = thread.or(self.last_stopped).unwrap_or(ThreadId(1));
                self.run_command(thread, command);
            }
        }
        Ok(())
    }

    /// イベントを送る。保持中のスレッドなら保留する
    fn dispatch(&mut self, thread: ThreadId, event: Event) -> Result<()> {
        let queued = self.pending.get(&thread).is_some_and(|q| !q.is_empty());
        if queued || self.debugger.would_block(thread) {
            debug!(%thread, ?event, "thread is held, event deferred");
            self.pending.entry(thread).or_default().push_back(event);
            return Ok(());
        }
        self.deliver(thread, event)
    }

    /// 保持が解けたスレッドの保留イベントを送る
    fn flush_pending(&mut self) {
        loop {
            let ready = self
                .pending
                .keys()
                .copied()
                .find(|thread| !self.debugger.would_block(*thread));
            let Some(thread) = ready else {
                return;
            };
            let Some(event) = self.pending.get_mut(&thread).and_then(VecDeque::pop_front) else {
                self.pending.remove(&thread);
                continue;
            };
            if self.pending.get(&thread).is_some_and(VecDeque::is_empty) {
                self.pending.remove(&thread);
            }
            if let Err(e) = self.deliver(thread, event) {
                eprintln!("Error: {:#}", e);
            }
        }
    }

    fn deliver(&mut self, thread: ThreadId, event: Event) -> Result<()> {
        let decision = match event {
            Event::Call {
                file,
                line,
                class_name,
                method,
                singleton,
            } => {
                let frame = self.call_frame(file, line, class_name.as_deref(), method, singleton)?;
                self.debugger.on_call(thread, frame)
            }
            Event::Line { file, line } => self.debugger.on_line(thread, &file, line),
            Event::Return => self.debugger.on_return(thread),
            Event::Raise(class) => {
                let exception = self.host.instantiate_named(&class)?;
                self.debugger.on_raise(thread, exception)
            }
            Event::End => {
                self.debugger.on_thread_end(thread);
                if self.last_stopped == Some(thread) {
                    self.last_stopped = None;
                }
                SuspendDecision::CONTINUE
            }
        };

        if decision.should_suspend {
            self.report_stop(thread, decision);
            if self.editor.is_some() {
                self.prompt(thread)?;
            }
        }
        Ok(())
    }

    /// call イベントのフレームを組み立てる
    ///
    /// `Class.method` は特異クラスで定義され、レシーバはクラス自身になります。
    fn call_frame(
        &self,
        file: String,
        line: u32,
        class_name: Option<&str>,
        method: String,
        singleton: bool,
    ) -> Result<DebugFrame> {
        let class = self.resolve_class(class_name.unwrap_or(TOPLEVEL_CLASS))?;
        let frame = DebugFrame::new(file, line).with_method(method);
        let frame = if singleton {
            let metaclass = self.host.define_anonymous_class(None);
            frame.with_class(metaclass).with_self(class)
        } else {
            frame.with_class(class).with_self(self.host.instantiate(class))
        };
        Ok(frame)
    }

    fn resolve_class(&self, name: &str) -> Result<ObjectRef> {
        match self.host.class(name) {
            Some(class) => Ok(class),
            None => {
                debug!(class = name, "defining class on first use");
                self.host.define_class(name, None)
            }
        }
    }

    fn report_stop(&mut self, thread: ThreadId, decision: SuspendDecision) {
        let snapshot = self.debugger.snapshot(thread);
        let location = snapshot
            .as_ref()
            .and_then(|s| s.frames.first())
            .map(|f| (f.file.clone(), f.line));
        let thnum = snapshot.as_ref().map_or(0, |s| s.thnum);

        match &location {
            Some((file, line)) => println!(
                "Thread {} ({}) stopped by {} at {}:{}",
                thnum, thread, decision.reason, file, line
            ),
            None => println!("Thread {} ({}) stopped by {}", thnum, thread, decision.reason),
        }

        self.last_stopped = Some(thread);
        self.stops.push(StopRecord {
            thread,
            decision,
            location,
        });
    }

    /// コマンドを実行して結果を表示する
    ///
    /// 実行を再開するコマンドだった場合は true を返します。
    fn run_command(&mut self, thread: ThreadId, command: &Command) -> bool {
        match self.debugger.execute(thread, command) {
            Ok(output) => {
                print_output(&output);
                matches!(
                    output,
                    CommandOutput::Resumed(_) | CommandOutput::SessionEnded
                )
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                false
            }
        }
    }

    /// 停止したスレッドで対話的にコマンドを受け付ける
    fn prompt(&mut self, thread: ThreadId) -> Result<()> {
        let prompt = format!("(tsugi:{}) ", thread);
        loop {
            let Some(editor) = self.editor.as_mut() else {
                return Ok(());
            };
            let readline = editor.readline(&prompt);
            match readline {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    editor.add_history_entry(line)?;

                    match Command::parse(line) {
                        Some(command) => {
                            if self.run_command(thread, &command) {
                                return Ok(());
                            }
                        }
                        None => {
                            println!("Unknown command: {}", line);
                            println!("Type 'help' for available commands.");
                        }
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                    // 対話を打ち切り、以降はスクリプトのみで進める
                    self.editor = None;
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// コマンドの結果を表示する
pub fn print_output(output: &CommandOutput) {
    match output {
        CommandOutput::Updated => {}
        CommandOutput::BreakpointSet(bp) => {
            println!("Breakpoint {} set at {}", bp.id, bp.kind)
        }
        CommandOutput::BreakpointDeleted(id) => println!("Breakpoint {} deleted", id),
        CommandOutput::CatchpointSet(class) => println!("Catching exception {}", class),
        CommandOutput::CatchpointDeleted(class) => println!("Catchpoint {} deleted", class),
        CommandOutput::Resumed(thread) => debug!(%thread, "resumed"),
        CommandOutput::Breakpoints(list) => {
            if list.is_empty() {
                println!("No breakpoints");
                return;
            }
            println!("Num Enb Hits Condition            Where");
            for bp in list {
                let hit = match bp.hit_condition {
                    tsugi_core::HitCondition::None => String::new(),
                    condition => format!(" (hit {} {})", condition, bp.hit_value),
                };
                println!(
                    "{:<3} {:<3} {:<4} {:<20} {}{}",
                    bp.id,
                    if bp.enabled { "y" } else { "n" },
                    bp.hit_count,
                    bp.condition.as_deref().unwrap_or("-"),
                    bp.kind,
                    hit
                );
            }
        }
        CommandOutput::Catchpoints(list) => {
            if list.is_empty() {
                println!("No catchpoints");
            }
            for (class, count) in list {
                println!("{}: {} hit(s)", class, count);
            }
        }
        CommandOutput::Threads(contexts) => {
            for ctx in contexts {
                let location = ctx
                    .frames
                    .first()
                    .map(|f| format!("{}:{}", f.file, f.line))
                    .unwrap_or_else(|| "-".to_string());
                let state = if ctx.flags.suspended { "suspended" } else { "running" };
                println!("{:>3} {} {} {}", ctx.thnum, ctx.thread, state, location);
            }
        }
        CommandOutput::Locked(threads) => {
            if threads.is_empty() {
                println!("No locked threads");
            }
            for entry in threads {
                let reason = match entry.reason {
                    HoldReason::Explicit => "locked",
                    HoldReason::Queued => "waiting",
                };
                println!("{} {}", entry.thread, reason);
            }
        }
        CommandOutput::ThreadLocked(thread) => println!("{} locked", thread),
        CommandOutput::ThreadUnlocked(Some(thread)) => println!("{} unlocked", thread),
        CommandOutput::ThreadUnlocked(None) => println!("No locked threads"),
        CommandOutput::Backtrace(frames) => {
            for (index, frame) in frames.iter().enumerate() {
                let method = frame.method_id.as_deref().unwrap_or("<main>");
                println!("#{} {} at {}:{}", index, method, frame.file, frame.line);
            }
        }
        CommandOutput::Help => println!("{}", HELP),
        CommandOutput::SessionEnded => println!("Debug session ended"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parse_script;
    use tsugi_core::StopReason;

    fn replay(source: &str) -> Replayer {
        let script = parse_script(source).unwrap();
        let mut replayer = Replayer::new(DebuggerConfig::default()).unwrap();
        replayer.run(&script).unwrap();
        replayer
    }

    fn reasons(replayer: &Replayer) -> Vec<(ThreadId, StopReason)> {
        replayer
            .stops()
            .iter()
            .map(|s| (s.thread, s.decision.reason))
            .collect()
    }

    #[test]
    fn test_breakpoint_then_step() {
        let replayer = replay(
            "break app.rb:2
             t1 call app.rb:1 Worker#run
             t1 line app.rb:2
             next
             t1 call app.rb:10 Worker#helper
             t1 line app.rb:11
             t1 return
             t1 line app.rb:3
             continue
             t1 return
             t1 end",
        );
        assert_eq!(
            reasons(&replayer),
            vec![
                (ThreadId(1), StopReason::Breakpoint),
                (ThreadId(1), StopReason::Step)
            ]
        );
        assert_eq!(
            replayer.stops()[1].location,
            Some(("app.rb".to_string(), 3))
        );
    }

    #[test]
    fn test_method_breakpoints() {
        let replayer = replay(
            "class Base
             class Child < Base
             break Child#save
             break Base.create
             t1 call a.rb:1 Base#save
             t1 return
             t1 call a.rb:5 Child#save
             continue
             t1 return
             t1 call a.rb:9 Base.create
             continue
             t1 return",
        );
        assert_eq!(
            reasons(&replayer),
            vec![
                (ThreadId(1), StopReason::Breakpoint),
                (ThreadId(1), StopReason::Breakpoint)
            ]
        );
        assert_eq!(
            replayer.stops()[1].location,
            Some(("a.rb".to_string(), 9))
        );
    }

    #[test]
    fn test_held_thread_events_are_deferred() {
        let replayer = replay(
            "break a.rb:2
             t1 line a.rb:1
             t2 line b.rb:1
             t1 line a.rb:2
             t2 line b.rb:2
             t2 line b.rb:3
             t1 continue
             t1 end
             t2 end",
        );
        assert_eq!(reasons(&replayer), vec![(ThreadId(1), StopReason::Breakpoint)]);
        assert!(replayer.blocked_threads().is_empty());
    }

    #[test]
    fn test_explicit_lock_leaves_events_pending() {
        let replayer = replay(
            "t1 line a.rb:1
             t2 line b.rb:1
             lock 2
             t2 line b.rb:2
             t1 line a.rb:2",
        );
        assert_eq!(replayer.blocked_threads(), vec![(ThreadId(2), 1)]);
    }

    #[test]
    fn test_catchpoint_with_condition() {
        let replayer = replay(
            "class Error
             class IOFailure < Error
             catch Error
             cond ready? false
             break a.rb:3
             condition 1 ready?
             t1 call a.rb:1 main#work
             t1 line a.rb:3
             t1 raise IOFailure
             continue
             t1 return",
        );
        assert_eq!(reasons(&replayer), vec![(ThreadId(1), StopReason::Catchpoint)]);
        assert_eq!(replayer.debugger().catchpoint_hit_count("Error"), Some(1));
        assert_eq!(
            replayer.debugger().breakpoint(1).map(|bp| bp.hit_count),
            Some(1)
        );
    }

    #[test]
    fn test_quit_stops_replay() {
        let replayer = replay(
            "break a.rb:1
             quit
             t1 line a.rb:1",
        );
        assert!(replayer.stops().is_empty());
        assert!(!replayer.debugger().is_active());
    }
}
