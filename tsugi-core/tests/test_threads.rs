//! スレッドロックの結合テスト
//!
//! 実際の OS スレッドからイベントを送り、保持されたスレッドが待機・再開することを確認します。

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tsugi_core::{
    Command, CommandOutput, DebugFrame, Debugger, HoldReason, LockedThread, StopReason,
    SuspendDecision, ThreadId,
};
use tsugi_host::StaticHost;

const A: ThreadId = ThreadId(1);
const B: ThreadId = ThreadId(2);
const C: ThreadId = ThreadId(3);

const BLOCKED: Duration = Duration::from_millis(100);
const RELEASED: Duration = Duration::from_secs(5);

fn session() -> Arc<Debugger> {
    Arc::new(Debugger::new(Arc::new(StaticHost::new())))
}

/// 別スレッドで line イベントを送り、判定結果をチャネルで返す
fn spawn_line(
    debugger: &Arc<Debugger>,
    thread: ThreadId,
    file: &'static str,
    line: u32,
) -> (mpsc::Receiver<SuspendDecision>, thread::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel();
    let debugger = Arc::clone(debugger);
    let handle = thread::spawn(move || {
        let decision = debugger.on_line(thread, file, line);
        tx.send(decision).expect("receiver dropped");
    });
    (rx, handle)
}

#[test]
fn test_other_threads_wait_for_stopped_thread() {
    let debugger = session();
    debugger
        .execute(A, &Command::parse("break a.rb:3").expect("parse"))
        .expect("Failed to set breakpoint");

    debugger.on_call(A, DebugFrame::new("a.rb", 1).with_method("worker"));
    assert_eq!(
        debugger.on_line(A, "a.rb", 3),
        SuspendDecision::suspend(StopReason::Breakpoint)
    );
    assert_eq!(debugger.controller(), Some(A));

    let (rx, handle) = spawn_line(&debugger, B, "b.rb", 1);
    assert!(rx.recv_timeout(BLOCKED).is_err());

    // 順番待ちとして保持されている
    let held = debugger.held_threads();
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].thread, B);
    assert_eq!(held[0].reason, HoldReason::Queued);
    assert!(debugger.locked_threads().is_empty());

    debugger
        .execute(A, &Command::Continue)
        .expect("Failed to continue");
    let decision = rx.recv_timeout(RELEASED).expect("thread B was not released");
    assert!(decision.is_continue());
    handle.join().expect("thread B panicked");
    assert!(debugger.held_threads().is_empty());
}

#[test]
fn test_explicit_lock_blocks_until_unlock() {
    let debugger = session();
    debugger.on_line(A, "a.rb", 1);
    debugger.on_line(B, "b.rb", 1);

    debugger
        .execute(A, &Command::Lock(2))
        .expect("Failed to lock thread");
    assert!(debugger.is_in_locked(B));
    assert!(!debugger.is_in_locked(A));

    let (rx, handle) = spawn_line(&debugger, B, "b.rb", 2);
    assert!(rx.recv_timeout(BLOCKED).is_err());

    // ロックされていないスレッドは動ける
    assert!(debugger.on_line(A, "a.rb", 2).is_continue());

    assert_eq!(debugger.remove_from_locked(), Some(B));
    rx.recv_timeout(RELEASED).expect("thread B was not released");
    handle.join().expect("thread B panicked");
}

#[test]
fn test_command_suspend_holds_thread_until_resume() {
    let debugger = session();
    debugger.on_line(B, "b.rb", 1);

    assert!(debugger.suspend(B).expect("Failed to suspend"));
    assert!(!debugger.suspend(B).expect("Failed to suspend"));
    assert!(debugger.would_block(B));

    let (rx, handle) = spawn_line(&debugger, B, "b.rb", 2);
    assert!(rx.recv_timeout(BLOCKED).is_err());

    assert!(debugger.resume(B).expect("Failed to resume"));
    rx.recv_timeout(RELEASED).expect("thread B was not released");
    handle.join().expect("thread B panicked");

    let snapshot = debugger.snapshot(B).expect("context should exist");
    assert!(!snapshot.flags.suspended);
    assert!(!snapshot.flags.was_running);
}

#[test]
fn test_end_session_wakes_waiters() {
    let debugger = session();
    debugger.on_line(B, "b.rb", 1);
    debugger.add_to_locked(B);

    let (rx, handle) = spawn_line(&debugger, B, "b.rb", 2);
    assert!(rx.recv_timeout(BLOCKED).is_err());

    debugger.end_session();
    let decision = rx.recv_timeout(RELEASED).expect("thread B was not woken");
    assert!(decision.is_continue());
    handle.join().expect("thread B panicked");

    assert!(debugger.contexts().is_empty());
    assert!(!debugger.would_block(B));
}

#[test]
fn test_thread_end_releases_queued_threads() {
    let debugger = session();
    debugger
        .execute(A, &Command::parse("break a.rb:2").expect("parse"))
        .expect("Failed to set breakpoint");
    assert!(debugger.on_line(A, "a.rb", 2).should_suspend);

    let (rx, handle) = spawn_line(&debugger, B, "b.rb", 1);
    assert!(rx.recv_timeout(BLOCKED).is_err());

    debugger.on_thread_end(A);
    rx.recv_timeout(RELEASED).expect("thread B was not released");
    handle.join().expect("thread B panicked");
    assert_eq!(debugger.controller(), None);
}

#[test]
fn test_unlock_releases_locked_thread_while_others_queue() {
    let debugger = session();
    debugger.on_line(A, "a.rb", 1);
    debugger.on_line(B, "b.rb", 1);
    debugger.on_line(C, "c.rb", 1);
    debugger
        .execute(A, &Command::parse("break a.rb:3").expect("parse"))
        .expect("Failed to set breakpoint");

    assert_eq!(
        debugger
            .execute(A, &Command::Lock(2))
            .expect("Failed to lock thread"),
        CommandOutput::ThreadLocked(B)
    );
    let (rx_b, handle_b) = spawn_line(&debugger, B, "b.rb", 2);
    assert!(rx_b.recv_timeout(BLOCKED).is_err());

    assert!(debugger.on_line(A, "a.rb", 3).should_suspend);
    let (rx_c, handle_c) = spawn_line(&debugger, C, "c.rb", 2);
    assert!(rx_c.recv_timeout(BLOCKED).is_err());
    assert_eq!(
        debugger.held_threads(),
        vec![
            LockedThread { thread: B, reason: HoldReason::Explicit },
            LockedThread { thread: C, reason: HoldReason::Queued },
        ]
    );

    // unlock は順番待ちではなく明示的に保持したスレッドを解放する
    assert_eq!(
        debugger.execute(A, &Command::Unlock).expect("Failed to unlock"),
        CommandOutput::ThreadUnlocked(Some(B))
    );
    assert!(!debugger.is_in_locked(B));
    assert!(debugger.locked_threads().is_empty());
    assert_eq!(
        debugger.execute(A, &Command::Unlock).expect("Failed to unlock"),
        CommandOutput::ThreadUnlocked(None)
    );

    // どちらも A が再開するまでは待つ
    assert!(rx_b.recv_timeout(BLOCKED).is_err());
    assert!(rx_c.recv_timeout(BLOCKED).is_err());

    debugger
        .execute(A, &Command::Continue)
        .expect("Failed to continue");
    assert!(rx_b.recv_timeout(RELEASED).expect("thread B was not released").is_continue());
    assert!(rx_c.recv_timeout(RELEASED).expect("thread C was not released").is_continue());
    handle_b.join().expect("thread B panicked");
    handle_c.join().expect("thread C panicked");
    assert!(debugger.held_threads().is_empty());
}

#[test]
fn test_events_racing_end_session_leave_no_contexts() {
    for _ in 0..20 {
        let debugger = session();
        let workers: Vec<_> = (1..=8)
            .map(|n| {
                let debugger = Arc::clone(&debugger);
                thread::spawn(move || {
                    for line in 1..=50 {
                        debugger.on_line(ThreadId(n), "a.rb", line);
                    }
                })
            })
            .collect();

        debugger.end_session();
        for worker in workers {
            worker.join().expect("worker panicked");
        }
        assert!(debugger.contexts().is_empty());
    }
}
