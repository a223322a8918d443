//! コンテキストマネージャ
//!
//! ホストのスレッドIDからデバッグコンテキストへの対応を管理します。
//! コンテキストはスレッドが初めて観測されたときに作成されます。

use crate::context::{ContextFlags, DebugContext};
use crate::utils::lock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;
use tsugi_host::ThreadId;

/// 共有されるコンテキストへの参照
///
/// 更新はそのスレッド自身のイベントからのみ行われるため、Mutex は制御側の読み取りとしか競合しません。
pub type ContextRef = Arc<Mutex<DebugContext>>;

/// コンテキストマネージャ
#[derive(Debug)]
pub struct ContextManager {
    contexts: Mutex<HashMap<ThreadId, ContextRef>>,
    next_thnum: AtomicUsize,
    defaults: ContextFlags,
}

impl ContextManager {
    /// 新しいコンテキストマネージャを作成する
    pub fn new() -> Self {
        Self::with_defaults(ContextFlags::default())
    }

    /// 新しいコンテキストに適用するフラグを指定して作成する
    pub fn with_defaults(defaults: ContextFlags) -> Self {
        Self {
            contexts: Mutex::new(HashMap::new()),
            next_thnum: AtomicUsize::new(1),
            defaults,
        }
    }

    /// コンテキストを取得し、無ければ作成する
    pub fn get_or_create(&self, thread: ThreadId) -> ContextRef {
        let mut contexts = lock(&self.contexts);
        contexts
            .entry(thread)
            .or_insert_with(|| {
                let thnum = self.next_thnum.fetch_add(1, Ordering::Relaxed);
                debug!(%thread, thnum, "context created");
                Arc::new(Mutex::new(DebugContext::with_flags(thread, thnum, self.defaults)))
            })
            .clone()
    }

    /// コンテキストを取得する
    pub fn get(&self, thread: ThreadId) -> Option<ContextRef> {
        lock(&self.contexts).get(&thread).cloned()
    }

    /// スレッド番号からコンテキストを検索する
    pub fn find_by_thnum(&self, thnum: usize) -> Option<ContextRef> {
        lock(&self.contexts)
            .values()
            .find(|ctx| lock(ctx).thnum() == thnum)
            .cloned()
    }

    /// コンテキストを登録から外す
    pub fn remove(&self, thread: ThreadId) -> Option<ContextRef> {
        lock(&self.contexts).remove(&thread)
    }

    /// 全てのコンテキストをスレッド番号順に取得する
    pub fn contexts(&self) -> Vec<ContextRef> {
        let mut contexts: Vec<(usize, ContextRef)> = lock(&self.contexts)
            .values()
            .map(|ctx| (lock(ctx).thnum(), Arc::clone(ctx)))
            .collect();
        contexts.sort_by_key(|(thnum, _)| *thnum);
        contexts.into_iter().map(|(_, ctx)| ctx).collect()
    }

    /// 登録されているスレッドID
    pub fn threads(&self) -> Vec<ThreadId> {
        lock(&self.contexts).keys().copied().collect()
    }

    pub fn count(&self) -> usize {
        lock(&self.contexts).len()
    }

    /// 全てのコンテキストを終了済みにして登録を空にする
    ///
    /// 実行中のイベント処理が保持している参照は有効なままですが、以降は何もしません。
    pub fn mark_all_dead(&self) -> usize {
        let drained: Vec<ContextRef> = lock(&self.contexts).drain().map(|(_, ctx)| ctx).collect();
        for ctx in &drained {
            lock(ctx).mark_dead();
        }
        drained.len()
    }
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new()
    }
}
