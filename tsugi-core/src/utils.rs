//! 共通ユーティリティ

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Mutex をロックする
///
/// デバッグ対象のスレッドでパニックが起きていてもデバッガは動き続ける必要があるため、
/// poison 状態は無視して中身を取り出します。
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
