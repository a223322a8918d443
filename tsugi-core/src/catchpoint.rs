//! キャッチポイント管理
//!
//! 例外クラス名ごとにヒット数を保持します。照合は例外クラスの祖先チェーンを
//! 具体的な方から辿り、最初に登録されている名前を採用します。

use crate::errors::DebugError;
use crate::Result;
use std::collections::BTreeMap;
use tracing::debug;
use tsugi_host::{ObjectRef, TypeReflection};

/// キャッチポイントマネージャ
#[derive(Debug, Default, Clone)]
pub struct CatchpointManager {
    catchpoints: BTreeMap<String, u32>,
}

impl CatchpointManager {
    pub fn new() -> Self {
        Self {
            catchpoints: BTreeMap::new(),
        }
    }

    /// キャッチポイントを追加する（既存の場合はヒット数をリセット）
    pub fn add(&mut self, class_name: impl Into<String>) {
        let class_name = class_name.into();
        debug!(class = %class_name, "catchpoint added");
        self.catchpoints.insert(class_name, 0);
    }

    /// キャッチポイントを削除する
    pub fn remove(&mut self, class_name: &str) -> Result<()> {
        self.catchpoints
            .remove(class_name)
            .map(|_| ())
            .ok_or_else(|| DebugError::CatchpointNotFound(class_name.to_string()).into())
    }

    /// ヒット数を取得する
    pub fn hit_count(&self, class_name: &str) -> Option<u32> {
        self.catchpoints.get(class_name).copied()
    }

    /// 全てのキャッチポイントを名前順に取得する
    pub fn all(&self) -> impl Iterator<Item = (&str, u32)> {
        self.catchpoints.iter().map(|(name, count)| (name.as_str(), *count))
    }

    pub fn count(&self) -> usize {
        self.catchpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catchpoints.is_empty()
    }

    pub fn clear(&mut self) {
        self.catchpoints.clear();
    }

    /// 例外に一致するキャッチポイントのヒット数を増やす
    ///
    /// 一致したクラス名と増加後のヒット数を返します。
    /// 祖先のどれも登録されていなければ None を返し、カウンタは変化しません。
    pub fn hit<R: TypeReflection + ?Sized>(
        &mut self,
        reflection: &R,
        exception: ObjectRef,
    ) -> Option<(String, u32)> {
        if self.catchpoints.is_empty() {
            return None;
        }

        let class = reflection.class_of(exception)?;
        let name = reflection
            .ancestors(class)
            .into_iter()
            .filter_map(|ancestor| reflection.class_name(ancestor))
            .find(|name| self.catchpoints.contains_key(name))?;

        let count = self.catchpoints.get_mut(&name)?;
        *count = count.saturating_add(1);
        Some((name, *count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsugi_host::StaticHost;

    fn host() -> StaticHost {
        let host = StaticHost::new();
        host.define_class("Error", None).unwrap();
        host.define_class("IOFailure", Some("Error")).unwrap();
        host.define_class("Timeout", None).unwrap();
        host
    }

    #[test]
    fn test_base_class_credited() {
        let host = host();
        let mut manager = CatchpointManager::new();
        manager.add("Error");

        let exc = host.instantiate_named("IOFailure").unwrap();
        assert_eq!(manager.hit(&host, exc), Some(("Error".to_string(), 1)));
        assert_eq!(manager.hit_count("Error"), Some(1));
    }

    #[test]
    fn test_most_specific_credited() {
        let host = host();
        let mut manager = CatchpointManager::new();
        manager.add("Error");
        manager.add("IOFailure");

        let exc = host.instantiate_named("IOFailure").unwrap();
        assert_eq!(manager.hit(&host, exc), Some(("IOFailure".to_string(), 1)));
        assert_eq!(manager.hit_count("Error"), Some(0));
    }

    #[test]
    fn test_unrelated_not_counted() {
        let host = host();
        let mut manager = CatchpointManager::new();
        manager.add("Error");

        let exc = host.instantiate_named("Timeout").unwrap();
        assert_eq!(manager.hit(&host, exc), None);
        assert_eq!(manager.hit_count("Error"), Some(0));
    }

    #[test]
    fn test_remove_and_readd_resets() {
        let host = host();
        let mut manager = CatchpointManager::new();
        manager.add("Error");
        let exc = host.instantiate_named("Error").unwrap();
        manager.hit(&host, exc);
        manager.hit(&host, exc);
        assert_eq!(manager.hit_count("Error"), Some(2));

        manager.add("Error");
        assert_eq!(manager.hit_count("Error"), Some(0));

        manager.remove("Error").unwrap();
        assert!(manager.remove("Error").is_err());
        assert!(manager.is_empty());
    }
}
