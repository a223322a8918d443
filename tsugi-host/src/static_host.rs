//! テーブル駆動のホスト実装
//!
//! クラス階層と条件式の評価結果をあらかじめ登録しておくだけのホストです。
//! イベントスクリプトのリプレイやテストで、実際のランタイムの代わりに使用します。

use crate::{ConditionEvaluator, ObjectRef, Result, TypeReflection};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// StaticHost のエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("unknown class '{0}'")]
    UnknownClass(String),
    #[error("condition '{0}' has no registered value")]
    UndefinedCondition(String),
}

#[derive(Debug, Clone)]
struct ClassEntry {
    name: Option<String>,
    superclass: Option<ObjectRef>,
}

#[derive(Debug, Default)]
struct Inner {
    classes: HashMap<ObjectRef, ClassEntry>,
    by_name: HashMap<String, ObjectRef>,
    instances: HashMap<ObjectRef, ObjectRef>,
    conditions: HashMap<String, bool>,
}

/// テーブル駆動のホスト
#[derive(Debug)]
pub struct StaticHost {
    inner: RwLock<Inner>,
    next_id: AtomicU64,
}

impl StaticHost {
    /// 空のホストを作成する
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            next_id: AtomicU64::new(1),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn allocate(&self) -> ObjectRef {
        ObjectRef(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn insert_class(&self, entry: ClassEntry) -> ObjectRef {
        let id = self.allocate();
        let mut inner = self.write();
        if let Some(name) = &entry.name {
            inner.by_name.insert(name.clone(), id);
        }
        inner.classes.insert(id, entry);
        id
    }

    /// 名前付きクラスを定義する
    ///
    /// 同名のクラスが既に存在する場合はそれを返します。
    /// 親クラスは事前に定義されている必要があります。
    pub fn define_class(&self, name: &str, superclass: Option<&str>) -> Result<ObjectRef> {
        if let Some(existing) = self.class(name) {
            return Ok(existing);
        }

        let superclass = match superclass {
            Some(parent) => Some(
                self.class(parent)
                    .ok_or_else(|| HostError::UnknownClass(parent.to_string()))?,
            ),
            None => None,
        };

        Ok(self.insert_class(ClassEntry {
            name: Some(name.to_string()),
            superclass,
        }))
    }

    /// モジュールを定義する
    pub fn define_module(&self, name: &str) -> ObjectRef {
        if let Some(existing) = self.class(name) {
            return existing;
        }
        self.insert_class(ClassEntry {
            name: Some(name.to_string()),
            superclass: None,
        })
    }

    /// 無名クラスを定義する
    pub fn define_anonymous_class(&self, superclass: Option<ObjectRef>) -> ObjectRef {
        self.insert_class(ClassEntry {
            name: None,
            superclass,
        })
    }

    /// 名前からクラスを検索する
    pub fn class(&self, name: &str) -> Option<ObjectRef> {
        self.read().by_name.get(name).copied()
    }

    /// クラスのインスタンスを作成する
    pub fn instantiate(&self, class: ObjectRef) -> ObjectRef {
        let id = self.allocate();
        self.write().instances.insert(id, class);
        id
    }

    /// 名前でクラスを指定してインスタンスを作成する
    pub fn instantiate_named(&self, class: &str) -> Result<ObjectRef> {
        let class = self
            .class(class)
            .ok_or_else(|| HostError::UnknownClass(class.to_string()))?;
        Ok(self.instantiate(class))
    }

    /// 条件式の評価結果を登録する
    pub fn set_condition(&self, expression: &str, value: bool) {
        self.write()
            .conditions
            .insert(expression.trim().to_string(), value);
    }

    /// 条件式の評価結果を削除する
    pub fn clear_condition(&self, expression: &str) {
        self.write().conditions.remove(expression.trim());
    }
}

impl Default for StaticHost {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeReflection for StaticHost {
    fn class_of(&self, object: ObjectRef) -> Option<ObjectRef> {
        self.read().instances.get(&object).copied()
    }

    fn class_name(&self, class: ObjectRef) -> Option<String> {
        self.read().classes.get(&class).and_then(|c| c.name.clone())
    }

    fn ancestors(&self, class: ObjectRef) -> Vec<ObjectRef> {
        let inner = self.read();
        let mut chain = Vec::new();
        let mut current = Some(class);

        while let Some(id) = current {
            let Some(entry) = inner.classes.get(&id) else {
                break;
            };
            chain.push(id);
            current = entry.superclass;
        }

        chain
    }

    fn is_module(&self, object: ObjectRef) -> bool {
        self.read().classes.contains_key(&object)
    }
}

impl ConditionEvaluator for StaticHost {
    fn evaluate_condition(&self, expression: &str, _binding: Option<ObjectRef>) -> Result<bool> {
        let expression = expression.trim();
        match expression {
            "true" => return Ok(true),
            "false" | "nil" => return Ok(false),
            _ => {}
        }

        self.read()
            .conditions
            .get(expression)
            .copied()
            .ok_or_else(|| HostError::UndefinedCondition(expression.to_string()).into())
    }
}
