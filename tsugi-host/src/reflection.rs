//! ホストランタイムが提供する機能のインターフェース
//!
//! デバッガコアは型の階層や条件式の評価を自前で行いません。
//! ホストがこれらのトレイトを実装し、セッション作成時に注入します。

use crate::{ObjectRef, Result};

/// 型リフレクション機能
pub trait TypeReflection: Send + Sync {
    /// オブジェクトのクラスを取得する
    fn class_of(&self, object: ObjectRef) -> Option<ObjectRef>;

    /// クラスの表示名を取得する（無名クラスの場合は None）
    fn class_name(&self, class: ObjectRef) -> Option<String>;

    /// クラスの祖先チェーンを取得する
    ///
    /// 最も具体的なクラス（自分自身）が先頭で、基底クラスに向かって並びます。
    fn ancestors(&self, class: ObjectRef) -> Vec<ObjectRef>;

    /// オブジェクト自体がクラスまたはモジュールかどうか
    fn is_module(&self, object: ObjectRef) -> bool;
}

/// ブレークポイント条件式の評価機能
pub trait ConditionEvaluator: Send + Sync {
    /// 指定された束縛の中で条件式を評価する
    ///
    /// 評価に失敗した場合はエラーを返します。コアはエラーを false として扱います。
    fn evaluate_condition(&self, expression: &str, binding: Option<ObjectRef>) -> Result<bool>;
}

/// デバッガセッションに注入されるホスト機能一式
pub trait HostRuntime: TypeReflection + ConditionEvaluator {}

impl<T: TypeReflection + ConditionEvaluator> HostRuntime for T {}
