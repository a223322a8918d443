//! ブレークポイント管理
//!
//! ソース位置（ファイル＋行）とメソッド（クラス＋セレクタ）の2種類の
//! ブレークポイントを登録順に保持し、イベントごとの照合とヒット数の計上を行います。

use crate::errors::DebugError;
use crate::Result;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};
use tsugi_host::{ConditionEvaluator, ObjectRef, TypeReflection};

/// ブレークポイントID
pub type BreakpointId = usize;

/// トップレベルのメソッドを表すクラス名
pub const TOPLEVEL_CLASS_NAME: &str = "main";

/// ブレークポイントの種類
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointType {
    /// ソース位置
    Position { source: String, line: u32 },
    /// メソッド（クラス名が None の場合はトップレベル）
    Method {
        class_name: Option<String>,
        method: String,
    },
}

impl fmt::Display for BreakpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakpointType::Position { source, line } => write!(f, "{}:{}", source, line),
            BreakpointType::Method { class_name, method } => write!(
                f,
                "{}#{}",
                class_name.as_deref().unwrap_or(TOPLEVEL_CLASS_NAME),
                method
            ),
        }
    }
}

/// ヒット条件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HitCondition {
    /// 常に停止
    #[default]
    None,
    /// ヒット数が値以上
    AtLeast,
    /// ヒット数が値と等しい
    Equal,
    /// ヒット数が値の倍数
    MultipleOf,
}

impl HitCondition {
    /// ヒット数が条件を満たすかどうか
    pub fn is_satisfied(self, hit_count: u32, hit_value: u32) -> bool {
        match self {
            HitCondition::None => true,
            HitCondition::AtLeast => hit_count >= hit_value,
            HitCondition::Equal => hit_count == hit_value,
            HitCondition::MultipleOf => hit_count
                .checked_rem(hit_value)
                .is_some_and(|rem| rem == 0),
        }
    }
}

impl fmt::Display for HitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HitCondition::None => "none",
            HitCondition::AtLeast => "ge",
            HitCondition::Equal => "eq",
            HitCondition::MultipleOf => "mod",
        };
        f.write_str(s)
    }
}

impl FromStr for HitCondition {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(HitCondition::None),
            "ge" | ">=" | "at-least" => Ok(HitCondition::AtLeast),
            "eq" | "==" | "equal" => Ok(HitCondition::Equal),
            "mod" | "%" | "multiple-of" => Ok(HitCondition::MultipleOf),
            _ => Err(anyhow::anyhow!("Unknown hit condition '{}'", s)),
        }
    }
}

/// ブレークポイント
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: BreakpointId,
    pub kind: BreakpointType,
    pub enabled: bool,
    /// 条件式（評価はホストが行う）
    pub condition: Option<String>,
    /// 位置が一致した回数（無効・条件不成立の場合も数える）
    pub hit_count: u32,
    pub hit_value: u32,
    pub hit_condition: HitCondition,
}

impl Breakpoint {
    fn new(id: BreakpointId, kind: BreakpointType) -> Self {
        Self {
            id,
            kind,
            enabled: true,
            condition: None,
            hit_count: 0,
            hit_value: 0,
            hit_condition: HitCondition::None,
        }
    }

    /// ソース位置が一致するかどうか
    pub fn matches_position(&self, file: &str, line: u32) -> bool {
        match &self.kind {
            BreakpointType::Position {
                source,
                line: bp_line,
            } => *bp_line == line && source_matches(source, file),
            BreakpointType::Method { .. } => false,
        }
    }

    /// メソッドが一致するかどうか
    ///
    /// 定義クラスの名前、またはレシーバ自体がクラス・モジュールの場合は
    /// レシーバの名前と比較します。
    pub fn matches_method<R: TypeReflection + ?Sized>(
        &self,
        reflection: &R,
        class: Option<ObjectRef>,
        method: &str,
        self_obj: Option<ObjectRef>,
    ) -> bool {
        let BreakpointType::Method {
            class_name,
            method: bp_method,
        } = &self.kind
        else {
            return false;
        };

        if bp_method != method {
            return false;
        }

        let class_name = class_name.as_deref();
        if classname_matches(reflection, class_name, class) {
            return true;
        }

        self_obj
            .filter(|obj| reflection.is_module(*obj))
            .is_some_and(|obj| classname_matches(reflection, class_name, Some(obj)))
    }

    /// ヒットを記録し、停止すべきかどうかを判定する
    fn record_hit<E: ConditionEvaluator + ?Sized>(
        &mut self,
        evaluator: &E,
        binding: Option<ObjectRef>,
    ) -> bool {
        self.hit_count = self.hit_count.saturating_add(1);

        if !self.enabled {
            return false;
        }

        if let Some(expr) = &self.condition {
            match evaluator.evaluate_condition(expr, binding) {
                Ok(true) => {}
                Ok(false) => return false,
                Err(e) => {
                    warn!(id = self.id, condition = %expr, "condition evaluation failed: {:#}", e);
                    return false;
                }
            }
        }

        self.hit_condition
            .is_satisfied(self.hit_count, self.hit_value)
    }
}

/// 登録されたソースパスがイベントのファイルと一致するかどうか
///
/// 完全一致に加えて、パス区切りの境界での末尾一致も許します（`app.rb` は `/src/app.rb` に一致）。
pub fn source_matches(source: &str, file: &str) -> bool {
    if source == file {
        return true;
    }
    file.strip_suffix(source)
        .is_some_and(|prefix| prefix.ends_with('/') || prefix.ends_with('\\'))
}

/// クラス名の比較
///
/// 登録名が無い場合はトップレベル（`main`）として扱います。
/// 比較対象のクラスが無い場合と、無名クラスの場合は一致しません。
pub fn classname_matches<R: TypeReflection + ?Sized>(
    reflection: &R,
    registered: Option<&str>,
    class: Option<ObjectRef>,
) -> bool {
    let wanted = registered.unwrap_or(TOPLEVEL_CLASS_NAME);
    let Some(class) = class else {
        return false;
    };
    reflection
        .class_name(class)
        .is_some_and(|name| name == wanted)
}

/// ブレークポイントマネージャ
///
/// ブレークポイントを登録順に保持します。IDは単調増加で、削除後も再利用しません。
#[derive(Debug, Default)]
pub struct BreakpointManager {
    breakpoints: Vec<Breakpoint>,
    last_id: BreakpointId,
}

impl BreakpointManager {
    /// 新しいブレークポイントマネージャを作成する
    pub fn new() -> Self {
        Self {
            breakpoints: Vec::new(),
            last_id: 0,
        }
    }

    /// ブレークポイントを追加する
    pub fn add(&mut self, kind: BreakpointType) -> BreakpointId {
        self.last_id += 1;
        let id = self.last_id;
        debug!(id, location = %kind, "breakpoint added");
        self.breakpoints.push(Breakpoint::new(id, kind));
        id
    }

    /// ソース位置のブレークポイントを追加する
    pub fn add_position(&mut self, source: impl Into<String>, line: u32) -> BreakpointId {
        self.add(BreakpointType::Position {
            source: source.into(),
            line,
        })
    }

    /// メソッドのブレークポイントを追加する
    pub fn add_method(&mut self, class_name: Option<&str>, method: impl Into<String>) -> BreakpointId {
        self.add(BreakpointType::Method {
            class_name: class_name.map(str::to_string),
            method: method.into(),
        })
    }

    /// ブレークポイントを削除する
    pub fn remove(&mut self, id: BreakpointId) -> Result<Breakpoint> {
        let index = self
            .breakpoints
            .iter()
            .position(|bp| bp.id == id)
            .ok_or(DebugError::BreakpointNotFound(id))?;
        debug!(id, "breakpoint removed");
        Ok(self.breakpoints.remove(index))
    }

    fn get_mut(&mut self, id: BreakpointId) -> Result<&mut Breakpoint> {
        self.breakpoints
            .iter_mut()
            .find(|bp| bp.id == id)
            .ok_or_else(|| DebugError::BreakpointNotFound(id).into())
    }

    /// ブレークポイントの有効・無効を切り替える
    pub fn set_enabled(&mut self, id: BreakpointId, enabled: bool) -> Result<()> {
        self.get_mut(id)?.enabled = enabled;
        Ok(())
    }

    pub fn enable(&mut self, id: BreakpointId) -> Result<()> {
        self.set_enabled(id, true)
    }

    pub fn disable(&mut self, id: BreakpointId) -> Result<()> {
        self.set_enabled(id, false)
    }

    /// 条件式を設定する（None で解除）
    pub fn set_condition(&mut self, id: BreakpointId, condition: Option<String>) -> Result<()> {
        self.get_mut(id)?.condition = condition.filter(|c| !c.trim().is_empty());
        Ok(())
    }

    /// ヒット条件を設定する
    pub fn set_hit_condition(
        &mut self,
        id: BreakpointId,
        condition: HitCondition,
        value: u32,
    ) -> Result<()> {
        if condition == HitCondition::MultipleOf && value == 0 {
            return Err(DebugError::InvalidHitValue {
                condition: condition.to_string(),
                value,
            }
            .into());
        }

        let bp = self.get_mut(id)?;
        bp.hit_condition = condition;
        bp.hit_value = value;
        Ok(())
    }

    /// ブレークポイントを取得する
    pub fn get(&self, id: BreakpointId) -> Option<&Breakpoint> {
        self.breakpoints.iter().find(|bp| bp.id == id)
    }

    /// 全てのブレークポイントを登録順に取得する
    pub fn all(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.iter()
    }

    /// ブレークポイントの数を取得する
    pub fn count(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    /// 全てのブレークポイントを削除する（IDの採番は継続する）
    pub fn clear(&mut self) {
        self.breakpoints.clear();
    }

    /// ソース位置で停止するブレークポイントを検索する
    ///
    /// 位置が一致したブレークポイントは停止するかどうかに関わらずヒット数が増えます。
    /// 最初に停止条件を満たしたもの（登録順）を返します。
    pub fn find_by_pos<E: ConditionEvaluator + ?Sized>(
        &mut self,
        evaluator: &E,
        file: &str,
        line: u32,
        binding: Option<ObjectRef>,
    ) -> Option<BreakpointId> {
        self.breakpoints
            .iter_mut()
            .filter(|bp| bp.matches_position(file, line))
            .find_map(|bp| bp.record_hit(evaluator, binding).then_some(bp.id))
    }

    /// メソッド呼び出しで停止するブレークポイントを検索する
    pub fn find_by_method<H>(
        &mut self,
        host: &H,
        class: Option<ObjectRef>,
        method: &str,
        binding: Option<ObjectRef>,
        self_obj: Option<ObjectRef>,
    ) -> Option<BreakpointId>
    where
        H: TypeReflection + ConditionEvaluator + ?Sized,
    {
        for bp in self.breakpoints.iter_mut() {
            if !bp.matches_method(host, class, method, self_obj) {
                continue;
            }
            if bp.record_hit(host, binding) {
                return Some(bp.id);
            }
        }
        None
    }
}
