//! デバッガコマンド

use crate::breakpoint::{BreakpointId, HitCondition};
use crate::parse::{parse_location, Location};

/// `info` コマンドの対象
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoTarget {
    Breakpoints,
    Catchpoints,
    Threads,
    Locked,
}

/// デバッガコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// ブレークポイントを設定
    Break(Location),
    /// ブレークポイントを削除
    Delete(BreakpointId),
    /// ブレークポイントを有効化
    Enable(BreakpointId),
    /// ブレークポイントを無効化
    Disable(BreakpointId),
    /// 条件式を設定（None で解除）
    Condition {
        id: BreakpointId,
        expr: Option<String>,
    },
    /// ヒット条件を設定
    Hit {
        id: BreakpointId,
        condition: HitCondition,
        value: u32,
    },
    /// 例外クラスのキャッチポイントを設定
    Catch(String),
    /// キャッチポイントを削除
    Uncatch(String),
    /// ステップ実行（`step+` で次の call を停止判定しない）
    Step { count: u32, force: bool },
    /// 次の行へ
    Next { count: u32, force: bool },
    /// 指定フレーム数だけ戻るまで実行
    Finish(u32),
    /// 指定行まで実行
    Until(u32),
    /// 実行継続
    Continue,
    /// スレッド番号のスレッドを保持
    Lock(usize),
    /// 最後に保持したスレッドを解放
    Unlock,
    /// 情報表示
    Info(InfoTarget),
    /// バックトレース表示
    Backtrace,
    /// ヘルプ表示
    Help,
    /// 終了
    Quit,
}

/// 省略可能な回数引数
fn parse_count(arg: Option<&&str>) -> Option<u32> {
    match arg {
        None => Some(1),
        Some(s) => s.parse().ok().filter(|n| *n > 0),
    }
}

impl Command {
    /// コマンド文字列をパースする
    pub fn parse(input: &str) -> Option<Self> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            return None;
        }

        match parts[0] {
            "break" | "b" => {
                if parts.len() > 1 {
                    parse_location(&parts[1..].join(" ")).ok().map(Command::Break)
                } else {
                    None
                }
            }
            "delete" | "d" => parts.get(1)?.parse().ok().map(Command::Delete),
            "enable" => parts.get(1)?.parse().ok().map(Command::Enable),
            "disable" => parts.get(1)?.parse().ok().map(Command::Disable),
            "condition" | "cond" => {
                let id = parts.get(1)?.parse().ok()?;
                let expr = if parts.len() > 2 {
                    Some(parts[2..].join(" "))
                } else {
                    None
                };
                Some(Command::Condition { id, expr })
            }
            "hit" => {
                let id = parts.get(1)?.parse().ok()?;
                let condition: HitCondition = parts.get(2)?.parse().ok()?;
                let value = match (condition, parts.get(3)) {
                    (HitCondition::None, None) => 0,
                    (_, Some(v)) => v.parse().ok()?,
                    (_, None) => return None,
                };
                Some(Command::Hit {
                    id,
                    condition,
                    value,
                })
            }
            "catch" => parts.get(1).map(|c| Command::Catch(c.to_string())),
            "uncatch" => parts.get(1).map(|c| Command::Uncatch(c.to_string())),
            "step" | "s" | "step+" | "s+" => Some(Command::Step {
                count: parse_count(parts.get(1))?,
                force: parts[0].ends_with('+'),
            }),
            "next" | "n" | "next+" | "n+" => Some(Command::Next {
                count: parse_count(parts.get(1))?,
                force: parts[0].ends_with('+'),
            }),
            "finish" | "fin" => parse_count(parts.get(1)).map(Command::Finish),
            "until" | "u" => parts.get(1)?.parse().ok().map(Command::Until),
            "continue" | "c" => Some(Command::Continue),
            "lock" => parts.get(1)?.parse().ok().map(Command::Lock),
            "unlock" => Some(Command::Unlock),
            "info" | "i" => {
                let target = match *parts.get(1)? {
                    "breakpoints" | "break" | "b" => InfoTarget::Breakpoints,
                    "catchpoints" | "catch" => InfoTarget::Catchpoints,
                    "threads" | "thread" | "th" => InfoTarget::Threads,
                    "locked" => InfoTarget::Locked,
                    _ => return None,
                };
                Some(Command::Info(target))
            }
            "backtrace" | "bt" | "where" => Some(Command::Backtrace),
            "help" | "h" | "?" => Some(Command::Help),
            "quit" | "q" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }

    /// 実行を再開させるコマンドかどうか
    pub fn resumes(&self) -> bool {
        matches!(
            self,
            Command::Step { .. }
                | Command::Next { .. }
                | Command::Finish(_)
                | Command::Until(_)
                | Command::Continue
        )
    }
}

/// ヘルプ文字列
pub const HELP: &str = "\
Commands:
  break <file:line|Class#method|Class.method>  Set a breakpoint
  delete <id>                                  Delete a breakpoint
  enable <id> / disable <id>                   Enable or disable a breakpoint
  condition <id> [expr]                        Set or clear a breakpoint condition
  hit <id> <none|ge|eq|mod> [value]            Set a hit condition
  catch <Class> / uncatch <Class>              Add or remove a catchpoint
  step [n] / next [n]                          Step into / over (append + to skip the next call)
  finish [n]                                   Run until n frames have returned
  until <line>                                 Run until the line in the current frame
  continue                                     Resume execution
  lock <thnum> / unlock                        Hold a thread / release the last held one
  info breakpoints|catchpoints|threads|locked  Show debugger state
  backtrace                                    Show the current frames
  help                                         Show this help
  quit                                         End the debug session";
