//! イベントスクリプトのパース
//!
//! 1行に1つの指示を書きます。行頭または空白に続く `#` 以降はコメントです。
//!
//! ```text
//! class Error
//! class IOFailure < Error
//! cond ready? true
//! break app.rb:3
//! t1 call app.rb:1 Worker#run
//! t1 line app.rb:3
//! t1 continue
//! t1 return
//! t1 end
//! ```

use anyhow::{anyhow, bail, Context};
use tsugi_core::{parse_location, Command, Location, ThreadId};

use crate::Result;

/// スレッドのイベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Call {
        file: String,
        line: u32,
        class_name: Option<String>,
        method: String,
        /// `Class.method` 形式（レシーバがクラス自身）
        singleton: bool,
    },
    Line {
        file: String,
        line: u32,
    },
    Return,
    Raise(String),
    End,
}

/// スクリプトの1行
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// クラス定義
    Class {
        name: String,
        superclass: Option<String>,
    },
    /// モジュール定義
    Module(String),
    /// 条件式の値を固定
    Cond { expr: String, value: bool },
    /// スレッドのイベント
    Event { thread: ThreadId, event: Event },
    /// デバッガコマンド（スレッド省略時は最後に停止したスレッド）
    Command {
        thread: Option<ThreadId>,
        command: Command,
    },
}

/// 行番号付きの指示
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLine {
    pub number: usize,
    pub directive: Directive,
}

/// スクリプト全体をパースする
pub fn parse_script(source: &str) -> Result<Vec<ScriptLine>> {
    let mut lines = Vec::new();
    for (index, raw) in source.lines().enumerate() {
        let number = index + 1;
        let text = strip_comment(raw).trim();
        if text.is_empty() {
            continue;
        }
        let directive =
            parse_directive(text).with_context(|| format!("line {}: '{}'", number, text))?;
        lines.push(ScriptLine { number, directive });
    }
    Ok(lines)
}

/// 行頭または空白の直後の `#` からをコメントとして取り除く（`Foo#bar` は残す）
fn strip_comment(raw: &str) -> &str {
    let mut prev_is_space = true;
    for (index, c) in raw.char_indices() {
        if c == '#' && prev_is_space {
            return &raw[..index];
        }
        prev_is_space = c.is_whitespace();
    }
    raw
}

/// `t<N>` 形式のスレッド指定
fn parse_thread(word: &str) -> Option<ThreadId> {
    word.strip_prefix('t')?.parse().ok().map(ThreadId)
}

/// `file:line` 形式の位置
fn parse_position(word: &str) -> Result<(String, u32)> {
    match parse_location(word)? {
        Location::Position { file, line } => Ok((file, line)),
        Location::Method { .. } => bail!("expected <file>:<line>, got '{}'", word),
    }
}

/// 1行をパースする
pub fn parse_directive(text: &str) -> Result<Directive> {
    let parts: Vec<&str> = text.split_whitespace().collect();
    let Some(&head) = parts.first() else {
        bail!("empty directive");
    };

    match head {
        "class" => {
            let name = parts.get(1).ok_or_else(|| anyhow!("class name required"))?;
            let superclass = match (parts.get(2), parts.get(3)) {
                (None, _) => None,
                (Some(&"<"), Some(sup)) => Some(sup.to_string()),
                _ => bail!("expected 'class <Name> [< <Super>]'"),
            };
            Ok(Directive::Class {
                name: name.to_string(),
                superclass,
            })
        }
        "module" => {
            let name = parts.get(1).ok_or_else(|| anyhow!("module name required"))?;
            Ok(Directive::Module(name.to_string()))
        }
        "cond" => {
            if parts.len() < 3 {
                bail!("expected 'cond <expr> <true|false>'");
            }
            let value = match parts[parts.len() - 1] {
                "true" => true,
                "false" => false,
                other => bail!("condition value must be true or false, got '{}'", other),
            };
            Ok(Directive::Cond {
                expr: parts[1..parts.len() - 1].join(" "),
                value,
            })
        }
        _ => match parse_thread(head) {
            Some(thread) => parse_thread_directive(thread, &parts[1..]),
            None => parse_command(None, text),
        },
    }
}

fn parse_command(thread: Option<ThreadId>, text: &str) -> Result<Directive> {
    let command = Command::parse(text).ok_or_else(|| anyhow!("unknown command '{}'", text))?;
    Ok(Directive::Command { thread, command })
}

fn parse_thread_directive(thread: ThreadId, args: &[&str]) -> Result<Directive> {
    let Some(&kind) = args.first() else {
        bail!("event or command required after thread");
    };

    let event = match kind {
        "call" => {
            let position = args.get(1).ok_or_else(|| anyhow!("call position required"))?;
            let (file, line) = parse_position(position)?;
            let target = args.get(2).ok_or_else(|| anyhow!("call method required"))?;
            let singleton = target.contains('.');
            match parse_location(target)? {
                Location::Method { class_name, method } => Event::Call {
                    file,
                    line,
                    class_name,
                    method,
                    singleton,
                },
                Location::Position { .. } => bail!("expected a method, got '{}'", target),
            }
        }
        "line" => {
            let position = args.get(1).ok_or_else(|| anyhow!("line position required"))?;
            let (file, line) = parse_position(position)?;
            Event::Line { file, line }
        }
        "return" => Event::Return,
        "raise" => {
            let class = args.get(1).ok_or_else(|| anyhow!("exception class required"))?;
            Event::Raise(class.to_string())
        }
        "end" => Event::End,
        _ => return parse_command(Some(thread), &args.join(" ")),
    };
    Ok(Directive::Event { thread, event })
}
