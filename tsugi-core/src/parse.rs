//! ブレークポイント位置のパース

use crate::errors::DebugError;
use crate::Result;
use regex::Regex;
use std::sync::OnceLock;

/// ブレークポイントの指定位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// `file:line`
    Position { file: String, line: u32 },
    /// `Class#method`、`Class.method`、または `method`（トップレベル）
    Method {
        class_name: Option<String>,
        method: String,
    },
}

/// 位置指定のパーサー
pub struct LocationParser {
    /// ファイル:行 のパターン
    position_pattern: Regex,
    /// クラス#メソッド のパターン
    method_pattern: Regex,
}

impl LocationParser {
    /// パーサーを作成する
    pub fn new() -> Result<Self> {
        // 例: app.rb:10, /src/lib/app.rb:120, C:\src\app.rb:3
        let position_pattern = Regex::new(r"^(?P<file>.+):(?P<line>\d+)$")?;

        // 例: Foo#bar, Foo::Bar.baz, run, valid?
        let method_pattern = Regex::new(
            r"^(?:(?P<class>[A-Za-z_][A-Za-z0-9_]*(?:::[A-Za-z_][A-Za-z0-9_]*)*)[#.])?(?P<method>[A-Za-z_][A-Za-z0-9_]*[?!=]?)$",
        )?;

        Ok(Self {
            position_pattern,
            method_pattern,
        })
    }

    /// 位置指定文字列をパースする
    pub fn parse(&self, input: &str) -> Result<Location> {
        let input = input.trim();

        if let Some(caps) = self.position_pattern.captures(input) {
            let line = caps["line"]
                .parse::<u32>()
                .map_err(|_| DebugError::InvalidLocation(input.to_string()))?;
            if line == 0 {
                return Err(DebugError::InvalidLocation(input.to_string()).into());
            }
            return Ok(Location::Position {
                file: caps["file"].to_string(),
                line,
            });
        }

        if let Some(caps) = self.method_pattern.captures(input) {
            return Ok(Location::Method {
                class_name: caps.name("class").map(|m| m.as_str().to_string()),
                method: caps["method"].to_string(),
            });
        }

        Err(DebugError::InvalidLocation(input.to_string()).into())
    }
}

/// 位置指定文字列をパースする
///
/// # Examples
/// ```
/// use tsugi_core::parse::{parse_location, Location};
///
/// assert_eq!(
///     parse_location("app.rb:10").unwrap(),
///     Location::Position { file: "app.rb".to_string(), line: 10 }
/// );
/// ```
pub fn parse_location(input: &str) -> Result<Location> {
    static PARSER: OnceLock<LocationParser> = OnceLock::new();
    if let Some(parser) = PARSER.get() {
        return parser.parse(input);
    }
    let parser = LocationParser::new()?;
    PARSER.get_or_init(|| parser).parse(input)
}
