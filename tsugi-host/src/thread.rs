//! スレッド識別子

use std::fmt;

/// ホストランタイムが発行する不透明なスレッドID
///
/// デバッガはこの値を比較・ハッシュするだけで、中身を解釈しません。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u64);

impl ThreadId {
    /// スレッドIDを作成する
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// 生の値を取得する
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread#{}", self.0)
    }
}

impl From<u64> for ThreadId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_id_display() {
        assert_eq!(ThreadId::new(7).to_string(), "thread#7");
        assert_eq!(ThreadId::from(7), ThreadId(7));
    }
}
