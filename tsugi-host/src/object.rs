//! ホスト側オブジェクトへのハンドル

use std::fmt;

/// ホストランタイム上のオブジェクト（クラス、束縛、例外、レシーバ）への不透明な参照
///
/// コアはこのハンドルを保持して受け渡すだけで、参照先を直接操作しません。
/// 型情報が必要な場合は [`crate::TypeReflection`] を経由します。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef(pub u64);

impl ObjectRef {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}
