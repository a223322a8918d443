//! フレームスタック（デバッガから見た呼び出しスタック）

use tsugi_host::ObjectRef;

/// スタックフレーム（メソッド呼び出し1回分）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugFrame {
    pub file: String,
    pub line: u32,
    /// メソッド名（トップレベルの場合は None）
    pub method_id: Option<String>,
    /// メソッドを定義しているクラス
    pub defined_class: Option<ObjectRef>,
    /// その時点の束縛（条件式の評価に使用）
    pub binding: Option<ObjectRef>,
    /// レシーバ
    pub self_obj: Option<ObjectRef>,
}

impl DebugFrame {
    /// 位置だけを持つフレームを作成する
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
            method_id: None,
            defined_class: None,
            binding: None,
            self_obj: None,
        }
    }

    pub fn with_method(mut self, method_id: impl Into<String>) -> Self {
        self.method_id = Some(method_id.into());
        self
    }

    pub fn with_class(mut self, class: ObjectRef) -> Self {
        self.defined_class = Some(class);
        self
    }

    pub fn with_binding(mut self, binding: ObjectRef) -> Self {
        self.binding = Some(binding);
        self
    }

    pub fn with_self(mut self, self_obj: ObjectRef) -> Self {
        self.self_obj = Some(self_obj);
        self
    }
}

/// フレームスタック
///
/// 最後の要素が最も内側のフレームです。呼び出し元は一つ前の要素なので、
/// フレーム間のポインタは持ちません。
#[derive(Debug, Clone, Default)]
pub struct FrameStack {
    frames: Vec<DebugFrame>,
}

impl FrameStack {
    /// 空のフレームスタックを作成する
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// 最も内側にフレームを追加する
    pub fn push(&mut self, frame: DebugFrame) {
        self.frames.push(frame);
    }

    /// 最も内側のフレームを削除する
    ///
    /// スタックが空の場合は None を返します。
    pub fn pop(&mut self) -> Option<DebugFrame> {
        self.frames.pop()
    }

    /// 最も内側のフレームを深さを変えずに置き換える
    ///
    /// スタックが空の場合は何もせず false を返します。
    pub fn update_top(&mut self, frame: DebugFrame) -> bool {
        match self.frames.last_mut() {
            Some(top) => {
                *top = frame;
                true
            }
            None => false,
        }
    }

    /// 最も内側のフレームの位置だけを更新する
    pub fn update_top_location(&mut self, file: &str, line: u32) -> bool {
        match self.frames.last_mut() {
            Some(top) => {
                if top.file != file {
                    top.file = file.to_string();
                }
                top.line = line;
                true
            }
            None => false,
        }
    }

    /// 最も内側のフレームを取得する
    pub fn top(&self) -> Option<&DebugFrame> {
        self.frames.last()
    }

    /// n番目のフレームを取得する（0が最も内側）
    pub fn frame(&self, n: usize) -> Option<&DebugFrame> {
        self.frames.iter().rev().nth(n)
    }

    /// 内側から順にフレームを走査する
    pub fn iter(&self) -> impl Iterator<Item = &DebugFrame> {
        self.frames.iter().rev()
    }

    /// スタックの深さ
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// スタックが空かどうか
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// 全てのフレームを破棄する
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
