//! 値の位置
//!
//! 停止中のデバッグ対象のどこに値があるかを表します。

use crate::{MethodId, ObjectId, RemoteHandle, ThreadId};
use std::fmt;

/// デバッグ対象メモリ上の値の位置
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueLocation {
    /// スタックフレーム上のローカル変数
    Local {
        thread: ThreadId,
        frame: usize,
        index: usize,
    },
    /// オブジェクトのフィールド
    Field { object: ObjectId, field: String },
    /// 配列の要素
    ArrayElement { array: ObjectId, index: usize },
    /// 関数評価の結果（戻り値または送出された例外）
    EvalResult { method: MethodId },
}

impl fmt::Display for ValueLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueLocation::Local { thread, frame, index } => {
                write!(f, "{} frame {} local {}", thread, frame, index)
            }
            ValueLocation::Field { object, field } => write!(f, "{}.{}", object, field),
            ValueLocation::ArrayElement { array, index } => write!(f, "{}[{}]", array, index),
            ValueLocation::EvalResult { method } => write!(f, "result of {}()", method),
        }
    }
}

/// 位置から値を読み込んだ結果
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded {
    /// 位置にオブジェクトが存在しない（null）
    ///
    /// デバッグ対象側のリソースを持たないため、解放は不要です。
    Null { declared_type: String },
    /// 解放が必要な値ハンドル
    Value(RemoteHandle),
}
