//! リモート値
//!
//! デバッグ対象のメモリ上にある値を、プロトコルレベルで表現します。

use std::fmt;

/// デバッグ対象のオブジェクトID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// トランスポートが払い出す値ハンドルのID
///
/// ハンドルはデバッグ対象側のリソース（GCハンドル等）を保持しているため、
/// 使い終わったら `Transport::release` で解放する必要があります。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub u64);

/// リモート値
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteValue {
    /// null参照
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F64(f64),
    Char(char),
    /// 文字列（デバッグ対象側の文字列オブジェクトの内容）
    String(String),
    /// オブジェクト参照
    Object(ObjectId),
}

impl RemoteValue {
    /// null参照かどうか
    pub fn is_null(&self) -> bool {
        matches!(self, RemoteValue::Null)
    }

    /// オブジェクト参照であればそのIDを返す
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            RemoteValue::Object(id) => Some(*id),
            _ => None,
        }
    }

    /// 値から推定される組み込み型名
    pub fn primitive_type_name(&self) -> Option<&'static str> {
        match self {
            RemoteValue::Bool(_) => Some("System.Boolean"),
            RemoteValue::I32(_) => Some("System.Int32"),
            RemoteValue::I64(_) => Some("System.Int64"),
            RemoteValue::F64(_) => Some("System.Double"),
            RemoteValue::Char(_) => Some("System.Char"),
            RemoteValue::String(_) => Some("System.String"),
            RemoteValue::Null | RemoteValue::Object(_) => None,
        }
    }
}

impl fmt::Display for RemoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteValue::Null => write!(f, "null"),
            RemoteValue::Bool(b) => write!(f, "{}", b),
            RemoteValue::I32(v) => write!(f, "{}", v),
            RemoteValue::I64(v) => write!(f, "{}L", v),
            RemoteValue::F64(v) => write!(f, "{}", v),
            RemoteValue::Char(c) => write!(f, "'{}'", c),
            RemoteValue::String(s) => write!(f, "{:?}", s),
            RemoteValue::Object(id) => write!(f, "{}", id),
        }
    }
}

/// トランスポートから受け取った、解放が必要な値ハンドル
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteHandle {
    pub id: HandleId,
    pub value: RemoteValue,
    /// 実行時の型名
    pub type_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_values() {
        assert_eq!(RemoteValue::Null.to_string(), "null");
        assert_eq!(RemoteValue::I64(3).to_string(), "3L");
        assert_eq!(RemoteValue::String("hi".into()).to_string(), "\"hi\"");
        assert_eq!(RemoteValue::Object(ObjectId(7)).to_string(), "@7");
    }

    #[test]
    fn test_primitive_type_name() {
        assert_eq!(RemoteValue::I32(1).primitive_type_name(), Some("System.Int32"));
        assert_eq!(RemoteValue::Object(ObjectId(1)).primitive_type_name(), None);
        assert!(RemoteValue::Null.is_null());
    }
}
