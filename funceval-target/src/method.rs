//! メソッドの識別子

use std::fmt;

/// 呼び出すメソッドの識別子（宣言型 + メソッド名）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodId {
    pub declaring_type: String,
    pub name: String,
}

impl MethodId {
    pub fn new(declaring_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
        }
    }

    /// `Type.Method` 形式の文字列からパースする
    ///
    /// 最後の `.` で型名とメソッド名に分割します。
    pub fn parse(s: &str) -> Option<Self> {
        let (ty, name) = s.trim().rsplit_once('.')?;
        if ty.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(ty, name))
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.declaring_type, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_method_id() {
        let m = MethodId::parse("System.Object.ToString").unwrap();
        assert_eq!(m.declaring_type, "System.Object");
        assert_eq!(m.name, "ToString");
        assert_eq!(m.to_string(), "System.Object.ToString");

        assert!(MethodId::parse("ToString").is_none());
        assert!(MethodId::parse("Foo.").is_none());
    }
}
