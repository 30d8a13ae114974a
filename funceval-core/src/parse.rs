//! パース関連のユーティリティ関数

use anyhow::Result;
use funceval_target::{ObjectId, RemoteValue};

/// オブジェクトID文字列をパース
///
/// `@` プレフィックスは省略できます。
///
/// # Examples
/// ```
/// use funceval_core::parse::parse_object_id;
/// use funceval_target::ObjectId;
///
/// assert_eq!(parse_object_id("@12").unwrap(), ObjectId(12));
/// assert_eq!(parse_object_id("12").unwrap(), ObjectId(12));
/// ```
pub fn parse_object_id(s: &str) -> Result<ObjectId> {
    let s = s.trim();
    let digits = s.strip_prefix('@').unwrap_or(s);
    digits
        .parse::<u64>()
        .map(ObjectId)
        .map_err(|e| anyhow::anyhow!("Invalid object id '{}': {}", s, e))
}

/// 呼び出し引数のリテラルをパース
///
/// `null`、`true`/`false`、整数（`L` サフィックスで64ビット）、小数、
/// `'c'` 形式の文字、`"..."` 形式の文字列、`@id` 形式のオブジェクト参照をサポートします。
pub fn parse_argument(s: &str) -> Result<RemoteValue> {
    let s = s.trim();

    match s {
        "null" => return Ok(RemoteValue::Null),
        "true" => return Ok(RemoteValue::Bool(true)),
        "false" => return Ok(RemoteValue::Bool(false)),
        _ => {}
    }

    if s.starts_with('@') {
        return parse_object_id(s).map(RemoteValue::Object);
    }
    if let Some(inner) = s.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        return Ok(RemoteValue::String(inner.to_string()));
    }
    if let Some(inner) = s.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')) {
        let mut chars = inner.chars();
        return match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(RemoteValue::Char(c)),
            _ => Err(anyhow::anyhow!("Invalid char literal '{}'", s)),
        };
    }
    if let Some(digits) = s.strip_suffix('L') {
        return digits
            .parse::<i64>()
            .map(RemoteValue::I64)
            .map_err(|e| anyhow::anyhow!("Invalid long literal '{}': {}", s, e));
    }
    if let Ok(v) = s.parse::<i32>() {
        return Ok(RemoteValue::I32(v));
    }
    if let Ok(v) = s.parse::<i64>() {
        return Ok(RemoteValue::I64(v));
    }
    s.parse::<f64>()
        .map(RemoteValue::F64)
        .map_err(|_| anyhow::anyhow!("Invalid argument '{}'", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object_id() {
        assert_eq!(parse_object_id("@3").unwrap(), ObjectId(3));
        assert_eq!(parse_object_id(" 42 ").unwrap(), ObjectId(42));
        assert!(parse_object_id("@x").is_err());
        assert!(parse_object_id("").is_err());
    }

    #[test]
    fn test_parse_argument_literals() {
        assert_eq!(parse_argument("null").unwrap(), RemoteValue::Null);
        assert_eq!(parse_argument("true").unwrap(), RemoteValue::Bool(true));
        assert_eq!(parse_argument("-5").unwrap(), RemoteValue::I32(-5));
        assert_eq!(parse_argument("5L").unwrap(), RemoteValue::I64(5));
        assert_eq!(parse_argument("4294967296").unwrap(), RemoteValue::I64(4294967296));
        assert_eq!(parse_argument("1.5").unwrap(), RemoteValue::F64(1.5));
        assert_eq!(parse_argument("'x'").unwrap(), RemoteValue::Char('x'));
        assert_eq!(parse_argument("\"hi\"").unwrap(), RemoteValue::String("hi".into()));
        assert_eq!(parse_argument("@7").unwrap(), RemoteValue::Object(ObjectId(7)));
    }

    #[test]
    fn test_parse_argument_invalid() {
        assert!(parse_argument("'ab'").is_err());
        assert!(parse_argument("xyz").is_err());
        assert!(parse_argument("12xL").is_err());
    }
}
