//! Minimal JSON path extraction
//!
//! Grammar: `$` followed by any mix of `.identifier`, `['literal']`,
//! `["literal"]` and `[digits]`. Everything fails closed: bad syntax, missing
//! keys, wrong container types and forbidden key names all yield `None`.
//! Only scalars are returned; objects and arrays count as no match.

use serde_json::Value as Json;
use voltage_model::{is_forbidden_key, iso_string, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Parsed JSON path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    segments: Vec<PathSegment>,
}

impl JsonPath {
    /// Parse a path, `None` when the syntax is invalid or names a forbidden key
    pub fn parse(path: &str) -> Option<Self> {
        let chars: Vec<char> = path.trim().chars().collect();
        if chars.first() != Some(&'$') {
            return None;
        }

        let mut segments = Vec::new();
        let mut i = 1;
        while i < chars.len() {
            match chars[i] {
                '.' => {
                    let start = i + 1;
                    i = start;
                    while i < chars.len()
                        && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                    {
                        i += 1;
                    }
                    if i == start {
                        return None;
                    }
                    segments.push(PathSegment::Key(chars[start..i].iter().collect()));
                },
                '[' => {
                    i += 1;
                    let quote = *chars.get(i)?;
                    if quote == '\'' || quote == '"' {
                        i += 1;
                        let mut key = String::new();
                        loop {
                            let c = *chars.get(i)?;
                            i += 1;
                            if c == quote {
                                break;
                            }
                            if c == '\\' {
                                key.push(*chars.get(i)?);
                                i += 1;
                            } else {
                                key.push(c);
                            }
                        }
                        segments.push(PathSegment::Key(key));
                    } else {
                        let start = i;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                        if i == start {
                            return None;
                        }
                        let digits: String = chars[start..i].iter().collect();
                        segments.push(PathSegment::Index(digits.parse().ok()?));
                    }
                    if chars.get(i) != Some(&']') {
                        return None;
                    }
                    i += 1;
                },
                _ => return None,
            }
        }

        let forbidden = segments
            .iter()
            .any(|s| matches!(s, PathSegment::Key(k) if is_forbidden_key(k)));
        if forbidden {
            return None;
        }
        Some(Self { segments })
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Project a value through this path
    ///
    /// Strings are parsed as JSON first. A root path (`$`) on a plain
    /// scalar returns the scalar itself.
    pub fn extract(&self, value: &Value) -> Option<Value> {
        match value {
            Value::Json(json) => self.walk(json),
            Value::String(s) => match serde_json::from_str::<Json>(s) {
                Ok(json) => self.walk(&json),
                Err(_) if self.segments.is_empty() => Some(value.clone()),
                Err(_) => None,
            },
            Value::Timestamp(ts) if self.segments.is_empty() => {
                Some(Value::String(iso_string(ts)))
            },
            scalar if self.segments.is_empty() && scalar.is_primitive() => Some(scalar.clone()),
            _ => None,
        }
    }

    fn walk(&self, root: &Json) -> Option<Value> {
        let mut current = root;
        for segment in &self.segments {
            current = match (segment, current) {
                (PathSegment::Key(key), Json::Object(map)) => map.get(key)?,
                (PathSegment::Key(key), Json::Array(items)) => {
                    items.get(key.parse::<usize>().ok()?)?
                },
                (PathSegment::Index(index), Json::Array(items)) => items.get(*index)?,
                (PathSegment::Index(index), Json::Object(map)) => map.get(&index.to_string())?,
                _ => return None,
            };
        }

        match current {
            Json::Bool(b) => Some(Value::Bool(*b)),
            Json::Number(n) => n.as_f64().map(Value::Number),
            Json::String(s) => Some(Value::String(s.clone())),
            Json::Null | Json::Array(_) | Json::Object(_) => None,
        }
    }
}

/// Parse `path` and project `value` through it
///
/// # Example
/// ```
/// use serde_json::json;
/// use voltage_calc::extract;
/// use voltage_model::Value;
///
/// let payload = Value::Json(json!({"a": {"b": 5}}));
/// assert_eq!(extract("$.a.b", &payload), Some(Value::Number(5.0)));
/// assert_eq!(extract("$.__proto__", &payload), None);
/// ```
pub fn extract(path: &str, value: &Value) -> Option<Value> {
    JsonPath::parse(path)?.extract(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dot_and_index() {
        let obj = Value::Json(json!({"a": {"b": 5}}));
        assert_eq!(extract("$.a.b", &obj), Some(Value::Number(5.0)));

        let arr = Value::Json(json!({"a": [1, 2, 3]}));
        assert_eq!(extract("$.a[1]", &arr), Some(Value::Number(2.0)));
        assert_eq!(extract("$.a[9]", &arr), None);
    }

    #[test]
    fn test_bracket_literals() {
        let obj = Value::Json(json!({"a": {"b c": "x", "d'e": true}}));
        assert_eq!(extract("$['a']['b c']", &obj), Some(Value::from("x")));
        assert_eq!(extract(r#"$["a"]["d'e"]"#, &obj), Some(Value::Bool(true)));
        assert_eq!(extract(r"$['a']['d\'e']", &obj), Some(Value::Bool(true)));
    }

    #[test]
    fn test_json_string_input() {
        let raw = Value::from(r#"{"battery": {"soc": 81.5}}"#);
        assert_eq!(extract("$.battery.soc", &raw), Some(Value::Number(81.5)));
        assert_eq!(extract("$", &Value::from("plain")), Some(Value::from("plain")));
        assert_eq!(extract("$.x", &Value::from("plain")), None);
    }

    #[test]
    fn test_forbidden_keys_never_match() {
        let samples = [
            Value::Json(json!({"__proto__": 1})),
            Value::Json(json!({"constructor": {"prototype": 2}})),
            Value::from(r#"{"prototype": 3}"#),
            Value::Number(4.0),
            Value::Undefined,
        ];
        for sample in &samples {
            assert_eq!(extract("$.__proto__", sample), None);
            assert_eq!(extract("$['constructor']", sample), None);
            assert_eq!(extract("$.constructor.prototype", sample), None);
        }
    }

    #[test]
    fn test_non_scalars_are_no_match() {
        let obj = Value::Json(json!({"a": {"b": [1]}, "n": null}));
        assert_eq!(extract("$.a", &obj), None);
        assert_eq!(extract("$.a.b", &obj), None);
        assert_eq!(extract("$.n", &obj), None);
        assert_eq!(extract("$.a.b.c", &obj), None);
    }

    #[test]
    fn test_invalid_syntax_fails_closed() {
        let obj = Value::Json(json!({"a": 1}));
        for path in ["a", "$.", "$[", "$[a]", "$['a'", "$.a)", "$..a"] {
            assert_eq!(extract(path, &obj), None, "{path}");
        }
    }

    #[test]
    fn test_timestamp_root_is_iso() {
        let ts = chrono::DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        assert_eq!(
            extract("$", &Value::Timestamp(ts)),
            Some(Value::from("2024-01-02T03:04:05.000Z"))
        );
    }
}
