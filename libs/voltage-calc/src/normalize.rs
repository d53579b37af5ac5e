//! Syntax normalization
//!
//! Rewrites alternate spellings into canonical operators before parsing:
//! - whole-word `AND` / `OR` / `NOT` (any case) become `&&` / `||` / `!`
//! - a bare `=` (not next to `=`, `!`, `<`, `>`) becomes `==`
//!
//! Quoted string literals are copied verbatim. Normalizing twice yields the
//! same text as normalizing once.

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn is_comparison_char(c: char) -> bool {
    matches!(c, '=' | '!' | '<' | '>')
}

/// Normalize an expression into canonical operator syntax
///
/// # Example
/// ```
/// use voltage_calc::normalize;
///
/// assert_eq!(normalize("a = 1 AND NOT b"), "a == 1 && ! b");
/// assert_eq!(normalize("name = 'x AND y'"), "name == 'x AND y'");
/// ```
pub fn normalize(expr: &str) -> String {
    let chars: Vec<char> = expr.chars().collect();
    let mut out = String::with_capacity(expr.len() + 8);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' || c == '"' {
            let start = i;
            i += 1;
            while i < chars.len() && chars[i] != c {
                if chars[i] == '\\' {
                    i += 1;
                }
                i += 1;
            }
            let end = (i + 1).min(chars.len());
            out.extend(&chars[start..end]);
            i = end;
            continue;
        }

        if is_word_char(c) {
            let start = i;
            while i < chars.len() && is_word_char(chars[i]) {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            match word.to_ascii_uppercase().as_str() {
                "AND" => out.push_str("&&"),
                "OR" => out.push_str("||"),
                "NOT" => out.push('!'),
                _ => out.push_str(&word),
            }
            continue;
        }

        if c == '=' {
            let prev_adjacent = i > 0 && is_comparison_char(chars[i - 1]);
            let next_adjacent = chars.get(i + 1).is_some_and(|n| is_comparison_char(*n));
            if prev_adjacent || next_adjacent {
                out.push('=');
            } else {
                out.push_str("==");
            }
            i += 1;
            continue;
        }

        out.push(c);
        i += 1;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_operators() {
        assert_eq!(normalize("a and b"), "a && b");
        assert_eq!(normalize("a Or b"), "a || b");
        assert_eq!(normalize("NOT(a)"), "!(a)");
        // only whole words
        assert_eq!(normalize("android + ORDER + band"), "android + ORDER + band");
        assert_eq!(normalize("x1AND"), "x1AND");
    }

    #[test]
    fn test_single_equals() {
        assert_eq!(normalize("a = 1"), "a == 1");
        assert_eq!(normalize("a=1"), "a==1");
        assert_eq!(normalize("a == 1"), "a == 1");
        assert_eq!(normalize("a === 1"), "a === 1");
        assert_eq!(normalize("a != 1"), "a != 1");
        assert_eq!(normalize("a !== 1"), "a !== 1");
        assert_eq!(normalize("a <= 1 || a >= 2"), "a <= 1 || a >= 2");
    }

    #[test]
    fn test_strings_untouched() {
        assert_eq!(normalize("s('a=b') = 'NOT this'"), "s('a=b') == 'NOT this'");
        assert_eq!(normalize(r#"v("it\"s = AND")"#), r#"v("it\"s = AND")"#);
        // unterminated literal is copied as-is
        assert_eq!(normalize("a = 'open AND"), "a == 'open AND");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "a = 1 AND b = 2 OR NOT c",
            "x=y=z",
            "IF(a = 'x', 1, 0)",
            "a => b",
            "NOT= 5",
            "s(\"a.b\") = v('c') and jp('d', '$.e') or 1",
            "'unterminated = AND",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {sample:?}");
        }
    }
}
