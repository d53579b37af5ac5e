//! Tokenizer for normalized expressions

use crate::error::ParseError;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    AndAnd,
    OrOr,
    EqEq,
    NotEq,
    EqEqEq,
    NotEqEq,
    Lt,
    Le,
    Gt,
    Ge,
    Question,
    Colon,
    LParen,
    RParen,
    Comma,
    /// Only produced so the parser can reject member access by name
    Dot,
    LBracket,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Str(s) => write!(f, "'{}'", s),
            Token::Ident(name) => f.write_str(name),
            other => f.write_str(match other {
                Token::Plus => "+",
                Token::Minus => "-",
                Token::Star => "*",
                Token::Slash => "/",
                Token::Percent => "%",
                Token::Bang => "!",
                Token::AndAnd => "&&",
                Token::OrOr => "||",
                Token::EqEq => "==",
                Token::NotEq => "!=",
                Token::EqEqEq => "===",
                Token::NotEqEq => "!==",
                Token::Lt => "<",
                Token::Le => "<=",
                Token::Gt => ">",
                Token::Ge => ">=",
                Token::Question => "?",
                Token::Colon => ":",
                Token::LParen => "(",
                Token::RParen => ")",
                Token::Comma => ",",
                Token::Dot => ".",
                Token::LBracket => "[",
                Token::Number(_) | Token::Str(_) | Token::Ident(_) => "",
            }),
        }
    }
}

/// Token plus its character offset
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ParseError> {
    Lexer {
        chars: source.chars().collect(),
        pos: 0,
    }
    .run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn run(mut self) -> Result<Vec<Spanned>, ParseError> {
        let mut tokens = Vec::new();

        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += 1;
                continue;
            }

            let start = self.pos;
            let token = match c {
                '0'..='9' => self.number()?,
                '.' if self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) => self.number()?,
                '\'' | '"' => self.string(c)?,
                c if c.is_ascii_alphabetic() || c == '_' || c == '$' => self.ident(),
                _ => self.operator(c)?,
            };
            tokens.push(Spanned {
                token,
                position: start,
            });
        }

        Ok(tokens)
    }

    fn number(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;

        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let digits: String = self.chars[digits_start..self.pos].iter().collect();
            return u64::from_str_radix(&digits, 16)
                .map(|n| Token::Number(n as f64))
                .map_err(|_| ParseError::new("Invalid hex literal", start));
        }

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some('.') {
            self.pos += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let mark = self.pos;
            self.pos += 1;
            if matches!(self.peek(), Some('+' | '-')) {
                self.pos += 1;
            }
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            } else {
                self.pos = mark;
            }
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        if self
            .peek()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        {
            return Err(ParseError::new(
                format!("Invalid number literal '{}{}'", text, self.chars[self.pos]),
                start,
            ));
        }
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| ParseError::new(format!("Invalid number literal '{}'", text), start))
    }

    fn string(&mut self, quote: char) -> Result<Token, ParseError> {
        let start = self.pos;
        self.pos += 1;
        let mut value = String::new();

        loop {
            let Some(c) = self.peek() else {
                return Err(ParseError::new("Unterminated string literal", start));
            };
            self.pos += 1;

            if c == quote {
                return Ok(Token::Str(value));
            }
            if c != '\\' {
                value.push(c);
                continue;
            }

            let Some(escaped) = self.peek() else {
                return Err(ParseError::new("Unterminated string literal", start));
            };
            self.pos += 1;
            match escaped {
                'n' => value.push('\n'),
                't' => value.push('\t'),
                'r' => value.push('\r'),
                '0' => value.push('\0'),
                'u' => {
                    let hex: String = self
                        .chars
                        .get(self.pos..self.pos + 4)
                        .map(|s| s.iter().collect())
                        .unwrap_or_default();
                    let ch = u32::from_str_radix(&hex, 16)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| {
                            ParseError::new("Invalid unicode escape in string", self.pos - 2)
                        })?;
                    value.push(ch);
                    self.pos += 4;
                },
                other => value.push(other),
            }
        }
    }

    fn ident(&mut self) -> Token {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        {
            self.pos += 1;
        }
        Token::Ident(self.chars[start..self.pos].iter().collect())
    }

    fn operator(&mut self, c: char) -> Result<Token, ParseError> {
        let start = self.pos;
        let next = self.peek_at(1);
        let third = self.peek_at(2);

        let (token, len) = match (c, next, third) {
            ('=', Some('='), Some('=')) => (Token::EqEqEq, 3),
            ('!', Some('='), Some('=')) => (Token::NotEqEq, 3),
            ('=', Some('='), _) => (Token::EqEq, 2),
            ('!', Some('='), _) => (Token::NotEq, 2),
            ('<', Some('='), _) => (Token::Le, 2),
            ('>', Some('='), _) => (Token::Ge, 2),
            ('&', Some('&'), _) => (Token::AndAnd, 2),
            ('|', Some('|'), _) => (Token::OrOr, 2),
            ('+', _, _) => (Token::Plus, 1),
            ('-', _, _) => (Token::Minus, 1),
            ('*', Some('*'), _) => {
                return Err(ParseError::new("Exponent operator '**' is not supported", start))
            },
            ('*', _, _) => (Token::Star, 1),
            ('/', _, _) => (Token::Slash, 1),
            ('%', _, _) => (Token::Percent, 1),
            ('!', _, _) => (Token::Bang, 1),
            ('<', _, _) => (Token::Lt, 1),
            ('>', _, _) => (Token::Gt, 1),
            ('?', _, _) => (Token::Question, 1),
            (':', _, _) => (Token::Colon, 1),
            ('(', _, _) => (Token::LParen, 1),
            (')', _, _) => (Token::RParen, 1),
            (',', _, _) => (Token::Comma, 1),
            ('.', _, _) => (Token::Dot, 1),
            ('[', _, _) => (Token::LBracket, 1),
            ('=', _, _) => {
                return Err(ParseError::new("Assignment '=' is not supported", start))
            },
            ('&' | '|' | '^' | '~', _, _) => {
                return Err(ParseError::new(
                    format!("Bitwise operator '{}' is not supported", c),
                    start,
                ))
            },
            ('{' | '}', _, _) => {
                return Err(ParseError::new("Object literals are not supported", start))
            },
            (']', _, _) => return Err(ParseError::new("Unexpected ']'", start)),
            (';', _, _) => {
                return Err(ParseError::new(
                    "Statements are not supported, use a single expression",
                    start,
                ))
            },
            ('`', _, _) => {
                return Err(ParseError::new("Template literals are not supported", start))
            },
            _ => {
                return Err(ParseError::new(
                    format!("Unexpected character '{}'", c),
                    start,
                ))
            },
        };

        self.pos += len;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        tokenize(src).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_numbers() {
        assert_eq!(tokens("12 .5 1e3 2.5E-1 0x1F"), vec![
            Token::Number(12.0),
            Token::Number(0.5),
            Token::Number(1000.0),
            Token::Number(0.25),
            Token::Number(31.0),
        ]);
        assert!(tokenize("12abc").is_err());
    }

    #[test]
    fn test_strings_with_escapes() {
        assert_eq!(tokens(r#"'a\'b' "c\nd" 'A'"#), vec![
            Token::Str("a'b".to_string()),
            Token::Str("c\nd".to_string()),
            Token::Str("A".to_string()),
        ]);
        assert!(tokenize("'open").is_err());
    }

    #[test]
    fn test_operators() {
        assert_eq!(tokens("a === b !== c == d != e"), vec![
            Token::Ident("a".into()),
            Token::EqEqEq,
            Token::Ident("b".into()),
            Token::NotEqEq,
            Token::Ident("c".into()),
            Token::EqEq,
            Token::Ident("d".into()),
            Token::NotEq,
            Token::Ident("e".into()),
        ]);
    }

    #[test]
    fn test_rejected_characters_are_named() {
        let err = tokenize("a & b").unwrap_err();
        assert!(err.message.contains("Bitwise"));
        let err = tokenize("a = b").unwrap_err();
        assert!(err.message.contains("Assignment"));
        let err = tokenize("{a: 1}").unwrap_err();
        assert!(err.message.contains("Object literals"));
        assert_eq!(tokenize("a; b").unwrap_err().position, 1);
    }
}
