//! Permissive literal decoder for JSON-like model output.
//!
//! Accepts what a Python literal expression accepts on top of JSON:
//! single-quoted and triple-quoted strings, adjacent string concatenation,
//! trailing commas, tuples (decoded as arrays), `True`/`False`/`None`,
//! `#` comments, and unquoted identifier keys. The result is always a
//! [`serde_json::Value`].

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Nesting limit for containers, matching `serde_json`'s recursion limit.
pub const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {offset}")]
pub struct LiteralError {
    pub offset: usize,
    pub message: String,
}

/// Decode a complete literal expression.
pub fn parse_literal(src: &str) -> Result<Value, LiteralError> {
    let mut parser = LiteralParser {
        src,
        pos: 0,
        depth: 0,
    };
    parser.skip_trivia();
    let value = parser.parse_value()?;
    parser.skip_trivia();
    if parser.pos < src.len() {
        return Err(parser.error("unexpected trailing characters"));
    }
    Ok(value)
}

struct LiteralParser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl LiteralParser<'_> {
    fn rest(&self) -> &str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), LiteralError> {
        if self.eat(expected) {
            return Ok(());
        }
        match self.peek() {
            Some(found) => Err(self.error(format!("expected '{expected}', found '{found}'"))),
            None => Err(self.error(format!("expected '{expected}', found end of input"))),
        }
    }

    fn error(&self, message: impl Into<String>) -> LiteralError {
        LiteralError {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn parse_value(&mut self) -> Result<Value, LiteralError> {
        match self.peek() {
            Some('{') => self.nested(Self::parse_object),
            Some('[') => self.nested(Self::parse_list).map(Value::Array),
            Some('(') => self.nested(Self::parse_tuple),
            Some('\'' | '"') => self.parse_strings().map(Value::String),
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => {
                self.parse_number()
            }
            Some(c) if is_ident_start(c) => self.parse_name(),
            Some(c) => Err(self.error(format!("unexpected character '{c}'"))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, LiteralError>,
    ) -> Result<T, LiteralError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(format!("nesting deeper than {MAX_DEPTH} levels")));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn parse_object(&mut self) -> Result<Value, LiteralError> {
        self.expect('{')?;
        let mut map = Map::new();
        loop {
            self.skip_trivia();
            if self.eat('}') {
                return Ok(Value::Object(map));
            }
            let key = self.parse_key()?;
            self.skip_trivia();
            self.expect(':')?;
            self.skip_trivia();
            let value = self.parse_value()?;
            map.insert(key, value);
            self.skip_trivia();
            if !self.eat(',') {
                self.skip_trivia();
                self.expect('}')?;
                return Ok(Value::Object(map));
            }
        }
    }

    fn parse_key(&mut self) -> Result<String, LiteralError> {
        match self.peek() {
            Some('\'' | '"') => self.parse_strings(),
            Some(c) if c == '-' || c == '+' || c.is_ascii_digit() => {
                Ok(self.parse_number()?.to_string())
            }
            Some(c) if is_ident_start(c) => Ok(self.take_ident().to_string()),
            Some(c) => Err(self.error(format!("unexpected character '{c}' in key"))),
            None => Err(self.error("unexpected end of input in key")),
        }
    }

    fn parse_list(&mut self) -> Result<Vec<Value>, LiteralError> {
        self.expect('[')?;
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            if self.eat(']') {
                return Ok(items);
            }
            items.push(self.parse_value()?);
            self.skip_trivia();
            if !self.eat(',') {
                self.skip_trivia();
                self.expect(']')?;
                return Ok(items);
            }
        }
    }

    /// `(x)` is a parenthesized value; `(x,)` and `(x, y)` are tuples.
    fn parse_tuple(&mut self) -> Result<Value, LiteralError> {
        self.expect('(')?;
        let mut items = Vec::new();
        let mut saw_comma = false;
        loop {
            self.skip_trivia();
            if self.eat(')') {
                break;
            }
            items.push(self.parse_value()?);
            self.skip_trivia();
            if self.eat(',') {
                saw_comma = true;
                continue;
            }
            self.skip_trivia();
            self.expect(')')?;
            break;
        }
        if items.len() == 1 && !saw_comma {
            return Ok(items.remove(0));
        }
        Ok(Value::Array(items))
    }

    fn parse_strings(&mut self) -> Result<String, LiteralError> {
        let mut out = self.parse_string()?;
        loop {
            let checkpoint = self.pos;
            self.skip_trivia();
            if matches!(self.peek(), Some('\'' | '"')) {
                out.push_str(&self.parse_string()?);
            } else {
                self.pos = checkpoint;
                return Ok(out);
            }
        }
    }

    fn parse_string(&mut self) -> Result<String, LiteralError> {
        let start = self.pos;
        let quote = match self.bump() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Err(self.error("expected string")),
        };
        let triple: String = [quote; 3].iter().collect();
        let is_triple = self.rest().starts_with(&triple[1..]);
        if is_triple {
            self.pos += 2 * quote.len_utf8();
        }

        let mut out = String::new();
        loop {
            if is_triple && self.rest().starts_with(&triple) {
                self.pos += triple.len();
                return Ok(out);
            }
            let Some(c) = self.bump() else {
                return Err(LiteralError {
                    offset: start,
                    message: "unterminated string".to_string(),
                });
            };
            match c {
                '\\' => self.parse_escape(&mut out)?,
                '\n' if !is_triple => {
                    return Err(LiteralError {
                        offset: start,
                        message: "unterminated string".to_string(),
                    });
                }
                c if c == quote && !is_triple => return Ok(out),
                c => out.push(c),
            }
        }
    }

    fn parse_escape(&mut self, out: &mut String) -> Result<(), LiteralError> {
        let Some(c) = self.bump() else {
            return Err(self.error("unterminated escape"));
        };
        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            '0' => out.push('\0'),
            '\n' => {}
            '\\' | '\'' | '"' | '/' => out.push(c),
            'x' => {
                let code = self.take_hex(2)?;
                out.push(char::from_u32(code).ok_or_else(|| self.error("invalid \\x escape"))?);
            }
            'u' => {
                let high = self.take_hex(4)?;
                let code = if (0xD800..0xDC00).contains(&high) && self.rest().starts_with("\\u") {
                    self.pos += 2;
                    let low = self.take_hex(4)?;
                    0x10000 + ((high - 0xD800) << 10) + (low.wrapping_sub(0xDC00) & 0x3FF)
                } else {
                    high
                };
                out.push(char::from_u32(code).ok_or_else(|| self.error("invalid \\u escape"))?);
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
        Ok(())
    }

    fn take_hex(&mut self, len: usize) -> Result<u32, LiteralError> {
        let digits = self
            .rest()
            .get(..len)
            .filter(|digits| digits.chars().all(|c| c.is_ascii_hexdigit()))
            .ok_or_else(|| self.error("invalid hex escape"))?;
        let code = u32::from_str_radix(digits, 16).map_err(|err| self.error(err.to_string()))?;
        self.pos += len;
        Ok(code)
    }

    fn parse_number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        if matches!(self.peek(), Some('-' | '+')) {
            self.bump();
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => {}
                '.' => is_float = true,
                'e' | 'E' => {
                    is_float = true;
                    self.bump();
                    if matches!(self.peek(), Some('-' | '+')) {
                        self.bump();
                    }
                    continue;
                }
                _ => break,
            }
            self.bump();
        }

        let text: String = self.src[start..self.pos]
            .chars()
            .filter(|c| *c != '_' && *c != '+')
            .collect();
        if text.is_empty() || text == "-" || text == "." {
            return Err(LiteralError {
                offset: start,
                message: "invalid number".to_string(),
            });
        }

        let number = if is_float {
            text.parse::<f64>().ok().and_then(Number::from_f64)
        } else if let Ok(int) = text.parse::<i64>() {
            Some(Number::from(int))
        } else if let Ok(uint) = text.parse::<u64>() {
            Some(Number::from(uint))
        } else {
            text.parse::<f64>().ok().and_then(Number::from_f64)
        };
        number.map(Value::Number).ok_or_else(|| LiteralError {
            offset: start,
            message: format!("invalid number '{text}'"),
        })
    }

    fn parse_name(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        let ident = self.take_ident();
        match ident {
            "True" | "true" => Ok(Value::Bool(true)),
            "False" | "false" => Ok(Value::Bool(false)),
            "None" | "null" => Ok(Value::Null),
            other => Err(LiteralError {
                offset: start,
                message: format!("unknown name '{other}'"),
            }),
        }
    }

    fn take_ident(&mut self) -> &str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        &self.src[start..self.pos]
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_python_literals() {
        let value = parse_literal("{'a': True, 'b': None, 'c': [1, 2.5, -3,], 'd': ('x', 'y')}")
            .expect("parse");
        assert_eq!(
            value,
            json!({"a": true, "b": null, "c": [1, 2.5, -3], "d": ["x", "y"]})
        );
    }

    #[test]
    fn decodes_unquoted_keys_and_comments() {
        let value = parse_literal("{\n  name: 'step_1', # the first step\n  count: 2,\n}")
            .expect("parse");
        assert_eq!(value, json!({"name": "step_1", "count": 2}));
    }

    #[test]
    fn decodes_escapes_and_concatenation() {
        let value = parse_literal(r#"['it\'s', "line\nbreak" ' tail', 'é']"#).expect("parse");
        assert_eq!(value, json!(["it's", "line\nbreak tail", "é"]));
    }

    #[test]
    fn parenthesized_value_is_not_a_tuple() {
        assert_eq!(parse_literal("(5)").expect("parse"), json!(5));
        assert_eq!(parse_literal("(5,)").expect("parse"), json!([5]));
    }

    #[test]
    fn reports_offset_of_failure() {
        let err = parse_literal("{'a': undefined_thing}").unwrap_err();
        assert_eq!(err.offset, 6);
        assert!(err.message.contains("unknown name"));
    }

    #[test]
    fn rejects_unterminated_string() {
        let err = parse_literal("{'a': 'open}").unwrap_err();
        assert_eq!(err.message, "unterminated string");
    }

    #[test]
    fn deep_nesting_is_an_error_not_a_crash() {
        let err = parse_literal(&"[".repeat(200_000)).unwrap_err();
        assert!(err.message.contains("nesting deeper than 128 levels"));
        assert_eq!(err.offset, MAX_DEPTH);

        let at_limit = format!("{}{}", "[".repeat(MAX_DEPTH), "]".repeat(MAX_DEPTH));
        assert!(parse_literal(&at_limit).is_ok());
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(parse_literal("{'a': 1} extra").is_err());
    }
}
