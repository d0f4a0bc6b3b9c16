//! Integer constant expressions in enumerator initializers.
//!
//! Supports C integer literals (any base, with `u`/`l` suffixes), character
//! literals, earlier enumerators, unary `- ~ + !`, the binary operators
//! `* / % + - << >> & ^ |` and parentheses. Anything else (macros, casts,
//! `sizeof`) makes the expression unevaluable, as does nesting deeper
//! than [`MAX_NESTING`].

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Number(i64),
    Ident(String),
    Op(&'static str),
    Open,
    Close,
}

/// Parentheses and unary operators allowed on top of each other.
pub const MAX_NESTING: usize = 256;

const OPERATORS: &[&str] = &["<<", ">>", "*", "/", "%", "+", "-", "&", "^", "|", "~", "!"];

fn tokenize(expr: &str) -> Option<Vec<Token>> {
    let bytes = expr.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push(Token::Number(parse_integer(&expr[start..i])?));
        } else if c.is_ascii_alphabetic() || c == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push(Token::Ident(expr[start..i].to_string()));
        } else if c == b'\'' {
            let (value, len) = parse_char(&expr[i..])?;
            tokens.push(Token::Number(value));
            i += len;
        } else if c == b'(' {
            tokens.push(Token::Open);
            i += 1;
        } else if c == b')' {
            tokens.push(Token::Close);
            i += 1;
        } else {
            let op = OPERATORS.iter().find(|op| expr[i..].starts_with(**op))?;
            tokens.push(Token::Op(op));
            i += op.len();
        }
    }
    Some(tokens)
}

/// `0x1F`, `017`, `0b101`, `42UL`.
fn parse_integer(literal: &str) -> Option<i64> {
    let digits = literal.trim_end_matches(['u', 'U', 'l', 'L']);
    let (radix, body) = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        (16, hex)
    } else if let Some(bin) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
        (2, bin)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };
    if body.is_empty() {
        return None;
    }
    let value = u64::from_str_radix(body, radix).ok()?;
    i64::try_from(value).ok()
}

/// Value and byte length of a character literal at the start of `text`.
fn parse_char(text: &str) -> Option<(i64, usize)> {
    let rest = text.strip_prefix('\'')?;
    let end = rest.find('\'')?;
    let end = if rest.starts_with("\\'") { 2 } else { end };
    let body = &rest[..end];
    let value = match body.strip_prefix('\\') {
        None => {
            let mut chars = body.chars();
            let c = chars.next()?;
            if chars.next().is_some() {
                return None;
            }
            c as i64
        }
        Some("n") => 10,
        Some("t") => 9,
        Some("r") => 13,
        Some("0") => 0,
        Some("\\") => 92,
        Some("'") => 39,
        Some("\"") => 34,
        Some(esc) => {
            if let Some(hex) = esc.strip_prefix('x') {
                i64::from_str_radix(hex, 16).ok()?
            } else {
                i64::from_str_radix(esc, 8).ok()?
            }
        }
    };
    Some((value, end + 2))
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    known: &'a HashMap<String, i64>,
}

/// Binding power of binary operators, loosest first.
fn precedence(op: &str) -> Option<u8> {
    Some(match op {
        "|" => 1,
        "^" => 2,
        "&" => 3,
        "<<" | ">>" => 4,
        "+" | "-" => 5,
        "*" | "/" | "%" => 6,
        _ => return None,
    })
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expression(&mut self, min_prec: u8) -> Option<i64> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op(op)) => *op,
                _ => break,
            };
            let prec = precedence(op)?;
            if prec < min_prec {
                break;
            }
            self.pos += 1;
            let rhs = self.expression(prec + 1)?;
            lhs = apply(op, lhs, rhs)?;
        }
        Some(lhs)
    }

    fn unary(&mut self) -> Option<i64> {
        if self.depth >= MAX_NESTING {
            return None;
        }
        self.depth += 1;
        let value = self.operand();
        self.depth -= 1;
        value
    }

    fn operand(&mut self) -> Option<i64> {
        match self.next()? {
            Token::Number(n) => Some(n),
            Token::Ident(name) => self.known.get(&name).copied(),
            Token::Open => {
                let value = self.expression(1)?;
                matches!(self.next()?, Token::Close).then_some(value)
            }
            Token::Op("-") => self.unary()?.checked_neg(),
            Token::Op("+") => self.unary(),
            Token::Op("~") => Some(!self.unary()?),
            Token::Op("!") => Some(i64::from(self.unary()? == 0)),
            _ => None,
        }
    }
}

fn apply(op: &str, lhs: i64, rhs: i64) -> Option<i64> {
    match op {
        "*" => lhs.checked_mul(rhs),
        "/" => lhs.checked_div(rhs),
        "%" => lhs.checked_rem(rhs),
        "+" => lhs.checked_add(rhs),
        "-" => lhs.checked_sub(rhs),
        "<<" => lhs.checked_shl(u32::try_from(rhs).ok()?),
        ">>" => lhs.checked_shr(u32::try_from(rhs).ok()?),
        "&" => Some(lhs & rhs),
        "^" => Some(lhs ^ rhs),
        "|" => Some(lhs | rhs),
        _ => None,
    }
}

/// Evaluate `expr`, resolving identifiers through `known`.
pub fn evaluate(expr: &str, known: &HashMap<String, i64>) -> Option<i64> {
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return None;
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        known,
    };
    let value = parser.expression(1)?;
    (parser.pos == parser.tokens.len()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expr: &str) -> Option<i64> {
        let mut known = HashMap::new();
        known.insert("BASE".to_string(), 16);
        evaluate(expr, &known)
    }

    #[test]
    fn test_literals() {
        assert_eq!(eval("0x1F"), Some(31));
        assert_eq!(eval("017"), Some(15));
        assert_eq!(eval("0b101"), Some(5));
        assert_eq!(eval("42UL"), Some(42));
        assert_eq!(eval("0"), Some(0));
        assert_eq!(eval("'A'"), Some(65));
        assert_eq!(eval("'\\n'"), Some(10));
    }

    #[test]
    fn test_operators_and_precedence() {
        assert_eq!(eval("1 << 4 | 1"), Some(17));
        assert_eq!(eval("2 + 3 * 4"), Some(14));
        assert_eq!(eval("(2 + 3) * 4"), Some(20));
        assert_eq!(eval("-1"), Some(-1));
        assert_eq!(eval("~0"), Some(-1));
        assert_eq!(eval("!5"), Some(0));
        assert_eq!(eval("BASE + 1"), Some(17));
        assert_eq!(eval("10 - 4 - 3"), Some(3));
    }

    #[test]
    fn test_unevaluable() {
        assert_eq!(eval("-EBUSY"), None);
        assert_eq!(eval("sizeof(int)"), None);
        assert_eq!(eval("1 / 0"), None);
        assert_eq!(eval("(1"), None);
        assert_eq!(eval(""), None);
        assert_eq!(eval("1 2"), None);
    }

    #[test]
    fn test_nesting_limit() {
        let within = format!("{}7{}", "(".repeat(MAX_NESTING - 1), ")".repeat(MAX_NESTING - 1));
        assert_eq!(eval(&within), Some(7));

        let deep = format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000));
        assert_eq!(eval(&deep), None);
        assert_eq!(eval(&"-".repeat(200_000)), None);
    }
}
