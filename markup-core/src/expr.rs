//! A restricted expression language for the `eval:` system attribute (§4.4, §9).
//!
//! The original implementation hands the expression straight to the host's `eval`. SPEC_FULL §9
//! explicitly forbids that in a safe language port: this module is a small Pratt parser over string
//! and number literals, arithmetic (`+ - * / %`), comparisons (`== != < <= > >=`), and the boolean
//! operators `and`/`or`/`not`, which is what shipped AsciiDoc configurations actually use. Anything
//! outside that grammar is a [`ExprError`], not a crash.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Str(String),
    Bool(bool),
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bool(b) => *b,
        }
    }

    /// Stringifies per §4.4: `True` becomes `""`, other values are stringified plainly. `False` is
    /// handled by the caller (it means "drop the line"), not here.
    pub fn to_output_string(&self) -> String {
        match self {
            Value::Bool(true) => String::new(),
            Value::Bool(false) => String::new(),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            Value::Str(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprError {
    UnexpectedToken(String),
    UnexpectedEnd,
    TypeMismatch(String),
    DivideByZero,
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprError::UnexpectedToken(t) => write!(f, "unexpected token '{}'", t),
            ExprError::UnexpectedEnd => write!(f, "unexpected end of expression"),
            ExprError::TypeMismatch(msg) => write!(f, "type mismatch: {}", msg),
            ExprError::DivideByZero => write!(f, "divide by zero"),
        }
    }
}

impl std::error::Error for ExprError {}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
}

fn lex(src: &str) -> Result<Vec<Tok>, ExprError> {
    let mut toks = Vec::new();
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '(' {
            toks.push(Tok::LParen);
            i += 1;
        } else if c == ')' {
            toks.push(Tok::RParen);
            i += 1;
        } else if c == '"' || c == '\'' {
            let quote = c;
            let mut s = String::new();
            i += 1;
            while i < chars.len() && chars[i] != quote {
                s.push(chars[i]);
                i += 1;
            }
            if i >= chars.len() {
                return Err(ExprError::UnexpectedEnd);
            }
            i += 1;
            toks.push(Tok::Str(s));
        } else if c.is_ascii_digit() || (c == '.' && i + 1 < chars.len() && chars[i + 1].is_ascii_digit())
        {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let s: String = chars[start..i].iter().collect();
            let n = s
                .parse::<f64>()
                .map_err(|_| ExprError::UnexpectedToken(s.clone()))?;
            toks.push(Tok::Num(n));
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let s: String = chars[start..i].iter().collect();
            toks.push(Tok::Ident(s));
        } else {
            let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
            let op = match two.as_str() {
                "==" | "!=" | "<=" | ">=" => {
                    i += 2;
                    match two.as_str() {
                        "==" => "==",
                        "!=" => "!=",
                        "<=" => "<=",
                        _ => ">=",
                    }
                }
                _ => {
                    i += 1;
                    match c {
                        '+' => "+",
                        '-' => "-",
                        '*' => "*",
                        '/' => "/",
                        '%' => "%",
                        '<' => "<",
                        '>' => ">",
                        other => return Err(ExprError::UnexpectedToken(other.to_string())),
                    }
                }
            };
            toks.push(Tok::Op(op));
        }
    }
    Ok(toks)
}

/// Looks up an identifier's value (an existing attribute). Supplied by the caller so this module
/// stays free of any dependency on [`crate::document::AttributeMap`].
pub trait NameResolver {
    fn resolve(&self, name: &str) -> Option<String>;
}

struct Parser<'a, R: NameResolver> {
    toks: Vec<Tok>,
    pos: usize,
    resolver: &'a R,
}

impl<'a, R: NameResolver> Parser<'a, R> {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn parse_or(&mut self) -> Result<Value, ExprError> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(Tok::Ident(s)) if s == "or") {
            self.next();
            let rhs = self.parse_and()?;
            lhs = Value::Bool(lhs.truthy() || rhs.truthy());
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Value, ExprError> {
        let mut lhs = self.parse_not()?;
        while matches!(self.peek(), Some(Tok::Ident(s)) if s == "and") {
            self.next();
            let rhs = self.parse_not()?;
            lhs = Value::Bool(lhs.truthy() && rhs.truthy());
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Value, ExprError> {
        if matches!(self.peek(), Some(Tok::Ident(s)) if s == "not") {
            self.next();
            let v = self.parse_not()?;
            return Ok(Value::Bool(!v.truthy()));
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> Result<Value, ExprError> {
        let lhs = self.parse_add()?;
        if let Some(Tok::Op(op)) = self.peek().cloned() {
            if matches!(op, "==" | "!=" | "<" | "<=" | ">" | ">=") {
                self.next();
                let rhs = self.parse_add()?;
                return Ok(Value::Bool(compare(&lhs, op, &rhs)?));
            }
        }
        Ok(lhs)
    }

    fn parse_add(&mut self) -> Result<Value, ExprError> {
        let mut lhs = self.parse_mul()?;
        loop {
            match self.peek().cloned() {
                Some(Tok::Op("+")) => {
                    self.next();
                    let rhs = self.parse_mul()?;
                    lhs = add(&lhs, &rhs)?;
                }
                Some(Tok::Op("-")) => {
                    self.next();
                    let rhs = self.parse_mul()?;
                    lhs = Value::Number(num(&lhs)? - num(&rhs)?);
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Value, ExprError> {
        let mut lhs = self.parse_unary()?;
        loop {
            match self.peek().cloned() {
                Some(Tok::Op("*")) => {
                    self.next();
                    let rhs = self.parse_unary()?;
                    lhs = Value::Number(num(&lhs)? * num(&rhs)?);
                }
                Some(Tok::Op("/")) => {
                    self.next();
                    let rhs = self.parse_unary()?;
                    let d = num(&rhs)?;
                    if d == 0.0 {
                        return Err(ExprError::DivideByZero);
                    }
                    lhs = Value::Number(num(&lhs)? / d);
                }
                Some(Tok::Op("%")) => {
                    self.next();
                    let rhs = self.parse_unary()?;
                    let d = num(&rhs)?;
                    if d == 0.0 {
                        return Err(ExprError::DivideByZero);
                    }
                    lhs = Value::Number(num(&lhs)? % d);
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Value, ExprError> {
        if matches!(self.peek(), Some(Tok::Op("-"))) {
            self.next();
            let v = self.parse_unary()?;
            return Ok(Value::Number(-num(&v)?));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Value, ExprError> {
        match self.next() {
            Some(Tok::Num(n)) => Ok(Value::Number(n)),
            Some(Tok::Str(s)) => Ok(Value::Str(s)),
            Some(Tok::Ident(s)) if s == "True" => Ok(Value::Bool(true)),
            Some(Tok::Ident(s)) if s == "False" => Ok(Value::Bool(false)),
            Some(Tok::Ident(name)) => match self.resolver.resolve(&name) {
                Some(s) => Ok(match s.parse::<f64>() {
                    Ok(n) => Value::Number(n),
                    Err(_) => Value::Str(s),
                }),
                None => Ok(Value::Str(String::new())),
            },
            Some(Tok::LParen) => {
                let v = self.parse_or()?;
                match self.next() {
                    Some(Tok::RParen) => Ok(v),
                    Some(t) => Err(ExprError::UnexpectedToken(format!("{:?}", t))),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            Some(other) => Err(ExprError::UnexpectedToken(format!("{:?}", other))),
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}

fn num(v: &Value) -> Result<f64, ExprError> {
    match v {
        Value::Number(n) => Ok(*n),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Str(s) => s
            .parse::<f64>()
            .map_err(|_| ExprError::TypeMismatch(format!("'{}' is not a number", s))),
    }
}

fn add(a: &Value, b: &Value) -> Result<Value, ExprError> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(Value::Str(format!("{}{}", x, y))),
        (Value::Str(x), other) => Ok(Value::Str(format!("{}{}", x, other.to_output_string()))),
        (other, Value::Str(y)) => Ok(Value::Str(format!("{}{}", other.to_output_string(), y))),
        _ => Ok(Value::Number(num(a)? + num(b)?)),
    }
}

fn compare(a: &Value, op: &str, b: &Value) -> Result<bool, ExprError> {
    let ordering = match (a, b) {
        (Value::Str(x), Value::Str(y)) => x.partial_cmp(y),
        _ => num(a)?.partial_cmp(&num(b)?),
    };
    let ordering = ordering.ok_or_else(|| ExprError::TypeMismatch("incomparable values".into()))?;
    Ok(match op {
        "==" => ordering == std::cmp::Ordering::Equal,
        "!=" => ordering != std::cmp::Ordering::Equal,
        "<" => ordering == std::cmp::Ordering::Less,
        "<=" => ordering != std::cmp::Ordering::Greater,
        ">" => ordering == std::cmp::Ordering::Greater,
        ">=" => ordering != std::cmp::Ordering::Less,
        _ => unreachable!(),
    })
}

/// Evaluates `src` against `resolver` for attribute lookups, returning the result value.
pub fn eval<R: NameResolver>(src: &str, resolver: &R) -> Result<Value, ExprError> {
    let toks = lex(src)?;
    let mut parser = Parser {
        toks,
        pos: 0,
        resolver,
    };
    let v = parser.parse_or()?;
    if parser.pos != parser.toks.len() {
        return Err(ExprError::UnexpectedToken(format!("{:?}", parser.toks[parser.pos])));
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoAttrs;
    impl NameResolver for NoAttrs {
        fn resolve(&self, _name: &str) -> Option<String> {
            None
        }
    }

    struct Map(Vec<(&'static str, &'static str)>);
    impl NameResolver for Map {
        fn resolve(&self, name: &str) -> Option<String> {
            self.0
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn arithmetic() {
        assert_eq!(eval("1 + 2 * 3", &NoAttrs).unwrap(), Value::Number(7.0));
        assert_eq!(eval("(1 + 2) * 3", &NoAttrs).unwrap(), Value::Number(9.0));
    }

    #[test]
    fn comparisons_and_booleans() {
        assert_eq!(eval("1 < 2 and 3 > 2", &NoAttrs).unwrap(), Value::Bool(true));
        assert_eq!(eval("not (1 == 1)", &NoAttrs).unwrap(), Value::Bool(false));
    }

    #[test]
    fn attribute_lookup() {
        let map = Map(vec![("pagewidth", "80")]);
        assert_eq!(eval("pagewidth / 2", &map).unwrap(), Value::Number(40.0));
    }

    #[test]
    fn divide_by_zero_errors() {
        assert_eq!(eval("1 / 0", &NoAttrs), Err(ExprError::DivideByZero));
    }

    #[test]
    fn string_concat() {
        assert_eq!(
            eval("\"a\" + \"b\"", &NoAttrs).unwrap(),
            Value::Str("ab".into())
        );
    }
}
