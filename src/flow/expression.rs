//! Condition Expressions
//!
//! A small sandboxed expression language used by `while` and `if` nodes.
//! Expressions are parsed once into an AST and evaluated against the run's
//! variables; nothing is ever executed as code. Any parse or evaluation
//! error makes the condition `false`.
//!
//! # Grammar
//!
//! ```text
//! or      := and ( "||" and )*
//! and     := eq ( "&&" eq )*
//! eq      := cmp ( ("==" | "!=" | "===" | "!==") cmp )*
//! cmp     := add ( ("<" | "<=" | ">" | ">=") add )*
//! add     := mul ( ("+" | "-") mul )*
//! mul     := unary ( ("*" | "/" | "%") unary )*
//! unary   := ("!" | "-") unary | postfix
//! postfix := primary ( "." ident | "[" or "]" )*
//! primary := number | string | true | false | null | ident | "(" or ")"
//! ```
//!
//! Identifiers resolve to variables; `vars` names the whole variable bag,
//! so `vars.count` and `count` are equivalent.

use std::cmp::Ordering;
use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use super::model::Variables;

/// Nesting limit for parenthesized and unary expressions.
const MAX_DEPTH: usize = 64;

/// Limit on operator and member-access nodes in one expression.
const MAX_NODES: usize = 256;

/// Identifier that resolves to the whole variable bag.
const VARS_ROOT: &str = "vars";

/// A condition as written in a flow definition.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Condition {
    /// `{ var: name, equals: value }`
    Equals { var: String, equals: Value },
    /// `{ expression: "count < 3" }`
    Expression { expression: String },
    /// A bare expression string
    Raw(String),
}

impl Condition {
    pub fn expression(source: impl Into<String>) -> Self {
        Self::Expression {
            expression: source.into(),
        }
    }

    pub fn equals(var: impl Into<String>, value: Value) -> Self {
        Self::Equals {
            var: var.into(),
            equals: value,
        }
    }

    /// Parses the condition ahead of evaluation.
    pub fn compile(&self) -> CompiledCondition {
        match self {
            Self::Equals { var, equals } => CompiledCondition::Equals {
                var: var.clone(),
                value: equals.clone(),
            },
            Self::Expression { expression: source } | Self::Raw(source) => match parse(source) {
                Ok(expr) => CompiledCondition::Expr(expr),
                Err(e) => {
                    debug!("Condition '{}' failed to parse: {}", source, e);
                    CompiledCondition::Invalid(e.to_string())
                }
            },
        }
    }

    /// Compiles and evaluates in one go.
    pub fn evaluate(&self, vars: &Variables) -> bool {
        self.compile().evaluate(vars)
    }
}

/// A condition ready for repeated evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledCondition {
    Equals { var: String, value: Value },
    Expr(Expr),
    /// Parsing failed; always evaluates to `false`
    Invalid(String),
}

impl CompiledCondition {
    /// Evaluates the condition, failing closed to `false`.
    pub fn evaluate(&self, vars: &Variables) -> bool {
        match self {
            Self::Equals { var, value } => vars
                .get(var)
                .map(|current| loose_eq(current, value))
                .unwrap_or(false),
            Self::Expr(expr) => match expr.eval(vars) {
                Ok(value) => truthy(&value),
                Err(e) => {
                    debug!("Condition evaluation failed closed: {}", e);
                    false
                }
            },
            Self::Invalid(_) => false,
        }
    }
}

/// Errors from parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    #[error("unexpected character '{0}' at {1}")]
    UnexpectedChar(char, usize),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("unexpected token {0}")]
    UnexpectedToken(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("expression nested too deeply")]
    TooDeep,
    #[error("expression has more than {0} operators")]
    TooLarge(usize),
    #[error("type error: {0}")]
    Type(String),
    #[error("division by zero")]
    DivisionByZero,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Not,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Num(n) => write!(f, "{}", n),
            Token::Str(s) => write!(f, "'{}'", s),
            Token::Ident(s) => write!(f, "{}", s),
            other => write!(f, "{:?}", other),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let peek = chars.get(i + 1).copied();

        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| ExprError::InvalidNumber(text.clone()))?;
                tokens.push(Token::Num(n));
            }
            '"' | '\'' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(ExprError::UnterminatedString),
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            let escaped = chars.get(i + 1).ok_or(ExprError::UnterminatedString)?;
                            text.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                other => *other,
                            });
                            i += 2;
                        }
                        Some(&ch) => {
                            text.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '&' if peek == Some('&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if peek == Some('|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '=' if peek == Some('=') => {
                tokens.push(Token::Eq);
                i += if chars.get(i + 2) == Some(&'=') { 3 } else { 2 };
            }
            '!' if peek == Some('=') => {
                tokens.push(Token::Ne);
                i += if chars.get(i + 2) == Some(&'=') { 3 } else { 2 };
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '<' if peek == Some('=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' if peek == Some('=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            other => return Err(ExprError::UnexpectedChar(other, i)),
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Member(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// Parses an expression into an AST.
pub fn parse(source: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        nodes: 0,
    };
    let expr = parser.or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(ExprError::UnexpectedToken(token.to_string())),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    nodes: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), ExprError> {
        match self.next() {
            Some(t) if t == token => Ok(()),
            Some(t) => Err(ExprError::UnexpectedToken(t.to_string())),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn descend(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooDeep);
        }
        Ok(())
    }

    /// Counts one operator node; chains are left-deep, so this bounds tree depth.
    fn grow(&mut self) -> Result<(), ExprError> {
        self.nodes += 1;
        if self.nodes > MAX_NODES {
            return Err(ExprError::TooLarge(MAX_NODES));
        }
        Ok(())
    }

    fn or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.and()?;
        while self.eat(&Token::Or) {
            self.grow()?;
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.equality()?;
        while self.eat(&Token::And) {
            self.grow()?;
            let right = self.equality()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => BinaryOp::Eq,
                Some(Token::Ne) => BinaryOp::Ne,
                _ => return Ok(left),
            };
            self.pos += 1;
            self.grow()?;
            let right = self.comparison()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn comparison(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => return Ok(left),
            };
            self.pos += 1;
            self.grow()?;
            let right = self.additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn additive(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            self.grow()?;
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.pos += 1;
            self.grow()?;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        let op = match self.peek() {
            Some(Token::Not) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Neg,
            _ => return self.postfix(),
        };
        self.pos += 1;
        self.grow()?;
        self.descend()?;
        let operand = self.unary()?;
        self.depth -= 1;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                self.grow()?;
                match self.next() {
                    Some(Token::Ident(name)) => {
                        let key = Expr::Literal(Value::String(name));
                        expr = Expr::Member(Box::new(expr), Box::new(key));
                    }
                    Some(t) => return Err(ExprError::UnexpectedToken(t.to_string())),
                    None => return Err(ExprError::UnexpectedEnd),
                }
            } else if self.eat(&Token::LBracket) {
                self.grow()?;
                self.descend()?;
                let key = self.or()?;
                self.depth -= 1;
                self.expect(Token::RBracket)?;
                expr = Expr::Member(Box::new(expr), Box::new(key));
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        match self.next() {
            Some(Token::Num(n)) => Ok(Expr::Literal(number(n)?)),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" | "undefined" => Expr::Literal(Value::Null),
                _ => Expr::Var(name),
            }),
            Some(Token::LParen) => {
                self.descend()?;
                let inner = self.or()?;
                self.depth -= 1;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(t) => Err(ExprError::UnexpectedToken(t.to_string())),
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}

impl Expr {
    /// Evaluates the expression against a variable bag.
    pub fn eval(&self, vars: &Variables) -> Result<Value, ExprError> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Var(name) => Ok(match vars.get(name) {
                Some(value) => value.clone(),
                None if name == VARS_ROOT => Value::Object(vars.clone()),
                None => Value::Null,
            }),
            Expr::Member(target, key) => {
                let target = target.eval(vars)?;
                let key = key.eval(vars)?;
                Ok(member(&target, &key))
            }
            Expr::Unary(UnaryOp::Not, operand) => Ok(Value::Bool(!truthy(&operand.eval(vars)?))),
            Expr::Unary(UnaryOp::Neg, operand) => {
                let value = operand.eval(vars)?;
                let n = as_number(&value, "-")?;
                number(-n)
            }
            Expr::And(left, right) => {
                Ok(Value::Bool(truthy(&left.eval(vars)?) && truthy(&right.eval(vars)?)))
            }
            Expr::Or(left, right) => {
                Ok(Value::Bool(truthy(&left.eval(vars)?) || truthy(&right.eval(vars)?)))
            }
            Expr::Binary(op, left, right) => {
                let left = left.eval(vars)?;
                let right = right.eval(vars)?;
                binary(*op, &left, &right)
            }
        }
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ExprError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!loose_eq(left, right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(left, right)?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinaryOp::Add => match (left, right) {
            (Value::Number(_), Value::Number(_)) => {
                number(as_number(left, "+")? + as_number(right, "+")?)
            }
            (Value::String(_), _) | (_, Value::String(_)) => {
                Ok(Value::String(format!("{}{}", display(left), display(right))))
            }
            _ => Err(ExprError::Type(format!("cannot add {} and {}", left, right))),
        },
        BinaryOp::Sub => number(as_number(left, "-")? - as_number(right, "-")?),
        BinaryOp::Mul => number(as_number(left, "*")? * as_number(right, "*")?),
        BinaryOp::Div | BinaryOp::Rem => {
            let divisor = as_number(right, "/")?;
            if divisor == 0.0 {
                return Err(ExprError::DivisionByZero);
            }
            let dividend = as_number(left, "/")?;
            number(if op == BinaryOp::Div {
                dividend / divisor
            } else {
                dividend % divisor
            })
        }
    }
}

fn member(target: &Value, key: &Value) -> Value {
    match (target, key) {
        (Value::Object(map), Value::String(k)) => map.get(k).cloned().unwrap_or(Value::Null),
        (Value::Array(items), Value::Number(n)) => n
            .as_u64()
            .and_then(|i| items.get(i as usize))
            .cloned()
            .unwrap_or(Value::Null),
        (Value::Array(items), Value::String(k)) if k == "length" => Value::from(items.len()),
        (Value::String(s), Value::String(k)) if k == "length" => Value::from(s.chars().count()),
        _ => Value::Null,
    }
}

fn as_number(value: &Value, op: &str) -> Result<f64, ExprError> {
    value.as_f64().ok_or_else(|| {
        ExprError::Type(format!("operator '{}' expects a number, found {}", op, value))
    })
}

fn number(n: f64) -> Result<Value, ExprError> {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        return Ok(Value::from(n as i64));
    }
    Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| ExprError::Type(format!("'{}' is not a finite number", n)))
}

fn compare(left: &Value, right: &Value) -> Result<Ordering, ExprError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
            a.partial_cmp(&b)
                .ok_or_else(|| ExprError::Type("cannot order NaN".to_string()))
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(ExprError::Type(format!("cannot order {} and {}", left, right))),
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Equality that treats `1` and `1.0` as equal.
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

/// Truthiness: `null`, `false`, `0`, `NaN` and `""` are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(value: Value) -> Variables {
        match value {
            Value::Object(map) => map,
            _ => panic!("test vars must be an object"),
        }
    }

    fn eval(source: &str, bag: &Variables) -> bool {
        Condition::expression(source).evaluate(bag)
    }

    #[test]
    fn test_comparisons() {
        let bag = vars(json!({"count": 2, "name": "ada"}));
        assert!(eval("count < 3", &bag));
        assert!(eval("count >= 2 && name == 'ada'", &bag));
        assert!(!eval("count > 2 || name != \"ada\"", &bag));
        assert!(eval("vars.count === 2", &bag));
    }

    #[test]
    fn test_arithmetic_and_precedence() {
        let bag = vars(json!({"a": 3, "b": 4}));
        assert!(eval("a + b * 2 == 11", &bag));
        assert!(eval("(a + b) * 2 == 14", &bag));
        assert!(eval("b % a == 1", &bag));
        assert!(eval("-a + 5 == 2", &bag));
        assert!(eval("b / 2 == 2.0", &bag));
    }

    #[test]
    fn test_member_access() {
        let bag = vars(json!({"user": {"roles": ["admin", "dev"]}, "items": [1, 2, 3]}));
        assert!(eval("user.roles[0] == 'admin'", &bag));
        assert!(eval("items.length == 3", &bag));
        assert!(eval("vars['items'][2] == 3", &bag));
        assert!(!eval("user.missing.deeper", &bag));
    }

    #[test]
    fn test_string_concat() {
        let bag = vars(json!({"first": "a", "n": 1}));
        assert!(eval("first + n == 'a1'", &bag));
    }

    #[test]
    fn test_unknown_variable_is_null() {
        let bag = Variables::new();
        assert!(eval("missing == null", &bag));
        assert!(!eval("missing", &bag));
        assert!(eval("!missing", &bag));
    }

    #[test]
    fn test_fails_closed() {
        let bag = vars(json!({"s": "text"}));
        assert!(!eval("s * 2 == 0", &bag));
        assert!(!eval("1 / 0 == 1", &bag));
        assert!(!eval("s < 1", &bag));
        assert!(!eval("(((", &bag));
        assert!(!eval("a = 1", &bag));
        assert!(!eval("alert('x'); true", &bag));
        assert!(!eval("'unterminated", &bag));
    }

    #[test]
    fn test_depth_limit() {
        let source = format!("{}true{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(parse(&source), Err(ExprError::TooDeep));
        assert!(parse("((true))").is_ok());
    }

    #[test]
    fn test_long_operator_chain_fails_closed() {
        let bag = Variables::new();
        let sum = vec!["1"; 5_000].join(" + ") + " > 0";
        assert_eq!(parse(&sum), Err(ExprError::TooLarge(MAX_NODES)));
        assert!(!eval(&sum, &bag));

        let members = format!("vars{} == null", ".a".repeat(5_000));
        assert!(!eval(&members, &bag));

        let ors = vec!["false"; 5_000].join(" || ");
        assert!(!eval(&format!("{} || true", ors), &bag));

        let modest = vec!["1"; 100].join(" + ") + " == 100";
        assert!(eval(&modest, &bag));
    }

    #[test]
    fn test_structured_equals() {
        let bag = vars(json!({"status": "ready", "n": 1}));
        assert!(Condition::equals("status", json!("ready")).evaluate(&bag));
        assert!(Condition::equals("n", json!(1.0)).evaluate(&bag));
        assert!(!Condition::equals("missing", json!(null)).evaluate(&bag));
    }

    #[test]
    fn test_condition_deserialization() {
        let c: Condition = serde_json::from_value(json!({"var": "x", "equals": 5})).unwrap();
        assert!(matches!(c, Condition::Equals { .. }));

        let c: Condition = serde_json::from_value(json!({"expression": "x > 1"})).unwrap();
        assert!(matches!(c, Condition::Expression { .. }));

        let c: Condition = serde_json::from_value(json!("x > 1")).unwrap();
        assert!(matches!(c, Condition::Raw(_)));
    }

    #[test]
    fn test_compiled_reuse() {
        let compiled = Condition::expression("i < 2").compile();
        let mut bag = vars(json!({"i": 0}));
        assert!(compiled.evaluate(&bag));
        bag.insert("i".into(), json!(2));
        assert!(!compiled.evaluate(&bag));
    }

    #[test]
    fn test_truthiness() {
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(truthy(&json!([])));
        assert!(truthy(&json!("0")));
    }
}
