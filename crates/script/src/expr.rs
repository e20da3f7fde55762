//! Numeric expressions embedded in drawing programs.
//!
//! Expressions are written as JSON numbers or strings such as
//! `"width / 2 - 10"` or `"sin(time / 500) * 20"`. They can only read
//! builtins (`width`, `height`, `frame`, `time`, `pi`) and names bound by the
//! program itself; there is no way to reach anything outside the sandbox.
//!
//! Parsing happens when a program is decoded. A parse failure does not fail
//! decoding; it is kept on the expression and reported by validation so that
//! the caller can classify it as an unsafe program rather than a malformed
//! response.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Deepest nesting of parentheses, unary operators and call arguments.
pub const MAX_NESTING: usize = 64;

/// Longest accepted expression source, in bytes.
pub const MAX_EXPR_LEN: usize = 4096;

/// Identifiers provided by the sandbox for every evaluation.
pub const BUILTIN_VARS: [&str; 5] = ["width", "height", "frame", "time", "pi"];

/// Environment an expression is evaluated in.
pub trait Env {
    /// Resolve a variable, returning `None` when it is not bound.
    fn lookup(&self, name: &str) -> Option<f64>;

    /// Next value in `[0, 1)` for `random()`.
    fn random(&mut self) -> f64;
}

/// Errors raised while evaluating an already validated expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("variable '{0}' is used before it is assigned")]
    Undefined(String),
    #[error("expression '{0}' did not produce a finite number")]
    NonFinite(String),
    #[error("expression '{expr}' is invalid: {message}")]
    Invalid { expr: String, message: String },
}

/// Built-in functions callable from expressions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Func {
    Sin,
    Cos,
    Tan,
    Abs,
    Floor,
    Ceil,
    Round,
    Sqrt,
    Min,
    Max,
    Pow,
    Clamp,
    Random,
}

impl Func {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "abs" => Self::Abs,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "round" => Self::Round,
            "sqrt" => Self::Sqrt,
            "min" => Self::Min,
            "max" => Self::Max,
            "pow" => Self::Pow,
            "clamp" => Self::Clamp,
            "random" => Self::Random,
            _ => return None,
        })
    }

    fn arity(self) -> usize {
        match self {
            Self::Random => 0,
            Self::Min | Self::Max | Self::Pow => 2,
            Self::Clamp => 3,
            _ => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

/// Parsed expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Num(f64),
    Var(String),
    Neg(Box<Node>),
    Not(Box<Node>),
    Binary(BinOp, Box<Node>, Box<Node>),
    Call(Func, Vec<Node>),
}

impl Node {
    fn collect_vars<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Node::Num(_) => {}
            Node::Var(name) => out.push(name),
            Node::Neg(inner) | Node::Not(inner) => inner.collect_vars(out),
            Node::Binary(_, lhs, rhs) => {
                lhs.collect_vars(out);
                rhs.collect_vars(out);
            }
            Node::Call(_, args) => args.iter().for_each(|a| a.collect_vars(out)),
        }
    }

    pub(crate) fn eval(&self, env: &mut dyn Env) -> Result<f64, EvalError> {
        Ok(match self {
            Node::Num(n) => *n,
            Node::Var(name) => env
                .lookup(name)
                .ok_or_else(|| EvalError::Undefined(name.clone()))?,
            Node::Neg(inner) => -inner.eval(env)?,
            Node::Not(inner) => truth(inner.eval(env)? == 0.0),
            Node::Binary(op, lhs, rhs) => {
                let a = lhs.eval(env)?;
                // Short-circuit logic the way script authors expect.
                match op {
                    BinOp::And if a == 0.0 => return Ok(0.0),
                    BinOp::Or if a != 0.0 => return Ok(1.0),
                    _ => {}
                }
                let b = rhs.eval(env)?;
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Rem => a % b,
                    BinOp::Lt => truth(a < b),
                    BinOp::Le => truth(a <= b),
                    BinOp::Gt => truth(a > b),
                    BinOp::Ge => truth(a >= b),
                    BinOp::Eq => truth(a == b),
                    BinOp::Ne => truth(a != b),
                    BinOp::And | BinOp::Or => truth(b != 0.0),
                }
            }
            Node::Call(func, args) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(arg.eval(env)?);
                }
                match func {
                    Func::Sin => values[0].sin(),
                    Func::Cos => values[0].cos(),
                    Func::Tan => values[0].tan(),
                    Func::Abs => values[0].abs(),
                    Func::Floor => values[0].floor(),
                    Func::Ceil => values[0].ceil(),
                    Func::Round => values[0].round(),
                    Func::Sqrt => values[0].sqrt(),
                    Func::Min => values[0].min(values[1]),
                    Func::Max => values[0].max(values[1]),
                    Func::Pow => values[0].powf(values[1]),
                    Func::Clamp => values[0].max(values[1]).min(values[2]),
                    Func::Random => env.random(),
                }
            }
        })
    }
}

fn truth(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// A numeric expression as it appears in a program.
#[derive(Clone, Debug)]
pub struct Expr {
    source: String,
    parsed: Result<Node, String>,
}

impl Expr {
    pub fn parse(source: impl Into<String>) -> Self {
        let source = source.into();
        let parsed = parse_node(&source);
        Self { source, parsed }
    }

    pub fn number(value: f64) -> Self {
        Self {
            source: format_number(value),
            parsed: Ok(Node::Num(value)),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The parse error, if the source text is not a valid expression.
    pub fn error(&self) -> Option<&str> {
        self.parsed.as_ref().err().map(String::as_str)
    }

    /// Literal value when the expression is a plain number.
    pub fn as_literal(&self) -> Option<f64> {
        match &self.parsed {
            Ok(Node::Num(n)) => Some(*n),
            _ => None,
        }
    }

    /// Variable names read by this expression.
    pub fn variables(&self) -> Vec<&str> {
        let mut out = Vec::new();
        if let Ok(node) = &self.parsed {
            node.collect_vars(&mut out);
        }
        out
    }

    pub fn eval(&self, env: &mut dyn Env) -> Result<f64, EvalError> {
        let node = self.parsed.as_ref().map_err(|message| EvalError::Invalid {
            expr: self.source.clone(),
            message: message.clone(),
        })?;
        let value = node.eval(env)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(EvalError::NonFinite(self.source.clone()))
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_literal() {
            Some(n) => serializer.serialize_f64(n),
            None => serializer.serialize_str(&self.source),
        }
    }
}

impl<'de> Deserialize<'de> for Expr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Expr::number(n),
            Raw::Text(s) => Expr::parse(s),
        })
    }
}

/// Format a number the way it should appear in text and canonical source.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let text = format!("{:.2}", value);
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

// === Parser ===

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Str(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

const OPERATORS: [&str; 16] = [
    "&&", "||", "<=", ">=", "==", "!=", "+", "-", "*", "/", "%", "<", ">", "!", "(", ")",
];

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| format!("invalid number '{}'", text))?;
            tokens.push(Token::Num(value));
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }

        if c == '"' || c == '\'' || c == '`' {
            let start = i + 1;
            i += 1;
            while i < chars.len() && chars[i] != c {
                i += 1;
            }
            if i >= chars.len() {
                return Err("unterminated string literal".into());
            }
            tokens.push(Token::Str(chars[start..i].iter().collect()));
            i += 1;
            continue;
        }

        let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
        let op = OPERATORS
            .iter()
            .find(|op| rest.starts_with(**op))
            .ok_or_else(|| format!("unexpected character '{}'", c))?;
        i += op.chars().count();
        tokens.push(match *op {
            "(" => Token::LParen,
            ")" => Token::RParen,
            _ => Token::Op(op),
        });
    }

    Ok(tokens)
}

fn parse_node(source: &str) -> Result<Node, String> {
    if source.len() > MAX_EXPR_LEN {
        return Err(format!("expression longer than {} bytes", MAX_EXPR_LEN));
    }
    let tokens = tokenize_with_commas(source)?;
    if tokens.is_empty() {
        return Err("empty expression".into());
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let node = parser.or()?;
    if parser.pos < parser.tokens.len() {
        return Err(format!("unexpected {:?}", parser.tokens[parser.pos]));
    }
    Ok(node)
}

/// Commas only appear inside calls; split them out before tokenizing the rest.
fn tokenize_with_commas(source: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut in_string: Option<char> = None;
    let mut segment = String::new();

    for c in source.chars() {
        match in_string {
            Some(quote) => {
                segment.push(c);
                if c == quote {
                    in_string = None;
                }
            }
            None if c == '"' || c == '\'' || c == '`' => {
                segment.push(c);
                in_string = Some(c);
            }
            None if c == ',' => {
                tokens.extend(tokenize(&segment)?);
                tokens.push(Token::Comma);
                segment.clear();
            }
            None => segment.push(c),
        }
    }
    tokens.extend(tokenize(&segment)?);
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn nested(&mut self, f: fn(&mut Self) -> Result<Node, String>) -> Result<Node, String> {
        if self.depth >= MAX_NESTING {
            return Err("expression nested too deeply".into());
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat_op(&mut self, ops: &[&'static str]) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn binary_level(
        &mut self,
        ops: &[&'static str],
        next: fn(&mut Self) -> Result<Node, String>,
    ) -> Result<Node, String> {
        let mut lhs = next(self)?;
        while let Some(op) = self.eat_op(ops) {
            let rhs = next(self)?;
            let op = match op {
                "||" => BinOp::Or,
                "&&" => BinOp::And,
                "==" => BinOp::Eq,
                "!=" => BinOp::Ne,
                "<" => BinOp::Lt,
                "<=" => BinOp::Le,
                ">" => BinOp::Gt,
                ">=" => BinOp::Ge,
                "+" => BinOp::Add,
                "-" => BinOp::Sub,
                "*" => BinOp::Mul,
                "/" => BinOp::Div,
                _ => BinOp::Rem,
            };
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn or(&mut self) -> Result<Node, String> {
        self.binary_level(&["||"], Self::and)
    }

    fn and(&mut self) -> Result<Node, String> {
        self.binary_level(&["&&"], Self::equality)
    }

    fn equality(&mut self) -> Result<Node, String> {
        self.binary_level(&["==", "!="], Self::comparison)
    }

    fn comparison(&mut self) -> Result<Node, String> {
        self.binary_level(&["<", "<=", ">", ">="], Self::additive)
    }

    fn additive(&mut self) -> Result<Node, String> {
        self.binary_level(&["+", "-"], Self::multiplicative)
    }

    fn multiplicative(&mut self) -> Result<Node, String> {
        self.binary_level(&["*", "/", "%"], Self::unary)
    }

    fn unary(&mut self) -> Result<Node, String> {
        match self.eat_op(&["-", "!", "+"]) {
            Some("-") => Ok(Node::Neg(Box::new(self.nested(Self::unary)?))),
            Some("!") => Ok(Node::Not(Box::new(self.nested(Self::unary)?))),
            Some(_) => self.nested(Self::unary),
            None => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Node, String> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| "unexpected end of expression".to_string())?;
        self.pos += 1;

        let node = match token {
            Token::Num(n) => Node::Num(n),
            Token::Ident(name) => {
                if self.peek() == Some(&Token::LParen) {
                    return self.call(&name);
                }
                Node::Var(name)
            }
            Token::Str(text) => {
                if self.peek() == Some(&Token::LParen) && text.is_empty() {
                    return Err("invocation of an empty string".into());
                }
                return Err(format!("string literal \"{}\" is not a number", text));
            }
            Token::LParen => {
                let inner = self.nested(Self::or)?;
                if self.peek() != Some(&Token::RParen) {
                    return Err("missing ')'".into());
                }
                self.pos += 1;
                inner
            }
            other => return Err(format!("unexpected {:?}", other)),
        };

        if self.peek() == Some(&Token::LParen) {
            return Err("value is not callable".into());
        }
        Ok(node)
    }

    fn call(&mut self, name: &str) -> Result<Node, String> {
        let func = Func::from_name(name).ok_or_else(|| format!("unknown function '{}'", name))?;
        // Consume '('.
        self.pos += 1;
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
        } else {
            loop {
                args.push(self.nested(Self::or)?);
                match self.peek() {
                    Some(Token::Comma) => self.pos += 1,
                    Some(Token::RParen) => {
                        self.pos += 1;
                        break;
                    }
                    _ => return Err(format!("missing ')' after arguments to '{}'", name)),
                }
            }
        }
        if args.len() != func.arity() {
            return Err(format!(
                "'{}' takes {} argument(s), got {}",
                name,
                func.arity(),
                args.len()
            ));
        }
        Ok(Node::Call(func, args))
    }
}
