//! On-the-fly expression compilation.
//!
//! `evaluate_source` needs two paths: wholly numeric text parses directly
//! (no instruction execution), and anything else compiles to a fresh
//! `ExprChunk`. The whole expression is evaluated in one working kind
//! derived from the target; steps that need a different kind (the
//! real-only function band) get conversions emitted around them.

use logos::Logos;

use tabula_program::{Date, Decimal, ExprChunk, ExprOp, Kind, TypedValue};

use crate::error::{Error, Result};

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum Token {
    #[regex(r"[0-9]+(\.[0-9]+)?", |lex| lex.slice().to_owned())]
    Number(String),
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_ascii_uppercase())]
    Ident(String),
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("^")]
    Caret,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
}

/// Parse wholly numeric source text directly: plain integers, `.`-reals,
/// and `/`-dates. Returns `None` when the text needs compilation.
pub(crate) fn parse_literal(source: &str, target: Kind) -> Option<TypedValue> {
    let s = source.trim();
    if s.is_empty() {
        return Some(TypedValue::zero(target));
    }
    let unsigned = s.strip_prefix(['-', '+']).unwrap_or(s);
    let signed = unsigned.len() != s.len();
    let mut digits = 0usize;
    let mut dots = 0usize;
    let mut slashes = 0usize;
    for b in unsigned.bytes() {
        match b {
            b'0'..=b'9' => digits += 1,
            b'.' => dots += 1,
            b'/' => slashes += 1,
            _ => return None,
        }
    }
    if digits == 0 {
        return None;
    }
    if slashes > 0 {
        if slashes != 2 || dots > 0 || signed {
            return None;
        }
        let date: Date = s.parse().ok()?;
        return TypedValue::Date(date).convert(target);
    }
    if dots > 1 {
        return None;
    }
    if target == Kind::Text {
        return Some(TypedValue::Text(s.to_string()));
    }
    if dots == 1 {
        let value: f64 = s.parse().ok()?;
        return TypedValue::Real(value).convert(target);
    }
    match target {
        // Digit strings parse exactly in the decimal form.
        Kind::Decimal => s.parse::<Decimal>().ok().map(TypedValue::Decimal),
        _ => {
            let value: f64 = s.parse().ok()?;
            TypedValue::Real(value).convert(target)
        }
    }
}

/// Compile expression source for a target kind.
pub(crate) fn compile(source: &str, target: Kind) -> Result<ExprChunk> {
    let working = match target {
        Kind::Int => Kind::Int,
        Kind::Real => Kind::Real,
        _ => Kind::Decimal,
    };
    let mut tokens = Vec::new();
    for token in Token::lexer(source) {
        match token {
            Ok(token) => tokens.push(token),
            Err(()) => {
                return Err(Error::BadSource(format!(
                    "unrecognized character in {source:?}"
                )))
            }
        }
    }
    if tokens.is_empty() {
        return Err(Error::BadSource("empty expression".into()));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        chunk: ExprChunk::new(working),
        working,
    };
    parser.expression(0)?;
    if parser.pos != parser.tokens.len() {
        return Err(Error::BadSource("trailing tokens after expression".into()));
    }
    parser.chunk.push(ExprOp::Output, working);
    Ok(parser.chunk)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Binary {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    And,
    Or,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    chunk: ExprChunk,
    working: Kind,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<()> {
        if self.advance().as_ref() == Some(&token) {
            Ok(())
        } else {
            Err(Error::BadSource(format!("expected {what}")))
        }
    }

    /// Precedence-climbing loop; operands are emitted postfix as they
    /// parse, so each operator lands after both of its inputs.
    fn expression(&mut self, min_power: u8) -> Result<()> {
        self.unary()?;
        loop {
            let (power, op) = match self.peek() {
                Some(Token::Pipe) => (1, Binary::Or),
                Some(Token::Amp) => (1, Binary::And),
                Some(Token::Plus) => (2, Binary::Add),
                Some(Token::Minus) => (2, Binary::Sub),
                Some(Token::Star) => (3, Binary::Mul),
                Some(Token::Slash) => (3, Binary::Div),
                Some(Token::Caret) => (4, Binary::Pow),
                _ => break,
            };
            if power < min_power {
                break;
            }
            self.advance();
            if op == Binary::Pow {
                self.convert(self.working, Kind::Real);
            }
            self.expression(power + 1)?;
            self.emit_binary(op)?;
        }
        Ok(())
    }

    fn unary(&mut self) -> Result<()> {
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                self.unary()?;
                self.chunk.push(ExprOp::Neg, self.working);
                Ok(())
            }
            Some(Token::Plus) => {
                self.advance();
                self.unary()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<()> {
        match self.advance() {
            Some(Token::Number(text)) => self.literal(&text),
            Some(Token::LParen) => {
                self.expression(0)?;
                self.expect(Token::RParen, "')'")
            }
            Some(Token::Ident(name)) => self.function(&name),
            other => Err(Error::BadSource(format!("unexpected token {other:?}"))),
        }
    }

    fn literal(&mut self, text: &str) -> Result<()> {
        let value = match self.working {
            Kind::Int => {
                let parsed: f64 = text
                    .parse()
                    .map_err(|_| Error::BadSource(format!("bad numeric literal {text:?}")))?;
                TypedValue::Int(parsed as i32)
            }
            Kind::Real => TypedValue::Real(
                text.parse()
                    .map_err(|_| Error::BadSource(format!("bad numeric literal {text:?}")))?,
            ),
            _ => TypedValue::Decimal(
                text.parse()
                    .map_err(|_| Error::BadSource(format!("bad numeric literal {text:?}")))?,
            ),
        };
        let index = self.chunk.add_literal(value);
        self.chunk.push(ExprOp::Literal(index), self.working);
        Ok(())
    }

    fn emit_binary(&mut self, op: Binary) -> Result<()> {
        let working = self.working;
        match op {
            Binary::Add => self.chunk.push(ExprOp::Add, working),
            Binary::Sub => self.chunk.push(ExprOp::Sub, working),
            Binary::Mul => self.chunk.push(ExprOp::Mul, working),
            Binary::Div => self.chunk.push(ExprOp::Div, working),
            Binary::And | Binary::Or => {
                if working != Kind::Int {
                    return Err(Error::BadSource(
                        "bitwise operators need an integer context".into(),
                    ));
                }
                let step = if op == Binary::And { ExprOp::BitAnd } else { ExprOp::BitOr };
                self.chunk.push(step, Kind::Int);
            }
            Binary::Pow => {
                self.convert(working, Kind::Real);
                self.chunk.push(ExprOp::Pow, Kind::Real);
                self.convert(Kind::Real, working);
            }
        }
        Ok(())
    }

    /// Emit a conversion of the stack top; no-op when the kinds agree.
    fn convert(&mut self, from: Kind, to: Kind) {
        if from == to {
            return;
        }
        let op = match to {
            Kind::Int => ExprOp::ToInt,
            Kind::Real => ExprOp::ToReal,
            Kind::Decimal => ExprOp::ToDecimal,
            // The compiler only works in numeric kinds.
            Kind::Date | Kind::Text => return,
        };
        self.chunk.push(op, from);
    }

    fn function(&mut self, name: &str) -> Result<()> {
        let working = self.working;
        self.expect(Token::LParen, "'(' after function name")?;
        match name {
            "ABS" => {
                self.expression(0)?;
                self.expect(Token::RParen, "')'")?;
                self.chunk.push(ExprOp::Abs, working);
            }
            "MIN" | "MAX" => {
                self.expression(0)?;
                self.expect(Token::Comma, "','")?;
                self.expression(0)?;
                self.expect(Token::RParen, "')'")?;
                let step = if name == "MIN" { ExprOp::Min } else { ExprOp::Max };
                self.chunk.push(step, working);
            }
            "ROUND" => {
                self.expression(0)?;
                self.expect(Token::RParen, "')'")?;
                self.convert(working, Kind::Real);
                self.chunk.push(ExprOp::Round, Kind::Real);
                self.convert(Kind::Int, working);
            }
            "POW" => {
                self.expression(0)?;
                self.convert(working, Kind::Real);
                self.expect(Token::Comma, "','")?;
                self.expression(0)?;
                self.convert(working, Kind::Real);
                self.expect(Token::RParen, "')'")?;
                self.chunk.push(ExprOp::Pow, Kind::Real);
                self.convert(Kind::Real, working);
            }
            "SQRT" | "LOG" | "EXP" | "SIN" | "COS" | "TAN" | "ASIN" | "ACOS" | "ATAN" => {
                self.expression(0)?;
                self.expect(Token::RParen, "')'")?;
                self.convert(working, Kind::Real);
                let step = match name {
                    "SQRT" => ExprOp::Sqrt,
                    "LOG" => ExprOp::Log,
                    "EXP" => ExprOp::Exp,
                    "SIN" => ExprOp::Sin,
                    "COS" => ExprOp::Cos,
                    "TAN" => ExprOp::Tan,
                    "ASIN" => ExprOp::Asin,
                    "ACOS" => ExprOp::Acos,
                    _ => ExprOp::Atan,
                };
                self.chunk.push(step, Kind::Real);
                self.convert(Kind::Real, working);
            }
            other => {
                return Err(Error::BadSource(format!("unknown function {other}")));
            }
        }
        Ok(())
    }
}
