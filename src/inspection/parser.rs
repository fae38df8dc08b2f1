//! Recursive-descent parser turning a campaign's textual condition
//! expression into the [`Expr`] AST the evaluator walks.
//!
//! The expression grammar is a small C-like expression language: `+ - * / %`
//! arithmetic, `< <= > >= == !=` comparisons, `&& ||` logical with `!`
//! negation, `cond ? a : b` ternary, bare identifiers as signal references,
//! `window_fn(signal[, spec])` window queries, and
//! `custom_function('name', args...)` custom calls. Malformed expressions
//! are rejected with [`Error::CampaignRejected`], keeping the previous
//! campaign set active.

use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;

use crate::error::{Error, Result};
use crate::inspection::ast::{ArithOp, CmpOp, Expr, LogicalOp, WindowFn, WindowSpec};
use crate::types::SignalId;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    AndAnd,
    OrOr,
    Bang,
    Question,
    Colon,
    Comma,
    LParen,
    RParen,
    Eof,
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.chars().peekable(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let Some(&c) = self.chars.peek() else {
                tokens.push(Token::Eof);
                break;
            };
            let token = match c {
                '+' => self.advance_with(Token::Plus),
                '-' => self.advance_with(Token::Minus),
                '*' => self.advance_with(Token::Star),
                '/' => self.advance_with(Token::Slash),
                '%' => self.advance_with(Token::Percent),
                '?' => self.advance_with(Token::Question),
                ':' => self.advance_with(Token::Colon),
                ',' => self.advance_with(Token::Comma),
                '(' => self.advance_with(Token::LParen),
                ')' => self.advance_with(Token::RParen),
                '<' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'=') {
                        self.chars.next();
                        Token::Le
                    } else {
                        Token::Lt
                    }
                }
                '>' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'=') {
                        self.chars.next();
                        Token::Ge
                    } else {
                        Token::Gt
                    }
                }
                '=' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'=') {
                        self.chars.next();
                        Token::EqEq
                    } else {
                        return Err(Error::CampaignRejected(
                            "unexpected '=', did you mean '=='?".into(),
                        ));
                    }
                }
                '!' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'=') {
                        self.chars.next();
                        Token::Ne
                    } else {
                        Token::Bang
                    }
                }
                '&' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'&') {
                        self.chars.next();
                        Token::AndAnd
                    } else {
                        return Err(Error::CampaignRejected("unexpected '&'".into()));
                    }
                }
                '|' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'|') {
                        self.chars.next();
                        Token::OrOr
                    } else {
                        return Err(Error::CampaignRejected("unexpected '|'".into()));
                    }
                }
                '\'' | '"' => self.lex_string(c)?,
                c if c.is_ascii_digit() => self.lex_number(),
                c if c.is_alphabetic() || c == '_' => self.lex_ident(),
                other => {
                    return Err(Error::CampaignRejected(format!(
                        "unexpected character {other:?}"
                    )))
                }
            };
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn advance_with(&mut self, token: Token) -> Token {
        self.chars.next();
        token
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn lex_string(&mut self, quote: char) -> Result<Token> {
        self.chars.next();
        let mut s = String::new();
        loop {
            match self.chars.next() {
                Some(c) if c == quote => return Ok(Token::Str(s)),
                Some(c) => s.push(c),
                None => return Err(Error::CampaignRejected("unterminated string literal".into())),
            }
        }
    }

    fn lex_number(&mut self) -> Token {
        let mut s = String::new();
        while matches!(self.chars.peek(), Some(c) if c.is_ascii_digit() || *c == '.') {
            s.push(self.chars.next().unwrap());
        }
        Token::Number(s.parse().unwrap_or(0.0))
    }

    fn lex_ident(&mut self) -> Token {
        let mut s = String::new();
        while matches!(self.chars.peek(), Some(c) if c.is_alphanumeric() || *c == '_' || *c == '.') {
            s.push(self.chars.next().unwrap());
        }
        Token::Ident(s)
    }
}

/// Parses `src` against `signals`, a name → id table used to resolve bare
/// identifiers and window-function targets.
pub fn parse_expression(src: &str, signals: &HashMap<String, SignalId>) -> Result<Expr> {
    let tokens = Lexer::new(src).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        signals,
    };
    let expr = parser.parse_ternary()?;
    parser.expect(Token::Eof)?;
    Ok(expr)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    signals: &'a HashMap<String, SignalId>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(Error::CampaignRejected(format!(
                "expected {expected:?}, found {:?}",
                self.peek()
            )))
        }
    }

    fn parse_ternary(&mut self) -> Result<Expr> {
        let cond = self.parse_or()?;
        if *self.peek() == Token::Question {
            self.advance();
            let then_branch = self.parse_ternary()?;
            self.expect(Token::Colon)?;
            let else_branch = self.parse_ternary()?;
            Ok(Expr::Conditional {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            })
        } else {
            Ok(cond)
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while *self.peek() == Token::OrOr {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Logical {
                op: LogicalOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_equality()?;
        while *self.peek() == Token::AndAnd {
            self.advance();
            let rhs = self.parse_equality()?;
            lhs = Expr::Logical {
                op: LogicalOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Token::EqEq => CmpOp::Eq,
                Token::Ne => CmpOp::Ne,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_relational()?;
            lhs = Expr::Compare {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Token::Lt => CmpOp::Lt,
                Token::Le => CmpOp::Le,
                Token::Gt => CmpOp::Gt,
                Token::Ge => CmpOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Expr::Compare {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => ArithOp::Add,
                Token::Minus => ArithOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Arith {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => ArithOp::Mul,
                Token::Slash => ArithOp::Div,
                Token::Percent => ArithOp::Rem,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Arith {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        match self.peek() {
            Token::Bang => {
                self.advance();
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            Token::Minus => {
                self.advance();
                let inner = self.parse_unary()?;
                Ok(Expr::Arith {
                    op: ArithOp::Sub,
                    lhs: Box::new(Expr::NumberLit(0.0)),
                    rhs: Box::new(inner),
                })
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Token::Number(n) => Ok(Expr::NumberLit(n)),
            Token::Str(s) => Ok(Expr::StringLit(s)),
            Token::LParen => {
                let inner = self.parse_ternary()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => self.parse_ident_expr(name),
            other => Err(Error::CampaignRejected(format!(
                "unexpected token {other:?}"
            ))),
        }
    }

    fn parse_ident_expr(&mut self, name: String) -> Result<Expr> {
        match name.as_str() {
            "true" => return Ok(Expr::BoolLit(true)),
            "false" => return Ok(Expr::BoolLit(false)),
            _ => {}
        }

        if *self.peek() != Token::LParen {
            let id = self
                .signals
                .get(&name)
                .copied()
                .ok_or_else(|| Error::CampaignRejected(format!("unknown signal {name:?}")))?;
            return Ok(Expr::SignalRef(id));
        }

        self.advance(); // consume '('
        let args = self.parse_arg_list()?;

        if name == "custom_function" {
            let Some(Expr::StringLit(fn_name)) = args.first() else {
                return Err(Error::CampaignRejected(
                    "custom_function's first argument must be a string literal name".into(),
                ));
            };
            return Ok(Expr::CustomCall {
                name: fn_name.clone(),
                args: args[1..].to_vec(),
                invocation_id: crate::inspection::ast::InvocationId(0),
            });
        }

        self.parse_window_call(&name, args)
    }

    fn parse_arg_list(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if *self.peek() == Token::RParen {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_ternary()?);
            match self.peek() {
                Token::Comma => {
                    self.advance();
                }
                Token::RParen => {
                    self.advance();
                    break;
                }
                other => {
                    return Err(Error::CampaignRejected(format!(
                        "expected ',' or ')', found {other:?}"
                    )))
                }
            }
        }
        Ok(args)
    }

    fn parse_window_call(&self, name: &str, args: Vec<Expr>) -> Result<Expr> {
        let Some(Expr::SignalRef(signal)) = args.first() else {
            return Err(Error::CampaignRejected(format!(
                "{name}(...) expects a signal reference as its first argument"
            )));
        };
        let signal = *signal;

        let needs_window = !matches!(name, "latest" | "previous");
        let spec = if needs_window {
            match args.get(1) {
                Some(Expr::NumberLit(n)) => WindowSpec::Count(*n as usize),
                Some(Expr::StringLit(s)) => parse_time_window(s)?,
                _ => {
                    return Err(Error::CampaignRejected(format!(
                        "{name}(...) requires a window spec argument"
                    )))
                }
            }
        } else {
            WindowSpec::Count(0)
        };

        let kind = match name {
            "latest" => WindowFn::Latest,
            "previous" => WindowFn::Previous,
            "min" => WindowFn::Min(spec),
            "max" => WindowFn::Max(spec),
            "sum" => WindowFn::Sum(spec),
            "count" => WindowFn::Count(spec),
            "avg" => WindowFn::Avg(spec),
            "presence" => WindowFn::Presence(spec),
            other => {
                return Err(Error::CampaignRejected(format!(
                    "unknown window function {other:?}"
                )))
            }
        };

        Ok(Expr::Window { kind, signal })
    }
}

/// Parses a duration literal like `"5000ms"` or `"5s"` into milliseconds.
fn parse_time_window(s: &str) -> Result<WindowSpec> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        return ms
            .parse::<u64>()
            .map(WindowSpec::TimeMs)
            .map_err(|_| Error::CampaignRejected(format!("invalid duration {s:?}")));
    }
    if let Some(secs) = s.strip_suffix('s') {
        return secs
            .parse::<u64>()
            .map(|v| WindowSpec::TimeMs(v * 1000))
            .map_err(|_| Error::CampaignRejected(format!("invalid duration {s:?}")));
    }
    Err(Error::CampaignRejected(format!(
        "unrecognized duration suffix in {s:?}"
    )))
}
