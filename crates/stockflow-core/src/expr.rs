//! Sandboxed arithmetic expression evaluation for flow rates.
//!
//! Rate expressions may be authored by a user or suggested by an AI
//! collaborator, so they are never handed to a general-purpose evaluator.
//! The grammar here is the whole sandbox: numeric literals, `+ - * /`,
//! unary minus, parentheses and calls to a fixed function set. Identifiers
//! resolve against exactly two maps (stock values and parameter values);
//! anything else is an error, which the public entry point degrades to `0.0`.

use crate::FloatValue;
use std::collections::HashMap;
use thiserror::Error;

/// Error type for expression parsing and evaluation.
///
/// These never escape through [`evaluate`]; they exist so the cause of a
/// rejected expression is inspectable by callers that want to surface it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("function '{name}' expects {expected} argument(s), got {got}")]
    WrongArity {
        name: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("expression nesting exceeds {MAX_NESTING} levels")]
    TooDeep,
    #[error("division by zero")]
    DivisionByZero,
    #[error("result is not finite")]
    NonFinite,
}

/// The fixed whitelist of pure numeric functions callable from a rate
/// expression. Nothing outside this set can be invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Min,
    Max,
    Abs,
    Exp,
    Log,
    Sqrt,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "min" => Some(Function::Min),
            "max" => Some(Function::Max),
            "abs" => Some(Function::Abs),
            "exp" => Some(Function::Exp),
            "log" => Some(Function::Log),
            "sqrt" => Some(Function::Sqrt),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Function::Min => "min",
            Function::Max => "max",
            Function::Abs => "abs",
            Function::Exp => "exp",
            Function::Log => "log",
            Function::Sqrt => "sqrt",
        }
    }

    fn arity(&self) -> usize {
        match self {
            Function::Min | Function::Max => 2,
            _ => 1,
        }
    }

    fn apply(&self, args: &[FloatValue]) -> FloatValue {
        match self {
            Function::Min => args[0].min(args[1]),
            Function::Max => args[0].max(args[1]),
            Function::Abs => args[0].abs(),
            Function::Exp => args[0].exp(),
            Function::Log => args[0].ln(),
            Function::Sqrt => args[0].sqrt(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// A parsed rate expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(FloatValue),
    Var(String),
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        func: Function,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Parse an expression string into an AST.
    pub fn parse(input: &str) -> Result<Expr, ExprError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.expression()?;
        match parser.peek() {
            None => Ok(expr),
            Some(token) => Err(ExprError::UnexpectedToken(format!("{token:?}"))),
        }
    }

    /// Evaluate against the stock and parameter namespaces.
    ///
    /// Stocks shadow nothing: stock and parameter ids share one namespace and
    /// are required to be disjoint by the schema invariants, so lookup order
    /// is immaterial.
    pub fn eval(
        &self,
        stocks: &HashMap<String, FloatValue>,
        params: &HashMap<String, FloatValue>,
    ) -> Result<FloatValue, ExprError> {
        match self {
            Expr::Number(value) => Ok(*value),
            Expr::Var(name) => stocks
                .get(name)
                .or_else(|| params.get(name))
                .copied()
                .ok_or_else(|| ExprError::UnknownIdentifier(name.clone())),
            Expr::Neg(inner) => Ok(-inner.eval(stocks, params)?),
            Expr::Binary { op, lhs, rhs } => {
                let left = lhs.eval(stocks, params)?;
                let right = rhs.eval(stocks, params)?;
                match op {
                    BinOp::Add => Ok(left + right),
                    BinOp::Sub => Ok(left - right),
                    BinOp::Mul => Ok(left * right),
                    BinOp::Div => {
                        if right == 0.0 {
                            Err(ExprError::DivisionByZero)
                        } else {
                            Ok(left / right)
                        }
                    }
                }
            }
            Expr::Call { func, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(arg.eval(stocks, params)?);
                }
                Ok(func.apply(&values))
            }
        }
    }
}

/// Evaluate a rate expression, degrading every failure to `0.0`.
///
/// This is the fail-soft contract for untrusted rate strings: a malformed or
/// adversarial expression silently contributes nothing rather than raising.
/// A non-finite result (including division by zero) also degrades to `0.0`.
pub fn evaluate(
    expression: &str,
    stocks: &HashMap<String, FloatValue>,
    params: &HashMap<String, FloatValue>,
) -> FloatValue {
    match try_evaluate(expression, stocks, params) {
        Ok(value) => value,
        Err(_) => 0.0,
    }
}

/// Result-returning variant of [`evaluate`] for callers that want the cause.
pub fn try_evaluate(
    expression: &str,
    stocks: &HashMap<String, FloatValue>,
    params: &HashMap<String, FloatValue>,
) -> Result<FloatValue, ExprError> {
    let expr = Expr::parse(expression)?;
    let value = expr.eval(stocks, params)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ExprError::NonFinite)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(FloatValue),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        literal.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                // Optional exponent, e.g. 1e-3
                if let Some(&e) = chars.peek() {
                    if e == 'e' || e == 'E' {
                        let mut lookahead = chars.clone();
                        lookahead.next();
                        let mut suffix = String::from(e);
                        if let Some(&sign) = lookahead.peek() {
                            if sign == '+' || sign == '-' {
                                suffix.push(sign);
                                lookahead.next();
                            }
                        }
                        if lookahead.peek().is_some_and(|d| d.is_ascii_digit()) {
                            while let Some(&d) = lookahead.peek() {
                                if d.is_ascii_digit() {
                                    suffix.push(d);
                                    lookahead.next();
                                } else {
                                    break;
                                }
                            }
                            literal.push_str(&suffix);
                            chars = lookahead;
                        }
                    }
                }
                let value = literal
                    .parse::<FloatValue>()
                    .map_err(|_| ExprError::UnexpectedToken(literal.clone()))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        ident.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => return Err(ExprError::UnexpectedChar(other)),
        }
    }

    Ok(tokens)
}

/// Parsing recurses once per nesting level, so depth must be bounded before
/// the stack is. Plenty for any hand-written or AI-suggested rate.
const MAX_NESTING: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ExprError> {
        match self.next() {
            Some(ref token) if token == expected => Ok(()),
            Some(token) => Err(ExprError::UnexpectedToken(format!("{token:?}"))),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    // expression := term (('+' | '-') term)*
    //
    // Each chained operator deepens the tree by one, so it spends a level of
    // the nesting budget just like a parenthesized group.
    fn expression(&mut self) -> Result<Expr, ExprError> {
        let base = self.depth;
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            if self.depth >= MAX_NESTING {
                return Err(ExprError::TooDeep);
            }
            self.depth += 1;
            self.next();
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        self.depth = base;
        Ok(lhs)
    }

    // term := factor (('*' | '/') factor)*
    fn term(&mut self) -> Result<Expr, ExprError> {
        let base = self.depth;
        let mut lhs = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            if self.depth >= MAX_NESTING {
                return Err(ExprError::TooDeep);
            }
            self.depth += 1;
            self.next();
            let rhs = self.factor()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        self.depth = base;
        Ok(lhs)
    }

    // factor := ('-' | '+') factor | primary
    //
    // Every recursive production passes through here (unary signs,
    // parenthesized groups, call arguments), so this is the one place the
    // nesting bound needs checking.
    fn factor(&mut self) -> Result<Expr, ExprError> {
        if self.depth >= MAX_NESTING {
            return Err(ExprError::TooDeep);
        }
        self.depth += 1;
        let expr = match self.peek() {
            Some(Token::Minus) => {
                self.next();
                self.factor().map(|inner| Expr::Neg(Box::new(inner)))
            }
            Some(Token::Plus) => {
                self.next();
                self.factor()
            }
            _ => self.primary(),
        };
        self.depth -= 1;
        expr
    }

    // primary := number | ident | ident '(' args ')' | '(' expression ')'
    fn primary(&mut self) -> Result<Expr, ExprError> {
        match self.next() {
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::Ident(name)) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    let func = Function::from_name(&name)
                        .ok_or_else(|| ExprError::UnknownFunction(name.clone()))?;
                    self.next();
                    let args = self.arguments()?;
                    if args.len() != func.arity() {
                        return Err(ExprError::WrongArity {
                            name: func.name(),
                            expected: func.arity(),
                            got: args.len(),
                        });
                    }
                    Ok(Expr::Call { func, args })
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Some(Token::LParen) => {
                let inner = self.expression()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(token) => Err(ExprError::UnexpectedToken(format!("{token:?}"))),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ExprError> {
        let mut args = Vec::new();
        if matches!(self.peek(), Some(Token::RParen)) {
            self.next();
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                Some(token) => return Err(ExprError::UnexpectedToken(format!("{token:?}"))),
                None => return Err(ExprError::UnexpectedEnd),
            }
        }
        Ok(args)
    }
}
