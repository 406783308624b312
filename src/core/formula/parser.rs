//! Formula parser
//!
//! Converts a token sequence into an Abstract Syntax Tree (AST) by recursive
//! descent. Parsing is all-or-nothing: either a complete tree or a
//! `FormulaError::Parse` with the character offset of the offending token.

use super::tokenizer::{tokenize, Spanned, Token};
use crate::error::{FormulaError, FormulaResult};
use crate::types::Value;
use std::fmt;

/// Default nesting limit when none is configured
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Maximum number of lambda parameters (accumulator, item, index)
const MAX_CLOSURE_PARAMS: usize = 3;

/// One step of a reference path after the root field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Row or element index
    Index(usize),
    /// Column or object key
    Key(String),
}

/// `{field}`, `{field.index}`, `{field.index.column}` or `{field.column}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferencePath {
    pub root: String,
    pub segments: Vec<PathSegment>,
}

impl ReferencePath {
    /// A reference to a whole field
    pub fn field(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            segments: Vec::new(),
        }
    }

    /// Parse dotted path text such as `products.0.price`
    pub fn parse(text: &str) -> FormulaResult<Self> {
        parse_path(text, 0)
    }
}

impl fmt::Display for ReferencePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for segment in &self.segments {
            match segment {
                PathSegment::Index(i) => write!(f, ".{}", i)?,
                PathSegment::Key(k) => write!(f, ".{}", k)?,
            }
        }
        Ok(())
    }
}

fn parse_path(text: &str, position: usize) -> FormulaResult<ReferencePath> {
    let mut parts = text.split('.').map(str::trim);
    let root = match parts.next() {
        Some(root) if !root.is_empty() && !root.chars().all(|c| c.is_ascii_digit()) => root,
        _ => {
            return Err(FormulaError::parse(
                format!("Invalid reference: {}", text),
                position,
            ))
        }
    };

    let mut segments = Vec::new();
    for part in parts {
        if part.is_empty() {
            return Err(FormulaError::parse(
                format!("Empty path component in reference: {}", text),
                position,
            ));
        }
        let segment = match part.parse::<usize>() {
            Ok(index) if part.chars().all(|c| c.is_ascii_digit()) => PathSegment::Index(index),
            _ => PathSegment::Key(part.to_string()),
        };
        segments.push(segment);
    }

    Ok(ReferencePath {
        root: root.to_string(),
        segments,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    And,
    Or,
}

impl InfixOp {
    fn from_symbol(symbol: &str) -> Option<Self> {
        let op = match symbol {
            "+" => InfixOp::Add,
            "-" => InfixOp::Sub,
            "*" => InfixOp::Mul,
            "/" => InfixOp::Div,
            "==" | "=" => InfixOp::Eq,
            "!=" | "<>" => InfixOp::NotEq,
            "<" => InfixOp::Lt,
            ">" => InfixOp::Gt,
            "<=" => InfixOp::LtEq,
            ">=" => InfixOp::GtEq,
            "&&" => InfixOp::And,
            "||" => InfixOp::Or,
            _ => return None,
        };
        Some(op)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            InfixOp::Add => "+",
            InfixOp::Sub => "-",
            InfixOp::Mul => "*",
            InfixOp::Div => "/",
            InfixOp::Eq => "==",
            InfixOp::NotEq => "!=",
            InfixOp::Lt => "<",
            InfixOp::Gt => ">",
            InfixOp::LtEq => "<=",
            InfixOp::GtEq => ">=",
            InfixOp::And => "&&",
            InfixOp::Or => "||",
        }
    }
}

/// Abstract Syntax Tree node for formula expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Number, string, boolean or null literal
    Literal(Value),
    /// A field reference, or a closure parameter with an optional path
    Reference(ReferencePath),
    Prefix {
        op: PrefixOp,
        operand: Box<Expr>,
    },
    Infix {
        op: InfixOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Function call: name(arg1, arg2, ...). Names are matched case-insensitively.
    FunctionCall { name: String, args: Vec<Expr> },
    /// Array literal: [a, b, c]
    Array(Vec<Expr>),
    /// Postfix indexing: expr[index]
    Index { target: Box<Expr>, index: Box<Expr> },
    /// Lambda `(item, index) -> body`, only valid as a function argument
    Closure { params: Vec<String>, body: Box<Expr> },
}

impl Expr {
    pub fn number(n: f64) -> Self {
        Expr::Literal(Value::Number(n))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Expr::Literal(Value::String(s.into()))
    }

    pub fn reference(root: impl Into<String>) -> Self {
        Expr::Reference(ReferencePath::field(root))
    }
}

/// Parser for formula tokens
pub struct Parser {
    tokens: Vec<Spanned>,
    position: usize,
    /// Character offset just past the input, reported for errors at end
    end: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>, end: usize) -> Self {
        Self {
            tokens,
            position: 0,
            end,
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Parse the tokens into an AST
    pub fn parse(mut self) -> FormulaResult<Expr> {
        if self.tokens.is_empty() {
            return Err(FormulaError::parse("Empty expression", 0));
        }
        let expr = self.expression()?;

        if let Some(token) = self.peek() {
            return Err(FormulaError::parse(
                format!("Unexpected token after expression: {:?}", token),
                self.current_position(),
            ));
        }

        Ok(expr)
    }

    fn peek(&self) -> Option<&Token> {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.position + offset).map(|s| &s.token)
    }

    fn current_position(&self) -> usize {
        self.tokens
            .get(self.position)
            .map(|s| s.position)
            .unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).map(|s| s.token.clone());
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn check(&self, expected: &Token) -> bool {
        self.peek() == Some(expected)
    }

    fn match_token(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, message: &str) -> FormulaResult<()> {
        if self.match_token(expected) {
            Ok(())
        } else {
            Err(FormulaError::parse(message, self.current_position()))
        }
    }

    fn match_operator(&mut self, op: &str) -> bool {
        if let Some(Token::Operator(s)) = self.peek() {
            if s == op {
                self.position += 1;
                return true;
            }
        }
        false
    }

    fn match_any_operator(&mut self, ops: &[&str]) -> Option<InfixOp> {
        if let Some(Token::Operator(s)) = self.peek() {
            if ops.contains(&s.as_str()) {
                let op = InfixOp::from_symbol(s);
                self.position += 1;
                return op;
            }
        }
        None
    }

    /// Run `f` one nesting level deeper, failing past `max_depth`
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> FormulaResult<T>) -> FormulaResult<T> {
        if self.depth >= self.max_depth {
            return Err(FormulaError::parse(
                format!("Expression nested deeper than {} levels", self.max_depth),
                self.current_position(),
            ));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Left-associative binary level: next (op next)*
    fn binary(
        &mut self,
        ops: &[&str],
        next: fn(&mut Self) -> FormulaResult<Expr>,
    ) -> FormulaResult<Expr> {
        let mut left = next(self)?;

        while let Some(op) = self.match_any_operator(ops) {
            let right = next(self)?;
            left = Expr::Infix {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Expression: or
    fn expression(&mut self) -> FormulaResult<Expr> {
        self.nested(Self::or)
    }

    /// Or: and ( "||" and )*
    fn or(&mut self) -> FormulaResult<Expr> {
        self.binary(&["||"], Self::and)
    }

    /// And: equality ( "&&" equality )*
    fn and(&mut self) -> FormulaResult<Expr> {
        self.binary(&["&&"], Self::equality)
    }

    /// Equality: comparison (( "==" | "=" | "!=" | "<>" ) comparison)*
    fn equality(&mut self) -> FormulaResult<Expr> {
        self.binary(&["==", "=", "!=", "<>"], Self::comparison)
    }

    /// Comparison: term (( "<" | ">" | "<=" | ">=" ) term)*
    fn comparison(&mut self) -> FormulaResult<Expr> {
        self.binary(&["<", ">", "<=", ">="], Self::term)
    }

    /// Term: factor (( "+" | "-" ) factor)*
    fn term(&mut self) -> FormulaResult<Expr> {
        self.binary(&["+", "-"], Self::factor)
    }

    /// Factor: unary (( "*" | "/" ) unary)*
    fn factor(&mut self) -> FormulaResult<Expr> {
        self.binary(&["*", "/"], Self::unary)
    }

    /// Unary: ( "-" | "!" ) unary | postfix
    fn unary(&mut self) -> FormulaResult<Expr> {
        let op = if self.match_operator("-") {
            PrefixOp::Neg
        } else if self.match_operator("!") {
            PrefixOp::Not
        } else {
            return self.postfix();
        };

        let operand = self.nested(Self::unary)?;
        Ok(Expr::Prefix {
            op,
            operand: Box::new(operand),
        })
    }

    /// Postfix: primary ( "[" expr "]" )*
    fn postfix(&mut self) -> FormulaResult<Expr> {
        let mut expr = self.primary()?;

        while self.match_token(&Token::OpenBracket) {
            let index = self.expression()?;
            self.expect(&Token::CloseBracket, "Expected ']' after index")?;
            expr = Expr::Index {
                target: Box::new(expr),
                index: Box::new(index),
            };
        }

        Ok(expr)
    }

    /// Primary: NUMBER | STRING | REFERENCE | IDENTIFIER | call | array | "(" expr ")"
    fn primary(&mut self) -> FormulaResult<Expr> {
        let position = self.current_position();

        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::number(n)),
            Some(Token::Text(s)) => Ok(Expr::string(s)),
            Some(Token::Reference(path)) => Ok(Expr::Reference(parse_path(&path, position)?)),
            Some(Token::Identifier(name)) => {
                if self.match_token(&Token::OpenParen) {
                    return self.function_call(name, position);
                }
                Ok(match name.to_lowercase().as_str() {
                    "true" => Expr::Literal(Value::Boolean(true)),
                    "false" => Expr::Literal(Value::Boolean(false)),
                    "null" => Expr::Literal(Value::Null),
                    _ => Expr::Reference(parse_path(&name, position)?),
                })
            }
            Some(Token::OpenBracket) => self.array_literal(),
            Some(Token::OpenParen) => {
                let expr = self.expression()?;
                self.expect(&Token::CloseParen, "Expected ')' after expression")?;
                Ok(expr)
            }
            Some(token) => Err(FormulaError::parse(
                format!("Unexpected token: {:?}", token),
                position,
            )),
            None => Err(FormulaError::parse(
                "Unexpected end of expression",
                position,
            )),
        }
    }

    /// Call: NAME "(" ( argument ( "," argument )* )? ")"
    fn function_call(&mut self, name: String, position: usize) -> FormulaResult<Expr> {
        if name.contains('.') {
            return Err(FormulaError::parse(
                format!("Invalid function name: {}", name),
                position,
            ));
        }

        let mut args = Vec::new();
        if !self.check(&Token::CloseParen) {
            args.push(self.argument()?);
            while self.match_token(&Token::Comma) {
                args.push(self.argument()?);
            }
        }
        self.expect(&Token::CloseParen, "Expected ')' after function arguments")?;

        Ok(Expr::FunctionCall { name, args })
    }

    /// Array: "[" ( expr ( "," expr )* )? "]"
    fn array_literal(&mut self) -> FormulaResult<Expr> {
        let mut items = Vec::new();
        if !self.check(&Token::CloseBracket) {
            items.push(self.expression()?);
            while self.match_token(&Token::Comma) {
                if self.check(&Token::CloseBracket) {
                    return Err(FormulaError::parse(
                        "Trailing comma in array literal",
                        self.current_position(),
                    ));
                }
                items.push(self.expression()?);
            }
        }
        self.expect(&Token::CloseBracket, "Expected ']' after array items")?;

        Ok(Expr::Array(items))
    }

    /// Argument: closure | expr
    fn argument(&mut self) -> FormulaResult<Expr> {
        if self.closure_ahead() {
            self.nested(Self::closure)
        } else {
            self.expression()
        }
    }

    /// True when the upcoming tokens read `ident ->` or `( ident, ... ) ->`
    fn closure_ahead(&self) -> bool {
        match self.peek() {
            Some(Token::Identifier(_)) => matches!(self.peek_at(1), Some(Token::Arrow)),
            Some(Token::OpenParen) => {
                let mut offset = 1;
                loop {
                    if !matches!(self.peek_at(offset), Some(Token::Identifier(_))) {
                        return false;
                    }
                    match self.peek_at(offset + 1) {
                        Some(Token::Comma) => offset += 2,
                        Some(Token::CloseParen) => {
                            return matches!(self.peek_at(offset + 2), Some(Token::Arrow))
                        }
                        _ => return false,
                    }
                }
            }
            _ => false,
        }
    }

    /// Closure: ( IDENT | "(" IDENT ( "," IDENT )* ")" ) "->" expr
    fn closure(&mut self) -> FormulaResult<Expr> {
        let start = self.current_position();
        let mut params = Vec::new();

        if self.match_token(&Token::OpenParen) {
            loop {
                params.push(self.closure_param()?);
                if !self.match_token(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::CloseParen, "Expected ')' after lambda parameters")?;
        } else {
            params.push(self.closure_param()?);
        }

        self.expect(&Token::Arrow, "Expected '->' after lambda parameters")?;

        if params.len() > MAX_CLOSURE_PARAMS {
            return Err(FormulaError::parse(
                format!("Lambda takes at most {} parameters", MAX_CLOSURE_PARAMS),
                start,
            ));
        }

        let body = self.expression()?;
        Ok(Expr::Closure {
            params,
            body: Box::new(body),
        })
    }

    fn closure_param(&mut self) -> FormulaResult<String> {
        let position = self.current_position();
        match self.advance() {
            Some(Token::Identifier(name)) if !name.contains('.') => Ok(name),
            _ => Err(FormulaError::parse("Invalid lambda parameter", position)),
        }
    }
}

/// Tokenize and parse a formula with the default nesting limit
pub fn parse(formula: &str) -> FormulaResult<Expr> {
    parse_with_depth(formula, DEFAULT_MAX_DEPTH)
}

/// Tokenize and parse a formula, rejecting nesting deeper than `max_depth`
pub fn parse_with_depth(formula: &str, max_depth: usize) -> FormulaResult<Expr> {
    let tokens = tokenize(formula)?;
    Parser::new(tokens, formula.chars().count())
        .with_max_depth(max_depth)
        .parse()
}
