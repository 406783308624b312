//! Formula tokenizer
//!
//! Converts formula strings like `and({age} > 18, gender == "Female")` into a
//! sequence of positioned tokens for the parser.

use crate::error::{FormulaError, FormulaResult};
use std::iter::Peekable;
use std::str::Chars;

/// A token in a formula expression
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A numeric literal (e.g., 123, 45.67, 1.5e10)
    Number(f64),
    /// A string literal (e.g., "hello" or 'world')
    Text(String),
    /// A bare identifier: function name, literal keyword, or dotted reference path
    Identifier(String),
    /// The inside of a braced reference: `{products.0.price}` gives `products.0.price`
    Reference(String),
    /// Operators: + - * / == = != <> < > <= >= && || !
    Operator(String),
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    Comma,
    /// Lambda arrow, `->` or `→`
    Arrow,
}

/// A token with the character offset where it starts
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

/// Tokenizer for formula expressions
pub struct Tokenizer<'a> {
    chars: Peekable<Chars<'a>>,
    position: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(formula: &'a str) -> Self {
        Self {
            chars: formula.chars().peekable(),
            position: 0,
        }
    }

    /// Tokenize the entire formula
    pub fn tokenize(mut self) -> FormulaResult<Vec<Spanned>> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();
            let position = self.position;
            match self.next_token()? {
                Some(token) => tokens.push(Spanned { token, position }),
                None => break,
            }
        }

        Ok(tokens)
    }

    fn next_token(&mut self) -> FormulaResult<Option<Token>> {
        let c = match self.peek() {
            None => return Ok(None),
            Some(c) => c,
        };

        let token = match c {
            '"' | '\'' => self.read_string(c)?,
            '{' => self.read_reference()?,

            '(' => self.single(Token::OpenParen),
            ')' => self.single(Token::CloseParen),
            '[' => self.single(Token::OpenBracket),
            ']' => self.single(Token::CloseBracket),
            ',' => self.single(Token::Comma),
            '→' => self.single(Token::Arrow),

            '+' | '*' | '/' => self.single(Token::Operator(c.to_string())),

            '-' => {
                self.advance();
                if self.advance_if('>') {
                    Token::Arrow
                } else {
                    Token::Operator("-".to_string())
                }
            }

            '=' => self.operator_with_suffix('=', &[('=', "==")]),
            '!' => self.operator_with_suffix('!', &[('=', "!=")]),
            '<' => self.operator_with_suffix('<', &[('=', "<="), ('>', "<>")]),
            '>' => self.operator_with_suffix('>', &[('=', ">=")]),
            '&' | '|' => self.read_doubled_operator(c)?,

            c if c.is_ascii_digit() => self.read_number()?,

            c if c.is_alphabetic() || c == '_' => self.read_identifier(),

            c => {
                return Err(FormulaError::parse(
                    format!("Unexpected character: '{}'", c),
                    self.position,
                ));
            }
        };

        Ok(Some(token))
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c.is_some() {
            self.position += 1;
        }
        c
    }

    /// Consume the next character if it is `expected`
    fn advance_if(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn single(&mut self, token: Token) -> Token {
        self.advance();
        token
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Push characters onto `buf` while `pred` holds
    fn take_while(&mut self, buf: &mut String, pred: impl Fn(char) -> bool) {
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            buf.push(c);
            self.advance();
        }
    }

    /// Read a one-char operator that may extend into a two-char one
    fn operator_with_suffix(&mut self, first: char, longer: &[(char, &str)]) -> Token {
        self.advance();
        for (next, op) in longer {
            if self.advance_if(*next) {
                return Token::Operator(op.to_string());
            }
        }
        Token::Operator(first.to_string())
    }

    /// `&&` and `||`; a lone `&` or `|` is an error
    fn read_doubled_operator(&mut self, c: char) -> FormulaResult<Token> {
        let start_pos = self.position;
        self.advance();
        if self.advance_if(c) {
            Ok(Token::Operator(format!("{}{}", c, c)))
        } else {
            Err(FormulaError::parse(
                format!("Expected '{}{}'", c, c),
                start_pos,
            ))
        }
    }

    /// Read a string literal. A doubled quote or a backslash escapes the quote.
    fn read_string(&mut self, quote: char) -> FormulaResult<Token> {
        let start_pos = self.position;
        self.advance();
        let mut value = String::new();

        loop {
            match self.advance() {
                None => {
                    return Err(FormulaError::parse(
                        "Unterminated string literal",
                        start_pos,
                    ));
                }
                Some(c) if c == quote => {
                    if self.advance_if(quote) {
                        value.push(quote);
                    } else {
                        break;
                    }
                }
                Some('\\') => match self.advance() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some(c) => value.push(c),
                    None => {
                        return Err(FormulaError::parse(
                            "Unterminated string literal",
                            start_pos,
                        ));
                    }
                },
                Some(c) => value.push(c),
            }
        }

        Ok(Token::Text(value))
    }

    /// Read `{path}` into a reference token
    fn read_reference(&mut self) -> FormulaResult<Token> {
        let start_pos = self.position;
        self.advance();
        let mut path = String::new();
        self.take_while(&mut path, |c| c != '}' && c != '{');

        if !self.advance_if('}') {
            return Err(FormulaError::parse("Unterminated reference", start_pos));
        }
        let path = path.trim();
        if path.is_empty() {
            return Err(FormulaError::parse("Empty reference", start_pos));
        }
        Ok(Token::Reference(path.to_string()))
    }

    /// Read a number (integer, decimal, or scientific notation)
    fn read_number(&mut self) -> FormulaResult<Token> {
        let start_pos = self.position;
        let mut num_str = String::new();

        // Dots are taken greedily so `1.2.3` fails instead of splitting
        self.take_while(&mut num_str, |c| c.is_ascii_digit() || c == '.');

        if matches!(self.peek(), Some('e') | Some('E')) {
            num_str.push('e');
            self.advance();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                num_str.push(sign);
                self.advance();
            }
            self.take_while(&mut num_str, |c| c.is_ascii_digit());
        }

        num_str
            .parse::<f64>()
            .map(Token::Number)
            .map_err(|_| FormulaError::parse(format!("Invalid number: {}", num_str), start_pos))
    }

    /// Read an identifier; dots and digits continue it (`products.0.price`)
    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();
        self.take_while(&mut ident, |c| c.is_alphanumeric() || c == '_' || c == '.');
        Token::Identifier(ident)
    }
}

/// Convenience function to tokenize a formula string
pub fn tokenize(formula: &str) -> FormulaResult<Vec<Spanned>> {
    Tokenizer::new(formula).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tokens(formula: &str) -> Vec<Token> {
        tokenize(formula)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    fn op(s: &str) -> Token {
        Token::Operator(s.to_string())
    }

    fn ident(s: &str) -> Token {
        Token::Identifier(s.to_string())
    }

    #[test]
    fn test_tokenize_numbers() {
        assert_eq!(tokens("42"), vec![Token::Number(42.0)]);
        assert_eq!(tokens("3.567"), vec![Token::Number(3.567)]);
        assert_eq!(tokens("1.5e10"), vec![Token::Number(1.5e10)]);
        assert_eq!(tokens("2E-5"), vec![Token::Number(2e-5)]);
    }

    #[test]
    fn test_tokenize_strings() {
        assert_eq!(tokens("\"hello world\""), vec![Token::Text("hello world".into())]);
        assert_eq!(tokens("'hello'"), vec![Token::Text("hello".into())]);
        assert_eq!(
            tokens("\"say \"\"hi\"\"\""),
            vec![Token::Text("say \"hi\"".into())]
        );
        assert_eq!(tokens(r#""a\"b""#), vec![Token::Text("a\"b".into())]);
    }

    #[test]
    fn test_tokenize_braced_reference() {
        assert_eq!(
            tokens("{products.0.price} * 2"),
            vec![
                Token::Reference("products.0.price".into()),
                op("*"),
                Token::Number(2.0),
            ]
        );
        assert_eq!(tokens("{ age }"), vec![Token::Reference("age".into())]);
    }

    #[test]
    fn test_tokenize_dotted_identifier() {
        assert_eq!(tokens("products.price"), vec![ident("products.price")]);
    }

    #[test]
    fn test_tokenize_comparison_and_logical_operators() {
        assert_eq!(
            tokens("a == b = c != d <> e <= f >= g < h > i && j || !k"),
            vec![
                ident("a"),
                op("=="),
                ident("b"),
                op("="),
                ident("c"),
                op("!="),
                ident("d"),
                op("<>"),
                ident("e"),
                op("<="),
                ident("f"),
                op(">="),
                ident("g"),
                op("<"),
                ident("h"),
                op(">"),
                ident("i"),
                op("&&"),
                ident("j"),
                op("||"),
                op("!"),
                ident("k"),
            ]
        );
    }

    #[test]
    fn test_tokenize_lambda() {
        assert_eq!(
            tokens("map(items, (x, i) -> x * i)"),
            vec![
                ident("map"),
                Token::OpenParen,
                ident("items"),
                Token::Comma,
                Token::OpenParen,
                ident("x"),
                Token::Comma,
                ident("i"),
                Token::CloseParen,
                Token::Arrow,
                ident("x"),
                op("*"),
                ident("i"),
                Token::CloseParen,
            ]
        );
        assert_eq!(tokens("(x) → x"), tokens("(x) -> x"));
    }

    #[test]
    fn test_tokenize_minus_is_operator() {
        assert_eq!(tokens("-5"), vec![op("-"), Token::Number(5.0)]);
    }

    #[test]
    fn test_tokenize_positions() {
        let spanned = tokenize("a  + 12").unwrap();
        let positions: Vec<usize> = spanned.iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![0, 3, 5]);
    }

    #[test]
    fn test_tokenize_empty_and_whitespace() {
        assert_eq!(tokens(""), vec![]);
        assert_eq!(tokens("   "), vec![]);
    }

    #[test]
    fn test_tokenize_error_invalid_number() {
        let err = tokenize("1.2.3").unwrap_err();
        assert!(matches!(err, FormulaError::Parse { position: 0, .. }));
    }

    #[test]
    fn test_tokenize_error_unexpected_chars() {
        for input in ["@", "#", "$", "a & b"] {
            assert!(tokenize(input).is_err(), "expected error for {}", input);
        }
    }

    #[test]
    fn test_tokenize_error_unterminated() {
        match tokenize("\"hello").unwrap_err() {
            FormulaError::Parse { message, .. } => assert!(message.contains("Unterminated")),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(tokenize("{age").is_err());
        assert!(tokenize("{}").is_err());
    }
}
