//! Tokenizer and recursive-descent parser for the expression grammar.
//!
//! The tokenizer only produces tokens for the allowed forms; any other
//! character is an immediate error, so disallowed syntax can never reach
//! the parser. Grammar, loosest to tightest binding:
//!
//! ```text
//! expr  := term (('+' | '-') term)*
//! term  := unary (('*' | '/' | '//' | '%') unary)*
//! unary := ('+' | '-') unary | power
//! power := atom ('**' unary)?          -- right-associative
//! atom  := NUMBER | NAME | '(' expr ')'
//! ```

use super::{BinOp, ExprError, Node, UnaryOp};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Name(String),
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Num(n) => format!("number {}", n),
            Token::Name(n) => format!("name '{}'", n),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::StarStar => "'**'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::SlashSlash => "'//'".to_string(),
            Token::Percent => "'%'".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
        }
    }
}

pub(super) fn parse(text: &str) -> Result<Node, ExprError> {
    let err = |message: String| ExprError {
        expr: text.to_string(),
        message,
    };

    let tokens = tokenize(text).map_err(&err)?;
    if tokens.is_empty() {
        return Err(err("empty expression".to_string()));
    }

    let mut parser = Parser { tokens, pos: 0 };
    let node = parser.expr().map_err(&err)?;
    if let Some(extra) = parser.peek() {
        return Err(err(format!("unexpected {} after expression", extra.describe())));
    }
    Ok(node)
}

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    tokens.push(Token::StarStar);
                    i += 2;
                } else {
                    tokens.push(Token::Star);
                    i += 1;
                }
            }
            '/' => {
                if chars.get(i + 1) == Some(&'/') {
                    tokens.push(Token::SlashSlash);
                    i += 2;
                } else {
                    tokens.push(Token::Slash);
                    i += 1;
                }
            }
            '0'..='9' | '.' => {
                let (num, next) = scan_number(&chars, i)?;
                tokens.push(Token::Num(num));
                i = next;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
            }
            other => return Err(format!("character '{}' is not allowed", other)),
        }
    }

    Ok(tokens)
}

/// Scans a numeric literal: digits, optional fraction, optional exponent.
fn scan_number(chars: &[char], start: usize) -> Result<(f64, usize), String> {
    let mut i = start;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i < chars.len() && chars[i] == '.' {
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
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

    let literal: String = chars[start..i].iter().collect();
    literal
        .parse::<f64>()
        .map(|n| (n, i))
        .map_err(|_| format!("malformed number '{}'", literal))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expr(&mut self) -> Result<Node, String> {
        let mut node = self.term()?;
        while let Some(op) = match self.peek() {
            Some(Token::Plus) => Some(BinOp::Add),
            Some(Token::Minus) => Some(BinOp::Sub),
            _ => None,
        } {
            self.pos += 1;
            let rhs = self.term()?;
            node = Node::Binary(op, Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn term(&mut self) -> Result<Node, String> {
        let mut node = self.unary()?;
        while let Some(op) = match self.peek() {
            Some(Token::Star) => Some(BinOp::Mul),
            Some(Token::Slash) => Some(BinOp::Div),
            Some(Token::SlashSlash) => Some(BinOp::FloorDiv),
            Some(Token::Percent) => Some(BinOp::Mod),
            _ => None,
        } {
            self.pos += 1;
            let rhs = self.unary()?;
            node = Node::Binary(op, Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn unary(&mut self) -> Result<Node, String> {
        match self.peek() {
            Some(Token::Plus) => {
                self.pos += 1;
                Ok(Node::Unary(UnaryOp::Pos, Box::new(self.unary()?)))
            }
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Node::Unary(UnaryOp::Neg, Box::new(self.unary()?)))
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Node, String> {
        let base = self.atom()?;
        if self.peek() == Some(&Token::StarStar) {
            self.pos += 1;
            // The exponent is a unary expression, so `2 ** -1` parses and
            // the operator associates to the right.
            let exponent = self.unary()?;
            return Ok(Node::Binary(
                BinOp::Pow,
                Box::new(base),
                Box::new(exponent),
            ));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Node, String> {
        match self.advance() {
            Some(Token::Num(n)) => Ok(Node::Num(n)),
            Some(Token::Name(name)) => Ok(Node::Var(name)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    Some(tok) => Err(format!("expected ')', found {}", tok.describe())),
                    None => Err("missing closing ')'".to_string()),
                }
            }
            Some(tok) => Err(format!("unexpected {}", tok.describe())),
            None => Err("expression ended unexpectedly".to_string()),
        }
    }
}
