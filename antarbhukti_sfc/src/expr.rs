// Guards and actions: lexer and precedence-climbing parser
// producing untyped syntax trees over variable names.

use antarbhukti_core::{BinOp, Integer, UnOp, Val};
use logos::Logos;

/// An expression over variable names, before type inference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Ast {
    Int(Integer),
    Bool(bool),
    Str(String),
    /// A variable, with the offset of its first character.
    Name(String, usize),
    Unary(UnOp, Box<Ast>),
    Binary(BinOp, Box<(Ast, Ast)>),
}

impl Ast {
    /// Variable names in order of appearance.
    pub(crate) fn names<'a>(&'a self, acc: &mut Vec<&'a str>) {
        match self {
            Ast::Int(_) | Ast::Bool(_) | Ast::Str(_) => {}
            Ast::Name(name, _) => acc.push(name),
            Ast::Unary(_, arg) => arg.names(acc),
            Ast::Binary(_, args) => {
                args.0.names(acc);
                args.1.names(acc);
            }
        }
    }
}

/// An assignment `var := expr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AstAssignment {
    pub(crate) var: String,
    pub(crate) offset: usize,
    pub(crate) expr: Ast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorKind {
    Tokenize,
    Expression,
}

/// A failure, with the character offset where it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExprError {
    pub(crate) kind: ErrorKind,
    pub(crate) message: String,
    pub(crate) offset: usize,
}

impl ExprError {
    fn tokenize(message: impl Into<String>, offset: usize) -> Self {
        Self {
            kind: ErrorKind::Tokenize,
            message: message.into(),
            offset,
        }
    }

    fn expression(message: impl Into<String>, offset: usize) -> Self {
        Self {
            kind: ErrorKind::Expression,
            message: message.into(),
            offset,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum LexError {
    #[default]
    Unexpected,
    Number,
}

#[derive(Logos, Debug, Clone, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(error = LexError)]
enum Token {
    #[regex(r"[0-9][0-9A-Za-z_]*", |lex| lex.slice().parse::<Integer>().map_err(|_| LexError::Number))]
    Int(Integer),
    #[regex(r#""[^"\n]*""#, unquote)]
    #[regex(r"'[^'\n]*'", unquote)]
    Str(String),
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_owned())]
    Name(String),
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("!")]
    Not,
    #[token("=", |_| BinOp::Eq)]
    #[token("==", |_| BinOp::Eq)]
    #[token("<>", |_| BinOp::Ne)]
    #[token("!=", |_| BinOp::Ne)]
    #[token("<", |_| BinOp::Lt)]
    #[token("<=", |_| BinOp::Le)]
    #[token(">", |_| BinOp::Gt)]
    #[token(">=", |_| BinOp::Ge)]
    #[token("&&", |_| BinOp::And)]
    #[token("||", |_| BinOp::Or)]
    #[token("+", |_| BinOp::Add)]
    #[token("*", |_| BinOp::Mul)]
    #[token("/", |_| BinOp::Div)]
    #[token("%", |_| BinOp::Mod)]
    Bin(BinOp),
    #[token("-")]
    Minus,
    #[token(":=")]
    Assign,
    #[token(";")]
    Semicolon,
    #[token("(")]
    Open,
    #[token(")")]
    Close,
}

fn unquote(lex: &mut logos::Lexer<Token>) -> String {
    let slice = lex.slice();
    slice[1..slice.len() - 1].to_owned()
}

// Keywords are case-insensitive.
fn keyword(word: &str) -> Option<Token> {
    match word.to_ascii_lowercase().as_str() {
        "true" => Some(Token::True),
        "false" => Some(Token::False),
        "not" => Some(Token::Not),
        "and" => Some(Token::Bin(BinOp::And)),
        "or" => Some(Token::Bin(BinOp::Or)),
        "xor" => Some(Token::Bin(BinOp::Xor)),
        "mod" => Some(Token::Bin(BinOp::Mod)),
        _ => None,
    }
}

// Tokens with the character offset where they start.
fn tokenize(text: &str) -> Result<Vec<(Token, usize)>, ExprError> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(text);
    while let Some(token) = lexer.next() {
        let span = lexer.span();
        let offset = text[..span.start].chars().count();
        let token = match token {
            Ok(Token::Name(word)) => keyword(&word).unwrap_or(Token::Name(word)),
            Ok(token) => token,
            Err(LexError::Number) => {
                return Err(ExprError::tokenize(
                    format!("malformed or too large integer '{}'", lexer.slice()),
                    offset,
                ));
            }
            Err(LexError::Unexpected) => {
                let slice = lexer.slice();
                let message = if slice.starts_with(['"', '\'']) {
                    "unterminated string".to_owned()
                } else {
                    format!("unexpected character '{slice}'")
                };
                return Err(ExprError::tokenize(message, offset));
            }
        };
        tokens.push((token, offset));
    }
    Ok(tokens)
}

// Binding power of binary operators: higher binds tighter.
fn precedence(op: BinOp) -> u8 {
    match op {
        BinOp::Or => 1,
        BinOp::Xor => 2,
        BinOp::And => 3,
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => COMPARISON,
        BinOp::Add | BinOp::Sub => 6,
        BinOp::Mul | BinOp::Div | BinOp::Mod => 7,
    }
}

const COMPARISON: u8 = 5;

// `not` sits between the boolean connectives and the comparisons.
const NOT_PRECEDENCE: u8 = 4;

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn new(text: &str) -> Result<Self, ExprError> {
        Ok(Self {
            tokens: tokenize(text)?,
            pos: 0,
            end: text.chars().count(),
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(_, offset)| *offset)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn binary_op(&self) -> Option<BinOp> {
        match self.peek()? {
            Token::Bin(op) => Some(*op),
            Token::Minus => Some(BinOp::Sub),
            _ => None,
        }
    }

    fn expr(&mut self, min: u8) -> Result<Ast, ExprError> {
        let mut lhs = self.prefix()?;
        let mut compared = false;
        while let Some(op) = self.binary_op() {
            let prec = precedence(op);
            if prec < min {
                break;
            }
            let offset = self.offset();
            if prec == COMPARISON && compared {
                return Err(ExprError::expression("comparisons cannot be chained", offset));
            }
            compared = prec == COMPARISON;
            self.pos += 1;
            let rhs = self.expr(prec + 1)?;
            lhs = Ast::Binary(op, Box::new((lhs, rhs)));
        }
        Ok(lhs)
    }

    fn prefix(&mut self) -> Result<Ast, ExprError> {
        let offset = self.offset();
        let Some(token) = self.peek().cloned() else {
            return Err(ExprError::expression("expected an operand", offset));
        };
        self.pos += 1;
        match token {
            Token::Int(value) => Ok(Ast::Int(value)),
            Token::Str(text) => Ok(Ast::Str(text)),
            Token::True => Ok(Ast::Bool(true)),
            Token::False => Ok(Ast::Bool(false)),
            Token::Name(name) => Ok(Ast::Name(name, offset)),
            Token::Minus => {
                let arg = self.expr(precedence(BinOp::Mul) + 1)?;
                Ok(match arg {
                    Ast::Int(value) => Ast::Int(-value),
                    arg => Ast::Unary(UnOp::Neg, Box::new(arg)),
                })
            }
            Token::Not => Ok(Ast::Unary(UnOp::Not, Box::new(self.expr(NOT_PRECEDENCE)?))),
            Token::Open => {
                let inner = self.expr(0)?;
                match self.peek() {
                    Some(Token::Close) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err(ExprError::expression("expected ')'", self.offset())),
                }
            }
            _ => Err(ExprError::expression("expected an operand", offset)),
        }
    }

    fn finish(&self) -> Result<(), ExprError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(ExprError::expression("unexpected token", self.offset()))
        }
    }
}

/// Parses a guard; blank text stands for `None` (always true).
pub(crate) fn parse_guard(text: &str) -> Result<Option<Ast>, ExprError> {
    let mut parser = Parser::new(text)?;
    if parser.at_end() {
        return Ok(None);
    }
    let guard = parser.expr(0)?;
    parser.finish()?;
    Ok(Some(guard))
}

/// Parses a literal, possibly negative.
pub(crate) fn parse_literal(text: &str) -> Result<Val, ExprError> {
    let mut parser = Parser::new(text)?;
    let literal = parser.prefix()?;
    parser.finish()?;
    match literal {
        Ast::Int(value) => Ok(Val::Integer(value)),
        Ast::Bool(value) => Ok(Val::Boolean(value)),
        Ast::Str(value) => Ok(Val::String(value)),
        _ => Err(ExprError::expression("expected a literal", 0)),
    }
}

/// Parses an action: assignments separated by `;`.
pub(crate) fn parse_action(text: &str) -> Result<Vec<AstAssignment>, ExprError> {
    let mut parser = Parser::new(text)?;
    let mut action = Vec::new();
    while !parser.at_end() {
        if parser.peek() == Some(&Token::Semicolon) {
            parser.pos += 1;
            continue;
        }
        let offset = parser.offset();
        let Some(Token::Name(var)) = parser.peek().cloned() else {
            return Err(ExprError::expression("expected a variable to assign", offset));
        };
        parser.pos += 1;
        if parser.peek() != Some(&Token::Assign) {
            return Err(ExprError::expression("expected ':='", parser.offset()));
        }
        parser.pos += 1;
        let expr = parser.expr(0)?;
        action.push(AstAssignment { var, offset, expr });
        match parser.peek() {
            None | Some(Token::Semicolon) => {}
            Some(_) => {
                return Err(ExprError::expression("expected ';'", parser.offset()));
            }
        }
    }
    Ok(action)
}
