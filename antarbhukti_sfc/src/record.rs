// Reader for the record file layout: `name = value` tables
// whose values are (nested) lists and dictionaries of quoted strings.

use crate::error::{Location, ParseError};
use logos::Logos;

/// The shape of a [`Value`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    /// A quoted string.
    Str(String),
    /// `[item, ...]`
    List(Vec<Value>),
    /// `{"key": value, ...}`, in order.
    Dict(Vec<(Spanned, Value)>),
}

/// A value of a record table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    /// What the value is.
    pub kind: ValueKind,
    /// Where the value starts.
    /// Expression errors inside a string are located relative to
    /// this location, which is that of the opening quote.
    pub location: Location,
}

impl Value {
    /// A string value.
    pub fn str(text: impl Into<String>, location: Location) -> Self {
        Self {
            kind: ValueKind::Str(text.into()),
            location,
        }
    }

    /// A dictionary of string fields.
    pub fn dict<'a>(
        fields: impl IntoIterator<Item = (&'a str, Value)>,
        location: Location,
    ) -> Self {
        let entries = fields
            .into_iter()
            .map(|(key, value)| {
                let key = Spanned {
                    text: key.to_owned(),
                    location: value.location,
                };
                (key, value)
            })
            .collect();
        Self {
            kind: ValueKind::Dict(entries),
            location,
        }
    }

    pub(crate) fn describe(&self) -> &'static str {
        match self.kind {
            ValueKind::Str(_) => "a string",
            ValueKind::List(_) => "a list",
            ValueKind::Dict(_) => "a dictionary",
        }
    }

    pub(crate) fn as_str(&self) -> Result<Spanned, ParseError> {
        match &self.kind {
            ValueKind::Str(text) => Ok(Spanned {
                text: text.clone(),
                location: self.location,
            }),
            _ => Err(ParseError::syntax(
                format!("expected a string, found {}", self.describe()),
                self.location,
            )),
        }
    }
}

/// A string (or name) with the location where it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
    /// The text.
    pub text: String,
    /// Where it starts.
    pub location: Location,
}

#[derive(Logos, Debug, Clone, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"#[^\n]*")]
enum Token {
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_owned())]
    Name(String),
    #[regex(r#""([^"\\\n]|\\[^\n])*""#, unescape)]
    #[regex(r"'([^'\\\n]|\\[^\n])*'", unescape)]
    Str(String),
    #[token("=")]
    Equals,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token("[", |_| '[')]
    #[token("{", |_| '{')]
    Open(char),
    #[token("]", |_| ']')]
    #[token("}", |_| '}')]
    Close(char),
}

// Unknown escapes are kept as written.
fn unescape(lex: &mut logos::Lexer<Token>) -> String {
    let slice = lex.slice();
    let mut text = String::new();
    let mut chars = slice[1..slice.len() - 1].chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            text.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => text.push('\n'),
            Some('t') => text.push('\t'),
            Some(ch @ ('\\' | '\'' | '"')) => text.push(ch),
            Some(other) => {
                text.push('\\');
                text.push(other);
            }
            None => text.push('\\'),
        }
    }
    text
}

// Tokens with their line and column.
struct Lexer<'a> {
    tokens: logos::Lexer<'a, Token>,
    text: &'a str,
    // Byte offset that `location` points at.
    offset: usize,
    location: Location,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            tokens: Token::lexer(text),
            text,
            offset: 0,
            location: Location::START,
        }
    }

    fn advance(&mut self, offset: usize) {
        for ch in self.text[self.offset..offset].chars() {
            if ch == '\n' {
                self.location.line += 1;
                self.location.column = 1;
            } else {
                self.location.column += 1;
            }
        }
        self.offset = offset;
    }

    /// At the end of the input, `location` is left at the end of the text.
    fn next_token(&mut self) -> Result<Option<(Token, Location)>, ParseError> {
        let Some(token) = self.tokens.next() else {
            self.advance(self.text.len());
            return Ok(None);
        };
        self.advance(self.tokens.span().start);
        match token {
            Ok(token) => Ok(Some((token, self.location))),
            Err(()) => {
                let slice = self.tokens.slice();
                let message = match slice.chars().next() {
                    Some('"' | '\'') => "unterminated string".to_owned(),
                    Some(ch) => format!("unexpected character '{ch}'"),
                    None => "unexpected end of file".to_owned(),
                };
                Err(ParseError::syntax(message, self.location))
            }
        }
    }
}

struct Reader<'a> {
    lexer: Lexer<'a>,
    peeked: Option<(Token, Location)>,
}

impl Reader<'_> {
    fn peek(&mut self) -> Result<Option<&(Token, Location)>, ParseError> {
        if self.peeked.is_none() {
            self.peeked = self.lexer.next_token()?;
        }
        Ok(self.peeked.as_ref())
    }

    fn next(&mut self) -> Result<Option<(Token, Location)>, ParseError> {
        match self.peeked.take() {
            Some(token) => Ok(Some(token)),
            None => self.lexer.next_token(),
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<Location, ParseError> {
        match self.next()? {
            Some((token, location)) if token == expected => Ok(location),
            Some((_, location)) => Err(ParseError::syntax(format!("expected {what}"), location)),
            None => Err(ParseError::syntax(
                format!("expected {what}, found end of file"),
                self.lexer.location,
            )),
        }
    }

    fn value(&mut self) -> Result<Value, ParseError> {
        match self.next()? {
            Some((Token::Str(text), location)) => Ok(Value {
                kind: ValueKind::Str(text),
                location,
            }),
            Some((Token::Open('['), location)) => {
                let items = self.sequence(']', |reader| reader.value())?;
                Ok(Value {
                    kind: ValueKind::List(items),
                    location,
                })
            }
            Some((Token::Open(_), location)) => {
                let entries = self.sequence('}', |reader| {
                    let key = match reader.next()? {
                        Some((Token::Str(text), location)) => Spanned { text, location },
                        Some((_, location)) => {
                            return Err(ParseError::syntax("expected a quoted key", location));
                        }
                        None => {
                            return Err(ParseError::syntax(
                                "expected a quoted key, found end of file",
                                reader.lexer.location,
                            ));
                        }
                    };
                    reader.expect(Token::Colon, "':'")?;
                    Ok((key, reader.value()?))
                })?;
                Ok(Value {
                    kind: ValueKind::Dict(entries),
                    location,
                })
            }
            Some((_, location)) => Err(ParseError::syntax("expected a value", location)),
            None => Err(ParseError::syntax(
                "expected a value, found end of file",
                self.lexer.location,
            )),
        }
    }

    // Comma-separated items up to `close`, with an optional trailing comma.
    fn sequence<T>(
        &mut self,
        close: char,
        mut item: impl FnMut(&mut Self) -> Result<T, ParseError>,
    ) -> Result<Vec<T>, ParseError> {
        let mut items = Vec::new();
        loop {
            if let Some((Token::Close(ch), _)) = self.peek()? {
                if *ch == close {
                    self.next()?;
                    return Ok(items);
                }
            }
            items.push(item(self)?);
            match self.next()? {
                Some((Token::Comma, _)) => {}
                Some((Token::Close(ch), _)) if ch == close => return Ok(items),
                Some((_, location)) => {
                    return Err(ParseError::syntax(
                        format!("expected ',' or '{close}'"),
                        location,
                    ));
                }
                None => {
                    return Err(ParseError::syntax(
                        format!("expected '{close}', found end of file"),
                        self.lexer.location,
                    ));
                }
            }
        }
    }
}

/// Reads the `name = value` tables of a record file, in order.
pub(crate) fn read(text: &str) -> Result<Vec<(Spanned, Value)>, ParseError> {
    let mut reader = Reader {
        lexer: Lexer::new(text),
        peeked: None,
    };
    let mut tables = Vec::new();
    while let Some((token, location)) = reader.next()? {
        let Token::Name(text) = token else {
            return Err(ParseError::syntax("expected a table name", location));
        };
        reader.expect(Token::Equals, "'='")?;
        tables.push((Spanned { text, location }, reader.value()?));
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables() {
        let text = "# header\nsteps = [\n  {'name': \"A\", \"function\": 'x := 1'},\n]\ninitial_step = \"A\"\n";
        let tables = read(text).expect("well-formed records");
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].0.text, "steps");
        assert_eq!(tables[0].0.location, Location { line: 2, column: 1 });
        let ValueKind::List(steps) = &tables[0].1.kind else {
            panic!("steps is a list");
        };
        let ValueKind::Dict(entries) = &steps[0].kind else {
            panic!("step is a dictionary");
        };
        assert_eq!(entries[1].0.text, "function");
        assert_eq!(entries[1].1.kind, ValueKind::Str("x := 1".to_string()));
        assert_eq!(entries[1].1.location, Location { line: 3, column: 29 });
        assert_eq!(tables[1].1.as_str().expect("string").text, "A");
    }

    #[test]
    fn escapes() {
        let tables = read(r#"t = ["a\"b", 'c\'d']"#).expect("well-formed records");
        let ValueKind::List(items) = &tables[0].1.kind else {
            panic!("t is a list");
        };
        assert_eq!(items[0].kind, ValueKind::Str("a\"b".to_string()));
        assert_eq!(items[1].kind, ValueKind::Str("c'd".to_string()));
    }

    #[test]
    fn syntax_errors() {
        let err = read("steps = [\"A\" \"B\"]").expect_err("missing comma");
        assert_eq!(err.location, Location { line: 1, column: 14 });
        let err = read("steps = [\n  'A").expect_err("unterminated string");
        assert_eq!(err.location, Location { line: 2, column: 3 });
        read("steps [").expect_err("missing '='");
        read("steps = [").expect_err("missing ']'");
    }

    #[test]
    fn comments_and_positions() {
        let text = "a = 'x' # trailing\n\n  b = [ # inner\n\t'y', \"z\\\\q\"]\n";
        let tables = read(text).expect("well-formed records");
        assert_eq!(tables[1].0.location, Location { line: 3, column: 3 });
        let ValueKind::List(items) = &tables[1].1.kind else {
            panic!("b is a list");
        };
        assert_eq!(items[0].location, Location { line: 4, column: 2 });
        assert_eq!(items[1].location, Location { line: 4, column: 7 });
        assert_eq!(items[1].kind, ValueKind::Str("z\\q".to_string()));

        let err = read("a = 'x'\nb = @").expect_err("stray character");
        assert_eq!(err.location, Location { line: 2, column: 5 });
        assert!(err.to_string().contains("unexpected character '@'"));
        let err = read("a = [\n").expect_err("truncated list");
        assert_eq!(err.location, Location { line: 2, column: 1 });
    }
}
