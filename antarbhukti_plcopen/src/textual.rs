// The textual SFC of IEC 61131-3 written as an ST body:
//
//     VAR n : INT := 0; END_VAR
//     INITIAL_STEP Init: n := 0; END_STEP
//     STEP Count: n := n + 1; END_STEP
//     TRANSITION T1 FROM Init TO Count := n < 3; END_TRANSITION
//
// Step bodies are read as actions and transition conditions as guards.
// Anything outside these blocks, such as the `PROGRAM` header, is skipped.

use crate::error::{DocumentErrorKind, PlcOpenError};
use crate::parser::{Code, Pou, Variable, advance};
use crate::records::Records;
use antarbhukti_sfc::Location;
use log::debug;
use logos::Logos;
use std::ops::Range;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"\(\*([^*]|\*+[^*)])*\*+\)")]
enum Token {
    #[token("initial_step", ignore(ascii_case))]
    InitialStep,
    #[token("step", ignore(ascii_case))]
    Step,
    #[token("end_step", ignore(ascii_case))]
    EndStep,
    #[token("transition", ignore(ascii_case))]
    Transition,
    #[token("end_transition", ignore(ascii_case))]
    EndTransition,
    #[token("from", ignore(ascii_case))]
    From,
    #[token("to", ignore(ascii_case))]
    To,
    #[token("var", ignore(ascii_case))]
    #[token("var_input", ignore(ascii_case))]
    #[token("var_output", ignore(ascii_case))]
    #[token("var_in_out", ignore(ascii_case))]
    #[token("var_temp", ignore(ascii_case))]
    Var,
    #[token("end_var", ignore(ascii_case))]
    EndVar,
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Name,
    #[token(":=")]
    Assign,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token("(")]
    Open,
    #[regex(r"'[^'\n]*'")]
    #[regex(r#""[^"\n]*""#)]
    Str,
    #[regex(r"[^ \t\r\n\f]", priority = 0)]
    Other,
}

struct Reader<'a> {
    code: &'a Code,
    tokens: Vec<(Token, Range<usize>)>,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(code: &'a Code) -> Result<Self, PlcOpenError> {
        let mut tokens = Vec::new();
        let mut lexer = Token::lexer(&code.text);
        while let Some(token) = lexer.next() {
            let span = lexer.span();
            match token {
                Ok(token) => tokens.push((token, span)),
                Err(()) => {
                    return Err(PlcOpenError::new(
                        DocumentErrorKind::Syntax(format!("unexpected '{}'", lexer.slice())),
                        advance(code.location, &code.text[..span.start]),
                    ));
                }
            }
        }
        Ok(Self {
            code,
            tokens,
            pos: 0,
        })
    }

    fn location(&self, offset: usize) -> Location {
        advance(self.code.location, &self.code.text[..offset])
    }

    // Where the next token is, or the end of the code.
    fn here(&self) -> Location {
        let offset = self
            .tokens
            .get(self.pos)
            .map_or(self.code.text.len(), |(_, span)| span.start);
        self.location(offset)
    }

    fn syntax(&self, message: impl Into<String>) -> PlcOpenError {
        PlcOpenError::new(DocumentErrorKind::Syntax(message.into()), self.here())
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).map(|(token, _)| *token)
    }

    fn next(&mut self) -> Option<(Token, Range<usize>)> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<Range<usize>, PlcOpenError> {
        match self.tokens.get(self.pos) {
            Some((token, span)) if *token == expected => {
                let span = span.clone();
                self.pos += 1;
                Ok(span)
            }
            _ => Err(self.syntax(format!("expected {what}"))),
        }
    }

    fn name(&mut self, what: &str) -> Result<(String, Location), PlcOpenError> {
        let span = self.expect(Token::Name, what)?;
        Ok((self.code.text[span.clone()].to_owned(), self.location(span.start)))
    }

    // Skips to `end`, returning the code in between and the span of `end`.
    fn until(&mut self, end: Token, what: &str) -> Result<(Code, Range<usize>), PlcOpenError> {
        let start = self
            .tokens
            .get(self.pos.saturating_sub(1))
            .map_or(0, |(_, span)| span.end);
        while let Some((token, span)) = self.next() {
            if token == end {
                return Ok((self.code.slice(start, span.start), span));
            }
        }
        Err(self.syntax(format!("expected {what}, found end of code")))
    }

    fn step(&mut self, records: &mut Records, initial: bool) -> Result<(), PlcOpenError> {
        let (name, location) = self.name("a step name")?;
        self.expect(Token::Colon, "':'")?;
        let (body, _) = self.until(Token::EndStep, "END_STEP")?;
        debug!(target: "parser", "{location}: step '{name}'");
        let action = body.statement();
        records.step(&name, location, Some(&action), initial);
        Ok(())
    }

    fn transition(&mut self, records: &mut Records) -> Result<(), PlcOpenError> {
        let location = self.here();
        if self.peek() == Some(Token::Name) {
            self.next();
        }
        self.expect(Token::From, "FROM")?;
        if self.peek() == Some(Token::Open) {
            return Err(PlcOpenError::new(
                DocumentErrorKind::Unsupported("simultaneous sequences".to_owned()),
                self.here(),
            ));
        }
        let source = self.name("a step name")?;
        self.expect(Token::To, "TO")?;
        let target = self.name("a step name")?;
        if self.peek() == Some(Token::Colon) {
            return Err(PlcOpenError::new(
                DocumentErrorKind::Unsupported("transition bodies other than ':= condition'".to_owned()),
                self.here(),
            ));
        }
        self.expect(Token::Assign, "':='")?;
        let (guard, _) = self.until(Token::EndTransition, "END_TRANSITION")?;
        let guard = guard.statement();
        records.transition(
            (&source.0, source.1),
            (&target.0, target.1),
            Some(&guard),
            location,
        );
        Ok(())
    }

    // Declarations `a, b : TYPE := init;` up to END_VAR.
    fn variables(&mut self, records: &mut Records) -> Result<(), PlcOpenError> {
        while self.peek() == Some(Token::Name)
            && matches!(
                self.tokens
                    .get(self.pos + 1)
                    .map(|(token, _)| *token),
                Some(Token::Name | Token::Var | Token::EndVar)
            )
        {
            // CONSTANT, RETAIN and the like.
            self.next();
        }
        loop {
            if self.peek() == Some(Token::EndVar) {
                self.next();
                return Ok(());
            }
            let mut names = vec![self.name("a variable name")?];
            while self.peek() == Some(Token::Comma) {
                self.next();
                names.push(self.name("a variable name")?);
            }
            self.expect(Token::Colon, "':'")?;
            let r#type = self.name("a type")?;
            let mut init = None;
            let end = loop {
                match self.next() {
                    Some((Token::Semicolon, span)) => break span,
                    Some((Token::Assign, _)) => {
                        let (value, span) = self.until(Token::Semicolon, "';'")?;
                        init = Some((value.text, value.location));
                        break span;
                    }
                    Some(_) => {}
                    None => return Err(self.syntax("expected ';', found end of code")),
                }
            };
            debug!(target: "parser", "{}: variables {names:?}", self.location(end.start));
            for (name, location) in names {
                records.variable(&Variable {
                    name,
                    location,
                    r#type: Some(r#type.clone()),
                    init: init.clone(),
                })?;
            }
        }
    }
}

/// Whether an ST body looks like a textual SFC.
pub(crate) fn is_sfc(code: &Code) -> bool {
    Token::lexer(&code.text).any(|token| matches!(token, Ok(Token::InitialStep)))
}

/// The records of the textual SFC in the ST body of `pou`.
pub(crate) fn records(pou: &Pou, code: &Code) -> Result<Records, PlcOpenError> {
    let mut reader = Reader::new(code)?;
    let mut records = Records::default();
    for variable in &pou.variables {
        records.variable(variable)?;
    }
    while let Some((token, _)) = reader.next() {
        match token {
            Token::InitialStep => reader.step(&mut records, true)?,
            Token::Step => reader.step(&mut records, false)?,
            Token::Transition => reader.transition(&mut records)?,
            Token::Var => reader.variables(&mut records)?,
            _ => {}
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(text: &str) -> Code {
        Code {
            text: text.to_owned(),
            location: Location { line: 10, column: 1 },
        }
    }

    #[test]
    fn keywords_ignore_case() {
        let tokens: Vec<_> = Token::lexer("Initial_Step stepper END_STEP (* STEP *) to")
            .collect::<Result<_, _>>()
            .expect("tokens");
        assert_eq!(
            tokens,
            [Token::InitialStep, Token::Name, Token::EndStep, Token::To]
        );
    }

    #[test]
    fn step_bodies() {
        let code = code("PROGRAM main\nINITIAL_STEP Init:\n  n := 0;\nEND_STEP\nEND_PROGRAM");
        assert!(is_sfc(&code));
        let mut reader = Reader::new(&code).expect("tokens");
        reader.next();
        reader.next();
        let (token, _) = reader.next().expect("initial step");
        assert_eq!(token, Token::InitialStep);
        reader.name("a step name").expect("name");
        reader.expect(Token::Colon, "':'").expect("colon");
        let (body, _) = reader.until(Token::EndStep, "END_STEP").expect("body");
        assert_eq!(body.text, "n := 0;");
        assert_eq!(body.location, Location { line: 12, column: 3 });
    }

    #[test]
    fn malformed_blocks() {
        let err = Reader::new(&code("STEP A: x := 1;"))
            .and_then(|mut reader| {
                reader.next();
                reader.step(&mut Records::default(), false)
            })
            .expect_err("missing END_STEP");
        assert!(err.to_string().contains("expected END_STEP"));

        let err = Reader::new(&code("TRANSITION FROM (A, B) TO C := TRUE; END_TRANSITION"))
            .and_then(|mut reader| {
                reader.next();
                reader.transition(&mut Records::default())
            })
            .expect_err("parallel transition");
        assert_eq!(err.location(), Location { line: 10, column: 17 });
    }
}
