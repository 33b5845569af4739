// Reads the POUs of a PLCopen TC6 XML document,
// keeping what describes an SFC: interface variables,
// the elements of SFC bodies and the ST code they refer to.

use crate::error::{DocumentErrorKind, PlcOpenError};
use antarbhukti_sfc::Location;
use log::{debug, trace};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::BTreeMap;

/// Structured Text, with the location of its first character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Code {
    pub(crate) text: String,
    pub(crate) location: Location,
}

impl Code {
    /// The code between byte offsets `start` and `end`, trimmed.
    pub(crate) fn slice(&self, start: usize, end: usize) -> Code {
        let text = &self.text[start..end];
        let trimmed = text.trim_start();
        let start = start + text.len() - trimmed.len();
        Code {
            text: trimmed.trim_end().to_owned(),
            location: advance(self.location, &self.text[..start]),
        }
    }

    /// The code without surrounding blanks and trailing `;`.
    pub(crate) fn statement(&self) -> Code {
        let code = self.slice(0, self.text.len());
        Code {
            text: code.text.trim_end_matches([';', ' ', '\t', '\r', '\n']).to_owned(),
            ..code
        }
    }
}

/// The location reached from `location` after reading `text`.
pub(crate) fn advance(mut location: Location, text: &str) -> Location {
    for ch in text.chars() {
        if ch == '\n' {
            location.line += 1;
            location.column = 1;
        } else {
            location.column += 1;
        }
    }
    location
}

#[derive(Debug)]
pub(crate) struct Variable {
    pub(crate) name: String,
    pub(crate) location: Location,
    pub(crate) r#type: Option<(String, Location)>,
    pub(crate) init: Option<(String, Location)>,
}

/// ST code given in place, or by the name of a POU-level action or transition.
#[derive(Debug)]
pub(crate) enum Source {
    Inline(Code),
    Named(String),
}

#[derive(Debug)]
pub(crate) struct Action {
    pub(crate) qualifier: Option<String>,
    pub(crate) source: Option<Source>,
    pub(crate) location: Location,
}

#[derive(Debug)]
pub(crate) enum NodeKind {
    Step { name: String, initial: bool },
    Transition { condition: Option<Source> },
    ActionBlock { actions: Vec<Action> },
    Jump { target: String },
    Divergence,
    Convergence,
    Unsupported(&'static str),
}

/// An element of an SFC body, with the `localId`s it is connected from.
#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) id: u64,
    pub(crate) kind: NodeKind,
    pub(crate) inputs: Vec<u64>,
    pub(crate) location: Location,
}

#[derive(Debug)]
pub(crate) struct Pou {
    pub(crate) name: String,
    pub(crate) location: Location,
    pub(crate) variables: Vec<Variable>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) actions: BTreeMap<String, Code>,
    pub(crate) transitions: BTreeMap<String, Code>,
    /// The body, when written in ST.
    pub(crate) program: Option<Code>,
}

impl Pou {
    fn new(name: String, location: Location) -> Self {
        Self {
            name,
            location,
            variables: Vec::new(),
            nodes: Vec::new(),
            actions: BTreeMap::new(),
            transitions: BTreeMap::new(),
            program: None,
        }
    }
}

// Where the text of an ST element goes.
#[derive(Debug, Clone)]
enum Target {
    Program,
    NamedAction(String),
    NamedTransition(String),
    Condition(usize),
    Action(usize, usize),
}

// The open elements, with the indices of the POU, variable, node or action they belong to.
#[derive(Debug, Clone)]
enum Tag {
    Container,
    Pou(usize),
    Interface(usize),
    Vars(usize),
    Variable(usize, usize),
    Type(usize, usize),
    InitialValue(usize, usize),
    PouBody(usize),
    Sfc(usize),
    Node(usize, usize),
    Inputs(usize, usize),
    Condition(usize, usize),
    Action(usize, usize, usize),
    Actions(usize),
    NamedAction(usize, String),
    Transitions(usize),
    NamedTransition(usize, String),
    // A `body` or `inline` element, in whatever language.
    Languages(usize, Target),
    Code(usize, Target),
    Ignored,
}

struct Parser<'a> {
    text: &'a str,
    reader: Reader<&'a [u8]>,
    // Byte offsets where lines start.
    lines: Vec<usize>,
    stack: Vec<Tag>,
    pous: Vec<Pou>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);
        let lines = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            text,
            reader,
            lines,
            stack: Vec::new(),
            pous: Vec::new(),
        }
    }

    // The location of the first non-blank character at or after `offset`.
    fn locate(&self, offset: usize) -> Location {
        let offset = self.text.as_bytes()[offset.min(self.text.len())..]
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .map_or(self.text.len(), |skip| offset + skip);
        let line = self.lines.partition_point(|&start| start <= offset);
        let start = self.lines[line - 1];
        let column = self
            .text
            .get(start..offset)
            .map_or(offset - start, |prefix| prefix.chars().count());
        Location {
            line,
            column: column + 1,
        }
    }

    fn position(&self) -> usize {
        usize::try_from(self.reader.buffer_position()).unwrap_or(self.text.len())
    }

    fn xml(&self, err: impl Into<quick_xml::Error>) -> PlcOpenError {
        let offset = usize::try_from(self.reader.error_position()).unwrap_or(self.text.len());
        PlcOpenError::new(DocumentErrorKind::Xml(err.into()), self.locate(offset))
    }

    fn attribute(&self, tag: &BytesStart<'_>, name: &str) -> Result<Option<String>, PlcOpenError> {
        match tag.try_get_attribute(name).map_err(|err| self.xml(err))? {
            Some(attr) => Ok(Some(
                attr.unescape_value().map_err(|err| self.xml(err))?.into_owned(),
            )),
            None => Ok(None),
        }
    }

    fn required(
        &self,
        tag: &BytesStart<'_>,
        attribute: &'static str,
        location: Location,
    ) -> Result<String, PlcOpenError> {
        self.attribute(tag, attribute)?.ok_or_else(|| {
            PlcOpenError::new(
                DocumentErrorKind::MissingAttribute {
                    element: String::from_utf8_lossy(tag.local_name().as_ref()).into_owned(),
                    attribute,
                },
                location,
            )
        })
    }

    fn id(
        &self,
        tag: &BytesStart<'_>,
        attribute: &'static str,
        location: Location,
    ) -> Result<u64, PlcOpenError> {
        let value = self.required(tag, attribute, location)?;
        value.trim().parse().map_err(|_| {
            PlcOpenError::new(
                DocumentErrorKind::InvalidAttribute { attribute, value },
                location,
            )
        })
    }

    fn flag(
        &self,
        tag: &BytesStart<'_>,
        attribute: &'static str,
        location: Location,
    ) -> Result<bool, PlcOpenError> {
        match self.attribute(tag, attribute)?.as_deref().map(str::trim) {
            None | Some("false" | "0") => Ok(false),
            Some("true" | "1") => Ok(true),
            Some(value) => Err(PlcOpenError::new(
                DocumentErrorKind::InvalidAttribute {
                    attribute,
                    value: value.to_owned(),
                },
                location,
            )),
        }
    }

    // The tag of a newly opened element, given its parent's.
    fn open(&mut self, tag: &BytesStart<'_>, location: Location) -> Result<Tag, PlcOpenError> {
        let parent = self.stack.last().cloned().unwrap_or(Tag::Container);
        let local = tag.local_name();
        trace!(target: "parser", "{location}: <{}>", String::from_utf8_lossy(local.as_ref()));
        Ok(match (parent, local.as_ref()) {
            (Tag::Container, b"project" | b"types" | b"pous") => Tag::Container,
            (Tag::Container, b"pou") => {
                let name = self.required(tag, "name", location)?;
                debug!(target: "parser", "{location}: POU '{name}'");
                self.pous.push(Pou::new(name, location));
                Tag::Pou(self.pous.len() - 1)
            }
            (Tag::Pou(p), b"interface") => Tag::Interface(p),
            (Tag::Interface(p), vars) if vars.ends_with(b"Vars") => Tag::Vars(p),
            (Tag::Vars(p), b"variable") => {
                let name = self.required(tag, "name", location)?;
                let variables = &mut self.pous[p].variables;
                variables.push(Variable {
                    name,
                    location,
                    r#type: None,
                    init: None,
                });
                Tag::Variable(p, variables.len() - 1)
            }
            (Tag::Variable(p, v), b"type") => Tag::Type(p, v),
            (Tag::Type(p, v), element) => {
                let name = if element == b"derived" {
                    self.required(tag, "name", location)?
                } else {
                    String::from_utf8_lossy(element).into_owned()
                };
                self.pous[p].variables[v].r#type.get_or_insert((name, location));
                Tag::Ignored
            }
            (Tag::Variable(p, v), b"initialValue") => Tag::InitialValue(p, v),
            (Tag::InitialValue(p, v), b"simpleValue") => {
                let value = self.required(tag, "value", location)?;
                self.pous[p].variables[v].init = Some((value, location));
                Tag::Ignored
            }
            (Tag::Pou(p), b"body") => Tag::PouBody(p),
            (Tag::PouBody(p), b"SFC") => Tag::Sfc(p),
            (Tag::PouBody(p), b"ST") => self.code(p, Target::Program, location),
            (Tag::Pou(p), b"actions") => Tag::Actions(p),
            (Tag::Actions(p), b"action") => Tag::NamedAction(p, self.required(tag, "name", location)?),
            (Tag::NamedAction(p, name), b"body") => Tag::Languages(p, Target::NamedAction(name)),
            (Tag::Pou(p), b"transitions") => Tag::Transitions(p),
            (Tag::Transitions(p), b"transition") => {
                Tag::NamedTransition(p, self.required(tag, "name", location)?)
            }
            (Tag::NamedTransition(p, name), b"body") => {
                Tag::Languages(p, Target::NamedTransition(name))
            }
            (Tag::Sfc(p), element) => {
                let kind = match element {
                    b"step" => NodeKind::Step {
                        name: self.required(tag, "name", location)?,
                        initial: self.flag(tag, "initialStep", location)?,
                    },
                    b"transition" => NodeKind::Transition { condition: None },
                    b"actionBlock" => NodeKind::ActionBlock {
                        actions: Vec::new(),
                    },
                    b"jumpStep" => NodeKind::Jump {
                        target: self.required(tag, "targetName", location)?,
                    },
                    b"selectionDivergence" => NodeKind::Divergence,
                    b"selectionConvergence" => NodeKind::Convergence,
                    b"simultaneousDivergence" | b"simultaneousConvergence" => {
                        NodeKind::Unsupported("simultaneous sequences")
                    }
                    b"macroStep" => NodeKind::Unsupported("macro steps"),
                    _ => return Ok(Tag::Ignored),
                };
                let id = self.id(tag, "localId", location)?;
                let nodes = &mut self.pous[p].nodes;
                nodes.push(Node {
                    id,
                    kind,
                    inputs: Vec::new(),
                    location,
                });
                Tag::Node(p, nodes.len() - 1)
            }
            (Tag::Node(p, n), b"connectionPointIn") => Tag::Inputs(p, n),
            (Tag::Inputs(p, n), b"connection") => {
                let id = self.id(tag, "refLocalId", location)?;
                self.pous[p].nodes[n].inputs.push(id);
                Tag::Ignored
            }
            (Tag::Node(p, n), b"condition") => Tag::Condition(p, n),
            (Tag::Condition(p, n), b"inline") => Tag::Languages(p, Target::Condition(n)),
            (Tag::Condition(p, n), b"reference") => {
                let name = self.required(tag, "name", location)?;
                if let NodeKind::Transition { condition } = &mut self.pous[p].nodes[n].kind {
                    *condition = Some(Source::Named(name));
                }
                Tag::Ignored
            }
            (Tag::Condition(..), b"connectionPointIn") => {
                return Err(PlcOpenError::new(
                    DocumentErrorKind::Unsupported(
                        "transition conditions connected to a network".to_owned(),
                    ),
                    location,
                ));
            }
            (Tag::Node(p, n), b"action") => {
                let qualifier = self.attribute(tag, "qualifier")?;
                if let NodeKind::ActionBlock { actions } = &mut self.pous[p].nodes[n].kind {
                    actions.push(Action {
                        qualifier,
                        source: None,
                        location,
                    });
                    Tag::Action(p, n, actions.len() - 1)
                } else {
                    Tag::Ignored
                }
            }
            (Tag::Action(p, n, a), b"inline") => Tag::Languages(p, Target::Action(n, a)),
            (Tag::Action(p, n, a), b"reference") => {
                let name = self.required(tag, "name", location)?;
                if let NodeKind::ActionBlock { actions } = &mut self.pous[p].nodes[n].kind {
                    actions[a].source = Some(Source::Named(name));
                }
                Tag::Ignored
            }
            (Tag::Languages(p, target), b"ST") => self.code(p, target, location),
            (Tag::Code(p, target), _) => Tag::Code(p, target),
            _ => Tag::Ignored,
        })
    }

    // Opens the ST code of `target`, replacing any previous one.
    fn code(&mut self, p: usize, target: Target, location: Location) -> Tag {
        let code = Code {
            text: String::new(),
            location,
        };
        let pou = &mut self.pous[p];
        match &target {
            Target::Program => pou.program = Some(code),
            Target::NamedAction(name) => {
                pou.actions.insert(name.clone(), code);
            }
            Target::NamedTransition(name) => {
                pou.transitions.insert(name.clone(), code);
            }
            Target::Condition(n) => {
                if let NodeKind::Transition { condition } = &mut pou.nodes[*n].kind {
                    *condition = Some(Source::Inline(code));
                }
            }
            Target::Action(n, a) => {
                if let NodeKind::ActionBlock { actions } = &mut pou.nodes[*n].kind {
                    actions[*a].source = Some(Source::Inline(code));
                }
            }
        }
        Tag::Code(p, target)
    }

    fn text(&mut self, text: &str, location: Location) {
        let Some(Tag::Code(p, target)) = self.stack.last() else {
            return;
        };
        let pou = &mut self.pous[*p];
        let code = match target {
            Target::Program => pou.program.as_mut(),
            Target::NamedAction(name) => pou.actions.get_mut(name),
            Target::NamedTransition(name) => pou.transitions.get_mut(name),
            Target::Condition(n) => match &mut pou.nodes[*n].kind {
                NodeKind::Transition {
                    condition: Some(Source::Inline(code)),
                } => Some(code),
                _ => None,
            },
            Target::Action(n, a) => match &mut pou.nodes[*n].kind {
                NodeKind::ActionBlock { actions } => match &mut actions[*a].source {
                    Some(Source::Inline(code)) => Some(code),
                    _ => None,
                },
                _ => None,
            },
        };
        if let Some(code) = code {
            if code.text.is_empty() {
                code.location = location;
            } else {
                code.text.push('\n');
            }
            code.text.push_str(text);
        }
    }
}

/// Reads the POUs of a PLCopen XML document, in order.
pub(crate) fn parse(text: &str) -> Result<Vec<Pou>, PlcOpenError> {
    let mut parser = Parser::new(text);
    loop {
        let location = parser.locate(parser.position());
        let event = parser.reader.read_event().map_err(|err| parser.xml(err))?;
        match event {
            Event::Start(tag) => {
                let tag = parser.open(&tag, location)?;
                parser.stack.push(tag);
            }
            Event::Empty(tag) => {
                parser.open(&tag, location)?;
            }
            Event::End(_) => {
                parser.stack.pop();
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|err| parser.xml(err))?;
                parser.text(&text, location);
            }
            Event::CData(data) => {
                let text = data.decode().map_err(|err| parser.xml(err))?;
                parser.text(&text, location);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(parser.pous)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<project xmlns="http://www.plcopen.org/xml/tc6_0201">
  <types>
    <pous>
      <pou name="main" pouType="program">
        <interface>
          <localVars>
            <variable name="n">
              <type><INT/></type>
              <initialValue><simpleValue value="0"/></initialValue>
            </variable>
          </localVars>
        </interface>
        <body>
          <SFC>
            <step localId="1" name="Init" initialStep="true"/>
            <transition localId="2">
              <connectionPointIn><connection refLocalId="1"/></connectionPointIn>
              <condition><inline name=""><ST><xhtml:p xmlns:xhtml="http://www.w3.org/1999/xhtml">n &lt; 3</xhtml:p></ST></inline></condition>
            </transition>
          </SFC>
        </body>
      </pou>
    </pous>
  </types>
</project>
"#;

    #[test]
    fn sfc_elements() {
        let pous = parse(DOCUMENT).expect("well-formed document");
        assert_eq!(pous.len(), 1);
        let pou = &pous[0];
        assert_eq!(pou.name, "main");
        assert_eq!(pou.location, Location { line: 5, column: 7 });
        let var = &pou.variables[0];
        assert_eq!(var.name, "n");
        assert_eq!(var.r#type.as_ref().map(|(t, _)| t.as_str()), Some("INT"));
        assert_eq!(var.init.as_ref().map(|(v, _)| v.as_str()), Some("0"));

        assert_eq!(pou.nodes.len(), 2);
        assert!(matches!(&pou.nodes[0].kind, NodeKind::Step { name, initial: true } if name == "Init"));
        assert_eq!(pou.nodes[1].inputs, [1]);
        let NodeKind::Transition {
            condition: Some(Source::Inline(code)),
        } = &pou.nodes[1].kind
        else {
            panic!("inline condition expected");
        };
        assert_eq!(code.text, "n < 3");
        assert_eq!(code.location.line, 19);
    }

    #[test]
    fn code_slices() {
        let code = Code {
            text: "a :=\n  x + 1;;\n".to_owned(),
            location: Location { line: 4, column: 10 },
        };
        let slice = code.slice(4, code.text.len());
        assert_eq!(slice.text, "x + 1;;");
        assert_eq!(slice.location, Location { line: 5, column: 3 });
        assert_eq!(slice.statement().text, "x + 1");
    }

    #[test]
    fn malformed_xml() {
        let err = parse("<project>\n  <pous></project>").expect_err("mismatched tags");
        assert!(matches!(
            err,
            PlcOpenError::Document {
                kind: DocumentErrorKind::Xml(_),
                ..
            }
        ));
        assert_eq!(err.location().line, 2);
    }
}
