// Resolves the elements of a graphical SFC body into steps and transitions:
// selection divergences and convergences are looked through,
// and jumps are replaced by the step they jump to.

use crate::error::{DocumentErrorKind, PlcOpenError};
use crate::parser::{Code, Node, NodeKind, Pou, Source};
use crate::records::Records;
use antarbhukti_sfc::Location;
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};

struct Graph<'a> {
    pou: &'a Pou,
    index: BTreeMap<u64, usize>,
    successors: BTreeMap<u64, Vec<usize>>,
}

fn connection(message: String, location: Location) -> PlcOpenError {
    PlcOpenError::new(DocumentErrorKind::Connection(message), location)
}

fn describe(kind: &NodeKind) -> &'static str {
    match kind {
        NodeKind::Step { .. } => "a step",
        NodeKind::Transition { .. } => "a transition",
        NodeKind::ActionBlock { .. } => "an action block",
        NodeKind::Jump { .. } => "a jump",
        NodeKind::Divergence => "a selection divergence",
        NodeKind::Convergence => "a selection convergence",
        NodeKind::Unsupported(what) => *what,
    }
}

impl<'a> Graph<'a> {
    fn new(pou: &'a Pou) -> Result<Self, PlcOpenError> {
        let mut index = BTreeMap::new();
        for (i, node) in pou.nodes.iter().enumerate() {
            if let NodeKind::Unsupported(what) = node.kind {
                return Err(PlcOpenError::new(
                    DocumentErrorKind::Unsupported(what.to_owned()),
                    node.location,
                ));
            }
            if index.insert(node.id, i).is_some() {
                return Err(PlcOpenError::new(
                    DocumentErrorKind::DuplicateId(node.id),
                    node.location,
                ));
            }
        }
        let mut successors: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
        for (i, node) in pou.nodes.iter().enumerate() {
            for input in &node.inputs {
                if !index.contains_key(input) {
                    return Err(PlcOpenError::new(
                        DocumentErrorKind::UnknownId(*input),
                        node.location,
                    ));
                }
                successors.entry(*input).or_default().push(i);
            }
        }
        Ok(Self {
            pou,
            index,
            successors,
        })
    }

    fn node(&self, id: u64) -> &'a Node {
        &self.pou.nodes[self.index[&id]]
    }

    // The steps `node` is reached from, looking through selection divergences.
    fn sources(&self, node: &'a Node) -> Result<Vec<(&'a str, Location)>, PlcOpenError> {
        let mut steps = Vec::new();
        let mut visited = BTreeSet::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if !visited.insert(current.id) {
                continue;
            }
            for &input in current.inputs.iter().rev() {
                let before = self.node(input);
                match &before.kind {
                    NodeKind::Step { name, .. } => steps.push((name.as_str(), before.location)),
                    NodeKind::Divergence => stack.push(before),
                    kind => {
                        return Err(connection(
                            format!("{} cannot precede {}", describe(kind), describe(&node.kind)),
                            node.location,
                        ));
                    }
                }
            }
        }
        Ok(steps)
    }

    // The steps a transition leads to, looking through selection convergences and jumps.
    fn targets(&self, node: &'a Node) -> Result<Vec<(&'a str, Location)>, PlcOpenError> {
        let mut steps = Vec::new();
        let mut visited = BTreeSet::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if !visited.insert(current.id) {
                continue;
            }
            let successors = self.successors.get(&current.id).map_or(&[][..], Vec::as_slice);
            for &i in successors.iter().rev() {
                let after = &self.pou.nodes[i];
                match &after.kind {
                    NodeKind::Step { name, .. } => steps.push((name.as_str(), after.location)),
                    NodeKind::Jump { target } => steps.push((target.as_str(), after.location)),
                    NodeKind::Convergence => stack.push(after),
                    kind => {
                        return Err(connection(
                            format!("{} cannot follow a transition", describe(kind)),
                            after.location,
                        ));
                    }
                }
            }
        }
        Ok(steps)
    }

    fn guard(&self, node: &Node, condition: Option<&'a Source>) -> Result<Option<Code>, PlcOpenError> {
        match condition {
            None => Ok(None),
            Some(Source::Inline(code)) => Ok(Some(code.statement())),
            Some(Source::Named(name)) => {
                let code = self.pou.transitions.get(name).ok_or_else(|| {
                    PlcOpenError::new(
                        DocumentErrorKind::UnknownTransition(name.clone()),
                        node.location,
                    )
                })?;
                Ok(Some(condition_body(name, code)))
            }
        }
    }

    // The action of each step, in order of appearance.
    fn actions(&self) -> Result<BTreeMap<&'a str, Vec<Code>>, PlcOpenError> {
        let mut by_step: BTreeMap<&str, Vec<Code>> = BTreeMap::new();
        for node in &self.pou.nodes {
            let NodeKind::ActionBlock { actions } = &node.kind else {
                continue;
            };
            let steps = self.sources(node)?;
            if steps.is_empty() {
                warn!(target: "parser", "{}: action block is not connected to a step", node.location);
            }
            for action in actions {
                match action.qualifier.as_deref().map(str::trim) {
                    None | Some("" | "N" | "P" | "P1") => {}
                    Some(qualifier) => {
                        return Err(PlcOpenError::new(
                            DocumentErrorKind::Unsupported(format!(
                                "action qualifier '{qualifier}'"
                            )),
                            action.location,
                        ));
                    }
                }
                let code = match &action.source {
                    Some(Source::Inline(code)) => code.statement(),
                    Some(Source::Named(name)) => self
                        .pou
                        .actions
                        .get(name)
                        .map(Code::statement)
                        .ok_or_else(|| {
                            PlcOpenError::new(
                                DocumentErrorKind::UnknownAction(name.clone()),
                                action.location,
                            )
                        })?,
                    None => {
                        return Err(PlcOpenError::new(
                            DocumentErrorKind::Unsupported("actions not written in ST".to_owned()),
                            action.location,
                        ));
                    }
                };
                for &(step, _) in &steps {
                    by_step.entry(step).or_default().push(code.clone());
                }
            }
        }
        Ok(by_step)
    }
}

// The condition of a POU-level transition: either an expression,
// or an assignment of one to the transition's name.
fn condition_body(name: &str, code: &Code) -> Code {
    let code = code.statement();
    let text = code.text.trim_start();
    let assigned = text
        .get(..name.len())
        .filter(|prefix| prefix.eq_ignore_ascii_case(name))
        .map(|_| text[name.len()..].trim_start())
        .and_then(|rest| rest.strip_prefix(":="));
    match assigned {
        Some(rest) => code.slice(code.text.len() - rest.len(), code.text.len()),
        None => code,
    }
}

// Joins the actions of a step, keeping the location of the first one.
fn join(codes: &[Code]) -> Option<Code> {
    let first = codes.first()?;
    let text = codes
        .iter()
        .map(|code| code.text.as_str())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(";\n");
    Some(Code {
        text,
        location: first.location,
    })
}

/// The records of the graphical SFC body of `pou`.
pub(crate) fn records(pou: &Pou) -> Result<Records, PlcOpenError> {
    let graph = Graph::new(pou)?;
    let actions = graph.actions()?;
    let mut records = Records::default();
    for variable in &pou.variables {
        records.variable(variable)?;
    }
    for node in &pou.nodes {
        match &node.kind {
            NodeKind::Step { name, initial } => {
                let action = actions.get(name.as_str()).and_then(|codes| join(codes));
                records.step(name, node.location, action.as_ref(), *initial);
            }
            NodeKind::Transition { condition } => {
                let sources = graph.sources(node)?;
                let targets = graph.targets(node)?;
                if sources.is_empty() || targets.is_empty() {
                    return Err(connection(
                        "transition is not connected to steps on both sides".to_owned(),
                        node.location,
                    ));
                }
                let guard = graph.guard(node, condition.as_ref())?;
                for &source in &sources {
                    for &target in &targets {
                        debug!(target: "parser", "{}: transition {} -> {}", node.location, source.0, target.0);
                        records.transition(source, target, guard.as_ref(), node.location);
                    }
                }
            }
            _ => {}
        }
    }
    Ok(records)
}
