use crate::error::{Location, ParseError, ParseErrorKind};
use crate::expr::{
    Ast, AstAssignment, ErrorKind, ExprError, parse_action, parse_guard, parse_literal,
};
use crate::record::{Spanned, Value, ValueKind};
use antarbhukti_core::sfc::{SfcBuilder, SfcExpression, StepId, Var};
use antarbhukti_core::{BinOp, Expression, Sfc, SfcError, Type, UnOp, Val};
use log::{debug, info, warn};
use std::collections::BTreeMap;

#[derive(Debug)]
struct StepRecord {
    name: Spanned,
    action: Vec<AstAssignment>,
    action_location: Location,
    initial: bool,
}

#[derive(Debug)]
struct TransitionRecord {
    source: Spanned,
    target: Spanned,
    guard: Option<Ast>,
    guard_location: Location,
}

#[derive(Debug)]
struct VariableRecord {
    name: Spanned,
    r#type: Option<Type>,
    init: Option<Val>,
}

// Maps an expression failure inside a string literal onto the record file.
fn expr_error(err: ExprError, literal: Location) -> ParseError {
    let kind = match err.kind {
        ErrorKind::Tokenize => ParseErrorKind::Tokenize(err.message),
        ErrorKind::Expression => ParseErrorKind::Expression(err.message),
    };
    ParseError::new(kind, literal.within_literal(err.offset))
}

// The fields of a dictionary record, rejecting unknown and repeated keys.
fn fields<'a>(
    value: &'a Value,
    record: &'static str,
    allowed: &[&'static str],
) -> Result<BTreeMap<&'static str, &'a Value>, ParseError> {
    let ValueKind::Dict(entries) = &value.kind else {
        return Err(ParseError::syntax(
            format!("{record} record must be a dictionary, found {}", value.describe()),
            value.location,
        ));
    };
    let mut fields = BTreeMap::new();
    for (key, value) in entries {
        let Some(field) = allowed.iter().find(|field| **field == key.text) else {
            return Err(ParseError::new(
                ParseErrorKind::UnknownField {
                    record,
                    field: key.text.clone(),
                },
                key.location,
            ));
        };
        if fields.insert(*field, value).is_some() {
            return Err(ParseError::syntax(
                format!("field '{}' is repeated", key.text),
                key.location,
            ));
        }
    }
    Ok(fields)
}

// The first of the given aliases present among the fields.
fn field<'a>(
    fields: &BTreeMap<&'static str, &'a Value>,
    record: &'static str,
    aliases: &[&'static str],
) -> Result<Option<Spanned>, ParseError> {
    let mut present = aliases.iter().filter_map(|alias| fields.get(alias));
    match (present.next(), present.next()) {
        (Some(value), None) => value.as_str().map(Some),
        (None, _) => Ok(None),
        (Some(_), Some(other)) => Err(ParseError::syntax(
            format!("{record} record sets both '{}' and '{}'", aliases[0], aliases[1]),
            other.location,
        )),
    }
}

fn required(
    fields: &BTreeMap<&'static str, &Value>,
    record: &'static str,
    aliases: &[&'static str],
    location: Location,
) -> Result<Spanned, ParseError> {
    field(fields, record, aliases)?.ok_or_else(|| {
        ParseError::new(
            ParseErrorKind::MissingField {
                record,
                field: aliases[0],
            },
            location,
        )
    })
}

fn list<'a>(value: &'a Value, table: &str) -> Result<&'a [Value], ParseError> {
    match &value.kind {
        ValueKind::List(items) => Ok(items),
        _ => Err(ParseError::syntax(
            format!("table '{table}' must be a list, found {}", value.describe()),
            value.location,
        )),
    }
}

fn parse_bool(text: &Spanned) -> Result<bool, ParseError> {
    match text.text.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ParseError::syntax(
            format!("expected 'true' or 'false', found '{}'", text.text),
            text.location,
        )),
    }
}

fn parse_type(text: &Spanned) -> Result<Type, ParseError> {
    match text.text.trim().to_ascii_lowercase().as_str() {
        "bool" | "boolean" => Ok(Type::Boolean),
        "int" | "integer" | "dint" | "lint" | "sint" | "uint" => Ok(Type::Integer),
        "string" | "str" => Ok(Type::String),
        _ => Err(ParseError::syntax(
            format!("unknown type '{}'", text.text),
            text.location,
        )),
    }
}

fn step_record(value: &Value) -> Result<StepRecord, ParseError> {
    let fields = fields(value, "step", &["name", "function", "action", "initial"])?;
    let name = required(&fields, "step", &["name"], value.location)?;
    let action = field(&fields, "step", &["function", "action"])?;
    let (action, action_location) = match action {
        Some(text) => (
            parse_action(&text.text).map_err(|err| expr_error(err, text.location))?,
            text.location,
        ),
        None => (Vec::new(), value.location),
    };
    let initial = field(&fields, "step", &["initial"])?
        .map(|text| parse_bool(&text))
        .transpose()?
        .unwrap_or(false);
    Ok(StepRecord {
        name,
        action,
        action_location,
        initial,
    })
}

fn transition_record(value: &Value) -> Result<TransitionRecord, ParseError> {
    let fields = fields(
        value,
        "transition",
        &["src", "source", "tgt", "target", "guard"],
    )?;
    let source = required(&fields, "transition", &["src", "source"], value.location)?;
    let target = required(&fields, "transition", &["tgt", "target"], value.location)?;
    let guard = field(&fields, "transition", &["guard"])?;
    let (guard, guard_location) = match guard {
        Some(text) => (
            parse_guard(&text.text).map_err(|err| expr_error(err, text.location))?,
            text.location,
        ),
        None => (None, value.location),
    };
    Ok(TransitionRecord {
        source,
        target,
        guard,
        guard_location,
    })
}

fn variable_record(value: &Value) -> Result<VariableRecord, ParseError> {
    if let ValueKind::Str(name) = &value.kind {
        return Ok(VariableRecord {
            name: Spanned {
                text: name.trim().to_string(),
                location: value.location,
            },
            r#type: None,
            init: None,
        });
    }
    let fields = fields(value, "variable", &["name", "type", "init"])?;
    let name = required(&fields, "variable", &["name"], value.location)?;
    let r#type = field(&fields, "variable", &["type"])?
        .map(|text| parse_type(&text))
        .transpose()?;
    let init = field(&fields, "variable", &["init"])?
        .map(|text| parse_literal(&text.text).map_err(|err| expr_error(err, text.location)))
        .transpose()?;
    Ok(VariableRecord {
        name,
        r#type,
        init,
    })
}

// Infers the types of variables from the way expressions use them,
// until nothing changes.
#[derive(Debug, Default)]
struct Inference {
    types: BTreeMap<String, Option<Type>>,
    changed: bool,
}

impl Inference {
    fn name(&mut self, name: &str, expected: Option<Type>) -> Option<Type> {
        let slot = self.types.entry(name.to_string()).or_default();
        if slot.is_none() && expected.is_some() {
            *slot = expected;
            self.changed = true;
        }
        *slot
    }

    fn expr(&mut self, ast: &Ast, expected: Option<Type>) -> Option<Type> {
        match ast {
            Ast::Int(_) => Some(Type::Integer),
            Ast::Bool(_) => Some(Type::Boolean),
            Ast::Str(_) => Some(Type::String),
            Ast::Name(name, _) => self.name(name, expected),
            Ast::Unary(UnOp::Neg, arg) => {
                self.expr(arg, Some(Type::Integer));
                Some(Type::Integer)
            }
            Ast::Unary(UnOp::Not, arg) => {
                self.expr(arg, Some(Type::Boolean));
                Some(Type::Boolean)
            }
            Ast::Binary(op, args) => {
                let (lhs, rhs) = (&args.0, &args.1);
                match op {
                    BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
                        self.expr(lhs, Some(Type::Integer));
                        self.expr(rhs, Some(Type::Integer));
                        Some(Type::Integer)
                    }
                    BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                        self.expr(lhs, Some(Type::Integer));
                        self.expr(rhs, Some(Type::Integer));
                        Some(Type::Boolean)
                    }
                    BinOp::And | BinOp::Or | BinOp::Xor => {
                        self.expr(lhs, Some(Type::Boolean));
                        self.expr(rhs, Some(Type::Boolean));
                        Some(Type::Boolean)
                    }
                    BinOp::Eq | BinOp::Ne => {
                        let left = self.expr(lhs, None);
                        let right = self.expr(rhs, left);
                        if left.is_none() {
                            self.expr(lhs, right);
                        }
                        Some(Type::Boolean)
                    }
                }
            }
        }
    }

    fn assignment(&mut self, assignment: &AstAssignment) {
        let declared = self.name(&assignment.var, None);
        let found = self.expr(&assignment.expr, declared);
        self.name(&assignment.var, found);
    }

    fn infer(&mut self, steps: &[StepRecord], transitions: &[TransitionRecord]) {
        loop {
            self.changed = false;
            for assignment in steps.iter().flat_map(|step| &step.action) {
                self.assignment(assignment);
            }
            for guard in transitions.iter().filter_map(|t| t.guard.as_ref()) {
                self.expr(guard, Some(Type::Boolean));
            }
            if !self.changed {
                break;
            }
        }
    }
}

fn convert(ast: &Ast, builder: &SfcBuilder) -> Result<SfcExpression, String> {
    Ok(match ast {
        Ast::Int(value) => Expression::Const(Val::Integer(*value)),
        Ast::Bool(value) => Expression::Const(Val::Boolean(*value)),
        Ast::Str(value) => Expression::Const(Val::String(value.clone())),
        Ast::Name(name, _) => {
            Expression::Var(builder.var(name).ok_or_else(|| name.clone())?)
        }
        Ast::Unary(op, arg) => Expression::unary(*op, convert(arg, builder)?),
        Ast::Binary(op, args) => Expression::binary(
            *op,
            convert(&args.0, builder)?,
            convert(&args.1, builder)?,
        ),
    })
}

fn type_error(err: SfcError, location: Location) -> ParseError {
    match err {
        SfcError::ModelInvariant(violation) => {
            ParseError::new(ParseErrorKind::ModelInvariant(violation), location)
        }
        err => ParseError::new(ParseErrorKind::Type(err), location),
    }
}

fn expression(
    ast: &Ast,
    builder: &SfcBuilder,
    location: Location,
) -> Result<SfcExpression, ParseError> {
    convert(ast, builder).map_err(|name| {
        ParseError::new(
            ParseErrorKind::Type(SfcError::Type(antarbhukti_core::TypeError::MissingVar(name))),
            location,
        )
    })
}

/// Builds an [`Sfc`] from the tables of a record file.
pub(crate) fn build(tables: Vec<(Spanned, Value)>) -> Result<Sfc, ParseError> {
    let mut steps_table = None;
    let mut transitions_table = None;
    let mut variables_table = None;
    let mut initial_table = None;
    for (name, value) in &tables {
        let base = name.text.trim_end_matches(|c: char| c.is_ascii_digit());
        let slot = match (base, name.text.len() == base.len()) {
            ("steps", _) => &mut steps_table,
            ("transitions", _) => &mut transitions_table,
            ("variables", true) => &mut variables_table,
            ("initial_step", true) => &mut initial_table,
            _ => {
                warn!(target: "parser", "{}: ignoring unknown table '{}'", name.location, name.text);
                continue;
            }
        };
        if slot.is_some() {
            warn!(target: "parser", "{}: ignoring repeated table '{}'", name.location, name.text);
        } else {
            *slot = Some((name, value));
        }
    }

    let steps = match steps_table {
        Some((name, value)) => list(value, &name.text)?
            .iter()
            .map(step_record)
            .collect::<Result<Vec<_>, _>>()?,
        None => {
            warn!(target: "parser", "no steps table");
            Vec::new()
        }
    };
    let transitions = match transitions_table {
        Some((name, value)) => list(value, &name.text)?
            .iter()
            .map(transition_record)
            .collect::<Result<Vec<_>, _>>()?,
        None => {
            warn!(target: "parser", "no transitions table");
            Vec::new()
        }
    };
    let variables = match variables_table {
        Some((name, value)) => list(value, &name.text)?
            .iter()
            .map(variable_record)
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };
    let initial_step = initial_table
        .map(|(_, value)| value.as_str())
        .transpose()?;

    // Declared variables come first, then those used but not declared,
    // in order of appearance.
    let mut inference = Inference::default();
    let mut order: Vec<String> = Vec::new();
    for var in &variables {
        if inference.types.contains_key(&var.name.text) {
            return Err(ParseError::new(
                ParseErrorKind::DuplicateVariable(var.name.text.clone()),
                var.name.location,
            ));
        }
        let r#type = var.r#type.or(var.init.as_ref().map(Val::r#type));
        inference.types.insert(var.name.text.clone(), r#type);
        order.push(var.name.text.clone());
    }
    let mut used = Vec::new();
    for step in &steps {
        for assignment in &step.action {
            used.push(assignment.var.as_str());
            assignment.expr.names(&mut used);
        }
    }
    for guard in transitions.iter().filter_map(|t| t.guard.as_ref()) {
        guard.names(&mut used);
    }
    for name in used {
        if !inference.types.contains_key(name) {
            debug!(target: "parser", "implicit variable '{name}'");
            inference.types.insert(name.to_string(), None);
            order.push(name.to_string());
        }
    }
    inference.infer(&steps, &transitions);

    let mut builder = SfcBuilder::new();
    let declared: BTreeMap<&str, &VariableRecord> = variables
        .iter()
        .map(|var| (var.name.text.as_str(), var))
        .collect();
    for name in &order {
        let r#type = inference
            .types
            .get(name)
            .copied()
            .flatten()
            .unwrap_or(Type::Integer);
        let (init, location) = match declared.get(name.as_str()) {
            Some(var) => (var.init.clone(), var.name.location),
            None => (None, Location::START),
        };
        builder
            .new_var(name.clone(), r#type, init)
            .map_err(|err| type_error(err, location))?;
    }

    let mut ids: Vec<StepId> = Vec::with_capacity(steps.len());
    for step in &steps {
        let id = builder.new_step(step.name.text.clone()).map_err(|err| match err {
            SfcError::DuplicateStep(name) => {
                ParseError::new(ParseErrorKind::DuplicateStep(name), step.name.location)
            }
            err => type_error(err, step.name.location),
        })?;
        if step.initial {
            builder
                .set_initial(id)
                .map_err(|err| type_error(err, step.name.location))?;
        }
        ids.push(id);
    }
    let lookup = |name: &Spanned| -> Result<StepId, ParseError> {
        builder.step(&name.text).ok_or_else(|| {
            ParseError::new(
                ParseErrorKind::UndefinedStep(name.text.clone()),
                name.location,
            )
        })
    };
    let initial = initial_step.as_ref().map(lookup).transpose()?;
    let endpoints = transitions
        .iter()
        .map(|t| Ok((lookup(&t.source)?, lookup(&t.target)?)))
        .collect::<Result<Vec<_>, ParseError>>()?;
    if let Some(initial) = initial {
        builder
            .set_initial(initial)
            .map_err(|err| type_error(err, Location::START))?;
    }

    for (step, &id) in steps.iter().zip(&ids) {
        for assignment in &step.action {
            let location = step.action_location.within_literal(assignment.offset);
            let var: Var = builder.var(&assignment.var).ok_or_else(|| {
                type_error(
                    SfcError::Type(antarbhukti_core::TypeError::MissingVar(
                        assignment.var.clone(),
                    )),
                    location,
                )
            })?;
            let expr = expression(&assignment.expr, &builder, location)?;
            builder
                .add_assignment(id, var, expr)
                .map_err(|err| type_error(err, location))?;
        }
    }
    for (transition, (source, target)) in transitions.iter().zip(endpoints) {
        let guard = transition
            .guard
            .as_ref()
            .map(|guard| expression(guard, &builder, transition.guard_location))
            .transpose()?;
        builder
            .add_transition(source, target, guard)
            .map_err(|err| type_error(err, transition.guard_location))?;
    }

    let location = initial_step.map_or(Location::START, |step| step.location);
    let sfc = builder.build().map_err(|err| type_error(err, location))?;
    info!(
        target: "parser",
        "parsed SFC with {} steps, {} transitions, {} variables",
        sfc.steps().count(),
        sfc.transitions().count(),
        sfc.vars().count()
    );
    Ok(sfc)
}
