//! Symbolic path conditions in static single assignment form.

use crate::grammar::{Expression, Type, UnOp};
use crate::net::Net;
use crate::paths::Path;
use crate::sfc::{Assignment, Sfc, SfcExpression, Var};
use crate::solver::Term;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// The symbolic summary of one path:
/// SSA definitions for every write, the guards met along the way,
/// and the symbol each variable holds at the end.
#[derive(Debug, Clone)]
pub struct PathCondition {
    definitions: Vec<(Arc<str>, Type, Term)>,
    guards: Vec<Term>,
    outputs: BTreeMap<String, Term>,
    inputs: BTreeMap<String, Term>,
}

impl PathCondition {
    /// The conjunction of the guards along the path.
    pub fn guard(&self) -> Term {
        Term::and(self.guards.iter().cloned())
    }

    /// The SSA definitions `sym = expr`, in order of creation.
    pub fn definitions(&self) -> Term {
        Term::and(
            self.definitions
                .iter()
                .map(|(sym, ty, def)| Term::var(sym.clone(), *ty).eq(def.clone())),
        )
    }

    /// Definitions and guards together:
    /// satisfiable exactly when some input drives the SFC along the path.
    pub fn formula(&self) -> Term {
        Term::and([self.definitions(), self.guard()])
    }

    /// The value of each variable when the path ends.
    pub fn outputs(&self) -> &BTreeMap<String, Term> {
        &self.outputs
    }

    /// The value of each variable when the path starts
    /// (a symbol for inputs, a constant for initialized variables).
    pub fn inputs(&self) -> &BTreeMap<String, Term> {
        &self.inputs
    }

    /// Number of SSA symbols introduced.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether the path writes no variable.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// Builds [`PathCondition`]s for the paths of one SFC.
///
/// Symbols created for writes are prefixed by a namespace,
/// so that conditions of different SFCs can be conjoined.
/// Inputs are shared by name across SFCs,
/// unless marked private (e.g. because the other SFC declares them with another type).
#[derive(Debug, Clone)]
pub struct ConditionBuilder<'a> {
    sfc: &'a Sfc,
    net: &'a Net,
    namespace: &'a str,
    private_inputs: BTreeSet<String>,
}

impl<'a> ConditionBuilder<'a> {
    /// Creates a builder for the paths of `net`, the net of `sfc`.
    pub fn new(sfc: &'a Sfc, net: &'a Net, namespace: &'a str) -> Self {
        Self {
            sfc,
            net,
            namespace,
            private_inputs: BTreeSet::new(),
        }
    }

    /// Keeps the inputs with the given names out of the shared input space.
    pub fn with_private_inputs(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.private_inputs.extend(names);
        self
    }

    /// The symbol standing for the initial value of an input variable.
    pub fn input_symbol(&self, var: Var) -> String {
        let name = self.sfc.var(var).name();
        if self.private_inputs.contains(name) {
            format!("{}.{name}", self.namespace)
        } else {
            name.to_string()
        }
    }

    /// Builds the condition of a path of the net.
    pub fn build(&self, path: &Path) -> PathCondition {
        let mut current = self
            .sfc
            .vars()
            .map(|(var, decl)| match decl.init() {
                Some(init) => Term::val(init),
                None => Term::var(self.input_symbol(var), decl.r#type()),
            })
            .collect::<Vec<_>>();
        let inputs = self
            .sfc
            .vars()
            .map(|(var, decl)| (decl.name().to_string(), current[var.index()].clone()))
            .collect();
        let mut versions = vec![0u32; current.len()];
        let mut definitions = Vec::new();
        let mut guards = Vec::new();
        self.write(
            self.net.initial_effect(),
            &mut current,
            &mut versions,
            &mut definitions,
        );
        for &t in &path.transitions {
            let transition = self.net.transition(t);
            guards.push(translate(transition.guard(), &current));
            self.write(
                transition.effect(),
                &mut current,
                &mut versions,
                &mut definitions,
            );
        }
        if path.halted {
            // No outgoing guard holds where the path stops.
            let place = self.net.place(path.last());
            let leave = place
                .outgoing()
                .iter()
                .map(|&t| translate(self.net.transition(t).guard(), &current));
            guards.push(Term::or(leave).not());
        }
        let outputs = self
            .sfc
            .vars()
            .map(|(var, decl)| (decl.name().to_string(), current[var.index()].clone()))
            .collect();
        PathCondition {
            definitions,
            guards,
            outputs,
            inputs,
        }
    }

    fn write(
        &self,
        effect: &[Assignment],
        current: &mut [Term],
        versions: &mut [u32],
        definitions: &mut Vec<(Arc<str>, Type, Term)>,
    ) {
        for Assignment { var, expr } in effect {
            let def = translate(expr, current);
            let decl = self.sfc.var(*var);
            versions[var.index()] += 1;
            let sym: Arc<str> = format!(
                "{}.{}#{}",
                self.namespace,
                decl.name(),
                versions[var.index()]
            )
            .into();
            definitions.push((sym.clone(), decl.r#type(), def));
            current[var.index()] = Term::var(sym, decl.r#type());
        }
    }
}

/// Builds the condition of `path`, a path of `net` (the net of `sfc`),
/// with write symbols in the given namespace.
pub fn build_condition(sfc: &Sfc, net: &Net, path: &Path, namespace: &str) -> PathCondition {
    ConditionBuilder::new(sfc, net, namespace).build(path)
}

fn translate(expr: &SfcExpression, current: &[Term]) -> Term {
    match expr {
        Expression::Const(val) => Term::val(val),
        Expression::Var(var) => current[var.index()].clone(),
        Expression::Unary(UnOp::Neg, arg) => translate(arg, current).neg(),
        Expression::Unary(UnOp::Not, arg) => translate(arg, current).not(),
        Expression::Binary(op, args) => {
            Term::binary(*op, translate(&args.0, current), translate(&args.1, current))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{BinOp, Val};
    use crate::net::to_net;
    use crate::paths::PathBounds;
    use crate::sfc::SfcBuilder;

    #[test]
    fn ssa_symbols() {
        let mut builder = SfcBuilder::new();
        let x = builder.new_var("x", Type::Integer, None).expect("new var");
        let y = builder
            .new_var("y", Type::Integer, Some(Val::Integer(7)))
            .expect("new var");
        let a = builder.new_step("A").expect("new step");
        let b = builder.new_step("B").expect("new step");
        builder.set_initial(a).expect("step exists");
        let incr = Expression::binary(BinOp::Add, Expression::Var(x), Expression::from(1));
        builder.add_assignment(b, x, incr.clone()).expect("well-typed");
        builder.add_assignment(b, x, incr).expect("well-typed");
        let guard = Expression::binary(BinOp::Lt, Expression::Var(x), Expression::Var(y));
        builder.add_transition(a, b, Some(guard)).expect("boolean");
        let sfc = builder.build().expect("valid SFC");
        let net = to_net(&sfc);
        let path = net.paths(&PathBounds::default()).next().expect("one path");
        let cond = build_condition(&sfc, &net, &path, "s");

        assert_eq!(cond.len(), 2);
        assert_eq!(cond.guard().to_string(), "(< |x| 7)");
        assert_eq!(
            cond.definitions().to_string(),
            "(and (= |s.x#1| (+ |x| 1)) (= |s.x#2| (+ |s.x#1| 1)))"
        );
        assert_eq!(cond.outputs()["x"], Term::var("s.x#2", Type::Integer));
        assert_eq!(cond.outputs()["y"], Term::Int(7));
        assert_eq!(cond.inputs()["x"], Term::var("x", Type::Integer));
    }

    #[test]
    fn private_inputs_are_namespaced() {
        let mut builder = SfcBuilder::new();
        let flag = builder.new_var("flag", Type::Boolean, None).expect("new var");
        let a = builder.new_step("A").expect("new step");
        builder.set_initial(a).expect("step exists");
        let sfc = builder.build().expect("valid SFC");
        let net = to_net(&sfc);
        let conditions = ConditionBuilder::new(&sfc, &net, "t")
            .with_private_inputs(["flag".to_string()]);
        assert_eq!(conditions.input_symbol(flag), "t.flag");
        let path = net.paths(&PathBounds::default()).next().expect("one path");
        let cond = conditions.build(&path);
        assert!(cond.is_empty());
        assert_eq!(cond.formula(), Term::Bool(true));
        assert_eq!(cond.outputs()["flag"], Term::var("t.flag", Type::Boolean));
    }

    #[test]
    fn halting_negates_every_exit() {
        let mut builder = SfcBuilder::new();
        let x = builder.new_var("x", Type::Integer, None).expect("new var");
        let a = builder.new_step("A").expect("new step");
        let b = builder.new_step("B").expect("new step");
        let c = builder.new_step("C").expect("new step");
        builder.set_initial(a).expect("step exists");
        let low = Expression::binary(BinOp::Lt, Expression::Var(x), Expression::from(0));
        let high = Expression::binary(BinOp::Gt, Expression::Var(x), Expression::from(9));
        builder.add_transition(a, b, Some(low)).expect("boolean");
        builder.add_transition(a, c, Some(high)).expect("boolean");
        let sfc = builder.build().expect("valid SFC");
        let net = to_net(&sfc);
        let path = net
            .paths(&PathBounds::default())
            .find(|path| path.halted)
            .expect("halting path");
        assert_eq!(path.places, [net.initial_marking()]);
        let cond = build_condition(&sfc, &net, &path, "s");
        assert_eq!(cond.guard().to_string(), "(not (or (< |x| 0) (< 9 |x|)))");
    }
}
