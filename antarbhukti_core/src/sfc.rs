//! Sequential Function Charts (SFC).
//!
//! An [`Sfc`] is an immutable arena of steps, transitions and variables,
//! addressed by the index types [`StepId`], [`TransitionId`] and [`Var`].
//! It can only be created through a [`SfcBuilder`],
//! which checks every element as it is added.
//!
//! ```
//! # use antarbhukti_core::{BinOp, Expression, Type};
//! # use antarbhukti_core::sfc::SfcBuilder;
//! let mut builder = SfcBuilder::new();
//! let x = builder.new_var("x", Type::Integer, None).expect("new variable");
//! let init = builder.new_step("Init").expect("new step");
//! let done = builder.new_step("Done").expect("new step");
//! builder.set_initial(init).expect("step exists");
//! builder
//!     .add_assignment(done, x, Expression::from(1))
//!     .expect("well-typed assignment");
//! let guard = Expression::binary(BinOp::Gt, Expression::Var(x), Expression::from(0));
//! builder
//!     .add_transition(init, done, Some(guard))
//!     .expect("boolean guard");
//! let sfc = builder.build().expect("exactly one initial step");
//! assert_eq!(sfc.step(sfc.initial_step()).name(), "Init");
//! ```

mod builder;

use crate::grammar::{Expression, Type, TypeError, Val};
pub use builder::SfcBuilder;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::VecDeque;
use thiserror::Error;

/// An indexing object for variables of a [`Sfc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(pub(crate) u16);

impl Var {
    /// The position of the variable in declaration order.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An indexing object for steps of a [`Sfc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepId(pub(crate) u16);

impl StepId {
    /// The position of the step in declaration order.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An indexing object for transitions of a [`Sfc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransitionId(pub(crate) u16);

impl TransitionId {
    /// The position of the transition in declaration order.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Expressions over the variables of a [`Sfc`].
pub type SfcExpression = Expression<Var>;

/// Violations of the structural invariants of a [`Sfc`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ModelInvariantViolation {
    /// No step is marked as initial.
    #[error("no initial step")]
    NoInitialStep,
    /// More than one step is marked as initial.
    #[error("multiple initial steps: {}", .0.join(", "))]
    MultipleInitialSteps(Vec<String>),
}

/// The error type for operations with [`SfcBuilder`].
#[derive(Debug, Clone, Error)]
pub enum SfcError {
    /// There is no such variable.
    #[error("variable {0:?} does not belong to this SFC")]
    MissingVar(Var),
    /// There is no such step.
    #[error("step {0:?} does not belong to this SFC")]
    MissingStep(StepId),
    /// A step with the same name already exists.
    #[error("step '{0}' is declared more than once")]
    DuplicateStep(String),
    /// A variable with the same name already exists.
    #[error("variable '{0}' is declared more than once")]
    DuplicateVariable(String),
    /// The initial value of a variable does not have the declared type.
    #[error("variable '{var}' of type {expected} cannot start at {found}")]
    InitType {
        /// The variable's name.
        var: String,
        /// The declared type.
        expected: Type,
        /// The initial value.
        found: Val,
    },
    /// An assignment does not respect the type of the assigned variable.
    #[error("cannot assign a value of type {found} to variable '{var}' of type {expected}")]
    AssignmentType {
        /// The assigned variable's name.
        var: String,
        /// The type of the variable.
        expected: Type,
        /// The type of the assigned expression.
        found: Type,
    },
    /// A guard is not a boolean expression.
    #[error("guard has type {0} instead of bool")]
    NonBooleanGuard(Type),
    /// An expression is badly typed.
    #[error("type error")]
    Type(#[source] TypeError),
    /// More elements of one kind than an index can address.
    #[error("too many {0}: at most {max} are supported", max = u16::MAX)]
    Capacity(&'static str),
    /// The SFC as a whole is malformed.
    #[error("malformed SFC")]
    ModelInvariant(#[from] ModelInvariantViolation),
}

/// A variable declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub(crate) name: String,
    pub(crate) r#type: Type,
    pub(crate) init: Option<Val>,
}

impl Variable {
    /// The variable's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The variable's declared type.
    pub fn r#type(&self) -> Type {
        self.r#type
    }

    /// The declared initial value, if any.
    /// Variables without one are inputs of the SFC.
    pub fn init(&self) -> Option<&Val> {
        self.init.as_ref()
    }
}

/// A single assignment `var := expr` of a step's action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// The assigned variable.
    pub var: Var,
    /// The assigned expression.
    pub expr: SfcExpression,
}

/// A step of the chart, with the action executed on entry.
#[derive(Debug, Clone)]
pub struct Step {
    pub(crate) name: String,
    pub(crate) is_initial: bool,
    pub(crate) action: Vec<Assignment>,
    pub(crate) outgoing: SmallVec<[TransitionId; 4]>,
}

impl Step {
    /// The step's unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is the initial step.
    pub fn is_initial(&self) -> bool {
        self.is_initial
    }

    /// The ordered assignments executed when the step is entered.
    pub fn action(&self) -> &[Assignment] {
        &self.action
    }

    /// The transitions leaving the step, in declaration order.
    pub fn outgoing(&self) -> &[TransitionId] {
        &self.outgoing
    }
}

/// A guarded transition between two steps.
#[derive(Debug, Clone)]
pub struct Transition {
    pub(crate) source: StepId,
    pub(crate) target: StepId,
    pub(crate) guard: SfcExpression,
}

impl Transition {
    /// The step the transition leaves.
    pub fn source(&self) -> StepId {
        self.source
    }

    /// The step the transition enters.
    pub fn target(&self) -> StepId {
        self.target
    }

    /// The guard (`true` for unguarded transitions).
    pub fn guard(&self) -> &SfcExpression {
        &self.guard
    }
}

/// A Sequential Function Chart.
#[derive(Debug, Clone)]
pub struct Sfc {
    pub(crate) vars: Vec<Variable>,
    pub(crate) steps: Vec<Step>,
    pub(crate) transitions: Vec<Transition>,
    pub(crate) initial: StepId,
}

impl Sfc {
    /// The variables, in declaration order.
    pub fn vars(&self) -> impl Iterator<Item = (Var, &Variable)> + '_ {
        self.vars
            .iter()
            .enumerate()
            .map(|(idx, var)| (Var(idx as u16), var))
    }

    /// Gets a variable declaration.
    ///
    /// Panics if the variable does not belong to this SFC.
    pub fn var(&self, var: Var) -> &Variable {
        &self.vars[var.index()]
    }

    /// Looks up a variable by name.
    pub fn var_by_name(&self, name: &str) -> Option<Var> {
        self.vars
            .iter()
            .position(|var| var.name == name)
            .map(|idx| Var(idx as u16))
    }

    /// The steps, in declaration order.
    pub fn steps(&self) -> impl Iterator<Item = (StepId, &Step)> + '_ {
        self.steps
            .iter()
            .enumerate()
            .map(|(idx, step)| (StepId(idx as u16), step))
    }

    /// Gets a step.
    ///
    /// Panics if the step does not belong to this SFC.
    pub fn step(&self, step: StepId) -> &Step {
        &self.steps[step.index()]
    }

    /// Looks up a step by name.
    pub fn step_by_name(&self, name: &str) -> Option<StepId> {
        self.steps
            .iter()
            .position(|step| step.name == name)
            .map(|idx| StepId(idx as u16))
    }

    /// The transitions, in declaration order.
    pub fn transitions(&self) -> impl Iterator<Item = (TransitionId, &Transition)> + '_ {
        self.transitions
            .iter()
            .enumerate()
            .map(|(idx, transition)| (TransitionId(idx as u16), transition))
    }

    /// Gets a transition.
    ///
    /// Panics if the transition does not belong to this SFC.
    pub fn transition(&self, transition: TransitionId) -> &Transition {
        &self.transitions[transition.index()]
    }

    /// The unique initial step.
    pub fn initial_step(&self) -> StepId {
        self.initial
    }

    /// The name a variable is displayed with.
    pub fn var_name(&self, var: &Var) -> &str {
        &self.vars[var.index()].name
    }

    /// Steps that no sequence of transitions leads to from the initial step,
    /// in declaration order.
    pub fn unreachable_steps(&self) -> Vec<StepId> {
        let mut reached = vec![false; self.steps.len()];
        let mut queue = VecDeque::from([self.initial]);
        reached[self.initial.index()] = true;
        while let Some(step) = queue.pop_front() {
            for transition in &self.steps[step.index()].outgoing {
                let target = self.transitions[transition.index()].target;
                if !reached[target.index()] {
                    reached[target.index()] = true;
                    queue.push_back(target);
                }
            }
        }
        reached
            .into_iter()
            .enumerate()
            .filter(|(_, reached)| !reached)
            .map(|(idx, _)| StepId(idx as u16))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::BinOp;

    #[test]
    fn unreachable_steps() {
        let mut builder = SfcBuilder::new();
        let a = builder.new_step("A").expect("new step");
        let b = builder.new_step("B").expect("new step");
        let orphan = builder.new_step("Orphan").expect("new step");
        builder.set_initial(a).expect("step exists");
        builder.add_transition(a, b, None).expect("unguarded");
        builder.add_transition(orphan, b, None).expect("unguarded");
        let sfc = builder.build().expect("valid SFC");
        assert_eq!(sfc.unreachable_steps(), vec![orphan]);
        assert_eq!(sfc.step_by_name("B"), Some(b));
        assert_eq!(sfc.step(a).outgoing().len(), 1);
    }

    #[test]
    fn guards_display_with_names() {
        let mut builder = SfcBuilder::new();
        let x = builder.new_var("x", Type::Integer, None).expect("new var");
        let a = builder.new_step("A").expect("new step");
        builder.set_initial(a).expect("step exists");
        let guard = Expression::binary(BinOp::Lt, Expression::Var(x), Expression::from(3));
        builder.add_transition(a, a, Some(guard)).expect("boolean guard");
        let sfc = builder.build().expect("valid SFC");
        let (_, transition) = sfc.transitions().next().expect("one transition");
        let names = |var: &Var| sfc.var_name(var);
        assert_eq!(transition.guard().display(&names).to_string(), "(x < 3)");
    }
}
