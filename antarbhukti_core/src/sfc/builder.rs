use super::{
    Assignment, ModelInvariantViolation, Sfc, SfcError, SfcExpression, Step, StepId, Transition,
    TransitionId, Var, Variable,
};
use crate::grammar::{Expression, Type, TypeError, Val};
use log::{info, warn};
use smallvec::SmallVec;

/// Defines and builds a [`Sfc`].
#[derive(Debug, Clone, Default)]
pub struct SfcBuilder {
    vars: Vec<Variable>,
    steps: Vec<Step>,
    transitions: Vec<Transition>,
}

impl SfcBuilder {
    /// Creates a new [`SfcBuilder`] with no variables, steps or transitions.
    pub fn new() -> Self {
        Self::default()
    }

    // Typing context for expressions over the variables declared so far.
    fn var_type(&self, var: &Var) -> Result<Type, TypeError> {
        self.vars
            .get(var.index())
            .map(|var| var.r#type)
            .ok_or_else(|| TypeError::MissingVar(format!("{var:?}")))
    }

    /// Declares a new variable with the given type and (optional) initial value.
    ///
    /// Fails if the name is taken or if the initial value has a different type.
    ///
    /// ```
    /// # use antarbhukti_core::{Type, Val};
    /// # use antarbhukti_core::sfc::SfcBuilder;
    /// let mut builder = SfcBuilder::new();
    /// builder
    ///     .new_var("flag", Type::Boolean, Some(Val::Integer(0)))
    ///     .expect_err("0 is not a boolean");
    /// builder
    ///     .new_var("flag", Type::Boolean, Some(Val::Boolean(false)))
    ///     .expect("well-typed declaration");
    /// builder
    ///     .new_var("flag", Type::Integer, None)
    ///     .expect_err("name already taken");
    /// ```
    pub fn new_var(
        &mut self,
        name: impl Into<String>,
        r#type: Type,
        init: Option<Val>,
    ) -> Result<Var, SfcError> {
        let name = name.into();
        if self.var(&name).is_some() {
            return Err(SfcError::DuplicateVariable(name));
        }
        if let Some(found) = init.as_ref().filter(|val| val.r#type() != r#type) {
            return Err(SfcError::InitType {
                var: name,
                expected: r#type,
                found: found.clone(),
            });
        }
        let idx = next_index(self.vars.len(), "variables")?;
        self.vars.push(Variable { name, r#type, init });
        Ok(Var(idx))
    }

    /// Looks up a declared variable by name.
    pub fn var(&self, name: &str) -> Option<Var> {
        self.vars
            .iter()
            .position(|var| var.name == name)
            .map(|idx| Var(idx as u16))
    }

    /// Adds a new step with an empty action.
    ///
    /// Fails if the name is taken.
    pub fn new_step(&mut self, name: impl Into<String>) -> Result<StepId, SfcError> {
        let name = name.into();
        if self.step(&name).is_some() {
            return Err(SfcError::DuplicateStep(name));
        }
        let idx = next_index(self.steps.len(), "steps")?;
        self.steps.push(Step {
            name,
            is_initial: false,
            action: Vec::new(),
            outgoing: SmallVec::new(),
        });
        Ok(StepId(idx))
    }

    /// Looks up a step by name.
    pub fn step(&self, name: &str) -> Option<StepId> {
        self.steps
            .iter()
            .position(|step| step.name == name)
            .map(|idx| StepId(idx as u16))
    }

    /// Marks a step as initial.
    ///
    /// Marking more than one step is only reported by [`SfcBuilder::build`].
    pub fn set_initial(&mut self, step: StepId) -> Result<(), SfcError> {
        self.steps
            .get_mut(step.index())
            .ok_or(SfcError::MissingStep(step))?
            .is_initial = true;
        Ok(())
    }

    /// Appends the assignment `var := expr` to the action of a step.
    ///
    /// It fails if the type of the variable and that of the expression do not match.
    ///
    /// ```
    /// # use antarbhukti_core::{Expression, Type};
    /// # use antarbhukti_core::sfc::SfcBuilder;
    /// let mut builder = SfcBuilder::new();
    /// let step = builder.new_step("Init").expect("new step");
    /// let var = builder.new_var("done", Type::Boolean, None).expect("new var");
    /// builder
    ///     .add_assignment(step, var, Expression::from(1))
    ///     .expect_err("var is of type bool but expression is of type integer");
    /// builder
    ///     .add_assignment(step, var, Expression::from(true))
    ///     .expect("var and expression type match");
    /// ```
    pub fn add_assignment(
        &mut self,
        step: StepId,
        var: Var,
        expr: SfcExpression,
    ) -> Result<(), SfcError> {
        let expected = self
            .vars
            .get(var.index())
            .map(|var| var.r#type)
            .ok_or(SfcError::MissingVar(var))?;
        let found = expr
            .r#type(&|var| self.var_type(var))
            .map_err(SfcError::Type)?;
        if expected != found {
            return Err(SfcError::AssignmentType {
                var: self.vars[var.index()].name.clone(),
                expected,
                found,
            });
        }
        self.steps
            .get_mut(step.index())
            .ok_or(SfcError::MissingStep(step))?
            .action
            .push(Assignment { var, expr });
        Ok(())
    }

    /// Adds a transition between two steps,
    /// guarded by a boolean expression (`true` if `None`).
    ///
    /// ```
    /// # use antarbhukti_core::Expression;
    /// # use antarbhukti_core::sfc::SfcBuilder;
    /// let mut builder = SfcBuilder::new();
    /// let step = builder.new_step("Loop").expect("new step");
    /// builder
    ///     .add_transition(step, step, None)
    ///     .expect("this transition can be added");
    /// builder
    ///     .add_transition(step, step, Some(Expression::from(1)))
    ///     .expect_err("the guard expression is not boolean");
    /// ```
    pub fn add_transition(
        &mut self,
        source: StepId,
        target: StepId,
        guard: Option<SfcExpression>,
    ) -> Result<TransitionId, SfcError> {
        if self.steps.len() <= source.index() {
            return Err(SfcError::MissingStep(source));
        }
        if self.steps.len() <= target.index() {
            return Err(SfcError::MissingStep(target));
        }
        let guard = guard.unwrap_or(Expression::from(true));
        match guard.r#type(&|var| self.var_type(var)) {
            Ok(Type::Boolean) => {}
            Ok(other) => return Err(SfcError::NonBooleanGuard(other)),
            Err(err) => return Err(SfcError::Type(err)),
        }
        let idx = TransitionId(next_index(self.transitions.len(), "transitions")?);
        self.transitions.push(Transition {
            source,
            target,
            guard,
        });
        self.steps[source.index()].outgoing.push(idx);
        Ok(idx)
    }

    /// Produces a [`Sfc`] defined by the [`SfcBuilder`]'s data and consuming it.
    ///
    /// Fails unless exactly one step is marked as initial.
    /// Steps that cannot be reached from the initial step are only logged.
    pub fn build(mut self) -> Result<Sfc, SfcError> {
        let mut initials = self.steps.iter().enumerate().filter(|(_, s)| s.is_initial);
        let initial = match (initials.next(), initials.next()) {
            (None, _) => return Err(ModelInvariantViolation::NoInitialStep.into()),
            (Some((idx, _)), None) => StepId(idx as u16),
            (Some(_), Some(_)) => {
                let names = self
                    .steps
                    .iter()
                    .filter(|s| s.is_initial)
                    .map(|s| s.name.clone())
                    .collect();
                return Err(ModelInvariantViolation::MultipleInitialSteps(names).into());
            }
        };
        self.steps.shrink_to_fit();
        self.transitions.shrink_to_fit();
        self.vars.shrink_to_fit();
        info!(
            target: "build",
            "create SFC with {} steps, {} transitions, {} vars",
            self.steps.len(),
            self.transitions.len(),
            self.vars.len()
        );
        let sfc = Sfc {
            vars: self.vars,
            steps: self.steps,
            transitions: self.transitions,
            initial,
        };
        for step in sfc.unreachable_steps() {
            warn!(target: "build", "step '{}' is unreachable from the initial step", sfc.step(step).name);
        }
        Ok(sfc)
    }
}

// Index of the element pushed after `len` others.
fn next_index(len: usize, kind: &'static str) -> Result<u16, SfcError> {
    u16::try_from(len).map_err(|_| SfcError::Capacity(kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_step_invariant() {
        let mut builder = SfcBuilder::new();
        let a = builder.new_step("A").expect("new step");
        let b = builder.new_step("B").expect("new step");
        assert!(matches!(
            builder.clone().build(),
            Err(SfcError::ModelInvariant(ModelInvariantViolation::NoInitialStep))
        ));
        builder.set_initial(a).expect("step exists");
        builder.set_initial(b).expect("step exists");
        match builder.build() {
            Err(SfcError::ModelInvariant(ModelInvariantViolation::MultipleInitialSteps(names))) => {
                assert_eq!(names, vec!["A".to_string(), "B".to_string()])
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn duplicate_names() {
        let mut builder = SfcBuilder::new();
        builder.new_step("A").expect("new step");
        assert!(matches!(
            builder.new_step("A"),
            Err(SfcError::DuplicateStep(name)) if name == "A"
        ));
        builder.new_var("x", Type::Integer, None).expect("new var");
        assert!(matches!(
            builder.new_var("x", Type::Boolean, None),
            Err(SfcError::DuplicateVariable(_))
        ));
    }

    #[test]
    fn index_capacity() {
        assert_eq!(next_index(0, "steps").expect("first index"), 0);
        assert_eq!(next_index(65_535, "steps").expect("last index"), u16::MAX);
        assert!(matches!(
            next_index(65_536, "steps"),
            Err(SfcError::Capacity("steps"))
        ));
    }

    #[test]
    fn transitions_keep_declaration_order() {
        let mut builder = SfcBuilder::new();
        let a = builder.new_step("A").expect("new step");
        let b = builder.new_step("B").expect("new step");
        let c = builder.new_step("C").expect("new step");
        builder.set_initial(a).expect("step exists");
        let t0 = builder.add_transition(a, c, None).expect("unguarded");
        let t1 = builder.add_transition(a, b, None).expect("unguarded");
        let sfc = builder.build().expect("valid SFC");
        assert_eq!(sfc.step(a).outgoing(), &[t0, t1]);
        assert!(matches!(sfc.transition(t0).guard(), Expression::Const(Val::Boolean(true))));
    }
}
