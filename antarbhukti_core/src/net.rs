//! Place/transition nets derived from SFCs.
//!
//! Each step becomes a place and each SFC transition a net transition
//! that carries the guard and the entry action of its target step.
//! The net can be analysed structurally and executed concretely,
//! which is how counterexamples are replayed.

use crate::grammar::{EvalError, Expression, Type, Val};
use crate::sfc::{Assignment, Sfc, SfcExpression, StepId, TransitionId, Var, Variable};
use log::trace;
use smallvec::SmallVec;

/// An indexing object for places of a [`Net`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Place(pub(crate) u16);

impl Place {
    /// The position of the place (and of its step) in declaration order.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An indexing object for transitions of a [`Net`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetTransitionId(pub(crate) u16);

impl NetTransitionId {
    /// The position of the transition in declaration order.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A place, named after its step.
#[derive(Debug, Clone)]
pub struct PlaceData {
    name: String,
    outgoing: SmallVec<[NetTransitionId; 4]>,
}

impl PlaceData {
    /// The name of the step the place stands for.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The transitions consuming the place's token, in declaration order.
    pub fn outgoing(&self) -> &[NetTransitionId] {
        &self.outgoing
    }
}

/// A net transition.
#[derive(Debug, Clone)]
pub struct NetTransition {
    label: String,
    pre: Place,
    post: Place,
    guard: SfcExpression,
    effect: Vec<Assignment>,
    origin: TransitionId,
}

impl NetTransition {
    /// The label `t_i`, where `i` is the declaration index.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The input place.
    pub fn pre(&self) -> Place {
        self.pre
    }

    /// The output place.
    pub fn post(&self) -> Place {
        self.post
    }

    /// The enabling condition.
    pub fn guard(&self) -> &SfcExpression {
        &self.guard
    }

    /// The assignments applied on firing (the entry action of the target step).
    pub fn effect(&self) -> &[Assignment] {
        &self.effect
    }

    /// The SFC transition this net transition was built from.
    pub fn origin(&self) -> TransitionId {
        self.origin
    }
}

/// A concrete state: the marked place and a valuation of the variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    /// The only marked place.
    pub marking: Place,
    /// Values indexed by [`Var`].
    pub vals: Vec<Val>,
}

/// The outcome of replaying a sequence of transitions.
#[derive(Debug, Clone)]
pub struct Replay {
    /// The states visited, starting from the initial one.
    pub trace: Vec<State>,
    /// Position of the first transition that could not fire, if any.
    pub blocked_at: Option<usize>,
}

/// A 1-safe net with a single token.
#[derive(Debug, Clone)]
pub struct Net {
    places: Vec<PlaceData>,
    transitions: Vec<NetTransition>,
    initial_marking: Place,
    initial_effect: Vec<Assignment>,
    vars: Vec<Variable>,
}

impl From<&Sfc> for Net {
    fn from(sfc: &Sfc) -> Self {
        let places = sfc
            .steps()
            .map(|(_, step)| PlaceData {
                name: step.name().to_string(),
                outgoing: step
                    .outgoing()
                    .iter()
                    .map(|t| NetTransitionId(t.index() as u16))
                    .collect(),
            })
            .collect::<Vec<_>>();
        let transitions = sfc
            .transitions()
            .map(|(id, transition)| NetTransition {
                label: format!("t_{}", id.index()),
                pre: place_of(transition.source()),
                post: place_of(transition.target()),
                guard: transition.guard().clone(),
                effect: sfc.step(transition.target()).action().to_vec(),
                origin: id,
            })
            .collect::<Vec<_>>();
        let initial = sfc.initial_step();
        trace!(
            target: "build",
            "net with {} places and {} transitions",
            places.len(),
            transitions.len()
        );
        Net {
            places,
            transitions,
            initial_marking: place_of(initial),
            initial_effect: sfc.step(initial).action().to_vec(),
            vars: sfc.vars().map(|(_, var)| var.clone()).collect(),
        }
    }
}

/// Converts a [`Sfc`] into its [`Net`].
pub fn to_net(sfc: &Sfc) -> Net {
    Net::from(sfc)
}

fn place_of(step: StepId) -> Place {
    Place(step.index() as u16)
}

impl Net {
    /// The places, in step declaration order.
    pub fn places(&self) -> impl Iterator<Item = (Place, &PlaceData)> + '_ {
        self.places
            .iter()
            .enumerate()
            .map(|(idx, place)| (Place(idx as u16), place))
    }

    /// Gets a place.
    ///
    /// Panics if the place does not belong to this net.
    pub fn place(&self, place: Place) -> &PlaceData {
        &self.places[place.index()]
    }

    /// The transitions, in declaration order.
    pub fn transitions(&self) -> impl Iterator<Item = (NetTransitionId, &NetTransition)> + '_ {
        self.transitions
            .iter()
            .enumerate()
            .map(|(idx, t)| (NetTransitionId(idx as u16), t))
    }

    /// Gets a transition.
    ///
    /// Panics if the transition does not belong to this net.
    pub fn transition(&self, transition: NetTransitionId) -> &NetTransition {
        &self.transitions[transition.index()]
    }

    /// The place marked at the start.
    pub fn initial_marking(&self) -> Place {
        self.initial_marking
    }

    /// The entry action of the initial step, applied before any transition fires.
    pub fn initial_effect(&self) -> &[Assignment] {
        &self.initial_effect
    }

    /// The step a place stands for.
    pub fn step_of(&self, place: Place) -> StepId {
        StepId(place.0)
    }

    /// Whether a token may stay in `place` forever:
    /// the place has outgoing transitions and none of them is unguarded.
    pub fn may_halt(&self, place: Place) -> bool {
        let outgoing = &self.places[place.index()].outgoing;
        !outgoing.is_empty()
            && outgoing.iter().all(|t| {
                !matches!(
                    self.transitions[t.index()].guard,
                    Expression::Const(Val::Boolean(true))
                )
            })
    }

    /// Places where behaviors can be told apart:
    /// the initial place, branching and terminal places, and loop heads.
    ///
    /// Loop heads are the targets of back edges of a depth-first visit from the initial place,
    /// so only reachable places are considered for them.
    pub fn structural_cut_points(&self) -> Vec<Place> {
        let mut cuts = vec![false; self.places.len()];
        cuts[self.initial_marking.index()] = true;
        for (place, data) in self.places() {
            if data.outgoing.len() != 1 {
                cuts[place.index()] = true;
            }
        }
        // 0: unvisited, 1: on the stack, 2: done
        let mut color = vec![0u8; self.places.len()];
        let mut stack = vec![(self.initial_marking, 0usize)];
        color[self.initial_marking.index()] = 1;
        while let Some((place, next)) = stack.last_mut() {
            let outgoing = &self.places[place.index()].outgoing;
            if let Some(t) = outgoing.get(*next) {
                *next += 1;
                let post = self.transitions[t.index()].post;
                match color[post.index()] {
                    0 => {
                        color[post.index()] = 1;
                        stack.push((post, 0));
                    }
                    1 => cuts[post.index()] = true,
                    _ => {}
                }
            } else {
                color[place.index()] = 2;
                stack.pop();
            }
        }
        cuts.into_iter()
            .enumerate()
            .filter(|(_, cut)| *cut)
            .map(|(idx, _)| Place(idx as u16))
            .collect()
    }

    /// The state before any transition fires:
    /// variables start at their declared initial value,
    /// or at the value given by `inputs` (the type's default if none),
    /// then the initial step's action is applied.
    pub fn initial_state<F>(&self, inputs: &F) -> Result<State, EvalError>
    where
        F: Fn(Var) -> Option<Val>,
    {
        let vals = self
            .vars
            .iter()
            .enumerate()
            .map(|(idx, var)| match var.init() {
                Some(init) => init.clone(),
                None => inputs(Var(idx as u16))
                    .filter(|val| val.r#type() == var.r#type())
                    .unwrap_or_else(|| var.r#type().default_value()),
            })
            .collect();
        let mut state = State {
            marking: self.initial_marking,
            vals,
        };
        apply_effect(&self.initial_effect, &mut state.vals)?;
        Ok(state)
    }

    /// Whether the transition can fire in the given state.
    pub fn enabled(&self, state: &State, transition: NetTransitionId) -> Result<bool, EvalError> {
        let t = self.transition(transition);
        if t.pre != state.marking {
            return Ok(false);
        }
        match t.guard.eval(&|var: &Var| state.vals[var.index()].clone())? {
            Val::Boolean(enabled) => Ok(enabled),
            _ => Err(EvalError::TypeMismatch),
        }
    }

    /// Fires an enabled transition: moves the token and applies the effect.
    pub fn fire(&self, state: &mut State, transition: NetTransitionId) -> Result<(), EvalError> {
        let t = self.transition(transition);
        apply_effect(&t.effect, &mut state.vals)?;
        state.marking = t.post;
        Ok(())
    }

    /// Replays a sequence of transitions from the initial state,
    /// stopping at the first one that is not enabled (or fails to evaluate).
    pub fn replay<F>(&self, transitions: &[NetTransitionId], inputs: &F) -> Replay
    where
        F: Fn(Var) -> Option<Val>,
    {
        let mut state = match self.initial_state(inputs) {
            Ok(state) => state,
            Err(_) => {
                return Replay {
                    trace: Vec::new(),
                    blocked_at: Some(0),
                };
            }
        };
        let mut trace = vec![state.clone()];
        for (pos, &t) in transitions.iter().enumerate() {
            if !matches!(self.enabled(&state, t), Ok(true)) || self.fire(&mut state, t).is_err() {
                return Replay {
                    trace,
                    blocked_at: Some(pos),
                };
            }
            trace.push(state.clone());
        }
        Replay {
            trace,
            blocked_at: None,
        }
    }

    /// The variables of the net, in declaration order.
    pub fn vars(&self) -> impl Iterator<Item = (Var, &Variable)> + '_ {
        self.vars
            .iter()
            .enumerate()
            .map(|(idx, var)| (Var(idx as u16), var))
    }

    /// The type of a variable.
    pub fn var_type(&self, var: Var) -> Type {
        self.vars[var.index()].r#type()
    }
}

// Assignments are sequential: later ones read the values written by earlier ones.
fn apply_effect(effect: &[Assignment], vals: &mut [Val]) -> Result<(), EvalError> {
    for Assignment { var, expr } in effect {
        let val = expr.eval(&|var: &Var| vals[var.index()].clone())?;
        vals[var.index()] = val;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::BinOp;
    use crate::sfc::SfcBuilder;

    // Init -> Loop -> Loop (i < 3) | Loop -> Done (i >= 3)
    fn counter() -> Sfc {
        let mut builder = SfcBuilder::new();
        let i = builder.new_var("i", Type::Integer, None).expect("new var");
        let init = builder.new_step("Init").expect("new step");
        let body = builder.new_step("Loop").expect("new step");
        let done = builder.new_step("Done").expect("new step");
        builder.set_initial(init).expect("step exists");
        builder
            .add_assignment(init, i, Expression::from(0))
            .expect("well-typed");
        let incr = Expression::binary(BinOp::Add, Expression::Var(i), Expression::from(1));
        builder.add_assignment(body, i, incr).expect("well-typed");
        builder.add_transition(init, body, None).expect("unguarded");
        let lt = Expression::binary(BinOp::Lt, Expression::Var(i), Expression::from(3));
        builder.add_transition(body, body, Some(lt)).expect("boolean");
        let ge = Expression::binary(BinOp::Ge, Expression::Var(i), Expression::from(3));
        builder.add_transition(body, done, Some(ge)).expect("boolean");
        builder.build().expect("valid SFC")
    }

    #[test]
    fn conversion() {
        let sfc = counter();
        let net = to_net(&sfc);
        assert_eq!(net.places().count(), 3);
        let labels: Vec<_> = net.transitions().map(|(_, t)| t.label().to_string()).collect();
        assert_eq!(labels, ["t_0", "t_1", "t_2"]);
        let (_, t0) = net.transitions().next().expect("transition");
        assert_eq!(t0.effect().len(), 1);
        assert_eq!(net.initial_effect().len(), 1);
        // Init always moves on, Loop stalls if neither guard holds, Done is terminal.
        let halting: Vec<_> = net.places().map(|(p, _)| net.may_halt(p)).collect();
        assert_eq!(halting, [false, true, false]);
    }

    #[test]
    fn cut_points() {
        let net = to_net(&counter());
        // Init (initial), Loop (branching and loop head), Done (terminal)
        assert_eq!(net.structural_cut_points(), vec![Place(0), Place(1), Place(2)]);
    }

    #[test]
    fn concrete_replay() {
        let net = to_net(&counter());
        let ids = |idx: &[u16]| idx.iter().map(|i| NetTransitionId(*i)).collect::<Vec<_>>();
        let run = net.replay(&ids(&[0, 1, 1, 2]), &|_| None);
        assert_eq!(run.blocked_at, None);
        let last = run.trace.last().expect("final state");
        assert_eq!(last.vals, vec![Val::Integer(3)]);
        assert_eq!(last.marking, Place(2));
        // i = 2 after one iteration: the exit guard is disabled.
        let run = net.replay(&ids(&[0, 1, 2]), &|_| None);
        assert_eq!(run.blocked_at, Some(2));
        assert_eq!(run.trace.len(), 3);
    }
}
