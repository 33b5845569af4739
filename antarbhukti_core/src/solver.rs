//! Satisfiability checking for path obligations.
//!
//! Solvers are three-valued: besides [`SatResult::Sat`] and [`SatResult::Unsat`],
//! a query can end as [`SatResult::Unknown`] when the solver runs out of time,
//! is cancelled, or cannot decide it.

mod bounded;
mod linear;
mod term;
#[cfg(feature = "z3")]
mod z3_backend;

pub use bounded::BoundedSolver;
pub use term::Term;
#[cfg(feature = "z3")]
pub use z3_backend::Z3Solver;

/// The solver [`verify`](crate::verify) uses:
/// [`Z3Solver`] when the `z3` feature is enabled, [`BoundedSolver`] otherwise.
#[cfg(feature = "z3")]
pub type DefaultSolver = Z3Solver;
/// The solver [`verify`](crate::verify) uses:
/// `Z3Solver` when the `z3` feature is enabled, [`BoundedSolver`] otherwise.
#[cfg(not(feature = "z3"))]
pub type DefaultSolver = BoundedSolver;

use crate::grammar::Val;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// An assignment of values to the symbols of a query.
pub type Model = BTreeMap<String, Val>;

/// Why a query was left undecided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownReason {
    /// The per-call deadline expired.
    Timeout,
    /// The run was cancelled (e.g. by the global deadline).
    Cancelled,
    /// The solver gave up within its search bound.
    Incomplete,
}

impl fmt::Display for UnknownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnknownReason::Timeout => write!(f, "timeout"),
            UnknownReason::Cancelled => write!(f, "cancelled"),
            UnknownReason::Incomplete => write!(f, "incomplete"),
        }
    }
}

/// The outcome of a satisfiability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SatResult {
    /// Satisfiable, with a witness.
    Sat(Model),
    /// Unsatisfiable.
    Unsat,
    /// Undecided.
    Unknown(UnknownReason),
}

/// A conjunction of assertions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    assertions: Vec<Term>,
}

impl Query {
    /// Creates a query asserting all the given terms.
    pub fn new(assertions: impl IntoIterator<Item = Term>) -> Self {
        Self {
            assertions: assertions.into_iter().collect(),
        }
    }

    /// The asserted terms.
    pub fn assertions(&self) -> &[Term] {
        &self.assertions
    }

    /// The conjunction of the asserted terms.
    pub fn formula(&self) -> Term {
        Term::and(self.assertions.iter().cloned())
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for assertion in &self.assertions {
            writeln!(f, "(assert {assertion})")?;
        }
        Ok(())
    }
}

/// Resource limits for a single check.
#[derive(Debug, Clone, Copy)]
pub struct Limits<'a> {
    /// The check must return by this instant.
    pub deadline: Instant,
    /// Work bound (search nodes and candidate models).
    pub bound: usize,
    /// Raised when the whole run is cancelled.
    pub cancelled: &'a AtomicBool,
}

impl Limits<'_> {
    /// Whether the check should stop, and why.
    pub fn interrupted(&self) -> Option<UnknownReason> {
        if self.cancelled.load(Ordering::Relaxed) {
            Some(UnknownReason::Cancelled)
        } else if Instant::now() >= self.deadline {
            Some(UnknownReason::Timeout)
        } else {
            None
        }
    }
}

/// A satisfiability checker that can be shared across worker threads.
pub trait SmtSolver: Sync {
    /// Checks whether the conjunction of the query's assertions is satisfiable.
    fn check(&self, query: &Query, limits: &Limits<'_>) -> SatResult;
}

impl<S: SmtSolver + ?Sized> SmtSolver for &S {
    fn check(&self, query: &Query, limits: &Limits<'_>) -> SatResult {
        (**self).check(query, limits)
    }
}
