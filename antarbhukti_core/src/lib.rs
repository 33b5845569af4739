//! Containment checking for upgraded *Sequential Function Charts* (SFC).
//!
//! Given an original (*source*) SFC and an upgraded (*target*) one,
//! the checker decides whether the target reproduces every behavior of the source,
//! possibly adding new ones.
//! SFCs are translated into place/transition nets,[^1]
//! whose bounded execution paths are compared symbolically:
//! each path is summarized by a [`PathCondition`],
//! and path containment is discharged by an [`SmtSolver`](solver::SmtSolver).
//! When containment fails, the checker reports [`CutPoint`]s:
//! the steps of the source where the target stops following it,
//! together with a counterexample.
//!
//! [^1]: Murata, T. (1989). Petri nets: Properties, analysis and applications.
//!       *Proceedings of the IEEE*, 77(4), 541-580.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod condition;
mod containment;
mod grammar;
mod net;
mod paths;
pub mod sfc;
pub mod solver;
mod verdict;

pub use condition::{ConditionBuilder, PathCondition, build_condition};
pub use containment::{VerifyConfig, verify, verify_with};
pub use grammar::{BinOp, EvalError, Expression, Integer, Type, TypeError, UnOp, Val};
pub use net::{Net, NetTransition, NetTransitionId, Place, PlaceData, Replay, State, to_net};
pub use paths::{Path, PathBounds, Paths};
pub use sfc::{Sfc, SfcError};
pub use verdict::{
    CutPoint, Mismatch, PathCheck, PathOutcome, PathReport, Side, StructuralCuts, Summary,
    Verdict, VerificationResult, Warning, aggregate,
};
