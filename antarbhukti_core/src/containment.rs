//! Checking that a target SFC reproduces every behavior of a source SFC.
//!
//! Both SFCs are unfolded into bounded paths.
//! A source path is contained in a target path when,
//! for every input driving the source along its path,
//! the target can follow its own path and ends with the same values
//! of the variables the two SFCs share (the *observables*).
//! Each such obligation is discharged by an [`SmtSolver`];
//! source paths contained in no target path become cut points,
//! target paths contained in no source path are extra behaviors.

use crate::condition::{ConditionBuilder, PathCondition};
use crate::grammar::Val;
use crate::net::{Net, NetTransition, Place, Replay, State, to_net};
use crate::paths::{Path, PathBounds};
use crate::sfc::{Sfc, Var};
use crate::solver::{
    DefaultSolver, Limits, Model, Query, SatResult, SmtSolver, Term, UnknownReason,
};
use crate::verdict::{
    CutPoint, Mismatch, PathCheck, PathOutcome, PathReport, Side, StructuralCuts,
    VerificationResult, Warning, aggregate,
};
use log::{debug, info, trace, warn};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Parameters of a verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// How many times a step may be re-entered within one path.
    pub max_loop_unroll: u32,
    /// Time allowed to each solver call, in milliseconds.
    pub per_call_timeout_ms: u64,
    /// Time allowed to the whole run, in milliseconds.
    pub global_deadline_ms: Option<u64>,
    /// Number of worker threads (0 lets the thread pool decide).
    pub parallelism: usize,
    /// Maximum number of transitions in one path.
    pub max_path_len: Option<usize>,
    /// Work bound of each solver call.
    pub search_bound: usize,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            max_loop_unroll: 2,
            per_call_timeout_ms: 5000,
            global_deadline_ms: None,
            parallelism: 0,
            max_path_len: None,
            search_bound: 4096,
        }
    }
}

impl VerifyConfig {
    /// The path enumeration bounds.
    pub fn bounds(&self) -> PathBounds {
        PathBounds {
            max_loop_unroll: self.max_loop_unroll,
            max_path_len: self.max_path_len,
        }
    }
}

/// Checks that `target` contains `source`, using the [`DefaultSolver`].
pub fn verify(source: &Sfc, target: &Sfc, config: &VerifyConfig) -> VerificationResult {
    verify_with(source, target, config, &DefaultSolver::default())
}

/// Checks that `target` contains `source`, using the given solver.
pub fn verify_with<S: SmtSolver>(
    source: &Sfc,
    target: &Sfc,
    config: &VerifyConfig,
    solver: &S,
) -> VerificationResult {
    info!(target: "verify", "verification starting");
    let start_time = Instant::now();
    let deadline = config
        .global_deadline_ms
        .and_then(|ms| start_time.checked_add(Duration::from_millis(ms)));

    let (observables, conflicts, mut warnings) = observables(source, target);
    for (side, sfc) in [(Side::Source, source), (Side::Target, target)] {
        warnings.extend(sfc.unreachable_steps().into_iter().map(|step| {
            Warning::UnreachableStep {
                side,
                step: sfc.step(step).name().to_string(),
            }
        }));
    }

    let bounds = config.bounds();
    let (source_net, target_net) = (to_net(source), to_net(target));
    let checker = Checker {
        solver,
        config,
        deadline,
        cancelled: AtomicBool::new(false),
        source: Chart::new(source, &source_net, "s", &bounds, &conflicts),
        target: Chart::new(target, &target_net, "t", &bounds, &conflicts),
        observables,
    };
    info!(
        target: "verify",
        "{} source paths, {} target paths, {} observables",
        checker.source.paths.len(),
        checker.target.paths.len(),
        checker.observables.len()
    );

    let run = || {
        let source_checks = (0..checker.source.paths.len())
            .into_par_iter()
            .map(|i| checker.check_source(i))
            .collect::<Vec<_>>();
        let target_checks = (0..checker.target.paths.len())
            .into_par_iter()
            .map(|j| checker.check_target(j))
            .collect::<Vec<_>>();
        (source_checks, target_checks)
    };
    let (source_checks, target_checks) = match rayon::ThreadPoolBuilder::new()
        .num_threads(config.parallelism)
        .build()
    {
        Ok(pool) => pool.install(run),
        Err(err) => {
            warn!(target: "verify", "cannot build thread pool ({err}), using the global one");
            run()
        }
    };

    let structure = StructuralCuts {
        source: checker.source.structural_cut_points(),
        target: checker.target.structural_cut_points(),
    };
    let result = aggregate(source_checks, target_checks, structure, warnings);
    let elapsed = start_time.elapsed();
    info!(target: "verify", "verification time elapsed: {elapsed:0.2?}");
    info!(target: "verify", "verdict: {}", result.verdict);
    result
}

/// A variable both SFCs declare with the same type.
#[derive(Debug, Clone)]
struct Observable {
    name: String,
    source: Var,
    target: Var,
}

fn observables(source: &Sfc, target: &Sfc) -> (Vec<Observable>, Vec<String>, Vec<Warning>) {
    let mut observables = Vec::new();
    let mut conflicts = Vec::new();
    let mut warnings = Vec::new();
    for (var, decl) in source.vars() {
        let Some(other) = target.var_by_name(decl.name()) else {
            continue;
        };
        let other_type = target.var(other).r#type();
        if other_type == decl.r#type() {
            observables.push(Observable {
                name: decl.name().to_string(),
                source: var,
                target: other,
            });
        } else {
            warn!(
                target: "verify",
                "variable '{}' is {} in the source but {} in the target: not compared",
                decl.name(),
                decl.r#type(),
                other_type
            );
            conflicts.push(decl.name().to_string());
            warnings.push(Warning::ObservableTypeConflict {
                variable: decl.name().to_string(),
                source: decl.r#type(),
                target: other_type,
            });
        }
    }
    if observables.is_empty() {
        warn!(target: "verify", "no common variables: only control flow is compared");
        warnings.push(Warning::NoCommonVariables);
    }
    (observables, conflicts, warnings)
}

// One side of the check: an SFC with its paths and their conditions.
struct Chart<'a> {
    sfc: &'a Sfc,
    net: &'a Net,
    paths: Vec<Path>,
    conditions: Vec<PathCondition>,
    builder: ConditionBuilder<'a>,
    cuts: Vec<Place>,
}

impl<'a> Chart<'a> {
    fn new(
        sfc: &'a Sfc,
        net: &'a Net,
        namespace: &'a str,
        bounds: &PathBounds,
        private: &[String],
    ) -> Self {
        let builder =
            ConditionBuilder::new(sfc, net, namespace).with_private_inputs(private.iter().cloned());
        let paths = net.paths(bounds).collect::<Vec<_>>();
        let conditions = paths.iter().map(|path| builder.build(path)).collect();
        Self {
            sfc,
            net,
            paths,
            conditions,
            builder,
            cuts: net.structural_cut_points(),
        }
    }

    fn steps(&self, index: usize) -> impl Iterator<Item = &str> + '_ {
        self.paths[index]
            .places
            .iter()
            .map(|place| self.net.place(*place).name())
    }

    fn structural_cut_points(&self) -> Vec<String> {
        self.cuts
            .iter()
            .map(|place| self.net.place(*place).name().to_string())
            .collect()
    }

    fn report(&self, index: usize, outcome: PathOutcome, stats: &Stats) -> PathReport {
        let path = &self.paths[index];
        PathReport {
            index,
            steps: self.steps(index).map(str::to_string).collect(),
            bounded_truncation: path.bounded_truncation(),
            halted: path.halted,
            outcome,
            solver_calls: stats.solver_calls,
            timeouts: stats.timeouts,
        }
    }

    // The states a path goes through when inputs take the values of the model.
    fn replay(&self, index: usize, model: &Model) -> Replay {
        let inputs = |var: Var| model.get(&self.builder.input_symbol(var)).cloned();
        self.net.replay(&self.paths[index].transitions, &inputs)
    }

    fn counterexample(&self, model: &Model, acc: &mut BTreeMap<String, Val>) {
        for (var, decl) in self.sfc.vars() {
            if decl.init().is_none() {
                let symbol = self.builder.input_symbol(var);
                if let Some(val) = model.get(&symbol) {
                    acc.insert(symbol, val.clone());
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct Stats {
    solver_calls: u32,
    timeouts: u32,
}

struct Checker<'a, S> {
    solver: &'a S,
    config: &'a VerifyConfig,
    deadline: Option<Instant>,
    cancelled: AtomicBool,
    source: Chart<'a>,
    target: Chart<'a>,
    observables: Vec<Observable>,
}

impl<S: SmtSolver> Checker<'_, S> {
    fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::Relaxed) {
            warn!(target: "verify", "global deadline expired: pending checks are cancelled");
        }
    }

    // Runs the solver, retrying a timed-out call once with half the work bound.
    fn discharge(&self, query: &Query, stats: &mut Stats) -> SatResult {
        let timeout = Duration::from_millis(self.config.per_call_timeout_ms);
        for attempt in 0..2 {
            if self.cancelled.load(Ordering::Relaxed) {
                return SatResult::Unknown(UnknownReason::Cancelled);
            }
            let now = Instant::now();
            let mut deadline = now.checked_add(timeout);
            if let Some(global) = self.deadline {
                if global <= now {
                    self.cancel();
                    return SatResult::Unknown(UnknownReason::Cancelled);
                }
                deadline = Some(deadline.map_or(global, |d| d.min(global)));
            }
            let limits = Limits {
                deadline: deadline.unwrap_or(now + Duration::from_secs(u32::MAX.into())),
                bound: (self.config.search_bound >> attempt).max(1),
                cancelled: &self.cancelled,
            };
            stats.solver_calls += 1;
            trace!(target: "verify", "query:\n{query}");
            match self.solver.check(query, &limits) {
                SatResult::Unknown(UnknownReason::Timeout) => {
                    stats.timeouts += 1;
                    if self.deadline.is_some_and(|global| Instant::now() >= global) {
                        self.cancel();
                        return SatResult::Unknown(UnknownReason::Cancelled);
                    }
                    debug!(target: "verify", "solver call timed out (attempt {})", attempt + 1);
                }
                result => return result,
            }
        }
        SatResult::Unknown(UnknownReason::Timeout)
    }

    // `path` is contained in `other` iff this query is unsatisfiable:
    // some input follows `path` but not `other`, or ends with different observables.
    fn obligation(&self, path: &PathCondition, other: &PathCondition) -> Query {
        let agree = self.observables.iter().filter_map(|o| {
            let a = path.outputs().get(&o.name)?;
            let b = other.outputs().get(&o.name)?;
            Some(a.clone().eq(b.clone()))
        });
        let follows = Term::and(std::iter::once(other.guard()).chain(agree));
        Query::new([path.formula(), other.definitions(), follows.not()])
    }

    fn check_source(&self, index: usize) -> PathCheck {
        let mut stats = Stats::default();
        let p = &self.source.conditions[index];
        let (outcome, cut_point) = match self.discharge(&Query::new([p.formula()]), &mut stats) {
            SatResult::Unsat => (PathOutcome::Infeasible, None),
            SatResult::Unknown(reason) => (PathOutcome::Unknown { reason }, None),
            SatResult::Sat(witness) => {
                let mut candidates = Vec::new();
                let mut undecided = None;
                let mut contained = None;
                for (j, q) in self.target.conditions.iter().enumerate() {
                    match self.discharge(&self.obligation(p, q), &mut stats) {
                        SatResult::Unsat => {
                            contained = Some(j);
                            break;
                        }
                        SatResult::Sat(model) => candidates.push((j, model)),
                        SatResult::Unknown(reason) => {
                            undecided.get_or_insert(reason);
                        }
                    }
                }
                match (contained, undecided) {
                    (Some(by), _) => (PathOutcome::Contained { by }, None),
                    (None, Some(reason)) => (PathOutcome::Unknown { reason }, None),
                    (None, None) => match self.resumed(index, &mut stats) {
                        Some(by) => (PathOutcome::Resumed { by }, None),
                        None => {
                            let closest = self.closest(index, &candidates);
                            let cut = self.localize(index, &candidates, closest.as_ref(), &witness);
                            (PathOutcome::Diverges, Some(cut))
                        }
                    },
                }
            }
        };
        debug!(target: "verify", "source path {index}: {outcome:?}");
        PathCheck {
            report: self.source.report(index, outcome, &stats),
            cut_point,
        }
    }

    fn check_target(&self, index: usize) -> PathCheck {
        let mut stats = Stats::default();
        let q = &self.target.conditions[index];
        let outcome = match self.discharge(&Query::new([q.formula()]), &mut stats) {
            // A transition the source does not have is new behavior, even if never taken.
            SatResult::Unsat if self.novel(index) => PathOutcome::Extra,
            SatResult::Unsat => PathOutcome::Infeasible,
            SatResult::Unknown(reason) => PathOutcome::Unknown { reason },
            SatResult::Sat(_) => {
                let mut undecided = None;
                let mut contained = None;
                for (i, p) in self.source.conditions.iter().enumerate() {
                    match self.discharge(&self.obligation(q, p), &mut stats) {
                        SatResult::Unsat => {
                            contained = Some(i);
                            break;
                        }
                        SatResult::Sat(_) => {}
                        SatResult::Unknown(reason) => {
                            undecided.get_or_insert(reason);
                        }
                    }
                }
                match (contained, undecided) {
                    (Some(by), _) => PathOutcome::Contained { by },
                    (None, Some(reason)) => PathOutcome::Unknown { reason },
                    (None, None) => PathOutcome::Extra,
                }
            }
        };
        debug!(target: "verify", "target path {index}: {outcome:?}");
        PathCheck {
            report: self.target.report(index, outcome, &stats),
            cut_point: None,
        }
    }

    // Whether the target path fires a transition between steps the source does not link.
    // Halting paths only add the negation of existing guards.
    fn novel(&self, index: usize) -> bool {
        let (source, target) = (self.source.net, self.target.net);
        let path = &self.target.paths[index];
        !path.halted
            && path.transitions.iter().any(|&t| {
                let wanted = link(target, target.transition(t));
                !source.transitions().any(|(_, s)| link(source, s) == wanted)
            })
    }

    fn observe(&self, states: &[State], side: Side) -> Vec<Vec<Val>> {
        states
            .iter()
            .map(|state| {
                self.observables
                    .iter()
                    .map(|o| {
                        let var = if side == Side::Source { o.source } else { o.target };
                        state.vals[var.index()].clone()
                    })
                    .collect()
            })
            .collect()
    }

    // A target path that, for some input halting the source along path `index`,
    // goes through every state the source halts in and then moves on.
    fn resumed(&self, index: usize, stats: &mut Stats) -> Option<usize> {
        if !self.source.paths[index].halted {
            return None;
        }
        let p = &self.source.conditions[index];
        (0..self.target.paths.len())
            .filter(|j| !self.target.paths[*j].halted)
            .find(|&j| {
                let q = &self.target.conditions[j];
                let query = Query::new([p.formula(), q.formula()]);
                let SatResult::Sat(model) = self.discharge(&query, stats) else {
                    return false;
                };
                let source = self.observe(&self.source.replay(index, &model).trace, Side::Source);
                let replay = self.target.replay(j, &model);
                replay.blocked_at.is_none()
                    && agreement(&source, &self.observe(&replay.trace, Side::Target)) == source.len()
            })
    }

    // Replays the source path and each candidate under the candidate's model,
    // and picks the candidate reproducing the most source observations (the first on ties).
    fn closest(&self, index: usize, candidates: &[(usize, Model)]) -> Option<Closest> {
        let last = self.source.paths[index].places.len() - 1;
        let mut best: Option<Closest> = None;
        for (k, (j, model)) in candidates.iter().enumerate() {
            let source = self.observe(&self.source.replay(index, model).trace, Side::Source);
            let replay = self.target.replay(*j, model);
            let target = self.observe(&replay.trace, Side::Target);
            let agreed = agreement(&source, &target);
            if best.as_ref().is_none_or(|b| agreed > b.agreed) {
                let cut = if agreed > last {
                    // Every observation is matched, but not the final one in time:
                    // blame the step where the source settled on its final values.
                    settled(&source)
                } else {
                    agreed
                };
                best = Some(Closest {
                    agreed,
                    cut: cut.min(last),
                    candidate: k,
                    disabled: replay.blocked_at.is_some(),
                });
            }
        }
        best
    }

    // Cuts at the first source step the closest candidate does not reproduce.
    // The transition entering the cut is kept when that candidate
    // was stopped by a disabled guard.
    fn localize(
        &self,
        index: usize,
        candidates: &[(usize, Model)],
        closest: Option<&Closest>,
        witness: &Model,
    ) -> CutPoint {
        let path = &self.source.paths[index];
        let cut = closest.map_or(0, |c| c.cut);
        let disabled = closest.is_some_and(|c| c.disabled);
        let mut counterexample = BTreeMap::new();
        let mut mismatches = Vec::new();
        match closest.map(|c| &candidates[c.candidate]) {
            Some((j, model)) => {
                self.source.counterexample(model, &mut counterexample);
                self.target.counterexample(model, &mut counterexample);
                let source = self.source.replay(index, model);
                let target = self.target.replay(*j, model);
                if let (Some(s), Some(t)) = (source.trace.last(), target.trace.last()) {
                    for o in &self.observables {
                        let (a, b) = (&s.vals[o.source.index()], &t.vals[o.target.index()]);
                        if a != b {
                            mismatches.push(Mismatch {
                                variable: o.name.clone(),
                                source: a.clone(),
                                target: b.clone(),
                            });
                        }
                    }
                }
            }
            None => self.source.counterexample(witness, &mut counterexample),
        }
        let net = self.source.net;
        let decision = path.places[..cut]
            .iter()
            .rev()
            .find(|place| self.source.cuts.contains(place))
            .map_or(path.places[cut], |place| *place);
        CutPoint {
            step: net.place(path.places[cut]).name().to_string(),
            decision_step: net.place(decision).name().to_string(),
            transition: (disabled && cut > 0)
                .then(|| net.transition(path.transitions[cut - 1]).label().to_string()),
            source_path: index,
            closest_target_path: closest.map(|c| candidates[c.candidate].0),
            counterexample,
            mismatches,
        }
    }
}

// The target path that follows a diverging source path the longest.
struct Closest {
    // Source observations reproduced.
    agreed: usize,
    cut: usize,
    // Position in the candidate list.
    candidate: usize,
    // Whether the target path was stopped by a disabled guard.
    disabled: bool,
}

// The names of the steps a transition links.
fn link<'n>(net: &'n Net, transition: &NetTransition) -> (&'n str, &'n str) {
    (
        net.place(transition.pre()).name(),
        net.place(transition.post()).name(),
    )
}

// Number of source observations the target reproduces in order.
// Repeated observations match the same target state,
// and target states in between are skipped.
fn agreement(source: &[Vec<Val>], target: &[Vec<Val>]) -> usize {
    let mut from = 0;
    let mut agreed = 0;
    for obs in source {
        match target[from..].iter().position(|t| t == obs) {
            Some(offset) => {
                from += offset;
                agreed += 1;
            }
            None => break,
        }
    }
    agreed
}

// First position from which the observations no longer change.
fn settled(observations: &[Vec<Val>]) -> usize {
    match observations.last() {
        Some(last) => observations
            .iter()
            .rposition(|obs| obs != last)
            .map_or(0, |pos| pos + 1),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(values: &[i64]) -> Vec<Vec<Val>> {
        values.iter().map(|v| vec![Val::Integer(*v)]).collect()
    }

    #[test]
    fn stutter_insensitive_agreement() {
        assert_eq!(agreement(&obs(&[0, 1, 2]), &obs(&[0, 1, 2])), 3);
        // Inserted steps in the target are skipped.
        assert_eq!(agreement(&obs(&[0, 1, 2]), &obs(&[0, 0, 1, 5, 2])), 3);
        // Repeated source observations match the same target state.
        assert_eq!(agreement(&obs(&[0, 0, 1]), &obs(&[0, 1])), 3);
        assert_eq!(agreement(&obs(&[0, 3, 2]), &obs(&[0, 1, 2])), 1);
    }

    #[test]
    fn settling_point() {
        assert_eq!(settled(&obs(&[0, 1, 1])), 1);
        assert_eq!(settled(&obs(&[4, 4, 4])), 0);
        assert_eq!(settled(&obs(&[0, 1, 2])), 2);
    }

    #[test]
    fn config_defaults() {
        let config: VerifyConfig = serde_json::from_str(r#"{"max_loop_unroll": 3}"#)
            .expect("partial configuration");
        assert_eq!(config.max_loop_unroll, 3);
        assert_eq!(config.per_call_timeout_ms, 5000);
        assert_eq!(config.search_bound, 4096);
        assert_eq!(config.bounds().max_path_len, None);
    }
}
