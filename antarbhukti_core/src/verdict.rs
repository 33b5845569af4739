//! Verification results and their aggregation.

use crate::grammar::{Type, Val};
use crate::solver::UnknownReason;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The overall relation between the source and the target SFC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Each SFC reproduces every behavior of the other.
    Equivalent,
    /// The target reproduces every source behavior and has some of its own.
    TargetSupersedes,
    /// Some source behavior is not reproduced by the target.
    Diverges,
    /// Containment could not be decided.
    Unknown,
}

impl Verdict {
    /// Whether the target contains the source.
    pub fn is_contained(self) -> bool {
        matches!(self, Verdict::Equivalent | Verdict::TargetSupersedes)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Equivalent => write!(f, "equivalent"),
            Verdict::TargetSupersedes => write!(f, "target supersedes source"),
            Verdict::Diverges => write!(f, "diverges"),
            Verdict::Unknown => write!(f, "unknown"),
        }
    }
}

/// Which of the two SFCs something refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The original SFC.
    Source,
    /// The upgraded SFC.
    Target,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => write!(f, "source"),
            Side::Target => write!(f, "target"),
        }
    }
}

/// A variable that ends with different values on the two sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    /// The variable's name.
    pub variable: String,
    /// Its value in the source.
    pub source: Val,
    /// Its value in the target.
    pub target: Val,
}

/// The place where the target stops reproducing a source behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutPoint {
    /// The source step no target path reproduces.
    pub step: String,
    /// The last step before `step` where the source path could have gone another way
    /// (see [`StructuralCuts`]), or `step` itself if it is the first one.
    pub decision_step: String,
    /// The source transition entering that step, if any.
    pub transition: Option<String>,
    /// Index of the source path.
    pub source_path: usize,
    /// Index of the target path that follows the source the longest.
    pub closest_target_path: Option<usize>,
    /// Input values exhibiting the divergence.
    pub counterexample: BTreeMap<String, Val>,
    /// Final values that differ under the counterexample.
    pub mismatches: Vec<Mismatch>,
}

/// The outcome of checking a single path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PathOutcome {
    /// Reproduced by the path with the given index on the other side.
    Contained {
        /// Index of the reproducing path.
        by: usize,
    },
    /// No input drives the SFC along the path.
    Infeasible,
    /// A source path no target path reproduces.
    Diverges,
    /// A target path no source path reproduces.
    Extra,
    /// A source path that halts where the target moves on,
    /// after going through the same states.
    Resumed {
        /// Index of the target path moving on.
        by: usize,
    },
    /// The check was not decided.
    Unknown {
        /// Why the check was not decided.
        reason: UnknownReason,
    },
}

/// Per-path result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathReport {
    /// Index of the path in enumeration order.
    pub index: usize,
    /// The steps visited.
    pub steps: Vec<String>,
    /// Whether the path was cut short by the enumeration bounds.
    pub bounded_truncation: bool,
    /// Whether the path stops where no outgoing guard holds.
    pub halted: bool,
    /// The outcome.
    pub outcome: PathOutcome,
    /// Solver calls made for this path.
    pub solver_calls: u32,
    /// Solver calls that timed out.
    pub timeouts: u32,
}

/// The checks made for one path, before aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathCheck {
    /// The per-path result.
    pub report: PathReport,
    /// The cut point, for diverging source paths.
    pub cut_point: Option<CutPoint>,
}

/// Non-fatal findings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// A step cannot be reached from the initial step.
    UnreachableStep {
        /// The SFC the step belongs to.
        side: Side,
        /// The step's name.
        step: String,
    },
    /// A variable has different types in the two SFCs and is not compared.
    ObservableTypeConflict {
        /// The variable's name.
        variable: String,
        /// Its type in the source.
        source: Type,
        /// Its type in the target.
        target: Type,
    },
    /// The SFCs share no variable, so only control flow is compared.
    NoCommonVariables,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::UnreachableStep { side, step } => {
                write!(f, "{side} step '{step}' is unreachable")
            }
            Warning::ObservableTypeConflict {
                variable,
                source,
                target,
            } => write!(
                f,
                "variable '{variable}' is {source} in the source and {target} in the target, and is not compared"
            ),
            Warning::NoCommonVariables => write!(f, "the SFCs have no variable in common"),
        }
    }
}

/// Totals over all paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Source paths explored.
    pub source_paths: usize,
    /// Target paths explored.
    pub target_paths: usize,
    /// Paths cut short by the enumeration bounds.
    pub truncated_paths: usize,
    /// Solver calls made.
    pub solver_calls: u32,
    /// Solver calls that timed out.
    pub timeouts: u32,
    /// Paths whose check was not decided.
    pub unknown: usize,
    /// Infeasible paths.
    pub infeasible: usize,
    /// Target paths no source path reproduces.
    pub extra_behaviors: usize,
    /// Halting source paths the target moves on from.
    pub resumed: usize,
}

/// The steps of each SFC where behaviors can be told apart
/// (see [`Net::structural_cut_points`](crate::Net::structural_cut_points)).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralCuts {
    /// Steps of the source SFC.
    pub source: Vec<String>,
    /// Steps of the target SFC.
    pub target: Vec<String>,
}

/// The result of checking that the target SFC contains the source SFC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// The overall verdict.
    pub verdict: Verdict,
    /// Whether some check was left undecided.
    pub incomplete: bool,
    /// Where the target diverges (empty unless the verdict is [`Verdict::Diverges`]).
    pub cut_points: Vec<CutPoint>,
    /// Source path results, in enumeration order.
    pub source_paths: Vec<PathReport>,
    /// Target path results, in enumeration order.
    pub target_paths: Vec<PathReport>,
    /// Totals.
    pub summary: Summary,
    /// Candidate cut points of both SFCs, from their structure alone.
    pub structural_cut_points: StructuralCuts,
    /// Non-fatal findings.
    pub warnings: Vec<Warning>,
}

/// Combines per-path checks into a [`VerificationResult`].
///
/// Diverging source paths decide the verdict first,
/// then undecided source paths, then extra target behaviors
/// (including halts the target moves on from),
/// then undecided target paths.
pub fn aggregate(
    source: Vec<PathCheck>,
    target: Vec<PathCheck>,
    structural_cut_points: StructuralCuts,
    warnings: Vec<Warning>,
) -> VerificationResult {
    let unknown = |checks: &[PathCheck]| {
        checks
            .iter()
            .filter(|c| matches!(c.report.outcome, PathOutcome::Unknown { .. }))
            .count()
    };
    let count = |outcome: PathOutcome| {
        source
            .iter()
            .chain(&target)
            .filter(|c| c.report.outcome == outcome)
            .count()
    };
    let (source_unknown, target_unknown) = (unknown(&source), unknown(&target));
    let extra_behaviors = count(PathOutcome::Extra);
    let resumed = source
        .iter()
        .filter(|c| matches!(c.report.outcome, PathOutcome::Resumed { .. }))
        .count();
    let summary = Summary {
        source_paths: source.len(),
        target_paths: target.len(),
        truncated_paths: source
            .iter()
            .chain(&target)
            .filter(|c| c.report.bounded_truncation)
            .count(),
        solver_calls: source
            .iter()
            .chain(&target)
            .map(|c| c.report.solver_calls)
            .sum(),
        timeouts: source.iter().chain(&target).map(|c| c.report.timeouts).sum(),
        unknown: source_unknown + target_unknown,
        infeasible: count(PathOutcome::Infeasible),
        extra_behaviors,
        resumed,
    };
    let cut_points = source
        .iter()
        .filter_map(|c| c.cut_point.clone())
        .collect::<Vec<_>>();
    let verdict = if !cut_points.is_empty() {
        Verdict::Diverges
    } else if source_unknown > 0 {
        Verdict::Unknown
    } else if extra_behaviors > 0 || resumed > 0 {
        Verdict::TargetSupersedes
    } else if target_unknown > 0 {
        Verdict::Unknown
    } else {
        Verdict::Equivalent
    };
    VerificationResult {
        verdict,
        incomplete: summary.unknown > 0,
        cut_points,
        source_paths: source.into_iter().map(|c| c.report).collect(),
        target_paths: target.into_iter().map(|c| c.report).collect(),
        summary,
        structural_cut_points,
        warnings,
    }
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Verdict: {}", self.verdict)?;
        if self.incomplete {
            write!(f, " (incomplete)")?;
        }
        writeln!(f)?;
        let s = &self.summary;
        writeln!(
            f,
            "Explored {} source and {} target paths ({} truncated, {} infeasible)",
            s.source_paths, s.target_paths, s.truncated_paths, s.infeasible
        )?;
        writeln!(
            f,
            "{} solver calls, {} timeouts, {} undecided paths",
            s.solver_calls, s.timeouts, s.unknown
        )?;
        if s.extra_behaviors > 0 {
            writeln!(f, "{} target paths add new behavior", s.extra_behaviors)?;
        }
        if s.resumed > 0 {
            writeln!(f, "{} source halts are resumed by the target", s.resumed)?;
        }
        for cut in &self.cut_points {
            write!(f, "Cut point at step '{}'", cut.step)?;
            if let Some(transition) = &cut.transition {
                write!(f, " (entered by {transition})")?;
            }
            if cut.decision_step != cut.step {
                write!(f, " after step '{}'", cut.decision_step)?;
            }
            writeln!(f, " on source path {}", cut.source_path)?;
            if !cut.counterexample.is_empty() {
                let inputs = cut
                    .counterexample
                    .iter()
                    .map(|(var, val)| format!("{var} = {val}"))
                    .collect::<Vec<_>>();
                writeln!(f, "  counterexample: {}", inputs.join(", "))?;
            }
            for m in &cut.mismatches {
                writeln!(
                    f,
                    "  {}: source {} / target {}",
                    m.variable, m.source, m.target
                )?;
            }
        }
        for warning in &self.warnings {
            writeln!(f, "warning: {warning}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(index: usize, outcome: PathOutcome, cut: bool) -> PathCheck {
        PathCheck {
            report: PathReport {
                index,
                steps: vec!["A".to_string()],
                bounded_truncation: false,
                halted: false,
                outcome,
                solver_calls: 1,
                timeouts: 0,
            },
            cut_point: cut.then(|| CutPoint {
                step: "A".to_string(),
                decision_step: "A".to_string(),
                transition: None,
                source_path: index,
                closest_target_path: None,
                counterexample: BTreeMap::new(),
                mismatches: Vec::new(),
            }),
        }
    }

    #[test]
    fn verdict_priorities() {
        let contained = PathOutcome::Contained { by: 0 };
        let unknown = PathOutcome::Unknown {
            reason: UnknownReason::Timeout,
        };
        let result = aggregate(
            vec![check(0, contained, false)],
            vec![check(0, contained, false)],
            StructuralCuts::default(),
            Vec::new(),
        );
        assert_eq!(result.verdict, Verdict::Equivalent);
        assert!(!result.incomplete);

        let result = aggregate(
            vec![check(0, contained, false)],
            vec![check(0, contained, false), check(1, PathOutcome::Extra, false)],
            StructuralCuts::default(),
            Vec::new(),
        );
        assert_eq!(result.verdict, Verdict::TargetSupersedes);
        assert_eq!(result.summary.extra_behaviors, 1);

        let result = aggregate(
            vec![check(0, contained, false), check(1, PathOutcome::Resumed { by: 1 }, false)],
            vec![check(0, contained, false), check(1, contained, false)],
            StructuralCuts::default(),
            Vec::new(),
        );
        assert_eq!(result.verdict, Verdict::TargetSupersedes);
        assert_eq!(result.summary.resumed, 1);

        let result = aggregate(
            vec![check(0, unknown, false)],
            vec![check(0, PathOutcome::Extra, false)],
            StructuralCuts::default(),
            Vec::new(),
        );
        assert_eq!(result.verdict, Verdict::Unknown);
        assert!(result.incomplete);

        let result = aggregate(
            vec![check(0, unknown, false), check(1, PathOutcome::Diverges, true)],
            vec![check(0, unknown, false)],
            StructuralCuts::default(),
            Vec::new(),
        );
        assert_eq!(result.verdict, Verdict::Diverges);
        assert_eq!(result.cut_points.len(), 1);
        assert_eq!(result.summary.solver_calls, 3);
    }
}
