use antarbhukti_core::sfc::SfcBuilder;
use antarbhukti_core::solver::{BoundedSolver, Limits, Query, SatResult, SmtSolver, UnknownReason};
use antarbhukti_core::*;
use std::collections::BTreeSet;
use std::time::Instant;

fn var(builder: &SfcBuilder, name: &str) -> Expression<antarbhukti_core::sfc::Var> {
    Expression::Var(builder.var(name).expect("declared variable"))
}

// Init -> Convert [input >= 0], Convert -> Done
// Convert: result := input mod `modulus`
fn dec2hex(modulus: i64) -> Sfc {
    let mut b = SfcBuilder::new();
    b.new_var("input", Type::Integer, None).expect("new var");
    let result = b
        .new_var("result", Type::Integer, Some(Val::Integer(0)))
        .expect("new var");
    let init = b.new_step("Init").expect("new step");
    let convert = b.new_step("Convert").expect("new step");
    let done = b.new_step("Done").expect("new step");
    b.set_initial(init).expect("step exists");
    let expr = Expression::binary(BinOp::Mod, var(&b, "input"), Expression::from(modulus));
    b.add_assignment(convert, result, expr)
        .expect("well-typed assignment");
    let guard = Expression::binary(BinOp::Ge, var(&b, "input"), Expression::from(0));
    b.add_transition(init, convert, Some(guard))
        .expect("boolean guard");
    b.add_transition(convert, done, None).expect("no guard");
    b.build().expect("valid sfc")
}

// Init: i := 0; Loop: i := i + `step` while i < `bound`; Done when i >= `bound`.
fn counter(step: i64, bound: i64) -> Sfc {
    let mut b = SfcBuilder::new();
    let i = b.new_var("i", Type::Integer, None).expect("new var");
    let init = b.new_step("Init").expect("new step");
    let lp = b.new_step("Loop").expect("new step");
    let done = b.new_step("Done").expect("new step");
    b.set_initial(init).expect("step exists");
    b.add_assignment(init, i, Expression::from(0))
        .expect("well-typed assignment");
    let incr = Expression::binary(BinOp::Add, var(&b, "i"), Expression::from(step));
    b.add_assignment(lp, i, incr).expect("well-typed assignment");
    b.add_transition(init, lp, None).expect("no guard");
    let again = Expression::binary(BinOp::Lt, var(&b, "i"), Expression::from(bound));
    b.add_transition(lp, lp, Some(again)).expect("boolean guard");
    let exit = Expression::binary(BinOp::Ge, var(&b, "i"), Expression::from(bound));
    b.add_transition(lp, done, Some(exit)).expect("boolean guard");
    b.build().expect("valid sfc")
}

// Init branches on `mode` to one step per entry of `modes`, each setting `out := mode`.
fn dispatcher(modes: &[i64]) -> Sfc {
    let mut b = SfcBuilder::new();
    b.new_var("mode", Type::Integer, None).expect("new var");
    let out = b
        .new_var("out", Type::Integer, Some(Val::Integer(0)))
        .expect("new var");
    let init = b.new_step("Init").expect("new step");
    b.set_initial(init).expect("step exists");
    for &mode in modes {
        let step = b.new_step(format!("Mode{mode}")).expect("new step");
        b.add_assignment(step, out, Expression::from(mode))
            .expect("well-typed assignment");
        let guard = Expression::binary(BinOp::Eq, var(&b, "mode"), Expression::from(mode));
        b.add_transition(init, step, Some(guard))
            .expect("boolean guard");
    }
    b.build().expect("valid sfc")
}

// Steps A (initial), B and C; B sets x := 1.
// Each link is (from, to, enabled): disabled links are guarded by `false`.
fn chart(links: &[(&str, &str, bool)]) -> Sfc {
    let mut b = SfcBuilder::new();
    let x = b
        .new_var("x", Type::Integer, Some(Val::Integer(0)))
        .expect("new var");
    let steps = ["A", "B", "C"].map(|name| b.new_step(name).expect("new step"));
    b.set_initial(steps[0]).expect("step exists");
    b.add_assignment(steps[1], x, Expression::from(1))
        .expect("well-typed assignment");
    let step = |name: &str| match name {
        "A" => steps[0],
        "B" => steps[1],
        _ => steps[2],
    };
    for &(from, to, enabled) in links {
        let guard = (!enabled).then(|| Expression::from(false));
        b.add_transition(step(from), step(to), guard)
            .expect("boolean guard");
    }
    b.build().expect("valid sfc")
}

// Init -> Done guarded by `x + y = 1000 and x - y = 500`, then out := `out`.
fn balanced(out: i64) -> Sfc {
    let mut b = SfcBuilder::new();
    b.new_var("x", Type::Integer, None).expect("new var");
    b.new_var("y", Type::Integer, None).expect("new var");
    let result = b
        .new_var("out", Type::Integer, Some(Val::Integer(0)))
        .expect("new var");
    let init = b.new_step("Init").expect("new step");
    let done = b.new_step("Done").expect("new step");
    b.set_initial(init).expect("step exists");
    b.add_assignment(done, result, Expression::from(out))
        .expect("well-typed assignment");
    let sum = Expression::binary(BinOp::Add, var(&b, "x"), var(&b, "y"));
    let diff = Expression::binary(BinOp::Sub, var(&b, "x"), var(&b, "y"));
    let guard = Expression::binary(
        BinOp::And,
        Expression::binary(BinOp::Eq, sum, Expression::from(1000)),
        Expression::binary(BinOp::Eq, diff, Expression::from(500)),
    );
    b.add_transition(init, done, Some(guard))
        .expect("boolean guard");
    b.build().expect("valid sfc")
}

#[test]
fn reflexivity() {
    let config = VerifyConfig::default();
    for sfc in [dec2hex(16), counter(1, 3), dispatcher(&[1, 2])] {
        let result = verify(&sfc, &sfc, &config);
        assert_eq!(result.verdict, Verdict::Equivalent, "{result}");
        assert!(result.cut_points.is_empty());
        assert!(!result.incomplete);
    }
}

#[test]
fn determinism() {
    let (source, target) = (dec2hex(16), dec2hex(15));
    let run = |parallelism| {
        let config = VerifyConfig {
            parallelism,
            ..Default::default()
        };
        serde_json::to_string(&verify(&source, &target, &config)).expect("serialize result")
    };
    let first = run(0);
    assert_eq!(first, run(0));
    assert_eq!(first, run(1));
    assert_eq!(first, run(4));
}

#[test]
fn supersession() {
    let source = dispatcher(&[1, 2]);
    let target = dispatcher(&[1, 2, 99]);
    let result = verify(&source, &target, &VerifyConfig::default());
    assert_eq!(result.verdict, Verdict::TargetSupersedes, "{result}");
    assert!(result.verdict.is_contained());
    assert_eq!(result.summary.extra_behaviors, 1);
    assert_eq!(result.target_paths[2].outcome, PathOutcome::Extra);
    assert_eq!(
        result.target_paths[2].steps,
        vec!["Init".to_string(), "Mode99".to_string()]
    );
    // The source halts when `mode` is neither 1 nor 2, where the target moves on.
    assert!(result.source_paths[2].halted);
    assert_eq!(result.source_paths[2].outcome, PathOutcome::Resumed { by: 2 });
    assert_eq!(result.summary.resumed, 1);
    // Swapping roles loses the extra behavior.
    let result = verify(&target, &source, &VerifyConfig::default());
    assert_eq!(result.verdict, Verdict::Diverges, "{result}");
    assert_eq!(result.cut_points.len(), 1);
    assert_eq!(result.cut_points[0].step, "Mode99");
}

#[test]
fn dec2hex_regression() {
    let result = verify(&dec2hex(16), &dec2hex(15), &VerifyConfig::default());
    assert_eq!(result.verdict, Verdict::Diverges, "{result}");
    assert!(!result.incomplete);
    assert_eq!(result.cut_points.len(), 1);
    let cut = &result.cut_points[0];
    assert_eq!(cut.step, "Convert");
    assert_eq!(cut.source_path, 0);
    assert_eq!(cut.closest_target_path, Some(0));
    let Some(Val::Integer(input)) = cut.counterexample.get("input") else {
        panic!("no input in counterexample {:?}", cut.counterexample);
    };
    assert!(*input >= 0);
    assert_ne!(input.rem_euclid(16), input.rem_euclid(15));
    assert_eq!(cut.mismatches.len(), 1);
    assert_eq!(cut.mismatches[0].variable, "result");
    assert_eq!(cut.mismatches[0].source, Val::Integer(input.rem_euclid(16)));
    assert_eq!(cut.mismatches[0].target, Val::Integer(input.rem_euclid(15)));
}

#[test]
fn cycles_terminate_with_monotone_cuts() {
    let (source, target) = (counter(1, 3), counter(2, 3));
    let cuts = |max_loop_unroll| {
        let config = VerifyConfig {
            max_loop_unroll,
            ..Default::default()
        };
        let result = verify(&source, &target, &config);
        assert!(result.summary.truncated_paths > 0);
        result
            .cut_points
            .into_iter()
            .map(|cut| cut.step)
            .collect::<BTreeSet<_>>()
    };
    let (zero, one, two) = (cuts(0), cuts(1), cuts(2));
    assert!(zero.contains("Loop"));
    assert!(zero.is_subset(&one));
    assert!(one.is_subset(&two));
}

// Stalls on every query mentioning the constant 4242.
struct Stalling;

impl SmtSolver for Stalling {
    fn check(&self, query: &Query, limits: &Limits<'_>) -> SatResult {
        if query.to_string().contains("4242") {
            let now = Instant::now();
            if limits.deadline > now {
                std::thread::sleep(limits.deadline - now);
            }
            SatResult::Unknown(UnknownReason::Timeout)
        } else {
            BoundedSolver.check(query, limits)
        }
    }
}

#[test]
fn timeout_isolation() {
    let sfc = dispatcher(&[4242, 1]);
    let config = VerifyConfig {
        per_call_timeout_ms: 20,
        ..Default::default()
    };
    let result = verify_with(&sfc, &sfc, &config, &Stalling);
    assert_eq!(result.verdict, Verdict::Unknown, "{result}");
    assert!(result.incomplete);
    assert!(result.cut_points.is_empty());
    assert_eq!(
        result.source_paths[0].outcome,
        PathOutcome::Unknown {
            reason: UnknownReason::Timeout
        }
    );
    // Retried once.
    assert_eq!(result.source_paths[0].timeouts, 2);
    assert_eq!(result.source_paths[1].outcome, PathOutcome::Contained { by: 1 });
    assert!(result.summary.timeouts >= 2);
}

#[test]
fn global_deadline_cancels() {
    let sfc = dispatcher(&[4242, 1]);
    let config = VerifyConfig {
        per_call_timeout_ms: 10_000,
        global_deadline_ms: Some(30),
        parallelism: 1,
        ..Default::default()
    };
    let result = verify_with(&sfc, &sfc, &config, &Stalling);
    assert_eq!(result.verdict, Verdict::Unknown, "{result}");
    assert!(result.incomplete);
    assert!(result.source_paths.iter().chain(&result.target_paths).any(|path| {
        path.outcome
            == PathOutcome::Unknown {
                reason: UnknownReason::Cancelled,
            }
    }));
}

#[test]
fn type_conflicts_are_not_observed() {
    let mut b = SfcBuilder::new();
    b.new_var("input", Type::Integer, None).expect("new var");
    b.new_var("result", Type::Boolean, Some(Val::Boolean(false)))
        .expect("new var");
    let init = b.new_step("Init").expect("new step");
    let done = b.new_step("Done").expect("new step");
    b.set_initial(init).expect("step exists");
    let guard = Expression::binary(BinOp::Ge, var(&b, "input"), Expression::from(0));
    b.add_transition(init, done, Some(guard))
        .expect("boolean guard");
    let target = b.build().expect("valid sfc");
    let result = verify(&dec2hex(16), &target, &VerifyConfig::default());
    assert!(result.warnings.contains(&Warning::ObservableTypeConflict {
        variable: "result".to_string(),
        source: Type::Integer,
        target: Type::Boolean,
    }));
}

#[test]
fn never_taken_branch_supersedes() {
    let source = chart(&[("A", "B", true)]);
    let target = chart(&[("A", "B", true), ("A", "C", false)]);
    let result = verify(&source, &target, &VerifyConfig::default());
    assert_eq!(result.verdict, Verdict::TargetSupersedes, "{result}");
    assert!(result.cut_points.is_empty());
    assert_eq!(result.summary.extra_behaviors, 1);
    assert_eq!(result.target_paths[1].steps, ["A", "C"]);
    assert_eq!(result.target_paths[1].outcome, PathOutcome::Extra);
}

#[test]
fn never_taken_exit_supersedes() {
    let source = chart(&[("A", "B", true)]);
    let target = chart(&[("A", "B", true), ("B", "C", false)]);
    let result = verify(&source, &target, &VerifyConfig::default());
    assert_eq!(result.verdict, Verdict::TargetSupersedes, "{result}");
    assert!(result.cut_points.is_empty());
    assert_eq!(result.target_paths[0].steps, ["A", "B", "C"]);
    assert_eq!(result.target_paths[0].outcome, PathOutcome::Extra);
    // The target waits in B forever, which is where the source ends.
    assert!(result.target_paths[1].halted);
    assert_eq!(result.target_paths[1].steps, ["A", "B"]);
    assert_eq!(result.target_paths[1].outcome, PathOutcome::Contained { by: 0 });
    assert_eq!(result.source_paths[0].outcome, PathOutcome::Contained { by: 1 });
    // Dropping the dead transition loses nothing.
    let result = verify(&target, &source, &VerifyConfig::default());
    assert_eq!(result.verdict, Verdict::Equivalent, "{result}");
}

#[test]
fn unreachable_steps_are_reported() {
    let source = chart(&[("A", "B", true)]);
    let target = chart(&[("A", "B", true), ("C", "B", true)]);
    let result = verify(&source, &target, &VerifyConfig::default());
    assert_eq!(result.verdict, Verdict::Equivalent, "{result}");
    assert!(result.warnings.contains(&Warning::UnreachableStep {
        side: Side::Source,
        step: "C".to_string(),
    }));
    assert!(result.warnings.contains(&Warning::UnreachableStep {
        side: Side::Target,
        step: "C".to_string(),
    }));
    let unreachable = result
        .warnings
        .iter()
        .filter(|w| matches!(w, Warning::UnreachableStep { .. }))
        .count();
    assert_eq!(unreachable, 2);
}

#[test]
fn counterexamples_away_from_constants() {
    let result = verify(&balanced(1), &balanced(2), &VerifyConfig::default());
    assert_eq!(result.verdict, Verdict::Diverges, "{result}");
    assert!(!result.incomplete, "{result}");
    assert_eq!(result.cut_points.len(), 1);
    let cut = &result.cut_points[0];
    assert_eq!(cut.step, "Done");
    assert_eq!(cut.decision_step, "Init");
    assert_eq!(cut.counterexample.get("x"), Some(&Val::Integer(750)));
    assert_eq!(cut.counterexample.get("y"), Some(&Val::Integer(250)));
    assert_eq!(cut.mismatches.len(), 1);
    assert_eq!(cut.mismatches[0].target, Val::Integer(2));
}

#[test]
fn structural_cut_points_are_reported() {
    let result = verify(&counter(1, 3), &dec2hex(16), &VerifyConfig::default());
    assert_eq!(result.structural_cut_points.source, ["Init", "Loop", "Done"]);
    assert_eq!(result.structural_cut_points.target, ["Init", "Done"]);
}
