use antarbhukti_core::{Type, Val, Verdict, VerifyConfig, verify};
use antarbhukti_sfc::{Location, ParseErrorKind, load, parse};
use std::path::Path;

fn test(path: &str) -> antarbhukti_core::Sfc {
    load(&Path::new("./tests/data").join(path)).expect("load")
}

#[test]
fn dec2hex() {
    let sfc = test("dec2hex.txt");
    assert_eq!(sfc.steps().count(), 3);
    assert_eq!(sfc.transitions().count(), 2);
    let names: Vec<_> = sfc.vars().map(|(_, var)| var.name().to_string()).collect();
    assert_eq!(names, ["input", "result", "digits"]);
    assert!(sfc.vars().all(|(_, var)| var.r#type() == Type::Integer));
    assert_eq!(sfc.step(sfc.initial_step()).name(), "Init");
}

#[test]
fn declared_and_implicit_variables() {
    let sfc = test("traffic_light.txt");
    assert_eq!(sfc.step(sfc.initial_step()).name(), "Red");
    let var = |name| sfc.var(sfc.var_by_name(name).expect("variable"));
    assert_eq!(var("light").r#type(), Type::String);
    assert_eq!(var("timer").r#type(), Type::Integer);
    assert_eq!(var("request").r#type(), Type::Boolean);

    let sfc = test("dec2hex_validated.txt");
    let valid = sfc.var(sfc.var_by_name("valid").expect("variable"));
    assert_eq!(valid.r#type(), Type::Boolean);
    assert_eq!(valid.init(), Some(&Val::Boolean(false)));
}

#[test]
fn dec2hex_wrong_base() {
    let source = test("dec2hex.txt");
    let target = test("dec2hex_wrong_base.txt");
    let result = verify(&source, &target, &VerifyConfig::default());
    assert_eq!(result.verdict, Verdict::Diverges, "{result}");
    assert_eq!(result.cut_points[0].step, "Convert");
}

#[test]
fn dec2hex_validated() {
    let source = test("dec2hex.txt");
    let target = test("dec2hex_validated.txt");
    let result = verify(&source, &target, &VerifyConfig::default());
    assert_eq!(result.verdict, Verdict::TargetSupersedes, "{result}");
    let result = verify(&target, &target, &VerifyConfig::default());
    assert_eq!(result.verdict, Verdict::Equivalent, "{result}");
}

#[test]
fn traffic_light() {
    let sfc = test("traffic_light.txt");
    let result = verify(&sfc, &sfc, &VerifyConfig::default());
    assert_eq!(result.verdict, Verdict::Equivalent, "{result}");
    assert!(result.summary.truncated_paths > 0);
}

#[test]
fn missing_file() {
    load(Path::new("./tests/data/missing.txt")).expect_err("no such file");
}

fn error(text: &str) -> (ParseErrorKind, Location) {
    let err = parse(text).expect_err("malformed SFC");
    (err.kind, err.location)
}

#[test]
fn parse_errors() {
    let (kind, location) = error("steps = [{'name': 'A'}]\ntransitions = [{'src': 'A', 'tgt': 'B'}]");
    assert!(matches!(kind, ParseErrorKind::UndefinedStep(name) if name == "B"));
    assert_eq!(location, Location { line: 2, column: 36 });

    let (kind, location) = error("steps = [{'name': 'A', 'initial': 'true'}, {'name': 'A'}]");
    assert!(matches!(kind, ParseErrorKind::DuplicateStep(name) if name == "A"));
    assert_eq!(location, Location { line: 1, column: 53 });

    let (kind, _) = error("steps = [{'name': 'A', 'initial': 'true'}]\nvariables = ['x', 'x']");
    assert!(matches!(kind, ParseErrorKind::DuplicateVariable(name) if name == "x"));

    let (kind, _) = error("steps = [{'name': 'A'}]\ntransitions = [{'src': 'A'}]");
    assert!(matches!(
        kind,
        ParseErrorKind::MissingField {
            record: "transition",
            field: "tgt"
        }
    ));

    let (kind, location) = error("steps = [{'name': 'A', 'color': 'red'}]");
    assert!(matches!(kind, ParseErrorKind::UnknownField { field, .. } if field == "color"));
    assert_eq!(location, Location { line: 1, column: 24 });

    let (kind, location) = error("steps = [{'name': 'A', 'function': 'x := 1 $ 2'}]");
    assert!(matches!(kind, ParseErrorKind::Tokenize(_)));
    assert_eq!(location, Location { line: 1, column: 44 });

    let (kind, location) = error("steps = [{'name': 'A', 'function': 'x := (1 + 2'}]");
    assert!(matches!(kind, ParseErrorKind::Expression(_)));
    assert_eq!(location, Location { line: 1, column: 48 });

    let (kind, _) = error("steps = [{'name': 'A', 'function': 'x := 1; x := true'}]\ninitial_step = 'A'");
    assert!(matches!(kind, ParseErrorKind::Type(_)));

    let (kind, _) = error("steps = [{'name': 'A'}, {'name': 'B'}]");
    assert!(matches!(kind, ParseErrorKind::ModelInvariant(_)));

    let (kind, _) = error("steps = [{'name': 'A', 'initial': 'true'}, {'name': 'B'}]\ninitial_step = 'B'");
    assert!(matches!(kind, ParseErrorKind::ModelInvariant(_)));

    let (kind, location) = error("steps = [{'name': 'A'},\n  'B']");
    assert!(matches!(kind, ParseErrorKind::Syntax(_)));
    assert_eq!(location, Location { line: 2, column: 3 });
}

#[test]
fn suffixed_tables() {
    let sfc = parse(
        "steps2 = [{'name': 'A', 'action': 'n := n + 1'}, {'name': 'B'}]\n\
         transitions2 = [{'src': 'A', 'tgt': 'B', 'guard': 'n > 1'}]\n\
         initial_step = 'A'",
    )
    .expect("well-formed SFC");
    assert_eq!(sfc.steps().count(), 2);
    assert_eq!(sfc.transitions().count(), 1);
    assert!(sfc.var_by_name("n").is_some());
}

#[test]
fn tables_built_elsewhere() {
    use antarbhukti_sfc::{Spanned, Value, ValueKind, build};

    let at = |column| Location { line: 4, column };
    let table = |name: &str, items| {
        let name = Spanned {
            text: name.to_string(),
            location: at(1),
        };
        let value = Value {
            kind: ValueKind::List(items),
            location: at(1),
        };
        (name, value)
    };
    let tables = |action: &str| {
        let steps = vec![
            Value::dict(
                [
                    ("name", Value::str("A", at(2))),
                    ("function", Value::str(action, at(10))),
                    ("initial", Value::str("true", at(2))),
                ],
                at(2),
            ),
            Value::dict([("name", Value::str("B", at(30)))], at(30)),
        ];
        let transitions = vec![Value::dict(
            [("src", Value::str("A", at(40))), ("tgt", Value::str("B", at(44)))],
            at(40),
        )];
        vec![table("steps", steps), table("transitions", transitions)]
    };

    let err = build(tables("n := n +")).expect_err("incomplete action");
    assert!(matches!(err.kind, ParseErrorKind::Expression(_)));
    assert_eq!(err.location.line, 4);

    let sfc = build(tables("n := n + 1")).expect("well-formed tables");
    assert_eq!(sfc.steps().count(), 2);
    assert_eq!(sfc.step(sfc.initial_step()).name(), "A");
}
