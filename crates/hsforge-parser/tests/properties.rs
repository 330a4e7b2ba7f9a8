use std::collections::BTreeMap;

use proptest::prelude::*;

use hsforge_core::{ErrorCode, ParamType, Parameter, Project, SlotRole, Value};
use hsforge_parser::{lint, manifest::PARAMETER_FLAGS, parse_source, render_source};

// ===================
// Strategies
// ===================

/// Statements that survive flat rendering unchanged in any slot.
const STATEMENTS: &[&str] = &[
    "BLOCK A, B, ZZYZX",
    "ADD 0, 0, 0.1",
    "DEL 1",
    "  CYLIND 0.5, 0.02",
    "IF A > 1 THEN",
    "ENDIF",
    "PROJECT2 3, 270, 2",
    "VALUES \"pMode\" 1, 2, 3",
    "x = x + 1",
    "! keep the legs inside the box",
    "END",
];

fn value_strategy(param_type: ParamType) -> BoxedStrategy<Value> {
    match param_type {
        ParamType::String => "[A-Za-z0-9 ]{0,12}".prop_map(Value::Text).boxed(),
        ParamType::Boolean => (0u8..=1).prop_map(|b| Value::Number(f64::from(b))).boxed(),
        ParamType::Integer => (-1000i32..1000).prop_map(|n| Value::Number(f64::from(n))).boxed(),
        ParamType::Material | ParamType::FillPattern | ParamType::LineType | ParamType::PenColor => {
            (0u16..256).prop_map(|n| Value::Number(f64::from(n))).boxed()
        }
        ParamType::Length | ParamType::Angle | ParamType::RealNum => (-100_000i32..100_000)
            .prop_map(|n| Value::Number(f64::from(n) / 100.0))
            .boxed(),
    }
}

fn parameter_strategy(name: String) -> impl Strategy<Value = Parameter> {
    proptest::sample::select(ParamType::ALL.to_vec())
        .prop_flat_map(move |param_type| {
            (
                Just(name.clone()),
                Just(param_type),
                value_strategy(param_type),
                proptest::option::of("[A-Za-z][A-Za-z0-9 ]{0,15}"),
                any::<bool>(),
                proptest::sample::subsequence(PARAMETER_FLAGS.to_vec(), 0..3),
            )
        })
        .prop_map(|(name, param_type, value, description, fixed, flags)| {
            let mut parameter = Parameter::new(name, param_type, value)
                .with_fixed(fixed)
                .with_flags(flags.into_iter().map(String::from).collect());
            if let Some(description) = description {
                parameter = parameter.with_description(description);
            }
            parameter
        })
}

fn parameters_strategy() -> impl Strategy<Value = Vec<Parameter>> {
    proptest::collection::btree_set("p[A-Z][a-zA-Z0-9]{0,8}", 0..6).prop_flat_map(|names| {
        names
            .into_iter()
            .map(parameter_strategy)
            .collect::<Vec<_>>()
    })
}

fn script_strategy() -> impl Strategy<Value = String> {
    proptest::collection::vec(proptest::sample::select(STATEMENTS), 0..8).prop_map(|lines| {
        if lines.is_empty() {
            String::new()
        } else {
            format!("{}\n", lines.join("\n"))
        }
    })
}

fn project_strategy() -> impl Strategy<Value = Project> {
    (
        "[A-Z][a-z]{1,10}",
        parameters_strategy(),
        proptest::collection::vec(script_strategy(), 5),
    )
        .prop_map(|(name, parameters, scripts)| {
            let mut project = Project::new(name);
            for parameter in parameters {
                project
                    .parameters_mut()
                    .insert(parameter)
                    .expect("names are unique");
            }
            for (role, text) in SlotRole::ALL.into_iter().zip(scripts) {
                project.set_script(role, text);
            }
            project
        })
}

/// Balanced fragments for the single-unmatched-opener property.
const BALANCED: &[&str] = &[
    "BLOCK 1, 1, 1",
    "IF A > 1 THEN\n  BLOCK 1, 1, 1\nENDIF",
    "FOR i = 1 TO 3\n  ADD 1, 0, 0\n  BLOCK 1, 1, 1\n  DEL 1\nNEXT i",
    "WHILE x < 1 DO\n  x = x + 0.5\nENDWHILE",
    "IF A > 1 THEN BLOCK 1, 1, 1",
];

const OPENERS: &[&str] = &["IF B > 1 THEN", "FOR j = 1 TO 2", "WHILE y < 2 DO", "REPEAT"];

// ===================
// Property Test Functions
// ===================

/// Rendering then parsing reproduces the parameter table and every slot.
fn check_render_parse_round_trip(project: &Project) -> Result<(), TestCaseError> {
    let parsed = parse_source(&render_source(project));

    prop_assert_eq!(parsed.project.name(), project.name());
    prop_assert_eq!(parsed.project.parameters(), project.parameters());
    for role in SlotRole::ALL {
        prop_assert_eq!(parsed.project.script(role), project.script(role));
    }
    Ok(())
}

/// Any parsed source holds the reserved parameters.
fn check_reserved_present(text: &str) -> Result<(), TestCaseError> {
    let parsed = parse_source(text);
    for name in ["A", "B", "ZZYZX"] {
        prop_assert!(parsed.project.parameter(name).is_some(), "missing `{}`", name);
    }
    Ok(())
}

/// Linting twice gives the same result and leaves the project untouched.
fn check_lint_idempotent(project: &Project) -> Result<(), TestCaseError> {
    let before = project.clone();
    let first = lint(project);
    let second = lint(project);

    prop_assert_eq!(&first, &second);
    prop_assert_eq!(project, &before);
    Ok(())
}

/// One unmatched opener among balanced fragments yields exactly one
/// unbalanced-block diagnostic, at the opener.
fn check_single_unmatched_opener(
    fragments: &[&str],
    opener: &str,
    position: usize,
) -> Result<(), TestCaseError> {
    let position = position % (fragments.len() + 1);
    let mut pieces: Vec<&str> = fragments.to_vec();
    pieces.insert(position, opener);
    let text = format!("{}\n", pieces.join("\n"));
    let opener_line = pieces[..position]
        .iter()
        .map(|piece| piece.lines().count())
        .sum::<usize>()
        + 1;

    let mut project = Project::new("Blocks");
    project.set_script(SlotRole::Constraints, text);
    let unbalanced: Vec<_> = lint(&project)
        .into_iter()
        .filter(|d| d.code() == ErrorCode::UnbalancedBlock)
        .collect();

    prop_assert_eq!(unbalanced.len(), 1);
    let location = unbalanced[0].location().expect("located");
    prop_assert_eq!(location.role(), SlotRole::Constraints);
    prop_assert_eq!(location.line(), opener_line);
    Ok(())
}

// ===================
// Proptest Wrappers
// ===================

proptest! {
    #[test]
    fn render_parse_round_trip(project in project_strategy()) {
        check_render_parse_round_trip(&project)?;
    }

    #[test]
    fn reserved_parameters_always_present(text in "[ -~\n]{0,300}") {
        check_reserved_present(&text)?;
    }

    #[test]
    fn lint_is_idempotent(project in project_strategy()) {
        check_lint_idempotent(&project)?;
    }

    #[test]
    fn single_unmatched_opener(
        fragments in proptest::collection::vec(proptest::sample::select(BALANCED), 0..6),
        opener in proptest::sample::select(OPENERS),
        position in any::<usize>(),
    ) {
        check_single_unmatched_opener(&fragments, opener, position)?;
    }
}

#[test]
fn test_bare_geometry_blob_gets_reserved_defaults() {
    let parsed = parse_source("BLOCK A, B, ZZYZX\n");
    let expected: BTreeMap<&str, f64> = [("A", 1.0), ("B", 1.0), ("ZZYZX", 1.0)].into();

    for (name, default) in expected {
        let parameter = parsed.project.parameter(name).unwrap();
        assert_eq!(parameter.param_type(), ParamType::Length);
        assert_eq!(parameter.value(), &Value::Number(default));
        assert!(parameter.is_fixed());
    }
    assert!(parsed.diagnostics.is_empty());
}

#[test]
fn test_three_pushes_two_pops() {
    let mut project = Project::new("Leak");
    project.set_script(
        SlotRole::Geometry,
        "ADD 0, 0, 1\nROTZ 45\nMULX 2\nBLOCK 1, 1, 1\nDEL 2\nEND\n",
    );
    project.set_script(SlotRole::Projection, "PROJECT2 3, 270, 2\n");

    let diagnostics = lint(&project);
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code(), ErrorCode::TransformImbalance);
    assert_eq!(diagnostics[0].location().unwrap().line(), 1);
}
