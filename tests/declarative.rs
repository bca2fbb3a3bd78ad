use std::fs;

use dynscpi::{
    instruments::{executor::MAX_NESTING, Resolved},
    protocols::{MockHandle, MockTransport},
    spec::{CommandKind, CommandTemplate, Specification},
    Error, Instrument, Kwargs, Result, Settings, Value,
};

fn quick() -> Settings {
    Settings {
        retry_delay_ms: 0,
        ..Settings::default()
    }
}

fn with_spec(spec: Specification) -> (Instrument, MockHandle) {
    let mock = MockTransport::new();
    let handle = mock.handle();
    let inst = Instrument::builder("smu", "mock")
        .transport(mock)
        .specification(spec)
        .native("configure", configure)
        .settings(quick())
        .build()
        .unwrap();
    (inst, handle)
}

fn spec(methods: Vec<(&str, Vec<&str>)>) -> Specification {
    Specification::from_methods(methods.into_iter().map(|(name, steps)| {
        (
            name,
            steps.into_iter().map(CommandTemplate::new).collect::<Vec<_>>(),
        )
    }))
}

/// Echoes its `level` argument back.
fn configure(_: &Instrument, kwargs: &Kwargs) -> Result<Value> {
    Ok(kwargs.get("level").cloned().unwrap_or(Value::None))
}

#[test]
fn pure_write_returns_an_empty_list() {
    let (inst, handle) = with_spec(spec(vec![("foo", vec!["BAR:BAZ {x}"])]));
    let result = inst.call("foo", &Kwargs::new().with("x", 3)).unwrap();
    assert_eq!(result, Value::List(vec![]));
    assert_eq!(handle.writes(), vec!["BAR:BAZ 3"]);
    assert!(handle.queries().is_empty());
}

#[test]
fn single_query_returns_one_result() {
    let (inst, handle) = with_spec(spec(vec![("foo", vec!["BAR:BAZ? "])]));
    handle.respond("BAR:BAZ?", "7");
    let result = inst.call("foo", &Kwargs::new()).unwrap();
    assert_eq!(result, Value::List(vec![Value::from("7")]));
    assert_eq!(handle.queries().len(), 1);
}

#[test]
fn substitution_is_repeatable() {
    let (inst, handle) = with_spec(spec(vec![("set", vec![":SOUR:VOLT {v};:SOUR:VOLT:ILIM {i}"])]));
    let kwargs = Kwargs::new().with("v", 1.25).with("i", 1e-4);
    inst.call("set", &kwargs).unwrap();
    inst.call("set", &kwargs).unwrap();
    let writes = handle.writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0], writes[1]);
    assert_eq!(writes[0], ":SOUR:VOLT 1.25;:SOUR:VOLT:ILIM 0.0001");
}

#[test]
fn nested_call_passes_integers() {
    let (inst, _) = with_spec(spec(vec![("setup", vec!["configure(level={lvl})"])]));
    let result = inst.call("setup", &Kwargs::new().with("lvl", 2)).unwrap();
    assert_eq!(result, Value::List(vec![Value::Int(2)]));
}

#[test]
fn nested_declared_results_are_collected() {
    let (inst, handle) = with_spec(spec(vec![
        ("read", vec![":READ?"]),
        ("arm", vec![":OUTP ON"]),
        ("measure", vec!["self.arm()", "read()", ":OUTP OFF"]),
    ]));
    handle.respond(":READ?", "0.5");
    let result = inst.call("measure", &Kwargs::new()).unwrap();
    assert_eq!(
        result,
        Value::List(vec![Value::List(vec![Value::from("0.5")])])
    );
    assert_eq!(handle.writes(), vec![":OUTP ON", ":OUTP OFF"]);
}

#[test]
fn missing_parameter_fails_before_any_io() {
    let (inst, handle) = with_spec(spec(vec![("foo", vec![":OUTP ON", "BAR:BAZ {x}"])]));
    match inst.call("foo", &Kwargs::new()) {
        Err(Error::MissingParameter { method, parameter }) => {
            assert_eq!(method, "foo");
            assert_eq!(parameter, "x");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(handle.traffic().is_empty());
}

#[test]
fn nested_call_to_unknown_method() {
    let (inst, handle) = with_spec(spec(vec![("foo", vec!["nowhere(a=1)"])]));
    assert!(matches!(
        inst.call("foo", &Kwargs::new()),
        Err(Error::SpecMethodNotFound(name)) if name == "nowhere"
    ));
    assert!(handle.traffic().is_empty());
}

#[test]
fn malformed_nested_call_is_rejected() {
    let (inst, _) = with_spec(spec(vec![("foo", vec!["configure(level {x})"])]));
    assert!(matches!(
        inst.call("foo", &Kwargs::new().with("x", 1)),
        Err(Error::InvalidNestedCallSyntax(_))
    ));
}

#[test]
fn parentheses_in_commands_reach_the_instrument() {
    let (inst, handle) = with_spec(spec(vec![("close", vec!["ROUT:CLOS (@{ch})"])]));
    inst.call("close", &Kwargs::new().with("ch", 101)).unwrap();
    assert_eq!(handle.writes(), vec!["ROUT:CLOS (@101)"]);
}

#[test]
fn runaway_recursion_is_bounded() {
    let (inst, handle) = with_spec(spec(vec![("again", vec!["again()"]), ("ok", vec!["*CLS"])]));
    assert!(matches!(
        inst.call("again", &Kwargs::new()),
        Err(Error::NestingTooDeep(n)) if n == MAX_NESTING
    ));
    inst.call("ok", &Kwargs::new()).unwrap();
    assert_eq!(handle.writes(), vec!["*CLS"]);
}

#[test]
fn tagged_templates_override_inference() {
    let spec = Specification::from_methods([(
        "fetch",
        vec![CommandTemplate::tagged(":FETC", CommandKind::Query)],
    )]);
    let (inst, handle) = with_spec(spec);
    handle.respond(":FETC", "3");
    assert_eq!(
        inst.call("fetch", &Kwargs::new()).unwrap(),
        Value::List(vec![Value::from("3")])
    );
}

#[test]
fn declared_methods_resolve_before_proxies() {
    let (inst, _) = with_spec(spec(vec![("foo", vec!["*CLS"])]));
    assert!(matches!(inst.resolve("foo"), Resolved::Declared(_)));
    assert!(matches!(inst.resolve("configure"), Resolved::Native(_)));
    assert!(inst.resolve("bar").is_proxy());
}

#[test]
fn loads_and_reloads_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bench.yml");
    fs::write(
        &path,
        "methods:\n  arm:\n    - \":OUTP ON\"\n  read:\n    commands:\n      - { type: query, cmd: \":READ?\" }\n",
    )
    .unwrap();

    let mock = MockTransport::new();
    let handle = mock.handle();
    let mut inst = Instrument::builder("bench", "mock")
        .transport(mock)
        .spec_file(path.to_str().unwrap())
        .settings(quick())
        .build()
        .unwrap();
    assert_eq!(inst.available_methods().spec, vec!["arm", "read"]);

    fs::write(&path, "methods:\n  disarm: [\":OUTP OFF\"]\n").unwrap();
    inst.reload_specification().unwrap();
    assert_eq!(inst.available_methods().spec, vec!["disarm"]);
    inst.call("disarm", &Kwargs::new()).unwrap();
    assert_eq!(handle.writes(), vec![":OUTP OFF"]);
}

#[test]
fn reload_keeps_the_old_specification_on_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bench.yml");
    fs::write(&path, "methods:\n  arm: [\":OUTP ON\"]\n").unwrap();
    let mut inst = Instrument::builder("bench", "mock")
        .transport(MockTransport::new())
        .spec_file(path.to_str().unwrap())
        .require(&["arm"])
        .settings(quick())
        .build()
        .unwrap();

    fs::write(&path, "methods:\n  other: [\"*CLS\"]\n").unwrap();
    assert!(matches!(
        inst.reload_specification(),
        Err(Error::MissingSpecImplementation { .. })
    ));
    assert!(inst.specification().contains("arm"));
}
