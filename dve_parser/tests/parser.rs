use dve_core::*;
use dve_parser::ParseError;
use std::path::Path;

fn load(name: &str) -> ExplicitSystem {
    let system = dve_parser::load(&Path::new("./tests/models").join(name)).expect("load");
    ExplicitSystem::new(system).expect("layout")
}

fn names() -> PrintFlags {
    PrintFlags::all() - PrintFlags::MULTILINE
}

fn successors(explicit: &ExplicitSystem, state: &[u8]) -> (Status, Vec<State>) {
    let mut generator = explicit.new_instance();
    let mut succs = Vec::new();
    let status = generator.successors(state, &mut succs);
    (status, succs)
}

fn printed(explicit: &ExplicitSystem, states: &[State]) -> Vec<String> {
    states
        .iter()
        .map(|state| explicit.format_state(state, names()))
        .collect()
}

#[test]
fn initial_state() {
    let explicit = load("initial.dve");
    let init = explicit.initial_state();
    assert_eq!(
        explicit.format_state(&init, names()),
        "[x:1, a:{-1|3|6}]; P:[s1, v:5]; Q:[t0]"
    );
    let (status, succs) = successors(&explicit, &init);
    assert_eq!(status, Status::NORMAL);
    assert_eq!(
        printed(&explicit, &succs),
        ["[x:1, a:{-1|3|6}]; P:[s0, v:5]; Q:[t0]"]
    );
    let (status, succs) = successors(&explicit, &succs[0]);
    assert_eq!(status, Status::DEADLOCK);
    assert!(succs.is_empty());
}

#[test]
fn deadlock() {
    let explicit = load("deadlock.dve");
    let mut generator = explicit.new_instance();
    let init = generator.initial_state();
    let (status, enabled) = generator.enabled_transitions(&init);
    assert_eq!(status, Status::DEADLOCK);
    assert!(enabled.is_empty());
}

#[test]
fn handshake() {
    let explicit = load("handshake.dve");
    let (status, succs) = successors(&explicit, &explicit.initial_state());
    assert_eq!(status, Status::NORMAL);
    assert_eq!(printed(&explicit, &succs), ["[]; A:[s1]; B:[t1, v:5]"]);
    let v = explicit.system().processes()[1].vars()[0];
    assert_eq!(explicit.variable_value(&succs[0], v, 0), Ok(5));
}

#[test]
fn sync_conflict() {
    let explicit = load("sync_conflict.dve");
    let (status, succs) = successors(&explicit, &explicit.initial_state());
    assert!(status.contains(Status::ERROR));
    assert_eq!(succs.len(), 1);
    assert!(explicit.is_erroneous(&succs[0]));
}

#[test]
fn synchronous_product() -> Result<(), ParseError> {
    let system = dve_parser::parse_str(
        "byte g;
        process A {
            byte l;
            state a0;
            init a0;
            trans a0 -> a0 { effect l = l + 1; }, a0 -> a0 { effect g = 7; };
        }
        process B { state b0, b1; init b0; trans b0 -> b1 { }, b1 -> b0 { }; }
        system sync;",
    )?;
    let explicit = ExplicitSystem::new(system)?;
    let (status, succs) = successors(&explicit, &explicit.initial_state());
    assert_eq!(status, Status::NORMAL);
    assert_eq!(
        printed(&explicit, &succs),
        [
            "[g:0]; A:[a0, l:1]; B:[b1]",
            "[g:7]; A:[a0, l:0]; B:[b1]",
        ]
    );
    Ok(())
}

#[test]
fn array_bounds() {
    let explicit = load("array_bounds.dve");
    let (status, succs) = successors(&explicit, &explicit.initial_state());
    assert!(status.contains(Status::ERROR));
    assert_eq!(succs.len(), 2);
    assert!(explicit.is_erroneous(&succs[0]));
    assert_eq!(explicit.format_state(&succs[0], names()), "(ERR)");
    assert_eq!(explicit.format_state(&succs[1], names()), "[a:{0|1}, i:2]; P:[s1]");
}

#[test]
fn buffered_channel() {
    let explicit = load("buffered.dve");
    let init = explicit.initial_state();
    let (status, succs) = successors(&explicit, &init);
    assert_eq!(status, Status::NORMAL);
    assert_eq!(
        printed(&explicit, &succs),
        ["[q:{(1,-1)}]; Producer:[p, n:1]; Consumer:[c, x:0, y:0]"]
    );

    let (_, succs) = successors(&explicit, &succs[0]);
    assert_eq!(
        printed(&explicit, &succs),
        [
            "[q:{(1,-1)|(2,-2)}]; Producer:[p, n:2]; Consumer:[c, x:0, y:0]",
            "[q:EMPTY]; Producer:[p, n:1]; Consumer:[c, x:1, y:-1]",
        ]
    );

    // A full buffer disables the producer.
    let (_, succs) = successors(&explicit, &succs[0]);
    assert_eq!(
        printed(&explicit, &succs),
        ["[q:{(2,-2)}]; Producer:[p, n:2]; Consumer:[c, x:1, y:-1]"]
    );
}

#[test]
fn buffered_receive_effects() -> Result<(), ParseError> {
    let system = dve_parser::parse_str(
        "channel {byte} c[1];
        process P { byte sent; state p; init p; trans p -> p { guard sent == 0; sync c!7; effect sent = 1; }; }
        process Q { byte r; byte z; state q; init q; trans q -> q { sync c?r; effect z = r; }; }
        system async;",
    )?;
    let explicit = ExplicitSystem::new(system)?;
    let (_, succs) = successors(&explicit, &explicit.initial_state());
    assert_eq!(
        printed(&explicit, &succs),
        ["[c:{7}]; P:[p, sent:1]; Q:[q, r:0, z:0]"]
    );
    // The effects run before the message is received.
    let (_, succs) = successors(&explicit, &succs[0]);
    assert_eq!(
        printed(&explicit, &succs),
        ["[c:EMPTY]; P:[p, sent:1]; Q:[q, r:7, z:0]"]
    );
    Ok(())
}

#[test]
fn buffered_receive_indexed() -> Result<(), ParseError> {
    let system = dve_parser::parse_str(
        "channel {byte} c[2];
        process P { byte n; state p; init p; trans p -> p { guard n < 2; sync c!n + 5; effect n = n + 1; }; }
        process Q { byte a[2]; byte i; state q; init q; trans q -> q { sync c?a[i]; effect i = i + 1; }; }
        system async;",
    )?;
    let explicit = ExplicitSystem::new(system)?;
    let (_, succs) = successors(&explicit, &explicit.initial_state());
    assert_eq!(
        printed(&explicit, &succs),
        ["[c:{6}]; P:[p, n:1]; Q:[q, a:{0|0}, i:0]"]
    );

    // The index of the target is taken before the effects.
    let (_, succs) = successors(&explicit, &succs[0]);
    assert_eq!(
        printed(&explicit, &succs),
        [
            "[c:{6|7}]; P:[p, n:2]; Q:[q, a:{0|0}, i:0]",
            "[c:EMPTY]; P:[p, n:1]; Q:[q, a:{6|0}, i:1]",
        ]
    );
    let (_, succs) = successors(&explicit, &succs[0]);
    assert_eq!(
        printed(&explicit, &succs),
        ["[c:{7}]; P:[p, n:2]; Q:[q, a:{6|0}, i:1]"]
    );
    let (_, succs) = successors(&explicit, &succs[0]);
    assert_eq!(
        printed(&explicit, &succs),
        ["[c:EMPTY]; P:[p, n:2]; Q:[q, a:{6|7}, i:2]"]
    );
    Ok(())
}

#[test]
fn property_receives_after_sender() -> Result<(), ParseError> {
    let system = dve_parser::parse_str(
        "byte x;
        channel c;
        process P { state p0, p1; init p0; trans p0 -> p1 { sync c!; effect x = 1; }; }
        process M { byte k; state m0, m1; init m0; trans m0 -> m1 { sync c?; effect k = x; }; }
        system async property M;",
    )?;
    let explicit = ExplicitSystem::new(system)?;
    assert!(explicit.property_has_synchronization());
    let (status, succs) = successors(&explicit, &explicit.initial_state());
    assert_eq!(status, Status::NORMAL);
    assert_eq!(printed(&explicit, &succs), ["[x:1]; P:[p1]; M:[m1, k:1]"]);
    Ok(())
}

#[test]
fn property() {
    let explicit = load("property.dve");
    assert!(!explicit.property_has_synchronization());
    assert_eq!(explicit.max_successor_count(), 8);
    let never = explicit.system().property().expect("property");
    assert_eq!(
        *explicit.system().process(never).acceptance(),
        Acceptance::Buchi(vec![1])
    );

    let (status, succs) = successors(&explicit, &explicit.initial_state());
    assert_eq!(status, Status::NORMAL);
    assert_eq!(printed(&explicit, &succs), ["[x:1]; P:[s1]; Never:[n0]"]);

    let (status, succs) = successors(&explicit, &succs[0]);
    assert_eq!(status, Status::NORMAL);
    assert_eq!(
        printed(&explicit, &succs),
        ["[x:0]; P:[s0]; Never:[n0]", "[x:0]; P:[s0]; Never:[n1]"]
    );

    // The property has nowhere to go.
    let (status, succs) = successors(&explicit, &succs[1]);
    assert_eq!(status, Status::NORMAL);
    assert!(succs.is_empty());
}

#[test]
fn committed() {
    let explicit = load("committed.dve");
    let init = explicit.initial_state();
    assert!(!explicit.is_committed(&init));
    let (_, succs) = successors(&explicit, &init);
    assert_eq!(
        printed(&explicit, &succs),
        ["[x:1]; A:[a1]; B:[b0]", "[x:3]; A:[a0]; B:[b1]"]
    );

    let committed = succs[0].clone();
    assert!(explicit.is_committed(&committed));
    let (_, succs) = successors(&explicit, &committed);
    assert_eq!(printed(&explicit, &succs), ["[x:2]; A:[a2]; B:[b0]"]);

    // `not A.a2` now blocks B.
    let (status, _) = successors(&explicit, &succs[0]);
    assert_eq!(status, Status::DEADLOCK);
}

#[test]
fn assertions() -> Result<(), ModelError> {
    let explicit = load("committed.dve");
    let x = explicit.system().symbols().global_variables()[0];
    let mut state = explicit.initial_state();
    let a = explicit.system().processes()[0].gid();
    explicit.set_process_state(&mut state, a, 2);
    explicit.set_variable_value(&mut state, x, 0, 2)?;
    assert_eq!(explicit.violated_assertion_count(&state), 0);
    explicit.set_variable_value(&mut state, x, 0, 5)?;
    assert_eq!(
        explicit.violated_assertion_string(&state, 0).as_deref(),
        Some("7:16-7:21  x == 2")
    );
    Ok(())
}

#[test]
fn round_trip() -> Result<(), ParseError> {
    for name in [
        "initial.dve",
        "buffered.dve",
        "property.dve",
        "committed.dve",
        "sync_conflict.dve",
    ] {
        let explicit = load(name);
        let system = explicit.system();
        let text = system.to_string();
        let reparsed = ExplicitSystem::new(dve_parser::parse_str(&text)?)?;
        assert_eq!(reparsed.system().to_string(), text);
        assert_eq!(
            reparsed.system().symbols().symbol_count(),
            system.symbols().symbol_count()
        );
        for (left, right) in system.processes().iter().zip(reparsed.system().processes()) {
            assert_eq!(left.transitions().len(), right.transitions().len());
        }
        let (status, succs) = successors(&explicit, &explicit.initial_state());
        let (re_status, re_succs) = successors(&reparsed, &reparsed.initial_state());
        assert_eq!(status, re_status);
        assert_eq!(succs, re_succs);
    }
    Ok(())
}

#[test]
fn foreign_variables() -> Result<(), ParseError> {
    let system = dve_parser::parse_str(
        "process P { byte v = 4; state s; init s; }
        process Q {
            state t0, t1;
            init t0;
            trans t0 -> t1 { guard P->v == 4 and P.s; };
        }
        system async;",
    )?;
    let explicit = ExplicitSystem::new(system)?;
    let (_, succs) = successors(&explicit, &explicit.initial_state());
    assert_eq!(printed(&explicit, &succs), ["[]; P:[s, v:4]; Q:[t1]"]);
    Ok(())
}

#[test]
fn forward_references() -> Result<(), ParseError> {
    let system = dve_parser::parse_str(
        "process P { state s0, s1; init s0; trans s0 -> s1 { guard Q.t1; }; }
        process Q { state t0, t1; init t1; }
        system async;",
    )?;
    let explicit = ExplicitSystem::new(system)?;
    let (_, succs) = successors(&explicit, &explicit.initial_state());
    assert_eq!(printed(&explicit, &succs), ["[]; P:[s1]; Q:[t1]"]);
    Ok(())
}

fn error(source: &str) -> String {
    dve_parser::parse_str(source).unwrap_err().to_string()
}

#[test]
fn syntax_errors() {
    assert_eq!(
        error("byte x\nprocess P {}"),
        "2:1-2:7 expected ';', found 'process'"
    );
    assert_eq!(
        error("process P { state s; init s; trans s -> { }; }\nsystem async;"),
        "1:41-1:41 expected identifier, found '{'"
    );
    assert_eq!(
        error("byte x;\nsystem"),
        "2:7-2:7 expected 'async' or 'sync', found end of file"
    );
}

#[test]
fn deep_nesting() {
    let source = format!(
        "byte x = {}1{}; process P {{ state s; init s; }} system async;",
        "(".repeat(5000),
        ")".repeat(5000)
    );
    assert!(error(&source).ends_with("expression is nested too deeply"));
    let source = format!(
        "process P {{ state s; init s; trans s -> s {{ guard {}true; }}; }} system async;",
        "not ".repeat(5000)
    );
    assert!(error(&source).ends_with("expression is nested too deeply"));
    // Moderate nesting is fine.
    let source = format!(
        "byte x = {}1{}; process P {{ state s; init s; }} system async;",
        "(".repeat(20),
        ")".repeat(20)
    );
    assert!(dve_parser::parse_str(&source).is_ok());
}

#[test]
fn declaration_errors() {
    assert_eq!(
        error("byte x; byte x;"),
        "1:14-1:14 redeclaration of 'x' (previously declared at 1:6-1:6)"
    );
    assert_eq!(
        error("process P {\n    state s;\n    init s;\n    trans s -> s { guard y == 0; };\n}\nsystem async;"),
        "4:26-4:26 undeclared variable 'y'"
    );
    assert_eq!(
        error("byte a[0]; process P { state s; init s; } system async;"),
        "1:8-1:8 array 'a' must have at least one element"
    );
    assert_eq!(
        error("byte x = {1}; process P { state s; init s; } system async;"),
        "1:10-1:12 scalar variable 'x' initialized with a list of values"
    );
    assert_eq!(
        error("const byte N = 1; process P { state s; init s; trans s -> s { effect N = 2; }; } system async;"),
        "1:70-1:70 assignment to constant 'N'"
    );
    assert_eq!(
        error("process P { state s; init t; } system async;"),
        "1:27-1:27 undeclared state 't'"
    );
}

#[test]
fn channel_errors() {
    let err = error(
        "channel c;
process P { byte v; state s; init s; trans s -> s { sync c!1; }, s -> s { sync c?{v, v}; }; }
system async;",
    );
    assert_eq!(err, "2:80-2:80 channel 'c' carries messages of 1 values, found 2");
    let err = error("channel c[2]; process P { state s; init s; } system async;");
    assert_eq!(err, "1:11-1:11 buffered channel 'c' needs a list of item types");
}

#[test]
fn property_restrictions() {
    let err = error(
        "channel c;
process P { state s; init s; trans s -> s { sync c?; }; }
process M { state m; init m; trans m -> m { sync c!; }; }
system async property M;",
    );
    assert_eq!(err, "3:50-3:50 property process 'M' cannot contain a send on a channel");
    let err = error(
        "byte x;
process M { state m; init m; trans m -> m { effect x = 1; }; }
system async property M;",
    );
    assert_eq!(
        err,
        "2:52-2:52 property process 'M' cannot contain a assignment to a global variable"
    );
    let err = error("process M { state m; init m; }\nsystem sync property M;");
    assert_eq!(err, "2:22-2:22 a property process requires an asynchronous system");
    let err = error(
        "process P { byte v; state s; init s; }
process Q { state t; init t; trans t -> t { guard P->v == 0; }; }
process R { state r; init r; trans r -> r { guard P->v == 1; }; }
system async;",
    );
    assert_eq!(
        err,
        "3:51-3:54 access to variables of other processes is allowed in only one process"
    );
}

#[test]
fn model_errors() {
    assert_eq!(
        dve_parser::parse_str("process P { state s; init s; trans s -> s { guard Q.t; }; } system async;"),
        Err(ParseError::Model(ModelError::UndeclaredProcess("Q".to_owned())))
    );
    assert!(matches!(
        dve_parser::parse_str("byte x = 300; process P { state s; init s; } system async;"),
        Err(ParseError::Model(ModelError::InitializerOutOfBounds { .. }))
    ));
    assert!(matches!(
        dve_parser::parse_str("byte x; system async;"),
        Err(ParseError::Model(ModelError::NoProcesses))
    ));
}

#[test]
fn diagnostics() {
    let mut diagnostics = Diagnostics::new();
    dve_parser::parse("channel c; process P { state s; init s; } system async;", &mut diagnostics)
        .expect("parse");
    assert_eq!(diagnostics.warnings().count(), 1);
    assert!(!diagnostics.has_errors());

    let mut diagnostics = Diagnostics::new();
    assert!(dve_parser::parse("byte x; byte x;", &mut diagnostics).is_err());
    let errors = diagnostics.errors().collect::<Vec<_>>();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].span, Some(SourceSpan::new(1, 14, 1, 14)));
}
