use dve_core::*;

fn process(builder: &mut SystemBuilder, name: &str, states: &[&str]) -> (ProcessGid, Vec<StateGid>) {
    let process = builder.add_process(name, None, true);
    let states = states
        .iter()
        .map(|state| builder.add_state(state, process, None, true))
        .collect();
    builder.process_mut(process).set_initial_state(0);
    (process, states)
}

fn trans(process: ProcessGid, states: &[StateGid], from: usize, to: usize) -> Transition {
    Transition::new(process, (states[from], from), (states[to], to), None)
}

fn byte(builder: &mut SystemBuilder, name: &str, process: Option<ProcessGid>, init: Value) -> VarGid {
    let mut info = VariableInfo::scalar(VarType::Byte);
    info.init.push(Expression::from(init));
    builder.add_variable(name, process, info, None)
}

fn set(var: VarGid, value: Expression) -> Expression {
    Expression::assign(Expression::var(var, None), value, None)
}

fn add(var: VarGid, n: Value) -> Expression {
    Expression::binary(BinaryOp::Add, Expression::var(var, None), n.into(), None)
}

fn explicit(builder: SystemBuilder) -> Result<ExplicitSystem, ModelError> {
    ExplicitSystem::new(builder.build(&mut Diagnostics::new())?)
}

#[test]
fn interleaving() -> Result<(), ModelError> {
    let mut builder = SystemBuilder::new();
    let x = byte(&mut builder, "x", None, 0);
    let (p, ps) = process(&mut builder, "P", &["p0", "p1"]);
    let (q, qs) = process(&mut builder, "Q", &["q0", "q1"]);
    let mut t = trans(p, &ps, 0, 1);
    t.add_effect(set(x, add(x, 1)));
    builder.add_transition(t)?;
    let mut t = trans(q, &qs, 0, 1);
    t.add_effect(set(x, add(x, 2)));
    builder.add_transition(t)?;
    let explicit = explicit(builder)?;
    let mut generator = explicit.new_instance();

    let init = generator.initial_state();
    let mut succs = Vec::new();
    assert_eq!(generator.successors(&init, &mut succs), Status::NORMAL);
    assert_eq!(succs.len(), 2);
    assert_eq!(explicit.variable_value(&succs[0], x, 0)?, 1);
    assert_eq!(explicit.process_state(&succs[0], p), 1);
    assert_eq!(explicit.process_state(&succs[0], q), 0);
    assert_eq!(explicit.variable_value(&succs[1], x, 0)?, 2);

    let first = succs[0].clone();
    assert_eq!(generator.successors(&first, &mut succs), Status::NORMAL);
    assert_eq!(succs.len(), 1);
    assert_eq!(explicit.variable_value(&succs[0], x, 0)?, 3);

    let last = succs[0].clone();
    assert_eq!(generator.successors(&last, &mut succs), Status::DEADLOCK);
    assert!(succs.is_empty());
    Ok(())
}

#[test]
fn ith_successor() -> Result<(), ModelError> {
    let mut builder = SystemBuilder::new();
    let x = byte(&mut builder, "x", None, 0);
    let (p, ps) = process(&mut builder, "P", &["p0", "p1"]);
    for n in 1..=3 {
        let mut t = trans(p, &ps, 0, 1);
        t.add_effect(set(x, n.into()));
        builder.add_transition(t)?;
    }
    let explicit = explicit(builder)?;
    let mut generator = explicit.new_instance();
    let init = generator.initial_state();

    let (status, succ) = generator.ith_successor(&init, 1);
    assert_eq!(status, Status::NORMAL);
    assert_eq!(explicit.variable_value(&succ.unwrap(), x, 0)?, 2);
    let (_, succ) = generator.ith_successor(&init, 3);
    assert!(succ.is_none());

    let (status, enabled) = generator.enabled_transitions(&init);
    assert_eq!(status, Status::NORMAL);
    assert_eq!(enabled.len(), 3);
    assert_eq!(enabled.next_begin(p), 3);
    let enabled = enabled.get(2).unwrap().clone();
    assert_eq!(enabled.sender_or_normal(), Some(explicit.system().process(p).transitions()[2]));
    assert_eq!(enabled.receiver(), None);
    assert_eq!(enabled.property(), None);
    let (_, succ) = generator.successor(&init, &enabled);
    assert_eq!(explicit.variable_value(&succ, x, 0)?, 3);
    Ok(())
}

#[test]
fn handshake() -> Result<(), ModelError> {
    let mut builder = SystemBuilder::new();
    let c = builder.add_channel("c", ChannelInfo::untyped(), None);
    let (p, ps) = process(&mut builder, "P", &["p0", "p1"]);
    let (q, qs) = process(&mut builder, "Q", &["q0", "q1"]);
    let y = byte(&mut builder, "y", Some(q), 0);
    let mut t = trans(p, &ps, 0, 1);
    t.set_sync(SyncMode::Send, c, vec![Expression::from(5)]);
    builder.add_transition(t)?;
    let mut t = trans(q, &qs, 0, 1);
    t.set_sync(SyncMode::Receive, c, vec![Expression::var(y, None)]);
    t.add_effect(set(y, add(y, 1)));
    builder.add_transition(t)?;
    let explicit = explicit(builder)?;
    let mut generator = explicit.new_instance();

    let init = generator.initial_state();
    let (status, enabled) = generator.enabled_transitions(&init);
    assert_eq!(status, Status::NORMAL);
    assert_eq!(enabled.len(), 1);
    let pair = enabled.get(0).unwrap();
    assert!(pair.sender_or_normal().is_some());
    assert!(pair.receiver().is_some());

    let mut succs = Vec::new();
    generator.successors(&init, &mut succs);
    assert_eq!(succs.len(), 1);
    assert_eq!(explicit.variable_value(&succs[0], y, 0)?, 6);
    assert_eq!(explicit.process_state(&succs[0], p), 1);
    assert_eq!(explicit.process_state(&succs[0], q), 1);
    Ok(())
}

#[test]
fn handshake_arity_mismatch() -> Result<(), ModelError> {
    let mut builder = SystemBuilder::new();
    let c = builder.add_channel("c", ChannelInfo::untyped(), None);
    let (p, ps) = process(&mut builder, "P", &["p0", "p1"]);
    let (q, qs) = process(&mut builder, "Q", &["q0", "q1"]);
    let mut t = trans(p, &ps, 0, 1);
    t.set_sync(SyncMode::Send, c, vec![Expression::from(5)]);
    builder.add_transition(t)?;
    let mut t = trans(q, &qs, 0, 1);
    t.set_sync(SyncMode::Receive, c, Vec::new());
    builder.add_transition(t)?;
    let explicit = explicit(builder)?;
    let mut generator = explicit.new_instance();

    let init = generator.initial_state();
    let mut succs = Vec::new();
    assert_eq!(generator.successors(&init, &mut succs), Status::ERROR);
    assert!(explicit.is_erroneous(&succs[0]));
    Ok(())
}

#[test]
fn errors_divert_single_successors() -> Result<(), ModelError> {
    let mut builder = SystemBuilder::new();
    let a = builder.add_variable("a", None, VariableInfo::array(VarType::Byte, 3), None);
    let i = byte(&mut builder, "i", None, 3);
    let x = byte(&mut builder, "x", None, 0);
    let (p, ps) = process(&mut builder, "P", &["p0", "p1"]);
    let mut t = trans(p, &ps, 0, 1);
    t.add_effect(Expression::assign(
        Expression::index(a, Expression::var(i, None), None),
        1.into(),
        None,
    ));
    builder.add_transition(t)?;
    let mut t = trans(p, &ps, 0, 1);
    t.add_effect(set(x, 300.into()));
    builder.add_transition(t)?;
    let mut t = trans(p, &ps, 0, 1);
    t.set_guard(Expression::binary(
        BinaryOp::Div,
        1.into(),
        Expression::binary(BinaryOp::Sub, Expression::var(i, None), 3.into(), None),
        None,
    ));
    builder.add_transition(t)?;
    let mut t = trans(p, &ps, 0, 1);
    t.add_effect(set(x, 1.into()));
    builder.add_transition(t)?;
    let explicit = explicit(builder)?;
    let mut generator = explicit.new_instance();

    let init = generator.initial_state();
    let mut succs = Vec::new();
    assert_eq!(generator.successors(&init, &mut succs), Status::ERROR);
    assert_eq!(succs.len(), 4);
    assert!(explicit.is_erroneous(&succs[0]));
    assert!(explicit.is_erroneous(&succs[1]));
    assert!(explicit.is_erroneous(&succs[2]));
    assert!(!explicit.is_erroneous(&succs[3]));
    assert_eq!(explicit.variable_value(&succs[3], x, 0)?, 1);
    assert_eq!(explicit.format_state(&succs[0], PrintFlags::all()), "(ERR)");
    Ok(())
}

#[test]
fn synchronous_product() -> Result<(), ModelError> {
    let mut builder = SystemBuilder::new();
    builder.set_synchronicity(Synchronicity::Sync);
    let (p, ps) = process(&mut builder, "P", &["p0", "p1", "p2"]);
    let u = byte(&mut builder, "u", Some(p), 0);
    let (q, qs) = process(&mut builder, "Q", &["q0", "q1"]);
    let v = byte(&mut builder, "v", Some(q), 0);
    for (to, n) in [(1, 1), (2, 2)] {
        let mut t = trans(p, &ps, 0, to);
        t.add_effect(set(u, n.into()));
        builder.add_transition(t)?;
    }
    for n in 1..=3 {
        let mut t = trans(q, &qs, 0, 1);
        t.add_effect(set(v, n.into()));
        builder.add_transition(t)?;
    }
    let explicit = explicit(builder)?;
    let mut generator = explicit.new_instance();

    let init = generator.initial_state();
    let mut succs = Vec::new();
    assert_eq!(generator.successors(&init, &mut succs), Status::NORMAL);
    assert_eq!(succs.len(), 6);
    for (k, succ) in succs.iter().enumerate() {
        assert_eq!(explicit.variable_value(succ, u, 0)?, (k % 2) as Value + 1);
        assert_eq!(explicit.variable_value(succ, v, 0)?, (k / 2) as Value + 1);
        assert_eq!(explicit.process_state(succ, p), k % 2 + 1);
        assert_eq!(explicit.process_state(succ, q), 1);
    }
    let (_, enabled) = generator.enabled_transitions(&init);
    let choice = enabled.get(5).unwrap().clone();
    assert!(choice.is_synchronous());
    assert_eq!(choice.transitions().len(), 2);
    assert_eq!(generator.successor(&init, &choice).1, succs[5]);

    // Q cannot move anymore, which blocks P too.
    let stuck = succs[0].clone();
    assert_eq!(generator.successors(&stuck, &mut succs), Status::DEADLOCK);
    assert!(succs.is_empty());
    Ok(())
}

#[test]
fn synchronous_conflict() -> Result<(), ModelError> {
    let mut builder = SystemBuilder::new();
    builder.set_synchronicity(Synchronicity::Sync);
    let x = byte(&mut builder, "x", None, 0);
    let y = byte(&mut builder, "y", None, 0);
    let (p, ps) = process(&mut builder, "P", &["p0", "p1"]);
    let (q, qs) = process(&mut builder, "Q", &["q0", "q1"]);
    let mut t = trans(p, &ps, 0, 1);
    t.add_effect(set(x, 1.into()));
    builder.add_transition(t)?;
    let mut t = trans(q, &qs, 0, 1);
    t.add_effect(set(y, 2.into()));
    builder.add_transition(t)?;
    let mut t = trans(q, &qs, 0, 1);
    t.add_effect(set(x, 2.into()));
    builder.add_transition(t)?;
    let explicit = explicit(builder)?;
    let mut generator = explicit.new_instance();

    let init = generator.initial_state();
    let mut succs = Vec::new();
    assert_eq!(generator.successors(&init, &mut succs), Status::ERROR);
    assert_eq!(succs.len(), 2);
    assert_eq!(explicit.variable_value(&succs[0], x, 0)?, 1);
    assert_eq!(explicit.variable_value(&succs[0], y, 0)?, 2);
    assert!(explicit.is_erroneous(&succs[1]));
    Ok(())
}

#[test]
fn buffered_channel() -> Result<(), ModelError> {
    let mut builder = SystemBuilder::new();
    let x = byte(&mut builder, "x", None, 7);
    let c = builder.add_channel("c", ChannelInfo::typed(vec![VarType::Byte], 2), None);
    let (p, ps) = process(&mut builder, "P", &["p0"]);
    let (q, qs) = process(&mut builder, "Q", &["q0"]);
    let y = byte(&mut builder, "y", Some(q), 0);
    let mut t = trans(p, &ps, 0, 0);
    t.set_sync(SyncMode::BufferedSend, c, vec![Expression::var(x, None)]);
    t.add_effect(set(x, add(x, 1)));
    builder.add_transition(t)?;
    let mut t = trans(q, &qs, 0, 0);
    t.set_sync(SyncMode::BufferedReceive, c, vec![Expression::var(y, None)]);
    builder.add_transition(t)?;
    let explicit = explicit(builder)?;
    let mut generator = explicit.new_instance();
    let mut succs = Vec::new();

    let init = generator.initial_state();
    assert_eq!(explicit.format_state(&init, PrintFlags::VAR_NAMES), "[x:7, c:EMPTY]; [0]; [0, y:0]");
    generator.successors(&init, &mut succs);
    assert_eq!(succs.len(), 1);
    let one = succs[0].clone();
    assert_eq!(explicit.format_state(&one, PrintFlags::VAR_NAMES), "[x:8, c:{8}]; [0]; [0, y:0]");

    generator.successors(&one, &mut succs);
    assert_eq!(succs.len(), 2);
    let two = succs[0].clone();
    assert_eq!(explicit.format_state(&two, PrintFlags::VAR_NAMES), "[x:9, c:{8|9}]; [0]; [0, y:0]");
    assert_eq!(explicit.format_state(&succs[1], PrintFlags::VAR_NAMES), "[x:8, c:EMPTY]; [0]; [0, y:8]");

    generator.successors(&two, &mut succs);
    assert_eq!(succs.len(), 1);
    assert_eq!(explicit.format_state(&succs[0], PrintFlags::VAR_NAMES), "[x:9, c:{9}]; [0]; [0, y:8]");
    Ok(())
}

#[test]
fn property_composition() -> Result<(), ModelError> {
    let mut builder = SystemBuilder::new();
    let x = byte(&mut builder, "x", None, 0);
    let (p, ps) = process(&mut builder, "P", &["p0", "p1"]);
    let (q, qs) = process(&mut builder, "Q", &["q0", "q1"]);
    let (r, rs) = process(&mut builder, "R", &["r0", "r1"]);
    let k = byte(&mut builder, "k", Some(r), 0);
    builder.set_property(Some(r));
    let mut t = trans(p, &ps, 0, 1);
    t.add_effect(set(x, 1.into()));
    builder.add_transition(t)?;
    builder.add_transition(trans(q, &qs, 0, 1))?;
    let mut t = trans(r, &rs, 0, 1);
    t.set_guard(Expression::binary(BinaryOp::Eq, Expression::var(x, None), 0.into(), None));
    builder.add_transition(t)?;
    let mut t = trans(r, &rs, 0, 0);
    t.add_effect(set(k, add(k, 1)));
    builder.add_transition(t)?;
    let explicit = explicit(builder)?;
    assert!(!explicit.property_has_synchronization());
    assert_eq!(explicit.max_successor_count(), 8);
    let mut generator = explicit.new_instance();

    let init = generator.initial_state();
    let (_, enabled) = generator.enabled_transitions(&init);
    assert_eq!(enabled.len(), 4);
    assert_eq!(enabled.property_successor_count(), 2);
    assert!(enabled.iter().all(|e| e.property().is_some()));

    let mut succs = Vec::new();
    assert_eq!(generator.successors(&init, &mut succs), Status::NORMAL);
    let expected = [(1, 0, 1, 0), (1, 0, 0, 1), (0, 1, 1, 0), (0, 1, 0, 1)];
    for (succ, (p_state, q_state, r_state, k_value)) in succs.iter().zip(expected) {
        assert_eq!(explicit.process_state(succ, p), p_state);
        assert_eq!(explicit.process_state(succ, q), q_state);
        assert_eq!(explicit.process_state(succ, r), r_state);
        assert_eq!(explicit.variable_value(succ, k, 0)?, k_value);
    }

    // Once the system is stuck the property still moves, and the state is reported as a deadlock.
    let stuck = generator.successors(&succs[1].clone(), &mut succs);
    assert_eq!(stuck, Status::NORMAL);
    let last = succs
        .iter()
        .find(|s| explicit.process_state(s, q) == 1)
        .unwrap()
        .clone();
    assert_eq!(generator.successors(&last, &mut succs), Status::DEADLOCK);
    assert_eq!(succs.len(), 1);
    assert_eq!(explicit.variable_value(&succs[0], k, 0)?, 3);
    assert_eq!(explicit.process_state(&succs[0], q), 1);
    Ok(())
}

#[test]
fn property_receives() -> Result<(), ModelError> {
    let mut builder = SystemBuilder::new();
    let x = byte(&mut builder, "x", None, 0);
    let c = builder.add_channel("c", ChannelInfo::untyped(), None);
    let (p, ps) = process(&mut builder, "P", &["p0", "p1"]);
    let (r, rs) = process(&mut builder, "R", &["r0", "r1"]);
    let k = byte(&mut builder, "k", Some(r), 0);
    builder.set_property(Some(r));
    let mut t = trans(p, &ps, 0, 1);
    t.set_sync(SyncMode::Send, c, Vec::new());
    t.add_effect(set(x, 1.into()));
    builder.add_transition(t)?;
    let mut t = trans(r, &rs, 0, 1);
    t.set_sync(SyncMode::Receive, c, Vec::new());
    t.add_effect(set(k, Expression::var(x, None)));
    builder.add_transition(t)?;
    let explicit = explicit(builder)?;
    assert!(explicit.property_has_synchronization());
    let mut generator = explicit.new_instance();

    let init = generator.initial_state();
    let (_, enabled) = generator.enabled_transitions(&init);
    let pair = enabled.get(0).expect("handshake").clone();
    assert_eq!(pair.sender_or_normal(), Some(explicit.system().process(p).transitions()[0]));
    assert_eq!(pair.receiver(), None);
    assert_eq!(pair.property(), Some(explicit.system().process(r).transitions()[0]));

    let mut succs = Vec::new();
    assert_eq!(generator.successors(&init, &mut succs), Status::NORMAL);
    assert_eq!(succs.len(), 1);
    assert_eq!(explicit.process_state(&succs[0], p), 1);
    assert_eq!(explicit.process_state(&succs[0], r), 1);
    // The property sees the effects of the sender.
    assert_eq!(explicit.variable_value(&succs[0], k, 0)?, 1);
    Ok(())
}

#[test]
fn committed_states() -> Result<(), ModelError> {
    let mut builder = SystemBuilder::new();
    let (p, ps) = process(&mut builder, "P", &["p0", "p1", "p2"]);
    let (q, qs) = process(&mut builder, "Q", &["q0", "q1"]);
    builder.process_mut(p).set_committed(1);
    builder.add_transition(trans(p, &ps, 0, 1))?;
    builder.add_transition(trans(p, &ps, 1, 2))?;
    builder.add_transition(trans(q, &qs, 0, 1))?;
    let explicit = explicit(builder)?;
    let mut generator = explicit.new_instance();

    let init = generator.initial_state();
    assert!(!explicit.is_committed(&init));
    let mut succs = Vec::new();
    generator.successors(&init, &mut succs);
    assert_eq!(succs.len(), 2);
    let committed = succs[0].clone();
    assert!(explicit.is_committed(&committed));
    generator.successors(&committed, &mut succs);
    assert_eq!(succs.len(), 1);
    assert_eq!(explicit.process_state(&succs[0], p), 2);
    assert_eq!(explicit.process_state(&succs[0], q), 0);
    Ok(())
}
