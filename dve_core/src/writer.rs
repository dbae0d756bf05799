//! Serialization of models back to DVE sources.

use crate::{
    Acceptance, DveSystem, Expression, Process, ProcessGid, Synchronicity, SyncMode, Transition,
    VarGid,
};
use std::fmt;

fn write_list<T>(
    f: &mut fmt::Formatter<'_>,
    items: impl IntoIterator<Item = T>,
    separator: &str,
    mut write: impl FnMut(&mut fmt::Formatter<'_>, T) -> fmt::Result,
) -> fmt::Result {
    for (idx, item) in items.into_iter().enumerate() {
        if idx > 0 {
            write!(f, "{separator}")?;
        }
        write(f, item)?;
    }
    Ok(())
}

impl DveSystem {
    fn write_expr(&self, f: &mut fmt::Formatter<'_>, expr: &Expression) -> fmt::Result {
        write!(f, "{}", expr.display(&self.symbols))
    }

    fn write_variable(&self, f: &mut fmt::Formatter<'_>, var: VarGid, indent: &str) -> fmt::Result {
        let symbol = self.symbols.variable(var);
        let info = self.symbols.variable_info(var);
        write!(f, "{indent}")?;
        if info.constant {
            write!(f, "const ")?;
        }
        write!(f, "{} {}", info.var_type.keyword(), symbol.name())?;
        if let Some(len) = info.array {
            write!(f, "[{len}]")?;
        }
        if !info.init.is_empty() {
            write!(f, " = ")?;
            if info.is_array() {
                write!(f, "{{")?;
                write_list(f, &info.init, ", ", |f, e| self.write_expr(f, e))?;
                write!(f, "}}")?;
            } else {
                self.write_expr(f, &info.init[0])?;
            }
        }
        writeln!(f, ";")
    }

    fn write_states(&self, f: &mut fmt::Formatter<'_>, process: &Process, lids: &[usize]) -> fmt::Result {
        write_list(f, lids, ", ", |f, lid| {
            write!(f, "{}", self.symbols.state(process.states()[*lid]).name())
        })
    }

    fn write_acceptance(&self, f: &mut fmt::Formatter<'_>, process: &Process) -> fmt::Result {
        let sets = |f: &mut fmt::Formatter<'_>, sets: &[Vec<usize>]| {
            write_list(f, sets, ", ", |f, set| {
                write!(f, "(")?;
                self.write_states(f, process, set)?;
                write!(f, ")")
            })
        };
        let pairs = |f: &mut fmt::Formatter<'_>, pairs: &[(Vec<usize>, Vec<usize>)]| {
            write_list(f, pairs, ", ", |f, (left, right)| {
                write!(f, "(")?;
                self.write_states(f, process, left)?;
                write!(f, "; ")?;
                self.write_states(f, process, right)?;
                write!(f, ")")
            })
        };
        match process.acceptance() {
            Acceptance::None => return Ok(()),
            Acceptance::Buchi(states) => {
                write!(f, "    accept ")?;
                self.write_states(f, process, states)?;
            }
            Acceptance::GenBuchi(list) => {
                write!(f, "    accept genbuchi ")?;
                sets(f, list)?;
            }
            Acceptance::Muller(list) => {
                write!(f, "    accept muller ")?;
                sets(f, list)?;
            }
            Acceptance::Rabin(list) => {
                write!(f, "    accept rabin ")?;
                pairs(f, list)?;
            }
            Acceptance::Streett(list) => {
                write!(f, "    accept streett ")?;
                pairs(f, list)?;
            }
        }
        writeln!(f, ";")
    }

    fn write_transition(&self, f: &mut fmt::Formatter<'_>, transition: &Transition) -> fmt::Result {
        write!(
            f,
            "        {} -> {} {{",
            self.symbols.state(transition.from()).name(),
            self.symbols.state(transition.to()).name()
        )?;
        if let Some(guard) = transition.guard() {
            write!(f, " guard ")?;
            self.write_expr(f, guard)?;
            write!(f, ";")?;
        }
        if let Some(channel) = transition.channel() {
            let token = match transition.sync_mode() {
                SyncMode::Send | SyncMode::BufferedSend => '!',
                _ => '?',
            };
            write!(f, " sync {}{token}", self.symbols.channel(channel).name())?;
            match transition.sync_exprs() {
                [] => {}
                [expr] => self.write_expr(f, expr)?,
                exprs => {
                    write!(f, "{{")?;
                    write_list(f, exprs, ", ", |f, e| self.write_expr(f, e))?;
                    write!(f, "}}")?;
                }
            }
            write!(f, ";")?;
        }
        if !transition.effects().is_empty() {
            write!(f, " effect ")?;
            write_list(f, transition.effects(), ", ", |f, e| self.write_expr(f, e))?;
            write!(f, ";")?;
        }
        write!(f, " }}")
    }

    fn write_process(&self, f: &mut fmt::Formatter<'_>, process: &Process) -> fmt::Result {
        writeln!(f, "process {} {{", self.symbols.process(process.gid()).name())?;
        for var in process.vars() {
            self.write_variable(f, *var, "    ")?;
        }
        write!(f, "    state ")?;
        let all = (0..process.state_count()).collect::<Vec<_>>();
        self.write_states(f, process, &all)?;
        writeln!(f, ";")?;
        if let Some(initial) = process.initial_state() {
            writeln!(f, "    init {};", self.symbols.state(process.states()[initial]).name())?;
        }
        self.write_acceptance(f, process)?;
        let committed = all
            .iter()
            .copied()
            .filter(|lid| process.is_committed(*lid))
            .collect::<Vec<_>>();
        if !committed.is_empty() {
            write!(f, "    commit ")?;
            self.write_states(f, process, &committed)?;
            writeln!(f, ";")?;
        }
        let assertions = all
            .iter()
            .flat_map(|lid| process.assertions(*lid).iter().map(move |a| (*lid, a)))
            .collect::<Vec<_>>();
        if !assertions.is_empty() {
            write!(f, "    assert ")?;
            write_list(f, assertions, ", ", |f, (lid, assertion)| {
                write!(f, "{}: ", self.symbols.state(process.states()[lid]).name())?;
                self.write_expr(f, assertion)
            })?;
            writeln!(f, ";")?;
        }
        if !process.transitions().is_empty() {
            writeln!(f, "    trans")?;
            write_list(f, process.transitions(), ",\n", |f, t| {
                self.write_transition(f, self.transition(*t))
            })?;
            writeln!(f, ";")?;
        }
        writeln!(f, "}}")
    }

    fn property_name(&self, property: ProcessGid) -> &str {
        self.symbols.process(property).name()
    }
}

impl fmt::Display for DveSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for var in self.symbols.global_variables() {
            self.write_variable(f, *var, "")?;
        }
        for channel in self.symbols.channels() {
            let info = self.symbols.channel_info(channel);
            let name = self.symbols.channel(channel).name();
            match &info.item_types {
                Some(types) => {
                    write!(f, "channel(")?;
                    write_list(f, types, ",", |f, t| write!(f, "{}", t.keyword()))?;
                    writeln!(f, ") {name}[{}];", info.capacity)?;
                }
                None => writeln!(f, "channel {name};")?,
            }
        }
        for process in &self.processes {
            writeln!(f)?;
            self.write_process(f, process)?;
        }
        writeln!(f)?;
        write!(
            f,
            "system {}",
            match self.synchronicity {
                Synchronicity::Async => "async",
                Synchronicity::Sync => "sync",
            }
        )?;
        if let Some(property) = self.property {
            write!(f, " property {}", self.property_name(property))?;
        }
        writeln!(f, ";")
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        BinaryOp, ChannelInfo, Diagnostics, Expression, SystemBuilder, Transition, VarType,
        VariableInfo,
    };

    #[test]
    fn write_model() {
        let mut builder = SystemBuilder::new();
        let mut n = VariableInfo::scalar(VarType::Byte);
        n.constant = true;
        n.init.push(Expression::from(3));
        builder.add_variable("N", None, n, None);
        let mut a = VariableInfo::array(VarType::Int, 2);
        a.init = vec![Expression::from(1), Expression::from(2)];
        let a = builder.add_variable("a", None, a, None);
        let c = builder.add_channel("c", ChannelInfo::untyped(), None);
        builder.add_channel("d", ChannelInfo::typed(vec![VarType::Byte, VarType::Int], 2), None);
        let p = builder.add_process("P", None, true);
        let s0 = builder.add_state("s0", p, None, true);
        let s1 = builder.add_state("s1", p, None, true);
        builder.process_mut(p).set_initial_state(0);
        builder.process_mut(p).set_committed(1);
        builder
            .process_mut(p)
            .add_assertion(0, Expression::binary(BinaryOp::Gt, Expression::index(a, 0.into(), None), 0.into(), None));
        let mut t = Transition::new(p, (s0, 0), (s1, 1), None);
        t.set_guard(Expression::binary(
            BinaryOp::Eq,
            Expression::index(a, 1.into(), None),
            2.into(),
            None,
        ));
        t.set_sync(crate::SyncMode::Send, c, vec![Expression::from(4)]);
        t.add_effect(Expression::assign(
            Expression::index(a, 0.into(), None),
            Expression::from(0),
            None,
        ));
        builder.add_transition(t).unwrap();
        builder
            .add_transition(Transition::new(p, (s1, 1), (s0, 0), None))
            .unwrap();
        let system = builder.build(&mut Diagnostics::new()).unwrap();
        assert_eq!(
            system.to_string(),
            "const byte N = 3;
int a[2] = {1, 2};
channel c;
channel(byte,int) d[2];

process P {
    state s0, s1;
    init s0;
    commit s1;
    assert s0: a[0] > 0;
    trans
        s0 -> s1 { guard a[1] == 2; sync c!4; effect a[0] = 0; },
        s1 -> s0 { };
}

system async;
"
        );
    }
}
