//! Human-readable rendering of packed states.

use crate::{ExplicitSystem, StateCreator, layout::read_counter, layout::read_value};
use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// What to show when printing a state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PrintFlags: u8 {
        /// Names of control states instead of their numbers.
        const STATE_NAMES = 1;
        /// Names of variables and channels.
        const VAR_NAMES = 2;
        /// Names of processes.
        const PROCESS_NAMES = 4;
        /// One line per process.
        const MULTILINE = 8;
    }
}

pub(crate) fn format_state(explicit: &ExplicitSystem, state: &[u8], flags: PrintFlags) -> String {
    StateDisplay {
        explicit,
        state,
        flags,
    }
    .to_string()
}

struct StateDisplay<'a> {
    explicit: &'a ExplicitSystem,
    state: &'a [u8],
    flags: PrintFlags,
}

impl fmt::Display for StateDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let StateDisplay {
            explicit,
            state,
            flags,
        } = *self;
        if explicit.is_erroneous(state) {
            return write!(f, "(ERR)");
        }
        let system = explicit.system();
        let symbols = system.symbols();
        let layout = explicit.layout();
        let mut first = true;
        let separator = |f: &mut fmt::Formatter<'_>, first: &mut bool| {
            let sep = if *first { "[" } else { ", " };
            *first = false;
            write!(f, "{sep}")
        };

        for creator in layout.creators() {
            match *creator {
                StateCreator::Variable(var) => {
                    separator(f, &mut first)?;
                    let info = symbols.variable_info(var);
                    if flags.contains(PrintFlags::VAR_NAMES) {
                        write!(f, "{}:", symbols.variable(var).name())?;
                    }
                    let offset = layout.var_offset(var).unwrap_or_default();
                    let width = info.var_type.width();
                    if info.is_array() {
                        write!(f, "{{")?;
                        for idx in 0..info.len() {
                            if idx > 0 {
                                write!(f, "|")?;
                            }
                            write!(f, "{}", read_value(state, offset + idx * width, info.var_type))?;
                        }
                        write!(f, "}}")?;
                    } else {
                        write!(f, "{}", read_value(state, offset, info.var_type))?;
                    }
                }
                StateCreator::ChannelBuffer(channel) => {
                    separator(f, &mut first)?;
                    let info = symbols.channel_info(channel);
                    write!(f, "{}:", symbols.channel(channel).name())?;
                    let offset = layout.channel_offset(channel).unwrap_or_default();
                    let count = read_counter(state, offset);
                    let item_types = info.item_types.as_deref().unwrap_or_default();
                    if count == 0 {
                        write!(f, "EMPTY")?;
                        continue;
                    }
                    write!(f, "{{")?;
                    let mut slot = offset + crate::layout::COUNTER_WIDTH;
                    for idx in 0..count {
                        if idx > 0 {
                            write!(f, "|")?;
                        }
                        let tuple = item_types.len() != 1;
                        if tuple {
                            write!(f, "(")?;
                        }
                        for (pos, item_type) in item_types.iter().enumerate() {
                            if pos > 0 {
                                write!(f, ",")?;
                            }
                            write!(f, "{}", read_value(state, slot, *item_type))?;
                            slot += item_type.width();
                        }
                        if tuple {
                            write!(f, ")")?;
                        }
                    }
                    write!(f, "}}")?;
                }
                StateCreator::ProcessState(process) => {
                    write!(f, "{}", if first { "[]" } else { "]" })?;
                    if flags.contains(PrintFlags::MULTILINE) {
                        writeln!(f)?;
                    } else {
                        write!(f, "; ")?;
                    }
                    if flags.contains(PrintFlags::PROCESS_NAMES) {
                        write!(f, "{}:", symbols.process(process).name())?;
                    }
                    write!(f, "[")?;
                    first = false;
                    let lid = explicit.process_state(state, process);
                    match system.process(process).states().get(lid) {
                        Some(gid) if flags.contains(PrintFlags::STATE_NAMES) => {
                            write!(f, "{}", symbols.state(*gid).name())?
                        }
                        _ => write!(f, "{lid}")?,
                    }
                }
            }
        }
        write!(f, "]")?;
        if flags.contains(PrintFlags::MULTILINE) {
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ChannelInfo, Diagnostics, Expression, SystemBuilder, VarType, VariableInfo,
    };

    fn system() -> ExplicitSystem {
        let mut builder = SystemBuilder::new();
        let mut x = VariableInfo::scalar(VarType::Byte);
        x.init.push(Expression::from(1));
        builder.add_variable("x", None, x, None);
        let mut a = VariableInfo::array(VarType::Int, 2);
        a.init.push(Expression::from(-1));
        builder.add_variable("a", None, a, None);
        builder.add_channel("c", ChannelInfo::typed(vec![VarType::Byte, VarType::Byte], 2), None);
        let p = builder.add_process("P", None, true);
        builder.add_state("s0", p, None, true);
        builder.add_state("s1", p, None, true);
        builder.process_mut(p).set_initial_state(1);
        let mut v = VariableInfo::scalar(VarType::Byte);
        v.init.push(Expression::from(5));
        builder.add_variable("v", Some(p), v, None);
        let system = builder.build(&mut Diagnostics::new()).unwrap();
        ExplicitSystem::new(system).unwrap()
    }

    #[test]
    fn one_line() {
        let explicit = system();
        let state = explicit.initial_state();
        assert_eq!(
            explicit.format_state(&state, PrintFlags::all() - PrintFlags::MULTILINE),
            "[x:1, a:{-1|0}, c:EMPTY]; P:[s1, v:5]"
        );
        assert_eq!(
            explicit.format_state(&state, PrintFlags::empty()),
            "[1, {-1|0}, c:EMPTY]; [1, 5]"
        );
    }

    #[test]
    fn multiline_and_buffers() {
        let explicit = system();
        let mut state = explicit.initial_state();
        let offset = explicit.layout().channel_offset(crate::ChannelGid(0)).unwrap();
        crate::layout::write_counter(&mut state, offset, 2);
        state[offset + 2..offset + 6].copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(
            explicit.format_state(&state, PrintFlags::VAR_NAMES | PrintFlags::MULTILINE),
            "[x:1, a:{-1|0}, c:{(1,2)|(3,4)}]\n[1, v:5]\n"
        );
        assert_eq!(explicit.format_state(&explicit.error_state(), PrintFlags::all()), "(ERR)");
    }
}
