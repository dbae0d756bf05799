//! Byte layout of packed states.
//!
//! A packed state is the concatenation of:
//!
//! 1. the global (non-constant) variables, in declaration order;
//! 2. the buffers of typed channels with positive capacity,
//!    each a `u16` occupancy count followed by `capacity` message slots;
//! 3. for every process, a `u16` control field followed by its local (non-constant) variables.
//!
//! `byte` values take one byte, `int` values two (little-endian).
//! Arrays take `width × length` contiguous bytes.
//! Constants have no storage: they are read from the initial values of the model.

use crate::{ChannelGid, DveSystem, ModelError, ProcessGid, TransitionGid, Value, VarGid, VarType};
use log::info;
use std::ops::Range;

/// Width of control fields and channel occupancy counts.
pub(crate) const COUNTER_WIDTH: usize = 2;

/// An item of a packed state, in layout order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateCreator {
    /// A non-constant variable.
    Variable(VarGid),
    /// The buffer of a channel.
    ChannelBuffer(ChannelGid),
    /// The control field of a process.
    ProcessState(ProcessGid),
}

/// Offsets and sizes of all the items of a packed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    size: usize,
    global_size: usize,
    var_offsets: Vec<Option<usize>>,
    channel_offsets: Vec<Option<usize>>,
    process_regions: Vec<Range<usize>>,
    creators: Vec<StateCreator>,
    glob_filters: Vec<Box<[u8]>>,
}

impl StateLayout {
    /// Lays out the states of `system`, and builds the global-conflict filter of every transition:
    /// a byte mask over the global-variable region with all bits set on the bytes the transition writes.
    pub fn compute(system: &DveSystem) -> Result<Self, ModelError> {
        let symbols = system.symbols();
        let mut size = 0;
        let mut var_offsets = vec![None; symbols.variable_count()];
        let mut creators = Vec::new();

        let mut place_var = |var: VarGid, size: &mut usize, creators: &mut Vec<StateCreator>| {
            let info = symbols.variable_info(var);
            if !info.constant {
                var_offsets[var.index()] = Some(*size);
                *size += info.var_type.width() * info.len();
                creators.push(StateCreator::Variable(var));
            }
        };

        for var in symbols.global_variables() {
            place_var(*var, &mut size, &mut creators);
        }
        let global_size = size;

        let mut channel_offsets = vec![None; symbols.channel_count()];
        for channel in symbols.channels() {
            let info = symbols.channel_info(channel);
            if info.is_buffered() {
                channel_offsets[channel.index()] = Some(size);
                size += COUNTER_WIDTH + info.capacity * info.element_size();
                creators.push(StateCreator::ChannelBuffer(channel));
            }
        }

        let mut process_regions = Vec::with_capacity(system.processes().len());
        for process in system.processes() {
            let start = size;
            size += COUNTER_WIDTH;
            creators.push(StateCreator::ProcessState(process.gid()));
            for var in process.vars() {
                place_var(*var, &mut size, &mut creators);
            }
            process_regions.push(start..size);
        }

        let globals = symbols.global_variables();
        let mut glob_filters = Vec::with_capacity(system.transitions().len());
        for transition in system.transitions() {
            let mask = transition.glob_mask();
            if mask.len() != globals.len() {
                return Err(ModelError::GlobalMaskMismatch {
                    transition: transition.gid(),
                    expected: globals.len(),
                    found: mask.len(),
                });
            }
            let mut filter = vec![0u8; global_size].into_boxed_slice();
            for (var, _) in globals.iter().zip(mask).filter(|(_, written)| **written) {
                if let Some(offset) = var_offsets[var.index()] {
                    let info = symbols.variable_info(*var);
                    filter[offset..offset + info.var_type.width() * info.len()].fill(u8::MAX);
                }
            }
            glob_filters.push(filter);
        }

        info!("state layout: {size} bytes, {global_size} of which global");
        Ok(Self {
            size,
            global_size,
            var_offsets,
            channel_offsets,
            process_regions,
            creators,
            glob_filters,
        })
    }

    /// Size of a packed state in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Size of the global-variable region, which starts at offset 0.
    pub fn global_size(&self) -> usize {
        self.global_size
    }

    /// Offset of a variable, `None` for constants.
    pub fn var_offset(&self, var: VarGid) -> Option<usize> {
        self.var_offsets.get(var.index()).copied().flatten()
    }

    /// Offset of the occupancy count of a channel buffer, `None` for unbuffered channels.
    pub fn channel_offset(&self, channel: ChannelGid) -> Option<usize> {
        self.channel_offsets.get(channel.index()).copied().flatten()
    }

    /// Offset of the control field of a process.
    pub fn process_offset(&self, process: ProcessGid) -> usize {
        self.process_regions[process.index()].start
    }

    /// Bytes of a process: its control field and its local variables.
    pub fn process_region(&self, process: ProcessGid) -> Range<usize> {
        self.process_regions[process.index()].clone()
    }

    /// Items of the state, in layout order.
    pub fn creators(&self) -> &[StateCreator] {
        &self.creators
    }

    /// Global-conflict filter of a transition, by transition gid.
    pub fn glob_filter(&self, transition: TransitionGid) -> &[u8] {
        &self.glob_filters[transition.index()]
    }
}

/// Reads a value of the given type at `offset`.
#[inline(always)]
pub(crate) fn read_value(state: &[u8], offset: usize, var_type: VarType) -> Value {
    match var_type {
        VarType::Byte => Value::from(state[offset]),
        VarType::Int => Value::from(i16::from_le_bytes([state[offset], state[offset + 1]])),
    }
}

/// Writes `value`, truncated to the given type, at `offset`.
/// Returns whether the value fitted the type.
#[inline(always)]
pub(crate) fn write_value(state: &mut [u8], offset: usize, var_type: VarType, value: Value) -> bool {
    match var_type {
        VarType::Byte => state[offset] = value as u8,
        VarType::Int => state[offset..offset + 2].copy_from_slice(&(value as i16).to_le_bytes()),
    }
    var_type.contains(value)
}

#[inline(always)]
pub(crate) fn read_counter(state: &[u8], offset: usize) -> usize {
    u16::from_le_bytes([state[offset], state[offset + 1]]) as usize
}

#[inline(always)]
pub(crate) fn write_counter(state: &mut [u8], offset: usize, value: usize) {
    state[offset..offset + COUNTER_WIDTH].copy_from_slice(&(value as u16).to_le_bytes());
}
