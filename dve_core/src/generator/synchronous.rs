//! Synchronous semantics: every process moves at every step.
//!
//! The local successors of each process are computed as in interleaving semantics,
//! then combined in all possible ways.
//! Global variables written by more than one of the chosen transitions make the combination erroneous.

use super::{EnabledTrans, Generator};
use crate::{ProcessGid, State, Status, SyncMode, TransitionGid, explicit::passing};
use smallvec::SmallVec;

impl Generator<'_> {
    pub(super) fn compute_sync(&mut self, state: &[u8]) -> Status {
        let explicit = self.explicit;
        let processes = explicit.system().processes().len();
        self.enabled.clear(processes);
        self.choices.clear();
        self.local.resize_with(processes, Vec::new);
        self.local.iter_mut().for_each(Vec::clear);

        for process in explicit.system().processes() {
            let gid = process.gid();
            for (transition, error) in passing(explicit, state, gid, SyncMode::NoSync) {
                let local = if error {
                    None
                } else {
                    self.fire(state, &EnabledTrans::single(transition, false), false)
                };
                self.local[gid.index()].push((transition, local));
            }
            if self.local[gid.index()].is_empty() {
                // A process that cannot move blocks the whole system.
                return Status::DEADLOCK;
            }
        }

        let mut counters = vec![0; processes];
        loop {
            let transitions: SmallVec<[TransitionGid; 4]> = counters
                .iter()
                .enumerate()
                .map(|(process, choice)| self.local[process][*choice].0)
                .collect();
            let erroneous = counters
                .iter()
                .enumerate()
                .any(|(process, choice)| self.local[process][*choice].1.is_none())
                || self.conflicting(&transitions);
            self.enabled
                .list
                .push(EnabledTrans::synchronous(transitions, erroneous));
            self.choices.extend_from_slice(&counters);
            if !self.advance(&mut counters) {
                break;
            }
        }
        Status::NORMAL
    }

    // Next combination, with the first process changing fastest.
    fn advance(&self, counters: &mut [usize]) -> bool {
        for (process, counter) in counters.iter_mut().enumerate() {
            *counter += 1;
            if *counter < self.local[process].len() {
                return true;
            }
            *counter = 0;
        }
        false
    }

    fn conflicting(&self, transitions: &[TransitionGid]) -> bool {
        let layout = self.explicit.layout();
        let mut written = vec![0u8; layout.global_size()];
        for transition in transitions {
            for (acc, byte) in written.iter_mut().zip(layout.glob_filter(*transition)) {
                if *acc & *byte != 0 {
                    return true;
                }
                *acc |= *byte;
            }
        }
        false
    }

    pub(super) fn sync_successors(&self, state: &[u8], succs: &mut Vec<State>, mut status: Status) -> Status {
        let processes = self.local.len();
        for (idx, enabled) in self.enabled.iter().enumerate() {
            let choice = &self.choices[idx * processes..(idx + 1) * processes];
            let locals = choice
                .iter()
                .enumerate()
                .map(|(process, choice)| {
                    let (transition, local) = &self.local[process][*choice];
                    local.as_ref().map(|local| (*transition, &local[..]))
                })
                .collect::<Option<Vec<_>>>();
            match locals.filter(|_| !enabled.is_erroneous()) {
                Some(locals) => succs.push(self.compose(state, &locals)),
                None => {
                    status |= Status::ERROR;
                    succs.push(self.explicit.error_state());
                }
            }
        }
        status
    }

    pub(super) fn fire_synchronous(&self, state: &[u8], enabled: &EnabledTrans) -> Option<State> {
        if enabled.is_erroneous() {
            return None;
        }
        let locals = enabled
            .transitions()
            .iter()
            .map(|transition| {
                self.fire(state, &EnabledTrans::single(*transition, false), false)
                    .map(|local| (*transition, local))
            })
            .collect::<Option<Vec<_>>>()?;
        let locals = locals
            .iter()
            .map(|(transition, local)| (*transition, &local[..]))
            .collect::<Vec<_>>();
        Some(self.compose(state, &locals))
    }

    // Each process region comes from its local successor,
    // each global byte from the local successor whose transition writes it.
    fn compose(&self, state: &[u8], locals: &[(TransitionGid, &[u8])]) -> State {
        let layout = self.explicit.layout();
        let mut next = State::from(state.to_vec());
        for (process, (transition, local)) in locals.iter().enumerate() {
            let region = layout.process_region(ProcessGid(process as u32));
            next[region.clone()].copy_from_slice(&local[region]);
            let filter = layout.glob_filter(*transition);
            for (byte, _) in filter.iter().enumerate().filter(|(_, mask)| **mask != 0) {
                next[byte] = local[byte];
            }
        }
        next
    }
}
