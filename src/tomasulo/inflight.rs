use std::collections::VecDeque;

use crate::isa::{Op, UnitClass};
use crate::units::{Seq, Slot};

/// Progress of an issued instruction. Only an executing instruction owns a
/// functional unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Holding a station or load buffer, operands possibly pending.
    Issued,
    /// Operands resolved, queued for a functional unit.
    Ready,
    Executing { unit: usize },
}

/// An instruction between issue and write-back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InFlight {
    pub seq: Seq,
    /// Program counter of the instruction.
    pub index: usize,
    pub op: Op,
    pub slot: Slot,
    pub issued_at: u64,
    pub stage: Stage,
}

/// One FIFO of ready instructions per functional-unit class.
#[derive(Debug, Clone, Default)]
pub struct DispatchQueues {
    queues: [VecDeque<Seq>; 3],
}

impl DispatchQueues {
    pub fn push(&mut self, class: UnitClass, seq: Seq) {
        self.queues[class as usize].push_back(seq);
    }
    pub fn pop(&mut self, class: UnitClass) -> Option<Seq> {
        self.queues[class as usize].pop_front()
    }
}
