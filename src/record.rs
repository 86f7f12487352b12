//! Per-instruction timing and the final report of a run.

use std::fmt::Display;

use crate::units::Seq;

/// Cycle numbers of one program instruction. Each field is written once,
/// by the first dynamic instance of the instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Timing {
    pub issue: Option<u64>,
    pub complete: Option<u64>,
    pub write_back: Option<u64>,
}

impl Timing {
    pub fn new(issue: u64, complete: u64, write_back: u64) -> Self {
        Self {
            issue: Some(issue),
            complete: Some(complete),
            write_back: Some(write_back),
        }
    }
}

/// One dynamic execution of an instruction. Loops produce several
/// instances of the same program index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Instance {
    pub seq: Seq,
    pub index: usize,
    pub issue: u64,
    pub complete: u64,
    pub write_back: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Recorder {
    timings: Vec<Timing>,
    /// Dynamic instance that owns each row of `timings`.
    first: Vec<Option<Seq>>,
    history: Vec<Instance>,
}

impl Recorder {
    pub fn new(len: usize) -> Self {
        Self {
            timings: vec![Timing::default(); len],
            first: vec![None; len],
            history: Vec::new(),
        }
    }

    pub fn issue(&mut self, index: usize, seq: Seq, cycle: u64) {
        if self.first[index].is_none() {
            self.first[index] = Some(seq);
            self.timings[index].issue = Some(cycle);
        }
    }

    /// A later instance may retire before the first one, e.g. a division
    /// that hit the divide-by-zero fast path; only the first is recorded.
    pub fn retire(&mut self, inst: Instance) {
        if self.first[inst.index] == Some(inst.seq) {
            let t = &mut self.timings[inst.index];
            t.complete = Some(inst.complete);
            t.write_back = Some(inst.write_back);
        }
        self.history.push(inst);
    }

    pub fn timings(&self) -> &[Timing] {
        &self.timings
    }

    pub fn history(&self) -> &[Instance] {
        &self.history
    }
}

/// Result of a finished (or interrupted) simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Report {
    /// Number of simulated cycles.
    pub cycles: u64,
    /// Indexed by program counter.
    pub timings: Vec<Timing>,
    /// Retired instances in completion order.
    pub history: Vec<Instance>,
    /// Final register values.
    pub registers: Vec<i32>,
}

#[cfg(feature = "serde")]
impl Report {
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Display for Report {
    /// One line per program instruction: issue, execution complete and
    /// write-back cycle. Instructions that never ran print 0.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for t in &self.timings {
            writeln!(
                f,
                "{} {} {}",
                t.issue.unwrap_or(0),
                t.complete.unwrap_or(0),
                t.write_back.unwrap_or(0)
            )?;
        }
        Ok(())
    }
}
