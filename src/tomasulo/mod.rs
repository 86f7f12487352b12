//! The cycle scheduler.
//!
//! Every call to [`Tomasulo::step`] simulates one clock cycle as five
//! ordered phases:
//!
//! 1. write-back of every instruction whose functional unit finished,
//! 2. functional-unit countdown,
//! 3. fetch and issue of at most one instruction,
//! 4. readiness check of issued instructions,
//! 5. dispatch of ready instructions to idle functional units.
//!
//! A phase sees what the earlier phases of the same cycle committed.
//! Completions in phase 1 are gathered from the state left by the previous
//! cycle before any of them is applied, so simultaneous completions never
//! observe each other.
mod inflight;

use anyhow::Result;

pub use inflight::{DispatchQueues, InFlight, Stage};

use crate::asm::Program;
use crate::config::SimOption;
use crate::isa::{Inst, Op};
use crate::record::{Instance, Recorder, Report};
use crate::regfile::RegFile;
use crate::units::{LoadEntry, Operand, Pools, Seq, Slot, Station, Tag};

/// The single branch fetch is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingBranch {
    pub seq: Seq,
    /// Comparison value.
    pub value: i32,
    /// Program counter to continue from if taken.
    pub target: usize,
}

pub struct Tomasulo {
    pub(crate) program: Program,
    pub(crate) option: SimOption,
    pub(crate) pools: Pools,
    pub(crate) regs: RegFile,
    /// Issue order.
    pub(crate) in_flight: Vec<InFlight>,
    pub(crate) queues: DispatchQueues,
    pub(crate) pc: usize,
    pub(crate) branch: Option<PendingBranch>,
    pub(crate) recorder: Recorder,
    next_seq: Seq,
    /// See [`Tomasulo::is_terminate`].
    terminate: bool,
    cycle_count: u64,
}

impl Tomasulo {
    pub fn new(program: Program, option: SimOption) -> Self {
        let mut regs = RegFile::default();
        for preset in &option.registers {
            regs.preset(preset.reg, preset.value);
        }
        Self {
            recorder: Recorder::new(program.len()),
            terminate: program.is_empty(),
            program,
            option,
            pools: Pools::default(),
            regs,
            in_flight: Vec::new(),
            queues: DispatchQueues::default(),
            pc: 0,
            branch: None,
            next_seq: 0,
            cycle_count: 0,
        }
    }

    /// Nothing is in flight, no branch is pending and the program counter
    /// ran past the last instruction.
    pub fn is_terminate(&self) -> bool {
        self.terminate
    }
    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }
    pub fn program_counter(&self) -> usize {
        self.pc
    }
    pub fn registers(&self) -> Vec<i32> {
        self.regs.values()
    }

    /// Simulate one cycle. Does nothing once terminated.
    pub fn step(&mut self) {
        if self.terminate {
            return;
        }
        self.cycle_count += 1;
        self.write_back();
        self.pools.tick();
        self.issue();
        self.check_ready();
        self.dispatch();

        self.terminate =
            self.in_flight.is_empty() && self.branch.is_none() && self.pc >= self.program.len();

        if self.option.tty_out {
            print!("{}", self.render());
        }
    }

    pub fn report(&self) -> Report {
        Report {
            cycles: self.cycle_count,
            timings: self.recorder.timings().to_vec(),
            history: self.recorder.history().to_vec(),
            registers: self.regs.values(),
        }
    }

    fn result_of(&self, f: &InFlight) -> i32 {
        match f.slot {
            Slot::LoadBuffer(i) => self.pools.load_buffers[i].map_or(0, |l| l.addr),
            Slot::Station(i) => self.pools.stations[i].map_or(0, |s| {
                let j = s.j.value().unwrap_or_default();
                let k = s.k.value().unwrap_or_default();
                s.op.eval(j, k, self.option.div_zero)
            }),
        }
    }

    /// Phase 1: broadcast finished results and release their resources.
    fn write_back(&mut self) {
        let cycle = self.cycle_count;
        let done: Vec<(InFlight, i32)> = self
            .in_flight
            .iter()
            .filter(|f| match f.stage {
                Stage::Executing { unit } => self.pools.units[unit].remaining == 0,
                _ => false,
            })
            .map(|f| (*f, self.result_of(f)))
            .collect();

        for (f, value) in &done {
            let tag = Tag::of(f.slot);
            match self.branch {
                Some(branch) if branch.seq == f.seq => {
                    let taken = *value != 0;
                    if taken {
                        self.pc = branch.target;
                    }
                    self.branch = None;
                    tracing::info!(
                        "cycle {cycle}: branch #{} resolved, {}, fetch from {}",
                        f.index,
                        if taken { "taken" } else { "not taken" },
                        self.pc
                    );
                }
                _ => {
                    self.pools.broadcast(tag, *value);
                    self.regs.write_back(tag, *value);
                    tracing::debug!("cycle {cycle}: #{} writes {value} on {tag}", f.index);
                }
            }
            self.pools.release(f.slot);
            if let Stage::Executing { unit } = f.stage {
                self.pools.release_unit(unit);
            }
            self.recorder.retire(Instance {
                seq: f.seq,
                index: f.index,
                issue: f.issued_at,
                complete: cycle.saturating_sub(1),
                write_back: cycle,
            });
        }

        self.in_flight
            .retain(|f| !done.iter().any(|(d, _)| d.seq == f.seq));
    }

    /// Phase 3: fetch the next instruction into a free station or buffer.
    fn issue(&mut self) {
        let cycle = self.cycle_count;
        if self.branch.is_some() {
            tracing::trace!("cycle {cycle}: fetch stalled on pending branch");
            return;
        }
        let Some(&inst) = self.program.get(self.pc) else {
            return;
        };
        let op = inst.op();
        let Some(slot) = self.pools.free_slot(op) else {
            tracing::trace!("cycle {cycle}: no free slot for #{} {}", self.pc, op.mnemonic());
            return;
        };
        let tag = Tag::of(slot);
        let seq = self.next_seq;

        match (slot, inst) {
            (Slot::Station(i), Inst::Arith { op, rd, rs1, rs2 }) => {
                // sources are read before the destination is renamed
                self.pools.stations[i] = Some(Station {
                    op,
                    j: self.regs.operand(rs1),
                    k: self.regs.operand(rs2),
                });
                self.regs.rename(rd, tag);
            }
            (Slot::LoadBuffer(i), Inst::Load { rd, value }) => {
                self.pools.load_buffers[i] = Some(LoadEntry { addr: value });
                self.regs.rename(rd, tag);
            }
            (Slot::Station(i), Inst::Branch { value, rs, offset }) => {
                self.pools.stations[i] = Some(Station {
                    op: Op::Branch,
                    j: self.regs.operand(rs),
                    k: Operand::Ready(value),
                });
                // negative targets are rejected by the decoder
                let target = self
                    .pc
                    .checked_add_signed(offset as isize)
                    .unwrap_or(usize::MAX);
                self.branch = Some(PendingBranch { seq, value, target });
            }
            _ => return,
        }

        tracing::debug!("cycle {cycle}: issue #{} {} into {tag}", self.pc, inst);
        self.in_flight.push(InFlight {
            seq,
            index: self.pc,
            op,
            slot,
            issued_at: cycle,
            stage: Stage::Issued,
        });
        self.recorder.issue(self.pc, seq, cycle);
        self.next_seq += 1;
        self.pc += 1;
    }

    /// Phase 4: queue instructions whose operands are all resolved.
    fn check_ready(&mut self) {
        let mut ready = Vec::new();
        for f in self.in_flight.iter_mut().filter(|f| f.stage == Stage::Issued) {
            let operands_ready = match f.slot {
                Slot::LoadBuffer(_) => true,
                Slot::Station(i) => self.pools.stations[i].is_some_and(|s| s.is_ready()),
            };
            if operands_ready {
                f.stage = Stage::Ready;
                ready.push((f.seq, f.op.class()));
            }
        }
        // same-cycle ties go in program order
        ready.sort_by_key(|(seq, _)| *seq);
        for (seq, class) in ready {
            self.queues.push(class, seq);
        }
    }

    /// Phase 5: hand queued instructions to idle units of their class.
    fn dispatch(&mut self) {
        let cycle = self.cycle_count;
        for class in crate::isa::UnitClass::ALL {
            while let Some(unit) = self.pools.idle_unit(class) {
                let Some(seq) = self.queues.pop(class) else {
                    break;
                };
                let Some(f) = self.in_flight.iter_mut().find(|f| f.seq == seq) else {
                    continue;
                };
                let divisor_is_zero = f.op == Op::Div
                    && self
                        .pools
                        .station(f.slot)
                        .is_some_and(|s| s.k == Operand::Ready(0));
                let cycles = self.option.latency.of(f.op, divisor_is_zero);
                f.stage = Stage::Executing { unit };
                tracing::debug!(
                    "cycle {cycle}: dispatch #{} to {} unit {unit} for {cycles} cycles",
                    f.index,
                    class.name()
                );
                self.pools.occupy_unit(unit, seq, cycles);
            }
        }
    }
}

/// Run `program` to completion.
///
/// Fails if the run is still going after the configured maximum number of
/// cycles; programs that loop forever are otherwise legal.
pub fn simulate(program: &Program, option: SimOption) -> Result<Report> {
    let max_cycles = option.max_cycles;
    let mut sim = Tomasulo::new(program.clone(), option);
    while !sim.is_terminate() {
        if let Some(max) = max_cycles {
            if sim.cycle_count() >= max {
                anyhow::bail!("exceed maximum cycle limit ({max}) at pc {}", sim.program_counter());
            }
        }
        sim.step();
    }
    Ok(sim.report())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::asm::decode;
    use crate::config::Latency;
    use crate::isa::Reg;
    use crate::record::Timing;
    use crate::units::{STATIONS, LOAD_BUFFERS};

    impl Tomasulo {
        /// Exclusive ownership of every slot, unit and register tag.
        fn check_invariants(&self) {
            let slots: HashSet<Slot> = self.in_flight.iter().map(|f| f.slot).collect();
            assert_eq!(slots.len(), self.in_flight.len(), "slot shared");
            let busy = (0..STATIONS)
                .map(Slot::Station)
                .chain((0..LOAD_BUFFERS).map(Slot::LoadBuffer))
                .filter(|s| self.pools.is_busy(*s))
                .count();
            assert_eq!(busy, self.in_flight.len(), "busy slot without owner");

            for (i, u) in self.pools.units.iter().enumerate() {
                if let Some(seq) = u.occupant {
                    let f = self.in_flight.iter().find(|f| f.seq == seq);
                    assert_eq!(f.map(|f| f.stage), Some(Stage::Executing { unit: i }));
                }
            }
            for f in &self.in_flight {
                if let Stage::Executing { unit } = f.stage {
                    assert_eq!(self.pools.units[unit].occupant, Some(f.seq));
                    assert_eq!(self.pools.units[unit].class, f.op.class());
                }
            }
            for (_, r) in self.regs.iter() {
                if let Some(tag) = r.tag {
                    assert!(self.pools.is_busy(tag.slot()), "dangling register tag {tag}");
                }
            }
            let branches = self.in_flight.iter().filter(|f| f.op == Op::Branch).count();
            assert!(branches <= 1);
        }
    }

    fn option(regs: &[(usize, i32)]) -> SimOption {
        regs.iter().fold(SimOption::default(), |o, &(r, v)| {
            o.set_reg(Reg::try_from(r).unwrap(), v)
        })
    }

    fn run_with(src: &str, option: SimOption) -> Report {
        let mut sim = Tomasulo::new(decode(src).unwrap(), option);
        while !sim.is_terminate() {
            sim.step();
            sim.check_invariants();
            assert!(sim.cycle_count() < 10_000, "does not terminate");
        }
        sim.report()
    }

    fn run(src: &str, regs: &[(usize, i32)]) -> Report {
        run_with(src, option(regs))
    }

    fn t(issue: u64, complete: u64, write_back: u64) -> Timing {
        Timing::new(issue, complete, write_back)
    }

    #[test]
    fn test_empty_program() {
        let sim = Tomasulo::new(Program::default(), SimOption::default());
        assert!(sim.is_terminate());
        assert_eq!(sim.report().cycles, 0);
    }

    #[test]
    fn test_add_then_dependent_mul() {
        let r = run("A,R1,R2,R3\nM,R4,R1,R5", &[(2, 2), (3, 3), (5, 10)]);
        assert_eq!(r.timings, vec![t(1, 4, 5), t(2, 9, 10)]);
        assert_eq!(r.registers[1], 5);
        assert_eq!(r.registers[4], 50);
        assert_eq!(r.cycles, 10);
    }

    #[test]
    fn test_dependent_station_waits_on_tag() {
        let mut sim = Tomasulo::new(
            decode("A,R1,R2,R3\nM,R4,R1,R5").unwrap(),
            option(&[(2, 2), (3, 3), (5, 10)]),
        );
        sim.step();
        sim.step();
        let add_tag = Tag::of(Slot::Station(0));
        assert_eq!(
            sim.pools.stations[6],
            Some(Station {
                op: Op::Mul,
                j: Operand::Wait(add_tag),
                k: Operand::Ready(10)
            })
        );
        assert_eq!(sim.regs.get(Reg::try_from(1).unwrap()).tag, Some(add_tag));
        assert_eq!(
            sim.regs.get(Reg::try_from(4).unwrap()).tag,
            Some(Tag::of(Slot::Station(6)))
        );
        // the add writes back in cycle 5
        for _ in 0..3 {
            sim.step();
        }
        assert_eq!(sim.pools.stations[6].map(|s| s.j), Some(Operand::Ready(5)));
        assert_eq!(sim.regs.get(Reg::try_from(1).unwrap()).tag, None);
    }

    #[test]
    fn test_mul_latency() {
        let r = run("M,R1,R2,R3", &[(2, 6), (3, 7)]);
        assert_eq!(r.timings, vec![t(1, 5, 6)]);
        assert_eq!(r.registers[1], 42);
    }

    #[test]
    fn test_div_latency() {
        let r = run("D,R1,R2,R3", &[(2, 7), (3, 2)]);
        assert_eq!(r.timings, vec![t(1, 5, 6)]);
        assert_eq!(r.registers[1], 3);
    }

    #[test]
    fn test_div_by_zero_fast_path() {
        let r = run("D,R1,R2,R3", &[(2, 7)]);
        assert_eq!(r.timings, vec![t(1, 2, 3)]);
        assert_eq!(r.registers[1], 7);

        let opt = option(&[(2, 7)]).set_div_zero(crate::config::DivZeroPolicy::Zero);
        let r = run_with("D,R1,R2,R3", opt);
        assert_eq!(r.timings, vec![t(1, 2, 3)]);
        assert_eq!(r.registers[1], 0);
    }

    #[test]
    fn test_div_by_produced_zero() {
        // divisor resolves to zero through broadcast, fast path still applies
        let r = run("L,R3,0x0\nD,R1,R2,R3", &[(2, 9), (3, 5)]);
        assert_eq!(r.timings, vec![t(1, 4, 5), t(2, 6, 7)]);
        assert_eq!(r.registers[1], 9);
    }

    #[test]
    fn test_straight_line_in_program_order() {
        let r = run("A,R1,R2,R3\nS,R4,R5,R6\nA,R7,R8,R9", &[(2, 4), (5, 9), (6, 1)]);
        assert_eq!(r.timings, vec![t(1, 4, 5), t(2, 5, 6), t(3, 6, 7)]);
        assert_eq!(r.registers[4], 8);
        let order: Vec<usize> = r.history.iter().map(|i| i.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_load_returns_literal() {
        let r = run("L,R1,0x10\nL,R2,0xff\nL,R3,-0x1", &[]);
        assert_eq!(r.timings, vec![t(1, 4, 5), t(2, 5, 6), t(3, 8, 9)]);
        assert_eq!(&r.registers[1..4], &[16, 255, -1]);
    }

    #[test]
    fn test_mul_stations_exhausted() {
        let r = run(
            "M,R1,R2,R3\nM,R4,R2,R3\nM,R5,R2,R3\nM,R6,R2,R3",
            &[(2, 2), (3, 3)],
        );
        assert_eq!(
            r.timings,
            vec![t(1, 5, 6), t(2, 6, 7), t(3, 10, 11), t(6, 11, 12)]
        );
        assert_eq!(&r.registers[4..7], &[6, 6, 6]);
    }

    #[test]
    fn test_ready_ties_dispatch_in_program_order() {
        let r = run(
            "L,R1,0x3\nA,R2,R1,R1\nS,R3,R1,R1\nA,R4,R1,R1\nA,R5,R1,R1",
            &[],
        );
        assert_eq!(
            r.timings,
            vec![t(1, 4, 5), t(2, 8, 9), t(3, 8, 9), t(4, 8, 9), t(5, 12, 13)]
        );
        assert_eq!(&r.registers[1..6], &[3, 6, 0, 6, 6]);
    }

    #[test]
    fn test_later_producer_wins_register() {
        let r = run("M,R1,R2,R3\nA,R1,R4,R4\nA,R5,R1,R1", &[(2, 2), (3, 3), (4, 1)]);
        assert_eq!(r.timings, vec![t(1, 5, 6), t(2, 5, 6), t(3, 9, 10)]);
        assert_eq!(r.registers[1], 2);
        assert_eq!(r.registers[5], 4);
    }

    #[test]
    fn test_superseded_producer_still_feeds_consumers() {
        let r = run("M,R1,R2,R3\nA,R6,R1,R0\nA,R1,R4,R4", &[(2, 2), (3, 3), (4, 1)]);
        assert_eq!(r.registers[6], 6);
        assert_eq!(r.registers[1], 2);
    }

    #[test]
    fn test_branch_taken() {
        let r = run("J,0x5,R1,0x2\nA,R2,R2,R2\nA,R3,R4,R4", &[(1, 5), (2, 1), (4, 2)]);
        assert_eq!(r.timings, vec![t(1, 2, 3), Timing::default(), t(3, 6, 7)]);
        assert_eq!(r.registers[2], 1);
        assert_eq!(r.registers[3], 4);
        assert_eq!(r.cycles, 7);
    }

    #[test]
    fn test_branch_not_taken() {
        let r = run("J,0x5,R1,0x2\nA,R2,R2,R2\nA,R3,R4,R4", &[(1, 4), (2, 1), (4, 2)]);
        assert_eq!(r.timings, vec![t(1, 2, 3), t(3, 6, 7), t(4, 7, 8)]);
        assert_eq!(r.registers[2], 2);
    }

    #[test]
    fn test_branch_is_self_relative() {
        let src = "J,0x5,R1,0x3\nL,R2,0x1\nL,R3,0x2\nL,R4,0x4";
        let r = run(src, &[(1, 5)]);
        assert_eq!(&r.registers[2..5], &[0, 0, 4]);

        let r = run(src, &[(1, 6)]);
        assert_eq!(&r.registers[2..5], &[1, 2, 4]);
    }

    #[test]
    fn test_branch_stalls_fetch_until_resolved() {
        let src = "L,R1,0x5\nJ,0x5,R1,0x2\nL,R2,0x7\nL,R3,0x9";
        let mut sim = Tomasulo::new(decode(src).unwrap(), SimOption::default());
        let mut stalled = 0;
        while !sim.is_terminate() {
            sim.step();
            if sim.branch.is_some() {
                stalled += 1;
                assert_eq!(sim.program_counter(), 2);
                assert!(sim.in_flight.iter().all(|f| f.index < 2));
            }
        }
        assert_eq!(stalled, 5);
        let r = sim.report();
        assert_eq!(
            r.timings,
            vec![t(1, 4, 5), t(2, 6, 7), Timing::default(), t(7, 10, 11)]
        );
        assert_eq!(&r.registers[1..4], &[5, 0, 9]);
    }

    #[test]
    fn test_branch_past_end_halts() {
        let r = run("J,0x0,R0,0x10\nL,R1,0x1", &[]);
        assert_eq!(r.timings, vec![t(1, 2, 3), Timing::default()]);
        assert_eq!(r.cycles, 3);
    }

    #[test]
    fn test_loop_records_first_instance() {
        let src = "S,R1,R1,R2\nJ,0x0,R1,0x2\nJ,0x0,R0,-0x2\nA,R3,R1,R2";
        let r = run(src, &[(1, 3), (2, 1)]);
        assert_eq!(r.registers[1], 0);
        assert_eq!(r.registers[3], 1);
        assert_eq!(r.history.len(), 9);
        assert_eq!(r.history.iter().filter(|i| i.index == 0).count(), 3);
        assert_eq!(r.timings[0].issue, Some(1));
        let first = r.history.iter().find(|i| i.index == 0).unwrap();
        assert_eq!(r.timings[0].write_back, Some(first.write_back));
    }

    #[test]
    fn test_overtaken_instance_keeps_first_row() {
        // the second run of the division divides by zero and finishes first
        let src = "M,R2,R2,R2\nM,R2,R2,R2\nD,R1,R2,R3\nJ,0x1,R6,0x4\nL,R3,0x0\nL,R6,0x1\nJ,0x0,R0,-0x4\nL,R7,0x7";
        let r = run(src, &[(2, 2), (3, 1)]);
        let divs: Vec<&Instance> = r.history.iter().filter(|i| i.index == 2).collect();
        assert_eq!(divs.len(), 2);
        assert!(divs[0].seq > divs[1].seq, "{divs:?}");
        let first = divs[1];
        assert_eq!(
            r.timings[2],
            t(first.issue, first.complete, first.write_back)
        );
        assert_eq!(r.timings[2], t(3, 15, 16));
        assert_eq!(r.registers[7], 7);
    }

    #[test]
    fn test_custom_latency() {
        let latency = Latency {
            add: 1,
            mul: 2,
            ..Latency::default()
        };
        let opt = option(&[(2, 2), (3, 3), (5, 10)]).set_latency(latency);
        let r = run_with("A,R1,R2,R3\nM,R4,R1,R5", opt);
        assert_eq!(r.timings, vec![t(1, 2, 3), t(2, 5, 6)]);
        assert_eq!(r.registers[4], 50);
    }

    #[test]
    fn test_trace_output_does_not_change_results() {
        let src = crate::asm::tests::BASIC_NEL;
        let opt = option(&[(1, 5), (2, 2), (3, 3), (5, 10)]);
        let quiet = run_with(src, opt.clone().set_tty_out(false));
        let traced = run_with(src, opt.set_tty_out(true));
        assert_eq!(quiet, traced);
    }

    #[test]
    fn test_cycle_limit() {
        let prog = decode("J,0x0,R0,0x0").unwrap();
        let err = simulate(&prog, SimOption::default().set_max_cycles(Some(50))).unwrap_err();
        assert!(err.to_string().contains("maximum cycle limit"));
    }

    #[test]
    fn test_simulate_matches_stepping() {
        let src = crate::asm::tests::BASIC_NEL;
        let opt = option(&[(2, 2), (3, 3), (5, 10)]);
        let stepped = run_with(src, opt.clone());
        let report = simulate(&decode(src).unwrap(), opt.set_max_cycles(Some(1000))).unwrap();
        assert_eq!(stepped, report);
    }
}
