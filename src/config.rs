//! Simulation options.

use std::{str::FromStr, sync::OnceLock};

use regex::Regex;

use crate::isa::{Op, Reg};
use crate::utils::parse_literal;

/// Quotient produced by a division whose divisor is zero. Either way the
/// division takes [`Latency::div_zero`] cycles instead of [`Latency::div`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DivZeroPolicy {
    /// The dividend is passed through unchanged.
    #[default]
    Dividend,
    /// The quotient is zero.
    Zero,
}

impl FromStr for DivZeroPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dividend" => Ok(DivZeroPolicy::Dividend),
            "zero" => Ok(DivZeroPolicy::Zero),
            _ => Err(format!(
                "invalid divide-by-zero policy: '{s}'. Expected 'dividend' or 'zero'."
            )),
        }
    }
}

/// Execution latency of each operation, in cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Latency {
    pub add: u32,
    pub mul: u32,
    pub div: u32,
    pub div_zero: u32,
    pub load: u32,
    pub branch: u32,
}

impl Default for Latency {
    fn default() -> Self {
        Self {
            add: 3,
            mul: 4,
            div: 4,
            div_zero: 1,
            load: 3,
            branch: 1,
        }
    }
}

impl Latency {
    /// Cycles a functional unit stays busy for `op`. `divisor_is_zero` only
    /// matters for divisions.
    pub fn of(&self, op: Op, divisor_is_zero: bool) -> u32 {
        let cycles = match op {
            Op::Add | Op::Sub => self.add,
            Op::Mul => self.mul,
            Op::Div if divisor_is_zero => self.div_zero,
            Op::Div => self.div,
            Op::Load => self.load,
            Op::Branch => self.branch,
        };
        cycles.max(1)
    }
}

fn preset_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[Rr](\d+)=(-?(?:0[xX])?[0-9a-fA-F]+)$").expect("preset pattern is valid")
    })
}

/// Initial value of one register, written as `R<n>=<value>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegPreset {
    pub reg: Reg,
    pub value: i32,
}

impl FromStr for RegPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = preset_regex()
            .captures(s.trim())
            .ok_or_else(|| format!("invalid register preset: '{s}'. Expected R<n>=<value>."))?;
        let index: usize = caps[1]
            .parse()
            .map_err(|_| format!("invalid register index in '{s}'"))?;
        let reg = Reg::try_from(index).map_err(|e| e.to_string())?;
        let value = parse_literal(&caps[2]).ok_or_else(|| format!("invalid value in '{s}'"))?;
        Ok(RegPreset { reg, value })
    }
}

/// Options of one simulation run.
#[derive(Debug, Clone, Default)]
pub struct SimOption {
    pub(crate) tty_out: bool,
    pub(crate) div_zero: DivZeroPolicy,
    pub(crate) latency: Latency,
    pub(crate) registers: Vec<RegPreset>,
    pub(crate) max_cycles: Option<u64>,
}

impl SimOption {
    /// Print the machine state after every cycle.
    pub fn set_tty_out(mut self, tty_out: bool) -> Self {
        self.tty_out = tty_out;
        self
    }
    pub fn set_div_zero(mut self, policy: DivZeroPolicy) -> Self {
        self.div_zero = policy;
        self
    }
    pub fn set_latency(mut self, latency: Latency) -> Self {
        self.latency = latency;
        self
    }
    /// Set the initial value of a register. Later presets of the same
    /// register win.
    pub fn set_reg(mut self, reg: Reg, value: i32) -> Self {
        self.registers.push(RegPreset { reg, value });
        self
    }
    pub fn set_registers(mut self, presets: impl IntoIterator<Item = RegPreset>) -> Self {
        self.registers.extend(presets);
        self
    }
    /// Give up after this many cycles. Programs that loop forever are valid
    /// input, so the bound belongs to the caller.
    pub fn set_max_cycles(mut self, max_cycles: Option<u64>) -> Self {
        self.max_cycles = max_cycles;
        self
    }
}
