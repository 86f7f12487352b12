//! Instruction set of the simulated machine: opcodes, registers and the
//! functional-unit class each opcode executes on.

use std::fmt::Display;

use crate::config::DivZeroPolicy;

/// Number of architectural registers.
pub const REG_COUNT: usize = 32;

/// Architectural register `R0`..`R31`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Reg(u8);

impl Reg {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl TryFrom<usize> for Reg {
    type Error = anyhow::Error;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        if value >= REG_COUNT {
            anyhow::bail!("invalid register R{value}, expected R0..R{}", REG_COUNT - 1);
        }
        Ok(Self(value as u8))
    }
}

impl Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// Operation performed by a reservation station or load buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Load,
    Branch,
}

/// Functional-unit class. Each class has its own dispatch queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitClass {
    /// add, sub and branch
    AddBranch = 0,
    /// mul and div
    MulDiv = 1,
    Load = 2,
}

impl UnitClass {
    pub const ALL: [UnitClass; 3] = [UnitClass::AddBranch, UnitClass::MulDiv, UnitClass::Load];

    pub fn name(self) -> &'static str {
        match self {
            UnitClass::AddBranch => "Add",
            UnitClass::MulDiv => "Mult",
            UnitClass::Load => "Load",
        }
    }
}

impl Op {
    pub fn class(self) -> UnitClass {
        match self {
            Op::Add | Op::Sub | Op::Branch => UnitClass::AddBranch,
            Op::Mul | Op::Div => UnitClass::MulDiv,
            Op::Load => UnitClass::Load,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Op::Add => "ADD",
            Op::Sub => "SUB",
            Op::Mul => "MUL",
            Op::Div => "DIV",
            Op::Load => "LD",
            Op::Branch => "JUMP",
        }
    }

    /// Compute the result of a two-operand operation. Branches yield 1 when
    /// the register operand `a` equals the comparison value `b`.
    ///
    /// Arithmetic wraps on overflow, the same as 32-bit hardware would.
    pub fn eval(self, a: i32, b: i32, div_zero: DivZeroPolicy) -> i32 {
        match self {
            Op::Add => a.wrapping_add(b),
            Op::Sub => a.wrapping_sub(b),
            Op::Mul => a.wrapping_mul(b),
            Op::Div if b == 0 => match div_zero {
                DivZeroPolicy::Dividend => a,
                DivZeroPolicy::Zero => 0,
            },
            Op::Div => a.wrapping_div(b),
            Op::Load => a,
            Op::Branch => (a == b) as i32,
        }
    }
}

/// Decoded instruction. Operand meaning depends on the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Inst {
    /// `OP,RD,RS1,RS2`
    Arith { op: Op, rd: Reg, rs1: Reg, rs2: Reg },
    /// `L,RD,ADDR`: the loaded value is the literal itself
    Load { rd: Reg, value: i32 },
    /// `J,VAL,RS,OFFSET`: jump to own index + offset if `RS == VAL`
    Branch { value: i32, rs: Reg, offset: i32 },
}

impl Inst {
    pub fn op(&self) -> Op {
        match self {
            Inst::Arith { op, .. } => *op,
            Inst::Load { .. } => Op::Load,
            Inst::Branch { .. } => Op::Branch,
        }
    }
}

impl Display for Inst {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Inst::Arith { op, rd, rs1, rs2 } => {
                write!(f, "{},{rd},{rs1},{rs2}", &op.mnemonic()[..1])
            }
            Inst::Load { rd, value } => write!(f, "L,{rd},{value:#x}"),
            Inst::Branch { value, rs, offset } => write!(f, "J,{value:#x},{rs},{offset:#x}"),
        }
    }
}
