//! This module decodes the textual program format into instructions.
use std::{fmt::Display, path::Path};

use anyhow::{Context, Result};
use pest::{iterators::Pair, Parser};
use pest_derive::Parser;

use crate::isa::{Inst, Op, Reg};
use crate::utils::parse_hex;

#[derive(Parser)]
#[grammar = "src/grammar.pest"] // relative to the manifest
pub struct ProgramParser;

/// Immutable instruction array, indexed by program counter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    insts: Vec<Inst>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.insts.len()
    }
    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }
    pub fn get(&self, pc: usize) -> Option<&Inst> {
        self.insts.get(pc)
    }
}

impl From<Vec<Inst>> for Program {
    fn from(insts: Vec<Inst>) -> Self {
        Self { insts }
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for inst in &self.insts {
            writeln!(f, "{inst}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Operand {
    Reg(Reg),
    Imm(i32),
}

fn parse_operand(pair: Pair<'_, Rule>) -> Result<Operand> {
    let inner = pair.into_inner().next().context("empty operand")?;
    match inner.as_rule() {
        Rule::reg => {
            let digits = inner.into_inner().next().context("missing register index")?;
            let index: usize = digits
                .as_str()
                .parse()
                .with_context(|| format!("invalid register index `{}`", digits.as_str()))?;
            Ok(Operand::Reg(Reg::try_from(index)?))
        }
        Rule::hex => {
            let value = parse_hex(inner.as_str())
                .with_context(|| format!("hex literal `{}` out of range", inner.as_str()))?;
            Ok(Operand::Imm(value))
        }
        rule => anyhow::bail!("unexpected token {rule:?}"),
    }
}

/// Decode one non-empty line. `index` is the program counter the
/// instruction will live at, used to validate branch targets.
pub fn decode_line(text: &str, index: usize) -> Result<Inst> {
    let line = ProgramParser::parse(Rule::line, text)
        .context("malformed instruction")?
        .next()
        .context("malformed instruction")?;
    let mut pairs = line.into_inner();
    let opcode = pairs.next().context("missing opcode")?.as_str();
    let operands = pairs
        .filter(|p| p.as_rule() == Rule::operand)
        .map(parse_operand)
        .collect::<Result<Vec<_>>>()?;

    let op = match opcode.chars().next() {
        Some('A') => Op::Add,
        Some('S') => Op::Sub,
        Some('M') => Op::Mul,
        Some('D') => Op::Div,
        Some('L') => Op::Load,
        _ => Op::Branch,
    };

    let inst = match (op, operands.as_slice()) {
        (Op::Add | Op::Sub | Op::Mul | Op::Div, [Operand::Reg(rd), Operand::Reg(rs1), Operand::Reg(rs2)]) => Inst::Arith {
            op,
            rd: *rd,
            rs1: *rs1,
            rs2: *rs2,
        },
        (Op::Load, [Operand::Reg(rd), Operand::Imm(value)]) => Inst::Load {
            rd: *rd,
            value: *value,
        },
        (Op::Branch, [Operand::Imm(value), Operand::Reg(rs), Operand::Imm(offset)]) => {
            if (index as i64) + (*offset as i64) < 0 {
                anyhow::bail!("branch target {index}{offset:+} is before the first instruction");
            }
            Inst::Branch {
                value: *value,
                rs: *rs,
                offset: *offset,
            }
        }
        (op, _) => anyhow::bail!(
            "operands do not match opcode `{opcode}` ({})",
            op.mnemonic()
        ),
    };
    Ok(inst)
}

/// Decode a whole program. Blank lines are skipped; the first malformed
/// line aborts decoding.
pub fn decode(src: &str) -> Result<Program> {
    let mut insts = Vec::new();
    for (lineno, line) in src.lines().enumerate() {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        let inst = decode_line(text, insts.len())
            .with_context(|| format!("line {}: `{}`", lineno + 1, text))?;
        insts.push(inst);
    }
    Ok(Program { insts })
}

/// Read and decode a program file.
pub fn load(path: impl AsRef<Path>) -> Result<Program> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("could not read file `{}`", path.display()))?;
    decode(&content).with_context(|| format!("could not decode `{}`", path.display()))
}
