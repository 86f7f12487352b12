//! Register file with a producer-tag table for renaming.

use crate::isa::{Reg, REG_COUNT};
use crate::units::{Operand, Tag};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Register {
    pub value: i32,
    /// Producer of the next value. While set, `value` is stale.
    pub tag: Option<Tag>,
}

#[derive(Debug, Clone, Default)]
pub struct RegFile {
    regs: [Register; REG_COUNT],
}

impl RegFile {
    pub fn get(&self, reg: Reg) -> Register {
        self.regs[reg.index()]
    }

    /// Overwrite a register value outside of simulation (initial state).
    pub fn preset(&mut self, reg: Reg, value: i32) {
        self.regs[reg.index()] = Register { value, tag: None };
    }

    /// Read a source operand at issue time.
    pub fn operand(&self, reg: Reg) -> Operand {
        let r = self.get(reg);
        match r.tag {
            Some(tag) => Operand::Wait(tag),
            None => Operand::Ready(r.value),
        }
    }

    /// Make `tag` the pending producer of `reg`, superseding any earlier one.
    pub fn rename(&mut self, reg: Reg, tag: Tag) {
        self.regs[reg.index()].tag = Some(tag);
    }

    /// Write `value` into every register still waiting on `tag`. Registers
    /// renamed to a later producer keep waiting.
    pub fn write_back(&mut self, tag: Tag, value: i32) {
        for r in self.regs.iter_mut().filter(|r| r.tag == Some(tag)) {
            r.value = value;
            r.tag = None;
        }
    }

    pub fn values(&self) -> Vec<i32> {
        self.regs.iter().map(|r| r.value).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Register)> {
        self.regs.iter().enumerate()
    }
}
