//! Fixed resource pools: reservation stations, load buffers and functional
//! units, addressed by producer tags.

use std::{fmt::Display, num::NonZeroU8};

use crate::isa::{Op, UnitClass};

pub const ADD_STATIONS: usize = 6;
pub const MUL_STATIONS: usize = 3;
pub const STATIONS: usize = ADD_STATIONS + MUL_STATIONS;
pub const LOAD_BUFFERS: usize = 3;

pub const ADD_UNITS: usize = 3;
pub const MUL_UNITS: usize = 2;
pub const LOAD_UNITS: usize = 2;
pub const UNITS: usize = ADD_UNITS + MUL_UNITS + LOAD_UNITS;

/// Dynamic sequence number of an issued instruction. Strictly increasing in
/// issue order, so it doubles as the program-order key of in-flight work.
pub type Seq = u64;

/// A reservation station or load buffer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Station(usize),
    LoadBuffer(usize),
}

/// Identifies the slot that will produce a value. Stations are tagged
/// 1..=9 and load buffers 10..=12; "no producer" is `Option::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(NonZeroU8);

impl Tag {
    pub fn of(slot: Slot) -> Tag {
        let id = match slot {
            Slot::Station(i) => 1 + i,
            Slot::LoadBuffer(i) => 1 + STATIONS + i,
        };
        // slot indices are bounded by the pool sizes
        Tag(NonZeroU8::new(id as u8).unwrap_or(NonZeroU8::MIN))
    }

    pub fn slot(self) -> Slot {
        let id = self.0.get() as usize;
        if id <= STATIONS {
            Slot::Station(id - 1)
        } else {
            Slot::LoadBuffer(id - 1 - STATIONS)
        }
    }

    pub fn id(self) -> u8 {
        self.0.get()
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.slot() {
            Slot::Station(i) if i < ADD_STATIONS => write!(f, "Ars{}", i + 1),
            Slot::Station(i) => write!(f, "Mrs{}", i - ADD_STATIONS + 1),
            Slot::LoadBuffer(i) => write!(f, "LB{}", i + 1),
        }
    }
}

/// A source operand: either resolved, or waiting on a producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Ready(i32),
    Wait(Tag),
}

impl Operand {
    pub fn value(self) -> Option<i32> {
        match self {
            Operand::Ready(v) => Some(v),
            Operand::Wait(_) => None,
        }
    }
}

/// Busy reservation station. Only the `Wait -> Ready` transition of `j`
/// and `k` happens while it is occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Station {
    pub op: Op,
    pub j: Operand,
    pub k: Operand,
}

impl Station {
    pub fn is_ready(&self) -> bool {
        self.j.value().is_some() && self.k.value().is_some()
    }
}

/// Busy load buffer. Loads never wait on operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadEntry {
    pub addr: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionalUnit {
    pub class: UnitClass,
    /// Instruction currently executing, `None` when idle.
    pub occupant: Option<Seq>,
    pub remaining: u32,
}

impl FunctionalUnit {
    fn new(class: UnitClass) -> Self {
        Self {
            class,
            occupant: None,
            remaining: 0,
        }
    }
    pub fn is_idle(&self) -> bool {
        self.occupant.is_none()
    }
}

/// All reservation stations, load buffers and functional units.
#[derive(Debug, Clone)]
pub struct Pools {
    pub stations: [Option<Station>; STATIONS],
    pub load_buffers: [Option<LoadEntry>; LOAD_BUFFERS],
    pub units: [FunctionalUnit; UNITS],
}

impl Default for Pools {
    fn default() -> Self {
        let units = std::array::from_fn(|i| {
            FunctionalUnit::new(if i < ADD_UNITS {
                UnitClass::AddBranch
            } else if i < ADD_UNITS + MUL_UNITS {
                UnitClass::MulDiv
            } else {
                UnitClass::Load
            })
        });
        Self {
            stations: [None; STATIONS],
            load_buffers: [None; LOAD_BUFFERS],
            units,
        }
    }
}

impl Pools {
    /// Lowest free slot able to hold `op`.
    pub fn free_slot(&self, op: Op) -> Option<Slot> {
        let free = |range: std::ops::Range<usize>| range.into_iter().find(|&i| self.stations[i].is_none());
        match op.class() {
            UnitClass::AddBranch => free(0..ADD_STATIONS).map(Slot::Station),
            UnitClass::MulDiv => free(ADD_STATIONS..STATIONS).map(Slot::Station),
            UnitClass::Load => self
                .load_buffers
                .iter()
                .position(Option::is_none)
                .map(Slot::LoadBuffer),
        }
    }

    pub fn is_busy(&self, slot: Slot) -> bool {
        match slot {
            Slot::Station(i) => self.stations[i].is_some(),
            Slot::LoadBuffer(i) => self.load_buffers[i].is_some(),
        }
    }

    pub fn station(&self, slot: Slot) -> Option<&Station> {
        match slot {
            Slot::Station(i) => self.stations[i].as_ref(),
            Slot::LoadBuffer(_) => None,
        }
    }

    pub fn release(&mut self, slot: Slot) {
        match slot {
            Slot::Station(i) => self.stations[i] = None,
            Slot::LoadBuffer(i) => self.load_buffers[i] = None,
        }
    }

    /// Resolve every station operand waiting on `tag`.
    pub fn broadcast(&mut self, tag: Tag, value: i32) {
        for station in self.stations.iter_mut().flatten() {
            for operand in [&mut station.j, &mut station.k] {
                if *operand == Operand::Wait(tag) {
                    *operand = Operand::Ready(value);
                }
            }
        }
    }

    /// Lowest idle functional unit of `class`.
    pub fn idle_unit(&self, class: UnitClass) -> Option<usize> {
        self.units
            .iter()
            .position(|u| u.class == class && u.is_idle())
    }

    pub fn occupy_unit(&mut self, unit: usize, seq: Seq, cycles: u32) {
        let u = &mut self.units[unit];
        u.occupant = Some(seq);
        u.remaining = cycles;
    }

    pub fn release_unit(&mut self, unit: usize) {
        let u = &mut self.units[unit];
        u.occupant = None;
        u.remaining = 0;
    }

    /// One cycle passes for every busy unit.
    pub fn tick(&mut self) {
        for u in self.units.iter_mut().filter(|u| !u.is_idle()) {
            u.remaining = u.remaining.saturating_sub(1);
        }
    }
}
