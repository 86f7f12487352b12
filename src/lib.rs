mod asm;
mod config;
pub mod isa;
pub mod record;
mod regfile;
pub mod tomasulo;
mod trace;
pub mod units;
mod utils;

pub use asm::{decode, decode_line, load, Program};
pub use config::{DivZeroPolicy, Latency, RegPreset, SimOption};
pub use record::{Instance, Report, Timing};
pub use tomasulo::{simulate, Tomasulo};

#[cfg(test)]
mod tests {
    use crate::{decode, simulate, SimOption};

    #[test]
    fn test_simulate_basic() {
        let prog = decode(crate::asm::tests::BASIC_NEL).unwrap();
        let report = simulate(&prog, SimOption::default()).unwrap();
        eprintln!("{}", report);
        assert_eq!(report.timings.len(), prog.len());
        // all operands start at zero, so the branch on R1 == 5 is not taken
        assert!(report.timings.iter().all(|t| t.write_back.is_some()));
    }
}
