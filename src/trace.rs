//! Per-cycle dump of the machine state, printed when `tty_out` is set.

use std::fmt::Write;

use crate::tomasulo::{Stage, Tomasulo};
use crate::units::{Operand, Slot, Tag, LOAD_BUFFERS, STATIONS};
use crate::utils::{busy, header, idle, waiting};

fn operand(o: Operand) -> String {
    match o {
        Operand::Ready(v) => format!("{v:>11}"),
        Operand::Wait(tag) => waiting().paint(format!("{:>11}", tag.to_string())).to_string(),
    }
}

impl Tomasulo {
    /// Render stations, load buffers, functional units and registers as
    /// coloured text tables.
    pub fn render(&self) -> String {
        let mut out = String::new();
        // writing into a String cannot fail
        let _ = self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) -> std::fmt::Result {
        writeln!(
            out,
            "{}",
            header().paint(format!(
                "cycle {} pc {}{}",
                self.cycle_count(),
                self.pc,
                if self.branch.is_some() { " (branch pending)" } else { "" }
            ))
        )?;

        writeln!(out, "{}", header().paint("station  op  stage           j           k"))?;
        for i in 0..STATIONS {
            let tag = Tag::of(Slot::Station(i));
            match self.pools.stations[i] {
                Some(st) => {
                    let stage = self.stage_of(Slot::Station(i));
                    writeln!(
                        out,
                        "{}  {:<3} {:<9} {} {}",
                        busy().paint(format!("{:<6}", tag.to_string())),
                        st.op.mnemonic(),
                        stage,
                        operand(st.j),
                        operand(st.k)
                    )?;
                }
                None => writeln!(out, "{}", idle().paint(format!("{:<6}", tag.to_string())))?,
            }
        }

        writeln!(out, "{}", header().paint("buffer   stage         value"))?;
        for i in 0..LOAD_BUFFERS {
            let tag = Tag::of(Slot::LoadBuffer(i));
            match self.pools.load_buffers[i] {
                Some(lb) => writeln!(
                    out,
                    "{}  {:<9} {:>11}",
                    busy().paint(format!("{:<6}", tag.to_string())),
                    self.stage_of(Slot::LoadBuffer(i)),
                    lb.addr
                )?,
                None => writeln!(out, "{}", idle().paint(format!("{:<6}", tag.to_string())))?,
            }
        }

        writeln!(out, "{}", header().paint("unit     class      inst  left"))?;
        for (i, u) in self.pools.units.iter().enumerate() {
            let name = format!("FU{:<4}", i + 1);
            match u.occupant.and_then(|seq| self.in_flight.iter().find(|f| f.seq == seq)) {
                Some(f) => writeln!(
                    out,
                    "{}  {:<9} #{:<4} {}",
                    busy().paint(name),
                    u.class.name(),
                    f.index,
                    u.remaining
                )?,
                None => writeln!(out, "{}  {}", idle().paint(name), u.class.name())?,
            }
        }

        // registers still at zero with no producer are left out
        let regs: Vec<String> = self
            .regs
            .iter()
            .filter_map(|(i, r)| match r.tag {
                Some(tag) => Some(waiting().paint(format!("R{i}<-{tag}")).to_string()),
                None if r.value != 0 => Some(format!("R{i}={}", r.value)),
                None => None,
            })
            .collect();
        writeln!(out, "{} {}", header().paint("regs"), regs.join(" "))?;
        Ok(())
    }

    fn stage_of(&self, slot: Slot) -> &'static str {
        match self.in_flight.iter().find(|f| f.slot == slot).map(|f| f.stage) {
            Some(Stage::Issued) => "waiting",
            Some(Stage::Ready) => "ready",
            Some(Stage::Executing { .. }) => "executing",
            None => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::asm::decode;
    use crate::config::SimOption;
    use crate::isa::Reg;
    use crate::tomasulo::Tomasulo;

    #[test]
    fn test_render() {
        let prog = decode("L,R1,0x3\nA,R2,R1,R1").unwrap();
        let option = SimOption::default().set_reg(Reg::try_from(7).unwrap(), -4);
        let mut sim = Tomasulo::new(prog, option);
        sim.step();
        sim.step();
        let text = sim.render();
        assert!(text.contains("cycle 2 pc 2"), "{text}");
        assert!(text.contains("Ars1"), "{text}");
        assert!(text.contains("LB1"), "{text}");
        assert!(text.contains("executing"), "{text}");
        assert!(text.contains("R1<-LB1"), "{text}");
        assert!(text.contains("R2<-Ars1"), "{text}");
        assert!(text.contains("R7=-4"), "{text}");
        assert!(!text.contains("R3="), "{text}");
    }
}
