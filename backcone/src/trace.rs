//! Walking back from a failing scan cell to the state elements feeding it.

use std::collections::{BTreeSet, VecDeque};

use anyhow::{Context, Result};
use tracing::debug;
use tshell::circuit::{Circuit, PinId};
use tshell::io::netlist::Netlist;

/// Data pin of scan cell `cell` on `chain`, as a circuit member.
pub fn scan_cell_pin<N: Netlist + ?Sized>(
    circuit: &mut Circuit,
    nl: &mut N,
    chain: &str,
    cell: u32,
) -> Result<PinId> {
    let name = nl
        .scan_cell_pin(chain, cell)
        .with_context(|| format!("scan cell {cell} on chain {chain}"))?;
    circuit.get_pin(nl, &name)
}

/// State element outputs and primary inputs that `pin` depends on, as
/// circuit members.
pub fn backcone_flop_pins<N: Netlist + ?Sized>(
    circuit: &mut Circuit,
    nl: &mut N,
    pin: PinId,
) -> Result<Vec<PinId>> {
    let name = circuit.pin(pin).name().to_string();
    let traced = nl
        .trace_backward(&name)
        .with_context(|| format!("trace backward from {name}"))?;
    let pins = traced
        .iter()
        .map(|flop| circuit.get_pin(nl, flop))
        .collect::<Result<Vec<_>>>()?;
    debug!(pin = %name, flops = pins.len(), "traced backcone flops");
    Ok(pins)
}

/// Every pin between `start` and `endpoints`, following fanin breadth first.
///
/// Endpoints are included but not traced through. Each pin appears once, in
/// the order it was reached.
pub fn backcone_pins<N: Netlist + ?Sized>(
    circuit: &mut Circuit,
    nl: &mut N,
    start: PinId,
    endpoints: &[PinId],
) -> Result<Vec<PinId>> {
    let stop: BTreeSet<PinId> = endpoints.iter().copied().collect();
    let mut seen = BTreeSet::new();
    let mut order = Vec::new();
    let mut queue = VecDeque::from([start]);
    while let Some(pin) = queue.pop_front() {
        if !seen.insert(pin) {
            continue;
        }
        order.push(pin);
        if stop.contains(&pin) {
            continue;
        }
        queue.extend(circuit.fanin(nl, pin)?);
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use tshell::test_support::MemoryNetlist;

    use super::*;

    /// ff1/Q and ff2/Q feed a NAND whose output (plus primary input `en`
    /// through an AND) reaches ff3/D. ff3/Q loops back into ff1.
    fn design() -> MemoryNetlist {
        MemoryNetlist::new()
            .gate("ff1", "DFF", &["D", "CK"], &["Q"])
            .gate("ff2", "DFF", &["D", "CK"], &["Q"])
            .gate("ff3", "DFF", &["D", "CK"], &["Q"])
            .gate("u1", "NAND2", &["A", "B"], &["Y"])
            .gate("u2", "AND2", &["A", "B"], &["Y"])
            .primary_input("en")
            .sequential("DFF")
            .connect("ff1/Q", "u1/A")
            .connect("ff2/Q", "u1/B")
            .connect("u1/Y", "u2/A")
            .connect("en", "u2/B")
            .connect("u2/Y", "ff3/D")
            .connect("ff3/Q", "ff1/D")
            .scan_cell("chain1", 2, "ff3/D")
    }

    fn names(circuit: &Circuit, pins: &[PinId]) -> Vec<String> {
        pins.iter()
            .map(|&pin| circuit.pin(pin).name().to_string())
            .collect()
    }

    #[test]
    fn scan_cell_becomes_member() {
        let mut nl = design();
        let mut circuit = Circuit::new("bc");
        let pin = scan_cell_pin(&mut circuit, &mut nl, "chain1", 2).expect("scan pin");
        assert_eq!(circuit.pin(pin).name(), "ff3/D");
        assert!(circuit.is_member(pin));

        let err = scan_cell_pin(&mut circuit, &mut nl, "chain1", 9).expect_err("no cell");
        assert!(format!("{err:#}").contains("scan cell 9 on chain chain1"));
    }

    #[test]
    fn flop_trace_stops_at_state_and_ports() {
        let mut nl = design();
        let mut circuit = Circuit::new("bc");
        let pin = scan_cell_pin(&mut circuit, &mut nl, "chain1", 2).expect("scan pin");
        let flops = backcone_flop_pins(&mut circuit, &mut nl, pin).expect("flops");
        let mut found = names(&circuit, &flops);
        found.sort();
        assert_eq!(found, ["en", "ff1/Q", "ff2/Q"]);
    }

    #[test]
    fn backcone_walk_includes_endpoints_once() {
        let mut nl = design();
        let mut circuit = Circuit::new("bc");
        let pin = scan_cell_pin(&mut circuit, &mut nl, "chain1", 2).expect("scan pin");
        let flops = backcone_flop_pins(&mut circuit, &mut nl, pin).expect("flops");
        let pins = backcone_pins(&mut circuit, &mut nl, pin, &flops).expect("walk");

        assert_eq!(
            names(&circuit, &pins),
            ["ff3/D", "u2/Y", "u2/A", "u2/B", "u1/Y", "en", "u1/A", "u1/B", "ff1/Q", "ff2/Q"]
        );
    }

    #[test]
    fn walk_order_is_repeatable() {
        let run = || {
            let mut nl = design();
            let mut circuit = Circuit::new("bc");
            let pin = scan_cell_pin(&mut circuit, &mut nl, "chain1", 2).expect("scan pin");
            let flops = backcone_flop_pins(&mut circuit, &mut nl, pin).expect("flops");
            let pins = backcone_pins(&mut circuit, &mut nl, pin, &flops).expect("walk");
            names(&circuit, &pins)
        };
        assert_eq!(run(), run());
    }
}
