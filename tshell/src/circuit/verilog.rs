//! Structural Verilog export of a circuit.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::circuit::model::Circuit;
use crate::circuit::types::PinId;
use crate::core::names::verilog_name;
use crate::io::netlist::Netlist;
use crate::io::write_atomic;

/// Net attached to every member pin.
pub fn collect_nets<N: Netlist + ?Sized>(
    circuit: &Circuit,
    nl: &mut N,
) -> Result<BTreeMap<PinId, String>> {
    let mut nets = BTreeMap::new();
    for pin in circuit.pins() {
        let pin_ref = circuit.pin(pin);
        let net = nl
            .pin_net(pin_ref.name(), pin_ref.kind(), pin_ref.direction())
            .with_context(|| format!("net of {}", pin_ref.name()))?;
        nets.insert(pin, net);
    }
    Ok(nets)
}

/// Escaped identifiers need trailing whitespace.
fn ident(name: &str) -> String {
    let name = verilog_name(name);
    if name.starts_with('\\') {
        format!("{name} ")
    } else {
        name
    }
}

/// Render `circuit` as a Verilog module, given the net of each member pin.
///
/// Gates that drive a circuit input or are fed by a circuit output sit
/// outside the cut and are left out. Gate pins without a known net are left
/// unconnected.
pub fn render_verilog(circuit: &Circuit, nets: &BTreeMap<PinId, String>) -> String {
    let net_of = |pin: PinId| nets.get(&pin).map(|net| ident(net));
    let mut out = String::new();

    let ports: Vec<String> = circuit
        .inputs()
        .iter()
        .chain(circuit.outputs())
        .map(|&pin| ident(circuit.pin(pin).name()))
        .collect();
    let _ = writeln!(out, "module {}({});", ident(circuit.name()), ports.join(", "));
    for &pin in circuit.outputs() {
        let _ = writeln!(out, "  output {};", ident(circuit.pin(pin).name()));
    }
    for &pin in circuit.inputs() {
        let _ = writeln!(out, "  input {};", ident(circuit.pin(pin).name()));
    }
    out.push('\n');

    let wires: BTreeSet<String> = nets.values().map(|net| ident(net)).collect();
    for wire in &wires {
        let _ = writeln!(out, "  wire {wire};");
    }
    out.push('\n');

    for &pin in circuit.outputs() {
        if let Some(net) = net_of(pin) {
            let _ = writeln!(out, "  assign {} = {net};", ident(circuit.pin(pin).name()));
        }
    }
    for &pin in circuit.inputs() {
        if let Some(net) = net_of(pin) {
            let _ = writeln!(out, "  assign {net} = {};", ident(circuit.pin(pin).name()));
        }
    }
    out.push('\n');

    for gate_id in circuit.gates() {
        let gate = circuit.gate(gate_id);
        let drives_input = gate.outputs().iter().any(|&pin| circuit.is_input(pin));
        let fed_by_output = gate.inputs().iter().any(|&pin| circuit.is_output(pin));
        if drives_input || fed_by_output {
            continue;
        }
        let Some(celltype) = gate.celltype() else {
            continue;
        };
        let connections: Vec<String> = gate
            .inputs()
            .iter()
            .chain(gate.outputs())
            .filter_map(|&pin| {
                net_of(pin).map(|net| format!(".{} ({net})", circuit.pin(pin).leaf()))
            })
            .collect();
        let _ = writeln!(
            out,
            "  {} {} ({});",
            circuit.celltype(celltype).name(),
            ident(&gate.vname()),
            connections.join(", ")
        );
    }
    out.push('\n');
    out.push_str("endmodule\n");
    out
}

/// Query nets and write the Verilog module to `path`.
pub fn write_verilog<N: Netlist + ?Sized>(circuit: &Circuit, nl: &mut N, path: &Path) -> Result<()> {
    let nets = collect_nets(circuit, nl)?;
    write_atomic(path, &render_verilog(circuit, &nets))?;
    info!(path = %path.display(), gates = circuit.gates().count(), "wrote verilog");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::netlist::TessentDesign;
    use crate::test_support::{MemoryNetlist, ScriptedShell};

    #[test]
    fn renders_cut_with_nets() {
        let mut nl = MemoryNetlist::new()
            .gate("a", "DFF", &["D"], &["Q"])
            .gate("u1", "INV", &["A"], &["Y"])
            .gate("c", "DFF", &["D"], &["Q"])
            .connect("a/Q", "u1/A")
            .connect("u1/Y", "c/D");
        let mut circuit = Circuit::new("bc");
        for name in ["c/D", "u1/Y", "u1/A", "a/Q"] {
            circuit.get_pin(&mut nl, name).expect("pin");
        }
        let q = circuit.find_pin("a/Q").expect("pin");
        let d = circuit.find_pin("c/D").expect("pin");
        circuit.define_input(q).expect("input");
        circuit.define_output(d).expect("output");

        let nets = collect_nets(&circuit, &mut nl).expect("nets");
        let verilog = render_verilog(&circuit, &nets);

        let expected = "\
module bc(a__Q, c__D);
  output c__D;
  input a__Q;

  wire a__Q_net;
  wire u1__Y_net;

  assign c__D = u1__Y_net;
  assign a__Q_net = a__Q;

  INV u1 (.A (a__Q_net), .Y (u1__Y_net));

endmodule
";
        assert_eq!(verilog, expected);
    }

    #[test]
    fn primary_input_net_comes_from_its_fanout() {
        let mut nl = MemoryNetlist::new()
            .primary_input("en")
            .gate("u1", "INV", &["A"], &["Y"])
            .connect("en", "u1/A");
        let mut circuit = Circuit::new("bc");
        for name in ["u1/Y", "u1/A", "en"] {
            circuit.get_pin(&mut nl, name).expect("pin");
        }

        let mut shell = ScriptedShell::new()
            .respond("get_fanout u1/Y -stop_on net", "{n1}")
            .respond("get_fanin u1/A -stop_on net", "{en}")
            .respond("get_fanout en -stop_on net", "{en}");
        let mut design = TessentDesign::new(&mut shell);
        let nets = collect_nets(&circuit, &mut design).expect("nets");

        let en = circuit.find_pin("en").expect("pin");
        assert_eq!(nets[&en], "en");
        assert!(shell.sent().contains(&"get_fanout en -stop_on net".to_string()));
        assert!(!shell.sent().contains(&"get_fanin en -stop_on net".to_string()));
    }

    #[test]
    fn escaped_names_get_trailing_space() {
        assert_eq!(ident("core/r[0]/Q"), "\\core__r[0]__Q ");
        assert_eq!(ident("core/u1"), "core__u1");
    }
}
