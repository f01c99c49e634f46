//! Building the backcone circuit of a set of failbits and finding the pin
//! paths each failing pattern activates.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Result, anyhow};
use tracing::{info, instrument, warn};
use tshell::circuit::types::format_values;
use tshell::circuit::{Circuit, Pattern, PinId, PinPath};
use tshell::io::netlist::{Netlist, Simulator};
use tshell::io::write_atomic;

use crate::config::{BackconeConfig, FailBit};
use crate::trace::{backcone_flop_pins, backcone_pins, scan_cell_pin};

/// Build the backcone circuit of every failbit in `cfg`.
///
/// Each failbit's scan cell pin becomes a circuit output and the state
/// elements feeding it become inputs. Structure for all failbits is in place
/// before any pattern is analysed, so path indices refer to the final
/// circuit. Patterns are merged by index across failbits and returned in
/// index order; with `analyze` set, each one records the paths it activates.
#[instrument(skip_all, fields(name = %cfg.name, failbits = cfg.failbits.len(), analyze))]
pub fn build_backcone<D>(
    cfg: &BackconeConfig,
    design: &mut D,
    analyze: bool,
) -> Result<(Circuit, Vec<Pattern>)>
where
    D: Netlist + Simulator + ?Sized,
{
    let mut circuit = Circuit::new(cfg.name.clone());
    let mut failing: BTreeMap<u32, Vec<PinId>> = BTreeMap::new();
    for failbit in &cfg.failbits {
        let scan_pin = add_failbit(&mut circuit, design, failbit)?;
        for &index in &failbit.failpatterns {
            let scan_pins = failing.entry(index).or_default();
            if !scan_pins.contains(&scan_pin) {
                scan_pins.push(scan_pin);
            }
        }
    }
    mark_defect_sites(&mut circuit, &cfg.defectsites)?;
    circuit.load_connectivity(design)?;
    let path_count = circuit.pinpaths()?.len();
    info!(
        pins = circuit.pin_count(),
        inputs = circuit.inputs().len(),
        outputs = circuit.outputs().len(),
        paths = path_count,
        "built backcone"
    );

    let total = failing.len();
    let mut patterns = Vec::with_capacity(total);
    for (done, (index, scan_pins)) in failing.into_iter().enumerate() {
        let mut pattern = Pattern::new(index);
        if analyze {
            analyze_pattern(&mut circuit, design, &mut pattern, &scan_pins)?;
            info!(
                pattern = index,
                done = done + 1,
                total,
                activated = pattern.activated_pinpaths().len(),
                "analysed pattern"
            );
        }
        patterns.push(pattern);
    }
    Ok((circuit, patterns))
}

/// Add one failbit's backcone to `circuit`, returning its scan cell pin.
fn add_failbit<N: Netlist + ?Sized>(
    circuit: &mut Circuit,
    nl: &mut N,
    failbit: &FailBit,
) -> Result<PinId> {
    let scan_pin = scan_cell_pin(circuit, nl, &failbit.chain, failbit.cell)?;
    circuit.define_output(scan_pin)?;

    let flops = backcone_flop_pins(circuit, nl, scan_pin)?;
    for &flop in &flops {
        circuit.define_input(flop)?;
    }
    for pin in backcone_pins(circuit, nl, scan_pin, &flops)? {
        circuit.add_pin(nl, pin)?;
    }
    info!(
        chain = %failbit.chain,
        cell = failbit.cell,
        flops = flops.len(),
        pins = circuit.pin_count(),
        "added failbit"
    );
    Ok(scan_pin)
}

fn mark_defect_sites(circuit: &mut Circuit, names: &[String]) -> Result<()> {
    for name in names {
        match circuit.find_pin(name).filter(|&pin| circuit.is_member(pin)) {
            Some(pin) => circuit.define_defect_site(pin)?,
            None => warn!(pin = %name, "defect site is not in the backcone"),
        }
    }
    Ok(())
}

/// Inject X at every circuit input that transitions under `pattern`. When
/// the X reaches a circuit output, record each path from that input to one
/// of `scan_pins` whose pins all went X.
fn analyze_pattern<S: Simulator + ?Sized>(
    circuit: &mut Circuit,
    sim: &mut S,
    pattern: &mut Pattern,
    scan_pins: &[PinId],
) -> Result<()> {
    pattern.create_sim_context(circuit, sim)?;
    let inputs: Vec<PinId> = circuit.inputs().iter().copied().collect();
    for input in inputs {
        if !pattern.has_transition(input) {
            continue;
        }
        let xsim = pattern.simulate_x_at_pin(circuit, sim, input)?;
        if xsim.failing_outputs.is_empty() {
            continue;
        }
        for &scan_pin in scan_pins {
            let activated: Vec<usize> = circuit
                .get_pinpaths(Some(input), Some(scan_pin), &[])?
                .into_iter()
                .filter(|path| path.is_activated(&xsim.x_pins))
                .map(PinPath::index)
                .collect();
            for index in activated {
                pattern.add_activated_pinpath(index);
            }
        }
    }
    Ok(())
}

/// Failing-path report, one block per pattern:
///
/// ```text
/// Pattern 3
///   Path 1 (1):
///     ff1/Q DFF (01)
///     u1/Y NAND2 (00) *
/// ```
///
/// Paths are listed with their circuit index and position in the pattern;
/// pins with their cell type, captured values and `*` for defect sites.
pub fn render_failpaths(circuit: &mut Circuit, patterns: &[Pattern]) -> Result<String> {
    circuit.pinpaths()?;
    let circuit = &*circuit;
    let paths = circuit.cached_pinpaths().unwrap_or_default();

    let mut out = String::new();
    for pattern in patterns {
        writeln!(out, "Pattern {}", pattern.index())?;
        for (position, &index) in pattern.activated_pinpaths().iter().enumerate() {
            let path = paths.get(index).ok_or_else(|| {
                anyhow!(
                    "pattern {} refers to pin path {index}, circuit has {}",
                    pattern.index(),
                    paths.len()
                )
            })?;
            writeln!(out, "  Path {index} ({}):", position + 1)?;
            for &pin in path.pins() {
                let values = pattern.values(pin).map(format_values).unwrap_or_default();
                let mark = if circuit.is_defect_site(pin) { "*" } else { "" };
                writeln!(
                    out,
                    "    {} {} ({values}) {mark}",
                    circuit.pin(pin).name(),
                    circuit.celltype_label(pin)
                )?;
            }
            out.push('\n');
        }
        out.push('\n');
    }
    Ok(out)
}

pub fn write_failpaths(path: &Path, circuit: &mut Circuit, patterns: &[Pattern]) -> Result<()> {
    write_atomic(path, &render_failpaths(circuit, patterns)?)?;
    info!(path = %path.display(), patterns = patterns.len(), "wrote failing paths");
    Ok(())
}
