//! JSON snapshots of a circuit and its analysed patterns.
//!
//! A snapshot records member pins by position, so a circuit can be rebuilt
//! later without asking the tool about structure again.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::circuit::CircuitError;
use crate::circuit::model::Circuit;
use crate::circuit::pattern::Pattern;
use crate::circuit::pinpath::PinPath;
use crate::circuit::types::{Direction, LogicValue, PinId, PinKind};
use crate::io::write_atomic;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    pub name: String,
    pub pins: Vec<PinRecord>,
    #[serde(default)]
    pub pinpaths: Vec<Vec<usize>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub patterns: BTreeMap<u32, PatternRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinRecord {
    pub name: String,
    pub kind: PinKind,
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub celltype: Option<String>,
    #[serde(default)]
    pub input: bool,
    #[serde(default)]
    pub output: bool,
    #[serde(default)]
    pub defectsite: bool,
    #[serde(default)]
    pub fanin: Vec<usize>,
    #[serde(default)]
    pub fanout: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRecord {
    /// Values per pin, aligned with [`CircuitSnapshot::pins`].
    pub pins: Vec<Vec<LogicValue>>,
    #[serde(rename = "activatedpinpaths", default)]
    pub activated_pinpaths: Vec<usize>,
}

/// Record `circuit` and `patterns`. Pin paths are enumerated if needed.
pub fn capture(circuit: &mut Circuit, patterns: &[Pattern]) -> Result<CircuitSnapshot> {
    let order: Vec<PinId> = circuit.pins().collect();
    let position: HashMap<PinId, usize> = order
        .iter()
        .enumerate()
        .map(|(i, &pin)| (pin, i))
        .collect();
    let positions = |pins: Option<&[PinId]>| -> Vec<usize> {
        pins.unwrap_or_default()
            .iter()
            .filter_map(|pin| position.get(pin).copied())
            .collect()
    };

    let pinpaths: Vec<Vec<usize>> = circuit
        .pinpaths()?
        .iter()
        .map(|path| positions(Some(path.pins())))
        .collect();

    let pins = order
        .iter()
        .map(|&id| {
            let pin = circuit.pin(id);
            let gate = pin.gate().map(|gate| circuit.gate(gate));
            PinRecord {
                name: pin.name().to_string(),
                kind: pin.kind(),
                direction: pin.direction(),
                gate: gate.map(|gate| gate.name().to_string()),
                celltype: gate
                    .and_then(|gate| gate.celltype())
                    .map(|celltype| circuit.celltype(celltype).name().to_string()),
                input: circuit.is_input(id),
                output: circuit.is_output(id),
                defectsite: circuit.is_defect_site(id),
                fanin: positions(pin.cached_fanin()),
                fanout: positions(pin.cached_fanout()),
            }
        })
        .collect();

    let patterns = patterns
        .iter()
        .map(|pattern| {
            let values = order
                .iter()
                .map(|&pin| pattern.values(pin).map(<[LogicValue]>::to_vec).unwrap_or_default())
                .collect();
            let record = PatternRecord {
                pins: values,
                activated_pinpaths: pattern.activated_pinpaths().to_vec(),
            };
            (pattern.index(), record)
        })
        .collect();

    Ok(CircuitSnapshot {
        name: circuit.name().to_string(),
        pins,
        pinpaths,
        patterns,
    })
}

/// Rebuild a circuit and its patterns from a snapshot.
pub fn restore(snapshot: &CircuitSnapshot) -> Result<(Circuit, Vec<Pattern>)> {
    let count = snapshot.pins.len();
    let check = |what: &str, index: usize| -> Result<usize> {
        if index < count {
            Ok(index)
        } else {
            Err(CircuitError::InvalidSnapshot(format!(
                "{what} refers to pin {index}, snapshot has {count} pins"
            ))
            .into())
        }
    };

    let mut circuit = Circuit::new(snapshot.name.clone());
    let mut ids = Vec::with_capacity(count);
    for record in &snapshot.pins {
        if circuit.find_pin(&record.name).is_some() {
            return Err(CircuitError::InvalidSnapshot(format!(
                "pin {} listed twice",
                record.name
            ))
            .into());
        }
        ids.push(circuit.restore_pin(
            &record.name,
            record.kind,
            record.direction,
            record.celltype.as_deref(),
        ));
    }

    for (record, &id) in snapshot.pins.iter().zip(&ids) {
        if record.input {
            circuit.define_input(id)?;
        } else {
            let fanin = record
                .fanin
                .iter()
                .map(|&index| check(&format!("fanin of {}", record.name), index).map(|i| ids[i]))
                .collect::<Result<Vec<_>>>()?;
            circuit.restore_fanin(id, fanin);
        }
        if record.output {
            circuit.define_output(id)?;
        }
        if record.defectsite {
            circuit.define_defect_site(id)?;
        }
    }

    let mut paths = Vec::with_capacity(snapshot.pinpaths.len());
    for (index, path) in snapshot.pinpaths.iter().enumerate() {
        let pins = path
            .iter()
            .map(|&pin| check(&format!("pin path {index}"), pin).map(|i| ids[i]))
            .collect::<Result<Vec<_>>>()?;
        paths.push(PinPath::new(index, pins));
    }
    let path_count = paths.len();
    circuit.restore_pinpaths(paths);

    let mut patterns = Vec::with_capacity(snapshot.patterns.len());
    for (&index, record) in &snapshot.patterns {
        if record.pins.len() != count {
            return Err(CircuitError::InvalidSnapshot(format!(
                "pattern {index} has values for {} pins, snapshot has {count}",
                record.pins.len()
            ))
            .into());
        }
        let mut pattern = Pattern::new(index);
        for (&id, values) in ids.iter().zip(&record.pins) {
            if !values.is_empty() {
                pattern.set_values(id, values.clone());
            }
        }
        for &path in &record.activated_pinpaths {
            if path >= path_count {
                return Err(CircuitError::InvalidSnapshot(format!(
                    "pattern {index} refers to pin path {path}, snapshot has {path_count}"
                ))
                .into());
            }
            pattern.add_activated_pinpath(path);
        }
        patterns.push(pattern);
    }

    Ok((circuit, patterns))
}

/// Capture and write a snapshot as pretty JSON.
pub fn write_snapshot(path: &Path, circuit: &mut Circuit, patterns: &[Pattern]) -> Result<()> {
    let snapshot = capture(circuit, patterns)?;
    let mut buf = serde_json::to_string_pretty(&snapshot).context("serialize snapshot")?;
    buf.push('\n');
    write_atomic(path, &buf)?;
    info!(
        path = %path.display(),
        pins = snapshot.pins.len(),
        patterns = snapshot.patterns.len(),
        "wrote snapshot"
    );
    Ok(())
}

/// Read a snapshot and rebuild its circuit and patterns.
pub fn read_snapshot(path: &Path) -> Result<(Circuit, Vec<Pattern>)> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read snapshot {}", path.display()))?;
    let snapshot: CircuitSnapshot = serde_json::from_str(&contents)
        .with_context(|| format!("parse snapshot {}", path.display()))?;
    restore(&snapshot).with_context(|| format!("restore snapshot {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::types::LogicValue::{One, Zero};
    use crate::test_support::MemoryNetlist;

    fn analysed() -> (Circuit, Vec<Pattern>) {
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
        let y = circuit.find_pin("u1/Y").expect("pin");
        circuit.define_input(q).expect("input");
        circuit.define_output(d).expect("output");
        circuit.define_defect_site(y).expect("defect");
        circuit.load_connectivity(&mut nl).expect("connectivity");

        let mut pattern = Pattern::new(7);
        pattern.set_values(q, vec![Zero, One]);
        pattern.set_values(y, vec![One, Zero]);
        pattern.add_activated_pinpath(0);
        (circuit, vec![pattern])
    }

    #[test]
    fn capture_records_positions_and_flags() {
        let (mut circuit, patterns) = analysed();
        let snapshot = capture(&mut circuit, &patterns).expect("capture");

        let names: Vec<&str> = snapshot.pins.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["c/D", "u1/Y", "u1/A", "a/Q"]);
        assert!(snapshot.pins[0].output);
        assert!(snapshot.pins[3].input);
        assert!(snapshot.pins[1].defectsite);
        assert_eq!(snapshot.pins[0].fanin, [1]);
        assert_eq!(snapshot.pins[1].celltype.as_deref(), Some("INV"));
        assert_eq!(snapshot.pinpaths, [vec![3, 2, 1, 0]]);
        assert_eq!(snapshot.patterns[&7].pins[2], Vec::<LogicValue>::new());
        assert_eq!(snapshot.patterns[&7].activated_pinpaths, [0]);

        let json = serde_json::to_value(&snapshot).expect("json");
        assert_eq!(json["patterns"]["7"]["activatedpinpaths"][0], 0);
        assert_eq!(json["pins"][3]["kind"], "gate");
    }

    #[test]
    fn restore_rebuilds_without_tool_queries() {
        let (mut circuit, patterns) = analysed();
        let snapshot = capture(&mut circuit, &patterns).expect("capture");
        let (mut restored, restored_patterns) = restore(&snapshot).expect("restore");

        assert_eq!(restored.name(), "bc");
        assert_eq!(restored.pin_count(), 4);
        let q = restored.find_pin("a/Q").expect("pin");
        let y = restored.find_pin("u1/Y").expect("pin");
        assert!(restored.is_input(q));
        assert!(restored.is_defect_site(y));
        assert_eq!(restored.celltype_label(y), "INV");

        assert_eq!(restored.pinpaths().expect("paths").len(), 1);
        let paths = restored.cached_pinpaths().expect("cached paths");
        assert_eq!(paths[0].describe(&restored), "a/Q->u1/A->u1/Y->c/D");

        assert_eq!(restored_patterns.len(), 1);
        assert_eq!(restored_patterns[0].index(), 7);
        assert_eq!(restored_patterns[0].values(q), Some(&[Zero, One][..]));
        assert!(restored_patterns[0].has_transition(q));
        assert_eq!(restored_patterns[0].activated_pinpaths(), &[0]);
    }

    #[test]
    fn out_of_range_index_is_invalid() {
        let (mut circuit, patterns) = analysed();
        let mut snapshot = capture(&mut circuit, &patterns).expect("capture");
        snapshot.pins[0].fanin = vec![9];
        let err = restore(&snapshot).expect_err("bad index");
        assert!(matches!(
            err.downcast_ref::<CircuitError>(),
            Some(CircuitError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn file_round_trip_through_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("backcone.json");
        let (mut circuit, patterns) = analysed();
        write_snapshot(&path, &mut circuit, &patterns).expect("write");
        let (restored, _) = read_snapshot(&path).expect("read");
        assert_eq!(restored.outputs().len(), 1);

        fs::write(&path, "{not json").expect("corrupt");
        assert!(read_snapshot(&path).is_err());
    }
}
