//! Graph views of a circuit over petgraph.
//!
//! Both views only contain member pins and read connectivity from the
//! circuit's fanin cache, so they can be built without the tool once
//! [`Circuit::load_connectivity`] has run (or a snapshot was restored).

use std::collections::HashMap;

use anyhow::Result;
use petgraph::algo::all_simple_paths;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::circuit::CircuitError;
use crate::circuit::model::Circuit;
use crate::circuit::pinpath::PinPath;
use crate::circuit::types::{Direction, PinId};

/// Pin-level dependency graph with an edge `driver -> pin`.
#[derive(Debug, Default)]
pub struct PinGraph {
    pub graph: DiGraph<PinId, ()>,
    nodes: HashMap<PinId, NodeIndex>,
}

impl PinGraph {
    pub fn node(&self, pin: PinId) -> Option<NodeIndex> {
        self.nodes.get(&pin).copied()
    }

    fn add_node(&mut self, pin: PinId) -> NodeIndex {
        *self
            .nodes
            .entry(pin)
            .or_insert_with(|| self.graph.add_node(pin))
    }
}

/// Build the pin graph of `circuit`.
pub fn pin_graph(circuit: &Circuit) -> Result<PinGraph> {
    let mut graph = PinGraph::default();
    for pin in circuit.pins() {
        graph.add_node(pin);
    }
    for pin in circuit.pins().filter(|pin| !circuit.is_input(*pin)) {
        let sink = graph.add_node(pin);
        for &driver in loaded_fanin(circuit, pin)? {
            if circuit.is_member(driver) {
                let source = graph.add_node(driver);
                graph.graph.update_edge(source, sink, ());
            }
        }
    }
    Ok(graph)
}

/// Every simple path from each circuit input to each circuit output,
/// numbered in the order found.
pub fn all_pin_paths(circuit: &Circuit) -> Result<Vec<PinPath>> {
    let graph = pin_graph(circuit)?;
    let mut paths = Vec::new();
    for &input in circuit.inputs() {
        for &output in circuit.outputs() {
            let (Some(from), Some(to)) = (graph.node(input), graph.node(output)) else {
                continue;
            };
            if from == to {
                continue;
            }
            for nodes in all_simple_paths::<Vec<NodeIndex>, _>(&graph.graph, from, to, 0, None) {
                let pins = nodes.into_iter().map(|node| graph.graph[node]).collect();
                paths.push(PinPath::new(paths.len(), pins));
            }
        }
    }
    Ok(paths)
}

/// Role of a node in the gate graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoRole {
    Input,
    Output,
}

/// A gate (or an IO pin standing in for its gate) in the gate graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateNode {
    pub name: String,
    /// Cell type name; `PI`/`PO` for top-level ports.
    pub celltype: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub io: Option<IoRole>,
}

/// Gate-level view: circuit IO pins are their own nodes, every other member
/// pin collapses onto its gate.
#[derive(Debug, Default)]
pub struct GateGraph {
    pub graph: DiGraph<GateNode, ()>,
    nodes: HashMap<String, NodeIndex>,
}

impl GateGraph {
    pub fn node(&self, name: &str) -> Option<&GateNode> {
        self.nodes.get(name).map(|&index| &self.graph[index])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GateNode> {
        self.graph.node_weights()
    }

    /// Edges as `(source, sink)` node names.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.graph.raw_edges().iter().map(|edge| {
            (
                self.graph[edge.source()].name.as_str(),
                self.graph[edge.target()].name.as_str(),
            )
        })
    }

    fn add_node(&mut self, node: GateNode) -> NodeIndex {
        if let Some(&index) = self.nodes.get(&node.name) {
            self.graph[index] = node;
            return index;
        }
        let name = node.name.clone();
        let index = self.graph.add_node(node);
        self.nodes.insert(name, index);
        index
    }

    fn index(&self, name: &str) -> Option<NodeIndex> {
        self.nodes.get(name).copied()
    }
}

/// Build the gate graph of `circuit`.
pub fn gate_graph(circuit: &Circuit) -> Result<GateGraph> {
    let mut graph = GateGraph::default();

    for pin in circuit.pins() {
        if !circuit.is_input(pin) && !circuit.is_output(pin) {
            graph.add_node(node_for(circuit, pin, circuit.gate_key(pin), None));
        }
    }
    for &pin in circuit.inputs() {
        let name = circuit.pin(pin).name();
        graph.add_node(node_for(circuit, pin, name, Some(IoRole::Input)));
    }
    for &pin in circuit.outputs() {
        let name = circuit.pin(pin).name();
        graph.add_node(node_for(circuit, pin, name, Some(IoRole::Output)));
    }

    for pin in circuit.pins() {
        if circuit.is_input(pin) || circuit.pin(pin).direction() != Direction::Input {
            continue;
        }
        let sink_name = if circuit.is_output(pin) {
            circuit.pin(pin).name()
        } else {
            circuit.gate_key(pin)
        };
        let Some(sink) = graph.index(sink_name) else {
            continue;
        };
        for &driver in loaded_fanin(circuit, pin)? {
            if !circuit.is_member(driver) {
                continue;
            }
            let source_name = if circuit.is_input(driver) {
                circuit.pin(driver).name()
            } else {
                circuit.gate_key(driver)
            };
            let source = match graph.index(source_name) {
                Some(source) => source,
                None => graph.add_node(node_for(circuit, driver, source_name, None)),
            };
            graph.graph.update_edge(source, sink, ());
        }
    }
    Ok(graph)
}

fn node_for(circuit: &Circuit, pin: PinId, name: &str, io: Option<IoRole>) -> GateNode {
    let pin_names = |pins: &[PinId]| -> Vec<String> {
        pins.iter()
            .map(|&pin| circuit.pin(pin).name().to_string())
            .collect()
    };
    let (inputs, outputs) = match circuit.pin(pin).gate() {
        Some(gate) => {
            let gate = circuit.gate(gate);
            (pin_names(gate.inputs()), pin_names(gate.outputs()))
        }
        None => (Vec::new(), Vec::new()),
    };
    GateNode {
        name: name.to_string(),
        celltype: circuit.celltype_label(pin).to_string(),
        inputs,
        outputs,
        io,
    }
}

fn loaded_fanin(circuit: &Circuit, pin: PinId) -> Result<&[PinId]> {
    circuit
        .pin(pin)
        .cached_fanin()
        .ok_or_else(|| CircuitError::MissingConnectivity(circuit.pin(pin).name().to_string()).into())
}
