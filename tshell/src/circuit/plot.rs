//! Graphviz rendering of a circuit's gate graph.

use std::fmt::Write as _;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::info;

use crate::circuit::graph::{GateGraph, IoRole, gate_graph};
use crate::circuit::model::Circuit;
use crate::io::process::run_command_with_timeout;
use crate::io::write_atomic;

/// Graphviz layout program used for PNG output.
pub const DOT_PROGRAM: &str = "dot";

fn quote(id: &str) -> String {
    format!("\"{}\"", id.replace('\\', "\\\\").replace('"', "\\\""))
}

/// DOT source for a gate graph: inputs blue, outputs red, the rest gray,
/// each box labelled with its cell type.
pub fn gate_graph_dot(name: &str, graph: &GateGraph) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph {} {{", quote(name));
    out.push_str("  graph [rankdir=LR];\n");
    out.push_str("  node [shape=box, style=filled];\n");
    out.push_str("  edge [fontsize=5];\n");

    for role in [IoRole::Input, IoRole::Output] {
        let ranked: Vec<String> = graph
            .nodes()
            .filter(|node| node.io == Some(role))
            .map(|node| quote(&node.name))
            .collect();
        if !ranked.is_empty() {
            let _ = writeln!(out, "  {{ rank=same; {}; }}", ranked.join("; "));
        }
    }

    for node in graph.nodes() {
        let color = match node.io {
            Some(IoRole::Input) => "blue",
            Some(IoRole::Output) => "red",
            None => "gray",
        };
        let _ = writeln!(
            out,
            "  {} [label={}, fillcolor={color}];",
            quote(&node.name),
            quote(&node.celltype)
        );
    }
    for (source, sink) in graph.edges() {
        let _ = writeln!(out, "  {} -> {};", quote(source), quote(sink));
    }
    out.push_str("}\n");
    out
}

/// Write the gate graph of `circuit` as a DOT file.
pub fn write_dot(circuit: &Circuit, path: &Path) -> Result<()> {
    let graph = gate_graph(circuit)?;
    write_atomic(path, &gate_graph_dot(circuit.name(), &graph))?;
    info!(
        path = %path.display(),
        nodes = graph.graph.node_count(),
        edges = graph.graph.edge_count(),
        "wrote gate graph"
    );
    Ok(())
}

/// Lay out a DOT file as PNG with `program -Tpng`.
pub fn render_png(program: &Path, dot_file: &Path, png_file: &Path, timeout: Duration) -> Result<()> {
    let mut cmd = Command::new(program);
    cmd.arg("-Tpng").arg(dot_file).arg("-o").arg(png_file);
    let output = run_command_with_timeout(cmd, timeout)?;
    if output.timed_out {
        bail!("{} timed out after {}s", program.display(), timeout.as_secs());
    }
    if !output.status.success() {
        bail!(
            "{} failed ({}): {}",
            program.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    info!(path = %png_file.display(), "rendered graph");
    Ok(())
}
