//! The [`Circuit`] container: element store plus circuit membership.

use std::collections::{BTreeSet, HashMap};

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::circuit::CircuitError;
use crate::circuit::elements::{CellType, Gate, Pin, gate_name_of};
use crate::circuit::graph::all_pin_paths;
use crate::circuit::pinpath::PinPath;
use crate::circuit::types::{CellTypeId, Direction, GateId, PinId, PinKind};
use crate::io::netlist::Netlist;

/// A named subcircuit of the flat model.
///
/// Every pin, gate and cell type discovered while querying the design lands
/// in the circuit's store and is addressed by id. Only pins added through
/// [`Circuit::get_pin`] or [`Circuit::add_pin`] are members of the circuit;
/// the rest are neighbors seen while walking connectivity. Membership sets
/// are ordered by id, i.e. by discovery order.
#[derive(Debug, Clone)]
pub struct Circuit {
    name: String,
    pins: Vec<Pin>,
    pin_index: HashMap<String, PinId>,
    gates: Vec<Gate>,
    gate_index: HashMap<String, GateId>,
    celltypes: Vec<CellType>,
    celltype_index: HashMap<String, CellTypeId>,
    members: BTreeSet<PinId>,
    member_gates: BTreeSet<GateId>,
    member_celltypes: BTreeSet<CellTypeId>,
    inputs: BTreeSet<PinId>,
    outputs: BTreeSet<PinId>,
    defect_sites: BTreeSet<PinId>,
    pinpaths: Option<Vec<PinPath>>,
}

impl Circuit {
    /// An empty circuit.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pins: Vec::new(),
            pin_index: HashMap::new(),
            gates: Vec::new(),
            gate_index: HashMap::new(),
            celltypes: Vec::new(),
            celltype_index: HashMap::new(),
            members: BTreeSet::new(),
            member_gates: BTreeSet::new(),
            member_celltypes: BTreeSet::new(),
            inputs: BTreeSet::new(),
            outputs: BTreeSet::new(),
            defect_sites: BTreeSet::new(),
            pinpaths: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up (or discover) a pin by name without adding it to the circuit.
    pub fn resolve_pin<N: Netlist + ?Sized>(&mut self, nl: &mut N, name: &str) -> Result<PinId> {
        if let Some(&id) = self.pin_index.get(name) {
            return Ok(id);
        }

        let (kind, direction) = if nl.pin_exists(name)? {
            (PinKind::Gate, nl.pin_direction(name)?)
        } else if nl.port_exists(name)? {
            let direction = nl.pin_direction(name)?;
            let kind = match direction {
                Direction::Input => PinKind::PrimaryInput,
                Direction::Output => PinKind::PrimaryOutput,
            };
            (kind, direction)
        } else {
            return Err(CircuitError::ElementNotFound(name.to_string()).into());
        };

        let id = self.insert_pin(name, kind, direction);
        debug!(pin = name, ?kind, %direction, "discovered pin");
        Ok(id)
    }

    /// Look up a pin by name and make it a member of the circuit.
    pub fn get_pin<N: Netlist + ?Sized>(&mut self, nl: &mut N, name: &str) -> Result<PinId> {
        let id = self.resolve_pin(nl, name)?;
        self.add_pin(nl, id)?;
        Ok(id)
    }

    /// Make a known pin a member; gate pins also bring in their gate and cell type.
    pub fn add_pin<N: Netlist + ?Sized>(&mut self, nl: &mut N, id: PinId) -> Result<()> {
        if !self.members.insert(id) {
            return Ok(());
        }
        self.pinpaths = None;
        if let Some(gate) = self.pins[id.0].gate {
            self.member_gates.insert(gate);
            let celltype = self.gate_celltype(nl, gate)?;
            self.member_celltypes.insert(celltype);
        }
        Ok(())
    }

    /// Look up a gate by name and make it (and its cell type) part of the circuit.
    pub fn get_gate<N: Netlist + ?Sized>(&mut self, nl: &mut N, name: &str) -> Result<GateId> {
        let gate = self.intern_gate(name);
        self.member_gates.insert(gate);
        let celltype = self.gate_celltype(nl, gate)?;
        self.member_celltypes.insert(celltype);
        Ok(gate)
    }

    /// Look up a cell type by name and make it part of the circuit.
    pub fn get_celltype(&mut self, name: &str) -> CellTypeId {
        let id = self.intern_celltype(name);
        self.member_celltypes.insert(id);
        id
    }

    /// Cell type of a gate, queried on first use.
    pub fn gate_celltype<N: Netlist + ?Sized>(
        &mut self,
        nl: &mut N,
        gate: GateId,
    ) -> Result<CellTypeId> {
        if let Some(celltype) = self.gates[gate.0].celltype {
            return Ok(celltype);
        }
        let module = nl
            .gate_module(&self.gates[gate.0].name)
            .with_context(|| format!("cell type of gate {}", self.gates[gate.0].name))?;
        let celltype = self.intern_celltype(&module);
        self.gates[gate.0].celltype = Some(celltype);
        Ok(celltype)
    }

    /// Port names of a cell type, queried on first use.
    pub fn celltype_ports<N: Netlist + ?Sized>(
        &mut self,
        nl: &mut N,
        id: CellTypeId,
        direction: Direction,
    ) -> Result<&[String]> {
        let celltype = &self.celltypes[id.0];
        let cached = match direction {
            Direction::Input => &celltype.input_ports,
            Direction::Output => &celltype.output_ports,
        };
        if cached.is_none() {
            let ports = nl.module_ports(&celltype.name, direction)?;
            let celltype = &mut self.celltypes[id.0];
            match direction {
                Direction::Input => celltype.input_ports = Some(ports),
                Direction::Output => celltype.output_ports = Some(ports),
            }
        }
        let celltype = &self.celltypes[id.0];
        let ports = match direction {
            Direction::Input => celltype.input_ports.as_deref(),
            Direction::Output => celltype.output_ports.as_deref(),
        };
        Ok(ports.unwrap_or_default())
    }

    pub fn define_input(&mut self, pin: PinId) -> Result<()> {
        self.require_member(pin)?;
        if self.inputs.insert(pin) {
            self.pinpaths = None;
        }
        Ok(())
    }

    pub fn define_output(&mut self, pin: PinId) -> Result<()> {
        self.require_member(pin)?;
        if self.outputs.insert(pin) {
            self.pinpaths = None;
        }
        Ok(())
    }

    pub fn define_defect_site(&mut self, pin: PinId) -> Result<()> {
        self.require_member(pin)?;
        self.defect_sites.insert(pin);
        Ok(())
    }

    fn require_member(&self, pin: PinId) -> Result<()> {
        if self.members.contains(&pin) {
            return Ok(());
        }
        Err(CircuitError::NotInCircuit(self.pins[pin.0].name.clone(), self.name.clone()).into())
    }

    /// Pins driving `pin`, queried on first use.
    ///
    /// Primary inputs have no drivers. An input pin with several drivers is
    /// rejected.
    pub fn fanin<N: Netlist + ?Sized>(&mut self, nl: &mut N, pin: PinId) -> Result<Vec<PinId>> {
        if let Some(fanin) = &self.pins[pin.0].fanin {
            return Ok(fanin.clone());
        }
        let name = self.pins[pin.0].name.clone();
        let mut drivers = Vec::new();
        for driver in nl.fanin(&name)? {
            let id = self.resolve_pin(nl, &driver)?;
            if !drivers.contains(&id) {
                drivers.push(id);
            }
        }
        if self.pins[pin.0].direction == Direction::Input && drivers.len() > 1 {
            return Err(CircuitError::MultipleFanin {
                pin: name,
                count: drivers.len(),
            }
            .into());
        }
        self.pins[pin.0].fanin = Some(drivers.clone());
        Ok(drivers)
    }

    /// Pins driven by `pin`, queried on first use. Primary outputs drive nothing.
    pub fn fanout<N: Netlist + ?Sized>(&mut self, nl: &mut N, pin: PinId) -> Result<Vec<PinId>> {
        if let Some(fanout) = &self.pins[pin.0].fanout {
            return Ok(fanout.clone());
        }
        let name = self.pins[pin.0].name.clone();
        let mut loads = Vec::new();
        for load in nl.fanout(&name)? {
            let id = self.resolve_pin(nl, &load)?;
            if !loads.contains(&id) {
                loads.push(id);
            }
        }
        self.pins[pin.0].fanout = Some(loads.clone());
        Ok(loads)
    }

    /// Query drivers of every member pin that is not a circuit input, so the
    /// graph views can be built without the tool.
    #[instrument(skip_all, fields(circuit = %self.name))]
    pub fn load_connectivity<N: Netlist + ?Sized>(&mut self, nl: &mut N) -> Result<()> {
        let pending: Vec<PinId> = self
            .members
            .difference(&self.inputs)
            .copied()
            .filter(|pin| self.pins[pin.0].fanin.is_none())
            .collect();
        debug!(pending = pending.len(), "loading fanin");
        for pin in pending {
            self.fanin(nl, pin)?;
        }
        Ok(())
    }

    /// All input-to-output pin paths, computed on first use.
    pub fn pinpaths(&mut self) -> Result<&[PinPath]> {
        if self.pinpaths.is_none() {
            let paths = all_pin_paths(self)?;
            debug!(circuit = %self.name, paths = paths.len(), "enumerated pin paths");
            self.pinpaths = Some(paths);
        }
        Ok(self.pinpaths.as_deref().unwrap_or_default())
    }

    /// Pin paths starting at `from`, ending at `to`, and passing through
    /// every pin in `through`. Unset filters match everything.
    pub fn get_pinpaths(
        &mut self,
        from: Option<PinId>,
        to: Option<PinId>,
        through: &[PinId],
    ) -> Result<Vec<&PinPath>> {
        Ok(self
            .pinpaths()?
            .iter()
            .filter(|path| from.is_none_or(|pin| path.first() == Some(pin)))
            .filter(|path| to.is_none_or(|pin| path.last() == Some(pin)))
            .filter(|path| through.iter().all(|pin| path.contains(*pin)))
            .collect())
    }

    /// Pin paths already enumerated, if any.
    pub fn cached_pinpaths(&self) -> Option<&[PinPath]> {
        self.pinpaths.as_deref()
    }

    pub fn pin(&self, id: PinId) -> &Pin {
        &self.pins[id.0]
    }

    pub fn gate(&self, id: GateId) -> &Gate {
        &self.gates[id.0]
    }

    pub fn celltype(&self, id: CellTypeId) -> &CellType {
        &self.celltypes[id.0]
    }

    /// Id of a pin already in the store.
    pub fn find_pin(&self, name: &str) -> Option<PinId> {
        self.pin_index.get(name).copied()
    }

    /// Id of a gate already in the store.
    pub fn find_gate(&self, name: &str) -> Option<GateId> {
        self.gate_index.get(name).copied()
    }

    /// Member pins in discovery order.
    pub fn pins(&self) -> impl Iterator<Item = PinId> + '_ {
        self.members.iter().copied()
    }

    pub fn pin_count(&self) -> usize {
        self.members.len()
    }

    pub fn gates(&self) -> impl Iterator<Item = GateId> + '_ {
        self.member_gates.iter().copied()
    }

    pub fn celltypes(&self) -> impl Iterator<Item = CellTypeId> + '_ {
        self.member_celltypes.iter().copied()
    }

    pub fn inputs(&self) -> &BTreeSet<PinId> {
        &self.inputs
    }

    pub fn outputs(&self) -> &BTreeSet<PinId> {
        &self.outputs
    }

    pub fn defect_sites(&self) -> &BTreeSet<PinId> {
        &self.defect_sites
    }

    pub fn is_member(&self, pin: PinId) -> bool {
        self.members.contains(&pin)
    }

    pub fn is_input(&self, pin: PinId) -> bool {
        self.inputs.contains(&pin)
    }

    pub fn is_output(&self, pin: PinId) -> bool {
        self.outputs.contains(&pin)
    }

    pub fn is_defect_site(&self, pin: PinId) -> bool {
        self.defect_sites.contains(&pin)
    }

    /// Cell type name of the gate owning `pin`; `PI`/`PO` for ports.
    pub fn celltype_label(&self, pin: PinId) -> &str {
        let pin = &self.pins[pin.0];
        match (pin.kind, pin.gate) {
            (PinKind::PrimaryInput, _) => "PI",
            (PinKind::PrimaryOutput, _) => "PO",
            (PinKind::Gate, Some(gate)) => self.gates[gate.0]
                .celltype
                .map_or("?", |celltype| self.celltypes[celltype.0].name.as_str()),
            (PinKind::Gate, None) => "?",
        }
    }

    /// Name of the node representing `pin` in the gate graph: its gate for
    /// gate pins, the pin itself for ports.
    pub fn gate_key(&self, pin: PinId) -> &str {
        let pin = &self.pins[pin.0];
        match pin.gate {
            Some(gate) => &self.gates[gate.0].name,
            None => &pin.name,
        }
    }

    fn insert_pin(&mut self, name: &str, kind: PinKind, direction: Direction) -> PinId {
        let id = PinId(self.pins.len());
        let gate = (kind == PinKind::Gate).then(|| {
            let gate = self.intern_gate(gate_name_of(name));
            self.gates[gate.0].attach(id, direction);
            gate
        });
        self.pins.push(Pin {
            name: name.to_string(),
            kind,
            direction,
            gate,
            fanin: (kind == PinKind::PrimaryInput).then(Vec::new),
            fanout: (kind == PinKind::PrimaryOutput).then(Vec::new),
        });
        self.pin_index.insert(name.to_string(), id);
        id
    }

    fn intern_gate(&mut self, name: &str) -> GateId {
        if let Some(&id) = self.gate_index.get(name) {
            return id;
        }
        let id = GateId(self.gates.len());
        self.gates.push(Gate::new(name.to_string()));
        self.gate_index.insert(name.to_string(), id);
        id
    }

    fn intern_celltype(&mut self, name: &str) -> CellTypeId {
        if let Some(&id) = self.celltype_index.get(name) {
            return id;
        }
        let id = CellTypeId(self.celltypes.len());
        self.celltypes.push(CellType::new(name.to_string()));
        self.celltype_index.insert(name.to_string(), id);
        id
    }

    /// Re-create a member pin from saved state, without querying the tool.
    pub(crate) fn restore_pin(
        &mut self,
        name: &str,
        kind: PinKind,
        direction: Direction,
        celltype: Option<&str>,
    ) -> PinId {
        let id = self.insert_pin(name, kind, direction);
        self.members.insert(id);
        if let Some(gate) = self.pins[id.0].gate {
            self.member_gates.insert(gate);
            if let Some(celltype) = celltype {
                let celltype = self.intern_celltype(celltype);
                self.gates[gate.0].celltype = Some(celltype);
                self.member_celltypes.insert(celltype);
            }
        }
        id
    }

    pub(crate) fn restore_fanin(&mut self, pin: PinId, fanin: Vec<PinId>) {
        self.pins[pin.0].fanin = Some(fanin);
    }

    pub(crate) fn restore_pinpaths(&mut self, paths: Vec<PinPath>) {
        self.pinpaths = Some(paths);
    }
}
