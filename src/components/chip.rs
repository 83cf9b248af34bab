// Copyright (c) 2021 Thomas J. Otterson
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use std::{
    cell::RefCell,
    fmt::{Debug, Error, Formatter},
    rc::Rc,
};

use log::debug;

use crate::components::pin::{Mode, Pin, PinRef};
use crate::library::{PinAddress, PinDescription, HOST};
use crate::sim::SimCtx;

/// A convenience alias for a shared internally-mutable reference to a Chip.
pub type ChipRef = Rc<RefCell<Chip>>;

/// The kind of logic a chip performs. Every kind except `Custom` has a native
/// evaluator in the `process` module; `Custom` chips are containers whose
/// behavior comes entirely from their sub-chip graph.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChipKind {
    Nand,
    TriState,
    Clock,
    Pulse,
    Key,
    Bus1,
    Bus4,
    Bus8,
    Terminus1,
    Terminus4,
    Terminus8,
    Split4To1,
    Split8To4,
    Split8To1,
    Merge1To4,
    Merge1To8,
    Merge4To8,
    Rom256x16,
    DevRam8,
    DisplayRgb,
    DisplayDot,
    SevenSegment,
    Led,
    Buzzer,
    Custom,
}

impl ChipKind {
    /// Determines whether this is a composite container rather than a primitive.
    pub fn is_custom(self) -> bool {
        self == ChipKind::Custom
    }

    /// Determines whether this is a bus-origin kind. Bus origins are skipped when the
    /// scheduler picks a random sub-chip to break a cycle and when adjacent pairs are
    /// considered for a dynamic swap; bus termini are not.
    pub fn is_bus_origin(self) -> bool {
        matches!(self, ChipKind::Bus1 | ChipKind::Bus4 | ChipKind::Bus8)
    }

    /// The number of internal-memory words a chip of this kind owns.
    ///
    /// Displays hold a 256-word front buffer, a 256-word back buffer, and a clock-edge
    /// latch. Dev-RAM holds 256 cells and a latch. ROM holds one word per address. Pulse
    /// holds its duration, the running countdown, and the previous-input latch. Key holds
    /// the key code it is bound to.
    pub fn memory_words(self) -> usize {
        match self {
            ChipKind::DisplayRgb | ChipKind::DisplayDot => 513,
            ChipKind::DevRam8 => 257,
            ChipKind::Rom256x16 => 256,
            ChipKind::Pulse => 3,
            ChipKind::Key => 1,
            _ => 0,
        }
    }

    /// The exact number of persistent data words a description must supply for this
    /// kind, or `None` if the kind takes no data.
    pub fn data_words(self) -> Option<usize> {
        match self {
            ChipKind::Rom256x16 => Some(256),
            ChipKind::Pulse => Some(1),
            ChipKind::Key => Some(1),
            _ => None,
        }
    }

    /// The library name of this kind.
    pub fn type_name(self) -> &'static str {
        match self {
            ChipKind::Nand => "NAND",
            ChipKind::TriState => "TRI-STATE BUFFER",
            ChipKind::Clock => "CLOCK",
            ChipKind::Pulse => "PULSE",
            ChipKind::Key => "KEY",
            ChipKind::Bus1 => "BUS-1",
            ChipKind::Bus4 => "BUS-4",
            ChipKind::Bus8 => "BUS-8",
            ChipKind::Terminus1 => "BUS-TERMINUS-1",
            ChipKind::Terminus4 => "BUS-TERMINUS-4",
            ChipKind::Terminus8 => "BUS-TERMINUS-8",
            ChipKind::Split4To1 => "SPLIT-4-1",
            ChipKind::Split8To4 => "SPLIT-8-4",
            ChipKind::Split8To1 => "SPLIT-8-1",
            ChipKind::Merge1To4 => "MERGE-1-4",
            ChipKind::Merge1To8 => "MERGE-1-8",
            ChipKind::Merge4To8 => "MERGE-4-8",
            ChipKind::Rom256x16 => "ROM-256x16",
            ChipKind::DevRam8 => "DEV-RAM-8",
            ChipKind::DisplayRgb => "DISPLAY-RGB",
            ChipKind::DisplayDot => "DISPLAY-DOT",
            ChipKind::SevenSegment => "7-SEGMENT",
            ChipKind::Led => "LED",
            ChipKind::Buzzer => "BUZZER",
            ChipKind::Custom => "CUSTOM",
        }
    }
}

/// One runtime instance in the circuit tree.
///
/// A chip exclusively owns its pins, its sub-chips, and its internal memory; dropping a
/// chip cascades through all of them. The fan-out lists that pins keep are the only
/// structure crossing ownership lines, and the editor operations here keep those lists
/// free of references to anything that has been removed.
///
/// The readiness bookkeeping is two counters: `connected_inputs` counts input pins with
/// at least one upstream source, and `inputs_ready` counts inputs that have heard from
/// every source this frame. The second is bumped by the pins themselves as deliveries
/// complete and cleared whenever the chip's outputs are propagated.
pub struct Chip {
    kind: ChipKind,
    id: i32,
    label: String,
    inputs: Vec<PinRef>,
    outputs: Vec<PinRef>,
    subchips: Vec<ChipRef>,
    memory: Vec<u32>,
    connected_inputs: usize,
    inputs_ready: usize,
}

impl Chip {
    /// Creates a new, empty chip and returns a shared reference to it. Pins, sub-chips,
    /// and memory are attached afterward by the builder or the editor operations.
    pub fn new(kind: ChipKind, id: i32, label: &str) -> ChipRef {
        new_ref!(Chip {
            kind,
            id,
            label: label.to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            subchips: Vec::new(),
            memory: Vec::new(),
            connected_inputs: 0,
            inputs_ready: 0,
        })
    }

    pub fn kind(&self) -> ChipKind {
        self.kind
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Returns a cloned reference to the input pin at positional `index`.
    pub fn input_at(&self, index: usize) -> PinRef {
        clone_ref!(self.inputs[index])
    }

    /// Returns a cloned reference to the output pin at positional `index`.
    pub fn output_at(&self, index: usize) -> PinRef {
        clone_ref!(self.outputs[index])
    }

    /// Returns cloned references to all input pins.
    pub fn inputs(&self) -> Vec<PinRef> {
        self.inputs.iter().map(Rc::clone).collect()
    }

    /// Returns cloned references to all output pins.
    pub fn outputs(&self) -> Vec<PinRef> {
        self.outputs.iter().map(Rc::clone).collect()
    }

    /// Finds one of this chip's own pins by id. Pin ids are unique within the chip
    /// across both directions, so the search order doesn't matter.
    pub fn own_pin(&self, id: i32) -> Option<PinRef> {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .find(|p| p.borrow().id() == id)
            .map(Rc::clone)
    }

    /// Resolves a pin address against this chip: owner id -1 means the chip's own pins,
    /// anything else names a sub-chip.
    pub fn pin_at(&self, addr: &PinAddress) -> Option<PinRef> {
        if addr.chip == HOST {
            self.own_pin(addr.pin)
        } else {
            self.subchip(addr.chip)
                .and_then(|sub| sub.borrow().own_pin(addr.pin))
        }
    }

    pub fn subchip(&self, id: i32) -> Option<ChipRef> {
        self.subchips
            .iter()
            .find(|c| c.borrow().id() == id)
            .map(Rc::clone)
    }

    pub fn subchips(&self) -> Vec<ChipRef> {
        self.subchips.iter().map(Rc::clone).collect()
    }

    pub fn subchip_count(&self) -> usize {
        self.subchips.len()
    }

    pub fn subchip_at(&self, index: usize) -> ChipRef {
        clone_ref!(self.subchips[index])
    }

    pub fn swap_subchips(&mut self, a: usize, b: usize) {
        self.subchips.swap(a, b);
    }

    pub fn memory(&self) -> &[u32] {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut [u32] {
        &mut self.memory
    }

    pub fn set_memory(&mut self, memory: Vec<u32>) {
        self.memory = memory;
    }

    pub fn connected_inputs(&self) -> usize {
        self.connected_inputs
    }

    pub fn inputs_ready(&self) -> usize {
        self.inputs_ready
    }

    /// Called by an input pin when it has heard from every one of its sources this frame.
    pub fn input_ready(&mut self) {
        self.inputs_ready += 1;
    }

    /// Records that one more of this chip's input pins has an upstream source.
    pub fn input_connected(&mut self) {
        self.connected_inputs += 1;
    }

    /// Records that one of this chip's input pins lost its last upstream source.
    pub fn input_disconnected(&mut self) {
        self.connected_inputs = self.connected_inputs.saturating_sub(1);
    }

    pub fn clear_ready(&mut self) {
        self.inputs_ready = 0;
    }

    /// Determines whether every connected input has received all of its declared sources
    /// this frame. A chip with no connected inputs is always ready.
    pub fn is_ready(&self) -> bool {
        self.inputs_ready >= self.connected_inputs
    }

    /// Attaches a pin to this chip as an input and takes ownership of it.
    pub fn adopt_input(chip: &ChipRef, pin: PinRef) {
        pin.borrow_mut().attach(chip);
        chip.borrow_mut().inputs.push(pin);
    }

    /// Attaches a pin to this chip as an output and takes ownership of it.
    pub fn adopt_output(chip: &ChipRef, pin: PinRef) {
        pin.borrow_mut().attach(chip);
        chip.borrow_mut().outputs.push(pin);
    }

    /// Delivers each input pin's state into the chip's internal network (or, for a
    /// primitive, to nothing, since primitive inputs have no fan-out).
    pub fn propagate_inputs(chip: &ChipRef, ctx: &SimCtx) {
        let pins = chip.borrow().inputs();
        for pin in pins {
            Pin::propagate(&pin, ctx);
        }
    }

    /// Delivers each output pin's state to the surrounding network and clears the
    /// inputs-ready counter for the next frame.
    pub fn propagate_outputs(chip: &ChipRef, ctx: &SimCtx) {
        let pins = chip.borrow().outputs();
        chip.borrow_mut().clear_ready();
        for pin in pins {
            Pin::propagate(&pin, ctx);
        }
    }

    /// Adds a pin from a description. A duplicate id is an edit race and is dropped.
    pub fn add_pin(chip: &ChipRef, desc: &PinDescription, input: bool) {
        if chip.borrow().own_pin(desc.id).is_some() {
            debug!("pin {} already exists; dropping add", desc.id);
            return;
        }
        let mode = if input { Mode::Input } else { Mode::Output };
        let pin = Pin::new(desc.id, &desc.name, desc.bits, mode);
        if input {
            Chip::adopt_input(chip, pin);
        } else {
            Chip::adopt_output(chip, pin);
        }
    }

    /// Removes one of this chip's own pins, stripping every reference to it from the
    /// chip's scope and from the parent scope (where the chip's dev pins may be wired),
    /// and releasing its own fan-out. A missing id is an edit race and is dropped.
    pub fn remove_pin(chip: &ChipRef, parent: Option<&ChipRef>, id: i32) {
        let pin = match chip.borrow().own_pin(id) {
            Some(pin) => pin,
            None => {
                debug!("pin {} is gone; dropping remove", id);
                return;
            }
        };
        let was_connected = pin.borrow().input() && pin.borrow().sources() > 0;
        Chip::strip_target(chip, &pin);
        if let Some(parent) = parent {
            Chip::strip_target(parent, &pin);
        }
        Chip::release_targets(&pin);
        let mut c = chip.borrow_mut();
        if was_connected {
            c.connected_inputs = c.connected_inputs.saturating_sub(1);
        }
        c.inputs.retain(|p| !Rc::ptr_eq(p, &pin));
        c.outputs.retain(|p| !Rc::ptr_eq(p, &pin));
    }

    /// Adds an already-built sub-chip. A duplicate id is an edit race and is dropped.
    pub fn add_subchip(chip: &ChipRef, sub: ChipRef) {
        if chip.borrow().subchip(sub.borrow().id()).is_some() {
            debug!("sub-chip {} already exists; dropping add", sub.borrow().id());
            return;
        }
        chip.borrow_mut().subchips.push(sub);
    }

    /// Removes a sub-chip, stripping every reference to its pins from this chip's scope
    /// and detaching its outputs from whatever they drive here. The sub-chip's interior
    /// goes away wholesale with its owner.
    pub fn remove_subchip(chip: &ChipRef, id: i32) {
        let sub = match chip.borrow().subchip(id) {
            Some(sub) => sub,
            None => {
                debug!("sub-chip {} is gone; dropping remove", id);
                return;
            }
        };
        let (ins, outs) = {
            let s = sub.borrow();
            (s.inputs(), s.outputs())
        };
        for pin in ins.iter().chain(outs.iter()) {
            Chip::strip_target(chip, pin);
        }
        for pin in outs.iter() {
            Chip::release_targets(pin);
        }
        chip.borrow_mut().subchips.retain(|c| !Rc::ptr_eq(c, &sub));
    }

    /// Installs a wire: the target joins the source's fan-out, the target's source count
    /// rises, and a sub-chip input gaining its first source bumps that sub-chip's
    /// connected-input count. Endpoints that no longer exist are an edit race and the
    /// wire is dropped.
    pub fn add_wire(chip: &ChipRef, source: &PinAddress, target: &PinAddress) {
        let (s, t) = {
            let c = chip.borrow();
            match (c.pin_at(source), c.pin_at(target)) {
                (Some(s), Some(t)) => (s, t),
                _ => {
                    debug!("wire {:?} -> {:?} has a missing endpoint; dropping", source, target);
                    return;
                }
            }
        };
        if Rc::ptr_eq(&s, &t) {
            debug!("wire {:?} -> {:?} targets its own source; dropping", source, target);
            return;
        }
        s.borrow_mut().add_target(clone_ref!(t));
        let count = t.borrow_mut().add_source();
        if count == 1 && t.borrow().input() {
            if let Some(owner) = t.borrow().chip() {
                if !Rc::ptr_eq(&owner, chip) {
                    owner.borrow_mut().input_connected();
                }
            }
        }
    }

    /// Removes one wire between the addressed pins, undoing everything `add_wire` did.
    pub fn remove_wire(chip: &ChipRef, source: &PinAddress, target: &PinAddress) {
        let (s, t) = {
            let c = chip.borrow();
            match (c.pin_at(source), c.pin_at(target)) {
                (Some(s), Some(t)) => (s, t),
                _ => {
                    debug!("wire {:?} -> {:?} has a missing endpoint; dropping", source, target);
                    return;
                }
            }
        };
        if !s.borrow_mut().remove_target(&t) {
            return;
        }
        let count = t.borrow_mut().remove_source();
        if count == 0 && t.borrow().input() {
            if let Some(owner) = t.borrow().chip() {
                if !Rc::ptr_eq(&owner, chip) {
                    owner.borrow_mut().input_disconnected();
                }
            }
        }
    }

    /// Removes `pin` from the fan-out list of every pin in `scope` (the scope chip's own
    /// pins and all of its sub-chips' pins), once per wire that referenced it.
    fn strip_target(scope: &ChipRef, pin: &PinRef) {
        let mut sources: Vec<PinRef> = Vec::new();
        {
            let c = scope.borrow();
            sources.extend(c.inputs.iter().map(Rc::clone));
            sources.extend(c.outputs.iter().map(Rc::clone));
            for sub in c.subchips.iter() {
                let s = sub.borrow();
                sources.extend(s.inputs.iter().map(Rc::clone));
                sources.extend(s.outputs.iter().map(Rc::clone));
            }
        }
        for source in sources {
            if Rc::ptr_eq(&source, pin) {
                continue;
            }
            while source.borrow_mut().remove_target(pin) {
                pin.borrow_mut().remove_source();
            }
        }
    }

    /// Drops every wire leaving `pin`, fixing the source counts and connected-input
    /// counts of the pins it used to drive.
    fn release_targets(pin: &PinRef) {
        let targets = pin.borrow().targets();
        for t in targets {
            if Rc::ptr_eq(&t, pin) {
                continue;
            }
            let count = t.borrow_mut().remove_source();
            if count == 0 && t.borrow().input() {
                if let Some(owner) = t.borrow().chip() {
                    owner.borrow_mut().input_disconnected();
                }
            }
        }
        pin.borrow_mut().clear_targets();
    }
}

impl Debug for Chip {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        f.debug_struct("Chip")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .field("subchips", &self.subchips.len())
            .field("connected", &self.connected_inputs)
            .finish()
    }
}
