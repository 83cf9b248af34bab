// Copyright (c) 2021 Thomas J. Otterson
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

pub mod builder;

use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

use crate::components::chip::ChipKind;

/// The owner-chip id that addresses the host chip's own pins.
pub const HOST: i32 = -1;

/// The address of one pin relative to a host chip: the id of the owning chip among the
/// host's sub-chips (or `HOST` for the host itself) and the pin's id within that chip.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PinAddress {
    pub chip: i32,
    pub pin: i32,
}

impl PinAddress {
    pub fn new(chip: i32, pin: i32) -> PinAddress {
        PinAddress { chip, pin }
    }

    /// Addresses a pin on the host chip itself.
    pub fn host(pin: i32) -> PinAddress {
        PinAddress { chip: HOST, pin }
    }
}

/// Describes one pin of a chip.
#[derive(Clone, Debug)]
pub struct PinDescription {
    pub id: i32,
    pub name: String,
    /// Signal width; 1, 4, or 8.
    pub bits: u8,
}

impl PinDescription {
    pub fn new(id: i32, name: &str, bits: u8) -> PinDescription {
        PinDescription {
            id,
            name: name.to_string(),
            bits,
        }
    }
}

/// Describes one sub-chip instance inside a composite chip: the library name of its
/// type, its id among its siblings, an optional label, and optional persistent data
/// (ROM contents, pulse duration, key binding).
#[derive(Clone, Debug)]
pub struct SubChipDescription {
    pub type_name: String,
    pub id: i32,
    pub label: Option<String>,
    pub data: Option<Vec<u32>>,
}

impl SubChipDescription {
    pub fn new(type_name: &str, id: i32) -> SubChipDescription {
        SubChipDescription {
            type_name: type_name.to_string(),
            id,
            label: None,
            data: None,
        }
    }

    pub fn with_data(type_name: &str, id: i32, data: Vec<u32>) -> SubChipDescription {
        SubChipDescription {
            type_name: type_name.to_string(),
            id,
            label: None,
            data: Some(data),
        }
    }
}

/// Describes one wire from a source pin to a target pin, both addressed relative to the
/// chip the wire belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WireDescription {
    pub source: PinAddress,
    pub target: PinAddress,
}

impl WireDescription {
    pub fn new(source: PinAddress, target: PinAddress) -> WireDescription {
        WireDescription { source, target }
    }
}

/// Describes a chip: its library name, kind, pins, sub-chips, and wires. Primitive
/// descriptions have no sub-chips or wires; composite descriptions have kind `Custom`.
#[derive(Clone, Debug)]
pub struct ChipDescription {
    pub name: String,
    pub kind: ChipKind,
    pub inputs: Vec<PinDescription>,
    pub outputs: Vec<PinDescription>,
    pub subchips: Vec<SubChipDescription>,
    pub wires: Vec<WireDescription>,
}

impl ChipDescription {
    /// Creates an empty composite description with the given name.
    pub fn composite(name: &str) -> ChipDescription {
        ChipDescription {
            name: name.to_string(),
            kind: ChipKind::Custom,
            inputs: Vec::new(),
            outputs: Vec::new(),
            subchips: Vec::new(),
            wires: Vec::new(),
        }
    }
}

/// An error produced while constructing a chip tree from descriptions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    /// A sub-chip references a name the library doesn't know.
    #[error("chip {0:?} is not in the library")]
    ChipNotFound(String),
    /// Two pins of one chip share an id.
    #[error("duplicate pin {1} in chip {0:?}")]
    DuplicatePin(String, i32),
    /// Two sub-chips of one chip share an id.
    #[error("duplicate sub-chip {1} in chip {0:?}")]
    DuplicateSubChip(String, i32),
    /// Persistent data was the wrong length for the chip kind.
    #[error("internal data for chip {0:?} must be {1} words, got {2}")]
    DataLength(String, usize, usize),
}

/// The name→description library used to resolve sub-chip types during a build. Names
/// are compared case-insensitively. A fresh library already contains a description for
/// every primitive kind under its `type_name`.
pub struct Library {
    chips: HashMap<String, Rc<ChipDescription>>,
}

impl Library {
    pub fn new() -> Library {
        let mut lib = Library {
            chips: HashMap::new(),
        };
        for kind in BUILTINS.iter() {
            lib.add(builtin(*kind));
        }
        lib
    }

    /// Adds or replaces a description under its own name.
    pub fn add(&mut self, desc: ChipDescription) {
        self.chips
            .insert(desc.name.to_lowercase(), Rc::new(desc));
    }

    pub fn get(&self, name: &str) -> Option<Rc<ChipDescription>> {
        self.chips.get(&name.to_lowercase()).map(Rc::clone)
    }
}

impl Default for Library {
    fn default() -> Library {
        Library::new()
    }
}

const BUILTINS: [ChipKind; 24] = [
    ChipKind::Nand,
    ChipKind::TriState,
    ChipKind::Clock,
    ChipKind::Pulse,
    ChipKind::Key,
    ChipKind::Bus1,
    ChipKind::Bus4,
    ChipKind::Bus8,
    ChipKind::Terminus1,
    ChipKind::Terminus4,
    ChipKind::Terminus8,
    ChipKind::Split4To1,
    ChipKind::Split8To4,
    ChipKind::Split8To1,
    ChipKind::Merge1To4,
    ChipKind::Merge1To8,
    ChipKind::Merge4To8,
    ChipKind::Rom256x16,
    ChipKind::DevRam8,
    ChipKind::DisplayRgb,
    ChipKind::DisplayDot,
    ChipKind::SevenSegment,
    ChipKind::Led,
    ChipKind::Buzzer,
];

/// Builds the built-in description for a primitive kind. Pin ids run sequentially
/// through the inputs and then the outputs, matching the positional order the
/// evaluators read them in.
fn builtin(kind: ChipKind) -> ChipDescription {
    let (ins, outs): (&[(&str, u8)], &[(&str, u8)]) = match kind {
        ChipKind::Nand => (&[("A", 1), ("B", 1)], &[("OUT", 1)]),
        ChipKind::TriState => (&[("DATA", 1), ("ENABLE", 1)], &[("OUT", 1)]),
        ChipKind::Clock => (&[], &[("CLK", 1)]),
        ChipKind::Pulse => (&[("IN", 1)], &[("OUT", 1)]),
        ChipKind::Key => (&[], &[("OUT", 1)]),
        ChipKind::Bus1 | ChipKind::Terminus1 => (&[("IN", 1)], &[("OUT", 1)]),
        ChipKind::Bus4 | ChipKind::Terminus4 => (&[("IN", 4)], &[("OUT", 4)]),
        ChipKind::Bus8 | ChipKind::Terminus8 => (&[("IN", 8)], &[("OUT", 8)]),
        ChipKind::Split4To1 => (
            &[("IN", 4)],
            &[("OUT0", 1), ("OUT1", 1), ("OUT2", 1), ("OUT3", 1)],
        ),
        ChipKind::Split8To4 => (&[("IN", 8)], &[("HI", 4), ("LO", 4)]),
        ChipKind::Split8To1 => (
            &[("IN", 8)],
            &[
                ("OUT0", 1),
                ("OUT1", 1),
                ("OUT2", 1),
                ("OUT3", 1),
                ("OUT4", 1),
                ("OUT5", 1),
                ("OUT6", 1),
                ("OUT7", 1),
            ],
        ),
        ChipKind::Merge1To4 => (
            &[("IN0", 1), ("IN1", 1), ("IN2", 1), ("IN3", 1)],
            &[("OUT", 4)],
        ),
        ChipKind::Merge1To8 => (
            &[
                ("IN0", 1),
                ("IN1", 1),
                ("IN2", 1),
                ("IN3", 1),
                ("IN4", 1),
                ("IN5", 1),
                ("IN6", 1),
                ("IN7", 1),
            ],
            &[("OUT", 8)],
        ),
        ChipKind::Merge4To8 => (&[("HI", 4), ("LO", 4)], &[("OUT", 8)]),
        ChipKind::Rom256x16 => (&[("ADDR", 8)], &[("HI", 8), ("LO", 8)]),
        ChipKind::DevRam8 => (
            &[
                ("ADDR", 8),
                ("DATA", 8),
                ("WRITE", 1),
                ("RESET", 1),
                ("CLK", 1),
            ],
            &[("OUT", 8)],
        ),
        ChipKind::DisplayRgb => (
            &[
                ("ADDR", 8),
                ("R", 4),
                ("G", 4),
                ("B", 4),
                ("RESET", 1),
                ("WRITE", 1),
                ("REFRESH", 1),
                ("CLK", 1),
            ],
            &[("R", 4), ("G", 4), ("B", 4)],
        ),
        ChipKind::DisplayDot => (
            &[
                ("ADDR", 8),
                ("PIXEL", 1),
                ("RESET", 1),
                ("WRITE", 1),
                ("REFRESH", 1),
                ("CLK", 1),
            ],
            &[("PIXEL", 1)],
        ),
        ChipKind::SevenSegment => (
            &[
                ("A", 1),
                ("B", 1),
                ("C", 1),
                ("D", 1),
                ("E", 1),
                ("F", 1),
                ("G", 1),
            ],
            &[],
        ),
        ChipKind::Led => (&[("IN", 1)], &[]),
        ChipKind::Buzzer => (&[("FREQ", 4), ("VOLUME", 4)], &[]),
        ChipKind::Custom => (&[], &[]),
    };
    let mut id = 0;
    let mut number = |defs: &[(&str, u8)]| -> Vec<PinDescription> {
        defs.iter()
            .map(|(name, bits)| {
                let desc = PinDescription::new(id, name, *bits);
                id += 1;
                desc
            })
            .collect()
    };
    let inputs = number(ins);
    let outputs = number(outs);
    ChipDescription {
        name: kind.type_name().to_string(),
        kind,
        inputs,
        outputs,
        subchips: Vec::new(),
        wires: Vec::new(),
    }
}
