// Copyright (c) 2021 Thomas J. Otterson
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use crate::library::{
    ChipDescription, Library, PinAddress, PinDescription, SubChipDescription, WireDescription,
    HOST,
};
use crate::sim::Simulator;

pub fn wire(source_chip: i32, source_pin: i32, target_chip: i32, target_pin: i32) -> WireDescription {
    WireDescription::new(
        PinAddress::new(source_chip, source_pin),
        PinAddress::new(target_chip, target_pin),
    )
}

/// A composite wrapping one NAND: inputs A and B, output Y.
pub fn nand_root() -> ChipDescription {
    let mut desc = ChipDescription::composite("NAND-RIG");
    desc.inputs.push(PinDescription::new(0, "A", 1));
    desc.inputs.push(PinDescription::new(1, "B", 1));
    desc.outputs.push(PinDescription::new(2, "Y", 1));
    desc.subchips.push(SubChipDescription::new("NAND", 0));
    desc.wires.push(wire(HOST, 0, 0, 0));
    desc.wires.push(wire(HOST, 1, 0, 1));
    desc.wires.push(wire(0, 2, HOST, 2));
    desc
}

/// An inverter: one NAND with both inputs tied to the single dev input.
pub fn not_description() -> ChipDescription {
    let mut desc = ChipDescription::composite("NOT");
    desc.inputs.push(PinDescription::new(0, "IN", 1));
    desc.outputs.push(PinDescription::new(1, "OUT", 1));
    desc.subchips.push(SubChipDescription::new("NAND", 0));
    desc.wires.push(wire(HOST, 0, 0, 0));
    desc.wires.push(wire(HOST, 0, 0, 1));
    desc.wires.push(wire(0, 2, HOST, 1));
    desc
}

/// A chain of `length` inverters built from NANDs with tied inputs.
pub fn not_chain(length: usize) -> ChipDescription {
    let mut desc = ChipDescription::composite("NOT-CHAIN");
    desc.inputs.push(PinDescription::new(0, "IN", 1));
    desc.outputs.push(PinDescription::new(1, "OUT", 1));
    for id in 0..length as i32 {
        desc.subchips.push(SubChipDescription::new("NAND", id));
    }
    desc.wires.push(wire(HOST, 0, 0, 0));
    desc.wires.push(wire(HOST, 0, 0, 1));
    for id in 1..length as i32 {
        desc.wires.push(wire(id - 1, 2, id, 0));
        desc.wires.push(wire(id - 1, 2, id, 1));
    }
    desc.wires.push(wire(length as i32 - 1, 2, HOST, 1));
    desc
}

/// XOR from four NANDs.
pub fn xor_description() -> ChipDescription {
    let mut desc = ChipDescription::composite("XOR");
    desc.inputs.push(PinDescription::new(0, "A", 1));
    desc.inputs.push(PinDescription::new(1, "B", 1));
    desc.outputs.push(PinDescription::new(2, "Y", 1));
    for id in 0..4 {
        desc.subchips.push(SubChipDescription::new("NAND", id));
    }
    desc.wires.push(wire(HOST, 0, 0, 0));
    desc.wires.push(wire(HOST, 1, 0, 1));
    desc.wires.push(wire(HOST, 0, 1, 0));
    desc.wires.push(wire(0, 2, 1, 1));
    desc.wires.push(wire(HOST, 1, 2, 0));
    desc.wires.push(wire(0, 2, 2, 1));
    desc.wires.push(wire(1, 2, 3, 0));
    desc.wires.push(wire(2, 2, 3, 1));
    desc.wires.push(wire(3, 2, HOST, 2));
    desc
}

/// Two tri-state buffers fighting over one consumer: inputs D0, E0, D1, E1 and the
/// shared output.
pub fn tri_bus() -> ChipDescription {
    let mut desc = ChipDescription::composite("PARTY-LINE");
    desc.inputs.push(PinDescription::new(0, "D0", 1));
    desc.inputs.push(PinDescription::new(1, "E0", 1));
    desc.inputs.push(PinDescription::new(2, "D1", 1));
    desc.inputs.push(PinDescription::new(3, "E1", 1));
    desc.outputs.push(PinDescription::new(4, "OUT", 1));
    desc.subchips
        .push(SubChipDescription::new("TRI-STATE BUFFER", 0));
    desc.subchips
        .push(SubChipDescription::new("TRI-STATE BUFFER", 1));
    desc.wires.push(wire(HOST, 0, 0, 0));
    desc.wires.push(wire(HOST, 1, 0, 1));
    desc.wires.push(wire(HOST, 2, 1, 0));
    desc.wires.push(wire(HOST, 3, 1, 1));
    desc.wires.push(wire(0, 2, HOST, 4));
    desc.wires.push(wire(1, 2, HOST, 4));
    desc
}

/// Two NANDs feeding each other (a feedback loop) next to one free NAND.
pub fn looped_pair() -> ChipDescription {
    let mut desc = ChipDescription::composite("LOOPED-PAIR");
    for id in 0..3 {
        desc.subchips.push(SubChipDescription::new("NAND", id));
    }
    desc.wires.push(wire(0, 2, 1, 0));
    desc.wires.push(wire(0, 2, 1, 1));
    desc.wires.push(wire(1, 2, 0, 0));
    desc.wires.push(wire(1, 2, 0, 1));
    desc
}

/// A library holding a NAND-built NOR, plus the description of an SR latch made of
/// two cross-coupled NORs: inputs S and R, outputs Q and Q-bar.
pub fn sr_latch_library() -> (Library, ChipDescription) {
    let mut nor = ChipDescription::composite("NOR");
    nor.inputs.push(PinDescription::new(0, "A", 1));
    nor.inputs.push(PinDescription::new(1, "B", 1));
    nor.outputs.push(PinDescription::new(2, "Y", 1));
    for id in 0..4 {
        nor.subchips.push(SubChipDescription::new("NAND", id));
    }
    // NOT A and NOT B...
    nor.wires.push(wire(HOST, 0, 0, 0));
    nor.wires.push(wire(HOST, 0, 0, 1));
    nor.wires.push(wire(HOST, 1, 1, 0));
    nor.wires.push(wire(HOST, 1, 1, 1));
    // ...NANDed into A OR B...
    nor.wires.push(wire(0, 2, 2, 0));
    nor.wires.push(wire(1, 2, 2, 1));
    // ...inverted into NOR.
    nor.wires.push(wire(2, 2, 3, 0));
    nor.wires.push(wire(2, 2, 3, 1));
    nor.wires.push(wire(3, 2, HOST, 2));

    let mut lib = Library::new();
    lib.add(nor);

    let mut latch = ChipDescription::composite("SR-LATCH");
    latch.inputs.push(PinDescription::new(0, "S", 1));
    latch.inputs.push(PinDescription::new(1, "R", 1));
    latch.outputs.push(PinDescription::new(2, "Q", 1));
    latch.outputs.push(PinDescription::new(3, "QB", 1));
    latch.subchips.push(SubChipDescription::new("NOR", 0));
    latch.subchips.push(SubChipDescription::new("NOR", 1));
    // Q = NOR(R, QB); QB = NOR(S, Q).
    latch.wires.push(wire(HOST, 1, 0, 0));
    latch.wires.push(wire(1, 2, 0, 1));
    latch.wires.push(wire(HOST, 0, 1, 0));
    latch.wires.push(wire(0, 2, 1, 1));
    latch.wires.push(wire(0, 2, HOST, 2));
    latch.wires.push(wire(1, 2, HOST, 3));
    (lib, latch)
}

/// Steps frames until the predicate holds or the cap runs out. The cap is the
/// convergence deadline; the kernel itself has none.
pub fn settle(sim: &mut Simulator, max_frames: usize, pred: impl Fn(&Simulator) -> bool) -> bool {
    for _ in 0..max_frames {
        sim.step_frame();
        if pred(sim) {
            return true;
        }
    }
    false
}
