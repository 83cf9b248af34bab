// Copyright (c) 2021 Thomas J. Otterson
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use std::collections::HashSet;

use log::debug;

use crate::components::chip::{Chip, ChipKind, ChipRef};
use crate::components::pin::{Mode, Pin};
use crate::library::{BuildError, ChipDescription, Library};
use crate::sim::rng::Pcg32;

/// Builds the root chip of a circuit from its description.
pub fn build_root(
    desc: &ChipDescription,
    lib: &Library,
    rng: &mut Pcg32,
) -> Result<ChipRef, BuildError> {
    build(desc, lib, 0, "", None, rng)
}

/// Builds one chip: sub-chips first, then the chip itself, then its wires.
///
/// Internal memory is allocated by kind. Dev-RAM cells are filled with random words
/// from the simulator's generator, so a seeded simulator builds reproducible contents.
/// Persistent data is copied verbatim and must match the kind's expected length
/// exactly. Wires whose endpoints don't resolve are skipped; the description may have
/// been edited out from under a referencing composite.
pub fn build(
    desc: &ChipDescription,
    lib: &Library,
    id: i32,
    label: &str,
    data: Option<&[u32]>,
    rng: &mut Pcg32,
) -> Result<ChipRef, BuildError> {
    let mut seen = HashSet::new();
    for pin in desc.inputs.iter().chain(desc.outputs.iter()) {
        if !seen.insert(pin.id) {
            return Err(BuildError::DuplicatePin(desc.name.clone(), pin.id));
        }
    }
    let mut seen = HashSet::new();
    for sub in desc.subchips.iter() {
        if !seen.insert(sub.id) {
            return Err(BuildError::DuplicateSubChip(desc.name.clone(), sub.id));
        }
    }

    let mut subchips = Vec::with_capacity(desc.subchips.len());
    for sub in desc.subchips.iter() {
        let sub_desc = lib
            .get(&sub.type_name)
            .ok_or_else(|| BuildError::ChipNotFound(sub.type_name.clone()))?;
        let label = sub.label.as_deref().unwrap_or("");
        subchips.push(build(&sub_desc, lib, sub.id, label, sub.data.as_deref(), rng)?);
    }

    let chip = Chip::new(desc.kind, id, label);
    for pin in desc.inputs.iter() {
        Chip::adopt_input(&chip, Pin::new(pin.id, &pin.name, pin.bits, Mode::Input));
    }
    for pin in desc.outputs.iter() {
        Chip::adopt_output(&chip, Pin::new(pin.id, &pin.name, pin.bits, Mode::Output));
    }
    chip.borrow_mut().set_memory(memory_for(desc, data, rng)?);
    for sub in subchips {
        Chip::add_subchip(&chip, sub);
    }
    for wire in desc.wires.iter() {
        Chip::add_wire(&chip, &wire.source, &wire.target);
    }
    debug!("built {} chip {} ({:?})", desc.name, id, desc.kind);
    Ok(chip)
}

fn memory_for(
    desc: &ChipDescription,
    data: Option<&[u32]>,
    rng: &mut Pcg32,
) -> Result<Vec<u32>, BuildError> {
    let kind = desc.kind;
    match kind.data_words() {
        Some(expected) => {
            let data = data.unwrap_or(&[]);
            if data.len() != expected {
                return Err(BuildError::DataLength(
                    desc.name.clone(),
                    expected,
                    data.len(),
                ));
            }
            match kind {
                ChipKind::Rom256x16 => Ok(data.to_vec()),
                // Duration word, countdown, previous-input latch.
                ChipKind::Pulse => Ok(vec![data[0], 0, 0]),
                ChipKind::Key => Ok(vec![data[0]]),
                _ => unreachable!("no data layout for {:?}", kind),
            }
        }
        None => {
            if let Some(data) = data {
                if !data.is_empty() {
                    return Err(BuildError::DataLength(desc.name.clone(), 0, data.len()));
                }
            }
            if kind == ChipKind::DevRam8 {
                let mut memory: Vec<u32> = (0..256).map(|_| rng.next()).collect();
                memory.push(0);
                Ok(memory)
            } else {
                Ok(vec![0; kind.memory_words()])
            }
        }
    }
}
