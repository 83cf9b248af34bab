// Copyright (c) 2021 Thomas J. Otterson
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

//! The deterministic scheduling strategy.
//!
//! The circuit is flattened to its primitive chips (custom containers are
//! transparent here) and Kahn's algorithm orders them along the dependency edges the
//! wires induce, walking through container dev pins to find the primitive on the far
//! side. Chips caught in feedback loops can't be ordered; they are appended after the
//! sorted prefix and settle over successive frames instead. The order is computed
//! once and reused every frame until a modification invalidates it.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use log::debug;

use crate::components::chip::{Chip, ChipRef};
use crate::components::pin::Pin;
use crate::sim::{reorder, SimCtx};

/// Collects every primitive chip in the tree, walking through custom containers. A
/// primitive root is its own (single-element) flattening.
pub fn flatten(root: &ChipRef) -> Vec<ChipRef> {
    let mut primitives = Vec::new();
    if root.borrow().kind().is_custom() {
        collect(root, &mut primitives);
    } else {
        primitives.push(clone_ref!(root));
    }
    primitives
}

fn collect(chip: &ChipRef, out: &mut Vec<ChipRef>) {
    let subs = chip.borrow().subchips();
    for sub in subs {
        if sub.borrow().kind().is_custom() {
            collect(&sub, out);
        } else {
            out.push(sub);
        }
    }
}

/// Computes the evaluation order: a topological sort of the primitive dependency
/// graph, with the members of feedback loops following the sorted prefix.
pub fn order(root: &ChipRef) -> Vec<ChipRef> {
    let primitives = flatten(root);
    let index: HashMap<*const RefCell<Chip>, usize> = primitives
        .iter()
        .enumerate()
        .map(|(i, chip)| (Rc::as_ptr(chip), i))
        .collect();

    let mut edges: HashSet<(usize, usize)> = HashSet::new();
    for (i, primitive) in primitives.iter().enumerate() {
        let outputs = primitive.borrow().outputs();
        for output in outputs {
            // Follow the fan-out through container pins until primitives appear.
            let mut stack = output.borrow().targets();
            let mut seen: HashSet<*const RefCell<Pin>> = HashSet::new();
            while let Some(pin) = stack.pop() {
                if !seen.insert(Rc::as_ptr(&pin)) {
                    continue;
                }
                match pin.borrow().chip() {
                    Some(owner) if !owner.borrow().kind().is_custom() => {
                        if let Some(&j) = index.get(&Rc::as_ptr(&owner)) {
                            edges.insert((i, j));
                        }
                    }
                    _ => stack.extend(pin.borrow().targets()),
                }
            }
        }
    }

    let sorted = kahn(primitives.len(), &edges);
    debug!(
        "ordered {} primitives over {} edges",
        primitives.len(),
        edges.len()
    );
    sorted
        .into_iter()
        .map(|i| clone_ref!(primitives[i]))
        .collect()
}

fn kahn(count: usize, edges: &HashSet<(usize, usize)>) -> Vec<usize> {
    let mut adjacency = vec![Vec::new(); count];
    let mut indegree = vec![0usize; count];
    for &(a, b) in edges.iter() {
        adjacency[a].push(b);
        indegree[b] += 1;
    }
    let mut queue: VecDeque<usize> = (0..count).filter(|&i| indegree[i] == 0).collect();
    let mut sorted = Vec::with_capacity(count);
    let mut placed = vec![false; count];
    while let Some(i) = queue.pop_front() {
        placed[i] = true;
        sorted.push(i);
        for &j in adjacency[i].iter() {
            indegree[j] -= 1;
            if indegree[j] == 0 {
                queue.push_back(j);
            }
        }
    }
    for i in 0..count {
        if !placed[i] {
            sorted.push(i);
        }
    }
    sorted
}

/// Runs one frame: container pins cascade through the hierarchy first (inputs
/// downward so every sub-chip input pin holds its frame-local value, outputs onward
/// so inner results captured last frame reach their outer consumers), then each
/// primitive steps in the fixed order. A value therefore spends one frame per
/// container boundary it crosses, and a circuit settles over a handful of frames
/// rather than within one; the fixed order makes the settling deterministic.
pub fn frame(root: &ChipRef, order: &[ChipRef], ctx: &SimCtx) {
    propagate_containers(root, ctx);
    for primitive in order.iter() {
        reorder::step(primitive, ctx, false);
    }
}

fn propagate_containers(chip: &ChipRef, ctx: &SimCtx) {
    Chip::propagate_inputs(chip, ctx);
    Chip::propagate_outputs(chip, ctx);
    let subs = chip.borrow().subchips();
    for sub in subs {
        if sub.borrow().kind().is_custom() {
            propagate_containers(&sub, ctx);
        }
    }
}
