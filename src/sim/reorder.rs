// Copyright (c) 2021 Thomas J. Otterson
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

//! The iterative, stochastic scheduling strategy.
//!
//! This strategy carries no explicit ordering data between frames; the order *is* the
//! left-to-right arrangement of each container's sub-chip array. An order pass
//! (`reorder_step`) services sub-chips ready-first, falling back to a random pick to
//! break cycles, and leaves each array in reverse processing order as it goes. The
//! cheap per-frame pass (`step`) then just walks each array right to left, which
//! replays the discovered order; every hundredth frame it is allowed to nudge stuck
//! neighbors around to vary how races resolve.

use crate::components::chip::{Chip, ChipRef};
use crate::process;
use crate::sim::SimCtx;

/// Advances one chip for the frame.
///
/// A primitive propagates its inputs (a no-op, since primitive inputs drive nothing),
/// evaluates, and propagates its outputs. A custom chip has no evaluator; its "body"
/// is a right-to-left walk of its sub-chips in the order the last order pass left
/// them, recursing into each, and only then do its own outputs propagate; everything
/// inside settles before the container speaks downstream.
///
/// With `dynamic` set, each adjacent pair is considered right to left on the way: if
/// the chip about to be processed is not ready, its left neighbor is not a bus
/// origin, and a coin flip agrees, the two swap and the neighbor is processed in its
/// place.
pub fn step(chip: &ChipRef, ctx: &SimCtx, dynamic: bool) {
    Chip::propagate_inputs(chip, ctx);
    if chip.borrow().kind().is_custom() {
        let count = chip.borrow().subchip_count();
        for i in (0..count).rev() {
            if dynamic && i > 0 && ctx.coin() {
                let (stuck, left_is_bus) = {
                    let c = chip.borrow();
                    (
                        !c.subchip_at(i).borrow().is_ready(),
                        c.subchip_at(i - 1).borrow().kind().is_bus_origin(),
                    )
                };
                if stuck && !left_is_bus {
                    chip.borrow_mut().swap_subchips(i - 1, i);
                }
            }
            let sub = chip.borrow().subchip_at(i);
            step(&sub, ctx, dynamic);
        }
    } else {
        process::process(chip, ctx);
    }
    Chip::propagate_outputs(chip, ctx);
}

/// Advances one container for the frame while discovering a processing order.
///
/// Sub-chips are serviced one at a time: the first ready chip scanning left to right,
/// or, when none is ready (a cycle, or nothing has fed them yet), a uniformly random
/// pick that skips bus origins as long as anything else remains. Each serviced chip
/// swaps to the shrinking tail, so when the pass finishes the array holds the reverse
/// of the processing order and `step`'s right-to-left walk will repeat it.
pub fn reorder_step(chip: &ChipRef, ctx: &SimCtx) {
    Chip::propagate_inputs(chip, ctx);
    let mut remaining = chip.borrow().subchip_count();
    while remaining > 0 {
        let k = next_index(chip, ctx, remaining);
        let sub = chip.borrow().subchip_at(k);
        if sub.borrow().kind().is_custom() {
            reorder_step(&sub, ctx);
        } else {
            step(&sub, ctx, false);
        }
        chip.borrow_mut().swap_subchips(k, remaining - 1);
        remaining -= 1;
    }
    Chip::propagate_outputs(chip, ctx);
}

fn next_index(chip: &ChipRef, ctx: &SimCtx, remaining: usize) -> usize {
    let c = chip.borrow();
    for i in 0..remaining {
        if c.subchip_at(i).borrow().is_ready() {
            return i;
        }
    }
    let mut k = ctx.pick(remaining);
    let any_non_bus = (0..remaining).any(|i| !c.subchip_at(i).borrow().kind().is_bus_origin());
    if any_non_bus {
        while c.subchip_at(k).borrow().kind().is_bus_origin() {
            k = (k + 1) % remaining;
        }
    }
    k
}
