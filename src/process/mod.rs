// Copyright (c) 2021 Thomas J. Otterson
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

//! The native evaluators for primitive chips.
//!
//! Each evaluator is a deterministic function of its chip's input pin states and (for
//! the chips that have it) internal memory. Evaluators write output pin states and
//! nothing else; delivery to downstream pins is the scheduler's job, and none of them
//! ever touches the scheduler's random number generator. Clocked chips share one edge
//! convention: the final word of internal memory latches the previous frame's clock
//! bit, a rising edge is a high clock over a clear latch, and the latch is rewritten
//! every evaluation whether or not an edge fired.

use bit_field::BitField;

use crate::components::chip::{ChipKind, ChipRef};
use crate::sim::SimCtx;
use crate::state;

/// Runs the evaluator for a primitive chip. Every declared kind has an arm here; a
/// new kind without one fails to compile rather than failing at runtime. `Custom` has
/// no logic of its own and is walked by the scheduler; reaching its arm is a scheduler
/// bug and halts the worker.
pub fn process(chip: &ChipRef, ctx: &SimCtx) {
    let kind = chip.borrow().kind();
    match kind {
        ChipKind::Nand => nand(chip),
        ChipKind::TriState => tri_state(chip),
        ChipKind::Clock => clock(chip, ctx),
        ChipKind::Pulse => pulse(chip),
        ChipKind::Key => key(chip, ctx),
        ChipKind::Bus1
        | ChipKind::Bus4
        | ChipKind::Bus8
        | ChipKind::Terminus1
        | ChipKind::Terminus4
        | ChipKind::Terminus8 => copy(chip),
        ChipKind::Split4To1 => split_4_1(chip),
        ChipKind::Split8To4 => split_8_4(chip),
        ChipKind::Split8To1 => split_8_1(chip),
        ChipKind::Merge1To4 => merge_1_4(chip),
        ChipKind::Merge1To8 => merge_1_8(chip),
        ChipKind::Merge4To8 => merge_4_8(chip),
        ChipKind::Rom256x16 => rom(chip),
        ChipKind::DevRam8 => dev_ram(chip),
        ChipKind::DisplayRgb => display_rgb(chip),
        ChipKind::DisplayDot => display_dot(chip),
        // Visual chips compute nothing; a renderer reads their input pins directly.
        ChipKind::SevenSegment | ChipKind::Led => (),
        ChipKind::Buzzer => buzzer(chip, ctx),
        ChipKind::Custom => unreachable!("custom chips are containers and are never evaluated"),
    }
}

fn input_state(chip: &ChipRef, index: usize) -> u32 {
    let pin = chip.borrow().input_at(index);
    let state = pin.borrow().state();
    state
}

fn write_output(chip: &ChipRef, index: usize, state: u32) {
    let pin = chip.borrow().output_at(index);
    pin.borrow_mut().write(state);
}

/// out = NOT (A AND B), bit 0 only; the output is always driven.
fn nand(chip: &ChipRef) {
    let a = state::first_bit_high(input_state(chip, 0));
    let b = state::first_bit_high(input_state(chip, 1));
    write_output(chip, 0, state::single_bit(!(a && b)));
}

/// Passes DATA through while ENABLE is high; otherwise the output is cut off, its
/// flags raised over whatever value bits it last drove.
fn tri_state(chip: &ChipRef) {
    let data = input_state(chip, 0);
    let enable = input_state(chip, 1);
    let pin = chip.borrow().output_at(0);
    if state::first_bit_high(enable) {
        pin.borrow_mut().write(data);
    } else {
        let cut = state::all_disconnected(pin.borrow().state());
        pin.borrow_mut().write(cut);
    }
}

/// Bus origins and termini repeat their input verbatim, flags and all.
fn copy(chip: &ChipRef) {
    write_output(chip, 0, input_state(chip, 0));
}

/// A square wave from the frame counter: high for the first `steps` frames, low for
/// the next, and so on. A step count of zero disables the oscillation and holds the
/// output high.
fn clock(chip: &ChipRef, ctx: &SimCtx) {
    let steps = ctx.steps_per_clock();
    let high = steps == 0 || (ctx.frame() / steps as u64) & 1 == 0;
    write_output(chip, 0, state::single_bit(high));
}

/// A one-shot: a rising edge on the input loads the countdown from the duration word,
/// and the output stays high while the countdown runs. A floating input shows up as a
/// floating output (and can't start a pulse, since a floating bit is never read high),
/// but it doesn't stop a countdown already in flight.
fn pulse(chip: &ChipRef) {
    let input = input_state(chip, 0);
    let active = {
        let mut c = chip.borrow_mut();
        let mem = c.memory_mut();
        let high = state::first_bit_high(input);
        if high && mem[2] == 0 {
            mem[1] = mem[0];
        }
        mem[2] = high as u32;
        if mem[1] > 0 {
            mem[1] -= 1;
            true
        } else {
            false
        }
    };
    let out = if state::tristate_flags(input) != 0 {
        let pin = chip.borrow().output_at(0);
        let state = pin.borrow().state();
        state::all_disconnected(state)
    } else {
        state::single_bit(active)
    };
    write_output(chip, 0, out);
}

/// High while the key this chip is bound to is held down.
fn key(chip: &ChipRef, ctx: &SimCtx) {
    let code = chip.borrow().memory()[0];
    write_output(chip, 0, state::single_bit(ctx.key_held(code)));
}

/// output[i] carries bit (3 - i) of the input, value and flag together.
fn split_4_1(chip: &ChipRef) {
    let input = input_state(chip, 0);
    for i in 0..4 {
        let value = input.get_bit(3 - i);
        let flag = input.get_bit(19 - i);
        write_output(chip, i, value as u32 | (flag as u32) << 16);
    }
}

/// The upper and lower nibbles of the input, through the codec.
fn split_8_4(chip: &ChipRef) {
    let input = input_state(chip, 0);
    let hi = {
        let pin = chip.borrow().output_at(0);
        let state = pin.borrow().state();
        state::set_nibble(state, input, true)
    };
    write_output(chip, 0, hi);
    let lo = {
        let pin = chip.borrow().output_at(1);
        let state = pin.borrow().state();
        state::set_nibble(state, input, false)
    };
    write_output(chip, 1, lo);
}

/// output[i] carries bit (7 - i) of the input.
fn split_8_1(chip: &ChipRef) {
    let input = input_state(chip, 0);
    for i in 0..8 {
        let value = input.get_bit(7 - i);
        let flag = input.get_bit(23 - i);
        write_output(chip, i, value as u32 | (flag as u32) << 16);
    }
}

fn merge_bits(chip: &ChipRef, width: usize) {
    // The last input is the least significant bit.
    let mut out = 0u32;
    for i in 0..width {
        let st = input_state(chip, width - 1 - i);
        out |= (st & 1) << i;
        out |= (st >> 16 & 1) << (16 + i);
    }
    write_output(chip, 0, out);
}

fn merge_1_4(chip: &ChipRef) {
    merge_bits(chip, 4);
}

fn merge_1_8(chip: &ChipRef) {
    merge_bits(chip, 8);
}

/// HI and LO nibbles joined into one byte, through the codec.
fn merge_4_8(chip: &ChipRef) {
    let hi = input_state(chip, 0);
    let lo = input_state(chip, 1);
    write_output(chip, 0, state::join_nibbles(lo, hi));
}

/// One 16-bit word per address, split across the two byte outputs.
fn rom(chip: &ChipRef) {
    let addr = (state::bit_states(input_state(chip, 0)) & 0xff) as usize;
    let word = chip.borrow().memory()[addr];
    write_output(chip, 0, state::from_value((word >> 8 & 0xff) as u16));
    write_output(chip, 1, state::from_value((word & 0xff) as u16));
}

/// 256 bytes of clocked RAM. On a rising clock edge, reset clears every cell,
/// otherwise write-enable stores the data byte at the address. The addressed cell is
/// always on the output, including the one just written.
fn dev_ram(chip: &ChipRef) {
    let addr = (state::bit_states(input_state(chip, 0)) & 0xff) as usize;
    let data = (state::bit_states(input_state(chip, 1)) & 0xff) as u32;
    let write = state::first_bit_high(input_state(chip, 2));
    let reset = state::first_bit_high(input_state(chip, 3));
    let clock = state::first_bit_high(input_state(chip, 4));
    let out = {
        let mut c = chip.borrow_mut();
        let mem = c.memory_mut();
        if clock && mem[256] == 0 {
            if reset {
                for cell in mem[..256].iter_mut() {
                    *cell = 0;
                }
            } else if write {
                mem[addr] = data;
            }
        }
        mem[256] = clock as u32;
        mem[addr]
    };
    write_output(chip, 0, state::from_value((out & 0xff) as u16));
}

/// Double-buffered 16x16 color display. Words 0..256 are the front buffer a renderer
/// (and the outputs) read; words 256..512 are the back buffer the clocked inputs
/// write; word 512 is the edge latch. Reset clears the back buffer, write stores
/// R|G<<4|B<<8, and refresh copies back to front, all on the same rising edge.
fn display_rgb(chip: &ChipRef) {
    let addr = (state::bit_states(input_state(chip, 0)) & 0xff) as usize;
    let r = (state::bit_states(input_state(chip, 1)) & 0xf) as u32;
    let g = (state::bit_states(input_state(chip, 2)) & 0xf) as u32;
    let b = (state::bit_states(input_state(chip, 3)) & 0xf) as u32;
    let reset = state::first_bit_high(input_state(chip, 4));
    let write = state::first_bit_high(input_state(chip, 5));
    let refresh = state::first_bit_high(input_state(chip, 6));
    let clock = state::first_bit_high(input_state(chip, 7));
    let pixel = {
        let mut c = chip.borrow_mut();
        let mem = c.memory_mut();
        if clock && mem[512] == 0 {
            if reset {
                for cell in mem[256..512].iter_mut() {
                    *cell = 0;
                }
            } else if write {
                mem[256 + addr] = r | g << 4 | b << 8;
            }
            if refresh {
                for i in 0..256 {
                    mem[i] = mem[256 + i];
                }
            }
        }
        mem[512] = clock as u32;
        mem[addr]
    };
    write_output(chip, 0, state::from_value((pixel & 0xf) as u16));
    write_output(chip, 1, state::from_value((pixel >> 4 & 0xf) as u16));
    write_output(chip, 2, state::from_value((pixel >> 8 & 0xf) as u16));
}

/// The single-value sibling of the RGB display.
fn display_dot(chip: &ChipRef) {
    let addr = (state::bit_states(input_state(chip, 0)) & 0xff) as usize;
    let dot = (state::bit_states(input_state(chip, 1)) & 1) as u32;
    let reset = state::first_bit_high(input_state(chip, 2));
    let write = state::first_bit_high(input_state(chip, 3));
    let refresh = state::first_bit_high(input_state(chip, 4));
    let clock = state::first_bit_high(input_state(chip, 5));
    let pixel = {
        let mut c = chip.borrow_mut();
        let mem = c.memory_mut();
        if clock && mem[512] == 0 {
            if reset {
                for cell in mem[256..512].iter_mut() {
                    *cell = 0;
                }
            } else if write {
                mem[256 + addr] = dot;
            }
            if refresh {
                for i in 0..256 {
                    mem[i] = mem[256 + i];
                }
            }
        }
        mem[512] = clock as u32;
        mem[addr]
    };
    write_output(chip, 0, state::single_bit(pixel & 1 == 1));
}

/// Hands the current frequency and volume indexes to whatever audio back end is
/// listening. No pin output.
fn buzzer(chip: &ChipRef, ctx: &SimCtx) {
    let freq = state::bit_states(input_state(chip, 0)) & 0xf;
    let volume = state::bit_states(input_state(chip, 1)) & 0xf;
    ctx.register_note(freq, volume);
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::library::{builder, Library};
    use crate::sim::rng::Pcg32;
    use crate::sim::AudioSink;
    use crate::state::{DISCONNECTED, HIGH, LOW};

    fn build_kind(kind: ChipKind, data: Option<Vec<u32>>) -> ChipRef {
        let lib = Library::new();
        let desc = lib.get(kind.type_name()).unwrap();
        let mut rng = Pcg32::new(1);
        builder::build(&desc, &lib, 0, "", data.as_deref(), &mut rng).unwrap()
    }

    fn ctx() -> SimCtx {
        SimCtx::fixed(3)
    }

    fn set_input(chip: &ChipRef, index: usize, state: u32) {
        let pin = chip.borrow().input_at(index);
        write_state!(pin, state);
    }

    fn drive_input(chip: &ChipRef, index: usize, value: u16) {
        let pin = chip.borrow().input_at(index);
        drive!(pin, value);
    }

    fn output(chip: &ChipRef, index: usize) -> u32 {
        let pin = chip.borrow().output_at(index);
        let x = state!(pin);
        x
    }

    fn output_value(chip: &ChipRef, index: usize) -> u16 {
        let pin = chip.borrow().output_at(index);
        let x = value!(pin);
        x
    }

    #[test]
    fn nand_truth_table() {
        let ctx = ctx();
        let chip = build_kind(ChipKind::Nand, None);
        for &(a, b, out) in [(LOW, LOW, 1), (LOW, HIGH, 1), (HIGH, LOW, 1), (HIGH, HIGH, 0)].iter()
        {
            set_input(&chip, 0, a);
            set_input(&chip, 1, b);
            process(&chip, &ctx);
            assert_eq!(output(&chip, 0), out, "NAND({:x},{:x})", a, b);
        }
    }

    #[test]
    fn nand_is_idempotent() {
        let ctx = ctx();
        let chip = build_kind(ChipKind::Nand, None);
        set_input(&chip, 0, HIGH);
        set_input(&chip, 1, HIGH);
        process(&chip, &ctx);
        let first = output(&chip, 0);
        process(&chip, &ctx);
        assert_eq!(output(&chip, 0), first);
    }

    #[test]
    fn tri_state_cuts_off() {
        let ctx = ctx();
        let chip = build_kind(ChipKind::TriState, None);
        set_input(&chip, 0, HIGH);
        set_input(&chip, 1, HIGH);
        process(&chip, &ctx);
        assert_eq!(output(&chip, 0), HIGH);

        set_input(&chip, 1, LOW);
        process(&chip, &ctx);
        let out = output(&chip, 0);
        assert!(state::bit_disconnected(out, 0));
        assert_eq!(state::bit_states(out), 0, "masked read of a floating output");
    }

    #[test]
    fn bus_copies_flags() {
        let ctx = ctx();
        let chip = build_kind(ChipKind::Bus4, None);
        set_input(&chip, 0, 0x0004_000c);
        process(&chip, &ctx);
        assert_eq!(output(&chip, 0), 0x0004_000c);
    }

    #[test]
    fn clock_formula() {
        let ctx = ctx();
        ctx.set_steps_per_clock(4);
        let chip = build_kind(ChipKind::Clock, None);
        let mut pattern = Vec::new();
        for _ in 0..12 {
            process(&chip, &ctx);
            pattern.push(state::first_bit_high(output(&chip, 0)));
            ctx.advance_frame();
        }
        assert_eq!(
            pattern,
            vec![
                true, true, true, true, false, false, false, false, true, true, true, true
            ]
        );
    }

    #[test]
    fn clock_disabled_holds_high() {
        let ctx = ctx();
        let chip = build_kind(ChipKind::Clock, None);
        for _ in 0..3 {
            process(&chip, &ctx);
            assert!(state::first_bit_high(output(&chip, 0)));
            ctx.advance_frame();
        }
    }

    #[test]
    fn pulse_runs_for_duration() {
        let ctx = ctx();
        let chip = build_kind(ChipKind::Pulse, Some(vec![3]));
        set_input(&chip, 0, HIGH);
        let mut highs = 0;
        for _ in 0..6 {
            process(&chip, &ctx);
            if state::first_bit_high(output(&chip, 0)) {
                highs += 1;
            }
        }
        assert_eq!(highs, 3, "a held input fires once for the duration");

        // A fresh rising edge rearms the one-shot.
        set_input(&chip, 0, LOW);
        process(&chip, &ctx);
        set_input(&chip, 0, HIGH);
        process(&chip, &ctx);
        assert!(state::first_bit_high(output(&chip, 0)));
    }

    #[test]
    fn pulse_floats_with_floating_input() {
        let ctx = ctx();
        let chip = build_kind(ChipKind::Pulse, Some(vec![3]));
        set_input(&chip, 0, HIGH);
        process(&chip, &ctx);
        assert!(state::first_bit_high(output(&chip, 0)));

        set_input(&chip, 0, DISCONNECTED);
        process(&chip, &ctx);
        let out = output(&chip, 0);
        assert!(state::bit_disconnected(out, 0));

        // The countdown kept running underneath; reconnecting low shows the tail.
        set_input(&chip, 0, LOW);
        process(&chip, &ctx);
        assert!(state::first_bit_high(output(&chip, 0)));
        process(&chip, &ctx);
        assert!(!state::first_bit_high(output(&chip, 0)), "countdown exhausted");
    }

    #[test]
    fn key_reads_held_set() {
        let ctx = ctx();
        let chip = build_kind(ChipKind::Key, Some(vec!['z' as u32]));
        process(&chip, &ctx);
        assert!(!state::first_bit_high(output(&chip, 0)));

        ctx.keyboard().lock().unwrap().insert('z' as u32);
        process(&chip, &ctx);
        assert!(state::first_bit_high(output(&chip, 0)));
    }

    #[test]
    fn split_4_is_msb_first() {
        let ctx = ctx();
        let chip = build_kind(ChipKind::Split4To1, None);
        drive_input(&chip, 0, 0b1010);
        process(&chip, &ctx);
        assert_eq!(output(&chip, 0), HIGH, "OUT0 is bit 3");
        assert_eq!(output(&chip, 1), LOW);
        assert_eq!(output(&chip, 2), HIGH);
        assert_eq!(output(&chip, 3), LOW, "OUT3 is bit 0");
    }

    #[test]
    fn merge_4_is_lsb_last() {
        let ctx = ctx();
        let chip = build_kind(ChipKind::Merge1To4, None);
        set_input(&chip, 0, HIGH);
        set_input(&chip, 1, LOW);
        set_input(&chip, 2, HIGH);
        set_input(&chip, 3, LOW);
        process(&chip, &ctx);
        assert_eq!(output_value(&chip, 0), 0b1010);
    }

    #[test]
    fn split_merge_round_trip() {
        let ctx = ctx();
        let split = build_kind(ChipKind::Split8To4, None);
        let merge = build_kind(ChipKind::Merge4To8, None);
        // Upper nibble driven 0xA, lower nibble floating with stale 0x5.
        let byte = 0x000f_00a5;
        set_input(&split, 0, byte);
        process(&split, &ctx);
        set_input(&merge, 0, output(&split, 0));
        set_input(&merge, 1, output(&split, 1));
        process(&merge, &ctx);
        assert_eq!(output(&merge, 0), byte);
    }

    #[test]
    fn split_8_1_carries_flags() {
        let ctx = ctx();
        let chip = build_kind(ChipKind::Split8To1, None);
        set_input(&chip, 0, 0x0080_0081);
        process(&chip, &ctx);
        // Bit 7 is floating with a stale high value.
        assert_eq!(output(&chip, 0), DISCONNECTED);
        // Bit 0 is driven high.
        assert_eq!(output(&chip, 7), HIGH);
    }

    #[test]
    fn merge_1_8_collects_bits() {
        let ctx = ctx();
        let chip = build_kind(ChipKind::Merge1To8, None);
        for i in 0..8 {
            set_input(&chip, i, if i % 2 == 0 { HIGH } else { LOW });
        }
        process(&chip, &ctx);
        // Input 7 is the LSB; even input indexes are high.
        assert_eq!(output_value(&chip, 0), 0b1010_1010 & 0xff);
    }

    #[test]
    fn rom_splits_words() {
        let ctx = ctx();
        let mut words = vec![0u32; 256];
        words[0x42] = 0xbeef;
        let chip = build_kind(ChipKind::Rom256x16, Some(words));
        drive_input(&chip, 0, 0x42);
        process(&chip, &ctx);
        assert_eq!(output_value(&chip, 0), 0xbe);
        assert_eq!(output_value(&chip, 1), 0xef);
    }

    #[test]
    fn dev_ram_write_then_read() {
        let ctx = ctx();
        let chip = build_kind(ChipKind::DevRam8, None);
        drive_input(&chip, 0, 0x42);
        drive_input(&chip, 1, 0xa5);
        set_input(&chip, 2, HIGH); // write
        set_input(&chip, 4, HIGH); // clock rising
        process(&chip, &ctx);
        assert_eq!(output_value(&chip, 0), 0xa5);

        // Clock falls, then rises again with write disabled.
        set_input(&chip, 4, LOW);
        process(&chip, &ctx);
        set_input(&chip, 2, LOW);
        set_input(&chip, 4, HIGH);
        process(&chip, &ctx);
        assert_eq!(output_value(&chip, 0), 0xa5);
    }

    #[test]
    fn dev_ram_held_clock_writes_once() {
        let ctx = ctx();
        let chip = build_kind(ChipKind::DevRam8, None);
        drive_input(&chip, 0, 0x10);
        drive_input(&chip, 1, 0x01);
        set_input(&chip, 2, HIGH);
        set_input(&chip, 4, HIGH);
        process(&chip, &ctx);
        // The clock stays high while the data changes; no second edge, no write.
        drive_input(&chip, 1, 0x99);
        process(&chip, &ctx);
        assert_eq!(output_value(&chip, 0), 0x01);
    }

    #[test]
    fn dev_ram_reset_clears() {
        let ctx = ctx();
        let chip = build_kind(ChipKind::DevRam8, None);
        set_input(&chip, 3, HIGH); // reset
        set_input(&chip, 4, HIGH);
        process(&chip, &ctx);
        for addr in [0u16, 0x42, 0xff].iter() {
            drive_input(&chip, 0, *addr);
            process(&chip, &ctx);
            assert_eq!(output_value(&chip, 0), 0);
        }
    }

    #[test]
    fn display_rgb_double_buffers() {
        let ctx = ctx();
        let chip = build_kind(ChipKind::DisplayRgb, None);
        drive_input(&chip, 0, 7); // addr
        drive_input(&chip, 1, 0x1); // r
        drive_input(&chip, 2, 0x2); // g
        drive_input(&chip, 3, 0x3); // b
        set_input(&chip, 5, HIGH); // write
        set_input(&chip, 7, HIGH); // clock
        process(&chip, &ctx);
        // Written to the back buffer only; the front is still dark.
        assert_eq!(output_value(&chip, 0), 0);
        assert_eq!(chip.borrow().memory()[256 + 7], 0x321);

        // Refresh on the next edge flips the buffers.
        set_input(&chip, 7, LOW);
        process(&chip, &ctx);
        set_input(&chip, 5, LOW);
        set_input(&chip, 6, HIGH); // refresh
        set_input(&chip, 7, HIGH);
        process(&chip, &ctx);
        assert_eq!(output_value(&chip, 0), 0x1);
        assert_eq!(output_value(&chip, 1), 0x2);
        assert_eq!(output_value(&chip, 2), 0x3);
    }

    #[test]
    fn display_dot_writes_and_refreshes() {
        let ctx = ctx();
        let chip = build_kind(ChipKind::DisplayDot, None);
        drive_input(&chip, 0, 3);
        set_input(&chip, 1, HIGH); // pixel
        set_input(&chip, 3, HIGH); // write
        set_input(&chip, 4, HIGH); // refresh
        set_input(&chip, 5, HIGH); // clock
        process(&chip, &ctx);
        // Write and refresh on the same edge: the fresh pixel lands on screen.
        assert!(state::first_bit_high(output(&chip, 0)));
    }

    struct Recorder(Mutex<Vec<(u16, u16)>>);

    impl AudioSink for Recorder {
        fn register_note(&self, freq_index: u16, volume_index: u16) {
            self.0.lock().unwrap().push((freq_index, volume_index));
        }
    }

    #[test]
    fn buzzer_registers_notes() {
        let mut ctx = ctx();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let sink: Arc<dyn AudioSink> = recorder.clone();
        ctx.attach_audio(sink);
        let chip = build_kind(ChipKind::Buzzer, None);
        drive_input(&chip, 0, 0x9);
        drive_input(&chip, 1, 0x5);
        process(&chip, &ctx);
        assert_eq!(recorder.0.lock().unwrap().as_slice(), &[(0x9, 0x5)]);
    }
}
