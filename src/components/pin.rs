// Copyright (c) 2021 Thomas J. Otterson
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use std::{
    cell::RefCell,
    fmt::{Debug, Error, Formatter},
    rc::{Rc, Weak},
};

use crate::components::chip::{Chip, ChipRef};
use crate::sim::SimCtx;
use crate::state;

/// A convenience alias for a shared internally-mutable reference to a Pin, so we don't have
/// to type all those angle brackets.
pub type PinRef = Rc<RefCell<Pin>>;

/// The direction through which data flows through a pin.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Indicates that the pin receives data. An input pin is a fan-out target of upstream
    /// output pins (or, for a composite chip's own inputs, of the outside world); it never
    /// pushes its value anywhere on a plain write. Delivery into an input pin happens only
    /// through `receive`.
    Input,

    /// Indicates that the pin drives data. An output pin owns a list of downstream input
    /// pins (its fan-out) and delivers its state to each of them when its chip's outputs
    /// are propagated.
    Output,
}

/// A single- or multi-bit signal carrier owned by a chip.
///
/// A pin owns one packed state (see the `state` module) and the bookkeeping that the
/// scheduler needs to know when the pin has heard from every one of its drivers in a
/// frame. Input pins count their upstream sources; a pin with no sources is always ready.
/// During a frame, each delivery bumps a received counter that resets itself when a new
/// frame index is observed, and when the counter reaches the source count the pin tells
/// its chip that one more of its connected inputs is ready.
///
/// Fan-out lists hold shared references to downstream pins. The list is part of the wire
/// graph, which may be cyclic; ownership of the pins themselves always rests with their
/// chip, and the editor operations are responsible for stripping a pin out of every
/// fan-out list before the chip lets go of it.
///
/// A pin also remembers which pin and chip drove it most recently, which costs nothing
/// here and lets a renderer highlight the winning driver of a contested wire.
pub struct Pin {
    /// The pin identifier, unique within the owning chip.
    id: i32,

    /// The pin name, taken from the chip description. Compared case-insensitively
    /// wherever names are compared at all.
    name: String,

    /// The width of the signal this pin carries (1, 4, or 8).
    bits: u8,

    /// The direction of the pin.
    mode: Mode,

    /// The packed state of the pin.
    state: u32,

    /// The chip that owns this pin. Non-owning; the chip owns the pin, not the other way
    /// around.
    chip: Weak<RefCell<Chip>>,

    /// The input pins this pin drives.
    targets: Vec<PinRef>,

    /// The number of upstream pins that drive this pin. Zero means always-ready.
    sources: usize,

    /// The number of sources that have delivered to this pin in the current frame.
    received: usize,

    /// The frame index at which `received` was last touched, used to lazily reset the
    /// counter at the first delivery of a new frame.
    last_frame: u64,

    /// The id of the pin that most recently changed this pin's state.
    driver_pin: i32,

    /// The id of the chip owning that pin.
    driver_chip: i32,
}

impl Pin {
    /// Creates a new pin and returns a shared, internally mutable reference to it. The pin
    /// starts fully low and attached to no chip.
    pub fn new(id: i32, name: &str, bits: u8, mode: Mode) -> PinRef {
        new_ref!(Pin {
            id,
            name: name.to_string(),
            bits,
            mode,
            state: state::LOW,
            chip: Weak::new(),
            targets: Vec::new(),
            sources: 0,
            received: 0,
            last_frame: 0,
            driver_pin: -1,
            driver_chip: -1,
        })
    }

    /// Returns the pin id.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Returns the pin name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the bit width of the pin.
    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// Returns the pin's mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Determines whether the pin is an input pin.
    pub fn input(&self) -> bool {
        self.mode == Mode::Input
    }

    /// Determines whether the pin is an output pin.
    pub fn output(&self) -> bool {
        self.mode == Mode::Output
    }

    /// Returns the packed state of the pin.
    pub fn state(&self) -> u32 {
        self.state
    }

    /// Assigns a new packed state, returning whether the state actually changed. Writing
    /// does not deliver anything downstream by itself; an output pin's fan-out hears about
    /// the new state when the owning chip's outputs are next propagated, within the same
    /// step of the frame that produced the write.
    pub fn write(&mut self, state: u32) -> bool {
        let changed = self.state != state;
        self.state = state;
        changed
    }

    /// Determines whether the pin's lowest bit is driven high.
    pub fn high(&self) -> bool {
        state::first_bit_high(self.state)
    }

    /// Determines whether the pin's lowest bit is driven low.
    pub fn low(&self) -> bool {
        !state::bit_disconnected(self.state, 0) && !state::first_bit_high(self.state)
    }

    /// Determines whether the pin's lowest bit is disconnected.
    pub fn floating(&self) -> bool {
        state::bit_disconnected(self.state, 0)
    }

    /// Attaches the pin to its owning chip.
    pub fn attach(&mut self, chip: &ChipRef) {
        self.chip = Rc::downgrade(chip);
    }

    /// Returns the owning chip, if the pin is attached and the chip is still alive.
    pub fn chip(&self) -> Option<ChipRef> {
        self.chip.upgrade()
    }

    /// Returns the id of the owning chip, or -1 if the pin is unattached.
    pub fn chip_id(&self) -> i32 {
        match self.chip.upgrade() {
            Some(chip) => chip.borrow().id(),
            None => -1,
        }
    }

    /// Appends a downstream pin to this pin's fan-out.
    pub fn add_target(&mut self, target: PinRef) {
        self.targets.push(target);
    }

    /// Removes one occurrence of `target` from this pin's fan-out, returning whether one
    /// was found.
    pub fn remove_target(&mut self, target: &PinRef) -> bool {
        match self.targets.iter().position(|t| Rc::ptr_eq(t, target)) {
            Some(index) => {
                self.targets.remove(index);
                true
            }
            None => false,
        }
    }

    /// Returns cloned references to this pin's fan-out targets.
    pub fn targets(&self) -> Vec<PinRef> {
        self.targets.iter().map(Rc::clone).collect()
    }

    /// Drops every fan-out target at once. Used when the pin itself is going away.
    pub fn clear_targets(&mut self) {
        self.targets.clear();
    }

    /// Returns the number of upstream sources driving this pin.
    pub fn sources(&self) -> usize {
        self.sources
    }

    /// Records one more upstream source and returns the new count.
    pub fn add_source(&mut self) -> usize {
        self.sources += 1;
        self.sources
    }

    /// Records one fewer upstream source and returns the new count.
    pub fn remove_source(&mut self) -> usize {
        self.sources = self.sources.saturating_sub(1);
        self.sources
    }

    /// Returns the number of sources heard from this frame.
    pub fn received(&self) -> usize {
        self.received
    }

    /// Returns the pin and chip ids of the most recent driver to change this pin.
    pub fn driver(&self) -> (i32, i32) {
        (self.driver_pin, self.driver_chip)
    }

    /// Accepts a delivery from an upstream pin.
    ///
    /// The first delivery of a frame is taken verbatim. Later deliveries are combined
    /// with the state already present: a single random draw (shared across all bits of
    /// this pin for this merge) chooses between the OR and the AND of the two states,
    /// bits tri-stated on either side take the driven side's value, and a bit ends up
    /// disconnected only if both sources agree it is. When the delivery completes the
    /// pin's expected source count and the pin is an input, the owning chip is told that
    /// another of its inputs is ready.
    pub fn receive(&mut self, state: u32, from_pin: i32, from_chip: i32, ctx: &SimCtx) {
        if self.last_frame != ctx.frame() {
            self.received = 0;
            self.last_frame = ctx.frame();
        }
        let old = self.state;
        if self.received == 0 {
            self.state = state;
        } else {
            self.state = state::resolve(self.state, state, ctx.coin());
        }
        self.received += 1;
        if self.state != old {
            self.driver_pin = from_pin;
            self.driver_chip = from_chip;
        }
        if self.received == self.sources && self.mode == Mode::Input {
            if let Some(chip) = self.chip.upgrade() {
                chip.borrow_mut().input_ready();
            }
        }
    }

    /// Delivers this pin's state to every pin in its fan-out.
    ///
    /// The state, ids, and target list are snapshotted up front so that no borrow of the
    /// pin is held while targets are borrowed mutably. A target that happens to be
    /// mid-borrow further up the call chain is skipped for the frame rather than
    /// panicking the worker.
    pub fn propagate(pin: &PinRef, ctx: &SimCtx) {
        let (state, id, chip_id, targets) = {
            let p = pin.borrow();
            (p.state, p.id, p.chip_id(), p.targets())
        };
        for target in targets {
            if let Ok(mut t) = target.try_borrow_mut() {
                t.receive(state, id, chip_id, ctx);
            }
        }
    }
}

impl Debug for Pin {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        f.debug_struct("Pin")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("bits", &self.bits)
            .field("mode", &self.mode)
            .field("state", &format_args!("{:#010x}", self.state))
            .field("sources", &self.sources)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::Mode::{Input, Output};
    use super::*;
    use crate::state::{DISCONNECTED, HIGH, LOW};

    fn ctx() -> SimCtx {
        SimCtx::fixed(0x5eed)
    }

    #[test]
    fn has_id_and_name() {
        let p = pin!(3, "DATA", 8, Input);
        assert_eq!(p.borrow().id(), 3);
        assert_eq!(p.borrow().name(), "DATA");
        assert_eq!(p.borrow().bits(), 8);
    }

    #[test]
    fn mode_initial() {
        let p1 = pin!(0, "A", 1, Input);
        let p2 = pin!(1, "Y", 1, Output);

        assert_eq!(mode!(p1), Input);
        assert!(p1.borrow().input());
        assert!(!p1.borrow().output());

        assert_eq!(mode!(p2), Output);
        assert!(!p2.borrow().input());
        assert!(p2.borrow().output());
    }

    #[test]
    fn level_tests() {
        let p = pin!(0, "A", 1, Input);
        assert!(low!(p));

        set!(p);
        assert!(high!(p));
        assert!(!low!(p));
        assert!(!floating!(p));

        clear!(p);
        assert!(!high!(p));
        assert!(low!(p));

        float!(p);
        assert!(!high!(p));
        assert!(!low!(p));
        assert!(floating!(p));
    }

    #[test]
    fn write_reports_change() {
        let p = pin!(0, "A", 1, Output);
        assert!(p.borrow_mut().write(HIGH));
        assert!(!p.borrow_mut().write(HIGH));
        assert!(p.borrow_mut().write(LOW));
    }

    #[test]
    fn source_counting() {
        let p = pin!(0, "A", 1, Input);
        assert_eq!(p.borrow().sources(), 0);
        assert_eq!(p.borrow_mut().add_source(), 1);
        assert_eq!(p.borrow_mut().add_source(), 2);
        assert_eq!(p.borrow_mut().remove_source(), 1);
        assert_eq!(p.borrow_mut().remove_source(), 0);
        assert_eq!(p.borrow_mut().remove_source(), 0);
    }

    #[test]
    fn receive_first_verbatim() {
        let ctx = ctx();
        let p = pin!(0, "A", 1, Input);
        p.borrow_mut().add_source();

        p.borrow_mut().receive(DISCONNECTED, 7, 2, &ctx);
        assert_eq!(state!(p), DISCONNECTED);
        assert_eq!(p.borrow().received(), 1);
        assert_eq!(p.borrow().driver(), (7, 2));
    }

    #[test]
    fn receive_merges_second_source() {
        let ctx = ctx();
        let p = pin!(0, "A", 1, Input);
        p.borrow_mut().add_source();
        p.borrow_mut().add_source();

        // A floating first source never blocks the driven second one.
        p.borrow_mut().receive(DISCONNECTED, 1, 0, &ctx);
        p.borrow_mut().receive(LOW, 2, 0, &ctx);
        assert!(low!(p));
        assert_eq!(p.borrow().received(), 2);
    }

    #[test]
    fn receive_resets_on_new_frame() {
        let ctx = ctx();
        let p = pin!(0, "A", 1, Input);
        p.borrow_mut().add_source();

        p.borrow_mut().receive(HIGH, 1, 0, &ctx);
        assert_eq!(p.borrow().received(), 1);

        ctx.advance_frame();
        p.borrow_mut().receive(HIGH, 1, 0, &ctx);
        assert_eq!(p.borrow().received(), 1, "counter resets with the frame");
    }

    #[test]
    fn propagate_reaches_targets() {
        let ctx = ctx();
        let out = pin!(0, "Y", 1, Output);
        let t1 = pin!(0, "A", 1, Input);
        let t2 = pin!(1, "B", 1, Input);
        t1.borrow_mut().add_source();
        t2.borrow_mut().add_source();
        out.borrow_mut().add_target(clone_ref!(t1));
        out.borrow_mut().add_target(clone_ref!(t2));

        set!(out);
        Pin::propagate(&out, &ctx);
        assert!(high!(t1));
        assert!(high!(t2));
    }

    #[test]
    fn propagate_skips_self_wire() {
        let ctx = ctx();
        let p = pin!(0, "A", 1, Output);
        let this = clone_ref!(p);
        p.borrow_mut().add_target(this);

        set!(p);
        // A pin wired to itself must not deadlock the borrow.
        Pin::propagate(&p, &ctx);
        assert!(high!(p));
    }

    #[test]
    fn remove_target_by_identity() {
        let out = pin!(0, "Y", 1, Output);
        let t = pin!(1, "A", 1, Input);
        let other = pin!(2, "B", 1, Input);
        out.borrow_mut().add_target(clone_ref!(t));

        assert!(!out.borrow_mut().remove_target(&other));
        assert!(out.borrow_mut().remove_target(&t));
        assert!(!out.borrow_mut().remove_target(&t));
        assert!(out.borrow().targets().is_empty());
    }
}
