// Copyright (c) 2021 Thomas J. Otterson
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

pub mod queue;
pub mod reorder;
pub mod rng;
pub mod topo;

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use log::debug;

use crate::components::chip::{Chip, ChipRef};
use crate::library::{builder, BuildError, ChipDescription, Library, PinAddress};
use crate::sim::queue::{Command, CommandSender};
use crate::sim::rng::Pcg32;

/// The audio back end the buzzer chip talks to. The kernel registers notes; playing
/// them is someone else's problem.
pub trait AudioSink {
    fn register_note(&self, freq_index: u16, volume_index: u16);
}

/// The set of key codes currently held down, shared with whatever captures input.
pub type KeySet = Arc<Mutex<HashSet<u32>>>;

/// Which scheduling strategy drives a frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Iterative ready-first scheduling with stochastic cycle breaking; the
    /// historical behavior.
    Reorder,
    /// One fixed topological order of the flattened primitives.
    Topological,
}

/// Simulator configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub strategy: Strategy,
    /// A fixed PRNG seed. Setting one puts the simulator in deterministic mode: the
    /// generator is never reseeded and runs repeat exactly.
    pub seed: Option<u32>,
    /// Frames per clock transition; zero disables clock oscillation.
    pub steps_per_clock: u32,
    /// Logs frame progress; has no effect on simulation semantics.
    pub metrics: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            strategy: Strategy::Reorder,
            seed: None,
            steps_per_clock: 0,
            metrics: false,
        }
    }
}

/// The per-process simulation context threaded through every entry point: the frame
/// counter, the random number generator, the clock divider, and the collaborator
/// hooks the primitive evaluators need. Interior mutability keeps it a plain `&`
/// parameter through deeply nested propagation calls.
pub struct SimCtx {
    frame: Cell<u64>,
    rng: RefCell<Pcg32>,
    steps_per_clock: Cell<u32>,
    keys: KeySet,
    audio: Option<Arc<dyn AudioSink>>,
}

impl SimCtx {
    fn new(seed: u32, steps_per_clock: u32) -> SimCtx {
        SimCtx {
            frame: Cell::new(0),
            rng: RefCell::new(Pcg32::new(seed)),
            steps_per_clock: Cell::new(steps_per_clock),
            keys: Arc::new(Mutex::new(HashSet::new())),
            audio: None,
        }
    }

    /// A deterministic context for tests and benchmarks.
    pub fn fixed(seed: u32) -> SimCtx {
        SimCtx::new(seed, 0)
    }

    pub fn frame(&self) -> u64 {
        self.frame.get()
    }

    pub fn advance_frame(&self) {
        self.frame.set(self.frame.get() + 1);
    }

    /// One shared coin flip; the conflict resolver and the dynamic reorder pass are
    /// the only consumers.
    pub fn coin(&self) -> bool {
        self.rng.borrow_mut().coin()
    }

    /// A uniform index below `bound`.
    pub fn pick(&self, bound: usize) -> usize {
        self.rng.borrow_mut().below(bound as u32) as usize
    }

    pub fn steps_per_clock(&self) -> u32 {
        self.steps_per_clock.get()
    }

    pub fn set_steps_per_clock(&self, steps: u32) {
        self.steps_per_clock.set(steps);
    }

    /// The shared held-keys set; hand a clone to the input capture side.
    pub fn keyboard(&self) -> KeySet {
        Arc::clone(&self.keys)
    }

    pub fn key_held(&self, code: u32) -> bool {
        self.keys.lock().map(|keys| keys.contains(&code)).unwrap_or(false)
    }

    pub fn attach_audio(&mut self, sink: Arc<dyn AudioSink>) {
        self.audio = Some(sink);
    }

    pub fn register_note(&self, freq_index: u16, volume_index: u16) {
        if let Some(audio) = self.audio.as_ref() {
            audio.register_note(freq_index, volume_index);
        }
    }

    fn reseed(&self) {
        self.rng.borrow_mut().reseed(rng::entropy_seed());
    }
}

/// A handle for pushing one external input value into the circuit. The capture side
/// stores a packed state whenever it likes; the simulator reads it once per frame at
/// ingestion. A `u32` store can't tear, so the worst case is one frame of latency.
#[derive(Clone)]
pub struct InputHandle {
    address: PinAddress,
    state: Arc<AtomicU32>,
}

impl InputHandle {
    pub fn address(&self) -> PinAddress {
        self.address
    }

    pub fn set(&self, state: u32) {
        self.state.store(state, Ordering::Relaxed);
    }

    pub fn set_value(&self, value: u16) {
        self.set(crate::state::from_value(value));
    }

    fn get(&self) -> u32 {
        self.state.load(Ordering::Relaxed)
    }
}

/// The simulation worker's state: the root chip, the library that built it, the
/// context, the registered inputs, and the modification queue. All pin writes,
/// evaluations, and structural edits happen on whichever thread owns this value;
/// other threads talk to it through `CommandSender` handles, input handles, and the
/// keyboard set.
pub struct Simulator {
    root: ChipRef,
    library: Library,
    ctx: SimCtx,
    inputs: Vec<InputHandle>,
    sender: Sender<Command>,
    receiver: Receiver<Command>,
    strategy: Strategy,
    needs_order: bool,
    topo: Option<Vec<ChipRef>>,
    deterministic: bool,
    metrics: bool,
}

impl Simulator {
    /// Builds a circuit from its description and wraps it in a ready-to-run
    /// simulator.
    pub fn new(
        desc: &ChipDescription,
        library: Library,
        config: Config,
    ) -> Result<Simulator, BuildError> {
        let seed = config.seed.unwrap_or_else(rng::entropy_seed);
        let mut generator = Pcg32::new(seed);
        let root = builder::build_root(desc, &library, &mut generator)?;
        let ctx = SimCtx {
            frame: Cell::new(0),
            rng: RefCell::new(generator),
            steps_per_clock: Cell::new(config.steps_per_clock),
            keys: Arc::new(Mutex::new(HashSet::new())),
            audio: None,
        };
        let (sender, receiver) = mpsc::channel();
        Ok(Simulator {
            root,
            library,
            ctx,
            inputs: Vec::new(),
            sender,
            receiver,
            strategy: config.strategy,
            needs_order: true,
            topo: None,
            deterministic: config.seed.is_some(),
            metrics: config.metrics,
        })
    }

    /// A handle for submitting structural edits from any thread.
    pub fn command_sender(&self) -> CommandSender {
        CommandSender::new(self.sender.clone())
    }

    /// Registers an external input at an address into the root chip and returns the
    /// handle the capture side writes through.
    pub fn input(&mut self, address: PinAddress) -> InputHandle {
        let handle = InputHandle {
            address,
            state: Arc::new(AtomicU32::new(crate::state::LOW)),
        };
        self.inputs.push(handle.clone());
        handle
    }

    /// The shared held-keys set for the key primitive.
    pub fn keyboard(&self) -> KeySet {
        self.ctx.keyboard()
    }

    pub fn attach_audio(&mut self, sink: Arc<dyn AudioSink>) {
        self.ctx.attach_audio(sink);
    }

    pub fn frame(&self) -> u64 {
        self.ctx.frame()
    }

    pub fn root(&self) -> ChipRef {
        clone_ref!(self.root)
    }

    /// Advances the circuit one frame: drain edits, reseed, ingest inputs, run the
    /// configured strategy, count the frame.
    pub fn step_frame(&mut self) {
        let edits = self.drain_commands();
        if edits > 0 {
            self.needs_order = true;
            self.topo = None;
        }
        if !self.deterministic {
            self.ctx.reseed();
        }
        self.ingest();
        match self.strategy {
            Strategy::Reorder => {
                if self.needs_order {
                    reorder::reorder_step(&self.root, &self.ctx);
                    self.needs_order = false;
                } else {
                    let frame = self.ctx.frame();
                    let dynamic = frame > 0 && frame % 100 == 0;
                    reorder::step(&self.root, &self.ctx, dynamic);
                }
            }
            Strategy::Topological => {
                if self.topo.is_none() {
                    self.topo = Some(topo::order(&self.root));
                }
                let order = self.topo.as_ref().unwrap();
                topo::frame(&self.root, order, &self.ctx);
            }
        }
        self.ctx.advance_frame();
        if self.metrics && self.ctx.frame() % 1000 == 0 {
            debug!("simulated {} frames", self.ctx.frame());
        }
    }

    /// Runs a fixed number of frames.
    pub fn run(&mut self, frames: u64) {
        for _ in 0..frames {
            self.step_frame();
        }
    }

    /// Reads a pin's packed state. The path walks sub-chip ids from the root; the
    /// address resolves against the chip the path lands on. A stale address reads as
    /// `None`, never a panic, since observers race the editor all the time.
    pub fn pin_state(&self, path: &[i32], address: &PinAddress) -> Option<u32> {
        let chip = self.chip_at(path)?;
        let pin = chip.borrow().pin_at(address)?;
        let state = pin.borrow().state();
        Some(state)
    }

    /// Reads the pin and chip ids of the most recent driver of a pin.
    pub fn pin_driver(&self, path: &[i32], address: &PinAddress) -> Option<(i32, i32)> {
        let chip = self.chip_at(path)?;
        let pin = chip.borrow().pin_at(address)?;
        let driver = pin.borrow().driver();
        Some(driver)
    }

    /// Snapshots a chip's internal memory.
    pub fn memory_of(&self, path: &[i32]) -> Option<Vec<u32>> {
        let chip = self.chip_at(path)?;
        let memory = chip.borrow().memory().to_vec();
        Some(memory)
    }

    fn chip_at(&self, path: &[i32]) -> Option<ChipRef> {
        let mut chip = clone_ref!(self.root);
        for &id in path.iter() {
            let next = chip.borrow().subchip(id)?;
            chip = next;
        }
        Some(chip)
    }

    fn ingest(&self) {
        for handle in self.inputs.iter() {
            match self.root.borrow().pin_at(&handle.address()) {
                Some(pin) => {
                    pin.borrow_mut().write(handle.get());
                }
                None => debug!("input address {:?} is gone; skipping", handle.address()),
            }
        }
    }

    fn drain_commands(&mut self) -> usize {
        let commands: Vec<Command> = self.receiver.try_iter().collect();
        let count = commands.len();
        for command in commands {
            self.apply(command);
        }
        count
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::AddPin { chip, pin, input } => {
                if let Some(target) = self.chip_at(&chip) {
                    Chip::add_pin(&target, &pin, input);
                }
            }
            Command::RemovePin { chip, pin } => {
                if let Some(target) = self.chip_at(&chip) {
                    let parent = match chip.len() {
                        0 => None,
                        len => self.chip_at(&chip[..len - 1]),
                    };
                    Chip::remove_pin(&target, parent.as_ref(), pin);
                }
            }
            Command::AddSubChip { chip, sub } => {
                let target = match self.chip_at(&chip) {
                    Some(target) => target,
                    None => return,
                };
                let desc = match self.library.get(&sub.type_name) {
                    Some(desc) => desc,
                    None => {
                        debug!("sub-chip type {:?} unknown; dropping add", sub.type_name);
                        return;
                    }
                };
                let label = sub.label.as_deref().unwrap_or("");
                let built = builder::build(
                    &desc,
                    &self.library,
                    sub.id,
                    label,
                    sub.data.as_deref(),
                    &mut self.ctx.rng.borrow_mut(),
                );
                match built {
                    Ok(built) => Chip::add_subchip(&target, built),
                    Err(err) => debug!("cannot build {:?}: {}", sub.type_name, err),
                }
            }
            Command::RemoveSubChip { chip, id } => {
                if let Some(target) = self.chip_at(&chip) {
                    Chip::remove_subchip(&target, id);
                }
            }
            Command::AddWire { chip, wire } => {
                if let Some(target) = self.chip_at(&chip) {
                    Chip::add_wire(&target, &wire.source, &wire.target);
                }
            }
            Command::RemoveWire { chip, wire } => {
                if let Some(target) = self.chip_at(&chip) {
                    Chip::remove_wire(&target, &wire.source, &wire.target);
                }
            }
        }
    }
}
