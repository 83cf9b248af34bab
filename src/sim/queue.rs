// Copyright (c) 2021 Thomas J. Otterson
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use std::sync::mpsc::Sender;

use crate::library::{PinDescription, SubChipDescription, WireDescription};

/// One structural edit to a running circuit. Commands address their chip by the path
/// of sub-chip ids from the root (an empty path is the root itself) and carry full
/// description values, so the thread submitting them never touches the chip tree.
/// A command whose target no longer exists by the time it is applied is dropped; the
/// editor may race the simulation and that is fine.
#[derive(Clone, Debug)]
pub enum Command {
    AddPin {
        chip: Vec<i32>,
        pin: PinDescription,
        input: bool,
    },
    RemovePin {
        chip: Vec<i32>,
        pin: i32,
    },
    AddSubChip {
        chip: Vec<i32>,
        sub: SubChipDescription,
    },
    RemoveSubChip {
        chip: Vec<i32>,
        id: i32,
    },
    AddWire {
        chip: Vec<i32>,
        wire: WireDescription,
    },
    RemoveWire {
        chip: Vec<i32>,
        wire: WireDescription,
    },
}

/// A clone-able handle for submitting commands to a simulator from any thread. The
/// simulator drains its queue at the next frame boundary and applies the commands in
/// submission order.
#[derive(Clone)]
pub struct CommandSender {
    tx: Sender<Command>,
}

impl CommandSender {
    pub(crate) fn new(tx: Sender<Command>) -> CommandSender {
        CommandSender { tx }
    }

    /// Enqueues one command. Returns false if the simulator is gone.
    pub fn submit(&self, command: Command) -> bool {
        self.tx.send(command).is_ok()
    }
}
