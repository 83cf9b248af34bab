// Copyright (c) 2021 Thomas J. Otterson
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

#[macro_use]
mod macros;

pub mod components;
pub mod library;
pub mod process;
pub mod sim;
pub mod state;

#[cfg(test)]
pub mod test_utils;

pub use crate::components::chip::{Chip, ChipKind, ChipRef};
pub use crate::components::pin::{Mode, Pin, PinRef};
pub use crate::library::{
    BuildError, ChipDescription, Library, PinAddress, PinDescription, SubChipDescription,
    WireDescription, HOST,
};
pub use crate::sim::queue::{Command, CommandSender};
pub use crate::sim::{AudioSink, Config, InputHandle, SimCtx, Simulator, Strategy};
