// Copyright (c) 2021 Thomas J. Otterson
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use std::env;
use std::process;
use std::str::FromStr;

use log::{info, Level, Metadata, Record};

use breadboard::{
    ChipDescription, Config, Library, PinAddress, PinDescription, Simulator, Strategy,
    SubChipDescription, WireDescription,
};

static NAME: &str = "breadboard";
static VERSION: &str = env!("CARGO_PKG_VERSION");

/// A small console logger: level comes from the command line, records go to stdout.
struct ConsoleLogger {
    level: Level,
}

impl ConsoleLogger {
    fn enable(level: &str) -> Result<(), String> {
        let level = Level::from_str(level).map_err(|_| format!("invalid log level {}", level))?;
        let filter = level.to_level_filter();
        log::set_boxed_logger(Box::new(ConsoleLogger { level }))
            .map(|()| log::set_max_level(filter))
            .map_err(|_| "cannot initialize logging".to_string())
    }
}

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            println!("{} [{}] - {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

fn main() {
    match run(env::args().collect()) {
        Ok(rc) => process::exit(rc),
        Err(err) => {
            println!("Error: {}", err);
            process::exit(1);
        }
    }
}

fn build_cli_options() -> getopts::Options {
    let mut opts = getopts::Options::new();
    opts.optopt("", "strategy", "set scheduling strategy", "[reorder|topo]")
        .optopt("", "seed", "run deterministically from this seed", "number")
        .optopt("", "clock-steps", "frames per clock transition", "number")
        .optopt("", "frames", "number of frames to simulate", "number")
        .optopt("", "loglevel", "set log level", "[error|warn|info|debug|trace]")
        .optflag("", "metrics", "log frame progress")
        .optflag("h", "help", "display this help")
        .optflag("V", "version", "display this version");
    opts
}

fn build_config(matches: &getopts::Matches) -> Result<Config, String> {
    let strategy = match matches.opt_str("strategy").as_deref() {
        None | Some("reorder") => Strategy::Reorder,
        Some("topo") | Some("topological") => Strategy::Topological,
        Some(other) => return Err(format!("unknown strategy {}", other)),
    };
    let seed = match matches.opt_str("seed") {
        Some(text) => Some(
            text.parse::<u32>()
                .map_err(|_| format!("invalid seed {}", text))?,
        ),
        None => None,
    };
    let steps_per_clock = match matches.opt_str("clock-steps") {
        Some(text) => text
            .parse::<u32>()
            .map_err(|_| format!("invalid step count {}", text))?,
        None => 16,
    };
    Ok(Config {
        strategy,
        seed,
        steps_per_clock,
        metrics: matches.opt_present("metrics"),
    })
}

/// A clock blinking a pair of dev outputs, one of them through an inverter.
fn demo_circuit() -> ChipDescription {
    let mut desc = ChipDescription::composite("BLINKER");
    desc.outputs.push(PinDescription::new(0, "BLINK", 1));
    desc.outputs.push(PinDescription::new(1, "INVERSE", 1));
    desc.subchips.push(SubChipDescription::new("CLOCK", 0));
    desc.subchips.push(SubChipDescription::new("NAND", 1));
    desc.wires.push(WireDescription::new(
        PinAddress::new(0, 0),
        PinAddress::host(0),
    ));
    desc.wires.push(WireDescription::new(
        PinAddress::new(0, 0),
        PinAddress::new(1, 0),
    ));
    desc.wires.push(WireDescription::new(
        PinAddress::new(0, 0),
        PinAddress::new(1, 1),
    ));
    desc.wires.push(WireDescription::new(
        PinAddress::new(1, 2),
        PinAddress::host(1),
    ));
    desc
}

fn run(args: Vec<String>) -> Result<i32, String> {
    let opts = build_cli_options();
    let matches = opts
        .parse(&args[1..])
        .map_err(|f| format!("invalid arguments: {}", f))?;
    if matches.opt_present("help") {
        println!("{}", opts.usage(&format!("Usage: {} [options]", NAME)));
        return Ok(0);
    }
    if matches.opt_present("version") {
        println!("{} {}", NAME, VERSION);
        return Ok(0);
    }
    let loglevel = matches.opt_str("loglevel").unwrap_or_else(|| "info".to_string());
    ConsoleLogger::enable(&loglevel)?;

    let config = build_config(&matches)?;
    let frames = match matches.opt_str("frames") {
        Some(text) => text
            .parse::<u64>()
            .map_err(|_| format!("invalid frame count {}", text))?,
        None => 256,
    };

    info!(
        "running {} frames of the demo circuit ({:?} strategy, {} steps per clock)",
        frames, config.strategy, config.steps_per_clock
    );
    let mut sim = Simulator::new(&demo_circuit(), Library::new(), config)
        .map_err(|err| err.to_string())?;

    let blink = PinAddress::host(0);
    let inverse = PinAddress::host(1);
    let mut last = None;
    while sim.frame() < frames {
        sim.step_frame();
        let high = sim
            .pin_state(&[], &blink)
            .map(breadboard::state::first_bit_high)
            .ok_or("blink output went missing")?;
        if last != Some(high) {
            let inverted = sim
                .pin_state(&[], &inverse)
                .map(breadboard::state::first_bit_high)
                .ok_or("inverse output went missing")?;
            info!(
                "frame {:>5}: blink {} inverse {}",
                sim.frame(),
                high as u8,
                inverted as u8
            );
            last = Some(high);
        }
    }
    info!("done after {} frames", sim.frame());
    Ok(0)
}
