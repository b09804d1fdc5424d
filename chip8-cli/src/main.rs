//! Entrypoint for CLI
mod clock;

use std::{env, error::Error, time::Instant};

use chip8::{prelude::*, Hz, IMPL_VERSION};
use log::{error, info, warn};

use self::clock::Clock;

static USAGE: &str = r#"
usage: chip8 run FILE [HZ]

Runs the target ROM file. HZ sets the CPU clock frequency;
0 (the default) runs the interpreter unthrottled.

examples:
    chip8 run breakout.rom
    chip8 run breakout.rom 600
"#;

/// Upper bound on ticks so a looping ROM cannot hang a headless run.
const MAX_STEPS: usize = 1_000_000;

fn run_rom(filepath: &str, frequency: Hz) -> Chip8Result<()> {
    let mut vm = Chip8Vm::new(Chip8Conf {
        clock_frequency: Some(frequency),
    });

    let size = vm.load_rom(filepath)?;
    info!("loaded {size} byte ROM {filepath}");

    let mut clock = Clock::new(frequency.into());
    let start = Instant::now();

    for _ in 0..MAX_STEPS {
        clock.wait();

        match vm.tick() {
            Ok(Flow::KeyWait) => {
                // No input source is attached in a headless run.
                let target = vm.wait_register().unwrap_or_default();
                warn!("machine is waiting for a keypress into v{target:X}; stopping");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                error!("fault: {err}");
                println!("{}", vm.dump_display());
                return Err(err);
            }
        }

        if vm.redraw() {
            vm.clear_redraw();
        }
    }

    println!(
        "time taken: {}ms",
        start.elapsed().as_nanos() as f64 / 1000000.0
    ); // to millis
    println!("{}", vm.dump_display());

    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    simple_logger::SimpleLogger::new().env().init().unwrap();

    match parse_args() {
        Some(Cmd::Run { filepath, frequency }) => run_rom(&filepath, frequency)?,
        None => {
            print_usage();
            // FreeBSD EX_USAGE (64)
            std::process::exit(64)
        }
    }

    Ok(())
}

fn parse_args() -> Option<Cmd> {
    let mut args = env::args().skip(1);
    match args.next()?.as_str() {
        "run" => {
            let filepath = args.next()?;
            let frequency = match args.next() {
                Some(hz) => Hz(hz.parse().ok()?),
                None => Hz(0),
            };
            Some(Cmd::Run { filepath, frequency })
        }
        _ => None,
    }
}

fn print_usage() {
    println!("Chip8 v{IMPL_VERSION}");
    println!("{USAGE}");
}

enum Cmd {
    /// Run file
    Run { filepath: String, frequency: Hz },
}
