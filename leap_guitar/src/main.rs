//! leap_guitar — entry point.

use std::path::PathBuf;

use leap_guitar::app::{run, run_headless};
use leap_guitar::config::AppConfig;

const USAGE: &str = "\
usage: leap_guitar [--config <path>] [--headless]

  --config <path>  layer this TOML file over the built-in defaults
  --headless       no window: scripted players strum for [app] headless_secs
  --help           show this message

Set RUST_LOG=debug to watch arbitration decisions.";

/// Command-line flags.
#[derive(Debug, Default, PartialEq)]
struct CliOptions {
    config:   Option<PathBuf>,
    headless: bool,
    help:     bool,
}

impl CliOptions {
    fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self, String> {
        let mut opts = CliOptions::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let path = args.next().ok_or("--config needs a path")?;
                    opts.config = Some(PathBuf::from(path));
                }
                "--headless"      => opts.headless = true,
                "--help" | "-h"   => opts.help = true,
                other => return Err(format!("unknown argument `{}`", other)),
            }
        }
        Ok(opts)
    }
}

fn main() {
    // Set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let opts = match CliOptions::parse(std::env::args().skip(1)) {
        Ok(o)  => o,
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };
    if opts.help {
        println!("{}", USAGE);
        return;
    }

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║          Leap Guitar — one instrument, many hands            ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    #[cfg(feature = "leap")]
    println!("  Mode: LeapMotion hardware");
    #[cfg(not(feature = "leap"))]
    println!("  Mode: Keyboard simulation  (use --features leap for hardware)");

    let cfg = match AppConfig::load(opts.config.as_deref()) {
        Ok(c)  => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let strings: Vec<&str> = cfg.engine.strings.iter().map(|s| s.name.as_str()).collect();
    println!(
        "  Strings: {}   Frets: {}   Gating: {:?}   Remote players: {}",
        strings.join(" "),
        cfg.engine.fretboard.frets,
        cfg.engine.fretboard.gating,
        cfg.app.remote_users,
    );
    println!();

    let result = if opts.headless {
        run_headless(cfg)
    } else {
        println!("  Opening visualizer window…");
        println!();
        run(cfg)
    };

    if let Err(e) = result {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
