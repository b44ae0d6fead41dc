//! Command-line host for the 7.3" six-color e-Paper panel
//!
//! Every drawing command claims the panel, runs, puts the panel to sleep and
//! releases the lines again before exiting.
//!
//! # Usage
//!
//! ```bash
//! # Geometry and palette, no hardware touched
//! epd7in3e-ctl info
//! epd7in3e-ctl colors
//!
//! # Blank to white, then show the built-in bands
//! epd7in3e-ctl clear white
//! epd7in3e-ctl pattern blocks
//!
//! # Show a raw packed frame (exactly 192000 bytes)
//! epd7in3e-ctl --backend sysfs display frame.bin
//! ```
//!
//! `EPD_BACKEND`, `EPD_GPIOCHIP`, `EPD_SPIDEV` and `EPD_SPI_HZ` are read first;
//! flags override them.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use epd7in3e::{BackendVariant, Builder, Color, Config, LinuxModule, Pattern, PALETTE};

#[derive(Parser)]
#[command(name = "epd7in3e-ctl")]
#[command(version)]
#[command(about = "Drive a 7.3 inch six-color e-Paper panel over GPIO and SPI")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Pin and bus implementation (cdev, sysfs or bitbang)
    #[arg(short, long, global = true)]
    backend: Option<BackendVariant>,

    /// GPIO character device
    #[arg(long, global = true)]
    gpiochip: Option<String>,

    /// spidev node
    #[arg(long, global = true)]
    spidev: Option<String>,

    /// SPI clock in Hz
    #[arg(long, global = true)]
    spi_hz: Option<u32>,

    /// Leave the panel powered instead of sending it to sleep
    #[arg(long, global = true)]
    no_sleep: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Reset and initialize the panel, then release it
    Init,

    /// Fill the panel with one color
    Clear {
        /// Palette color name
        #[arg(default_value = "white", value_parser = parse_color)]
        color: Color,
    },

    /// Show a built-in test image
    Pattern {
        /// blocks (horizontal bands) or bars (vertical bars)
        #[arg(default_value = "blocks")]
        pattern: Pattern,
    },

    /// Show a raw packed frame read from a file
    Display {
        /// File holding exactly one packed frame
        path: PathBuf,
    },

    /// Initialize the panel and put it into deep sleep
    Sleep,

    /// Print the panel geometry and wiring
    Info,

    /// Print the palette
    Colors,
}

fn parse_color(name: &str) -> Result<Color, String> {
    Color::from_name(name).ok_or_else(|| {
        let names: Vec<&str> = PALETTE.iter().map(|(n, _)| *n).collect();
        format!("unknown color '{name}' (expected one of {})", names.join(", "))
    })
}

fn config(cli: &Cli) -> Result<Config> {
    let mut builder = Builder::new()
        .with_env(|name| std::env::var(name).ok())
        .context("reading EPD_* environment")?;

    if let Some(backend) = cli.backend {
        builder = builder.backend(backend);
    }
    if let Some(path) = &cli.gpiochip {
        builder = builder.gpiochip(path.clone());
    }
    if let Some(path) = &cli.spidev {
        builder = builder.spidev(path.clone());
    }
    if let Some(hz) = cli.spi_hz {
        builder = builder.spi_speed_hz(hz);
    }

    builder.build().context("invalid panel configuration")
}

type Module = LinuxModule;

/// Claim and initialize the panel, run `draw`, then sleep unless asked not to
fn with_panel<F>(config: &Config, sleep: bool, draw: F) -> Result<()>
where
    F: FnOnce(&mut Module) -> Result<()>,
{
    let mut module = Module::open(config);
    module
        .init()
        .with_context(|| format!("initializing panel via {:?} backend", config.backend))?;

    let result = draw(&mut module).and_then(|()| {
        if sleep {
            module.sleep().context("entering deep sleep")?;
        }
        Ok(())
    });

    module.exit();
    result
}

fn print_info(config: &Config) {
    println!("Panel:       {} x {} pixels", Module::width(), Module::height());
    println!("Frame size:  {} bytes", Module::buffer_size());
    println!("Backend:     {:?}", config.backend);
    println!("GPIO chip:   {}", config.gpiochip);
    println!("spidev:      {} @ {} Hz", config.spidev, config.spi_speed_hz);

    let pins = config.pins;
    println!(
        "Pins (BCM):  RST={} DC={} CS={} BUSY={} PWR={}",
        pins.reset, pins.data_command, pins.chip_select, pins.busy, pins.power
    );
    if config.backend.drives_serial_lines() {
        println!(
            "             MOSI={} SCLK={}",
            pins.serial_out, pins.serial_clock
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config = config(&cli)?;
    let sleep = !cli.no_sleep;
    log::debug!("Using {config:?}");

    match cli.command {
        Commands::Info => {
            print_info(&config);
            Ok(())
        }
        Commands::Colors => {
            for (name, color) in Module::colors() {
                println!("{name:<7} 0x{:X}", color.code());
            }
            Ok(())
        }
        Commands::Init => with_panel(&config, false, |_| Ok(())),
        Commands::Sleep => with_panel(&config, true, |_| Ok(())),
        Commands::Clear { color } => with_panel(&config, sleep, |module| {
            module
                .clear(color)
                .with_context(|| format!("clearing to {color}"))
        }),
        Commands::Pattern { pattern } => with_panel(&config, sleep, |module| {
            module
                .show_pattern(pattern)
                .with_context(|| format!("showing {} pattern", pattern.name()))
        }),
        Commands::Display { path } => {
            let frame = std::fs::read(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            if frame.len() != Module::buffer_size() {
                anyhow::bail!(
                    "{} is {} bytes, a frame is exactly {} bytes",
                    path.display(),
                    frame.len(),
                    Module::buffer_size()
                );
            }
            with_panel(&config, sleep, |module| {
                module.display(&frame).context("displaying frame")
            })
        }
    }
}
