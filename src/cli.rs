//! CLI argument parsing for irrecord

use clap::Parser;
use std::path::PathBuf;

use crate::backend::pigpiod::{PigpiodConfig, DEFAULT_HOST, DEFAULT_PORT};

#[derive(Parser, Debug)]
#[command(name = "irrecord")]
#[command(version)]
#[command(about = "Record IR signals (raw pulses).", long_about = None)]
pub struct Cli {
    /// GPIO pin number for IR receiver (BCM)
    #[arg(long = "in-gpio", value_name = "GPIO", default_value_t = 17)]
    pub in_gpio: u32,

    /// Output JSON file to save the raw pulses
    #[arg(long = "out-file", value_name = "PATH")]
    pub out_file: PathBuf,

    /// Max seconds to wait for a signal
    #[arg(long, value_name = "SECS", default_value_t = 10.0)]
    pub timeout: f64,

    /// Gap in seconds to consider burst finished
    #[arg(long, value_name = "SECS", default_value_t = 0.15)]
    pub gap: f64,

    /// Number of bursts to capture (choose one)
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub bursts: usize,

    /// Burst index to save when several are captured, instead of prompting
    #[arg(long, value_name = "INDEX")]
    pub select: Option<usize>,

    /// Receiver drives the line high during a mark (default assumes active-low output)
    #[arg(long = "no-invert")]
    pub no_invert: bool,

    /// pigpio daemon host
    #[arg(long, env = "PIGPIO_ADDR", default_value = DEFAULT_HOST)]
    pub host: String,

    /// pigpio daemon port
    #[arg(long, env = "PIGPIO_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Enable debug logging to stderr
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    pub fn invert(&self) -> bool {
        !self.no_invert
    }

    pub fn pigpiod_config(&self) -> PigpiodConfig {
        PigpiodConfig::new(self.host.clone(), self.port)
    }
}
