use anyhow::{Context, Result};
use clap::Parser;
use irrecord::backend::pigpiod::PigpiodClient;
use irrecord::capture::{CaptureConfig, EdgeCaptureEngine};
use irrecord::cli::Cli;
use irrecord::console::{ConsoleObserver, PromptChooser};
use irrecord::error::CaptureError;
use irrecord::pin::{Pin, PinConfig};
use irrecord::pulse_file::PulseFile;
use irrecord::session::{BurstSession, SessionConfig, SessionError};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit status when every burst came back empty
const EXIT_NO_BURSTS: u8 = 1;
/// Exit status when the pigpio daemon cannot be reached
const EXIT_BACKEND_UNAVAILABLE: u8 = 2;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn run(args: Cli) -> Result<()> {
    // reject bad parameters before connecting to the daemon
    let capture = CaptureConfig::from_secs(args.timeout, args.gap)?;
    let pin = Pin::new(args.in_gpio)?;

    let client = PigpiodClient::connect(&args.pigpiod_config())?;
    let engine = EdgeCaptureEngine::new(client, PinConfig::new(pin, args.invert()));
    let session = BurstSession::new(&engine, SessionConfig::new(args.bursts, capture));

    println!(
        "Waiting for IR signal on GPIO {} (timeout {}s). Press a button on the remote.",
        pin, args.timeout
    );

    let mut observer = ConsoleObserver::stdout();
    let outcome = match args.select {
        Some(index) => session.run(&mut observer, &mut |_: &[Vec<u32>]| index)?,
        None => session.run(&mut observer, &mut PromptChooser::stdio())?,
    };

    let pulses = outcome.into_pulses();
    let count = pulses.len();
    PulseFile::new(pin, pulses)
        .save(&args.out_file)
        .context("Failed to save captured burst")?;

    println!("Saved {} durations to {}", count, args.out_file.display());
    println!("Done.");
    Ok(())
}

fn exit_code(err: &anyhow::Error) -> ExitCode {
    if let Some(SessionError::NoBursts { .. }) = err.downcast_ref::<SessionError>() {
        println!("No bursts captured; exiting.");
        return ExitCode::from(EXIT_NO_BURSTS);
    }

    let unavailable = err
        .downcast_ref::<CaptureError>()
        .is_some_and(CaptureError::is_backend_unavailable)
        || err
            .downcast_ref::<SessionError>()
            .is_some_and(SessionError::is_backend_unavailable);

    eprintln!("Error: {:#}", err);
    if unavailable {
        eprintln!("Could not connect to pigpio daemon. Start it with: sudo pigpiod");
        return ExitCode::from(EXIT_BACKEND_UNAVAILABLE);
    }
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    let args = Cli::parse();

    // Initialize tracing if --debug flag is set
    init_tracing(args.debug);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => exit_code(&err),
    }
}
