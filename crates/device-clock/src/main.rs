//! Device Clock: plays a square wave and, using the output device's sample
//! clock, starts an identical square wave half a period later so the two
//! cancel. What you should hear is a short burst of tone followed by silence.
//!
//! ## Commands
//! - `clock`: print sample offset, device clock, frequency and update size.
//! - `latency`: print sample offset, device clock in nanoseconds and latency.
//! - `offset`: print only the sample offset of each source.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use clap::Parser;
use device_clock::cli::Args;
use device_clock::config::{DemoConfig, FileConfig};
use device_clock::runtime;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,device_clock=info")),
        )
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    let mut config = DemoConfig::default();
    if let Some(path) = &args.config {
        config = config.merge(FileConfig::load(path)?);
    }
    let config = config.merge(args.overrides());
    config.validate()?;

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        let _ = ctrlc::set_handler(move || {
            if cancel.swap(true, Ordering::Relaxed) {
                std::process::exit(130);
            }
        });
    }

    if let Err(e) = runtime::run(&config, args.variant(), &cancel) {
        tracing::error!("{e:#}");
        std::process::exit(1);
    }
    Ok(())
}
