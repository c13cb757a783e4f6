pub mod activity;
pub mod cli;
pub mod config;
pub mod data;
pub mod io_utils;
pub mod loader;
pub mod mapping;
pub mod normalize;
pub mod pipeline;
pub mod report;
pub mod source;
pub mod store;
pub mod table;
pub mod verify;

use std::{
    env,
    fs::File,
    io::{self, Write},
    path::Path,
    sync::OnceLock,
};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug};

use crate::cli::Cli;

static LOGGER: OnceLock<()> = OnceLock::new();

/// Log sink that writes every line to stderr and to a file.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let file = match log_file {
        Some(path) => Some(
            File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Opening log file {path:?}"))?,
        ),
        None => None,
    };
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("patient_migrate", LevelFilter::Info);
        }
        if let Some(file) = file {
            builder.target(env_logger::Target::Pipe(Box::new(Tee { file })));
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;
    debug!("Parsed arguments: {cli:?}");
    pipeline::execute(&cli)
}
