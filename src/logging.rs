//! Logger setup: every record goes to stdout and, when configured, to an
//! append-only results file, prefixed with a local timestamp.
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use env_logger::{Builder, Target};
use log::LevelFilter;

pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Writes each buffer to stdout and then to the results file.
pub struct Tee {
    file: Option<File>,
}

impl Tee {
    pub fn new(file: Option<File>) -> Self {
        Self { file }
    }
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write_all(buf)?;
        if let Some(file) = &mut self.file {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        if let Some(file) = &mut self.file {
            file.flush()?;
        }
        Ok(())
    }
}

pub fn open_log_file<P: AsRef<Path>>(path: P) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open log file {}", path.as_ref().display()))
}

pub fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    }
}

/// Install the global logger. Dependencies stay at `warn`; this crate logs at
/// the level chosen by `-v`.
pub fn init(verbosity: u8, file: Option<File>) {
    let _ = Builder::from_default_env()
        .filter_level(LevelFilter::Warn)
        .filter_module("ldapspray", level_for(verbosity))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {}",
                chrono::Local::now().format(TIMESTAMP_FORMAT),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(Tee::new(file))))
        .try_init();
}
