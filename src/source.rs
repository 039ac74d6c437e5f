//! Credential enumeration for spray and validation runs.
//!
//! Spray mode walks passwords in the outer loop and accounts in the inner one,
//! so every account sees one password per round and the engine can rest
//! between rounds. Validation mode walks an explicit `account:password` list.
//!
//! Enumeration is lazy and single-use: [`CredentialSource::enumerate`]
//! consumes the source. Password and validation lists are streamed straight
//! from their [`LineIter`](crate::wordlist::LineIter).
use std::io;
use std::path::Path;

use anyhow::{Context, Result};

use crate::credential::{CredentialError, CredentialPair, parse_validation_line};
use crate::wordlist::{self, LineIter, is_blank, lines_from_vec};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error(transparent)]
    Malformed(#[from] CredentialError),
    #[error("failed to read credential list: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Spray,
    Validation,
}

/// Start of a group of pairs. Spray mode opens one round per password;
/// validation mode opens a single round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Round {
    pub index: usize,
    pub mode: Mode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emission {
    RoundStart(Round),
    Pair(CredentialPair),
}

pub enum CredentialSource {
    Spray {
        accounts: Vec<String>,
        passwords: LineIter,
    },
    Validation {
        lines: LineIter,
    },
}

impl CredentialSource {
    pub fn spray(accounts: Vec<String>, passwords: Vec<String>) -> Self {
        Self::Spray {
            accounts,
            passwords: lines_from_vec(passwords),
        }
    }

    pub fn validation(lines: Vec<String>) -> Self {
        Self::Validation {
            lines: lines_from_vec(lines),
        }
    }

    /// Load the account list and open the password list for streaming.
    pub fn spray_from_files<P: AsRef<Path>>(
        accounts_path: P,
        passwords_path: P,
        mmap_threshold_bytes: u64,
    ) -> Result<Self> {
        let accounts = wordlist::read_accounts(&accounts_path, mmap_threshold_bytes)?;
        let passwords = wordlist::iter_lines_auto(&passwords_path, mmap_threshold_bytes)?;
        Ok(Self::Spray {
            accounts,
            passwords,
        })
    }

    pub fn validation_from_file<P: AsRef<Path>>(path: P, mmap_threshold_bytes: u64) -> Result<Self> {
        let lines = wordlist::iter_lines_auto(&path, mmap_threshold_bytes)?;
        Ok(Self::Validation { lines })
    }

    pub fn mode(&self) -> Mode {
        match self {
            Self::Spray { .. } => Mode::Spray,
            Self::Validation { .. } => Mode::Validation,
        }
    }

    pub fn enumerate(self) -> Enumeration {
        match self {
            Self::Spray {
                accounts,
                passwords,
            } => Enumeration::Spray(SprayIter {
                accounts,
                passwords,
                round: 0,
                current: None,
                slot: 0,
            }),
            Self::Validation { lines } => Enumeration::Validation(ValidationIter {
                lines,
                index: 0,
                started: false,
            }),
        }
    }
}

/// Scan a validation file end to end and return the number of pairs it holds.
/// Used before any worker starts so a malformed line aborts the run early.
pub fn precheck_validation_file<P: AsRef<Path>>(path: P, mmap_threshold_bytes: u64) -> Result<usize> {
    let lines = wordlist::iter_lines_auto(&path, mmap_threshold_bytes)?;
    let mut pairs = 0;
    for (index, line) in lines.enumerate() {
        let line = line.with_context(|| format!("read {}", path.as_ref().display()))?;
        if is_blank(&line) {
            continue;
        }
        parse_validation_line(index, &line)
            .with_context(|| format!("in {}", path.as_ref().display()))?;
        pairs += 1;
    }
    Ok(pairs)
}

pub enum Enumeration {
    Spray(SprayIter),
    Validation(ValidationIter),
}

impl Iterator for Enumeration {
    type Item = Result<Emission, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Spray(it) => it.next(),
            Self::Validation(it) => it.next(),
        }
    }
}

pub struct SprayIter {
    accounts: Vec<String>,
    passwords: LineIter,
    round: usize,
    current: Option<String>,
    slot: usize,
}

impl Iterator for SprayIter {
    type Item = Result<Emission, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.accounts.is_empty() {
            return None;
        }
        if let Some(password) = &self.current {
            if let Some(account) = self.accounts.get(self.slot) {
                let pair = CredentialPair::spray(self.round, self.slot, account, password);
                self.slot += 1;
                return Some(Ok(Emission::Pair(pair)));
            }
            self.current = None;
            self.round += 1;
        }
        // Next non-blank password opens a new round.
        loop {
            match self.passwords.next()? {
                Err(e) => return Some(Err(SourceError::Io(e))),
                Ok(line) if is_blank(&line) => continue,
                Ok(line) => {
                    self.current = Some(line);
                    self.slot = 0;
                    return Some(Ok(Emission::RoundStart(Round {
                        index: self.round,
                        mode: Mode::Spray,
                    })));
                }
            }
        }
    }
}

pub struct ValidationIter {
    lines: LineIter,
    index: usize,
    started: bool,
}

impl Iterator for ValidationIter {
    type Item = Result<Emission, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            self.started = true;
            return Some(Ok(Emission::RoundStart(Round {
                index: 0,
                mode: Mode::Validation,
            })));
        }
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(SourceError::Io(e))),
            };
            let index = self.index;
            self.index += 1;
            if is_blank(&line) {
                continue;
            }
            return Some(
                parse_validation_line(index, &line)
                    .map(Emission::Pair)
                    .map_err(SourceError::from),
            );
        }
    }
}
