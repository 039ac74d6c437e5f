//! Line-oriented list readers for account, password and validation files.
//!
//! Small files go through a buffered reader; files at or above the mmap
//! threshold are memory-mapped and scanned for `\n` boundaries. Both paths
//! strip a trailing `\r` and decode lossily so odd bytes in password lists do
//! not abort a run.
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use memmap2::Mmap;

/// Threshold in bytes above which list files are memory-mapped.
pub const DEFAULT_MMAP_THRESHOLD_BYTES: u64 = 16 * 1024 * 1024; // 16 MiB

pub type LineIter = Box<dyn Iterator<Item = io::Result<String>> + Send + 'static>;

pub fn should_use_mmap(file_size_bytes: u64, threshold_bytes: u64) -> bool {
    file_size_bytes >= threshold_bytes
}

pub fn iter_lines_bufread<P: AsRef<Path>>(path: P) -> Result<LineIter> {
    let file = File::open(&path).with_context(|| format!("open {}", path.as_ref().display()))?;
    let reader = BufReader::new(file);
    let lines = reader
        .split(b'\n')
        .map(|chunk| chunk.map(|bytes| line_from_bytes(&bytes)));
    Ok(Box::new(lines))
}

pub fn iter_lines_mmap<P: AsRef<Path>>(path: P) -> Result<LineIter> {
    let file = File::open(&path).with_context(|| format!("open {}", path.as_ref().display()))?;
    // Safety: the map is read-only and lives as long as the iterator.
    let mmap =
        unsafe { Mmap::map(&file) }.with_context(|| format!("mmap {}", path.as_ref().display()))?;
    Ok(Box::new(MmapLines { mmap, pos: 0 }))
}

struct MmapLines {
    mmap: Mmap,
    pos: usize,
}

impl Iterator for MmapLines {
    type Item = io::Result<String>;
    fn next(&mut self) -> Option<Self::Item> {
        let data: &[u8] = &self.mmap;
        if self.pos >= data.len() {
            return None;
        }
        let start = self.pos;
        if let Some(off) = memchr::memchr(b'\n', &data[start..]) {
            let end = start + off;
            self.pos = end + 1;
            Some(Ok(line_from_bytes(&data[start..end])))
        } else {
            self.pos = data.len();
            Some(Ok(line_from_bytes(&data[start..])))
        }
    }
}

fn line_from_bytes(bytes: &[u8]) -> String {
    let slice = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(slice).into_owned()
}

/// Open a list file, picking mmap or buffered reads by size.
pub fn iter_lines_auto<P: AsRef<Path>>(path: P, threshold_bytes: u64) -> Result<LineIter> {
    let meta =
        std::fs::metadata(&path).with_context(|| format!("stat {}", path.as_ref().display()))?;
    if meta.is_file() && should_use_mmap(meta.len(), threshold_bytes) {
        iter_lines_mmap(path)
    } else {
        iter_lines_bufread(path)
    }
}

pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Read the whole account list into memory, trimming names and dropping
/// blank lines. Spray mode walks this list once per password.
pub fn read_accounts<P: AsRef<Path>>(path: P, threshold_bytes: u64) -> Result<Vec<String>> {
    let mut accounts = Vec::new();
    for line in iter_lines_auto(&path, threshold_bytes)? {
        let line = line.with_context(|| format!("read {}", path.as_ref().display()))?;
        if !is_blank(&line) {
            accounts.push(line.trim().to_string());
        }
    }
    Ok(accounts)
}

/// Adapt an in-memory list to the same iterator shape the file readers use.
pub fn lines_from_vec(lines: Vec<String>) -> LineIter {
    Box::new(lines.into_iter().map(Ok))
}
