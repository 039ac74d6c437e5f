//! Export helpers for writing the valid credentials of a run to disk.
//!
//! `save_valid_credentials_csv` writes one `reference_id,account,password`
//! row per successful bind, sorted by account.
use std::path::Path;

use anyhow::{Context, Result};
use csv::Writer;
use serde::Serialize;

use crate::engine::RunSummary;

#[derive(Debug, Serialize)]
struct Row<'a> {
    reference_id: &'a str,
    account: &'a str,
    password: &'a str,
}

pub fn save_valid_credentials_csv<P: AsRef<Path>>(summary: &RunSummary, path: P) -> Result<()> {
    let path = path.as_ref();
    let mut found: Vec<_> = summary.successes.iter().collect();
    found.sort_by(|a, b| a.account.cmp(&b.account));
    let mut wtr =
        Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    for pair in found {
        wtr.serialize(Row {
            reference_id: &pair.reference_id,
            account: &pair.account,
            password: &pair.password,
        })?;
    }
    // Header only comes from serialize, so write it explicitly for empty runs.
    if summary.successes.is_empty() {
        wtr.write_record(["reference_id", "account", "password"])?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::CredentialPair;
    use tempfile::tempdir;

    #[test]
    fn writes_sorted_rows_with_header() {
        let summary = RunSummary {
            successes: vec![
                CredentialPair::spray(1, 3, "zed", "Autumn,2024"),
                CredentialPair::spray(0, 0, "amy", "Winter2024"),
            ],
            ..RunSummary::default()
        };
        let dir = tempdir().unwrap();
        let path = dir.path().join("valid.csv");
        save_valid_credentials_csv(&summary, &path).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "reference_id,account,password");
        assert_eq!(lines[1], "0-0,amy,Winter2024");
        assert_eq!(lines[2], "1-3,zed,\"Autumn,2024\"");
    }

    #[test]
    fn empty_run_still_writes_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("valid.csv");
        save_valid_credentials_csv(&RunSummary::default(), &path).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.trim(), "reference_id,account,password");
    }

    #[test]
    fn unwritable_path_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("valid.csv");
        assert!(save_valid_credentials_csv(&RunSummary::default(), &path).is_err());
    }
}
