//! The per-switch rule log.
//!
//! The controller writes one file per switch, named after the switch, with one JSON object
//! per installed rule:
//!
//! ```text
//! {"id":0,"match":"10.0.1.1/32","dst_mac":"00:00:00:00:01:01","port":1,"last_hop":true}
//! {"id":1,"match":"10.0.2.0/24","dst_mac":"00:00:00:02:00:00","port":2,"last_hop":false}
//! ```
//!
//! The file is the only contract between installation and monitoring, which may run as
//! separate processes. Ids are dense, start at 0 and appear in order.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use ipnetwork::Ipv4Network;
use pnet::util::MacAddr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of a rule within one switch. Two bytes on the wire.
pub type RuleId = u16;

/// Errors raised while writing or reading a rule log.
#[derive(Debug, Error)]
pub enum Error {
    /// The log or its directory could not be accessed.
    #[error("IO error on {path}: {source}")]
    Io {
        /// Path of the log or directory.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// A line is not a valid rule.
    #[error("malformed rule on {path}:{line}: {source}")]
    Malformed {
        /// Path of the log.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// Parse error.
        source: serde_json::Error,
    },
    /// Rule ids must be `0, 1, 2, ...` in line order.
    #[error("rule ids out of order on {path}:{line}: expected {expected}, found {found}")]
    NonDense {
        /// Path of the log.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// The id the line should carry.
        expected: RuleId,
        /// The id it carries.
        found: RuleId,
    },
    /// A rule could not be serialized.
    #[error("failed to encode rule {0}: {1}")]
    Encode(RuleId, serde_json::Error),
    /// The log already holds one rule per possible id.
    #[error("rule log {path} is full: ids are {} bits wide", RuleId::BITS)]
    Full {
        /// Path of the log.
        path: PathBuf,
    },
}

/// Result alias of the rule log.
pub type Result<T> = std::result::Result<T, Error>;

/// A forwarding rule as installed on a switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRecord {
    /// Position of the rule in the switch's table.
    pub id: RuleId,
    /// Destination prefix the rule matches.
    #[serde(rename = "match")]
    pub match_prefix: Ipv4Network,
    /// Link-layer destination written into matching packets.
    #[serde(with = "mac")]
    pub dst_mac: MacAddr,
    /// Egress port.
    pub port: u16,
    /// Whether the destination is a host attached to the switch.
    pub last_hop: bool,
}

/// Appends rules to one switch's log.
#[derive(Debug)]
pub struct RuleLogWriter {
    path: PathBuf,
    file: File,
    next_id: usize,
}

impl RuleLogWriter {
    /// Creates (or truncates) the log for `switch` inside `dir`, creating `dir` if needed.
    pub fn create(dir: impl AsRef<Path>, switch: &str) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|source| Error::Io { path: dir.to_path_buf(), source })?;

        let path = log_path(dir, switch);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| Error::Io { path: path.clone(), source })?;

        tracing::debug!(path = %path.display(), "Created rule log");

        Ok(Self { path, file, next_id: 0 })
    }

    /// Appends `rule` and flushes it to disk. Rules must be appended in id order.
    pub fn append(&mut self, rule: &RuleRecord) -> Result<()> {
        let expected =
            RuleId::try_from(self.next_id).map_err(|_| Error::Full { path: self.path.clone() })?;
        if rule.id != expected {
            return Err(Error::NonDense {
                path: self.path.clone(),
                line: self.next_id + 1,
                expected,
                found: rule.id,
            });
        }

        let mut line = serde_json::to_string(rule).map_err(|e| Error::Encode(rule.id, e))?;
        line.push('\n');

        self.file
            .write_all(line.as_bytes())
            .and_then(|_| self.file.sync_data())
            .map_err(|source| Error::Io { path: self.path.clone(), source })?;

        self.next_id += 1;
        Ok(())
    }

    /// Number of rules written so far.
    pub fn len(&self) -> usize {
        self.next_id
    }

    /// Returns `true` if nothing was written yet.
    pub fn is_empty(&self) -> bool {
        self.next_id == 0
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Returns the path of the log for `switch` inside `dir`.
pub fn log_path(dir: impl AsRef<Path>, switch: &str) -> PathBuf {
    dir.as_ref().join(switch)
}

/// Reads a whole rule log, checking that ids are dense and ordered. Blank lines are skipped.
pub fn read(path: impl AsRef<Path>) -> Result<Vec<RuleRecord>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| Error::Io { path: path.to_path_buf(), source })?;

    let mut rules = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
        if line.trim().is_empty() {
            continue;
        }

        let rule: RuleRecord = serde_json::from_str(&line).map_err(|source| Error::Malformed {
            path: path.to_path_buf(),
            line: index + 1,
            source,
        })?;

        let expected =
            RuleId::try_from(rules.len()).map_err(|_| Error::Full { path: path.to_path_buf() })?;
        if rule.id != expected {
            return Err(Error::NonDense {
                path: path.to_path_buf(),
                line: index + 1,
                expected,
                found: rule.id,
            });
        }

        rules.push(rule);
    }

    Ok(rules)
}

/// Reads every rule log in `dir`, keyed by switch name (the file name), sorted by name.
pub fn read_dir(dir: impl AsRef<Path>) -> Result<Vec<(String, Vec<RuleRecord>)>> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|source| Error::Io { path: dir.to_path_buf(), source })?;

    let mut logs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| Error::Io { path: dir.to_path_buf(), source })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
            tracing::warn!(path = %path.display(), "Skipping rule log with a non UTF-8 name");
            continue;
        };

        let rules = read(&path)?;
        logs.push((name, rules));
    }

    logs.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(logs)
}

/// Serializes [`MacAddr`] as its colon-separated text form.
mod mac {
    use pnet::util::MacAddr;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(mac: &MacAddr, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(mac)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<MacAddr, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(|e| de::Error::custom(format!("invalid MAC address {text}: {e:?}")))
    }
}
