use std::path::Path;

use mri_wire::{rulelog, RuleRecord};
use rustc_hash::FxHashMap;
use tracing::info;

/// The rules installed on every switch, as recorded in the rule logs at installation time.
#[derive(Debug, Clone, Default)]
pub struct RuleBook {
    switches: FxHashMap<String, Vec<RuleRecord>>,
}

impl RuleBook {
    /// Creates a book with no rule logs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every rule log in `dir`.
    pub fn load(dir: impl AsRef<Path>) -> rulelog::Result<Self> {
        let dir = dir.as_ref();
        let book: Self = rulelog::read_dir(dir)?.into_iter().collect();

        info!(dir = %dir.display(), switches = book.len(), "Loaded rule logs");
        Ok(book)
    }

    /// Adds (or replaces) the rules of `switch`.
    pub fn insert(&mut self, switch: impl Into<String>, rules: Vec<RuleRecord>) {
        self.switches.insert(switch.into(), rules);
    }

    /// The rules of `switch`, in id order.
    pub fn rules(&self, switch: &str) -> Option<&[RuleRecord]> {
        self.switches.get(switch).map(Vec::as_slice)
    }

    /// Number of switches with a log.
    pub fn len(&self) -> usize {
        self.switches.len()
    }

    /// Returns `true` if no log was loaded.
    pub fn is_empty(&self) -> bool {
        self.switches.is_empty()
    }
}

impl FromIterator<(String, Vec<RuleRecord>)> for RuleBook {
    fn from_iter<I: IntoIterator<Item = (String, Vec<RuleRecord>)>>(iter: I) -> Self {
        Self { switches: iter.into_iter().collect() }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use ipnetwork::Ipv4Network;
    use mri_wire::rulelog::RuleLogWriter;
    use pnet::util::MacAddr;

    use super::*;

    fn rule(id: u16) -> RuleRecord {
        RuleRecord {
            id,
            match_prefix: Ipv4Network::new(Ipv4Addr::new(10, 0, id as u8, 0), 24).unwrap(),
            dst_mac: MacAddr::new(0, 0, 0, id as u8, 0, 0),
            port: id + 1,
            last_hop: false,
        }
    }

    #[test]
    fn loads_every_log_of_a_directory() {
        let dir = tempfile::tempdir().unwrap();

        let mut s1 = RuleLogWriter::create(dir.path(), "s1").unwrap();
        s1.append(&rule(0)).unwrap();
        s1.append(&rule(1)).unwrap();
        RuleLogWriter::create(dir.path(), "s2").unwrap().append(&rule(0)).unwrap();

        let book = RuleBook::load(dir.path()).unwrap();
        assert_eq!(book.len(), 2);
        assert_eq!(book.rules("s1").unwrap(), [rule(0), rule(1)]);
        assert_eq!(book.rules("s2").unwrap().len(), 1);
        assert!(book.rules("s3").is_none());
    }

    #[test]
    fn broken_logs_fail_to_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("s1"), "not json\n").unwrap();

        assert!(matches!(RuleBook::load(dir.path()), Err(rulelog::Error::Malformed { .. })));
    }
}
