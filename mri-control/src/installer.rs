use std::{path::Path, sync::Arc};

use mri_wire::rulelog::RuleLogWriter;
use tracing::{debug, error};

use crate::{InstallError, Rule, RuleId, Session, TableEntry};

/// Installs the rules of one switch, in id order, and records each of them in the switch's rule
/// log once the switch has accepted it.
///
/// The log is the contract with the telemetry monitor: the ids switches stamp into traces are
/// looked up in it. A rule is only logged after its write succeeded, and every successful write
/// is logged before the next one starts.
#[derive(Debug)]
pub struct RuleInstaller<S> {
    session: Arc<S>,
    log: RuleLogWriter,
    installed: Vec<Rule>,
}

impl<S: Session> RuleInstaller<S> {
    /// Creates an installer appending to `log`, which must be empty.
    pub fn new(session: Arc<S>, log: RuleLogWriter) -> Self {
        Self { session, log, installed: Vec::new() }
    }

    /// Creates an installer writing to a fresh log for the session's switch inside `rules_dir`.
    /// Any previous log for that switch is truncated.
    pub fn create(session: Arc<S>, rules_dir: impl AsRef<Path>) -> Result<Self, InstallError> {
        let log = RuleLogWriter::create(rules_dir, session.switch())?;
        Ok(Self::new(session, log))
    }

    /// Writes `rule` to the switch, then appends it to the log. Returns the rule's id.
    ///
    /// Transport faults are returned as is, without retrying; the rule is then neither logged
    /// nor counted as installed.
    pub async fn install(&mut self, rule: &Rule) -> Result<RuleId, InstallError> {
        if usize::from(rule.id) != self.installed.len() {
            return Err(InstallError::OutOfOrder {
                switch: self.session.switch().to_owned(),
                expected: self.installed.len(),
                found: rule.id,
            });
        }

        let entry = TableEntry::Ipv4Lpm(rule.clone());
        if let Err(e) = self.session.write_table_entry(&entry).await {
            error!(switch = self.session.switch(), rule = rule.id, err = %e, "Failed to write rule");
            return Err(e.into());
        }

        self.log.append(rule)?;
        self.installed.push(rule.clone());

        debug!(switch = self.session.switch(), rule = rule.id, %entry, "Installed rule");

        Ok(rule.id)
    }

    /// Installs every rule of `rules` in order, stopping at the first failure.
    pub async fn install_all(&mut self, rules: &[Rule]) -> Result<usize, InstallError> {
        for rule in rules {
            self.install(rule).await?;
        }

        Ok(self.installed.len())
    }

    /// The rules installed so far, in id order.
    pub fn installed(&self) -> &[Rule] {
        &self.installed
    }

    /// The session rules are written through.
    pub fn session(&self) -> &Arc<S> {
        &self.session
    }
}
