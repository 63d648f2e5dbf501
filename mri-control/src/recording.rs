//! An in-memory control plane.
//!
//! [`RecordingControlPlane`] keeps the state a switch would keep (mastership, forwarding program,
//! installed entries) and enforces the same ordering rules, without talking to any device. Every
//! request can be dumped as text to `<dir>/<switch>-p4runtime-requests.txt`. Used by the
//! controller binary for dry runs and by tests, which can also make writes fail on purpose.

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::{ControlError, ControlPlane, ProgramDescriptor, Session, TableEntry};

/// What the control plane knows about one switch.
#[derive(Debug, Default)]
struct SwitchRecord {
    address: Option<SocketAddr>,
    device_id: Option<u64>,
    master: bool,
    program: Option<ProgramDescriptor>,
    entries: Vec<TableEntry>,
    requests: Vec<String>,
    connected: bool,
    /// Writes accepted before every further write is rejected.
    fail_after: Option<usize>,
    writes: usize,
    refuse: bool,
}

/// An in-memory [`ControlPlane`]. Clones share the same switches.
#[derive(Debug, Clone, Default)]
pub struct RecordingControlPlane {
    switches: Arc<Mutex<FxHashMap<String, SwitchRecord>>>,
    dump_dir: Option<PathBuf>,
}

impl RecordingControlPlane {
    /// Creates a control plane with no switches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Dumps every request to `<dir>/<switch>-p4runtime-requests.txt`.
    pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_dir = Some(dir.into());
        self
    }

    /// Accepts `count` writes to `switch`, then rejects every further one.
    pub fn fail_writes_after(&self, switch: &str, count: usize) {
        self.switches.lock().entry(switch.to_owned()).or_default().fail_after = Some(count);
    }

    /// Refuses every session to `switch`.
    pub fn refuse(&self, switch: &str) {
        self.switches.lock().entry(switch.to_owned()).or_default().refuse = true;
    }

    /// Entries currently installed on `switch`, in write order.
    pub fn entries(&self, switch: &str) -> Vec<TableEntry> {
        self.with_record(switch, |record| record.entries.clone()).unwrap_or_default()
    }

    /// Every request received for `switch`, rendered as text.
    pub fn requests(&self, switch: &str) -> Vec<String> {
        self.with_record(switch, |record| record.requests.clone()).unwrap_or_default()
    }

    /// The program installed on `switch`, if any.
    pub fn program(&self, switch: &str) -> Option<ProgramDescriptor> {
        self.with_record(switch, |record| record.program.clone()).flatten()
    }

    /// The device id `switch` was opened with.
    pub fn device_id(&self, switch: &str) -> Option<u64> {
        self.with_record(switch, |record| record.device_id).flatten()
    }

    /// The address `switch` was opened on.
    pub fn address(&self, switch: &str) -> Option<SocketAddr> {
        self.with_record(switch, |record| record.address).flatten()
    }

    /// Whether a session to `switch` is open.
    pub fn is_connected(&self, switch: &str) -> bool {
        self.with_record(switch, |record| record.connected).unwrap_or(false)
    }

    fn with_record<T>(&self, switch: &str, f: impl FnOnce(&SwitchRecord) -> T) -> Option<T> {
        self.switches.lock().get(switch).map(f)
    }
}

#[async_trait::async_trait]
impl ControlPlane for RecordingControlPlane {
    type Session = RecordingSession;

    async fn establish(
        &self,
        switch: &str,
        address: SocketAddr,
        device_id: u64,
    ) -> Result<Self::Session, ControlError> {
        {
            let mut switches = self.switches.lock();
            let record = switches.entry(switch.to_owned()).or_default();

            let refusal = match (record.refuse, record.connected) {
                (true, _) => Some("connection refused"),
                (false, true) => Some("a session is already open"),
                (false, false) => None,
            };

            if let Some(reason) = refusal {
                return Err(ControlError::Connect {
                    switch: switch.to_owned(),
                    address,
                    reason: reason.to_owned(),
                });
            }
        }

        let dump = match &self.dump_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                let path = dir.join(format!("{switch}-p4runtime-requests.txt"));
                Some(Mutex::new(BufWriter::new(File::create(path)?)))
            }
            None => None,
        };

        if let Some(record) = self.switches.lock().get_mut(switch) {
            // A new session starts from a switch that forgot its controller.
            record.master = false;
            record.connected = true;
            record.address = Some(address);
            record.device_id = Some(device_id);
        }

        debug!(%switch, %address, device_id, "Established session");

        Ok(RecordingSession {
            switch: switch.to_owned(),
            device_id,
            switches: Arc::clone(&self.switches),
            dump,
        })
    }
}

/// A session of the [`RecordingControlPlane`].
#[derive(Debug)]
pub struct RecordingSession {
    switch: String,
    device_id: u64,
    switches: Arc<Mutex<FxHashMap<String, SwitchRecord>>>,
    dump: Option<Mutex<BufWriter<File>>>,
}

impl RecordingSession {
    /// Records `request` and runs `f` against the switch if the session is still open.
    fn request<T>(
        &self,
        request: String,
        f: impl FnOnce(&mut SwitchRecord) -> Result<T, ControlError>,
    ) -> Result<T, ControlError> {
        trace!(switch = %self.switch, %request, "Request");

        if let Some(dump) = &self.dump {
            let mut dump = dump.lock();
            writeln!(dump, "{request}")?;
            dump.flush()?;
        }

        let mut switches = self.switches.lock();
        let record = match switches.get_mut(&self.switch) {
            Some(record) if record.connected => record,
            _ => return Err(ControlError::Closed(self.switch.clone())),
        };

        record.requests.push(request);
        f(record)
    }

    fn require_master(&self, record: &SwitchRecord) -> Result<(), ControlError> {
        if record.master {
            Ok(())
        } else {
            Err(ControlError::NotMaster(self.switch.clone()))
        }
    }
}

#[async_trait::async_trait]
impl Session for RecordingSession {
    fn switch(&self) -> &str {
        &self.switch
    }

    async fn claim_mastership(&self) -> Result<(), ControlError> {
        self.request(format!("MasterArbitrationUpdate device_id={}", self.device_id), |record| {
            record.master = true;
            Ok(())
        })
    }

    async fn set_forwarding_program(&self, program: &ProgramDescriptor) -> Result<(), ControlError> {
        let request = format!(
            "SetForwardingPipelineConfig p4info={} device_config={}",
            program.p4info.display(),
            program.device_config.display()
        );

        self.request(request, |record| {
            self.require_master(record)?;
            // Loading a program wipes the tables.
            record.entries.clear();
            record.program = Some(program.clone());
            Ok(())
        })
    }

    async fn write_table_entry(&self, entry: &TableEntry) -> Result<(), ControlError> {
        self.request(format!("Write {entry}"), |record| {
            self.require_master(record)?;
            if record.program.is_none() {
                return Err(ControlError::NoProgram(self.switch.clone()));
            }

            if record.fail_after.is_some_and(|limit| record.writes >= limit) {
                return Err(ControlError::Rejected {
                    switch: self.switch.clone(),
                    reason: "write failure injected".to_owned(),
                });
            }

            record.writes += 1;
            record.entries.push(entry.clone());
            Ok(())
        })
    }

    async fn read_table_entries(&self) -> Result<Vec<TableEntry>, ControlError> {
        self.request("Read".to_owned(), |record| {
            if record.program.is_none() {
                return Err(ControlError::NoProgram(self.switch.clone()));
            }

            Ok(record.entries.clone())
        })
    }

    async fn shutdown(&self) -> Result<(), ControlError> {
        self.request("Shutdown".to_owned(), |record| {
            record.connected = false;
            record.master = false;
            Ok(())
        })?;

        debug!(switch = %self.switch, "Closed session");
        Ok(())
    }
}
