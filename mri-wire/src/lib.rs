#![doc(issue_tracker_base_url = "https://github.com/chainbound/mri-rs/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Wire formats shared by the controller and the telemetry monitor.
//!
//! * [`telemetry`]: the link-layer frame carrying the MRI extension header and its per-hop
//!   switch traces.
//! * [`rulelog`]: the per-switch rule log written at installation time and read back by the
//!   monitor. Rule ids in the log are the same ids switches stamp into traces.

pub mod rulelog;
pub mod telemetry;

pub use rulelog::{RuleId, RuleRecord};
pub use telemetry::{DecodeError, EncodeError, SwitchTrace, TelemetryFrame, ETHERTYPE_MRI};
