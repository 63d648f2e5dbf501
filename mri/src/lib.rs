#![doc(issue_tracker_base_url = "https://github.com/chainbound/mri-rs/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! A controller that compiles and installs forwarding state on programmable switches, and a
//! monitor that reads the in-band telemetry those switches stamp into packets.

pub use mri_common as common;
pub use mri_control as control;
pub use mri_monitor as monitor;
pub use mri_topology as topology;
pub use mri_wire as wire;
