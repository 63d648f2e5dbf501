#![doc(issue_tracker_base_url = "https://github.com/chainbound/mri-rs/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Helpers shared by the controller and the telemetry monitor.

mod task;
pub use task::JoinMap;

/// Prefix used for switch names. The telemetry path only knows numeric switch ids and
/// maps them back to names with [`switch_name`].
pub const SWITCH_PREFIX: &str = "s";

/// Returns the number formed by the trailing ASCII digits of `name`, if any.
///
/// ```
/// assert_eq!(mri_common::numeric_suffix("s12"), Some(12));
/// assert_eq!(mri_common::numeric_suffix("leaf"), None);
/// ```
pub fn numeric_suffix(name: &str) -> Option<u32> {
    let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }

    name[name.len() - digits..].parse().ok()
}

/// Returns the canonical name of the switch with the given numeric id.
#[inline]
pub fn switch_name(id: u16) -> String {
    format!("{SWITCH_PREFIX}{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffixes() {
        assert_eq!(numeric_suffix("s1"), Some(1));
        assert_eq!(numeric_suffix("h22"), Some(22));
        assert_eq!(numeric_suffix("spine007"), Some(7));
        assert_eq!(numeric_suffix("s"), None);
        assert_eq!(numeric_suffix(""), None);
        // Overflowing suffixes are not ids.
        assert_eq!(numeric_suffix("s99999999999"), None);
    }

    #[test]
    fn names_round_trip() {
        assert_eq!(switch_name(3), "s3");
        assert_eq!(numeric_suffix(&switch_name(513)), Some(513));
    }
}
