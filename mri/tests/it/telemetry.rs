use std::{
    net::Ipv4Addr,
    time::{Duration, Instant},
};

use bytes::Bytes;
use mri::{
    monitor::{CongestionMonitor, MonitorOptions, RuleBook},
    topology::rules,
    wire::{RuleRecord, SwitchTrace, TelemetryFrame},
};
use tokio::sync::mpsc;

const H1: Ipv4Addr = Ipv4Addr::new(10, 0, 1, 1);
const H2: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 2);

/// A rule book where s1 has two rules and s2 one.
fn rule_book() -> RuleBook {
    let rule = |id, target: u16, port| RuleRecord {
        id,
        match_prefix: rules::switch_subnet(target),
        dst_mac: rules::switch_mac(target),
        port,
        last_hop: false,
    };

    [("s1".to_owned(), vec![rule(0, 2, 1), rule(1, 3, 2)]), ("s2".to_owned(), vec![rule(0, 1, 1)])]
        .into_iter()
        .collect()
}

fn trace(switch_id: u16, queue_depth: u32, rule_id: u16) -> SwitchTrace {
    SwitchTrace { switch_id, queue_depth, timestamp: 0, time_delta: 50, rule_id }
}

fn frame(source: Ipv4Addr, traces: Vec<SwitchTrace>) -> Bytes {
    TelemetryFrame::new(source, traces).encode(H2, &[0; 8]).unwrap()
}

fn monitor() -> CongestionMonitor {
    let options = MonitorOptions::default()
        .delay_threshold_us(1_000)
        .queue_threshold(30)
        .cooldown(Duration::from_secs(1));
    CongestionMonitor::new(rule_book(), options)
}

#[test]
fn frames_without_telemetry_are_counted_and_skipped() {
    let monitor = monitor();
    let now = Instant::now();

    // Plain IPv4 ethernet frame.
    let mut plain = vec![0u8; 60];
    plain[12..14].copy_from_slice(&0x0800u16.to_be_bytes());
    assert!(monitor.process_frame(&plain, now).is_empty());

    let full = frame(H1, vec![trace(1, 90, 0)]);
    assert!(monitor.process_frame(&full[..full.len() - 20], now).is_empty());

    assert_eq!(monitor.stats().frames(), 2);
    assert_eq!(monitor.stats().ignored(), 1);
    assert_eq!(monitor.stats().truncated(), 1);
    assert_eq!(monitor.stats().samples(), 0);
    assert!(monitor.switch_ids().is_empty());
}

#[test]
fn integrity_faults_do_not_stop_the_remaining_traces() {
    let monitor = monitor();
    let now = Instant::now();

    // s9 has no rule log and s1 has no rule 7.
    let traces = vec![trace(9, 90, 0), trace(1, 90, 7), trace(2, 90, 0)];
    let reports = monitor.process_frame(&frame(H1, traces), now);

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].switch, "s2");
    assert_eq!(monitor.stats().integrity_faults(), 2);

    // The flow was still recorded on the switch with the unknown rule.
    let s1 = monitor.switch(1).unwrap();
    let s1 = s1.lock();
    assert_eq!(s1.flows().get(H1).unwrap().packets, 1);
    assert_eq!(s1.samples(), 0);
    assert!(s1.last_alert().is_none());
}

#[test]
fn reports_are_rate_limited_per_switch() {
    let monitor = monitor();
    let start = Instant::now();

    let congested = frame(H1, vec![trace(1, 90, 0), trace(2, 90, 0)]);

    assert_eq!(monitor.process_frame(&congested, start).len(), 2);
    assert!(monitor.process_frame(&congested, start + Duration::from_millis(500)).is_empty());

    let reports = monitor.process_frame(&congested, start + Duration::from_secs(1));
    let switches: Vec<_> = reports.iter().map(|report| report.switch.as_str()).collect();
    assert_eq!(switches, ["s1", "s2"]);

    assert_eq!(monitor.stats().reports(), 4);
}

#[test]
fn idle_flows_are_swept_and_reactivated() {
    let monitor = monitor();
    let start = Instant::now();

    monitor.process_frame(&frame(H1, vec![trace(1, 0, 0)]), start);
    monitor.process_frame(&frame(H2, vec![trace(1, 0, 1)]), start + Duration::from_secs(2));

    // Only H1 has been idle for more than the 2s activity timeout.
    assert_eq!(monitor.sweep(start + Duration::from_millis(2_500)), 1);
    assert_eq!(monitor.stats().deactivated(), 1);

    monitor.process_frame(&frame(H1, vec![trace(1, 0, 0)]), start + Duration::from_secs(3));

    let state = monitor.switch(1).unwrap();
    let state = state.lock();
    let h1 = state.flows().get(H1).unwrap();
    assert!(h1.active);
    assert_eq!(h1.packets, 2);
    assert_eq!(state.flows().active().count(), 2);
    assert_eq!(state.rule(0).unwrap().times_used, 2);
    assert_eq!(state.rule(1).unwrap().times_used, 1);
}

#[tokio::test]
async fn captured_frames_are_processed_in_order() {
    let _ = tracing_subscriber::fmt::try_init();

    let monitor = monitor();
    let frames = vec![
        frame(H1, vec![trace(1, 40, 0)]),
        frame(H2, vec![trace(1, 10, 1)]),
        frame(H2, vec![trace(2, 45, 0)]),
    ];

    let (tx, mut rx) = mpsc::channel(8);
    monitor.run(tokio_stream::iter(frames), tx).await;

    let mut reports = Vec::new();
    while let Some(report) = rx.recv().await {
        reports.push(report);
    }

    let switches: Vec<_> = reports.iter().map(|report| report.switch.as_str()).collect();
    assert_eq!(switches, ["s1", "s2"]);
    assert_eq!(reports[0].flows.len(), 1);
    assert_eq!(reports[0].trigger.queue_depth, 40);

    assert_eq!(monitor.stats().frames(), 3);
    assert_eq!(monitor.stats().samples(), 3);
}
