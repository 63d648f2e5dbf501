use std::{net::Ipv4Addr, sync::Arc, time::Instant};

use mri::{
    control::{deploy, DeployOptions, RecordingControlPlane, SessionRegistry, TableEntry},
    monitor::{CongestionMonitor, MonitorOptions, RuleBook},
    topology::{TopologyDescription, TopologyError, TopologyGraph},
    wire::{rulelog, SwitchTrace, TelemetryFrame},
};

/// Three switches in a line, with the s1-s3 link missing.
const LINE: &str = r#"{
    "switches": ["s1", "s2", "s3"],
    "hosts": ["h1", "h3"],
    "links": [["s1", "h1"], ["s1", "s2"], ["s2", "s3"], ["s3", "h3"]]
}"#;

const H1: Ipv4Addr = Ipv4Addr::new(10, 0, 1, 1);
const H3: Ipv4Addr = Ipv4Addr::new(10, 0, 3, 3);

async fn deployed(rules_dir: &std::path::Path) -> (TopologyGraph, RecordingControlPlane) {
    let (graph, completion) = TopologyDescription::from_json(LINE).unwrap().compile().unwrap();
    assert!(completion.is_complete());

    let plane = RecordingControlPlane::new();
    let registry = SessionRegistry::new();
    let options = DeployOptions::default().rules_dir(rules_dir);

    let report = deploy(Arc::new(plane.clone()), &graph, options, registry.clone()).await;
    assert!(report.is_success(), "{:?}", report.failed);
    assert_eq!(registry.shutdown_all().await, 3);

    (graph, plane)
}

/// The trace each switch on the h1 -> h3 path would stamp.
fn path_traces(graph: &TopologyGraph, queue: [u32; 3]) -> Vec<SwitchTrace> {
    ["s1", "s2", "s3"]
        .into_iter()
        .zip(queue)
        .enumerate()
        .map(|(i, (switch, queue_depth))| SwitchTrace {
            switch_id: i as u16 + 1,
            queue_depth,
            timestamp: 1_000 * i as u32,
            time_delta: 100,
            rule_id: graph.lookup(switch, H3).unwrap().id,
        })
        .collect()
}

#[tokio::test]
async fn installed_tables_match_the_compiled_graph() {
    let _ = tracing_subscriber::fmt::try_init();

    let dir = tempfile::tempdir().unwrap();
    let (graph, plane) = deployed(dir.path()).await;

    for switch in ["s1", "s2", "s3"] {
        let logged = rulelog::read(rulelog::log_path(dir.path(), switch)).unwrap();
        assert_eq!(logged, graph.rules(switch));

        let entries = plane.entries(switch);
        let (swtrace, forwarding) = entries.split_last().unwrap();
        assert!(matches!(swtrace, TableEntry::Swtrace { .. }));

        let installed: Vec<_> = forwarding
            .iter()
            .map(|entry| match entry {
                TableEntry::Ipv4Lpm(rule) => rule.clone(),
                other => panic!("unexpected entry {other}"),
            })
            .collect();
        assert_eq!(installed, graph.rules(switch));
    }

    // s1 reaches s3 through s2 only thanks to the completion pass.
    assert_eq!(graph.trace_route("s1", "s3").unwrap(), ["s1", "s2", "s3"]);
}

#[tokio::test]
async fn congestion_is_attributed_with_the_installed_rules() {
    let _ = tracing_subscriber::fmt::try_init();

    let dir = tempfile::tempdir().unwrap();
    let (graph, _) = deployed(dir.path()).await;

    let rules = RuleBook::load(dir.path()).unwrap();
    assert_eq!(rules.len(), 3);

    let options = MonitorOptions::default().delay_threshold_us(10_000).queue_threshold(30);
    let monitor = CongestionMonitor::new(rules, options);

    let frame =
        TelemetryFrame::new(H1, path_traces(&graph, [2, 50, 4])).encode(H3, b"payload").unwrap();
    let reports = monitor.process_frame(&frame, Instant::now());

    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.switch, "s2");
    assert_eq!(report.flows.len(), 1);
    assert_eq!(report.flows[0].source, H1);
    assert_eq!(report.flows[0].packets, 1);
    assert_eq!(report.rules.len(), graph.rules("s2").len());

    let used = graph.lookup("s2", H3).unwrap().id;
    for tracked in &report.rules {
        let expected = u64::from(tracked.rule.id == used);
        assert_eq!(tracked.times_used, expected, "rule {}", tracked.rule.id);
    }

    let rendered = report.to_string();
    assert!(rendered.contains("Congestion on switch s2 caused by the following flows"));
    assert!(rendered.contains("Flow from 10.0.1.1"));

    assert_eq!(monitor.stats().samples(), 3);
    assert_eq!(monitor.stats().integrity_faults(), 0);
    assert_eq!(monitor.switch_ids(), [1, 2, 3]);
}

#[tokio::test]
async fn redeploying_truncates_the_rule_logs() {
    let dir = tempfile::tempdir().unwrap();
    let (graph, _) = deployed(dir.path()).await;
    deployed(dir.path()).await;

    let rules = RuleBook::load(dir.path()).unwrap();
    for switch in ["s1", "s2", "s3"] {
        assert_eq!(rules.rules(switch).unwrap(), graph.rules(switch));
    }
}

#[test]
fn switches_must_be_named_after_the_ids_they_report() {
    // The monitor finds the rule log of trace switch id 1 under `s1`, so `leaf1` could never be
    // matched to its rules and is refused before anything is deployed.
    let description = TopologyDescription::from_json(
        r#"{
            "switches": ["leaf1", "leaf2"],
            "hosts": ["h1"],
            "links": [["leaf1", "h1"], ["leaf1", "leaf2"], ["leaf2", "leaf1"]]
        }"#,
    )
    .unwrap();

    assert!(matches!(
        description.compile(),
        Err(TopologyError::InvalidNodeName { name, .. }) if name == "leaf1"
    ));
}
