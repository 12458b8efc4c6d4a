//! End-to-end inspection over the in-memory cluster.

mod common;

use std::thread;
use std::time::Duration;

use common::{healthy_stream, in_progress, name, sealed, sealed_with_lac_ahead};
use seglog_error::{Result, SeglogError};
use seglog_inspect::{
    CorruptionReason, InspectConfig, InspectEvent, InspectEventRingBuffer, InspectionReport,
    Inspector, LedgerHandle, LogHandle, MemoryCluster, Namespace, PartialScanPolicy,
    QuorumReader, REPORT_SCHEMA_VERSION, ReportOptions, ScanCompleteness, SequenceMode,
    SequenceViolation, StreamIter, WorkerStatus, check_segment,
};
use seglog_types::{Entry, StreamName};

fn inspect(cluster: &MemoryCluster, config: InspectConfig) -> Result<InspectionReport> {
    Inspector::new(config, cluster, cluster, cluster).run()
}

#[test]
fn duplicate_sealed_segment_flags_orders_at_third_segment() {
    let cluster = MemoryCluster::new();
    sealed(&cluster, "orders", 1, 11, 3);
    sealed(&cluster, "orders", 2, 12, 3);
    sealed(&cluster, "orders", 2, 13, 3);
    healthy_stream(&cluster, "payments", 20, 3);

    let report = inspect(&cluster, InspectConfig::default()).expect("inspect");
    assert!(report.is_complete());
    assert_eq!(report.scanned, 2);
    assert_eq!(report.render_stream_names(), "orders\n");

    let orders = report.candidate(&name("orders")).expect("orders flagged");
    assert_eq!(
        orders.reasons,
        vec![CorruptionReason::Sequence(SequenceViolation::Gap {
            index: 2,
            expected: 3,
            actual: 2,
        })]
    );
    let seq_nos: Vec<u64> = orders
        .segments
        .iter()
        .map(|finding| finding.segment.seq_no)
        .collect();
    assert_eq!(seq_nos, [1, 2, 2]);
    assert!(orders.segments.iter().all(|finding| !finding.ledger_mismatch()));

    let full = report.render_full(&ReportOptions::default());
    assert!(full.contains("stream orders"));
    assert!(full.contains("expected 3, found 2"));
    assert_eq!(full.matches("orders:2 [").count(), 2);
    assert_eq!(cluster.open_handles(), 0);
}

#[test]
fn clean_namespace_across_workers_reports_nothing() {
    let cluster = MemoryCluster::new();
    for (index, stream) in ["a", "b", "c", "d", "e"].iter().enumerate() {
        healthy_stream(&cluster, stream, 100 * (index as u64 + 1), 4);
    }
    cluster.add_stream(name("empty"));

    let report = inspect(&cluster, InspectConfig::default().with_workers(4)).expect("inspect");
    assert!(report.is_complete());
    assert_eq!(report.selected, 6);
    assert_eq!(report.scanned, 6);
    assert!(report.candidates.is_empty());
    assert_eq!(report.workers.len(), 3);
    assert_eq!(report.render_stream_names(), "");
}

#[test]
fn prefix_limits_selection() {
    let cluster = MemoryCluster::new();
    sealed(&cluster, "orders-eu", 1, 1, 2);
    sealed(&cluster, "orders-eu", 3, 2, 2);
    sealed(&cluster, "payments", 1, 3, 2);
    sealed(&cluster, "payments", 3, 4, 2);

    let report =
        inspect(&cluster, InspectConfig::default().with_prefix("orders")).expect("inspect");
    assert_eq!(report.selected, 1);
    assert_eq!(report.render_stream_names(), "orders-eu\n");
}

#[test]
fn lac_ahead_of_data_is_inconsistent() {
    let cluster = MemoryCluster::new();
    sealed(&cluster, "orders", 1, 1, 3);
    sealed_with_lac_ahead(&cluster, "orders", 2, 2, 3, 2);
    in_progress(&cluster, "orders", 3, 3, 1);

    let report = inspect(&cluster, InspectConfig::default()).expect("inspect");
    let orders = report.candidate(&name("orders")).expect("flagged");
    assert_eq!(
        orders.reasons,
        vec![CorruptionReason::LedgerInconsistent {
            seq_no: 2,
            ledger_id: 2,
            stored_last_confirmed: 4,
            observed_last_entry_id: None,
        }]
    );
    let repairable: Vec<u64> = orders
        .repairable_segments()
        .map(|finding| finding.segment.seq_no)
        .collect();
    assert_eq!(repairable, [2]);
    assert!(!cluster.is_fenced(2).expect("ledger"), "inspection must not fence");
}

#[test]
fn entries_beyond_lac_are_inconsistent() {
    let cluster = MemoryCluster::new();
    let segment = sealed(&cluster, "orders", 1, 1, 5);
    cluster.set_last_add_confirmed(1, 2).expect("lac");

    let result = check_segment(&cluster, &cluster, &segment).expect("check");
    assert!(!result.matches);
    assert_eq!(result.stored_last_confirmed, 2);
    assert_eq!(result.observed_last_entry_id, Some(4));
}

/// Quorum reader whose replicas lost the entry at the LAC.
struct OneShortQuorum;

impl QuorumReader for OneShortQuorum {
    fn forward_read_from_last_confirmed(&self, ledger: &dyn LedgerHandle) -> Result<Vec<Entry>> {
        let lac = ledger.last_add_confirmed();
        ledger.read_entries(lac - 1, lac - 1)
    }
}

#[test]
fn observed_one_below_lac_is_inconsistent_with_both_values() {
    let cluster = MemoryCluster::new();
    let segment = sealed(&cluster, "orders", 1, 1, 6);

    let healthy = check_segment(&cluster, &cluster, &segment).expect("check");
    assert!(healthy.matches);
    assert_eq!(healthy.observed_last_entry_id, Some(5));

    let short = check_segment(&cluster, &OneShortQuorum, &segment).expect("check");
    assert!(!short.matches);
    assert_eq!(short.stored_last_confirmed, 5);
    assert_eq!(short.observed_last_entry_id, Some(4));

    let report = Inspector::new(InspectConfig::default(), &cluster, &cluster, &OneShortQuorum)
        .run()
        .expect("inspect");
    assert_eq!(report.render_stream_names(), "orders\n");
    assert!(
        report
            .render_full(&ReportOptions::default())
            .contains("stored lac 5, observed 4")
    );
}

#[test]
fn in_progress_overlap_mode() {
    let cluster = MemoryCluster::new();
    sealed(&cluster, "contested", 5, 1, 2);
    in_progress(&cluster, "contested", 5, 2, 1);
    sealed(&cluster, "fine", 5, 3, 2);
    in_progress(&cluster, "fine", 6, 4, 1);

    let config = InspectConfig::default().with_sequence_mode(SequenceMode::InProgressOverlap);
    let report = inspect(&cluster, config).expect("inspect");
    assert_eq!(report.render_stream_names(), "contested\n");
    assert_eq!(
        report.candidate(&name("contested")).expect("flagged").reasons,
        vec![CorruptionReason::Sequence(
            SequenceViolation::ContestedSequence { seq_nos: vec![5] }
        )]
    );
}

#[test]
fn failing_stream_aborts_only_its_workers_remainder() {
    let cluster = MemoryCluster::new();
    // a: gap, b: clean, c: unreachable, d: gap
    sealed(&cluster, "a", 1, 1, 1);
    sealed(&cluster, "a", 3, 2, 1);
    healthy_stream(&cluster, "b", 10, 2);
    healthy_stream(&cluster, "c", 20, 2);
    sealed(&cluster, "d", 1, 30, 1);
    sealed(&cluster, "d", 4, 31, 1);
    cluster.set_stream_unreachable(&name("c"), true);

    let report = inspect(&cluster, InspectConfig::default().with_workers(2)).expect("inspect");
    assert!(!report.is_complete());
    assert_eq!(report.scanned, 2);
    assert_eq!(report.render_stream_names().lines().last(), Some("a"));
    assert!(report.candidate(&name("d")).is_none());

    let failed = &report.workers[1];
    assert_eq!(failed.range, 2..4);
    assert!(matches!(
        &failed.status,
        WorkerStatus::Aborted { stream, .. } if stream.as_str() == "c"
    ));
    assert_eq!(failed.unprocessed, vec![name("c"), name("d")]);
    assert!(report.workers[0].is_clean());
    assert!(report.render_stream_names().contains("PARTIAL SCAN"));
    assert_eq!(cluster.open_handles(), 0);
}

#[test]
fn fail_policy_turns_partial_scan_into_error() {
    let cluster = MemoryCluster::new();
    for stream in ["a", "b", "c", "d"] {
        cluster.add_stream(name(stream));
    }
    cluster.set_stream_unreachable(&name("d"), true);

    let config = InspectConfig::default()
        .with_workers(2)
        .with_partial_scan_policy(PartialScanPolicy::Fail);
    let err = inspect(&cluster, config).expect_err("partial");
    assert!(matches!(
        err,
        SeglogError::PartialScan {
            selected: 4,
            scanned: 3,
            failed_workers: 1,
        }
    ));
}

#[test]
fn enumeration_failure_aborts_before_scanning() {
    let cluster = MemoryCluster::new();
    healthy_stream(&cluster, "orders", 1, 2);
    cluster.set_listing_unreachable(true);
    let err = inspect(&cluster, InspectConfig::default()).expect_err("listing down");
    assert!(err.is_transient());
}

/// Namespace that panics when asked to open one stream.
struct PanickingNamespace {
    inner: MemoryCluster,
    poison: StreamName,
}

impl Namespace for PanickingNamespace {
    fn list_streams(&self) -> Result<StreamIter<'_>> {
        self.inner.list_streams()
    }

    fn open_log(&self, stream: &StreamName) -> Result<Box<dyn LogHandle>> {
        assert!(stream != &self.poison, "corrupt handle table for {stream}");
        self.inner.open_log(stream)
    }
}

#[test]
fn panicking_worker_keeps_streams_it_finished() {
    let cluster = MemoryCluster::new();
    sealed(&cluster, "a", 1, 1, 1);
    sealed(&cluster, "a", 3, 2, 1);
    healthy_stream(&cluster, "b", 10, 1);
    healthy_stream(&cluster, "c", 20, 1);
    sealed(&cluster, "d", 2, 30, 1);
    sealed(&cluster, "d", 2, 31, 1);
    let namespace = PanickingNamespace {
        inner: cluster.clone(),
        poison: name("b"),
    };

    let report = Inspector::new(
        InspectConfig::default().with_workers(2),
        &namespace,
        &cluster,
        &cluster,
    )
    .run()
    .expect("inspect");

    assert!(!report.is_complete());
    assert!(matches!(
        &report.workers[0].status,
        WorkerStatus::Panicked { detail } if detail.contains("corrupt handle table")
    ));
    // `a` finished before the panic and keeps its finding.
    assert_eq!(report.workers[0].processed, vec![name("a")]);
    assert_eq!(report.workers[0].unprocessed, vec![name("b")]);
    assert!(matches!(
        report.candidate(&name("a")).expect("a flagged").reasons[0],
        CorruptionReason::Sequence(SequenceViolation::Gap { index: 1, expected: 2, actual: 3 })
    ));
    assert!(report.workers[1].is_clean());
    let rendered = report.render_stream_names();
    let names: Vec<&str> = rendered.lines().rev().take(2).collect();
    assert_eq!(names, ["d", "a"]);
    assert_eq!(report.scanned, 3);
    assert!(matches!(
        &report.completeness,
        ScanCompleteness::Partial { unscanned, failed_workers }
            if unscanned == &[name("b")] && failed_workers == &[0]
    ));
}

#[test]
fn scan_started_counts_workers_actually_spawned() {
    let cluster = MemoryCluster::new();
    for (index, stream) in ["a", "b", "c", "d", "e"].into_iter().enumerate() {
        healthy_stream(&cluster, stream, index as u64 * 10, 1);
    }
    let ring = InspectEventRingBuffer::new(8);

    let report = Inspector::new(
        InspectConfig::default().with_workers(4),
        &cluster,
        &cluster,
        &cluster,
    )
    .with_observer(&ring)
    .run()
    .expect("inspect");

    // ceil(5 / 4) = 2 per range leaves only three non-empty ranges.
    assert_eq!(report.workers.len(), 3);
    assert!(matches!(
        ring.of_kind("scan_started").as_slice(),
        [InspectEvent::ScanStarted { selected: 5, workers: 3, .. }]
    ));
}

/// Namespace whose metadata reads are slow.
struct SlowNamespace {
    inner: MemoryCluster,
    delay: Duration,
}

impl Namespace for SlowNamespace {
    fn list_streams(&self) -> Result<StreamIter<'_>> {
        self.inner.list_streams()
    }

    fn open_log(&self, stream: &StreamName) -> Result<Box<dyn LogHandle>> {
        thread::sleep(self.delay);
        self.inner.open_log(stream)
    }
}

#[test]
fn deadline_truncates_scan_and_reports_it() {
    let cluster = MemoryCluster::new();
    for stream in ["a", "b", "c", "d"] {
        healthy_stream(&cluster, stream, u64::from(stream.as_bytes()[0]) * 10, 1);
    }
    let namespace = SlowNamespace {
        inner: cluster.clone(),
        delay: Duration::from_millis(30),
    };
    let config = InspectConfig::default().with_deadline(Duration::from_millis(5));

    let report = Inspector::new(config, &namespace, &cluster, &cluster)
        .run()
        .expect("report policy");
    assert!(!report.is_complete());
    let worker = &report.workers[0];
    assert_eq!(worker.status, WorkerStatus::DeadlineExceeded);
    assert!(!worker.unprocessed.is_empty());
    assert_eq!(worker.processed.len() + worker.unprocessed.len(), 4);
    assert!(
        report
            .render_full(&ReportOptions::default())
            .contains("stopped at the deadline")
    );
}

#[test]
fn ledger_checks_can_be_limited_or_disabled() {
    let cluster = MemoryCluster::new();
    sealed(&cluster, "orders", 1, 1, 2);
    sealed_with_lac_ahead(&cluster, "orders", 2, 2, 2, 1);
    in_progress(&cluster, "orders", 3, 3, 1);

    let config = InspectConfig {
        ledgers_in_progress_only: true,
        ..InspectConfig::default()
    };
    assert!(inspect(&cluster, config).expect("inspect").candidates.is_empty());

    let config = InspectConfig {
        check_ledgers: false,
        ..InspectConfig::default()
    };
    assert!(inspect(&cluster, config).expect("inspect").candidates.is_empty());

    assert_eq!(
        inspect(&cluster, InspectConfig::default())
            .expect("inspect")
            .candidates
            .len(),
        1
    );
}

#[test]
fn flagged_streams_carry_dumped_tail_entries() {
    let cluster = MemoryCluster::new();
    sealed(&cluster, "orders", 1, 1, 4);
    sealed(&cluster, "orders", 3, 2, 1);

    let report = inspect(&cluster, InspectConfig::default().with_dump_entries(2)).expect("inspect");
    let orders = report.candidate(&name("orders")).expect("flagged");
    let dump = orders.segments[0].dump.as_ref().expect("dumped");
    let ids: Vec<i64> = dump.entries.iter().map(|entry| entry.entry_id).collect();
    assert_eq!(ids, [2, 3]);
    assert_eq!(dump.entries[1].records.len(), 2);
    assert!(
        report
            .render_full(&ReportOptions::default())
            .contains("entry 3")
    );
}

#[test]
fn completion_time_ordering_is_applied_to_the_report() {
    let cluster = MemoryCluster::new();
    in_progress(&cluster, "orders", 4, 4, 1);
    sealed(&cluster, "orders", 2, 2, 1);
    sealed(&cluster, "orders", 1, 1, 1);

    let config = InspectConfig {
        order_by_completion_time: true,
        ..InspectConfig::default()
    };
    let report = inspect(&cluster, config).expect("inspect");
    let order: Vec<u64> = report
        .candidate(&name("orders"))
        .expect("flagged")
        .segments
        .iter()
        .map(|finding| finding.segment.seq_no)
        .collect();
    assert_eq!(order, [1, 2, 4]);
}

#[test]
fn observer_sees_scan_milestones() {
    let cluster = MemoryCluster::new();
    sealed(&cluster, "orders", 1, 1, 1);
    sealed(&cluster, "orders", 1, 2, 1);
    let ring = InspectEventRingBuffer::new(16);

    Inspector::new(InspectConfig::default(), &cluster, &cluster, &cluster)
        .with_observer(&ring)
        .run()
        .expect("inspect");

    let kinds: Vec<&str> = ring.drain().iter().map(InspectEvent::kind_str).collect();
    assert_eq!(kinds, ["scan_started", "stream_flagged", "scan_completed"]);
}

#[test]
fn json_report_is_machine_readable() {
    let cluster = MemoryCluster::new();
    sealed(&cluster, "orders", 1, 1, 1);
    sealed_with_lac_ahead(&cluster, "orders", 2, 2, 1, 3);

    let report = inspect(&cluster, InspectConfig::default()).expect("inspect");
    let json = report.to_json_pretty().expect("json");
    let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
    assert_eq!(value["schema_version"], REPORT_SCHEMA_VERSION);
    assert_eq!(value["completeness"]["completeness"], "complete");
    let reason = &value["candidates"]["orders"]["reasons"][0];
    assert_eq!(reason["reason"], "ledger_inconsistent");
    assert_eq!(reason["stored_last_confirmed"], 3);
    assert!(reason["observed_last_entry_id"].is_null());
    assert_eq!(InspectionReport::from_json_str(&json).expect("reparse"), report);
}

#[test]
fn invalid_config_is_rejected_before_listing() {
    let cluster = MemoryCluster::new();
    cluster.set_listing_unreachable(true);
    let err = inspect(&cluster, InspectConfig::default().with_workers(0)).expect_err("invalid");
    assert!(matches!(err, SeglogError::InvalidConfig { .. }));
}

#[test]
fn explicit_stream_list_is_validated_too() {
    let cluster = MemoryCluster::new();
    healthy_stream(&cluster, "orders", 1, 1);
    let inspector = Inspector::new(
        InspectConfig::default().with_dump_entries(0),
        &cluster,
        &cluster,
        &cluster,
    );
    let err = inspector
        .inspect_streams(&[name("orders")])
        .expect_err("zero dump count");
    assert!(matches!(err, SeglogError::InvalidConfig { .. }));
}
