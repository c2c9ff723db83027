//! Moderator loop test over a real report FIFO.

use fifochat_core::shutdown;
use fifochat_core::{ChannelLayout, Moderator, ReportTally, ensure_fifo, open_sender_retry};
use fifochat_core::testing::MockTerminator;
use fifochat_proto::PeerId;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_tenth_report_over_the_fifo_triggers_termination() {
    let dir = tempfile::tempdir().unwrap();
    let layout = ChannelLayout::new(dir.path());
    let terminator = MockTerminator::new();
    let (handle, mut sd) = shutdown::manual();

    let mut moderator = Moderator::new(
        layout.clone(),
        ReportTally::new(),
        Box::new(terminator.clone()),
        sd.clone(),
    );
    let task = tokio::spawn(async move { moderator.run().await });

    // The moderator creates the FIFO inside `run`; wait for its read end.
    let mut reports = open_sender_retry(&layout.reports_path(), &mut sd)
        .await
        .unwrap();

    // Nine reports, one junk line, then the tenth.
    for _ in 0..9 {
        reports.write_all(b"4242\n").await.unwrap();
    }
    reports.write_all(b"not a pid\n").await.unwrap();
    reports.write_all(b"4242\n").await.unwrap();

    // The expulsion is observable shortly after the tenth line lands.
    let deadline = tokio::time::Instant::now() + WAIT;
    while terminator.terminated().is_empty() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "moderator never terminated the target"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(terminator.terminated(), vec![PeerId::new(4242)]);

    handle.request();
    timeout(WAIT, task)
        .await
        .expect("moderator did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_moderator_survives_report_writers_closing() {
    let dir = tempfile::tempdir().unwrap();
    let layout = ChannelLayout::new(dir.path());
    let terminator = MockTerminator::new();
    let (handle, mut sd) = shutdown::manual();

    // Pre-create the FIFO so the writer below can race-free retry.
    ensure_fifo(&layout.reports_path()).unwrap();

    let mut moderator = Moderator::new(
        layout.clone(),
        ReportTally::with_threshold(1),
        Box::new(terminator.clone()),
        sd.clone(),
    );
    let task = tokio::spawn(async move { moderator.run().await });

    // First writer reports once and disconnects entirely.
    let mut reports = open_sender_retry(&layout.reports_path(), &mut sd)
        .await
        .unwrap();
    reports.write_all(b"7\n").await.unwrap();
    drop(reports);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // A later writer must still get through.
    let mut reports = open_sender_retry(&layout.reports_path(), &mut sd)
        .await
        .unwrap();
    reports.write_all(b"8\n").await.unwrap();

    let deadline = tokio::time::Instant::now() + WAIT;
    while terminator.terminated().len() < 2 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "moderator missed a report after writer turnover"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(
        terminator.terminated(),
        vec![PeerId::new(7), PeerId::new(8)]
    );

    handle.request();
    timeout(WAIT, task)
        .await
        .expect("moderator did not stop")
        .unwrap()
        .unwrap();
}
