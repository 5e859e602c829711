//! Integration tests for the per-endpoint supervisor.
//!
//! Each test runs a fake sensor on loopback and one real [`Supervisor`]
//! against it, observing what comes out of the bus.

mod common;

use std::sync::Arc;
use std::time::Duration;

use sensor_ingest::bus;
use sensor_ingest::config::{EndpointConfig, ProtocolConfig, SessionTiming};
use sensor_ingest::supervisor::Supervisor;
use sensor_ingest::{Decoder, Reading};
use tokio_util::sync::CancellationToken;

use common::{climate_frame, motion_frame, quick_timing, FakeSensor, TS};

fn supervisor(
    port: u16,
    decoder: Decoder,
    tx: bus::BusSender,
    stop: &CancellationToken,
) -> Supervisor {
    supervisor_with_timing(port, decoder, tx, stop, quick_timing())
}

fn supervisor_with_timing(
    port: u16,
    decoder: Decoder,
    tx: bus::BusSender,
    stop: &CancellationToken,
    timing: SessionTiming,
) -> Supervisor {
    Supervisor::new(
        Arc::new(EndpointConfig::new("127.0.0.1", port, decoder)),
        Arc::new(ProtocolConfig::default()),
        timing,
        tx,
        stop.clone(),
    )
}

#[tokio::test]
async fn forwards_valid_climate_frames_in_order() {
    let sensor = FakeSensor::spawn(|_, poll| climate_frame(TS, 25.5, 1000 + poll as i16)).await;
    let (tx, mut rx) = bus::bounded(64);
    let stop = CancellationToken::new();
    let handle = tokio::spawn(supervisor(sensor.port(), Decoder::Climate, tx, &stop).run());

    let mut pressures = Vec::new();
    while pressures.len() < 5 {
        let rec = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no record within 2s")
            .expect("bus closed early");
        assert_eq!(rec.source(), sensor.port().to_string());
        assert!(rec.to_line().contains("Temp=25.50"), "{}", rec.to_line());
        match rec.reading() {
            Reading::Climate { pressure, .. } => pressures.push(*pressure),
            other => panic!("unexpected reading {other:?}"),
        }
    }
    assert_eq!(pressures, vec![1000, 1001, 1002, 1003, 1004]);

    stop.cancel();
    let stats = handle.await.unwrap();
    assert_eq!(stats.sessions_opened, 1);
    assert_eq!(stats.frames_rejected, 0);
    assert!(stats.records_forwarded >= 5);
}

#[tokio::test]
async fn motion_frames_keep_negative_values() {
    let sensor = FakeSensor::spawn(|_, _| motion_frame(TS, 10, -20, 30)).await;
    let (tx, mut rx) = bus::bounded(8);
    let stop = CancellationToken::new();
    let handle = tokio::spawn(supervisor(sensor.port(), Decoder::Motion, tx, &stop).run());

    let rec = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(rec.to_line().ends_with("X=10;Y=-20;Z=30"));

    stop.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn bad_checksum_forces_reconnect_after_backoff() {
    // First connection serves garbage, later ones serve valid frames.
    let sensor = FakeSensor::spawn(|conn, _| {
        if conn == 0 {
            vec![1u8; 15]
        } else {
            climate_frame(TS, 25.5, 1013)
        }
    })
    .await;
    let (tx, mut rx) = bus::bounded(8);
    let stop = CancellationToken::new();
    let handle = tokio::spawn(supervisor(sensor.port(), Decoder::Climate, tx, &stop).run());

    let rec = tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("no record after reconnect")
        .unwrap();
    let line = rec.to_line();
    assert!(line.contains("Temp=25.50") && line.contains("Press=1013"), "{line}");

    assert!(sensor.connections() >= 2);
    let accepted = sensor.accepted_at();
    let gap = accepted[1] - accepted[0];
    assert!(
        gap >= quick_timing().backoff,
        "reconnected after {gap:?}, before the backoff elapsed"
    );

    stop.cancel();
    let stats = handle.await.unwrap();
    assert_eq!(stats.frames_rejected, 1);
    assert!(stats.sessions_failed >= 1);
    assert!(stats.sessions_opened >= 2);
}

#[tokio::test]
async fn truncated_frame_times_out_and_reconnects() {
    let sensor = FakeSensor::spawn(|conn, _| {
        if conn == 0 {
            // Only part of the frame is sent; the read deadline expires.
            climate_frame(TS, 1.0, 1)[..7].to_vec()
        } else {
            climate_frame(TS, 2.0, 2)
        }
    })
    .await;
    let (tx, mut rx) = bus::bounded(8);
    let stop = CancellationToken::new();
    let handle = tokio::spawn(supervisor(sensor.port(), Decoder::Climate, tx, &stop).run());

    let rec = tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("no record after reconnect")
        .unwrap();
    assert!(rec.to_line().ends_with("Temp=2.00;Press=2"));
    assert!(sensor.connections() >= 2);

    stop.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn stop_interrupts_backoff() {
    let sensor = FakeSensor::spawn(|_, _| vec![0xffu8; 15]).await;
    let (tx, _rx) = bus::bounded(8);
    let stop = CancellationToken::new();

    // A backoff long enough to notice if it were waited out.
    let mut timing = quick_timing();
    timing.backoff = Duration::from_secs(30);
    let sup = supervisor_with_timing(sensor.port(), Decoder::Climate, tx, &stop, timing);
    let handle = tokio::spawn(sup.run());

    // Let the first frame be rejected so the supervisor is sitting in backoff.
    tokio::time::sleep(Duration::from_millis(300)).await;
    stop.cancel();

    let stats = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("stop did not cut the backoff short")
        .unwrap();
    assert_eq!(stats.frames_rejected, 1);
    assert_eq!(stats.records_forwarded, 0);
}

#[tokio::test]
async fn closed_bus_stops_supervisor() {
    let sensor = FakeSensor::spawn(|_, _| climate_frame(TS, 0.0, 0)).await;
    let (tx, rx) = bus::bounded(1);
    tx.close();
    drop(rx);
    let stop = CancellationToken::new();

    let stats = tokio::time::timeout(
        Duration::from_secs(2),
        supervisor(sensor.port(), Decoder::Climate, tx, &stop).run(),
    )
    .await
    .expect("supervisor kept running on a closed bus");
    assert_eq!(stats.records_forwarded, 0);
    assert!(!stop.is_cancelled());
}
