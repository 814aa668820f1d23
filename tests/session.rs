//! Integration tests for discovery and the session state machine, run
//! against the deterministic in-memory transport.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use triones_led_controller::mock::{MockTransport, WriteFailure};
use triones_led_controller::{
    Advertisement, DeviceIdentity, Error, LedSession, Mode, NameFilter, Scanner, SessionConfig,
    SessionState,
};

const ADDRESS: &str = "aa:bb:cc:dd:ee:ff";

fn adv(name: Option<&str>, address: &str) -> Advertisement {
    Advertisement {
        name: name.map(String::from),
        address: address.to_string(),
        manufacturer_data: Vec::new(),
    }
}

fn identity(address: &str) -> DeviceIdentity {
    DeviceIdentity {
        name: Some("Triones-A1B2".to_string()),
        address: address.to_string(),
    }
}

fn test_config() -> SessionConfig {
    SessionConfig {
        connect_timeout: Duration::from_millis(200),
        command_timeout: Duration::from_millis(100),
        status_timeout: Duration::from_millis(200),
    }
}

fn transport_with_device() -> Arc<MockTransport> {
    Arc::new(MockTransport::with_advertisements(vec![adv(
        Some("Triones-A1B2"),
        ADDRESS,
    )]))
}

async fn connected_session(transport: Arc<MockTransport>) -> LedSession<MockTransport> {
    let session = LedSession::with_config(transport, identity(ADDRESS), test_config());
    session.connect().await.unwrap();
    assert_eq!(session.state(), SessionState::Connected);
    session
}

#[tokio::test]
async fn discover_filters_deduplicates_and_preserves_order() {
    let transport = Arc::new(MockTransport::with_advertisements(vec![
        adv(Some("Triones-A1B2"), "11:11:11:11:11:11"),
        adv(Some("ELK-BLE"), "22:22:22:22:22:22"),
        adv(Some("Triones-C3D4"), "33:33:33:33:33:33"),
        adv(Some("Triones-A1B2"), "11:11:11:11:11:11"),
        adv(None, "44:44:44:44:44:44"),
    ]));

    let sessions = Scanner::new(transport)
        .discover(Duration::from_millis(200), NameFilter::prefix("Triones"))
        .await
        .unwrap();

    let addresses: Vec<&str> = sessions.iter().map(|s| s.address()).collect();
    assert_eq!(addresses, vec!["11:11:11:11:11:11", "33:33:33:33:33:33"]);
    assert!(sessions
        .iter()
        .all(|s| s.state() == SessionState::Disconnected));
}

#[tokio::test]
async fn discover_without_filter_includes_unnamed_peers() {
    let transport = Arc::new(MockTransport::with_advertisements(vec![
        adv(None, "44:44:44:44:44:44"),
        adv(Some("Triones-A1B2"), "11:11:11:11:11:11"),
    ]));

    let sessions = Scanner::new(transport)
        .discover(Duration::from_millis(200), NameFilter::Any)
        .await
        .unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].name(), None);
}

#[tokio::test]
async fn find_by_name_requires_an_exact_match() {
    let transport = Arc::new(MockTransport::with_advertisements(vec![
        adv(Some("Triones-A1B2"), "11:11:11:11:11:11"),
        adv(Some("Triones-C3D4"), "33:33:33:33:33:33"),
    ]));
    let scanner = Scanner::new(transport);

    let session = scanner
        .find_by_name("Triones-C3D4", Duration::from_millis(200))
        .await
        .unwrap();
    assert_eq!(session.address(), "33:33:33:33:33:33");

    let err = scanner
        .find_by_name("Triones", Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn find_by_address_without_match_is_not_found() {
    let transport = Arc::new(MockTransport::with_advertisements(vec![adv(
        Some("Triones-A1B2"),
        "11:11:11:11:11:11",
    )]));
    let scanner = Scanner::new(transport);

    let err = scanner
        .find_by_address("99:99:99:99:99:99", Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    // Address matching is case-insensitive
    let session = scanner
        .find_by_address("11:11:11:11:11:11", Duration::from_millis(200))
        .await
        .unwrap();
    assert_eq!(session.address(), "11:11:11:11:11:11");
}

#[tokio::test]
async fn commands_are_rejected_until_connected() {
    let transport = transport_with_device();
    let session = LedSession::with_config(transport.clone(), identity(ADDRESS), test_config());

    let err = session.power_on().await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(SessionState::Disconnected)));
    assert!(transport.device().written_frames().is_empty());
}

#[tokio::test]
async fn connect_is_rejected_while_connected() {
    let transport = transport_with_device();
    let session = connected_session(transport).await;

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(SessionState::Connected)));
}

#[tokio::test]
async fn connect_timeout_returns_to_disconnected() {
    let transport = transport_with_device();
    transport.delay_connect(Duration::from_secs(5));
    let session = LedSession::with_config(transport, identity(ADDRESS), test_config());

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn refused_connect_surfaces_error_and_returns_to_disconnected() {
    let transport = transport_with_device();
    transport.refuse_connections();
    let session = LedSession::with_config(transport, identity(ADDRESS), test_config());

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, Error::Connection(_)));
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn disconnect_is_idempotent_from_any_state() {
    let transport = transport_with_device();
    let session = LedSession::with_config(transport.clone(), identity(ADDRESS), test_config());

    // Disconnected -> still fine
    session.disconnect().await.unwrap();
    assert_eq!(session.state(), SessionState::Disconnected);

    session.connect().await.unwrap();
    session.disconnect().await.unwrap();
    session.disconnect().await.unwrap();
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(transport.device().is_disconnected());
}

#[tokio::test]
async fn set_rgb_then_query_status_round_trips() {
    let transport = transport_with_device();
    let device = transport.device();
    let session = connected_session(transport).await;

    session.power_on().await.unwrap();
    session.set_rgb(255, 0, 0).await.unwrap();

    let status = session.query_status().await.unwrap();
    assert!(status.is_on);
    assert_eq!(status.rgb_tuple(), (255, 0, 0));
    assert_eq!(status.mode, Mode::StaticColor);
    assert_eq!(status.rgb_hex(), "#ff0000");

    // The query itself went over the wire as the fixed status request
    assert!(device
        .written_frames()
        .contains(&vec![0xEF, 0x01, 0x77]));
}

#[tokio::test]
async fn set_white_is_reflected_in_status() {
    let transport = transport_with_device();
    let session = connected_session(transport).await;

    session.power_on().await.unwrap();
    session.set_white(200).await.unwrap();

    let status = session.query_status().await.unwrap();
    assert_eq!(status.color.white, 200);
}

#[tokio::test]
async fn built_in_mode_round_trips_through_status() {
    let transport = transport_with_device();
    let device = transport.device();
    let session = connected_session(transport).await;

    session
        .set_built_in_mode(Mode::SevenColorCrossFade, 50)
        .await
        .unwrap();

    let frames = device.written_frames();
    let frame = frames.last().unwrap();
    assert_eq!(frame[0], 0xBB);
    assert_eq!(frame[1], 0x25);
    assert_eq!(frame[3], 0x44);

    let status = session.query_status().await.unwrap();
    assert_eq!(status.mode, Mode::SevenColorCrossFade);
    assert_eq!(status.speed, 50);
}

#[tokio::test]
async fn set_color_hex_writes_the_parsed_color() {
    let transport = transport_with_device();
    let device = transport.device();
    let session = connected_session(transport).await;

    session.set_color_hex("#00ff7f").await.unwrap();
    assert_eq!(
        device.written_frames().last().unwrap(),
        &vec![0x56, 0x00, 0xFF, 0x7F, 0x00, 0xF0, 0xAA]
    );

    let err = session.set_color_hex("not-a-color").await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn validation_failures_produce_no_wire_traffic() {
    let transport = transport_with_device();
    let device = transport.device();
    let session = connected_session(transport).await;
    let frames_before = device.written_frames().len();

    let err = session
        .set_built_in_mode(Mode::SevenColorCrossFade, 101)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = session
        .set_built_in_mode(Mode::StaticColor, 50)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = session.set_temperature(20_000, 50).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    assert_eq!(device.written_frames().len(), frames_before);
    assert_eq!(session.state(), SessionState::Connected);
}

#[tokio::test]
async fn set_temperature_scales_brightness() {
    let transport = transport_with_device();
    let device = transport.device();
    let session = connected_session(transport).await;

    // 6600 K is pure white in the approximation; 50% brightness halves it
    session.set_temperature(6600, 50).await.unwrap();
    assert_eq!(
        device.written_frames().last().unwrap(),
        &vec![0x56, 127, 127, 127, 0x00, 0xF0, 0xAA]
    );
}

#[tokio::test]
async fn concurrent_commands_never_interleave_on_the_wire() {
    let transport = transport_with_device();
    let device = transport.device();
    let session = Arc::new(connected_session(transport).await);

    let mut handles = Vec::new();
    for i in 0..8u8 {
        let session = session.clone();
        handles.push(tokio::spawn(async move {
            session.set_rgb(i, i, i).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Every write's fragments must form one contiguous run in the log
    let fragments = device.write_fragments();
    assert!(!fragments.is_empty());
    let mut finished = HashSet::new();
    let mut current = None;
    for fragment in &fragments {
        if Some(fragment.write_id) != current {
            if let Some(previous) = current {
                finished.insert(previous);
            }
            assert!(
                !finished.contains(&fragment.write_id),
                "write {} interleaved with another command",
                fragment.write_id
            );
            current = Some(fragment.write_id);
        }
    }

    // Reassembled fragments match the complete recorded frames
    for frame in device.written_frames() {
        assert_eq!(frame.len(), 7);
        assert_eq!(frame[0], 0x56);
    }
}

#[tokio::test]
async fn clean_link_loss_drops_to_disconnected() {
    let transport = transport_with_device();
    let device = transport.device();
    let session = connected_session(transport).await;

    device.fail_next_write(WriteFailure::LinkDown);
    let err = session.power_on().await.unwrap_err();
    assert!(matches!(err, Error::Connection(_)));
    assert_eq!(session.state(), SessionState::Disconnected);

    let err = session.power_on().await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(SessionState::Disconnected)));
}

#[tokio::test]
async fn ambiguous_failure_faults_until_disconnect() {
    let transport = transport_with_device();
    let device = transport.device();
    let session = connected_session(transport.clone()).await;

    device.fail_next_write(WriteFailure::Ambiguous);
    session.power_on().await.unwrap_err();
    assert_eq!(session.state(), SessionState::Faulted);

    // Only disconnect is permitted from Faulted
    let err = session.power_on().await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(SessionState::Faulted)));
    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(SessionState::Faulted)));

    session.disconnect().await.unwrap();
    assert_eq!(session.state(), SessionState::Disconnected);

    // An explicit reconnect recovers the session
    session.connect().await.unwrap();
    session.power_on().await.unwrap();
}

#[tokio::test]
async fn command_write_timeout_faults_the_session() {
    let transport = transport_with_device();
    let device = transport.device();
    let session = connected_session(transport).await;

    device.fail_next_write(WriteFailure::Hang);
    let err = session.power_on().await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
    assert_eq!(session.state(), SessionState::Faulted);
}

#[tokio::test]
async fn missing_status_reply_times_out_and_faults() {
    let transport = transport_with_device();
    let device = transport.device();
    let session = connected_session(transport).await;

    device.suppress_status_replies();
    let err = session.query_status().await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
    assert_eq!(session.state(), SessionState::Faulted);
}

#[tokio::test]
async fn malformed_status_frames_are_protocol_errors() {
    let transport = transport_with_device();
    let device = transport.device();
    let session = connected_session(transport).await;

    device.override_status_frame(vec![0x00; 12]);
    let err = session.query_status().await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));

    device.override_status_frame(vec![0x66, 0x99]);
    let err = session.query_status().await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
}

#[tokio::test]
async fn sessions_operate_independently() {
    let transport_a = transport_with_device();
    let transport_b = transport_with_device();
    let session_a = connected_session(transport_a.clone()).await;
    let session_b = connected_session(transport_b.clone()).await;

    transport_a.device().fail_next_write(WriteFailure::Ambiguous);
    session_a.power_on().await.unwrap_err();
    assert_eq!(session_a.state(), SessionState::Faulted);

    // The other session is unaffected
    session_b.power_on().await.unwrap();
    assert_eq!(session_b.state(), SessionState::Connected);
}
