//! Reconnect policy tests
//!
//! Run on a paused clock so the fixed retry delay is measured in virtual time.

mod common;

use common::ScriptedConnector;
use skinme_live_client::destinations::ORDERS_TOPIC;
use skinme_live_client::{ConnectionState, Session, SessionConfig, SessionError};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DELAY: Duration = Duration::from_millis(3000);

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

#[tokio::test(start_paused = true)]
async fn test_fewer_failures_than_budget_recover() {
    for failures in 1..5u32 {
        let connector = ScriptedConnector::failing(failures);
        let session = Session::new(SessionConfig::new("/ws-endpoint"), connector.clone());

        let errors = counter();
        let errors_clone = errors.clone();
        session.connect(|_| {}, move |_| {
            errors_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(session.settled().await, ConnectionState::Connected);

        let attempts = connector.attempts();
        // the first attempt plus exactly one retry per failure
        assert_eq!(attempts.len(), failures as usize + 1);
        for pair in attempts.windows(2) {
            assert!(pair[1] - pair[0] >= DELAY, "retry came too early");
        }
        assert_eq!(errors.load(Ordering::SeqCst), 0);
        assert_eq!(session.status().reconnect_attempts, 0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_budget_exhausted_reports_once() {
    let connector = ScriptedConnector::unreachable();
    let session = Session::new(SessionConfig::new("/ws-endpoint"), connector.clone());

    let errors = counter();
    let last_attempts = Arc::new(AtomicU32::new(0));
    let errors_clone = errors.clone();
    let last_attempts_clone = last_attempts.clone();
    session.connect(|_| {}, move |err| {
        errors_clone.fetch_add(1, Ordering::SeqCst);
        if let SessionError::ReconnectExhausted { attempts } = err {
            last_attempts_clone.store(*attempts, Ordering::SeqCst);
        }
        assert_eq!(err.to_string(), "Connection failed after multiple attempts");
    });

    assert_eq!(session.settled().await, ConnectionState::Failed);
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert_eq!(last_attempts.load(Ordering::SeqCst), 5);
    assert_eq!(connector.attempt_count(), 6);

    // no further automatic retries
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.attempt_count(), 6);
    assert_eq!(errors.load(Ordering::SeqCst), 1);

    let status = session.status();
    assert!(!status.connected);
    assert_eq!(status.reconnect_attempts, 5);
}

#[tokio::test(start_paused = true)]
async fn test_connect_after_failure_starts_fresh_budget() {
    let connector = ScriptedConnector::unreachable();
    let session = Session::new(
        SessionConfig::new("/ws-endpoint").max_reconnect_attempts(2),
        connector.clone(),
    );

    session.connect(|_| {}, |_| {});
    assert_eq!(session.settled().await, ConnectionState::Failed);
    assert_eq!(connector.attempt_count(), 3);

    connector.set_unreachable(false);
    session.connect(|_| {}, |_| {});
    assert_eq!(session.settled().await, ConnectionState::Connected);
    assert_eq!(connector.attempt_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_no_reconnect_fails_immediately() {
    let connector = ScriptedConnector::unreachable();
    let session = Session::new(
        SessionConfig::new("/ws-endpoint").no_reconnect(),
        connector.clone(),
    );

    let errors = counter();
    let errors_clone = errors.clone();
    session.connect(|_| {}, move |_| {
        errors_clone.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(session.settled().await, ConnectionState::Failed);
    assert_eq!(connector.attempt_count(), 1);
    assert_eq!(errors.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_zero_delay_retries() {
    let connector = ScriptedConnector::failing(3);
    let session = Session::new(
        SessionConfig::new("/ws-endpoint").reconnect_delay(Duration::ZERO),
        connector.clone(),
    );

    session.connect(|_| {}, |_| {});
    assert_eq!(session.settled().await, ConnectionState::Connected);
    assert_eq!(connector.attempt_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_lost_connection_reconnects_and_resubscribes() {
    let connector = ScriptedConnector::new();
    let session = Session::new(SessionConfig::new("/ws-endpoint"), connector.clone());

    let connects = counter();
    let connects_clone = connects.clone();
    session.connect(move |_| {
        connects_clone.fetch_add(1, Ordering::SeqCst);
    }, |_| {});
    assert_eq!(session.settled().await, ConnectionState::Connected);

    let received = counter();
    let received_clone = received.clone();
    session.subscribe_to_orders(move |_| {
        received_clone.fetch_add(1, Ordering::SeqCst);
    });

    connector.drop_connection();
    let mut state_rx = session.state_receiver();
    state_rx
        .wait_for(|s| *s == ConnectionState::Reconnecting)
        .await
        .unwrap();
    assert!(!session.send_order_update("order-1", "UPDATED", &serde_json::json!({})));

    assert_eq!(session.settled().await, ConnectionState::Connected);
    assert_eq!(connects.load(Ordering::SeqCst), 2);
    assert_eq!(connector.client_count(), 2);

    let attempts = connector.attempts();
    assert!(attempts[1] - attempts[0] >= DELAY);

    // the tracked subscription followed the session onto the new connection
    let client = connector.last_client();
    assert_eq!(client.active_subscriptions(ORDERS_TOPIC), 1);
    client.deliver(ORDERS_TOPIC, r#"{"entityId":"order-1"}"#);
    assert_eq!(received.load(Ordering::SeqCst), 1);
    assert_eq!(session.status().subscriptions, vec![ORDERS_TOPIC.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_abandons_pending_retry() {
    let connector = ScriptedConnector::unreachable();
    let session = Session::new(SessionConfig::new("/ws-endpoint"), connector.clone());

    session.connect(|_| {}, |_| {});
    let mut state_rx = session.state_receiver();
    state_rx
        .wait_for(|s| *s == ConnectionState::Reconnecting)
        .await
        .unwrap();

    session.shutdown().await;
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(connector.attempt_count(), 1);
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_five_failures_still_connect_on_sixth_attempt() {
    let connector = ScriptedConnector::failing(5);
    let session = Session::new(SessionConfig::new("/ws-endpoint"), connector.clone());

    let errors = counter();
    let errors_clone = errors.clone();
    session.connect(|_| {}, move |_| {
        errors_clone.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(session.settled().await, ConnectionState::Connected);
    assert_eq!(connector.attempt_count(), 6);
    assert_eq!(errors.load(Ordering::SeqCst), 0);
    assert_eq!(session.status().reconnect_attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_connect_after_failure_and_shutdown_gets_full_budget() {
    let connector = ScriptedConnector::unreachable();
    let session = Session::new(SessionConfig::new("/ws-endpoint"), connector.clone());

    let errors = counter();
    let on_error = {
        let errors = errors.clone();
        move |_: &SessionError| {
            errors.fetch_add(1, Ordering::SeqCst);
        }
    };

    session.connect(|_| {}, on_error.clone());
    assert_eq!(session.settled().await, ConnectionState::Failed);
    assert_eq!(connector.attempt_count(), 6);

    session.shutdown().await;
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert_eq!(session.status().reconnect_attempts, 0);

    session.connect(|_| {}, on_error);
    assert_eq!(session.settled().await, ConnectionState::Failed);
    assert_eq!(connector.attempt_count(), 12);
    assert_eq!(errors.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_connect_after_shutdown_mid_retry_gets_full_budget() {
    let connector = ScriptedConnector::unreachable();
    let session = Session::new(SessionConfig::new("/ws-endpoint"), connector.clone());

    session.connect(|_| {}, |_| {});
    while session.status().reconnect_attempts < 3 {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(connector.attempt_count(), 3);

    session.shutdown().await;
    assert_eq!(session.status().reconnect_attempts, 0);

    let exhausted_at = Arc::new(AtomicU32::new(0));
    let exhausted_clone = exhausted_at.clone();
    session.connect(|_| {}, move |err| {
        if let SessionError::ReconnectExhausted { attempts } = err {
            exhausted_clone.store(*attempts, Ordering::SeqCst);
        }
    });
    assert_eq!(session.settled().await, ConnectionState::Failed);

    // a fresh chain of six, not the three left over
    assert_eq!(connector.attempt_count(), 3 + 6);
    assert_eq!(exhausted_at.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn test_connect_after_disconnect_gets_full_budget() {
    let connector = ScriptedConnector::failing(2);
    let session = Session::new(SessionConfig::new("/ws-endpoint"), connector.clone());

    session.connect(|_| {}, |_| {});
    assert_eq!(session.settled().await, ConnectionState::Connected);
    session.disconnect().await;

    connector.set_unreachable(true);
    session.connect(|_| {}, |_| {});
    assert_eq!(session.settled().await, ConnectionState::Failed);
    assert_eq!(connector.attempt_count(), 3 + 6);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_while_connecting_closes_late_connection() {
    let connector = ScriptedConnector::new();
    let session = Session::new(SessionConfig::new("/ws-endpoint"), connector.clone());

    let connects = counter();
    let connects_clone = connects.clone();
    session.connect(move |_| {
        connects_clone.fetch_add(1, Ordering::SeqCst);
    }, |_| {});
    assert_eq!(session.connection_state(), ConnectionState::Connecting);

    session.shutdown().await;
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);

    // let the in-flight attempt finish its connect
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(connector.client_count(), 1);
    assert!(connector.last_client().is_disconnected());
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert_eq!(connects.load(Ordering::SeqCst), 0);
    assert!(!session.status().connected);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_retry_ignores_late_failure() {
    let connector = ScriptedConnector::unreachable();
    let session = Session::new(SessionConfig::new("/ws-endpoint"), connector.clone());

    let errors = counter();
    let errors_clone = errors.clone();
    session.connect(|_| {}, move |_| {
        errors_clone.fetch_add(1, Ordering::SeqCst);
    });
    // the first attempt fails once the spawned task runs
    session.shutdown().await;

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.attempt_count(), 1);
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert_eq!(errors.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_on_connect_runs_for_connect_made_by_retry() {
    let connector = ScriptedConnector::failing(2);
    let session = Session::new(SessionConfig::new("/ws-endpoint"), connector.clone());

    let connects = counter();
    let connects_clone = connects.clone();
    session.connect(move |frame| {
        assert_eq!(frame.command, "CONNECTED");
        connects_clone.fetch_add(1, Ordering::SeqCst);
    }, |_| {});

    assert_eq!(session.settled().await, ConnectionState::Connected);
    assert_eq!(connector.attempt_count(), 3);
    assert_eq!(connects.load(Ordering::SeqCst), 1);
}
