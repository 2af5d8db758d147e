//! Integration tests for the session state machine.
//!
//! Time is paused, so every timer fires exactly at its deadline and the
//! backoff schedule can be asserted directly.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.

mod common;

use std::time::Duration;

use common::{context, messages_at, settle, store_with, test_config, FakeClient, Script, ACCOUNT};
use fleet_core::{
    Account, AccountId, ConnectMode, ConnectionState, Credentials, LogLevel, ServerConfig,
};
use fleet_protocol::{ClientEvent, MovementFlag};
use fleetd::session::{spawn_session, ConnectError, SessionError};
use tokio::time::{sleep, timeout, Instant};

fn account() -> Account {
    Account::new(Credentials::new(ACCOUNT, "secret"))
}

fn server() -> ServerConfig {
    ServerConfig::new("play.example.net", 25565)
}

fn assert_gap(actual: Duration, expected_secs: u64) {
    let expected = Duration::from_secs(expected_secs);
    assert!(
        actual >= expected && actual < expected + Duration::from_millis(100),
        "expected gap of ~{expected_secs}s, got {actual:?}"
    );
}

// ============================================================================
// Connect and Backoff
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_connect_reaches_connected_on_spawn() {
    let client = FakeClient::new(vec![], Script::Spawn);
    let store = store_with(&[ACCOUNT]);
    let session = spawn_session(
        account(),
        server(),
        context(client.clone(), store.clone(), test_config()),
    );

    session.connect().await.expect("first attempt should spawn");
    assert_eq!(session.state(), ConnectionState::Connected);

    let view = session.status().await;
    assert!(view.connected);
    assert_eq!(view.reconnect_attempts, 0);
    assert!(view.last_connected_at.is_some());
    assert!(view.addon.is_some(), "addon exists while connected");

    let persisted = store.status_of(&AccountId::new(ACCOUNT)).await.unwrap();
    assert_eq!(persisted.state, ConnectionState::Connected);
    assert!(persisted.last_connected_at.is_some());

    let infos = messages_at(&store, LogLevel::Info).await;
    assert!(infos
        .iter()
        .any(|m| m == "Attempting connection to play.example.net:25565"));
    let successes = messages_at(&store, LogLevel::Success).await;
    assert_eq!(successes, vec!["Bot spawned in game".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_connect_twice_is_ok_when_connected() {
    let client = FakeClient::new(vec![], Script::Spawn);
    let session = spawn_session(
        account(),
        server(),
        context(client.clone(), store_with(&[ACCOUNT]), test_config()),
    );

    session.connect().await.unwrap();
    session.connect().await.expect("already connected is not an error");
    assert_eq!(client.opens().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_linear_backoff_until_exhausted() {
    let client = FakeClient::new(vec![], Script::Refuse("refused".to_string()));
    let store = store_with(&[ACCOUNT]);
    let mut config = test_config();
    config.reconnect.base_delay_secs = 5;
    config.reconnect.max_attempts = 2;

    let session = spawn_session(
        account(),
        server(),
        context(client.clone(), store.clone(), config),
    );

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, ConnectError::ClientError(_)), "got {err:?}");

    timeout(
        Duration::from_secs(120),
        session.wait_for_state(ConnectionState::Disconnected),
    )
    .await
    .expect("should give up")
    .expect("actor should still be running");

    // Initial attempt plus two retries, 5s then 10s apart.
    let gaps = client.open_gaps();
    assert_eq!(gaps.len(), 2);
    assert_gap(gaps[0], 5);
    assert_gap(gaps[1], 10);

    let warnings = messages_at(&store, LogLevel::Warning).await;
    assert_eq!(
        warnings,
        vec![
            "Reconnecting in 5s (attempt 1/2)".to_string(),
            "Reconnecting in 10s (attempt 2/2)".to_string(),
        ]
    );

    let errors = messages_at(&store, LogLevel::Error).await;
    assert!(errors
        .iter()
        .any(|m| m == "Reconnect failed: reconnect attempts exhausted after 2 attempts"));
    assert!(errors
        .iter()
        .any(|m| m == "Error: connection failed: refused"));

    let persisted = store.status_of(&AccountId::new(ACCOUNT)).await.unwrap();
    assert_eq!(persisted.state, ConnectionState::Disconnected);

    // No further attempts once exhausted.
    sleep(Duration::from_secs(300)).await;
    assert_eq!(client.opens().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_connect_after_exhaustion_starts_over() {
    let client = FakeClient::new(
        vec![
            Script::Refuse("down".to_string()),
            Script::Refuse("down".to_string()),
        ],
        Script::Spawn,
    );
    let mut config = test_config();
    config.reconnect.max_attempts = 1;

    let session = spawn_session(
        account(),
        server(),
        context(client.clone(), store_with(&[ACCOUNT]), config),
    );

    assert!(session.connect().await.is_err());
    session
        .wait_for_state(ConnectionState::Disconnected)
        .await
        .unwrap();

    session.connect().await.expect("fresh connect should spawn");
    assert_eq!(session.state(), ConnectionState::Connected);
    assert_eq!(client.opens().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_attempts_reset_after_spawn() {
    let client = FakeClient::new(vec![Script::Refuse("busy".to_string())], Script::Spawn);
    let session = spawn_session(
        account(),
        server(),
        context(client.clone(), store_with(&[ACCOUNT]), test_config()),
    );

    assert!(session.connect().await.is_err());
    assert_eq!(session.status().await.reconnect_attempts, 1);

    session
        .wait_for_state(ConnectionState::Connected)
        .await
        .unwrap();
    assert_eq!(session.status().await.reconnect_attempts, 0);

    // Kick after a successful spawn starts again from the base delay.
    client.last_handle().emit(ClientEvent::Kicked {
        reason: "restarting".to_string(),
    });
    settle().await;
    assert_eq!(session.state(), ConnectionState::Failed);

    session
        .wait_for_state(ConnectionState::Connected)
        .await
        .unwrap();
    let gaps = client.open_gaps();
    assert_gap(gaps[1], 5);
}

#[tokio::test(start_paused = true)]
async fn test_connect_while_retry_pending_is_in_progress() {
    let client = FakeClient::new(vec![], Script::Refuse("refused".to_string()));
    let session = spawn_session(
        account(),
        server(),
        context(client, store_with(&[ACCOUNT]), test_config()),
    );

    assert!(session.connect().await.is_err());
    assert_eq!(session.connect().await, Err(ConnectError::InProgress));
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_login_adds_delay() {
    let client = FakeClient::new(
        vec![Script::Kick(
            "You are already logged in from another location".to_string(),
        )],
        Script::Spawn,
    );
    let store = store_with(&[ACCOUNT]);
    let session = spawn_session(
        account(),
        server(),
        context(client.clone(), store.clone(), test_config()),
    );

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, ConnectError::Kicked(_)));

    session
        .wait_for_state(ConnectionState::Connected)
        .await
        .unwrap();

    // base 5s + duplicate-login 15s
    assert_gap(client.open_gaps()[0], 20);

    let errors = messages_at(&store, LogLevel::Error).await;
    assert_eq!(
        errors,
        vec!["Kicked: You are already logged in from another location".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_without_spawn() {
    let client = FakeClient::new(vec![Script::Hang], Script::Spawn);
    let store = store_with(&[ACCOUNT]);
    let session = spawn_session(
        account(),
        server(),
        context(client.clone(), store.clone(), test_config()),
    );

    let started = Instant::now();
    let err = session.connect().await.unwrap_err();
    assert_eq!(err, ConnectError::ConnectTimeout(Duration::from_secs(30)));
    assert_gap(started.elapsed(), 30);

    let hung = client.last_handle();
    assert!(hung.is_closed(), "timed-out connection is closed");

    let errors = messages_at(&store, LogLevel::Error).await;
    assert_eq!(errors, vec!["Connection timeout after 30s".to_string()]);

    session
        .wait_for_state(ConnectionState::Connected)
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_end_event_triggers_reconnect() {
    let client = FakeClient::new(vec![], Script::Spawn);
    let store = store_with(&[ACCOUNT]);
    let session = spawn_session(
        account(),
        server(),
        context(client.clone(), store.clone(), test_config()),
    );

    session.connect().await.unwrap();
    let first = client.last_handle();
    first.emit(ClientEvent::End {
        reason: Some("socket closed".to_string()),
    });
    settle().await;

    assert_eq!(session.state(), ConnectionState::Failed);
    assert!(first.is_closed());
    assert!(session.status().await.addon.is_none());

    session
        .wait_for_state(ConnectionState::Connected)
        .await
        .unwrap();
    assert_eq!(client.handle_count(), 2);

    let errors = messages_at(&store, LogLevel::Error).await;
    assert_eq!(
        errors,
        vec!["Error: connection ended: socket closed".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_disabled_goes_straight_to_disconnected() {
    let client = FakeClient::new(vec![], Script::Refuse("refused".to_string()));
    let store = store_with(&[ACCOUNT]);
    let mut config = test_config();
    config.reconnect.enabled = false;

    let session = spawn_session(
        account(),
        server(),
        context(client.clone(), store.clone(), config),
    );

    assert!(session.connect().await.is_err());
    session
        .wait_for_state(ConnectionState::Disconnected)
        .await
        .unwrap();

    sleep(Duration::from_secs(120)).await;
    assert_eq!(client.opens().len(), 1);

    let infos = messages_at(&store, LogLevel::Info).await;
    assert!(infos
        .iter()
        .any(|m| m == "Auto-reconnect disabled, not retrying"));
}

// ============================================================================
// Manual Disconnect
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_manual_disconnect_is_terminal() {
    let client = FakeClient::new(vec![], Script::Spawn);
    let store = store_with(&[ACCOUNT]);
    let session = spawn_session(
        account(),
        server(),
        context(client.clone(), store.clone(), test_config()),
    );

    session.connect().await.unwrap();
    let live = client.last_handle();

    session.disconnect().await.expect("disconnect should succeed");
    settle().await;

    assert!(live.is_closed());
    assert!(!session.is_alive(), "actor stops after manual disconnect");
    assert_eq!(session.state(), ConnectionState::Disconnected);

    let view = session.status().await;
    assert_eq!(view.state, ConnectionState::Disconnected);
    assert!(view.addon.is_none());

    let persisted = store.status_of(&AccountId::new(ACCOUNT)).await.unwrap();
    assert_eq!(persisted.state, ConnectionState::Disconnected);

    // A kick arriving after teardown changes nothing.
    live.emit(ClientEvent::Kicked {
        reason: "late".to_string(),
    });
    sleep(Duration::from_secs(120)).await;
    assert_eq!(client.opens().len(), 1);
    assert!(session.disconnect().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_retry() {
    let client = FakeClient::new(vec![], Script::Refuse("refused".to_string()));
    let session = spawn_session(
        account(),
        server(),
        context(client.clone(), store_with(&[ACCOUNT]), test_config()),
    );

    assert!(session.connect().await.is_err());
    session.disconnect().await.unwrap();

    sleep(Duration::from_secs(300)).await;
    assert_eq!(client.opens().len(), 1, "no retry after manual disconnect");
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_while_connecting_answers_first_caller() {
    let client = FakeClient::new(vec![Script::Hang], Script::Spawn);
    let session = spawn_session(
        account(),
        server(),
        context(client.clone(), store_with(&[ACCOUNT]), test_config()),
    );

    let connecting = session.clone();
    let pending = tokio::spawn(async move { connecting.connect().await });
    settle().await;
    assert_eq!(session.state(), ConnectionState::Connecting);

    session.disconnect().await.unwrap();
    let result = pending.await.unwrap();
    assert_eq!(result, Err(ConnectError::ManualDisconnect));
    assert!(client.last_handle().is_closed());
}

// ============================================================================
// Spawn Delay, Startup Commands, Keepalive
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_startup_commands_after_spawn_delay() {
    let client = FakeClient::new(vec![], Script::Spawn);
    let store = store_with(&[ACCOUNT]);
    let mut config = test_config();
    config.connect.startup_commands = vec!["/login hunter2".to_string(), "/afk".to_string()];

    let session = spawn_session(
        account(),
        server(),
        context(client.clone(), store.clone(), config),
    );
    session.connect().await.unwrap();
    let live = client.last_handle();

    sleep(Duration::from_secs(9)).await;
    assert!(live.chats().is_empty(), "nothing before the spawn delay");

    sleep(Duration::from_secs(2)).await;
    assert_eq!(
        live.chats(),
        vec!["/login hunter2".to_string(), "/afk".to_string()]
    );

    let infos = messages_at(&store, LogLevel::Info).await;
    assert!(infos.iter().any(|m| m == "Sent: /afk"));
}

#[tokio::test(start_paused = true)]
async fn test_silent_mode_sends_no_startup_commands() {
    let client = FakeClient::new(vec![], Script::Spawn);
    let mut config = test_config();
    config.connect.startup_commands = vec!["/afk".to_string()];
    config.connect.mode = ConnectMode::Silent;

    let session = spawn_session(
        account(),
        server(),
        context(client.clone(), store_with(&[ACCOUNT]), config),
    );
    session.connect().await.unwrap();
    let live = client.last_handle();

    sleep(Duration::from_secs(56)).await;
    assert!(live.chats().is_empty());
    // Keepalive still runs in silent mode.
    assert!(live.flags().contains(&(MovementFlag::Jump, true)));
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_pulses_jump() {
    let client = FakeClient::new(vec![], Script::Spawn);
    let session = spawn_session(
        account(),
        server(),
        context(client.clone(), store_with(&[ACCOUNT]), test_config()),
    );
    session.connect().await.unwrap();
    let live = client.last_handle();

    // Spawn delay 10s, then first pulse one interval (45s) later.
    sleep(Duration::from_secs(54)).await;
    assert!(live.flags().is_empty());

    sleep(Duration::from_secs(2)).await;
    assert_eq!(
        live.flags(),
        vec![(MovementFlag::Jump, true), (MovementFlag::Jump, false)]
    );

    sleep(Duration::from_secs(45)).await;
    assert_eq!(live.flags().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_retries_without_entity() {
    let client = FakeClient::new(vec![], Script::Spawn);
    let session = spawn_session(
        account(),
        server(),
        context(client.clone(), store_with(&[ACCOUNT]), test_config()),
    );
    session.connect().await.unwrap();
    let live = client.last_handle();
    live.set_entity(false);

    sleep(Duration::from_secs(56)).await;
    assert!(live.flags().is_empty(), "no pulse without an entity");

    live.set_entity(true);
    sleep(Duration::from_secs(5)).await;
    assert!(live.flags().contains(&(MovementFlag::Jump, true)));
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_stops_after_disconnect() {
    let client = FakeClient::new(vec![], Script::Spawn);
    let session = spawn_session(
        account(),
        server(),
        context(client.clone(), store_with(&[ACCOUNT]), test_config()),
    );
    session.connect().await.unwrap();
    let live = client.last_handle();

    sleep(Duration::from_secs(20)).await;
    session.disconnect().await.unwrap();

    sleep(Duration::from_secs(200)).await;
    assert!(live.flags().is_empty());
}

// ============================================================================
// Chat and Addon Availability
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_chat_requires_connection() {
    let client = FakeClient::new(vec![], Script::Spawn);
    let session = spawn_session(
        account(),
        server(),
        context(client.clone(), store_with(&[ACCOUNT]), test_config()),
    );

    assert_eq!(
        session.send_chat("hello").await,
        Err(SessionError::NotConnected)
    );

    session.connect().await.unwrap();
    session.send_chat("hello").await.unwrap();
    assert_eq!(client.last_handle().chats(), vec!["hello".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_addon_unavailable_when_not_connected() {
    let client = FakeClient::new(vec![], Script::Refuse("refused".to_string()));
    let session = spawn_session(
        account(),
        server(),
        context(client, store_with(&[ACCOUNT]), test_config()),
    );

    assert!(session.status().await.addon.is_none());
    assert_eq!(
        session.start_discovery().await,
        Err(SessionError::NotConnected)
    );

    assert!(session.connect().await.is_err());
    assert!(session.status().await.addon.is_none());
    assert_eq!(
        session.start_command_loop("spawn", 10).await,
        Err(SessionError::NotConnected)
    );
}
