#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{Dial, ENDPOINT, FakeApi, Reply, ScriptedConnector, Step, Wire, drain, payloads, wait_for};
use eventsub_client::error::Kind;
use eventsub_client::eventsub::subscriber::{self, SubscriberError};
use eventsub_client::eventsub::{
    ConnectionState, EventMonitor, ExhaustionPolicy, MonitorConfig, MonitorEvent,
    RegistrationOutcome, StopReason,
};
use eventsub_client::helix::types::{Condition, SubscriptionStatus};
use eventsub_client::ws::Inbound;
use eventsub_client::ws::config::{Liveness, ReconnectConfig};
use reqwest::StatusCode;
use serde_json::json;
use tokio::time::{Instant, sleep};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

fn config() -> MonitorConfig {
    let mut config = MonitorConfig::default().with_endpoint(ENDPOINT);
    config.connection.reconnect = ReconnectConfig::fixed(RECONNECT_DELAY);
    config
}

fn monitor(
    config: MonitorConfig,
    api: &Arc<FakeApi>,
    script: Vec<Dial>,
) -> (EventMonitor<ScriptedConnector>, Arc<Wire>) {
    let (connector, wire) = ScriptedConnector::new(script);
    let monitor = EventMonitor::with_connector(config, Arc::clone(api) as _, connector);
    (monitor, wire)
}

fn counting(counter: &Arc<AtomicUsize>) -> impl eventsub_client::eventsub::Subscriber {
    let counter = Arc::clone(counter);
    subscriber::from_fn(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok::<(), SubscriberError>(()) }
    })
}

fn broadcaster() -> Condition {
    Condition::from([("broadcaster_user_id".to_owned(), "12826".to_owned())])
}

#[tokio::test(start_paused = true)]
async fn welcome_establishes_session_and_registers() {
    let api = FakeApi::new([]);
    let (monitor, _wire) = monitor(
        config(),
        &api,
        vec![Dial::Accept(vec![Step::Text(payloads::welcome("S1", 10))])],
    );
    monitor.register("stream.online", "1", broadcaster(), counting(&Arc::default()));
    monitor.register("channel.follow", "2", broadcaster(), counting(&Arc::default()));

    assert_eq!(
        monitor.current_session_id().unwrap_err().kind(),
        Kind::NotConnected
    );

    let mut events = monitor.events();
    monitor.start().unwrap();

    assert_eq!(
        wait_for(&mut events, |e| matches!(e, MonitorEvent::SessionWelcomed { .. })).await,
        MonitorEvent::SessionWelcomed {
            session_id: "S1".to_owned(),
            keepalive_timeout: Duration::from_secs(10),
        }
    );
    assert_eq!(
        wait_for(&mut events, |e| matches!(e, MonitorEvent::RegistrationFinished { .. })).await,
        MonitorEvent::RegistrationFinished {
            session_id: "S1".to_owned(),
            outcome: RegistrationOutcome::Registered { passes: 1 },
        }
    );

    assert_eq!(monitor.current_session_id().unwrap(), "S1");
    let session = monitor.current_session().unwrap();
    assert!(session.registered);
    assert!(monitor.state().is_live());

    let calls = api.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].event_type, "stream.online");
    assert_eq!(calls[1].event_type, "channel.follow");
    assert!(calls.iter().all(|call| call.transport.session_id == "S1"));

    let records = monitor.subscription_records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, "S1-stream.online");

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn non_welcome_first_frame_reconnects() {
    let api = FakeApi::new([]);
    let (monitor, wire) = monitor(
        config(),
        &api,
        vec![
            Dial::Accept(vec![Step::Text(payloads::keepalive())]),
            Dial::Accept(vec![Step::Text(payloads::welcome("S2", 10))]),
        ],
    );
    let mut events = monitor.events();
    monitor.start().unwrap();

    let error = wait_for(&mut events, |e| matches!(e, MonitorEvent::ProtocolError { .. })).await;
    let MonitorEvent::ProtocolError { error } = error else {
        unreachable!()
    };
    assert!(error.contains("session_keepalive"), "{error}");

    wait_for(&mut events, |e| matches!(e, MonitorEvent::SessionWelcomed { .. })).await;

    assert_eq!(wire.dials(), [ENDPOINT, ENDPOINT]);
    assert_eq!(wire.closes(), 1);
    assert_eq!(monitor.current_session_id().unwrap(), "S2");

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn silent_server_never_welcomes() {
    let api = FakeApi::new([]);
    let (monitor, wire) = monitor(config(), &api, vec![Dial::Accept(vec![])]);
    let mut events = monitor.events();
    let started = Instant::now();
    monitor.start().unwrap();

    wait_for(&mut events, |e| matches!(e, MonitorEvent::ProtocolError { .. })).await;

    assert_eq!(started.elapsed(), Duration::from_secs(10));
    assert_eq!(wire.closes(), 1);
    assert!(api.calls().is_empty());

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn keepalive_silence_closes_once_and_redials_once() {
    let api = FakeApi::new([]);
    let (monitor, wire) = monitor(
        config(),
        &api,
        vec![Dial::Accept(vec![Step::Text(payloads::welcome("S1", 10))])],
    );
    monitor.register("stream.online", "1", broadcaster(), counting(&Arc::default()));
    let mut events = monitor.events();
    let started = Instant::now();
    monitor.start().unwrap();

    assert_eq!(
        wait_for(&mut events, |e| matches!(e, MonitorEvent::KeepaliveTimeout { .. })).await,
        MonitorEvent::KeepaliveTimeout {
            session_id: "S1".to_owned(),
            timeout: Duration::from_secs(10),
        }
    );
    assert_eq!(started.elapsed(), Duration::from_secs(10));
    assert!(monitor.subscription_records().is_empty());

    // The redial hangs because the script is exhausted; nothing else may happen.
    sleep(Duration::from_secs(120)).await;

    assert_eq!(wire.dials(), [ENDPOINT, ENDPOINT]);
    assert_eq!(wire.closes(), 1);
    let timeouts = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, MonitorEvent::KeepaliveTimeout { .. }))
        .count();
    assert_eq!(timeouts, 0);
    assert_eq!(
        monitor.state(),
        ConnectionState::Connecting {
            url: ENDPOINT.to_owned()
        }
    );

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn keepalives_keep_session_alive() {
    let api = FakeApi::new([]);
    let mut steps = vec![Step::Text(payloads::welcome("S1", 10))];
    for _ in 0..5 {
        steps.push(Step::Wait(Duration::from_secs(8)));
        steps.push(Step::Text(payloads::keepalive()));
    }
    let (monitor, wire) = monitor(config(), &api, vec![Dial::Accept(steps)]);
    let mut events = monitor.events();
    let started = Instant::now();
    monitor.start().unwrap();

    wait_for(&mut events, |e| matches!(e, MonitorEvent::KeepaliveTimeout { .. })).await;

    // Last keepalive at 40s, timeout 10s later.
    assert_eq!(started.elapsed(), Duration::from_secs(50));
    assert_eq!(wire.closes(), 1);

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn notifications_count_as_liveness_by_default() {
    let api = FakeApi::new([]);
    let calls = Arc::new(AtomicUsize::new(0));
    let event = json!({ "broadcaster_user_id": "12826" });
    let (monitor, _wire) = monitor(
        config(),
        &api,
        vec![Dial::Accept(vec![
            Step::Text(payloads::welcome("S1", 10)),
            Step::Wait(Duration::from_secs(6)),
            Step::Text(payloads::notification("stream.online", &event)),
            Step::Wait(Duration::from_secs(6)),
            Step::Frame(Inbound::Ping),
        ])],
    );
    monitor.register("stream.online", "1", broadcaster(), counting(&calls));
    let mut events = monitor.events();
    let started = Instant::now();
    monitor.start().unwrap();

    wait_for(&mut events, |e| matches!(e, MonitorEvent::KeepaliveTimeout { .. })).await;

    assert_eq!(started.elapsed(), Duration::from_secs(22));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn keepalive_only_liveness_ignores_notifications() {
    let api = FakeApi::new([]);
    let event = json!({ "broadcaster_user_id": "12826" });
    let mut config = config();
    config.connection.liveness = Liveness::KeepaliveOnly;
    let (monitor, _wire) = monitor(
        config,
        &api,
        vec![Dial::Accept(vec![
            Step::Text(payloads::welcome("S1", 10)),
            Step::Wait(Duration::from_secs(6)),
            Step::Text(payloads::notification("stream.online", &event)),
        ])],
    );
    monitor.register("stream.online", "1", broadcaster(), counting(&Arc::default()));
    let mut events = monitor.events();
    let started = Instant::now();
    monitor.start().unwrap();

    wait_for(&mut events, |e| matches!(e, MonitorEvent::KeepaliveTimeout { .. })).await;

    assert_eq!(started.elapsed(), Duration::from_secs(10));

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn session_reconnect_redirect_is_sticky() {
    let api = FakeApi::new([]);
    let (monitor, wire) = monitor(
        config(),
        &api,
        vec![
            Dial::Accept(vec![
                Step::Text(payloads::welcome("S1", 10)),
                Step::Text(payloads::reconnect("wss://new")),
            ]),
            Dial::Accept(vec![Step::Text(payloads::welcome("S2", 10)), Step::Hangup]),
        ],
    );
    let mut events = monitor.events();
    let started = Instant::now();
    monitor.start().unwrap();

    assert_eq!(
        wait_for(&mut events, |e| matches!(e, MonitorEvent::Redirected { .. })).await,
        MonitorEvent::Redirected {
            url: "wss://new".to_owned()
        }
    );
    wait_for(&mut events, |e| {
        matches!(e, MonitorEvent::SessionWelcomed { session_id, .. } if session_id == "S2")
    })
    .await;
    assert_eq!(started.elapsed(), Duration::ZERO);

    // The second connection hangs up; the retry still targets the redirect.
    assert_eq!(
        wait_for(&mut events, |e| matches!(e, MonitorEvent::ReconnectScheduled { .. })).await,
        MonitorEvent::ReconnectScheduled {
            url: "wss://new".to_owned(),
            delay: RECONNECT_DELAY,
            attempt: 1,
        }
    );
    sleep(RECONNECT_DELAY * 2).await;

    assert_eq!(wire.dials(), [ENDPOINT, "wss://new", "wss://new"]);
    assert_eq!(wire.closes(), 2);

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn unregistered_notification_is_reported_and_loop_continues() {
    let api = FakeApi::new([]);
    let calls = Arc::new(AtomicUsize::new(0));
    let event = json!({ "broadcaster_user_id": "12826" });
    let (monitor, wire) = monitor(
        config(),
        &api,
        vec![Dial::Accept(vec![
            Step::Text(payloads::welcome("S1", 10)),
            Step::Text(payloads::notification("channel.raid", &event)),
            Step::Text(payloads::unknown("session_teapot")),
            Step::Text(payloads::notification("stream.online", &event)),
        ])],
    );
    monitor.register("stream.online", "1", broadcaster(), counting(&calls));
    let mut events = monitor.events();
    monitor.start().unwrap();

    assert_eq!(
        wait_for(&mut events, |e| matches!(e, MonitorEvent::UnhandledNotification { .. })).await,
        MonitorEvent::UnhandledNotification {
            event_type: "channel.raid".to_owned()
        }
    );
    assert_eq!(
        wait_for(&mut events, |e| matches!(e, MonitorEvent::UnknownMessage { .. })).await,
        MonitorEvent::UnknownMessage {
            message_type: "session_teapot".to_owned()
        }
    );
    sleep(Duration::from_secs(1)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(wire.closes(), 0);

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failing_subscriber_does_not_block_others() {
    let api = FakeApi::new([]);
    let calls = Arc::new(AtomicUsize::new(0));
    let event = json!({ "broadcaster_user_id": "12826" });
    let (monitor, wire) = monitor(
        config(),
        &api,
        vec![Dial::Accept(vec![
            Step::Text(payloads::welcome("S1", 10)),
            Step::Text(payloads::notification("channel.follow", &event)),
            Step::Text(payloads::notification("stream.online", &event)),
        ])],
    );
    monitor.register(
        "channel.follow",
        "2",
        broadcaster(),
        subscriber::from_fn(|_| async { Err::<(), SubscriberError>("follower store is down".into()) }),
    );
    monitor.register("stream.online", "1", broadcaster(), counting(&calls));
    let mut events = monitor.events();
    monitor.start().unwrap();

    assert_eq!(
        wait_for(&mut events, |e| matches!(e, MonitorEvent::SubscriberFailed { .. })).await,
        MonitorEvent::SubscriberFailed {
            event_type: "channel.follow".to_owned(),
            error: "follower store is down".to_owned(),
        }
    );
    sleep(Duration::from_secs(1)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(wire.closes(), 0);

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn revocation_reconnects_to_same_url() {
    let api = FakeApi::new([]);
    let (monitor, wire) = monitor(
        config(),
        &api,
        vec![Dial::Accept(vec![
            Step::Text(payloads::welcome("S1", 10)),
            Step::Wait(Duration::from_secs(1)),
            Step::Text(payloads::revocation("stream.online", "authorization_revoked")),
        ])],
    );
    monitor.register("stream.online", "1", broadcaster(), counting(&Arc::default()));
    let mut events = monitor.events();
    monitor.start().unwrap();

    assert_eq!(
        wait_for(&mut events, |e| matches!(e, MonitorEvent::Revoked { .. })).await,
        MonitorEvent::Revoked {
            event_type: "stream.online".to_owned(),
            status: SubscriptionStatus::AuthorizationRevoked,
        }
    );
    wait_for(&mut events, |e| matches!(e, MonitorEvent::ReconnectScheduled { .. })).await;
    sleep(RECONNECT_DELAY * 2).await;

    assert_eq!(wire.dials(), [ENDPOINT, ENDPOINT]);
    assert_eq!(wire.closes(), 1);

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn trimmed_revocation_still_reconnects() {
    let trimmed = json!({
        "metadata": {
            "message_id": "84c1e79a-2a4b-4c13-ba0b-4312293e9308",
            "message_type": "revocation",
            "message_timestamp": "2023-07-19T14:56:51.634234626Z",
            "subscription_type": "stream.online",
            "subscription_version": "1"
        },
        "payload": { "subscription": { "status": "user_removed" } }
    })
    .to_string();
    let api = FakeApi::new([]);
    let (monitor, wire) = monitor(
        config(),
        &api,
        vec![Dial::Accept(vec![
            Step::Text(payloads::welcome("S1", 10)),
            Step::Wait(Duration::from_secs(1)),
            Step::Text(trimmed),
        ])],
    );
    monitor.register("stream.online", "1", broadcaster(), counting(&Arc::default()));
    let mut events = monitor.events();
    monitor.start().unwrap();

    assert_eq!(
        wait_for(&mut events, |e| matches!(e, MonitorEvent::Revoked { .. })).await,
        MonitorEvent::Revoked {
            event_type: "stream.online".to_owned(),
            status: SubscriptionStatus::UserRemoved,
        }
    );
    wait_for(&mut events, |e| matches!(e, MonitorEvent::ReconnectScheduled { .. })).await;

    assert_eq!(wire.closes(), 1);

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn register_after_live_waits_for_next_session() {
    let api = FakeApi::new([]);
    let (monitor, _wire) = monitor(
        config(),
        &api,
        vec![
            Dial::Accept(vec![
                Step::Text(payloads::welcome("S1", 10)),
                Step::Wait(Duration::from_secs(5)),
                Step::Hangup,
            ]),
            Dial::Accept(vec![Step::Text(payloads::welcome("S2", 10))]),
        ],
    );
    monitor.register("channel.follow", "2", broadcaster(), counting(&Arc::default()));
    let mut events = monitor.events();
    monitor.start().unwrap();

    wait_for(&mut events, |e| matches!(e, MonitorEvent::RegistrationFinished { .. })).await;
    monitor.register("stream.online", "1", broadcaster(), counting(&Arc::default()));
    sleep(Duration::from_secs(2)).await;

    // Live sessions are not re-registered.
    assert!(monitor.state().is_live());
    assert_eq!(api.calls().len(), 1);

    assert_eq!(
        wait_for(&mut events, |e| matches!(e, MonitorEvent::RegistrationFinished { .. })).await,
        MonitorEvent::RegistrationFinished {
            session_id: "S2".to_owned(),
            outcome: RegistrationOutcome::Registered { passes: 1 },
        }
    );
    let calls = api.calls();
    let second: Vec<_> = calls[1..]
        .iter()
        .map(|call| (call.event_type.as_str(), call.transport.session_id.as_str()))
        .collect();
    assert_eq!(second, [("channel.follow", "S2"), ("stream.online", "S2")]);

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn rate_limited_registration_keeps_reading_frames() {
    let api = FakeApi::new([Reply::Status(StatusCode::TOO_MANY_REQUESTS)]);
    let calls = Arc::new(AtomicUsize::new(0));
    let event = json!({ "broadcaster_user_id": "12826" });
    let mut steps = vec![Step::Text(payloads::welcome("S1", 10))];
    for _ in 0..80 {
        steps.push(Step::Wait(Duration::from_secs(8)));
        steps.push(Step::Text(payloads::keepalive()));
    }
    steps.insert(2, Step::Text(payloads::notification("stream.online", &event)));
    let (monitor, wire) = monitor(config(), &api, vec![Dial::Accept(steps)]);
    monitor.register("stream.online", "1", broadcaster(), counting(&calls));
    let mut events = monitor.events();
    let started = Instant::now();
    monitor.start().unwrap();

    sleep(Duration::from_secs(30)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(matches!(monitor.state(), ConnectionState::Registering(_)));

    assert_eq!(
        wait_for(&mut events, |e| matches!(e, MonitorEvent::RegistrationFinished { .. })).await,
        MonitorEvent::RegistrationFinished {
            session_id: "S1".to_owned(),
            outcome: RegistrationOutcome::Registered { passes: 2 },
        }
    );
    assert_eq!(started.elapsed(), Duration::from_secs(600));
    assert!(monitor.state().is_live());
    assert_eq!(monitor.subscription_records().len(), 1);
    assert_eq!(wire.closes(), 0);

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn exhausted_registration_degrades_by_default() {
    let api = FakeApi::always(Reply::Status(StatusCode::TOO_MANY_REQUESTS));
    let mut config = config();
    config.retry.delay = Duration::from_secs(1);
    config.connection.liveness = Liveness::AnyFrame;
    let mut steps = vec![Step::Text(payloads::welcome("S1", 10))];
    for _ in 0..3 {
        steps.push(Step::Wait(Duration::from_secs(5)));
        steps.push(Step::Text(payloads::keepalive()));
    }
    let (monitor, _wire) = monitor(config, &api, vec![Dial::Accept(steps)]);
    monitor.register("stream.online", "1", broadcaster(), counting(&Arc::default()));
    let mut events = monitor.events();
    monitor.start().unwrap();

    assert_eq!(
        wait_for(&mut events, |e| matches!(e, MonitorEvent::RegistrationFinished { .. })).await,
        MonitorEvent::RegistrationFinished {
            session_id: "S1".to_owned(),
            outcome: RegistrationOutcome::Degraded {
                passes: 5,
                missing: 1
            },
        }
    );
    assert_eq!(api.calls().len(), 5);
    let session = monitor.current_session().unwrap();
    assert!(!session.registered);
    assert!(monitor.state().is_live());

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn exhausted_registration_can_reconnect() {
    let api = FakeApi::always(Reply::Status(StatusCode::TOO_MANY_REQUESTS));
    let mut config = config();
    config.retry.delay = Duration::from_secs(1);
    config.retry.on_exhausted = ExhaustionPolicy::Reconnect;
    let (monitor, wire) = monitor(
        config,
        &api,
        vec![Dial::Accept(vec![Step::Text(payloads::welcome("S1", 10))])],
    );
    monitor.register("stream.online", "1", broadcaster(), counting(&Arc::default()));
    let mut events = monitor.events();
    monitor.start().unwrap();

    wait_for(&mut events, |e| matches!(e, MonitorEvent::RegistrationFailed { .. })).await;
    wait_for(&mut events, |e| matches!(e, MonitorEvent::ReconnectScheduled { .. })).await;

    assert_eq!(wire.closes(), 1);

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn registration_failure_reconnects() {
    let api = FakeApi::new([Reply::Status(StatusCode::BAD_REQUEST)]);
    let (monitor, wire) = monitor(
        config(),
        &api,
        vec![
            Dial::Accept(vec![Step::Text(payloads::welcome("S1", 10))]),
            Dial::Accept(vec![Step::Text(payloads::welcome("S2", 10))]),
        ],
    );
    monitor.register("stream.online", "1", broadcaster(), counting(&Arc::default()));
    let mut events = monitor.events();
    monitor.start().unwrap();

    wait_for(&mut events, |e| matches!(e, MonitorEvent::RegistrationFailed { .. })).await;
    assert_eq!(
        wait_for(&mut events, |e| matches!(e, MonitorEvent::RegistrationFinished { .. })).await,
        MonitorEvent::RegistrationFinished {
            session_id: "S2".to_owned(),
            outcome: RegistrationOutcome::Registered { passes: 1 },
        }
    );

    assert_eq!(wire.closes(), 1);
    let records = monitor.subscription_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, "S2-stream.online");

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn unauthorized_handshake_stops() {
    let api = FakeApi::new([]);
    let (monitor, wire) = monitor(config(), &api, vec![Dial::Refuse(403)]);
    let mut events = monitor.events();
    monitor.start().unwrap();

    assert_eq!(
        wait_for(&mut events, |e| matches!(e, MonitorEvent::Stopped(_))).await,
        MonitorEvent::Stopped(StopReason::Unauthorized)
    );
    assert_eq!(
        monitor.state(),
        ConnectionState::Stopped(StopReason::Unauthorized)
    );
    assert_eq!(wire.dials().len(), 1);

    monitor.stop().await;
    assert!(!monitor.is_running());
}

#[tokio::test(start_paused = true)]
async fn unauthorized_subscription_api_stops() {
    let api = FakeApi::new([Reply::Status(StatusCode::UNAUTHORIZED)]);
    let (monitor, wire) = monitor(
        config(),
        &api,
        vec![Dial::Accept(vec![Step::Text(payloads::welcome("S1", 10))])],
    );
    monitor.register("stream.online", "1", broadcaster(), counting(&Arc::default()));
    let mut events = monitor.events();
    monitor.start().unwrap();

    assert_eq!(
        wait_for(&mut events, |e| matches!(e, MonitorEvent::Stopped(_))).await,
        MonitorEvent::Stopped(StopReason::Unauthorized)
    );
    assert_eq!(wire.closes(), 1);
    assert_eq!(wire.dials().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn consecutive_dial_failures_give_up_after_max_attempts() {
    let api = FakeApi::new([]);
    let mut config = config();
    config.connection.reconnect.max_attempts = Some(3);
    let (monitor, wire) = monitor(
        config,
        &api,
        vec![Dial::Fail, Dial::Fail, Dial::Fail, Dial::Fail],
    );
    let mut events = monitor.events();
    monitor.start().unwrap();

    assert_eq!(
        wait_for(&mut events, |e| matches!(e, MonitorEvent::Stopped(_))).await,
        MonitorEvent::Stopped(StopReason::RetriesExhausted)
    );
    assert_eq!(wire.dials().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent_and_closes_socket() {
    let api = FakeApi::new([]);
    let (monitor, wire) = monitor(
        config(),
        &api,
        vec![Dial::Accept(vec![Step::Text(payloads::welcome("S1", 10))])],
    );
    let mut events = monitor.events();
    monitor.start().unwrap();
    assert_eq!(
        monitor.start().unwrap_err().kind(),
        Kind::Validation
    );

    wait_for(&mut events, |e| matches!(e, MonitorEvent::RegistrationFinished { .. })).await;

    monitor.stop().await;
    monitor.stop().await;

    assert_eq!(wire.closes(), 1);
    assert_eq!(
        monitor.state(),
        ConnectionState::Stopped(StopReason::Requested)
    );
    assert!(!monitor.is_running());
    assert_eq!(
        monitor.current_session_id().unwrap_err().kind(),
        Kind::NotConnected
    );

    // Nothing keeps running after stop.
    sleep(Duration::from_secs(60)).await;
    assert_eq!(wire.dials().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_during_registration_backoff_closes_socket() {
    let api = FakeApi::always(Reply::Status(StatusCode::TOO_MANY_REQUESTS));
    let (monitor, wire) = monitor(
        config(),
        &api,
        vec![Dial::Accept(vec![Step::Text(payloads::welcome("S1", 60))])],
    );
    monitor.register("stream.online", "1", broadcaster(), counting(&Arc::default()));
    let mut events = monitor.events();
    monitor.start().unwrap();

    wait_for(&mut events, |e| matches!(e, MonitorEvent::SessionWelcomed { .. })).await;
    sleep(Duration::from_secs(30)).await;

    assert!(matches!(monitor.state(), ConnectionState::Registering(_)));
    assert_eq!(api.calls().len(), 1);

    monitor.stop().await;

    assert_eq!(wire.closes(), 1);
    assert_eq!(
        monitor.state(),
        ConnectionState::Stopped(StopReason::Requested)
    );
    assert!(monitor.subscription_records().is_empty());

    // The abandoned backoff never resumes.
    sleep(Duration::from_secs(1200)).await;
    assert_eq!(api.calls().len(), 1);
    assert_eq!(wire.dials().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unregister_stops_routing() {
    let api = FakeApi::new([]);
    let calls = Arc::new(AtomicUsize::new(0));
    let event = json!({ "broadcaster_user_id": "12826" });
    let (monitor, _wire) = monitor(
        config(),
        &api,
        vec![Dial::Accept(vec![
            Step::Text(payloads::welcome("S1", 10)),
            Step::Wait(Duration::from_secs(2)),
            Step::Text(payloads::notification("stream.online", &event)),
        ])],
    );
    monitor.register("stream.online", "1", broadcaster(), counting(&calls));
    let mut events = monitor.events();
    monitor.start().unwrap();

    wait_for(&mut events, |e| matches!(e, MonitorEvent::RegistrationFinished { .. })).await;
    assert!(monitor.unregister("stream.online").is_some());

    wait_for(&mut events, |e| matches!(e, MonitorEvent::UnhandledNotification { .. })).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(monitor.descriptors().is_empty());

    monitor.stop().await;
}
