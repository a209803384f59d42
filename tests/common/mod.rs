#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests, and https://github.com/rust-lang/rust-clippy/issues/13981"
)]
#![allow(
    unused,
    reason = "Each test binary uses a different subset of the helpers"
)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use eventsub_client::Result;
use eventsub_client::auth::Credentials;
use eventsub_client::error::Error;
use eventsub_client::eventsub::{MonitorEvent, SubscriptionApi};
use eventsub_client::helix::types::{
    CreateSubscriptionRequest, SubscriptionRecord, SubscriptionStatus,
};
use eventsub_client::ws::{Connector, Inbound, Socket, WsError};
use reqwest::{Method, StatusCode};
use tokio::sync::broadcast;
use tokio::time::{Instant, sleep_until, timeout};

pub const CLIENT_ID: &str = "hof5gwx0su6owfnys0nyan9c87zr6t";
pub const ACCESS_TOKEN: &str = "cfabdegwdoklmawdzdo98xt2fo512y";
pub const ENDPOINT: &str = "wss://eventsub.test/ws";

#[must_use]
pub fn credentials() -> Credentials {
    Credentials::new(CLIENT_ID.to_owned(), ACCESS_TOKEN.to_owned())
}

/// Wire payloads modelled on the EventSub WebSocket reference.
/// <https://dev.twitch.tv/docs/eventsub/websocket-reference/>
pub mod payloads {
    use serde_json::{Value, json};

    pub const SESSION_ID: &str = "AQoQexAWVYKSTIu4ec_2VAxyuhAB";

    fn envelope(message_type: &str, subscription_type: Option<&str>, payload: &Value) -> String {
        let mut metadata = json!({
            "message_id": "96a3f3b5-5dec-4eed-908e-e11ee657416c",
            "message_type": message_type,
            "message_timestamp": "2023-07-19T14:56:51.634234626Z"
        });
        if let Some(subscription_type) = subscription_type {
            metadata["subscription_type"] = json!(subscription_type);
            metadata["subscription_version"] = json!("1");
        }

        json!({ "metadata": metadata, "payload": payload }).to_string()
    }

    #[must_use]
    pub fn subscription(event_type: &str, status: &str) -> Value {
        json!({
            "id": "f1c2a387-161a-49f9-a165-0f21d7a4e1c4",
            "status": status,
            "type": event_type,
            "version": "1",
            "cost": 0,
            "condition": { "broadcaster_user_id": "12826" },
            "transport": { "method": "websocket", "session_id": SESSION_ID },
            "created_at": "2023-07-19T14:56:51.634234626Z"
        })
    }

    #[must_use]
    pub fn welcome(session_id: &str, keepalive_timeout_seconds: u64) -> String {
        envelope(
            "session_welcome",
            None,
            &json!({
                "session": {
                    "id": session_id,
                    "status": "connected",
                    "connected_at": "2023-07-19T14:56:51.616329898Z",
                    "keepalive_timeout_seconds": keepalive_timeout_seconds,
                    "reconnect_url": null
                }
            }),
        )
    }

    #[must_use]
    pub fn keepalive() -> String {
        envelope("session_keepalive", None, &json!({}))
    }

    #[must_use]
    pub fn notification(event_type: &str, event: &Value) -> String {
        envelope(
            "notification",
            Some(event_type),
            &json!({
                "subscription": subscription(event_type, "enabled"),
                "event": event
            }),
        )
    }

    #[must_use]
    pub fn reconnect(url: &str) -> String {
        envelope(
            "session_reconnect",
            None,
            &json!({
                "session": {
                    "id": SESSION_ID,
                    "status": "reconnecting",
                    "keepalive_timeout_seconds": null,
                    "reconnect_url": url,
                    "connected_at": "2023-07-19T10:11:12.634234626Z"
                }
            }),
        )
    }

    #[must_use]
    pub fn revocation(event_type: &str, status: &str) -> String {
        envelope(
            "revocation",
            Some(event_type),
            &json!({ "subscription": subscription(event_type, status) }),
        )
    }

    #[must_use]
    pub fn unknown(message_type: &str) -> String {
        envelope(message_type, None, &json!({}))
    }
}

/// One step of a scripted connection.
#[derive(Debug, Clone)]
pub enum Step {
    /// Deliver a text message
    Text(String),
    /// Deliver a non-text message
    Frame(Inbound),
    /// Stay silent for a while
    Wait(Duration),
    /// End the stream as if the peer hung up
    Hangup,
}

/// What the next dial yields.
#[derive(Debug, Clone)]
pub enum Dial {
    Accept(Vec<Step>),
    /// Refuse the handshake with an HTTP status
    Refuse(u16),
    /// Fail as a network error would
    Fail,
}

/// Counters shared between a [`ScriptedConnector`] and the test.
#[derive(Debug, Default)]
pub struct Wire {
    pub dials: Mutex<Vec<String>>,
    pub closes: AtomicUsize,
}

impl Wire {
    pub fn dials(&self) -> Vec<String> {
        self.dials.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Connector replaying one [`Dial`] per connection attempt. Once the script runs out,
/// dials hang until the monitor is stopped; once a connection's steps run out it stays
/// silent.
pub struct ScriptedConnector {
    script: Mutex<VecDeque<Dial>>,
    wire: Arc<Wire>,
}

impl ScriptedConnector {
    pub fn new(script: impl IntoIterator<Item = Dial>) -> (Self, Arc<Wire>) {
        let wire = Arc::new(Wire::default());
        let connector = Self {
            script: Mutex::new(script.into_iter().collect()),
            wire: Arc::clone(&wire),
        };
        (connector, wire)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Socket = ScriptedSocket;

    async fn connect(&self, url: &str) -> Result<ScriptedSocket> {
        self.wire.dials.lock().unwrap().push(url.to_owned());
        let next = self.script.lock().unwrap().pop_front();

        match next {
            Some(Dial::Accept(steps)) => Ok(ScriptedSocket {
                steps: steps.into_iter().map(Pending::Step).collect(),
                wire: Arc::clone(&self.wire),
            }),
            Some(Dial::Refuse(status)) => Err(WsError::Unauthorized { status }.into()),
            Some(Dial::Fail) => Err(WsError::ConnectionClosed {
                code: None,
                reason: Some("connection refused".to_owned()),
            }
            .into()),
            None => std::future::pending().await,
        }
    }
}

#[derive(Debug)]
enum Pending {
    Step(Step),
    Until(Instant),
}

pub struct ScriptedSocket {
    steps: VecDeque<Pending>,
    wire: Arc<Wire>,
}

#[async_trait]
impl Socket for ScriptedSocket {
    async fn recv(&mut self) -> Option<Result<Inbound>> {
        loop {
            // A wait is turned into a deadline before sleeping so that a cancelled recv
            // resumes the same wait instead of skipping it.
            if let Some(Pending::Step(Step::Wait(duration))) = self.steps.front() {
                let deadline = Instant::now() + *duration;
                self.steps[0] = Pending::Until(deadline);
            }

            match self.steps.front() {
                None => return std::future::pending().await,
                Some(Pending::Until(deadline)) => {
                    sleep_until(*deadline).await;
                    self.steps.pop_front();
                }
                Some(Pending::Step(_)) => match self.steps.pop_front() {
                    Some(Pending::Step(Step::Text(text))) => return Some(Ok(Inbound::Text(text))),
                    Some(Pending::Step(Step::Frame(inbound))) => return Some(Ok(inbound)),
                    Some(Pending::Step(Step::Hangup)) => return None,
                    _ => {}
                },
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.wire.closes.fetch_add(1, Ordering::SeqCst);
        self.steps.clear();
        Ok(())
    }
}

/// Scripted reply of the fake subscription API.
#[derive(Debug, Clone, Copy)]
pub enum Reply {
    Created,
    Status(StatusCode),
}

/// Subscription API replaying scripted replies, then creating everything.
#[derive(Debug, Default)]
pub struct FakeApi {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<CreateSubscriptionRequest>>,
    always: Mutex<Option<Reply>>,
}

impl FakeApi {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        })
    }

    /// Answer every call with `reply`.
    pub fn always(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            always: Mutex::new(Some(reply)),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<CreateSubscriptionRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubscriptionApi for FakeApi {
    async fn create(&self, request: &CreateSubscriptionRequest) -> Result<SubscriptionRecord> {
        self.calls.lock().unwrap().push(request.clone());

        let always = *self.always.lock().unwrap();
        let reply = always
            .or_else(|| self.replies.lock().unwrap().pop_front())
            .unwrap_or(Reply::Created);

        match reply {
            Reply::Created => Ok(SubscriptionRecord::builder()
                .id(format!("{}-{}", request.transport.session_id, request.event_type))
                .status(SubscriptionStatus::Enabled)
                .event_type(request.event_type.clone())
                .version(request.version.clone())
                .condition(request.condition.clone())
                .created_at(Utc::now())
                .build()),
            Reply::Status(status) => Err(Error::status(
                status,
                Method::POST,
                "/helix/eventsub/subscriptions".to_owned(),
                "scripted failure",
            )),
        }
    }
}

/// Wait for the first event matching `predicate`, skipping the others.
pub async fn wait_for<F>(events: &mut broadcast::Receiver<MonitorEvent>, predicate: F) -> MonitorEvent
where
    F: Fn(&MonitorEvent) -> bool,
{
    timeout(Duration::from_secs(24 * 3600), async {
        loop {
            let event = events.recv().await.unwrap();
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .unwrap()
}

/// Collect every event currently queued.
pub fn drain(events: &mut broadcast::Receiver<MonitorEvent>) -> Vec<MonitorEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
