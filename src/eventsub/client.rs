use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::registration::{RegistrationCoordinator, RetryPolicy, SubscriptionApi};
use super::registry::{EventDescriptor, SubscriptionRegistry};
use super::router::NotificationRouter;
use super::state::{ConnectionState, MonitorEvent};
use super::subscriber::Subscriber;
use super::supervisor::Supervisor;
use super::types::Session;
use crate::auth::Credentials;
use crate::error::Error;
use crate::helix::types::{Condition, SubscriptionRecord};
use crate::ws::config::Config;
use crate::ws::{Connector, TungsteniteConnector};
use crate::{EVENTSUB_WS_ENDPOINT, Result, helix};

/// Broadcast channel capacity for diagnostic events.
const EVENTS_CAPACITY: usize = 256;

/// Configuration for an [`EventMonitor`].
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// URL of the first connection. `session_reconnect` replaces it for later ones.
    pub endpoint: String,
    /// Welcome timeout, liveness policy and reconnect backoff
    pub connection: Config,
    /// Rate-limit handling of registration passes
    pub retry: RetryPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            endpoint: EVENTSUB_WS_ENDPOINT.to_owned(),
            connection: Config::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl MonitorConfig {
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        endpoint.clone_into(&mut self.endpoint);
        self
    }
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// EventSub WebSocket client.
///
/// Keeps one session alive in a background task: it connects, waits for the welcome,
/// creates a subscription for every registered event type and routes notifications to
/// their subscribers. Disconnects, `session_reconnect`, revocations and keepalive
/// timeouts all lead to a fresh connection; only [`stop`](Self::stop) and rejected
/// credentials end it.
///
/// # Example
///
/// ```no_run
/// use eventsub_client::auth::Credentials;
/// use eventsub_client::eventsub::{EventMonitor, subscriber};
/// use eventsub_client::helix::types::Condition;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let monitor = EventMonitor::new(Credentials::new(
///     "client-id".to_owned(),
///     "user-token".to_owned(),
/// ))?;
///
/// monitor.register(
///     "stream.online",
///     "1",
///     Condition::from([("broadcaster_user_id".to_owned(), "12826".to_owned())]),
///     subscriber::from_fn(|notification| async move {
///         println!("{}", notification.event);
///         Ok(())
///     }),
/// );
///
/// monitor.start()?;
/// // ...
/// monitor.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct EventMonitor<C: Connector = TungsteniteConnector> {
    connector: Arc<C>,
    api: Arc<dyn SubscriptionApi>,
    config: MonitorConfig,
    registry: Arc<SubscriptionRegistry>,
    records: Arc<Mutex<Vec<SubscriptionRecord>>>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    events_tx: broadcast::Sender<MonitorEvent>,
    running: Mutex<Option<Running>>,
}

impl EventMonitor<TungsteniteConnector> {
    /// Create a monitor against the public EventSub and Helix endpoints.
    pub fn new(credentials: Credentials) -> Result<Self> {
        let api = helix::Client::with_credentials(credentials)?;

        Ok(Self::with_config(MonitorConfig::default(), Arc::new(api)))
    }

    #[must_use]
    pub fn with_config(config: MonitorConfig, api: Arc<dyn SubscriptionApi>) -> Self {
        Self::with_connector(config, api, TungsteniteConnector)
    }
}

impl<C: Connector> EventMonitor<C> {
    /// Create a monitor with a custom transport.
    #[must_use]
    pub fn with_connector(config: MonitorConfig, api: Arc<dyn SubscriptionApi>, connector: C) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, _) = broadcast::channel(EVENTS_CAPACITY);

        Self {
            connector: Arc::new(connector),
            api,
            config,
            registry: Arc::new(SubscriptionRegistry::new()),
            records: Arc::new(Mutex::new(Vec::new())),
            state_tx: Arc::new(state_tx),
            events_tx,
            running: Mutex::new(None),
        }
    }

    /// Register interest in `event_type`, replacing any previous registration for it.
    ///
    /// Routing picks the subscriber up immediately. Server-side subscriptions are only
    /// created by a registration pass: a descriptor registered while a pass is running is
    /// created by that pass, but one registered after the session is live gets no
    /// subscription, and so no notifications, until the next welcome after a reconnect.
    pub fn register<S: Subscriber>(
        &self,
        event_type: &str,
        version: &str,
        condition: Condition,
        subscriber: S,
    ) -> Option<Arc<EventDescriptor>> {
        self.registry.register(EventDescriptor::new(
            event_type, version, condition, subscriber,
        ))
    }

    /// Stop routing `event_type` and leave it out of future registration passes.
    ///
    /// The server-side subscription of the current session is not deleted; it ends with
    /// the session.
    pub fn unregister(&self, event_type: &str) -> Option<Arc<EventDescriptor>> {
        self.registry.unregister(event_type)
    }

    /// Registered descriptors in registration order.
    #[must_use]
    pub fn descriptors(&self) -> Vec<Arc<EventDescriptor>> {
        self.registry.all()
    }

    /// Spawn the connection task. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails with a validation error if the monitor is already running.
    pub fn start(&self) -> Result<()> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);

        if running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
        {
            return Err(Error::validation("EventSub monitor is already running"));
        }

        let cancel = CancellationToken::new();
        let supervisor = Supervisor {
            connector: Arc::clone(&self.connector),
            endpoint: self.config.endpoint.clone(),
            config: self.config.connection.clone(),
            coordinator: RegistrationCoordinator::new(
                Arc::clone(&self.api),
                Arc::clone(&self.registry),
                self.config.retry.clone(),
            ),
            router: NotificationRouter::new(Arc::clone(&self.registry)),
            records: Arc::clone(&self.records),
            state_tx: Arc::clone(&self.state_tx),
            events_tx: self.events_tx.clone(),
            cancel: cancel.clone(),
        };

        #[cfg(feature = "tracing")]
        tracing::info!(endpoint = %self.config.endpoint, "Starting EventSub monitor");

        let handle = tokio::spawn(supervisor.run());
        *running = Some(Running { cancel, handle });

        Ok(())
    }

    /// Stop the connection task and wait for it to close the socket. Idempotent.
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(Running { cancel, handle }) = running else {
            return;
        };

        cancel.cancel();
        if let Err(e) = handle.await {
            #[cfg(feature = "tracing")]
            tracing::error!(error = %e, "EventSub monitor task failed");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }
    }

    /// Whether the connection task is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Id of the current session.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::error::Kind::NotConnected`] unless the monitor is registering
    /// or live.
    pub fn current_session_id(&self) -> Result<String> {
        self.state_tx
            .borrow()
            .session()
            .map(|session| session.id.clone())
            .ok_or_else(Error::not_connected)
    }

    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.state_tx.borrow().session().cloned()
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Subscribe to diagnostic events.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events_tx.subscribe()
    }

    /// Subscriptions created for the current session, in creation order.
    #[must_use]
    pub fn subscription_records(&self) -> Vec<SubscriptionRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<C: Connector> Drop for EventMonitor<C> {
    fn drop(&mut self) {
        let running = self.running.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = running.as_ref() {
            running.cancel.cancel();
        }
    }
}

impl<C: Connector> std::fmt::Debug for EventMonitor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventMonitor")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("state", &*self.state_tx.borrow())
            .finish_non_exhaustive()
    }
}
