//! Reconnect loop and per-connection state machine.
//!
//! The supervisor is the only owner of the socket and the session. Every other component
//! reports an outcome; the supervisor decides whether the connection is closed, redialed
//! or abandoned, and publishes each transition as a [`ConnectionState`].

use std::sync::{Arc, Mutex, PoisonError};

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff as _;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use super::registration::RegistrationCoordinator;
use super::router::{NotificationRouter, RouteOutcome};
use super::state::{ConnectionState, MonitorEvent, StopReason};
use super::types::{Frame, Revocation, Session, decode};
use crate::Result;
use crate::error::Error;
use crate::helix::types::SubscriptionRecord;
use crate::ws::config::{Config, Liveness};
use crate::ws::{Connector, HeartbeatWatchdog, Inbound, Socket, WsError};

/// How a connection ended.
#[derive(Debug)]
enum SessionEnd {
    /// `session_reconnect`: dial `url` next, without waiting
    Redirect(String),
    /// The connection is unusable; reconnect after backoff
    Retry {
        error: Error,
        /// Whether a session had been welcomed on this connection
        established: bool,
    },
    Stop(StopReason),
}

impl SessionEnd {
    fn retry<E: Into<Error>>(error: E, established: bool) -> Self {
        Self::Retry {
            error: error.into(),
            established,
        }
    }
}

pub(crate) struct Supervisor<C: Connector> {
    pub(crate) connector: Arc<C>,
    pub(crate) endpoint: String,
    pub(crate) config: Config,
    pub(crate) coordinator: RegistrationCoordinator,
    pub(crate) router: NotificationRouter,
    pub(crate) records: Arc<Mutex<Vec<SubscriptionRecord>>>,
    pub(crate) state_tx: Arc<watch::Sender<ConnectionState>>,
    pub(crate) events_tx: broadcast::Sender<MonitorEvent>,
    pub(crate) cancel: CancellationToken,
}

impl<C: Connector> Supervisor<C> {
    fn publish(&self, state: ConnectionState) {
        #[cfg(feature = "tracing")]
        tracing::debug!(?state, "Connection state changed");

        self.state_tx.send_replace(state);
    }

    fn emit(&self, event: MonitorEvent) {
        _ = self.events_tx.send(event);
    }

    /// Main connection loop with automatic reconnection.
    pub(crate) async fn run(self) {
        let reason = self.connection_loop().await;

        #[cfg(feature = "tracing")]
        tracing::info!(%reason, "EventSub monitor stopped");

        self.publish(ConnectionState::Stopped(reason));
        self.emit(MonitorEvent::Stopped(reason));
    }

    async fn connection_loop(&self) -> StopReason {
        let mut url = self.endpoint.clone();
        let mut failures = 0_u32;
        let mut backoff: ExponentialBackoff = self.config.reconnect.clone().into();

        loop {
            if self.cancel.is_cancelled() {
                return StopReason::Requested;
            }

            self.publish(ConnectionState::Connecting { url: url.clone() });

            let connected = tokio::select! {
                biased;

                () = self.cancel.cancelled() => return StopReason::Requested,
                result = self.connector.connect(&url) => result,
            };

            let error = match connected {
                Ok(socket) => {
                    self.emit(MonitorEvent::Connected { url: url.clone() });

                    let end = self.run_session(socket).await;
                    self.records
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .clear();

                    match end {
                        SessionEnd::Stop(reason) => return reason,
                        SessionEnd::Redirect(next) => {
                            #[cfg(feature = "tracing")]
                            tracing::info!(from = %url, to = %next, "Following session_reconnect");

                            self.emit(MonitorEvent::Disconnected {
                                reason: "session_reconnect".to_owned(),
                            });
                            self.publish(ConnectionState::Disconnected);
                            url = next;
                            failures = 0;
                            backoff.reset();
                            continue;
                        }
                        SessionEnd::Retry { error, established } => {
                            if established {
                                failures = 0;
                                backoff.reset();
                            }
                            error
                        }
                    }
                }
                Err(e) if e.is_unauthorized() => {
                    #[cfg(feature = "tracing")]
                    tracing::error!(%url, error = %e, "WebSocket handshake rejected");
                    return StopReason::Unauthorized;
                }
                Err(e) => e,
            };

            #[cfg(feature = "tracing")]
            tracing::warn!(%url, error = %error, "EventSub connection lost");

            self.emit(MonitorEvent::Disconnected {
                reason: error.to_string(),
            });
            self.publish(ConnectionState::Disconnected);

            failures = failures.saturating_add(1);
            if let Some(max) = self.config.reconnect.max_attempts
                && failures >= max
            {
                return StopReason::RetriesExhausted;
            }

            let delay = backoff
                .next_backoff()
                .unwrap_or(self.config.reconnect.max_backoff);

            self.emit(MonitorEvent::ReconnectScheduled {
                url: url.clone(),
                delay,
                attempt: failures,
            });

            tokio::select! {
                biased;

                () = self.cancel.cancelled() => return StopReason::Requested,
                () = sleep(delay) => {}
            }
        }
    }

    /// Drive one connection from welcome to teardown. The socket is always closed here.
    async fn run_session(&self, mut socket: C::Socket) -> SessionEnd {
        self.publish(ConnectionState::AwaitingWelcome);

        let end = match self.await_welcome(&mut socket).await {
            Ok(session) => self.live(&mut socket, session).await,
            Err(end) => end,
        };

        self.publish(ConnectionState::Closing);
        if let Err(e) = socket.close().await {
            #[cfg(feature = "tracing")]
            tracing::debug!(error = %e, "Error closing WebSocket");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }

        end
    }

    async fn await_welcome(&self, socket: &mut C::Socket) -> std::result::Result<Session, SessionEnd> {
        let welcome_timeout = self.config.welcome_timeout;

        let result = tokio::select! {
            biased;

            () = self.cancel.cancelled() => return Err(SessionEnd::Stop(StopReason::Requested)),
            result = timeout(welcome_timeout, first_frame(socket)) => result,
        };

        let error = match result {
            Ok(Ok(Frame::Welcome(session))) => return Ok(session),
            Ok(Ok(other)) => Error::from(WsError::UnexpectedFirstFrame {
                message_type: other.message_type().to_owned(),
            }),
            Ok(Err(e)) => e,
            Err(_elapsed) => WsError::WelcomeTimeout(welcome_timeout).into(),
        };

        if is_protocol_violation(&error) {
            #[cfg(feature = "tracing")]
            tracing::error!(error = %error, "EventSub protocol violation before welcome");

            self.emit(MonitorEvent::ProtocolError {
                error: error.to_string(),
            });
        }

        Err(SessionEnd::retry(error, false))
    }

    async fn live(&self, socket: &mut C::Socket, mut session: Session) -> SessionEnd {
        #[cfg(feature = "tracing")]
        tracing::info!(
            session_id = %session.id,
            keepalive_timeout = ?session.keepalive_timeout,
            "EventSub session established"
        );

        let session_id = session.id.clone();
        let keepalive_timeout = session.keepalive_timeout;

        self.emit(MonitorEvent::SessionWelcomed {
            session_id: session_id.clone(),
            keepalive_timeout,
        });
        self.publish(ConnectionState::Registering(session.clone()));

        let (expired_tx, mut expired_rx) = mpsc::unbounded_channel();
        let mut watchdog = HeartbeatWatchdog::new(move || {
            expired_tx.send(()).map_err(|_closed| {
                WsError::ConnectionClosed {
                    code: None,
                    reason: Some("session already ended".to_owned()),
                }
                .into()
            })
        });
        watchdog.arm(keepalive_timeout);

        let registration = self.coordinator.run(&session_id, &self.records);
        tokio::pin!(registration);
        let mut registering = true;

        let end = loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => break SessionEnd::Stop(StopReason::Requested),

                Some(()) = expired_rx.recv() => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(%session_id, ?keepalive_timeout, "keepalive timeout");

                    self.emit(MonitorEvent::KeepaliveTimeout {
                        session_id: session_id.clone(),
                        timeout: keepalive_timeout,
                    });
                    break SessionEnd::retry(WsError::KeepaliveTimeout(keepalive_timeout), true);
                }

                result = &mut registration, if registering => {
                    registering = false;
                    match result {
                        Ok(outcome) => {
                            session.registered = outcome.is_registered();
                            self.emit(MonitorEvent::RegistrationFinished {
                                session_id: session_id.clone(),
                                outcome,
                            });
                            self.publish(ConnectionState::Live(session.clone()));
                        }
                        Err(e) if e.is_unauthorized() => {
                            #[cfg(feature = "tracing")]
                            tracing::error!(error = %e, "Subscription API rejected the credentials");
                            break SessionEnd::Stop(StopReason::Unauthorized);
                        }
                        Err(e) => {
                            self.emit(MonitorEvent::RegistrationFailed {
                                session_id: session_id.clone(),
                                error: e.to_string(),
                            });
                            break SessionEnd::retry(e, true);
                        }
                    }
                }

                inbound = socket.recv() => {
                    let text = match inbound {
                        None => {
                            break SessionEnd::retry(
                                WsError::ConnectionClosed { code: None, reason: None },
                                true,
                            );
                        }
                        Some(Err(e)) => break SessionEnd::retry(e, true),
                        Some(Ok(Inbound::Close { code, reason })) => {
                            break SessionEnd::retry(WsError::ConnectionClosed { code, reason }, true);
                        }
                        Some(Ok(Inbound::Ping | Inbound::Pong)) => {
                            if self.config.liveness == Liveness::AnyFrame {
                                watchdog.rearm();
                            }
                            continue;
                        }
                        Some(Ok(Inbound::Text(text))) => text,
                    };

                    if self.config.liveness == Liveness::AnyFrame {
                        watchdog.rearm();
                    }

                    if let Some(end) = self.handle_text(&text, &mut watchdog).await {
                        break end;
                    }
                }
            }
        };

        watchdog.disarm();
        end
    }

    /// Handle one text message of a live session. Returns `Some` when the session must end.
    async fn handle_text(&self, text: &str, watchdog: &mut HeartbeatWatchdog) -> Option<SessionEnd> {
        let frame = match decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %e, %text, "Undecodable EventSub message");

                self.emit(MonitorEvent::ProtocolError {
                    error: e.to_string(),
                });
                return Some(SessionEnd::retry(e, true));
            }
        };

        match frame {
            Frame::Keepalive => {
                watchdog.rearm();
            }
            Frame::Notification(notification) => {
                let event_type = notification.event_type().to_owned();

                match self.router.route(&notification).await {
                    RouteOutcome::Delivered => {}
                    RouteOutcome::Unregistered => {
                        self.emit(MonitorEvent::UnhandledNotification { event_type });
                    }
                    RouteOutcome::Failed(error) => {
                        self.emit(MonitorEvent::SubscriberFailed { event_type, error });
                    }
                }
            }
            Frame::Reconnect { url } => {
                self.emit(MonitorEvent::Redirected { url: url.clone() });
                return Some(SessionEnd::Redirect(url));
            }
            Frame::Revocation(revocation) => {
                let Revocation {
                    event_type, status, ..
                } = *revocation;

                #[cfg(feature = "tracing")]
                tracing::warn!(%event_type, %status, "Subscription revoked");

                self.emit(MonitorEvent::Revoked {
                    event_type: event_type.clone(),
                    status: status.clone(),
                });
                return Some(SessionEnd::retry(
                    WsError::Revoked {
                        subscription_type: event_type,
                        status: status.to_string(),
                    },
                    true,
                ));
            }
            Frame::Welcome(session) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(session_id = %session.id, "Ignoring session_welcome on a live session");
                #[cfg(not(feature = "tracing"))]
                let _ = &session;
            }
            Frame::Unknown { message_type } => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%message_type, "Unknown EventSub message type");

                self.emit(MonitorEvent::UnknownMessage { message_type });
            }
        }

        None
    }
}

/// Read until the first text message and decode it. Pings before the welcome are skipped.
async fn first_frame<S: Socket>(socket: &mut S) -> Result<Frame> {
    loop {
        match socket.recv().await {
            None => {
                return Err(WsError::ConnectionClosed {
                    code: None,
                    reason: None,
                }
                .into());
            }
            Some(Err(e)) => return Err(e),
            Some(Ok(Inbound::Ping | Inbound::Pong)) => {}
            Some(Ok(Inbound::Close { code, reason })) => {
                return Err(WsError::ConnectionClosed { code, reason }.into());
            }
            Some(Ok(Inbound::Text(text))) => return decode(&text),
        }
    }
}

fn is_protocol_violation(error: &Error) -> bool {
    error
        .downcast_ref::<WsError>()
        .is_some_and(WsError::is_protocol_violation)
}
