#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use async_trait::async_trait;
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::traits::{Connector, Inbound, Socket};
use crate::Result;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// [`Connector`] backed by `tokio-tungstenite`, with TLS through rustls.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    type Socket = TungsteniteSocket;

    async fn connect(&self, url: &str) -> Result<TungsteniteSocket> {
        #[cfg(feature = "tracing")]
        tracing::debug!(%url, "Opening WebSocket connection");

        let (stream, _response) = connect_async(url).await?;

        Ok(TungsteniteSocket { stream })
    }
}

/// An open `tokio-tungstenite` connection.
///
/// Pings are answered by tungstenite itself while reading; they are still surfaced as
/// [`Inbound::Ping`] so callers can treat them as liveness.
#[derive(Debug)]
pub struct TungsteniteSocket {
    stream: WsStream,
}

#[async_trait]
impl Socket for TungsteniteSocket {
    async fn recv(&mut self) -> Option<Result<Inbound>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return None;
                }
                Err(e) => return Some(Err(e.into())),
            };

            let inbound = match message {
                Message::Text(text) => Inbound::Text(text.to_string()),
                Message::Ping(_) => Inbound::Ping,
                Message::Pong(_) => Inbound::Pong,
                Message::Close(frame) => Inbound::Close {
                    code: frame.as_ref().map(|f| u16::from(f.code)),
                    reason: frame.map(|f| f.reason.to_string()),
                },
                Message::Binary(_) | Message::Frame(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Ignoring non-text WebSocket frame");
                    continue;
                }
            };

            return Some(Ok(inbound));
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self.stream.close(None).await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
