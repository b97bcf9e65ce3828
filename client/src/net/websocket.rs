use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tungstenite::client::IntoClientRequest;
use tungstenite::http::header::{HeaderName, HeaderValue};
use tungstenite::Message;

use netbridge::prelude::*;

use crate::error::TransportError;
use crate::event::{Event, EventSink};
use crate::handle::{Command, ConnectionHandle, ConnectionState};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Owns one WebSocket connection for its whole life: the handshake, the receive loop and the
/// commands issued through its [`ConnectionHandle`].
///
/// Emits either a single `websocket_failure`, or `websocket_connect` followed by any number of
/// `websocket_message` events and exactly one `websocket_close`.
pub(crate) struct WebSocketWorker {
    pub id: OperationId,
    pub descriptor: ConnectDescriptor,
    pub tls: native_tls::TlsConnector,
    pub events: EventSink,
}

impl WebSocketWorker {
    pub async fn run(self) {
        let id = self.id;
        let (handle, commands) = ConnectionHandle::new(id);

        log::debug!("WebSocket {}: connecting to {}", id, self.descriptor.url);

        let stream = match self.connect().await {
            Ok(stream) => stream,
            Err(err) => {
                log::warn!("WebSocket {} failed to connect: {}", id, err);
                handle.set_state(ConnectionState::Closed);
                self.events.push(Event::WebsocketFailure {
                    id,
                    message: err.to_string(),
                });
                return;
            }
        };

        handle.set_state(ConnectionState::Open);
        self.events.push(Event::WebsocketConnect {
            id,
            handle: handle.clone(),
        });

        self.receive(stream, &handle, commands).await;

        handle.set_state(ConnectionState::Closed);
        log::debug!("WebSocket {} closed", id);
        self.events.push(Event::WebsocketClose { id });
    }

    async fn connect(&self) -> Result<WsStream, TransportError> {
        let mut request = self.descriptor.url.as_str().into_client_request()?;

        for (name, value) in &self.descriptor.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| TransportError::InvalidHeader(name.clone()))?;
            let header_value =
                HeaderValue::from_str(value).map_err(|_| TransportError::InvalidHeader(name.clone()))?;
            request.headers_mut().insert(header_name, header_value);
        }

        let connector = Connector::NativeTls(self.tls.clone());
        let (stream, _response) =
            tokio_tungstenite::connect_async_tls_with_config(request, None, false, Some(connector)).await?;

        Ok(stream)
    }

    async fn receive(
        &self,
        stream: WsStream,
        handle: &ConnectionHandle,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) {
        let id = self.id;
        let (mut sink, mut stream) = stream.split();
        let mut commands_open = true;

        loop {
            tokio::select! {
                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        self.events.push(Event::WebsocketMessage { id, text });
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        let text = String::from_utf8_lossy(&bytes).into_owned();
                        self.events.push(Event::WebsocketMessage { id, text });
                    }
                    Some(Ok(Message::Close(frame))) => {
                        log::debug!("WebSocket {} closed by peer: {:?}", id, frame);
                        handle.begin_closing();
                        let _ = sink.close().await;
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        log::warn!("WebSocket {} receive error: {}", id, err);
                        break;
                    }
                    None => break,
                },
                command = commands.recv(), if commands_open => match command {
                    Some(Command::Send(text)) => {
                        if let Err(err) = sink.send(Message::Text(text)).await {
                            log::warn!("WebSocket {} send error: {}", id, err);
                            break;
                        }
                    }
                    Some(Command::Close) => {
                        // The peer's reply ends the loop through the receive arm.
                        if let Err(err) = sink.send(Message::Close(None)).await {
                            log::debug!("WebSocket {} close error: {}", id, err);
                            break;
                        }
                    }
                    None => commands_open = false,
                },
            }
        }
    }
}
