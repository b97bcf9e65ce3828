use tokio::sync::mpsc::{self, error::TryRecvError};

use netbridge::prelude::*;

use crate::handle::{BodyHandle, ConnectionHandle};

/// A completion delivered to the consumer. Every event carries the id its operation was given at
/// dispatch.
#[derive(Debug)]
pub enum Event {
    HttpFailure {
        id: OperationId,
        message: String,
    },
    HttpResponse {
        id: OperationId,
        response: ResponseEnvelope,
        body: BodyHandle,
    },
    WebsocketFailure {
        id: OperationId,
        message: String,
    },
    WebsocketConnect {
        id: OperationId,
        handle: ConnectionHandle,
    },
    WebsocketMessage {
        id: OperationId,
        text: String,
    },
    WebsocketClose {
        id: OperationId,
    },
}

impl Event {
    pub fn id(&self) -> OperationId {
        use self::Event::*;
        match self {
            HttpFailure { id, .. }
            | HttpResponse { id, .. }
            | WebsocketFailure { id, .. }
            | WebsocketConnect { id, .. }
            | WebsocketMessage { id, .. }
            | WebsocketClose { id } => *id,
        }
    }

    /// The name scripts see for this event.
    pub fn tag(&self) -> &'static str {
        use self::Event::*;
        match self {
            HttpFailure { .. } => "http_failure",
            HttpResponse { .. } => "http_response",
            WebsocketFailure { .. } => "websocket_failure",
            WebsocketConnect { .. } => "websocket_connect",
            WebsocketMessage { .. } => "websocket_message",
            WebsocketClose { .. } => "websocket_close",
        }
    }

    /// Whether no further events will carry this event's id.
    pub fn is_terminal(&self) -> bool {
        use self::Event::*;
        matches!(
            self,
            HttpFailure { .. } | HttpResponse { .. } | WebsocketFailure { .. } | WebsocketClose { .. }
        )
    }
}

/// The producing side of the event queue, cloned into every worker.
#[derive(Debug, Clone)]
pub struct EventSink(mpsc::UnboundedSender<Event>);

impl EventSink {
    pub(crate) fn push(&self, event: Event) {
        log::trace!("Queueing {} for operation {}", event.tag(), event.id());

        if self.0.send(event).is_err() {
            log::debug!("Event queue was dropped, discarding event");
        }
    }
}

/// The consuming side. Events come out in the order they were pushed.
#[derive(Debug)]
pub struct EventQueue(mpsc::UnboundedReceiver<Event>);

impl EventQueue {
    /// Takes the next event if one is already queued.
    pub fn try_next(&mut self) -> Option<Event> {
        match self.0.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Everything queued right now, oldest first.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = self.try_next() {
            events.push(event);
        }
        events
    }

    /// Blocks the calling thread until an event arrives. Returns `None` once every producer
    /// (the dispatcher and all running workers) is gone.
    ///
    /// Must not be called from inside the runtime.
    pub fn wait(&mut self) -> Option<Event> {
        self.0.blocking_recv()
    }

    pub async fn next(&mut self) -> Option<Event> {
        self.0.recv().await
    }
}

pub fn channel() -> (EventSink, EventQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink(tx), EventQueue(rx))
}
