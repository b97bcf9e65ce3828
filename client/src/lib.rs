//! Asynchronous HTTP and WebSocket operations for a single-threaded script consumer.
//!
//! A [`Dispatcher`] validates a request synchronously, hands out an [`OperationId`] and runs the
//! operation on a tokio runtime. Results come back as [`Event`]s on the [`EventQueue`], which the
//! consumer drains on its own thread.

use tokio::runtime::Handle;

use netbridge::prelude::*;

pub mod config;
mod error;
pub mod event;
pub mod handle;
mod id;
mod net;

pub use crate::config::{Config, HttpConfig};
pub use crate::error::Error;
pub use crate::event::{Event, EventQueue, EventSink};
pub use crate::handle::{
    BinaryReadHandle, BodyHandle, ConnectionHandle, ConnectionState, ReadFormat, ReadHandle,
};
pub use crate::id::IdAllocator;

pub type Result<T> = std::result::Result<T, Error>;

pub struct Dispatcher {
    ids: IdAllocator,
    http: net::HttpClient,
    tls: native_tls::TlsConnector,
    default_headers: Headers,
    events: EventSink,
    runtime: Handle,
}

impl Dispatcher {
    /// Creates a dispatcher whose workers run on `runtime`, along with the queue its events are
    /// delivered to.
    pub fn new(config: &HttpConfig, runtime: Handle) -> Result<(Dispatcher, EventQueue)> {
        if !config.enable {
            return Err(Error::Disabled);
        }

        let tls = net::tls_connector(config.accept_invalid_certs)?;
        let (events, queue) = event::channel();

        let dispatcher = Dispatcher {
            ids: IdAllocator::new(),
            http: net::build_client(tls.clone()),
            tls,
            default_headers: config.default_headers(),
            events,
            runtime,
        };

        Ok((dispatcher, queue))
    }

    /// Headers every request and handshake starts from before the caller's own are applied.
    pub fn default_headers(&self) -> &Headers {
        &self.default_headers
    }

    pub fn check_url(&self, url: &str) -> bool {
        netbridge::validate::check_url(url)
    }

    /// `requestAsync(url, body?, headers?, options?)`. Argument errors are returned here and no
    /// id is consumed; everything after dispatch is reported through the event queue.
    pub fn request_async(
        &self,
        url: &str,
        body: &ScriptValue,
        headers: &ScriptValue,
        options: &ScriptValue,
    ) -> Result<OperationId> {
        let descriptor = RequestDescriptor::from_script(url, body, headers, options, &self.default_headers)?;
        self.request(descriptor)
    }

    /// Dispatches an already marshalled request. The target is checked again, since descriptors
    /// can be built by hand.
    pub fn request(&self, descriptor: RequestDescriptor) -> Result<OperationId> {
        check_target(descriptor.url.as_str())?;

        let id = self.ids.next();
        log::info!("Dispatching request {} to {}", id, descriptor.url);

        let worker = net::HttpWorker {
            id,
            descriptor,
            client: self.http.clone(),
            events: self.events.clone(),
        };
        self.runtime.spawn(worker.run());

        Ok(id)
    }

    /// `websocketAsync(url, headers?)`.
    pub fn websocket_async(&self, url: &str, headers: &ScriptValue) -> Result<OperationId> {
        let descriptor = ConnectDescriptor::from_script(url, headers, &self.default_headers)?;
        self.connect(descriptor)
    }

    pub fn connect(&self, descriptor: ConnectDescriptor) -> Result<OperationId> {
        check_target(descriptor.url.as_str())?;

        let id = self.ids.next();
        log::info!("Dispatching websocket {} to {}", id, descriptor.url);

        let worker = net::WebSocketWorker {
            id,
            descriptor,
            tls: self.tls.clone(),
            events: self.events.clone(),
        };
        self.runtime.spawn(worker.run());

        Ok(id)
    }
}

fn check_target(url: &str) -> Result<()> {
    if netbridge::validate::check_url(url) {
        Ok(())
    } else {
        Err(ArgumentError::new(1, INVALID_URL).into())
    }
}
