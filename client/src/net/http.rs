use std::collections::BTreeMap;

use hyper::client::HttpConnector;
use hyper::ext::ReasonPhrase;
use hyper::{Body, Request, Response};
use hyper_tls::HttpsConnector;

use netbridge::prelude::*;

use crate::error::TransportError;
use crate::event::{Event, EventSink};
use crate::handle::BodyHandle;

pub(crate) type Connector = HttpsConnector<HttpConnector>;
pub(crate) type HttpClient = hyper::Client<Connector>;

pub(crate) fn build_client(tls: native_tls::TlsConnector) -> HttpClient {
    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let https = HttpsConnector::from((http, tokio_native_tls::TlsConnector::from(tls)));
    hyper::Client::builder().build(https)
}

/// Performs one request and reports it with exactly one terminal event.
pub(crate) struct HttpWorker {
    pub id: OperationId,
    pub descriptor: RequestDescriptor,
    pub client: HttpClient,
    pub events: EventSink,
}

impl HttpWorker {
    pub async fn run(self) {
        let id = self.id;
        log::debug!("Request {}: {} {}", id, self.descriptor.method, self.descriptor.url);

        let event = match self.perform().await {
            Ok((response, body)) => {
                log::debug!("Request {} completed with status {}", id, response.status_code);
                Event::HttpResponse { id, response, body }
            }
            Err(err) => {
                log::warn!("Request {} failed: {}", id, err);
                Event::HttpFailure {
                    id,
                    message: err.to_string(),
                }
            }
        };

        self.events.push(event);
    }

    async fn perform(&self) -> Result<(ResponseEnvelope, BodyHandle), TransportError> {
        let request = build_request(&self.descriptor)?;
        let response = self.client.request(request).await?;

        let envelope = envelope(&response);
        let bytes = hyper::body::to_bytes(response.into_body()).await?;

        Ok((envelope, BodyHandle::new(bytes, self.descriptor.binary)))
    }
}

fn build_request(descriptor: &RequestDescriptor) -> Result<Request<Body>, TransportError> {
    let url = &descriptor.url;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(TransportError::UnsupportedScheme(url.scheme().to_owned()));
    }

    let mut builder = Request::builder()
        .method(descriptor.method.as_str())
        .uri(url.as_str());

    for (name, value) in &descriptor.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let body = match &descriptor.body {
        None => Body::empty(),
        Some(RequestBody::Text(text)) => Body::from(text.clone()),
        Some(RequestBody::Bytes(bytes)) => Body::from(bytes.clone()),
    };

    Ok(builder.body(body)?)
}

fn envelope(response: &Response<Body>) -> ResponseEnvelope {
    let status = response.status();

    let reason = response
        .extensions()
        .get::<ReasonPhrase>()
        .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned())
        .or_else(|| status.canonical_reason().map(str::to_owned))
        .unwrap_or_default();

    let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in response.headers() {
        headers
            .entry(name.as_str().to_owned())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }

    ResponseEnvelope::new(status.as_u16(), reason, headers)
}
