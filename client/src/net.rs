mod http;
mod websocket;

pub(crate) use self::http::{build_client, HttpClient, HttpWorker};
pub(crate) use self::websocket::WebSocketWorker;

use crate::Result;

pub(crate) fn tls_connector(accept_invalid_certs: bool) -> Result<native_tls::TlsConnector> {
    let tls = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()?;

    if accept_invalid_certs {
        log::warn!("Certificate validation is disabled");
    }

    Ok(tls)
}
