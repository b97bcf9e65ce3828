#![allow(dead_code)]

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tungstenite::handshake::server::{ErrorResponse, Request as HandshakeRequest, Response as HandshakeResponse};
use tungstenite::protocol::frame::coding::{CloseCode, Data, OpCode};
use tungstenite::protocol::frame::{CloseFrame, Frame};
use tungstenite::Message;

use netbridge_client::{Dispatcher, Event, EventQueue, HttpConfig};

pub fn dispatcher() -> (Dispatcher, EventQueue) {
    Dispatcher::new(&HttpConfig::default(), Handle::current()).unwrap()
}

pub async fn next_event(queue: &mut EventQueue) -> Event {
    tokio::time::timeout(Duration::from_secs(10), queue.next())
        .await
        .expect("timed out waiting for an event")
        .expect("event queue closed")
}

/// A URL on a local port nothing is listening on.
pub fn refused_url(scheme: &str) -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("{}://127.0.0.1:{}/", scheme, port)
}

async fn http_route(request: Request<Body>) -> Result<Response<Body>, Infallible> {
    let response = match request.uri().path() {
        "/data" => Response::new(Body::from("hello\nworld\n")),
        "/binary" => Response::new(Body::from(vec![0u8, 159, 146, 150, 255])),
        "/multi" => Response::builder()
            .header("x-value", "one")
            .header("x-value", "two")
            .body(Body::from("multi"))
            .unwrap(),
        "/echo" => {
            let method = request.method().to_string();
            let headers: BTreeMap<String, String> = request
                .headers()
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_str().unwrap_or_default().to_owned()))
                .collect();
            let body = hyper::body::to_bytes(request.into_body()).await.unwrap();

            let echo = serde_json::json!({
                "method": method,
                "headers": headers,
                "body": String::from_utf8_lossy(&body),
            });
            Response::new(Body::from(echo.to_string()))
        }
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::empty())
            .unwrap(),
    };

    Ok(response)
}

/// Serves `/data`, `/binary`, `/multi` and `/echo` on a local port. Everything else is a 404.
pub fn http_server() -> SocketAddr {
    let make_service = make_service_fn(|_| async { Ok::<_, Infallible>(service_fn(http_route)) });
    let server = Server::bind(&([127, 0, 0, 1], 0).into()).serve(make_service);
    let addr = server.local_addr();

    tokio::spawn(async move {
        if let Err(err) = server.await {
            eprintln!("test http server failed: {}", err);
        }
    });

    addr
}

/// Serves WebSocket routes on a local port:
///
/// - `/echo` echoes text messages until closed
/// - `/fragments` sends "hello world" in three fragments, then "done", then closes
/// - `/headers` sends the user-agent and x-token it was opened with, then echoes
/// - `/close` closes right after the handshake
/// - `/drop` drops the connection without a close handshake
pub async fn websocket_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(websocket_session(stream));
        }
    });

    addr
}

async fn websocket_session(stream: tokio::net::TcpStream) {
    let mut path = String::new();
    let mut user_agent = None;
    let mut token = None;

    let callback = |request: &HandshakeRequest, response: HandshakeResponse| -> Result<HandshakeResponse, ErrorResponse> {
        path = request.uri().path().to_owned();
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned)
        };
        user_agent = header("user-agent");
        token = header("x-token");
        Ok(response)
    };

    let mut socket = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
        Ok(socket) => socket,
        Err(_) => return,
    };

    match path.as_str() {
        "/fragments" => {
            let fragments = [
                Frame::message(b"hello".to_vec(), OpCode::Data(Data::Text), false),
                Frame::message(b" wor".to_vec(), OpCode::Data(Data::Continue), false),
                Frame::message(b"ld".to_vec(), OpCode::Data(Data::Continue), true),
            ];
            for fragment in fragments {
                let _ = socket.send(Message::Frame(fragment)).await;
            }
            let _ = socket.send(Message::Text("done".to_owned())).await;
            let _ = socket.close(None).await;
        }
        "/close" => {
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: "bye".into(),
            };
            let _ = socket.close(Some(frame)).await;
        }
        "/drop" => return,
        "/headers" => {
            let greeting = format!(
                "ua={};token={}",
                user_agent.as_deref().unwrap_or("none"),
                token.as_deref().unwrap_or("none")
            );
            let _ = socket.send(Message::Text(greeting)).await;
        }
        _ => {}
    }

    while let Some(Ok(message)) = socket.next().await {
        if let Message::Text(text) = message {
            if socket.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    }
}
