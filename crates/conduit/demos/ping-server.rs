//! Minimal responder: answers `ping` on a TCP port until Ctrl-C.
//!
//! Run with:
//!   cargo run --example ping-server
//!
//! In another terminal:
//!   cargo run --example ping-client

use conduit::rpc::{Request, Responder};
use conduit::transport::{ListenerConfig, StreamListener};

const ORIGIN: &str = "tcp://127.0.0.1:7300";
const KEY: &str = "demo-key";

fn handle(request: &Request) -> Result<serde_json::Value, String> {
    match request.route.as_str() {
        "ping" => Ok(serde_json::json!({ "pong": true })),
        other => Err(format!("unknown route '{other}'")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener =
        StreamListener::bind(ORIGIN, ListenerConfig::default().with_access_key(KEY)).await?;
    eprintln!("Listening on {}", listener.local_origin());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            accepted = listener.accept() => match accepted {
                Ok(connection) => {
                    eprintln!("Client connected: session {}", connection.session_id());
                    tokio::spawn(async move {
                        let _serving = Responder::serve(&connection, handle);
                        connection.closed().await;
                        eprintln!("Client gone: session {}", connection.session_id());
                    });
                }
                Err(err) => eprintln!("Rejected client: {err}"),
            },
        }
    }

    Ok(())
}
