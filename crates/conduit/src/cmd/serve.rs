use std::time::{SystemTime, UNIX_EPOCH};

use conduit_rpc::{Request, Responder, ROUTE_OPTION, TOKEN_OPTION};
use conduit_transport::{ListenerConfig, StreamListener, TransportError};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::cmd::input::parse_duration;
use crate::cmd::ServeArgs;
use crate::exit::{transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_listening, OutputFormat};

pub async fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = ListenerConfig {
        access_key: args.key,
        hello_timeout: parse_duration(&args.hello_timeout)?,
        ..ListenerConfig::default()
    };
    let listener = StreamListener::bind(&args.origin, config)
        .await
        .map_err(|err| transport_error("bind failed", &err))?;
    print_listening(listener.local_origin(), format);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                signal.map_err(|err| {
                    CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
                })?;
                info!("shutting down");
                return Ok(SUCCESS);
            }
            accepted = listener.accept() => match accepted {
                Ok(connection) => {
                    tokio::spawn(async move {
                        let session_id = connection.session_id();
                        let _serving = Responder::serve(&connection, handle);
                        connection.closed().await;
                        info!(session_id, "client disconnected");
                    });
                }
                Err(err @ (TransportError::Handshake(_) | TransportError::Timeout(_))) => {
                    warn!(error = %err, "client rejected");
                }
                Err(err) => return Err(transport_error("accept failed", &err)),
            },
        }
    }
}

/// Built-in routes.
fn handle(request: &Request) -> Result<Value, String> {
    match request.route.as_str() {
        "ping" => Ok(json!({ "pong": true })),
        "echo" => {
            let options: Map<String, Value> = request
                .options
                .iter()
                .filter(|(key, _)| *key != ROUTE_OPTION && *key != TOKEN_OPTION)
                .map(|(key, value)| (key.to_string(), Value::from(value)))
                .collect();
            Ok(json!({
                "options": options,
                "payload": String::from_utf8_lossy(&request.payload),
            }))
        }
        "time" => SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| json!({ "unix": elapsed.as_secs() }))
            .map_err(|err| err.to_string()),
        other => Err(format!("unknown route '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use conduit_frame::{Message, Options};

    use super::*;

    fn request(route: &str, extra: Options, payload: &'static [u8]) -> Request {
        let mut options = Options::new().with(ROUTE_OPTION, route).with(TOKEN_OPTION, "t");
        options.extend(extra.iter());
        Request::from_message(&Message::new(options, payload)).unwrap()
    }

    #[test]
    fn ping_pongs() {
        assert_eq!(
            handle(&request("ping", Options::new(), b"")).unwrap(),
            json!({"pong": true})
        );
    }

    #[test]
    fn echo_returns_options_and_payload() {
        let value = handle(&request("echo", Options::new().with("lang", "en"), b"hi")).unwrap();
        assert_eq!(value, json!({"options": {"lang": "en"}, "payload": "hi"}));
    }

    #[test]
    fn time_is_unix_seconds() {
        let value = handle(&request("time", Options::new(), b"")).unwrap();
        assert!(value["unix"].as_u64().unwrap() > 1_600_000_000);
    }

    #[test]
    fn unknown_route_is_an_error() {
        assert_eq!(
            handle(&request("nope", Options::new(), b"")).unwrap_err(),
            "unknown route 'nope'"
        );
    }
}
