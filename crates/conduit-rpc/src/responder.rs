//! The answering side: turn inbound requests into replies.

use bytes::Bytes;
use conduit_frame::{Message, Options};
use conduit_transport::{Connection, Subscription};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::record::encode_reply;
use crate::{ROUTE_OPTION, TOKEN_OPTION};

/// An inbound request.
#[derive(Debug, Clone)]
pub struct Request {
    pub route: String,
    pub token: String,
    /// Every option on the frame, `route` and `token` included.
    pub options: Options,
    pub payload: Bytes,
}

impl Request {
    /// `None` unless the message carries both `route` and `token`.
    pub fn from_message(message: &Message) -> Option<Self> {
        Some(Self {
            route: message.option(ROUTE_OPTION)?.to_string(),
            token: message.option(TOKEN_OPTION)?.to_string(),
            options: message.options.clone(),
            payload: message.payload.clone(),
        })
    }
}

/// Answer the request identified by `token`.
///
/// The frame's options are `{token}`; its JSON payload is `{token, data}` on
/// success or `{token, err: {message}}` on failure.
pub fn reply(
    connection: &Connection,
    token: &str,
    result: std::result::Result<Value, String>,
) -> Result<()> {
    let payload = match &result {
        Ok(data) => encode_reply(token, Ok(data))?,
        Err(message) => encode_reply(token, Err(message))?,
    };
    connection.send(&Options::new().with(TOKEN_OPTION, token), &payload)?;
    Ok(())
}

/// Serves requests arriving on a connection.
pub struct Responder;

impl Responder {
    /// Hand every inbound request to `handler` and send back its result.
    ///
    /// Frames that are not requests are skipped. Serving stops when the
    /// returned subscription is disposed or dropped.
    pub fn serve<H>(connection: &Connection, mut handler: H) -> Subscription
    where
        H: FnMut(&Request) -> std::result::Result<Value, String> + Send + 'static,
    {
        let weak = connection.downgrade();
        let session_id = connection.session_id();

        connection.receive(move |event| {
            let message = match event {
                Ok(message) => message,
                Err(err) => {
                    debug!(session_id, error = %err, "responder saw transport error");
                    return;
                }
            };
            let Some(request) = Request::from_message(message) else {
                debug!(session_id, "skipping frame that is not a request");
                return;
            };
            let Some(connection) = weak.upgrade() else {
                return;
            };

            debug!(session_id, route = %request.route, token = %request.token, "handling request");
            let result = handler(&request);
            if let Err(err) = reply(&connection, &request.token, result) {
                warn!(session_id, token = %request.token, error = %err, "failed to send reply");
            }
        })
    }
}
