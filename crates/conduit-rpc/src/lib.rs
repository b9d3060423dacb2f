//! Request/response correlation over conduit connections.
//!
//! A [`Client`] sends a request frame carrying a `route` and a fresh `token`
//! option. The peer answers with a frame whose JSON payload embeds the same
//! token; the client settles the matching call when it arrives, whatever
//! order responses come back in. [`Responder`] is the answering side.

pub mod client;
pub mod error;
pub mod record;
pub mod responder;
pub mod token;

pub use client::{Client, ClientConfig, DEFAULT_REQUEST_TIMEOUT};
pub use error::{Result, RpcError};
pub use record::ResponseRecord;
pub use responder::{reply, Request, Responder};

/// Option naming the command a request invokes.
pub const ROUTE_OPTION: &str = "route";
/// Option carrying the correlation token.
pub const TOKEN_OPTION: &str = "token";
