//! Binary message framing and token-correlated RPC.
//!
//! conduit carries small key/value-headed binary messages over a
//! bidirectional, message-oriented connection, and turns that connection
//! into an asynchronous request/response channel.
//!
//! # Crate Structure
//!
//! - [`frame`]: the frame codec and the stream envelope
//! - [`transport`]: connections, dialers and listeners
//! - [`rpc`]: the request/response correlator and responder (behind `rpc` feature)

/// Re-export frame types.
pub mod frame {
    pub use conduit_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use conduit_transport::*;
}

/// Re-export correlator types (requires `rpc` feature).
#[cfg(feature = "rpc")]
pub mod rpc {
    pub use conduit_rpc::*;
}
