use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod input;
pub mod request;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept connections and answer ping, echo and time requests.
    Serve(ServeArgs),
    /// Send one request and print the result.
    Request(RequestArgs),
    /// Encode a frame and print it as hex.
    Encode(EncodeArgs),
    /// Decode a hex frame and print its options and payload.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format).await,
        Command::Request(args) => request::run(args, format).await,
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Where a payload comes from. At most one source may be given.
#[derive(Args, Debug, Default)]
pub struct PayloadArgs {
    /// JSON payload (validated before sending).
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Origin to listen on (tcp://host:port or unix:///path).
    pub origin: String,
    /// Access key clients must present. Any key is accepted when unset.
    #[arg(long, env = "CONDUIT_KEY")]
    pub key: Option<String>,
    /// Time a client has to send its hello (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub hello_timeout: String,
}

#[derive(Args, Debug)]
pub struct RequestArgs {
    /// Origin to connect to (tcp://host:port or unix:///path).
    pub origin: String,
    /// Command to invoke (sent as the `route` option).
    pub command: String,
    /// Extra request option as key=value. Repeatable.
    #[arg(long = "option", short = 'o', value_name = "KEY=VALUE")]
    pub options: Vec<String>,
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Access key to present.
    #[arg(long, env = "CONDUIT_KEY", default_value = "")]
    pub key: String,
    /// Time allowed to connect and again to get the response (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Frame option as key=value. Repeatable; order is kept.
    #[arg(long = "option", short = 'o', value_name = "KEY=VALUE")]
    pub options: Vec<String>,
    #[command(flatten)]
    pub payload: PayloadArgs,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Frame bytes as hex. Spaces are ignored.
    #[arg(num_args = 1.., required = true)]
    pub hex: Vec<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
