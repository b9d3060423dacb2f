use conduit_rpc::{Client, ClientConfig};
use conduit_transport::{connect_async, ConnectConfig, StreamDialer};
use tracing::debug;

use crate::cmd::input::{parse_duration, parse_options, resolve_payload};
use crate::cmd::RequestArgs;
use crate::exit::{rpc_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_response, OutputFormat};

pub async fn run(args: RequestArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let options = parse_options(&args.options)?;
    let payload = resolve_payload(&args.payload)?;

    let config = ConnectConfig::new(&args.origin, args.key).with_connect_timeout(timeout);
    let connection = connect_async(StreamDialer::new(), config)
        .await
        .map_err(|err| transport_error("connect failed", &err))?;
    debug!(session_id = connection.session_id(), "connected");

    let client = Client::with_config(
        connection.clone(),
        ClientConfig {
            request_timeout: Some(timeout),
        },
    );
    let result = client.request(&args.command, &options, &payload).await;
    connection.close();

    let value = result.map_err(|err| rpc_error("request failed", err))?;
    print_response(&args.command, &value, format);
    Ok(SUCCESS)
}
