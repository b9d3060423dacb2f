//! Sends a handful of concurrent `ping` requests to the ping-server demo.
//!
//! Run with:
//!   cargo run --example ping-client

use std::sync::Arc;

use conduit::frame::Options;
use conduit::rpc::Client;
use conduit::transport::{connect_async, ConnectConfig, StreamDialer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let connection = connect_async(
        StreamDialer::new(),
        ConnectConfig::new("tcp://127.0.0.1:7300", "demo-key"),
    )
    .await?;
    eprintln!("Connected: {}", connection.url());

    let client = Arc::new(Client::new(connection.clone()));
    let calls: Vec<_> = (0..4)
        .map(|n| {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                let options = Options::new().with("n", n.to_string());
                (n, client.request("ping", &options, &[]).await)
            })
        })
        .collect();

    for call in calls {
        let (n, result) = call.await?;
        match result {
            Ok(value) => println!("#{n}: {value}"),
            Err(err) => println!("#{n}: error: {err}"),
        }
    }

    connection.close();
    Ok(())
}
