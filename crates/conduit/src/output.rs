use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use conduit_frame::Message;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

#[derive(Serialize)]
struct Listening<'a> {
    listening: &'a str,
}

/// First line `serve` prints, so callers can learn a port picked by the OS.
pub fn print_listening(origin: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&Listening { listening: origin }),
        _ => println!("listening on {origin}"),
    }
    let _ = std::io::stdout().flush();
}

#[derive(Serialize)]
struct ResponseOutput<'a> {
    route: &'a str,
    result: &'a Value,
}

pub fn print_response(route: &str, result: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ResponseOutput { route, result }),
        OutputFormat::Table => {
            let mut table = table(vec!["ROUTE", "RESULT"]);
            table.add_row(vec![route.to_string(), result.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{}",
                serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string())
            );
        }
        OutputFormat::Raw => match result {
            Value::String(text) => print_raw(text.as_bytes()),
            other => print_raw(other.to_string().as_bytes()),
        },
    }
}

#[derive(Serialize)]
struct EncodedOutput {
    size: usize,
    frame: String,
}

pub fn print_encoded(frame: &[u8], format: OutputFormat) {
    let hex = hex::encode(frame);
    match format {
        OutputFormat::Json => print_json(&EncodedOutput {
            size: frame.len(),
            frame: hex,
        }),
        OutputFormat::Table => {
            let mut table = table(vec!["SIZE", "FRAME"]);
            table.add_row(vec![frame.len().to_string(), hex]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", spaced_hex(frame)),
        OutputFormat::Raw => print_raw(frame),
    }
}

#[derive(Serialize)]
struct DecodedOutput<'a> {
    options: Vec<(&'a str, &'a str)>,
    payload_size: usize,
    payload: String,
}

pub fn print_decoded(message: &Message, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&DecodedOutput {
            options: message.options.iter().collect(),
            payload_size: message.payload.len(),
            payload: payload_preview(&message.payload),
        }),
        OutputFormat::Table => {
            let mut table = table(vec!["KEY", "VALUE"]);
            for (key, value) in &message.options {
                table.add_row(vec![key, value]);
            }
            println!("{table}");
            println!("payload ({} bytes): {}", message.payload.len(), payload_preview(&message.payload));
        }
        OutputFormat::Pretty => {
            for (key, value) in &message.options {
                println!("{key}={value}");
            }
            println!("payload ({} bytes): {}", message.payload.len(), payload_preview(&message.payload));
        }
        OutputFormat::Raw => print_raw(&message.payload),
    }
}

fn spaced_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{byte:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes: {}>", payload.len(), hex::encode(payload)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spaced_hex_matches_wire_notation() {
        assert_eq!(spaced_hex(&[0x01, 0x05, 0x72]), "01 05 72");
        assert_eq!(spaced_hex(&[]), "");
    }

    #[test]
    fn binary_payload_preview_shows_hex() {
        assert_eq!(payload_preview(b"hi"), "hi");
        assert_eq!(payload_preview(&[0xff, 0x00]), "<binary 2 bytes: ff00>");
    }
}
