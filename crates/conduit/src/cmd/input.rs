use std::fs;
use std::time::Duration;

use conduit_frame::Options;

use crate::cmd::PayloadArgs;
use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, USAGE};

pub fn resolve_payload(args: &PayloadArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), &err));
    }
    Ok(Vec::new())
}

/// Parse repeated `key=value` arguments. The value may itself contain `=`.
///
/// Options are pushed in order, so repeating a key produces a frame with
/// duplicate keys.
pub fn parse_options(pairs: &[String]) -> CliResult<Options> {
    let mut options = Options::with_capacity(pairs.len());
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| CliError::new(USAGE, format!("option must be key=value: {pair}")))?;
        if key.is_empty() {
            return Err(CliError::new(USAGE, format!("option key is empty: {pair}")));
        }
        options.push(key, value);
    }
    Ok(options)
}

/// Join hex arguments, ignoring whitespace, and decode them.
pub fn parse_hex(parts: &[String]) -> CliResult<Vec<u8>> {
    let digits: String = parts
        .iter()
        .flat_map(|part| part.chars())
        .filter(|c| !c.is_whitespace())
        .collect();
    hex::decode(&digits).map_err(|err| CliError::new(DATA_INVALID, format!("invalid hex: {err}")))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(number) => (number, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_garbage() {
        for input in ["", "0s", "fast", "1m", "-1s"] {
            assert_eq!(parse_duration(input).unwrap_err().code, USAGE, "{input}");
        }
    }

    #[test]
    fn options_keep_order_and_duplicates() {
        let options = parse_options(&[
            "lang=en".to_string(),
            "expr=a=b".to_string(),
            "lang=fr".to_string(),
        ])
        .unwrap();
        let pairs: Vec<(&str, &str)> = options.iter().collect();
        assert_eq!(pairs, vec![("lang", "en"), ("expr", "a=b"), ("lang", "fr")]);
        assert_eq!(options.get("lang"), Some("fr"));
    }

    #[test]
    fn options_need_a_key_and_equals() {
        assert!(parse_options(&["novalue".to_string()]).is_err());
        assert!(parse_options(&["=v".to_string()]).is_err());
        assert!(parse_options(&["k=".to_string()]).is_ok());
    }

    #[test]
    fn hex_ignores_spacing() {
        let bytes = parse_hex(&["01 05".to_string(), "726F".to_string()]).unwrap();
        assert_eq!(bytes, vec![0x01, 0x05, 0x72, 0x6F]);
        assert_eq!(parse_hex(&["0".to_string()]).unwrap_err().code, DATA_INVALID);
        assert_eq!(parse_hex(&["zz".to_string()]).unwrap_err().code, DATA_INVALID);
    }

    #[test]
    fn payload_sources() {
        assert!(resolve_payload(&PayloadArgs::default()).unwrap().is_empty());

        let data = PayloadArgs {
            data: Some("hi".into()),
            ..PayloadArgs::default()
        };
        assert_eq!(resolve_payload(&data).unwrap(), b"hi");

        let bad_json = PayloadArgs {
            json: Some("{".into()),
            ..PayloadArgs::default()
        };
        assert_eq!(resolve_payload(&bad_json).unwrap_err().code, USAGE);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        let file = PayloadArgs {
            file: Some(path),
            ..PayloadArgs::default()
        };
        assert_eq!(resolve_payload(&file).unwrap(), vec![1, 2, 3]);
    }
}
