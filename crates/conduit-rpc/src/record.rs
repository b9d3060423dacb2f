//! The JSON result record carried in response payloads.
//!
//! `{ "token"?: string, "data"?: any, "err"?: any }`

use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, RpcError};

fn is_empty_err(err: &Value) -> bool {
    match err {
        Value::Null | Value::Bool(false) => true,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// A response payload that parsed as JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseRecord(Value);

impl ResponseRecord {
    /// `None` if the payload is not JSON.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        serde_json::from_slice(payload).ok().map(Self)
    }

    /// The record's own `token`, if it is a string.
    pub fn token(&self) -> Option<&str> {
        self.0.get("token").and_then(Value::as_str)
    }

    /// Turn the record into the outcome of the call it answers.
    ///
    /// An `err` rejects unless it is absent or empty: `null`, `false`, `0`
    /// and `""` all count as no error. Otherwise the call resolves with
    /// `data` when present and not `null`, else with the whole record.
    pub fn settle(self) -> Result<Value> {
        match self.0.get("err") {
            Some(err) if !is_empty_err(err) => {
                let message = match err {
                    Value::Object(fields) => match fields.get("message") {
                        Some(Value::String(message)) => message.clone(),
                        _ => err.to_string(),
                    },
                    Value::String(message) => message.clone(),
                    other => other.to_string(),
                };
                return Err(RpcError::Application {
                    message,
                    err: err.clone(),
                });
            }
            _ => {}
        }

        match self.0 {
            Value::Object(mut fields) => match fields.remove("data") {
                Some(data) if !data.is_null() => Ok(data),
                Some(data) => {
                    fields.insert("data".to_string(), data);
                    Ok(Value::Object(fields))
                }
                None => Ok(Value::Object(fields)),
            },
            other => Ok(other),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
}

#[derive(Serialize)]
struct ReplyRecord<'a> {
    token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    err: Option<ErrorBody<'a>>,
}

/// Serialize the reply to `token`: `{token, data}` or `{token, err: {message}}`.
pub fn encode_reply(token: &str, result: std::result::Result<&Value, &str>) -> Result<Vec<u8>> {
    let record = match result {
        Ok(data) => ReplyRecord {
            token,
            data: Some(data),
            err: None,
        },
        Err(message) => ReplyRecord {
            token,
            data: None,
            err: Some(ErrorBody { message }),
        },
    };
    Ok(serde_json::to_vec(&record)?)
}
