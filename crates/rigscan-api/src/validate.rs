//! Success/failure classification of decoded responses.
//!
//! Responses come in three shapes:
//! - multi-command: no top-level `STATUS`, one key per operation, each
//!   holding a one-element list with its own status block
//! - flat: `STATUS` is a bare code string next to a `Msg` (BTMiner)
//! - standard: `STATUS` is a list whose first element carries the code

use serde_json::{Map, Value};

const SUCCESS_CODES: [&str; 2] = ["S", "I"];

/// Outcome of [`validate`]. `message` is the device's own text on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub ok: bool,
    pub message: Option<String>,
}

impl Validation {
    fn success() -> Self {
        Self {
            ok: true,
            message: None,
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: Some(message.into()),
        }
    }
}

pub fn validate(data: &Value) -> Validation {
    let obj = match data.as_object() {
        Some(obj) if !obj.is_empty() => obj,
        _ => return Validation::failure("No API data."),
    };

    match obj.get("STATUS") {
        None => validate_multi(obj),
        Some(Value::String(code)) => {
            if is_success(code) || code == "RESTART" {
                Validation::success()
            } else {
                Validation::failure(message_text(obj.get("Msg")))
            }
        }
        Some(status) => match status_block_code(status) {
            Some((code, _)) if is_success(code) => Validation::success(),
            Some((_, msg)) => Validation::failure(msg),
            None => Validation::success(),
        },
    }
}

fn validate_multi(obj: &Map<String, Value>) -> Validation {
    for (key, entry) in obj {
        if key == "id" {
            continue;
        }
        let Some(status) = entry.get(0).and_then(|first| first.get("STATUS")) else {
            continue;
        };
        if let Some((code, msg)) = status_block_code(status) {
            if !is_success(code) {
                return Validation::failure(format!("{key}: {msg}"));
            }
        }
    }
    Validation::success()
}

/// Code and message from the first element of a `STATUS` list.
fn status_block_code(status: &Value) -> Option<(&str, String)> {
    let first = status.get(0)?;
    let code = first.get("STATUS")?.as_str()?;
    Some((code, message_text(first.get("Msg"))))
}

fn is_success(code: &str) -> bool {
    SUCCESS_CODES.contains(&code)
}

fn message_text(msg: Option<&Value>) -> String {
    match msg {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
