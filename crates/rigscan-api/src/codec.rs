//! Request encoding and response repair for the vendor JSON dialects.
//!
//! Firmware in the field emits JSON that is almost, but not quite, valid:
//! trailing NULs, dangling commas, concatenated objects, bare `inf`. The
//! repairs below are applied unconditionally before parsing.

use serde::Serialize;
use serde_json::Value;

use crate::error::{ApiError, Result};

/// Scalar argument attached to a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Parameter {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl From<&str> for Parameter {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Parameter {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Parameter {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<u32> for Parameter {
    fn from(n: u32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<bool> for Parameter {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// A single wire request: `{"command": ..., "parameter": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandEnvelope {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter: Option<Parameter>,
}

impl CommandEnvelope {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            parameter: None,
        }
    }

    pub fn with_parameter(mut self, parameter: impl Into<Parameter>) -> Self {
        self.parameter = Some(parameter.into());
        self
    }

    /// Several operations sent as one `+`-joined request.
    pub fn batch<S: AsRef<str>>(commands: &[S]) -> Self {
        let joined = commands
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join("+");
        Self::new(joined)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Encode one command with an optional parameter.
pub fn encode(command: &str, parameter: Option<Parameter>) -> Result<Vec<u8>> {
    CommandEnvelope {
        command: command.to_string(),
        parameter,
    }
    .encode()
}

/// Decode a raw response after applying [`repair`].
pub fn decode(raw: &[u8]) -> Result<Value> {
    let text = repair(raw);
    serde_json::from_str(&text).map_err(|source| ApiError::Decode { text, source })
}

/// Apply the textual fixes needed by non-conformant firmware.
pub fn repair(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\0").unwrap_or(raw);
    let text = String::from_utf8_lossy(raw)
        .replace(",}", "}")
        .replace('\n', "")
        .replace("}{", "},{")
        .replace("[,{", "[{");

    let text = replace_non_finite(&text);

    // Avalon firmware sometimes drops the opening brace: `,"id":1}`.
    match text.strip_prefix(',') {
        Some(rest) => format!("{{{rest}"),
        None => text,
    }
}

const NON_FINITE: [&str; 2] = ["inf", "nan"];

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Rewrite bare `inf` / `nan` tokens to `0`, leaving string contents alone.
fn replace_non_finite(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut rest = text;

    'scan: while let Some(c) = rest.chars().next() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        } else if !out.chars().next_back().is_some_and(is_word_char) {
            for token in NON_FINITE {
                if let Some(after) = rest.strip_prefix(token) {
                    if !after.chars().next().is_some_and(is_word_char) {
                        out.push('0');
                        rest = after;
                        continue 'scan;
                    }
                }
            }
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }

    out
}
