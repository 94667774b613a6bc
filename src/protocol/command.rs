//! Command definitions
//!
//! Represents commands sent to the storage service.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use super::codec::encode_command;
use crate::error::{Result, StowageError};

/// Command verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Put,
    Get,
    Delete,
    Search,
}

impl Verb {
    /// The verb as written on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Put => "PUT",
            Verb::Get => "GET",
            Verb::Delete => "DELETE",
            Verb::Search => "SEARCH",
        }
    }

    /// Parse a verb, ignoring ASCII case
    pub fn parse(word: &str) -> Option<Verb> {
        [Verb::Put, Verb::Get, Verb::Delete, Verb::Search]
            .into_iter()
            .find(|verb| verb.as_str().eq_ignore_ascii_case(word))
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Store an object; `payload` is already base64 text
    Put { key: String, payload: String },

    /// Fetch an object
    Get { key: String },

    /// Remove an object
    Delete { key: String },

    /// List keys whose name or content contains `text`
    Search { text: String },
}

/// Check that a key is non-empty and free of whitespace
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(StowageError::InvalidRequest("key is empty".to_string()));
    }
    if key.chars().any(char::is_whitespace) {
        return Err(StowageError::InvalidRequest(format!(
            "key {:?} contains whitespace",
            key
        )));
    }
    Ok(())
}

impl Command {
    /// Build a PUT, base64-encoding the raw payload
    pub fn put(key: impl Into<String>, payload: &[u8]) -> Result<Self> {
        let key = key.into();
        validate_key(&key)?;
        Ok(Command::Put {
            key,
            payload: BASE64.encode(payload),
        })
    }

    pub fn get(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        validate_key(&key)?;
        Ok(Command::Get { key })
    }

    pub fn delete(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        validate_key(&key)?;
        Ok(Command::Delete { key })
    }

    /// Build a SEARCH; the text may contain spaces but not line breaks
    pub fn search(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(StowageError::InvalidRequest(
                "search text is empty".to_string(),
            ));
        }
        if text.contains(['\n', '\r']) {
            return Err(StowageError::InvalidRequest(
                "search text contains a line break".to_string(),
            ));
        }
        Ok(Command::Search { text })
    }

    pub fn verb(&self) -> Verb {
        match self {
            Command::Put { .. } => Verb::Put,
            Command::Get { .. } => Verb::Get,
            Command::Delete { .. } => Verb::Delete,
            Command::Search { .. } => Verb::Search,
        }
    }

    /// The key argument (the search text for SEARCH)
    pub fn key(&self) -> &str {
        match self {
            Command::Put { key, .. } | Command::Get { key } | Command::Delete { key } => key,
            Command::Search { text } => text,
        }
    }

    /// The base64 payload of a PUT
    pub fn payload(&self) -> Option<&str> {
        match self {
            Command::Put { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// Decode the base64 payload of a PUT back into raw bytes
    pub fn payload_bytes(&self) -> Result<Option<Vec<u8>>> {
        self.payload()
            .map(|payload| {
                BASE64
                    .decode(payload)
                    .map_err(|e| StowageError::Protocol(format!("invalid base64 payload: {}", e)))
            })
            .transpose()
    }

    /// Encode as a newline-terminated command line
    pub fn encode(&self) -> String {
        encode_command(self.verb(), self.key(), self.payload())
    }

    /// Parse a command line as the storage service reads it
    ///
    /// A trailing `\n` or `\r\n` is ignored. Verbs are case-insensitive.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line
            .strip_suffix('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .unwrap_or(line);

        let (verb, args) = line
            .split_once(' ')
            .ok_or_else(|| StowageError::Protocol(format!("missing arguments in {:?}", line)))?;

        let verb = Verb::parse(verb)
            .ok_or_else(|| StowageError::Protocol(format!("unknown verb {:?}", verb)))?;

        match verb {
            Verb::Put => {
                let (key, payload) = args.split_once(' ').ok_or_else(|| {
                    StowageError::Protocol("PUT command: missing payload".to_string())
                })?;
                validate_key(key)?;
                Ok(Command::Put {
                    key: key.to_string(),
                    payload: payload.to_string(),
                })
            }
            Verb::Get => Command::get(args),
            Verb::Delete => Command::delete(args),
            Verb::Search => Command::search(args),
        }
    }
}
