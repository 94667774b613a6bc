//! Store Module
//!
//! In-memory object table behind the reference storage server.
//!
//! Payloads are kept exactly as they arrived on the wire (base64 text); the
//! server never decodes them.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::protocol::{Command, Response};

/// Thread-safe key → payload map
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute a command
    ///
    /// Routes commands to the matching operation and maps the outcome to a
    /// status code.
    pub fn execute(&self, command: Command) -> Response {
        match command {
            Command::Put { key, payload } => {
                if self.put(key, payload) {
                    Response::created()
                } else {
                    // Objects are immutable once stored
                    Response::not_found()
                }
            }
            Command::Get { key } => match self.get(&key) {
                Some(payload) => Response::ok(payload),
                None => Response::not_found(),
            },
            Command::Delete { key } => {
                if self.delete(&key) {
                    Response::no_content()
                } else {
                    Response::not_found()
                }
            }
            Command::Search { text } => Response::ok(self.search(&text).join(" ")),
        }
    }

    /// Insert a new object; false if the key is taken
    pub fn put(&self, key: String, payload: String) -> bool {
        let mut objects = self.objects.write();
        if objects.contains_key(&key) {
            return false;
        }
        objects.insert(key, payload);
        true
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.objects.read().get(key).cloned()
    }

    /// Remove an object; false if it did not exist
    pub fn delete(&self, key: &str) -> bool {
        self.objects.write().remove(key).is_some()
    }

    /// Keys whose name or stored payload contains `text`, in key order
    pub fn search(&self, text: &str) -> Vec<String> {
        self.objects
            .read()
            .iter()
            .filter(|(key, payload)| key.contains(text) || payload.contains(text))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}
