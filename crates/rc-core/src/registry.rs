//! # Registry
//!
//! Maps a configuration key to a comment record type and its bound policy.
//!
//! Registrations are collected in a [`RegistryBuilder`] at startup and then
//! frozen into a [`Registry`], which is read-only for the rest of the
//! process. A frozen registry can be installed once as the process-wide
//! instance with [`install`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::configuration::CommentConfiguration;
use crate::error::{CommentError, Result};
use crate::models::RecordType;

static GLOBAL: OnceCell<Registry> = OnceCell::new();

#[derive(Clone)]
pub struct Registration {
    pub key: String,
    pub record_type: RecordType,
    pub configuration: Arc<dyn CommentConfiguration>,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("key", &self.key)
            .field("record_type", &self.record_type)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: BTreeMap<String, Registration>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        key: impl Into<String>,
        record_type: RecordType,
        configuration: Arc<dyn CommentConfiguration>,
    ) -> Result<&mut Self> {
        let key = key.into();
        if self.entries.contains_key(&key) {
            return Err(CommentError::AlreadyRegistered(key));
        }
        tracing::debug!(%key, model = %record_type.model_name, "comment configuration registered");
        self.entries.insert(
            key.clone(),
            Registration {
                key,
                record_type,
                configuration,
            },
        );
        Ok(self)
    }

    pub fn unregister(&mut self, key: &str) -> Result<Registration> {
        self.entries
            .remove(key)
            .ok_or_else(|| CommentError::NotRegistered(key.to_string()))
    }

    pub fn build(self) -> Registry {
        Registry {
            entries: self.entries,
        }
    }
}

/// Frozen set of registrations.
#[derive(Debug, Default)]
pub struct Registry {
    entries: BTreeMap<String, Registration>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn resolve(&self, key: &str) -> Result<&Registration> {
        self.entries
            .get(key)
            .ok_or_else(|| CommentError::NotRegistered(key.to_string()))
    }

    /// All registrations in key order.
    pub fn all(&self) -> impl Iterator<Item = &Registration> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Waits for every configuration's outstanding notifications. Call before
    /// the runtime shuts down.
    pub async fn drain_notifications(&self) {
        for registration in self.entries.values() {
            registration.configuration.drain_notifications().await;
        }
    }
}

/// Installs `registry` as the process-wide instance. Only the first call wins.
pub fn install(registry: Registry) -> Result<&'static Registry> {
    GLOBAL
        .set(registry)
        .map_err(|_| CommentError::Misconfigured("comment registry already installed".into()))?;
    GLOBAL
        .get()
        .ok_or_else(|| CommentError::Misconfigured("comment registry not installed".into()))
}

pub fn global() -> Option<&'static Registry> {
    GLOBAL.get()
}
