//! Intent model interface
//!
//! Both the on-device and the cloud resolver sit behind this trait. How they
//! compute intent is their business; the router only needs a label, slots
//! and a confidence.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Raw answer from a model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelOutput {
    /// Intent label, mapped with `IntentKind::from_model_label`
    pub label: String,

    #[serde(default)]
    pub entities: HashMap<String, String>,

    pub confidence: f32,
}

impl ModelOutput {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            entities: HashMap::new(),
            confidence,
        }
    }

    /// Add a slot
    #[must_use]
    pub fn with_entity(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entities.insert(key.into(), value.into());
        self
    }
}

/// An intent resolver
#[async_trait]
pub trait IntentModel: Send + Sync {
    /// Name for logs
    fn name(&self) -> &str;

    /// Whether the model is loaded and reachable
    fn is_ready(&self) -> bool;

    /// Resolve text into a labelled intent
    async fn analyze(&self, text: &str) -> Result<ModelOutput>;
}

/// Placeholder for a resolver that is not installed
#[derive(Debug, Clone)]
pub struct UnavailableModel {
    name: String,
}

impl UnavailableModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl IntentModel for UnavailableModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_ready(&self) -> bool {
        false
    }

    async fn analyze(&self, _text: &str) -> Result<ModelOutput> {
        Err(Error::ModelUnavailable(self.name.clone()))
    }
}
