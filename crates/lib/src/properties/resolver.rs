//! Context resolution: which property does an inbound sender belong to.
//!
//! The orchestrator only sees [`ContextResolver`]. Two strategies exist: the first-record
//! stand-in used until the store carries guest contacts, and an exact keyed lookup on a
//! normalized contact column.

use crate::config::{MatchingStrategy, Settings};
use crate::error::RelayError;
use crate::properties::{Property, PropertySource};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Picks the property for a sender. Reads the store once per call; nothing is cached.
#[async_trait]
pub trait ContextResolver: Send + Sync {
    async fn resolve(&self, sender: &str) -> Result<Property, RelayError>;
}

/// Returns the first record in store order regardless of sender. Sender matching is not
/// implemented by this strategy; an empty store is NotFound.
pub struct NotImplementedMatcher {
    source: Arc<dyn PropertySource>,
}

impl NotImplementedMatcher {
    pub fn new(source: Arc<dyn PropertySource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl ContextResolver for NotImplementedMatcher {
    async fn resolve(&self, sender: &str) -> Result<Property, RelayError> {
        let properties = self.source.list_properties().await?;
        log::debug!(
            "resolver: {} propert(ies) in store, using first for sender {}",
            properties.len(),
            sender
        );
        properties.into_iter().next().ok_or(RelayError::NotFound)
    }
}

/// Exact lookup of `normalize_sender(sender)` against each property's normalized contact.
/// Properties without a contact are never matched. When two properties share a key, the
/// earlier one in store order wins.
pub struct SenderKeyMatcher {
    source: Arc<dyn PropertySource>,
}

impl SenderKeyMatcher {
    pub fn new(source: Arc<dyn PropertySource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl ContextResolver for SenderKeyMatcher {
    async fn resolve(&self, sender: &str) -> Result<Property, RelayError> {
        let key = normalize_sender(sender);
        if key.is_empty() {
            return Err(RelayError::NotFound);
        }
        let mut index: HashMap<String, Property> = HashMap::new();
        for p in self.source.list_properties().await? {
            let Some(contact) = p.contact.as_deref().map(normalize_sender) else {
                continue;
            };
            if !contact.is_empty() {
                index.entry(contact).or_insert(p);
            }
        }
        index.remove(&key).ok_or(RelayError::NotFound)
    }
}

/// Normalize a sender identifier: drop a `whatsapp:` prefix, keep a leading `+`, keep digits.
/// `"whatsapp:+1 (555) 123-4567"` => `"+15551234567"`.
pub fn normalize_sender(raw: &str) -> String {
    let s = raw.trim();
    let s = match s.get(..9) {
        Some(prefix) if prefix.eq_ignore_ascii_case("whatsapp:") => s[9..].trim_start(),
        _ => s,
    };
    let mut out = String::with_capacity(s.len());
    if s.starts_with('+') {
        out.push('+');
    }
    out.extend(s.chars().filter(char::is_ascii_digit));
    if out == "+" {
        out.clear();
    }
    out
}

/// Build the resolver selected by `relay.matching`.
pub fn resolver_for(settings: &Settings, source: Arc<dyn PropertySource>) -> Arc<dyn ContextResolver> {
    match settings.relay.matching {
        MatchingStrategy::First => Arc::new(NotImplementedMatcher::new(source)),
        MatchingStrategy::Sender => Arc::new(SenderKeyMatcher::new(source)),
    }
}
