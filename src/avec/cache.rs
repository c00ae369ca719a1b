//! Template caches shared across packets and worker threads.

use std::{net::IpAddr, sync::Arc};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::sans::template::{OptionsTemplate, Template, is_reserved};

/// Identifies a template within one exporter's namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemplateKey {
    pub source_id: u32,
    pub template_id: u16,
    pub source_ip: IpAddr,
}

impl TemplateKey {
    pub fn new(source_id: u32, template_id: u16, source_ip: IpAddr) -> Self {
        Self {
            source_id,
            template_id,
            source_ip,
        }
    }
}

/// Optional bounds on cache growth.
///
/// Without limits, caches grow for as long as new exporters or template
/// identifiers appear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct CacheLimits {
    /// Maximum number of keys held by each template cache. Definitions for new
    /// keys are refused once reached; existing keys may still be redefined.
    pub max_templates: Option<usize>,
    /// Maximum number of FlowSets held per key while waiting for a template.
    /// The oldest is dropped to make room.
    pub max_pending: Option<usize>,
}

/// A concurrent map from exporter-scoped template identifiers to templates.
#[derive(Debug)]
pub struct TemplateCache<T> {
    entries: DashMap<TemplateKey, Arc<T>>,
    max_entries: Option<usize>,
}

/// Cache of templates learned from Template FlowSets.
pub type FlowsetTemplateCache = TemplateCache<Template>;

/// Cache of options templates learned from Options Template FlowSets.
pub type OptionsTemplateCache = TemplateCache<OptionsTemplate>;

impl<T> Default for TemplateCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TemplateCache<T> {
    pub fn new() -> Self {
        Self::with_limit(None)
    }

    pub fn with_limit(max_entries: Option<usize>) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
        }
    }

    /// Store a template, replacing any earlier definition under the same key.
    ///
    /// Returns whether the template was stored. The entry limit is checked
    /// without holding a lock across the insert, so concurrent inserts may
    /// overshoot it slightly.
    pub fn insert(&self, key: TemplateKey, template: T) -> bool {
        if is_reserved(key.template_id) {
            warn!(
                source_ip = %key.source_ip,
                source_id = key.source_id,
                template_id = key.template_id,
                "Refusing to cache a template under a reserved identifier."
            );
            return false;
        }

        if let Some(max) = self.max_entries {
            if self.entries.len() >= max && !self.entries.contains_key(&key) {
                warn!(
                    source_ip = %key.source_ip,
                    source_id = key.source_id,
                    template_id = key.template_id,
                    max,
                    "Template cache is full; dropping definition."
                );
                return false;
            }
        }

        if self.entries.insert(key, Arc::new(template)).is_some() {
            debug!(
                source_ip = %key.source_ip,
                source_id = key.source_id,
                template_id = key.template_id,
                "Redefined template."
            );
        }

        true
    }

    pub fn get(&self, key: &TemplateKey) -> Option<Arc<T>> {
        self.entries.get(key).map(|e| Arc::clone(e.value()))
    }

    pub fn contains(&self, key: &TemplateKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Discard every template learned from an exporter address.
    ///
    /// Returns the number of templates removed.
    pub fn purge_exporter(&self, source_ip: IpAddr) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, _| k.source_ip != source_ip);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use std::net::Ipv4Addr;

    use super::*;

    const EXPORTER: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
    const OTHER: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

    #[test]
    fn last_definition_wins() {
        let cache = TemplateCache::new();
        let key = TemplateKey::new(1, 256, EXPORTER);

        assert!(cache.insert(key, "first"));
        assert!(cache.insert(key, "second"));

        assert_eq!(cache.get(&key).as_deref(), Some(&"second"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn exporters_have_separate_namespaces() {
        let cache = TemplateCache::new();

        cache.insert(TemplateKey::new(1, 256, EXPORTER), 1);
        cache.insert(TemplateKey::new(2, 256, EXPORTER), 2);
        cache.insert(TemplateKey::new(1, 256, OTHER), 3);

        assert_eq!(cache.len(), 3);
        assert_eq!(
            cache.get(&TemplateKey::new(2, 256, EXPORTER)).as_deref(),
            Some(&2)
        );
        assert!(cache.get(&TemplateKey::new(2, 256, OTHER)).is_none());

        assert_eq!(cache.purge_exporter(EXPORTER), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn reserved_identifiers_are_refused() {
        let cache = TemplateCache::new();

        assert!(!cache.insert(TemplateKey::new(1, 0, EXPORTER), ()));
        assert!(!cache.insert(TemplateKey::new(1, 1, EXPORTER), ()));
        assert!(cache.is_empty());
    }

    #[test]
    fn limit_refuses_new_keys_only() {
        let cache = TemplateCache::with_limit(Some(1));
        let key = TemplateKey::new(1, 256, EXPORTER);

        assert!(cache.insert(key, 1));
        assert!(!cache.insert(TemplateKey::new(1, 257, EXPORTER), 2));
        assert!(cache.insert(key, 3));

        assert_eq!(cache.get(&key).as_deref(), Some(&3));
    }
}
