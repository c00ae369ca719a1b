//! Data FlowSets waiting for their template.
//!
//! Exporters send templates periodically and independently of data, so a Data
//! FlowSet may arrive before the template describing it. Such FlowSets are
//! copied out of their packet together with the packet header, and replayed as
//! if freshly received once a matching template or options template is
//! learned. Replays follow the order in which FlowSets were held.

use std::{
    collections::VecDeque,
    net::IpAddr,
    sync::atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::{RecordSink, sans::header::V9Header};

use super::{
    cache::{FlowsetTemplateCache, OptionsTemplateCache, TemplateKey},
    v9::{ExportContext, decode_records, lookup},
};

/// An undecoded Data FlowSet body and the header of the packet carrying it.
#[derive(Debug, Clone)]
pub struct PendingFlowSet {
    pub header: V9Header,
    pub bytes: Vec<u8>,
}

/// A concurrent store of Data FlowSets whose template is not yet known.
#[derive(Debug, Default)]
pub struct MissingTemplateCache {
    entries: DashMap<TemplateKey, VecDeque<(u64, PendingFlowSet)>>,
    sequence: AtomicU64,
    max_pending: Option<usize>,
}

impl MissingTemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(max_pending: Option<usize>) -> Self {
        Self {
            max_pending,
            ..Self::default()
        }
    }

    /// Hold a FlowSet until its template arrives.
    pub fn insert(&self, key: TemplateKey, pending: PendingFlowSet) {
        if self.max_pending == Some(0) {
            debug!(
                source_ip = %key.source_ip,
                source_id = key.source_id,
                template_id = key.template_id,
                "Dropping Data FlowSet with unknown template."
            );
            return;
        }

        let mut queue = self.entries.entry(key).or_default();

        if let Some(max) = self.max_pending {
            while queue.len() >= max {
                queue.pop_front();
                warn!(
                    source_ip = %key.source_ip,
                    source_id = key.source_id,
                    template_id = key.template_id,
                    max,
                    "Too many FlowSets waiting for a template; dropping the oldest."
                );
            }
        }

        // Taken under the entry lock, so each queue stays sorted.
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        queue.push_back((sequence, pending));
    }

    /// Replay every held FlowSet whose template is now known, publishing the
    /// decoded records to a sink.
    ///
    /// FlowSets are replayed in the order they were held, across all keys.
    /// Returns the number of records published. FlowSets whose template is
    /// still missing stay held.
    pub fn check_templates(
        &self,
        templates: &FlowsetTemplateCache,
        options: &OptionsTemplateCache,
        sink: &mut impl RecordSink,
    ) -> usize {
        // Collect first: removing while iterating would deadlock on a shard.
        let keys: Vec<_> = self.entries.iter().map(|e| *e.key()).collect();

        let mut replays = Vec::new();

        for key in keys {
            // The template is taken before the queue, so a concurrent purge
            // cannot strand removed FlowSets.
            let Some(template) = lookup(templates, options, &key) else {
                continue;
            };

            // Another thread may have replayed this key in the meantime.
            let Some((key, queue)) = self.entries.remove(&key) else {
                continue;
            };

            debug!(
                source_ip = %key.source_ip,
                source_id = key.source_id,
                template_id = key.template_id,
                flowsets = queue.len(),
                "Replaying Data FlowSets after learning their template."
            );

            for (sequence, pending) in queue {
                replays.push((sequence, template.clone(), pending));
            }
        }

        replays.sort_unstable_by_key(|(sequence, ..)| *sequence);

        let mut n = 0;

        for (_, template, pending) in replays {
            let context = ExportContext::new(&pending.header);
            n += decode_records(&template, &pending.bytes, &context, sink);
        }

        n
    }

    /// Number of held FlowSets.
    pub fn len(&self) -> usize {
        self.entries.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys with at least one held FlowSet.
    pub fn pending_keys(&self) -> Vec<TemplateKey> {
        self.entries.iter().map(|e| *e.key()).collect()
    }

    /// Discard every FlowSet held for an exporter address.
    ///
    /// Returns the number of FlowSets removed.
    pub fn purge_exporter(&self, source_ip: IpAddr) -> usize {
        let mut removed = 0;

        self.entries.retain(|k, v| {
            if k.source_ip == source_ip {
                removed += v.len();
                false
            } else {
                true
            }
        });

        removed
    }
}
