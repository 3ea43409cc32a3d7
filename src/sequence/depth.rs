use std::collections::HashMap;

use indexmap::IndexMap;

use super::types::{DocumentNode, NodeId};

/// Occurrence bars already open on `participant` above `node`: the strict ancestors of `node`
/// that are sync messages or creations owned by `participant`.
///
/// Bars on other lifelines do not count. In `A.m { B.m { C.m } }` the innermost call sits at
/// depth 0 on `C` and depth 1 on `B`; the 2 enclosing activations are [`nesting_depth`].
pub fn depth(document: &DocumentNode, node: NodeId, participant: &str) -> usize {
    document
        .ancestors(node)
        .filter(|&id| document.activation(id) == Some(participant))
        .count()
}

/// Strict sync/creation ancestors of `node`, whoever owns them.
pub fn nesting_depth(document: &DocumentNode, node: NodeId) -> usize {
    document
        .ancestors(node)
        .filter(|&id| document.activation(id).is_some())
        .count()
}

/// Memoizing wrapper around [`depth`].
///
/// The cache belongs to one document and is dropped wholesale as soon as a document with
/// another version is queried, or when [`DepthCalculator::reset`] is called for a rebuilt tree.
#[derive(Debug, Default)]
pub struct DepthCalculator {
    version: Option<u64>,
    cache: HashMap<(NodeId, String), usize>,
}

impl DepthCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    fn sync(&mut self, document: &DocumentNode) {
        if self.version != Some(document.version) {
            if !self.cache.is_empty() {
                tracing::debug!(
                    from = ?self.version,
                    to = document.version,
                    entries = self.cache.len(),
                    "clearing depth cache"
                );
            }
            self.cache.clear();
            self.version = Some(document.version);
        }
    }

    /// Forgets every cached depth. Node ids are only meaningful within one tree.
    pub fn reset(&mut self) {
        self.cache.clear();
        self.version = None;
    }

    pub fn depth(&mut self, document: &DocumentNode, node: NodeId, participant: &str) -> usize {
        self.sync(document);
        if let Some(&cached) = self.cache.get(&(node, participant.to_string())) {
            return cached;
        }
        let value = depth(document, node, participant);
        self.cache.insert((node, participant.to_string()), value);
        value
    }

    /// Tallest activation stack on a single lifeline opened within the subtree of `node`,
    /// counting bars opened by ancestors on the same lifeline. Zero when nothing activates.
    pub fn max_depth(&mut self, document: &DocumentNode, node: NodeId) -> usize {
        (0..document.nodes.len())
            .filter(|&id| id == node || document.ancestors(id).any(|a| a == node))
            .filter_map(|id| {
                let owner = document.activation(id)?.to_string();
                Some(self.depth(document, id, &owner) + 1)
            })
            .max()
            .unwrap_or(0)
    }

    /// Tallest activation stack per lifeline across the document.
    pub fn max_layers_by_participant(&mut self, document: &DocumentNode) -> IndexMap<String, usize> {
        let mut layers: IndexMap<String, usize> = IndexMap::new();
        for id in 0..document.nodes.len() {
            let Some(owner) = document.activation(id).map(str::to_string) else {
                continue;
            };
            let stack = self.depth(document, id, &owner) + 1;
            let entry = layers.entry(owner).or_insert(0);
            *entry = (*entry).max(stack);
        }
        layers
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}
