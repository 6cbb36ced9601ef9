// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Last-known metadata for every handle the bridge holds.
//!
//! The index never invents state: it is refreshed from values the bridge
//! created itself or received back from the gateway.

use std::collections::HashMap;

use loom_bridge_proto::{Instance, Properties, WidgetId};

/// What the bridge last saw for one handle.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceMeta {
    /// Component type name.
    pub widget_type: String,
    /// Property bag.
    pub properties: Properties,
    /// Child identities, in order.
    pub children: Vec<WidgetId>,
}

/// Identity → last-known metadata.
#[derive(Debug, Default)]
pub struct InstanceIndex {
    entries: HashMap<WidgetId, InstanceMeta>,
}

impl InstanceIndex {
    /// Empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `instance` and its whole subtree.
    pub fn record(&mut self, instance: &Instance) {
        for child in &instance.widget_children {
            self.record(child);
        }
        self.entries.insert(
            instance.widget_id,
            InstanceMeta {
                widget_type: instance.widget_type.clone(),
                properties: instance.widget_properties.clone(),
                children: instance.child_ids(),
            },
        );
    }

    /// Overwrite the child list of a known handle. Returns false if unknown.
    pub fn set_children(&mut self, widget_id: WidgetId, children: Vec<WidgetId>) -> bool {
        match self.entries.get_mut(&widget_id) {
            Some(meta) => {
                meta.children = children;
                true
            }
            None => false,
        }
    }

    /// Drop one handle (its children stay; they may still be referenced).
    pub fn forget(&mut self, widget_id: WidgetId) -> Option<InstanceMeta> {
        self.entries.remove(&widget_id)
    }

    /// Metadata for `widget_id`.
    pub fn get(&self, widget_id: WidgetId) -> Option<&InstanceMeta> {
        self.entries.get(&widget_id)
    }

    /// Whether the bridge holds `widget_id`.
    pub fn contains(&self, widget_id: WidgetId) -> bool {
        self.entries.contains_key(&widget_id)
    }

    /// Number of known handles.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no handles are known.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget everything (root torn down).
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
