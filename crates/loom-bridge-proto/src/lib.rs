// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared schema for the Loom renderer bridge.
//!
//! The reconciler side and the native host exchange three kinds of data:
//! instance handles (host-owned tree nodes), property bags, and plugin events.
//! Everything here is pure data; the framed CBOR transport lives in [`wire`].

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::PathBuf};

mod event;
pub mod wire;

pub use event::{PluginEvent, ReconcilerMode, STOP_COMMAND};

/// Wire identity of an instance handle.
///
/// Identities are assigned by the owning root context (or by the host when it
/// clones into a fresh node); the reconciler never invents them.
pub type WidgetId = u32;

/// First identity a host hands out for nodes it creates itself.
///
/// Root contexts allocate strictly below this, so the two ranges never meet.
pub const HOST_ID_BASE: WidgetId = 0x8000_0000;

/// Ordered list of property names that changed between two commits.
pub type UpdatePayload = Vec<String>;

/// Property bag of an instance. Sorted so encoding is deterministic.
pub type Properties = BTreeMap<String, PropertyValue>;

/// Widget type used for text nodes.
pub const TEXT_WIDGET_TYPE: &str = "text";

/// Property carrying the content of a text node.
pub const TEXT_PROPERTY: &str = "text";

/// Default Unix socket path for the headless host.
///
/// Prefers a per-user runtime dir (XDG_RUNTIME_DIR) and falls back to `/tmp`
/// when unavailable.
pub fn default_socket_path() -> PathBuf {
    let base = std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"));
    base.join("loom-host.sock")
}

/// A single property value crossing the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum PropertyValue {
    /// UTF-8 string.
    String(String),
    /// IEEE-754 double.
    Number(f64),
    /// Boolean flag.
    Bool(bool),
    /// Marker for a listener; the closure itself stays on the reconciler side.
    Function,
    /// Explicitly unset.
    Undefined,
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Opaque handle to a live node of the host's native tree.
///
/// Values are immutable snapshots: a mutation always yields a new `Instance`
/// that callers adopt in place of the old one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// Stable identity for the lifetime of the node.
    #[serde(rename = "widgetId")]
    pub widget_id: WidgetId,
    /// Component type name.
    #[serde(rename = "widgetType")]
    pub widget_type: String,
    /// Property bag.
    #[serde(rename = "widgetProperties")]
    pub widget_properties: Properties,
    /// Ordered children.
    #[serde(rename = "widgetChildren")]
    pub widget_children: Vec<Instance>,
}

/// Text nodes share the instance representation on the host.
pub type TextInstance = Instance;

impl Instance {
    /// Build a childless instance.
    pub fn new(widget_id: WidgetId, widget_type: impl Into<String>, widget_properties: Properties) -> Self {
        Self {
            widget_id,
            widget_type: widget_type.into(),
            widget_properties,
            widget_children: Vec::new(),
        }
    }

    /// Identities of the direct children, in order.
    pub fn child_ids(&self) -> Vec<WidgetId> {
        self.widget_children.iter().map(|c| c.widget_id).collect()
    }

    /// Look up a property by name.
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.widget_properties.get(name)
    }

    /// Depth-first search for a descendant (or self) by identity.
    pub fn find(&self, widget_id: WidgetId) -> Option<&Instance> {
        if self.widget_id == widget_id {
            return Some(self);
        }
        self.widget_children.iter().find_map(|c| c.find(widget_id))
    }

    /// Visit every node of the subtree, parents before children.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Instance)) {
        f(self);
        for child in &self.widget_children {
            child.walk(f);
        }
    }
}

/// Names of properties that differ between `old` and `new`, sorted.
///
/// Keys removed in `new` are reported too. Returns `None` when nothing changed
/// so callers can skip the commit entirely.
pub fn diff_properties(old: &Properties, new: &Properties) -> Option<UpdatePayload> {
    let mut changed: UpdatePayload = new
        .iter()
        .filter(|(k, v)| old.get(*k) != Some(*v))
        .map(|(k, _)| k.clone())
        .collect();
    changed.extend(old.keys().filter(|k| !new.contains_key(*k)).cloned());
    if changed.is_empty() {
        return None;
    }
    changed.sort();
    Some(changed)
}

/// Severity for the host log sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Very verbose diagnostics.
    Trace,
    /// Debug diagnostics.
    Debug,
    /// Informational.
    Info,
    /// Something looks off.
    Warn,
    /// Something failed.
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, PropertyValue)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn diff_reports_changed_added_and_removed_keys() {
        let old = props(&[("color", "red".into()), ("size", 10.0.into()), ("gone", true.into())]);
        let new = props(&[("color", "blue".into()), ("size", 10.0.into()), ("fresh", "x".into())]);
        assert_eq!(
            diff_properties(&old, &new),
            Some(vec!["color".to_string(), "fresh".to_string(), "gone".to_string()])
        );
    }

    #[test]
    fn diff_of_identical_bags_is_none() {
        let bag = props(&[("onPress", PropertyValue::Function)]);
        assert_eq!(diff_properties(&bag, &bag.clone()), None);
    }

    #[test]
    fn find_walks_the_subtree() {
        let mut root = Instance::new(1, "box", Properties::new());
        let mut mid = Instance::new(2, "box", Properties::new());
        mid.widget_children.push(Instance::new(3, TEXT_WIDGET_TYPE, props(&[(TEXT_PROPERTY, "hi".into())])));
        root.widget_children.push(mid);

        assert_eq!(root.find(3).map(|i| i.widget_type.as_str()), Some("text"));
        assert!(root.find(9).is_none());

        let mut seen = Vec::new();
        root.walk(&mut |i| seen.push(i.widget_id));
        assert_eq!(seen, vec![1, 2, 3]);
    }
}
