// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Headless native tree.
//!
//! Nodes are stored flat (identity → type, properties, child ids) and
//! materialized into `Instance` values on demand, so a handle handed out
//! earlier never aliases host state.

use std::collections::HashMap;

use loom_bridge_proto::{
    Instance, LogLevel, PluginEvent, PropertyValue, Properties, ReconcilerMode, WidgetId, HOST_ID_BASE,
};
use loom_host_port::{GatewayError, HostGateway};
use tracing::{debug, error, info, trace, warn};

/// Widget type of the root container the host creates per view.
pub const CONTAINER_WIDGET_TYPE: &str = "container";

/// How `clone_instance` treats identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClonePolicy {
    /// Update the node under its existing identity.
    #[default]
    InPlace,
    /// Register the clone under a fresh host identity.
    FreshIdentity,
}

/// One line received through the gateway `log` op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Severity.
    pub level: LogLevel,
    /// Logical source.
    pub target: String,
    /// Message text.
    pub message: String,
}

#[derive(Debug, Clone)]
struct Node {
    widget_type: String,
    properties: Properties,
    children: Vec<WidgetId>,
}

/// In-memory host.
#[derive(Debug, Default)]
pub struct MemoryHost {
    nodes: HashMap<WidgetId, Node>,
    container: Option<WidgetId>,
    view: Option<(ReconcilerMode, String)>,
    policy: ClonePolicy,
    next_host_id: WidgetId,
    fired: Vec<(WidgetId, String)>,
    logs: Vec<LogRecord>,
}

impl MemoryHost {
    /// Create a host with no mounted view.
    pub fn new(policy: ClonePolicy) -> Self {
        Self {
            policy,
            next_host_id: HOST_ID_BASE,
            ..Self::default()
        }
    }

    fn alloc_host_id(&mut self) -> WidgetId {
        let id = self.next_host_id.max(HOST_ID_BASE);
        self.next_host_id = id.wrapping_add(1).max(HOST_ID_BASE);
        id
    }

    /// Mount a view and return the event announcing it.
    ///
    /// Any previously mounted view is dropped first.
    pub fn open_view(&mut self, reconciler_mode: ReconcilerMode, view_name: &str) -> PluginEvent {
        self.nodes.clear();
        let id = self.alloc_host_id();
        self.nodes.insert(
            id,
            Node {
                widget_type: CONTAINER_WIDGET_TYPE.to_owned(),
                properties: Properties::new(),
                children: Vec::new(),
            },
        );
        self.container = Some(id);
        self.view = Some((reconciler_mode, view_name.to_owned()));
        info!(container = id, %reconciler_mode, view_name, "view opened");
        PluginEvent::ViewCreated {
            reconciler_mode,
            view_name: view_name.to_owned(),
        }
    }

    /// Tear down the mounted view and return the event announcing it.
    pub fn close_view(&mut self) -> PluginEvent {
        if let Some((_, name)) = self.view.take() {
            info!(view_name = %name, nodes = self.nodes.len(), "view closed");
        }
        self.nodes.clear();
        self.container = None;
        self.fired.clear();
        PluginEvent::ViewDestroyed
    }

    /// Simulate a user interaction on `widget`.
    pub fn fire(&self, widget: WidgetId, event_name: &str) -> Result<PluginEvent, GatewayError> {
        if !self.nodes.contains_key(&widget) {
            return Err(GatewayError::UnknownHandle(widget));
        }
        Ok(PluginEvent::view_event(widget, event_name))
    }

    /// Materialize the mounted tree, if any.
    pub fn tree(&self) -> Option<Instance> {
        self.container.and_then(|id| self.materialize(id))
    }

    /// Name and mode of the mounted view.
    pub fn view(&self) -> Option<(ReconcilerMode, &str)> {
        self.view.as_ref().map(|(mode, name)| (*mode, name.as_str()))
    }

    /// Whether the host currently knows `widget`.
    pub fn contains(&self, widget: WidgetId) -> bool {
        self.nodes.contains_key(&widget)
    }

    /// Number of registered nodes (container included).
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Materialize a single node with its subtree.
    pub fn instance(&self, widget: WidgetId) -> Option<Instance> {
        self.materialize(widget)
    }

    /// Take listener firings queued by `call_event_listener`, as view events.
    pub fn drain_fired(&mut self) -> Vec<PluginEvent> {
        self.fired
            .drain(..)
            .map(|(widget, name)| PluginEvent::view_event(widget, name))
            .collect()
    }

    /// Log lines received so far.
    pub fn logs(&self) -> &[LogRecord] {
        &self.logs
    }

    fn materialize(&self, id: WidgetId) -> Option<Instance> {
        let node = self.nodes.get(&id)?;
        let widget_children = node
            .children
            .iter()
            .filter_map(|child| self.materialize(*child))
            .collect();
        Some(Instance {
            widget_id: id,
            widget_type: node.widget_type.clone(),
            widget_properties: node.properties.clone(),
            widget_children,
        })
    }

    fn register(&mut self, instance: &Instance) {
        for child in &instance.widget_children {
            self.register(child);
        }
        self.nodes.insert(
            instance.widget_id,
            Node {
                widget_type: instance.widget_type.clone(),
                properties: instance.widget_properties.clone(),
                children: instance.child_ids(),
            },
        );
    }
}

impl HostGateway for MemoryHost {
    fn log(&mut self, level: LogLevel, target: &str, message: &str) {
        match level {
            LogLevel::Trace => trace!(plugin_target = target, "{message}"),
            LogLevel::Debug => debug!(plugin_target = target, "{message}"),
            LogLevel::Info => info!(plugin_target = target, "{message}"),
            LogLevel::Warn => warn!(plugin_target = target, "{message}"),
            LogLevel::Error => error!(plugin_target = target, "{message}"),
        }
        self.logs.push(LogRecord {
            level,
            target: target.to_owned(),
            message: message.to_owned(),
        });
    }

    fn call_event_listener(&mut self, instance: &Instance, event_name: &str) -> Result<(), GatewayError> {
        let node = self
            .nodes
            .get(&instance.widget_id)
            .ok_or(GatewayError::UnknownHandle(instance.widget_id))?;
        if node.properties.get(event_name) == Some(&PropertyValue::Function) {
            debug!(widget_id = instance.widget_id, event_name, "listener invoked");
            self.fired.push((instance.widget_id, event_name.to_owned()));
        } else {
            trace!(widget_id = instance.widget_id, event_name, "no listener registered");
        }
        Ok(())
    }

    fn clone_instance(
        &mut self,
        instance: &Instance,
        update_payload: &[String],
        widget_type: &str,
        old_props: &Properties,
        new_props: &Properties,
        keep_children: bool,
    ) -> Result<Instance, GatewayError> {
        let source = self
            .nodes
            .get(&instance.widget_id)
            .ok_or(GatewayError::UnknownHandle(instance.widget_id))?;

        let mut properties = old_props.clone();
        for key in update_payload {
            match new_props.get(key) {
                Some(value) => {
                    properties.insert(key.clone(), value.clone());
                }
                None => {
                    properties.remove(key);
                }
            }
        }
        let children = if keep_children {
            source.children.clone()
        } else {
            Vec::new()
        };

        let id = match self.policy {
            ClonePolicy::InPlace => instance.widget_id,
            ClonePolicy::FreshIdentity => self.alloc_host_id(),
        };
        self.nodes.insert(
            id,
            Node {
                widget_type: widget_type.to_owned(),
                properties,
                children,
            },
        );
        trace!(from = instance.widget_id, to = id, keep_children, "instance cloned");
        self.materialize(id).ok_or(GatewayError::UnknownHandle(id))
    }

    fn replace_container_children(&mut self, container: &Instance, new_children: &[Instance]) -> Result<(), GatewayError> {
        if !self.nodes.contains_key(&container.widget_id) {
            return Err(GatewayError::UnknownHandle(container.widget_id));
        }
        for child in new_children {
            self.register(child);
        }
        let ids = new_children.iter().map(|c| c.widget_id).collect::<Vec<_>>();
        if let Some(node) = self.nodes.get_mut(&container.widget_id) {
            node.children = ids;
        }
        trace!(container = container.widget_id, count = new_children.len(), "children replaced");
        Ok(())
    }

    fn get_container(&mut self) -> Result<Instance, GatewayError> {
        self.tree().ok_or(GatewayError::NoView)
    }
}
