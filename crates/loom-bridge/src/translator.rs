// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Maps reconciler commit operations onto the host gateway.
//!
//! The host only understands clone and replace-children. Every richer
//! mutation (update, append, insert-before, remove) is decomposed into a clone
//! for the new props and one full child-list replacement for membership.

use loom_bridge_proto::{Instance, LogLevel, Properties, PropertyValue, TextInstance, WidgetId, TEXT_PROPERTY, TEXT_WIDGET_TYPE};
use loom_host_port::HostGateway;
use tracing::{debug, error, trace};

use crate::{BridgeError, InstanceIndex, RootContext};

/// Commit-side half of the bridge.
#[derive(Debug)]
pub struct MutationTranslator<G> {
    gateway: G,
    index: InstanceIndex,
}

impl<G> MutationTranslator<G> {
    /// Wrap a gateway with an empty index.
    pub fn new(gateway: G) -> Self {
        Self {
            gateway,
            index: InstanceIndex::new(),
        }
    }

    /// The wrapped gateway.
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Mutable access to the wrapped gateway.
    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    /// Handles the bridge currently holds.
    pub fn index(&self) -> &InstanceIndex {
        &self.index
    }

    /// Unwrap the gateway.
    pub fn into_gateway(self) -> G {
        self.gateway
    }

    /// Start tracking a handle the host handed us outside a clone (e.g. the root container).
    pub fn adopt(&mut self, instance: &Instance) {
        self.index.record(instance);
    }

    /// Forget every handle (root torn down).
    pub fn forget_all(&mut self) {
        self.index.clear();
    }

    /// New childless instance with an identity from `ctx`.
    pub fn create_instance(
        &mut self,
        ctx: &mut RootContext,
        widget_type: &str,
        props: Properties,
    ) -> Result<Instance, BridgeError> {
        let instance = Instance::new(ctx.allocate_id()?, widget_type, props);
        trace!(widget_id = instance.widget_id, widget_type, "instance created");
        self.index.record(&instance);
        Ok(instance)
    }

    /// New text node carrying `text`.
    pub fn create_text_instance(&mut self, ctx: &mut RootContext, text: &str) -> Result<TextInstance, BridgeError> {
        let mut props = Properties::new();
        props.insert(TEXT_PROPERTY.to_owned(), PropertyValue::from(text));
        self.create_instance(ctx, TEXT_WIDGET_TYPE, props)
    }

    /// Attach `child` to a parent that has not been committed yet.
    ///
    /// Returns the new parent value; the old one must be discarded.
    pub fn append_initial_child(&mut self, parent: Instance, child: Instance) -> Instance {
        let mut parent = parent;
        parent.widget_children.push(child);
        self.index.record(&parent);
        parent
    }
}

impl<G: HostGateway> MutationTranslator<G> {
    /// Ask the host for a re-propped copy of `instance` and adopt it.
    ///
    /// When the host answers with a new identity the old handle is forgotten.
    pub fn clone_instance(
        &mut self,
        instance: &Instance,
        update_payload: &[String],
        widget_type: &str,
        old_props: &Properties,
        new_props: &Properties,
        keep_children: bool,
    ) -> Result<Instance, BridgeError> {
        let cloned = self
            .gateway
            .clone_instance(instance, update_payload, widget_type, old_props, new_props, keep_children)
            .map_err(|err| {
                error!(widget_id = instance.widget_id, %err, "clone_instance failed");
                BridgeError::from(err)
            })?;
        if cloned.widget_id != instance.widget_id {
            debug!(from = instance.widget_id, to = cloned.widget_id, "host returned a new identity");
            self.index.forget(instance.widget_id);
        }
        self.index.record(&cloned);
        Ok(cloned)
    }

    /// Replace the full child list of `container` in one gateway call.
    ///
    /// Every child must be a handle this bridge produced or adopted.
    pub fn replace_container_children(&mut self, container: &Instance, new_children: &[Instance]) -> Result<(), BridgeError> {
        if let Some(foreign) = new_children.iter().find(|c| !self.index.contains(c.widget_id)) {
            error!(
                container = container.widget_id,
                child = foreign.widget_id,
                "child handle was not produced by this bridge"
            );
            return Err(BridgeError::ForeignHandle(foreign.widget_id));
        }
        self.gateway.replace_container_children(container, new_children)?;
        for child in new_children {
            self.index.record(child);
        }
        let ids = new_children.iter().map(|c| c.widget_id).collect();
        if !self.index.set_children(container.widget_id, ids) {
            let mut refreshed = container.clone();
            refreshed.widget_children = new_children.to_vec();
            self.index.record(&refreshed);
        }
        trace!(container = container.widget_id, count = new_children.len(), "children replaced");
        Ok(())
    }

    /// Have the host invoke the listener `event_name` on `instance`.
    pub fn call_event_listener(&mut self, instance: &Instance, event_name: &str) -> Result<(), BridgeError> {
        trace!(widget_id = instance.widget_id, event_name, "call_event_listener");
        self.gateway.call_event_listener(instance, event_name)?;
        Ok(())
    }

    /// Commit a property update; children are kept.
    pub fn commit_update(
        &mut self,
        instance: &Instance,
        update_payload: &[String],
        widget_type: &str,
        old_props: &Properties,
        new_props: &Properties,
    ) -> Result<Instance, BridgeError> {
        self.clone_instance(instance, update_payload, widget_type, old_props, new_props, true)
    }

    /// Append `child` to a committed parent (moving it if already present).
    ///
    /// Returns the parent value carrying the new child list.
    pub fn append_child(&mut self, parent: &Instance, child: Instance) -> Result<Instance, BridgeError> {
        let mut children = without(&parent.widget_children, child.widget_id);
        children.push(child);
        self.commit_children(parent, children)
    }

    /// Insert `child` before the sibling `before` of a committed parent.
    pub fn insert_before(&mut self, parent: &Instance, child: Instance, before: WidgetId) -> Result<Instance, BridgeError> {
        let mut children = without(&parent.widget_children, child.widget_id);
        let at = children
            .iter()
            .position(|c| c.widget_id == before)
            .ok_or(BridgeError::MissingChild {
                parent: parent.widget_id,
                child: before,
            })?;
        children.insert(at, child);
        self.commit_children(parent, children)
    }

    /// Remove `child` from a committed parent.
    pub fn remove_child(&mut self, parent: &Instance, child: WidgetId) -> Result<Instance, BridgeError> {
        if !parent.widget_children.iter().any(|c| c.widget_id == child) {
            return Err(BridgeError::MissingChild {
                parent: parent.widget_id,
                child,
            });
        }
        let children = without(&parent.widget_children, child);
        self.commit_children(parent, children)
    }

    /// Forward a line to the host log sink.
    pub fn log(&mut self, level: LogLevel, target: &str, message: &str) {
        self.gateway.log(level, target, message);
    }

    fn commit_children(&mut self, parent: &Instance, children: Vec<Instance>) -> Result<Instance, BridgeError> {
        self.replace_container_children(parent, &children)?;
        let mut updated = parent.clone();
        updated.widget_children = children;
        Ok(updated)
    }
}

fn without(children: &[Instance], widget_id: WidgetId) -> Vec<Instance> {
    children.iter().filter(|c| c.widget_id != widget_id).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_bridge_proto::ReconcilerMode;
    use loom_host_memory::{ClonePolicy, MemoryHost};
    use loom_host_port::GatewayError;

    fn props(pairs: &[(&str, PropertyValue)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn setup(policy: ClonePolicy) -> (MutationTranslator<MemoryHost>, RootContext, Instance) {
        let mut host = MemoryHost::new(policy);
        host.open_view(ReconcilerMode::Concurrent, "root");
        let container = host.get_container().unwrap();
        let mut translator = MutationTranslator::new(host);
        translator.adopt(&container);
        (translator, RootContext::new(), container)
    }

    #[test]
    fn clone_scenario_keeps_unlisted_props_and_children() {
        let (mut t, mut ctx, container) = setup(ClonePolicy::InPlace);
        let old = props(&[("color", "red".into()), ("size", 10.0.into())]);
        let new = props(&[("color", "blue".into()), ("size", 99.0.into())]);
        let i1 = t.create_instance(&mut ctx, "Box", old.clone()).unwrap();
        let label = t.create_text_instance(&mut ctx, "hello").unwrap();
        let i1 = t.append_initial_child(i1, label);
        t.replace_container_children(&container, &[i1.clone()]).unwrap();

        let cloned = t
            .clone_instance(&i1, &["color".to_string()], "Box", &old, &new, true)
            .unwrap();
        assert_eq!(cloned.widget_properties, props(&[("color", "blue".into()), ("size", 10.0.into())]));
        assert_eq!(cloned.widget_children, i1.widget_children);
    }

    #[test]
    fn clone_without_children_starts_empty() {
        let (mut t, mut ctx, container) = setup(ClonePolicy::InPlace);
        let parent = t.create_instance(&mut ctx, "Box", Properties::new()).unwrap();
        let kid = t.create_instance(&mut ctx, "Box", Properties::new()).unwrap();
        let parent = t.append_initial_child(parent, kid);
        t.replace_container_children(&container, &[parent.clone()]).unwrap();

        let cloned = t
            .clone_instance(&parent, &[], "Box", &Properties::new(), &Properties::new(), false)
            .unwrap();
        assert!(cloned.widget_children.is_empty());
    }

    #[test]
    fn new_identity_replaces_old_handle_in_index() {
        let (mut t, mut ctx, container) = setup(ClonePolicy::FreshIdentity);
        let i1 = t.create_instance(&mut ctx, "Box", Properties::new()).unwrap();
        t.replace_container_children(&container, &[i1.clone()]).unwrap();

        let cloned = t
            .clone_instance(&i1, &[], "Box", &Properties::new(), &Properties::new(), true)
            .unwrap();
        assert_ne!(cloned.widget_id, i1.widget_id);
        assert!(t.index().contains(cloned.widget_id));
        assert!(!t.index().contains(i1.widget_id));
    }

    #[test]
    fn unknown_handle_surfaces_to_caller() {
        let (mut t, _, _) = setup(ClonePolicy::InPlace);
        let ghost = Instance::new(404, "Box", Properties::new());
        let err = t
            .clone_instance(&ghost, &[], "Box", &Properties::new(), &Properties::new(), true)
            .unwrap_err();
        assert_eq!(err, BridgeError::Gateway(GatewayError::UnknownHandle(404)));
    }

    #[test]
    fn foreign_children_never_reach_the_host() {
        let (mut t, _, container) = setup(ClonePolicy::InPlace);
        let stray = Instance::new(55, "Box", Properties::new());
        assert_eq!(
            t.replace_container_children(&container, &[stray]),
            Err(BridgeError::ForeignHandle(55))
        );
        assert!(t.gateway().tree().unwrap().widget_children.is_empty());
    }

    #[test]
    fn replace_twice_is_idempotent() {
        let (mut t, mut ctx, container) = setup(ClonePolicy::InPlace);
        let a = t.create_instance(&mut ctx, "Box", Properties::new()).unwrap();
        let b = t.create_instance(&mut ctx, "Box", Properties::new()).unwrap();
        let kids = vec![a, b];
        t.replace_container_children(&container, &kids).unwrap();
        let once = t.gateway().tree().unwrap();
        t.replace_container_children(&container, &kids).unwrap();
        assert_eq!(t.gateway().tree().unwrap(), once);
        assert_eq!(t.index().get(container.widget_id).unwrap().children, vec![1, 2]);
    }

    #[test]
    fn child_hooks_decompose_into_replacements() {
        let (mut t, mut ctx, container) = setup(ClonePolicy::InPlace);
        let list = t.create_instance(&mut ctx, "List", Properties::new()).unwrap();
        t.replace_container_children(&container, &[list.clone()]).unwrap();

        let a = t.create_instance(&mut ctx, "Item", Properties::new()).unwrap();
        let b = t.create_instance(&mut ctx, "Item", Properties::new()).unwrap();
        let c = t.create_instance(&mut ctx, "Item", Properties::new()).unwrap();

        let list = t.append_child(&list, a.clone()).unwrap();
        let list = t.append_child(&list, c.clone()).unwrap();
        let list = t.insert_before(&list, b.clone(), c.widget_id).unwrap();
        assert_eq!(list.child_ids(), vec![a.widget_id, b.widget_id, c.widget_id]);

        let list = t.append_child(&list, a.clone()).unwrap();
        assert_eq!(list.child_ids(), vec![b.widget_id, c.widget_id, a.widget_id]);

        let list = t.remove_child(&list, c.widget_id).unwrap();
        assert_eq!(list.child_ids(), vec![b.widget_id, a.widget_id]);
        assert_eq!(
            t.gateway().instance(list.widget_id).unwrap().child_ids(),
            vec![b.widget_id, a.widget_id]
        );

        assert_eq!(
            t.remove_child(&list, 999),
            Err(BridgeError::MissingChild {
                parent: list.widget_id,
                child: 999
            })
        );
        assert!(matches!(
            t.insert_before(&list, c, 999),
            Err(BridgeError::MissingChild { child: 999, .. })
        ));
    }

    #[test]
    fn listener_calls_and_logs_reach_the_host() {
        let (mut t, mut ctx, container) = setup(ClonePolicy::InPlace);
        let button = t
            .create_instance(&mut ctx, "Button", props(&[("onPress", PropertyValue::Function)]))
            .unwrap();
        t.replace_container_children(&container, &[button.clone()]).unwrap();
        t.call_event_listener(&button, "onPress").unwrap();
        t.log(LogLevel::Info, "plugin", "pressed");

        assert_eq!(t.gateway_mut().drain_fired().len(), 1);
        assert_eq!(t.gateway().logs().len(), 1);
    }
}
