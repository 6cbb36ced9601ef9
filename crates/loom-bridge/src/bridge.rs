// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Root lifecycle and the seam to the embedded reconciler.

use loom_bridge_proto::{Instance, Properties, PropertyValue, ReconcilerMode, TextInstance, WidgetId};
use loom_host_port::HostGateway;
use tracing::{info, warn};

use crate::{BridgeError, MutationTranslator, RootContext};

/// A mounted root view.
#[derive(Debug, Clone)]
pub struct RootState {
    /// Identity allocator for this root.
    pub context: RootContext,
    /// Mode the host asked for.
    pub reconciler_mode: ReconcilerMode,
    /// Host-side view name.
    pub view_name: String,
    /// Root container handle, as last committed.
    pub container: Instance,
}

/// Translator plus the currently mounted root, if any.
#[derive(Debug)]
pub struct RendererBridge<G> {
    translator: MutationTranslator<G>,
    root: Option<RootState>,
}

impl<G> RendererBridge<G> {
    /// Bridge with no mounted root.
    pub fn new(gateway: G) -> Self {
        Self {
            translator: MutationTranslator::new(gateway),
            root: None,
        }
    }

    /// Commit-side translator.
    pub fn translator(&self) -> &MutationTranslator<G> {
        &self.translator
    }

    /// Mutable commit-side translator.
    pub fn translator_mut(&mut self) -> &mut MutationTranslator<G> {
        &mut self.translator
    }

    /// The mounted root.
    pub fn root(&self) -> Option<&RootState> {
        self.root.as_ref()
    }

    /// Tear the current root down. Its context refuses further allocations
    /// and every handle is forgotten.
    pub fn unmount(&mut self) -> Option<RootState> {
        let mut root = self.root.take()?;
        root.context.tear_down();
        self.translator.forget_all();
        info!(view_name = %root.view_name, "root torn down");
        Some(root)
    }

    /// Create an instance in the mounted root.
    pub fn create_instance(&mut self, widget_type: &str, props: Properties) -> Result<Instance, BridgeError> {
        let root = self.root.as_mut().ok_or(BridgeError::RootTornDown)?;
        self.translator.create_instance(&mut root.context, widget_type, props)
    }

    /// Create a text node in the mounted root.
    pub fn create_text_instance(&mut self, text: &str) -> Result<TextInstance, BridgeError> {
        let root = self.root.as_mut().ok_or(BridgeError::RootTornDown)?;
        self.translator.create_text_instance(&mut root.context, text)
    }
}

impl<G: HostGateway> RendererBridge<G> {
    /// Install a new root for a `ViewCreated` event.
    ///
    /// The container is fetched from the host. A root that is still mounted
    /// is torn down first.
    pub fn mount(&mut self, reconciler_mode: ReconcilerMode, view_name: &str) -> Result<&RootState, BridgeError> {
        if let Some(old) = self.unmount() {
            warn!(old = %old.view_name, new = view_name, "view created while a root was mounted; replacing it");
        }
        let container = self.translator.gateway_mut().get_container()?;
        self.translator.adopt(&container);
        info!(container = container.widget_id, %reconciler_mode, view_name, "root mounted");
        let root = self.root.insert(RootState {
            context: RootContext::new(),
            reconciler_mode,
            view_name: view_name.to_owned(),
            container,
        });
        Ok(&*root)
    }

    /// Replace the children of the root container.
    pub fn replace_root_children(&mut self, children: Vec<Instance>) -> Result<(), BridgeError> {
        let root = self.root.as_mut().ok_or(BridgeError::RootTornDown)?;
        self.translator.replace_container_children(&root.container, &children)?;
        root.container.widget_children = children;
        Ok(())
    }
}

/// The reconciliation engine the bridge feeds.
///
/// The engine decides what to do with a view event. Any mutations it makes
/// go back through `bridge`.
pub trait Reconciler<G> {
    /// Route a host UI event to the instance `widget`.
    fn dispatch_event(
        &mut self,
        bridge: &mut RendererBridge<G>,
        widget: WidgetId,
        event_name: &str,
        event_arguments: &[PropertyValue],
    ) -> Result<(), BridgeError>;

    /// Called once a new root is mounted; typically renders the initial tree.
    fn view_created(&mut self, bridge: &mut RendererBridge<G>) -> Result<(), BridgeError> {
        let _ = bridge;
        Ok(())
    }

    /// Called after the root was torn down.
    fn view_destroyed(&mut self) {}
}
