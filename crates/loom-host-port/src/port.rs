// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Gateway and event-source traits.

use std::future::Future;

use loom_bridge_proto::{Instance, LogLevel, PluginEvent, Properties};

use crate::{GatewayError, TransportError};

/// Synchronous call surface into the host.
///
/// Pure request/response with no queuing. Calls may be issued from any loop
/// state, including while the event source call is outstanding.
pub trait HostGateway {
    /// Forward a log line to the host sink. Never fails observably.
    fn log(&mut self, level: LogLevel, target: &str, message: &str);

    /// Invoke whatever listener the native widget associates with `event_name`.
    fn call_event_listener(&mut self, instance: &Instance, event_name: &str) -> Result<(), GatewayError>;

    /// Produce a re-propped copy of `instance`.
    ///
    /// The result carries `old_props` overridden at the keys named in
    /// `update_payload` by `new_props`. Children are kept when `keep_children`
    /// is set and empty otherwise. The host may return a new identity; callers
    /// must adopt the returned handle.
    fn clone_instance(
        &mut self,
        instance: &Instance,
        update_payload: &[String],
        widget_type: &str,
        old_props: &Properties,
        new_props: &Properties,
        keep_children: bool,
    ) -> Result<Instance, GatewayError>;

    /// Replace the full child list of `container`, in order, in one call.
    fn replace_container_children(&mut self, container: &Instance, new_children: &[Instance]) -> Result<(), GatewayError>;

    /// Root container of the currently mounted view.
    fn get_container(&mut self) -> Result<Instance, GatewayError>;
}

impl<G: HostGateway + ?Sized> HostGateway for Box<G> {
    fn log(&mut self, level: LogLevel, target: &str, message: &str) {
        (**self).log(level, target, message);
    }

    fn call_event_listener(&mut self, instance: &Instance, event_name: &str) -> Result<(), GatewayError> {
        (**self).call_event_listener(instance, event_name)
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
        (**self).clone_instance(instance, update_payload, widget_type, old_props, new_props, keep_children)
    }

    fn replace_container_children(&mut self, container: &Instance, new_children: &[Instance]) -> Result<(), GatewayError> {
        (**self).replace_container_children(container, new_children)
    }

    fn get_container(&mut self) -> Result<Instance, GatewayError> {
        (**self).get_container()
    }
}

/// Asynchronous source of plugin events.
///
/// Each call suspends until the host produces exactly one event. At most one
/// call may be outstanding at a time; there is no timeout.
pub trait EventSource: Send {
    /// Wait for the next plugin event.
    fn next_plugin_event(&mut self) -> impl Future<Output = Result<PluginEvent, TransportError>> + Send;
}
