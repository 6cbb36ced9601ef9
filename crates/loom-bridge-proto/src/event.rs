// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Plugin events emitted by the host, one per `next_plugin_event` call.
//!
//! On the wire an event is a CBOR map tagged by `"type"`. Hosts may grow new
//! tags before the bridge learns about them, so decoding never fails: unknown
//! tags and malformed bodies surface as [`PluginEvent::Unrecognized`].

use ciborium::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::wire::WireError;
use crate::{PropertyValue, WidgetId};

/// Command type that asks the bridge to stop its event loop.
pub const STOP_COMMAND: &str = "stop";

const KNOWN_TAGS: [&str; 4] = ["ViewEvent", "ViewCreated", "ViewDestroyed", "PluginCommand"];

/// Reconciliation mode a view was mounted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcilerMode {
    /// Synchronous legacy root.
    Legacy,
    /// Concurrent root.
    Concurrent,
}

impl ReconcilerMode {
    /// Wire spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            ReconcilerMode::Legacy => "legacy",
            ReconcilerMode::Concurrent => "concurrent",
        }
    }
}

impl fmt::Display for ReconcilerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReconcilerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "legacy" => Ok(ReconcilerMode::Legacy),
            "concurrent" => Ok(ReconcilerMode::Concurrent),
            other => Err(format!("unknown reconciler mode {other:?}")),
        }
    }
}

/// One unit of the host's asynchronous notification stream.
#[derive(Debug, Clone, PartialEq)]
pub enum PluginEvent {
    /// UI interaction targeting a specific instance.
    ViewEvent {
        /// Listener name, e.g. `"onPress"`.
        event_name: String,
        /// Target instance.
        widget: WidgetId,
        /// Arguments captured by the native widget.
        event_arguments: Vec<PropertyValue>,
    },
    /// A new root view was mounted by the host.
    ViewCreated {
        /// Mode the reconciler should use for this root.
        reconciler_mode: ReconcilerMode,
        /// Host-side view name.
        view_name: String,
    },
    /// The current root view was torn down.
    ViewDestroyed,
    /// Out-of-band control instruction.
    PluginCommand {
        /// Command name; only [`STOP_COMMAND`] is defined today.
        command_type: String,
    },
    /// Tag this bridge does not understand, or a body it could not decode.
    Unrecognized {
        /// Raw `"type"` tag (empty when missing).
        tag: String,
        /// Why decoding gave up.
        reason: String,
    },
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type")]
enum WireEvent {
    ViewEvent {
        #[serde(rename = "eventName")]
        event_name: String,
        #[serde(rename = "widgetId")]
        widget_id: WidgetId,
        #[serde(rename = "eventArguments", default)]
        event_arguments: Vec<PropertyValue>,
    },
    ViewCreated {
        #[serde(rename = "reconcilerMode")]
        reconciler_mode: ReconcilerMode,
        #[serde(rename = "viewName")]
        view_name: String,
    },
    ViewDestroyed,
    PluginCommand {
        #[serde(rename = "commandType")]
        command_type: String,
    },
}

impl From<WireEvent> for PluginEvent {
    fn from(value: WireEvent) -> Self {
        match value {
            WireEvent::ViewEvent {
                event_name,
                widget_id,
                event_arguments,
            } => PluginEvent::ViewEvent {
                event_name,
                widget: widget_id,
                event_arguments,
            },
            WireEvent::ViewCreated {
                reconciler_mode,
                view_name,
            } => PluginEvent::ViewCreated {
                reconciler_mode,
                view_name,
            },
            WireEvent::ViewDestroyed => PluginEvent::ViewDestroyed,
            WireEvent::PluginCommand { command_type } => PluginEvent::PluginCommand { command_type },
        }
    }
}

impl PluginEvent {
    /// Convenience constructor for a stop command.
    pub fn stop() -> Self {
        PluginEvent::PluginCommand {
            command_type: STOP_COMMAND.to_owned(),
        }
    }

    /// Convenience constructor for an argument-less view event.
    pub fn view_event(widget: WidgetId, event_name: impl Into<String>) -> Self {
        PluginEvent::ViewEvent {
            event_name: event_name.into(),
            widget,
            event_arguments: Vec::new(),
        }
    }

    /// Wire tag of this event.
    pub fn tag(&self) -> &str {
        match self {
            PluginEvent::ViewEvent { .. } => "ViewEvent",
            PluginEvent::ViewCreated { .. } => "ViewCreated",
            PluginEvent::ViewDestroyed => "ViewDestroyed",
            PluginEvent::PluginCommand { .. } => "PluginCommand",
            PluginEvent::Unrecognized { tag, .. } => tag,
        }
    }

    /// True for `PluginCommand { "stop" }`.
    pub fn is_stop(&self) -> bool {
        matches!(self, PluginEvent::PluginCommand { command_type } if command_type == STOP_COMMAND)
    }

    /// Decode from a CBOR value. Never fails; see [`PluginEvent::Unrecognized`].
    pub fn from_value(value: &Value) -> Self {
        let Some(tag) = tag_of(value) else {
            return PluginEvent::Unrecognized {
                tag: String::new(),
                reason: "missing type tag".into(),
            };
        };
        if !KNOWN_TAGS.contains(&tag) {
            return PluginEvent::Unrecognized {
                tag: tag.to_owned(),
                reason: "unknown event tag".into(),
            };
        }
        match value.deserialized::<WireEvent>() {
            Ok(wire) => wire.into(),
            Err(err) => PluginEvent::Unrecognized {
                tag: tag.to_owned(),
                reason: err.to_string(),
            },
        }
    }

    /// Encode to a CBOR value. `Unrecognized` events cannot be re-emitted.
    pub fn to_value(&self) -> Result<Value, WireError> {
        let wire = match self.clone() {
            PluginEvent::ViewEvent {
                event_name,
                widget,
                event_arguments,
            } => WireEvent::ViewEvent {
                event_name,
                widget_id: widget,
                event_arguments,
            },
            PluginEvent::ViewCreated {
                reconciler_mode,
                view_name,
            } => WireEvent::ViewCreated {
                reconciler_mode,
                view_name,
            },
            PluginEvent::ViewDestroyed => WireEvent::ViewDestroyed,
            PluginEvent::PluginCommand { command_type } => WireEvent::PluginCommand { command_type },
            PluginEvent::Unrecognized { tag, .. } => {
                return Err(WireError::Cbor(format!("cannot encode unrecognized event {tag:?}")));
            }
        };
        Value::serialized(&wire).map_err(|e| WireError::Cbor(e.to_string()))
    }
}

fn tag_of(value: &Value) -> Option<&str> {
    value.as_map()?.iter().find_map(|(k, v)| match (k.as_text(), v.as_text()) {
        (Some("type"), Some(tag)) => Some(tag),
        _ => None,
    })
}
