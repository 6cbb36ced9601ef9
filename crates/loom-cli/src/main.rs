// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Loom CLI entrypoint.
//!
//! Talks to a running `loom-host-service` over its control socket.
//!
//! # Usage
//! ```text
//! loom [--socket <path>] open-view --mode concurrent --name root
//! loom fire --widget 1 --event onPress
//! loom tree
//! ```

// The CLI is expected to print to stdout.
#![allow(clippy::print_stdout)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loom_app_core::config::ConfigService;
use loom_app_core::prefs::{HostPrefs, HOST_PREFS_KEY};
use loom_bridge_proto::{Instance, ReconcilerMode, WidgetId};
use loom_config_fs::FsConfigStore;
use loom_session_client::ControlClient;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "loom", version, about = "Drive a headless Loom host")]
struct Cli {
    /// Host control socket (defaults to the saved host prefs)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Mount a view; the host emits ViewCreated
    OpenView {
        /// Reconciler mode announced to the bridge
        #[arg(long, default_value = "concurrent")]
        mode: ReconcilerMode,
        /// View name announced to the bridge
        #[arg(long, default_value = "root")]
        name: String,
    },
    /// Tear the view down; the host emits ViewDestroyed
    CloseView,
    /// Simulate a user interaction on a widget
    Fire {
        /// Target widget id
        #[arg(long)]
        widget: WidgetId,
        /// Event name, e.g. onPress
        #[arg(long)]
        event: String,
    },
    /// Ask the host to emit the stop command
    Stop,
    /// Print the native tree as JSON
    Tree {
        /// Single-line output
        #[arg(long)]
        compact: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let socket = cli.socket.clone().unwrap_or_else(saved_socket_path);
    debug!(socket = %socket.display(), "connecting");
    let mut control = ControlClient::connect(&socket)
        .await
        .with_context(|| format!("is loom-host-service running at {}?", socket.display()))?;

    match cli.command {
        Commands::OpenView { mode, name } => control.open_view(mode, &name).await?,
        Commands::CloseView => control.close_view().await?,
        Commands::Fire { widget, event } => control.fire_event(widget, &event).await?,
        Commands::Stop => control.stop().await?,
        Commands::Tree { compact } => {
            let tree = control.dump_tree().await?;
            println!("{}", render_tree(tree.as_ref(), compact)?);
        }
    }
    Ok(())
}

/// Socket from saved host prefs, without writing anything.
fn saved_socket_path() -> PathBuf {
    FsConfigStore::new()
        .ok()
        .map(ConfigService::new)
        .and_then(|cfg| cfg.load::<HostPrefs>(HOST_PREFS_KEY).ok().flatten())
        .unwrap_or_default()
        .socket_path
}

fn render_tree(tree: Option<&Instance>, compact: bool) -> Result<String> {
    let json = if compact {
        serde_json::to_string(&tree)?
    } else {
        serde_json::to_string_pretty(&tree)?
    };
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_bridge_proto::{Properties, PropertyValue};

    #[test]
    fn subcommands_parse() {
        let cli = Cli::try_parse_from(["loom", "--socket", "/tmp/x.sock", "open-view", "--mode", "legacy"]).unwrap();
        assert_eq!(cli.socket, Some(PathBuf::from("/tmp/x.sock")));
        assert_eq!(
            cli.command,
            Commands::OpenView {
                mode: ReconcilerMode::Legacy,
                name: "root".into()
            }
        );

        let cli = Cli::try_parse_from(["loom", "fire", "--widget", "7", "--event", "onPress"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Fire {
                widget: 7,
                event: "onPress".into()
            }
        );
        assert!(Cli::try_parse_from(["loom", "open-view", "--mode", "sideways"]).is_err());
    }

    #[test]
    fn tree_renders_wire_field_names() {
        let mut props = Properties::new();
        props.insert("text".into(), PropertyValue::from("hi"));
        let root = Instance::new(1, "text", props);
        let json = render_tree(Some(&root), true).unwrap();
        assert!(json.contains(r#""widgetId":1"#));
        assert!(json.contains(r#""widgetType":"text""#));
        assert_eq!(render_tree(None, true).unwrap(), "null");
    }
}
