// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Replaying event source for headless loop tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use loom_bridge_proto::PluginEvent;
use loom_host_port::{EventSource, TransportError};
use tokio::sync::Semaphore;

/// Call accounting shared between a [`ScriptedEvents`] and its test.
#[derive(Debug, Default)]
pub struct SourceStats {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SourceStats {
    /// Total `next_plugin_event` calls started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls currently suspended.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously suspended calls ever observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// `EventSource` that replays a fixed script.
///
/// Once the script is exhausted every call fails with
/// `TransportError::Closed`, which the dispatch loop treats as fatal.
#[derive(Debug)]
pub struct ScriptedEvents {
    script: VecDeque<Result<PluginEvent, TransportError>>,
    stats: Arc<SourceStats>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedEvents {
    /// Replay `events` in order.
    pub fn new(events: impl IntoIterator<Item = PluginEvent>) -> Self {
        Self::from_results(events.into_iter().map(Ok))
    }

    /// Replay events and failures in order.
    pub fn from_results(script: impl IntoIterator<Item = Result<PluginEvent, TransportError>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            stats: Arc::new(SourceStats::default()),
            gate: None,
        }
    }

    /// Hold every call until the returned semaphore grants a permit.
    ///
    /// Lets a test keep a call outstanding while it pokes at the loop.
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(gate.clone());
        (self, gate)
    }

    /// Shared call accounting.
    pub fn stats(&self) -> Arc<SourceStats> {
        self.stats.clone()
    }

    /// Events not yet delivered.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

/// Counts one suspended call; released on completion or cancellation.
struct InFlight<'a>(&'a SourceStats);

impl<'a> InFlight<'a> {
    fn enter(stats: &'a SourceStats) -> Self {
        stats.calls.fetch_add(1, Ordering::SeqCst);
        let now = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(stats)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl EventSource for ScriptedEvents {
    async fn next_plugin_event(&mut self) -> Result<PluginEvent, TransportError> {
        let stats = self.stats.clone();
        let in_flight = InFlight::enter(&stats);

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        } else {
            tokio::task::yield_now().await;
        }

        drop(in_flight);
        self.script.pop_front().unwrap_or(Err(TransportError::Closed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_in_order_then_closes() {
        let mut source = ScriptedEvents::new([PluginEvent::ViewDestroyed, PluginEvent::stop()]);
        let stats = source.stats();
        assert_eq!(source.next_plugin_event().await, Ok(PluginEvent::ViewDestroyed));
        assert!(source.next_plugin_event().await.unwrap().is_stop());
        assert_eq!(source.next_plugin_event().await, Err(TransportError::Closed));
        assert_eq!(stats.calls(), 3);
        assert_eq!(stats.max_in_flight(), 1);
        assert_eq!(stats.in_flight(), 0);
    }

    #[tokio::test]
    async fn gated_calls_wait_for_permits() {
        let (mut source, gate) = ScriptedEvents::new([PluginEvent::ViewDestroyed]).gated();
        let stats = source.stats();
        let task = tokio::spawn(async move { source.next_plugin_event().await });
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(stats.in_flight(), 1);
        gate.add_permits(1);
        assert_eq!(task.await.unwrap(), Ok(PluginEvent::ViewDestroyed));
    }

    #[tokio::test]
    async fn cancelled_call_leaves_the_script_and_the_count_alone() {
        let (mut source, gate) = ScriptedEvents::new([PluginEvent::ViewDestroyed]).gated();
        let stats = source.stats();
        let cancelled =
            tokio::time::timeout(std::time::Duration::from_millis(10), source.next_plugin_event()).await;
        assert!(cancelled.is_err());
        assert_eq!(stats.in_flight(), 0);
        assert_eq!(source.remaining(), 1);

        gate.add_permits(1);
        assert_eq!(source.next_plugin_event().await, Ok(PluginEvent::ViewDestroyed));
        assert_eq!(stats.calls(), 2);
        assert_eq!(stats.max_in_flight(), 1);
        assert_eq!(stats.in_flight(), 0);
    }
}
