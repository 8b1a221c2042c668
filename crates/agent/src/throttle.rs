//! Sliding-window rate limiting and a per-tool failure circuit breaker.
//!
//! The throttler is consulted before every tool call and told the outcome
//! afterwards. It denies a call when:
//! - the tool has failed 3 or more times in a row (circuit open)
//! - the tool was called 5 or more times in the last 10 seconds
//! - 10 or more calls to any tool happened in the last 5 seconds
//!
//! Time comes from `tokio::time::Instant`, so the windows follow a paused
//! test clock.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

const MAX_CONSECUTIVE_FAILURES: u32 = 3;
const TOOL_WINDOW: Duration = Duration::from_secs(10);
const TOOL_WINDOW_LIMIT: usize = 5;
const GLOBAL_WINDOW: Duration = Duration::from_secs(5);
const GLOBAL_WINDOW_LIMIT: usize = 10;
const HISTORY_RETENTION: Duration = Duration::from_secs(60);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(10);

/// Why a call was denied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThrottleReason {
    #[error("Tool '{0}' has failed 3+ times in a row. Skipping to prevent thrashing.")]
    CircuitOpen(String),

    #[error("Tool '{0}' called 5+ times in 10 seconds. Throttled.")]
    ToolRateExceeded(String),

    #[error("Too many tool calls (10+ in 5 seconds). Throttling to prevent runaway execution.")]
    GlobalRateExceeded,
}

/// Snapshot of throttling state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThrottleStats {
    pub total_calls_last_60s: usize,
    pub tools_with_failures: BTreeMap<String, u32>,
    /// Up to five `(tool, calls)` pairs, most called first.
    pub most_called_tools: Vec<(String, usize)>,
}

#[derive(Debug)]
pub struct ToolThrottler {
    history: Vec<(Instant, String)>,
    failures: HashMap<String, u32>,
    last_cleanup: Instant,
}

impl Default for ToolThrottler {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolThrottler {
    pub fn new() -> Self {
        Self {
            history: Vec::new(),
            failures: HashMap::new(),
            last_cleanup: Instant::now(),
        }
    }

    /// Decide whether `tool` may run now. Checks run in a fixed order and
    /// the first denial wins.
    pub fn should_allow(&mut self, tool: &str) -> Result<(), ThrottleReason> {
        self.cleanup();
        let now = Instant::now();

        if self.consecutive_failures(tool) >= MAX_CONSECUTIVE_FAILURES {
            return Err(ThrottleReason::CircuitOpen(tool.to_string()));
        }

        let same_tool = self
            .history
            .iter()
            .filter(|(ts, name)| name == tool && now.duration_since(*ts) < TOOL_WINDOW)
            .count();
        if same_tool >= TOOL_WINDOW_LIMIT {
            return Err(ThrottleReason::ToolRateExceeded(tool.to_string()));
        }

        let all_tools = self
            .history
            .iter()
            .filter(|(ts, _)| now.duration_since(*ts) < GLOBAL_WINDOW)
            .count();
        if all_tools >= GLOBAL_WINDOW_LIMIT {
            return Err(ThrottleReason::GlobalRateExceeded);
        }

        Ok(())
    }

    /// Record the outcome of a call. A success resets the tool's failure
    /// counter to zero.
    pub fn record_call(&mut self, tool: &str, success: bool) {
        self.history.push((Instant::now(), tool.to_string()));
        if success {
            self.failures.insert(tool.to_string(), 0);
        } else {
            let count = self.failures.entry(tool.to_string()).or_insert(0);
            *count += 1;
            debug!(tool = %tool, consecutive_failures = *count, "Tool failure recorded");
        }
    }

    /// Clear the failure counter for one tool, or for all tools.
    pub fn reset_failures(&mut self, tool: Option<&str>) {
        match tool {
            Some(name) => {
                self.failures.insert(name.to_string(), 0);
            }
            None => self.failures.clear(),
        }
    }

    pub fn consecutive_failures(&self, tool: &str) -> u32 {
        self.failures.get(tool).copied().unwrap_or(0)
    }

    pub fn stats(&self) -> ThrottleStats {
        let now = Instant::now();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut total = 0;
        for (ts, name) in &self.history {
            if now.duration_since(*ts) < HISTORY_RETENTION {
                total += 1;
                *counts.entry(name.as_str()).or_insert(0) += 1;
            }
        }

        let mut most_called: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(name, n)| (name.to_string(), n))
            .collect();
        most_called.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        most_called.truncate(5);

        ThrottleStats {
            total_calls_last_60s: total,
            tools_with_failures: self
                .failures
                .iter()
                .filter(|(_, n)| **n > 0)
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            most_called_tools: most_called,
        }
    }

    /// Drop history older than the retention window, at most once per
    /// cleanup interval.
    fn cleanup(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.last_cleanup) < CLEANUP_INTERVAL {
            return;
        }
        self.history
            .retain(|(ts, _)| now.duration_since(*ts) < HISTORY_RETENTION);
        self.last_cleanup = now;
    }

    #[cfg(test)]
    fn history_len(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn circuit_opens_after_three_failures_and_closes_on_success() {
        let mut t = ToolThrottler::new();
        for _ in 0..3 {
            assert!(t.should_allow("ReadFile").is_ok());
            t.record_call("ReadFile", false);
            advance(Duration::from_secs(3)).await;
        }
        assert_eq!(
            t.should_allow("ReadFile"),
            Err(ThrottleReason::CircuitOpen("ReadFile".into()))
        );
        // Other tools are unaffected.
        assert!(t.should_allow("WriteFile").is_ok());

        t.record_call("ReadFile", true);
        assert_eq!(t.consecutive_failures("ReadFile"), 0);
        advance(Duration::from_secs(11)).await;
        assert!(t.should_allow("ReadFile").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn sixth_call_in_ten_seconds_is_denied() {
        let mut t = ToolThrottler::new();
        for _ in 0..5 {
            assert!(t.should_allow("ListDirectory").is_ok());
            t.record_call("ListDirectory", true);
            advance(Duration::from_millis(1500)).await;
        }
        assert_eq!(
            t.should_allow("ListDirectory"),
            Err(ThrottleReason::ToolRateExceeded("ListDirectory".into()))
        );

        advance(Duration::from_secs(10)).await;
        assert!(t.should_allow("ListDirectory").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn global_burst_guard() {
        let mut t = ToolThrottler::new();
        for i in 0..10 {
            let name = format!("tool{}", i % 3);
            assert!(t.should_allow(&name).is_ok());
            t.record_call(&name, true);
        }
        assert_eq!(
            t.should_allow("another"),
            Err(ThrottleReason::GlobalRateExceeded)
        );

        advance(Duration::from_secs(5)).await;
        assert!(t.should_allow("another").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn history_is_pruned_lazily() {
        let mut t = ToolThrottler::new();
        t.record_call("ReadFile", true);
        advance(Duration::from_secs(61)).await;
        assert_eq!(t.history_len(), 1);
        t.should_allow("ReadFile").unwrap();
        assert_eq!(t.history_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_and_stats() {
        let mut t = ToolThrottler::new();
        t.record_call("ReadFile", true);
        t.record_call("ReadFile", true);
        t.record_call("ExecuteCommand", false);
        t.record_call("PatchFile", false);

        let stats = t.stats();
        assert_eq!(stats.total_calls_last_60s, 4);
        assert_eq!(stats.most_called_tools[0], ("ReadFile".to_string(), 2));
        assert_eq!(stats.tools_with_failures.len(), 2);

        t.reset_failures(Some("PatchFile"));
        assert_eq!(t.stats().tools_with_failures.len(), 1);
        t.reset_failures(None);
        assert!(t.stats().tools_with_failures.is_empty());

        advance(Duration::from_secs(60)).await;
        assert_eq!(t.stats().total_calls_last_60s, 0);
    }

    #[test]
    fn reasons_render_tool_name() {
        let msg = ThrottleReason::CircuitOpen("PatchFile".into()).to_string();
        assert!(msg.contains("'PatchFile'"));
        assert!(msg.contains("3+ times"));
    }
}
