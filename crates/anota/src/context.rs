//! Rolling short-term context across near-duplicate learning activities.
//!
//! Instruction-following models drift on long runs of similar items without
//! grounding in what came just before, so the pipeline carries a bounded
//! window of the most recent records and asks the LLM for a short digest of
//! it before each row. Capping the window bounds prompt length and cost.
//!
//! The digest injected for row *i* is always computed from rows strictly
//! before *i*: callers summarize first and push the current row afterwards.

use crate::{GenerateFuture, TextGenerator};
use serde::Deserialize;
use std::collections::HashMap;
use std::collections::VecDeque;
use tracing::warn;

/// Returned for an empty window, without issuing any network call.
pub const EMPTY_CONTEXT_SENTINEL: &str = "No previous context available.";

/// Returned when the digest call fails; acceptable prompt filler.
pub const SUMMARY_ERROR_SENTINEL: &str = "Error generating summary.";

const RUN_KEY: &str = "__run__";

// ── Scope and source ───────────────────────────────────────────────

/// How windows are keyed: one for the whole run, or one per distinct
/// lesson title, created lazily and retained for the run's duration.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContextScope {
    #[default]
    Run,
    Title,
}

/// Where the annotation pass gets its digest: computed live from the
/// tracker, or read back from the summary column a prior summarize pass
/// filled in.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContextSource {
    #[default]
    Live,
    Column,
}

// ── Window ─────────────────────────────────────────────────────────

/// Bounded FIFO of the most recent `(description, embedded_content)` pairs.
/// Pushing beyond capacity evicts the oldest entry; the length never
/// exceeds the capacity fixed at construction.
#[derive(Debug)]
pub struct ContextWindow {
    entries: VecDeque<(String, String)>,
    capacity: usize,
}

impl ContextWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, description: String, content: String) {
        self.entries.push_back((description, content));
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &(String, String)> {
        self.entries.iter()
    }
}

// ── Tracker ────────────────────────────────────────────────────────

/// Keyed store of context windows. The key function is the scope: a single
/// constant key for the run, or the record's title.
#[derive(Debug)]
pub struct ContextTracker {
    scope: ContextScope,
    capacity: usize,
    windows: HashMap<String, ContextWindow>,
}

impl ContextTracker {
    pub fn new(scope: ContextScope, capacity: usize) -> Self {
        Self {
            scope,
            capacity,
            windows: HashMap::new(),
        }
    }

    /// The window key for a record with the given title.
    pub fn key_for(&self, title: &str) -> String {
        match self.scope {
            ContextScope::Run => RUN_KEY.to_string(),
            ContextScope::Title => title.trim().to_string(),
        }
    }

    pub fn window(&self, key: &str) -> Option<&ContextWindow> {
        self.windows.get(key)
    }

    pub fn update(&mut self, key: &str, description: String, content: String) {
        self.windows
            .entry(key.to_string())
            .or_insert_with(|| ContextWindow::new(self.capacity))
            .push(description, content);
    }
}

// ── Digest ─────────────────────────────────────────────────────────

/// Format the window as the enumerated block the digest request embeds.
pub fn format_window(window: &ContextWindow) -> String {
    window
        .iter()
        .enumerate()
        .map(|(i, (description, content))| {
            let item = i + 1;
            format!(
                "Item{item}.Task description: {description}\n\
                 Item{item}.embedded_artifact_description: {content}"
            )
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

/// The one-shot digest request for a formatted window.
pub fn summary_prompt(window_text: &str, word_limit: usize) -> String {
    format!(
        "Provide a summary of the instructions provided to the students and the embedded \
         artifacts in the following items. The text should not take more than {word_limit} \
         words.\n\nText: `{window_text}`"
    )
}

/// Digest a window into a short context blurb. An empty (or absent) window
/// returns [`EMPTY_CONTEXT_SENTINEL`] without touching the network; a
/// failed call returns [`SUMMARY_ERROR_SENTINEL`].
pub async fn summarize(
    generator: &dyn TextGenerator,
    window: Option<&ContextWindow>,
    word_limit: usize,
) -> String {
    let Some(window) = window.filter(|w| !w.is_empty()) else {
        return EMPTY_CONTEXT_SENTINEL.to_string();
    };

    let prompt = summary_prompt(&format_window(window), word_limit);
    match generator.generate(&prompt).await {
        Ok(digest) => digest,
        Err(err) => {
            warn!("context digest call failed: {err}");
            SUMMARY_ERROR_SENTINEL.to_string()
        }
    }
}
