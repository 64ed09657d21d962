//! Deterministic enrichment provider for tests.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tacit_core::{ActionItem, EnrichmentProvider, Error, Result, Vector};

/// How one mocked operation behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockBehavior {
    #[default]
    Succeed,
    Fail,
    /// Sleep far beyond any pipeline timeout.
    Hang,
}

#[derive(Debug, Clone, Copy, Default)]
struct Behaviors {
    summarize: MockBehavior,
    embed: MockBehavior,
    action_items: MockBehavior,
}

/// Mock provider with per-operation behavior and call counters.
pub struct MockEnrichmentProvider {
    dimension: usize,
    behaviors: Mutex<Behaviors>,
    summarize_calls: AtomicUsize,
    embed_calls: AtomicUsize,
    action_item_calls: AtomicUsize,
}

impl Default for MockEnrichmentProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEnrichmentProvider {
    pub fn new() -> Self {
        Self {
            dimension: 8,
            behaviors: Mutex::new(Behaviors::default()),
            summarize_calls: AtomicUsize::new(0),
            embed_calls: AtomicUsize::new(0),
            action_item_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Every operation fails.
    pub fn failing() -> Self {
        let mock = Self::new();
        mock.set_all(MockBehavior::Fail);
        mock
    }

    pub fn set_all(&self, behavior: MockBehavior) {
        let mut b = self.lock();
        b.summarize = behavior;
        b.embed = behavior;
        b.action_items = behavior;
    }

    pub fn set_summarize(&self, behavior: MockBehavior) {
        self.lock().summarize = behavior;
    }

    pub fn set_embed(&self, behavior: MockBehavior) {
        self.lock().embed = behavior;
    }

    pub fn set_action_items(&self, behavior: MockBehavior) {
        self.lock().action_items = behavior;
    }

    pub fn summarize_calls(&self) -> usize {
        self.summarize_calls.load(Ordering::SeqCst)
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    pub fn action_item_calls(&self) -> usize {
        self.action_item_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.summarize_calls() + self.embed_calls() + self.action_item_calls()
    }

    /// Same text, same vector.
    pub fn embedding_for(&self, text: &str) -> Vector {
        let mut values = Vec::with_capacity(self.dimension);
        for i in 0..self.dimension {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            values.push((hasher.finish() % 1000) as f32 / 1000.0);
        }
        Vector::from(values)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Behaviors> {
        self.behaviors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn apply(behavior: MockBehavior, op: &str) -> Result<()> {
        match behavior {
            MockBehavior::Succeed => Ok(()),
            MockBehavior::Fail => Err(Error::Enrichment(format!("mock {} failure", op))),
            MockBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(Error::Enrichment(format!("mock {} hung", op)))
            }
        }
    }
}

#[async_trait]
impl EnrichmentProvider for MockEnrichmentProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn summarize(&self, title: &str, text: &str) -> Result<String> {
        self.summarize_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.lock().summarize;
        Self::apply(behavior, "summarize").await?;
        Ok(format!("Summary of {} ({} chars)", title, text.chars().count()))
    }

    async fn embed(&self, text: &str) -> Result<Vector> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.lock().embed;
        Self::apply(behavior, "embed").await?;
        Ok(self.embedding_for(text))
    }

    async fn extract_action_items(&self, text: &str) -> Result<Vec<ActionItem>> {
        self.action_item_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.lock().action_items;
        Self::apply(behavior, "extract_action_items").await?;
        Ok(text
            .lines()
            .filter_map(|line| line.split_once("TODO"))
            .map(|(_, rest)| ActionItem {
                description: rest.trim_start_matches(':').trim().to_string(),
                assignee: None,
                due_date: None,
            })
            .filter(|item| !item.description.is_empty())
            .collect())
    }
}
