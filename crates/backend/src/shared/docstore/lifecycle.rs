//! Lifecycle hooks bound to a collection.
//!
//! Hooks live in explicit ordered lists and run sequentially at four fixed
//! extension points: before-write, before-read, after-read and
//! before-aggregate. The first failing before-write hook aborts the
//! operation before anything reaches storage.

use std::time::{Duration, Instant};

use contracts::domain::common::ValidationError;
use serde_json::Value;

use super::{executor, DocQuery, Document, Stage, StoreError, ID_FIELD, VERSION_FIELD};
use crate::shared::data::doc_storage;

/// Which write triggered a before-write hook. Validators may fire on
/// creation only (the discount invariant does).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Update,
}

type BeforeWriteHook = Box<dyn Fn(&mut Document, WriteOp) -> Result<(), ValidationError> + Send + Sync>;
type BeforeReadHook = Box<dyn Fn(&mut DocQuery) + Send + Sync>;
type AfterReadHook = Box<dyn Fn(&[Document], Duration) + Send + Sync>;
type BeforeAggregateHook = Box<dyn Fn(&mut Vec<Stage>) + Send + Sync>;

/// Ordered hook lists for one entity. Registration order is execution
/// order.
#[derive(Default)]
pub struct LifecycleHooks {
    before_write: Vec<BeforeWriteHook>,
    before_read: Vec<BeforeReadHook>,
    after_read: Vec<AfterReadHook>,
    before_aggregate: Vec<BeforeAggregateHook>,
}

impl LifecycleHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_before_write(
        mut self,
        hook: impl Fn(&mut Document, WriteOp) -> Result<(), ValidationError> + Send + Sync + 'static,
    ) -> Self {
        self.before_write.push(Box::new(hook));
        self
    }

    pub fn on_before_read(mut self, hook: impl Fn(&mut DocQuery) + Send + Sync + 'static) -> Self {
        self.before_read.push(Box::new(hook));
        self
    }

    pub fn on_after_read(
        mut self,
        hook: impl Fn(&[Document], Duration) + Send + Sync + 'static,
    ) -> Self {
        self.after_read.push(Box::new(hook));
        self
    }

    pub fn on_before_aggregate(
        mut self,
        hook: impl Fn(&mut Vec<Stage>) + Send + Sync + 'static,
    ) -> Self {
        self.before_aggregate.push(Box::new(hook));
        self
    }

    pub fn run_before_write(
        &self,
        doc: &mut Document,
        op: WriteOp,
    ) -> Result<(), ValidationError> {
        for hook in &self.before_write {
            hook(doc, op)?;
        }
        Ok(())
    }

    pub fn run_before_read(&self, query: &mut DocQuery) {
        for hook in &self.before_read {
            hook(query);
        }
    }

    pub fn run_after_read(&self, docs: &[Document], elapsed: Duration) {
        for hook in &self.after_read {
            hook(docs, elapsed);
        }
    }

    pub fn run_before_aggregate(&self, pipeline: &mut Vec<Stage>) {
        for hook in &self.before_aggregate {
            hook(pipeline);
        }
    }
}

/// Store adapter for one entity: every find/aggregate/insert/update runs
/// through the entity's hooks, so call sites cannot forget them.
pub struct Collection {
    name: &'static str,
    hooks: LifecycleHooks,
}

impl Collection {
    pub fn new(name: &'static str, hooks: LifecycleHooks) -> Self {
        Self { name, hooks }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Execute a find-style query: pre-read hooks see and may narrow the
    /// fully-assembled handle, post-read hooks observe the result and the
    /// wall-clock duration.
    pub async fn find(&self, mut query: DocQuery) -> Result<Vec<Document>, StoreError> {
        self.hooks.run_before_read(&mut query);
        let started = Instant::now();
        let docs = doc_storage::load_collection(self.name).await?;
        let result = executor::apply(&query, docs);
        self.hooks.run_after_read(&result, started.elapsed());
        Ok(result)
    }

    pub async fn aggregate(&self, mut pipeline: Vec<Stage>) -> Result<Vec<Document>, StoreError> {
        self.hooks.run_before_aggregate(&mut pipeline);
        let docs = doc_storage::load_collection(self.name).await?;
        Ok(executor::run_pipeline(&pipeline, docs))
    }

    pub async fn insert(&self, mut doc: Document) -> Result<Document, StoreError> {
        self.hooks.run_before_write(&mut doc, WriteOp::Create)?;
        doc.insert(VERSION_FIELD.to_string(), Value::from(0));
        let id = document_id(&doc)?;
        doc_storage::insert(self.name, &id, &doc).await?;
        Ok(doc)
    }

    pub async fn update(&self, mut doc: Document) -> Result<Document, StoreError> {
        self.hooks.run_before_write(&mut doc, WriteOp::Update)?;
        let id = document_id(&doc)?;
        let version = doc_storage::get(self.name, &id)
            .await?
            .and_then(|current| current.get(VERSION_FIELD).and_then(Value::as_i64))
            .unwrap_or(0);
        doc.insert(VERSION_FIELD.to_string(), Value::from(version + 1));
        doc_storage::update(self.name, &id, &doc).await?;
        Ok(doc)
    }

    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(doc_storage::delete(self.name, id).await?)
    }
}

fn document_id(doc: &Document) -> Result<String, StoreError> {
    doc.get(ID_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| StoreError::Storage(anyhow::anyhow!("document has no id field")))
}
