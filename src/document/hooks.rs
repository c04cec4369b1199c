//! Named task pipelines.
//!
//! Every task runs as: (save only) compilers and the validation gate, then
//! pre hooks strictly in order, then exactly one core action (or the task's
//! override wrapping it), then post hooks strictly in order once the core
//! action has yielded. Hook lists are the schema registrations followed by the
//! instance registrations, concatenated at dispatch time.

use crate::core::{DocError, Result};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

use super::Document;

pub type TaskFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a hook asks the sequencer to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookFlow {
    /// Continue with the next hook.
    Next,
    /// Skip the remaining pre hooks and run the core action now.
    Done,
    /// Stop the task without running the core action.
    Abort(String),
}

/// A hook error is recorded on the document and the pipeline continues.
pub type HookResult = Result<HookFlow>;

type HookFn = dyn for<'a> Fn(&'a mut Document) -> TaskFuture<'a, HookResult> + Send + Sync;

#[derive(Clone)]
pub struct Hook(Arc<HookFn>);

impl Hook {
    pub fn new<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Document) -> TaskFuture<'a, HookResult> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// A hook whose body never suspends.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&mut Document) -> HookResult + Send + Sync + 'static,
    {
        Self::new(move |doc| {
            let outcome = f(doc);
            Box::pin(async move { outcome })
        })
    }

    pub(crate) fn call<'a>(&self, doc: &'a mut Document) -> TaskFuture<'a, HookResult> {
        (self.0)(doc)
    }
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Hook")
    }
}

type ActionFn =
    dyn for<'a> Fn(&'a mut Document, Value) -> TaskFuture<'a, Result<()>> + Send + Sync;

/// Core action of a task.
#[derive(Clone)]
pub struct TaskAction(Arc<ActionFn>);

impl TaskAction {
    pub fn new<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Document, Value) -> TaskFuture<'a, Result<()>>
            + Send
            + Sync
            + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call<'a>(&self, doc: &'a mut Document, args: Value) -> TaskFuture<'a, Result<()>> {
        (self.0)(doc, args)
    }
}

type OverrideFn = dyn for<'a> Fn(&'a mut Document, TaskAction, Value) -> TaskFuture<'a, Result<()>>
    + Send
    + Sync;

/// Replacement for a core action. It receives the original action and the
/// original arguments and is responsible for invoking it.
#[derive(Clone)]
pub struct TaskOverride(Arc<OverrideFn>);

impl TaskOverride {
    pub fn new<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Document, TaskAction, Value) -> TaskFuture<'a, Result<()>>
            + Send
            + Sync
            + 'static,
    {
        Self(Arc::new(f))
    }

    fn call<'a>(
        &self,
        doc: &'a mut Document,
        action: TaskAction,
        args: Value,
    ) -> TaskFuture<'a, Result<()>> {
        (self.0)(doc, action, args)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    PreRunning,
    CoreRunning,
    PostRunning,
    Done,
}

/// Cursor over one invocation's hook lists.
#[derive(Debug)]
pub(crate) struct TaskSequencer {
    pres: Vec<Hook>,
    posts: Vec<Hook>,
    cursor: usize,
    phase: TaskPhase,
}

impl TaskSequencer {
    pub(crate) fn new(pres: Vec<Hook>, posts: Vec<Hook>) -> Self {
        Self {
            pres,
            posts,
            cursor: 0,
            phase: TaskPhase::PreRunning,
        }
    }

    /// Next hook of the current phase, advancing the cursor.
    fn next_hook(&mut self) -> Option<Hook> {
        let list = match self.phase {
            TaskPhase::PreRunning => &self.pres,
            TaskPhase::PostRunning => &self.posts,
            TaskPhase::CoreRunning | TaskPhase::Done => return None,
        };
        let hook = list.get(self.cursor).cloned();
        if hook.is_some() {
            self.cursor += 1;
        }
        hook
    }

    fn enter(&mut self, phase: TaskPhase) {
        self.phase = phase;
        self.cursor = 0;
    }
}

impl Document {
    /// Registers an instance-level pre hook for `task`.
    pub fn pre(&mut self, task: &str, hook: Hook) -> &mut Self {
        self.pres.entry(task.to_string()).or_default().push(hook);
        self
    }

    /// Registers an instance-level post hook for `task`.
    pub fn post(&mut self, task: &str, hook: Hook) -> &mut Self {
        self.posts.entry(task.to_string()).or_default().push(hook);
        self
    }

    /// Schema then instance registrations of `task`, followed by those of
    /// `companion` when given.
    pub(crate) fn collect_hooks(
        &self,
        task: &str,
        companion: Option<&str>,
    ) -> (Vec<Hook>, Vec<Hook>) {
        let schema = self.model.schema().clone();
        let mut pres = Vec::new();
        let mut posts = Vec::new();
        for name in std::iter::once(task).chain(companion) {
            pres.extend(schema.pres(name).iter().cloned());
            pres.extend(self.pres.get(name).into_iter().flatten().cloned());
            posts.extend(schema.posts(name).iter().cloned());
            posts.extend(self.posts.get(name).into_iter().flatten().cloned());
        }
        (pres, posts)
    }

    /// Runs the named task pipeline around `core`.
    pub(crate) fn run_task<'a>(
        &'a mut self,
        task: &'a str,
        companion: Option<&'a str>,
        core: TaskAction,
        args: Value,
    ) -> TaskFuture<'a, Result<()>> {
        let span = info_span!(
            "document.task",
            task = %task,
            collection = %self.model.collection()
        );
        Box::pin(
            async move {
                let (pres, posts) = self.collect_hooks(task, companion);
                let mut sequencer = TaskSequencer::new(pres, posts);

                if task == "save" {
                    self.compile_paths();
                    self.validate().await;
                    if !self.errors.is_empty() {
                        let errors = self.take_errors();
                        event!(Level::DEBUG, errors = errors.len(), "save gated");
                        return Err(DocError::Invalid(errors));
                    }
                }

                while let Some(hook) = sequencer.next_hook() {
                    match hook.call(self).await {
                        Ok(HookFlow::Next) => {}
                        Ok(HookFlow::Done) => break,
                        Ok(HookFlow::Abort(reason)) => {
                            event!(Level::DEBUG, reason = %reason, "task aborted by pre hook");
                            sequencer.enter(TaskPhase::Done);
                            return Err(DocError::Aborted(task.to_string(), reason));
                        }
                        Err(err) => self.errors.push(err),
                    }
                }

                sequencer.enter(TaskPhase::CoreRunning);
                let override_action = self.model.schema().override_for(task).cloned();
                let outcome = match override_action {
                    Some(wrapper) => wrapper.call(self, core, args).await,
                    None => core.call(self, args).await,
                };

                sequencer.enter(TaskPhase::PostRunning);
                if self.model.connection().config().yield_before_post_hooks {
                    tokio::task::yield_now().await;
                }
                while let Some(hook) = sequencer.next_hook() {
                    match hook.call(self).await {
                        Ok(HookFlow::Next) => {}
                        Ok(HookFlow::Done) | Ok(HookFlow::Abort(_)) => break,
                        Err(err) => self.errors.push(err),
                    }
                }
                sequencer.enter(TaskPhase::Done);
                event!(Level::DEBUG, ok = outcome.is_ok(), "task finished");
                outcome
            }
            .instrument(span),
        )
    }

    /// Runs a user-defined task registered on the schema.
    pub async fn invoke(&mut self, name: &str, args: Value) -> Result<()> {
        let action = self
            .model
            .schema()
            .task(name)
            .cloned()
            .ok_or_else(|| DocError::UnknownTask(name.to_string()))?;
        self.run_task(name, None, action, args).await
    }
}
