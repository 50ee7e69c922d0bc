#![forbid(unsafe_code)]

//! The explicit context every component is bound in.
//!
//! A host creates one [`Runtime`] holding the render target, the group-name
//! [`IdGenerator`], the [`Scheduler`] for deferred event handlers, and the
//! [`TemplateConfig`]. Nothing in the template layer is global.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use trapline_dom::RenderTarget;

use crate::config::TemplateConfig;

/// Monotonically increasing id source.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: Cell<u64>,
}

impl IdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The next id, starting at 1.
    pub fn next_id(&self) -> u64 {
        let id = self.last.get() + 1;
        self.last.set(id);
        id
    }
}

type Task = Box<dyn FnOnce()>;

/// A queue of tasks deferred to the next turn.
#[derive(Default)]
pub struct Scheduler {
    queue: RefCell<VecDeque<Task>>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&self, task: impl FnOnce() + 'static) {
        self.queue.borrow_mut().push_back(Box::new(task));
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Run the tasks queued before this call. Tasks they schedule wait for
    /// the next turn. Returns the number of tasks run.
    pub fn run_pending(&self) -> usize {
        let turn: Vec<Task> = self.queue.borrow_mut().drain(..).collect();
        let count = turn.len();
        for task in turn {
            task();
        }
        if count > 0 {
            tracing::trace!(count, "deferred tasks run");
        }
        count
    }
}

/// Shared binding context.
pub struct Runtime {
    target: Rc<dyn RenderTarget>,
    ids: IdGenerator,
    scheduler: Scheduler,
    config: TemplateConfig,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("scheduler", &self.scheduler)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    #[must_use]
    pub fn new(target: Rc<dyn RenderTarget>) -> Rc<Self> {
        Self::with_config(target, TemplateConfig::default())
    }

    #[must_use]
    pub fn with_config(target: Rc<dyn RenderTarget>, config: TemplateConfig) -> Rc<Self> {
        Rc::new(Self {
            target,
            ids: IdGenerator::new(),
            scheduler: Scheduler::new(),
            config,
        })
    }

    #[must_use]
    pub fn target(&self) -> &dyn RenderTarget {
        self.target.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &TemplateConfig {
        &self.config
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// A fresh synthetic group name such as `group.3`.
    pub fn unique_name(&self) -> String {
        format!("{}.{}", self.config.group_prefix, self.ids.next_id())
    }

    /// Run one turn of deferred event handlers.
    pub fn run_pending(&self) -> usize {
        self.scheduler.run_pending()
    }
}
