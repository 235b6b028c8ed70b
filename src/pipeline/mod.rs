//! Middleware pipeline for processing VAA jobs
//!
//! A pipeline is an ordered chain of asynchronous handlers sharing one
//! mutable context per job:
//!
//! ```text
//!   job ──▶ metrics ──▶ timeout ──▶ plugins ──┐
//!              ▲           ▲                   │
//!              └───────────┴──── unwind ◀──────┘
//! ```
//!
//! Each handler receives the context and a [`Next`] handle. Calling
//! `next.run(ctx)` runs the rest of the chain; code after that call runs
//! once the downstream handlers have finished, whether they succeeded or
//! failed. A handler that returns an error without calling `next` stops
//! the chain there.
//!
//! `Next::run` consumes the handle, so running the remainder twice from a
//! single handler invocation does not compile.

mod timeout;

pub use timeout::TimeoutMiddleware;

use crate::error::RelayerResult;

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::Span;

/// Retry bookkeeping owned by the external job system
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    /// Attempt number of the current run, `None` when unknown
    pub attempts: Option<u32>,
    /// Attempts allowed before the job is dropped, `None` when unknown
    pub max_attempts: Option<u32>,
}

impl Job {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attempts: None,
            max_attempts: None,
        }
    }

    pub fn with_attempts(mut self, attempts: u32, max_attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Whether a failure of this attempt is the last one.
    ///
    /// Unknown attempt counts are never terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            (self.attempts, self.max_attempts),
            (Some(attempts), Some(max)) if attempts == max
        )
    }
}

/// Per-job state threaded through the pipeline
#[derive(Debug)]
pub struct ProcessingContext<X = ()> {
    pub job: Job,
    /// Span carrying job fields for structured logs
    pub logger: Option<Span>,
    /// Deployment-specific payload
    pub ext: X,
}

impl<X> ProcessingContext<X> {
    pub fn new(job: Job, ext: X) -> Self {
        Self {
            job,
            logger: None,
            ext,
        }
    }

    pub fn with_logger(mut self, span: Span) -> Self {
        self.logger = Some(span);
        self
    }

    /// Run `f` inside the job span, if there is one
    pub fn in_scope<R>(&self, f: impl FnOnce() -> R) -> R {
        match &self.logger {
            Some(span) => span.in_scope(f),
            None => f(),
        }
    }
}

/// One stage of a pipeline
#[async_trait]
pub trait Middleware<C>: Send + Sync {
    async fn handle(&self, ctx: &mut C, next: Next<'_, C>) -> RelayerResult<()>;
}

/// Remainder of the chain after the current handler
pub struct Next<'a, C> {
    chain: &'a [Arc<dyn Middleware<C>>],
    outer: Option<Box<Next<'a, C>>>,
}

impl<'a, C: Send + 'static> Next<'a, C> {
    /// Run every remaining handler, continuing into the enclosing pipeline
    /// once this one is exhausted
    pub fn run<'c>(self, ctx: &'c mut C) -> BoxFuture<'c, RelayerResult<()>>
    where
        'a: 'c,
    {
        Box::pin(async move {
            match self.chain.split_first() {
                Some((head, rest)) => {
                    let next = Next {
                        chain: rest,
                        outer: self.outer,
                    };
                    head.handle(ctx, next).await
                }
                None => match self.outer {
                    Some(outer) => (*outer).run(ctx).await,
                    None => Ok(()),
                },
            }
        })
    }
}

/// Ordered, composed chain of handlers
pub struct Pipeline<C> {
    handlers: Vec<Arc<dyn Middleware<C>>>,
}

/// Compose handlers into a single pipeline, run in declared order
pub fn compose<C: Send + 'static>(handlers: Vec<Arc<dyn Middleware<C>>>) -> Pipeline<C> {
    Pipeline { handlers }
}

impl<C: Send + 'static> Pipeline<C> {
    /// Run the whole chain for one job
    pub async fn run(&self, ctx: &mut C) -> RelayerResult<()> {
        Next {
            chain: &self.handlers,
            outer: None,
        }
        .run(ctx)
        .await
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[async_trait]
impl<C: Send + 'static> Middleware<C> for Pipeline<C> {
    async fn handle(&self, ctx: &mut C, next: Next<'_, C>) -> RelayerResult<()> {
        Next {
            chain: &self.handlers,
            outer: Some(Box::new(next)),
        }
        .run(ctx)
        .await
    }
}
