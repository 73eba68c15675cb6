//! Submit / execute / complete.
//!
//! - **submit** runs on the caller's thread: validation, capture of owned
//!   inputs, and hand-off to the pool. It never blocks on native work.
//! - **execute** runs a [`Job`] on a tokio blocking thread.
//! - **complete** hands the single result to a [`Completion`]: a oneshot
//!   channel behind [`Pending`] for Rust callers, or a promise deferred for
//!   the N-API addon.
//!
//! Dropping a [`Pending`] does not cancel anything. The native call runs to
//! completion and its allocations are released; only the result is discarded.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use anyhow::{Context as _, Result};
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::oneshot;
use tracing::Span;
use zkprov_core::ErrorValue;
use zkprov_ffi::Library;

/* ---------------------------------- jobs ---------------------------------- */

/// Blocking work for one operation, already validated and self-contained.
pub trait Job: Send + 'static {
    /// Value the operation resolves with.
    type Output: Send + 'static;

    /// Operation name for spans and logs.
    const NAME: &'static str;

    /// Perform the native calls. Runs on a worker thread (or inline for
    /// listings) and may block.
    fn execute(self, lib: &Library) -> Result<Self::Output, ErrorValue>;
}

/// Where a finished operation's result goes. Called exactly once.
pub trait Completion<T>: Send + 'static {
    /// Deliver the result.
    fn complete(self, result: Result<T, ErrorValue>);
}

impl<T: Send + 'static> Completion<T> for oneshot::Sender<Result<T, ErrorValue>> {
    fn complete(self, result: Result<T, ErrorValue>) {
        if self.send(result).is_err() {
            tracing::debug!("caller dropped the pending result");
        }
    }
}

/// Delivers code `6` if dropped before a result went through, so a panicking
/// job or a discarded pool task still settles the caller.
struct Settles<T, C: Completion<T>> {
    done: Option<C>,
    _out: PhantomData<fn(T)>,
}

impl<T, C: Completion<T>> Settles<T, C> {
    const fn new(done: C) -> Self {
        Self {
            done: Some(done),
            _out: PhantomData,
        }
    }

    fn complete(mut self, result: Result<T, ErrorValue>) {
        if let Some(done) = self.done.take() {
            done.complete(result);
        }
    }
}

impl<T, C: Completion<T>> Drop for Settles<T, C> {
    fn drop(&mut self) {
        if let Some(done) = self.done.take() {
            tracing::error!("operation dropped before settling");
            done.complete(Err(abandoned()));
        }
    }
}

/* -------------------------------- pending --------------------------------- */

/// A result that settles once.
///
/// Resolves to `Err` with code `6` if the worker vanished without completing
/// (for example, a panic inside the native call).
#[derive(Debug)]
#[must_use = "a pending operation does nothing observable unless awaited"]
pub struct Pending<T> {
    rx: oneshot::Receiver<Result<T, ErrorValue>>,
}

impl<T> Pending<T> {
    /// A fresh pending result and the sender that settles it.
    pub fn channel() -> (oneshot::Sender<Result<T, ErrorValue>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// Already settled, e.g. rejected during submit.
    pub fn ready(result: Result<T, ErrorValue>) -> Self {
        let (tx, pending) = Self::channel();
        // The receiver is alive in `pending`, so this cannot fail.
        let _ = tx.send(result);
        pending
    }

    /// Already rejected.
    pub fn rejected(err: ErrorValue) -> Self {
        Self::ready(Err(err))
    }

    /// Settled value if available, without waiting.
    pub fn try_take(&mut self) -> Option<Result<T, ErrorValue>> {
        match self.rx.try_recv() {
            Ok(r) => Some(r),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(abandoned())),
        }
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T, ErrorValue>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or_else(|_| Err(abandoned())))
    }
}

fn abandoned() -> ErrorValue {
    ErrorValue::contract(
        "Internal error",
        "operation ended without producing a result",
    )
}

/* ------------------------------- lifecycle -------------------------------- */

/// States of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Constructed; nothing checked yet.
    Created,
    /// Host arguments are being checked.
    Validating,
    /// Handed to the dispatcher.
    Submitted,
    /// Native work in progress.
    Executing,
    /// Native work produced a value.
    Succeeded,
    /// Native work or output checks failed.
    Failed,
    /// Value delivered. Terminal.
    Resolved,
    /// Error delivered. Terminal.
    Rejected,
}

impl Phase {
    /// No further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Rejected)
    }

    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub const fn can_advance(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Validating)
                | (Self::Validating, Self::Submitted | Self::Rejected)
                | (Self::Submitted, Self::Executing)
                | (Self::Executing, Self::Succeeded | Self::Failed)
                | (Self::Succeeded, Self::Resolved)
                | (Self::Failed, Self::Rejected)
        )
    }
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Tracks one operation through its [`Phase`]s inside a tracing span.
#[derive(Debug)]
pub struct Lifecycle {
    op: &'static str,
    id: u64,
    phase: Phase,
    span: Span,
}

impl Lifecycle {
    /// Start tracking a new operation named `op`.
    #[must_use]
    pub fn new(op: &'static str) -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            op,
            id,
            phase: Phase::Created,
            span: tracing::info_span!("op", op, id),
        }
    }

    /// Operation name.
    #[must_use]
    pub const fn op(&self) -> &'static str {
        self.op
    }

    /// Process-unique id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// The operation's span.
    #[must_use]
    pub const fn span(&self) -> &Span {
        &self.span
    }

    /// Move to `next`.
    pub fn advance(&mut self, next: Phase) {
        let _g = self.span.enter();
        let legal = self.phase.can_advance(next);
        debug_assert!(legal, "illegal transition {:?} -> {next:?}", self.phase);
        if !legal {
            tracing::error!(from = ?self.phase, to = ?next, "illegal lifecycle transition");
        }
        tracing::debug!(from = ?self.phase, to = ?next, "transition");
        self.phase = next;
    }

    /// `Validating -> Rejected`.
    pub fn reject_early(&mut self, err: &ErrorValue) {
        {
            let _g = self.span.enter();
            tracing::warn!(code = err.code(), detail = err.detail(), "rejected before submit");
        }
        self.advance(Phase::Rejected);
    }

    /// `Executing -> Succeeded -> Resolved` or `Executing -> Failed -> Rejected`.
    pub fn settle<T>(&mut self, result: &Result<T, ErrorValue>) {
        match result {
            Ok(_) => {
                self.advance(Phase::Succeeded);
                self.advance(Phase::Resolved);
            }
            Err(err) => {
                {
                    let _g = self.span.enter();
                    tracing::warn!(
                        code = err.code(),
                        msg = err.message(),
                        detail = err.detail(),
                        "operation failed"
                    );
                }
                self.advance(Phase::Failed);
                self.advance(Phase::Rejected);
            }
        }
    }
}

/* ------------------------------- dispatcher ------------------------------- */

/// Runs [`Job`]s on a tokio blocking pool.
#[derive(Debug)]
pub struct Dispatcher {
    handle: Handle,
    // Present only when the dispatcher built its own runtime.
    runtime: Option<Runtime>,
}

impl Dispatcher {
    /// Build a private runtime with at most `worker_threads` blocking threads.
    pub fn new(worker_threads: usize) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(worker_threads.max(1))
            .thread_name("zkprov-worker")
            .enable_all()
            .build()
            .context("failed to start the zkprov worker runtime")?;
        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
        })
    }

    /// Use an existing runtime's blocking pool.
    #[must_use]
    pub const fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            runtime: None,
        }
    }

    /// The runtime jobs are spawned on.
    #[must_use]
    pub const fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Queue `job` on the pool; `done` receives its result.
    pub fn submit<J, C>(&self, lib: &Library, job: J, mut life: Lifecycle, done: C)
    where
        J: Job,
        C: Completion<J::Output>,
    {
        life.advance(Phase::Submitted);
        let lib = lib.clone();
        let done = Settles::new(done);
        // Detached: completion is delivered through `done`, even on panic.
        drop(self.handle.spawn_blocking(move || execute(&lib, job, life, done)));
    }

    /// Run `job` on the current thread. For listings only.
    pub fn run_inline<J, C>(&self, lib: &Library, job: J, mut life: Lifecycle, done: C)
    where
        J: Job,
        C: Completion<J::Output>,
    {
        life.advance(Phase::Submitted);
        execute(lib, job, life, Settles::new(done));
    }
}

fn execute<J, C>(lib: &Library, job: J, mut life: Lifecycle, done: Settles<J::Output, C>)
where
    J: Job,
    C: Completion<J::Output>,
{
    life.advance(Phase::Executing);
    let result = {
        let _g = life.span().enter();
        job.execute(lib)
    };
    life.settle(&result);
    done.complete(result);
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // `Runtime::drop` panics inside an async context; shutting down in the
        // background does not. Running blocking jobs finish on their own.
        if let Some(rt) = self.runtime.take() {
            rt.shutdown_background();
        }
    }
}
