//! Background highlighting
//!
//! One named thread owns a [`Highlighter`] and works through submitted
//! documents. Each document has at most one queued-or-active job: a newer
//! submission replaces a queued one and cancels a running one, so stale
//! revisions stop early instead of delaying the latest edit.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use ropey::Rope;

use crate::config::HighlighterConfig;
use crate::error::HighlightError;
use crate::syntax::{CancellationToken, Highlighter, LanguageRegistry, SyntaxHighlights};

/// Caller-assigned document identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(pub u64);

/// A snapshot of a document to highlight
#[derive(Debug, Clone)]
pub struct HighlightRequest {
    pub document_id: DocumentId,
    pub revision: u64,
    /// Language name or alias of the document's root language
    pub language: String,
    pub text: Arc<Rope>,
}

/// Outcome of a job that ran to completion. Cancelled jobs produce nothing.
#[derive(Debug, Clone)]
pub struct HighlightResult {
    pub document_id: DocumentId,
    pub revision: u64,
    pub highlights: Result<SyntaxHighlights, HighlightError>,
}

struct Job {
    request: HighlightRequest,
    cancel: CancellationToken,
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<Job>,
    active: Option<(DocumentId, CancellationToken)>,
    shutdown: bool,
}

impl QueueState {
    /// Drop queued jobs and cancel the running job for `document_id`
    fn retire(&mut self, document_id: DocumentId) {
        self.queue
            .retain(|job| job.request.document_id != document_id);
        if let Some((active_id, cancel)) = &self.active {
            if *active_id == document_id {
                cancel.cancel();
            }
        }
    }
}

struct Shared {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to the highlight thread. Dropping it shuts the thread down.
pub struct HighlightWorker {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for HighlightWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HighlightWorker")
            .field("pending", &self.pending())
            .field("running", &self.handle.is_some())
            .finish()
    }
}

impl HighlightWorker {
    /// Start the worker thread. Completed jobs arrive on the returned
    /// receiver.
    pub fn spawn(
        registry: Arc<LanguageRegistry>,
        config: &HighlighterConfig,
    ) -> std::io::Result<(Self, Receiver<HighlightResult>)> {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
        });
        let (tx, rx) = mpsc::channel();
        let check_interval = config.cancellation_check_interval;

        let thread_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("token-syntax-highlight".to_string())
            .spawn(move || run(&thread_shared, &registry, check_interval, &tx))?;

        tracing::debug!("Started highlight worker");
        Ok((
            Self {
                shared,
                handle: Some(handle),
            },
            rx,
        ))
    }

    /// Queue `request`, superseding any earlier job for the same document
    pub fn submit(&self, request: HighlightRequest) {
        let mut state = self.shared.lock();
        if state.shutdown {
            tracing::warn!(
                "Highlight worker is shut down, dropping doc={} rev={}",
                request.document_id.0,
                request.revision
            );
            return;
        }
        state.retire(request.document_id);
        tracing::trace!(
            "Queued highlight for doc={} rev={} ({})",
            request.document_id.0,
            request.revision,
            request.language
        );
        state.queue.push_back(Job {
            request,
            cancel: CancellationToken::new(),
        });
        drop(state);
        self.shared.available.notify_one();
    }

    /// Abandon any queued or running job for `document_id`
    pub fn cancel(&self, document_id: DocumentId) {
        self.shared.lock().retire(document_id);
    }

    /// Jobs waiting to start
    pub fn pending(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Cancel outstanding work and join the thread
    pub fn shutdown(&mut self) {
        {
            let mut state = self.shared.lock();
            state.shutdown = true;
            state.queue.clear();
            if let Some((_, cancel)) = &state.active {
                cancel.cancel();
            }
        }
        self.shared.available.notify_all();

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Highlight worker thread panicked");
            }
        }
    }
}

impl Drop for HighlightWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    shared: &Shared,
    registry: &LanguageRegistry,
    check_interval: usize,
    tx: &Sender<HighlightResult>,
) {
    let mut highlighter = Highlighter::new().with_cancellation_check_interval(check_interval);

    loop {
        let job = {
            let mut state = shared.lock();
            loop {
                if state.shutdown {
                    tracing::debug!("Highlight worker stopping");
                    return;
                }
                if let Some(job) = state.queue.pop_front() {
                    state.active = Some((job.request.document_id, job.cancel.clone()));
                    break job;
                }
                state = shared
                    .available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        let highlights = highlight_document(&mut highlighter, registry, &job.request, &job.cancel);
        if !deliver(shared, &job, highlights, tx) {
            tracing::debug!("Highlight receiver dropped, stopping worker");
            return;
        }
    }
}

/// Retire `job` and send its result unless it was cancelled. Returns false
/// once the receiver is gone.
fn deliver(
    shared: &Shared,
    job: &Job,
    highlights: Result<SyntaxHighlights, HighlightError>,
    tx: &Sender<HighlightResult>,
) -> bool {
    let request = &job.request;
    let mut state = shared.lock();
    state.active = None;

    // Also covers a cancel that landed after the job's last check
    if job.cancel.is_cancelled() || matches!(highlights, Err(HighlightError::Cancelled)) {
        tracing::debug!(
            "Highlight cancelled for doc={} rev={}",
            request.document_id.0,
            request.revision
        );
        return true;
    }

    if let Err(e) = &highlights {
        tracing::warn!(
            "Highlight failed for doc={} rev={}: {}",
            request.document_id.0,
            request.revision,
            e
        );
    }
    let result = HighlightResult {
        document_id: request.document_id,
        revision: request.revision,
        highlights,
    };
    // Still under the lock
    tx.send(result).is_ok()
}

fn highlight_document(
    highlighter: &mut Highlighter,
    registry: &LanguageRegistry,
    request: &HighlightRequest,
    cancel: &CancellationToken,
) -> Result<SyntaxHighlights, HighlightError> {
    let config =
        registry
            .resolve(&request.language)
            .ok_or_else(|| HighlightError::UnknownLanguage {
                language: request.language.clone(),
            })?;

    let start = std::time::Instant::now();
    let highlights = highlighter.collect(
        config,
        request.text.as_ref(),
        cancel,
        |name| registry.resolve(name),
        request.revision,
    )?;
    tracing::debug!(
        "Highlighted doc={} rev={} ({} spans) in {:?}",
        request.document_id.0,
        request.revision,
        highlights.spans.len(),
        start.elapsed()
    );
    Ok(highlights)
}
