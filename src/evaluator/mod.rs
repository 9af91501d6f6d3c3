//! # Preview Cache & Incremental Evaluator
//!
//! The evaluator owns the identity key to [`CacheEntry`] map of one session and
//! decides which calls need a generation request.
//!
//! ## Operations
//!
//! - [`Evaluator::ensure`]: first sight of an eager call creates a `Pending`
//!   entry and schedules exactly one request. Later calls for the same key are
//!   no-ops until the entry is reset.
//! - [`Evaluator::invalidate`]: after a variable changes, only the eager calls
//!   whose unsubstituted prompt contains `{Name}` are reset and rescheduled.
//! - [`Evaluator::reset`]: drops every entry, tracked call and in-flight request.
//! - [`Evaluator::trigger_intent`]: runs an intent call on user action. Intent
//!   results go to a per-key [`IntentState`] instead of the preview map.
//!
//! ## In-flight requests
//!
//! Every request is registered under its key with a fresh ticket. Scheduling a
//! key that already has a request aborts the old task and replaces its ticket,
//! so at most one request per key can write a result. A result is committed
//! only if its ticket is still current and its key is still a tracked call;
//! anything else arrived after a reset or replacement and is dropped.
//!
//! Parsing never suspends. The only await point is the generator call, plus
//! the media store when a `data:` URI is persisted.

pub mod cache;
pub mod intent;

use std::{
    collections::{BTreeMap, HashSet},
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use dashmap::{mapref::entry::Entry, DashMap};
use tokio::{runtime::Handle, sync::watch, task::AbortHandle};
use tracing::{debug, warn};

use crate::{
    context::SessionContext,
    definitions::ServiceRef,
    extractor::CallDescriptor,
    generation::{GenerationKind, GenerationOutput, GenerationRequest, GenerationResult},
    media,
    substitution::Substitution,
};

pub use cache::{CacheEntry, CacheStatus, PreviewCache};
pub use intent::{IntentState, IntentStates};

pub const NO_RESPONSE_CONTENT: &str = "No response content";
/// Shown as the intent response when the agent answered with nothing.
pub const NO_INTENT_RESPONSE: &str = "(no response)";

struct InFlight {
    ticket: u64,
    abort: Option<AbortHandle>,
}

struct Inner {
    context: SessionContext,
    cache: PreviewCache,
    intents: IntentStates,
    calls: DashMap<String, CallDescriptor>,
    services: Mutex<Vec<ServiceRef>>,
    in_flight: DashMap<String, InFlight>,
    next_ticket: AtomicU64,
    pending: watch::Sender<usize>,
}

/// Counts a spawned task as pending for as long as it is alive, including
/// when it is aborted before completion.
struct PendingGuard {
    inner: Arc<Inner>,
}

impl PendingGuard {
    fn new(inner: Arc<Inner>) -> Self {
        inner.pending.send_modify(|count| *count += 1);
        Self { inner }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.inner
            .pending
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}

#[derive(Clone)]
pub struct Evaluator {
    inner: Arc<Inner>,
}

impl Evaluator {
    pub fn new(context: SessionContext) -> Self {
        let (pending, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                context,
                cache: PreviewCache::new(),
                intents: IntentStates::default(),
                calls: DashMap::new(),
                services: Mutex::new(Vec::new()),
                in_flight: DashMap::new(),
                next_ticket: AtomicU64::new(1),
                pending,
            }),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.inner.context
    }

    /// External services forwarded with every request from now on.
    pub fn set_services(&self, services: Vec<ServiceRef>) {
        *self
            .inner
            .services
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = services;
    }

    fn services(&self) -> Vec<ServiceRef> {
        self.inner
            .services
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Adds `call` to the current call set, replacing an older descriptor with
    /// the same key.
    pub fn track(&self, call: &CallDescriptor) {
        self.inner
            .calls
            .insert(call.identity_key.clone(), call.clone());
    }

    pub fn is_tracked(&self, key: &str) -> bool {
        self.inner.calls.contains_key(key)
    }

    pub fn calls(&self) -> Vec<CallDescriptor> {
        let mut calls: Vec<_> = self
            .inner
            .calls
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        calls.sort_by(|a, b| {
            (a.block_index, &a.identity_key).cmp(&(b.block_index, &b.identity_key))
        });
        calls
    }

    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.inner.cache.get(key)
    }

    pub fn intent_state(&self, key: &str) -> IntentState {
        self.inner.intents.get(key)
    }

    /// Ready values keyed by identity key, for persistence by the caller.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.inner.cache.snapshot()
    }

    /// Seeds Ready entries. Keys seeded this way are never requested by `ensure`.
    pub fn preload<I, K, V>(&self, previews: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.inner.cache.preload(previews);
    }

    /// Number of generation tasks that have not finished yet.
    pub fn in_flight(&self) -> usize {
        *self.inner.pending.borrow()
    }

    /// Waits until no generation task is running.
    pub async fn settled(&self) {
        let mut pending = self.inner.pending.subscribe();
        // the sender lives in `inner`, which `self` keeps alive
        let _ = pending.wait_for(|count| *count == 0).await;
    }

    #[tracing::instrument(level = "debug", skip(self, call), fields(key = %call.identity_key))]
    pub fn ensure(&self, call: &CallDescriptor) -> Option<CacheEntry> {
        self.track(call);
        if !call.is_eager() {
            return None;
        }
        let (entry, created) = self
            .inner
            .cache
            .insert_pending_if_absent(&call.identity_key);
        if created {
            self.schedule(call, false);
            return self.entry(&call.identity_key).or(Some(entry));
        }
        Some(entry)
    }

    /// Re-substitutes and reschedules every eager call whose prompt references
    /// `variable`. Returns the keys that were rescheduled.
    #[tracing::instrument(level = "debug", skip(self, substitution))]
    pub fn invalidate(&self, variable: &str, substitution: &Substitution<'_>) -> Vec<String> {
        let affected: Vec<CallDescriptor> = self
            .inner
            .calls
            .iter()
            .filter(|entry| entry.value().references(variable))
            .map(|entry| entry.value().with_substitution(substitution))
            .collect();

        let mut keys = Vec::new();
        for call in affected {
            self.track(&call);
            if call.is_eager() {
                self.schedule(&call, true);
                keys.push(call.identity_key);
            }
        }
        keys.sort();
        debug!(count = keys.len(), "invalidated calls");
        keys
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn reset(&self) {
        for entry in self.inner.in_flight.iter() {
            if let Some(abort) = &entry.abort {
                abort.abort();
            }
        }
        self.inner.in_flight.clear();
        self.inner.calls.clear();
        self.inner.cache.clear();
        self.inner.intents.clear();
    }

    /// Drops everything not addressed by `keys`. In-flight requests for dropped
    /// keys are aborted.
    pub fn retain(&self, keys: &HashSet<String>) {
        self.inner.in_flight.retain(|key, flight| {
            let keep = keys.contains(key);
            if !keep {
                if let Some(abort) = &flight.abort {
                    abort.abort();
                }
            }
            keep
        });
        self.inner.calls.retain(|key, _| keys.contains(key));
        self.inner.cache.retain(keys);
        self.inner.intents.retain(keys);
    }

    /// Runs an intent call. Returns `false` when it is already loading.
    #[tracing::instrument(level = "debug", skip(self, call), fields(key = %call.identity_key))]
    pub fn trigger_intent(&self, call: &CallDescriptor) -> bool {
        self.track(call);
        let key = call.identity_key.clone();
        if !self.inner.intents.begin(&key) {
            debug!("intent already loading");
            return false;
        }
        let Some(request) = self.request_for(call) else {
            self.inner
                .intents
                .finish(&key, Err(format!("{} is not a generation call", call.kind)));
            return true;
        };
        let Ok(handle) = Handle::try_current() else {
            self.inner
                .intents
                .finish(&key, Err("no async runtime available".to_string()));
            return true;
        };

        let ticket = self.begin_flight(&key);
        self.spawn_flight(&handle, &key, ticket, move |evaluator| async move {
            let result = evaluator.inner.context.generator.generate(&request).await;
            evaluator.commit_intent(&request.key, ticket, result);
        });
        true
    }

    fn request_for(&self, call: &CallDescriptor) -> Option<GenerationRequest> {
        Some(GenerationRequest {
            kind: call.kind.generation_kind()?,
            agent_name: call.agent.clone(),
            prompt: call.prompt.clone(),
            bound_config: call.bound_config.clone(),
            external_services: self.services(),
            key: call.identity_key.clone(),
        })
    }

    fn schedule(&self, call: &CallDescriptor, reset: bool) {
        if reset {
            self.abort_flight(&call.identity_key);
            self.inner.cache.reset_pending(&call.identity_key);
        }
        if !self.inner.context.config.evaluator.eager {
            debug!(key = %call.identity_key, "eager evaluation disabled");
            return;
        }
        let Some(request) = self.request_for(call) else {
            return;
        };
        let key = call.identity_key.clone();
        let Ok(handle) = Handle::try_current() else {
            warn!(%key, "no async runtime, generation skipped");
            self.inner
                .cache
                .settle(CacheEntry::failed(&key, "no async runtime available"));
            return;
        };

        let ticket = self.begin_flight(&key);
        self.spawn_flight(&handle, &key, ticket, move |evaluator| async move {
            let result = evaluator.inner.context.generator.generate(&request).await;
            evaluator.commit(&request, ticket, result).await;
        });
    }

    fn abort_flight(&self, key: &str) {
        if let Some((_, flight)) = self.inner.in_flight.remove(key) {
            if let Some(abort) = flight.abort {
                debug!(%key, "aborting in-flight request");
                abort.abort();
            }
        }
    }

    /// Registers a new ticket for `key`, aborting the request it replaces.
    fn begin_flight(&self, key: &str) -> u64 {
        let ticket = self.inner.next_ticket.fetch_add(1, Ordering::SeqCst);
        let previous = self.inner.in_flight.insert(
            key.to_string(),
            InFlight {
                ticket,
                abort: None,
            },
        );
        if let Some(abort) = previous.and_then(|flight| flight.abort) {
            debug!(%key, "replacing in-flight request");
            abort.abort();
        }
        ticket
    }

    fn spawn_flight<F, Fut>(&self, handle: &Handle, key: &str, ticket: u64, task: F)
    where
        F: FnOnce(Evaluator) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let guard = PendingGuard::new(self.inner.clone());
        let future = task(self.clone());
        let join = handle.spawn(async move {
            let _guard = guard;
            future.await;
        });
        if let Some(mut flight) = self.inner.in_flight.get_mut(key) {
            if flight.ticket == ticket {
                flight.abort = Some(join.abort_handle());
            }
        }
    }

    async fn resolve_output(
        &self,
        request: &GenerationRequest,
        output: GenerationOutput,
    ) -> CacheEntry {
        let key = &request.key;
        let value = output.into_inner();
        if request.kind == GenerationKind::Text {
            if value.trim().is_empty() {
                return CacheEntry::failed(key, NO_RESPONSE_CONTENT);
            }
            return CacheEntry::ready(key, value);
        }

        let media_config = &self.inner.context.config.media;
        if let Err(e) = media::validate(request.kind, &value, media_config.min_payload_len) {
            return CacheEntry::failed(key, e.to_string());
        }
        let value = value.trim();
        let store = self
            .inner
            .context
            .media_store
            .as_ref()
            .filter(|_| media_config.store_data_uris);
        match (store, media::parse_data_uri(value)) {
            (Some(store), Some(data_uri)) => {
                match store.store(key, data_uri.mime_type, data_uri.base64).await {
                    Ok(url) => CacheEntry::ready(key, url),
                    Err(e) => CacheEntry::failed(key, e.to_string()),
                }
            }
            _ => CacheEntry::ready(key, value),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, request, result), fields(key = %request.key))]
    async fn commit(
        &self,
        request: &GenerationRequest,
        ticket: u64,
        result: GenerationResult<GenerationOutput>,
    ) {
        let entry = match result {
            Ok(output) => self.resolve_output(request, output).await,
            Err(e) => {
                warn!(error = %e, "generation failed");
                CacheEntry::failed(&request.key, e.to_string())
            }
        };

        match self.inner.in_flight.entry(request.key.clone()) {
            Entry::Occupied(flight) if flight.get().ticket == ticket => {
                if self.inner.calls.contains_key(&request.key) {
                    debug!(status = %entry.status, "committing result");
                    self.inner.cache.settle(entry);
                } else {
                    debug!("discarding result for a key no longer in the document");
                }
                flight.remove();
            }
            _ => debug!("discarding superseded result"),
        }
    }

    fn commit_intent(&self, key: &str, ticket: u64, result: GenerationResult<GenerationOutput>) {
        let result = match result {
            Ok(output) => {
                let response = output.into_inner();
                if response.trim().is_empty() {
                    Ok(NO_INTENT_RESPONSE.to_string())
                } else {
                    Ok(response)
                }
            }
            Err(e) => {
                warn!(%key, error = %e, "intent failed");
                Err(e.to_string())
            }
        };

        match self.inner.in_flight.entry(key.to_string()) {
            Entry::Occupied(flight) if flight.get().ticket == ticket => {
                if self.inner.calls.contains_key(key) {
                    self.inner.intents.finish(key, result);
                }
                flight.remove();
            }
            _ => debug!(%key, "discarding superseded intent result"),
        }
    }
}
