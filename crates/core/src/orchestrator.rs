use crate::hub::{ListUpdate, MetadataUpdate, NotificationHub, Subscription};
use crate::models::{AggregateState, IntentKind, SearchPage, SearchPhase, SearchSettings};
use crate::request::{RequestBuilder, SearchDescriptor};
use crate::error::Result;
use crate::traits::{RecordDecoder, SearchTransport};
use crate::{SearchFailure, SearchIntent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Applied,
    Failed(SearchFailure),
    /// A later dispatch (or `clear`) took over before this response arrived;
    /// nothing was applied.
    Superseded,
}

/// Sole owner and writer of the aggregate result set.
///
/// Two monotonic counters, both advanced under the state lock, decide whether
/// a response may still be applied:
///
/// - `sequence` moves on every dispatch. A fresh response is applied only if
///   nothing was dispatched after it.
/// - `generation` moves on fresh dispatches and `clear`. A load-more response
///   is applied as long as its session is still current, so concurrent
///   load-mores all land.
///
/// Without these checks a slow page-0 response landing after a fast page-1
/// response would overwrite the accumulated list with stale data.
pub struct SearchCoordinator<T, D>
where
    D: RecordDecoder,
{
    inner: Arc<Shared<T, D>>,
}

struct Shared<T, D>
where
    D: RecordDecoder,
{
    transport: T,
    decoder: D,
    builder: RequestBuilder,
    hub: NotificationHub<D::Record>,
    session: Mutex<Session<D::Record>>,
    sequence: AtomicU64,
    generation: AtomicU64,
}

struct Session<R> {
    aggregate: AggregateState<R>,
    last_intent: Option<SearchIntent>,
    in_flight: usize,
}

struct Ticket {
    sequence: u64,
    generation: u64,
    kind: IntentKind,
    descriptor: SearchDescriptor,
}

impl<T, D> Clone for SearchCoordinator<T, D>
where
    D: RecordDecoder,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, D> SearchCoordinator<T, D>
where
    T: SearchTransport + Send + Sync + 'static,
    D: RecordDecoder + Send + Sync + 'static,
    D::Record: Clone + Send + Sync + 'static,
{
    pub fn new(transport: T, decoder: D) -> Self {
        Self::with_settings(transport, decoder, SearchSettings::default())
    }

    pub fn with_settings(transport: T, decoder: D, settings: SearchSettings) -> Self {
        Self {
            inner: Arc::new(Shared {
                transport,
                decoder,
                builder: RequestBuilder::new(settings.default_page_size),
                hub: NotificationHub::new(settings.channel_capacity),
                session: Mutex::new(Session {
                    aggregate: AggregateState::default(),
                    last_intent: None,
                    in_flight: 0,
                }),
                sequence: AtomicU64::new(0),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Starts a search and returns immediately.
    ///
    /// The state transition to `Loading` and the counter bumps happen before
    /// this returns, so a later fresh search always wins over anything
    /// dispatched earlier. The handle may be dropped; the outcome is
    /// observable via the hub.
    pub fn search(&self, intent: SearchIntent) -> JoinHandle<FetchOutcome> {
        let ticket = self.begin(&intent);
        let coordinator = self.clone();
        tokio::spawn(async move { coordinator.complete(ticket).await })
    }

    /// In-line variant of [`SearchCoordinator::search`]. The dispatch is
    /// registered when the future is first polled.
    pub async fn dispatch(&self, intent: SearchIntent) -> FetchOutcome {
        let ticket = self.begin(&intent);
        self.complete(ticket).await
    }

    /// Continues the current session with its next page, if there is one and
    /// nothing is loading.
    pub fn load_next_page(&self) -> Option<JoinHandle<FetchOutcome>> {
        let intent = {
            let session = self.lock_session();
            if session.aggregate.is_loading() {
                return None;
            }
            let next = session.aggregate.next_page_index()?;
            session.last_intent.as_ref()?.next_page(next)
        };
        Some(self.search(intent))
    }

    pub fn current_state(&self) -> AggregateState<D::Record> {
        self.lock_session().aggregate.clone()
    }

    pub fn last_intent(&self) -> Option<SearchIntent> {
        self.lock_session().last_intent.clone()
    }

    /// Drops all results and returns to `Idle` without fetching. Responses
    /// still in flight are discarded on arrival.
    pub fn clear(&self) {
        let mut session = self.lock_session();
        self.inner.sequence.fetch_add(1, Ordering::SeqCst);
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        session.aggregate = AggregateState::default();
        session.last_intent = None;
        session.in_flight = 0;
        self.inner.hub.emit_list(list_update(&session.aggregate));
    }

    pub fn hub(&self) -> &NotificationHub<D::Record> {
        &self.inner.hub
    }

    pub fn subscribe_list<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(ListUpdate<D::Record>) + Send + 'static,
    {
        self.inner.hub.subscribe_list(callback)
    }

    pub fn subscribe_page<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(SearchPage<D::Record>) + Send + 'static,
    {
        self.inner.hub.subscribe_page(callback)
    }

    pub fn subscribe_metadata<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(MetadataUpdate) + Send + 'static,
    {
        self.inner.hub.subscribe_metadata(callback)
    }

    pub fn list_receiver(&self) -> broadcast::Receiver<ListUpdate<D::Record>> {
        self.inner.hub.list_receiver()
    }

    fn begin(&self, intent: &SearchIntent) -> Ticket {
        let descriptor = self.inner.builder.build(intent);
        let mut session = self.lock_session();
        let sequence = self.inner.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = if intent.is_fresh() {
            session.aggregate.reset();
            session.in_flight = 0;
            self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1
        } else {
            self.inner.generation.load(Ordering::SeqCst)
        };
        session.in_flight += 1;
        session.aggregate.phase = SearchPhase::Loading;
        session.last_intent = Some(intent.clone());

        debug!(
            sequence,
            generation,
            page = descriptor.page,
            page_size = descriptor.page_size,
            fresh = intent.is_fresh(),
            "dispatching search"
        );
        self.inner.hub.emit_list(list_update(&session.aggregate));

        Ticket {
            sequence,
            generation,
            kind: intent.kind(),
            descriptor,
        }
    }

    async fn complete(&self, ticket: Ticket) -> FetchOutcome {
        let result = self.fetch_page(&ticket.descriptor).await;
        self.apply(ticket, result)
    }

    async fn fetch_page(&self, descriptor: &SearchDescriptor) -> Result<SearchPage<D::Record>> {
        let raw = self.inner.transport.fetch(descriptor).await?;
        let records = raw
            .hits
            .iter()
            .map(|hit| self.inner.decoder.decode(hit))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SearchPage::new(records, raw.page, raw.nb_hits, raw.nb_pages))
    }

    fn is_current(&self, ticket: &Ticket) -> bool {
        match ticket.kind {
            IntentKind::Fresh => self.inner.sequence.load(Ordering::SeqCst) == ticket.sequence,
            IntentKind::LoadMore => {
                self.inner.generation.load(Ordering::SeqCst) == ticket.generation
            }
        }
    }

    fn apply(&self, ticket: Ticket, result: Result<SearchPage<D::Record>>) -> FetchOutcome {
        let mut session = self.lock_session();
        if self.inner.generation.load(Ordering::SeqCst) == ticket.generation {
            session.in_flight = session.in_flight.saturating_sub(1);
        }
        if !self.is_current(&ticket) {
            info!(
                sequence = ticket.sequence,
                generation = ticket.generation,
                page = ticket.descriptor.page,
                "discarding response superseded by a newer search"
            );
            return FetchOutcome::Superseded;
        }

        let still_loading = session.in_flight > 0;
        let aggregate = &mut session.aggregate;
        match result {
            Ok(page) => {
                match ticket.kind {
                    IntentKind::Fresh => aggregate.records = page.records.clone(),
                    IntentKind::LoadMore => {
                        if aggregate.total_hits != page.total_hits
                            || aggregate.total_pages != page.total_pages
                        {
                            debug!(
                                previous_hits = aggregate.total_hits,
                                reported_hits = page.total_hits,
                                previous_pages = aggregate.total_pages,
                                reported_pages = page.total_pages,
                                "server totals changed mid-session"
                            );
                        }
                        aggregate.records.extend(page.records.iter().cloned());
                    }
                }
                aggregate.total_hits = page.total_hits;
                aggregate.total_pages = page.total_pages;
                aggregate.current_page = page.page_index;
                aggregate.phase = if still_loading {
                    SearchPhase::Loading
                } else {
                    SearchPhase::Loaded
                };

                debug!(
                    sequence = ticket.sequence,
                    page = page.page_index,
                    received = page.len(),
                    accumulated = aggregate.records.len(),
                    "applied search page"
                );

                let metadata = MetadataUpdate {
                    total_hits: aggregate.total_hits,
                    total_pages: aggregate.total_pages,
                };
                self.inner.hub.emit_list(list_update(aggregate));
                self.inner.hub.emit_page(page);
                self.inner.hub.emit_metadata(metadata);
                FetchOutcome::Applied
            }
            Err(failure) => {
                warn!(
                    sequence = ticket.sequence,
                    page = ticket.descriptor.page,
                    retryable = failure.is_retryable(),
                    error = %failure,
                    "search failed"
                );
                if ticket.kind == IntentKind::Fresh {
                    aggregate.reset();
                }
                aggregate.phase = SearchPhase::Error(failure.clone());
                self.inner.hub.emit_list(list_update(aggregate));
                FetchOutcome::Failed(failure)
            }
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Session<D::Record>> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn list_update<R: Clone>(aggregate: &AggregateState<R>) -> ListUpdate<R> {
    ListUpdate {
        records: aggregate.records.clone(),
        phase: aggregate.phase.clone(),
    }
}
