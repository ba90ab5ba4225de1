//! Plate Lookup
//!
//! Find-or-create over the live plate collection. A lookup streams the
//! plate as a `Feed`: `Loading` first, then an `Update` each time the
//! matched plate changes, until the lookup is released or replaced.
//!
//! ## States
//! `Idle -> Searching -> Found`, or `Searching -> Creating -> Found` when the
//! first snapshot has no match. While `Creating`, further misses are ignored
//! so a plate is created at most once per lookup.

use std::sync::Arc;
use std::time::Duration;

use kernel::signal::Feed;
use platform::connectivity::Connectivity;
use tokio::sync::{mpsc, watch};

use crate::application::listeners::{Activation, ListenerKind};
use crate::application::session::{SessionContext, StateCell};
use crate::domain::entities::{Plate, PlateCollection};
use crate::domain::remote::RemoteDataPort;
use crate::domain::value_objects::PlateId;
use crate::error::{ReputationError, bounded};

/// Receiver side of a plate lookup
pub type PlateFeed = mpsc::Receiver<Feed<Plate>>;

/// Lookup state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupState {
    Idle,
    Searching,
    Creating,
    Found,
}

/// Plate lookup service
pub struct PlateLookupService<R, C>
where
    R: RemoteDataPort,
    C: Connectivity,
{
    context: Arc<SessionContext<R>>,
    connectivity: Arc<C>,
    state: Arc<watch::Sender<LookupState>>,
}

impl<R, C> PlateLookupService<R, C>
where
    R: RemoteDataPort + Sync + 'static,
    C: Connectivity + Sync + 'static,
{
    pub(crate) fn new(context: Arc<SessionContext<R>>, connectivity: Arc<C>) -> Self {
        let (state, _) = watch::channel(LookupState::Idle);
        Self {
            context,
            connectivity,
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> LookupState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn watch_state(&self) -> watch::Receiver<LookupState> {
        self.state.subscribe()
    }

    /// Resolve a plate by natural key, creating it if absent
    ///
    /// A previous lookup is released first; its feed closes.
    pub async fn find_or_create(&self, prefix: &str, number: &str) -> PlateFeed {
        let (tx, rx) = mpsc::channel(self.context.config.channel_capacity());
        // rx is held here, so the first two sends cannot block
        let _ = tx.send(Feed::Loading).await;

        let id = match PlateId::parse(prefix, number) {
            Ok(id) => id,
            Err(e) => {
                emit_error(&tx, e).await;
                return rx;
            }
        };

        if !self.connectivity.is_online().await {
            emit_error(&tx, ReputationError::Network("device is offline".into())).await;
            return rx;
        }

        self.release().await;
        let epoch = self.context.state.plate_epoch().await;
        self.state.send_replace(LookupState::Searching);

        let lookup = Lookup {
            remote: Arc::clone(&self.context.remote),
            session: self.context.state.clone(),
            state: Arc::clone(&self.state),
            timeout: self.context.config.operation_timeout,
            id: id.clone(),
            epoch,
            feed: tx.clone(),
        };
        match self
            .context
            .listeners
            .activate_plate(move |snapshots| lookup.run(snapshots))
            .await
        {
            Ok(Activation::Activated) => {
                tracing::info!(plate = %id, "Plate lookup started");
            }
            Ok(Activation::AlreadyActive) => {
                self.state.send_replace(LookupState::Idle);
                emit_error(
                    &tx,
                    ReputationError::Internal("another plate lookup is running".into()),
                )
                .await;
            }
            Err(e) => {
                self.state.send_replace(LookupState::Idle);
                emit_error(&tx, e).await;
            }
        }

        rx
    }

    /// Stop watching the current plate and unbind it from the session
    pub async fn release(&self) {
        if self.context.listeners.deactivate(ListenerKind::Plate).await {
            tracing::debug!("Previous plate lookup released");
        }
        self.context.state.unbind_plate().await;
        self.state.send_replace(LookupState::Idle);
    }

    pub(crate) fn reset_state(&self) {
        self.state.send_replace(LookupState::Idle);
    }
}

/// One running lookup
struct Lookup<R> {
    remote: Arc<R>,
    session: StateCell,
    state: Arc<watch::Sender<LookupState>>,
    timeout: Duration,
    id: PlateId,
    epoch: u64,
    feed: mpsc::Sender<Feed<Plate>>,
}

impl<R> Lookup<R>
where
    R: RemoteDataPort + Sync,
{
    async fn run(self, snapshots: mpsc::UnboundedReceiver<PlateCollection>) {
        self.follow(snapshots).await;
        // Ended without a release: the feed was dropped or the create failed
        if self.session.end_lookup(self.epoch).await {
            self.state.send_replace(LookupState::Idle);
            tracing::debug!(plate = %self.id, "Plate lookup ended");
        }
    }

    async fn follow(&self, mut snapshots: mpsc::UnboundedReceiver<PlateCollection>) {
        let mut last_sent: Option<Plate> = None;

        while let Some(collection) = snapshots.recv().await {
            let current = *self.state.borrow();
            match collection.find(&self.id) {
                Some((key, plate)) => {
                    if current != LookupState::Found {
                        if !self
                            .session
                            .bind_plate(self.epoch, key.clone(), self.id.clone())
                            .await
                        {
                            break;
                        }
                        self.state.send_replace(LookupState::Found);
                        tracing::info!(plate_key = %key, plate = %self.id, "Plate resolved");
                    }
                    if last_sent.as_ref() == Some(plate) {
                        continue;
                    }
                    if self.feed.send(Feed::Update(plate.clone())).await.is_err() {
                        break;
                    }
                    last_sent = Some(plate.clone());
                }
                None if current == LookupState::Searching => {
                    self.state.send_replace(LookupState::Creating);
                    if self.feed.send(Feed::Loading).await.is_err() {
                        break;
                    }
                    match bounded(self.timeout, self.remote.create_plate(&self.id)).await {
                        Ok(key) => {
                            tracing::info!(plate_key = %key, plate = %self.id, "Plate created");
                        }
                        Err(e) => {
                            self.state.send_replace(LookupState::Idle);
                            emit_error(&self.feed, e).await;
                            break;
                        }
                    }
                }
                None => {
                    tracing::debug!(plate = %self.id, state = ?current, "Plate not in snapshot");
                }
            }
        }
    }
}

async fn emit_error<T>(feed: &mpsc::Sender<Feed<T>>, err: ReputationError) {
    err.log();
    // The caller may have dropped the feed already
    let _ = feed.send(Feed::Error(err.into())).await;
}
