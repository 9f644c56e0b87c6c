//! Connection holder shared by both store managers.
//!
//! A [`ConnectionSlot`] owns the single live handle produced by a [`Connector`] and is
//! the only thing that replaces it. Handles are cloned out for each attempt so the
//! lock is never held across a query. Rebuild holds the write lock while it closes
//! the old handle and connects the new one, so callers never see two live handles
//! and never see an empty slot mid-rebuild.
//!
//! Every installed handle gets a new generation number. A rebuild requested by an
//! attempt that ran against an older generation is skipped: somebody already
//! replaced that handle, so concurrent failures collapse into one rebuild.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::RwLock;

use crate::error_handling::{StoreError, StoreKind};
use crate::storage::retry::{with_reconnect, RetryGuard};

/// Builds and tears down handles for one backing store.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Cheap-to-clone live handle (client, pool, ...).
    type Handle: Clone + Send + Sync + 'static;

    /// Which store this connector talks to.
    fn store(&self) -> StoreKind;

    /// Establishes a new handle from the stored parameters.
    async fn connect(&self) -> Result<Self::Handle, StoreError>;

    /// Releases a handle. Must not fail; problems are logged and swallowed.
    async fn disconnect(&self, handle: Self::Handle);
}

enum Phase<H> {
    Idle,
    Open(H),
    /// Old handle closed, replacement failed to connect.
    Broken,
    Closed,
}

struct SlotState<H> {
    phase: Phase<H>,
    generation: u64,
}

/// Why a rebuild was requested.
#[derive(Debug, Clone, Copy)]
enum Rebuild {
    /// `init()` or an explicit `reconnect()`: always rebuild, reopening a closed slot.
    Unconditional,
    /// Retry step after a transient failure seen on handle `generation`.
    After { generation: u64 },
}

pub struct ConnectionSlot<C: Connector> {
    connector: C,
    state: RwLock<SlotState<C::Handle>>,
}

impl<C: Connector> ConnectionSlot<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            state: RwLock::new(SlotState {
                phase: Phase::Idle,
                generation: 0,
            }),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn store(&self) -> StoreKind {
        self.connector.store()
    }

    /// Generation of the installed handle (0 before the first connect).
    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    pub async fn is_open(&self) -> bool {
        matches!(self.state.read().await.phase, Phase::Open(_))
    }

    /// Connects for the first time, or reconnects unconditionally.
    pub async fn open(&self) -> Result<(), StoreError> {
        self.rebuild(Rebuild::Unconditional).await
    }

    /// Clones the current handle out together with its generation.
    async fn checkout(&self) -> Result<(C::Handle, u64), StoreError> {
        let state = self.state.read().await;
        match &state.phase {
            Phase::Open(handle) => Ok((handle.clone(), state.generation)),
            Phase::Broken => Err(StoreError::Disconnected { store: self.store() }),
            Phase::Idle | Phase::Closed => Err(StoreError::NotConnected { store: self.store() }),
        }
    }

    async fn rebuild(&self, reason: Rebuild) -> Result<(), StoreError> {
        let mut state = self.state.write().await;

        match (&state.phase, reason) {
            (Phase::Idle | Phase::Closed, Rebuild::After { .. }) => {
                return Err(StoreError::NotConnected { store: self.store() });
            }
            (Phase::Open(_), Rebuild::After { generation }) if generation != state.generation => {
                debug!(
                    "{} handle already rebuilt (generation {} -> {}), reusing it",
                    self.store(),
                    generation,
                    state.generation
                );
                return Ok(());
            }
            _ => {}
        }

        // A failed connect only leaves the slot Broken if a handle was torn down;
        // Idle and Closed stay as they were so operations keep reporting NotConnected.
        let on_failure = match std::mem::replace(&mut state.phase, Phase::Broken) {
            Phase::Open(old) => {
                debug!(
                    "Closing {} handle generation {}",
                    self.store(),
                    state.generation
                );
                self.connector.disconnect(old).await;
                Phase::Broken
            }
            Phase::Broken => Phase::Broken,
            Phase::Idle => Phase::Idle,
            Phase::Closed => Phase::Closed,
        };

        match self.connector.connect().await {
            Ok(handle) => {
                state.generation += 1;
                state.phase = Phase::Open(handle);
                info!(
                    "{} connection established (generation {})",
                    self.store(),
                    state.generation
                );
                Ok(())
            }
            Err(e) => {
                warn!("{} connection failed: {}", self.store(), e);
                state.phase = on_failure;
                Err(e)
            }
        }
    }

    /// Releases the current handle. Safe to call repeatedly or before `open()`.
    pub async fn close(&self) {
        let mut state = self.state.write().await;
        if let Phase::Open(old) = std::mem::replace(&mut state.phase, Phase::Closed) {
            self.connector.disconnect(old).await;
            info!("{} connection closed", self.store());
        }
    }

    /// Runs `op` against the current handle under the reconnect-and-retry protocol.
    pub async fn run<T, Op, Fut>(
        &self,
        guard: RetryGuard<'_>,
        is_transient: fn(&StoreError) -> bool,
        op: Op,
    ) -> Result<T, StoreError>
    where
        Op: Fn(C::Handle) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let seen = &AtomicU64::new(0);
        let op = &op;
        with_reconnect(
            guard,
            is_transient,
            move || async move {
                let (handle, generation) = self.checkout().await?;
                seen.store(generation, Ordering::SeqCst);
                op(handle).await
            },
            move || async move {
                self.rebuild(Rebuild::After {
                    generation: seen.load(Ordering::SeqCst),
                })
                .await
            },
        )
        .await
    }
}
