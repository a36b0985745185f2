//! Client facade
//!
//! [`RegistryHandle`] is the only way to reach registry state. Every call
//! allocates a private one-shot reply channel, queues its request, and
//! waits for the paired reply. Nothing is shared with the caller except
//! value copies.

use berth_core::{Container, ContainerId, Error, Listing, Manifest, Nums, RegistryEvent, Result};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{Notify, mpsc, oneshot, watch};
use tracing::{debug, error};

use crate::actor::{Lifecycle, RegistryActor, Request};
use crate::{NoopTeardown, RegistryConfig, Store, TeardownHook};

/// Name of the registry's OS thread
const THREAD_NAME: &str = "berth-registry";

/// Configures and starts a registry
pub struct RegistryBuilder {
    config: RegistryConfig,
    hook: Arc<dyn TeardownHook>,
    events: Option<mpsc::Sender<RegistryEvent>>,
}

impl RegistryBuilder {
    /// Start from a configuration, with a no-op teardown hook
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            hook: Arc::new(NoopTeardown),
            events: None,
        }
    }

    /// Run `hook` against every container that is torn down
    #[must_use]
    pub fn with_hook(mut self, hook: impl TeardownHook + 'static) -> Self {
        self.hook = Arc::new(hook);
        self
    }

    /// Add event channel for emitting events
    ///
    /// Events are offered without waiting; a full channel drops them.
    #[must_use]
    pub fn with_events(mut self, tx: mpsc::Sender<RegistryEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Validate the configuration, open the save directory and start the
    /// registry thread
    ///
    /// # Errors
    /// Returns error if the configuration is invalid, the save directory
    /// cannot be created, or the thread cannot be spawned. The registry
    /// never starts in that case.
    pub fn spawn(self) -> Result<Registry> {
        let Self {
            config,
            hook,
            events,
        } = self;

        config.validate()?;
        let store = Store::open(&config.save_dir)?;

        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let stop = Arc::new(Notify::new());
        let (lifecycle_tx, lifecycle_rx) = watch::channel(Lifecycle::Uninitialized);

        let actor = RegistryActor {
            config: config.clone(),
            store,
            hook,
            events,
            requests: rx,
            stop: Arc::clone(&stop),
            lifecycle: lifecycle_tx,
        };

        let thread = std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime.block_on(actor.run()),
                    Err(e) => {
                        error!(error = %e, "Failed to build registry runtime");
                        actor.abandon();
                    }
                }
            })?;

        debug!(
            num_containers = config.num_containers,
            min_port = config.min_port,
            "Registry thread started"
        );

        Ok(Registry {
            config,
            handle: RegistryHandle {
                requests: tx,
                stop,
                lifecycle: lifecycle_rx,
            },
            thread,
        })
    }
}

impl std::fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A running registry and its thread
#[derive(Debug)]
pub struct Registry {
    config: RegistryConfig,
    handle: RegistryHandle,
    thread: JoinHandle<()>,
}

impl Registry {
    /// Start a registry with default options
    ///
    /// # Errors
    /// See [`RegistryBuilder::spawn`].
    pub fn spawn(config: RegistryConfig) -> Result<Self> {
        RegistryBuilder::new(config).spawn()
    }

    /// Start configuring a registry
    #[must_use]
    pub fn builder(config: RegistryConfig) -> RegistryBuilder {
        RegistryBuilder::new(config)
    }

    /// A new handle for callers
    #[must_use]
    pub fn handle(&self) -> RegistryHandle {
        self.handle.clone()
    }

    /// Configuration the registry was started with
    #[must_use]
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Stop the registry and wait for its thread to exit
    ///
    /// Blocks the calling thread; use [`Registry::shutdown_async`] from
    /// async code.
    ///
    /// # Errors
    /// Returns [`Error::RegistryPanicked`] if the registry thread panicked.
    pub fn shutdown(self) -> Result<()> {
        self.handle.stop();
        self.thread.join().map_err(|_| Error::RegistryPanicked)
    }

    /// Stop the registry and wait for its thread without blocking the runtime
    ///
    /// # Errors
    /// Returns [`Error::RegistryPanicked`] if the registry thread panicked.
    pub async fn shutdown_async(self) -> Result<()> {
        tokio::task::spawn_blocking(move || self.shutdown())
            .await
            .map_err(|_| Error::RegistryPanicked)?
    }
}

/// Cloneable caller-side handle
///
/// Each operation has an async form and a `_blocking` form. The blocking
/// forms park the calling OS thread and must not be used from inside an
/// async runtime.
///
/// Calls fail with [`Error::RegistryStopped`] once the registry has shut
/// down, including calls that were queued when it stopped.
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    requests: mpsc::Sender<Request>,
    stop: Arc<Notify>,
    lifecycle: watch::Receiver<Lifecycle>,
}

impl RegistryHandle {
    /// Reserve a slot, ports and resources for `id`
    ///
    /// # Errors
    /// Returns [`Error::CapacityExceeded`], [`Error::DuplicateId`],
    /// [`Error::InsufficientCpu`] or [`Error::InsufficientMemory`] if the
    /// request cannot be granted, or [`Error::RegistryStopped`].
    pub async fn reserve(&self, id: ContainerId, manifest: Manifest) -> Result<Container> {
        self.call(|respond_to| Request::Reserve {
            id,
            manifest,
            respond_to,
        })
        .await?
    }

    /// Tear down `id`, returning `false` if it is not active
    ///
    /// # Errors
    /// Returns [`Error::RegistryStopped`].
    pub async fn teardown(&self, id: ContainerId) -> Result<bool> {
        self.call(|respond_to| Request::Teardown { id, respond_to })
            .await
    }

    /// Copy of the container reserved under `id`
    ///
    /// # Errors
    /// Returns [`Error::RegistryStopped`].
    pub async fn get(&self, id: ContainerId) -> Result<Option<Container>> {
        self.call(|respond_to| Request::Get { id, respond_to }).await
    }

    /// Every active container and the primary ports still free
    ///
    /// # Errors
    /// Returns [`Error::RegistryStopped`].
    pub async fn list(&self) -> Result<Listing> {
        self.call(|respond_to| Request::List { respond_to }).await
    }

    /// Total / used / free for slots, CPU shares and memory
    ///
    /// # Errors
    /// Returns [`Error::RegistryStopped`].
    pub async fn nums(&self) -> Result<Nums> {
        self.call(|respond_to| Request::Nums { respond_to }).await
    }

    /// Blocking form of [`RegistryHandle::reserve`]
    ///
    /// # Errors
    /// See [`RegistryHandle::reserve`].
    pub fn reserve_blocking(&self, id: ContainerId, manifest: Manifest) -> Result<Container> {
        self.call_blocking(|respond_to| Request::Reserve {
            id,
            manifest,
            respond_to,
        })?
    }

    /// Blocking form of [`RegistryHandle::teardown`]
    ///
    /// # Errors
    /// Returns [`Error::RegistryStopped`].
    pub fn teardown_blocking(&self, id: ContainerId) -> Result<bool> {
        self.call_blocking(|respond_to| Request::Teardown { id, respond_to })
    }

    /// Blocking form of [`RegistryHandle::get`]
    ///
    /// # Errors
    /// Returns [`Error::RegistryStopped`].
    pub fn get_blocking(&self, id: ContainerId) -> Result<Option<Container>> {
        self.call_blocking(|respond_to| Request::Get { id, respond_to })
    }

    /// Blocking form of [`RegistryHandle::list`]
    ///
    /// # Errors
    /// Returns [`Error::RegistryStopped`].
    pub fn list_blocking(&self) -> Result<Listing> {
        self.call_blocking(|respond_to| Request::List { respond_to })
    }

    /// Blocking form of [`RegistryHandle::nums`]
    ///
    /// # Errors
    /// Returns [`Error::RegistryStopped`].
    pub fn nums_blocking(&self) -> Result<Nums> {
        self.call_blocking(|respond_to| Request::Nums { respond_to })
    }

    /// Current lifecycle state
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.borrow()
    }

    /// Raise the stop signal without waiting
    ///
    /// Requests already dequeued run to completion; queued ones fail with
    /// [`Error::RegistryStopped`].
    pub fn stop(&self) {
        self.stop.notify_one();
    }

    async fn call<T>(&self, request: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.requests.send(request(tx)).await?;
        Ok(rx.await?)
    }

    fn call_blocking<T>(
        &self,
        request: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.requests.blocking_send(request(tx))?;
        Ok(rx.blocking_recv()?)
    }
}
