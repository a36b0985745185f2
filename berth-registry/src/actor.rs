//! Registry actor
//!
//! One task, running on the registry's own thread, owns the [`Ledger`] and
//! serves the inbound queue in FIFO order. Each request is applied and
//! persisted in full before the next one is dequeued.

use berth_core::{Container, ContainerId, Listing, Manifest, Nums, RegistryEvent, Result};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{Notify, mpsc, oneshot, watch};
use tracing::{debug, error, info, trace};

use crate::{Ledger, RegistryConfig, Store, TeardownHook};

/// Where the registry is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Thread spawned, nothing loaded yet
    Uninitialized,
    /// Reading the saved snapshot
    Loading,
    /// Serving requests
    Serving,
    /// Queue closed; no request will be served again
    Stopped,
}

/// Message on the inbound queue, carrying its private reply channel
#[derive(Debug)]
pub(crate) enum Request {
    Reserve {
        id: ContainerId,
        manifest: Manifest,
        respond_to: oneshot::Sender<Result<Container>>,
    },
    Teardown {
        id: ContainerId,
        respond_to: oneshot::Sender<bool>,
    },
    Get {
        id: ContainerId,
        respond_to: oneshot::Sender<Option<Container>>,
    },
    List {
        respond_to: oneshot::Sender<Listing>,
    },
    Nums {
        respond_to: oneshot::Sender<Nums>,
    },
}

pub(crate) struct RegistryActor {
    pub(crate) config: RegistryConfig,
    pub(crate) store: Store,
    pub(crate) hook: Arc<dyn TeardownHook>,
    pub(crate) events: Option<mpsc::Sender<RegistryEvent>>,
    pub(crate) requests: mpsc::Receiver<Request>,
    pub(crate) stop: Arc<Notify>,
    pub(crate) lifecycle: watch::Sender<Lifecycle>,
}

impl RegistryActor {
    /// Load, serve until stopped, then close the queue
    pub(crate) async fn run(self) {
        let Self {
            config,
            store,
            hook,
            events,
            mut requests,
            stop,
            lifecycle,
        } = self;

        lifecycle.send_replace(Lifecycle::Loading);
        let ledger = match Ledger::restore(&config, store.load()) {
            Ok(ledger) => ledger,
            Err(e) => {
                error!(error = %e, "Failed to restore registry state");
                close(&mut requests, &lifecycle);
                return;
            }
        };

        let nums = ledger.nums();
        info!(
            save_dir = %store.dir().display(),
            containers = nums.containers.used,
            free_slots = nums.containers.free,
            used_cpu_shares = nums.cpu_shares.used,
            used_memory = nums.memory.used,
            "Registry serving"
        );

        let mut state = Serving {
            ledger,
            store,
            hook,
            events,
        };
        lifecycle.send_replace(Lifecycle::Serving);

        loop {
            let request = tokio::select! {
                biased;
                () = stop.notified() => {
                    debug!("Stop signal received");
                    None
                }
                request = requests.recv() => {
                    if request.is_none() {
                        debug!("All registry handles dropped");
                    }
                    request
                }
            };

            let Some(request) = request else { break };
            state.handle(request).await;
        }

        close(&mut requests, &lifecycle);
    }

    /// Give up without serving, e.g. when no runtime could be built
    pub(crate) fn abandon(mut self) {
        close(&mut self.requests, &self.lifecycle);
    }
}

fn close(requests: &mut mpsc::Receiver<Request>, lifecycle: &watch::Sender<Lifecycle>) {
    requests.close();

    // Dropping a queued request drops its reply sender; the caller sees
    // the registry as stopped.
    let mut abandoned = 0usize;
    while let Ok(request) = requests.try_recv() {
        drop(request);
        abandoned += 1;
    }

    lifecycle.send_replace(Lifecycle::Stopped);
    info!(abandoned, "Registry stopped");
}

/// State owned by the serving loop
struct Serving {
    ledger: Ledger,
    store: Store,
    hook: Arc<dyn TeardownHook>,
    events: Option<mpsc::Sender<RegistryEvent>>,
}

impl Serving {
    async fn handle(&mut self, request: Request) {
        match request {
            Request::Reserve {
                id,
                manifest,
                respond_to,
            } => {
                let result = self.reserve(id, manifest);
                reply(respond_to, result);
            }
            Request::Teardown { id, respond_to } => {
                let removed = self.teardown(&id).await;
                reply(respond_to, removed);
            }
            Request::Get { id, respond_to } => {
                reply(respond_to, self.ledger.get(&id).cloned());
            }
            Request::List { respond_to } => {
                reply(respond_to, self.ledger.listing());
            }
            Request::Nums { respond_to } => {
                reply(respond_to, self.ledger.nums());
            }
        }
    }

    fn reserve(&mut self, id: ContainerId, manifest: Manifest) -> Result<Container> {
        match self.ledger.reserve(id.clone(), manifest) {
            Ok(container) => {
                self.persist();
                self.emit(RegistryEvent::Reserved {
                    id,
                    slot: self.ledger.slot_of(&container).unwrap_or_default(),
                    primary_port: container.primary_port,
                    cpu_shares: container.manifest.cpu_shares,
                    memory_limit: container.manifest.memory_limit,
                    timestamp: SystemTime::now(),
                });
                Ok(container)
            }
            Err(e) => {
                self.emit(RegistryEvent::Rejected {
                    id,
                    reason: e.to_string(),
                    timestamp: SystemTime::now(),
                });
                Err(e)
            }
        }
    }

    async fn teardown(&mut self, id: &ContainerId) -> bool {
        let Some(container) = self.ledger.get(id).cloned() else {
            debug!(container_id = %id, "Teardown of unknown container");
            return false;
        };

        if let Err(e) = self.hook.teardown(&container).await {
            self.emit(RegistryEvent::TeardownHookFailed {
                id: id.clone(),
                message: e.to_string(),
                timestamp: SystemTime::now(),
            });
        }

        let slot = self.ledger.slot_of(&container);
        self.ledger.release(id);
        self.persist();
        self.emit(RegistryEvent::TornDown {
            id: id.clone(),
            slot,
            timestamp: SystemTime::now(),
        });

        true
    }

    fn persist(&self) {
        if let Err(e) = self
            .store
            .save(self.ledger.containers(), self.ledger.free_slots())
        {
            self.emit(RegistryEvent::PersistFailed {
                message: e.to_string(),
                timestamp: SystemTime::now(),
            });
        }
    }

    fn emit(&self, event: RegistryEvent) {
        event.emit_trace();

        if let Some(tx) = &self.events {
            if let Err(e) = tx.try_send(event) {
                trace!(error = %e, "Event subscriber not keeping up");
            }
        }
    }
}

fn reply<T>(respond_to: oneshot::Sender<T>, value: T) {
    if respond_to.send(value).is_err() {
        trace!("Caller went away before the reply");
    }
}
