//! Teardown hook for the container-execution side
//!
//! The registry only keeps bookkeeping. Stopping the real container
//! process is delegated to a [`TeardownHook`], called once per successful
//! teardown before the container's slot and resources are released.

use async_trait::async_trait;
use berth_core::{Container, ContainerId, Error, Result};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Action run against a container when it is torn down
///
/// An error is logged by the registry and otherwise ignored: the slot and
/// resources are released regardless.
///
/// # Thread Safety
/// Implementations must be `Send + Sync`; the hook is called from the
/// registry thread.
#[async_trait]
pub trait TeardownHook: Send + Sync {
    /// Stop whatever is running for `container`
    ///
    /// # Errors
    /// Returns error if the container could not be stopped cleanly
    async fn teardown(&self, container: &Container) -> Result<()>;
}

/// Hook that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTeardown;

#[async_trait]
impl TeardownHook for NoopTeardown {
    async fn teardown(&self, container: &Container) -> Result<()> {
        tracing::trace!(container_id = %container.id, "No teardown action configured");
        Ok(())
    }
}

/// Recording hook for testing
///
/// # Example
/// ```
/// use berth_registry::{MockTeardown, TeardownHook};
/// use berth_core::{Container, ContainerId, Manifest};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let hook = MockTeardown::new();
/// let container = Container {
///     id: ContainerId::new("web").unwrap(),
///     host: "localhost".to_string(),
///     primary_port: 61000,
///     ssh_port: 61100,
///     secondary_ports: Vec::new(),
///     manifest: Manifest::new(1, 64),
/// };
///
/// hook.teardown(&container).await.unwrap();
/// assert!(hook.was_torn_down(&container.id).await);
/// # });
/// ```
#[derive(Clone, Default)]
pub struct MockTeardown {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    torn_down: Vec<ContainerId>,
    fail: bool,
    call_count: usize,
}

impl MockTeardown {
    /// Create a hook that always succeeds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a hook that records the call and then fails
    #[must_use]
    pub fn failing() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                fail: true,
                ..MockState::default()
            })),
        }
    }

    /// Number of hook calls made
    pub async fn call_count(&self) -> usize {
        self.state.lock().await.call_count
    }

    /// Check if the hook ran for `id`
    pub async fn was_torn_down(&self, id: &ContainerId) -> bool {
        self.state.lock().await.torn_down.contains(id)
    }

    /// IDs the hook ran for, in call order
    pub async fn torn_down(&self) -> Vec<ContainerId> {
        self.state.lock().await.torn_down.clone()
    }
}

impl std::fmt::Debug for MockTeardown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTeardown").finish_non_exhaustive()
    }
}

#[async_trait]
impl TeardownHook for MockTeardown {
    async fn teardown(&self, container: &Container) -> Result<()> {
        let mut state = self.state.lock().await;
        state.call_count += 1;
        state.torn_down.push(container.id.clone());

        tracing::debug!(
            container_id = %container.id,
            calls = state.call_count,
            "Mock: Teardown"
        );

        if state.fail {
            return Err(Error::Teardown {
                id: container.id.to_string(),
                message: "mock failure".to_string(),
            });
        }

        Ok(())
    }
}
