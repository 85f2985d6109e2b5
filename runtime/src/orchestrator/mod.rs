//! Task orchestration: the task/group registry and the automation listener.

pub mod group;
pub mod manager;

pub use group::TaskGroup;
pub use manager::Manager;

use tokio_util::task::TaskTracker;

/// Something the manager can start and stop.
pub trait TaskRunner: Clone + Send + Sync + 'static {
    /// Stable identifier, unique within a manager.
    fn id(&self) -> &str;

    /// Spawn the task's loop on `tracker`. Returns `false` if it was
    /// already running.
    fn start(&self, tracker: &TaskTracker) -> bool;

    /// Ask the loop to stop. Returns immediately.
    fn stop(&self);

    fn is_running(&self) -> bool;
}
