// Block synchronization for the chain mirror node

pub mod events;
pub mod queue;
pub mod reconcile;
pub mod syncer;

pub use events::{SyncEvent, TaskOutcome};
pub use queue::{Priority, QueuedTask, Task, TaskQueue};
pub use reconcile::ReconciliationReport;
pub use syncer::{SyncError, Syncer};
