//! engine
//!
//! Serializes repository operations and reports on them.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator ──► ListenerRegistry (AboutToStart)
//!      │
//!      └──► Scheduler ──► RepositoryHandle ──► git
//!                │
//!                └──► state recompute ──► ListenerRegistry (Succeeded/Failed)
//! ```
//!
//! - [`scheduler`] - The single worker every mutation runs on
//! - [`handle`] - Ownership of the open working copy and its lock
//! - [`state`] - Repository state, derived afresh on every query
//! - [`listeners`] - Lifecycle events and their delivery
//! - [`orchestrator`] - Requests, tickets, simple operations and queries
//! - [`flows`] - Safe switch, stash apply/pop, pull, push, continue/abort
//!
//! # Invariants
//!
//! - No two mutations ever run at the same time
//! - Mutations run in the order they were requested
//! - Every `AboutToStart` is followed by exactly one terminal event
//! - Library errors are classified into [`OpError`] and reported through
//!   events and tickets; they are never raised on the caller's thread
//!
//! # Example
//!
//! ```no_run
//! use stagehand::engine::{NoCredentials, Orchestrator, OrchestratorSettings};
//!
//! let orchestrator = Orchestrator::new(OrchestratorSettings::default())?;
//! orchestrator.subscribe_fn(|event| {
//!     println!("{}: {:?}", event.descriptor(), event.state());
//!     Ok(())
//! });
//!
//! orchestrator.open_working_copy(".").wait()?;
//! let pulled = orchestrator.pull(None, &NoCredentials).wait();
//! orchestrator.shutdown();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod descriptor;
pub mod error;
pub mod flows;
pub mod handle;
pub mod listeners;
pub mod orchestrator;
pub mod scheduler;
pub mod state;

pub use descriptor::{
    OperationDescriptor, OperationKind, OperationOutcome, OperationPayload, PullOutcome,
    PullSummary, Resolution, StashRef,
};
pub use error::{OpError, SchedulerError};
pub use flows::{CredentialProvider, NoCredentials, SwitchDecision, SwitchPrompt, SwitchTarget};
pub use handle::RepositoryHandle;
pub use listeners::{Listener, ListenerId, ListenerRegistry, OperationEvent};
pub use orchestrator::{OperationTicket, Orchestrator, OrchestratorSettings};
pub use scheduler::{Scheduler, ShutdownMode, TaskHandle};
pub use state::{RepositoryState, RepositoryStatus, StateFlag};
