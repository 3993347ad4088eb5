//! Facades that compose [`crate::runner::ContainerRunner`] with
//! [`crate::path_guard::PathGuard`] and
//! [`crate::script`] into the operations the transport adapter calls
//! directly (spec §4.5, §4.6).

pub mod execution;
pub mod fileops;

pub use execution::ExecutionFacade;
pub use fileops::FileOpsFacade;
