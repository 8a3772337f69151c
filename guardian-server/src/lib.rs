pub mod api;
pub mod config;
pub mod coordinator;
pub mod scheduler;
pub mod store;

pub use coordinator::Coordinator;
pub use scheduler::run_scheduler;

// Shared by every handler; cloned per request.
#[derive(Clone)]
pub struct AppState<S> {
    pub coordinator: Coordinator<S>,
}
