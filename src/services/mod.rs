pub mod eval_store;
pub mod metrics_manager;
pub mod runner;
pub mod session_manager;
