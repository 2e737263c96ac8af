pub mod agents;
pub mod apps;
pub mod config;
pub mod error;
pub mod http;
pub mod message;
pub mod model;
pub mod persona;
pub mod prompts;
pub mod routes;
pub mod services;
pub mod state;
pub mod tools;
