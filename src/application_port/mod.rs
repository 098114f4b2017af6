mod auth_gate;
mod auth_service;

pub use auth_gate::*;
pub use auth_service::*;
