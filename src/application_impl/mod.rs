mod auth_gate_impl;
mod auth_service_impl;
mod credential_hasher_argon2;
mod session_rotation;
mod token_codec_jwt;

pub use auth_gate_impl::*;
pub use auth_service_impl::*;
pub use credential_hasher_argon2::*;
pub use session_rotation::RotationPolicy;
pub use token_codec_jwt::*;
