mod error;
mod handler;
mod router;

pub use error::{ApiErrorCode, recover_error};
pub use handler::{ACCESS_TOKEN_HEADER, REFRESH_TOKEN_HEADER};
pub use router::routes;
