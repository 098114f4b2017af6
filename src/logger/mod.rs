//! Process-wide tracing setup. The filter starts from `RUST_LOG` and is
//! swapped for `log.filter` once settings are loaded.
//! Run `bin/logger_demo.rs` to see both phases; it is checked by hand.

mod logger;
pub use logger::*;

pub use tracing::{debug, error, info, trace, warn};
