mod identity_store_memory;

pub use identity_store_memory::*;
