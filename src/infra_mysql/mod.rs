mod identity_store_mysql;

pub use identity_store_mysql::*;
