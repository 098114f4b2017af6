mod identity;
mod token;
mod user;

pub use identity::*;
pub use token::*;
pub use user::*;
