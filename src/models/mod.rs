//! Data models

pub mod user;
pub mod risk;
pub mod transaction;
pub mod ledger;

pub use user::*;
pub use risk::*;
pub use transaction::*;
pub use ledger::*;
