pub mod error;
pub mod identity;
pub mod ledger;
pub mod position;
pub mod quote;
