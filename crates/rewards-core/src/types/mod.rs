//! # Type Definitions
//!
//! Ledger, account, position and event types threaded through the replay.

pub mod account;
pub mod event;
pub mod ledger;
pub mod position;

pub use account::*;
pub use event::*;
pub use ledger::*;
pub use position::*;
