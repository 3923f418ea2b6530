//! Domain models: investments, payout events, owner accounts, engine events

pub mod account;
pub mod event;
pub mod investment;
pub mod payout;

pub use account::Account;
pub use event::{EngineEvent, EventLog};
pub use investment::{Investment, InvestmentError, InvestmentStatus};
pub use payout::PayoutEvent;
