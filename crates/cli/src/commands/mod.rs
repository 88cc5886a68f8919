pub mod chat;
pub mod gateway;
pub mod ledger;
pub mod onboard;
pub mod status;
