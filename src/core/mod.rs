pub mod bank;
pub mod ids;
pub mod ledger;
pub mod metrics;
pub mod money;
pub mod period;
pub mod settlement;
