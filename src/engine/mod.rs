pub mod aggregator;
pub mod carry;
pub mod fees;
pub mod ledger_net;
pub mod matcher;
