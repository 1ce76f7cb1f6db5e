pub mod aggregator_api;
pub mod ledger_api;
pub mod objects;
pub mod project_api;
pub mod settlement_api;
