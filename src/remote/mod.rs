mod ledger;
mod scorer;

pub use ledger::RemoteLedger;
pub use scorer::RemoteScorer;
