pub mod ledger;
pub mod postgres;

pub use ledger::Ledger;
pub use ledger::MemoryLedger;
pub use postgres::create_pool;
pub use postgres::PgLedger;
