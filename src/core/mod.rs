mod account;
mod txn;

pub use account::{AccountMap, AccountMapping};
pub use txn::{Account, LedgerEntry, Posting, Status};
