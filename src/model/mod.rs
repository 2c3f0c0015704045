//! Types that represent the core data model, such as `TransactionRecord` and `Amount`.
mod a1;
mod amount;
mod category;
mod transaction;

pub use a1::A1Range;
pub use amount::{Amount, AmountError};
pub use category::{CategoryMap, Resolved, DEFAULT_SENTINEL};
pub use transaction::{header, is_header, Column, TransactionRecord, ValueKey, COLUMNS};
