//! Budget ledger engine.
//!
//! Users own budget entries and carry a denormalized `total_expenses`
//! aggregate. The [`Engine`] mutates an entry and its owner's aggregate in a
//! single datastore transaction, so that at every committed state the
//! aggregate equals the sum of the owner's entry amounts.
//!
//! Concurrent operations on the same owner are serialized by locking the
//! owner's row first, before any entry is touched. The datastore is the only
//! serialization point: the engine holds no in-process locks or caches.

pub use entries::{Category, Entry, EntryDraft};
pub use error::{EngineError, ErrorKind};
pub use ops::{Engine, EngineBuilder, TxFuture};
pub use rows::{RowStore, SqlRows};
pub use users::{NewUser, User, UserIdentity};

pub mod entries;
pub mod users;

mod classify;
mod error;
mod ops;
mod rows;

pub type ResultEngine<T> = Result<T, EngineError>;

fn normalize_required_name(value: &str, label: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidName(format!(
            "{label} name must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}
