use std::{future::Future, pin::Pin};

use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};

use crate::{EngineError, ResultEngine, RowStore, SqlRows};

mod entries;
mod users;

/// Future returned by a unit of work run through [`Engine::with_tx`].
pub type TxFuture<'c, T> = Pin<Box<dyn Future<Output = ResultEngine<T>> + Send + 'c>>;

/// The ledger engine.
///
/// Every operation runs in its own datastore transaction through
/// [`Engine::with_tx`]. The engine holds no state besides its collaborators,
/// so it can be shared between tasks behind an `Arc`.
#[derive(Debug)]
pub struct Engine<R = SqlRows> {
    database: DatabaseConnection,
    rows: R,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }
}

impl<R: RowStore> Engine<R> {
    /// The row primitives the engine is built on.
    pub fn rows(&self) -> &R {
        &self.rows
    }

    /// Run `work` inside one datastore transaction.
    ///
    /// Commits when `work` succeeds and rolls back when it fails. A failed
    /// commit is reported as [`EngineError::Commit`]; a failed rollback as
    /// [`EngineError::Rollback`], which keeps the error returned by `work`.
    ///
    /// Dropping the returned future before it completes drops the open
    /// transaction, which rolls it back. Commit is only attempted once `work`
    /// has finished.
    pub async fn with_tx<T, F>(&self, work: F) -> ResultEngine<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c Self, &'c DatabaseTransaction) -> TxFuture<'c, T> + Send,
    {
        let db_tx = self.database.begin().await?;
        let outcome = work(self, &db_tx).await;

        match outcome {
            Ok(value) => {
                if let Err(err) = db_tx.commit().await {
                    tracing::error!("transaction commit failed: {err}");
                    return Err(EngineError::Commit(err));
                }
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = db_tx.rollback().await {
                    tracing::error!("transaction rollback failed: {rollback} (after: {err})");
                    return Err(EngineError::Rollback {
                        cause: Box::new(err),
                        rollback,
                    });
                }
                tracing::warn!("transaction rolled back: {err}");
                Err(err)
            }
        }
    }
}

/// The builder for `Engine`
pub struct EngineBuilder<R = SqlRows> {
    database: Option<DatabaseConnection>,
    rows: R,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            database: None,
            rows: SqlRows,
        }
    }
}

impl<R: RowStore> EngineBuilder<R> {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> Self {
        self.database = Some(db);
        self
    }

    /// Replace the row primitives, e.g. to wrap them with instrumentation.
    pub fn rows<S: RowStore>(self, rows: S) -> EngineBuilder<S> {
        EngineBuilder {
            database: self.database,
            rows,
        }
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine<R>> {
        let database = self.database.ok_or(EngineError::MissingDatabase)?;
        database.ping().await?;
        Ok(Engine {
            database,
            rows: self.rows,
        })
    }
}
