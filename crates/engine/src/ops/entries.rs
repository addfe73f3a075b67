use chrono::NaiveDate;

use crate::{Entry, EngineError, EntryDraft, ResultEngine, RowStore, User};

use super::Engine;

fn apply_delta(user: &User, delta: i64) -> ResultEngine<i64> {
    user.total_expenses.checked_add(delta).ok_or_else(|| {
        EngineError::InvalidAmount(format!(
            "total expenses of '{}' would overflow",
            user.username
        ))
    })
}

impl<R: RowStore> Engine<R> {
    /// Adds an entry and raises the owner's total expenses by its amount.
    ///
    /// The owner row is locked before the entry is written.
    pub async fn add_entry(
        &self,
        owner: &str,
        name: &str,
        due_date: NaiveDate,
        amount: i64,
        category: Option<&str>,
    ) -> ResultEngine<(Entry, User)> {
        let draft = EntryDraft::new(name, due_date, amount, category)?;
        let owner = owner.to_string();
        let result = self
            .with_tx(move |engine, db_tx| {
                Box::pin(async move {
                    let user = engine.rows.find_user_for_update(db_tx, &owner).await?;
                    let entry = engine.rows.insert_entry(db_tx, &owner, &draft).await?;
                    let total = apply_delta(&user, entry.amount)?;
                    let user = engine.rows.set_total_expenses(db_tx, &owner, total).await?;
                    Ok((entry, user))
                })
            })
            .await?;
        tracing::debug!("added entry {} for '{}'", result.0.id, result.1.username);
        Ok(result)
    }

    /// Overwrites an entry and moves the owner's total expenses by the
    /// difference between the new and the stored amount.
    ///
    /// An entry owned by someone else is reported as not found.
    pub async fn update_entry(
        &self,
        owner: &str,
        id: i32,
        name: &str,
        due_date: NaiveDate,
        amount: i64,
        category: Option<&str>,
    ) -> ResultEngine<(Entry, User)> {
        let draft = EntryDraft::new(name, due_date, amount, category)?;
        let owner = owner.to_string();
        let result = self
            .with_tx(move |engine, db_tx| {
                Box::pin(async move {
                    let user = engine.rows.find_user_for_update(db_tx, &owner).await?;
                    let stored = engine
                        .rows
                        .find_entry_for_update(db_tx, &owner, id)
                        .await?;

                    let delta = draft.amount.checked_sub(stored.amount).ok_or_else(|| {
                        EngineError::InvalidAmount(format!("amount change of entry {id} overflows"))
                    })?;
                    let total = apply_delta(&user, delta)?;
                    let user = engine.rows.set_total_expenses(db_tx, &owner, total).await?;

                    let entry = engine.rows.update_entry(db_tx, &owner, id, &draft).await?;
                    Ok((entry, user))
                })
            })
            .await?;
        tracing::debug!("updated entry {} for '{}'", result.0.id, result.1.username);
        Ok(result)
    }

    /// Deletes an entry and lowers the owner's total expenses by its amount.
    pub async fn delete_entry(&self, owner: &str, id: i32) -> ResultEngine<User> {
        let owner = owner.to_string();
        let user = self
            .with_tx(move |engine, db_tx| {
                Box::pin(async move {
                    let user = engine.rows.find_user_for_update(db_tx, &owner).await?;
                    let entry = engine.rows.find_entry(db_tx, &owner, id).await?;

                    engine.rows.delete_entry(db_tx, &owner, id).await?;

                    let delta = entry.amount.checked_neg().ok_or_else(|| {
                        EngineError::InvalidAmount(format!("amount of entry {id} overflows"))
                    })?;
                    let total = apply_delta(&user, delta)?;
                    engine.rows.set_total_expenses(db_tx, &owner, total).await
                })
            })
            .await?;
        tracing::debug!("deleted entry {id} of '{}'", user.username);
        Ok(user)
    }

    /// Return an entry of `owner`.
    pub async fn entry(&self, owner: &str, id: i32) -> ResultEngine<Entry> {
        let owner = owner.to_string();
        self.with_tx(move |engine, db_tx| {
            Box::pin(async move { engine.rows.find_entry(db_tx, &owner, id).await })
        })
        .await
    }

    /// Lists the entries of `owner`, by due date.
    pub async fn entries(&self, owner: &str) -> ResultEngine<Vec<Entry>> {
        let owner = owner.to_string();
        self.with_tx(move |engine, db_tx| {
            Box::pin(async move { engine.rows.list_entries(db_tx, &owner).await })
        })
        .await
    }

    /// Lists the distinct categories used by `owner`. Entries without a
    /// category are skipped.
    pub async fn categories(&self, owner: &str) -> ResultEngine<Vec<String>> {
        let owner = owner.to_string();
        self.with_tx(move |engine, db_tx| {
            Box::pin(async move { engine.rows.list_categories(db_tx, &owner).await })
        })
        .await
    }
}
