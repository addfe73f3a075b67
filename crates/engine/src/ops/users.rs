use crate::{
    ResultEngine, RowStore, User,
    normalize_required_name,
    users::{NewUser, UserIdentity},
};

use super::Engine;

impl<R: RowStore> Engine<R> {
    /// Registers a user with an empty ledger.
    ///
    /// `hashed_password` is stored as given. A taken username or email is
    /// reported as [`EngineError::ExistingKey`](crate::EngineError::ExistingKey).
    pub async fn create_user(
        &self,
        username: &str,
        hashed_password: &str,
        full_name: &str,
        email: &str,
    ) -> ResultEngine<User> {
        let new_user = NewUser {
            username: normalize_required_name(username, "user")?,
            hashed_password: hashed_password.to_string(),
            full_name: full_name.trim().to_string(),
            email: email.trim().to_string(),
        };
        let user = self
            .with_tx(move |engine, db_tx| {
                Box::pin(async move { engine.rows.insert_user(db_tx, &new_user).await })
            })
            .await?;
        tracing::debug!("created user '{}'", user.username);
        Ok(user)
    }

    /// Return a user.
    pub async fn user(&self, username: &str) -> ResultEngine<User> {
        let username = username.to_string();
        self.with_tx(move |engine, db_tx| {
            Box::pin(async move { engine.rows.find_user(db_tx, &username).await })
        })
        .await
    }

    /// Lists users ordered by username.
    pub async fn users(&self, limit: u64, offset: u64) -> ResultEngine<Vec<User>> {
        self.with_tx(move |engine, db_tx| {
            Box::pin(async move { engine.rows.list_users(db_tx, limit, offset).await })
        })
        .await
    }

    /// Stores a new credential hash and stamps `password_changed_at`.
    pub async fn change_password_hash(
        &self,
        username: &str,
        hashed_password: &str,
    ) -> ResultEngine<User> {
        let username = username.to_string();
        let hashed_password = hashed_password.to_string();
        self.with_tx(move |engine, db_tx| {
            Box::pin(async move {
                engine
                    .rows
                    .set_password_hash(db_tx, &username, &hashed_password)
                    .await
            })
        })
        .await
    }

    /// Deletes a user together with all of its entries.
    pub async fn delete_user(&self, username: &str) -> ResultEngine<()> {
        let username = username.to_string();
        let removed = self
            .with_tx(move |engine, db_tx| {
                Box::pin(async move {
                    engine.rows.find_user_for_update(db_tx, &username).await?;
                    let removed = engine
                        .rows
                        .delete_entries_by_owner(db_tx, &username)
                        .await?;
                    engine.rows.delete_user(db_tx, &username).await?;
                    Ok((username, removed))
                })
            })
            .await?;
        tracing::debug!("deleted user '{}' and {} entries", removed.0, removed.1);
        Ok(())
    }

    /// Changes the identity of a user and moves its entries to the new
    /// username.
    ///
    /// Fails with [`EngineError::ExistingKey`](crate::EngineError::ExistingKey)
    /// when `new_username` (or `email`) belongs to another user; nothing is
    /// changed in that case.
    pub async fn rename_owner(
        &self,
        old_username: &str,
        new_username: &str,
        full_name: &str,
        email: &str,
    ) -> ResultEngine<User> {
        let identity = UserIdentity {
            username: normalize_required_name(new_username, "user")?,
            full_name: full_name.trim().to_string(),
            email: email.trim().to_string(),
        };
        let old_username = old_username.to_string();
        let user = self
            .with_tx(move |engine, db_tx| {
                Box::pin(async move {
                    engine
                        .rows
                        .find_user_for_update(db_tx, &old_username)
                        .await?;
                    engine
                        .rows
                        .rename_entries_owner(db_tx, &old_username, &identity.username)
                        .await?;
                    engine
                        .rows
                        .update_identity(db_tx, &old_username, &identity)
                        .await
                })
            })
            .await?;
        tracing::debug!("renamed user to '{}'", user.username);
        Ok(user)
    }

    /// Rebuilds `total_expenses` from the user's entries.
    pub async fn recompute_total_expenses(&self, username: &str) -> ResultEngine<User> {
        let username = username.to_string();
        self.with_tx(move |engine, db_tx| {
            Box::pin(async move {
                let user = engine.rows.find_user_for_update(db_tx, &username).await?;
                let total = engine.rows.sum_amounts(db_tx, &username).await?;
                if total == user.total_expenses {
                    return Ok(user);
                }
                tracing::warn!(
                    "total expenses of '{username}' drifted: stored {}, entries sum to {total}",
                    user.total_expenses
                );
                engine.rows.set_total_expenses(db_tx, &username, total).await
            })
        })
        .await
    }
}
