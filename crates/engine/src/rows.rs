//! Row primitives.
//!
//! [`RowStore`] is the single-table CRUD surface the ledger operations are
//! built from. Each primitive touches exactly one table and runs on the
//! transaction handed to it by the coordinator. Backend failures are
//! classified before they leave this module.
//!
//! The `*_for_update` reads take an exclusive row lock for the rest of the
//! enclosing transaction on backends that support it (`SELECT ... FOR
//! UPDATE`). SQLite has no row locks, so there the user lock is the database
//! write lock, taken up front with a no-op write. Competing writers then wait
//! in SQLite's busy handler instead of failing when they upgrade from a read.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveValue, ConnectionTrait, DatabaseTransaction, DbBackend, QueryFilter, QueryOrder,
    QuerySelect, prelude::*, sea_query::Expr,
};

use crate::{
    Entry, EngineError, EntryDraft, ResultEngine, User,
    entries,
    users::{self, NewUser, UserIdentity},
};

/// Single-table primitives over `users` and `entries`.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn insert_user(&self, db: &DatabaseTransaction, user: &NewUser) -> ResultEngine<User>;

    async fn find_user(&self, db: &DatabaseTransaction, username: &str) -> ResultEngine<User>;

    /// Read a user and lock its row until the transaction ends.
    ///
    /// Callers issue it before any other statement of the transaction, which
    /// is what lets it stand in for the row lock on SQLite.
    async fn find_user_for_update(
        &self,
        db: &DatabaseTransaction,
        username: &str,
    ) -> ResultEngine<User>;

    async fn list_users(
        &self,
        db: &DatabaseTransaction,
        limit: u64,
        offset: u64,
    ) -> ResultEngine<Vec<User>>;

    async fn set_total_expenses(
        &self,
        db: &DatabaseTransaction,
        username: &str,
        total_expenses: i64,
    ) -> ResultEngine<User>;

    async fn set_password_hash(
        &self,
        db: &DatabaseTransaction,
        username: &str,
        hashed_password: &str,
    ) -> ResultEngine<User>;

    /// Replace username, full name and email of the user keyed by `username`.
    async fn update_identity(
        &self,
        db: &DatabaseTransaction,
        username: &str,
        identity: &UserIdentity,
    ) -> ResultEngine<User>;

    async fn delete_user(&self, db: &DatabaseTransaction, username: &str) -> ResultEngine<()>;

    async fn insert_entry(
        &self,
        db: &DatabaseTransaction,
        owner: &str,
        draft: &EntryDraft,
    ) -> ResultEngine<Entry>;

    /// Ownership-scoped read.
    async fn find_entry(&self, db: &DatabaseTransaction, owner: &str, id: i32)
    -> ResultEngine<Entry>;

    /// Ownership-scoped read that locks the entry row.
    async fn find_entry_for_update(
        &self,
        db: &DatabaseTransaction,
        owner: &str,
        id: i32,
    ) -> ResultEngine<Entry>;

    async fn list_entries(&self, db: &DatabaseTransaction, owner: &str) -> ResultEngine<Vec<Entry>>;

    /// Distinct non-null categories used by `owner`, sorted.
    async fn list_categories(
        &self,
        db: &DatabaseTransaction,
        owner: &str,
    ) -> ResultEngine<Vec<String>>;

    /// Sum of the amounts of every entry owned by `owner`.
    async fn sum_amounts(&self, db: &DatabaseTransaction, owner: &str) -> ResultEngine<i64>;

    async fn update_entry(
        &self,
        db: &DatabaseTransaction,
        owner: &str,
        id: i32,
        draft: &EntryDraft,
    ) -> ResultEngine<Entry>;

    async fn delete_entry(&self, db: &DatabaseTransaction, owner: &str, id: i32)
    -> ResultEngine<()>;

    /// Delete every entry of `owner`, returning how many rows went away.
    async fn delete_entries_by_owner(
        &self,
        db: &DatabaseTransaction,
        owner: &str,
    ) -> ResultEngine<u64>;

    /// Re-point every entry of `old_owner` to `new_owner`.
    async fn rename_entries_owner(
        &self,
        db: &DatabaseTransaction,
        old_owner: &str,
        new_owner: &str,
    ) -> ResultEngine<u64>;
}

/// [`RowStore`] backed by the sea-orm entities.
#[derive(Clone, Copy, Debug, Default)]
pub struct SqlRows;

fn user_not_found() -> EngineError {
    EngineError::KeyNotFound("user not exists".to_string())
}

fn entry_not_found() -> EngineError {
    EngineError::KeyNotFound("entry not exists".to_string())
}

/// Take the SQLite write lock as the first statement of the transaction.
///
/// Must run before any read in the transaction: SQLite only waits for a busy
/// write lock when the connection holds no read lock yet.
async fn lock_user_sqlite(db: &DatabaseTransaction, username: &str) -> ResultEngine<()> {
    if db.get_database_backend() != DbBackend::Sqlite {
        return Ok(());
    }
    users::Entity::update_many()
        .col_expr(users::Column::Username, Expr::col(users::Column::Username).into())
        .filter(users::Column::Username.eq(username))
        .exec(db)
        .await?;
    Ok(())
}

fn category_value(draft: &EntryDraft) -> Option<String> {
    draft
        .category
        .as_ref()
        .map(|category| category.as_str().to_string())
}

#[async_trait]
impl RowStore for SqlRows {
    async fn insert_user(&self, db: &DatabaseTransaction, user: &NewUser) -> ResultEngine<User> {
        let now = Utc::now();
        let model = users::ActiveModel {
            username: ActiveValue::Set(user.username.clone()),
            hashed_password: ActiveValue::Set(user.hashed_password.clone()),
            full_name: ActiveValue::Set(user.full_name.clone()),
            email: ActiveValue::Set(user.email.clone()),
            total_expenses: ActiveValue::Set(0),
            password_changed_at: ActiveValue::Set(now),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
        }
        .insert(db)
        .await?;
        Ok(model.into())
    }

    async fn find_user(&self, db: &DatabaseTransaction, username: &str) -> ResultEngine<User> {
        users::Entity::find_by_id(username.to_string())
            .one(db)
            .await?
            .map(User::from)
            .ok_or_else(user_not_found)
    }

    async fn find_user_for_update(
        &self,
        db: &DatabaseTransaction,
        username: &str,
    ) -> ResultEngine<User> {
        lock_user_sqlite(db, username).await?;
        users::Entity::find_by_id(username.to_string())
            .lock_exclusive()
            .one(db)
            .await?
            .map(User::from)
            .ok_or_else(user_not_found)
    }

    async fn list_users(
        &self,
        db: &DatabaseTransaction,
        limit: u64,
        offset: u64,
    ) -> ResultEngine<Vec<User>> {
        let models = users::Entity::find()
            .order_by_asc(users::Column::Username)
            .limit(limit)
            .offset(offset)
            .all(db)
            .await?;
        Ok(models.into_iter().map(User::from).collect())
    }

    async fn set_total_expenses(
        &self,
        db: &DatabaseTransaction,
        username: &str,
        total_expenses: i64,
    ) -> ResultEngine<User> {
        let model = users::ActiveModel {
            username: ActiveValue::Set(username.to_string()),
            total_expenses: ActiveValue::Set(total_expenses),
            updated_at: ActiveValue::Set(Utc::now()),
            ..Default::default()
        }
        .update(db)
        .await?;
        Ok(model.into())
    }

    async fn set_password_hash(
        &self,
        db: &DatabaseTransaction,
        username: &str,
        hashed_password: &str,
    ) -> ResultEngine<User> {
        let now = Utc::now();
        let model = users::ActiveModel {
            username: ActiveValue::Set(username.to_string()),
            hashed_password: ActiveValue::Set(hashed_password.to_string()),
            password_changed_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
            ..Default::default()
        }
        .update(db)
        .await?;
        Ok(model.into())
    }

    async fn update_identity(
        &self,
        db: &DatabaseTransaction,
        username: &str,
        identity: &UserIdentity,
    ) -> ResultEngine<User> {
        // The primary key changes, so this cannot go through `ActiveModel::update`.
        let result = users::Entity::update_many()
            .col_expr(users::Column::Username, Expr::value(identity.username.clone()))
            .col_expr(users::Column::FullName, Expr::value(identity.full_name.clone()))
            .col_expr(users::Column::Email, Expr::value(identity.email.clone()))
            .col_expr(users::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(users::Column::Username.eq(username))
            .exec(db)
            .await?;
        if result.rows_affected == 0 {
            return Err(user_not_found());
        }
        self.find_user(db, &identity.username).await
    }

    async fn delete_user(&self, db: &DatabaseTransaction, username: &str) -> ResultEngine<()> {
        let result = users::Entity::delete_by_id(username.to_string())
            .exec(db)
            .await?;
        if result.rows_affected == 0 {
            return Err(user_not_found());
        }
        Ok(())
    }

    async fn insert_entry(
        &self,
        db: &DatabaseTransaction,
        owner: &str,
        draft: &EntryDraft,
    ) -> ResultEngine<Entry> {
        let model = entries::ActiveModel {
            id: ActiveValue::NotSet,
            owner: ActiveValue::Set(owner.to_string()),
            name: ActiveValue::Set(draft.name.clone()),
            due_date: ActiveValue::Set(draft.due_date),
            amount: ActiveValue::Set(draft.amount),
            category: ActiveValue::Set(category_value(draft)),
        }
        .insert(db)
        .await?;
        Ok(model.into())
    }

    async fn find_entry(
        &self,
        db: &DatabaseTransaction,
        owner: &str,
        id: i32,
    ) -> ResultEngine<Entry> {
        entries::Entity::find_by_id(id)
            .filter(entries::Column::Owner.eq(owner))
            .one(db)
            .await?
            .map(Entry::from)
            .ok_or_else(entry_not_found)
    }

    async fn find_entry_for_update(
        &self,
        db: &DatabaseTransaction,
        owner: &str,
        id: i32,
    ) -> ResultEngine<Entry> {
        entries::Entity::find_by_id(id)
            .filter(entries::Column::Owner.eq(owner))
            .lock_exclusive()
            .one(db)
            .await?
            .map(Entry::from)
            .ok_or_else(entry_not_found)
    }

    async fn list_entries(&self, db: &DatabaseTransaction, owner: &str) -> ResultEngine<Vec<Entry>> {
        let models = entries::Entity::find()
            .filter(entries::Column::Owner.eq(owner))
            .order_by_asc(entries::Column::DueDate)
            .order_by_asc(entries::Column::Id)
            .all(db)
            .await?;
        Ok(models.into_iter().map(Entry::from).collect())
    }

    async fn list_categories(
        &self,
        db: &DatabaseTransaction,
        owner: &str,
    ) -> ResultEngine<Vec<String>> {
        let categories: Vec<String> = entries::Entity::find()
            .select_only()
            .column(entries::Column::Category)
            .distinct()
            .filter(entries::Column::Owner.eq(owner))
            .filter(entries::Column::Category.is_not_null())
            .filter(entries::Column::Category.ne(""))
            .order_by_asc(entries::Column::Category)
            .into_tuple()
            .all(db)
            .await?;
        Ok(categories)
    }

    async fn sum_amounts(&self, db: &DatabaseTransaction, owner: &str) -> ResultEngine<i64> {
        // Summed here rather than with SUM(): PostgreSQL widens SUM(bigint) to numeric.
        let amounts: Vec<i64> = entries::Entity::find()
            .select_only()
            .column(entries::Column::Amount)
            .filter(entries::Column::Owner.eq(owner))
            .into_tuple()
            .all(db)
            .await?;
        amounts.into_iter().try_fold(0i64, |total, amount| {
            total.checked_add(amount).ok_or_else(|| {
                EngineError::InvalidAmount(format!("total expenses of '{owner}' overflow"))
            })
        })
    }

    async fn update_entry(
        &self,
        db: &DatabaseTransaction,
        owner: &str,
        id: i32,
        draft: &EntryDraft,
    ) -> ResultEngine<Entry> {
        let active = entries::ActiveModel {
            id: ActiveValue::Unchanged(id),
            owner: ActiveValue::NotSet,
            name: ActiveValue::Set(draft.name.clone()),
            due_date: ActiveValue::Set(draft.due_date),
            amount: ActiveValue::Set(draft.amount),
            category: ActiveValue::Set(category_value(draft)),
        };
        let model = entries::Entity::update(active)
            .filter(entries::Column::Owner.eq(owner))
            .exec(db)
            .await?;
        Ok(model.into())
    }

    async fn delete_entry(
        &self,
        db: &DatabaseTransaction,
        owner: &str,
        id: i32,
    ) -> ResultEngine<()> {
        let result = entries::Entity::delete_many()
            .filter(entries::Column::Id.eq(id))
            .filter(entries::Column::Owner.eq(owner))
            .exec(db)
            .await?;
        if result.rows_affected == 0 {
            return Err(entry_not_found());
        }
        Ok(())
    }

    async fn delete_entries_by_owner(
        &self,
        db: &DatabaseTransaction,
        owner: &str,
    ) -> ResultEngine<u64> {
        let result = entries::Entity::delete_many()
            .filter(entries::Column::Owner.eq(owner))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn rename_entries_owner(
        &self,
        db: &DatabaseTransaction,
        old_owner: &str,
        new_owner: &str,
    ) -> ResultEngine<u64> {
        let result = entries::Entity::update_many()
            .col_expr(entries::Column::Owner, Expr::value(new_owner.to_string()))
            .filter(entries::Column::Owner.eq(old_owner))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }
}
