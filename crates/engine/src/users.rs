//! Users table and the `User` type.
//!
//! A user carries the denormalized `total_expenses` aggregate, which the
//! ledger operations keep equal to the sum of the user's entry amounts.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::Serialize;

/// A registered user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct User {
    pub username: String,
    /// Credential hash as handed over by the caller. Never serialized.
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub full_name: String,
    pub email: String,
    /// Sum of the amounts of every entry owned by the user, in minor units.
    pub total_expenses: i64,
    pub password_changed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields written when a user registers.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub username: String,
    pub hashed_password: String,
    pub full_name: String,
    pub email: String,
}

/// Identity fields replaced by a rename.
#[derive(Clone, Debug)]
pub struct UserIdentity {
    pub username: String,
    pub full_name: String,
    pub email: String,
}

impl From<Model> for User {
    fn from(model: Model) -> Self {
        Self {
            username: model.username,
            hashed_password: model.hashed_password,
            full_name: model.full_name,
            email: model.email,
            total_expenses: model.total_expenses,
            password_changed_at: model.password_changed_at,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub username: String,
    pub hashed_password: String,
    pub full_name: String,
    #[sea_orm(unique)]
    pub email: String,
    pub total_expenses: i64,
    pub password_changed_at: DateTimeUtc,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
