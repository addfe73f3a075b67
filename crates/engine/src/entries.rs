//! The module contains the `Entry` type, a budget item owned by one user.
use core::fmt;

use chrono::NaiveDate;
use sea_orm::entity::prelude::*;
use serde::Serialize;

use crate::{ResultEngine, normalize_optional_text, normalize_required_name};

/// Optional label attached to an entry.
///
/// A category is always trimmed and non-empty: "no category" is expressed as
/// `Option::<Category>::None`, stored as SQL `NULL`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    /// Normalize a raw category. Absent, empty and blank inputs yield `None`.
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        normalize_optional_text(raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A budget entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub id: i32,
    pub owner: String,
    pub name: String,
    pub due_date: NaiveDate,
    /// Amount in minor units.
    pub amount: i64,
    pub category: Option<Category>,
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} {} due {}", self.id, self.amount, self.name, self.due_date)?;
        if let Some(category) = &self.category {
            write!(f, " [{category}]")?;
        }
        Ok(())
    }
}

/// The mutable fields of an entry, validated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryDraft {
    pub name: String,
    pub due_date: NaiveDate,
    pub amount: i64,
    pub category: Option<Category>,
}

impl EntryDraft {
    pub fn new(
        name: &str,
        due_date: NaiveDate,
        amount: i64,
        category: Option<&str>,
    ) -> ResultEngine<Self> {
        Ok(Self {
            name: normalize_required_name(name, "entry")?,
            due_date,
            amount,
            category: Category::parse(category),
        })
    }
}

impl From<Model> for Entry {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            owner: model.owner,
            name: model.name,
            due_date: model.due_date,
            amount: model.amount,
            category: Category::parse(model.category.as_deref()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "entries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub owner: String,
    pub name: String,
    pub due_date: NaiveDate,
    pub amount: i64,
    pub category: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineError;

    #[test]
    fn blank_categories_are_absent() {
        assert_eq!(Category::parse(None), None);
        assert_eq!(Category::parse(Some("")), None);
        assert_eq!(Category::parse(Some("   ")), None);
        assert_eq!(
            Category::parse(Some(" rent ")).as_ref().map(Category::as_str),
            Some("rent")
        );
    }

    #[test]
    fn draft_requires_a_name() {
        let due = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let err = EntryDraft::new("  ", due, 100, None).unwrap_err();
        assert!(matches!(err, EngineError::InvalidName(_)));

        let draft = EntryDraft::new(" Rent ", due, 100, Some("")).unwrap();
        assert_eq!(draft.name, "Rent");
        assert_eq!(draft.category, None);
    }
}
