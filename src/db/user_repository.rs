use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use mongodb::bson::doc;
use mongodb::options::ReplaceOptions;

use crate::db::models::{User, UserChanges, UserFilter};
use crate::db::mongo::{and_all, collect, return_updated, set_changes, status_clause, write_error};
use crate::error::AppError;

/// Repository trait for dashboard accounts.
///
/// This trait allows swapping the database layer in tests.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user or replace an existing one (matched by id).
    async fn create_or_update(&self, user: User) -> Result<(), AppError>;

    /// Set only the changed fields and return the user as stored afterwards.
    async fn update(&self, id: &str, changes: &UserChanges) -> Result<Option<User>, AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn list(&self, filter: &UserFilter) -> Result<Vec<User>, AppError>;

    /// Delete a user. Returns `false` if no such user existed.
    async fn delete(&self, id: &str) -> Result<bool, AppError>;

    /// Stamp the last successful login.
    async fn record_login(&self, id: &str, at: DateTime<Utc>) -> Result<(), AppError>;
}

/// MongoDB implementation of the UserRepository.
pub struct MongoUserRepository {
    collection: mongodb::Collection<User>,
}

impl MongoUserRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("users"),
        }
    }
}

#[async_trait]
impl UserRepository for MongoUserRepository {
    async fn create_or_update(&self, user: User) -> Result<(), AppError> {
        let options = ReplaceOptions::builder().upsert(true).build();

        self.collection
            .replace_one(doc! { "id": &user.id }, &user)
            .with_options(options)
            .await
            .map_err(|e| write_error(e, "A user with this email already exists"))?;

        Ok(())
    }

    async fn update(&self, id: &str, changes: &UserChanges) -> Result<Option<User>, AppError> {
        Ok(self
            .collection
            .find_one_and_update(doc! { "id": id }, set_changes(changes)?)
            .with_options(return_updated())
            .await?)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        Ok(self.collection.find_one(doc! { "id": id }).await?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.collection.find_one(doc! { "email": email }).await?)
    }

    async fn list(&self, filter: &UserFilter) -> Result<Vec<User>, AppError> {
        let mut clauses = Vec::new();
        if let Some(role) = filter.role {
            clauses.push(doc! { "role": role.to_string() });
        }
        if let Some(status) = filter.status {
            clauses.push(status_clause(
                "status",
                status.to_string(),
                status == Default::default(),
            ));
        }

        let cursor = self.collection.find(and_all(clauses)).await?;
        collect(cursor).await
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let result = self.collection.delete_one(doc! { "id": id }).await?;
        Ok(result.deleted_count > 0)
    }

    async fn record_login(&self, id: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        self.collection
            .update_one(
                doc! { "id": id },
                doc! { "$set": { "lastLoginAt": at.to_rfc3339_opts(SecondsFormat::AutoSi, true) } },
            )
            .await?;
        Ok(())
    }
}
