use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::options::ReplaceOptions;

use crate::db::models::{ActiveStatus, Job, JobChanges, JobFilter};
use crate::db::mongo::{and_all, collect, return_updated, set_changes, status_clause};
use crate::error::AppError;

/// Repository trait for job listings.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create_or_update(&self, job: Job) -> Result<(), AppError>;

    /// Set only the changed fields and return the record as stored afterwards.
    async fn update(
        &self,
        id: &str,
        changes: &JobChanges,
    ) -> Result<Option<Job>, AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Job>, AppError>;

    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, AppError>;

    async fn delete(&self, id: &str) -> Result<bool, AppError>;
}

/// MongoDB implementation of the JobRepository.
pub struct MongoJobRepository {
    collection: mongodb::Collection<Job>,
}

impl MongoJobRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("jobs"),
        }
    }
}

#[async_trait]
impl JobRepository for MongoJobRepository {
    async fn create_or_update(&self, job: Job) -> Result<(), AppError> {
        let options = ReplaceOptions::builder().upsert(true).build();
        self.collection
            .replace_one(doc! { "id": &job.id }, &job)
            .with_options(options)
            .await?;
        Ok(())
    }

    async fn update(
        &self,
        id: &str,
        changes: &JobChanges,
    ) -> Result<Option<Job>, AppError> {
        Ok(self
            .collection
            .find_one_and_update(doc! { "id": id }, set_changes(changes)?)
            .with_options(return_updated())
            .await?)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Job>, AppError> {
        Ok(self.collection.find_one(doc! { "id": id }).await?)
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, AppError> {
        let mut clauses = Vec::new();
        if let Some(status) = filter.status {
            clauses.push(status_clause(
                "status",
                status.to_string(),
                status == ActiveStatus::default(),
            ));
        }
        if let Some(organisation_id) = &filter.organisation_id {
            clauses.push(doc! { "organisationId": organisation_id });
        }

        let cursor = self.collection.find(and_all(clauses)).await?;
        collect(cursor).await
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let result = self.collection.delete_one(doc! { "id": id }).await?;
        Ok(result.deleted_count > 0)
    }
}
