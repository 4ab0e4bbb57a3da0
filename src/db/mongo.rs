use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOneAndUpdateOptions, IndexOptions, ReturnDocument};
use mongodb::IndexModel;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::AppError;

const DUPLICATE_KEY: i32 = 11000;

/// Drain a cursor into a vector.
pub(crate) async fn collect<T>(cursor: mongodb::Cursor<T>) -> Result<Vec<T>, AppError>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    cursor
        .try_collect()
        .await
        .map_err(|e| AppError::Database(e.to_string()))
}

pub(crate) fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == DUPLICATE_KEY
    )
}

/// Map a write error, turning unique-index violations into `BadRequest`.
pub(crate) fn write_error(err: mongodb::error::Error, duplicate_message: &str) -> AppError {
    if is_duplicate_key(&err) {
        AppError::BadRequest(duplicate_message.to_string())
    } else {
        AppError::Database(err.to_string())
    }
}

/// Build a `$set` update from a change set, touching only the fields it carries.
pub(crate) fn set_changes<T: Serialize>(changes: &T) -> Result<Document, AppError> {
    let fields = mongodb::bson::to_document(changes)
        .map_err(|e| AppError::Internal(format!("Failed to encode update: {e}")))?;
    Ok(doc! { "$set": fields })
}

/// Options for `find_one_and_update` returning the document as written.
pub(crate) fn return_updated() -> FindOneAndUpdateOptions {
    FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build()
}

/// Match `field == value`, treating a missing field as `value` when it is the
/// read-time default.
pub(crate) fn status_clause(field: &str, value: String, is_default: bool) -> Document {
    if is_default {
        doc! {
            "$or": [
                { field: value.as_str() },
                { field: { "$exists": false } }
            ]
        }
    } else {
        doc! { field: value }
    }
}

/// Combine clauses with `$and`; no clauses matches everything.
pub(crate) fn and_all(clauses: Vec<Document>) -> Document {
    if clauses.is_empty() {
        doc! {}
    } else {
        doc! { "$and": clauses.into_iter().map(Bson::Document).collect::<Vec<_>>() }
    }
}

fn unique_index(field: &str) -> IndexModel {
    IndexModel::builder()
        .keys(doc! { field: 1 })
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

/// Create the unique indexes every collection relies on.
pub async fn ensure_indexes(db: &mongodb::Database) -> Result<(), AppError> {
    let plan: &[(&str, &[&str])] = &[
        ("users", &["id", "email"]),
        ("posts", &["id", "slug"]),
        ("jobs", &["id"]),
        ("organisations", &["id"]),
        ("categories", &["id", "slug"]),
        ("media", &["id"]),
    ];

    for (collection, fields) in plan {
        let collection = db.collection::<Document>(collection);
        for field in *fields {
            collection.create_index(unique_index(field)).await?;
        }
    }

    tracing::info!("MongoDB indexes ensured");
    Ok(())
}
