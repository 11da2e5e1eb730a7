//! Trainer-authored content: workout routines and nutrition plans.
//!
//! Both kinds share one shape and live in their own tables. Publication is
//! only changed by moderation; this module exposes the row-level helpers the
//! workflows run inside their transactions.

use crate::auth::Actor;
use crate::db::account::MinimalTrainer;
use crate::error::{HubError, HubResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Routine,
    Plan,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Routine => "routine",
            ContentKind::Plan => "plan",
        }
    }

    pub fn from_str(s: &str) -> HubResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "routine" | "routines" => Ok(ContentKind::Routine),
            "plan" | "plans" => Ok(ContentKind::Plan),
            _ => Err(HubError::Validation(format!("Invalid content kind: {}", s))),
        }
    }

    fn table(&self) -> &'static str {
        self.as_str()
    }

    /// Column of `subscription_request` referencing this kind
    pub(crate) fn request_column(&self) -> &'static str {
        match self {
            ContentKind::Routine => "routine_id",
            ContentKind::Plan => "plan_id",
        }
    }

    /// Routine requests are granted on creation; plan requests wait for the trainer
    pub fn auto_accepts_requests(&self) -> bool {
        matches!(self, ContentKind::Routine)
    }
}

/// Typed reference to one piece of content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentRef {
    pub kind: ContentKind,
    pub id: i64,
}

impl ContentRef {
    pub fn new(kind: ContentKind, id: i64) -> Self {
        Self { kind, id }
    }

    pub fn routine(id: i64) -> Self {
        Self::new(ContentKind::Routine, id)
    }

    pub fn plan(id: i64) -> Self {
        Self::new(ContentKind::Plan, id)
    }
}

impl std::fmt::Display for ContentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind.as_str(), self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub id: i64,
    pub kind: ContentKind,
    pub trainer_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub body: Option<String>,
    pub published: bool,
    pub created_at: DateTime<Utc>,
}

impl Content {
    pub fn reference(&self) -> ContentRef {
        ContentRef::new(self.kind, self.id)
    }

    fn from_row(kind: ContentKind, row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            kind,
            trainer_id: row.get("trainer_id"),
            name: row.get("name"),
            description: row.get("description"),
            body: row.get("body"),
            published: row.get("published"),
            created_at: row.get("created_at"),
        }
    }
}

/// Fields supplied by a trainer when creating content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContent {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl NewContent {
    pub fn validate(&self) -> HubResult<()> {
        if self.name.trim().is_empty() {
            return Err(HubError::Validation("Content name cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Partial update; absent fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

/// Ownership projection used for authorization checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MinimalContent {
    pub reference: ContentRef,
    pub trainer_id: i64,
    pub owner_principal_id: i64,
    pub published: bool,
}

impl MinimalContent {
    pub fn is_owned_by(&self, principal_id: i64) -> bool {
        self.owner_principal_id == principal_id
    }
}

pub(crate) async fn fetch_minimal(
    conn: &mut SqliteConnection,
    reference: ContentRef,
) -> HubResult<Option<MinimalContent>> {
    let row = sqlx::query(&format!(
        "SELECT c.trainer_id, c.published, t.principal_id \
         FROM {} c JOIN trainer t ON t.id = c.trainer_id WHERE c.id = ?1",
        reference.kind.table()
    ))
    .bind(reference.id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|row| MinimalContent {
        reference,
        trainer_id: row.get("trainer_id"),
        owner_principal_id: row.get("principal_id"),
        published: row.get("published"),
    }))
}

pub(crate) async fn fetch_content(
    conn: &mut SqliteConnection,
    reference: ContentRef,
) -> HubResult<Option<Content>> {
    let row = sqlx::query(&format!(
        "SELECT id, trainer_id, name, description, body, published, created_at FROM {} WHERE id = ?1",
        reference.kind.table()
    ))
    .bind(reference.id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|row| Content::from_row(reference.kind, &row)))
}

pub(crate) async fn insert_content(
    conn: &mut SqliteConnection,
    kind: ContentKind,
    trainer_id: i64,
    new: &NewContent,
) -> HubResult<Content> {
    let now = Utc::now();
    let name = new.name.trim().to_string();

    let result = sqlx::query(&format!(
        "INSERT INTO {} (trainer_id, name, description, body, published, created_at) \
         VALUES (?1, ?2, ?3, ?4, 0, ?5)",
        kind.table()
    ))
    .bind(trainer_id)
    .bind(&name)
    .bind(&new.description)
    .bind(&new.body)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(Content {
        id: result.last_insert_rowid(),
        kind,
        trainer_id,
        name,
        description: new.description.clone(),
        body: new.body.clone(),
        published: false,
        created_at: now,
    })
}

/// Returns false when the row does not exist
pub(crate) async fn set_published(
    conn: &mut SqliteConnection,
    reference: ContentRef,
    published: bool,
) -> HubResult<bool> {
    let result = sqlx::query(&format!(
        "UPDATE {} SET published = ?1 WHERE id = ?2",
        reference.kind.table()
    ))
    .bind(published)
    .bind(reference.id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete a content row and its undecided reviews. Subscription requests
/// referencing it go with it through the foreign key cascade.
pub(crate) async fn delete_content_row(
    conn: &mut SqliteConnection,
    reference: ContentRef,
) -> HubResult<bool> {
    sqlx::query(
        "DELETE FROM content_review WHERE content_type = ?1 AND content_id = ?2 AND state = 'pending'",
    )
    .bind(reference.kind.as_str())
    .bind(reference.id)
    .execute(&mut *conn)
    .await?;

    let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?1", reference.kind.table()))
        .bind(reference.id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Read and owner-edit access to routines and plans
#[derive(Clone)]
pub struct ContentStore {
    db: SqlitePool,
}

impl ContentStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Trainer membership of a principal, if any
    pub async fn trainer_for_principal(&self, principal_id: i64) -> HubResult<Option<MinimalTrainer>> {
        let trainer = sqlx::query_as::<_, MinimalTrainer>(
            "SELECT id, principal_id AS owner_id FROM trainer WHERE principal_id = ?1",
        )
        .bind(principal_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(trainer)
    }

    pub async fn get(&self, reference: ContentRef) -> HubResult<Content> {
        let mut conn = self.db.acquire().await?;
        fetch_content(&mut conn, reference)
            .await?
            .ok_or_else(|| HubError::NotFound(format!("Content {} not found", reference)))
    }

    /// Fetch content the actor may see: published, owned, or any for Admin.
    /// Hidden content reports NotFound.
    pub async fn get_visible(&self, actor: Option<Actor>, reference: ContentRef) -> HubResult<Content> {
        let content = self.get(reference).await?;
        if content.published {
            return Ok(content);
        }

        if let Some(actor) = actor {
            if actor.is_admin() {
                return Ok(content);
            }
            if self.owner_of(reference).await?.is_owned_by(actor.principal_id) {
                return Ok(content);
            }
        }

        Err(HubError::NotFound(format!("Content {} not found", reference)))
    }

    pub async fn owner_of(&self, reference: ContentRef) -> HubResult<MinimalContent> {
        let mut conn = self.db.acquire().await?;
        fetch_minimal(&mut conn, reference)
            .await?
            .ok_or_else(|| HubError::NotFound(format!("Content {} not found", reference)))
    }

    pub async fn list_published(&self, kind: ContentKind) -> HubResult<Vec<Content>> {
        let rows = sqlx::query(&format!(
            "SELECT id, trainer_id, name, description, body, published, created_at \
             FROM {} WHERE published = 1 ORDER BY created_at DESC, id DESC",
            kind.table()
        ))
        .fetch_all(&self.db)
        .await?;

        Ok(rows.iter().map(|row| Content::from_row(kind, row)).collect())
    }

    /// All content of one kind owned by a principal, published or not
    pub async fn list_owned(&self, principal_id: i64, kind: ContentKind) -> HubResult<Vec<Content>> {
        let rows = sqlx::query(&format!(
            "SELECT c.id, c.trainer_id, c.name, c.description, c.body, c.published, c.created_at \
             FROM {} c JOIN trainer t ON t.id = c.trainer_id \
             WHERE t.principal_id = ?1 ORDER BY c.created_at DESC, c.id DESC",
            kind.table()
        ))
        .bind(principal_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.iter().map(|row| Content::from_row(kind, row)).collect())
    }

    /// Owner-only edit of descriptive fields. Publication is untouched.
    pub async fn update_details(
        &self,
        actor: Actor,
        reference: ContentRef,
        details: ContentDetails,
    ) -> HubResult<Content> {
        let owner = self.owner_of(reference).await?;
        if !owner.is_owned_by(actor.principal_id) {
            return Err(HubError::Forbidden(format!("Not the owner of {}", reference)));
        }
        if let Some(name) = &details.name {
            if name.trim().is_empty() {
                return Err(HubError::Validation("Content name cannot be empty".to_string()));
            }
        }

        sqlx::query(&format!(
            "UPDATE {} SET name = COALESCE(?1, name), description = COALESCE(?2, description), \
             body = COALESCE(?3, body) WHERE id = ?4",
            reference.kind.table()
        ))
        .bind(details.name.as_deref().map(str::trim))
        .bind(&details.description)
        .bind(&details.body)
        .bind(reference.id)
        .execute(&self.db)
        .await?;

        self.get(reference).await
    }

    /// Owner-only removal
    pub async fn delete(&self, actor: Actor, reference: ContentRef) -> HubResult<()> {
        let mut tx = self.db.begin().await?;

        let owner = fetch_minimal(&mut tx, reference)
            .await?
            .ok_or_else(|| HubError::NotFound(format!("Content {} not found", reference)))?;
        if !owner.is_owned_by(actor.principal_id) {
            return Err(HubError::Forbidden(format!("Not the owner of {}", reference)));
        }

        delete_content_row(&mut tx, reference).await?;
        tx.commit().await?;

        tracing::info!(content = %reference, principal_id = actor.principal_id, "content deleted by owner");
        Ok(())
    }
}
