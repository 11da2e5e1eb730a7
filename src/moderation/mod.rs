//! Content moderation workflow.
//!
//! Content starts unpublished with a pending review. An Admin either approves
//! it (published, review accepted) or rejects it, which **permanently deletes
//! the content**; only the rejected review row survives as an audit record.
//! There is no undo for a rejection.

use crate::auth::Actor;
use crate::content::{self, Content, ContentKind, ContentRef, NewContent};
use crate::db;
use crate::error::{HubError, HubResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewState {
    Pending,
    Accepted,
    Rejected,
}

impl ReviewState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewState::Pending => "pending",
            ReviewState::Accepted => "accepted",
            ReviewState::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> HubResult<Self> {
        match s {
            "pending" => Ok(ReviewState::Pending),
            "accepted" => Ok(ReviewState::Accepted),
            "rejected" => Ok(ReviewState::Rejected),
            _ => Err(HubError::Validation(format!("Invalid review state: {}", s))),
        }
    }
}

/// Moderation record gating the visibility of one piece of content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentReview {
    pub id: i64,
    pub content_type: ContentKind,
    pub content_id: i64,
    pub state: ReviewState,
    pub submitted_by: Option<i64>,
    pub decided_by: Option<i64>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ContentReview {
    pub fn content(&self) -> ContentRef {
        ContentRef::new(self.content_type, self.content_id)
    }

    fn from_row(row: &SqliteRow) -> HubResult<Self> {
        let content_type: String = row.get("content_type");
        let state: String = row.get("state");

        Ok(Self {
            id: row.get("id"),
            content_type: ContentKind::from_str(&content_type)?,
            content_id: row.get("content_id"),
            state: ReviewState::from_str(&state)?,
            submitted_by: row.get("submitted_by"),
            decided_by: row.get("decided_by"),
            decided_at: row.get("decided_at"),
            created_at: row.get("created_at"),
        })
    }
}

/// Pending review joined with what a moderator needs to decide on it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingReview {
    #[serde(flatten)]
    pub review: ContentReview,
    pub content_name: String,
    pub trainer_id: i64,
    pub trainer_name: String,
}

/// Result of a submission; `review` is `None` when the review write failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub content: Content,
    pub review: Option<ContentReview>,
}

const REVIEW_COLUMNS: &str =
    "id, content_type, content_id, state, submitted_by, decided_by, decided_at, created_at";

async fn insert_review(
    conn: &mut SqliteConnection,
    reference: ContentRef,
    state: ReviewState,
    submitted_by: Option<i64>,
    decided_by: Option<i64>,
) -> HubResult<ContentReview> {
    let now = Utc::now();
    let decided_at = decided_by.map(|_| now);

    let result = sqlx::query(
        r#"
        INSERT INTO content_review
            (content_type, content_id, state, submitted_by, decided_by, decided_at, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(reference.kind.as_str())
    .bind(reference.id)
    .bind(state.as_str())
    .bind(submitted_by)
    .bind(decided_by)
    .bind(decided_at)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(ContentReview {
        id: result.last_insert_rowid(),
        content_type: reference.kind,
        content_id: reference.id,
        state,
        submitted_by,
        decided_by,
        decided_at,
        created_at: now,
    })
}

async fn fetch_review(conn: &mut SqliteConnection, review_id: i64) -> HubResult<Option<ContentReview>> {
    let row = sqlx::query(&format!("SELECT {} FROM content_review WHERE id = ?1", REVIEW_COLUMNS))
        .bind(review_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(ContentReview::from_row).transpose()
}

async fn pending_review_for(
    conn: &mut SqliteConnection,
    reference: ContentRef,
) -> HubResult<Option<ContentReview>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM content_review WHERE content_type = ?1 AND content_id = ?2 AND state = 'pending'",
        REVIEW_COLUMNS
    ))
    .bind(reference.kind.as_str())
    .bind(reference.id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(ContentReview::from_row).transpose()
}

/// Move a pending review to a final state; anything else is a Conflict
async fn decide_review(
    conn: &mut SqliteConnection,
    review: &ContentReview,
    state: ReviewState,
    moderator: i64,
) -> HubResult<ContentReview> {
    let now = Utc::now();

    let result = sqlx::query(
        "UPDATE content_review SET state = ?1, decided_by = ?2, decided_at = ?3 \
         WHERE id = ?4 AND state = 'pending'",
    )
    .bind(state.as_str())
    .bind(moderator)
    .bind(now)
    .bind(review.id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(HubError::Conflict(format!(
            "Review {} is no longer pending",
            review.id
        )));
    }

    Ok(ContentReview {
        state,
        decided_by: Some(moderator),
        decided_at: Some(now),
        ..review.clone()
    })
}

/// Close every pending review on a trainer's content as rejected.
/// Used before the trainer's content is removed wholesale.
pub(crate) async fn reject_pending_for_trainer(
    conn: &mut SqliteConnection,
    trainer_id: i64,
    moderator: i64,
) -> HubResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE content_review
        SET state = 'rejected', decided_by = ?1, decided_at = ?2
        WHERE state = 'pending'
          AND ((content_type = 'routine' AND content_id IN (SELECT id FROM routine WHERE trainer_id = ?3))
            OR (content_type = 'plan' AND content_id IN (SELECT id FROM plan WHERE trainer_id = ?3)))
        "#,
    )
    .bind(moderator)
    .bind(Utc::now())
    .bind(trainer_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// Moderation workflow manager
#[derive(Clone)]
pub struct ModerationManager {
    db: SqlitePool,
}

impl ModerationManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create content for the submitting trainer and queue it for review.
    ///
    /// The content write commits on its own. The review write is attempted
    /// afterwards and its failure is logged, not returned: the trainer keeps
    /// the content and can re-queue it with [`request_review`](Self::request_review).
    pub async fn submit(
        &self,
        submitter: Actor,
        kind: ContentKind,
        new: NewContent,
    ) -> HubResult<SubmitOutcome> {
        new.validate()?;

        let mut conn = self.db.acquire().await?;

        let trainer_id: i64 = sqlx::query_scalar("SELECT id FROM trainer WHERE principal_id = ?1")
            .bind(submitter.principal_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| HubError::Forbidden("Only trainers can submit content".to_string()))?;

        let content = content::insert_content(&mut conn, kind, trainer_id, &new).await?;

        let review = match insert_review(
            &mut conn,
            content.reference(),
            ReviewState::Pending,
            Some(submitter.principal_id),
            None,
        )
        .await
        {
            Ok(review) => Some(review),
            Err(e) => {
                tracing::error!(
                    content_kind = kind.as_str(),
                    content_id = content.id,
                    submitter = submitter.principal_id,
                    error = %e,
                    "content created but review could not be recorded"
                );
                None
            }
        };

        tracing::info!(content = %content.reference(), submitter = submitter.principal_id, "content submitted");

        Ok(SubmitOutcome { content, review })
    }

    /// Re-queue unpublished content that has no pending review
    pub async fn request_review(&self, submitter: Actor, reference: ContentRef) -> HubResult<ContentReview> {
        let mut tx = self.db.begin().await?;

        let owner = content::fetch_minimal(&mut tx, reference)
            .await?
            .ok_or_else(|| HubError::NotFound(format!("Content {} not found", reference)))?;
        if !owner.is_owned_by(submitter.principal_id) {
            return Err(HubError::Forbidden(format!("Not the owner of {}", reference)));
        }
        if owner.published {
            return Err(HubError::Conflict(format!("Content {} is already published", reference)));
        }

        let review = insert_review(
            &mut tx,
            reference,
            ReviewState::Pending,
            Some(submitter.principal_id),
            None,
        )
        .await
        .map_err(|e| match e {
            HubError::Database(ref db_err) if db::is_unique_violation(db_err) => {
                HubError::Conflict(format!("Content {} already has a pending review", reference))
            }
            other => other,
        })?;

        tx.commit().await?;
        Ok(review)
    }

    /// Approve a pending review: publish its content and accept the review atomically
    pub async fn approve(&self, moderator: Actor, review_id: i64) -> HubResult<ContentReview> {
        moderator.require_admin()?;
        let mut tx = self.db.begin().await?;

        let review = fetch_review(&mut tx, review_id)
            .await?
            .ok_or_else(|| HubError::NotFound(format!("Review {} not found", review_id)))?;

        let decided = decide_review(&mut tx, &review, ReviewState::Accepted, moderator.principal_id).await?;
        if !content::set_published(&mut tx, review.content(), true).await? {
            return Err(HubError::NotFound(format!("Content {} not found", review.content())));
        }

        tx.commit().await?;

        tracing::info!(review_id, content = %review.content(), moderator = moderator.principal_id, "content approved");
        Ok(decided)
    }

    /// Reject a pending review. The content is deleted permanently.
    pub async fn reject(&self, moderator: Actor, review_id: i64) -> HubResult<ContentReview> {
        moderator.require_admin()?;
        let mut tx = self.db.begin().await?;

        let review = fetch_review(&mut tx, review_id)
            .await?
            .ok_or_else(|| HubError::NotFound(format!("Review {} not found", review_id)))?;

        // Decide first: deleting the content withdraws reviews still pending
        let decided = decide_review(&mut tx, &review, ReviewState::Rejected, moderator.principal_id).await?;
        content::delete_content_row(&mut tx, review.content()).await?;

        tx.commit().await?;

        tracing::info!(review_id, content = %review.content(), moderator = moderator.principal_id, "content rejected and deleted");
        Ok(decided)
    }

    /// Approve by content. Without a pending review an accepted one is recorded.
    pub async fn approve_content(&self, moderator: Actor, reference: ContentRef) -> HubResult<ContentReview> {
        moderator.require_admin()?;
        let mut tx = self.db.begin().await?;

        let current = content::fetch_minimal(&mut tx, reference)
            .await?
            .ok_or_else(|| HubError::NotFound(format!("Content {} not found", reference)))?;

        let review = match pending_review_for(&mut tx, reference).await? {
            Some(pending) => decide_review(&mut tx, &pending, ReviewState::Accepted, moderator.principal_id).await?,
            None if current.published => {
                return Err(HubError::Conflict(format!("Content {} is already published", reference)));
            }
            None => {
                tracing::warn!(content = %reference, "approving content without a review record");
                insert_review(
                    &mut tx,
                    reference,
                    ReviewState::Accepted,
                    None,
                    Some(moderator.principal_id),
                )
                .await?
            }
        };
        content::set_published(&mut tx, reference, true).await?;

        tx.commit().await?;

        tracing::info!(content = %reference, moderator = moderator.principal_id, "content approved");
        Ok(review)
    }

    /// Reject by content, published or not. The content is deleted permanently.
    pub async fn reject_content(&self, moderator: Actor, reference: ContentRef) -> HubResult<ContentReview> {
        moderator.require_admin()?;
        let mut tx = self.db.begin().await?;

        content::fetch_minimal(&mut tx, reference)
            .await?
            .ok_or_else(|| HubError::NotFound(format!("Content {} not found", reference)))?;

        let review = match pending_review_for(&mut tx, reference).await? {
            Some(pending) => decide_review(&mut tx, &pending, ReviewState::Rejected, moderator.principal_id).await?,
            None => {
                insert_review(
                    &mut tx,
                    reference,
                    ReviewState::Rejected,
                    None,
                    Some(moderator.principal_id),
                )
                .await?
            }
        };
        content::delete_content_row(&mut tx, reference).await?;

        tx.commit().await?;

        tracing::info!(content = %reference, moderator = moderator.principal_id, "content rejected and deleted");
        Ok(review)
    }

    /// Pending reviews, oldest first
    pub async fn list_pending(&self, moderator: Actor) -> HubResult<Vec<PendingReview>> {
        moderator.require_admin()?;

        let select = |table: &str| {
            format!(
                "SELECT r.id AS id, r.content_type AS content_type, r.content_id AS content_id, \
                 r.state AS state, r.submitted_by AS submitted_by, r.decided_by AS decided_by, \
                 r.decided_at AS decided_at, r.created_at AS created_at, \
                 c.name AS content_name, c.trainer_id AS trainer_id, p.display_name AS trainer_name \
                 FROM content_review r \
                 JOIN {table} c ON c.id = r.content_id \
                 JOIN trainer t ON t.id = c.trainer_id \
                 JOIN principal p ON p.id = t.principal_id \
                 WHERE r.state = 'pending' AND r.content_type = '{table}'"
            )
        };
        let sql = format!(
            "{} UNION ALL {} ORDER BY created_at, id",
            select(ContentKind::Routine.as_str()),
            select(ContentKind::Plan.as_str())
        );

        let rows = sqlx::query(&sql).fetch_all(&self.db).await?;

        rows.iter()
            .map(|row| {
                Ok(PendingReview {
                    review: ContentReview::from_row(row)?,
                    content_name: row.get("content_name"),
                    trainer_id: row.get("trainer_id"),
                    trainer_name: row.get("trainer_name"),
                })
            })
            .collect()
    }

    /// Review history of one piece of content, oldest first.
    /// Admins see any history; owners see the history of content they still own.
    pub async fn history(&self, actor: Actor, reference: ContentRef) -> HubResult<Vec<ContentReview>> {
        if !actor.is_admin() {
            let mut conn = self.db.acquire().await?;
            match content::fetch_minimal(&mut conn, reference).await? {
                Some(owner) if owner.is_owned_by(actor.principal_id) => {}
                Some(_) => {
                    return Err(HubError::Forbidden(format!("Not the owner of {}", reference)));
                }
                None => return Err(HubError::NotFound(format!("Content {} not found", reference))),
            }
        }

        let rows = sqlx::query(&format!(
            "SELECT {} FROM content_review WHERE content_type = ?1 AND content_id = ?2 ORDER BY created_at, id",
            REVIEW_COLUMNS
        ))
        .bind(reference.kind.as_str())
        .bind(reference.id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(ContentReview::from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::content::ContentStore;
    use crate::test_support::{insert_principal, make_trainer, test_pool};

    struct Fixture {
        pool: SqlitePool,
        moderation: ModerationManager,
        store: ContentStore,
        trainer: Actor,
        admin: Actor,
    }

    async fn fixture() -> Fixture {
        let pool = test_pool().await;
        let trainer_id = insert_principal(&pool, "coach@example.com").await;
        make_trainer(&pool, trainer_id).await;
        let admin_id = insert_principal(&pool, "admin@test.local").await;

        Fixture {
            moderation: ModerationManager::new(pool.clone()),
            store: ContentStore::new(pool.clone()),
            pool,
            trainer: Actor::new(trainer_id, Role::Trainer),
            admin: Actor::new(admin_id, Role::Admin),
        }
    }

    fn routine(name: &str) -> NewContent {
        NewContent {
            name: name.to_string(),
            description: None,
            body: Some("3x10 squats".to_string()),
        }
    }

    async fn review_states(pool: &SqlitePool, reference: ContentRef) -> Vec<String> {
        sqlx::query_scalar(
            "SELECT state FROM content_review WHERE content_type = ?1 AND content_id = ?2 ORDER BY id",
        )
        .bind(reference.kind.as_str())
        .bind(reference.id)
        .fetch_all(pool)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_submit_then_approve() {
        let f = fixture().await;

        let outcome = f.moderation.submit(f.trainer, ContentKind::Routine, routine("R")).await.unwrap();
        let review = outcome.review.unwrap();
        assert_eq!(review.state, ReviewState::Pending);
        assert_eq!(review.submitted_by, Some(f.trainer.principal_id));
        assert!(!outcome.content.published);

        let approved = f.moderation.approve(f.admin, review.id).await.unwrap();
        assert_eq!(approved.state, ReviewState::Accepted);
        assert_eq!(approved.decided_by, Some(f.admin.principal_id));

        let content = f.store.get(outcome.content.reference()).await.unwrap();
        assert!(content.published);
        assert_eq!(review_states(&f.pool, content.reference()).await, vec!["accepted"]);
    }

    #[tokio::test]
    async fn test_reject_deletes_content() {
        let f = fixture().await;
        let outcome = f.moderation.submit(f.trainer, ContentKind::Plan, routine("P")).await.unwrap();
        let reference = outcome.content.reference();

        let rejected = f.moderation.reject(f.admin, outcome.review.unwrap().id).await.unwrap();
        assert_eq!(rejected.state, ReviewState::Rejected);

        assert!(matches!(f.store.get(reference).await, Err(HubError::NotFound(_))));
        assert_eq!(review_states(&f.pool, reference).await, vec!["rejected"]);
    }

    #[tokio::test]
    async fn test_decisions_require_admin() {
        let f = fixture().await;
        let outcome = f.moderation.submit(f.trainer, ContentKind::Routine, routine("R")).await.unwrap();
        let review_id = outcome.review.unwrap().id;

        assert!(matches!(
            f.moderation.approve(f.trainer, review_id).await,
            Err(HubError::Forbidden(_))
        ));
        assert!(matches!(
            f.moderation.reject_content(f.trainer, outcome.content.reference()).await,
            Err(HubError::Forbidden(_))
        ));
        assert!(matches!(
            f.moderation.list_pending(f.trainer).await,
            Err(HubError::Forbidden(_))
        ));
        assert!(!f.store.get(outcome.content.reference()).await.unwrap().published);
    }

    #[tokio::test]
    async fn test_decided_review_conflicts() {
        let f = fixture().await;
        let outcome = f.moderation.submit(f.trainer, ContentKind::Routine, routine("R")).await.unwrap();
        let review_id = outcome.review.unwrap().id;

        f.moderation.approve(f.admin, review_id).await.unwrap();
        assert!(matches!(
            f.moderation.approve(f.admin, review_id).await,
            Err(HubError::Conflict(_))
        ));
        assert!(matches!(
            f.moderation.reject(f.admin, review_id).await,
            Err(HubError::Conflict(_))
        ));
        // Failed reject rolled back: content still published
        assert!(f.store.get(outcome.content.reference()).await.unwrap().published);
    }

    #[tokio::test]
    async fn test_only_trainers_submit() {
        let f = fixture().await;
        let client_id = insert_principal(&f.pool, "client@example.com").await;

        assert!(matches!(
            f.moderation
                .submit(Actor::new(client_id, Role::Client), ContentKind::Routine, routine("R"))
                .await,
            Err(HubError::Forbidden(_))
        ));
        assert!(matches!(
            f.moderation
                .submit(f.trainer, ContentKind::Routine, routine("  "))
                .await,
            Err(HubError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_review_failure_keeps_content() {
        let f = fixture().await;
        // Occupy the pending slot the first routine will need
        sqlx::query(
            "INSERT INTO content_review (content_type, content_id, state, created_at) VALUES ('routine', 1, 'pending', ?1)",
        )
        .bind(Utc::now())
        .execute(&f.pool)
        .await
        .unwrap();

        let outcome = f.moderation.submit(f.trainer, ContentKind::Routine, routine("R")).await.unwrap();
        assert_eq!(outcome.content.id, 1);
        assert!(outcome.review.is_none());
        assert!(f.store.get(outcome.content.reference()).await.is_ok());
    }

    #[tokio::test]
    async fn test_approve_content_synthesizes_review() {
        let f = fixture().await;
        let trainer_id = f.store.trainer_for_principal(f.trainer.principal_id).await.unwrap().unwrap().id;
        let mut conn = f.pool.acquire().await.unwrap();
        let content = content::insert_content(&mut conn, ContentKind::Routine, trainer_id, &routine("drift"))
            .await
            .unwrap();
        drop(conn);

        let review = f.moderation.approve_content(f.admin, content.reference()).await.unwrap();
        assert_eq!(review.state, ReviewState::Accepted);
        assert_eq!(review.submitted_by, None);
        assert!(f.store.get(content.reference()).await.unwrap().published);

        assert!(matches!(
            f.moderation.approve_content(f.admin, content.reference()).await,
            Err(HubError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_reject_content_takes_down_published() {
        let f = fixture().await;
        let outcome = f.moderation.submit(f.trainer, ContentKind::Plan, routine("P")).await.unwrap();
        let reference = outcome.content.reference();
        f.moderation.approve_content(f.admin, reference).await.unwrap();

        let review = f.moderation.reject_content(f.admin, reference).await.unwrap();
        assert_eq!(review.state, ReviewState::Rejected);
        assert!(f.store.get(reference).await.is_err());
        assert_eq!(review_states(&f.pool, reference).await, vec!["accepted", "rejected"]);

        // No published content is left with a rejected review
        let leaked: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM plan p JOIN content_review r ON r.content_type = 'plan' AND r.content_id = p.id \
             WHERE p.published = 1 AND r.state = 'rejected'",
        )
        .fetch_one(&f.pool)
        .await
        .unwrap();
        assert_eq!(leaked, 0);
    }

    #[tokio::test]
    async fn test_request_review() {
        let f = fixture().await;
        let outcome = f.moderation.submit(f.trainer, ContentKind::Routine, routine("R")).await.unwrap();
        let reference = outcome.content.reference();

        assert!(matches!(
            f.moderation.request_review(f.trainer, reference).await,
            Err(HubError::Conflict(_))
        ));

        let other = insert_principal(&f.pool, "other@example.com").await;
        assert!(matches!(
            f.moderation.request_review(Actor::new(other, Role::Trainer), reference).await,
            Err(HubError::Forbidden(_))
        ));

        f.moderation.approve_content(f.admin, reference).await.unwrap();
        assert!(matches!(
            f.moderation.request_review(f.trainer, reference).await,
            Err(HubError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_list_pending_and_history() {
        let f = fixture().await;
        let first = f.moderation.submit(f.trainer, ContentKind::Routine, routine("R1")).await.unwrap();
        let second = f.moderation.submit(f.trainer, ContentKind::Plan, routine("P1")).await.unwrap();

        let pending = f.moderation.list_pending(f.admin).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].content_name, "R1");
        assert_eq!(pending[0].trainer_name, "coach");
        assert_eq!(pending[1].review.content(), second.content.reference());

        f.moderation.approve(f.admin, first.review.unwrap().id).await.unwrap();
        assert_eq!(f.moderation.list_pending(f.admin).await.unwrap().len(), 1);

        let history = f.moderation.history(f.trainer, first.content.reference()).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].state, ReviewState::Accepted);

        let stranger = insert_principal(&f.pool, "x@example.com").await;
        assert!(matches!(
            f.moderation.history(Actor::new(stranger, Role::Client), first.content.reference()).await,
            Err(HubError::Forbidden(_))
        ));
    }
}
