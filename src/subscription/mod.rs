//! Client access requests for trainer content.
//!
//! A request is `pending` until the owning trainer accepts or rejects it, or
//! until the client cancels it. Routine requests are accepted on creation.
//! Final states are never reopened; asking again creates a new request.

use crate::auth::Actor;
use crate::content::{self, ContentKind, ContentRef};
use crate::error::{HubError, HubResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Pending => "pending",
            RequestState::Accepted => "accepted",
            RequestState::Rejected => "rejected",
            RequestState::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> HubResult<Self> {
        match s {
            "pending" => Ok(RequestState::Pending),
            "accepted" => Ok(RequestState::Accepted),
            "rejected" => Ok(RequestState::Rejected),
            "cancelled" => Ok(RequestState::Cancelled),
            _ => Err(HubError::Validation(format!("Invalid request state: {}", s))),
        }
    }
}

/// Trainer's answer to a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accepted,
    Rejected,
}

impl Decision {
    pub fn state(&self) -> RequestState {
        match self {
            Decision::Accepted => RequestState::Accepted,
            Decision::Rejected => RequestState::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub id: i64,
    pub client_id: i64,
    pub content_type: ContentKind,
    pub content_id: i64,
    pub state: RequestState,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionRequest {
    pub fn content(&self) -> ContentRef {
        ContentRef::new(self.content_type, self.content_id)
    }

    fn from_row(row: &SqliteRow) -> HubResult<Self> {
        let routine_id: Option<i64> = row.get("routine_id");
        let plan_id: Option<i64> = row.get("plan_id");
        let id: i64 = row.get("id");

        let reference = match (routine_id, plan_id) {
            (Some(id), None) => ContentRef::routine(id),
            (None, Some(id)) => ContentRef::plan(id),
            _ => {
                return Err(HubError::Internal(format!(
                    "Request {} does not reference exactly one content item",
                    id
                )))
            }
        };
        let state: String = row.get("state");

        Ok(Self {
            id,
            client_id: row.get("client_id"),
            content_type: reference.kind,
            content_id: reference.id,
            state: RequestState::from_str(&state)?,
            note: row.get("note"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

/// Accepted request as seen by the owning trainer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedClient {
    pub request_id: i64,
    pub content_type: ContentKind,
    pub content_id: i64,
    pub content_name: String,
    pub client_id: i64,
    pub principal_id: i64,
    pub display_name: String,
    pub accepted_at: DateTime<Utc>,
}

impl AcceptedClient {
    pub fn content(&self) -> ContentRef {
        ContentRef::new(self.content_type, self.content_id)
    }
}

const REQUEST_COLUMNS: &str =
    "s.id, s.client_id, s.routine_id, s.plan_id, s.state, s.note, s.created_at, s.updated_at";

/// Request row together with the principal owning its client membership
async fn fetch_request(
    conn: &mut SqliteConnection,
    request_id: i64,
) -> HubResult<(SubscriptionRequest, i64)> {
    let row = sqlx::query(&format!(
        "SELECT {}, c.principal_id AS requester FROM subscription_request s \
         JOIN client c ON c.id = s.client_id WHERE s.id = ?1",
        REQUEST_COLUMNS
    ))
    .bind(request_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| HubError::NotFound(format!("Request {} not found", request_id)))?;

    Ok((SubscriptionRequest::from_row(&row)?, row.get("requester")))
}

async fn update_state(
    conn: &mut SqliteConnection,
    request: &SubscriptionRequest,
    state: RequestState,
    only_if_pending: bool,
) -> HubResult<SubscriptionRequest> {
    let now = Utc::now();
    let sql = if only_if_pending {
        "UPDATE subscription_request SET state = ?1, updated_at = ?2 WHERE id = ?3 AND state = 'pending'"
    } else {
        "UPDATE subscription_request SET state = ?1, updated_at = ?2 WHERE id = ?3"
    };

    let result = sqlx::query(sql)
        .bind(state.as_str())
        .bind(now)
        .bind(request.id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(HubError::Conflict(format!(
            "Request {} is no longer pending",
            request.id
        )));
    }

    Ok(SubscriptionRequest {
        state,
        updated_at: now,
        ..request.clone()
    })
}

/// Subscription request workflow manager
#[derive(Clone)]
pub struct SubscriptionManager {
    db: SqlitePool,
}

impl SubscriptionManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Ask for access to a routine or plan.
    ///
    /// The caller's client membership is created when missing. A routine
    /// request is accepted immediately; a plan request stays pending until the
    /// owning trainer responds. An existing pending or accepted request for the
    /// same content is a Conflict.
    pub async fn request_access(
        &self,
        client: Actor,
        reference: ContentRef,
        note: Option<String>,
    ) -> HubResult<SubscriptionRequest> {
        let mut tx = self.db.begin().await?;

        content::fetch_minimal(&mut tx, reference)
            .await?
            .ok_or_else(|| HubError::NotFound(format!("Content {} not found", reference)))?;

        let now = Utc::now();
        let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM client WHERE principal_id = ?1")
            .bind(client.principal_id)
            .fetch_optional(&mut *tx)
            .await?;
        let client_id = match existing {
            Some(id) => id,
            None => {
                let id = sqlx::query("INSERT INTO client (principal_id, created_at) VALUES (?1, ?2)")
                    .bind(client.principal_id)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?
                    .last_insert_rowid();
                tracing::info!(principal_id = client.principal_id, client_id = id, "client membership provisioned");
                id
            }
        };

        let column = reference.kind.request_column();
        let active: i64 = sqlx::query_scalar(&format!(
            "SELECT EXISTS(SELECT 1 FROM subscription_request \
             WHERE client_id = ?1 AND {} = ?2 AND state IN ('pending', 'accepted'))",
            column
        ))
        .bind(client_id)
        .bind(reference.id)
        .fetch_one(&mut *tx)
        .await?;
        if active != 0 {
            return Err(HubError::Conflict(format!(
                "An active request for {} already exists",
                reference
            )));
        }

        let state = if reference.kind.auto_accepts_requests() {
            RequestState::Accepted
        } else {
            RequestState::Pending
        };

        let id = sqlx::query(&format!(
            "INSERT INTO subscription_request (client_id, {}, state, note, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            column
        ))
        .bind(client_id)
        .bind(reference.id)
        .bind(state.as_str())
        .bind(&note)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        tx.commit().await?;

        tracing::info!(request_id = id, content = %reference, state = state.as_str(), "access requested");

        Ok(SubscriptionRequest {
            id,
            client_id,
            content_type: reference.kind,
            content_id: reference.id,
            state,
            note,
            created_at: now,
            updated_at: now,
        })
    }

    /// Accept or reject a pending request for content the trainer owns
    pub async fn trainer_respond(
        &self,
        trainer: Actor,
        request_id: i64,
        decision: Decision,
    ) -> HubResult<SubscriptionRequest> {
        let mut tx = self.db.begin().await?;

        let (request, _) = fetch_request(&mut tx, request_id).await?;
        let owner = content::fetch_minimal(&mut tx, request.content())
            .await?
            .ok_or_else(|| HubError::NotFound(format!("Content {} not found", request.content())))?;
        if !owner.is_owned_by(trainer.principal_id) {
            return Err(HubError::Forbidden(format!(
                "Not the owner of {}",
                request.content()
            )));
        }

        let updated = update_state(&mut tx, &request, decision.state(), true).await?;
        tx.commit().await?;

        tracing::info!(request_id, decision = updated.state.as_str(), trainer = trainer.principal_id, "request answered");
        Ok(updated)
    }

    /// Cancel a request from any state. Cancelling twice is a no-op.
    pub async fn cancel(&self, client: Actor, request_id: i64) -> HubResult<SubscriptionRequest> {
        let mut tx = self.db.begin().await?;

        let (request, requester) = fetch_request(&mut tx, request_id).await?;
        if requester != client.principal_id {
            return Err(HubError::Forbidden(format!(
                "Request {} belongs to another client",
                request_id
            )));
        }
        if request.state == RequestState::Cancelled {
            return Ok(request);
        }

        let updated = update_state(&mut tx, &request, RequestState::Cancelled, false).await?;
        tx.commit().await?;

        tracing::info!(request_id, previous = request.state.as_str(), "request cancelled");
        Ok(updated)
    }

    /// Whether the principal may see the content: owner, Admin, published,
    /// or holder of an accepted request
    pub async fn has_access(&self, principal: Actor, reference: ContentRef) -> HubResult<bool> {
        let mut conn = self.db.acquire().await?;

        let owner = content::fetch_minimal(&mut conn, reference)
            .await?
            .ok_or_else(|| HubError::NotFound(format!("Content {} not found", reference)))?;

        if owner.is_owned_by(principal.principal_id) || principal.is_admin() || owner.published {
            return Ok(true);
        }

        let accepted: i64 = sqlx::query_scalar(&format!(
            "SELECT EXISTS(SELECT 1 FROM subscription_request s JOIN client c ON c.id = s.client_id \
             WHERE c.principal_id = ?1 AND s.{} = ?2 AND s.state = 'accepted')",
            reference.kind.request_column()
        ))
        .bind(principal.principal_id)
        .bind(reference.id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(accepted != 0)
    }

    /// The caller's own requests, newest first
    pub async fn list_for_client(&self, client: Actor) -> HubResult<Vec<SubscriptionRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM subscription_request s JOIN client c ON c.id = s.client_id \
             WHERE c.principal_id = ?1 ORDER BY s.created_at DESC, s.id DESC",
            REQUEST_COLUMNS
        ))
        .bind(client.principal_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(SubscriptionRequest::from_row).collect()
    }

    /// Pending requests on content owned by the trainer, oldest first
    pub async fn list_pending_for_trainer(&self, trainer: Actor) -> HubResult<Vec<SubscriptionRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM subscription_request s \
             LEFT JOIN routine r ON r.id = s.routine_id \
             LEFT JOIN plan p ON p.id = s.plan_id \
             JOIN trainer t ON t.id = COALESCE(r.trainer_id, p.trainer_id) \
             WHERE t.principal_id = ?1 AND s.state = 'pending' \
             ORDER BY s.created_at, s.id",
            REQUEST_COLUMNS
        ))
        .bind(trainer.principal_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(SubscriptionRequest::from_row).collect()
    }

    /// Clients holding an accepted request on any of the trainer's content
    pub async fn list_accepted_for_trainer(&self, trainer: Actor) -> HubResult<Vec<AcceptedClient>> {
        let rows = sqlx::query(
            "SELECT s.id, s.client_id, s.routine_id, s.plan_id, s.updated_at, \
                    COALESCE(r.name, p.name) AS content_name, \
                    u.id AS principal_id, u.display_name \
             FROM subscription_request s \
             LEFT JOIN routine r ON r.id = s.routine_id \
             LEFT JOIN plan p ON p.id = s.plan_id \
             JOIN trainer t ON t.id = COALESCE(r.trainer_id, p.trainer_id) \
             JOIN client c ON c.id = s.client_id \
             JOIN principal u ON u.id = c.principal_id \
             WHERE t.principal_id = ?1 AND s.state = 'accepted' \
             ORDER BY s.updated_at DESC, s.id DESC",
        )
        .bind(trainer.principal_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter()
            .map(|row| {
                let reference = match (row.get::<Option<i64>, _>("routine_id"), row.get::<Option<i64>, _>("plan_id")) {
                    (Some(id), None) => ContentRef::routine(id),
                    (None, Some(id)) => ContentRef::plan(id),
                    _ => {
                        return Err(HubError::Internal(
                            "Accepted request does not reference exactly one content item".to_string(),
                        ))
                    }
                };
                Ok(AcceptedClient {
                    request_id: row.get("id"),
                    content_type: reference.kind,
                    content_id: reference.id,
                    content_name: row.get("content_name"),
                    client_id: row.get("client_id"),
                    principal_id: row.get("principal_id"),
                    display_name: row.get("display_name"),
                    accepted_at: row.get("updated_at"),
                })
            })
            .collect()
    }
}
