/// Admin endpoints: moderation decisions and account lifecycle
///
/// Rejecting content deletes it permanently. There is no undo.
use crate::{
    account::SetRoleRequest,
    auth::{AdminAuthContext, Role},
    content::{ContentKind, ContentRef},
    context::AppContext,
    db::account::Principal,
    error::HubResult,
    moderation::{ContentReview, PendingReview},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

/// Build admin routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/admin/reviews", get(list_pending_reviews))
        .route("/api/admin/reviews/:id/approve", post(approve_review))
        .route("/api/admin/reviews/:id/reject", post(reject_review))
        .route("/api/admin/content/:kind/:id/approve", post(approve_content))
        .route("/api/admin/content/:kind/:id/reject", post(reject_content))
        .route("/api/admin/principals/:id/role", post(set_role))
        .route("/api/admin/principals/:id/deactivate", post(deactivate))
        .route("/api/admin/principals/:id/reactivate", post(reactivate))
        .route("/api/admin/principals/:id", delete(hard_delete))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoleResponse {
    pub principal_id: i64,
    pub role: Role,
}

async fn list_pending_reviews(
    State(ctx): State<AppContext>,
    admin: AdminAuthContext,
) -> HubResult<Json<Vec<PendingReview>>> {
    Ok(Json(ctx.moderation_manager.list_pending(admin.actor).await?))
}

async fn approve_review(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    admin: AdminAuthContext,
) -> HubResult<Json<ContentReview>> {
    Ok(Json(ctx.moderation_manager.approve(admin.actor, id).await?))
}

async fn reject_review(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    admin: AdminAuthContext,
) -> HubResult<Json<ContentReview>> {
    Ok(Json(ctx.moderation_manager.reject(admin.actor, id).await?))
}

async fn approve_content(
    State(ctx): State<AppContext>,
    Path((kind, id)): Path<(String, i64)>,
    admin: AdminAuthContext,
) -> HubResult<Json<ContentReview>> {
    let reference = ContentRef::new(ContentKind::from_str(&kind)?, id);
    Ok(Json(
        ctx.moderation_manager
            .approve_content(admin.actor, reference)
            .await?,
    ))
}

async fn reject_content(
    State(ctx): State<AppContext>,
    Path((kind, id)): Path<(String, i64)>,
    admin: AdminAuthContext,
) -> HubResult<Json<ContentReview>> {
    let reference = ContentRef::new(ContentKind::from_str(&kind)?, id);
    Ok(Json(
        ctx.moderation_manager
            .reject_content(admin.actor, reference)
            .await?,
    ))
}

async fn set_role(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    admin: AdminAuthContext,
    Json(req): Json<SetRoleRequest>,
) -> HubResult<Json<RoleResponse>> {
    let role = ctx.account_manager.set_role(admin.actor, id, req.role).await?;
    Ok(Json(RoleResponse {
        principal_id: id,
        role,
    }))
}

async fn deactivate(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    admin: AdminAuthContext,
) -> HubResult<Json<Principal>> {
    Ok(Json(ctx.account_manager.deactivate(admin.actor, id).await?))
}

async fn reactivate(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    admin: AdminAuthContext,
) -> HubResult<Json<Principal>> {
    Ok(Json(ctx.account_manager.reactivate(admin.actor, id).await?))
}

async fn hard_delete(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    admin: AdminAuthContext,
) -> HubResult<StatusCode> {
    ctx.account_manager.hard_delete(admin.actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
