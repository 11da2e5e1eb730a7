/// Content endpoints: submission, browsing, owner edits and access requests
use crate::{
    auth::{AuthContext, OptionalAuthContext},
    content::{Content, ContentDetails, ContentKind, ContentRef, NewContent},
    context::AppContext,
    error::{HubError, HubResult},
    moderation::{ContentReview, SubmitOutcome},
    subscription::SubscriptionRequest,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

/// Build content routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/content/:kind", post(submit).get(list_published))
        .route(
            "/api/content/:kind/:id",
            get(get_content).put(update_content).delete(delete_content),
        )
        .route("/api/content/:kind/:id/review", post(request_review))
        .route("/api/content/:kind/:id/reviews", get(review_history))
        .route("/api/content/:kind/:id/requests", post(request_access))
        .route("/api/trainer/content/:kind", get(list_owned))
}

#[derive(Debug, Deserialize)]
pub struct AccessRequestBody {
    #[serde(default)]
    pub note: Option<String>,
}

fn content_ref(kind: &str, id: i64) -> HubResult<ContentRef> {
    Ok(ContentRef::new(ContentKind::from_str(kind)?, id))
}

async fn submit(
    State(ctx): State<AppContext>,
    Path(kind): Path<String>,
    auth: AuthContext,
    Json(req): Json<NewContent>,
) -> HubResult<(StatusCode, Json<SubmitOutcome>)> {
    let kind = ContentKind::from_str(&kind)?;
    let outcome = ctx.moderation_manager.submit(auth.actor, kind, req).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn list_published(
    State(ctx): State<AppContext>,
    Path(kind): Path<String>,
) -> HubResult<Json<Vec<Content>>> {
    let kind = ContentKind::from_str(&kind)?;
    Ok(Json(ctx.content_store.list_published(kind).await?))
}

async fn list_owned(
    State(ctx): State<AppContext>,
    Path(kind): Path<String>,
    auth: AuthContext,
) -> HubResult<Json<Vec<Content>>> {
    let kind = ContentKind::from_str(&kind)?;
    ctx.content_store
        .trainer_for_principal(auth.actor.principal_id)
        .await?
        .ok_or_else(|| HubError::Forbidden("Trainer membership required".to_string()))?;

    Ok(Json(
        ctx.content_store
            .list_owned(auth.actor.principal_id, kind)
            .await?,
    ))
}

/// Published content is public; anything else needs owner, Admin or an accepted request
async fn get_content(
    State(ctx): State<AppContext>,
    Path((kind, id)): Path<(String, i64)>,
    auth: OptionalAuthContext,
) -> HubResult<Json<Content>> {
    let reference = content_ref(&kind, id)?;

    let content = match auth.actor() {
        None => ctx.content_store.get_visible(None, reference).await?,
        Some(actor) => {
            if !ctx.subscription_manager.has_access(actor, reference).await? {
                return Err(HubError::NotFound(format!("Content {} not found", reference)));
            }
            ctx.content_store.get(reference).await?
        }
    };

    Ok(Json(content))
}

async fn update_content(
    State(ctx): State<AppContext>,
    Path((kind, id)): Path<(String, i64)>,
    auth: AuthContext,
    Json(details): Json<ContentDetails>,
) -> HubResult<Json<Content>> {
    let reference = content_ref(&kind, id)?;
    let content = ctx
        .content_store
        .update_details(auth.actor, reference, details)
        .await?;
    Ok(Json(content))
}

async fn delete_content(
    State(ctx): State<AppContext>,
    Path((kind, id)): Path<(String, i64)>,
    auth: AuthContext,
) -> HubResult<StatusCode> {
    let reference = content_ref(&kind, id)?;
    ctx.content_store.delete(auth.actor, reference).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn request_review(
    State(ctx): State<AppContext>,
    Path((kind, id)): Path<(String, i64)>,
    auth: AuthContext,
) -> HubResult<(StatusCode, Json<ContentReview>)> {
    let reference = content_ref(&kind, id)?;
    let review = ctx
        .moderation_manager
        .request_review(auth.actor, reference)
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

async fn review_history(
    State(ctx): State<AppContext>,
    Path((kind, id)): Path<(String, i64)>,
    auth: AuthContext,
) -> HubResult<Json<Vec<ContentReview>>> {
    let reference = content_ref(&kind, id)?;
    Ok(Json(
        ctx.moderation_manager.history(auth.actor, reference).await?,
    ))
}

async fn request_access(
    State(ctx): State<AppContext>,
    Path((kind, id)): Path<(String, i64)>,
    auth: AuthContext,
    body: Option<Json<AccessRequestBody>>,
) -> HubResult<(StatusCode, Json<SubscriptionRequest>)> {
    let reference = content_ref(&kind, id)?;
    let note = body.and_then(|Json(body)| body.note);

    let request = ctx
        .subscription_manager
        .request_access(auth.actor, reference, note)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}
