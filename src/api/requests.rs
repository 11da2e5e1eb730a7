/// Subscription request endpoints
use crate::{
    auth::AuthContext,
    context::AppContext,
    error::HubResult,
    subscription::{AcceptedClient, Decision, SubscriptionRequest},
};
use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;

/// Build request routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/requests/mine", get(list_mine))
        .route("/api/requests/pending", get(list_pending))
        .route("/api/requests/accepted", get(list_accepted))
        .route("/api/requests/:id", put(respond).delete(cancel))
}

#[derive(Debug, Deserialize)]
pub struct RespondBody {
    pub decision: Decision,
}

async fn list_mine(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> HubResult<Json<Vec<SubscriptionRequest>>> {
    Ok(Json(
        ctx.subscription_manager.list_for_client(auth.actor).await?,
    ))
}

async fn list_pending(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> HubResult<Json<Vec<SubscriptionRequest>>> {
    Ok(Json(
        ctx.subscription_manager
            .list_pending_for_trainer(auth.actor)
            .await?,
    ))
}

async fn list_accepted(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> HubResult<Json<Vec<AcceptedClient>>> {
    Ok(Json(
        ctx.subscription_manager
            .list_accepted_for_trainer(auth.actor)
            .await?,
    ))
}

async fn respond(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    auth: AuthContext,
    Json(body): Json<RespondBody>,
) -> HubResult<Json<SubscriptionRequest>> {
    let request = ctx
        .subscription_manager
        .trainer_respond(auth.actor, id, body.decision)
        .await?;
    Ok(Json(request))
}

async fn cancel(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    auth: AuthContext,
) -> HubResult<Json<SubscriptionRequest>> {
    Ok(Json(ctx.subscription_manager.cancel(auth.actor, id).await?))
}
