/// Registration and session endpoints
use crate::{
    account::{ChangePasswordRequest, LoginRequest, RegisterRequest, SessionResponse, TrainerProfileUpdate},
    api::middleware::extract_bearer_token,
    auth::{AuthContext, Role},
    context::AppContext,
    db::account::{Principal, TrainerProfile},
    error::{HubError, HubResult},
};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

/// Build session routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/session", get(get_session))
        .route("/api/auth/password", put(change_password))
        .route("/api/trainers", get(list_trainers))
        .route("/api/trainers/:id", get(get_trainer))
        .route(
            "/api/trainer/profile",
            get(get_own_profile).put(update_own_profile),
        )
}

/// Current session: stored principal plus the role snapshot in the token
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionInfo {
    pub principal: Principal,
    pub role: Role,
}

async fn register(
    State(ctx): State<AppContext>,
    Json(req): Json<RegisterRequest>,
) -> HubResult<(StatusCode, Json<Principal>)> {
    let principal = ctx.account_manager.register(req).await?;
    Ok((StatusCode::CREATED, Json(principal)))
}

async fn login(
    State(ctx): State<AppContext>,
    Json(req): Json<LoginRequest>,
) -> HubResult<Json<SessionResponse>> {
    let issued = ctx.account_manager.login(req).await?;
    Ok(Json(issued.into()))
}

/// Signature is required, expiry is not
async fn logout(State(ctx): State<AppContext>, headers: HeaderMap) -> HubResult<StatusCode> {
    let token = extract_bearer_token(&headers).ok_or_else(|| {
        HubError::AuthenticationRequired("Missing authorization header".to_string())
    })?;

    ctx.account_manager.logout(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_session(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> HubResult<Json<SessionInfo>> {
    let principal = ctx
        .account_manager
        .get_principal(auth.actor.principal_id)
        .await?;

    Ok(Json(SessionInfo {
        principal,
        role: auth.claims.role,
    }))
}

async fn change_password(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<ChangePasswordRequest>,
) -> HubResult<StatusCode> {
    ctx.account_manager.change_password(auth.actor, req).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_trainers(State(ctx): State<AppContext>) -> HubResult<Json<Vec<TrainerProfile>>> {
    Ok(Json(ctx.account_manager.list_trainers().await?))
}

async fn get_trainer(
    State(ctx): State<AppContext>,
    Path(principal_id): Path<i64>,
) -> HubResult<Json<TrainerProfile>> {
    Ok(Json(ctx.account_manager.trainer_profile(principal_id).await?))
}

async fn get_own_profile(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> HubResult<Json<TrainerProfile>> {
    Ok(Json(
        ctx.account_manager
            .trainer_profile(auth.actor.principal_id)
            .await?,
    ))
}

async fn update_own_profile(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(update): Json<TrainerProfileUpdate>,
) -> HubResult<Json<TrainerProfile>> {
    Ok(Json(
        ctx.account_manager
            .update_trainer_profile(auth.actor, update)
            .await?,
    ))
}
