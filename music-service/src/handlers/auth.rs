use crate::dtos::{GenericResponse, LoginRequest, RegisterRequest, TokenResponse, UserResponse};
use crate::middleware::auth::{ACCESS_TOKEN_COOKIE, AuthUser};
use crate::models::User;
use crate::startup::AppState;
use axum::{
    Json,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use mongodb::bson::doc;
use service_core::error::AppError;
use validator::Validate;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<GenericResponse>, AppError> {
    req.validate()?;

    if state
        .db
        .users()
        .find_one(doc! { "username": &req.username }, None)
        .await?
        .is_some()
    {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Username already exists"
        )));
    }

    let user = User {
        id: None,
        username: req.username,
        email: Some(req.email),
        password_hash: crate::utils::hash_password(&req.password)?,
        is_admin: false,
        created_at: Utc::now(),
        last_login: None,
    };
    state.db.users().insert_one(&user, None).await?;

    Ok(Json(GenericResponse {
        message: "Registered successfully".to_string(),
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let invalid = || AppError::BadRequest(anyhow::anyhow!("Invalid username or password"));

    let user = state
        .db
        .users()
        .find_one(doc! { "username": &req.username }, None)
        .await?
        .ok_or_else(invalid)?;

    if !crate::utils::verify_password(&req.password, &user.password_hash) {
        return Err(invalid());
    }

    state
        .db
        .users()
        .update_one(
            doc! { "username": &user.username },
            doc! { "$set": { "last_login": mongodb::bson::DateTime::now() } },
            None,
        )
        .await?;

    let expire_minutes = state.config.auth.access_token_expire_minutes;
    let token = crate::utils::create_access_token(
        &user.username,
        &state.config.auth.secret_key,
        expire_minutes,
    )?;

    // httponly + lax: the cookie is for the web player, the JSON body for
    // API clients
    let cookie = format!(
        "{ACCESS_TOKEN_COOKIE}={token}; HttpOnly; Secure; SameSite=Lax; Max-Age={}; Path=/",
        expire_minutes * 60
    );

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(TokenResponse {
            access_token: token,
            token_type: "bearer".to_string(),
        }),
    )
        .into_response())
}

pub async fn logout() -> Response {
    let cookie = format!("{ACCESS_TOKEN_COOKIE}=; HttpOnly; Secure; SameSite=Lax; Max-Age=0; Path=/");
    (
        [(header::SET_COOKIE, cookie)],
        Json(GenericResponse {
            message: "Logged out successfully".to_string(),
        }),
    )
        .into_response()
}

pub async fn get_me(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<UserResponse>, AppError> {
    let user = state
        .db
        .users()
        .find_one(doc! { "username": &auth_user.username }, None)
        .await?
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("unknown user")))?;

    Ok(Json(UserResponse {
        username: user.username,
        email: user.email,
    }))
}
