use crate::{
    entities::{AuthRequest, Session, StatusResponse, TokenResponse, User},
    error::{ApiError, JsonBody},
    repository::{Repository, Sessions, Users},
};
use axum::{
    extract::{Extension, Request},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use rand::RngCore;
use sqlx::SqlitePool;

/// The user behind a bearer token, together with the session that token names.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user: User,
    pub session: Session,
}

/// Request-scoped result of token resolution. `None` means anonymous.
#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<Identity>);

impl CurrentUser {
    pub fn require(self) -> Result<Identity, ApiError> {
        self.0.ok_or(ApiError::Unauthorized)
    }
}

/// 16 bytes from the OS rng, hex encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Pulls the token out of `Authorization: Bearer <token>`. Any other scheme,
/// a missing header or an empty token yields `None`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?
        .split(' ')
        .next()
        .filter(|token| !token.is_empty())
}

pub async fn register(
    sqlite_pool: &SqlitePool,
    username: Option<String>,
    password: Option<String>,
) -> Result<(), ApiError> {
    let Some(username) = username.filter(|u| !u.is_empty()) else {
        return Err(ApiError::Validation("Username is required.".into()));
    };
    let Some(password) = password.filter(|p| !p.is_empty()) else {
        return Err(ApiError::Validation("Password is required.".into()));
    };

    // argon2 is slow on purpose, keep it off the async workers
    let password_hash =
        tokio::task::spawn_blocking(move || password_auth::generate_hash(password)).await?;

    let user = User {
        id: 0,
        username,
        password_hash,
    };
    let mut conn = sqlite_pool.acquire().await?;
    let user_id = Users::insert(&mut conn, &user).await?;

    tracing::info!(user_id, username = %user.username, "user registered");
    Ok(())
}

/// Checks the credentials and rotates the user's single session token.
/// Any token issued before stops resolving.
pub async fn login(
    sqlite_pool: &SqlitePool,
    username: Option<String>,
    password: Option<String>,
) -> Result<String, ApiError> {
    let user = match username.as_deref() {
        Some(username) => {
            let mut conn = sqlite_pool.acquire().await?;
            Users::find_by_username(&mut conn, username).await?
        }
        None => None,
    };
    let Some(user) = user else {
        return Err(ApiError::Auth("Incorrect username.".into()));
    };

    let password_hash = user.password_hash.clone();
    let verified = tokio::task::spawn_blocking(move || match password {
        Some(password) => password_auth::verify_password(password, &password_hash).is_ok(),
        None => false,
    })
    .await?;
    if !verified {
        return Err(ApiError::Auth("Incorrect password.".into()));
    }

    let token = generate_token();
    let mut conn = sqlite_pool.acquire().await?;
    Sessions::upsert(&mut conn, user.id, &token).await?;

    tracing::info!(user_id = user.id, "user logged in");
    Ok(token)
}

pub async fn logout(sqlite_pool: &SqlitePool, current_user: CurrentUser) -> Result<(), ApiError> {
    let identity = current_user.require()?;
    let mut conn = sqlite_pool.acquire().await?;
    Sessions::delete(&mut conn, identity.session.id).await?;

    tracing::info!(user_id = identity.user.id, "user logged out");
    Ok(())
}

/// Looks up the session named by `token` and the user it belongs to.
/// A dangling session (user gone) counts as no session.
pub async fn resolve_token(
    sqlite_pool: &SqlitePool,
    token: &str,
) -> Result<Option<Identity>, sqlx::Error> {
    let mut conn = sqlite_pool.acquire().await?;
    let Some(session) = Sessions::find_by_token(&mut conn, token).await? else {
        return Ok(None);
    };
    let user = Users::find_by_id(&mut conn, session.user_id).await?;
    Ok(user.map(|user| Identity { user, session }))
}

/// Runs in front of every route and attaches a [`CurrentUser`] to the request.
/// Unknown tokens and store failures both leave the request anonymous.
pub async fn resolve_current_user(
    Extension(sqlite_pool): Extension<SqlitePool>,
    mut request: Request,
    next: Next,
) -> Response {
    let identity = match bearer_token(request.headers()) {
        Some(token) => match resolve_token(&sqlite_pool, token).await {
            Ok(identity) => identity,
            Err(err) => {
                tracing::warn!("session lookup failed: {}", err);
                None
            }
        },
        None => None,
    };

    request.extensions_mut().insert(CurrentUser(identity));
    next.run(request).await
}

/// Guard for protected routes, answers 401 before the handler runs when
/// nobody is logged in.
pub async fn require_authenticated(request: Request, next: Next) -> Response {
    let authenticated = request
        .extensions()
        .get::<CurrentUser>()
        .is_some_and(|current| current.0.is_some());

    if !authenticated {
        return ApiError::Unauthorized.into_response();
    }
    next.run(request).await
}

pub async fn sign_up(
    Extension(sqlite_pool): Extension<SqlitePool>,
    JsonBody(auth_request): JsonBody<AuthRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    register(&sqlite_pool, auth_request.username, auth_request.password).await?;
    Ok(Json(StatusResponse::success()))
}

pub async fn sign_in(
    Extension(sqlite_pool): Extension<SqlitePool>,
    JsonBody(auth_request): JsonBody<AuthRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = login(&sqlite_pool, auth_request.username, auth_request.password).await?;
    Ok(Json(TokenResponse { token }))
}

pub async fn sign_out(
    Extension(sqlite_pool): Extension<SqlitePool>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<StatusResponse>, ApiError> {
    logout(&sqlite_pool, current_user).await?;
    Ok(Json(StatusResponse::success()))
}
