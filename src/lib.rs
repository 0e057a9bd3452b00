pub mod authentication;
pub mod config;
pub mod crud_ops;
pub mod database;
pub mod entities;
pub mod error;
pub mod repository;

use axum::{
    extract::Extension,
    middleware,
    routing::{get, post, put},
    Router,
};
use sqlx::SqlitePool;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub fn app(sqlite_pool: SqlitePool) -> Router {
    let protected = Router::new()
        .route("/auth/logout/", post(authentication::sign_out))
        .route(
            "/todo/{id}/",
            put(crud_ops::update_todo).delete(crud_ops::delete_todo),
        )
        .route("/todo/{id}/complete/", post(crud_ops::complete_todo))
        .route_layer(middleware::from_fn(authentication::require_authenticated));

    Router::new()
        .route("/auth/register", post(authentication::sign_up))
        .route("/auth/login/", post(authentication::sign_in))
        .route("/todo/", get(crud_ops::get_todos).post(crud_ops::create_todo))
        .merge(protected)
        .layer(middleware::from_fn(authentication::resolve_current_user))
        .layer(Extension(sqlite_pool))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(listener: TcpListener, sqlite_pool: SqlitePool) -> std::io::Result<()> {
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app(sqlite_pool)).await
}
