use crate::{
    entities::User,
    repository::{Repository, Users},
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::{str::FromStr, time::Duration};

pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let sqlite_pool = SqlitePoolOptions::new().connect_with(options).await?;
    migrate(&sqlite_pool).await?;
    Ok(sqlite_pool)
}

/// A private in-memory database. Each sqlite memory connection is its own
/// database, so the pool is pinned to a single connection that never expires.
pub async fn memory() -> Result<SqlitePool, sqlx::Error> {
    let sqlite_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None::<Duration>)
        .max_lifetime(None::<Duration>)
        .connect("sqlite::memory:")
        .await?;
    migrate(&sqlite_pool).await?;
    Ok(sqlite_pool)
}

async fn migrate(sqlite_pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations").run(sqlite_pool).await?;
    Ok(())
}

/// Wipes every table and creates a single administrator account.
pub async fn reset(
    sqlite_pool: &SqlitePool,
    admin_username: &str,
    admin_password: &str,
) -> Result<i64, sqlx::Error> {
    let mut tx = sqlite_pool.begin().await?;

    sqlx::query("DELETE FROM sessions").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM todos").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM users").execute(&mut *tx).await?;

    let admin = User {
        id: 0,
        username: admin_username.to_owned(),
        password_hash: password_auth::generate_hash(admin_password),
    };
    let admin_id = Users::insert(&mut tx, &admin).await?;

    tx.commit().await?;
    tracing::info!("database reset, admin user {} created", admin_username);
    Ok(admin_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reset_leaves_only_the_admin() {
        let sqlite_pool = memory().await.unwrap();
        reset(&sqlite_pool, "first", "pw").await.unwrap();
        sqlx::query("INSERT INTO todos (username, email, text) VALUES ('a', 'a@b.co', 't')")
            .execute(&sqlite_pool)
            .await
            .unwrap();

        let admin_id = reset(&sqlite_pool, "admin", "123").await.unwrap();

        let mut conn = sqlite_pool.acquire().await.unwrap();
        let admin = Users::find_by_id(&mut conn, admin_id).await.unwrap().unwrap();
        assert_eq!(admin.username, "admin");
        assert!(password_auth::verify_password("123", &admin.password_hash).is_ok());
        assert!(Users::find_by_username(&mut conn, "first").await.unwrap().is_none());

        let todos: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM todos")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(todos, 0);
    }
}
