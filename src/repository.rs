use crate::entities::{Session, Todo, User};
use sqlx::SqliteConnection;

/// Row access for a single table. Every call takes a bare connection so the
/// same code runs on a pooled connection or inside a transaction.
#[async_trait::async_trait]
pub trait Repository {
    type Record: Send + Sync;

    async fn find_by_id(
        conn: &mut SqliteConnection,
        id: i64,
    ) -> Result<Option<Self::Record>, sqlx::Error>;

    /// Inserts `record` ignoring its `id`, returns the id the store assigned.
    async fn insert(conn: &mut SqliteConnection, record: &Self::Record)
        -> Result<i64, sqlx::Error>;

    /// Returns the number of rows written, 0 when the id is gone.
    async fn update(conn: &mut SqliteConnection, record: &Self::Record)
        -> Result<u64, sqlx::Error>;

    async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<u64, sqlx::Error>;
}

pub struct Users;

impl Users {
    pub async fn find_by_username(
        conn: &mut SqliteConnection,
        username: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as("SELECT id, username, password_hash FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(conn)
            .await
    }
}

#[async_trait::async_trait]
impl Repository for Users {
    type Record = User;

    async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as("SELECT id, username, password_hash FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    async fn insert(conn: &mut SqliteConnection, user: &User) -> Result<i64, sqlx::Error> {
        let result = sqlx::query("INSERT INTO users (username, password_hash) VALUES (?, ?)")
            .bind(&user.username)
            .bind(&user.password_hash)
            .execute(conn)
            .await?;
        Ok(result.last_insert_rowid())
    }

    async fn update(conn: &mut SqliteConnection, user: &User) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET username = ?, password_hash = ? WHERE id = ?")
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(user.id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }
}

pub struct Sessions;

impl Sessions {
    pub async fn find_by_user_id(
        conn: &mut SqliteConnection,
        user_id: i64,
    ) -> Result<Option<Session>, sqlx::Error> {
        sqlx::query_as("SELECT id, user_id, session_id FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(conn)
            .await
    }

    pub async fn find_by_token(
        conn: &mut SqliteConnection,
        token: &str,
    ) -> Result<Option<Session>, sqlx::Error> {
        sqlx::query_as("SELECT id, user_id, session_id FROM sessions WHERE session_id = ?")
            .bind(token)
            .fetch_optional(conn)
            .await
    }

    /// Points the user's single session row at `token`, creating the row on
    /// first login. One statement, so overlapping logins serialize on the
    /// write lock and the last one wins.
    pub async fn upsert(
        conn: &mut SqliteConnection,
        user_id: i64,
        token: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO sessions (user_id, session_id) VALUES (?, ?) \
             ON CONFLICT (user_id) DO UPDATE SET session_id = excluded.session_id",
        )
        .bind(user_id)
        .bind(token)
        .execute(conn)
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Repository for Sessions {
    type Record = Session;

    async fn find_by_id(
        conn: &mut SqliteConnection,
        id: i64,
    ) -> Result<Option<Session>, sqlx::Error> {
        sqlx::query_as("SELECT id, user_id, session_id FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    async fn insert(conn: &mut SqliteConnection, session: &Session) -> Result<i64, sqlx::Error> {
        let result = sqlx::query("INSERT INTO sessions (user_id, session_id) VALUES (?, ?)")
            .bind(session.user_id)
            .bind(&session.session_id)
            .execute(conn)
            .await?;
        Ok(result.last_insert_rowid())
    }

    async fn update(conn: &mut SqliteConnection, session: &Session) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE sessions SET user_id = ?, session_id = ? WHERE id = ?")
            .bind(session.user_id)
            .bind(&session.session_id)
            .bind(session.id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Columns a listing may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Id,
    Username,
    Email,
    IsCompleted,
}

impl SortColumn {
    pub fn parse(field: &str) -> Option<Self> {
        match field {
            "id" => Some(Self::Id),
            "username" => Some(Self::Username),
            "email" => Some(Self::Email),
            "is_completed" => Some(Self::IsCompleted),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Username => "username",
            Self::Email => "email",
            Self::IsCompleted => "is_completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub column: SortColumn,
    pub descending: bool,
}

impl SortOrder {
    // column names come from a closed enum, never from the request
    fn order_by(self) -> String {
        let direction = if self.descending { "DESC" } else { "ASC" };
        match self.column {
            SortColumn::Id => format!("id {direction}"),
            column => format!("{} {direction}, id ASC", column.column()),
        }
    }
}

pub struct Todos;

impl Todos {
    pub async fn count(conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM todos")
            .fetch_one(conn)
            .await
    }

    pub async fn page(
        conn: &mut SqliteConnection,
        order: SortOrder,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Todo>, sqlx::Error> {
        let sql = format!(
            "SELECT id, username, email, text, is_completed, is_edited FROM todos ORDER BY {} LIMIT ? OFFSET ?",
            order.order_by()
        );
        sqlx::query_as(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(conn)
            .await
    }
}

#[async_trait::async_trait]
impl Repository for Todos {
    type Record = Todo;

    async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<Todo>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, username, email, text, is_completed, is_edited FROM todos WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    async fn insert(conn: &mut SqliteConnection, todo: &Todo) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO todos (username, email, text, is_completed, is_edited) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&todo.username)
        .bind(&todo.email)
        .bind(&todo.text)
        .bind(todo.is_completed)
        .bind(todo.is_edited)
        .execute(conn)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn update(conn: &mut SqliteConnection, todo: &Todo) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE todos SET username = ?, email = ?, text = ?, is_completed = ?, is_edited = ? WHERE id = ?",
        )
        .bind(&todo.username)
        .bind(&todo.email)
        .bind(&todo.text)
        .bind(todo.is_completed)
        .bind(todo.is_edited)
        .bind(todo.id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM todos WHERE id = ?")
            .bind(id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }
}
