use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
}

/// A bearer token bound to a user. `session_id` is the token itself.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    pub session_id: String,
}

/// A to-do item. `username` and `email` are free text supplied by the client,
/// they do not reference `users`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Todo {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub text: String,
    pub is_completed: bool,
    pub is_edited: bool,
}

impl Todo {
    pub fn new(username: String, email: String, text: String) -> Self {
        Self {
            id: 0,
            username,
            email,
            text,
            is_completed: false,
            is_edited: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateTodoRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTodoRequest {
    pub text: Option<String>,
}

// query values stay raw strings, anything that doesn't parse falls back to a default
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<String>,
    pub per_page: Option<String>,
    pub sort_field: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn success() -> Self {
        Self {
            status: "success".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoPage {
    pub todos: Vec<Todo>,
    pub total_pages: i64,
    pub current_page: i64,
}

impl TodoPage {
    /// Returned whenever the table is empty, whatever page was asked for.
    pub fn empty() -> Self {
        Self {
            todos: Vec::new(),
            total_pages: 0,
            current_page: 0,
        }
    }
}
