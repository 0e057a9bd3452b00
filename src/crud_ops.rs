use crate::{
    entities::{CreateTodoRequest, ListQuery, StatusResponse, Todo, TodoPage, UpdateTodoRequest},
    error::{ApiError, JsonBody, PathId},
    repository::{Repository, SortColumn, SortOrder, Todos},
};
use axum::{
    extract::{Extension, Query},
    Json,
};
use regex::Regex;
use sqlx::{SqliteConnection, SqlitePool};
use std::{num::IntErrorKind, sync::OnceLock};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PER_PAGE: i64 = 3;
/// Page size used when the client asks for zero or fewer rows per page.
pub const FALLBACK_PER_PAGE: i64 = 20;
pub const DEFAULT_SORT_FIELD: &str = "id";

// rejects values that are absent or empty, whitespace still counts as present
fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

static EMAIL_RE: OnceLock<Regex> = OnceLock::new();

// one `@`, and a dot in the domain with text on both sides
fn email_regex() -> &'static Regex {
    EMAIL_RE.get_or_init(|| {
        Regex::new(r"^[^@]+@[^@]+\.[^@]+$")
            .unwrap_or_else(|error| panic!("email regex failed to compile: {error}"))
    })
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

/// Checks a new to-do and reports the first rule broken, in the order
/// username, email presence, text, email format.
pub fn validate_new_todo(request: &CreateTodoRequest) -> Result<(), ApiError> {
    if present(request.username.as_deref()).is_none() {
        return Err(ApiError::Validation("Username is required.".into()));
    }
    let Some(email) = present(request.email.as_deref()) else {
        return Err(ApiError::Validation("Email is required.".into()));
    };
    if present(request.text.as_deref()).is_none() {
        return Err(ApiError::Validation("Text is required.".into()));
    }
    if !is_valid_email(email) {
        return Err(ApiError::Validation("Email is invalid.".into()));
    }
    Ok(())
}

/// Edits must carry text, and it must differ from what is stored.
pub fn validate_text_update<'a>(todo: &Todo, text: Option<&'a str>) -> Result<&'a str, ApiError> {
    let Some(text) = present(text) else {
        return Err(ApiError::Validation("Text is required.".into()));
    };
    if todo.text == text {
        return Err(ApiError::Validation("Text is the same.".into()));
    }
    Ok(text)
}

/// Parses `sort_field`. A leading `-` asks for descending order and is
/// stripped before the name is checked.
pub fn parse_sort_field(sort_field: &str) -> Result<SortOrder, ApiError> {
    let (descending, name) = match sort_field.strip_prefix('-') {
        Some(name) => (true, name),
        None => (false, sort_field),
    };
    let column = SortColumn::parse(name)
        .ok_or_else(|| ApiError::NotFound(format!("Sort field {name} doesn't exist.")))?;
    Ok(SortOrder { column, descending })
}

/// Integers too large for `i64` saturate instead of falling back, so an
/// absurd page number still reads as a page that doesn't exist.
fn parse_query_int(value: &str) -> Option<i64> {
    match value.parse::<i64>() {
        Ok(n) => Some(n),
        Err(err) => match err.kind() {
            IntErrorKind::PosOverflow => Some(i64::MAX),
            IntErrorKind::NegOverflow => Some(i64::MIN),
            _ => None,
        },
    }
}

/// 1-indexed page window over a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
}

impl Pagination {
    pub fn new(page: i64, per_page: i64) -> Self {
        let per_page = if per_page < 1 { FALLBACK_PER_PAGE } else { per_page };
        Self { page, per_page }
    }

    pub fn from_query(query: &ListQuery) -> Self {
        let page = query
            .page
            .as_deref()
            .and_then(parse_query_int)
            .unwrap_or(DEFAULT_PAGE);
        let per_page = query
            .per_page
            .as_deref()
            .and_then(parse_query_int)
            .unwrap_or(DEFAULT_PER_PAGE);
        Self::new(page, per_page)
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        total / self.per_page + i64::from(total % self.per_page != 0)
    }

    /// Fails for pages below 1 or past the last page.
    pub fn check(&self, total: i64) -> Result<(), ApiError> {
        if self.page < 1 || self.page > self.total_pages(total) {
            return Err(ApiError::NotFound(format!(
                "Page {} doesn't exist.",
                self.page
            )));
        }
        Ok(())
    }

    /// Row offset of the page. Only meaningful once [`Pagination::check`] passed.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

async fn find_todo(conn: &mut SqliteConnection, id: i64) -> Result<Todo, ApiError> {
    Todos::find_by_id(conn, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("ToDo id {id} doesn't exist.")))
}

pub async fn create(sqlite_pool: &SqlitePool, request: CreateTodoRequest) -> Result<i64, ApiError> {
    validate_new_todo(&request)?;
    let todo = Todo::new(
        request.username.unwrap_or_default(),
        request.email.unwrap_or_default(),
        request.text.unwrap_or_default(),
    );

    let mut conn = sqlite_pool.acquire().await?;
    let id = Todos::insert(&mut conn, &todo).await?;
    tracing::debug!(todo_id = id, "todo created");
    Ok(id)
}

pub async fn list(
    sqlite_pool: &SqlitePool,
    pagination: Pagination,
    sort_field: &str,
) -> Result<TodoPage, ApiError> {
    let order = parse_sort_field(sort_field)?;

    let mut conn = sqlite_pool.acquire().await?;
    let total = Todos::count(&mut conn).await?;
    if total == 0 {
        return Ok(TodoPage::empty());
    }
    pagination.check(total)?;

    let todos = Todos::page(&mut conn, order, pagination.per_page, pagination.offset()).await?;
    Ok(TodoPage {
        todos,
        total_pages: pagination.total_pages(total),
        current_page: pagination.page,
    })
}

pub async fn update_text(
    sqlite_pool: &SqlitePool,
    id: i64,
    text: Option<String>,
) -> Result<(), ApiError> {
    let mut conn = sqlite_pool.acquire().await?;
    let mut todo = find_todo(&mut conn, id).await?;

    todo.text = validate_text_update(&todo, text.as_deref())?.to_owned();
    todo.is_edited = true;
    Todos::update(&mut conn, &todo).await?;

    tracing::info!(todo_id = id, "todo text edited");
    Ok(())
}

pub async fn delete(sqlite_pool: &SqlitePool, id: i64) -> Result<(), ApiError> {
    let mut conn = sqlite_pool.acquire().await?;
    if Todos::delete(&mut conn, id).await? == 0 {
        return Err(ApiError::NotFound(format!("ToDo id {id} doesn't exist.")));
    }

    tracing::info!(todo_id = id, "todo deleted");
    Ok(())
}

/// Marks the item done. Completing twice is fine, nothing ever clears the flag.
pub async fn complete(sqlite_pool: &SqlitePool, id: i64) -> Result<(), ApiError> {
    let mut conn = sqlite_pool.acquire().await?;
    let mut todo = find_todo(&mut conn, id).await?;

    todo.is_completed = true;
    Todos::update(&mut conn, &todo).await?;

    tracing::info!(todo_id = id, "todo completed");
    Ok(())
}

pub async fn get_todos(
    Extension(sqlite_pool): Extension<SqlitePool>,
    Query(query): Query<ListQuery>,
) -> Result<Json<TodoPage>, ApiError> {
    let sort_field = query.sort_field.as_deref().unwrap_or(DEFAULT_SORT_FIELD);
    let page = list(&sqlite_pool, Pagination::from_query(&query), sort_field).await?;
    Ok(Json(page))
}

pub async fn create_todo(
    Extension(sqlite_pool): Extension<SqlitePool>,
    JsonBody(request): JsonBody<CreateTodoRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    create(&sqlite_pool, request).await?;
    Ok(Json(StatusResponse::success()))
}

pub async fn update_todo(
    Extension(sqlite_pool): Extension<SqlitePool>,
    PathId(todo_id): PathId<i64>,
    body: Result<JsonBody<UpdateTodoRequest>, ApiError>,
) -> Result<Json<StatusResponse>, ApiError> {
    // an unreadable body only matters once the row is known to exist
    let text = match body {
        Ok(JsonBody(request)) => request.text,
        Err(err) => {
            tracing::debug!("edit body rejected: {}", err);
            None
        }
    };
    update_text(&sqlite_pool, todo_id, text).await?;
    Ok(Json(StatusResponse::success()))
}

pub async fn delete_todo(
    Extension(sqlite_pool): Extension<SqlitePool>,
    PathId(todo_id): PathId<i64>,
) -> Result<Json<StatusResponse>, ApiError> {
    delete(&sqlite_pool, todo_id).await?;
    Ok(Json(StatusResponse::success()))
}

pub async fn complete_todo(
    Extension(sqlite_pool): Extension<SqlitePool>,
    PathId(todo_id): PathId<i64>,
) -> Result<Json<StatusResponse>, ApiError> {
    complete(&sqlite_pool, todo_id).await?;
    Ok(Json(StatusResponse::success()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;

    fn new_todo(username: &str, email: &str, text: &str) -> CreateTodoRequest {
        CreateTodoRequest {
            username: Some(username.into()),
            email: Some(email.into()),
            text: Some(text.into()),
        }
    }

    fn message(result: Result<(), ApiError>) -> String {
        result.unwrap_err().to_string()
    }

    #[test]
    fn email_format() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("first.last@mail.example.org"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("@b.co"));
        assert!(!is_valid_email("a@.co"));
        assert!(!is_valid_email("a@b."));
        assert!(!is_valid_email("a@b@c.co"));
        assert!(!is_valid_email("x a@b@c.d"));
    }

    #[test]
    fn new_todo_reports_first_broken_rule() {
        assert_eq!(
            message(validate_new_todo(&new_todo("", "bad", ""))),
            "Username is required."
        );
        assert_eq!(
            message(validate_new_todo(&CreateTodoRequest {
                email: None,
                ..new_todo("u", "", "t")
            })),
            "Email is required."
        );
        assert_eq!(
            message(validate_new_todo(&new_todo("u", "bad", ""))),
            "Text is required."
        );
        assert_eq!(
            message(validate_new_todo(&new_todo("u", "not-an-email", "t"))),
            "Email is invalid."
        );
        assert!(validate_new_todo(&new_todo("u", "a@b.co", "t")).is_ok());
    }

    #[test]
    fn text_update_must_change_something() {
        let todo = Todo::new("u".into(), "a@b.co".into(), "same".into());
        assert_eq!(
            validate_text_update(&todo, None).unwrap_err().to_string(),
            "Text is required."
        );
        assert_eq!(
            validate_text_update(&todo, Some("same")).unwrap_err().to_string(),
            "Text is the same."
        );
        assert_eq!(validate_text_update(&todo, Some("new")).unwrap(), "new");
    }

    #[test]
    fn sort_field_prefix_selects_direction() {
        let order = parse_sort_field("-email").unwrap();
        assert_eq!(order.column, SortColumn::Email);
        assert!(order.descending);

        let order = parse_sort_field("id").unwrap();
        assert_eq!(order.column, SortColumn::Id);
        assert!(!order.descending);

        let err = parse_sort_field("password").unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert!(parse_sort_field("--id").is_err());
    }

    #[test]
    fn page_math() {
        let pagination = Pagination::new(1, 3);
        assert_eq!(pagination.total_pages(1), 1);
        assert_eq!(pagination.total_pages(3), 1);
        assert_eq!(pagination.total_pages(4), 2);
        assert_eq!(Pagination::new(3, 3).offset(), 6);

        assert_eq!(Pagination::new(1, 0).per_page, FALLBACK_PER_PAGE);
        assert_eq!(Pagination::new(1, -5).per_page, FALLBACK_PER_PAGE);
        assert_eq!(Pagination::new(1, i64::MAX).total_pages(10), 1);

        assert!(Pagination::new(0, 3).check(5).is_err());
        assert!(Pagination::new(-1, 3).check(5).is_err());
        assert!(Pagination::new(3, 3).check(5).is_err());
        assert!(Pagination::new(2, 3).check(5).is_ok());
    }

    #[test]
    fn unparsable_query_values_fall_back_to_defaults() {
        let query = ListQuery {
            page: Some("abc".into()),
            per_page: None,
            sort_field: None,
        };
        assert_eq!(
            Pagination::from_query(&query),
            Pagination::new(DEFAULT_PAGE, DEFAULT_PER_PAGE)
        );

        let query = ListQuery {
            page: Some("2".into()),
            per_page: Some("5".into()),
            sort_field: None,
        };
        assert_eq!(Pagination::from_query(&query), Pagination::new(2, 5));
    }

    #[test]
    fn oversized_page_numbers_saturate() {
        let query = ListQuery {
            page: Some("99999999999999999999".into()),
            per_page: Some("-99999999999999999999".into()),
            sort_field: None,
        };
        let pagination = Pagination::from_query(&query);
        assert_eq!(pagination.page, i64::MAX);
        assert_eq!(pagination.per_page, FALLBACK_PER_PAGE);
        assert!(pagination.check(5).is_err());
    }

    #[tokio::test]
    async fn empty_table_lists_as_sentinel_for_any_page() {
        let sqlite_pool = database::memory().await.unwrap();
        for page in [-1, 0, 1, 7] {
            let listing = list(&sqlite_pool, Pagination::new(page, 3), "id")
                .await
                .unwrap();
            assert_eq!(listing, TodoPage::empty());
        }
        let err = list(&sqlite_pool, Pagination::new(1, 3), "password")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn listing_pages_and_sorts() {
        let sqlite_pool = database::memory().await.unwrap();
        for i in 0..4 {
            create(&sqlite_pool, new_todo(&format!("user{i}"), "a@b.co", "t"))
                .await
                .unwrap();
        }

        let first = list(&sqlite_pool, Pagination::new(1, 3), "-id").await.unwrap();
        assert_eq!(first.total_pages, 2);
        assert_eq!(first.current_page, 1);
        let ids: Vec<i64> = first.todos.iter().map(|todo| todo.id).collect();
        assert_eq!(ids, [4, 3, 2]);

        let second = list(&sqlite_pool, Pagination::new(2, 3), "-id").await.unwrap();
        assert_eq!(second.todos.len(), 1);
        assert_eq!(second.todos[0].id, 1);

        let err = list(&sqlite_pool, Pagination::new(3, 3), "id").await.unwrap_err();
        assert_eq!(err.to_string(), "Page 3 doesn't exist.");
    }

    #[tokio::test]
    async fn edits_mark_the_item_and_reject_no_ops() {
        let sqlite_pool = database::memory().await.unwrap();
        let id = create(&sqlite_pool, new_todo("u", "a@b.co", "milk")).await.unwrap();

        let err = update_text(&sqlite_pool, id, Some("milk".into())).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        update_text(&sqlite_pool, id, Some("bread".into())).await.unwrap();
        let mut conn = sqlite_pool.acquire().await.unwrap();
        let todo = Todos::find_by_id(&mut conn, id).await.unwrap().unwrap();
        assert_eq!(todo.text, "bread");
        assert!(todo.is_edited);
        drop(conn);

        let err = update_text(&sqlite_pool, id + 100, Some("x".into())).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn complete_is_idempotent_and_delete_removes() {
        let sqlite_pool = database::memory().await.unwrap();
        let id = create(&sqlite_pool, new_todo("u", "a@b.co", "milk")).await.unwrap();

        complete(&sqlite_pool, id).await.unwrap();
        complete(&sqlite_pool, id).await.unwrap();
        let mut conn = sqlite_pool.acquire().await.unwrap();
        assert!(Todos::find_by_id(&mut conn, id).await.unwrap().unwrap().is_completed);
        drop(conn);

        delete(&sqlite_pool, id).await.unwrap();
        assert!(matches!(
            delete(&sqlite_pool, id).await.unwrap_err(),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            complete(&sqlite_pool, id).await.unwrap_err(),
            ApiError::NotFound(_)
        ));
    }
}
