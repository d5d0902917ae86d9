// In-process backend: accounts, sessions and row collections held in memory

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::backend::{
    AuthBackend, AuthEvent, AuthStateChange, BackendError, DataBackend, ResetResult, Session,
    SessionData, SignUpOptions, User, AUTH_EVENT_CAPACITY,
};
use crate::query::{Filter, Operation, OrderBy, Query, QueryResult, RequestContext};

/// Collection that sign-up mirrors new accounts into
pub const PROFILE_COLLECTION: &str = "profiles";

/// Metadata keys copied from the account into its profile row
const PROFILE_METADATA_KEYS: [&str; 3] = ["full_name", "role", "restaurant_id"];

/// Backend calls that can be made to fail once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    SignIn,
    SignUp,
    SignOut,
    ResetPassword,
    GetSession,
    GetUser,
    Execute,
}

struct Account {
    user: User,
    password: String,
}

#[derive(Default)]
struct MemoryState {
    collections: HashMap<String, Vec<Map<String, Value>>>,
    accounts: HashMap<String, Account>,
    session: Option<Session>,
    faults: HashMap<FaultPoint, BackendError>,
    sign_in_calls: Vec<(String, String)>,
    requests: Vec<RequestContext>,
    latency: Option<Duration>,
}

/// Backend living entirely in process memory.
///
/// Records every call it receives so callers can inspect traffic.
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    events: broadcast::Sender<AuthStateChange>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            state: Mutex::new(MemoryState::default()),
            events,
        }
    }

    /// Register an account and its profile row
    pub fn add_account(&self, email: &str, password: &str, metadata: Map<String, Value>) -> User {
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: Some(email.to_string()),
            user_metadata: metadata,
            created_at: Some(Utc::now()),
        };

        let mut state = self.state.lock();
        state
            .collections
            .entry(PROFILE_COLLECTION.to_string())
            .or_default()
            .push(profile_row(&user));
        state.accounts.insert(
            email.to_string(),
            Account {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        user
    }

    /// Append rows to a collection; non-object values are ignored
    pub fn insert_rows(&self, collection: &str, rows: Vec<Value>) {
        let mut state = self.state.lock();
        let target = state.collections.entry(collection.to_string()).or_default();
        target.extend(rows.into_iter().filter_map(|row| match row {
            Value::Object(map) => Some(map),
            _ => None,
        }));
    }

    pub fn rows(&self, collection: &str) -> Vec<Value> {
        self.state
            .lock()
            .collections
            .get(collection)
            .map(|rows| rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    /// Make the next call at `point` fail with `error`
    pub fn fail_next(&self, point: FaultPoint, error: BackendError) {
        self.state.lock().faults.insert(point, error);
    }

    /// Delay applied to every data operation
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = Some(latency);
    }

    /// (email, password) pairs exactly as sign-in received them
    pub fn sign_in_calls(&self) -> Vec<(String, String)> {
        self.state.lock().sign_in_calls.clone()
    }

    /// Data requests in the order they reached the backend
    pub fn requests(&self) -> Vec<RequestContext> {
        self.state.lock().requests.clone()
    }

    pub fn request_count(&self, collection: &str) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|request| request.collection == collection)
            .count()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.state.lock().session.clone()
    }

    /// Publish an auth event as if the backend raised it
    pub fn emit(&self, event: AuthEvent, session: Option<Session>) {
        // No receivers is fine
        let _ = self.events.send(AuthStateChange { event, session });
    }

    fn take_fault(&self, point: FaultPoint) -> Result<(), BackendError> {
        match self.state.lock().faults.remove(&point) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn new_session(user: User) -> Session {
    let expires_in = 3600;
    Session {
        access_token: Uuid::new_v4().simple().to_string(),
        refresh_token: Some(Uuid::new_v4().simple().to_string()),
        token_type: "bearer".to_string(),
        expires_in: Some(expires_in),
        expires_at: Some(Utc::now().timestamp() + expires_in),
        user,
    }
}

fn profile_row(user: &User) -> Map<String, Value> {
    let mut row = Map::new();
    row.insert("id".to_string(), Value::String(user.id.clone()));
    if let Some(email) = &user.email {
        row.insert("email".to_string(), Value::String(email.clone()));
    }
    for key in PROFILE_METADATA_KEYS {
        if let Some(value) = user.user_metadata.get(key) {
            row.insert(key.to_string(), value.clone());
        }
    }
    row
}

#[async_trait]
impl AuthBackend for MemoryBackend {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<SessionData, BackendError> {
        self.state
            .lock()
            .sign_in_calls
            .push((email.to_string(), password.to_string()));
        self.take_fault(FaultPoint::SignIn)?;

        let session = {
            let mut state = self.state.lock();
            let user = match state.accounts.get(email) {
                Some(account) if account.password == password => account.user.clone(),
                _ => {
                    return Err(BackendError::new("Invalid login credentials")
                        .with_status(400)
                        .with_code("invalid_credentials"))
                }
            };
            let session = new_session(user);
            state.session = Some(session.clone());
            session
        };

        self.emit(AuthEvent::SignedIn, Some(session.clone()));
        Ok(SessionData {
            user: Some(session.user.clone()),
            session: Some(session),
        })
    }

    async fn sign_up(&self, email: &str, password: &str, options: SignUpOptions) -> Result<SessionData, BackendError> {
        self.take_fault(FaultPoint::SignUp)?;

        if self.state.lock().accounts.contains_key(email) {
            return Err(BackendError::new("User already registered")
                .with_status(422)
                .with_code("user_already_exists"));
        }
        if password.len() < 6 {
            return Err(BackendError::new("Password should be at least 6 characters.")
                .with_status(422)
                .with_code("weak_password"));
        }

        let user = self.add_account(email, password, options.data);
        let session = new_session(user.clone());
        self.state.lock().session = Some(session.clone());

        self.emit(AuthEvent::SignedIn, Some(session.clone()));
        Ok(SessionData {
            user: Some(user),
            session: Some(session),
        })
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.take_fault(FaultPoint::SignOut)?;
        self.state.lock().session = None;
        self.emit(AuthEvent::SignedOut, None);
        Ok(())
    }

    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> Result<ResetResult, BackendError> {
        self.take_fault(FaultPoint::ResetPassword)?;

        if !self.state.lock().accounts.contains_key(email) {
            return Err(BackendError::new("user not found").with_status(404));
        }
        Ok(ResetResult {
            email: email.to_string(),
            redirect_to: redirect_to.to_string(),
        })
    }

    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        self.take_fault(FaultPoint::GetSession)?;
        Ok(self.state.lock().session.clone())
    }

    async fn get_user(&self) -> Result<Option<User>, BackendError> {
        self.take_fault(FaultPoint::GetUser)?;
        Ok(self.state.lock().session.as_ref().map(|session| session.user.clone()))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthStateChange> {
        self.events.subscribe()
    }
}

#[async_trait]
impl DataBackend for MemoryBackend {
    async fn execute(&self, request: &RequestContext) -> Result<QueryResult, BackendError> {
        let latency = {
            let mut state = self.state.lock();
            state.requests.push(request.clone());
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.take_fault(FaultPoint::Execute)?;

        let mut state = self.state.lock();
        let rows = state.collections.entry(request.collection.clone()).or_default();
        let query = &request.query;

        match request.operation {
            Operation::Select => {
                let mut selected: Vec<Map<String, Value>> = rows
                    .iter()
                    .filter(|row| matches_filters(row, &query.filters))
                    .cloned()
                    .collect();
                sort_rows(&mut selected, &query.order);
                if let Some(limit) = query.limit {
                    selected.truncate(limit);
                }
                let data = shape(project(selected, query), query.single)?;
                Ok(QueryResult::new(data, 200))
            }
            Operation::Insert => {
                let inserted = insert_payload(rows, query.payload.as_ref())?;
                returning(inserted, query, 201)
            }
            Operation::Update => {
                let changes = match query.payload.as_ref() {
                    Some(Value::Object(changes)) => changes,
                    _ => return Err(BackendError::new("Update payload must be an object").with_status(400)),
                };
                let mut updated = Vec::new();
                for row in rows.iter_mut().filter(|row| matches_filters(row, &query.filters)) {
                    for (key, value) in changes {
                        row.insert(key.clone(), value.clone());
                    }
                    updated.push(row.clone());
                }
                returning(updated, query, 200)
            }
            Operation::Delete => {
                let (removed, kept): (Vec<_>, Vec<_>) = rows
                    .drain(..)
                    .partition(|row| matches_filters(row, &query.filters));
                *rows = kept;
                returning(removed, query, 200)
            }
        }
    }
}

fn matches_filters(row: &Map<String, Value>, filters: &[Filter]) -> bool {
    filters
        .iter()
        .all(|filter| row.get(&filter.column).unwrap_or(&Value::Null) == &filter.value)
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), Some(_)) => Ordering::Greater,
        (Some(_), None | Some(Value::Null)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

fn sort_rows(rows: &mut [Map<String, Value>], order: &[OrderBy]) {
    if order.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for key in order {
            let ordering = compare_values(a.get(&key.column), b.get(&key.column));
            let ordering = if key.ascending { ordering } else { ordering.reverse() };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn project(rows: Vec<Map<String, Value>>, query: &Query) -> Vec<Map<String, Value>> {
    match query.column_names() {
        None => rows,
        Some(columns) => rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .filter(|(key, _)| columns.contains(&key.as_str()))
                    .collect()
            })
            .collect(),
    }
}

fn shape(rows: Vec<Map<String, Value>>, single: bool) -> Result<Value, BackendError> {
    if !single {
        return Ok(Value::Array(rows.into_iter().map(Value::Object).collect()));
    }
    let mut rows = rows;
    match (rows.pop(), rows.is_empty()) {
        (Some(row), true) => Ok(Value::Object(row)),
        _ => Err(BackendError::new("JSON object requested, multiple (or no) rows returned")
            .with_status(406)
            .with_code("PGRST116")),
    }
}

fn insert_payload(
    rows: &mut Vec<Map<String, Value>>,
    payload: Option<&Value>,
) -> Result<Vec<Map<String, Value>>, BackendError> {
    let new_rows: Vec<Map<String, Value>> = match payload {
        Some(Value::Object(row)) => vec![row.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row.clone()),
                _ => Err(BackendError::new("Insert rows must be objects").with_status(400)),
            })
            .collect::<Result<_, _>>()?,
        _ => return Err(BackendError::new("Insert payload is required").with_status(400)),
    };

    let mut inserted = Vec::with_capacity(new_rows.len());
    for mut row in new_rows {
        row.entry("id".to_string())
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        rows.push(row.clone());
        inserted.push(row);
    }
    Ok(inserted)
}

fn returning(rows: Vec<Map<String, Value>>, query: &Query, status: u16) -> Result<QueryResult, BackendError> {
    if query.columns.is_none() {
        return Ok(QueryResult::new(Value::Null, status));
    }
    let data = shape(project(rows, query), query.single)?;
    Ok(QueryResult::new(data, status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn select(collection: &str) -> RequestContext {
        let mut ctx = RequestContext::new(Operation::Select, collection);
        ctx.query.columns = Some("*".to_string());
        ctx
    }

    #[tokio::test]
    async fn test_select_filters_orders_and_limits() {
        let backend = MemoryBackend::new();
        backend.insert_rows(
            "tabs",
            vec![
                json!({"id": "a", "opened_by": "u1", "created_at": "2024-01-01"}),
                json!({"id": "b", "opened_by": "u2", "created_at": "2024-01-02"}),
                json!({"id": "c", "opened_by": "u1", "created_at": "2024-01-03"}),
            ],
        );

        let mut ctx = select("tabs");
        ctx.query.filters.push(Filter { column: "opened_by".into(), value: json!("u1") });
        ctx.query.order.push(OrderBy { column: "created_at".into(), ascending: false });

        let result = backend.execute(&ctx).await.unwrap();
        assert_eq!(result.count, Some(2));
        assert_eq!(result.data[0]["id"], json!("c"));
        assert_eq!(result.data[1]["id"], json!("a"));

        ctx.query.limit = Some(1);
        let result = backend.execute(&ctx).await.unwrap();
        assert_eq!(result.count, Some(1));
    }

    #[tokio::test]
    async fn test_single_requires_exactly_one_row() {
        let backend = MemoryBackend::new();
        let mut ctx = select("profiles");
        ctx.query.single = true;

        let err = backend.execute(&ctx).await.unwrap_err();
        assert_eq!(err.status, Some(406));
    }

    #[tokio::test]
    async fn test_update_returns_changed_rows() {
        let backend = MemoryBackend::new();
        backend.insert_rows("profiles", vec![json!({"id": "1", "name": "A"})]);

        let mut ctx = RequestContext::new(Operation::Update, "profiles");
        ctx.query.payload = Some(json!({"phone": "x"}));
        ctx.query.filters.push(Filter { column: "id".into(), value: json!("1") });
        ctx.query.columns = Some("*".to_string());
        ctx.query.single = true;

        let result = backend.execute(&ctx).await.unwrap();
        assert_eq!(result.data, json!({"id": "1", "name": "A", "phone": "x"}));
        assert_eq!(backend.rows("profiles")[0]["phone"], json!("x"));
    }

    #[tokio::test]
    async fn test_delete_without_returning() {
        let backend = MemoryBackend::new();
        backend.insert_rows("menu_items", vec![json!({"id": "1"}), json!({"id": "2"})]);

        let mut ctx = RequestContext::new(Operation::Delete, "menu_items");
        ctx.query.filters.push(Filter { column: "id".into(), value: json!("1") });

        let result = backend.execute(&ctx).await.unwrap();
        assert_eq!(result.data, Value::Null);
        assert_eq!(backend.rows("menu_items"), vec![json!({"id": "2"})]);
    }

    #[tokio::test]
    async fn test_sign_up_rejects_duplicate_email() {
        let backend = MemoryBackend::new();
        backend.add_account("a@b.com", "secret1", Map::new());

        let err = backend
            .sign_up("a@b.com", "secret1", SignUpOptions::default())
            .await
            .unwrap_err();
        assert!(err.message.contains("already registered"));
    }

    #[tokio::test]
    async fn test_fault_is_consumed_once() {
        let backend = MemoryBackend::new();
        backend.fail_next(FaultPoint::GetSession, BackendError::new("down"));

        assert!(backend.get_session().await.is_err());
        assert!(backend.get_session().await.unwrap().is_none());
    }
}
