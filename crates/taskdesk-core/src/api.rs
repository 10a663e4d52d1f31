use std::time::Duration;

use anyhow::{Context, anyhow};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::org::{Department, Role, User};
use crate::session::SessionUser;
use crate::status::Status;
use crate::task::{NewTask, Task, TaskLog};

/// Blocking client for the task-management backend. One method per
/// endpoint; the backend owns all state and this client never caches.
#[derive(Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TasksEnvelope {
    #[serde(default)]
    tasks: Vec<Task>,
}

#[derive(Debug, Deserialize)]
struct UsersEnvelope {
    #[serde(default)]
    users: Vec<User>,
}

#[derive(Debug, Deserialize)]
struct DepartmentsEnvelope {
    #[serde(default)]
    departments: Vec<Department>,
}

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    user: User,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: SessionUser,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder, what: &str) -> anyhow::Result<T> {
        let response = self
            .authed(builder)
            .send()
            .with_context(|| format!("request failed: {what}"))?;
        decode(response, what)
    }

    fn fire(&self, builder: RequestBuilder, what: &str) -> anyhow::Result<()> {
        let response = self
            .authed(builder)
            .send()
            .with_context(|| format!("request failed: {what}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("{what}: {}", backend_message(response, status)));
        }
        Ok(())
    }

    #[instrument(skip(self, password))]
    pub fn login(&self, email: &str, password: &str) -> anyhow::Result<LoginResponse> {
        let builder = self
            .client
            .post(self.url("/api/users/login"))
            .json(&json!({ "email": email, "password": password }));
        self.fetch(builder, "login")
    }

    #[instrument(skip(self, password))]
    pub fn signup(&self, name: &str, email: &str, password: &str) -> anyhow::Result<Option<String>> {
        let builder = self
            .client
            .post(self.url("/api/users/signup"))
            .json(&json!({ "name": name, "email": email, "password": password }));
        let body: MessageBody = self.fetch(builder, "signup")?;
        Ok(body.message)
    }

    #[instrument(skip(self))]
    pub fn users(&self, department: Option<&str>) -> anyhow::Result<Vec<User>> {
        let mut builder = self.client.get(self.url("/api/users"));
        if let Some(name) = department {
            builder = builder.query(&[("department", name)]);
        }
        let envelope: UsersEnvelope = self.fetch(builder, "fetch users")?;
        debug!(count = envelope.users.len(), "fetched users");
        Ok(envelope.users)
    }

    #[instrument(skip(self))]
    pub fn pending_users(&self) -> anyhow::Result<Vec<User>> {
        let builder = self.client.get(self.url("/api/users/pending"));
        let envelope: UsersEnvelope = self.fetch(builder, "fetch pending users")?;
        Ok(envelope.users)
    }

    #[instrument(skip(self))]
    pub fn approve_user(&self, id: Uuid) -> anyhow::Result<()> {
        let builder = self.client.patch(self.url(&format!("/api/users/approve/{id}")));
        self.fire(builder, "approve user")
    }

    #[instrument(skip(self))]
    pub fn decline_user(&self, id: Uuid) -> anyhow::Result<()> {
        let builder = self.client.delete(self.url(&format!("/api/users/decline/{id}")));
        self.fire(builder, "decline user")
    }

    #[instrument(skip(self))]
    pub fn update_user(&self, id: Uuid, department_id: Uuid, role: Role) -> anyhow::Result<User> {
        let builder = self
            .client
            .patch(self.url(&format!("/api/users/update/{id}")))
            .json(&json!({ "departmentId": department_id, "role": role.wire_value() }));
        let envelope: UserEnvelope = self.fetch(builder, "update user")?;
        Ok(envelope.user)
    }

    #[instrument(skip(self))]
    pub fn delete_user(&self, id: Uuid) -> anyhow::Result<()> {
        let builder = self.client.delete(self.url(&format!("/api/users/delete/{id}")));
        self.fire(builder, "delete user")
    }

    #[instrument(skip(self))]
    pub fn departments(&self) -> anyhow::Result<Vec<Department>> {
        let builder = self.client.get(self.url("/api/departments"));
        let envelope: DepartmentsEnvelope = self.fetch(builder, "fetch departments")?;
        Ok(envelope.departments)
    }

    #[instrument(skip(self))]
    pub fn recent_tasks(&self) -> anyhow::Result<Vec<Task>> {
        let builder = self.client.get(self.url("/api/tasks/recent"));
        let envelope: TasksEnvelope = self.fetch(builder, "fetch recent tasks")?;
        debug!(count = envelope.tasks.len(), "fetched recent tasks");
        Ok(envelope.tasks)
    }

    /// Capped variant of [`ApiClient::recent_tasks`]; the backend returns a
    /// bare array here.
    #[instrument(skip(self))]
    pub fn recent_tasks_limited(&self) -> anyhow::Result<Vec<Task>> {
        let builder = self.client.get(self.url("/api/tasks/recentlimit"));
        self.fetch(builder, "fetch recent tasks (limited)")
    }

    #[instrument(skip(self))]
    pub fn delayed_tasks(&self) -> anyhow::Result<Vec<Task>> {
        let builder = self.client.get(self.url("/api/tasks/delayed"));
        let envelope: TasksEnvelope = self.fetch(builder, "fetch delayed tasks")?;
        Ok(envelope.tasks)
    }

    /// Tasks assigned to the logged-in user; bare array on the wire.
    #[instrument(skip(self))]
    pub fn my_tasks(&self) -> anyhow::Result<Vec<Task>> {
        let builder = self.client.get(self.url("/api/tasks/my-tasks"));
        self.fetch(builder, "fetch my tasks")
    }

    #[instrument(skip(self))]
    pub fn task(&self, id: Uuid) -> anyhow::Result<Task> {
        let builder = self.client.get(self.url(&format!("/api/tasks/{id}")));
        self.fetch(builder, "fetch task")
    }

    #[instrument(skip(self, new_task), fields(title = %new_task.title))]
    pub fn assign_task(&self, new_task: &NewTask) -> anyhow::Result<()> {
        let builder = self.client.post(self.url("/api/tasks/assign")).json(new_task);
        self.fire(builder, "assign task")
    }

    #[instrument(skip(self))]
    pub fn set_task_status(&self, id: Uuid, status: Status) -> anyhow::Result<()> {
        let builder = self
            .client
            .patch(self.url(&format!("/api/tasks/{id}/status")))
            .json(&json!({ "status": status.wire_value() }));
        self.fire(builder, "update task status")
    }

    #[instrument(skip(self, description))]
    pub fn append_log(&self, task_id: Uuid, description: &str) -> anyhow::Result<TaskLog> {
        let builder = self
            .client
            .post(self.url("/api/logs"))
            .json(&json!({ "taskId": task_id, "description": description }));
        self.fetch(builder, "append log")
    }
}

fn decode<T: DeserializeOwned>(response: Response, what: &str) -> anyhow::Result<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(anyhow!("{what}: {}", backend_message(response, status)));
    }

    response
        .json::<T>()
        .with_context(|| format!("invalid response body: {what}"))
}

/// The backend reports failures as `{message}`; fall back to the HTTP
/// status line when the body is not that shape.
fn backend_message(response: Response, status: reqwest::StatusCode) -> String {
    response
        .json::<ErrorBody>()
        .ok()
        .and_then(|body| body.message)
        .unwrap_or_else(|| status.to_string())
}
