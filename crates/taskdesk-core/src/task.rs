use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::org::DepartmentRef;

/// A task as the backend returns it. `status` stays the raw wire string;
/// everything that cares about it goes through [`crate::status`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,

    pub title: String,

    #[serde(default)]
    pub description: String,

    pub deadline: DateTime<Utc>,

    pub status: String,

    #[serde(default)]
    pub logs: Vec<TaskLog>,

    #[serde(default)]
    pub assigned_to: Option<Assignee>,

    #[serde(default)]
    pub assigned_by: Option<Assignee>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskLog {
    pub id: Uuid,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Embedded summary of the user a task points at.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignee {
    pub id: Uuid,
    pub name: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub department: Option<DepartmentRef>,
}

/// Payload for `POST /api/tasks/assign`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub deadline: DateTime<Utc>,
    pub assigned_to: Uuid,
    pub department_id: Uuid,
}

impl Task {
    /// Logs in display order. The backend does not guarantee append order
    /// equals creation order, so this re-sorts by `created_at`, newest
    /// first.
    pub fn logs_newest_first(&self) -> Vec<&TaskLog> {
        let mut logs: Vec<&TaskLog> = self.logs.iter().collect();
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        logs
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.deadline < now
    }

    pub fn assignee_name(&self) -> &str {
        self.assigned_to.as_ref().map(|a| a.name.as_str()).unwrap_or("-")
    }

    pub fn department_name(&self) -> &str {
        self.assigned_to
            .as_ref()
            .and_then(|a| a.department.as_ref())
            .map(|d| d.name.as_str())
            .unwrap_or("-")
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::Task;

    #[test]
    fn deserializes_backend_payload() {
        let raw = r#"{
            "id": "5f0f6f5e-8b66-4f78-9f47-6a2b1c3d4e5f",
            "title": "Quarterly maintenance report",
            "description": "Compile the Q2 numbers",
            "deadline": "2025-06-30T17:00:00.000Z",
            "status": "active",
            "logs": [
                {
                    "id": "a1b2c3d4-0000-4000-8000-000000000001",
                    "description": "Started collecting data",
                    "createdAt": "2025-06-20T09:30:00.000Z"
                },
                {
                    "id": "a1b2c3d4-0000-4000-8000-000000000002",
                    "description": "Draft sent for review",
                    "createdAt": "2025-06-25T14:00:00.000Z"
                }
            ],
            "assignedTo": {
                "id": "b1b2c3d4-0000-4000-8000-000000000003",
                "name": "Jane Doe",
                "email": "jane@example.com",
                "department": {
                    "id": "c1b2c3d4-0000-4000-8000-000000000004",
                    "name": "Maintenance"
                }
            },
            "assignedBy": { "id": "d1b2c3d4-0000-4000-8000-000000000005", "name": "Sam Admin" }
        }"#;

        let task: Task = serde_json::from_str(raw).expect("task json");
        assert_eq!(task.title, "Quarterly maintenance report");
        assert_eq!(task.status, "active");
        assert_eq!(task.assignee_name(), "Jane Doe");
        assert_eq!(task.department_name(), "Maintenance");
        assert_eq!(task.logs.len(), 2);
    }

    #[test]
    fn missing_optional_fields_default() {
        let raw = r#"{
            "id": "5f0f6f5e-8b66-4f78-9f47-6a2b1c3d4e5f",
            "title": "Orphan task",
            "deadline": "2025-06-30T17:00:00Z",
            "status": "PENDING"
        }"#;

        let task: Task = serde_json::from_str(raw).expect("task json");
        assert!(task.logs.is_empty());
        assert_eq!(task.assignee_name(), "-");
        assert_eq!(task.department_name(), "-");
    }

    #[test]
    fn logs_render_newest_first() {
        let raw = r#"{
            "id": "5f0f6f5e-8b66-4f78-9f47-6a2b1c3d4e5f",
            "title": "t",
            "deadline": "2025-06-30T17:00:00Z",
            "status": "active",
            "logs": [
                {
                    "id": "a1b2c3d4-0000-4000-8000-000000000001",
                    "description": "older",
                    "createdAt": "2025-06-20T09:30:00Z"
                },
                {
                    "id": "a1b2c3d4-0000-4000-8000-000000000002",
                    "description": "newer",
                    "createdAt": "2025-06-25T14:00:00Z"
                }
            ]
        }"#;

        let task: Task = serde_json::from_str(raw).expect("task json");
        let ordered = task.logs_newest_first();
        assert_eq!(ordered[0].description, "newer");
        assert_eq!(ordered[1].description, "older");
    }

    #[test]
    fn overdue_is_strict() {
        let raw = r#"{
            "id": "5f0f6f5e-8b66-4f78-9f47-6a2b1c3d4e5f",
            "title": "t",
            "deadline": "2025-06-30T17:00:00Z",
            "status": "active"
        }"#;
        let task: Task = serde_json::from_str(raw).expect("task json");

        let at_deadline = Utc.with_ymd_and_hms(2025, 6, 30, 17, 0, 0).unwrap();
        assert!(!task.is_overdue(at_deadline));
        assert!(task.is_overdue(at_deadline + chrono::Duration::seconds(1)));
    }
}
