use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lowest accepted task priority.
pub const MIN_PRIORITY: u8 = 1;
/// Highest accepted task priority (most urgent).
pub const MAX_PRIORITY: u8 = 10;

/// Status of a task in the scheduling state machine.
///
/// `pending`/`queued` → `in_progress` → {`completed`, `failed`}; `cancelled`
/// is reachable administratively. Terminal statuses never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting in its priority lane.
    Pending,
    /// Accepted and waiting; scheduled exactly like `Pending`.
    Queued,
    /// Assigned to an agent.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Withdrawn administratively.
    Cancelled,
}

impl TaskStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [TaskStatus; 6] = [
        TaskStatus::Pending,
        TaskStatus::Queued,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];

    /// True for `completed`, `failed` and `cancelled`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// True for statuses that sit in a lane's pending list.
    pub fn is_waiting(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Queued)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, _next: TaskStatus) -> bool {
        !self.is_terminal()
    }

    /// The wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Queued => "queued",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown task status '{s}'"))
    }
}

/// A unit of work scheduled by the task manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique identifier for this task.
    pub id: Uuid,
    /// Matched against agent capabilities.
    #[serde(rename = "type")]
    pub task_type: String,
    /// 1..=10, 10 being the most urgent.
    pub priority: u8,
    /// Free-form input for the executing agent.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Tasks that must be `completed` before this one becomes eligible.
    #[serde(default)]
    pub dependencies: Vec<Uuid>,
    /// Agent currently holding the task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<String>,
    /// Current state machine position.
    pub status: TaskStatus,
    /// UTC timestamp of creation.
    pub created_at: DateTime<Utc>,
    /// Set when the task first enters `in_progress`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Set when the task reaches a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Output recorded on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error recorded on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    /// Build a fresh pending task with a generated id.
    pub fn new(task_type: impl Into<String>, priority: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type: task_type.into(),
            priority,
            payload: serde_json::Value::Null,
            dependencies: Vec::new(),
            assigned_agent: None,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Set the ids this task waits on.
    pub fn with_dependencies(mut self, deps: Vec<Uuid>) -> Self {
        self.dependencies = deps;
        self
    }

    /// True if `capabilities` contains this task's type.
    pub fn matches(&self, capabilities: &[String]) -> bool {
        capabilities.iter().any(|c| c == &self.task_type)
    }
}

/// Fields supplied by a caller creating a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    /// Task type.
    #[serde(rename = "type")]
    pub task_type: String,
    /// Requested priority, validated on creation.
    pub priority: u8,
    /// Free-form input.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Prerequisite task ids.
    #[serde(default)]
    pub dependencies: Vec<Uuid>,
}

impl NewTask {
    /// Start a request with no payload or dependencies.
    pub fn new(task_type: impl Into<String>, priority: u8) -> Self {
        Self {
            task_type: task_type.into(),
            priority,
            payload: serde_json::Value::Null,
            dependencies: Vec::new(),
        }
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Set prerequisite task ids.
    pub fn with_dependencies(mut self, deps: Vec<Uuid>) -> Self {
        self.dependencies = deps;
        self
    }

    /// Materialize into a pending [`Task`] with a fresh id and timestamp.
    pub fn into_task(self) -> Task {
        Task::new(self.task_type, self.priority)
            .with_payload(self.payload)
            .with_dependencies(self.dependencies)
    }
}

/// Outcome of one `execute` call on an agent.
///
/// Execution failures are captured here instead of propagating as errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    /// The executed task.
    pub task_id: Uuid,
    /// The agent that ran it.
    pub agent_id: String,
    /// Whether the behavior returned normally.
    pub success: bool,
    /// Output on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Error text on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock execution time in milliseconds.
    #[serde(rename = "executionTime")]
    pub execution_time_ms: u64,
}

impl TaskResult {
    /// A successful result carrying `data`.
    pub fn success(
        task_id: Uuid,
        agent_id: impl Into<String>,
        data: serde_json::Value,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            task_id,
            agent_id: agent_id.into(),
            success: true,
            data: Some(data),
            error: None,
            execution_time_ms,
        }
    }

    /// A failed result carrying an error message.
    pub fn failure(
        task_id: Uuid,
        agent_id: impl Into<String>,
        error: impl Into<String>,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            task_id,
            agent_id: agent_id.into(),
            success: false,
            data: None,
            error: Some(error.into()),
            execution_time_ms,
        }
    }

    /// The terminal status this result maps to.
    pub fn status(&self) -> TaskStatus {
        if self.success {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_task_creation() {
        let task = Task::new("text-analysis", 5);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, 5);
        assert!(task.dependencies.is_empty());
        assert!(task.assigned_agent.is_none());
        assert!(task.started_at.is_none());
    }

    #[test]
    fn test_task_matches_capabilities() {
        let task = Task::new("data-mapping", 3);
        assert!(task.matches(&["data-filtering".into(), "data-mapping".into()]));
        assert!(!task.matches(&["text-analysis".into()]));
        assert!(!task.matches(&[]));
    }

    #[test]
    fn test_terminal_statuses_reject_transitions() {
        for terminal in [TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Cancelled] {
            assert!(terminal.is_terminal());
            for next in TaskStatus::ALL {
                assert!(!terminal.can_transition_to(next));
            }
        }
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::InProgress));
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::Failed));
    }

    #[test]
    fn test_status_parse_and_display() {
        for status in TaskStatus::ALL {
            let parsed: TaskStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_task_wire_format_is_camel_case() {
        let task = Task::new("x", 5).with_dependencies(vec![Uuid::new_v4()]);
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["type"], "x");
        assert_eq!(json["status"], "pending");
        assert!(json.get("createdAt").is_some());
        assert!(json.get("assignedAgent").is_none());
        assert_eq!(json["dependencies"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_new_task_defaults_from_json() {
        let new: NewTask = serde_json::from_str(r#"{"type":"y","priority":1}"#).unwrap();
        assert!(new.dependencies.is_empty());
        assert!(new.payload.is_null());
        let task = new.into_task();
        assert_eq!(task.task_type, "y");
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn test_task_result_status() {
        let id = Uuid::new_v4();
        let ok = TaskResult::success(id, "a", serde_json::json!({"n": 1}), 12);
        let failed = TaskResult::failure(id, "a", "boom", 3);
        assert_eq!(ok.status(), TaskStatus::Completed);
        assert_eq!(failed.status(), TaskStatus::Failed);
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["executionTime"], 3);
        assert_eq!(json["error"], "boom");
    }
}
