use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use taskmesh_core::{
    NewTask, Task, TaskStatus, TaskmeshError, TaskmeshResult, MAX_PRIORITY, MIN_PRIORITY,
};
use tracing::{debug, info};
use uuid::Uuid;

/// Task lifecycle notifications.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// A task entered its pending lane.
    Added(Task),
    /// A task was handed to an agent.
    Assigned {
        /// The task after assignment.
        task: Task,
        /// The agent holding it.
        agent_id: String,
    },
    /// A task's status changed.
    StatusChanged {
        /// The task after the change.
        task: Task,
        /// Status before the change.
        previous: TaskStatus,
    },
    /// A pending task names a task whose status just changed.
    DependencyResolved {
        /// The waiting task.
        task_id: Uuid,
        /// The dependency that was updated.
        dependency_id: Uuid,
        /// The dependency's new status.
        dependency_status: TaskStatus,
    },
}

/// Callback attached with [`TaskManager::on_event`].
pub type TaskListener = Arc<dyn Fn(&TaskEvent) + Send + Sync>;

/// Per-status counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    /// `pending` and `queued`.
    pub pending: usize,
    /// `in_progress`.
    pub in_progress: usize,
    /// `completed`.
    pub completed: usize,
    /// `failed`.
    pub failed: usize,
    /// `cancelled`.
    pub cancelled: usize,
}

impl StatusCounts {
    fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Pending | TaskStatus::Queued => self.pending += 1,
            TaskStatus::InProgress => self.in_progress += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Cancelled => self.cancelled += 1,
        }
    }
}

/// Aggregate task counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetrics {
    /// Tasks waiting for assignment.
    pub total_pending: usize,
    /// Tasks held by an agent.
    pub total_in_progress: usize,
    /// Successfully finished tasks.
    pub total_completed: usize,
    /// Tasks that finished with an error.
    pub total_failed: usize,
    /// Administratively withdrawn tasks.
    pub total_cancelled: usize,
    /// Every task ever added.
    pub total: usize,
    /// Counts per priority lane, only for lanes that hold tasks.
    pub by_priority: BTreeMap<u8, StatusCounts>,
}

/// One priority level's lists. Ids only; records live in `Store::tasks`.
#[derive(Default)]
struct Lane {
    pending: VecDeque<Uuid>,
    in_progress: Vec<Uuid>,
    completed: Vec<Uuid>,
    failed: Vec<Uuid>,
    cancelled: Vec<Uuid>,
}

impl Lane {
    fn detach(&mut self, id: Uuid) {
        self.pending.retain(|t| *t != id);
        self.in_progress.retain(|t| *t != id);
    }
}

struct Store {
    tasks: HashMap<Uuid, Task>,
    lanes: Vec<Lane>,
    agent_tasks: HashMap<String, HashSet<Uuid>>,
    /// Insertion order of every task; keeps requeued tasks in FIFO position.
    sequence: HashMap<Uuid, u64>,
    next_sequence: u64,
}

impl Store {
    fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            lanes: (MIN_PRIORITY..=MAX_PRIORITY).map(|_| Lane::default()).collect(),
            agent_tasks: HashMap::new(),
            sequence: HashMap::new(),
            next_sequence: 0,
        }
    }

    fn lane_index(priority: u8) -> usize {
        usize::from(priority.clamp(MIN_PRIORITY, MAX_PRIORITY) - MIN_PRIORITY)
    }

    fn lane_mut(&mut self, priority: u8) -> &mut Lane {
        &mut self.lanes[Self::lane_index(priority)]
    }

    /// Put a task back into its lane's pending list ahead of every task
    /// added after it.
    fn reinsert_pending(&mut self, priority: u8, task_id: Uuid) {
        let idx = Self::lane_index(priority);
        let own = self.sequence.get(&task_id).copied().unwrap_or(u64::MAX);
        let pos = self.lanes[idx]
            .pending
            .iter()
            .position(|id| self.sequence.get(id).is_some_and(|seq| *seq > own))
            .unwrap_or(self.lanes[idx].pending.len());
        self.lanes[idx].pending.insert(pos, task_id);
    }

    fn dependencies_met(&self, task: &Task) -> bool {
        task.dependencies.iter().all(|dep| {
            self.tasks
                .get(dep)
                .is_some_and(|d| d.status == TaskStatus::Completed)
        })
    }

    fn release_from_agent(&mut self, task_id: Uuid, agent_id: Option<&str>) {
        if let Some(agent_id) = agent_id {
            if let Some(set) = self.agent_tasks.get_mut(agent_id) {
                set.remove(&task_id);
                if set.is_empty() {
                    self.agent_tasks.remove(agent_id);
                }
            }
        }
    }
}

fn validate_priority(priority: u8) -> TaskmeshResult<()> {
    if (MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
        Ok(())
    } else {
        Err(TaskmeshError::InvalidPriority(priority))
    }
}

/// Authoritative task store with ten priority lanes and dependency gating.
///
/// All operations are synchronous. Events are delivered to listeners after
/// the internal lock is released, so a listener may call back into the
/// manager.
pub struct TaskManager {
    store: Mutex<Store>,
    listeners: RwLock<Vec<TaskListener>>,
}

impl TaskManager {
    /// An empty manager.
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Attach an event listener.
    pub fn on_event(&self, listener: impl Fn(&TaskEvent) + Send + Sync + 'static) {
        self.listeners.write().push(Arc::new(listener));
    }

    fn emit(&self, events: Vec<TaskEvent>) {
        if events.is_empty() {
            return;
        }
        let listeners: Vec<TaskListener> = self.listeners.read().clone();
        for event in &events {
            for listener in &listeners {
                listener(event);
            }
        }
    }

    /// Create a pending task from caller-supplied fields.
    pub fn create_task(&self, new_task: NewTask) -> TaskmeshResult<Task> {
        validate_priority(new_task.priority)?;
        self.add_task(new_task.into_task())
    }

    /// Add a prepared task to its lane.
    ///
    /// The task's id is kept; status is reset to `pending` unless it is
    /// `queued`, and any assignment data is cleared.
    pub fn add_task(&self, mut task: Task) -> TaskmeshResult<Task> {
        validate_priority(task.priority)?;
        if !task.status.is_waiting() {
            task.status = TaskStatus::Pending;
        }
        task.assigned_agent = None;
        task.started_at = None;
        task.completed_at = None;

        {
            let mut store = self.store.lock();
            if store.tasks.contains_key(&task.id) {
                return Err(TaskmeshError::DuplicateTask(task.id));
            }
            let seq = store.next_sequence;
            store.next_sequence += 1;
            store.sequence.insert(task.id, seq);
            store.lane_mut(task.priority).pending.push_back(task.id);
            store.tasks.insert(task.id, task.clone());
        }

        info!(task_id = %task.id, task_type = %task.task_type, priority = task.priority, "Task added");
        self.emit(vec![TaskEvent::Added(task.clone())]);
        Ok(task)
    }

    /// Pop the most urgent eligible task for the given capabilities.
    ///
    /// Lanes are scanned from priority 10 down to 1, each in insertion
    /// order. A task is eligible when its type is in `capabilities` and all
    /// of its dependencies exist and are `completed`. The returned task is
    /// removed from its pending lane but keeps its waiting status until it
    /// is assigned or requeued.
    pub fn get_next_task(&self, capabilities: &[String]) -> Option<Task> {
        let mut store = self.store.lock();
        for priority in (MIN_PRIORITY..=MAX_PRIORITY).rev() {
            let idx = usize::from(priority - MIN_PRIORITY);
            let found = store.lanes[idx].pending.iter().position(|id| {
                store
                    .tasks
                    .get(id)
                    .is_some_and(|t| t.matches(capabilities) && store.dependencies_met(t))
            });
            if let Some(pos) = found {
                let id = store.lanes[idx].pending.remove(pos)?;
                return store.tasks.get(&id).cloned();
            }
        }
        None
    }

    /// Hand a task to an agent: status `in_progress`, start time recorded.
    pub fn assign_task(&self, task_id: Uuid, agent_id: &str) -> TaskmeshResult<Task> {
        let task = {
            let mut store = self.store.lock();
            let (priority, previous_agent) = {
                let task = store
                    .tasks
                    .get(&task_id)
                    .ok_or(TaskmeshError::TaskNotFound(task_id))?;
                if task.status.is_terminal() {
                    return Err(TaskmeshError::InvalidTransition {
                        from: task.status,
                        to: TaskStatus::InProgress,
                    });
                }
                (task.priority, task.assigned_agent.clone())
            };

            store.release_from_agent(task_id, previous_agent.as_deref());
            let lane = store.lane_mut(priority);
            lane.detach(task_id);
            lane.in_progress.push(task_id);
            store
                .agent_tasks
                .entry(agent_id.to_string())
                .or_default()
                .insert(task_id);

            let task = store
                .tasks
                .get_mut(&task_id)
                .ok_or(TaskmeshError::TaskNotFound(task_id))?;
            task.assigned_agent = Some(agent_id.to_string());
            task.status = TaskStatus::InProgress;
            task.started_at = Some(Utc::now());
            task.clone()
        };

        info!(task_id = %task_id, agent_id = %agent_id, "Task assigned");
        self.emit(vec![TaskEvent::Assigned {
            task: task.clone(),
            agent_id: agent_id.to_string(),
        }]);
        Ok(task)
    }

    /// Move a task to `status`, recording `result` or `error` on terminal statuses.
    ///
    /// Terminal tasks cannot change again. Leaving `in_progress` releases the
    /// task from its agent's set. After the status-changed event, every
    /// pending task that depends on this one gets a dependency-resolved
    /// event; scheduling itself is left to listeners.
    pub fn update_task_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> TaskmeshResult<Task> {
        let (task, previous, dependents) = {
            let mut store = self.store.lock();
            let (previous, priority, agent) = {
                let task = store
                    .tasks
                    .get(&task_id)
                    .ok_or(TaskmeshError::TaskNotFound(task_id))?;
                if !task.status.can_transition_to(status) {
                    return Err(TaskmeshError::InvalidTransition {
                        from: task.status,
                        to: status,
                    });
                }
                (task.status, task.priority, task.assigned_agent.clone())
            };

            if status != TaskStatus::InProgress {
                store.release_from_agent(task_id, agent.as_deref());
            }

            let lane = store.lane_mut(priority);
            lane.detach(task_id);
            match status {
                TaskStatus::Pending | TaskStatus::Queued => lane.pending.push_back(task_id),
                TaskStatus::InProgress => lane.in_progress.push(task_id),
                TaskStatus::Completed => lane.completed.push(task_id),
                TaskStatus::Failed => lane.failed.push(task_id),
                TaskStatus::Cancelled => lane.cancelled.push(task_id),
            }

            let now = Utc::now();
            let task = store
                .tasks
                .get_mut(&task_id)
                .ok_or(TaskmeshError::TaskNotFound(task_id))?;
            task.status = status;
            match status {
                TaskStatus::Pending | TaskStatus::Queued => {
                    task.assigned_agent = None;
                    task.started_at = None;
                }
                TaskStatus::InProgress => {
                    task.started_at.get_or_insert(now);
                }
                TaskStatus::Completed => {
                    task.completed_at = Some(now);
                    task.result = result;
                }
                TaskStatus::Failed => {
                    task.completed_at = Some(now);
                    task.error = error;
                }
                TaskStatus::Cancelled => {
                    task.completed_at = Some(now);
                    if error.is_some() {
                        task.error = error;
                    }
                }
            }
            let task = task.clone();

            let dependents: Vec<Uuid> = store
                .lanes
                .iter()
                .flat_map(|lane| lane.pending.iter())
                .filter(|id| {
                    store
                        .tasks
                        .get(*id)
                        .is_some_and(|t| t.dependencies.contains(&task_id))
                })
                .copied()
                .collect();

            (task, previous, dependents)
        };

        info!(task_id = %task_id, from = %previous, to = %status, "Task status changed");

        let mut events = vec![TaskEvent::StatusChanged {
            task: task.clone(),
            previous,
        }];
        for dependent in dependents {
            debug!(task_id = %dependent, dependency_id = %task_id, "Dependency resolved");
            events.push(TaskEvent::DependencyResolved {
                task_id: dependent,
                dependency_id: task_id,
                dependency_status: status,
            });
        }
        self.emit(events);
        Ok(task)
    }

    /// Return a non-terminal task to its lane's pending list.
    ///
    /// The task regains its original insertion position, so it never
    /// overtakes older tasks that are still waiting in the same lane.
    pub fn requeue(&self, task_id: Uuid) -> TaskmeshResult<Task> {
        let (task, previous) = {
            let mut store = self.store.lock();
            let (previous, priority, agent) = {
                let task = store
                    .tasks
                    .get(&task_id)
                    .ok_or(TaskmeshError::TaskNotFound(task_id))?;
                if task.status.is_terminal() {
                    return Err(TaskmeshError::InvalidTransition {
                        from: task.status,
                        to: TaskStatus::Pending,
                    });
                }
                (task.status, task.priority, task.assigned_agent.clone())
            };

            store.release_from_agent(task_id, agent.as_deref());
            store.lane_mut(priority).detach(task_id);
            store.reinsert_pending(priority, task_id);

            let task = store
                .tasks
                .get_mut(&task_id)
                .ok_or(TaskmeshError::TaskNotFound(task_id))?;
            if !task.status.is_waiting() {
                task.status = TaskStatus::Pending;
            }
            task.assigned_agent = None;
            task.started_at = None;
            (task.clone(), previous)
        };

        debug!(task_id = %task_id, "Task requeued");
        if previous != task.status {
            self.emit(vec![TaskEvent::StatusChanged {
                task: task.clone(),
                previous,
            }]);
        }
        Ok(task)
    }

    /// True if every dependency of the task exists and is `completed`.
    pub fn dependencies_satisfied(&self, task_id: Uuid) -> bool {
        let store = self.store.lock();
        store
            .tasks
            .get(&task_id)
            .is_some_and(|t| store.dependencies_met(t))
    }

    /// A snapshot of one task.
    pub fn get_task(&self, task_id: Uuid) -> Option<Task> {
        self.store.lock().tasks.get(&task_id).cloned()
    }

    /// Tasks currently held by an agent.
    pub fn get_agent_tasks(&self, agent_id: &str) -> Vec<Task> {
        let store = self.store.lock();
        let mut tasks: Vec<Task> = store
            .agent_tasks
            .get(agent_id)
            .map(|ids| ids.iter().filter_map(|id| store.tasks.get(id).cloned()).collect())
            .unwrap_or_default();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    /// Tasks with the given status, oldest first.
    pub fn get_tasks_by_status(&self, status: TaskStatus) -> Vec<Task> {
        let store = self.store.lock();
        let mut tasks: Vec<Task> = store
            .tasks
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    /// Every task, oldest first.
    pub fn all_tasks(&self) -> Vec<Task> {
        let store = self.store.lock();
        let mut tasks: Vec<Task> = store.tasks.values().cloned().collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    /// Aggregate counts per status and per priority.
    pub fn get_metrics(&self) -> TaskMetrics {
        let store = self.store.lock();
        let mut totals = StatusCounts::default();
        let mut by_priority: BTreeMap<u8, StatusCounts> = BTreeMap::new();
        for task in store.tasks.values() {
            totals.record(task.status);
            by_priority.entry(task.priority).or_default().record(task.status);
        }
        TaskMetrics {
            total_pending: totals.pending,
            total_in_progress: totals.in_progress,
            total_completed: totals.completed,
            total_failed: totals.failed,
            total_cancelled: totals.cancelled,
            total: store.tasks.len(),
            by_priority,
        }
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}
