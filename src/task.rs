//! Task log (§4.G) — one append-only record per lifecycle operation.
//!
//! §9 Design Notes: "replace class inheritance with a single task record
//! carrying a discriminant and a `group_id` payload" — `TaskKind` stands in
//! for the Python source's per-operation subclasses
//! (`CreateTask`/`UpdateTask`/`DeleteTask` in
//! `examples/original_source/tarantool.py`).

use chrono::{DateTime, Utc};

use crate::model::GroupId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Create,
    Delete,
    Heal,
    Rename,
    Resize,
    Reconfigure,
    Upgrade,
    SetPassword,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    Success,
    Critical,
}

#[derive(Debug, Clone)]
pub struct TaskMessage {
    pub at: DateTime<Utc>,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct TaskLog {
    pub id: String,
    pub kind: TaskKind,
    pub group_id: GroupId,
    pub status: TaskStatus,
    pub messages: Vec<TaskMessage>,
}

impl TaskLog {
    pub fn new(id: impl Into<String>, kind: TaskKind, group_id: GroupId) -> Self {
        Self {
            id: id.into(),
            kind,
            group_id,
            status: TaskStatus::Running,
            messages: Vec::new(),
        }
    }

    /// Appends a message. Per §4.G every lifecycle step logs before
    /// performing its side effect, so callers invoke this immediately
    /// ahead of the call it describes.
    pub fn log(&mut self, text: impl Into<String>) {
        self.messages.push(TaskMessage { at: Utc::now(), text: text.into() });
    }

    /// Status transitions are monotonic: `Running -> {Success|Critical}`.
    /// Calling this a second time on a terminal task is a logic error in
    /// the caller, not something this type needs to guard against at
    /// runtime — each lifecycle procedure calls it exactly once, on return.
    pub fn finish_success(&mut self) {
        debug_assert_eq!(self.status, TaskStatus::Running);
        self.status = TaskStatus::Success;
    }

    pub fn finish_critical(&mut self, error: impl Into<String>) {
        debug_assert_eq!(self.status, TaskStatus::Running);
        let error = error.into();
        self.log(format!("critical: {error}"));
        self.status = TaskStatus::Critical;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_are_monotonic() {
        let mut task = TaskLog::new("t1", TaskKind::Create, GroupId("g1".to_string()));
        assert_eq!(task.status, TaskStatus::Running);
        task.log("writing blueprint");
        task.finish_success();
        assert_eq!(task.status, TaskStatus::Success);
        assert_eq!(task.messages.len(), 1);
    }

    #[test]
    fn critical_status_carries_the_final_error_message() {
        let mut task = TaskLog::new("t2", TaskKind::Heal, GroupId("g1".to_string()));
        task.finish_critical("no survivors");
        assert_eq!(task.status, TaskStatus::Critical);
        assert!(task.messages.last().unwrap().text.contains("no survivors"));
    }
}
