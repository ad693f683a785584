//! Logical tasks and the function table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::utils::config::{
    COMM_GROUP, COMM_GROUP_NAME, ENTRY_GROUP, ENTRY_GROUP_NAME, RECV_FUNCTION, SEND_FUNCTION,
};

/// Index of a [`Task`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub usize);

/// Logical actor identity after array index resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,

    /// Human readable index, e.g. `[3,0,0,0]`
    pub label: String,

    /// Actor kind the task was resolved from
    pub kind: i32,
}

/// All tasks resolved from one actor kind, in discovery order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskGroup {
    pub kind: i32,
    pub name: String,
    pub tasks: Vec<TaskId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub group: u32,
}

/// Function id → (name, group) table, fixed before any record is replayed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionTable {
    functions: BTreeMap<i32, Function>,
    groups: BTreeMap<u32, String>,
}

impl FunctionTable {
    /// Table holding only the synthetic `Send`/`Recv` functions
    pub fn new() -> Self {
        let mut table = Self::default();
        table.groups.insert(COMM_GROUP, COMM_GROUP_NAME.to_string());
        table.groups.insert(ENTRY_GROUP, ENTRY_GROUP_NAME.to_string());
        table.insert(SEND_FUNCTION, "Send", COMM_GROUP);
        table.insert(RECV_FUNCTION, "Recv", COMM_GROUP);
        table
    }

    /// Build the table from entry definitions, all placed in the entry group
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = (i32, &'a str)>) -> Self {
        let mut table = Self::new();
        for (id, name) in entries {
            table.insert(id, name, ENTRY_GROUP);
        }
        table
    }

    pub fn insert(&mut self, id: i32, name: impl Into<String>, group: u32) {
        self.functions.insert(
            id,
            Function {
                name: name.into(),
                group,
            },
        );
    }

    pub fn get(&self, id: i32) -> Option<&Function> {
        self.functions.get(&id)
    }

    pub fn name(&self, id: i32) -> &str {
        self.functions
            .get(&id)
            .map(|f| f.name.as_str())
            .unwrap_or("unknown")
    }

    /// Whether the function is a message primitive
    pub fn is_comm(&self, id: i32) -> bool {
        self.functions
            .get(&id)
            .map(|f| f.group == COMM_GROUP)
            .unwrap_or(false)
    }

    pub fn group_name(&self, group: u32) -> Option<&str> {
        self.groups.get(&group).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
