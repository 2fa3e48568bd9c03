//! TableAdmin: describe, list, create, delete and wait on tables.
//!
//! Thin layer over `TableClient` that turns "not found" into a typed
//! error and bounds every status wait.

use std::time::Duration;

use crate::client::TableClient;
use crate::error::{DynoError, Result};
use crate::retry::Sleeper;
use crate::types::{TableSchema, TableStatus};

/// Bounded status polling. Exceeding `max_polls` is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            max_polls: 50,
        }
    }
}

pub struct TableAdmin<'a> {
    client: &'a dyn TableClient,
    wait: WaitPolicy,
    sleeper: &'a dyn Sleeper,
}

impl<'a> TableAdmin<'a> {
    pub fn new(client: &'a dyn TableClient, wait: WaitPolicy, sleeper: &'a dyn Sleeper) -> Self {
        Self { client, wait, sleeper }
    }

    /// Describe a table that must exist.
    pub fn describe(&self, table: &str) -> Result<TableSchema> {
        self.try_describe(table)?
            .ok_or_else(|| DynoError::TableNotFound(table.to_string()))
    }

    /// Describe a table that may not exist.
    pub fn try_describe(&self, table: &str) -> Result<Option<TableSchema>> {
        match self.client.describe_table(table) {
            Ok(schema) => Ok(schema),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Every table name, following list pagination to the end.
    pub fn list_all(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut start: Option<String> = None;
        loop {
            let page = self.client.list_tables(start.as_deref())?;
            names.extend(page.names);
            match page.last_evaluated {
                Some(last) => start = Some(last),
                None => return Ok(names),
            }
        }
    }

    /// Create `definition.name`; refuses if a table of that name exists.
    pub fn create(&self, definition: &TableSchema) -> Result<TableStatus> {
        if self.try_describe(&definition.name)?.is_some() {
            return Err(DynoError::TableExists(definition.name.clone()));
        }
        match self.client.create_table(definition) {
            Err(DynoError::Service { code, .. }) if code == "ResourceInUseException" => {
                Err(DynoError::TableExists(definition.name.clone()))
            }
            other => other,
        }
    }

    pub fn delete(&self, table: &str) -> Result<()> {
        match self.client.delete_table(table) {
            Err(err) if err.is_not_found() => Err(DynoError::TableNotFound(table.to_string())),
            other => other,
        }
    }

    /// Poll describe until the table reports `target`.
    ///
    /// `TableStatus::Deleted` is reached when describe stops finding the
    /// table. The first check happens immediately; each further check is
    /// preceded by one poll interval.
    pub fn wait_until(&self, table: &str, target: TableStatus) -> Result<()> {
        for poll in 0..self.wait.max_polls {
            if poll > 0 {
                self.sleeper.sleep(self.wait.poll_interval);
            }
            let status = match self.try_describe(table)? {
                Some(schema) => schema.status,
                None => TableStatus::Deleted,
            };
            tracing::debug!(table, poll, status = %status, target = %target, "waiting on table status");
            if status == target {
                return Ok(());
            }
        }
        Err(DynoError::TableCreationTimeout {
            table: table.to_string(),
            target: target.to_string(),
            polls: self.wait.max_polls,
        })
    }
}
