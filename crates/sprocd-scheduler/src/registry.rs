use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use sprocd_core::config::{DatabaseList, GroupEntry, ProcedureList};
use tracing::{debug, warn};

use crate::{
    error::ConfigError,
    types::{DatabaseTarget, ProcedureGroup},
};

/// One database and the groups it runs, in dispatch order.
#[derive(Debug, Clone)]
pub struct ScheduledDatabase {
    pub target: Arc<DatabaseTarget>,
    pub groups: Vec<Arc<ProcedureGroup>>,
}

/// Immutable schedule built once at startup.
///
/// Databases keep the order of the database list; groups keep either the
/// order the database entry lists them in or their declaration order.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    databases: Vec<ScheduledDatabase>,
}

impl Schedule {
    /// Join the database list with the procedure-group list by name.
    pub fn load(databases: &DatabaseList, procedures: &ProcedureList) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        let mut scheduled = Vec::with_capacity(databases.databases.len());

        for entry in &databases.databases {
            if !seen.insert(entry.name.as_str()) {
                return Err(ConfigError::DuplicateDatabase(entry.name.clone()));
            }

            let declared = procedures
                .databases
                .iter()
                .find(|p| p.name == entry.name)
                .ok_or_else(|| ConfigError::MissingProcedures {
                    database: entry.name.clone(),
                })?;

            let keys: Vec<&str> = match entry.groups {
                Some(ref listed) => listed.iter().map(String::as_str).collect(),
                None => declared.procedures.iter().map(|(k, _)| k.as_str()).collect(),
            };

            let mut groups = Vec::with_capacity(keys.len());
            let mut listed = HashSet::with_capacity(keys.len());
            for key in keys {
                if !listed.insert(key) {
                    return Err(ConfigError::DuplicateGroup {
                        database: entry.name.clone(),
                        group: key.to_string(),
                    });
                }
                let (_, group) = declared
                    .procedures
                    .iter()
                    .find(|(k, _)| k == key)
                    .ok_or_else(|| ConfigError::UnknownGroup {
                        database: entry.name.clone(),
                        group: key.to_string(),
                    })?;
                groups.push(Arc::new(build_group(&entry.name, key, group)?));
            }

            debug!(database = %entry.name, groups = groups.len(), "database scheduled");
            scheduled.push(ScheduledDatabase {
                target: Arc::new(DatabaseTarget {
                    name: entry.name.clone(),
                    descriptor: entry.config.clone(),
                }),
                groups,
            });
        }

        for orphan in procedures.databases.iter().filter(|p| !seen.contains(p.name.as_str())) {
            warn!(database = %orphan.name, "procedure entry has no matching database, ignored");
        }

        Ok(Self {
            databases: scheduled,
        })
    }

    /// Build a schedule from already-validated parts.
    pub fn from_databases(databases: Vec<ScheduledDatabase>) -> Self {
        Self { databases }
    }

    pub fn database_names(&self) -> Vec<String> {
        self.databases.iter().map(|d| d.target.name.clone()).collect()
    }

    pub fn target(&self, database: &str) -> Option<&Arc<DatabaseTarget>> {
        self.find(database).map(|d| &d.target)
    }

    pub fn groups(&self, database: &str) -> Option<&[Arc<ProcedureGroup>]> {
        self.find(database).map(|d| d.groups.as_slice())
    }

    pub fn group(&self, database: &str, key: &str) -> Option<&Arc<ProcedureGroup>> {
        self.groups(database)?.iter().find(|g| g.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScheduledDatabase> {
        self.databases.iter()
    }

    pub fn len(&self) -> usize {
        self.databases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }

    fn find(&self, database: &str) -> Option<&ScheduledDatabase> {
        self.databases.iter().find(|d| d.target.name == database)
    }
}

fn build_group(
    database: &str,
    key: &str,
    entry: &GroupEntry,
) -> Result<ProcedureGroup, ConfigError> {
    let negative = |field: &'static str, value: i64| ConfigError::NegativeDuration {
        database: database.to_string(),
        group: key.to_string(),
        field,
        value,
    };

    if entry.timeout < 0 {
        return Err(negative("timeout", entry.timeout));
    }
    let pause = match entry.pause {
        Some(ms) if ms < 0 => return Err(negative("pause", ms)),
        Some(ms) => Some(Duration::from_millis(ms as u64)),
        None => None,
    };

    Ok(ProcedureGroup {
        key: key.to_string(),
        procedures: entry.procedures.clone(),
        timeout: Duration::from_millis(entry.timeout as u64),
        pause,
    })
}
