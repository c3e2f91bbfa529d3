use dashmap::DashMap;

use crate::types::{Generation, LineageSnapshot, LineageState};

/// Observability table keyed by `(database, group)`.
///
/// Updates from a lineage whose generation is older than the recorded one
/// are ignored, so a superseded cohort can never overwrite a newer entry.
#[derive(Debug, Default)]
pub struct LineageTable {
    entries: DashMap<(String, String), LineageSnapshot>,
}

impl LineageTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the entry for a lineage about to be started under `generation`.
    pub fn register(&self, database: &str, group: &str, generation: Generation) {
        self.entries.insert(
            (database.to_string(), group.to_string()),
            LineageSnapshot {
                database: database.to_string(),
                group: group.to_string(),
                generation,
                state: LineageState::Idle,
                passes: 0,
                last_outcome: None,
            },
        );
    }

    pub fn set_state(
        &self,
        database: &str,
        group: &str,
        generation: Generation,
        state: LineageState,
    ) {
        self.update(database, group, generation, |entry| entry.state = state);
    }

    /// A pass reached the runner.
    pub fn pass_started(&self, database: &str, group: &str, generation: Generation) {
        self.set_state(database, group, generation, LineageState::Running);
    }

    /// A pass ran its procedure list, or failed trying to connect.
    pub fn pass_finished(&self, database: &str, group: &str, generation: Generation) {
        self.update(database, group, generation, |entry| entry.passes += 1);
    }

    pub fn record_outcome(
        &self,
        database: &str,
        group: &str,
        generation: Generation,
        outcome: &str,
    ) {
        self.update(database, group, generation, |entry| {
            entry.last_outcome = Some(outcome.to_string());
        });
    }

    /// Snapshot sorted by database then group.
    pub fn snapshot(&self) -> Vec<LineageSnapshot> {
        let mut all: Vec<LineageSnapshot> =
            self.entries.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| (&a.database, &a.group).cmp(&(&b.database, &b.group)));
        all
    }

    pub fn get(&self, database: &str, group: &str) -> Option<LineageSnapshot> {
        self.entries
            .get(&(database.to_string(), group.to_string()))
            .map(|e| e.value().clone())
    }

    fn update(
        &self,
        database: &str,
        group: &str,
        generation: Generation,
        f: impl FnOnce(&mut LineageSnapshot),
    ) {
        let key = (database.to_string(), group.to_string());
        if let Some(mut entry) = self.entries.get_mut(&key) {
            if entry.generation == generation {
                f(entry.value_mut());
            }
        }
    }
}
