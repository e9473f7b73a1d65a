//! Alias registry: short user-facing names for configured logs.
//!
//! The config file nests logs as `account -> logset -> log -> alias`.
//! [`AliasRegistry::build`] flattens that tree into an alias lookup,
//! dropping disabled logs and rejecting aliases that are already taken.
//! The first log to claim an alias keeps it; every later claim produces an
//! [`AliasCollision`] warning and is otherwise ignored.

use std::collections::HashMap;
use std::fmt;

use crate::config::Accounts;
use crate::log_entry::LogEntry;

// ---------------------------------------------------------------------------
// Collision warning
// ---------------------------------------------------------------------------

/// A log that could not be registered because its alias was already taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasCollision {
    pub alias: String,
    /// The log that was rejected.
    pub rejected: LogEntry,
    /// The log that already owns the alias.
    pub existing: LogEntry,
}

impl fmt::Display for AliasCollision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "duplicate alias for {}, already pointing to {}: {}",
            self.rejected.path(),
            self.existing.path(),
            self.alias
        )
    }
}

// ---------------------------------------------------------------------------
// AliasRegistry
// ---------------------------------------------------------------------------

/// Alias -> log mapping, in registration order.
#[derive(Debug, Clone, Default)]
pub struct AliasRegistry {
    entries: Vec<LogEntry>,
    index: HashMap<String, usize>,
}

impl AliasRegistry {
    /// Build the registry from the configured accounts.
    ///
    /// Iteration follows document order, which decides who wins an alias
    /// collision. Never fails; collisions are returned as warnings.
    pub fn build(accounts: &Accounts) -> (Self, Vec<AliasCollision>) {
        let mut registry = AliasRegistry::default();
        let mut warnings = Vec::new();

        for (account, logsets) in accounts.iter() {
            for (logset, logs) in logsets.iter() {
                for (log, spec) in logs.iter() {
                    let Some(alias) = spec.resolve(log) else {
                        continue;
                    };
                    let entry = LogEntry::new(alias, account, logset, log);
                    if let Err(collision) = registry.insert(entry) {
                        warnings.push(collision);
                    }
                }
            }
        }

        tracing::debug!(
            aliases = registry.len(),
            collisions = warnings.len(),
            "alias registry built"
        );
        (registry, warnings)
    }

    /// Register `entry` under its alias unless the alias is already taken.
    pub fn insert(&mut self, entry: LogEntry) -> Result<(), AliasCollision> {
        if let Some(&idx) = self.index.get(&entry.alias) {
            return Err(AliasCollision {
                alias: entry.alias.clone(),
                existing: self.entries[idx].clone(),
                rejected: entry,
            });
        }
        self.index.insert(entry.alias.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    pub fn get(&self, alias: &str) -> Option<&LogEntry> {
        self.index.get(alias).map(|&idx| &self.entries[idx])
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.index.contains_key(alias)
    }

    /// Aliases in registration order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.alias.as_str())
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<LogEntry> for AliasRegistry {
    /// Collect entries, silently keeping the first of any duplicate alias.
    fn from_iter<I: IntoIterator<Item = LogEntry>>(iter: I) -> Self {
        let mut registry = AliasRegistry::default();
        for entry in iter {
            let _ = registry.insert(entry);
        }
        registry
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
