//! Signal deduplication.
//!
//! A signal for (rule, symbol) is admitted only if the previous admitted
//! signal for the same pair is at least the rule's cooldown older. Time is
//! the signal's event timestamp, so a replayed feed dedups the same way a
//! live one does.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use sentinel_core::error::SentinelResult;
use sentinel_core::types::Signal;

/// Result of [`Deduplicator::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Suppressed { remaining_ms: i64 },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// One persisted cooldown entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownEntry {
    pub rule_id: String,
    pub symbol: String,
    /// Unix ms of the last admitted signal
    pub last_fired: i64,
}

/// Exported cooldown state, written on shutdown and read back on start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownSnapshot {
    pub entries: Vec<CooldownEntry>,
}

impl CooldownSnapshot {
    pub fn load(path: &Path) -> SentinelResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> SentinelResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Per (rule, symbol) cooldown gate.
///
/// Entries are grouped by symbol. Each symbol has its own event-time clock,
/// so expiry is only ever judged against that symbol's timestamps.
pub struct Deduplicator {
    cooldowns: HashMap<String, i64>,
    default_cooldown_ms: i64,
    /// symbol -> rule id -> last admitted timestamp
    entries: Mutex<HashMap<String, HashMap<String, i64>>>,
}

impl Deduplicator {
    /// `cooldowns` maps rule id to its cooldown; other rules use `default_cooldown`.
    pub fn new(cooldowns: HashMap<String, Duration>, default_cooldown: Duration) -> Self {
        Self {
            cooldowns: cooldowns
                .into_iter()
                .map(|(id, d)| (id, d.as_millis() as i64))
                .collect(),
            default_cooldown_ms: default_cooldown.as_millis() as i64,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn cooldown_ms(&self, rule_id: &str) -> i64 {
        self.cooldowns
            .get(rule_id)
            .copied()
            .unwrap_or(self.default_cooldown_ms)
    }

    /// Admit or suppress a signal.
    ///
    /// The check and the update happen under one lock, so of two concurrent
    /// calls for the same pair at most one is admitted.
    pub fn admit(&self, signal: &Signal) -> Admission {
        let cooldown = self.cooldown_ms(&signal.rule_id);
        let mut entries = self.entries.lock();

        let last = entries
            .get(&signal.symbol)
            .and_then(|rules| rules.get(&signal.rule_id))
            .copied();
        if let Some(last) = last {
            let elapsed = signal.fired_at - last;
            if elapsed < cooldown {
                debug!(
                    rule_id = %signal.rule_id,
                    symbol = %signal.symbol,
                    signal_id = %signal.id,
                    elapsed_ms = elapsed,
                    "Signal suppressed by cooldown"
                );
                return Admission::Suppressed {
                    remaining_ms: cooldown - elapsed,
                };
            }
        }

        entries
            .entry(signal.symbol.clone())
            .or_default()
            .insert(signal.rule_id.clone(), signal.fired_at);
        Admission::Admitted
    }

    /// Drop the entries of `symbol` whose cooldown has passed at `now_ms`,
    /// a timestamp taken from that symbol's own events.
    pub fn prune(&self, symbol: &str, now_ms: i64) -> usize {
        let mut entries = self.entries.lock();
        let Some(rules) = entries.get_mut(symbol) else {
            return 0;
        };
        let before = rules.len();
        rules.retain(|rule_id, last| now_ms - *last < self.cooldown_ms(rule_id));
        let pruned = before - rules.len();
        if rules.is_empty() {
            entries.remove(symbol);
        }
        pruned
    }

    pub fn len(&self) -> usize {
        self.entries.lock().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> CooldownSnapshot {
        let mut entries: Vec<CooldownEntry> = self
            .entries
            .lock()
            .iter()
            .flat_map(|(symbol, rules)| {
                rules.iter().map(move |(rule_id, last_fired)| CooldownEntry {
                    rule_id: rule_id.clone(),
                    symbol: symbol.clone(),
                    last_fired: *last_fired,
                })
            })
            .collect();
        entries.sort_by(|a, b| (&a.rule_id, &a.symbol).cmp(&(&b.rule_id, &b.symbol)));
        CooldownSnapshot { entries }
    }

    /// Load entries, keeping the later timestamp when a pair is already present.
    pub fn restore(&self, snapshot: CooldownSnapshot) {
        let mut entries = self.entries.lock();
        let count = snapshot.entries.len();
        for entry in snapshot.entries {
            let slot = entries
                .entry(entry.symbol)
                .or_default()
                .entry(entry.rule_id)
                .or_insert(i64::MIN);
            *slot = (*slot).max(entry.last_fired);
        }
        info!(entries = count, "Restored cooldown state");
    }
}
