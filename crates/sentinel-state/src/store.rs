//! The per-symbol state store.

use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, trace};

use sentinel_core::traits::StreamingIndicator;
use sentinel_core::types::{Bar, BarField, EventKind, EventPayload, MarketEvent, Tick};
use sentinel_indicators::IndicatorSpec;

use crate::state::{InstrumentState, StateInput};

/// What an applied event changed, with the state right after it.
#[derive(Debug, Clone)]
pub struct StateDelta {
    pub symbol: String,
    pub sequence: u64,
    pub timestamp: i64,
    pub kind: EventKind,
    /// Inputs written by this event
    pub touched: BTreeSet<StateInput>,
    /// Indicators whose value differs from before the event
    pub changed_indicators: Vec<String>,
    /// Taken under the same lock as the update
    pub snapshot: Arc<InstrumentState>,
}

impl StateDelta {
    pub fn touches(&self, input: &StateInput) -> bool {
        self.touched.contains(input)
    }

    pub fn touches_any<'a>(&self, mut inputs: impl Iterator<Item = &'a StateInput>) -> bool {
        inputs.any(|input| self.touched.contains(input))
    }
}

/// Result of [`InstrumentStateStore::apply`].
#[derive(Debug, Clone)]
pub enum ApplyOutcome {
    Applied(StateDelta),
    /// Sequence at or below the last applied one. Nothing changed.
    Stale { last_applied: u64 },
    /// Connection events carry no instrument state.
    Ignored,
}

impl ApplyOutcome {
    pub fn is_stale(&self) -> bool {
        matches!(self, ApplyOutcome::Stale { .. })
    }

    pub fn delta(&self) -> Option<&StateDelta> {
        match self {
            ApplyOutcome::Applied(delta) => Some(delta),
            _ => None,
        }
    }
}

struct LiveIndicator {
    field: BarField,
    indicator: Box<dyn StreamingIndicator>,
}

struct Slot {
    state: InstrumentState,
    indicators: Vec<LiveIndicator>,
}

/// Rolling state for every symbol seen on the feed.
///
/// Each symbol sits behind its own mutex; the map lock is only held long
/// enough to find or create the slot, so different symbols update in
/// parallel.
pub struct InstrumentStateStore {
    window_capacity: usize,
    specs: Vec<IndicatorSpec>,
    slots: RwLock<HashMap<String, Arc<Mutex<Slot>>>>,
}

impl InstrumentStateStore {
    pub fn new(window_capacity: usize, specs: Vec<IndicatorSpec>) -> Self {
        Self {
            window_capacity: window_capacity.max(1),
            specs,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn window_capacity(&self) -> usize {
        self.window_capacity
    }

    pub fn indicator_specs(&self) -> &[IndicatorSpec] {
        &self.specs
    }

    fn slot(&self, symbol: &str) -> Arc<Mutex<Slot>> {
        if let Some(slot) = self.slots.read().get(symbol) {
            return Arc::clone(slot);
        }

        let mut slots = self.slots.write();
        let slot = slots.entry(symbol.to_string()).or_insert_with(|| {
            debug!(symbol, "Tracking new instrument");
            Arc::new(Mutex::new(Slot {
                state: InstrumentState::new(symbol, self.window_capacity),
                indicators: self
                    .specs
                    .iter()
                    .map(|spec| LiveIndicator {
                        field: spec.field,
                        indicator: spec.build(),
                    })
                    .collect(),
            }))
        });
        Arc::clone(slot)
    }

    /// Apply one event to its symbol's state.
    pub fn apply(&self, event: &MarketEvent) -> ApplyOutcome {
        if event.is_connection() {
            return ApplyOutcome::Ignored;
        }

        let slot = self.slot(&event.symbol);
        let mut slot = slot.lock();

        if let Some(last_applied) = slot.state.last_sequence {
            if event.sequence <= last_applied {
                trace!(
                    symbol = %event.symbol,
                    sequence = event.sequence,
                    last_applied,
                    "Dropping stale event"
                );
                return ApplyOutcome::Stale { last_applied };
            }
        }

        let (touched, changed_indicators) = match &event.payload {
            EventPayload::Tick(tick) => (Self::apply_tick(&mut slot, tick), Vec::new()),
            EventPayload::BarClose(bar) => Self::apply_bar(&mut slot, bar),
            EventPayload::ConnectionUp | EventPayload::ConnectionDown => {
                return ApplyOutcome::Ignored
            }
        };

        slot.state.last_sequence = Some(event.sequence);
        slot.state.last_timestamp = event.timestamp;
        slot.state.last_event = Some(event.kind());

        ApplyOutcome::Applied(StateDelta {
            symbol: event.symbol.clone(),
            sequence: event.sequence,
            timestamp: event.timestamp,
            kind: event.kind(),
            touched,
            changed_indicators,
            snapshot: Arc::new(slot.state.clone()),
        })
    }

    fn apply_tick(slot: &mut Slot, tick: &Tick) -> BTreeSet<StateInput> {
        let state = &mut slot.state;
        state.previous = state.current.clone();
        state.current.price = Some(tick.price);
        state.current.volume = Some(tick.volume);
        state.ticks_applied += 1;

        BTreeSet::from([StateInput::Price, StateInput::Volume])
    }

    fn apply_bar(slot: &mut Slot, bar: &Bar) -> (BTreeSet<StateInput>, Vec<String>) {
        let Slot { state, indicators } = slot;
        state.previous = state.current.clone();
        state.bars.push(*bar);
        state.current.price = Some(bar.close);
        state.current.volume = Some(bar.volume);
        state.bars_applied += 1;

        let mut touched = BTreeSet::from([StateInput::Price, StateInput::Volume, StateInput::Bars]);
        let mut changed = Vec::new();

        for live in indicators.iter_mut() {
            let name = live.indicator.name().to_string();
            let before = state.previous.indicator(&name);
            match live.indicator.update(bar.field(live.field)) {
                Some(value) => {
                    if before != Some(value) {
                        changed.push(name.clone());
                    }
                    state.current.indicators.insert(name.clone(), value);
                    touched.insert(StateInput::Indicator(name));
                }
                None => {
                    state.current.indicators.remove(&name);
                }
            }
        }

        (touched, changed)
    }

    /// Read-only copy of a symbol's state.
    pub fn snapshot(&self, symbol: &str) -> Option<InstrumentState> {
        let slot = self.slots.read().get(symbol).cloned()?;
        let state = slot.lock().state.clone();
        Some(state)
    }

    pub fn last_sequence(&self, symbol: &str) -> Option<u64> {
        let slot = self.slots.read().get(symbol).cloned()?;
        let last = slot.lock().state.last_sequence;
        last
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.slots.read().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}
