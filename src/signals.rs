// Cognitive signals - typed notes scripts can leave for an outside observer

use crate::namespace::{render_value, Binding, Namespace};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Uncertainty,
    Exploration,
    Commitment,
}

impl SignalKind {
    pub const ALL: [SignalKind; 3] = [
        SignalKind::Uncertainty,
        SignalKind::Exploration,
        SignalKind::Commitment,
    ];

    /// Name of the sandbox binding that records this kind
    pub fn binding_name(&self) -> &'static str {
        match self {
            SignalKind::Uncertainty => "uncertain",
            SignalKind::Exploration => "explore",
            SignalKind::Commitment => "commit",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SignalKind::Uncertainty => "flag something you are unsure about",
            SignalKind::Exploration => "note that you are trying an exploratory path",
            SignalKind::Commitment => "note that you are committing to an approach",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub note: String,
    /// Step during which the signal was raised
    pub step: u32,
    pub timestamp: DateTime<Utc>,
}

/// Per-run sink for signals, handed to the loop by the caller.
#[derive(Debug, Clone, Default)]
pub struct SignalCollector {
    signals: Arc<Mutex<Vec<Signal>>>,
    step: Arc<AtomicU32>,
}

impl SignalCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the loop before each execution
    pub fn set_step(&self, step: u32) {
        self.step.store(step, Ordering::SeqCst);
    }

    pub fn record(&self, kind: SignalKind, note: impl Into<String>) {
        let signal = Signal {
            kind,
            note: note.into(),
            step: self.step.load(Ordering::SeqCst),
            timestamp: Utc::now(),
        };
        debug!(kind = ?signal.kind, step = signal.step, "signal recorded");
        self.signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(signal);
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.signals.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Signal bindings; calls are dropped when no collector is registered.
/// Nothing a signal call returns affects control flow.
pub fn signal_bindings(collector: Option<&SignalCollector>) -> Namespace {
    SignalKind::ALL
        .iter()
        .map(|&kind| {
            let collector = collector.cloned();
            let binding = Binding::function(1, move |args| {
                match &collector {
                    Some(c) => c.record(kind, render_value(&args[0])),
                    None => debug!(kind = ?kind, "signal dropped, no collector"),
                }
                Ok(Value::Null)
            });
            (kind.binding_name().to_string(), binding)
        })
        .collect()
}
