//! One-shot gate for the background-loaded punctuation capability.

use crate::recognizer::Punctuator;
use std::sync::{Arc, OnceLock};

/// Flips exactly once, when punctuation has finished loading (or failed, or
/// is disabled). Reads are lock-free.
#[derive(Clone, Default)]
pub struct PunctuationGate {
    cell: Arc<OnceLock<Option<Arc<dyn Punctuator>>>>,
}

impl PunctuationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the gate. `None` records that punctuation is unavailable.
    ///
    /// Returns false if the gate was already open.
    pub fn open(&self, punctuator: Option<Arc<dyn Punctuator>>) -> bool {
        self.cell.set(punctuator).is_ok()
    }

    pub fn is_open(&self) -> bool {
        self.cell.get().is_some()
    }

    /// The punctuator, once the gate is open and loading succeeded.
    pub fn punctuator(&self) -> Option<Arc<dyn Punctuator>> {
        self.cell.get().and_then(|p| p.clone())
    }
}

impl std::fmt::Debug for PunctuationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PunctuationGate")
            .field("open", &self.is_open())
            .field("available", &self.punctuator().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::MockPunctuator;

    #[test]
    fn test_gate_starts_closed() {
        let gate = PunctuationGate::new();
        assert!(!gate.is_open());
        assert!(gate.punctuator().is_none());
    }

    #[test]
    fn test_gate_opens_once() {
        let gate = PunctuationGate::new();
        assert!(gate.open(Some(Arc::new(MockPunctuator::new("。")))));
        assert!(!gate.open(None));
        assert!(gate.is_open());
        assert!(gate.punctuator().is_some());
    }

    #[test]
    fn test_gate_open_without_punctuator() {
        let gate = PunctuationGate::new();
        let view = gate.clone();
        gate.open(None);
        assert!(view.is_open());
        assert!(view.punctuator().is_none());
    }
}
