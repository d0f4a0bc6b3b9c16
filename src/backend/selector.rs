//! Process-wide backend selection.
//!
//! The default backend is chosen lazily: the first request probes the
//! candidates in priority order and caches the winner. Later requests only
//! take the read lock.

use std::sync::{Arc, PoisonError, RwLock};

use lazy_static::lazy_static;
use tracing::{debug, info};

use super::{Backend, BackendKind};
use crate::error::{AnalysisError, Result};

/// Probe state of a [`BackendSelector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorState {
    Unprobed,
    /// Index of the chosen candidate, `None` when nothing was available.
    Probed(Option<usize>),
}

pub struct BackendSelector {
    candidates: Vec<Arc<dyn Backend>>,
    state: RwLock<SelectorState>,
}

lazy_static! {
    static ref GLOBAL: BackendSelector = BackendSelector::builtin();
}

/// The selector behind [`list_backends`](super::list_backends) and
/// [`get_backend`](super::get_backend).
pub fn global() -> &'static BackendSelector {
    &GLOBAL
}

impl BackendSelector {
    /// Selector over `candidates`, highest priority first.
    pub fn new(candidates: Vec<Arc<dyn Backend>>) -> Self {
        Self {
            candidates,
            state: RwLock::new(SelectorState::Unprobed),
        }
    }

    /// Selector over the shipped backends.
    pub fn builtin() -> Self {
        Self::new(BackendKind::PRIORITY.iter().map(|k| k.instance()).collect())
    }

    pub fn state(&self) -> SelectorState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forget the cached default; the next request probes again.
    pub fn reset(&self) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = SelectorState::Unprobed;
        debug!("backend selector reset");
    }

    /// Names of available candidates, in priority order.
    pub fn available(&self) -> Vec<&'static str> {
        self.candidates
            .iter()
            .filter(|b| b.is_available())
            .map(|b| b.name())
            .collect()
    }

    /// All candidates regardless of availability.
    pub fn candidates(&self) -> &[Arc<dyn Backend>] {
        &self.candidates
    }

    pub fn select(&self, name: Option<&str>) -> Result<Arc<dyn Backend>> {
        match name {
            Some(name) => self.backend(name),
            None => self.default_backend(),
        }
    }

    /// Cached default backend, probing on first use.
    pub fn default_backend(&self) -> Result<Arc<dyn Backend>> {
        if let SelectorState::Probed(choice) = self.state() {
            return self.chosen(choice);
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        // Another thread may have probed while we waited for the lock.
        if let SelectorState::Probed(choice) = *state {
            return self.chosen(choice);
        }
        let choice = self.probe();
        *state = SelectorState::Probed(choice);
        self.chosen(choice)
    }

    /// Explicitly named backend. Bypasses the cache.
    pub fn backend(&self, name: &str) -> Result<Arc<dyn Backend>> {
        let wanted = BackendKind::from_name(name)
            .map(|k| k.name())
            .unwrap_or(name);
        let backend = self
            .candidates
            .iter()
            .find(|b| b.name() == wanted)
            .ok_or_else(|| AnalysisError::UnknownBackend {
                name: name.to_string(),
                known: self
                    .candidates
                    .iter()
                    .map(|b| b.name())
                    .collect::<Vec<_>>()
                    .join(", "),
            })?;
        if !backend.is_available() {
            return Err(AnalysisError::BackendUnavailable(backend.name().to_string()));
        }
        Ok(Arc::clone(backend))
    }

    fn probe(&self) -> Option<usize> {
        for (index, backend) in self.candidates.iter().enumerate() {
            if backend.is_available() {
                info!(backend = backend.name(), "selected default backend");
                return Some(index);
            }
            debug!(backend = backend.name(), "backend unavailable, falling back");
        }
        None
    }

    fn chosen(&self, choice: Option<usize>) -> Result<Arc<dyn Backend>> {
        choice
            .and_then(|i| self.candidates.get(i))
            .cloned()
            .ok_or(AnalysisError::NoBackendAvailable)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::backend::{Capabilities, HeuristicBackend, RawFacts};

    /// Backend with fixed availability that counts probes.
    struct FakeBackend {
        name: &'static str,
        available: bool,
        probes: AtomicUsize,
    }

    impl FakeBackend {
        fn new(name: &'static str, available: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                available,
                probes: AtomicUsize::new(0),
            })
        }
    }

    impl Backend for FakeBackend {
        fn name(&self) -> &'static str {
            self.name
        }

        fn version(&self) -> &'static str {
            "0.0.0"
        }

        fn is_available(&self) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst);
            self.available
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::empty()
        }

        fn parse(&self, _source: &str, _filename: &str) -> Result<RawFacts> {
            Ok(RawFacts::default())
        }
    }

    #[test]
    fn test_falls_back_to_next_available() {
        let broken = FakeBackend::new("broken", false);
        let selector = BackendSelector::new(vec![
            broken as Arc<dyn Backend>,
            Arc::new(HeuristicBackend::new()),
        ]);
        let backend = selector.default_backend().unwrap();
        assert_eq!(backend.name(), "heuristic");
        assert_eq!(selector.state(), SelectorState::Probed(Some(1)));
    }

    #[test]
    fn test_probes_once_across_threads() {
        let fake = FakeBackend::new("fake", true);
        let selector = BackendSelector::new(vec![fake.clone() as Arc<dyn Backend>]);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    assert_eq!(selector.default_backend().unwrap().name(), "fake");
                });
            }
        });
        assert_eq!(fake.probes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reset_probes_again() {
        let fake = FakeBackend::new("fake", true);
        let selector = BackendSelector::new(vec![fake.clone() as Arc<dyn Backend>]);
        selector.default_backend().unwrap();
        selector.reset();
        assert_eq!(selector.state(), SelectorState::Unprobed);
        selector.default_backend().unwrap();
        assert_eq!(fake.probes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_nothing_available() {
        let off = FakeBackend::new("off", false);
        let selector = BackendSelector::new(vec![off as Arc<dyn Backend>]);
        assert!(matches!(
            selector.default_backend(),
            Err(AnalysisError::NoBackendAvailable)
        ));
    }

    #[test]
    fn test_named_lookup_errors() {
        let selector = BackendSelector::new(vec![
            FakeBackend::new("off", false) as Arc<dyn Backend>,
            Arc::new(HeuristicBackend::new()),
        ]);
        assert!(matches!(
            selector.backend("clang"),
            Err(AnalysisError::UnknownBackend { .. })
        ));
        assert!(matches!(
            selector.backend("off"),
            Err(AnalysisError::BackendUnavailable(_))
        ));
        assert_eq!(selector.backend("regex").unwrap().name(), "heuristic");
        assert_eq!(selector.state(), SelectorState::Unprobed);
    }
}
