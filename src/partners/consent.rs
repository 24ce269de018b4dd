//! # Privacy settings shared with every partner.
//!
//! [`ConsentSettings`] stores consent strings and the underage flag. Changes are
//! reported to one [`ConsentObserver`] (the partner controller), which forwards
//! them to initialized adapters on the background context.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

/// Receives consent changes.
pub trait ConsentObserver: Send + Sync + 'static {
    fn consents_changed(&self, consents: &HashMap<String, String>, modified: &HashSet<String>);
    fn underage_changed(&self, is_user_underage: bool);
}

#[derive(Default)]
struct ConsentState {
    consents: HashMap<String, String>,
    is_user_underage: bool,
}

/// Thread-safe consent store.
#[derive(Default)]
pub struct ConsentSettings {
    state: Mutex<ConsentState>,
    observer: Mutex<Option<Arc<dyn ConsentObserver>>>,
}

impl ConsentSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn consents(&self) -> HashMap<String, String> {
        self.state.lock().consents.clone()
    }

    pub fn is_user_underage(&self) -> bool {
        self.state.lock().is_user_underage
    }

    /// Current consents and underage flag, read together.
    pub fn snapshot(&self) -> (HashMap<String, String>, bool) {
        let state = self.state.lock();
        (state.consents.clone(), state.is_user_underage)
    }

    /// Replaces all consents. Observers hear about it only if something changed.
    pub fn set_consents(&self, consents: HashMap<String, String>) {
        let modified = {
            let mut state = self.state.lock();
            let modified = modified_keys(&state.consents, &consents);
            state.consents = consents.clone();
            modified
        };
        self.notify_consents(&consents, &modified);
    }

    /// Sets (`Some`) or removes (`None`) a single consent.
    pub fn set_consent(&self, key: impl Into<String>, value: Option<String>) {
        let key = key.into();
        let (consents, changed) = {
            let mut state = self.state.lock();
            let changed = match value {
                Some(value) => state.consents.insert(key.clone(), value.clone()).as_ref() != Some(&value),
                None => state.consents.remove(&key).is_some(),
            };
            (state.consents.clone(), changed)
        };
        if changed {
            self.notify_consents(&consents, &HashSet::from([key]));
        }
    }

    pub fn set_is_user_underage(&self, is_user_underage: bool) {
        let changed = {
            let mut state = self.state.lock();
            std::mem::replace(&mut state.is_user_underage, is_user_underage) != is_user_underage
        };
        if !changed {
            return;
        }
        if let Some(observer) = self.observer() {
            observer.underage_changed(is_user_underage);
        }
    }

    pub(crate) fn set_observer(&self, observer: Arc<dyn ConsentObserver>) {
        let mut slot = self.observer.lock();
        if slot.is_some() {
            tracing::warn!("consent observer replaced");
        }
        *slot = Some(observer);
    }

    fn observer(&self) -> Option<Arc<dyn ConsentObserver>> {
        self.observer.lock().clone()
    }

    fn notify_consents(&self, consents: &HashMap<String, String>, modified: &HashSet<String>) {
        if modified.is_empty() {
            return;
        }
        tracing::debug!(modified = ?modified, "consents changed");
        if let Some(observer) = self.observer() {
            observer.consents_changed(consents, modified);
        }
    }
}

/// Keys whose value differs between `old` and `new`, including added and removed keys.
pub(crate) fn modified_keys(
    old: &HashMap<String, String>,
    new: &HashMap<String, String>,
) -> HashSet<String> {
    let mut modified: HashSet<String> = new
        .iter()
        .filter(|(k, v)| old.get(*k) != Some(*v))
        .map(|(k, _)| k.clone())
        .collect();
    modified.extend(old.keys().filter(|k| !new.contains_key(*k)).cloned());
    modified
}
