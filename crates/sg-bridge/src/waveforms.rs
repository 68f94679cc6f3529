//! In-memory waveform library, keyed by name. Waveforms are never
//! persisted to disk.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sg_core::ParsedWaveform;

#[derive(Clone, Default)]
pub struct WaveformStore {
    inner: Arc<Mutex<HashMap<String, ParsedWaveform>>>,
}

impl WaveformStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save under the waveform's name. Last write wins.
    pub fn save(&self, waveform: ParsedWaveform) {
        self.inner
            .lock()
            .unwrap()
            .insert(waveform.name.clone(), waveform);
    }

    pub fn get(&self, name: &str) -> Option<ParsedWaveform> {
        self.inner.lock().unwrap().get(name).cloned()
    }

    pub fn delete(&self, name: &str) -> bool {
        self.inner.lock().unwrap().remove(name).is_some()
    }

    /// All stored waveforms, oldest first.
    pub fn list(&self) -> Vec<ParsedWaveform> {
        let mut all: Vec<ParsedWaveform> = self.inner.lock().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        all
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sg_core::parse_waveform;

    #[test]
    fn save_overwrites_same_name() {
        let store = WaveformStore::new();
        let first = parse_waveform("a:0,1,8=10,20,4,1,1/50.00-0,60.00-0", "steady").unwrap();
        let second = parse_waveform("b:0,1,8=30,40,2,2,1/80.00-0,90.00-0", "steady").unwrap();
        store.save(first);
        store.save(second);

        assert_eq!(store.len(), 1);
        let kept = store.get("steady").unwrap();
        assert_eq!(kept.tag, "b", "newest content wins");
    }

    #[test]
    fn delete_and_miss() {
        let store = WaveformStore::new();
        let w = parse_waveform("a:0,1,8=10,20,4,1,1/50.00-0", "w").unwrap();
        store.save(w);
        assert!(store.delete("w"));
        assert!(!store.delete("w"));
        assert!(store.get("w").is_none());
        assert!(store.is_empty());
    }
}
