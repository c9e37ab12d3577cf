use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::Mutex,
};

/// Transient per-save state: for each title currently being saved, the set
/// of cached file paths still referenced by the wikitext being saved.
///
/// Save-completion cleanup deletes every cached file for the title that is
/// NOT in this set, which is how graphs removed from an edit are garbage
/// collected. Guarded by a mutex so concurrent saves of distinct titles do
/// not interfere.
#[derive(Default)]
pub struct ActiveFileRegistry {
    inner: Mutex<HashMap<String, HashSet<PathBuf>>>,
}

impl ActiveFileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a save of `title` has begun. Idempotent; an existing
    /// entry (a re-entered save) keeps its accumulated files.
    pub fn begin_save(&self, title: &str) {
        self.inner
            .lock()
            .expect("registry lock")
            .entry(title.to_string())
            .or_default();
    }

    pub fn is_saving(&self, title: &str) -> bool {
        self.inner
            .lock()
            .expect("registry lock")
            .contains_key(title)
    }

    /// Record an active file for a title being saved. A no-op when no save
    /// is in flight for the title.
    pub fn record(&self, title: &str, path: &Path) {
        let mut inner = self.inner.lock().expect("registry lock");
        if let Some(files) = inner.get_mut(title) {
            files.insert(path.to_path_buf());
        }
    }

    pub fn is_active(&self, title: &str, path: &Path) -> bool {
        self.inner
            .lock()
            .expect("registry lock")
            .get(title)
            .is_some_and(|files| files.contains(path))
    }

    /// Remove and return the active set for a finished save.
    pub fn finish_save(&self, title: &str) -> HashSet<PathBuf> {
        self.inner
            .lock()
            .expect("registry lock")
            .remove(title)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_scoped_to_a_save_in_flight() {
        let registry = ActiveFileRegistry::new();
        let path = PathBuf::from("/up/graphviz/A_g.dot");

        // not saving: records are dropped
        registry.record("A", &path);
        assert!(!registry.is_active("A", &path));

        registry.begin_save("A");
        registry.record("A", &path);
        assert!(registry.is_saving("A"));
        assert!(registry.is_active("A", &path));

        let files = registry.finish_save("A");
        assert!(files.contains(&path));
        assert!(!registry.is_saving("A"));
        assert!(!registry.is_active("A", &path));
    }

    #[test]
    fn distinct_titles_do_not_interfere() {
        let registry = ActiveFileRegistry::new();
        registry.begin_save("A");
        registry.begin_save("B");
        registry.record("A", Path::new("/x/a.dot"));
        registry.record("B", Path::new("/x/b.dot"));

        assert!(registry.is_active("A", Path::new("/x/a.dot")));
        assert!(!registry.is_active("A", Path::new("/x/b.dot")));

        let a = registry.finish_save("A");
        assert_eq!(a.len(), 1);
        assert!(registry.is_saving("B"));
    }

    #[test]
    fn multiple_graphs_accumulate_for_one_title() {
        let registry = ActiveFileRegistry::new();
        registry.begin_save("A");
        for name in ["g1.dot", "g1.map", "g2.dot", "g2.map"] {
            registry.record("A", Path::new(name));
        }
        assert_eq!(registry.finish_save("A").len(), 4);
    }
}
