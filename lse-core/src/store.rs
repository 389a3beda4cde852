//! The authoritative variable store.
//!
//! Names are compared case-insensitively: the first casing seen for a
//! name is kept for display, but a lowercased copy is the identity key.
//! `snapshot`/`restore` back a trial-and-error solver with an arena-style
//! overlay log keyed by dense index rather than a full clone of the store,
//! so both are `O(k)` in the number of variables actually touched.

use std::collections::{HashMap, HashSet};

/// The source that last wrote a variable's value.
///
/// Ordered by priority: `Explicit` wins over `Solved` wins over `Guess`
/// wins over `Default` whenever multiple sources coexist.
#[cfg_attr(feature = "serde-derive", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Explicit,
    Solved,
    Guess,
    Default,
}

#[derive(Debug, Clone)]
struct VariableRecord {
    display_name: String,
    value: Option<f64>,
    provenance: Provenance,
    unit: Option<String>,
    guess: Option<f64>,
}

impl VariableRecord {
    fn shell(display_name: String) -> Self {
        Self {
            display_name,
            value: None,
            provenance: Provenance::Default,
            unit: None,
            guess: None,
        }
    }
}

/// An opaque token returned by [`VariableStore::snapshot`].
///
/// Must be passed back to [`VariableStore::restore`] or
/// [`VariableStore::commit`] exactly once; mismatched tokens are a logic
/// error. The store only ever supports one active trial at a time; there
/// is no support for concurrent solves sharing a single store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot(u64);

struct Recording {
    generation: u64,
    log: Vec<(usize, VariableRecord)>,
    touched: HashSet<usize>,
}

/// The authoritative name-to-value mapping, shared by the orchestrator, the
/// algebraic solver, and the ODE integrator; no other component mutates
/// it.
#[derive(Default)]
pub struct VariableStore {
    order: Vec<String>,
    index: HashMap<String, usize>,
    records: Vec<VariableRecord>,
    generation: u64,
    recording: Option<Recording>,
}

impl VariableStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str) -> String {
        name.to_ascii_lowercase()
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.index.get(&Self::key(name)).copied()
    }

    fn get_or_create(&mut self, name: &str) -> usize {
        if let Some(idx) = self.find(name) {
            return idx;
        }
        let idx = self.records.len();
        self.records.push(VariableRecord::shell(name.to_string()));
        self.order.push(name.to_string());
        self.index.insert(Self::key(name), idx);
        idx
    }

    /// Records `idx`'s pre-mutation state in the active recording, the
    /// first time it is touched during that recording.
    fn touch(&mut self, idx: usize) {
        if let Some(rec) = &mut self.recording {
            if rec.touched.insert(idx) {
                rec.log.push((idx, self.records[idx].clone()));
            }
        }
    }

    /// Writes `value`, marks the name `Explicit`, and clears any `Solved`
    /// marking.
    pub fn set_explicit(&mut self, name: &str, value: f64) {
        let idx = self.get_or_create(name);
        self.touch(idx);
        let rec = &mut self.records[idx];
        rec.value = Some(value);
        rec.provenance = Provenance::Explicit;
    }

    /// Writes `value`, marks the name `Solved`, clears `Explicit`, and
    /// preserves any previously recorded unit.
    pub fn set_solved(&mut self, name: &str, value: f64) {
        let idx = self.get_or_create(name);
        self.touch(idx);
        let rec = &mut self.records[idx];
        rec.value = Some(value);
        rec.provenance = Provenance::Solved;
    }

    /// Returns the stored value, auto-vivifying with a guess or the
    /// default `1.0` if the name has never had a value. The returned
    /// `bool` is true whenever the returned value came from a guess or
    /// the default, i.e. whenever it should not be treated as "defined".
    pub fn get(&mut self, name: &str) -> (f64, bool) {
        let idx = self.get_or_create(name);
        self.touch(idx);
        let rec = &mut self.records[idx];
        if let Some(value) = rec.value {
            let fell_back = matches!(rec.provenance, Provenance::Guess | Provenance::Default);
            return (value, fell_back);
        }
        let (value, provenance) = match rec.guess {
            Some(g) => (g, Provenance::Guess),
            None => (1.0, Provenance::Default),
        };
        rec.value = Some(value);
        rec.provenance = provenance;
        (value, true)
    }

    /// True if `name` currently holds a concrete value (explicit, solved,
    /// guess, or defaulted) -- i.e. it has been read or written at least
    /// once.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.find(name)
            .is_some_and(|idx| self.records[idx].value.is_some())
    }

    #[must_use]
    pub fn is_explicit(&self, name: &str) -> bool {
        self.find(name)
            .is_some_and(|idx| self.records[idx].provenance == Provenance::Explicit)
            && self.has(name)
    }

    #[must_use]
    pub fn is_solved(&self, name: &str) -> bool {
        self.find(name)
            .is_some_and(|idx| self.records[idx].provenance == Provenance::Solved)
            && self.has(name)
    }

    #[must_use]
    pub fn has_guess(&self, name: &str) -> bool {
        self.find(name).is_some_and(|idx| self.records[idx].guess.is_some())
    }

    pub fn set_guess(&mut self, name: &str, value: f64) {
        let idx = self.get_or_create(name);
        self.touch(idx);
        self.records[idx].guess = Some(value);
    }

    #[must_use]
    pub fn get_guess(&self, name: &str, default: f64) -> f64 {
        self.find(name)
            .and_then(|idx| self.records[idx].guess)
            .unwrap_or(default)
    }

    /// Sets (or clears, if `unit` is `None`) the opaque unit annotation for
    /// `name`. The unit is never interpreted by this crate.
    pub fn set_unit(&mut self, name: &str, unit: Option<String>) {
        let idx = self.get_or_create(name);
        self.touch(idx);
        self.records[idx].unit = unit;
    }

    #[must_use]
    pub fn get_unit(&self, name: &str) -> Option<String> {
        self.find(name).and_then(|idx| self.records[idx].unit.clone())
    }

    #[must_use]
    pub fn provenance(&self, name: &str) -> Option<Provenance> {
        self.find(name)
            .filter(|&idx| self.records[idx].value.is_some())
            .map(|idx| self.records[idx].provenance)
    }

    /// The display name (first casing seen) for `name`, if it has a record.
    #[must_use]
    pub fn display_name(&self, name: &str) -> Option<&str> {
        self.find(name).map(|idx| self.records[idx].display_name.as_str())
    }

    /// Names in stable, deterministic (insertion) order.
    pub fn iter_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Starts recording mutations so they can be undone by [`Self::restore`].
    ///
    /// # Panics
    ///
    /// Panics if a recording is already active; the store supports exactly
    /// one trial at a time.
    pub fn snapshot(&mut self) -> Snapshot {
        assert!(
            self.recording.is_none(),
            "VariableStore::snapshot called while a previous snapshot is still active"
        );
        self.generation += 1;
        self.recording = Some(Recording {
            generation: self.generation,
            log: Vec::new(),
            touched: HashSet::new(),
        });
        Snapshot(self.generation)
    }

    /// Undoes every mutation recorded since `token` was created and drops
    /// the recording.
    ///
    /// # Panics
    ///
    /// Panics if `token` does not match the active recording.
    pub fn restore(&mut self, token: Snapshot) {
        let recording = self
            .recording
            .take()
            .expect("VariableStore::restore called with no active snapshot");
        assert_eq!(
            recording.generation, token.0,
            "VariableStore::restore called with a stale snapshot token"
        );
        for (idx, original) in recording.log.into_iter().rev() {
            self.records[idx] = original;
        }
    }

    /// Accepts every mutation recorded since `token` was created, dropping
    /// the recording without undoing anything.
    ///
    /// # Panics
    ///
    /// Panics if `token` does not match the active recording.
    pub fn commit(&mut self, token: Snapshot) {
        let recording = self
            .recording
            .take()
            .expect("VariableStore::commit called with no active snapshot");
        assert_eq!(
            recording.generation, token.0,
            "VariableStore::commit called with a stale snapshot token"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_identity_keeps_first_casing() {
        let mut store = VariableStore::new();
        store.set_explicit("Theta_Max", 15.0);
        store.set_explicit("THETA_max", 16.0);

        assert_eq!(store.get("theta_max").0, 16.0);
        assert_eq!(store.display_name("theta_max"), Some("Theta_Max"));
    }

    #[test]
    fn read_before_write_auto_vivifies_with_default() {
        let mut store = VariableStore::new();
        let (value, fell_back) = store.get("x");
        assert_eq!(value, 1.0);
        assert!(fell_back);
        assert_eq!(store.provenance("x"), Some(Provenance::Default));
    }

    #[test]
    fn read_before_write_prefers_guess_over_default() {
        let mut store = VariableStore::new();
        store.set_guess("x", 42.0);
        let (value, fell_back) = store.get("x");
        assert_eq!(value, 42.0);
        assert!(fell_back);
        assert_eq!(store.provenance("x"), Some(Provenance::Guess));
    }

    #[test]
    fn explicit_and_solved_are_mutually_exclusive() {
        let mut store = VariableStore::new();
        store.set_explicit("x", 1.0);
        assert!(store.is_explicit("x"));
        store.set_solved("x", 2.0);
        assert!(store.is_solved("x"));
        assert!(!store.is_explicit("x"));
    }

    #[test]
    fn solved_preserves_unit() {
        let mut store = VariableStore::new();
        store.set_unit("L", Some("[m]".to_string()));
        store.set_explicit("L", 1.0);
        store.set_solved("L", 1.5);
        assert_eq!(store.get_unit("L"), Some("[m]".to_string()));
    }

    #[test]
    fn restore_undoes_exactly_the_touched_variables() {
        let mut store = VariableStore::new();
        store.set_explicit("a", 1.0);
        store.set_explicit("b", 2.0);

        let token = store.snapshot();
        store.set_solved("a", 100.0);
        store.set_solved("b", 200.0);
        store.restore(token);

        assert_eq!(store.get("a").0, 1.0);
        assert_eq!(store.get("b").0, 2.0);
        assert!(store.is_explicit("a"));
    }

    #[test]
    fn commit_keeps_mutations() {
        let mut store = VariableStore::new();
        store.set_explicit("a", 1.0);
        let token = store.snapshot();
        store.set_solved("a", 5.0);
        store.commit(token);
        assert_eq!(store.get("a").0, 5.0);
    }

    #[test]
    fn iter_names_is_insertion_ordered() {
        let mut store = VariableStore::new();
        store.set_explicit("z", 1.0);
        store.set_explicit("a", 2.0);
        store.set_explicit("m", 3.0);
        let names: Vec<_> = store.iter_names().collect();
        assert_eq!(names, vec!["z", "a", "m"]);
    }
}
