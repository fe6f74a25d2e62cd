//! `TaskEntry`: an immutable record of one scheduled action.

use crate::dispatch::Action;

/// One scheduled, one-shot action.
///
/// Fields are immutable once constructed. Entries are held in a
/// `VecDeque` per bucket (see `timer::bucket::Bucket`) rather than chained
/// through an intrusive successor link, giving the same O(1) append / O(1)
/// whole-chain drain without an explicit link field or unsafe code — see
/// `DESIGN.md` for the rationale.
pub struct TaskEntry {
    /// Absolute expiration instant, in milliseconds on the shared clock.
    pub expiration_ms: i64,
    /// The action to run once this entry fires. `Option` only so
    /// `Bucket::drain`/dispatch can move it out of a `&mut TaskEntry`
    /// without unsafe code; it is always `Some` until dispatched exactly
    /// once.
    action: Option<Action>,
}

impl TaskEntry {
    /// Construct a new entry for `expiration_ms` that will run `action`.
    pub fn new(expiration_ms: i64, action: Action) -> Self {
        Self {
            expiration_ms,
            action: Some(action),
        }
    }

    /// Take the action out of this entry, consuming it. Panics if called
    /// twice — the no-dup invariant means no code path should ever need
    /// to.
    pub fn take_action(&mut self) -> Action {
        self.action
            .take()
            .expect("TaskEntry::take_action called more than once")
    }
}

impl std::fmt::Debug for TaskEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEntry")
            .field("expiration_ms", &self.expiration_ms)
            .field("action", &"<closure>")
            .finish()
    }
}
