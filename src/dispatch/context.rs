use std::cell::Cell;
use std::fmt;

/// Logical execution context.
///
/// Each context is a serial queue: work submitted to it runs one item at a
/// time, in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Context {
    /// UI-affine context. Partner banner code runs here.
    Main,
    /// Context guarding all shared engine state.
    Background,
}

impl Context {
    pub fn as_str(self) -> &'static str {
        match self {
            Context::Main => "main",
            Context::Background => "background",
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

thread_local! {
    /// Which dispatcher/context the current thread serves, if any.
    static CURRENT: Cell<Option<(u64, Context)>> = const { Cell::new(None) };
}

/// Marks the current thread as the executor of `context` for dispatcher `id`.
pub(super) fn enter(id: u64, context: Context) {
    CURRENT.with(|c| c.set(Some((id, context))));
}

pub(super) fn current() -> Option<(u64, Context)> {
    CURRENT.with(Cell::get)
}
