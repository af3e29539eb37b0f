// Process-wide settings read by the parser

use log::trace;
use parking_lot::{const_rwlock, RwLock};

static CONTEXT_KEYWORDS: RwLock<bool> = const_rwlock(true);

/// Whether `it`, `parent` and `root` are reserved context keywords
pub fn context_keywords_enabled() -> bool {
    *CONTEXT_KEYWORDS.read()
}

/// Enable or disable the context keywords; returns the previous setting.
///
/// Parses already running keep the value they started with.
pub fn set_context_keywords_enabled(enabled: bool) -> bool {
    let mut guard = CONTEXT_KEYWORDS.write();
    let previous = std::mem::replace(&mut *guard, enabled);
    trace!("context keywords: {} -> {}", previous, enabled);
    previous
}

/// Sets the context-keyword toggle and restores the previous value on drop
#[must_use = "the previous setting is restored when the guard is dropped"]
pub struct ContextKeywordsGuard {
    previous: bool,
}

impl ContextKeywordsGuard {
    pub fn set(enabled: bool) -> Self {
        Self {
            previous: set_context_keywords_enabled(enabled),
        }
    }
}

impl Drop for ContextKeywordsGuard {
    fn drop(&mut self) {
        set_context_keywords_enabled(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The toggle is process-wide; this is the only unit test that changes it.
    #[test]
    fn test_guard_restores_previous_value() {
        let initial = context_keywords_enabled();
        {
            let _guard = ContextKeywordsGuard::set(!initial);
            assert_eq!(context_keywords_enabled(), !initial);
            {
                let _inner = ContextKeywordsGuard::set(initial);
                assert_eq!(context_keywords_enabled(), initial);
            }
            assert_eq!(context_keywords_enabled(), !initial);
        }
        assert_eq!(context_keywords_enabled(), initial);
    }
}
