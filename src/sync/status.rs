use std::fmt;

/// What the sync badge should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncIndicator {
    /// Nothing queued.
    Hidden,
    /// Operations waiting for the next drain.
    Pending(usize),
    /// A drain is in progress.
    Syncing,
}

impl SyncIndicator {
    pub fn from_pending(count: usize) -> Self {
        if count == 0 {
            SyncIndicator::Hidden
        } else {
            SyncIndicator::Pending(count)
        }
    }

    pub fn is_visible(&self) -> bool {
        !matches!(self, SyncIndicator::Hidden)
    }
}

impl fmt::Display for SyncIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncIndicator::Hidden => write!(f, "All changes synced"),
            SyncIndicator::Pending(1) => write!(f, "1 change pending"),
            SyncIndicator::Pending(n) => write!(f, "{} changes pending", n),
            SyncIndicator::Syncing => write!(f, "Syncing..."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pending() {
        assert_eq!(SyncIndicator::from_pending(0), SyncIndicator::Hidden);
        assert_eq!(SyncIndicator::from_pending(3), SyncIndicator::Pending(3));
        assert!(!SyncIndicator::Hidden.is_visible());
        assert!(SyncIndicator::Syncing.is_visible());
    }

    #[test]
    fn test_display() {
        assert_eq!(SyncIndicator::Pending(1).to_string(), "1 change pending");
        assert_eq!(SyncIndicator::Pending(4).to_string(), "4 changes pending");
        assert_eq!(SyncIndicator::Syncing.to_string(), "Syncing...");
    }
}
