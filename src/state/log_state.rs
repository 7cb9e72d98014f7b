//! LogState - User-Visible Notifications with Ring Buffer

use chrono::{DateTime, Local};
use std::collections::VecDeque;

/// Notification level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Warn,
    Error,
}

impl NoticeLevel {
    pub fn label(&self) -> &'static str {
        match self {
            NoticeLevel::Success => "OK",
            NoticeLevel::Info => "INFO",
            NoticeLevel::Warn => "WARN",
            NoticeLevel::Error => "ERROR",
        }
    }
}

/// A single notification
#[derive(Debug, Clone)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub timestamp: DateTime<Local>,
}

impl Notice {
    /// Create a notice stamped with the current local time
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Local::now(),
        }
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {:<5} {}",
            self.timestamp.format("%H:%M:%S"),
            self.level.label(),
            self.message
        )
    }
}

/// Notifications kept for display, oldest evicted first
#[derive(Debug)]
pub struct NotificationLog {
    entries: VecDeque<Notice>,
    capacity: usize,
    /// Index of the first entry not yet handed out by `take_unseen`
    unseen_from: usize,
}

impl NotificationLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            unseen_from: 0,
        }
    }

    /// Record a notice and mirror it to the tracing log
    pub fn push(&mut self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => tracing::error!("{}", notice.message),
            NoticeLevel::Warn => tracing::warn!("{}", notice.message),
            NoticeLevel::Success | NoticeLevel::Info => tracing::info!("{}", notice.message),
        }

        if self.capacity == 0 {
            return;
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
            self.unseen_from = self.unseen_from.saturating_sub(1);
        }
        self.entries.push_back(notice);
    }

    pub fn entries(&self) -> &VecDeque<Notice> {
        &self.entries
    }

    pub fn last(&self) -> Option<&Notice> {
        self.entries.back()
    }

    /// Notices recorded since the previous call
    pub fn take_unseen(&mut self) -> Vec<Notice> {
        let fresh = self.entries.iter().skip(self.unseen_from).cloned().collect();
        self.unseen_from = self.entries.len();
        fresh
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any recorded notice has the given level and contains `needle`
    pub fn contains(&self, level: NoticeLevel, needle: &str) -> bool {
        self.entries
            .iter()
            .any(|n| n.level == level && n.message.contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice(message: &str) -> Notice {
        Notice::new(NoticeLevel::Info, message)
    }

    #[test]
    fn test_eviction_keeps_newest() {
        let mut log = NotificationLog::new(2);
        log.push(notice("a"));
        log.push(notice("b"));
        log.push(notice("c"));
        let messages: Vec<_> = log.entries().iter().map(|n| n.message.as_str()).collect();
        assert_eq!(messages, vec!["b", "c"]);
    }

    #[test]
    fn test_take_unseen() {
        let mut log = NotificationLog::new(10);
        log.push(notice("a"));
        assert_eq!(log.take_unseen().len(), 1);
        assert!(log.take_unseen().is_empty());
        log.push(notice("b"));
        let fresh = log.take_unseen();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].message, "b");
    }
}
