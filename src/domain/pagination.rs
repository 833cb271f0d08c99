/// Cursor for the next page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pagination {
    /// First page, newest items.
    Initial { limit: usize },
    /// Messages older than `message_id`.
    Before { limit: usize, message_id: String },
    /// Channels after skipping `offset` rows.
    Offset { limit: usize, offset: usize },
}

impl Pagination {
    pub fn initial(limit: usize) -> Self {
        Self::Initial { limit }
    }

    pub fn limit(&self) -> usize {
        match self {
            Self::Initial { limit } | Self::Before { limit, .. } | Self::Offset { limit, .. } => {
                *limit
            }
        }
    }

    /// Same cursor with its limit replaced.
    pub fn with_limit(self, limit: usize) -> Self {
        match self {
            Self::Initial { .. } => Self::Initial { limit },
            Self::Before { message_id, .. } => Self::Before { limit, message_id },
            Self::Offset { offset, .. } => Self::Offset { limit, offset },
        }
    }

    pub fn is_initial(&self) -> bool {
        matches!(self, Self::Initial { .. })
    }

    /// A page with exactly `limit` items implies more may follow.
    pub fn is_page_full(&self, fetched: usize) -> bool {
        fetched >= self.limit() && self.limit() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_page_terminates_pagination() {
        let pagination = Pagination::initial(25);

        assert!(pagination.is_page_full(25));
        assert!(!pagination.is_page_full(24));
    }

    #[test]
    fn zero_limit_never_reports_full_page() {
        assert!(!Pagination::initial(0).is_page_full(0));
    }

    #[test]
    fn limit_is_shared_by_all_cursors() {
        let before = Pagination::Before {
            limit: 50,
            message_id: "m1".to_owned(),
        };
        let offset = Pagination::Offset {
            limit: 20,
            offset: 40,
        };

        assert_eq!(before.limit(), 50);
        assert_eq!(offset.limit(), 20);
        assert!(!before.is_initial());
    }

    #[test]
    fn with_limit_keeps_cursor_position() {
        let offset = Pagination::Offset {
            limit: 20,
            offset: 40,
        };

        assert_eq!(
            offset.with_limit(5),
            Pagination::Offset {
                limit: 5,
                offset: 40
            }
        );
    }
}
