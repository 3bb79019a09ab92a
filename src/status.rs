//! Album status rollup.
//!
//! An album never carries an independently chosen status: it is folded from
//! the multiset of its songs' statuses every time a song changes.

use crate::library::ArchiveStatus;

/// Song counts that decide an album's status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub total: usize,
    pub archived: usize,
    pub failed: usize,
}

impl StatusCounts {
    /// Tallies a list of song statuses.
    #[must_use]
    pub fn tally<'a>(statuses: impl IntoIterator<Item = &'a ArchiveStatus>) -> Self {
        statuses
            .into_iter()
            .fold(Self::default(), |mut counts, status| {
                counts.total += 1;
                if *status == ArchiveStatus::Archived {
                    counts.archived += 1;
                } else if status.is_failure() {
                    counts.failed += 1;
                }
                counts
            })
    }

    /// Songs that reached a terminal outcome.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.archived + self.failed
    }
}

/// Derives the album status from its songs' statuses.
///
/// Returns `None` for an empty album; callers must leave the stored status
/// untouched in that case.
#[must_use]
pub fn album_status(statuses: &[ArchiveStatus]) -> Option<ArchiveStatus> {
    let counts = StatusCounts::tally(statuses);
    if counts.total == 0 {
        return None;
    }

    let status = if counts.archived == 0 {
        ArchiveStatus::NotArchived
    } else if counts.archived == counts.total {
        ArchiveStatus::Archived
    } else if counts.completed() == counts.total {
        ArchiveStatus::ArchivingFailure
    } else {
        ArchiveStatus::PartiallyArchived
    };
    Some(status)
}
