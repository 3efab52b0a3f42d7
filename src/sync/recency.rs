use chrono::{DateTime, Utc};

use crate::model::analysis::AnalysisComment;

/// Which record is authoritative for a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    WorkItem,
    Analysis,
}

/// Picks the side that changed last.
///
/// With no analysis comments at all the work item wins. Otherwise the work item
/// wins only if it changed strictly after the latest comment; ties go to the
/// analysis. Comments without a readable timestamp count as the Unix epoch.
pub fn resolve(
    work_item_changed_at: DateTime<Utc>,
    analysis_comments: &[AnalysisComment],
) -> (Side, DateTime<Utc>) {
    if analysis_comments.is_empty() {
        return (Side::WorkItem, work_item_changed_at);
    }

    let last_comment_at = latest_comment_at(analysis_comments);
    if work_item_changed_at > last_comment_at {
        (Side::WorkItem, work_item_changed_at)
    } else {
        (Side::Analysis, last_comment_at)
    }
}

pub fn latest_comment_at(comments: &[AnalysisComment]) -> DateTime<Utc> {
    comments
        .iter()
        .filter_map(AnalysisComment::created_at)
        .max()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
