use regex::Regex;
use std::sync::LazyLock;

use crate::error::{SyncError, SyncResult};
use crate::model::analysis::{Analysis, AnalysisRequest};
use crate::model::finding::Finding;

/// Prefix of the analysis comment that links a finding to its work item.
/// Existing data depends on this exact text.
pub const WORK_ITEM_LINK_PREFIX: &str = "Azure DevOps work item: ";

static WORK_ITEM_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"workItems/(\d+)").unwrap());

/// URL of the linked work item, taken from the most recent link comment if it is non-empty.
pub fn read_work_item_url(analysis: &Analysis) -> Option<String> {
    analysis
        .find_comment(WORK_ITEM_LINK_PREFIX)
        .map(|c| c.comment.replacen(WORK_ITEM_LINK_PREFIX, "", 1).trim().to_string())
        .filter(|url| !url.is_empty())
}

/// Extracts the numeric id from `…/_apis/wit/workItems/<id>`.
pub fn resolve_work_item_id(url: &str) -> SyncResult<u64> {
    WORK_ITEM_ID_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .filter(|id| *id > 0)
        .ok_or_else(|| SyncError::MalformedLink(url.to_string()))
}

pub fn link_comment(url: &str) -> String {
    format!("{WORK_ITEM_LINK_PREFIX}{url}")
}

/// Analysis request that records the link to a freshly created work item.
pub fn link_request(finding: &Finding, url: &str) -> AnalysisRequest {
    AnalysisRequest {
        comment: Some(link_comment(url)),
        ..AnalysisRequest::for_finding(finding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::analysis::AnalysisComment;

    fn analysis_with(comments: &[&str]) -> Analysis {
        Analysis {
            analysis_comments: comments
                .iter()
                .map(|c| AnalysisComment {
                    timestamp: None,
                    comment: c.to_string(),
                    commenter: None,
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn resolves_id_from_api_url() {
        assert_eq!(
            resolve_work_item_id("https://x/_apis/wit/workItems/16142").unwrap(),
            16142
        );
        assert_eq!(
            resolve_work_item_id("https://azure.devops.com/abce/_apis/wit/workItems/16142")
                .unwrap(),
            16142
        );
    }

    #[test]
    fn rejects_urls_without_positive_id() {
        for url in [
            "https://x/_apis/wit/workItems/",
            "https://x/_apis/wit/workItems/0",
            "https://x/_apis/wit/workItems/abc",
            "https://x/_apis/wit/items/12",
            "",
        ] {
            let err = resolve_work_item_id(url).unwrap_err();
            assert!(matches!(err, SyncError::MalformedLink(_)), "{url}");
        }
    }

    #[test]
    fn reads_url_from_link_comment() {
        let analysis = analysis_with(&[
            "IN_TRIAGE",
            "Azure DevOps work item: https://x/_apis/wit/workItems/7",
        ]);
        assert_eq!(
            read_work_item_url(&analysis).as_deref(),
            Some("https://x/_apis/wit/workItems/7")
        );
    }

    #[test]
    fn repaired_link_replaces_broken_one() {
        let analysis = analysis_with(&[
            "Azure DevOps work item: https://x/_apis/wit/workItems/99",
            "Azure DevOps work item: https://x/_apis/wit/workItems/501",
        ]);
        assert_eq!(
            read_work_item_url(&analysis).as_deref(),
            Some("https://x/_apis/wit/workItems/501")
        );
    }

    #[test]
    fn empty_link_comment_is_no_link() {
        assert_eq!(read_work_item_url(&analysis_with(&["Azure DevOps work item: "])), None);
        assert_eq!(read_work_item_url(&analysis_with(&[])), None);
    }

    #[test]
    fn link_request_targets_finding() {
        let mut finding = Finding::default();
        finding.component.project = "p".into();
        finding.component.uuid = "c".into();
        finding.vulnerability.uuid = "v".into();

        let request = link_request(&finding, "https://x/_apis/wit/workItems/9");
        assert_eq!(request.project, "p");
        assert_eq!(
            request.comment.as_deref(),
            Some("Azure DevOps work item: https://x/_apis/wit/workItems/9")
        );
        assert!(request.analysis_state.is_none());
    }
}
