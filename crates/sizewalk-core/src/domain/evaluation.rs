//! Per-commit results and the run that accumulates them.

use serde::{Deserialize, Serialize};

use super::commit::{BranchName, CommitId, CommitInfo};

/// Size measurement for one successfully evaluated commit.
///
/// Serializes as the commit metadata fields followed by `buildSize`, which is
/// the record layout of `output.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    #[serde(flatten)]
    pub commit: CommitInfo,

    /// Artifact size in bytes.
    #[serde(rename = "buildSize")]
    pub build_size: u64,
}

/// Ordered results of one run plus the branch it must end on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRun {
    /// Branch captured before the first checkout.
    pub branch: BranchName,

    /// Commit limit the run was started with (0 = every commit).
    pub limit: usize,

    /// Results in evaluation order, newest commit first.
    pub results: Vec<EvaluationResult>,
}

impl EvaluationRun {
    pub fn new(branch: BranchName, limit: usize) -> Self {
        Self {
            branch,
            limit,
            results: Vec::new(),
        }
    }

    pub fn push(&mut self, result: EvaluationResult) {
        self.results.push(result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Commit ids in evaluation order.
    pub fn commit_ids(&self) -> Vec<CommitId> {
        self.results.iter().map(|r| r.commit.hash.clone()).collect()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::from_results(&self.results)
    }
}

/// One point on the size history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizePoint {
    pub hash: CommitId,
    pub size: u64,
}

/// Aggregate view of a run for end-of-run output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub evaluated: usize,
    pub smallest: Option<SizePoint>,
    pub largest: Option<SizePoint>,

    /// Newest size minus oldest size; `None` with fewer than two results.
    pub delta_bytes: Option<i128>,
}

impl RunSummary {
    pub fn from_results(results: &[EvaluationResult]) -> Self {
        let point = |r: &EvaluationResult| SizePoint {
            hash: r.commit.hash.clone(),
            size: r.build_size,
        };

        // Ties keep the newest commit, which comes first.
        let smallest = results
            .iter()
            .fold(None::<&EvaluationResult>, |best, r| match best {
                Some(b) if b.build_size <= r.build_size => Some(b),
                _ => Some(r),
            })
            .map(point);
        let largest = results
            .iter()
            .fold(None::<&EvaluationResult>, |best, r| match best {
                Some(b) if b.build_size >= r.build_size => Some(b),
                _ => Some(r),
            })
            .map(point);

        let delta_bytes = match (results.first(), results.last()) {
            (Some(newest), Some(oldest)) if results.len() > 1 => {
                Some(newest.build_size as i128 - oldest.build_size as i128)
            }
            _ => None,
        };

        Self {
            evaluated: results.len(),
            smallest,
            largest,
            delta_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn result(hash: &str, size: u64) -> EvaluationResult {
        EvaluationResult {
            commit: CommitInfo {
                hash: CommitId::new(hash),
                author: "dev".to_string(),
                date: DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap(),
                message: format!("commit {hash}"),
            },
            build_size: size,
        }
    }

    #[test]
    fn result_fields_serialize_in_declared_order() {
        let json = serde_json::to_string(&result("abc", 42)).unwrap();
        let keys: Vec<usize> = ["\"hash\"", "\"author\"", "\"date\"", "\"message\"", "\"buildSize\""]
            .iter()
            .map(|k| json.find(k).expect("key present"))
            .collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]), "order was wrong: {json}");
    }

    #[test]
    fn result_parses_back_from_report_record() {
        let raw = r#"{"hash":"abc","author":"dev","date":"2024-01-01T00:00:00+00:00","message":"m","buildSize":7}"#;
        let parsed: EvaluationResult = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.build_size, 7);
        assert_eq!(parsed.commit.hash.as_str(), "abc");
    }

    #[test]
    fn summary_of_empty_run() {
        let summary = RunSummary::from_results(&[]);
        assert_eq!(summary.evaluated, 0);
        assert!(summary.smallest.is_none());
        assert!(summary.largest.is_none());
        assert!(summary.delta_bytes.is_none());
    }

    #[test]
    fn summary_tracks_extremes_and_delta() {
        let results = vec![result("c3", 900), result("c2", 1200), result("c1", 1000)];
        let summary = RunSummary::from_results(&results);

        assert_eq!(summary.evaluated, 3);
        assert_eq!(summary.smallest.unwrap().hash.as_str(), "c3");
        assert_eq!(summary.largest.unwrap().hash.as_str(), "c2");
        assert_eq!(summary.delta_bytes, Some(-100));
    }

    #[test]
    fn summary_single_result_has_no_delta() {
        let summary = RunSummary::from_results(&[result("c1", 10)]);
        assert_eq!(summary.delta_bytes, None);
        assert_eq!(summary.smallest, summary.largest);
    }

    #[test]
    fn run_reports_commit_ids_in_order() {
        let mut run = EvaluationRun::new(BranchName::new("main"), 0);
        run.push(result("b", 1));
        run.push(result("a", 2));
        assert_eq!(run.len(), 2);
        assert_eq!(
            run.commit_ids(),
            vec![CommitId::new("b"), CommitId::new("a")]
        );
    }
}
