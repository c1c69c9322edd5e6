//! Safety gate applied to a candidate rewrite before it touches disk.

use serde::{Deserialize, Serialize};

use crate::core::extract::Extraction;

/// Tunable thresholds for the destructive-edit heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyPolicy {
    /// Originals with at most this many lines are never considered shrunk.
    pub min_lines: usize,
    /// Reject when `candidate_lines < original_lines * shrink_ratio`.
    pub shrink_ratio: f64,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            min_lines: 5,
            shrink_ratio: 0.5,
        }
    }
}

/// Line counts carried forward into the audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineDelta {
    pub original_lines: usize,
    pub candidate_lines: usize,
}

/// Why a candidate was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Nothing usable could be extracted from the reply.
    ExtractionFailed,
    /// Explicit no-change sentinel, or content identical to the original.
    NoChange,
    /// Candidate dropped too large a share of the original's lines.
    TooDestructive(LineDelta),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept(LineDelta),
    Reject(RejectReason),
}

/// Number of newline characters; an unterminated last line does not count.
pub fn line_count(content: &str) -> usize {
    content.bytes().filter(|&b| b == b'\n').count()
}

impl SafetyPolicy {
    /// Apply the gate rules in order: extraction, no-op, destructive shrink.
    pub fn validate(&self, original: &str, extraction: &Extraction) -> Verdict {
        let candidate = match extraction {
            Extraction::Empty => return Verdict::Reject(RejectReason::ExtractionFailed),
            Extraction::NoChange => return Verdict::Reject(RejectReason::NoChange),
            Extraction::Candidate(body) => body,
        };
        if candidate.trim() == original.trim() {
            return Verdict::Reject(RejectReason::NoChange);
        }

        let delta = LineDelta {
            original_lines: line_count(original),
            candidate_lines: line_count(candidate),
        };
        if delta.original_lines > self.min_lines
            && (delta.candidate_lines as f64) < delta.original_lines as f64 * self.shrink_ratio
        {
            return Verdict::Reject(RejectReason::TooDestructive(delta));
        }
        Verdict::Accept(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(n: usize, tag: &str) -> String {
        (1..=n).map(|i| format!("{tag} {i}\n")).collect()
    }

    fn candidate(body: String) -> Extraction {
        Extraction::Candidate(body)
    }

    #[test]
    fn identical_content_is_no_change_at_any_size() {
        let policy = SafetyPolicy::default();
        for n in [1, 5, 20, 500] {
            let original = lines(n, "row");
            assert_eq!(
                policy.validate(&original, &candidate(original.clone())),
                Verdict::Reject(RejectReason::NoChange)
            );
        }
    }

    #[test]
    fn surrounding_whitespace_is_ignored_for_no_change() {
        let policy = SafetyPolicy::default();
        let verdict = policy.validate("a\nb\n", &candidate("\n\na\nb".to_string()));
        assert_eq!(verdict, Verdict::Reject(RejectReason::NoChange));
    }

    #[test]
    fn shrink_boundary_is_strictly_below_half() {
        let policy = SafetyPolicy::default();
        let original = lines(20, "old");

        let nine = policy.validate(&original, &candidate(lines(9, "new")));
        assert_eq!(
            nine,
            Verdict::Reject(RejectReason::TooDestructive(LineDelta {
                original_lines: 20,
                candidate_lines: 9,
            }))
        );

        let ten = policy.validate(&original, &candidate(lines(10, "new")));
        assert_eq!(
            ten,
            Verdict::Accept(LineDelta {
                original_lines: 20,
                candidate_lines: 10,
            })
        );
    }

    #[test]
    fn unterminated_last_line_is_not_counted() {
        assert_eq!(line_count(""), 0);
        assert_eq!(line_count("a"), 0);
        assert_eq!(line_count("a\nb"), 1);
        assert_eq!(line_count("a\nb\n"), 2);

        let policy = SafetyPolicy::default();
        let candidate_body = lines(10, "new").trim_end().to_string();
        assert_eq!(
            policy.validate(&lines(20, "old"), &candidate(candidate_body)),
            Verdict::Reject(RejectReason::TooDestructive(LineDelta {
                original_lines: 20,
                candidate_lines: 9,
            }))
        );
    }

    #[test]
    fn small_originals_may_shrink_freely() {
        let policy = SafetyPolicy::default();
        let verdict = policy.validate(&lines(5, "old"), &candidate(lines(1, "new")));
        assert!(matches!(verdict, Verdict::Accept(_)));
    }

    #[test]
    fn sentinel_and_empty_map_to_reasons() {
        let policy = SafetyPolicy::default();
        assert_eq!(
            policy.validate("x", &Extraction::Empty),
            Verdict::Reject(RejectReason::ExtractionFailed)
        );
        assert_eq!(
            policy.validate("x", &Extraction::NoChange),
            Verdict::Reject(RejectReason::NoChange)
        );
    }

    #[test]
    fn thresholds_are_configurable() {
        let strict = SafetyPolicy {
            min_lines: 0,
            shrink_ratio: 0.9,
        };
        let verdict = strict.validate(&lines(10, "old"), &candidate(lines(8, "new")));
        assert!(matches!(
            verdict,
            Verdict::Reject(RejectReason::TooDestructive(_))
        ));
    }
}
