//! Error summarizer. Pure text extraction: build/test/lint output to a
//! bounded digest. Regex-based classification over `LazyLock`-compiled
//! statics, generalized to a TypeScript-style `{path}({line},{col}):
//! error T{code}: {msg}` extractor plus the digest joiner.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{VerificationError, VerificationResult};

const DIGEST_HARD_CAP: usize = 2000;
const TRUNCATION_NOTICE: &str = "\n...(truncated, showing first 2000 chars)";
const MAX_PREVIEW_LINES: usize = 5;

static BUILD_ERROR_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.+\(\d+,\d+\): error T\d+: .+$").unwrap());
static GENERIC_ERROR_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\berror\b").unwrap());
static TEST_FAILURE_BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[●✕✗]\s*.+$").unwrap());
static TEST_SUMMARY_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)Tests:.*failed.*").unwrap());
static TEST_FAILING_COUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\d+\s+failing").unwrap());
static LINT_ISSUE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<file>\S+):(?P<line>\d+):(?P<col>\d+)\s+error\s+(?P<rule>\S+)\s+(?P<desc>.+)$").unwrap());

/// Extract build errors from raw tool output, matching
/// `{path}({line},{col}): error T{code}: {msg}` first and falling back to
/// any line containing the word "error".
pub fn extract_build_errors(output: &str) -> String {
    let matches: Vec<&str> = output.lines().filter(|line| BUILD_ERROR_LINE.is_match(line)).collect();
    let matches = if matches.is_empty() {
        output.lines().filter(|line| GENERIC_ERROR_LINE.is_match(line)).collect::<Vec<_>>()
    } else {
        matches
    };

    if matches.is_empty() {
        return "Build failed (no specific error lines could be extracted from the output)".to_string();
    }

    render_truncated(&format!("{} build error(s):", matches.len()), &matches, "more errors")
}

/// Extract test failures: bullet lines marked `●`/`✕`/`✗`, plus the first
/// `Tests: ... failed ...` summary line and any `N failing` count.
pub fn extract_test_failures(output: &str) -> String {
    let mut bullets: Vec<&str> = output.lines().filter(|line| TEST_FAILURE_BULLET.is_match(line)).collect();

    if let Some(summary) = output.lines().find(|line| TEST_SUMMARY_LINE.is_match(line)) {
        bullets.insert(0, summary);
    }
    if let Some(count) = output.lines().find(|line| TEST_FAILING_COUNT.is_match(line)) {
        if !bullets.contains(&count) {
            bullets.push(count);
        }
    }

    if bullets.is_empty() {
        return "Build failed (no specific error lines could be extracted from the output)".to_string();
    }

    render_truncated("test failure(s):", &bullets, "more test failures")
}

/// Extract lint issues of shape `L:C error rule description`, counting
/// distinct source files.
pub fn extract_lint_issues(output: &str) -> String {
    let matches: Vec<&str> = output.lines().filter(|line| LINT_ISSUE_LINE.is_match(line)).collect();
    if matches.is_empty() {
        return "Build failed (no specific error lines could be extracted from the output)".to_string();
    }

    let mut files: Vec<&str> = matches
        .iter()
        .filter_map(|line| LINT_ISSUE_LINE.captures(line))
        .map(|caps| caps.name("file").unwrap().as_str())
        .collect();
    files.sort_unstable();
    files.dedup();

    let header = format!("{} lint issue(s) across {} file(s):", matches.len(), files.len());
    render_truncated_suffix(&header, &matches, "…and", "more")
}

fn render_truncated(header: &str, lines: &[&str], more_label: &str) -> String {
    let shown = lines.iter().take(MAX_PREVIEW_LINES).cloned().collect::<Vec<_>>().join("\n");
    let remaining = lines.len().saturating_sub(MAX_PREVIEW_LINES);
    if remaining > 0 {
        format!("{header}\n{shown}\n(+ {remaining} {more_label})")
    } else {
        format!("{header}\n{shown}")
    }
}

fn render_truncated_suffix(header: &str, lines: &[&str], prefix: &str, suffix: &str) -> String {
    let shown = lines.iter().take(MAX_PREVIEW_LINES).cloned().collect::<Vec<_>>().join("\n");
    let remaining = lines.len().saturating_sub(MAX_PREVIEW_LINES);
    if remaining > 0 {
        format!("{header}\n{shown}\n{prefix} {remaining} {suffix}")
    } else {
        format!("{header}\n{shown}")
    }
}

/// Build the bounded digest handed to the next retry attempt. One line
/// per `VerificationError` of a failing result, `[TYPE] summary`
/// uppercased, joined with blank lines, hard-capped at 2000 chars.
pub fn build_digest(results: &[VerificationResult]) -> String {
    let lines: Vec<String> = results
        .iter()
        .filter(|r| !r.passed)
        .flat_map(|r| r.errors.iter().map(format_error_line))
        .collect();

    if lines.is_empty() {
        return "(no specific errors extracted from verification results)".to_string();
    }

    let joined = lines.join("\n\n");
    if joined.len() > DIGEST_HARD_CAP {
        let cut = joined
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|&i| i <= DIGEST_HARD_CAP)
            .last()
            .unwrap_or(0);
        format!("{}{}", &joined[..cut], TRUNCATION_NOTICE)
    } else {
        joined
    }
}

fn format_error_line(error: &VerificationError) -> String {
    format!("[{}] {}", error.kind.as_label(), error.summary.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VerificationErrorKind;

    #[test]
    fn build_errors_match_typescript_style_lines() {
        let output = "src/foo.ts(10,5): error T2304: Cannot find name 'x'.\nother noise";
        let digest = extract_build_errors(output);
        assert!(digest.starts_with("1 build error(s):"));
        assert!(digest.contains("T2304"));
    }

    #[test]
    fn build_errors_falls_back_to_generic_error_word() {
        let output = "something went wrong: error while linking";
        let digest = extract_build_errors(output);
        assert!(digest.contains("error while linking"));
    }

    #[test]
    fn build_errors_empty_input_returns_fixed_string() {
        assert_eq!(
            extract_build_errors("all good, nothing to see"),
            "Build failed (no specific error lines could be extracted from the output)"
        );
    }

    #[test]
    fn digest_is_empty_string_for_empty_or_passing_results() {
        assert_eq!(build_digest(&[]), "(no specific errors extracted from verification results)");
        assert_eq!(
            build_digest(&[VerificationResult::passing(10)]),
            "(no specific errors extracted from verification results)"
        );
    }

    #[test]
    fn digest_uppercases_and_labels_each_error() {
        let results = vec![VerificationResult::failing(
            vec![VerificationError {
                kind: VerificationErrorKind::Build,
                summary: "typescript compile failed: 2 errors".to_string(),
            }],
            5,
        )];
        let digest = build_digest(&results);
        assert_eq!(digest, "[BUILD] TYPESCRIPT COMPILE FAILED: 2 ERRORS");
    }

    #[test]
    fn digest_respects_hard_cap() {
        let huge_summary = "x".repeat(3000);
        let results = vec![VerificationResult::failing(
            vec![VerificationError {
                kind: VerificationErrorKind::Test,
                summary: huge_summary,
            }],
            1,
        )];
        let digest = build_digest(&results);
        assert!(digest.len() <= DIGEST_HARD_CAP + TRUNCATION_NOTICE.len());
        assert!(digest.ends_with(TRUNCATION_NOTICE));
    }
}
