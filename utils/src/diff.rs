//! Line diffing: LCS-based edit sequence, unified hunks, and change stats.
//!
//! The edit sequence is built from a classic O(n·m) longest-common-subsequence
//! table over line equality. Common prefix and suffix lines are peeled off
//! before the table is built, so typical edits to large files only pay for the
//! changed middle region. When the middle region is still too large for a
//! table, it is emitted as a block replacement instead.

use std::fmt;

/// Sentinel returned by [`format_unified_diff`] when nothing changed.
pub const NO_CHANGES: &str = "No changes";

/// Context lines used for previews.
pub const DEFAULT_CONTEXT_LINES: usize = 3;

/// Largest LCS table `compute_diff` builds (16 MiB of `u32` cells).
pub const MAX_TABLE_CELLS: usize = 4 * 1024 * 1024;

/// Largest sub-problem `compute_stats` solves exactly with its two-row pass.
pub const MAX_STATS_CELLS: usize = 64 * 1024 * 1024;

/// One line of an edit sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffLine<'a> {
    Context(&'a str),
    Added(&'a str),
    Removed(&'a str),
}

impl<'a> DiffLine<'a> {
    #[must_use]
    pub fn text(&self) -> &'a str {
        match *self {
            DiffLine::Context(t) | DiffLine::Added(t) | DiffLine::Removed(t) => t,
        }
    }

    #[must_use]
    pub fn is_change(&self) -> bool {
        !matches!(self, DiffLine::Context(_))
    }

    fn prefix(&self) -> char {
        match self {
            DiffLine::Context(_) => ' ',
            DiffLine::Added(_) => '+',
            DiffLine::Removed(_) => '-',
        }
    }

    fn in_old(&self) -> bool {
        !matches!(self, DiffLine::Added(_))
    }

    fn in_new(&self) -> bool {
        !matches!(self, DiffLine::Removed(_))
    }
}

/// Change counts where a paired removal + addition counts as one modification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub additions: usize,
    pub deletions: usize,
    pub modifications: usize,
}

impl DiffStats {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.additions == 0 && self.deletions == 0 && self.modifications == 0
    }
}

impl fmt::Display for DiffStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "+{} -{} ~{}",
            self.additions, self.deletions, self.modifications
        )
    }
}

/// Split text into lines. A trailing newline does not produce an empty last line.
#[must_use]
pub fn split_lines(text: &str) -> Vec<&str> {
    text.lines().collect()
}

/// Suffix LCS lengths: `table.get(i, j)` is the LCS length of `a[i..]` and `b[j..]`.
struct LcsTable {
    cols: usize,
    cells: Vec<u32>,
}

impl LcsTable {
    fn build(a: &[&str], b: &[&str]) -> Self {
        let cols = b.len() + 1;
        let mut cells = vec![0u32; (a.len() + 1) * cols];
        for i in (0..a.len()).rev() {
            for j in (0..b.len()).rev() {
                cells[i * cols + j] = if a[i] == b[j] {
                    cells[(i + 1) * cols + j + 1] + 1
                } else {
                    cells[(i + 1) * cols + j].max(cells[i * cols + j + 1])
                };
            }
        }
        Self { cols, cells }
    }

    fn get(&self, i: usize, j: usize) -> u32 {
        self.cells[i * self.cols + j]
    }
}

/// Walk `a` and `b` against the LCS table, emitting one `DiffLine` per input line.
///
/// On equal sub-problem scores the cursor in `a` advances first, so removals
/// precede additions inside a changed run.
fn walk<'a>(a: &[&'a str], b: &[&'a str], out: &mut Vec<DiffLine<'a>>) {
    if a.len().saturating_mul(b.len()) > MAX_TABLE_CELLS {
        tracing::debug!(
            old_lines = a.len(),
            new_lines = b.len(),
            "Diff region exceeds table budget; emitting block replacement"
        );
        out.extend(a.iter().copied().map(DiffLine::Removed));
        out.extend(b.iter().copied().map(DiffLine::Added));
        return;
    }
    let table = LcsTable::build(a, b);
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] == b[j] {
            out.push(DiffLine::Context(a[i]));
            i += 1;
            j += 1;
        } else if table.get(i + 1, j) >= table.get(i, j + 1) {
            out.push(DiffLine::Removed(a[i]));
            i += 1;
        } else {
            out.push(DiffLine::Added(b[j]));
            j += 1;
        }
    }
    out.extend(a[i..].iter().copied().map(DiffLine::Removed));
    out.extend(b[j..].iter().copied().map(DiffLine::Added));
}

/// LCS length in O(min(n, m)) memory.
fn lcs_length(a: &[&str], b: &[&str]) -> usize {
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    let mut prev = vec![0usize; short.len() + 1];
    let mut curr = vec![0usize; short.len() + 1];
    for x in long {
        for (j, y) in short.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[short.len()]
}

/// Lengths of the common prefix and, after it, the common suffix.
fn common_affixes(a: &[&str], b: &[&str]) -> (usize, usize) {
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    (prefix, suffix)
}

/// Longest common subsequence of two line sequences.
#[must_use]
pub fn compute_lcs<'a>(a: &[&'a str], b: &[&'a str]) -> Vec<&'a str> {
    compute_diff(a, b)
        .into_iter()
        .filter_map(|line| match line {
            DiffLine::Context(text) => Some(text),
            DiffLine::Added(_) | DiffLine::Removed(_) => None,
        })
        .collect()
}

/// Minimal line edit sequence turning `a` into `b`.
#[must_use]
pub fn compute_diff<'a>(a: &[&'a str], b: &[&'a str]) -> Vec<DiffLine<'a>> {
    let (prefix, suffix) = common_affixes(a, b);

    let mut out = Vec::with_capacity(a.len().max(b.len()));
    out.extend(a[..prefix].iter().copied().map(DiffLine::Context));
    walk(
        &a[prefix..a.len() - suffix],
        &b[prefix..b.len() - suffix],
        &mut out,
    );
    out.extend(a[a.len() - suffix..].iter().copied().map(DiffLine::Context));
    out
}

/// Convenience wrapper over [`compute_diff`] for whole texts.
#[must_use]
pub fn diff_texts<'a>(old: &'a str, new: &'a str) -> Vec<DiffLine<'a>> {
    compute_diff(&split_lines(old), &split_lines(new))
}

/// Render an edit sequence as unified-style hunks.
///
/// Each hunk carries up to `context_lines` unchanged lines before and after its
/// changes; changes separated by at most `2 * context_lines` unchanged lines
/// share a hunk. Hunks are separated by a blank line.
#[must_use]
pub fn format_unified_diff(lines: &[DiffLine<'_>], context_lines: usize) -> String {
    let ranges = hunk_ranges(lines, context_lines);
    if ranges.is_empty() {
        return NO_CHANGES.to_string();
    }

    // old_seen[k] / new_seen[k]: lines of each side consumed before index k.
    let mut old_seen = Vec::with_capacity(lines.len() + 1);
    let mut new_seen = Vec::with_capacity(lines.len() + 1);
    let (mut old_n, mut new_n) = (0usize, 0usize);
    for line in lines {
        old_seen.push(old_n);
        new_seen.push(new_n);
        old_n += usize::from(line.in_old());
        new_n += usize::from(line.in_new());
    }
    old_seen.push(old_n);
    new_seen.push(new_n);

    let hunks: Vec<String> = ranges
        .into_iter()
        .map(|(start, end)| {
            let old_len = old_seen[end] - old_seen[start];
            let new_len = new_seen[end] - new_seen[start];
            let old_start = old_seen[start] + usize::from(old_len > 0);
            let new_start = new_seen[start] + usize::from(new_len > 0);

            let mut hunk = format!("@@ -{old_start},{old_len} +{new_start},{new_len} @@\n");
            for line in &lines[start..end] {
                hunk.push(line.prefix());
                hunk.push_str(line.text());
                hunk.push('\n');
            }
            hunk
        })
        .collect();

    hunks.join("\n")
}

/// Half-open index ranges of `lines` covered by each hunk.
fn hunk_ranges(lines: &[DiffLine<'_>], context_lines: usize) -> Vec<(usize, usize)> {
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for (idx, _) in lines.iter().enumerate().filter(|(_, l)| l.is_change()) {
        let start = idx.saturating_sub(context_lines);
        let end = (idx + 1 + context_lines).min(lines.len());
        match ranges.last_mut() {
            Some(last) if start <= last.1 => last.1 = end,
            _ => ranges.push((start, end)),
        }
    }
    ranges
}

/// Change statistics between two optional texts.
///
/// `None` on the old side is a pure creation; `None` on the new side is a pure deletion.
#[must_use]
pub fn compute_stats(old: Option<&str>, new: Option<&str>) -> DiffStats {
    match (old, new) {
        (None, None) => DiffStats::default(),
        (None, Some(new)) => DiffStats {
            additions: new.lines().count(),
            ..DiffStats::default()
        },
        (Some(old), None) => DiffStats {
            deletions: old.lines().count(),
            ..DiffStats::default()
        },
        (Some(old), Some(new)) => {
            let (a, b) = (split_lines(old), split_lines(new));
            let (prefix, suffix) = common_affixes(&a, &b);
            let a = &a[prefix..a.len() - suffix];
            let b = &b[prefix..b.len() - suffix];
            // Past the budget the middle counts as fully replaced.
            let common = if a.len().saturating_mul(b.len()) <= MAX_STATS_CELLS {
                lcs_length(a, b)
            } else {
                0
            };
            paired_stats(b.len() - common, a.len() - common)
        }
    }
}

fn paired_stats(added: usize, removed: usize) -> DiffStats {
    let modifications = added.min(removed);
    DiffStats {
        additions: added - modifications,
        deletions: removed - modifications,
        modifications,
    }
}

/// Stats over an existing edit sequence.
#[must_use]
pub fn stats_for(lines: &[DiffLine<'_>]) -> DiffStats {
    let added = lines
        .iter()
        .filter(|l| matches!(l, DiffLine::Added(_)))
        .count();
    let removed = lines
        .iter()
        .filter(|l| matches!(l, DiffLine::Removed(_)))
        .count();
    paired_stats(added, removed)
}

/// Unified diff of two texts capped at `max_lines` output lines.
#[must_use]
pub fn abbreviated_diff(old: &str, new: &str, max_lines: usize) -> String {
    let full = format_unified_diff(&diff_texts(old, new), DEFAULT_CONTEXT_LINES);
    let total = full.lines().count();
    if total <= max_lines {
        return full;
    }
    let mut out: String = full
        .lines()
        .take(max_lines)
        .flat_map(|line| [line, "\n"])
        .collect();
    out.push_str(&format!("... ({} more lines)", total - max_lines));
    out
}

#[cfg(test)]
mod tests {
    use super::{
        DiffLine, DiffStats, MAX_TABLE_CELLS, NO_CHANGES, abbreviated_diff, compute_diff,
        compute_lcs, compute_stats, format_unified_diff, split_lines, stats_for,
    };

    fn numbered(prefix: &str, count: usize) -> String {
        (0..count).map(|n| format!("{prefix} {n}\n")).collect()
    }

    fn apply<'a>(a: &[&'a str], diff: &[DiffLine<'a>]) -> Vec<&'a str> {
        let mut out = Vec::new();
        let mut cursor = 0;
        for line in diff {
            match line {
                DiffLine::Context(text) => {
                    assert_eq!(a[cursor], *text);
                    out.push(*text);
                    cursor += 1;
                }
                DiffLine::Removed(text) => {
                    assert_eq!(a[cursor], *text);
                    cursor += 1;
                }
                DiffLine::Added(text) => out.push(*text),
            }
        }
        assert_eq!(cursor, a.len());
        out
    }

    #[test]
    fn lcs_of_classic_pair() {
        let a = ["A", "B", "C", "B", "D", "A", "B"];
        let b = ["B", "D", "C", "A", "B", "A"];
        assert_eq!(compute_lcs(&a, &b).len(), 4);
    }

    #[test]
    fn lcs_of_disjoint_is_empty() {
        assert!(compute_lcs(&["a", "b"], &["c", "d"]).is_empty());
    }

    #[test]
    fn replacement_emits_removed_before_added() {
        let diff = compute_diff(&["a", "b", "c"], &["a", "x", "c"]);
        assert_eq!(
            diff,
            vec![
                DiffLine::Context("a"),
                DiffLine::Removed("b"),
                DiffLine::Added("x"),
                DiffLine::Context("c"),
            ]
        );
    }

    #[test]
    fn diff_reconstructs_target() {
        let cases: [(&[&str], &[&str]); 5] = [
            (&["a", "b", "c"], &["a", "x", "c"]),
            (&[], &["new"]),
            (&["gone"], &[]),
            (&["x", "a", "b", "x"], &["a", "x", "b", "y", "x"]),
            (&["1", "2", "3", "4", "5", "6"], &["0", "2", "3", "5", "6", "7"]),
        ];
        for (a, b) in cases {
            let diff = compute_diff(a, b);
            assert_eq!(apply(a, &diff), b.to_vec(), "a={a:?} b={b:?}");
        }
    }

    #[test]
    fn stats_pair_changes_into_modifications() {
        assert_eq!(
            compute_stats(Some("a\nb\nc"), Some("a\nx\nc")),
            DiffStats {
                additions: 0,
                deletions: 0,
                modifications: 1
            }
        );
    }

    #[test]
    fn stats_for_pure_creation() {
        assert_eq!(
            compute_stats(None, Some("line1\nline2")),
            DiffStats {
                additions: 2,
                deletions: 0,
                modifications: 0
            }
        );
    }

    #[test]
    fn stats_for_pure_deletion() {
        let stats = compute_stats(Some("a\nb\nc\n"), None);
        assert_eq!(stats.deletions, 3);
        assert_eq!(stats.additions, 0);
    }

    #[test]
    fn stats_balance_against_line_counts() {
        let pairs = [
            ("a\nb\nc", "a\nc\nd\ne"),
            ("one\ntwo", "zero\none\ntwo\nthree"),
            ("x\ny\nz", ""),
            ("", "p\nq"),
        ];
        for (old, new) in pairs {
            let s = compute_stats(Some(old), Some(new));
            let lhs = (s.additions + s.modifications) as isize
                - (s.deletions + s.modifications) as isize;
            let rhs = new.lines().count() as isize - old.lines().count() as isize;
            assert_eq!(lhs, rhs, "old={old:?} new={new:?}");
        }
    }

    #[test]
    fn unchanged_input_formats_sentinel() {
        let a = split_lines("same\ntext\n");
        let diff = compute_diff(&a, &a);
        assert_eq!(format_unified_diff(&diff, 3), NO_CHANGES);
    }

    #[test]
    fn single_hunk_header_and_body() {
        let diff = compute_diff(&["a", "b", "c"], &["a", "x", "c"]);
        let text = format_unified_diff(&diff, 1);
        assert_eq!(text, "@@ -1,3 +1,3 @@\n a\n-b\n+x\n c\n");
    }

    #[test]
    fn distant_changes_split_into_hunks() {
        let old: Vec<String> = (1..=20).map(|n| n.to_string()).collect();
        let mut new = old.clone();
        new[1] = "two".into();
        new[17] = "eighteen".into();
        let a: Vec<&str> = old.iter().map(String::as_str).collect();
        let b: Vec<&str> = new.iter().map(String::as_str).collect();

        let text = format_unified_diff(&compute_diff(&a, &b), 2);
        let headers: Vec<&str> = text.lines().filter(|l| l.starts_with("@@")).collect();
        assert_eq!(headers, vec!["@@ -1,4 +1,4 @@", "@@ -16,5 +16,5 @@"]);
        assert!(text.contains("\n\n@@"), "hunks separated by blank line");
    }

    #[test]
    fn close_changes_share_a_hunk() {
        let a = ["1", "2", "3", "4", "5", "6", "7"];
        let b = ["1", "X", "3", "4", "5", "6", "Y"];
        // Four unchanged lines between the changes fit inside 2 * 2 context.
        let text = format_unified_diff(&compute_diff(&a, &b), 2);
        assert_eq!(text.matches("@@ -").count(), 1);
    }

    #[test]
    fn insertion_into_empty_file_header() {
        let diff = compute_diff(&[], &["hello"]);
        assert_eq!(format_unified_diff(&diff, 3), "@@ -0,0 +1,1 @@\n+hello\n");
    }

    #[test]
    fn abbreviated_diff_truncates_with_footer() {
        let old = "";
        let new: String = (0..50).map(|n| format!("line {n}\n")).collect();
        let text = abbreviated_diff(old, &new, 10);
        assert_eq!(text.lines().count(), 11);
        assert!(text.ends_with("... (41 more lines)"));
    }

    #[test]
    fn large_rewrite_stats_stay_bounded() {
        let old = numbered("old", 40_000);
        let new = numbered("new", 40_000);
        assert_eq!(
            compute_stats(Some(&old), Some(&new)),
            DiffStats {
                additions: 0,
                deletions: 0,
                modifications: 40_000
            }
        );
    }

    #[test]
    fn oversized_region_becomes_block_replacement() {
        let old = numbered("old", 40_000);
        let new = format!("head\n{}", numbered("new", 40_000));
        let (a, b) = (split_lines(&old), split_lines(&new));
        assert!(a.len() * b.len() > MAX_TABLE_CELLS);

        let diff = compute_diff(&a, &b);
        assert_eq!(apply(&a, &diff), b);
        let first_added = diff
            .iter()
            .position(|l| matches!(l, DiffLine::Added(_)))
            .unwrap();
        assert!(diff[..first_added].iter().all(|l| matches!(l, DiffLine::Removed(_))));
        let s = stats_for(&diff);
        assert_eq!(
            (s.additions + s.modifications) as isize - (s.deletions + s.modifications) as isize,
            1
        );
    }

    #[test]
    fn stats_match_diff_within_budget() {
        let old = "keep\na\nb\nc\nkeep2\nd";
        let new = "keep\nb\nx\nc\nkeep2\nd\ne";
        assert_eq!(
            compute_stats(Some(old), Some(new)),
            stats_for(&compute_diff(&split_lines(old), &split_lines(new)))
        );
    }

    #[test]
    fn abbreviated_diff_of_large_rewrite_is_capped() {
        let old = numbered("old", 40_000);
        let new = numbered("new", 40_000);
        let text = abbreviated_diff(&old, &new, 40);
        assert_eq!(text.lines().count(), 41);
        assert!(text.starts_with("@@ -1,40000 +1,40000 @@\n-old 0\n"));
        assert!(text.ends_with("... (79961 more lines)"));
    }
}
