//! Line-level diff for long text fields, built on `similar` (Myers).

use similar::ChangeTag;

/// Number of unchanged lines kept around each change.
const CONTEXT_LINES: usize = 3;

/// Line hunks between two texts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextDiff {
    pub hunks: Vec<DiffHunk>,
}

impl TextDiff {
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    pub fn additions(&self) -> usize {
        self.count(|line| matches!(line, DiffLine::Added(_)))
    }

    pub fn deletions(&self) -> usize {
        self.count(|line| matches!(line, DiffLine::Removed(_)))
    }

    fn count(&self, pred: impl Fn(&DiffLine) -> bool) -> usize {
        self.hunks
            .iter()
            .flat_map(|hunk| &hunk.lines)
            .filter(|line| pred(line))
            .count()
    }

    /// Unified-diff style rendering, one `@@` header per hunk.
    pub fn to_unified(&self) -> String {
        let mut out = String::new();
        for hunk in &self.hunks {
            out.push_str(&format!(
                "@@ -{},{} +{},{} @@\n",
                hunk.old_start, hunk.old_count, hunk.new_start, hunk.new_count
            ));
            for line in &hunk.lines {
                let (prefix, text) = match line {
                    DiffLine::Context(t) => (' ', t),
                    DiffLine::Added(t) => ('+', t),
                    DiffLine::Removed(t) => ('-', t),
                };
                out.push(prefix);
                out.push_str(text);
                out.push('\n');
            }
        }
        out
    }
}

/// A contiguous run of changes with surrounding context. Line numbers are
/// 1-based.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffHunk {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<DiffLine>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiffLine {
    Context(String),
    Added(String),
    Removed(String),
}

/// Compare two texts line by line.
pub fn diff_text(old: &str, new: &str) -> TextDiff {
    if old == new {
        return TextDiff::default();
    }

    let diff = similar::TextDiff::from_lines(old, new);
    let hunks = diff
        .grouped_ops(CONTEXT_LINES)
        .iter()
        .filter_map(|group| {
            let first = group.first()?;
            let mut hunk = DiffHunk {
                old_start: first.old_range().start + 1,
                old_count: 0,
                new_start: first.new_range().start + 1,
                new_count: 0,
                lines: Vec::new(),
            };
            for op in group {
                for change in diff.iter_changes(op) {
                    let text = change.value().trim_end_matches('\n').to_string();
                    match change.tag() {
                        ChangeTag::Equal => {
                            hunk.old_count += 1;
                            hunk.new_count += 1;
                            hunk.lines.push(DiffLine::Context(text));
                        }
                        ChangeTag::Delete => {
                            hunk.old_count += 1;
                            hunk.lines.push(DiffLine::Removed(text));
                        }
                        ChangeTag::Insert => {
                            hunk.new_count += 1;
                            hunk.lines.push(DiffLine::Added(text));
                        }
                    }
                }
            }
            Some(hunk)
        })
        .collect();

    TextDiff { hunks }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_is_empty() {
        assert!(diff_text("same\ntext\n", "same\ntext\n").is_empty());
    }

    #[test]
    fn changed_line_is_removed_and_added() {
        let diff = diff_text("alpha\nbeta\ngamma\n", "alpha\nBETA\ngamma\n");
        assert_eq!(diff.hunks.len(), 1);
        assert_eq!(diff.additions(), 1);
        assert_eq!(diff.deletions(), 1);
        let hunk = &diff.hunks[0];
        assert_eq!((hunk.old_start, hunk.old_count), (1, 3));
        assert_eq!((hunk.new_start, hunk.new_count), (1, 3));
    }

    #[test]
    fn distant_changes_make_separate_hunks() {
        let old: String = (1..=20).map(|i| format!("line {i}\n")).collect();
        let new = old.replace("line 2\n", "line two\n").replace("line 19\n", "line nineteen\n");
        let diff = diff_text(&old, &new);
        assert_eq!(diff.hunks.len(), 2);
        assert!(diff.hunks[1].lines.iter().any(|l| matches!(l, DiffLine::Context(_))));
    }

    #[test]
    fn empty_to_text() {
        let diff = diff_text("", "first note\n");
        assert_eq!(diff.additions(), 1);
        assert_eq!(diff.deletions(), 0);
    }

    #[test]
    fn unified_rendering() {
        let diff = diff_text("a\nb\n", "a\nc\n");
        assert_eq!(diff.to_unified(), "@@ -1,2 +1,2 @@\n a\n-b\n+c\n");
    }
}
