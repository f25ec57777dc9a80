//! Reviewer-facing diffs
//!
//! Builds the branch-vs-target / merged-PR-vs-parent pair for a branch that
//! needs review:
//! - Metadata lines that churn across environments are stripped
//! - Diffs are split into per-file fragments at `diff --git` headers
//! - Files whose two fragments are identical are dropped from the file lists

use std::collections::BTreeMap;

use tracing::{debug, instrument};

use super::repo::GitRepo;
use crate::error::Result;
use crate::types::{BranchDiff, DiffRefs, FileChange, FileContents, FileStatus};

/// Line prefixes with no bearing on content
const NOISE_PREFIXES: [&str; 6] = [
    "index ",
    "old mode",
    "new mode",
    "similarity index",
    "rename from",
    "rename to",
];

/// Strip object ids, file modes, similarity and rename metadata; keep hunk
/// headers and content lines
pub fn normalize_for_display(diff: &str) -> String {
    diff.split('\n')
        .filter(|line| !NOISE_PREFIXES.iter().any(|p| line.starts_with(p)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split a diff into `(filename, fragment)` pairs in diff order
///
/// The filename is the post-image path from the `diff --git a/.. b/..` header.
pub fn split_file_fragments(diff: &str) -> Vec<(String, String)> {
    let mut fragments: Vec<(String, Vec<&str>)> = Vec::new();

    for line in diff.lines() {
        if let Some(header) = line.strip_prefix("diff --git ") {
            fragments.push((header_target(header), vec![line]));
        } else if let Some((_, body)) = fragments.last_mut() {
            body.push(line);
        }
    }

    fragments
        .into_iter()
        .map(|(name, body)| (name, body.join("\n")))
        .collect()
}

/// `a/old b/new` → `new`; quoted post-image paths are unquoted
fn header_target(header: &str) -> String {
    if header.ends_with('"') {
        if let Some(idx) = header.rfind(" \"b/") {
            let path = unquote_path(&header[idx + 1..]);
            return path.strip_prefix("b/").unwrap_or(&path).to_string();
        }
    }
    match header.rfind(" b/") {
        Some(idx) => header[idx + 3..].to_string(),
        None => header.to_string(),
    }
}

/// Decode a path git wrote in C-style quotes (`core.quotePath`)
///
/// Octal escapes are raw bytes of the UTF-8 name. Unquoted input is returned
/// unchanged.
pub fn unquote_path(quoted: &str) -> String {
    let Some(inner) = quoted
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return quoted.to_string();
    };

    let mut bytes = Vec::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('a') => bytes.push(0x07),
            Some('b') => bytes.push(0x08),
            Some('t') => bytes.push(b'\t'),
            Some('n') => bytes.push(b'\n'),
            Some('v') => bytes.push(0x0b),
            Some('f') => bytes.push(0x0c),
            Some('r') => bytes.push(b'\r'),
            Some(d @ '0'..='7') => {
                let mut value = d.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(digit) => {
                            value = value * 8 + digit;
                            chars.next();
                        }
                        None => break,
                    }
                }
                bytes.push((value & 0xff) as u8);
            }
            Some(other) => {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
            None => bytes.push(b'\\'),
        }
    }

    String::from_utf8_lossy(&bytes).into_owned()
}

/// Parse `git diff --name-status -z` output
///
/// Fields are NUL-separated and never quoted: a status code, then one path,
/// or source and destination for renames and copies.
pub fn parse_name_status(output: &str) -> Vec<FileChange> {
    let mut fields = output.split('\0').filter(|f| !f.is_empty());
    let mut changes = Vec::new();

    while let Some(code) = fields.next() {
        let status = FileStatus::from_code(code.trim());
        let Some(first) = fields.next() else {
            break;
        };
        let change = match status {
            FileStatus::Renamed | FileStatus::Copied => match fields.next() {
                Some(dest) => FileChange {
                    status,
                    filename: dest.to_string(),
                    old_filename: Some(first.to_string()),
                },
                None => break,
            },
            _ => FileChange {
                status,
                filename: first.to_string(),
                old_filename: None,
            },
        };
        changes.push(change);
    }

    changes
}

/// Files whose normalized fragments differ between the two sides
///
/// A file is dropped only when both sides carry a fragment for it and the
/// fragments are equal. Returns the branch-side and PR-side entries of every
/// remaining file.
pub fn divergent_files(
    branch_diff: &str,
    pr_diff: &str,
    branch_files: &[FileChange],
    pr_files: &[FileChange],
) -> (Vec<FileChange>, Vec<FileChange>) {
    let branch_fragments: BTreeMap<String, String> =
        split_file_fragments(branch_diff).into_iter().collect();
    let pr_fragments: BTreeMap<String, String> = split_file_fragments(pr_diff).into_iter().collect();

    let mut names: Vec<&str> = branch_files.iter().map(|f| f.filename.as_str()).collect();
    for file in pr_files {
        if !names.contains(&file.filename.as_str()) {
            names.push(&file.filename);
        }
    }

    let mut branch_out = Vec::new();
    let mut pr_out = Vec::new();
    for name in names {
        if let (Some(ours), Some(theirs)) = (branch_fragments.get(name), pr_fragments.get(name)) {
            if ours == theirs {
                debug!("No review needed for {}", name);
                continue;
            }
        }
        branch_out.extend(branch_files.iter().find(|f| f.filename == name).cloned());
        pr_out.extend(pr_files.iter().find(|f| f.filename == name).cloned());
    }

    (branch_out, pr_out)
}

/// Diff a branch against the commit that merged its pull request
#[instrument(skip(repo))]
pub async fn present_against_merge(
    repo: &GitRepo,
    branch: &str,
    target: &str,
    merge_commit: &str,
) -> Result<BranchDiff> {
    let branch_range = format!("{target}...{branch}");
    let pr_parent = format!("{merge_commit}^1");
    let merge_range = format!("{pr_parent}...{merge_commit}");

    let raw_branch_diff = repo.diff(&branch_range).await?;
    let raw_pr_diff = repo.diff(&merge_range).await?;
    let branch_diff = normalize_for_display(&raw_branch_diff);
    let pr_diff = normalize_for_display(&raw_pr_diff);

    let branch_files = repo.name_status(&branch_range).await?;
    let pr_files = repo.name_status(&merge_range).await?;

    let (filtered_branch, filtered_pr) =
        divergent_files(&branch_diff, &pr_diff, &branch_files, &pr_files);

    if filtered_branch.is_empty() && filtered_pr.is_empty() {
        debug!("Every file of {} matches the merge, showing merge-base view", branch);
        return Ok(BranchDiff {
            branch_diff: raw_branch_diff,
            pr_diff: String::new(),
            branch_files,
            pr_files: Vec::new(),
            file_contents: BTreeMap::new(),
            refs: DiffRefs {
                branch: branch.to_string(),
                base: target.to_string(),
                pr_parent: None,
                merge_commit: "HEAD".to_string(),
            },
            is_merge_base_diff: true,
        });
    }

    Ok(BranchDiff {
        branch_diff,
        pr_diff,
        branch_files: filtered_branch,
        pr_files: filtered_pr,
        file_contents: BTreeMap::new(),
        refs: DiffRefs {
            branch: branch.to_string(),
            base: target.to_string(),
            pr_parent: Some(pr_parent),
            merge_commit: merge_commit.to_string(),
        },
        is_merge_base_diff: false,
    })
}

/// Diff a branch directly against trunk, with full file contents
#[instrument(skip(repo))]
pub async fn present_against_trunk(repo: &GitRepo, branch: &str, trunk: &str) -> Result<BranchDiff> {
    let merge_base = repo
        .merge_base(trunk, branch)
        .await?
        .unwrap_or_else(|| trunk.to_string());

    let range = format!("{trunk}...{branch}");
    let branch_diff = repo.diff(&range).await?;
    let branch_files = repo.name_status(&range).await?;
    let file_contents = file_contents(repo, &merge_base, branch, &branch_files).await?;

    Ok(BranchDiff {
        branch_diff,
        pr_diff: String::new(),
        branch_files,
        pr_files: Vec::new(),
        file_contents,
        refs: DiffRefs {
            branch: branch.to_string(),
            base: trunk.to_string(),
            pr_parent: None,
            merge_commit: "HEAD".to_string(),
        },
        is_merge_base_diff: true,
    })
}

/// Materialize before/after contents so a viewer needs no repository access
async fn file_contents(
    repo: &GitRepo,
    base: &str,
    tip: &str,
    files: &[FileChange],
) -> Result<BTreeMap<String, FileContents>> {
    let mut contents = BTreeMap::new();

    for file in files {
        let old_path = file.old_filename.as_deref().unwrap_or(&file.filename);
        let old = match file.status {
            FileStatus::Added => String::new(),
            _ => repo.show_file(base, old_path).await?,
        };
        let new = match file.status {
            FileStatus::Deleted => String::new(),
            _ => repo.show_file(tip, &file.filename).await?,
        };
        contents.insert(file.filename.clone(), FileContents { old, new });
    }

    Ok(contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedRunner;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const BRANCH: &str = "diff --git a/a.txt b/a.txt
index 1111111..2222222 100644
--- a/a.txt
+++ b/a.txt
@@ -1 +1,2 @@
 one
+two
diff --git a/b.txt b/b.txt
index 3333333..4444444 100644
--- a/b.txt
+++ b/b.txt
@@ -1 +1,2 @@
 uno
+dos
+tres
";

    const PR: &str = "diff --git a/a.txt b/a.txt
index 5555555..6666666 100644
--- a/a.txt
+++ b/a.txt
@@ -1 +1,2 @@
 one
+two
diff --git a/b.txt b/b.txt
index 7777777..8888888 100644
--- a/b.txt
+++ b/b.txt
@@ -1 +1,2 @@
 uno
+dos
";

    fn modified(name: &str) -> FileChange {
        FileChange {
            status: FileStatus::Modified,
            filename: name.to_string(),
            old_filename: None,
        }
    }

    #[test]
    fn test_normalize_for_display() {
        let diff = "diff --git a/old.rs b/new.rs
similarity index 90%
rename from old.rs
rename to new.rs
old mode 100644
new mode 100755
index abc..def
--- a/old.rs
+++ b/new.rs
@@ -1 +1 @@
-a
+b";
        insta::assert_snapshot!(normalize_for_display(diff), @r"
        diff --git a/old.rs b/new.rs
        --- a/old.rs
        +++ b/new.rs
        @@ -1 +1 @@
        -a
        +b
        ");
    }

    #[test]
    fn test_split_file_fragments() {
        let fragments = split_file_fragments(BRANCH);
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].0, "a.txt");
        assert_eq!(fragments[1].0, "b.txt");
        assert!(fragments[1].1.starts_with("diff --git a/b.txt b/b.txt"));
        assert!(fragments[1].1.ends_with("+tres"));
    }

    #[test]
    fn test_header_target() {
        assert_eq!(header_target("a/src/x.rs b/src/y.rs"), "src/y.rs");
        assert_eq!(header_target("\"a/sp ace.rs\" \"b/sp ace.rs\""), "sp ace.rs");
        assert_eq!(
            header_target("\"a/\\303\\251.txt\" \"b/\\303\\251.txt\""),
            "é.txt"
        );
    }

    #[test]
    fn test_unquote_path() {
        assert_eq!(unquote_path("plain.txt"), "plain.txt");
        assert_eq!(unquote_path("\"\\303\\251.txt\""), "é.txt");
        assert_eq!(unquote_path("\"tab\\there\""), "tab\there");
        assert_eq!(unquote_path("\"say \\\"hi\\\"\""), "say \"hi\"");
        assert_eq!(unquote_path("\"back\\\\slash\""), "back\\slash");
    }

    #[test]
    fn test_parse_name_status() {
        let files = parse_name_status("M\0src/lib.rs\0A\0new.txt\0R087\0old.rs\0new.rs\0D\0gone.md\0");
        assert_eq!(
            files,
            vec![
                modified("src/lib.rs"),
                FileChange {
                    status: FileStatus::Added,
                    filename: "new.txt".to_string(),
                    old_filename: None,
                },
                FileChange {
                    status: FileStatus::Renamed,
                    filename: "new.rs".to_string(),
                    old_filename: Some("old.rs".to_string()),
                },
                FileChange {
                    status: FileStatus::Deleted,
                    filename: "gone.md".to_string(),
                    old_filename: None,
                },
            ]
        );
    }

    #[test]
    fn test_divergent_files_drop_identical_fragments() {
        let files = vec![modified("a.txt"), modified("b.txt")];
        let (branch, pr) = divergent_files(
            &normalize_for_display(BRANCH),
            &normalize_for_display(PR),
            &files,
            &files,
        );
        assert_eq!(branch, vec![modified("b.txt")]);
        assert_eq!(pr, vec![modified("b.txt")]);
    }

    #[test]
    fn test_divergent_files_one_sided() {
        let (branch, pr) = divergent_files(
            BRANCH,
            "",
            &[modified("a.txt"), modified("b.txt")],
            &[],
        );
        assert_eq!(branch.len(), 2);
        assert!(pr.is_empty());
    }

    #[test]
    fn test_divergent_files_keeps_file_missing_a_fragment() {
        // Listed on both sides but only the branch diff carries a fragment
        let (branch, pr) = divergent_files(
            BRANCH,
            "",
            &[modified("a.txt")],
            &[modified("a.txt")],
        );
        assert_eq!(branch, vec![modified("a.txt")]);
        assert_eq!(pr, vec![modified("a.txt")]);

        // Neither side parsed a fragment for the file
        let (branch, _) = divergent_files("", "", &[modified("x.txt")], &[modified("x.txt")]);
        assert_eq!(branch, vec![modified("x.txt")]);
    }

    #[test]
    fn test_parse_name_status_non_ascii_path() {
        let files = parse_name_status("M\0é.txt\0R100\0sp ace.rs\0ñ/new.rs\0");
        assert_eq!(files[0], modified("é.txt"));
        assert_eq!(files[1].filename, "ñ/new.rs");
        assert_eq!(files[1].old_filename.as_deref(), Some("sp ace.rs"));
    }

    #[tokio::test]
    async fn test_present_against_merge_quoted_non_ascii_header() {
        let branch = "diff --git \"a/\\303\\251.txt\" \"b/\\303\\251.txt\"
index 1111111..2222222 100644
--- \"a/\\303\\251.txt\"
+++ \"b/\\303\\251.txt\"
@@ -1 +1,2 @@
 one
+two
";
        let pr = "diff --git \"a/\\303\\251.txt\" \"b/\\303\\251.txt\"
new file mode 100644
index 0000000..5555555
--- /dev/null
+++ \"b/\\303\\251.txt\"
@@ -0,0 +1 @@
+one
";
        let runner = ScriptedRunner::new()
            .ok("git diff --no-color main...feature --", branch)
            .ok("git diff --no-color abc^1...abc --", pr)
            .ok("git diff --name-status -z main...feature --", "A\0é.txt\0")
            .ok("git diff --name-status -z abc^1...abc --", "A\0é.txt\0");
        let repo = GitRepo::new(Arc::new(runner), "/repo", "git", "origin");

        let diff = present_against_merge(&repo, "feature", "main", "abc").await.unwrap();
        assert!(!diff.is_merge_base_diff);
        assert_eq!(diff.branch_files.len(), 1);
        assert_eq!(diff.branch_files[0].filename, "é.txt");
        assert_eq!(diff.pr_files[0].filename, "é.txt");
    }

    #[tokio::test]
    async fn test_present_against_merge_filters_files() {
        let runner = ScriptedRunner::new()
            .ok("git diff --no-color main...feature --", BRANCH)
            .ok("git diff --no-color abc^1...abc --", PR)
            .ok("git diff --name-status -z main...feature --", "M\0a.txt\0M\0b.txt\0")
            .ok("git diff --name-status -z abc^1...abc --", "M\0a.txt\0M\0b.txt\0");
        let repo = GitRepo::new(Arc::new(runner), "/repo", "git", "origin");

        let diff = present_against_merge(&repo, "feature", "main", "abc").await.unwrap();
        assert!(!diff.is_merge_base_diff);
        assert_eq!(diff.branch_files, vec![modified("b.txt")]);
        assert_eq!(diff.pr_files, vec![modified("b.txt")]);
        assert_eq!(diff.refs.pr_parent.as_deref(), Some("abc^1"));
        assert!(!diff.branch_diff.contains("index "));
    }

    #[tokio::test]
    async fn test_present_against_merge_all_files_match() {
        let runner = ScriptedRunner::new()
            .ok("git diff --no-color main...feature --", PR)
            .ok("git diff --no-color abc^1...abc --", PR)
            .ok("git diff --name-status -z main...feature --", "M\0a.txt\0M\0b.txt\0")
            .ok("git diff --name-status -z abc^1...abc --", "M\0a.txt\0M\0b.txt\0");
        let repo = GitRepo::new(Arc::new(runner), "/repo", "git", "origin");

        let diff = present_against_merge(&repo, "feature", "main", "abc").await.unwrap();
        assert!(diff.is_merge_base_diff);
        assert_eq!(diff.branch_diff, PR);
        assert!(diff.pr_diff.is_empty());
        assert!(diff.pr_files.is_empty());
        assert_eq!(diff.branch_files.len(), 2);
    }

    #[tokio::test]
    async fn test_present_against_trunk_materializes_contents() {
        let runner = ScriptedRunner::new()
            .ok("git merge-base main wip", "base123\n")
            .ok("git diff --no-color main...wip --", "diff --git a/n.txt b/n.txt\n")
            .ok("git diff --name-status -z main...wip --", "A\0n.txt\0M\0m.txt\0D\0d.txt\0")
            .ok("git show wip:n.txt", "new file\n")
            .ok("git show base123:m.txt", "before\n")
            .ok("git show wip:m.txt", "after\n")
            .ok("git show base123:d.txt", "doomed\n");
        let repo = GitRepo::new(Arc::new(runner), "/repo", "git", "origin");

        let diff = present_against_trunk(&repo, "wip", "main").await.unwrap();
        assert!(diff.is_merge_base_diff);
        assert_eq!(diff.file_contents["n.txt"], FileContents {
            old: String::new(),
            new: "new file\n".to_string(),
        });
        assert_eq!(diff.file_contents["m.txt"].old, "before\n");
        assert_eq!(diff.file_contents["m.txt"].new, "after\n");
        assert_eq!(diff.file_contents["d.txt"].new, "");
        assert_eq!(diff.file_contents["d.txt"].old, "doomed\n");
    }
}
