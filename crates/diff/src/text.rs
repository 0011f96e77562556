//! A pure in-process unified-diff engine.
//!
//! Lines are compared as exact byte segments including their terminators,
//! so a missing final newline is an ordinary difference and round-trips
//! byte-for-byte through the `\ No newline at end of file` marker. Emitted
//! hunks carry zero context; the parser additionally accepts context lines
//! so it can apply patches from other unified-diff producers.

use crate::DiffEngine;
use async_trait::async_trait;
use caravel_types::error::DiffError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// The dependency-free diff engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextEngine;

impl TextEngine {
    /// Creates a new engine.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DiffEngine for TextEngine {
    async fn diff(
        &self,
        old_path: &Path,
        new_path: &Path,
        patch_path: &Path,
    ) -> Result<(), DiffError> {
        let old = read_text(old_path).await?;
        let new = read_text(new_path).await?;
        let dir = parent_dir(patch_path);
        let patch = render_diff(
            &display_name(old_path, dir),
            &display_name(new_path, dir),
            &old,
            &new,
        );
        fs::write(patch_path, patch).await?;
        Ok(())
    }

    async fn patch(
        &self,
        patch_path: &Path,
        reverse: bool,
        in_place: bool,
    ) -> Result<(), DiffError> {
        let text = read_text(patch_path).await?;
        if text.trim().is_empty() {
            // An empty patch is the identity.
            return Ok(());
        }
        let sections = parse_patch(&text)?;
        let dir = parent_dir(patch_path).to_path_buf();

        let mut working: HashMap<PathBuf, String> = HashMap::new();
        for section in &sections {
            // The target is always the old-side name; a reverse apply
            // un-patches that same file in place.
            let target = resolve(&dir, &section.old_name);
            if !working.contains_key(&target) {
                let loaded = read_text(&target).await?;
                working.insert(target.clone(), loaded);
            }
            let current = working
                .get(&target)
                .ok_or_else(|| malformed("patch target vanished mid-apply"))?;
            let next = apply_section(section, current, reverse)?;
            working.insert(target, next);
        }

        if in_place {
            for (target, result) in &working {
                fs::write(target, result).await?;
            }
        } else {
            if working.len() != 1 {
                return Err(malformed(
                    "multi-target patch cannot be applied out of place",
                ));
            }
            let out = PathBuf::from(format!("{}.out", patch_path.display()));
            for result in working.values() {
                fs::write(&out, result).await?;
            }
        }
        Ok(())
    }

    async fn combine(
        &self,
        acc_patch_path: &Path,
        new_patch_path: &Path,
        out_patch_path: &Path,
    ) -> Result<(), DiffError> {
        crate::concat_patches(acc_patch_path, new_patch_path, out_patch_path).await
    }
}

#[derive(Debug, Clone, Copy)]
enum Op<'a> {
    Equal,
    Del(&'a str),
    Ins(&'a str),
}

#[derive(Debug)]
struct Hunk {
    old_start: usize,
    old_count: usize,
    new_start: usize,
    new_count: usize,
    /// Body lines in patch order: (prefix, exact segment).
    body: Vec<(char, String)>,
}

#[derive(Debug)]
struct Section {
    old_name: String,
    new_name: String,
    hunks: Vec<Hunk>,
}

fn malformed(msg: impl Into<String>) -> DiffError {
    DiffError::MalformedPatch(msg.into())
}

async fn read_text(path: &Path) -> Result<String, DiffError> {
    let bytes = fs::read(path).await?;
    String::from_utf8(bytes).map_err(|_| DiffError::NonTextual(path.display().to_string()))
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

fn display_name(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn resolve(dir: &Path, name: &str) -> PathBuf {
    let p = Path::new(name);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        dir.join(p)
    }
}

/// Splits text into line segments that keep their `\n` terminators, so the
/// concatenation of all segments reproduces the input exactly.
fn split_segments(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

fn lcs_ops<'a>(a: &[&'a str], b: &[&'a str]) -> Vec<Op<'a>> {
    // dp[i][j] = LCS length of a[i..] and b[j..], flattened row-major.
    let (n, m) = (a.len(), b.len());
    let width = m + 1;
    let mut dp = vec![0usize; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            dp[i * width + j] = if a[i] == b[j] {
                dp[(i + 1) * width + j + 1] + 1
            } else {
                dp[(i + 1) * width + j].max(dp[i * width + j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            ops.push(Op::Equal);
            i += 1;
            j += 1;
        } else if dp[(i + 1) * width + j] >= dp[i * width + j + 1] {
            ops.push(Op::Del(a[i]));
            i += 1;
        } else {
            ops.push(Op::Ins(b[j]));
            j += 1;
        }
    }
    ops.extend(a[i..].iter().copied().map(Op::Del));
    ops.extend(b[j..].iter().copied().map(Op::Ins));
    ops
}

fn push_patch_line(out: &mut String, prefix: char, segment: &str) {
    out.push(prefix);
    out.push_str(segment);
    if !segment.ends_with('\n') {
        out.push('\n');
        out.push_str("\\ No newline at end of file\n");
    }
}

fn render_diff(old_name: &str, new_name: &str, old: &str, new: &str) -> String {
    let a = split_segments(old);
    let b = split_segments(new);
    let ops = lcs_ops(&a, &b);
    if !ops.iter().any(|op| !matches!(op, Op::Equal)) {
        return String::new();
    }

    let mut out = format!("--- {}\n+++ {}\n", old_name, new_name);
    let (mut old_line, mut new_line) = (1usize, 1usize);
    let mut idx = 0;
    while idx < ops.len() {
        if matches!(ops[idx], Op::Equal) {
            old_line += 1;
            new_line += 1;
            idx += 1;
            continue;
        }

        let (run_old, run_new) = (old_line, new_line);
        let mut dels: Vec<&str> = Vec::new();
        let mut inss: Vec<&str> = Vec::new();
        while idx < ops.len() {
            match ops[idx] {
                Op::Del(s) => {
                    dels.push(s);
                    old_line += 1;
                }
                Op::Ins(s) => {
                    inss.push(s);
                    new_line += 1;
                }
                Op::Equal => break,
            }
            idx += 1;
        }

        let (old_start, old_count) = if dels.is_empty() {
            (run_old - 1, 0)
        } else {
            (run_old, dels.len())
        };
        let (new_start, new_count) = if inss.is_empty() {
            (run_new - 1, 0)
        } else {
            (run_new, inss.len())
        };
        out.push_str(&format!(
            "@@ -{},{} +{},{} @@\n",
            old_start, old_count, new_start, new_count
        ));
        for s in dels {
            push_patch_line(&mut out, '-', s);
        }
        for s in inss {
            push_patch_line(&mut out, '+', s);
        }
    }
    out
}

fn header_name(line: &str) -> String {
    let rest = line
        .get(4..)
        .unwrap_or("")
        .trim_end_matches(['\n', '\r']);
    match rest.split('\t').next() {
        Some(name) => name.to_string(),
        None => rest.to_string(),
    }
}

fn parse_range(part: &str) -> Result<(usize, usize), DiffError> {
    let mut it = part.splitn(2, ',');
    let start = it
        .next()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| malformed(format!("bad hunk range {part:?}")))?;
    let count = match it.next() {
        Some(c) => c
            .parse::<usize>()
            .map_err(|_| malformed(format!("bad hunk count {part:?}")))?,
        None => 1,
    };
    Ok((start, count))
}

fn parse_hunk_header(line: &str) -> Result<(usize, usize, usize, usize), DiffError> {
    let inner = line
        .strip_prefix("@@ -")
        .and_then(|l| l.split(" @@").next())
        .ok_or_else(|| malformed(format!("bad hunk header {line:?}")))?;
    let mut halves = inner.splitn(2, " +");
    let old = halves
        .next()
        .ok_or_else(|| malformed(format!("bad hunk header {line:?}")))?;
    let new = halves
        .next()
        .ok_or_else(|| malformed(format!("bad hunk header {line:?}")))?;
    let (old_start, old_count) = parse_range(old)?;
    let (new_start, new_count) = parse_range(new)?;
    Ok((old_start, old_count, new_start, new_count))
}

fn parse_patch(text: &str) -> Result<Vec<Section>, DiffError> {
    let mut lines = text.split_inclusive('\n').peekable();
    let mut sections: Vec<Section> = Vec::new();

    while let Some(&line) = lines.peek() {
        if !line.starts_with("--- ") {
            // Tolerate leader lines (e.g. `diff -u a b`) between sections.
            lines.next();
            continue;
        }
        let old_name = header_name(line);
        lines.next();
        let plus = lines.next().ok_or_else(|| malformed("missing +++ header"))?;
        if !plus.starts_with("+++ ") {
            return Err(malformed("missing +++ header"));
        }
        let new_name = header_name(plus);

        let mut hunks = Vec::new();
        while let Some(&header) = lines.peek() {
            if !header.starts_with("@@ -") {
                break;
            }
            lines.next();
            let (old_start, old_count, new_start, new_count) = parse_hunk_header(header)?;

            let mut body: Vec<(char, String)> = Vec::new();
            let (mut rem_old, mut rem_new) = (old_count, new_count);
            while rem_old > 0 || rem_new > 0 {
                let bl = lines
                    .next()
                    .ok_or_else(|| malformed("hunk body ended early"))?;
                let mut chars = bl.chars();
                match chars.next() {
                    Some(' ') => {
                        rem_old = rem_old
                            .checked_sub(1)
                            .ok_or_else(|| malformed("hunk body overruns old count"))?;
                        rem_new = rem_new
                            .checked_sub(1)
                            .ok_or_else(|| malformed("hunk body overruns new count"))?;
                        body.push((' ', chars.as_str().to_string()));
                    }
                    Some('-') => {
                        rem_old = rem_old
                            .checked_sub(1)
                            .ok_or_else(|| malformed("hunk body overruns old count"))?;
                        body.push(('-', chars.as_str().to_string()));
                    }
                    Some('+') => {
                        rem_new = rem_new
                            .checked_sub(1)
                            .ok_or_else(|| malformed("hunk body overruns new count"))?;
                        body.push(('+', chars.as_str().to_string()));
                    }
                    Some('\\') => strip_trailing_newline(&mut body)?,
                    _ => return Err(malformed(format!("unexpected hunk line {bl:?}"))),
                }
            }
            // A no-newline marker may trail the final body line.
            if lines.peek().is_some_and(|l| l.starts_with('\\')) {
                lines.next();
                strip_trailing_newline(&mut body)?;
            }
            hunks.push(Hunk {
                old_start,
                old_count,
                new_start,
                new_count,
                body,
            });
        }
        sections.push(Section {
            old_name,
            new_name,
            hunks,
        });
    }

    if sections.is_empty() {
        return Err(malformed("no patch sections found"));
    }
    Ok(sections)
}

fn strip_trailing_newline(body: &mut [(char, String)]) -> Result<(), DiffError> {
    let (_, last) = body
        .last_mut()
        .ok_or_else(|| malformed("no-newline marker before any line"))?;
    if last.ends_with('\n') {
        last.pop();
    }
    Ok(())
}

fn apply_section(section: &Section, text: &str, reverse: bool) -> Result<String, DiffError> {
    let src = split_segments(text);
    let (del_prefix, ins_prefix) = if reverse { ('+', '-') } else { ('-', '+') };

    let mut out: Vec<&str> = Vec::new();
    let mut cursor = 0usize;
    for hunk in &section.hunks {
        let (start, count) = if reverse {
            (hunk.new_start, hunk.new_count)
        } else {
            (hunk.old_start, hunk.old_count)
        };
        let start_idx = if count == 0 {
            start
        } else {
            start
                .checked_sub(1)
                .ok_or_else(|| malformed("hunk start below 1"))?
        };
        if start_idx < cursor {
            return Err(malformed("overlapping hunks"));
        }
        if start_idx > src.len() {
            return Err(malformed("hunk start beyond end of file"));
        }
        out.extend(&src[cursor..start_idx]);
        cursor = start_idx;

        for (prefix, content) in &hunk.body {
            if *prefix == ' ' || *prefix == del_prefix {
                let actual = src
                    .get(cursor)
                    .ok_or_else(|| malformed("patch runs beyond end of file"))?;
                if *actual != content.as_str() {
                    return Err(malformed(format!(
                        "patch does not apply at line {}",
                        cursor + 1
                    )));
                }
                if *prefix == ' ' {
                    out.push(actual);
                }
                cursor += 1;
            } else if *prefix == ins_prefix {
                out.push(content.as_str());
            }
        }
    }
    out.extend(&src[cursor..]);
    Ok(out.concat())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).await.unwrap();
        path
    }

    async fn round_trip(old: &str, new: &str) {
        let engine = TextEngine::new();
        let dir = tempdir().unwrap();
        let old_path = write(dir.path(), "state.txt", old).await;
        let new_path = write(dir.path(), "state.next.txt", new).await;
        let patch_path = dir.path().join("state.patch");

        engine.diff(&old_path, &new_path, &patch_path).await.unwrap();
        engine.patch(&patch_path, false, true).await.unwrap();
        assert_eq!(fs::read_to_string(&old_path).await.unwrap(), new);

        // Un-applying restores the original old text.
        engine.patch(&patch_path, true, true).await.unwrap();
        assert_eq!(fs::read_to_string(&old_path).await.unwrap(), old);
    }

    #[tokio::test]
    async fn diff_then_patch_round_trips() {
        round_trip("a\nb\nc\n", "a\nx\nc\n").await;
        round_trip("", "hello\nworld\n").await;
        round_trip("hello\nworld\n", "").await;
        round_trip("{\"k\":1}\n", "{\"k\":2}\n").await;
        round_trip("shared\n", "shared\nmore\n").await;
    }

    #[tokio::test]
    async fn missing_final_newline_round_trips() {
        round_trip("a\nb", "a\nb\n").await;
        round_trip("a\nb\n", "a\nb").await;
        round_trip("no newline", "still no newline").await;
    }

    #[tokio::test]
    async fn empty_patch_is_identity() {
        let engine = TextEngine::new();
        let dir = tempdir().unwrap();
        let old_path = write(dir.path(), "state.txt", "same\n").await;
        let new_path = write(dir.path(), "state.next.txt", "same\n").await;
        let patch_path = dir.path().join("state.patch");

        engine.diff(&old_path, &new_path, &patch_path).await.unwrap();
        assert!(fs::read_to_string(&patch_path).await.unwrap().is_empty());
        engine.patch(&patch_path, false, true).await.unwrap();
        assert_eq!(fs::read_to_string(&old_path).await.unwrap(), "same\n");
    }

    #[tokio::test]
    async fn combined_patches_apply_in_sequence() {
        let engine = TextEngine::new();
        let dir = tempdir().unwrap();
        let state = write(dir.path(), "state.txt", "one\n").await;

        // one -> two
        let next = write(dir.path(), "state.next.txt", "two\n").await;
        let p1 = dir.path().join("p1.patch");
        engine.diff(&state, &next, &p1).await.unwrap();

        // two -> three, diffed against a copy so `state.txt` stays "one".
        let two = write(dir.path(), "two.txt", "two\n").await;
        let three = write(dir.path(), "three.txt", "three\n").await;
        let p2 = dir.path().join("p2.patch");
        engine.diff(&two, &three, &p2).await.unwrap();
        // Rewrite headers so the second patch also targets state.txt.
        let rewritten = fs::read_to_string(&p2)
            .await
            .unwrap()
            .replace("two.txt", "state.txt")
            .replace("three.txt", "state.next.txt");
        fs::write(&p2, rewritten).await.unwrap();

        let folded = dir.path().join("folded.patch");
        engine.combine(&p1, &p2, &folded).await.unwrap();
        engine.patch(&folded, false, true).await.unwrap();
        assert_eq!(fs::read_to_string(&state).await.unwrap(), "three\n");
    }

    #[tokio::test]
    async fn corrupt_patch_is_rejected() {
        let engine = TextEngine::new();
        let dir = tempdir().unwrap();
        write(dir.path(), "state.txt", "a\nb\n").await;
        let patch_path = write(
            dir.path(),
            "state.patch",
            "--- state.txt\n+++ state.next.txt\n@@ -1,1 +1,1 @@\n-zzz\n+y\n",
        )
        .await;
        let err = engine.patch(&patch_path, false, true).await.unwrap_err();
        assert!(matches!(err, DiffError::MalformedPatch(_)));
    }

    #[tokio::test]
    async fn out_of_place_apply_leaves_target_untouched() {
        let engine = TextEngine::new();
        let dir = tempdir().unwrap();
        let old_path = write(dir.path(), "state.txt", "a\n").await;
        let new_path = write(dir.path(), "state.next.txt", "b\n").await;
        let patch_path = dir.path().join("state.patch");

        engine.diff(&old_path, &new_path, &patch_path).await.unwrap();
        engine.patch(&patch_path, false, false).await.unwrap();
        assert_eq!(fs::read_to_string(&old_path).await.unwrap(), "a\n");
        let out = PathBuf::from(format!("{}.out", patch_path.display()));
        assert_eq!(fs::read_to_string(&out).await.unwrap(), "b\n");
    }
}
