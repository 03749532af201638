//! Code traceability scanner: paired `[@]<ns>-begin` / `[@]<ns>-end` markers
//! inside comments.
use super::ids::{ExclusionEvent, Exclusions, Patterns};
use super::{FileScan, Reference, CODE_KIND};
use crate::registry::{BlockComment, CodebaseEntry};
use crate::report::{codes, Issue};
use std::collections::BTreeMap;

/// Comment syntax used to decide whether a marker sits inside a comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentSyntax {
    pub line: Vec<String>,
    pub block: Vec<BlockComment>,
}

impl CommentSyntax {
    /// Defaults by file extension, with per-entry overrides.
    pub fn for_file(extension: &str, entry: Option<&CodebaseEntry>) -> Self {
        let (line, block) = default_syntax(&extension.to_ascii_lowercase());
        let mut syntax = Self {
            line: line.iter().map(|prefix| prefix.to_string()).collect(),
            block: block
                .iter()
                .map(|(start, end)| BlockComment {
                    start: start.to_string(),
                    end: end.to_string(),
                })
                .collect(),
        };
        if let Some(entry) = entry {
            if let Some(line) = &entry.single_line_comments {
                syntax.line = line.clone();
            }
            if let Some(block) = &entry.multi_line_comments {
                syntax.block = block.clone();
            }
        }
        syntax
    }
}

type DefaultSyntax = (&'static [&'static str], &'static [(&'static str, &'static str)]);

fn default_syntax(extension: &str) -> DefaultSyntax {
    const C_BLOCK: &[(&str, &str)] = &[("/*", "*/")];
    match extension {
        "rs" | "c" | "h" | "cc" | "cpp" | "hpp" | "cs" | "java" | "js" | "jsx" | "mjs" | "ts"
        | "tsx" | "go" | "kt" | "kts" | "swift" | "scala" | "dart" | "php" | "proto" => {
            (&["//"], C_BLOCK)
        }
        "py" => (&["#"], &[("\"\"\"", "\"\"\""), ("'''", "'''")]),
        "sh" | "bash" | "zsh" | "rb" | "pl" | "r" | "yaml" | "yml" | "toml" | "cfg" | "ini"
        | "mk" | "cmake" | "dockerfile" => (&["#"], &[]),
        "sql" | "lua" | "hs" => (&["--"], &[("/*", "*/")]),
        "html" | "htm" | "xml" | "vue" | "svelte" | "md" => (&[], &[("<!--", "-->")]),
        "css" | "scss" | "less" => (&["//"], C_BLOCK),
        _ => (&["//", "#"], C_BLOCK),
    }
}

/// Tracks block-comment state across lines.
#[derive(Debug, Default)]
struct CommentState {
    open_block: Option<usize>,
}

impl CommentState {
    /// The comment portion of `line`, if any; updates block state.
    fn comment_text(&mut self, line: &str, syntax: &CommentSyntax) -> Option<String> {
        let mut out = String::new();
        let mut rest = line;
        loop {
            if let Some(index) = self.open_block {
                let end = &syntax.block[index].end;
                match rest.find(end.as_str()) {
                    Some(pos) => {
                        out.push_str(&rest[..pos]);
                        rest = &rest[pos + end.len()..];
                        self.open_block = None;
                    }
                    None => {
                        out.push_str(rest);
                        return Some(out);
                    }
                }
                continue;
            }
            let line_start = syntax
                .line
                .iter()
                .filter_map(|prefix| rest.find(prefix.as_str()).map(|pos| (pos, prefix.len())))
                .min();
            let block_start = syntax
                .block
                .iter()
                .enumerate()
                .filter_map(|(index, block)| {
                    rest.find(block.start.as_str())
                        .map(|pos| (pos, index, block.start.len()))
                })
                .min();
            match (line_start, block_start) {
                (Some((pos, len)), block) if !matches!(block, Some((bpos, _, _)) if bpos < pos) => {
                    out.push_str(&rest[pos + len..]);
                    return Some(out);
                }
                (_, Some((pos, index, len))) => {
                    self.open_block = Some(index);
                    rest = &rest[pos + len..];
                }
                (_, None) => return (!out.is_empty()).then_some(out),
            }
        }
    }
}

#[derive(Debug)]
struct OpenBlock {
    line: usize,
    has_code: bool,
}

/// Scan one source file for traceability markers.
pub fn scan_code(path: &str, text: &str, syntax: &CommentSyntax, patterns: &Patterns) -> FileScan {
    let mut scan = FileScan::new(path);
    let mut exclusions = Exclusions::default();
    let mut comments = CommentState::default();
    let mut open: BTreeMap<(String, u32, Option<String>), OpenBlock> = BTreeMap::new();

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        let was_in_block = comments.open_block.is_some();
        let comment = comments.comment_text(line, syntax);
        let (excluded, event) = exclusions.observe(line, patterns);
        if event == ExclusionEvent::StrayEnd {
            tracing::debug!(path, line = line_no, "exclusion end without begin");
        }
        if excluded {
            continue;
        }

        let mut is_marker = false;
        if let Some(comment) = comment.as_deref() {
            for caps in patterns.block_marker.captures_iter(comment) {
                is_marker = true;
                let id = caps[2].to_string();
                let phase: u32 = caps[3].parse().unwrap_or(0);
                let instruction = caps.get(4).map(|inst| inst.as_str().to_string());
                let tag = describe(&id, phase, instruction.as_deref());
                let key = (id.clone(), phase, instruction.clone());
                if &caps[1] == "begin" {
                    if open.contains_key(&key) {
                        scan.issues.push(
                            Issue::error(
                                codes::MARKER_DUPLICATE,
                                format!("{tag} is already open"),
                            )
                            .at(path, Some(line_no))
                            .for_id(id),
                        );
                        continue;
                    }
                    open.insert(
                        key,
                        OpenBlock {
                            line: line_no,
                            has_code: false,
                        },
                    );
                    continue;
                }
                let Some(block) = open.remove(&key) else {
                    scan.issues.push(
                        Issue::error(
                            codes::MARKER_UNBALANCED,
                            format!("end marker for {tag} has no matching begin"),
                        )
                        .at(path, Some(line_no))
                        .for_id(id),
                    );
                    continue;
                };
                if !block.has_code {
                    scan.issues.push(
                        Issue::error(
                            codes::MARKER_EMPTY_BLOCK,
                            format!("{tag} wraps no code"),
                        )
                        .at(path, Some(block.line))
                        .for_id(id.clone()),
                    );
                }
                scan.references.push(Reference {
                    id,
                    path: path.to_string(),
                    line: block.line,
                    from_kind: CODE_KIND.to_string(),
                    heading_path: Vec::new(),
                    has_task: false,
                    has_priority: false,
                    done: false,
                    phase: Some(phase),
                    instruction,
                });
            }
            for caps in patterns.scope_marker.captures_iter(comment) {
                if matches!(&caps[1], "begin" | "end") {
                    continue;
                }
                is_marker = true;
                scan.issues.push(
                    Issue::error(
                        codes::MARKER_SINGLE_LINE,
                        format!(
                            "single-line marker {}-{} is not supported; wrap the code in begin/end markers",
                            patterns.namespace,
                            &caps[1]
                        ),
                    )
                    .at(path, Some(line_no))
                    .for_id(caps[2].to_string()),
                );
            }
        }

        // Whole-line comments do not count as code; trailing comments do.
        let is_code = !is_marker
            && !line.trim().is_empty()
            && !(was_in_block || is_comment_only(line, syntax));
        if is_code {
            for block in open.values_mut() {
                block.has_code = true;
            }
        }
    }

    for ((id, phase, instruction), block) in open {
        scan.issues.push(
            Issue::error(
                codes::MARKER_UNBALANCED,
                format!(
                    "begin marker for {} has no matching end",
                    describe(&id, phase, instruction.as_deref())
                ),
            )
            .at(path, Some(block.line))
            .for_id(id),
        );
    }
    scan.references.sort_by(|a, b| a.line.cmp(&b.line));
    scan
}

fn is_comment_only(line: &str, syntax: &CommentSyntax) -> bool {
    let trimmed = line.trim_start();
    syntax.line.iter().any(|prefix| trimmed.starts_with(prefix.as_str()))
        || syntax
            .block
            .iter()
            .any(|block| trimmed.starts_with(block.start.as_str()))
}

fn describe(id: &str, phase: u32, instruction: Option<&str>) -> String {
    match instruction {
        Some(inst) => format!("{id}:p{phase}:inst-{inst}"),
        None => format!("{id}:p{phase}"),
    }
}

#[cfg(test)]
#[path = "code_tests.rs"]
mod tests;
