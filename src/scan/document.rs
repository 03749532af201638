//! Markdown artifact scanner.
//!
//! One pass per file: fenced blocks and exclusion regions are skipped, a
//! heading stack gives every record its enclosing heading path, and each line
//! yields at most one definition plus any number of references.
use super::ids::{ExclusionEvent, Exclusions, Patterns};
use super::{Definition, FileScan, Reference};

#[derive(Debug, Default)]
struct HeadingStack {
    entries: Vec<(usize, String)>,
}

impl HeadingStack {
    fn push(&mut self, level: usize, title: &str) {
        while self
            .entries
            .last()
            .is_some_and(|(top, _)| *top >= level)
        {
            self.entries.pop();
        }
        self.entries.push((level, title.to_string()));
    }

    fn path(&self) -> Vec<String> {
        self.entries.iter().map(|(_, title)| title.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct LineFlags {
    has_task: bool,
    done: bool,
    has_priority: bool,
}

/// Scan one markdown file. `kind` is the artifact kind recorded on references.
pub fn scan_document(path: &str, kind: &str, text: &str, patterns: &Patterns) -> FileScan {
    let mut scan = FileScan::new(path);
    let mut headings = HeadingStack::default();
    let mut exclusions = Exclusions::default();
    let mut fence: Option<String> = None;
    // Kind declared by a structured marker on the previous non-blank line.
    let mut pending_kind: Option<String> = None;

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        let (excluded, event) = exclusions.observe(line, patterns);
        if event == ExclusionEvent::StrayEnd {
            tracing::debug!(path, line = line_no, "exclusion end without begin");
        }
        if excluded {
            pending_kind = None;
            continue;
        }

        let trimmed = line.trim_start();
        if let Some(open) = &fence {
            if trimmed.starts_with(open.as_str()) {
                fence = None;
            }
            continue;
        }
        if let Some(marker) = fence_marker(trimmed) {
            fence = Some(marker);
            continue;
        }
        if trimmed.is_empty() {
            continue;
        }
        if let Some(caps) = patterns.heading.captures(line) {
            headings.push(caps[1].len(), caps[2].trim());
            pending_kind = None;
            let heading_path = headings.path();
            let site = Site {
                path,
                line: line_no,
                from_kind: kind,
                heading_path: &heading_path,
                flags: LineFlags::default(),
            };
            push_references(&mut scan, line, &site, None, patterns);
            continue;
        }

        let marker_kind = patterns
            .structured_marker
            .captures(line)
            .map(|caps| caps[1].to_ascii_lowercase());
        let explicit_kind = marker_kind.clone().or_else(|| pending_kind.take());
        let flags = line_flags(line, patterns);
        let heading_path = headings.path();

        let mut defined: Option<(usize, usize)> = None;
        if let Some(kind) = &explicit_kind {
            if let Some(id) = patterns.backticked_id.captures(line).and_then(|caps| caps.get(1)) {
                scan.definitions.push(definition(
                    path,
                    line_no,
                    id.as_str(),
                    Some(kind.clone()),
                    &heading_path,
                    flags,
                ));
                defined = Some((id.start(), id.end()));
            }
        }
        if defined.is_none() {
            if let Some(id) = patterns.definition.captures(line).and_then(|caps| caps.get(1)) {
                scan.definitions.push(definition(
                    path,
                    line_no,
                    id.as_str(),
                    None,
                    &heading_path,
                    flags,
                ));
                defined = Some((id.start(), id.end()));
            }
        }
        // A marker alone on its line applies to the next non-blank line.
        if defined.is_none() && marker_kind.is_some() {
            pending_kind = marker_kind;
        }

        let site = Site {
            path,
            line: line_no,
            from_kind: kind,
            heading_path: &heading_path,
            flags,
        };
        push_references(&mut scan, line, &site, defined, patterns);
    }
    scan
}

/// Where the references on one line were found.
struct Site<'a> {
    path: &'a str,
    line: usize,
    from_kind: &'a str,
    heading_path: &'a [String],
    flags: LineFlags,
}

/// Every backticked identifier on the line except the span `defined`.
fn push_references(
    scan: &mut FileScan,
    line: &str,
    site: &Site<'_>,
    defined: Option<(usize, usize)>,
    patterns: &Patterns,
) {
    for caps in patterns.backticked_id.captures_iter(line) {
        let Some(id) = caps.get(1) else { continue };
        if defined == Some((id.start(), id.end())) {
            continue;
        }
        scan.references.push(Reference {
            id: id.as_str().to_string(),
            path: site.path.to_string(),
            line: site.line,
            from_kind: site.from_kind.to_string(),
            heading_path: site.heading_path.to_vec(),
            has_task: site.flags.has_task,
            has_priority: site.flags.has_priority,
            done: site.flags.done,
            phase: caps.get(2).and_then(|phase| phase.as_str().parse().ok()),
            instruction: None,
        });
    }
}

fn definition(
    path: &str,
    line: usize,
    id: &str,
    kind: Option<String>,
    heading_path: &[String],
    flags: LineFlags,
) -> Definition {
    Definition {
        id: id.to_string(),
        explicit_kind: kind,
        path: path.to_string(),
        line,
        heading_path: heading_path.to_vec(),
        has_task: flags.has_task,
        done: flags.done,
        has_priority: flags.has_priority,
    }
}

fn line_flags(line: &str, patterns: &Patterns) -> LineFlags {
    let checkbox = patterns
        .checkbox
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|mark| mark.as_str().eq_ignore_ascii_case("x"));
    LineFlags {
        has_task: checkbox.is_some(),
        done: checkbox.unwrap_or(false),
        has_priority: patterns.priority.is_match(line),
    }
}

fn fence_marker(trimmed: &str) -> Option<String> {
    for token in ["```", "~~~"] {
        if trimmed.starts_with(token) {
            let run = trimmed
                .chars()
                .take_while(|ch| Some(*ch) == token.chars().next())
                .count();
            return Some(token.chars().take(1).collect::<String>().repeat(run));
        }
    }
    None
}

#[cfg(test)]
#[path = "document_tests.rs"]
mod tests;
