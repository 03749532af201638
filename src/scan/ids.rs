//! Line grammars shared by the document and code scanners, compiled once per
//! namespace.
use anyhow::{Context, Result};
use regex::Regex;

/// Regexes for one identifier namespace (`cpt` by default).
#[derive(Debug, Clone)]
pub struct Patterns {
    pub namespace: String,
    /// `` `<ns>-...` `` with an optional `:pN` phase suffix.
    pub backticked_id: Regex,
    /// `**ID**: `<id>`` with optional bullet, checkbox and priority prefix.
    pub definition: Regex,
    /// `<!-- <ns>:id:<kind> ... -->`.
    pub structured_marker: Regex,
    pub checkbox: Regex,
    pub priority: Regex,
    pub heading: Regex,
    /// `[@]<ns>-begin|end <id>:pN:inst-<inst>`.
    pub block_marker: Regex,
    /// `<ns>-<word> <id>:pN` for any word; begin/end are filtered by callers.
    pub scope_marker: Regex,
    pub exclude_begin: String,
    pub exclude_end: String,
}

impl Patterns {
    pub fn new(namespace: &str) -> Result<Self> {
        let ns = regex::escape(namespace);
        let id = format!(r"{ns}-[A-Za-z0-9_]+(?:-[A-Za-z0-9_]+)*");
        let compile = |pattern: String| {
            Regex::new(&pattern).with_context(|| format!("compile pattern {pattern:?}"))
        };
        Ok(Self {
            namespace: namespace.to_string(),
            backticked_id: compile(format!(r"`({id})(?::p(\d+))?`"))?,
            definition: compile(format!(
                r"^\s*(?:[-*+]\s+|\d+[.)]\s+)?(?:\[[ xX]\]\s*)?(?:`p\d+`\s*(?:-\s*)?)?\*\*ID(?:\*\*:|:\*\*)\s*`({id})`"
            ))?,
            structured_marker: compile(format!(r"<!--\s*{ns}:id:([A-Za-z0-9_-]+)[^>]*-->"))?,
            checkbox: compile(r"^\s*(?:[-*+]\s+|\d+[.)]\s+)?\[([ xX])\]".to_string())?,
            priority: compile(r"`p\d+`".to_string())?,
            heading: compile(r"^(#{1,6})\s+(.*?)\s*#*\s*$".to_string())?,
            block_marker: compile(format!(
                r"(?:^|[^A-Za-z0-9_-])(?:\[@\])?{ns}-(begin|end)[\s:]+({id}):p(\d+)(?::inst-([A-Za-z0-9_-]+))?"
            ))?,
            scope_marker: compile(format!(
                r"(?:^|[^A-Za-z0-9_-])(?:\[@\])?{ns}-([a-z]+)[\s:]+({id}):p\d+"
            ))?,
            exclude_begin: format!("!no-{namespace}-begin"),
            exclude_end: format!("!no-{namespace}-end"),
        })
    }
}

/// What an exclusion marker on a line did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionEvent {
    None,
    Begin,
    End,
    StrayEnd,
}

/// Nestable `!no-<ns>-begin` / `!no-<ns>-end` tracking. An unmatched begin
/// keeps everything after it excluded.
#[derive(Debug, Default)]
pub struct Exclusions {
    depth: usize,
}

impl Exclusions {
    /// Feed one line. Markers are applied in the order they appear, so a
    /// begin and end on the same line cancel out. Returns whether the line
    /// is excluded and the most notable marker event; marker lines are
    /// always excluded.
    pub fn observe(&mut self, line: &str, patterns: &Patterns) -> (bool, ExclusionEvent) {
        let mut markers: Vec<(usize, bool)> = line
            .match_indices(patterns.exclude_begin.as_str())
            .map(|(at, _)| (at, true))
            .chain(
                line.match_indices(patterns.exclude_end.as_str())
                    .map(|(at, _)| (at, false)),
            )
            .collect();
        if markers.is_empty() {
            return (self.depth > 0, ExclusionEvent::None);
        }
        markers.sort_unstable();
        let mut event = ExclusionEvent::None;
        for (_, begin) in markers {
            if begin {
                self.depth += 1;
                if event != ExclusionEvent::StrayEnd {
                    event = ExclusionEvent::Begin;
                }
            } else if self.depth == 0 {
                event = ExclusionEvent::StrayEnd;
            } else {
                self.depth -= 1;
                if event != ExclusionEvent::StrayEnd {
                    event = ExclusionEvent::End;
                }
            }
        }
        (true, event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_forms() {
        let patterns = Patterns::new("cpt").unwrap();
        for line in [
            "**ID**: `cpt-app-fr-login`",
            "- [x] `p1` - **ID**: `cpt-app-fr-login`",
            "* [ ] **ID:** `cpt-app-fr-login` trailing text",
            "1. **ID**: `cpt-app-fr-login`",
        ] {
            let caps = patterns.definition.captures(line);
            assert_eq!(
                caps.map(|caps| caps[1].to_string()).as_deref(),
                Some("cpt-app-fr-login"),
                "{line}"
            );
        }
        assert!(patterns.definition.captures("ID: `cpt-app-fr-login`").is_none());
    }

    #[test]
    fn block_markers_carry_phase_and_instruction() {
        let patterns = Patterns::new("cpt").unwrap();
        let caps = patterns
            .block_marker
            .captures("// [@]cpt-begin cpt-app-flow-login:p2:inst-check")
            .unwrap();
        assert_eq!(&caps[1], "begin");
        assert_eq!(&caps[2], "cpt-app-flow-login");
        assert_eq!(&caps[3], "2");
        assert_eq!(&caps[4], "check");
        assert!(patterns
            .block_marker
            .captures("// x-cpt-begin cpt-a:p1")
            .is_none());
    }

    #[test]
    fn exclusions_nest() {
        let patterns = Patterns::new("cpt").unwrap();
        let mut exclusions = Exclusions::default();
        let seen: Vec<_> = [
            "a",
            "<!-- !no-cpt-begin -->",
            "b",
            "!no-cpt-begin",
            "!no-cpt-end",
            "c",
            "!no-cpt-end",
            "d",
            "!no-cpt-end",
        ]
        .iter()
        .map(|line| exclusions.observe(line, &patterns))
        .collect();
        let excluded: Vec<bool> = seen.iter().map(|(excluded, _)| *excluded).collect();
        assert_eq!(
            excluded,
            vec![false, true, true, true, true, true, true, false, true]
        );
        assert_eq!(seen[8].1, ExclusionEvent::StrayEnd);
    }

    #[test]
    fn begin_and_end_on_one_line_close_the_region() {
        let patterns = Patterns::new("cpt").unwrap();
        let mut exclusions = Exclusions::default();
        let inline = exclusions.observe(
            "Skip <!-- !no-cpt-begin --> `cpt-x-fr-ghost` <!-- !no-cpt-end -->",
            &patterns,
        );
        assert_eq!(inline, (true, ExclusionEvent::End));
        assert_eq!(exclusions.observe("after", &patterns), (false, ExclusionEvent::None));

        let reopened = exclusions.observe("!no-cpt-end then !no-cpt-begin", &patterns);
        assert_eq!(reopened, (true, ExclusionEvent::StrayEnd));
        assert!(exclusions.observe("still hidden", &patterns).0);
    }
}
