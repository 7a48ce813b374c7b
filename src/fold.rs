use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

fn heading_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\*+|#+)\s+(\S.*)$").expect("valid heading pattern"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub line: usize,
    pub level: usize,
    pub title: String,
}

pub fn has_headings(content: &str) -> bool {
    content.lines().any(|line| heading_pattern().is_match(line))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleLine {
    pub source: usize,
    pub folded: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Outline {
    headings: Vec<Heading>,
    folded: BTreeSet<usize>,
    total_lines: usize,
}

impl Outline {
    pub fn from_content(content: &str) -> Self {
        let mut headings = Vec::new();
        let mut total_lines = 0;
        for (idx, line) in content.lines().enumerate() {
            total_lines = idx + 1;
            if let Some(caps) = heading_pattern().captures(line) {
                headings.push(Heading {
                    line: idx,
                    level: caps[1].len(),
                    title: caps[2].trim_end().to_string(),
                });
            }
        }
        Self {
            headings,
            folded: BTreeSet::new(),
            total_lines,
        }
    }

    pub fn headings(&self) -> &[Heading] {
        &self.headings
    }

    pub fn is_empty(&self) -> bool {
        self.headings.is_empty()
    }

    fn body_range(&self, line: usize) -> Option<(usize, usize)> {
        let pos = self.headings.iter().position(|h| h.line == line)?;
        let level = self.headings[pos].level;
        let end = self.headings[pos + 1..]
            .iter()
            .find(|h| h.level <= level)
            .map(|h| h.line)
            .unwrap_or(self.total_lines);
        Some((line + 1, end))
    }

    pub fn toggle(&mut self, line: usize) -> bool {
        if self.body_range(line).is_none() {
            return false;
        }
        if !self.folded.remove(&line) {
            self.folded.insert(line);
        }
        true
    }

    pub fn fold_all(&mut self) {
        self.folded = self.headings.iter().map(|h| h.line).collect();
    }

    pub fn unfold_all(&mut self) {
        self.folded.clear();
    }

    pub fn any_folded(&self) -> bool {
        !self.folded.is_empty()
    }

    pub fn visible_lines(&self) -> Vec<VisibleLine> {
        let mut out = Vec::with_capacity(self.total_lines);
        let mut line = 0;
        while line < self.total_lines {
            let folded = self.folded.contains(&line);
            out.push(VisibleLine {
                source: line,
                folded,
            });
            line = match self.body_range(line) {
                Some((_, end)) if folded => end.max(line + 1),
                _ => line + 1,
            };
        }
        out
    }

    pub fn heading_at_or_above(&self, line: usize) -> Option<&Heading> {
        self.headings.iter().rev().find(|h| h.line <= line)
    }
}

#[cfg(test)]
mod tests {
    use super::{has_headings, Outline};
    use pretty_assertions::assert_eq;

    const DOC: &str = "\
intro
* One
body one
** One.a
deep
* Two
body two
";

    fn sources(outline: &Outline) -> Vec<usize> {
        outline.visible_lines().iter().map(|v| v.source).collect()
    }

    #[test]
    fn detects_org_and_markdown_headings() {
        assert!(has_headings("x\n# Title\n"));
        assert!(has_headings("** Sub"));
        assert!(!has_headings("*bold* text\n#hashtag"));
        let outline = Outline::from_content(DOC);
        let levels: Vec<_> = outline.headings().iter().map(|h| (h.line, h.level)).collect();
        assert_eq!(levels, vec![(1, 1), (3, 2), (5, 1)]);
        assert_eq!(outline.headings()[1].title, "One.a");
    }

    #[test]
    fn folding_hides_until_same_level() {
        let mut outline = Outline::from_content(DOC);
        assert_eq!(sources(&outline), vec![0, 1, 2, 3, 4, 5, 6]);
        assert!(outline.toggle(1));
        assert_eq!(sources(&outline), vec![0, 1, 5, 6]);
        assert!(outline.visible_lines()[1].folded);
        assert!(outline.toggle(1));
        assert!(outline.toggle(3));
        assert_eq!(sources(&outline), vec![0, 1, 2, 3, 5, 6]);
        assert!(!outline.toggle(0));
    }

    #[test]
    fn fold_all_and_unfold_all() {
        let mut outline = Outline::from_content(DOC);
        outline.fold_all();
        assert_eq!(sources(&outline), vec![0, 1, 5]);
        assert!(outline.any_folded());
        outline.unfold_all();
        assert_eq!(sources(&outline).len(), 7);
        assert_eq!(outline.heading_at_or_above(4).map(|h| h.line), Some(3));
        assert_eq!(outline.heading_at_or_above(0), None);
    }
}
