#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate<A> {
    pub key: String,
    pub label: String,
    pub description: String,
    pub action: A,
}

fn matches_query(key: &str, needle: &str) -> bool {
    needle.is_empty() || key.to_lowercase().contains(needle)
}

#[derive(Debug, Clone)]
pub struct Completion<A> {
    candidates: Vec<Candidate<A>>,
    query: String,
    matches: Vec<usize>,
    selected: usize,
}

impl<A: Clone> Completion<A> {
    pub fn new(candidates: Vec<Candidate<A>>) -> Self {
        let mut completion = Self {
            candidates,
            query: String::new(),
            matches: Vec::new(),
            selected: 0,
        };
        completion.refilter();
        completion
    }

    pub fn replace_candidates(&mut self, candidates: Vec<Candidate<A>>) {
        self.candidates = candidates;
        self.refilter();
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, query: &str) {
        self.query = query.to_string();
        self.refilter();
    }

    pub fn push_char(&mut self, c: char) {
        self.query.push(c);
        self.refilter();
    }

    pub fn pop_char(&mut self) {
        self.query.pop();
        self.refilter();
    }

    fn refilter(&mut self) {
        let needle = self.query.to_lowercase();
        self.matches = self
            .candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| matches_query(&c.key, &needle))
            .map(|(idx, _)| idx)
            .collect();
        self.selected = 0;
    }

    pub fn matches(&self) -> impl Iterator<Item = &Candidate<A>> + '_ {
        self.matches.iter().map(|&idx| &self.candidates[idx])
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected(&self) -> Option<&Candidate<A>> {
        self.matches
            .get(self.selected)
            .map(|&idx| &self.candidates[idx])
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.matches.len() {
            self.selected += 1;
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn complete(&mut self) {
        let Some(key) = self.selected().map(|c| c.key.clone()) else {
            return;
        };
        let current = self.matches.get(self.selected).copied();
        self.set_query(&key);
        if let Some(current) = current {
            if let Some(pos) = self.matches.iter().position(|&idx| idx == current) {
                self.selected = pos;
            }
        }
    }

    pub fn commit(&self) -> Option<A> {
        self.selected().map(|c| c.action.clone())
    }
}
