// file: labels.rs
// desc: classifier output index <-> character table

use std::collections::HashMap;

/// Ordered label set of a loaded classifier. Index `i` of the model output
/// is the probability of `vocabulary.get(i)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelVocabulary {
    labels: Vec<char>,
    index: HashMap<char, usize>,
}

impl LabelVocabulary {
    pub fn new(labels: Vec<char>) -> Self {
        let mut index = HashMap::with_capacity(labels.len());
        for (i, &c) in labels.iter().enumerate() {
            index.entry(c).or_insert(i);
        }
        Self { labels, index }
    }

    /// One label per line; blank lines are skipped and only the first
    /// character of a line is used.
    pub fn from_lines(text: &str) -> Self {
        Self::new(
            text.lines()
                .filter_map(|line| line.trim().chars().next())
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<char> {
        self.labels.get(index).copied()
    }

    pub fn index_of(&self, c: char) -> Option<usize> {
        self.index.get(&c).copied()
    }

    pub fn contains(&self, c: char) -> bool {
        self.index.contains_key(&c)
    }

    pub fn iter(&self) -> impl Iterator<Item = char> + '_ {
        self.labels.iter().copied()
    }
}

impl FromIterator<char> for LabelVocabulary {
    fn from_iter<I: IntoIterator<Item = char>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
