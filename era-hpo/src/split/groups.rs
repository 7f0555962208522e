//! First-occurrence group table.

use std::collections::HashMap;
use std::hash::Hash;
use std::ops::Range;

/// Sample indices grouped by label, in first-occurrence order.
#[derive(Debug, Clone)]
pub struct GroupIndex<G> {
    labels: Vec<G>,
    members: Vec<Vec<usize>>,
}

impl<G> GroupIndex<G>
where
    G: Eq + Hash + Clone,
{
    /// Build the table from a per-sample label sequence.
    pub fn build(groups: &[G]) -> Self {
        let mut positions: HashMap<&G, usize> = HashMap::new();
        let mut labels = Vec::new();
        let mut members: Vec<Vec<usize>> = Vec::new();

        for (idx, label) in groups.iter().enumerate() {
            let pos = *positions.entry(label).or_insert_with(|| {
                labels.push(label.clone());
                members.push(Vec::new());
                labels.len() - 1
            });
            members[pos].push(idx);
        }

        Self { labels, members }
    }
}

impl<G> GroupIndex<G> {
    /// Number of distinct groups.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Group labels in first-occurrence order.
    pub fn labels(&self) -> &[G] {
        &self.labels
    }

    /// Sample indices belonging to the group at `position`.
    pub fn indices(&self, position: usize) -> &[usize] {
        self.members.get(position).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of samples in each group, in group order.
    pub fn sizes(&self) -> Vec<usize> {
        self.members.iter().map(Vec::len).collect()
    }

    /// Sample indices for a contiguous range of group positions.
    pub fn gather(&self, positions: Range<usize>) -> Vec<usize> {
        let end = positions.end.min(self.members.len());
        let start = positions.start.min(end);
        let mut out = Vec::with_capacity(self.members[start..end].iter().map(Vec::len).sum());
        for group in &self.members[start..end] {
            out.extend_from_slice(group);
        }
        out
    }

    /// Labels whose samples do not form a single contiguous run.
    ///
    /// A non-empty result means the caller broke the ordering precondition:
    /// index order no longer matches group order.
    pub fn non_contiguous_groups(&self) -> Vec<&G> {
        self.labels
            .iter()
            .zip(&self.members)
            .filter(|(_, idx)| match (idx.first(), idx.last()) {
                (Some(first), Some(last)) => last - first + 1 != idx.len(),
                _ => false,
            })
            .map(|(label, _)| label)
            .collect()
    }

    pub(crate) fn into_members(self) -> Vec<Vec<usize>> {
        self.members
    }
}
