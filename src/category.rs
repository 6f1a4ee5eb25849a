//! Prefix-based grouping of option names.
//!
//! Each option belongs to the longest registered category that prefixes its
//! name. The empty category matches everything, so every option lands
//! somewhere once it is registered. Equal-length prefixes can only tie when
//! they are the same string; re-adding a category keeps its first position.

use std::collections::BTreeSet;

#[derive(Debug, Default)]
pub struct CategoryIndex {
    /// Category names in registration order.
    order: Vec<String>,
    /// Option names per category, parallel to `order`.
    members: Vec<Vec<String>>,
    dirty: bool,
}

impl CategoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_category(&mut self, name: &str) {
        let name = name.to_lowercase();
        if !self.order.contains(&name) {
            self.order.push(name);
            self.members.push(Vec::new());
        }
        self.dirty = true;
    }

    pub fn has_category(&self, name: &str) -> bool {
        self.order.iter().any(|c| *c == name.to_lowercase())
    }

    /// Flag the partition for recomputation on next read.
    pub fn invalidate(&mut self) {
        self.dirty = true;
    }

    /// Category an option name falls into, without touching the cache.
    pub fn resolve(&self, option_name: &str) -> Option<&str> {
        let mut best: Option<&str> = None;
        for category in &self.order {
            let longer = best.map_or(true, |b| category.len() > b.len());
            if longer && option_name.starts_with(category.as_str()) {
                best = Some(category);
            }
        }
        best
    }

    /// Recompute membership if anything changed since the last refresh.
    pub fn refresh<'a, I>(&mut self, option_names: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        if !self.dirty {
            return;
        }
        for members in &mut self.members {
            members.clear();
        }
        let sorted: BTreeSet<&String> = option_names.into_iter().collect();
        for name in sorted {
            if let Some(category) = self.resolve(name) {
                if let Some(idx) = self.order.iter().position(|c| c == category) {
                    self.members[idx].push(name.clone());
                }
            }
        }
        self.dirty = false;
    }

    /// Categories with their members, in registration order. Call
    /// [`refresh`](Self::refresh) first.
    pub fn partitions(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.order
            .iter()
            .zip(self.members.iter())
            .map(|(name, members)| (name.as_str(), members.as_slice()))
    }
}
