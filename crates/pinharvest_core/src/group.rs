use std::fmt;

/// Key of a work group: the search prompt that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("group key must contain non-whitespace text")]
pub struct InvalidGroupKey;

impl GroupKey {
    pub fn new(prompt: impl Into<String>) -> Result<Self, InvalidGroupKey> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(InvalidGroupKey);
        }
        Ok(Self(prompt))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for GroupKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Ordered mapping `group key -> ordered units`.
///
/// Groups keep the order they were inserted in, and each group keeps the
/// order of its own units. Re-inserting an existing key replaces its units
/// in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkGroups<T> {
    entries: Vec<(GroupKey, Vec<T>)>,
}

impl<T> Default for WorkGroups<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> WorkGroups<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: GroupKey, units: Vec<T>) {
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = units,
            None => self.entries.push((key, units)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&[T]> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.as_str() == key)
            .map(|(_, units)| units.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of units across every group.
    pub fn total_units(&self) -> usize {
        self.entries.iter().map(|(_, units)| units.len()).sum()
    }

    pub fn keys(&self) -> impl Iterator<Item = &GroupKey> {
        self.entries.iter().map(|(key, _)| key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GroupKey, &[T])> {
        self.entries
            .iter()
            .map(|(key, units)| (key, units.as_slice()))
    }

    /// Reorders groups to follow `order`; keys absent from `order` keep their
    /// relative position after the ordered ones.
    pub fn sort_by_key_order(&mut self, order: &[GroupKey]) {
        let position = |key: &GroupKey| order.iter().position(|k| k == key).unwrap_or(usize::MAX);
        self.entries.sort_by_key(|(key, _)| position(key));
    }
}

impl<T> IntoIterator for WorkGroups<T> {
    type Item = (GroupKey, Vec<T>);
    type IntoIter = std::vec::IntoIter<(GroupKey, Vec<T>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<T> FromIterator<(GroupKey, Vec<T>)> for WorkGroups<T> {
    fn from_iter<I: IntoIterator<Item = (GroupKey, Vec<T>)>>(iter: I) -> Self {
        let mut groups = WorkGroups::new();
        for (key, units) in iter {
            groups.insert(key, units);
        }
        groups
    }
}
