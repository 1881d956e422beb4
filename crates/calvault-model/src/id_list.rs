use calvault_types::EntityId;
use serde::{Deserialize, Serialize};

/// Ordered event membership of a container (a group or the trash).
///
/// Stored in the container's front file as a plain array of ids. An id
/// appears at most once.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdList(Vec<EntityId>);

impl IdList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.0.contains(&id)
    }

    /// Add `id` at the end, or at the front when `at_beginning` is set.
    /// Returns `false` if it was already a member.
    pub fn add(&mut self, id: EntityId, at_beginning: bool) -> bool {
        if self.contains(id) {
            return false;
        }
        if at_beginning {
            self.0.insert(0, id);
        } else {
            self.0.push(id);
        }
        true
    }

    /// Returns `true` if `id` was a member.
    pub fn remove(&mut self, id: EntityId) -> bool {
        let before = self.0.len();
        self.0.retain(|member| *member != id);
        self.0.len() != before
    }

    /// Drop every member and return them in order.
    pub fn take(&mut self) -> Vec<EntityId> {
        std::mem::take(&mut self.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[EntityId] {
        &self.0
    }
}

impl FromIterator<EntityId> for IdList {
    fn from_iter<I: IntoIterator<Item = EntityId>>(iter: I) -> Self {
        let mut list = Self::new();
        for id in iter {
            list.add(id, false);
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &IdList) -> Vec<i64> {
        list.iter().map(|id| id.get()).collect()
    }

    #[test]
    fn add_respects_position_and_uniqueness() {
        let mut list = IdList::new();
        assert!(list.add(EntityId::new(1), false));
        assert!(list.add(EntityId::new(2), false));
        assert!(list.add(EntityId::new(3), true));
        assert!(!list.add(EntityId::new(2), true));
        assert_eq!(ids(&list), vec![3, 1, 2]);
    }

    #[test]
    fn remove_and_take() {
        let mut list: IdList = [1, 2, 3].into_iter().map(EntityId::new).collect();
        assert!(list.remove(EntityId::new(2)));
        assert!(!list.remove(EntityId::new(2)));
        assert_eq!(list.take(), vec![EntityId::new(1), EntityId::new(3)]);
        assert!(list.is_empty());
    }

    #[test]
    fn serializes_as_plain_array() {
        let list: IdList = [4, 9].into_iter().map(EntityId::new).collect();
        assert_eq!(serde_json::to_string(&list).unwrap(), "[4,9]");
    }
}
