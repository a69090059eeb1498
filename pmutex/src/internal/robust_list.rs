// Copyright 2024 tison <wander4096@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use slab::Slab;

/// A guarded doubly-linked list of robust nodes.
///
/// * `guard`'s `next` points to the first node (regular head).
/// * `guard`'s `prev` points to the last node (regular tail).
///
/// Every non-guard node always holds `Some(item)`.
#[derive(Debug)]
pub(crate) struct RobustList<T> {
    guard: usize,
    nodes: Slab<Node<T>>,
}

#[derive(Debug)]
struct Node<T> {
    prev: usize,
    next: usize,
    item: Option<T>,
}

impl<T> RobustList<T> {
    pub(crate) fn new() -> Self {
        let mut nodes = Slab::new();
        let first = nodes.vacant_entry();
        let guard = first.key();
        first.insert(Node {
            prev: guard,
            next: guard,
            item: None,
        });
        Self { guard, nodes }
    }

    /// Links `item` at the tail of the list and returns its key.
    pub(crate) fn push_back(&mut self, item: T) -> usize {
        let prev_tail = self.nodes[self.guard].prev;
        let new_key = self.nodes.insert(Node {
            prev: prev_tail,
            next: self.guard,
            item: Some(item),
        });
        self.nodes[self.guard].prev = new_key;
        self.nodes[prev_tail].next = new_key;
        new_key
    }

    /// Unlinks the node at `key` if `f` accepts its item.
    ///
    /// Returns the unlinked item, or `None` if `key` is vacant or `f` declined.
    pub(crate) fn remove_if(&mut self, key: usize, f: impl FnOnce(&T) -> bool) -> Option<T> {
        if key == self.guard {
            return None;
        }
        match self.nodes.get(key).and_then(|node| node.item.as_ref()) {
            Some(item) if f(item) => {}
            _ => return None,
        }

        let node = self.nodes.remove(key);
        self.nodes[node.prev].next = node.next;
        self.nodes[node.next].prev = node.prev;
        node.item
    }

    pub(crate) fn get_mut(&mut self, key: usize) -> Option<&mut T> {
        if key == self.guard {
            return None;
        }
        self.nodes.get_mut(key).and_then(|node| node.item.as_mut())
    }

    /// Visits every item from head to tail.
    pub(crate) fn for_each(&self, mut f: impl FnMut(&T)) {
        let mut key = self.nodes[self.guard].next;
        while key != self.guard {
            let node = &self.nodes[key];
            if let Some(item) = node.item.as_ref() {
                f(item);
            }
            key = node.next;
        }
    }

    /// Unlinks every node, leaving only the guard.
    pub(crate) fn clear(&mut self) -> usize {
        let n = self.len();
        self.nodes.retain(|_, node| node.item.is_none());
        let guard = self.guard;
        self.nodes[guard].prev = guard;
        self.nodes[guard].next = guard;
        n
    }

    /// Returns the number of linked nodes.
    pub(crate) fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Returns `true` if no node is linked.
    pub(crate) fn is_empty(&self) -> bool {
        self.nodes[self.guard].next == self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(list: &RobustList<u32>) -> Vec<u32> {
        let mut items = vec![];
        list.for_each(|item| items.push(*item));
        items
    }

    #[test]
    fn test_push_and_remove() {
        let mut list = RobustList::new();
        assert!(list.is_empty());

        let a = list.push_back(1);
        let b = list.push_back(2);
        let c = list.push_back(3);
        assert_eq!(list.len(), 3);
        assert_eq!(collect(&list), vec![1, 2, 3]);

        assert_eq!(list.remove_if(b, |_| true), Some(2));
        assert_eq!(collect(&list), vec![1, 3]);

        assert_eq!(list.remove_if(a, |_| true), Some(1));
        assert_eq!(list.remove_if(c, |_| true), Some(3));
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn test_remove_declined_or_vacant() {
        let mut list = RobustList::new();
        let a = list.push_back(7);

        assert_eq!(list.remove_if(a, |v| *v == 8), None);
        assert_eq!(list.len(), 1);

        assert_eq!(list.remove_if(a, |v| *v == 7), Some(7));
        assert_eq!(list.remove_if(a, |_| true), None);
        assert_eq!(list.remove_if(a + 100, |_| true), None);
    }

    #[test]
    fn test_clear_then_reuse() {
        let mut list = RobustList::new();
        for i in 0..4 {
            list.push_back(i);
        }
        assert_eq!(list.clear(), 4);
        assert!(list.is_empty());

        list.push_back(9);
        assert_eq!(collect(&list), vec![9]);
    }
}
