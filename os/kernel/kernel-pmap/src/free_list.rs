//! # Intrusive free list
//!
//! A doubly linked list threaded through the `prev`/`next` fields of the
//! [`PageInfo`] arena. The list itself only stores head, tail and length;
//! every operation borrows the arena it links.
//!
//! All operations are O(1) except [`FreeList::split_off`], which walks to
//! the split point.

use crate::page_info::{PageId, PageInfo};

/// Head of a list of free page descriptors.
#[derive(Debug, Default, Eq, PartialEq)]
pub struct FreeList {
    head: Option<PageId>,
    tail: Option<PageId>,
    len: usize,
}

impl FreeList {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    #[must_use]
    pub const fn first(&self) -> Option<PageId> {
        self.head
    }

    fn link(pages: &mut [PageInfo], id: PageId) -> &mut PageInfo {
        let info = &mut pages[id.index()];
        assert!(!info.on_free_list, "{id} inserted into the free list twice");
        info.on_free_list = true;
        info
    }

    /// Insert `id` at the head.
    ///
    /// ### Panics
    /// If `id` is already on a list.
    pub fn push_front(&mut self, pages: &mut [PageInfo], id: PageId) {
        let old = self.head;
        let info = Self::link(pages, id);
        info.prev = None;
        info.next = old;
        match old {
            Some(old) => pages[old.index()].prev = Some(id),
            None => self.tail = Some(id),
        }
        self.head = Some(id);
        self.len += 1;
    }

    /// Insert `id` at the tail.
    ///
    /// ### Panics
    /// If `id` is already on a list.
    pub fn push_back(&mut self, pages: &mut [PageInfo], id: PageId) {
        let old = self.tail;
        let info = Self::link(pages, id);
        info.prev = old;
        info.next = None;
        match old {
            Some(old) => pages[old.index()].next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.len += 1;
    }

    /// Insert `id` directly after `at`, which must be on this list.
    pub fn insert_after(&mut self, pages: &mut [PageInfo], at: PageId, id: PageId) {
        debug_assert!(pages[at.index()].on_free_list);
        let next = pages[at.index()].next;
        let info = Self::link(pages, id);
        info.prev = Some(at);
        info.next = next;
        pages[at.index()].next = Some(id);
        match next {
            Some(next) => pages[next.index()].prev = Some(id),
            None => self.tail = Some(id),
        }
        self.len += 1;
    }

    /// Unlink `id`, which must be on this list.
    pub fn remove(&mut self, pages: &mut [PageInfo], id: PageId) {
        let info = &mut pages[id.index()];
        assert!(info.on_free_list, "{id} is not on the free list");
        let (prev, next) = (info.prev.take(), info.next.take());
        info.on_free_list = false;
        match prev {
            Some(prev) => pages[prev.index()].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => pages[next.index()].prev = prev,
            None => self.tail = prev,
        }
        self.len -= 1;
    }

    /// Take the head.
    pub fn pop_front(&mut self, pages: &mut [PageInfo]) -> Option<PageId> {
        let id = self.head?;
        self.remove(pages, id);
        Some(id)
    }

    /// Keep the first `keep` entries and return the rest as a new list.
    pub fn split_off(&mut self, pages: &mut [PageInfo], keep: usize) -> Self {
        if keep >= self.len {
            return Self::new();
        }
        if keep == 0 {
            return core::mem::take(self);
        }

        let mut last = self.head;
        for _ in 1..keep {
            last = last.and_then(|id| pages[id.index()].next);
        }
        let Some(last) = last else {
            unreachable!("list shorter than its length");
        };

        let rest_head = pages[last.index()].next.take();
        let rest = Self {
            head: rest_head,
            tail: self.tail,
            len: self.len - keep,
        };
        if let Some(h) = rest_head {
            pages[h.index()].prev = None;
        }
        self.tail = Some(last);
        self.len = keep;
        rest
    }

    /// Move every entry of `other` to the tail of this list.
    pub fn append(&mut self, pages: &mut [PageInfo], mut other: Self) {
        let (Some(head), Some(tail)) = (other.head.take(), other.tail.take()) else {
            return;
        };
        match self.tail {
            Some(t) => {
                pages[t.index()].next = Some(head);
                pages[head.index()].prev = Some(t);
            }
            None => self.head = Some(head),
        }
        self.tail = Some(tail);
        self.len += other.len;
    }

    /// Iterate from head to tail.
    pub fn iter<'p>(&self, pages: &'p [PageInfo]) -> impl Iterator<Item = PageId> + use<'p> {
        let mut cursor = self.head;
        core::iter::from_fn(move || {
            let id = cursor?;
            cursor = pages[id.index()].next;
            Some(id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena(n: usize) -> Vec<PageInfo> {
        vec![PageInfo::default(); n]
    }

    fn ids(list: &FreeList, pages: &[PageInfo]) -> Vec<usize> {
        list.iter(pages).map(PageId::index).collect()
    }

    #[test]
    fn insert_tail_keeps_order() {
        let mut pages = arena(10);
        let mut list = FreeList::new();
        for i in 0..10 {
            list.push_back(&mut pages, PageId::from_index(i));
        }
        assert_eq!(ids(&list, &pages), (0..10).collect::<Vec<_>>());
        assert_eq!(list.len(), 10);
    }

    #[test]
    fn insert_after_links_both_neighbours() {
        let mut pages = arena(21);
        let mut list = FreeList::new();
        for i in 0..10 {
            list.push_back(&mut pages, PageId::from_index(i));
        }
        list.insert_after(&mut pages, PageId::from_index(4), PageId::from_index(20));
        assert_eq!(ids(&list, &pages), [0, 1, 2, 3, 4, 20, 5, 6, 7, 8, 9]);
        assert_eq!(pages[5].prev, Some(PageId::from_index(20)));
    }

    #[test]
    fn push_front_is_lifo() {
        let mut pages = arena(3);
        let mut list = FreeList::new();
        for i in 0..3 {
            list.push_front(&mut pages, PageId::from_index(i));
        }
        assert_eq!(list.pop_front(&mut pages), Some(PageId::from_index(2)));
        assert_eq!(list.pop_front(&mut pages), Some(PageId::from_index(1)));
        assert_eq!(list.pop_front(&mut pages), Some(PageId::from_index(0)));
        assert_eq!(list.pop_front(&mut pages), None);
        assert!(list.is_empty());
    }

    #[test]
    fn remove_from_the_middle() {
        let mut pages = arena(5);
        let mut list = FreeList::new();
        for i in 0..5 {
            list.push_back(&mut pages, PageId::from_index(i));
        }
        list.remove(&mut pages, PageId::from_index(2));
        list.remove(&mut pages, PageId::from_index(4));
        assert_eq!(ids(&list, &pages), [0, 1, 3]);
        assert!(!pages[2].is_free());
        list.push_back(&mut pages, PageId::from_index(4));
        assert_eq!(ids(&list, &pages), [0, 1, 3, 4]);
    }

    #[test]
    fn split_then_append_restores_the_list() {
        let mut pages = arena(8);
        let mut list = FreeList::new();
        for i in 0..8 {
            list.push_back(&mut pages, PageId::from_index(i));
        }

        let rest = list.split_off(&mut pages, 3);
        assert_eq!(ids(&list, &pages), [0, 1, 2]);
        assert_eq!(ids(&rest, &pages), [3, 4, 5, 6, 7]);
        assert_eq!(rest.len(), 5);

        list.append(&mut pages, rest);
        assert_eq!(ids(&list, &pages), (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn split_at_zero_takes_everything() {
        let mut pages = arena(3);
        let mut list = FreeList::new();
        for i in 0..3 {
            list.push_back(&mut pages, PageId::from_index(i));
        }
        let rest = list.split_off(&mut pages, 0);
        assert!(list.is_empty());
        assert_eq!(list.first(), None);
        assert_eq!(rest.len(), 3);
    }

    #[test]
    #[should_panic(expected = "twice")]
    fn double_insert_panics() {
        let mut pages = arena(1);
        let mut list = FreeList::new();
        list.push_front(&mut pages, PageId::from_index(0));
        list.push_front(&mut pages, PageId::from_index(0));
    }
}
