//! Paged, copy-on-write interval index.
//!
//! Wraps one [`ivtree::IntervalTree`] per fixed-size page of key-space
//! instead of a single tree over the whole address range, so that cloning
//! a path only has to physically duplicate the pages that path later
//! touches rather than the whole index. Two independent [`cow::Cow`]
//! layers make this work: the page directory itself is COW (cloning a
//! `Pitree` is one `Rc` bump), and every page's tree is COW again, so a
//! write to one page never disturbs the others or the directory that
//! still lists them.
//!
//! This uses a fixed-size grid (`addr / page_size` buckets) rather than
//! letting pages take on ad hoc spans, which keeps page lookup an O(1)
//! division instead of a search through an outer interval tree: pages
//! are uniform, so there is nothing for an outer tree to balance.

use std::collections::HashMap;

use cow::Cow;
use ivtree::{IntervalTree, Key};

struct Slot<T> {
    id: u64,
    payload: T,
}

impl<T: Clone> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Slot {
            id: self.id,
            payload: self.payload.clone(),
        }
    }
}

type PageTree<T> = Cow<IntervalTree<Slot<T>>>;
type Directory<T> = HashMap<Key, PageTree<T>>;

/// A handle to a previously-added interval, returned by [`Pitree::add`] and
/// [`Pitree::search`], accepted back by [`Pitree::update_item`].
///
/// An interval spanning several pages is recorded once per page it
/// overlaps; `update_item` walks all of them so every copy of the payload
/// stays in sync.
#[derive(Clone, Debug)]
pub struct PitreeEntry {
    id: u64,
    pub lo: Key,
    pub hi: Key,
    pages: Vec<(Key, ivtree::Entry)>,
}

/// A search hit: the entry handle plus a reference to its current payload.
pub struct Hit<'a, T> {
    pub entry: PitreeEntry,
    pub payload: &'a T,
}

pub struct Pitree<T> {
    page_size: Key,
    next_id: u64,
    directory: Cow<Directory<T>>,
}

impl<T> Clone for Pitree<T> {
    fn clone(&self) -> Self {
        Pitree {
            page_size: self.page_size,
            next_id: self.next_id,
            directory: self.directory.clone(),
        }
    }
}

impl<T> Pitree<T> {
    pub fn new(page_size: Key) -> Self {
        assert!(page_size > 0, "pitree: page_size must be nonzero");
        Pitree {
            page_size,
            next_id: 0,
            directory: Cow::new(HashMap::new()),
        }
    }

    pub fn page_size(&self) -> Key {
        self.page_size
    }

    /// Number of distinct pages currently holding at least one entry.
    pub fn page_count(&self) -> usize {
        self.directory.get().len()
    }

    /// True if this directory is still aliased by a sibling clone.
    pub fn directory_is_shared(&self) -> bool {
        self.directory.is_shared()
    }

    fn page_of(&self, addr: Key) -> Key {
        addr / self.page_size
    }

    fn page_range(&self, lo: Key, hi: Key) -> std::ops::RangeInclusive<Key> {
        self.page_of(lo)..=self.page_of(hi - 1)
    }

    pub fn search(&self, lo: Key, hi: Key) -> Vec<Hit<'_, T>> {
        let mut out: Vec<Hit<'_, T>> = Vec::new();
        let mut seen: HashMap<u64, usize> = HashMap::new();
        if lo >= hi {
            return out;
        }
        for page in self.page_range(lo, hi) {
            let Some(tree) = self.directory.get().get(&page) else {
                continue;
            };
            for e in tree.get().search(lo, hi) {
                let slot = tree.get().payload(e);
                match seen.get(&slot.id) {
                    Some(&idx) => out[idx].entry.pages.push((page, e)),
                    None => {
                        seen.insert(slot.id, out.len());
                        out.push(Hit {
                            entry: PitreeEntry {
                                id: slot.id,
                                lo: e.lo,
                                hi: e.hi,
                                pages: vec![(page, e)],
                            },
                            payload: &slot.payload,
                        });
                    }
                }
            }
        }
        out
    }
}

impl<T: Clone> Pitree<T> {
    /// Every stored `(lo, hi, payload)` triple, in no particular order.
    /// An interval spanning several pages is yielded once per page, since
    /// this is meant for address enumeration (e.g. during a merge) rather
    /// than for anything that cares about entry identity.
    pub fn entries(&self) -> Vec<(Key, Key, T)> {
        let mut out = Vec::new();
        for tree_cow in self.directory.get().values() {
            let tree = tree_cow.get();
            for e in tree.iter() {
                out.push((e.lo, e.hi, tree.payload(e).payload.clone()));
            }
        }
        out
    }

    /// Insert `[lo, hi)` with `payload`, replicating it into every page the
    /// range touches.
    pub fn add(&mut self, lo: Key, hi: Key, payload: T) -> PitreeEntry {
        assert!(lo < hi, "pitree: empty or inverted interval [{lo}, {hi})");
        let id = self.next_id;
        self.next_id += 1;

        let mut pages = Vec::new();
        let page_range = self.page_range(lo, hi);
        let dir = self.directory.get_mut();
        for page in page_range {
            let tree_cow = dir.entry(page).or_insert_with(|| Cow::new(IntervalTree::new()));
            let tree = tree_cow.get_mut();
            let inner = tree.insert(
                lo,
                hi,
                Slot {
                    id,
                    payload: payload.clone(),
                },
            );
            pages.push((page, inner));
            log::trace!("pitree: added entry {id} to page {page}");
        }
        PitreeEntry { id, lo, hi, pages }
    }

    /// Replace the payload of a previously returned entry in every page it
    /// was recorded against.
    pub fn update_item(&mut self, entry: &PitreeEntry, payload: T) {
        let dir = self.directory.get_mut();
        for &(page, inner) in &entry.pages {
            if let Some(tree_cow) = dir.get_mut(&page) {
                tree_cow.get_mut().set_payload(
                    inner,
                    Slot {
                        id: entry.id,
                        payload: payload.clone(),
                    },
                );
            }
        }
        log::trace!("pitree: updated entry {}", entry.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_search_single_page() {
        let mut t: Pitree<&'static str> = Pitree::new(128);
        t.add(4, 8, "a");
        t.add(10, 12, "b");

        let hits = t.search(0, 128);
        let mut payloads: Vec<_> = hits.iter().map(|h| *h.payload).collect();
        payloads.sort_unstable();
        assert_eq!(payloads, vec!["a", "b"]);
    }

    #[test]
    fn entry_spanning_pages_is_deduplicated_on_search() {
        let mut t: Pitree<&'static str> = Pitree::new(16);
        t.add(10, 20, "wide"); // spans page 0 and page 1
        assert_eq!(t.page_count(), 2);

        let hits = t.search(0, 32);
        assert_eq!(hits.len(), 1);
        assert_eq!(*hits[0].payload, "wide");
        assert_eq!(hits[0].entry.pages.len(), 2);
    }

    #[test]
    fn update_item_updates_every_page_copy() {
        let mut t: Pitree<i32> = Pitree::new(16);
        let e = t.add(10, 20, 1);
        t.update_item(&e, 2);

        let hits = t.search(0, 32);
        assert_eq!(hits.len(), 1);
        assert_eq!(*hits[0].payload, 2);
    }

    #[test]
    fn clone_only_duplicates_touched_pages() {
        let mut a: Pitree<i32> = Pitree::new(16);
        a.add(0, 4, 10);
        a.add(100, 104, 20);

        let mut b = a.clone();
        assert!(a.directory_is_shared());
        assert!(b.directory_is_shared());

        let e = a.add(200, 204, 30);
        assert!(!a.directory_is_shared());
        assert!(b.search(200, 204).is_empty());
        assert_eq!(*a.search(200, 204)[0].payload, 30);
        let _ = e;
    }
}
