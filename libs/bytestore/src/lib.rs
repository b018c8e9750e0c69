//! Dense, paged, copy-on-write store from a concrete address to one cell.
//!
//! Backs the part of memory whose address is a plain integer (as opposed
//! to the interval-indexed store for symbolic addresses, see `pitree`).
//! Addresses are partitioned into fixed-size pages; each page is a dense
//! `Vec`, COW at both the page and the directory level exactly like
//! `pitree`, so cloning a store and then writing one byte in one path
//! only duplicates that byte's page.

use std::collections::HashMap;

use cow::Cow;

type Page<T> = Vec<Option<T>>;

pub struct ByteStore<T> {
    page_size: u64,
    directory: Cow<HashMap<u64, Cow<Page<T>>>>,
}

impl<T> Clone for ByteStore<T> {
    fn clone(&self) -> Self {
        ByteStore {
            page_size: self.page_size,
            directory: self.directory.clone(),
        }
    }
}

impl<T> ByteStore<T> {
    pub fn new(page_size: u64) -> Self {
        assert!(page_size > 0, "bytestore: page_size must be nonzero");
        ByteStore {
            page_size,
            directory: Cow::new(HashMap::new()),
        }
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn page_count(&self) -> usize {
        self.directory.get().len()
    }

    pub fn directory_is_shared(&self) -> bool {
        self.directory.is_shared()
    }

    fn split(&self, addr: u64) -> (u64, usize) {
        (addr / self.page_size, (addr % self.page_size) as usize)
    }

    pub fn get(&self, addr: u64) -> Option<&T> {
        let (page, off) = self.split(addr);
        self.directory.get().get(&page)?.get().get(off)?.as_ref()
    }

    pub fn contains(&self, addr: u64) -> bool {
        self.get(addr).is_some()
    }

    /// Every mapped `(address, cell)` pair, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &T)> + '_ {
        let page_size = self.page_size;
        self.directory.get().iter().flat_map(move |(&page, cells)| {
            cells
                .get()
                .iter()
                .enumerate()
                .filter_map(move |(off, cell)| cell.as_ref().map(|c| (page * page_size + off as u64, c)))
        })
    }
}

impl<T: Clone> ByteStore<T> {
    pub fn set(&mut self, addr: u64, value: T) {
        let (page, off) = self.split(addr);
        let page_size = self.page_size as usize;
        let dir = self.directory.get_mut();
        let page_cow = dir
            .entry(page)
            .or_insert_with(|| Cow::new(vec![None; page_size]));
        page_cow.get_mut()[off] = Some(value);
        log::trace!("bytestore: wrote addr 0x{addr:x} (page {page}, offset {off})");
    }

    /// Remove a byte, leaving the slot unmapped (distinct from a concrete
    /// zero value).
    pub fn clear(&mut self, addr: u64) {
        let (page, off) = self.split(addr);
        if let Some(page_cow) = self.directory.get_mut().get_mut(&page) {
            page_cow.get_mut()[off] = None;
        }
    }
}
