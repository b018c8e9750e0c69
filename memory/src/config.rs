//! Tunables the plugin is constructed with, each carrying the default
//! named in the interface spec. Passed explicitly into the constructor
//! rather than read from a global, the way the teacher's allocators take
//! explicit parameters instead of reaching for ambient state.

#[derive(Clone, Debug)]
pub struct MemoryConfig {
    /// Page size of the concrete paged byte store.
    pub page_size: u64,
    /// Page size of the symbolic-address `pitree` index.
    pub pitree_page_size: u64,
    /// Largest concrete size a single load/store may request.
    pub maximum_concrete_size: u64,
    /// Largest symbolic size a single load/store may request.
    pub maximum_symbolic_size: u64,
    /// When set, every load/store is checked against the mapped-regions
    /// table; when unset, only explicit `map_region` bookkeeping happens
    /// and no access is ever refused for lacking permissions.
    pub strict_page_access: bool,
    /// Upper bound on how many concrete addresses a symbolic address is
    /// concretized into before the result is accepted as an
    /// over-approximation. Mirrors the original implementation's
    /// `any_n_int` concretization cap.
    pub address_concretization_cap: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            page_size: 4096,
            pitree_page_size: 128,
            maximum_concrete_size: 16 * 1024 * 1024,
            maximum_symbolic_size: 8 * 1024,
            strict_page_access: false,
            address_concretization_cap: 2048,
        }
    }
}
