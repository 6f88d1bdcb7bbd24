//! The raw Robin Hood table.
//!
//! [`HashTable`] stores values of type `T` in a power-of-two slot array and
//! resolves collisions by linear probing. Every occupied slot records its probe
//! distance, the number of slots between its home index (`hash & mask`) and
//! the slot it actually occupies. Insertion lets an item that has travelled
//! further take the slot of a resident that has travelled less ("Robin Hood"
//! displacement), which keeps probe distances short and uniform. Removal closes
//! the gap by shifting the remainder of the cluster one slot back instead of
//! leaving a tombstone.
//!
//! Like the map built on top of it, the table never computes hashes itself:
//! callers pass the hash and an equality predicate with every operation.

use alloc::alloc::handle_alloc_error;
use core::alloc::Layout;
use core::fmt::Debug;
use core::iter::FusedIterator;
use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ptr::NonNull;

/// Probe distance recorded for an empty slot.
///
/// Negative so that an empty slot compares below every live probe distance:
/// lookups treat "empty" and "resident closer to its home than we are to ours"
/// as the same early-exit condition.
const EMPTY: isize = -1;

/// Size exponent used by [`HashTable::new`]: `1 << 4`, i.e. 16 slots.
pub const DEFAULT_SIZE_EXPONENT: u32 = 4;

/// The table grows before an insertion would push it past 3/4 occupancy.
const MAX_LOAD_NUMERATOR: u128 = 3;
const MAX_LOAD_DENOMINATOR: u128 = 4;

#[inline(always)]
fn target_load_factor(capacity: usize) -> usize {
    ((capacity as u128 * MAX_LOAD_NUMERATOR) / MAX_LOAD_DENOMINATOR) as usize
}

/// Smallest slot count, no lower than the default, that holds `items` without
/// growing.
fn capacity_for(items: usize) -> usize {
    let mut capacity = 1usize << DEFAULT_SIZE_EXPONENT;
    while target_load_factor(capacity) < items {
        capacity = capacity.checked_mul(2).expect("capacity overflow");
    }
    capacity
}

/// Per-slot metadata. Kept in its own array so probing never touches payloads
/// until the stored hash matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
struct Meta {
    hash: u64,
    probe: isize,
}

impl Meta {
    const VACANT: Meta = Meta {
        hash: 0,
        probe: EMPTY,
    };

    #[inline(always)]
    fn is_empty(self) -> bool {
        self.probe == EMPTY
    }
}

#[derive(Debug)]
struct DataLayout {
    layout: Layout,
    meta_offset: usize,
    buckets_offset: usize,
}

impl DataLayout {
    fn new<T>(capacity: usize) -> Self {
        let meta_layout = Layout::array::<Meta>(capacity).expect("allocation size overflow");
        let buckets_layout =
            Layout::array::<MaybeUninit<T>>(capacity).expect("allocation size overflow");

        let (layout, meta_offset) = Layout::new::<()>()
            .extend(meta_layout)
            .expect("allocation size overflow");
        let (layout, buckets_offset) = layout
            .extend(buckets_layout)
            .expect("allocation size overflow");

        DataLayout {
            layout,
            meta_offset,
            buckets_offset,
        }
    }
}

/// Allocates a block for `capacity` slots with every slot marked empty.
fn allocate(layout: &DataLayout, capacity: usize) -> NonNull<u8> {
    // SAFETY: The layout is never zero-sized because every slot carries a
    // `Meta`. A null return is routed to `handle_alloc_error`. The metadata
    // region starts at `meta_offset`, which `Layout::extend` aligned for `Meta`.
    unsafe {
        let raw_alloc = alloc::alloc::alloc(layout.layout);
        if raw_alloc.is_null() {
            handle_alloc_error(layout.layout);
        }

        let meta = raw_alloc.add(layout.meta_offset).cast::<Meta>();
        for index in 0..capacity {
            meta.add(index).write(Meta::VACANT);
        }

        NonNull::new_unchecked(raw_alloc)
    }
}

/// Debug statistics for hash table analysis.
///
/// Available in tests and with the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone)]
pub struct DebugStats {
    /// Number of elements currently in the table
    pub populated: usize,
    /// Number of slots allocated
    pub capacity: usize,
    /// Number of elements the table accepts before doubling
    pub max_load: usize,
    /// Load factor (populated / capacity)
    pub load_factor: f64,
    /// Largest probe distance among the current elements
    pub max_probe: usize,
    /// Upper bound on probe distances the table tracks for early exits
    pub recorded_max_probe: usize,
    /// Mean probe distance of the current elements
    pub mean_probe: f64,
    /// Variance of the probe distances of the current elements
    pub probe_variance: f64,
    /// Total memory in bytes used by the table
    pub total_bytes: usize,
    /// Estimated memory in bytes held by empty slots
    pub wasted_bytes: usize,
}

#[cfg(any(test, feature = "stats"))]
impl DebugStats {
    /// Pretty-print the debug statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Robin Hood Table Statistics ===");
        println!(
            "Population: {}/{} slots ({:.2}% load factor, grows past {})",
            self.populated,
            self.capacity,
            self.load_factor * 100.0,
            self.max_load
        );
        println!(
            "Probe distance: max {} (tracked {}), mean {:.3}, variance {:.3}",
            self.max_probe, self.recorded_max_probe, self.mean_probe, self.probe_variance
        );
        println!("Total Allocated: {} bytes", self.total_bytes);
        println!(
            "Memory: {} bytes wasted ({:.02}%)",
            self.wasted_bytes,
            if self.total_bytes == 0 {
                0.0
            } else {
                (self.wasted_bytes as f64 / self.total_bytes as f64) * 100.0
            }
        );
    }
}

/// Number of elements at each probe distance.
///
/// Available in tests and with the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeHistogram {
    /// `counts[d]` is the number of elements stored `d` slots past their home.
    pub counts: alloc::vec::Vec<usize>,
}

#[cfg(any(test, feature = "stats"))]
impl ProbeHistogram {
    /// Total number of elements counted.
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Pretty-prints the histogram as a horizontal bar chart.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        let max = self.counts.iter().copied().max().unwrap_or(0);
        if max == 0 {
            println!("probe histogram: empty");
            return;
        }

        let max_bar = 60usize;
        let total_units = max_bar * 8;
        println!("probe histogram ({} entries):", self.total());

        let make_bar = |count: usize| -> alloc::string::String {
            if count == 0 {
                return alloc::string::String::new();
            }
            let units = ((count as u128 * total_units as u128).div_ceil(max as u128)) as usize;
            let mut bar = "█".repeat(units / 8);
            let partial = match units % 8 {
                1 => Some('▏'),
                2 => Some('▎'),
                3 => Some('▍'),
                4 => Some('▌'),
                5 => Some('▋'),
                6 => Some('▊'),
                7 => Some('▉'),
                _ => None,
            };
            if let Some(ch) = partial {
                bar.push(ch);
            }
            bar
        };

        for (distance, &count) in self.counts.iter().enumerate() {
            println!("{:>3} | {} ({})", distance, make_bar(count), count);
        }
    }
}

/// An open-addressing hash table using Robin Hood hashing with backward-shift
/// deletion.
///
/// `HashTable<T>` stores values of type `T`. Callers supply the hash of a
/// value and an equality predicate with each operation, which lets the same
/// table back maps, sets, or values that embed their own keys.
///
/// ## Layout
///
/// Slot metadata (stored hash and probe distance) and payloads live in two
/// parallel arrays inside a single allocation. The capacity is always a power
/// of two, so the home index of a hash is `hash & (capacity - 1)`.
///
/// ## Growth
///
/// The table doubles and rehashes before an insertion would take it above
/// 3/4 occupancy. It never shrinks.
///
/// ## Example
///
/// ```rust
/// # use core::hash::Hash;
/// # use core::hash::Hasher;
/// #
/// # use robin_map::hash_table::Entry;
/// # use robin_map::hash_table::HashTable;
/// # use siphasher::sip::SipHasher;
/// #
/// # #[derive(Debug, PartialEq)]
/// # struct Person {
/// #     id: u64,
/// #     name: String,
/// # }
/// #
/// # fn hash_id(id: u64) -> u64 {
/// #     let mut hasher = SipHasher::new();
/// #     id.hash(&mut hasher);
/// #     hasher.finish()
/// # }
///
/// let mut table = HashTable::new();
/// let hash = hash_id(123);
///
/// match table.entry(hash, |p: &Person| p.id == 123) {
///     Entry::Vacant(entry) => {
///         entry.insert(Person {
///             id: 123,
///             name: "Alice".to_string(),
///         });
///     }
///     Entry::Occupied(_) => unreachable!(),
/// }
///
/// assert_eq!(table.find(hash, |p| p.id == 123).unwrap().name, "Alice");
/// ```
pub struct HashTable<T> {
    layout: DataLayout,
    alloc: NonNull<u8>,

    items: usize,
    max_probe: usize,
    mask: usize,

    _phantom: PhantomData<T>,
}

// SAFETY: The table owns its values the same way a `Vec<T>` does and never
// shares its allocation, so it can cross threads whenever `T` can.
unsafe impl<T: Send> Send for HashTable<T> {}
// SAFETY: Shared access only hands out `&T`.
unsafe impl<T: Sync> Sync for HashTable<T> {}

impl<T> Debug for HashTable<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use alloc::format;
        use alloc::string::String;
        use alloc::string::ToString;
        use alloc::vec::Vec;

        let probes = (0..self.capacity())
            .map(|index| {
                // SAFETY: `index` is below the capacity.
                let meta = unsafe { self.meta(index) };
                if meta.is_empty() {
                    "..".to_string()
                } else {
                    format!("{:02}", meta.probe)
                }
            })
            .collect::<Vec<String>>();

        f.debug_struct("HashTable")
            .field(
                "probes",
                &probes
                    .chunks(16)
                    .map(|row| row.join(" "))
                    .collect::<Vec<_>>(),
            )
            .field("populated", &self.items)
            .field("capacity", &self.capacity())
            .field("max_probe", &self.max_probe)
            .finish()
    }
}

impl<T> Clone for HashTable<T>
where
    T: Clone,
{
    fn clone(&self) -> Self {
        let mut new_table = Self::with_slots(self.capacity());

        for index in 0..self.capacity() {
            // SAFETY: Both tables have the same capacity and only occupied slots
            // are read. The metadata is written after the payload, so a panic in
            // `clone` leaves `new_table` describing only initialized slots.
            unsafe {
                let meta = self.meta(index);
                if meta.is_empty() {
                    continue;
                }

                let value = self.bucket(index).clone();
                new_table.bucket_slot(index).write(value);
                new_table.set_meta(index, meta);
                new_table.items += 1;
            }
        }
        new_table.max_probe = self.max_probe;

        debug_assert_eq!(new_table.items, self.items);
        new_table
    }
}

impl<T> Drop for HashTable<T> {
    fn drop(&mut self) {
        if core::mem::needs_drop::<T>() && self.items > 0 {
            self.clear();
        }

        // SAFETY: The block was allocated with this layout and is freed once.
        unsafe {
            alloc::alloc::dealloc(self.alloc.as_ptr(), self.layout.layout);
        }
    }
}

impl<T> Default for HashTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HashTable<T> {
    /// Creates an empty table with 16 slots.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_map::hash_table::HashTable;
    /// #
    /// let table: HashTable<u64> = HashTable::new();
    /// assert_eq!(table.capacity(), 16);
    /// assert!(table.is_empty());
    /// ```
    pub fn new() -> Self {
        Self::with_size_exponent(DEFAULT_SIZE_EXPONENT)
    }

    /// Creates an empty table with `1 << exponent` slots.
    ///
    /// # Panics
    ///
    /// Panics if the slot count does not fit in memory.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_map::hash_table::HashTable;
    /// #
    /// let table: HashTable<u64> = HashTable::with_size_exponent(8);
    /// assert_eq!(table.capacity(), 256);
    /// ```
    pub fn with_size_exponent(exponent: u32) -> Self {
        assert!(exponent < usize::BITS - 1, "capacity overflow");
        Self::with_slots(1 << exponent)
    }

    /// Creates an empty table that can hold at least `capacity` values without
    /// growing.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_map::hash_table::HashTable;
    /// #
    /// let table: HashTable<String> = HashTable::with_capacity(100);
    /// assert_eq!(table.capacity(), 256);
    /// assert!(table.max_load() >= 100);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_slots(capacity_for(capacity))
    }

    fn with_slots(capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());

        let layout = DataLayout::new::<T>(capacity);
        let alloc = allocate(&layout, capacity);

        Self {
            layout,
            alloc,
            items: 0,
            max_probe: 0,
            mask: capacity - 1,
            _phantom: PhantomData,
        }
    }

    fn meta_ptr(&self) -> NonNull<[Meta]> {
        // SAFETY: The allocation holds `capacity` initialized `Meta` values
        // starting at `meta_offset`.
        unsafe {
            NonNull::slice_from_raw_parts(
                self.alloc.add(self.layout.meta_offset).cast(),
                self.capacity(),
            )
        }
    }

    fn buckets_ptr(&self) -> NonNull<[MaybeUninit<T>]> {
        // SAFETY: The allocation holds `capacity` payload slots starting at
        // `buckets_offset`.
        unsafe {
            NonNull::slice_from_raw_parts(
                self.alloc.add(self.layout.buckets_offset).cast(),
                self.capacity(),
            )
        }
    }

    /// Reads the metadata of slot `index`.
    ///
    /// # Safety
    ///
    /// The caller must ensure `index` is less than `capacity()`.
    #[inline(always)]
    unsafe fn meta(&self, index: usize) -> Meta {
        // SAFETY: Caller ensures `index` is within bounds of the metadata array
        unsafe { *self.meta_ptr().as_ref().get_unchecked(index) }
    }

    /// Overwrites the metadata of slot `index`.
    ///
    /// # Safety
    ///
    /// The caller must ensure `index` is less than `capacity()` and that the
    /// payload matches what `meta` claims (initialized unless `meta` is empty).
    #[inline(always)]
    unsafe fn set_meta(&mut self, index: usize, meta: Meta) {
        // SAFETY: Caller ensures `index` is within bounds of the metadata array
        unsafe {
            *self.meta_ptr().as_mut().get_unchecked_mut(index) = meta;
        }
    }

    /// # Safety
    ///
    /// The caller must ensure `index` is less than `capacity()` and the slot is
    /// occupied.
    #[inline(always)]
    unsafe fn bucket(&self, index: usize) -> &T {
        // SAFETY: Caller ensures the slot is in bounds and initialized
        unsafe {
            self.buckets_ptr()
                .as_ref()
                .get_unchecked(index)
                .assume_init_ref()
        }
    }

    /// # Safety
    ///
    /// The caller must ensure `index` is less than `capacity()` and the slot is
    /// occupied.
    #[inline(always)]
    unsafe fn bucket_mut(&mut self, index: usize) -> &mut T {
        // SAFETY: Caller ensures the slot is in bounds and initialized
        unsafe {
            self.buckets_ptr()
                .as_mut()
                .get_unchecked_mut(index)
                .assume_init_mut()
        }
    }

    /// # Safety
    ///
    /// The caller must ensure `index` is less than `capacity()`.
    #[inline(always)]
    unsafe fn bucket_slot(&mut self, index: usize) -> &mut MaybeUninit<T> {
        // SAFETY: Caller ensures `index` is within bounds of the payload array
        unsafe { self.buckets_ptr().as_mut().get_unchecked_mut(index) }
    }

    #[inline(always)]
    fn home_index(&self, hash: u64) -> usize {
        (hash as usize) & self.mask
    }

    #[inline(always)]
    fn next_index(&self, index: usize) -> usize {
        (index + 1) & self.mask
    }

    /// Returns the number of slots in the table.
    ///
    /// This is always a power of two.
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Returns the number of values the table holds before the next insertion
    /// doubles it.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_map::hash_table::HashTable;
    /// #
    /// let table: HashTable<u64> = HashTable::new();
    /// assert_eq!(table.max_load(), 12);
    /// ```
    pub fn max_load(&self) -> usize {
        target_load_factor(self.capacity())
    }

    /// Returns the number of elements in the table.
    pub fn len(&self) -> usize {
        self.items
    }

    /// Returns `true` if the table contains no elements.
    pub fn is_empty(&self) -> bool {
        self.items == 0
    }

    /// Removes all elements from the table, keeping its capacity.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_map::hash_table::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// table.entry(1, |&v: &u64| v == 1).or_insert(1);
    /// table.entry(2, |&v: &u64| v == 2).or_insert(2);
    ///
    /// table.clear();
    /// assert!(table.is_empty());
    /// assert_eq!(table.capacity(), 16);
    /// ```
    pub fn clear(&mut self) {
        if self.items == 0 {
            return;
        }

        for index in 0..self.capacity() {
            // SAFETY: `index` is below the capacity. The slot is marked empty
            // before its value is dropped, so a panicking destructor cannot
            // cause a double drop.
            unsafe {
                if self.meta(index).is_empty() {
                    continue;
                }
                self.set_meta(index, Meta::VACANT);
                self.items -= 1;
                self.bucket_slot(index).assume_init_drop();
            }
        }

        debug_assert_eq!(self.items, 0);
        self.max_probe = 0;
    }

    /// Finds a value by hash and equality predicate.
    ///
    /// The scan starts at the home index of `hash` and stops as soon as it
    /// reaches an empty slot or a resident that sits closer to its own home
    /// than the scan has travelled, since Robin Hood insertion would have
    /// placed a matching value before either.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use robin_map::hash_table::HashTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_u64(n: u64) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     n.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table = HashTable::new();
    /// table.entry(hash_u64(42), |&n: &u64| n == 42).or_insert(42);
    ///
    /// assert_eq!(table.find(hash_u64(42), |&n| n == 42), Some(&42));
    /// assert_eq!(table.find(hash_u64(99), |&n| n == 99), None);
    /// ```
    #[inline]
    pub fn find(&self, hash: u64, eq: impl Fn(&T) -> bool) -> Option<&T> {
        let index = self.find_index(hash, eq)?;
        // SAFETY: `find_index` only returns in-bounds, occupied slots.
        Some(unsafe { self.bucket(index) })
    }

    /// Finds a value by hash and equality predicate, returning a mutable
    /// reference.
    ///
    /// Mutating the value must not change its hash or its equality.
    #[inline]
    pub fn find_mut(&mut self, hash: u64, eq: impl Fn(&T) -> bool) -> Option<&mut T> {
        let index = self.find_index(hash, eq)?;
        // SAFETY: `find_index` only returns in-bounds, occupied slots.
        Some(unsafe { self.bucket_mut(index) })
    }

    #[inline]
    fn find_index(&self, hash: u64, eq: impl Fn(&T) -> bool) -> Option<usize> {
        if self.items == 0 {
            return None;
        }

        let mut index = self.home_index(hash);
        let mut probe = 0usize;
        while probe <= self.max_probe {
            // SAFETY: `index` is masked to the capacity.
            let meta = unsafe { self.meta(index) };
            if meta.probe < probe as isize {
                return None;
            }

            // SAFETY: A non-negative probe distance marks an occupied slot.
            if meta.hash == hash && eq(unsafe { self.bucket(index) }) {
                return Some(index);
            }

            index = self.next_index(index);
            probe += 1;
        }

        None
    }

    /// Gets an entry for the given hash and equality predicate.
    ///
    /// If the table is at its load limit it doubles first, even when the
    /// value turns out to be present, so the returned entry can always be
    /// filled without another resize.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use robin_map::hash_table::Entry;
    /// # use robin_map::hash_table::HashTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_str(s: &str) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     s.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table = HashTable::new();
    /// let hash = hash_str("hello");
    ///
    /// match table.entry(hash, |s: &String| s == "hello") {
    ///     Entry::Vacant(entry) => {
    ///         entry.insert("hello".to_string());
    ///     }
    ///     Entry::Occupied(_) => unreachable!(),
    /// }
    ///
    /// table
    ///     .entry(hash, |s: &String| s == "hello")
    ///     .and_modify(|s| s.push_str(", world"));
    /// assert_eq!(table.find(hash, |s| s.starts_with("hello")).unwrap(), "hello, world");
    /// ```
    #[inline]
    pub fn entry(&mut self, hash: u64, eq: impl Fn(&T) -> bool) -> Entry<'_, T> {
        self.maybe_grow();
        self.entry_impl(hash, eq)
    }

    fn entry_impl(&mut self, hash: u64, eq: impl Fn(&T) -> bool) -> Entry<'_, T> {
        let mut index = self.home_index(hash);
        let mut probe: isize = 0;

        // Terminates: `maybe_grow` keeps at least one slot empty.
        loop {
            // SAFETY: `index` is masked to the capacity.
            let meta = unsafe { self.meta(index) };
            if meta.probe < probe {
                return Entry::Vacant(VacantEntry {
                    table: self,
                    hash,
                    index,
                    probe,
                });
            }

            // SAFETY: A non-negative probe distance marks an occupied slot.
            if meta.hash == hash && eq(unsafe { self.bucket(index) }) {
                return Entry::Occupied(OccupiedEntry { table: self, index });
            }

            index = self.next_index(index);
            probe += 1;
        }
    }

    /// Writes `value` into slot `index` at distance `probe`, carrying each
    /// displaced resident forward until an empty slot absorbs it.
    ///
    /// The slot at `index` must be empty or hold a resident whose probe
    /// distance is below `probe`.
    fn place(&mut self, mut index: usize, mut hash: u64, mut probe: isize, mut value: T) {
        loop {
            // SAFETY: `index` is masked to the capacity.
            let resident = unsafe { self.meta(index) };

            if resident.is_empty() {
                // SAFETY: The slot is empty, so its payload is uninitialized
                // and can be written without dropping anything.
                unsafe {
                    self.set_meta(index, Meta { hash, probe });
                    self.bucket_slot(index).write(value);
                }
                self.note_probe(probe);
                return;
            }

            if resident.probe < probe {
                // SAFETY: The slot is occupied; the carried value takes it and
                // the resident becomes the carried value.
                unsafe {
                    self.set_meta(index, Meta { hash, probe });
                    value = core::mem::replace(self.bucket_mut(index), value);
                }
                self.note_probe(probe);
                hash = resident.hash;
                probe = resident.probe;
            }

            index = self.next_index(index);
            probe += 1;
        }
    }

    #[inline(always)]
    fn note_probe(&mut self, probe: isize) {
        debug_assert!(probe >= 0);
        self.max_probe = self.max_probe.max(probe as usize);
    }

    /// Inserts a value known to be absent, without checking the load limit.
    fn insert_unique(&mut self, hash: u64, value: T) {
        self.items += 1;
        let home = self.home_index(hash);
        self.place(home, hash, 0, value);
    }

    /// Removes and returns a value from the table.
    ///
    /// The rest of the value's cluster shifts back one slot, so no tombstone is
    /// left behind. Removal never resizes the table.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use robin_map::hash_table::HashTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_u64(n: u64) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     n.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table = HashTable::new();
    /// table.entry(hash_u64(42), |&n: &u64| n == 42).or_insert(42);
    ///
    /// assert_eq!(table.remove(hash_u64(42), |&n| n == 42), Some(42));
    /// assert_eq!(table.remove(hash_u64(42), |&n| n == 42), None);
    /// assert!(table.is_empty());
    /// ```
    pub fn remove(&mut self, hash: u64, eq: impl Fn(&T) -> bool) -> Option<T> {
        let index = self.find_index(hash, eq)?;
        // SAFETY: `find_index` only returns in-bounds, occupied slots.
        Some(unsafe { self.remove_index(index) })
    }

    /// Moves the value out of slot `index` and closes the gap.
    ///
    /// Every successor up to the first slot that is empty or already at its
    /// home moves one slot back with its probe distance decremented; the last
    /// slot of that run becomes empty. The walk is circular, so a cluster that
    /// wraps past the end of the array is shifted through index 0.
    ///
    /// # Safety
    ///
    /// The caller must ensure `index` is less than `capacity()` and the slot is
    /// occupied.
    unsafe fn remove_index(&mut self, index: usize) -> T {
        self.items -= 1;
        // SAFETY: Caller ensures the slot is occupied. Its bytes are either
        // overwritten by the shift below or abandoned once the slot is empty.
        let value = unsafe { self.bucket_slot(index).assume_init_read() };

        let mut limit = self.next_index(index);
        // SAFETY: `limit` is masked to the capacity. The scan stops because at
        // least one slot is empty.
        while unsafe { self.meta(limit) }.probe > 0 {
            limit = self.next_index(limit);
        }

        let buckets = self.buckets_ptr().cast::<MaybeUninit<T>>().as_ptr();
        let mut hole = index;
        let mut next = self.next_index(hole);
        while next != limit {
            // SAFETY: `next` is occupied with a positive probe distance and
            // `hole` has just been vacated. Both are in bounds and distinct.
            unsafe {
                let mut meta = self.meta(next);
                debug_assert!(meta.probe > 0);
                meta.probe -= 1;
                self.set_meta(hole, meta);
                core::ptr::copy_nonoverlapping(buckets.add(next), buckets.add(hole), 1);
            }
            hole = next;
            next = self.next_index(next);
        }

        // SAFETY: `hole` is in bounds and its payload has been moved out.
        unsafe { self.set_meta(hole, Meta::VACANT) };

        value
    }

    #[inline]
    fn maybe_grow(&mut self) {
        if self.items + 1 > target_load_factor(self.capacity()) {
            self.grow();
        }
    }

    #[inline(never)]
    #[cold]
    fn grow(&mut self) {
        let capacity = self.capacity().checked_mul(2).expect("capacity overflow");
        self.rehash(capacity);
    }

    /// Moves every value into a fresh allocation of `capacity` slots.
    ///
    /// Stored hashes are reused; the caller's hash function is not consulted.
    fn rehash(&mut self, capacity: usize) {
        debug_assert!(capacity.is_power_of_two() && capacity > self.capacity());

        #[cfg(feature = "log")]
        log::trace!(
            "growing robin hood table from {} to {} slots ({} items, max probe {})",
            self.capacity(),
            capacity,
            self.items,
            self.max_probe
        );

        let new_layout = DataLayout::new::<T>(capacity);
        let new_alloc = allocate(&new_layout, capacity);

        let old_capacity = self.capacity();
        let old_layout = core::mem::replace(&mut self.layout, new_layout);
        let old_alloc = core::mem::replace(&mut self.alloc, new_alloc);
        let moving = core::mem::replace(&mut self.items, 0);
        self.mask = capacity - 1;
        self.max_probe = 0;

        // SAFETY: The old block holds `old_capacity` metadata entries and
        // payload slots at the offsets recorded in `old_layout`. Each occupied
        // payload is moved exactly once into the new table, then the old block
        // is freed without running destructors.
        unsafe {
            let old_meta = old_alloc.add(old_layout.meta_offset).cast::<Meta>();
            let old_buckets = old_alloc
                .add(old_layout.buckets_offset)
                .cast::<MaybeUninit<T>>();

            for index in 0..old_capacity {
                let meta = old_meta.add(index).read();
                if meta.is_empty() {
                    continue;
                }

                let value = old_buckets.add(index).read().assume_init();
                self.insert_unique(meta.hash, value);
            }

            alloc::alloc::dealloc(old_alloc.as_ptr(), old_layout.layout);
        }

        debug_assert_eq!(self.items, moving);
    }

    /// Returns an iterator over all values in the table, in slot order.
    ///
    /// The iterator borrows the table, so the table cannot be modified while
    /// it is alive:
    ///
    /// ```compile_fail
    /// # use robin_map::hash_table::HashTable;
    /// let mut table = HashTable::new();
    /// table.entry(1, |&v: &u64| v == 1).or_insert(1);
    ///
    /// for value in table.iter() {
    ///     table.remove(*value, |v| v == value);
    /// }
    /// ```
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            table: self,
            index: 0,
            remaining: self.items,
        }
    }

    /// Returns an iterator yielding mutable references to all values, in slot
    /// order.
    ///
    /// Mutating a value must not change its hash or its equality.
    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        // SAFETY: The metadata and payload arrays are disjoint regions of the
        // allocation, and `&mut self` rules out any other access for `'_`.
        let (meta, buckets) = unsafe { (self.meta_ptr().as_ref(), self.buckets_ptr().as_mut()) };
        IterMut {
            slots: meta.iter().zip(buckets.iter_mut()),
            remaining: self.items,
        }
    }

    /// Returns an iterator that removes and yields all values from the table.
    ///
    /// After the iterator is dropped the table is empty; its capacity is kept.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_map::hash_table::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// table.entry(1, |&v: &u64| v == 1).or_insert(1);
    /// table.entry(2, |&v: &u64| v == 2).or_insert(2);
    ///
    /// let mut values: Vec<u64> = table.drain().collect();
    /// values.sort();
    /// assert_eq!(values, [1, 2]);
    /// assert!(table.is_empty());
    /// ```
    pub fn drain(&mut self) -> Drain<'_, T> {
        Drain {
            table: self,
            index: 0,
        }
    }

    /// Computes a histogram of probe distances for the current table state.
    ///
    /// Available in tests and with the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn probe_histogram(&self) -> ProbeHistogram {
        let mut counts = alloc::vec![0usize; self.max_probe + 1];
        for index in 0..self.capacity() {
            // SAFETY: `index` is below the capacity.
            let meta = unsafe { self.meta(index) };
            if !meta.is_empty() {
                counts[meta.probe as usize] += 1;
            }
        }

        while counts.len() > 1 && counts.last() == Some(&0) {
            counts.pop();
        }

        ProbeHistogram { counts }
    }

    /// Returns detailed utilization statistics for debugging.
    ///
    /// Available in tests and with the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn debug_stats(&self) -> DebugStats {
        let histogram = self.probe_histogram();
        let populated = self.items;

        let (mean_probe, probe_variance) = if populated == 0 {
            (0.0, 0.0)
        } else {
            let n = populated as f64;
            let sum = histogram
                .counts
                .iter()
                .enumerate()
                .map(|(distance, &count)| (distance * count) as f64)
                .sum::<f64>();
            let mean = sum / n;
            let variance = histogram
                .counts
                .iter()
                .enumerate()
                .map(|(distance, &count)| {
                    let delta = distance as f64 - mean;
                    delta * delta * count as f64
                })
                .sum::<f64>()
                / n;
            (mean, variance)
        };

        DebugStats {
            populated,
            capacity: self.capacity(),
            max_load: self.max_load(),
            load_factor: populated as f64 / self.capacity() as f64,
            max_probe: if populated == 0 {
                0
            } else {
                histogram.counts.len() - 1
            },
            recorded_max_probe: self.max_probe,
            mean_probe,
            probe_variance,
            total_bytes: self.layout.layout.size(),
            wasted_bytes: (self.capacity() - populated) * core::mem::size_of::<T>(),
        }
    }

    /// Walks every slot and panics if the table's structural invariants do not
    /// hold.
    ///
    /// Checks that the capacity is a power of two, that each recorded probe
    /// distance equals the circular distance from the value's home index and
    /// does not exceed the tracked maximum, that an occupied slot following an
    /// empty one sits at its home, and that the element count matches.
    ///
    /// Available in tests and with the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn check_invariants(&self) {
        let capacity = self.capacity();
        assert!(
            capacity.is_power_of_two(),
            "capacity {capacity} is not a power of two"
        );
        assert!(
            self.items <= self.max_load(),
            "{} items exceed the load limit of {} slots",
            self.items,
            capacity
        );

        let mut occupied = 0;
        for index in 0..capacity {
            // SAFETY: `index` and `previous` are masked to the capacity.
            let meta = unsafe { self.meta(index) };
            if meta.is_empty() {
                continue;
            }
            occupied += 1;

            assert!(meta.probe >= 0, "slot {index}: invalid probe {}", meta.probe);
            let home = self.home_index(meta.hash);
            let distance = index.wrapping_sub(home) & self.mask;
            assert_eq!(
                meta.probe as usize, distance,
                "slot {index}: recorded probe {} but home is {home}",
                meta.probe
            );
            assert!(
                distance <= self.max_probe,
                "slot {index}: probe {distance} exceeds tracked maximum {}",
                self.max_probe
            );

            let previous = index.wrapping_sub(1) & self.mask;
            // SAFETY: See above.
            if unsafe { self.meta(previous) }.is_empty() {
                assert_eq!(
                    meta.probe, 0,
                    "slot {index} follows an empty slot but is {} from home",
                    meta.probe
                );
            }
        }

        assert_eq!(
            occupied, self.items,
            "{occupied} occupied slots but {} items recorded",
            self.items
        );
    }
}

impl<'a, T> IntoIterator for &'a HashTable<T> {
    type IntoIter = Iter<'a, T>;
    type Item = &'a T;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T> IntoIterator for &'a mut HashTable<T> {
    type IntoIter = IterMut<'a, T>;
    type Item = &'a mut T;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<T> IntoIterator for HashTable<T> {
    type IntoIter = IntoIter<T>;
    type Item = T;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            table: self,
            index: 0,
        }
    }
}

/// A view into a single entry in the table, which may be vacant or occupied.
///
/// This enum is constructed from the [`entry`] method on [`HashTable`].
///
/// [`entry`]: HashTable::entry
pub enum Entry<'a, T> {
    /// The value is not present in the table
    Vacant(VacantEntry<'a, T>),
    /// The value is present in the table
    Occupied(OccupiedEntry<'a, T>),
}


impl<'a, T> Entry<'a, T> {
    /// Inserts `default` if the entry is vacant and returns a mutable reference
    /// to the value in the entry.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_map::hash_table::HashTable;
    /// #
    /// let mut table = HashTable::new();
    ///
    /// assert_eq!(*table.entry(7, |&v: &u64| v == 7).or_insert(7), 7);
    /// assert_eq!(*table.entry(7, |&v: &u64| v == 7).or_insert(7), 7);
    /// assert_eq!(table.len(), 1);
    /// ```
    pub fn or_insert(self, default: T) -> &'a mut T {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Inserts the result of `default` if the entry is vacant and returns a
    /// mutable reference to the value in the entry.
    ///
    /// `default` is only called for a vacant entry.
    pub fn or_insert_with(self, default: impl FnOnce() -> T) -> &'a mut T {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Calls `f` on the value if the entry is occupied, then returns the entry.
    pub fn and_modify(self, f: impl FnOnce(&mut T)) -> Self {
        match self {
            Entry::Occupied(mut entry) => {
                f(entry.get_mut());
                Entry::Occupied(entry)
            }
            Entry::Vacant(entry) => Entry::Vacant(entry),
        }
    }

    /// Inserts `T::default()` if the entry is vacant and returns a mutable
    /// reference to the value in the entry.
    pub fn or_default(self) -> &'a mut T
    where
        T: Default,
    {
        self.or_insert_with(T::default)
    }
}

/// A view into a vacant entry in a [`HashTable`].
pub struct VacantEntry<'a, T> {
    table: &'a mut HashTable<T>,
    hash: u64,
    index: usize,
    probe: isize,
}

impl<'a, T> VacantEntry<'a, T> {
    /// Inserts `value` and returns a mutable reference to it.
    ///
    /// Residents that are closer to their home than the new value are carried
    /// one slot further along their cluster as needed.
    pub fn insert(self, value: T) -> &'a mut T {
        let VacantEntry {
            table,
            hash,
            index,
            probe,
        } = self;

        table.items += 1;
        table.place(index, hash, probe, value);

        // SAFETY: `place` wrote the new value into `index`; displaced residents
        // only ever move forward.
        unsafe { table.bucket_mut(index) }
    }

    /// Returns the hash this entry was looked up with.
    pub fn hash(&self) -> u64 {
        self.hash
    }
}

/// A view into an occupied entry in a [`HashTable`].
pub struct OccupiedEntry<'a, T> {
    table: &'a mut HashTable<T>,
    index: usize,
}

impl<'a, T> OccupiedEntry<'a, T> {
    /// Gets a reference to the value in the entry.
    pub fn get(&self) -> &T {
        // SAFETY: The entry was created from an occupied, in-bounds slot.
        unsafe { self.table.bucket(self.index) }
    }

    /// Gets a mutable reference to the value in the entry.
    pub fn get_mut(&mut self) -> &mut T {
        // SAFETY: The entry was created from an occupied, in-bounds slot.
        unsafe { self.table.bucket_mut(self.index) }
    }

    /// Converts the entry into a mutable reference to its value, with the
    /// lifetime of the table borrow.
    pub fn into_mut(self) -> &'a mut T {
        // SAFETY: The entry was created from an occupied, in-bounds slot.
        unsafe { self.table.bucket_mut(self.index) }
    }

    /// Removes the value from the table and returns it.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_map::hash_table::Entry;
    /// # use robin_map::hash_table::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// table.entry(3, |&v: &u64| v == 3).or_insert(3);
    ///
    /// if let Entry::Occupied(entry) = table.entry(3, |&v| v == 3) {
    ///     assert_eq!(entry.remove(), 3);
    /// }
    /// assert!(table.is_empty());
    /// ```
    pub fn remove(self) -> T {
        // SAFETY: The entry was created from an occupied, in-bounds slot.
        unsafe { self.table.remove_index(self.index) }
    }
}

/// An iterator over the values of a [`HashTable`].
///
/// Created by [`HashTable::iter`].
pub struct Iter<'a, T> {
    table: &'a HashTable<T>,
    index: usize,
    remaining: usize,
}

impl<T> Clone for Iter<'_, T> {
    fn clone(&self) -> Self {
        Self {
            table: self.table,
            index: self.index,
            remaining: self.remaining,
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        while self.index < self.table.capacity() {
            let index = self.index;
            self.index += 1;

            // SAFETY: `index` is below the capacity and occupied slots hold
            // initialized values.
            unsafe {
                if !self.table.meta(index).is_empty() {
                    self.remaining -= 1;
                    return Some(self.table.bucket(index));
                }
            }
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<T> FusedIterator for Iter<'_, T> {}

/// A mutable iterator over the values of a [`HashTable`].
///
/// Created by [`HashTable::iter_mut`].
pub struct IterMut<'a, T> {
    slots: core::iter::Zip<core::slice::Iter<'a, Meta>, core::slice::IterMut<'a, MaybeUninit<T>>>,
    remaining: usize,
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = &'a mut T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        for (meta, slot) in self.slots.by_ref() {
            if !meta.is_empty() {
                self.remaining -= 1;
                // SAFETY: Occupied slots hold initialized values.
                return Some(unsafe { slot.assume_init_mut() });
            }
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for IterMut<'_, T> {}

impl<T> FusedIterator for IterMut<'_, T> {}

/// A draining iterator over the values of a [`HashTable`].
///
/// Created by [`HashTable::drain`]. Values not consumed are dropped when the
/// iterator is dropped.
pub struct Drain<'a, T> {
    table: &'a mut HashTable<T>,
    index: usize,
}

impl<T> Iterator for Drain<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.table.items == 0 {
            return None;
        }

        while self.index < self.table.capacity() {
            let index = self.index;
            self.index += 1;

            // SAFETY: `index` is below the capacity. The slot is marked empty
            // before its value is moved out, so it is read exactly once.
            unsafe {
                if self.table.meta(index).is_empty() {
                    continue;
                }
                self.table.set_meta(index, Meta::VACANT);
                self.table.items -= 1;
                return Some(self.table.bucket_slot(index).assume_init_read());
            }
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.table.items, Some(self.table.items))
    }
}

impl<T> ExactSizeIterator for Drain<'_, T> {}

impl<T> FusedIterator for Drain<'_, T> {}

impl<T> Drop for Drain<'_, T> {
    fn drop(&mut self) {
        for _ in &mut *self {}
        self.table.max_probe = 0;
    }
}

/// An owning iterator over the values of a [`HashTable`].
///
/// Created by the [`IntoIterator`] implementation of [`HashTable`].
pub struct IntoIter<T> {
    table: HashTable<T>,
    index: usize,
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.table.items == 0 {
            return None;
        }

        while self.index < self.table.capacity() {
            let index = self.index;
            self.index += 1;

            // SAFETY: See `Drain::next`.
            unsafe {
                if self.table.meta(index).is_empty() {
                    continue;
                }
                self.table.set_meta(index, Meta::VACANT);
                self.table.items -= 1;
                return Some(self.table.bucket_slot(index).assume_init_read());
            }
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.table.items, Some(self.table.items))
    }
}

impl<T> ExactSizeIterator for IntoIter<T> {}

impl<T> FusedIterator for IntoIter<T> {}

#[cfg(test)]
mod tests {
    use alloc::format;
    use alloc::rc::Rc;
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::hash::Hasher;

    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use siphasher::sip::SipHasher;

    use super::*;

    struct HashState {
        k0: u64,
        k1: u64,
    }

    impl HashState {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k0: rng.try_next_u64().unwrap(),
                k1: rng.try_next_u64().unwrap(),
            }
        }

        fn build_hasher(&self) -> SipHasher {
            SipHasher::new_with_keys(self.k0, self.k1)
        }
    }

    #[derive(Debug, PartialEq, Eq, Clone)]
    struct Item {
        key: u64,
        value: i32,
    }

    #[derive(Debug, PartialEq, Eq, Clone)]
    struct StringItem {
        key: String,
        value: i32,
    }

    fn hash_key(state: &HashState, key: u64) -> u64 {
        let mut h = state.build_hasher();
        h.write_u64(key);
        h.finish()
    }

    fn hash_string_key(state: &HashState, key: &str) -> u64 {
        let mut h = state.build_hasher();
        h.write(key.as_bytes());
        h.finish()
    }

    /// Inserts `key` under a caller-chosen hash so tests control home slots.
    fn put(table: &mut HashTable<u64>, hash: u64, key: u64) {
        match table.entry(hash, |&k| k == key) {
            Entry::Vacant(entry) => {
                entry.insert(key);
            }
            Entry::Occupied(_) => panic!("{key} already present"),
        }
    }

    /// Slot index and recorded probe distance of the value matching `key`.
    fn slot_of(table: &HashTable<u64>, hash: u64, key: u64) -> Option<(usize, isize)> {
        let index = table.find_index(hash, |&k| k == key)?;
        Some((index, unsafe { table.meta(index) }.probe))
    }

    #[test]
    fn insert_and_find() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(0);
        for k in 0..32u64 {
            let hash = hash_key(&state, k);
            match table.entry(hash, |v: &Item| v.key == k) {
                Entry::Vacant(v) => {
                    v.insert(Item {
                        key: k,
                        value: (k as i32) * 2,
                    });
                }
                Entry::Occupied(_) => panic!("{k} should not be present yet"),
            }
            table.check_invariants();
        }

        assert_eq!(table.len(), 32);
        for k in 0..32u64 {
            let hash = hash_key(&state, k);
            assert_eq!(
                table.find(hash, |v| v.key == k),
                Some(&Item {
                    key: k,
                    value: (k as i32) * 2
                })
            );
        }
        assert!(table.find(hash_key(&state, 99), |v| v.key == 99).is_none());
    }

    #[test]
    fn find_on_empty_table() {
        let table: HashTable<u64> = HashTable::new();
        assert!(table.find(0, |_| true).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn duplicate_entry_is_occupied() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::new();
        let hash = hash_key(&state, 7);

        table
            .entry(hash, |v| v.key == 7)
            .or_insert(Item { key: 7, value: 1 });

        match table.entry(hash, |v| v.key == 7) {
            Entry::Occupied(mut entry) => {
                assert_eq!(entry.get().value, 1);
                entry.get_mut().value = 2;
            }
            Entry::Vacant(_) => panic!("expected an occupied entry"),
        }

        assert_eq!(table.len(), 1);
        assert_eq!(table.find(hash, |v| v.key == 7).unwrap().value, 2);
    }

    #[test]
    fn find_mut_and_modify() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..10u64 {
            table
                .entry(hash_key(&state, k), |v| v.key == k)
                .or_insert(Item { key: k, value: 0 });
        }

        for k in 0..10u64 {
            if let Some(item) = table.find_mut(hash_key(&state, k), |v| v.key == k) {
                item.value = k as i32 + 100;
            }
        }

        for k in 0..10u64 {
            let item = table.find(hash_key(&state, k), |v| v.key == k).unwrap();
            assert_eq!(item.value, k as i32 + 100);
        }
    }

    #[test]
    fn entry_combinators() {
        let state = HashState::default();
        let mut table: HashTable<StringItem> = HashTable::new();
        let hash = hash_string_key(&state, "counter");

        let mut calls = 0;
        for _ in 0..3 {
            table
                .entry(hash, |v| v.key == "counter")
                .and_modify(|v| v.value += 1)
                .or_insert_with(|| {
                    calls += 1;
                    StringItem {
                        key: "counter".to_string(),
                        value: 0,
                    }
                });
        }

        assert_eq!(calls, 1);
        assert_eq!(table.find(hash, |v| v.key == "counter").unwrap().value, 2);

        let mut defaults: HashTable<u64> = HashTable::new();
        *defaults.entry(5, |&v| v == 0).or_default() += 0;
        assert_eq!(defaults.find(5, |&v| v == 0), Some(&0));
    }

    #[test]
    fn vacant_entry_reports_hash() {
        let mut table: HashTable<u64> = HashTable::new();
        match table.entry(0xabc, |&v| v == 1) {
            Entry::Vacant(entry) => {
                assert_eq!(entry.hash(), 0xabc);
                assert_eq!(*entry.insert(1), 1);
            }
            Entry::Occupied(_) => panic!("expected a vacant entry"),
        }
    }

    #[test]
    fn remove_items() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..64u64 {
            table.entry(hash_key(&state, k), |v| v.key == k).or_insert(Item {
                key: k,
                value: k as i32,
            });
        }

        for k in (0..64u64).step_by(2) {
            let removed = table.remove(hash_key(&state, k), |v| v.key == k);
            assert_eq!(
                removed,
                Some(Item {
                    key: k,
                    value: k as i32
                })
            );
            table.check_invariants();
        }

        assert_eq!(table.len(), 32);
        for k in 0..64u64 {
            let found = table.find(hash_key(&state, k), |v| v.key == k);
            assert_eq!(found.is_some(), k % 2 == 1, "key {k}");
        }

        let capacity = table.capacity();
        assert!(table.remove(hash_key(&state, 0), |v| v.key == 0).is_none());
        assert_eq!(table.len(), 32);
        assert_eq!(table.capacity(), capacity);
    }

    #[test]
    fn occupied_entry_remove() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..8u64 {
            table
                .entry(hash_key(&state, k), |v| v.key == k)
                .or_insert(Item { key: k, value: 1 });
        }

        match table.entry(hash_key(&state, 3), |v| v.key == 3) {
            Entry::Occupied(entry) => assert_eq!(entry.remove().key, 3),
            Entry::Vacant(_) => panic!("expected an occupied entry"),
        }

        assert_eq!(table.len(), 7);
        assert!(table.find(hash_key(&state, 3), |v| v.key == 3).is_none());
        table.check_invariants();
    }

    #[test]
    fn default_table_has_sixteen_slots() {
        let table: HashTable<u64> = HashTable::new();
        assert_eq!(table.capacity(), 16);
        assert_eq!(table.max_load(), 12);
        assert_eq!(HashTable::<u64>::default().capacity(), 16);
        assert_eq!(HashTable::<u64>::with_size_exponent(0).capacity(), 1);
        assert_eq!(HashTable::<u64>::with_size_exponent(10).capacity(), 1024);
    }

    #[test]
    fn with_capacity_rounds_to_load_limit() {
        assert_eq!(HashTable::<u64>::with_capacity(0).capacity(), 16);
        assert_eq!(HashTable::<u64>::with_capacity(12).capacity(), 16);
        assert_eq!(HashTable::<u64>::with_capacity(13).capacity(), 32);
        assert_eq!(HashTable::<u64>::with_capacity(100).capacity(), 256);
    }

    #[test]
    fn grows_on_thirteenth_insert() {
        let state = HashState::default();
        let mut table: HashTable<u64> = HashTable::new();

        for k in 0..12u64 {
            table.entry(hash_key(&state, k), |&v| v == k).or_insert(k);
        }
        assert_eq!(table.len(), 12);
        assert_eq!(table.capacity(), 16);

        table.entry(hash_key(&state, 12), |&v| v == 12).or_insert(12);
        assert_eq!(table.len(), 13);
        assert_eq!(table.capacity(), 32);
        table.check_invariants();

        for k in 0..13u64 {
            assert_eq!(table.find(hash_key(&state, k), |&v| v == k), Some(&k));
        }
    }

    #[test]
    fn tiny_table_grows_before_first_insert() {
        let mut table: HashTable<u64> = HashTable::with_size_exponent(0);
        put(&mut table, 5, 5);
        assert_eq!(table.capacity(), 2);
        assert_eq!(table.find(5, |&v| v == 5), Some(&5));
        table.check_invariants();
    }

    #[test]
    fn richer_resident_is_displaced() {
        let mut table: HashTable<u64> = HashTable::new();

        // a and c share home 0, b lives at home 1.
        put(&mut table, 0, 100);
        put(&mut table, 1, 200);
        put(&mut table, 16, 300);

        assert_eq!(slot_of(&table, 0, 100), Some((0, 0)));
        assert_eq!(slot_of(&table, 16, 300), Some((1, 1)));
        assert_eq!(slot_of(&table, 1, 200), Some((2, 1)));
        assert_eq!(table.max_probe, 1);
        table.check_invariants();
    }

    #[test]
    fn lookup_of_absent_key_in_cluster() {
        let mut table: HashTable<u64> = HashTable::new();
        for (hash, key) in [(0, 1), (16, 2), (32, 3), (3, 4)] {
            put(&mut table, hash, key);
        }

        assert!(table.find(48, |&k| k == 5).is_none());
        assert!(table.find(3, |&k| k == 6).is_none());
        assert!(table.find(5, |&k| k == 7).is_none());
    }

    #[test]
    fn removal_shifts_cluster_back() {
        let mut table: HashTable<u64> = HashTable::new();
        put(&mut table, 0, 1);
        put(&mut table, 16, 2);
        put(&mut table, 32, 3);

        assert_eq!(slot_of(&table, 16, 2), Some((1, 1)));
        assert_eq!(slot_of(&table, 32, 3), Some((2, 2)));

        assert_eq!(table.remove(0, |&k| k == 1), Some(1));

        assert_eq!(slot_of(&table, 16, 2), Some((0, 0)));
        assert_eq!(slot_of(&table, 32, 3), Some((1, 1)));
        assert!(unsafe { table.meta(2) }.is_empty());
        table.check_invariants();
    }

    #[test]
    fn removal_shift_wraps_around_end() {
        let mut table: HashTable<u64> = HashTable::new();
        put(&mut table, 15, 1);
        put(&mut table, 31, 2);
        put(&mut table, 47, 3);

        assert_eq!(slot_of(&table, 15, 1), Some((15, 0)));
        assert_eq!(slot_of(&table, 31, 2), Some((0, 1)));
        assert_eq!(slot_of(&table, 47, 3), Some((1, 2)));

        assert_eq!(table.remove(15, |&k| k == 1), Some(1));

        assert_eq!(slot_of(&table, 31, 2), Some((15, 0)));
        assert_eq!(slot_of(&table, 47, 3), Some((0, 1)));
        assert!(unsafe { table.meta(1) }.is_empty());
        table.check_invariants();
    }

    #[test]
    fn removal_shift_stops_at_home_slot() {
        let mut table: HashTable<u64> = HashTable::new();
        put(&mut table, 14, 1);
        put(&mut table, 30, 2);
        put(&mut table, 0, 3);

        assert_eq!(slot_of(&table, 30, 2), Some((15, 1)));
        assert_eq!(slot_of(&table, 0, 3), Some((0, 0)));

        assert_eq!(table.remove(14, |&k| k == 1), Some(1));

        assert_eq!(slot_of(&table, 30, 2), Some((14, 0)));
        assert_eq!(slot_of(&table, 0, 3), Some((0, 0)));
        assert!(unsafe { table.meta(15) }.is_empty());
        table.check_invariants();
    }

    #[test]
    fn removing_last_in_cluster_needs_no_shift() {
        let mut table: HashTable<u64> = HashTable::new();
        put(&mut table, 4, 1);
        put(&mut table, 20, 2);

        assert_eq!(table.remove(20, |&k| k == 2), Some(2));
        assert_eq!(slot_of(&table, 4, 1), Some((4, 0)));
        assert!(unsafe { table.meta(5) }.is_empty());
        table.check_invariants();
    }

    #[test]
    fn explicit_collision() {
        let mut table: HashTable<u64> = HashTable::new();
        for key in 0..100u64 {
            put(&mut table, 0, key);
        }
        table.check_invariants();
        assert_eq!(table.len(), 100);
        assert_eq!(table.capacity(), 256);
        assert_eq!(table.max_probe, 99);

        for key in 0..100u64 {
            assert_eq!(table.find(0, |&k| k == key), Some(&key));
        }

        for key in (0..100u64).filter(|k| k % 3 == 0) {
            assert_eq!(table.remove(0, |&k| k == key), Some(key));
            table.check_invariants();
        }

        for key in 0..100u64 {
            assert_eq!(table.find(0, |&k| k == key).is_some(), key % 3 != 0);
        }
    }

    #[test]
    fn iter_and_drain() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..50u64 {
            table.entry(hash_key(&state, k), |v| v.key == k).or_insert(Item {
                key: k,
                value: k as i32,
            });
        }

        let iter = table.iter();
        assert_eq!(iter.len(), 50);
        let mut keys: Vec<u64> = iter.map(|item| item.key).collect();
        keys.sort_unstable();
        assert_eq!(keys, (0..50).collect::<Vec<_>>());

        let capacity = table.capacity();
        let mut drained: Vec<Item> = table.drain().collect();
        drained.sort_by_key(|item| item.key);
        assert_eq!(drained.len(), 50);
        assert_eq!(drained[49], Item { key: 49, value: 49 });

        assert!(table.is_empty());
        assert_eq!(table.capacity(), capacity);
        assert_eq!(table.iter().next(), None);
        table.check_invariants();
    }

    #[test]
    fn partial_drain_empties_table() {
        let mut table: HashTable<String> = HashTable::new();
        for k in 0..10u64 {
            table.entry(k, |v| *v == k.to_string()).or_insert(k.to_string());
        }

        let mut drain = table.drain();
        assert_eq!(drain.len(), 10);
        assert!(drain.next().is_some());
        drop(drain);

        assert!(table.is_empty());
        table.check_invariants();
        table.entry(3, |v| v == "3").or_insert("3".to_string());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn iterators_are_fused() {
        let mut table: HashTable<u64> = HashTable::new();
        put(&mut table, 1, 1);

        let mut iter = table.iter();
        assert_eq!(iter.next(), Some(&1));
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn iter_mut_updates_values() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..20u64 {
            table
                .entry(hash_key(&state, k), |v| v.key == k)
                .or_insert(Item { key: k, value: 1 });
        }

        assert_eq!(table.iter_mut().len(), 20);
        for item in &mut table {
            item.value *= 10;
        }

        assert!(table.iter().all(|item| item.value == 10));
    }

    #[test]
    fn into_iter_yields_everything() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..30u64 {
            table.entry(hash_key(&state, k), |v| v.key == k).or_insert(Item {
                key: k,
                value: k as i32,
            });
        }

        let mut items: Vec<u64> = table.into_iter().map(|item| item.key).collect();
        items.sort_unstable();
        assert_eq!(items, (0..30).collect::<Vec<_>>());
    }

    #[test]
    fn clear_keeps_capacity() {
        let state = HashState::default();
        let mut table: HashTable<u64> = HashTable::new();
        for k in 0..40u64 {
            table.entry(hash_key(&state, k), |&v| v == k).or_insert(k);
        }
        let capacity = table.capacity();

        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.capacity(), capacity);
        assert_eq!(table.max_probe, 0);
        assert!(table.find(hash_key(&state, 1), |&v| v == 1).is_none());
        table.check_invariants();
    }

    #[test]
    fn values_are_dropped_exactly_once() {
        let tracker = Rc::new(());
        let mut table: HashTable<(u64, Rc<()>)> = HashTable::new();

        for k in 0..40u64 {
            table
                .entry(k % 7, |v| v.0 == k)
                .or_insert((k, Rc::clone(&tracker)));
        }
        assert_eq!(Rc::strong_count(&tracker), 41);

        for k in 0..10u64 {
            let removed = table.remove(k % 7, |v| v.0 == k);
            assert!(removed.is_some());
        }
        assert_eq!(Rc::strong_count(&tracker), 31);

        let drained = table.drain().take(5).count();
        assert_eq!(drained, 5);
        assert_eq!(Rc::strong_count(&tracker), 1);

        for k in 0..20u64 {
            table
                .entry(k, |v| v.0 == k)
                .or_insert((k, Rc::clone(&tracker)));
        }
        let cloned = table.clone();
        assert_eq!(Rc::strong_count(&tracker), 41);

        drop(cloned);
        table.clear();
        assert_eq!(Rc::strong_count(&tracker), 1);

        for k in 0..5u64 {
            table
                .entry(k, |v| v.0 == k)
                .or_insert((k, Rc::clone(&tracker)));
        }
        drop(table);
        assert_eq!(Rc::strong_count(&tracker), 1);
    }

    #[test]
    fn test_clone() {
        let state = HashState::default();
        let mut original: HashTable<StringItem> = HashTable::with_capacity(10);

        let test_data = [
            ("hello", 1),
            ("world", 2),
            ("rust", 3),
            ("robin", 4),
            ("hood", 5),
        ];

        for (key, value) in test_data.iter() {
            let hash = hash_string_key(&state, key);
            original
                .entry(hash, |v| v.key == *key)
                .or_insert(StringItem {
                    key: key.to_string(),
                    value: *value,
                });
        }

        let cloned = original.clone();
        assert_eq!(cloned.len(), test_data.len());
        assert_eq!(cloned.capacity(), original.capacity());
        cloned.check_invariants();

        let hash = hash_string_key(&state, "hello");
        if let Some(item) = original.find_mut(hash, |v| v.key == "hello") {
            item.value = 999;
        }

        assert_eq!(original.find(hash, |v| v.key == "hello").unwrap().value, 999);
        assert_eq!(cloned.find(hash, |v| v.key == "hello").unwrap().value, 1);

        for (key, expected_value) in test_data.iter() {
            let hash = hash_string_key(&state, key);
            let cloned_item = cloned.find(hash, |v| v.key == *key).unwrap();
            assert_eq!(cloned_item.value, *expected_value);
        }
    }

    #[test]
    fn clone_empty() {
        let original: HashTable<Item> = HashTable::new();
        let cloned = original.clone();
        assert!(cloned.is_empty());
        assert_eq!(cloned.capacity(), 16);
    }

    #[test]
    fn churn_preserves_invariants() {
        let state = HashState::default();
        let mut table: HashTable<u64> = HashTable::new();
        let mut live = Vec::new();

        for round in 0..2000u64 {
            let key = round * 7919 % 1013;
            let hash = hash_key(&state, key);
            if table.remove(hash, |&v| v == key).is_some() {
                live.retain(|&k| k != key);
            } else {
                table.entry(hash, |&v| v == key).or_insert(key);
                live.push(key);
            }

            if round % 50 == 0 {
                table.check_invariants();
            }
        }

        table.check_invariants();
        assert_eq!(table.len(), live.len());
        for key in live {
            assert_eq!(table.find(hash_key(&state, key), |&v| v == key), Some(&key));
        }
    }

    #[test]
    fn histogram_and_stats() {
        let mut table: HashTable<u64> = HashTable::new();
        put(&mut table, 0, 1);
        put(&mut table, 16, 2);
        put(&mut table, 32, 3);
        put(&mut table, 7, 4);

        let histogram = table.probe_histogram();
        assert_eq!(histogram.counts, vec![2, 1, 1]);
        assert_eq!(histogram.total(), 4);

        let stats = table.debug_stats();
        assert_eq!(stats.populated, 4);
        assert_eq!(stats.capacity, 16);
        assert_eq!(stats.max_load, 12);
        assert_eq!(stats.max_probe, 2);
        assert_eq!(stats.recorded_max_probe, 2);
        assert!((stats.load_factor - 0.25).abs() < f64::EPSILON);
        assert!((stats.mean_probe - 0.75).abs() < 1e-9);
        assert!((stats.probe_variance - 0.6875).abs() < 1e-9);
        assert_eq!(stats.wasted_bytes, 12 * core::mem::size_of::<u64>());
        assert!(stats.total_bytes >= 16 * core::mem::size_of::<u64>());

        let empty: HashTable<u64> = HashTable::new();
        assert_eq!(empty.probe_histogram().counts, vec![0]);
        assert_eq!(empty.debug_stats().mean_probe, 0.0);
    }

    #[test]
    fn debug_lists_probe_distances() {
        let mut table: HashTable<u64> = HashTable::new();
        put(&mut table, 0, 1);
        put(&mut table, 16, 2);

        let debug = format!("{table:?}");
        assert!(debug.contains("00 01 .."), "{debug}");
        assert!(debug.contains("populated: 2"), "{debug}");
        assert!(debug.contains("capacity: 16"), "{debug}");
    }

    #[test]
    fn string_keys() {
        let state = HashState::default();
        let mut table: HashTable<StringItem> = HashTable::new();
        let words = ["alpha", "beta", "gamma", "delta", "epsilon", "zeta"];

        for (i, word) in words.iter().enumerate() {
            let hash = hash_string_key(&state, word);
            table.entry(hash, |v| v.key == *word).or_insert(StringItem {
                key: word.to_string(),
                value: i as i32,
            });
        }

        for (i, word) in words.iter().enumerate() {
            let hash = hash_string_key(&state, word);
            assert_eq!(table.find(hash, |v| v.key == *word).unwrap().value, i as i32);
        }
        assert!(
            table
                .find(hash_string_key(&state, "eta"), |v| v.key == "eta")
                .is_none()
        );
    }
}
