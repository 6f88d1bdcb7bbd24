#![cfg(test)]

// Property tests for the map and the raw table, checked against
// `hashbrown::HashMap` and the table's structural invariants after every step.

use alloc::string::String;
use alloc::vec::Vec;
use core::hash::BuildHasher;
use core::hash::Hasher;

use proptest::prelude::*;
use siphasher::sip::SipHasher;

use crate::hash_map::HashMap;
use crate::hash_table::Entry;
use crate::hash_table::HashTable;

// Keeps only the low `bits` of a SipHash so that short key pools still produce
// shared homes, long clusters, and clusters that wrap past the last slot.
#[derive(Clone, Debug)]
struct NarrowHashBuilder {
    bits: u32,
}

struct NarrowHasher {
    inner: SipHasher,
    mask: u64,
}

impl Hasher for NarrowHasher {
    fn finish(&self) -> u64 {
        self.inner.finish() & self.mask
    }

    fn write(&mut self, bytes: &[u8]) {
        self.inner.write(bytes);
    }
}

impl BuildHasher for NarrowHashBuilder {
    type Hasher = NarrowHasher;

    fn build_hasher(&self) -> Self::Hasher {
        NarrowHasher {
            inner: SipHasher::new_with_keys(0x0123_4567, 0x89ab_cdef),
            mask: (1u64 << self.bits) - 1,
        }
    }
}

#[derive(Clone, Debug)]
enum MapOp {
    Insert(usize, i32),
    Remove(usize),
    Get(usize),
    GetAbsent(String),
    AddViaEntry(usize, i32),
    Iterate,
    Clear,
}

fn arb_map_scenario() -> impl Strategy<Value = (u32, Vec<String>, Vec<MapOp>)> {
    (
        1u32..=8,
        proptest::collection::vec("[a-z]{1,6}", 1..=48),
    )
        .prop_flat_map(|(bits, pool)| {
            let idx = 0..pool.len();
            let op = prop_oneof![
                6 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| MapOp::Insert(i, v)),
                4 => idx.clone().prop_map(MapOp::Remove),
                3 => idx.clone().prop_map(MapOp::Get),
                1 => "[A-Z]{1,6}".prop_map(MapOp::GetAbsent),
                2 => (idx.clone(), -100i32..100).prop_map(|(i, d)| MapOp::AddViaEntry(i, d)),
                1 => Just(MapOp::Iterate),
                1 => Just(MapOp::Clear),
            ];
            proptest::collection::vec(op, 1..200)
                .prop_map(move |ops| (bits, pool.clone(), ops))
        })
}

// Property: every operation returns what `hashbrown::HashMap` returns, and the
// table invariants (probe distances, home-after-empty, count) hold after each
// step, including steps that grow the table or shift clusters back.
proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_map_matches_model((bits, pool, ops) in arb_map_scenario()) {
        let mut sut: HashMap<String, i32, NarrowHashBuilder> =
            HashMap::with_hasher(NarrowHashBuilder { bits });
        let mut model: hashbrown::HashMap<String, i32> = hashbrown::HashMap::new();

        for op in ops {
            match op {
                MapOp::Insert(i, v) => {
                    let key = pool[i].clone();
                    prop_assert_eq!(sut.insert(key.clone(), v), model.insert(key, v));
                }
                MapOp::Remove(i) => {
                    let capacity = sut.capacity();
                    prop_assert_eq!(sut.remove(pool[i].as_str()), model.remove(&pool[i]));
                    prop_assert_eq!(sut.capacity(), capacity);
                }
                MapOp::Get(i) => {
                    prop_assert_eq!(sut.get(pool[i].as_str()), model.get(&pool[i]));
                    prop_assert_eq!(sut.contains_key(&pool[i]), model.contains_key(&pool[i]));
                }
                MapOp::GetAbsent(key) => {
                    prop_assert_eq!(sut.get(&key), None);
                }
                MapOp::AddViaEntry(i, d) => {
                    let ours = *sut.entry(pool[i].clone()).and_modify(|v| *v = v.wrapping_add(d)).or_insert(d);
                    let theirs = *model.entry(pool[i].clone()).and_modify(|v| *v = v.wrapping_add(d)).or_insert(d);
                    prop_assert_eq!(ours, theirs);
                }
                MapOp::Iterate => {
                    let mut ours: Vec<(String, i32)> =
                        sut.iter().map(|(k, v)| (k.clone(), *v)).collect();
                    let mut theirs: Vec<(String, i32)> =
                        model.iter().map(|(k, v)| (k.clone(), *v)).collect();
                    ours.sort();
                    theirs.sort();
                    prop_assert_eq!(ours, theirs);
                }
                MapOp::Clear => {
                    sut.clear();
                    model.clear();
                }
            }

            sut.check_invariants();
            prop_assert_eq!(sut.len(), model.len());
            prop_assert_eq!(sut.is_empty(), model.is_empty());
            prop_assert!(sut.len() <= sut.capacity() * 3 / 4);
        }

        for (key, value) in &model {
            prop_assert_eq!(sut.get(key), Some(value));
        }
    }
}

#[derive(Clone, Debug)]
enum TableOp {
    Insert { key: u16, hash: u64 },
    Remove { key: u16 },
    Find { key: u16 },
}

fn arb_table_ops() -> impl Strategy<Value = Vec<TableOp>> {
    // Hashes drawn from a narrow range pile many keys onto the last slots of
    // small tables, so clusters regularly wrap through index 0.
    let op = prop_oneof![
        3 => (0u16..64, prop_oneof![0u64..64, (0u64..8).prop_map(|h| 15 - h)])
            .prop_map(|(key, hash)| TableOp::Insert { key, hash }),
        2 => (0u16..64).prop_map(|key| TableOp::Remove { key }),
        1 => (0u16..64).prop_map(|key| TableOp::Find { key }),
    ];
    proptest::collection::vec(op, 1..300)
}

// Property: with caller-chosen hashes the raw table agrees with a model that
// remembers each key's hash, and every removal leaves a valid Robin Hood
// layout behind.
proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_table_with_chosen_hashes(ops in arb_table_ops()) {
        let mut table: HashTable<u16> = HashTable::new();
        let mut model: hashbrown::HashMap<u16, u64> = hashbrown::HashMap::new();

        for op in ops {
            match op {
                TableOp::Insert { key, hash } => {
                    let hash = *model.get(&key).unwrap_or(&hash);
                    match table.entry(hash, |&k| k == key) {
                        Entry::Vacant(entry) => {
                            prop_assert!(!model.contains_key(&key));
                            entry.insert(key);
                            model.insert(key, hash);
                        }
                        Entry::Occupied(entry) => {
                            prop_assert_eq!(*entry.get(), key);
                            prop_assert!(model.contains_key(&key));
                        }
                    }
                }
                TableOp::Remove { key } => {
                    match model.remove(&key) {
                        Some(hash) => {
                            prop_assert_eq!(table.remove(hash, |&k| k == key), Some(key));
                        }
                        None => {
                            prop_assert!(table.iter().all(|&k| k != key));
                        }
                    }
                }
                TableOp::Find { key } => {
                    if let Some(&hash) = model.get(&key) {
                        prop_assert_eq!(table.find(hash, |&k| k == key), Some(&key));
                    }
                }
            }

            table.check_invariants();
            prop_assert_eq!(table.len(), model.len());
        }

        let mut stored: Vec<u16> = table.iter().copied().collect();
        let mut expected: Vec<u16> = model.keys().copied().collect();
        stored.sort_unstable();
        expected.sort_unstable();
        prop_assert_eq!(stored, expected);
    }
}
