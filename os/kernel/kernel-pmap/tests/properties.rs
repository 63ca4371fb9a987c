mod common;

use common::{Ram, boot};
use kernel_memory_addresses::VirtualAddress;
use kernel_pmap::PageId;
use kernel_vmem::PageEntryBits;
use proptest::prelude::*;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
enum Op {
    Alloc,
    Free(usize),
    Map(usize, u8),
    Unmap(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Alloc),
        any::<usize>().prop_map(Op::Free),
        (any::<usize>(), 0u8..16).prop_map(|(i, s)| Op::Map(i, s)),
        (0u8..16).prop_map(Op::Unmap),
    ]
}

/// Slots spread over several level-0 tables.
fn slot_va(slot: u8) -> VirtualAddress {
    VirtualAddress::new(0x1_0000 + u64::from(slot) * 0x8_0000)
}

proptest! {
    #[test]
    fn descriptors_are_conserved(ops in prop::collection::vec(op(), 1..64)) {
        let mut ram = Ram::new(512);
        let mapper = ram.mapper();
        let (_, mut mm) = boot(&mapper, ram.memory(), 0);
        let space = mm.create_space(1).expect("space");
        let mut held: Vec<PageId> = Vec::new();

        for op in ops {
            match op {
                Op::Alloc => {
                    if let Ok(p) = mm.alloc_page() {
                        prop_assert!(!held.contains(&p));
                        held.push(p);
                    }
                }
                Op::Free(i) if !held.is_empty() => {
                    let p = held.swap_remove(i % held.len());
                    mm.free_page(p);
                }
                Op::Map(i, slot) if !held.is_empty() => {
                    let p = held.swap_remove(i % held.len());
                    if mm.insert(&space, p, slot_va(slot), PageEntryBits::user_rw()).is_err() {
                        held.push(p);
                    }
                }
                Op::Unmap(slot) => mm.remove(&space, slot_va(slot)),
                _ => {}
            }

            let pages = mm.pages();
            let on_list = pages.iter().filter(|p| p.is_free()).count();
            prop_assert_eq!(on_list, mm.free_count());
            prop_assert!(pages.iter().filter(|p| p.is_free()).all(|p| p.refs() == 0));
            let handed_out = pages.iter().filter(|p| p.refs() == 0 && !p.is_free()).count();
            prop_assert_eq!(handed_out, held.len());
            prop_assert_eq!(
                pages.iter().filter(|p| p.refs() == 0).count() + pages.iter().filter(|p| p.refs() > 0).count(),
                mm.frames()
            );
        }
    }

    #[test]
    fn consecutive_allocations_are_distinct_and_zeroed(n in 1usize..128) {
        let mut ram = Ram::new(512);
        let mapper = ram.mapper();
        let (_, mut mm) = boot(&mapper, ram.memory(), 0);

        let mut seen = BTreeSet::new();
        for _ in 0..n {
            let p = mm.alloc_page().expect("page");
            prop_assert!(seen.insert(p));
            prop_assert!(mm.with_page_bytes(p, |bytes| bytes.iter().all(|&b| b == 0)));
        }
    }
}
