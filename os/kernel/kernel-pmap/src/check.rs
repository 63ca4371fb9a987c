//! # Boot self-checks
//!
//! Scenario tests run once on the live memory manager right after
//! [`page_init`](crate::vm_init::page_init). Both leave the manager as they
//! found it when they pass; a failure means the kernel cannot trust its
//! allocator and should halt.

use crate::error::MmError;
use crate::pmap::MemoryManager;
use kernel_memory_addresses::{PAGE_SIZE, VirtualAddress};
use kernel_vmem::{PageEntryBits, PhysMapper};

/// A failed expectation, or an error the scenario did not expect.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckError {
    #[error("{check}: expected {what}")]
    Failed {
        check: &'static str,
        what: &'static str,
    },
    #[error(transparent)]
    Mm(#[from] MmError),
}

/// ASID of the scratch space built by [`page_check`]. Never the kernel's.
pub const CHECK_ASID: u16 = 0x7ff;

macro_rules! ensure {
    ($check:expr, $cond:expr, $what:literal) => {
        if !$cond {
            log::error!("{}: expected {}", $check, $what);
            return Err(CheckError::Failed {
                check: $check,
                what: $what,
            });
        }
    };
}

/// Allocation, exhaustion and reuse of physical pages.
///
/// # Errors
/// The first expectation that did not hold.
pub fn physical_memory_manage_check<M: PhysMapper>(
    mm: &mut MemoryManager<'_, M>,
) -> Result<(), CheckError> {
    const CHECK: &str = "physical_memory_manage_check";
    let free_before = mm.free_count();

    let pp0 = mm.alloc_page()?;
    let pp1 = mm.alloc_page()?;
    let pp2 = mm.alloc_page()?;
    ensure!(CHECK, pp0 != pp1 && pp1 != pp2 && pp0 != pp2, "three distinct pages");

    let stolen = mm.detach_free_pages(0);
    ensure!(CHECK, mm.alloc_page() == Err(MmError::OutOfMemory), "allocation to fail with an empty free list");

    mm.with_page_bytes(pp0, |bytes| bytes[..4].copy_from_slice(&1000u32.to_le_bytes()));
    ensure!(
        CHECK,
        mm.with_page_bytes(pp0, |bytes| bytes[..4] == 1000u32.to_le_bytes()),
        "a written page to read back"
    );
    mm.free_page(pp0);
    let again = mm.alloc_page()?;
    ensure!(CHECK, again == pp0, "the freed page to be handed out again");
    ensure!(
        CHECK,
        mm.with_page_bytes(again, |bytes| bytes.iter().all(|&b| b == 0)),
        "a reallocated page to read zero"
    );

    mm.reattach_free_pages(stolen);
    mm.free_page(pp0);
    mm.free_page(pp1);
    mm.free_page(pp2);
    ensure!(CHECK, mm.free_count() == free_before, "every page to be returned");

    log::info!("{CHECK}() succeeded");
    Ok(())
}

/// Insertion, replacement and removal against a scratch address space,
/// with the free list drained so table allocation can be observed.
///
/// # Errors
/// The first expectation that did not hold.
pub fn page_check<M: PhysMapper>(mm: &mut MemoryManager<'_, M>) -> Result<(), CheckError> {
    const CHECK: &str = "page_check";
    let perm = PageEntryBits::kernel_rw();
    let va = VirtualAddress::new;
    let free_before = mm.free_count();

    let space = mm.create_space(CHECK_ASID)?;
    let pp0 = mm.alloc_page()?;
    let pp1 = mm.alloc_page()?;
    let pp2 = mm.alloc_page()?;
    let pp3 = mm.alloc_page()?;
    ensure!(
        CHECK,
        [pp1, pp2, pp3].iter().all(|&p| p != pp0) && pp1 != pp2 && pp1 != pp3 && pp2 != pp3,
        "four distinct pages"
    );

    let stolen = mm.detach_free_pages(0);
    ensure!(CHECK, mm.alloc_page() == Err(MmError::OutOfMemory), "allocation to fail with an empty free list");

    // Mapping at 0 needs a level-1 and a level-0 table.
    ensure!(CHECK, mm.insert(&space, pp1, va(0), perm) == Err(MmError::OutOfMemory), "insertion without table frames to fail");
    mm.free_page(pp0);
    ensure!(CHECK, mm.insert(&space, pp1, va(0), perm) == Err(MmError::OutOfMemory), "insertion with one of two table frames to fail");
    ensure!(CHECK, mm.is_free(pp0) && space.walk(va(0)).is_none(), "a failed insertion to leave no table behind");

    mm.free_page(pp3);
    mm.insert(&space, pp1, va(0), perm)?;
    ensure!(CHECK, mm.translate(&space, va(0)) == Some(mm.page_to_pa(pp1)), "va 0 to map pp1");
    ensure!(CHECK, mm.ref_count(pp1) == 1, "pp1 to hold one reference");
    ensure!(CHECK, mm.ref_count(pp0) == 1 && mm.ref_count(pp3) == 1, "new tables to hold one reference each");

    mm.insert(&space, pp2, va(PAGE_SIZE), perm)?;
    ensure!(CHECK, mm.translate(&space, va(PAGE_SIZE)) == Some(mm.page_to_pa(pp2)), "one page up to map pp2");
    ensure!(CHECK, mm.ref_count(pp2) == 1, "pp2 to hold one reference");
    ensure!(CHECK, mm.alloc_page() == Err(MmError::OutOfMemory), "the free list to stay empty");

    mm.insert(&space, pp2, va(PAGE_SIZE), perm)?;
    ensure!(CHECK, mm.ref_count(pp2) == 1, "re-inserting pp2 to keep one reference");
    ensure!(CHECK, mm.alloc_page() == Err(MmError::OutOfMemory), "re-insertion to allocate nothing");

    // The next 2 MiB needs a fresh level-0 table.
    ensure!(CHECK, mm.insert(&space, pp2, va(PAGE_SIZE * 512), perm) == Err(MmError::OutOfMemory), "insertion needing a new table to fail");
    ensure!(CHECK, mm.ref_count(pp2) == 1, "a failed insertion to leave pp2 alone");

    mm.insert(&space, pp1, va(PAGE_SIZE), perm)?;
    ensure!(CHECK, mm.translate(&space, va(0)) == Some(mm.page_to_pa(pp1)), "va 0 to still map pp1");
    ensure!(CHECK, mm.translate(&space, va(PAGE_SIZE)) == Some(mm.page_to_pa(pp1)), "pp1 to replace pp2");
    ensure!(CHECK, mm.ref_count(pp1) == 2 && mm.ref_count(pp2) == 0, "references to follow the replacement");
    ensure!(CHECK, mm.alloc_page() == Ok(pp2), "the replaced page to be free again");

    mm.remove(&space, va(0));
    ensure!(CHECK, mm.translate(&space, va(0)).is_none(), "va 0 to be unmapped");
    ensure!(CHECK, mm.ref_count(pp1) == 1 && mm.ref_count(pp2) == 0, "removal to drop one reference");

    mm.remove(&space, va(PAGE_SIZE));
    ensure!(CHECK, mm.translate(&space, va(PAGE_SIZE)).is_none(), "one page up to be unmapped");
    ensure!(CHECK, mm.ref_count(pp1) == 0, "pp1 to be unreferenced");
    ensure!(CHECK, mm.alloc_page() == Ok(pp1), "pp1 to be free again");
    ensure!(CHECK, mm.alloc_page() == Err(MmError::OutOfMemory), "nothing else to be free");
    ensure!(CHECK, space.walk(va(0)).is_some(), "emptied tables to stay installed");

    mm.destroy_space(space);
    mm.reattach_free_pages(stolen);
    mm.free_page(pp1);
    mm.free_page(pp2);
    ensure!(CHECK, mm.free_count() == free_before, "every page to be returned");

    log::info!("{CHECK}() succeeded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SimRam;
    use crate::vm_init::{page_init, vm_init};
    use crate::BootAllocator;

    #[test]
    fn both_checks_pass_on_a_fresh_manager() {
        let ram = SimRam::new(512);
        let mem = ram.memory();
        let mut boot = BootAllocator::new(&ram, mem, mem.base);
        let layout = vm_init(&mut boot, &[]).expect("vm_init");
        let mut mm = page_init(boot, &layout, &ram);
        let free = mm.free_count();

        physical_memory_manage_check(&mut mm).expect("physical memory check");
        page_check(&mut mm).expect("page check");
        assert_eq!(mm.free_count(), free);
    }

    #[test]
    fn page_check_fences_only_its_own_asid() {
        let ram = SimRam::new(512);
        let mem = ram.memory();
        let mut boot = BootAllocator::new(&ram, mem, mem.base);
        let layout = vm_init(&mut boot, &[]).expect("vm_init");
        let mut mm = page_init(boot, &layout, &ram);

        page_check(&mut mm).expect("page check");
        assert_eq!(
            kernel_vmem::tlb::last_fence(),
            Some(kernel_vmem::tlb::Fence::Page { asid: CHECK_ASID, va: PAGE_SIZE })
        );
    }

    #[test]
    fn failures_name_the_check() {
        let e = CheckError::Failed {
            check: "page_check",
            what: "va 0 to map pp1",
        };
        assert_eq!(e.to_string(), "page_check: expected va 0 to map pp1");
        assert_eq!(CheckError::from(MmError::OutOfMemory).to_string(), "out of memory");
    }
}
