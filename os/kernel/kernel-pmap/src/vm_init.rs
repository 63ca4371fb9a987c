//! # Bring-up
//!
//! [`vm_init`] builds the kernel address space with nothing but the
//! [`BootAllocator`]; [`page_init`] then turns everything above the
//! allocator's high-water mark into the free list.
//!
//! ```text
//!  DRAM_BASE    KERNEL_LOAD          end of image                     RAM end
//!  │ firmware   │ text rodata data bss │ root │ tables │ arena │ envs │ window │ free …
//!  └──────────── pinned (ref = 1) ──────────────────────────────────────────┘
//! ```

use crate::boot_alloc::BootAllocator;
use crate::error::MmError;
use crate::free_list::FreeList;
use crate::page_info::{PageId, PageInfo, arena_bytes};
use crate::phys_mapper::{window_perm, window_slot};
use crate::pmap::{MemoryManager, map_segment};
use kernel_info::memory::{ENV_RECORD_BYTES, NENV, PDMAP, UENVS, UPAGES, WINDOW_BASE};
use kernel_memory_addresses::{
    PAGE_SIZE, PhysicalAddress, PhysicalPage, Size4K, VirtualAddress, page_align_down,
    page_align_up,
};
use kernel_vmem::staging::StagedTable;
use kernel_vmem::{AddressSpace, Level, PageEntryBits, PageTable, PageTableEntry, PhysMapper, TableIndex};

/// A physical range the kernel maps onto itself.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Segment {
    pub name: &'static str,
    pub start: PhysicalAddress,
    pub end: PhysicalAddress,
    pub perm: PageEntryBits,
}

impl Segment {
    #[must_use]
    pub const fn new(
        name: &'static str,
        start: PhysicalAddress,
        end: PhysicalAddress,
        perm: PageEntryBits,
    ) -> Self {
        Self {
            name,
            start,
            end,
            perm,
        }
    }

    /// Page-rounded span of the segment.
    #[must_use]
    pub const fn size(&self) -> u64 {
        page_align_up(self.end.as_u64()) - page_align_down(self.start.as_u64())
    }
}

/// The level-1 and the contiguous level-0 tables behind the window.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct WindowTables {
    pub l1: PhysicalPage<Size4K>,
    pub l0_base: PhysicalPage<Size4K>,
    pub count: usize,
}

/// What [`vm_init`] placed where.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BootLayout {
    /// Root table of the kernel address space.
    pub root: PhysicalPage<Size4K>,
    /// Page descriptor arena, mapped read-only at `UPAGES`.
    pub arena: PhysicalAddress,
    pub arena_bytes: u64,
    /// Environment table, mapped read-only at `UENVS`.
    pub envs: PhysicalAddress,
    pub env_bytes: u64,
    pub window: WindowTables,
    /// First byte not reserved during bring-up.
    pub high_water: PhysicalAddress,
}

/// Build the kernel address space.
///
/// `segments` are mapped at their physical addresses. Every frame reserved
/// along the way, including the window tables themselves, ends up windowed.
///
/// # Errors
/// - [`MmError::OutOfMemory`] if the bootstrap allocator cannot provide a
///   table frame.
/// - [`MmError::InvalidArgument`] for a segment that wraps.
pub fn vm_init<M: PhysMapper>(
    boot: &mut BootAllocator<'_, M>,
    segments: &[Segment],
) -> Result<BootLayout, MmError> {
    let mapper = boot.mapper();
    let mem = boot.memory();
    log::info!(
        "Physical memory: {}K available, base = {}",
        mem.size / 1024,
        mem.base
    );

    let root = PhysicalPage::containing(boot.boot_alloc(PAGE_SIZE, PAGE_SIZE, true));
    let space = AddressSpace::from_root(mapper, root, 0);
    log::debug!("kernel root table at {root}");
    map_segment(
        &space,
        boot,
        VirtualAddress::new(root.base().as_u64()),
        PAGE_SIZE,
        root.base(),
        PageEntryBits::kernel_ro(),
    )?;

    for seg in segments {
        log::debug!("mapping {} {}..{} ({:#x} bytes)", seg.name, seg.start, seg.end, seg.size());
        map_segment(
            &space,
            boot,
            VirtualAddress::new(page_align_down(seg.start.as_u64())),
            seg.size(),
            seg.start,
            seg.perm,
        )?;
    }

    let arena_len = arena_bytes(mem.frames());
    let arena = boot.boot_alloc(arena_len, PAGE_SIZE, true);
    map_segment(&space, boot, VirtualAddress::new(UPAGES), arena_len, arena, PageEntryBits::user_ro())?;
    log::debug!("page descriptors at {arena}, {arena_len:#x} bytes");

    let env_len = page_align_up((NENV * ENV_RECORD_BYTES) as u64);
    let envs = boot.boot_alloc(env_len, PAGE_SIZE, true);
    map_segment(&space, boot, VirtualAddress::new(UENVS), env_len, envs, PageEntryBits::user_ro())?;
    log::debug!("environment table at {envs}, {env_len:#x} bytes");

    let window = reserve_window(boot, root)?;

    let high_water = boot.high_water();
    let mut frame = PhysicalPage::<Size4K>::containing(mem.base);
    let mut windowed = 0usize;
    while frame.base() < high_water {
        write_window_leaf(mapper, window.l0_base, frame);
        windowed += 1;
        let Some(next) = frame.next() else { break };
        frame = next;
    }
    log::debug!("windowed {windowed} boot frames");

    log::info!("vm_init: kernel address space ready, high water at {high_water}");
    Ok(BootLayout {
        root,
        arena,
        arena_bytes: arena_len,
        envs,
        env_bytes: env_len,
        window,
        high_water,
    })
}

/// Install the window's level-1 table under the root and one level-0 table
/// per 2 MiB of RAM, all from one contiguous reservation.
fn reserve_window<M: PhysMapper>(
    boot: &mut BootAllocator<'_, M>,
    root: PhysicalPage<Size4K>,
) -> Result<WindowTables, MmError> {
    let mapper = boot.mapper();
    let count = boot.memory().size.div_ceil(PDMAP);
    if count > 512 {
        return Err(MmError::InvalidArgument("RAM exceeds the self-mapping window"));
    }

    let l1 = PhysicalPage::containing(boot.boot_alloc(PAGE_SIZE, PAGE_SIZE, false));
    let l0_base = boot.boot_alloc(count * PAGE_SIZE, PAGE_SIZE, false);

    // SAFETY: the root was windowed by the boot allocator.
    let root_table: &mut PageTable = unsafe { mapper.phys_to_mut(root.base()) };
    let root_index = Level::L2.index_of(VirtualAddress::new(WINDOW_BASE));
    let l1 = StagedTable::new(l1)
        .map_window(mapper)
        .zeroed(mapper)
        .install(root_table, root_index)
        .frame();

    // SAFETY: windowed by the staging step above.
    let l1_table: &mut PageTable = unsafe { mapper.phys_to_mut(l1.base()) };
    for i in 0..count {
        let frame = PhysicalPage::containing(l0_base + i * PAGE_SIZE);
        #[allow(clippy::cast_possible_truncation)]
        let index = TableIndex::new(i as u16);
        let _ = StagedTable::new(frame)
            .map_window(mapper)
            .zeroed(mapper)
            .install(l1_table, index);
    }

    #[allow(clippy::cast_possible_truncation)]
    let count = count as usize;
    log::debug!("window: L1 {l1}, {count} L0 tables from {l0_base}");
    Ok(WindowTables {
        l1,
        l0_base: PhysicalPage::containing(l0_base),
        count,
    })
}

fn write_window_leaf<M: PhysMapper>(
    mapper: &M,
    l0_base: PhysicalPage<Size4K>,
    frame: PhysicalPage<Size4K>,
) {
    let Some((table, index)) = window_slot(l0_base.base(), frame) else {
        panic!("boot frame {frame} lies outside the self-mapping window");
    };
    // SAFETY: window tables were windowed when they were installed.
    let table: &mut PageTable = unsafe { mapper.phys_to_mut(table.base()) };
    table.set(index, PageTableEntry::make_leaf(frame, window_perm()));
}

/// Hand every frame at or above the bootstrap high-water mark to a new
/// [`MemoryManager`], pinning everything below it with one reference.
///
/// `mapper` is how the manager reaches frames from now on; on hardware it is
/// the window, so paging must already be on.
pub fn page_init<'m, M: PhysMapper, B: PhysMapper>(
    boot: BootAllocator<'_, B>,
    layout: &BootLayout,
    mapper: &'m M,
) -> MemoryManager<'m, M> {
    let mem = boot.memory();
    let frames = mem.frames();
    let high = page_align_up(boot.high_water().as_u64());
    #[allow(clippy::cast_possible_truncation)]
    let pinned = (((high - mem.base.as_u64()) / PAGE_SIZE) as usize).min(frames);

    // SAFETY: vm_init reserved and windowed `frames` descriptors at
    // `layout.arena`; the window is linear over DRAM.
    let pages: &'m mut [PageInfo] = unsafe {
        let first: &mut PageInfo = mapper.phys_to_mut(layout.arena);
        core::slice::from_raw_parts_mut(core::ptr::from_mut(first), frames)
    };

    let (used, unused) = pages.split_at_mut(pinned);
    used.fill(PageInfo::pinned());
    unused.fill(PageInfo::default());

    let mut free = FreeList::new();
    for index in pinned..frames {
        free.push_front(pages, PageId::from_index(index));
    }

    log::info!("page_init: {pinned} frames pinned, {} free", free.len());
    MemoryManager::from_parts(mapper, pages, free, mem.base, layout.root)
}
