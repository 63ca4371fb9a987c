//! # Memory manager
//!
//! [`MemoryManager`] owns the page descriptor arena and the free list and
//! implements the reference-counted page lifecycle on top of the Sv39
//! walker from [`kernel_vmem`].
//!
//! ## Reference counts
//!
//! A descriptor's count is the number of valid leaf entries referencing its
//! frame, plus one for frames pinned at boot and one for every frame holding
//! an installed page table. A page is on the free list iff its count is zero
//! and it has not been handed out by [`MemoryManager::alloc_page`] since.
//!
//! Leaves installed by [`map_segment`] carry the `fixed` marker and hold no
//! reference. Removing them or destroying their space never touches the
//! count of the frame they map.
//!
//! ## Interrupts
//!
//! Every operation that allocates, frees, or edits an entry runs inside an
//! [`IrqGuard`]; the previous interrupt state is restored on every exit path.

use crate::error::MmError;
use crate::free_list::FreeList;
use crate::page_info::{PageId, PageInfo};
use kernel_memory_addresses::{
    PAGE_SIZE, PhysicalAddress, PhysicalPage, Size4K, VirtualAddress, page_align_down,
};
use kernel_sync::IrqGuard;
use kernel_vmem::{
    AddressSpace, FrameAlloc, LeafSlot, Level, PageEntryBits, PageTable, PageTableEntry,
    PhysMapper, TableIndex,
};

/// Physical page allocator and mapper for one machine.
pub struct MemoryManager<'m, M: PhysMapper> {
    mapper: &'m M,
    pages: &'m mut [PageInfo],
    free: FreeList,
    base: PhysicalAddress,
    kernel_root: PhysicalPage<Size4K>,
}

impl<'m, M: PhysMapper> MemoryManager<'m, M> {
    /// Adopt an initialized arena and free list.
    pub(crate) fn from_parts(
        mapper: &'m M,
        pages: &'m mut [PageInfo],
        free: FreeList,
        base: PhysicalAddress,
        kernel_root: PhysicalPage<Size4K>,
    ) -> Self {
        Self {
            mapper,
            pages,
            free,
            base,
            kernel_root,
        }
    }

    #[inline]
    pub const fn mapper(&self) -> &'m M {
        self.mapper
    }

    /// Number of frames the arena describes.
    #[inline]
    pub const fn frames(&self) -> usize {
        self.pages.len()
    }

    /// Number of descriptors on the free list.
    #[inline]
    pub const fn free_count(&self) -> usize {
        self.free.len()
    }

    /// The descriptor arena, for inspection.
    #[inline]
    pub fn pages(&self) -> &[PageInfo] {
        &*self.pages
    }

    /// The kernel's own address space (ASID 0).
    #[inline]
    pub const fn kernel_space(&self) -> AddressSpace<'m, M> {
        AddressSpace::from_root(self.mapper, self.kernel_root, 0)
    }

    #[inline]
    pub fn ref_count(&self, page: PageId) -> u16 {
        self.pages[page.index()].refs
    }

    #[inline]
    pub fn is_free(&self, page: PageId) -> bool {
        self.pages[page.index()].on_free_list
    }

    /// The frame described by `page`.
    #[inline]
    pub fn page_frame(&self, page: PageId) -> PhysicalPage<Size4K> {
        debug_assert!(page.index() < self.pages.len());
        PhysicalPage::containing(self.base + (page.index() as u64) * PAGE_SIZE)
    }

    #[inline]
    pub fn page_to_pa(&self, page: PageId) -> PhysicalAddress {
        self.page_frame(page).base()
    }

    /// The descriptor of the frame containing `pa`.
    ///
    /// # Errors
    /// [`MmError::InvalidArgument`] if `pa` is not managed RAM.
    pub fn pa_to_page(&self, pa: PhysicalAddress) -> Result<PageId, MmError> {
        let off = pa
            .checked_offset_from(self.base)
            .ok_or(MmError::InvalidArgument("physical address below RAM"))?;
        let index = usize::try_from(off / PAGE_SIZE)
            .map_err(|_| MmError::InvalidArgument("physical address beyond RAM"))?;
        if index >= self.pages.len() {
            return Err(MmError::InvalidArgument("physical address beyond RAM"));
        }
        Ok(PageId::from_index(index))
    }

    /// Run `f` on the contents of a data page.
    ///
    /// The frame is windowed for the duration of the call. It must not hold
    /// a page table.
    pub fn with_page_bytes<R>(&self, page: PageId, f: impl FnOnce(&mut [u8; 4096]) -> R) -> R {
        let frame = self.page_frame(page);
        let _irq = IrqGuard::new();
        self.mapper.map_window(frame);
        // SAFETY: windowed above; the page is owned by the caller.
        let bytes: &mut [u8; 4096] = unsafe { self.mapper.phys_to_mut(frame.base()) };
        let result = f(bytes);
        self.mapper.unmap_window(frame);
        result
    }

    /// Take one page off the free list and zero it.
    ///
    /// The reference count is left at zero; mapping the page with
    /// [`insert`](Self::insert) accounts for it.
    ///
    /// # Errors
    /// [`MmError::OutOfMemory`] when the free list is empty.
    pub fn alloc_page(&mut self) -> Result<PageId, MmError> {
        let _irq = IrqGuard::new();
        let Some(page) = self.free.pop_front(self.pages) else {
            log::warn!("alloc_page: free list exhausted");
            return Err(MmError::OutOfMemory);
        };
        self.with_page_bytes(page, |bytes| bytes.fill(0));
        log::trace!("alloc_page -> {page} at {}", self.page_to_pa(page));
        Ok(page)
    }

    /// Return `page` to the free list unless something still references it.
    ///
    /// ### Panics
    /// If `page` already is on the free list.
    pub fn free_page(&mut self, page: PageId) {
        let _irq = IrqGuard::new();
        if self.pages[page.index()].refs > 0 {
            return;
        }
        self.free.push_front(self.pages, page);
        log::trace!("free_page {page}");
    }

    /// ### Panics
    /// If the count would overflow.
    pub fn incref(&mut self, page: PageId) {
        let info = &mut self.pages[page.index()];
        info.refs = info
            .refs
            .checked_add(1)
            .unwrap_or_else(|| panic!("reference count overflow on {page}"));
    }

    /// Drop one reference and free the page when none remain.
    ///
    /// ### Panics
    /// If the count is already zero.
    pub fn decref(&mut self, page: PageId) {
        let _irq = IrqGuard::new();
        let info = &mut self.pages[page.index()];
        let Some(refs) = info.refs.checked_sub(1) else {
            log::error!("decref of unreferenced {page}");
            panic!("reference count underflow on {page}");
        };
        info.refs = refs;
        if refs == 0 {
            self.free_page(page);
        }
    }

    /// Keep the first `keep` free pages and detach the rest.
    ///
    /// Used by the boot checks and tests to simulate memory pressure. Hand
    /// the result back with [`reattach_free_pages`](Self::reattach_free_pages).
    pub fn detach_free_pages(&mut self, keep: usize) -> FreeList {
        let _irq = IrqGuard::new();
        self.free.split_off(self.pages, keep)
    }

    pub fn reattach_free_pages(&mut self, detached: FreeList) {
        let _irq = IrqGuard::new();
        self.free.append(self.pages, detached);
    }

    /// Allocate a fresh, empty address space tagged with `asid`.
    ///
    /// # Errors
    /// [`MmError::OutOfMemory`] if no frame is left for the root table.
    pub fn create_space(&mut self, asid: u16) -> Result<AddressSpace<'m, M>, MmError> {
        let _irq = IrqGuard::new();
        let mapper = self.mapper;
        Ok(AddressSpace::create(mapper, self, asid)?)
    }

    /// Release every page mapped in `space`, its tables and its root.
    ///
    /// `space` must not be active and must not be the kernel space.
    pub fn destroy_space(&mut self, space: AddressSpace<'_, M>) {
        let _irq = IrqGuard::new();
        assert_ne!(space.root(), self.kernel_root, "the kernel space is never destroyed");
        self.release_table(space.root(), Level::L2);
        log::debug!("destroyed address space root={} asid={}", space.root(), space.asid());
    }

    fn release_table(&mut self, frame: PhysicalPage<Size4K>, level: Level) {
        for i in 0..512 {
            let index = TableIndex::new(i);
            // SAFETY: installed tables stay windowed while linked.
            let table: &mut PageTable = unsafe { self.mapper.phys_to_mut(frame.base()) };
            let entry = table.get(index);
            if !entry.is_valid() {
                continue;
            }
            table.set(index, PageTableEntry::zero());
            match (entry.next_table(), level.next()) {
                (Some(child), Some(below)) => self.release_table(child, below),
                _ => {
                    if let Some(page) = self.counted_page(entry) {
                        self.decref(page);
                    }
                }
            }
        }
        if let Ok(page) = self.pa_to_page(frame.base()) {
            self.decref(page);
        }
    }

    /// The managed page a valid leaf holds a reference on, if any.
    fn counted_page(&self, entry: PageTableEntry) -> Option<PageId> {
        let (frame, flags) = entry.page_4k()?;
        if flags.fixed() {
            return None;
        }
        self.pa_to_page(frame.base()).ok()
    }

    /// Locate the leaf slot for `va`, creating missing tables if `create`.
    ///
    /// `Ok(None)` means a table on the path is missing and `create` was
    /// not set.
    ///
    /// # Errors
    /// [`MmError::OutOfMemory`] if a table was needed and no frame was left.
    /// No intermediate entry is written in that case.
    pub fn walk(
        &mut self,
        space: &AddressSpace<'_, M>,
        va: VirtualAddress,
        create: bool,
    ) -> Result<Option<LeafSlot>, MmError> {
        if !create {
            return Ok(space.walk(va));
        }
        let _irq = IrqGuard::new();
        Ok(Some(space.walk_create(self, va)?))
    }

    /// The page mapped at `va` and the slot mapping it.
    pub fn lookup(&self, space: &AddressSpace<'_, M>, va: VirtualAddress) -> Option<(PageId, LeafSlot)> {
        let slot = space.walk(va)?;
        let (frame, _) = space.entry(slot).page_4k()?;
        self.pa_to_page(frame.base()).ok().map(|page| (page, slot))
    }

    /// Map `page` at `va` with `perm | V`.
    ///
    /// Whatever else is mapped at `va` is removed first. Mapping the same
    /// page again only rewrites the permissions.
    ///
    /// # Errors
    /// [`MmError::OutOfMemory`] if a page table could not be allocated.
    pub fn insert(
        &mut self,
        space: &AddressSpace<'_, M>,
        page: PageId,
        va: VirtualAddress,
        perm: PageEntryBits,
    ) -> Result<(), MmError> {
        let _irq = IrqGuard::new();
        let leaf = PageTableEntry::make_leaf(self.page_frame(page), perm);

        if let Some(slot) = space.walk(va) {
            let current = space.entry(slot);
            if self.counted_page(current) == Some(page) {
                space.replace_entry(slot, va, leaf);
                log::trace!("insert {page} at {va}: permissions updated");
                return Ok(());
            }
            if current.is_valid() {
                self.remove(space, va);
            }
        }

        let slot = space.walk_create(self, va)?;
        space.replace_entry(slot, va, leaf);
        self.incref(page);
        log::trace!("insert {page} at {va}");
        Ok(())
    }

    /// Unmap whatever is mapped at `va`. Does nothing if nothing is.
    ///
    /// Leaves of unmanaged frames and fixed leaves are cleared without
    /// touching any count. Page tables emptied by the removal are kept.
    pub fn remove(&mut self, space: &AddressSpace<'_, M>, va: VirtualAddress) {
        let _irq = IrqGuard::new();
        let Some(slot) = space.walk(va) else {
            return;
        };
        let entry = space.entry(slot);
        if !entry.is_valid() {
            return;
        }
        space.replace_entry(slot, va, entry.invalidated());
        match self.counted_page(entry) {
            Some(page) => {
                self.decref(page);
                log::trace!("remove {page} from {va}");
            }
            None => log::trace!("remove {va} -> {}", entry.flags().physical_address()),
        }
    }

    /// Map `size` bytes at `va` to `pa`. See [`map_segment`].
    ///
    /// # Errors
    /// As [`map_segment`].
    pub fn map_segment(
        &mut self,
        space: &AddressSpace<'_, M>,
        va: VirtualAddress,
        size: u64,
        pa: PhysicalAddress,
        perm: PageEntryBits,
    ) -> Result<(), MmError> {
        let _irq = IrqGuard::new();
        map_segment(space, self, va, size, pa, perm)
    }

    /// Drop any cached translation of `va` in `space`.
    #[inline]
    pub fn invalidate(&self, space: &AddressSpace<'_, M>, va: VirtualAddress) {
        space.invalidate(va);
    }

    /// Resolve `va` in `space`.
    #[inline]
    pub fn translate(&self, space: &AddressSpace<'_, M>, va: VirtualAddress) -> Option<PhysicalAddress> {
        space.translate(va)
    }
}

/// Table frames come straight off the free list with one reference each.
impl<M: PhysMapper> FrameAlloc for MemoryManager<'_, M> {
    fn alloc_frame(&mut self) -> Option<PhysicalPage<Size4K>> {
        let page = self.free.pop_front(self.pages)?;
        self.pages[page.index()].refs = 1;
        Some(self.page_frame(page))
    }

    fn release_frame(&mut self, frame: PhysicalPage<Size4K>) {
        let Ok(page) = self.pa_to_page(frame.base()) else {
            panic!("released frame {frame} is not managed RAM");
        };
        self.pages[page.index()].refs = 0;
        self.free.push_front(self.pages, page);
    }
}

/// Map `[va, va + size)` to `[pa, pa + size)` page by page.
///
/// Both addresses are rounded down to their page. The leaves are marked
/// `fixed` and reference counts are not touched; this is for fixed kernel
/// regions and device memory only.
///
/// # Errors
/// - [`MmError::InvalidArgument`] if `size` is not a multiple of the page
///   size or the range wraps.
/// - [`MmError::OutOfMemory`] if `alloc` runs out of table frames.
pub fn map_segment<M: PhysMapper, A: FrameAlloc>(
    space: &AddressSpace<'_, M>,
    alloc: &mut A,
    va: VirtualAddress,
    size: u64,
    pa: PhysicalAddress,
    perm: PageEntryBits,
) -> Result<(), MmError> {
    if !size.is_multiple_of(PAGE_SIZE) {
        log::warn!("map_segment {va}: size {size:#x} is not a multiple of the page size");
        return Err(MmError::InvalidArgument("segment size is not a multiple of the page size"));
    }
    let va = VirtualAddress::new(page_align_down(va.as_u64()));
    let pa = PhysicalAddress::new(page_align_down(pa.as_u64()));
    if va.checked_add(size).is_none() || pa.checked_add(size).is_none() {
        return Err(MmError::InvalidArgument("segment wraps the address space"));
    }

    log::debug!("map_segment {va}..{} -> {pa} ({size:#x} bytes)", va + size);
    let perm = perm.with_fixed(true);
    let mut off = 0;
    while off < size {
        let slot = space.walk_create(alloc, va + off)?;
        let frame = PhysicalPage::containing(pa + off);
        space.replace_entry(slot, va + off, PageTableEntry::make_leaf(frame, perm));
        off += PAGE_SIZE;
    }
    Ok(())
}
