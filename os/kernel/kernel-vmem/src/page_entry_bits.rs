use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// A single 64-bit Sv39 page table entry in its raw bitfield form.
///
/// The same layout is used at all three levels. Whether an entry is a
/// **leaf** or a **table pointer** is decided by the permission bits: an
/// entry with `V=1` and `R=W=X=0` points to the next-level table; any of
/// `R`, `W` or `X` set makes it a leaf.
///
/// ### Bit layout
///
/// | Bits   | Name     | Meaning |
/// |--------|----------|---------|
/// | 0      | `V`      | Valid |
/// | 1      | `R`      | Readable |
/// | 2      | `W`      | Writable (requires `R`) |
/// | 3      | `X`      | Executable |
/// | 4      | `U`      | User-mode accessible |
/// | 5      | `G`      | Global mapping |
/// | 6      | `A`      | Accessed |
/// | 7      | `D`      | Dirty |
/// | 8      | RSW      | Copy-on-write marker (kernel only) |
/// | 9      | RSW      | Fixed-mapping marker (kernel only) |
/// | 10–53  | `PPN`    | Physical page number |
/// | 54–63  | reserved | Must be zero |
///
/// ### Example
/// ```rust
/// # use kernel_memory_addresses::PhysicalAddress;
/// # use kernel_vmem::PageEntryBits;
/// let mut e = PageEntryBits::new().with_valid(true).with_readable(true);
/// e.set_physical_address(PhysicalAddress::new(0x8020_3000));
/// assert_eq!(e.ppn(), 0x80203);
/// assert_eq!(u64::from(e), (0x80203 << 10) | 0b11);
/// ```
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    /// Valid (V, bit 0).
    ///
    /// Clear means the walk stops here with a page fault.
    pub valid: bool,

    /// Readable (R, bit 1).
    pub readable: bool,

    /// Writable (W, bit 2).
    ///
    /// `W=1, R=0` is reserved by the architecture.
    pub writable: bool,

    /// Executable (X, bit 3).
    pub executable: bool,

    /// User (U, bit 4).
    ///
    /// Accessible from U-mode. S-mode may only touch it with `sstatus.SUM`.
    pub user: bool,

    /// Global (G, bit 5).
    ///
    /// Present in every address space; not tagged with an ASID.
    pub global: bool,

    /// Accessed (A, bit 6).
    pub accessed: bool,

    /// Dirty (D, bit 7).
    pub dirty: bool,

    /// Copy-on-write (RSW bit 8).
    ///
    /// Ignored by hardware. Only the kernel may set it; user requests that
    /// carry it are rejected.
    pub copy_on_write: bool,

    /// Fixed mapping (RSW bit 9).
    ///
    /// Ignored by hardware. Marks leaves installed by a segment mapping;
    /// such a leaf holds no reference on its frame.
    pub fixed: bool,

    /// Physical page number (bits 10..=53).
    #[bits(44)]
    pub ppn: u64,

    #[bits(10)]
    __: u16,
}

/// Mask of every bit that is not part of the PPN field.
const FLAG_MASK: u64 = (1 << 10) - 1;

impl PageEntryBits {
    #[inline]
    pub const fn set_physical_address(&mut self, phys: PhysicalAddress) {
        self.set_ppn(phys.ppn());
    }

    #[inline]
    #[must_use]
    pub const fn physical_address(&self) -> PhysicalAddress {
        PhysicalAddress::from_ppn(self.ppn())
    }

    #[inline]
    #[must_use]
    pub const fn frame(&self) -> PhysicalPage<Size4K> {
        PhysicalPage::containing(self.physical_address())
    }

    /// Whether any of `R`, `W` or `X` is set.
    #[inline]
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.readable() || self.writable() || self.executable()
    }

    /// Valid and pointing to a next-level table.
    #[inline]
    #[must_use]
    pub const fn is_table(&self) -> bool {
        self.valid() && !self.is_leaf()
    }

    /// The entry with its PPN cleared, i.e. only the flag bits.
    #[inline]
    #[must_use]
    pub const fn permissions(&self) -> Self {
        Self::from_bits(self.into_bits() & FLAG_MASK)
    }

    /// Whether every flag set in `other` is also set here.
    #[inline]
    #[must_use]
    pub const fn contains(&self, other: Self) -> bool {
        let o = other.into_bits() & FLAG_MASK;
        self.into_bits() & o == o
    }

    /// Bitwise union of the flag bits, keeping `self`'s PPN.
    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self::from_bits(self.into_bits() | (other.into_bits() & FLAG_MASK))
    }

    /// Interior entry pointing at the table in `frame`.
    ///
    /// Only `V` is set; data permissions on interior entries would turn
    /// them into leaves.
    #[inline]
    #[must_use]
    pub const fn table_pointer(frame: PhysicalPage<Size4K>) -> Self {
        Self::new()
            .with_valid(true)
            .with_ppn(frame.base().ppn())
    }

    /// Leaf entry mapping `frame` with the flag bits of `perm` plus `V`.
    ///
    /// `A` is always set, and `D` for writable leaves, so harts without
    /// hardware A/D updates never fault on first access.
    #[inline]
    #[must_use]
    pub const fn leaf(frame: PhysicalPage<Size4K>, perm: Self) -> Self {
        let perm = perm.permissions();
        perm.with_valid(true)
            .with_accessed(true)
            .with_dirty(perm.writable() || perm.dirty())
            .with_ppn(frame.base().ppn())
    }

    /// Kernel read-only data.
    #[inline]
    #[must_use]
    pub const fn kernel_ro() -> Self {
        Self::new().with_readable(true)
    }

    /// Kernel read/write data.
    #[inline]
    #[must_use]
    pub const fn kernel_rw() -> Self {
        Self::new().with_readable(true).with_writable(true)
    }

    /// Kernel code.
    #[inline]
    #[must_use]
    pub const fn kernel_rx() -> Self {
        Self::new().with_readable(true).with_executable(true)
    }

    /// User read-only data.
    #[inline]
    #[must_use]
    pub const fn user_ro() -> Self {
        Self::new().with_readable(true).with_user(true)
    }

    /// User read/write data.
    #[inline]
    #[must_use]
    pub const fn user_rw() -> Self {
        Self::new()
            .with_readable(true)
            .with_writable(true)
            .with_user(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_positions_match_hardware() {
        assert_eq!(u64::from(PageEntryBits::new().with_valid(true)), 1 << 0);
        assert_eq!(u64::from(PageEntryBits::new().with_readable(true)), 1 << 1);
        assert_eq!(u64::from(PageEntryBits::new().with_writable(true)), 1 << 2);
        assert_eq!(u64::from(PageEntryBits::new().with_executable(true)), 1 << 3);
        assert_eq!(u64::from(PageEntryBits::new().with_user(true)), 1 << 4);
        assert_eq!(u64::from(PageEntryBits::new().with_global(true)), 1 << 5);
        assert_eq!(u64::from(PageEntryBits::new().with_copy_on_write(true)), 1 << 8);
        assert_eq!(u64::from(PageEntryBits::new().with_fixed(true)), 1 << 9);
        assert_eq!(u64::from(PageEntryBits::new().with_ppn(1)), 1 << 10);
    }

    #[test]
    fn table_pointer_is_not_a_leaf() {
        let frame = PhysicalPage::containing(PhysicalAddress::new(0x8040_0000));
        let e = PageEntryBits::table_pointer(frame);
        assert!(e.is_table());
        assert!(!e.is_leaf());
        assert_eq!(e.permissions(), PageEntryBits::new().with_valid(true));
        assert_eq!(e.physical_address().as_u64(), 0x8040_0000);
    }

    #[test]
    fn leaf_keeps_only_flag_bits_of_perm() {
        let frame = PhysicalPage::containing(PhysicalAddress::new(0x8000_5000));
        let noisy = PageEntryBits::user_rw().with_ppn(0xdead);
        let e = PageEntryBits::leaf(frame, noisy);
        assert!(e.valid() && e.readable() && e.writable() && e.user());
        assert_eq!(e.frame(), frame);
    }

    #[test]
    fn leaves_are_born_accessed() {
        let frame = PhysicalPage::containing(PhysicalAddress::new(0x8000_5000));
        let ro = PageEntryBits::leaf(frame, PageEntryBits::user_ro());
        assert!(ro.accessed() && !ro.dirty());
        let rw = PageEntryBits::leaf(frame, PageEntryBits::kernel_rw());
        assert!(rw.accessed() && rw.dirty());
    }

    #[test]
    fn contains_compares_flags_only() {
        let e = PageEntryBits::user_rw().with_valid(true).with_ppn(7);
        assert!(e.contains(PageEntryBits::user_ro()));
        assert!(!PageEntryBits::user_ro().contains(PageEntryBits::user_rw()));
    }
}
