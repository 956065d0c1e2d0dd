/*
 * Kernel Heap Allocator
 *
 * Dynamic memory allocation for the kernel, built on `linked_list_allocator`
 * (unchanged from the teacher). Adapted to 32-bit addresses: the heap lives
 * in the higher half of a 4 GiB i386 address space rather than the
 * long-mode canonical-high region the teacher used.
 */

use linked_list_allocator::LockedHeap;

use crate::memory::paging;
use crate::memory::types::{PageFlags, VirtAddr};

/// Virtual address where the kernel heap begins: just above the 3 GiB
/// higher-half split this kernel maps the kernel image at.
pub const HEAP_START: u32 = 0xD000_0000;

/// Size of the kernel heap in bytes (8 MiB).
pub const HEAP_SIZE: u32 = 8 * 1024 * 1024;

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Initialize the kernel heap. Must be called exactly once, after the
/// physical frame allocator and paging system are set up.
pub fn init() -> Result<(), &'static str> {
    log::info!(
        "Initializing kernel heap: 0x{:x} - 0x{:x} ({} KiB)",
        HEAP_START,
        HEAP_START + HEAP_SIZE - 1,
        HEAP_SIZE / 1024
    );

    let heap_start = VirtAddr::new(HEAP_START);
    let flags = PageFlags::PRESENT | PageFlags::WRITABLE;

    paging::map_range(heap_start, HEAP_SIZE, flags)?;

    unsafe {
        ALLOCATOR
            .lock()
            .init(HEAP_START as *mut u8, HEAP_SIZE as usize);
    }

    log::info!("Kernel heap initialized successfully");
    Ok(())
}

#[alloc_error_handler]
fn alloc_error(layout: core::alloc::Layout) -> ! {
    panic!("Kernel heap allocation failed: {:?}", layout);
}
