/*
 * Memory Management
 *
 * High-level module that ties together:
 *  - Physical frame allocator (phys)
 *  - Paging / virtual memory manager (paging)
 *  - Kernel heap (heap)
 *  - Per-process address spaces (address_space)
 */

pub mod address_space;
pub mod heap;
pub mod paging;
pub mod phys;
pub mod types;

use crate::boot::multiboot2::BootInfo;

/// Top-level memory initialization:
///  1. Boot page tables already built by `paging::init_boot_mappings` (run
///     from `_start` before Rust has a heap or a stack above 1 MiB).
///  2. Physical frame allocator from the Multiboot2 memory map.
///  3. Kernel heap.
pub fn init(boot_info: &BootInfo) {
    log::info!("Initializing memory management...");

    phys::init_from_multiboot2(boot_info);
    paging::init();
    heap::init().expect("failed to initialize kernel heap");

    let (used, total) = phys::get_stats();
    log::info!("Physical memory: used frames = {}, total frames = {}", used, total);
}
