/*
 * Physical Frame Allocator
 *
 * Bitmap-based allocator for 4 KiB frames, grounded in the teacher's
 * BOOTBOOT-driven version of this file (same bitmap design, same
 * mark-kernel-frames-used step). Reworked to walk the Multiboot2 memory
 * map (`boot::multiboot2::BootInfo::memory_map`) instead of BOOTBOOT's
 * embedded `MMapEnt` array, and to use 32-bit frame numbers throughout
 * since this kernel never addresses more than 4 GiB of physical RAM.
 */

use spin::Mutex;

use crate::boot::multiboot2::{BootInfo, MEMORY_AVAILABLE};
use crate::memory::types::PhysFrame;

const MAX_FRAMES: usize = 262_144; // 1 GiB / 4 KiB
const BITMAP_LEN: usize = MAX_FRAMES / 64;

static FRAME_BITMAP: Mutex<[u64; BITMAP_LEN]> = Mutex::new([u64::MAX; BITMAP_LEN]);

unsafe extern "C" {
    static __kernel_phys_start: u8;
    static __kernel_phys_end: u8;
}

/// Initialize the physical frame allocator from the Multiboot2 memory map.
pub fn init_from_multiboot2(info: &BootInfo) {
    log::info!("Initializing physical frame allocator...");

    let mut bitmap = FRAME_BITMAP.lock();
    for word in bitmap.iter_mut() {
        *word = u64::MAX;
    }

    let mut region_count = 0usize;
    for entry in info.memory_map() {
        if entry.entry_type != MEMORY_AVAILABLE || entry.length == 0 {
            continue;
        }
        region_count += 1;
        let start_frame = (entry.base_addr / PhysFrame::SIZE as u64) as usize;
        let end_frame =
            ((entry.base_addr + entry.length - 1) / PhysFrame::SIZE as u64) as usize;
        log::info!(
            "MMAP region {}: base=0x{:x} len=0x{:x} frames {}..={}",
            region_count,
            entry.base_addr,
            entry.length,
            start_frame,
            end_frame
        );
        for frame_num in start_frame..=end_frame {
            if frame_num < MAX_FRAMES {
                mark_frame_free(&mut bitmap, frame_num);
            }
        }
    }

    drop(bitmap);
    mark_kernel_frames_used();
    log::info!("Physical frame allocator initialized");
}

fn mark_kernel_frames_used() {
    let kernel_start = unsafe { core::ptr::addr_of!(__kernel_phys_start) } as u32;
    let kernel_end = unsafe { core::ptr::addr_of!(__kernel_phys_end) } as u32;

    let start_frame = (kernel_start / PhysFrame::SIZE) as usize;
    let end_frame = ((kernel_end + PhysFrame::SIZE - 1) / PhysFrame::SIZE) as usize;

    log::info!(
        "Marking kernel frames used: phys 0x{:x}-0x{:x} (frames {}-{})",
        kernel_start,
        kernel_end,
        start_frame,
        end_frame
    );

    let mut bitmap = FRAME_BITMAP.lock();
    for frame_num in start_frame..end_frame {
        if frame_num < MAX_FRAMES {
            mark_frame_used(&mut bitmap, frame_num);
        }
    }
}

pub fn alloc_frame() -> Option<PhysFrame> {
    let mut bitmap = FRAME_BITMAP.lock();
    for word_idx in 0..BITMAP_LEN {
        let word_val = bitmap[word_idx];
        if word_val != u64::MAX {
            for bit_idx in 0..64 {
                let mask = 1u64 << bit_idx;
                if word_val & mask == 0 {
                    bitmap[word_idx] = word_val | mask;
                    let frame_num = word_idx * 64 + bit_idx;
                    if frame_num >= MAX_FRAMES {
                        return None;
                    }
                    let frame_addr = (frame_num as u32) * PhysFrame::SIZE;
                    return Some(PhysFrame::containing_address(frame_addr));
                }
            }
        }
    }
    None
}

pub fn free_frame(frame: PhysFrame) {
    let frame_num = (frame.start_address() / PhysFrame::SIZE) as usize;
    if frame_num < MAX_FRAMES {
        mark_frame_free(&mut FRAME_BITMAP.lock(), frame_num);
    }
}

fn mark_frame_free(bitmap: &mut [u64; BITMAP_LEN], frame_num: usize) {
    bitmap[frame_num / 64] &= !(1u64 << (frame_num % 64));
}

fn mark_frame_used(bitmap: &mut [u64; BITMAP_LEN], frame_num: usize) {
    bitmap[frame_num / 64] |= 1u64 << (frame_num % 64);
}

pub fn get_stats() -> (usize, usize) {
    let bitmap = FRAME_BITMAP.lock();
    let used: usize = bitmap.iter().map(|w| w.count_ones() as usize).sum();
    (used, MAX_FRAMES)
}
