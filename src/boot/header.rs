/*
 * Multiboot2 Header (spec §6 "Bootloader")
 *
 * A compliant loader scans the first 32 KiB of the kernel image for this
 * structure (magic `0xE8525­0D6`, architecture `0` = i386 protected
 * mode). No tags are requested beyond the mandatory end tag: this core
 * only consumes the memory-map tag the loader provides unconditionally,
 * so there is nothing else worth asking for.
 */

use crate::boot::multiboot2::{ARCH_I386, HEADER_MAGIC};

#[repr(C, align(8))]
struct Header {
    magic: u32,
    architecture: u32,
    header_length: u32,
    checksum: u32,
    end_tag_type: u16,
    end_tag_flags: u16,
    end_tag_size: u32,
}

const HEADER_LENGTH: u32 = core::mem::size_of::<Header>() as u32;

#[unsafe(link_section = ".multiboot_header")]
#[used]
static HEADER: Header = Header {
    magic: HEADER_MAGIC,
    architecture: ARCH_I386,
    header_length: HEADER_LENGTH,
    checksum: 0u32.wrapping_sub(HEADER_MAGIC.wrapping_add(ARCH_I386).wrapping_add(HEADER_LENGTH)),
    end_tag_type: 0,
    end_tag_flags: 0,
    end_tag_size: 8,
};
