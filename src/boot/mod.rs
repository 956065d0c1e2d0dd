/*
 * Boot Protocol (spec §6 "Bootloader")
 *
 * `header` is the static Multiboot2 header GRUB (or any compliant
 * loader) scans for in the first 32 KiB of the kernel image; `multiboot2`
 * parses the info structure the loader hands back in EBX at entry.
 */

pub mod header;
pub mod multiboot2;
