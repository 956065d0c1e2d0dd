/*
 * CLUU Kernel Entry Point (spec §2 "Control flow", §6 "Bootloader")
 *
 * Boots via Multiboot2 instead of the teacher's BOOTBOOT protocol: the
 * loader leaves the info-structure pointer in EBX and the magic value in
 * EAX, hands control to `_start` on the BSP only (no multi-core race at
 * entry — APs are brought up later via LAPIC INIT/STARTUP IPIs once ACPI
 * has been parsed). `_start` switches to a private stack and calls
 * `kstart`, which runs architecture init (GDT/IDT/ACPI/timers/interrupt
 * controller) and hands off to `scheduler::kernel_kickstart`.
 *
 * `no_std`/`no_main` and the custom panic handler only apply to the real
 * (`not(test)`) build: `cargo test` compiles this binary against the host's
 * `std` and its own libtest harness/`main`, so every module's `#[cfg(test)]
 * mod tests` (the teacher instead ran its own functions from `src/tests/`
 * under QEMU, never through `cargo test`) can actually link and run.
 */

#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]
#![allow(dead_code)]

extern crate alloc;

#[cfg(not(test))]
use core::panic::PanicInfo;

mod acpi;
mod arch;
mod atomics;
mod boot;
mod config;
mod cpu;
mod drivers;
mod error;
mod interrupts;
mod io;
mod logger;
mod memory;
mod panic;
mod queue;
mod scheduler;
mod sync;
mod time;

#[repr(C, align(16))]
pub struct AlignedBspStack([u8; KERNEL_BOOT_STACK_SIZE]);

const KERNEL_BOOT_STACK_SIZE: usize = 64 * 1024;

#[unsafe(no_mangle)]
pub static mut BSP_STACK: AlignedBspStack = AlignedBspStack([0; KERNEL_BOOT_STACK_SIZE]);

/// Multiboot2 entry point. GRUB (or any compliant loader) jumps here in
/// 32-bit protected mode with EAX = `boot::multiboot2::BOOT_MAGIC`, EBX =
/// the boot-info pointer, and no guarantee of a usable stack — the very
/// first thing this does is install our own.
#[unsafe(naked)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _start() -> ! {
    core::arch::naked_asm!(
        "lea esp, [{stack} + {size}]",
        "push ebx", // boot info pointer (2nd arg)
        "push eax", // multiboot magic    (1st arg)
        "call {kstart}",
        "2:",
        "hlt",
        "jmp 2b",
        stack = sym BSP_STACK,
        size = const KERNEL_BOOT_STACK_SIZE,
        kstart = sym kstart,
    );
}

/// Rust-side kernel entry, running on [`BSP_STACK`]. Never returns —
/// control passes to `scheduler::kernel_kickstart` -> the elected init
/// thread, and this function's own stack frame is abandoned at the first
/// context switch.
#[unsafe(no_mangle)]
pub extern "C" fn kstart(magic: u32, boot_info_ptr: u32) -> ! {
    logger::init();
    log::info!("CLUU kernel starting (i386)");

    if magic != boot::multiboot2::BOOT_MAGIC {
        kernel_panic!("not booted via a Multiboot2-compliant loader");
    }

    let boot_info = unsafe { boot::multiboot2::BootInfo::from_ptr(boot_info_ptr as *const u8) };
    memory::init(&boot_info);

    arch::x86::init(
        core::ptr::addr_of!(BSP_STACK) as u32 + KERNEL_BOOT_STACK_SIZE as u32,
        init_thread_main,
    )
    .unwrap_or_else(|e| kernel_panic!(alloc::format!("architecture init failed: {}", e).as_str()));

    // Scheduling is enabled and interrupts are live at this point; the next
    // timer tick elects the idle or init thread and never returns here (see
    // `scheduler::context::start_first_thread`). Park the BSP on this stack
    // until that happens instead of assuming it already has.
    loop {
        unsafe { core::arch::asm!("sti", "hlt", options(nomem, nostack)) };
    }
}

/// The init thread (spec §2: "Kickstart creates the idle thread per CPU
/// and the init thread"). PID/TID 1 by construction of
/// `scheduler::kernel_kickstart`; idles once there is nothing left to set
/// up, since this core has no userspace loader of its own (§1 scope).
extern "C" fn init_thread_main(_arg: usize) -> usize {
    log::info!(
        "init thread running, {} CPU(s) online",
        crate::cpu::cpu_count()
    );
    loop {
        scheduler::sleep(1000).ok();
    }
}

#[cfg(not(test))]
#[panic_handler]
fn rust_panic(info: &PanicInfo) -> ! {
    let location = info.location();
    let (file, line) = location.map(|l| (l.file(), l.line())).unwrap_or(("<unknown>", 0));
    panic::kernel_panic(file, line, &alloc::format!("{}", info.message()))
}
