/*
 * i386 Architecture Bring-up (spec §2 "Control flow", §6)
 *
 * Replaces `arch::x86_64::kstart` (BOOTBOOT-specific framebuffer/
 * peripheral init) with the sequence spec §2 describes: "the bootloader
 * hands control to architecture init, which detects CPUs (via ACPI),
 * installs the interrupt dispatcher, chooses PIC or APIC, initializes
 * timers, and calls `kernel_kickstart`."
 */

pub mod gdt;
pub mod idt;

use alloc::boxed::Box;

use crate::config::{LAPIC_SPURIOUS_VECTOR, PIC_IRQ_BASE};
use crate::drivers::intctl::{apic::Apic, pic::Pic8259};
use crate::drivers::timer::{lapic::LapicTimer, pit::Pit, rtc::Rtc};
use crate::error::KernelResult;
use crate::memory::types::PhysAddr;

/// Brings up one CPU's architectural state: GDT/TSS, IDT, then either
/// PIC+PIT (single core, no ACPI MADT) or IO-APIC+LAPIC-timer (multi-core
/// per the MADT), finishing with `scheduler::kernel_kickstart`.
pub fn init(boot_stack_top: u32, init_entry: crate::scheduler::EntryFn) -> KernelResult<()> {
    gdt::init(boot_stack_top);
    idt::init();

    let acpi = crate::acpi::init().ok();
    let cpu_count = acpi.as_ref().map(|a| a.local_apic_ids.len().max(1)).unwrap_or(1);

    for (idx, _) in (0..cpu_count).enumerate() {
        crate::cpu::register_cpu(crate::cpu::CpuId(idx as u32));
    }

    match acpi.as_ref().and_then(|a| a.io_apic_address.map(|ioapic| (a.local_apic_address, ioapic))) {
        Some((lapic_base, ioapic_base)) => {
            crate::drivers::intctl::apic::map_local_apic(PhysAddr::new(lapic_base));
            crate::drivers::intctl::apic::enable(LAPIC_SPURIOUS_VECTOR);
            let controller = Apic::new(PhysAddr::new(ioapic_base), PIC_IRQ_BASE);
            crate::drivers::intctl::install(Box::new(controller));

            let mut pit = Pit::new();
            let mut lapic_timer = LapicTimer::new(LAPIC_SPURIOUS_VECTOR - 1);
            lapic_timer.calibrate(&pit);
            pit.set_freq(crate::config::TIMER_HZ)?;
            let rtc = Rtc::new();
            crate::time::init(Some(Box::new(lapic_timer)), Some(rtc), None)?;
        }
        None => {
            let controller = Pic8259::new(PIC_IRQ_BASE);
            crate::drivers::intctl::install(Box::new(controller));

            let pit = Pit::new();
            let rtc = Rtc::new();
            crate::time::init(Some(Box::new(pit)), Some(rtc), None)?;
        }
    }

    unsafe { core::arch::asm!("sti", options(nomem, nostack)) };

    crate::scheduler::kernel_kickstart(cpu_count, init_entry)?;
    Ok(())
}
