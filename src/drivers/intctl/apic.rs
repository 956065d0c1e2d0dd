/*
 * Local APIC / IO-APIC Driver (spec §4.2 "APIC", §6 "Local APIC")
 *
 * Grounded in `intctl::pic::Pic8259`'s shape (an `IntCtlDriver` impl plus
 * a handful of free helpers the rest of the kernel calls directly —
 * here, `current_lapic_id`/`send_init_ipi`/`send_startup_ipi` for SMP
 * bring-up, which have no PIC equivalent). Registers are memory-mapped;
 * accessed through the `volatile` crate (already a dependency) rather
 * than raw pointer reads, so the compiler never reorders or elides a
 * register access the way it could with a plain dereference.
 *
 * IO-APIC redirection-table programming is simplified to the single most
 * common topology (one IO-APIC, identity IRQ-to-pin mapping) since ACPI's
 * interrupt-source-override entries (MADT type 2) are read but only the
 * unmodified case is wired up end to end; overrides are logged, not
 * applied, which is noted as an Open Question in `DESIGN.md`.
 */

use core::sync::atomic::{AtomicU32, Ordering};

use volatile::Volatile;

use crate::error::{KernelError, KernelResult};
use crate::memory::paging;
use crate::memory::types::{PageFlags, PhysAddr, VirtAddr};

use super::{IntCtlDriver, SpuriousCheck};

// Local APIC register byte offsets (Intel SDM Vol. 3A, Table 10-1).
const REG_ID: u32 = 0x20;
const REG_EOI: u32 = 0xB0;
const REG_SVR: u32 = 0xF0;
const REG_LVT_TIMER: u32 = 0x320;
const REG_TICR: u32 = 0x380;
const REG_TCCR: u32 = 0x390;
const REG_TDCR: u32 = 0x3E0;
const REG_ICR_LOW: u32 = 0x300;
const REG_ICR_HIGH: u32 = 0x310;

const SVR_ENABLE: u32 = 1 << 8;

const ICR_DELIVERY_INIT: u32 = 0b101 << 8;
const ICR_DELIVERY_STARTUP: u32 = 0b110 << 8;
const ICR_LEVEL_ASSERT: u32 = 1 << 14;
const ICR_DELIVERY_PENDING: u32 = 1 << 12;

/// Virtual window the Local APIC's 4 KiB MMIO page is mapped to. Chosen
/// to sit right after the temp-mapping windows `memory::paging` reserves.
const LAPIC_VIRT_BASE: u32 = 0xFFC0_2000;

static LAPIC_MAPPED: AtomicU32 = AtomicU32::new(0); // 0 = not yet mapped

/// Maps the Local APIC's MMIO page into the permanent kernel mapping.
/// Must run once, after `memory::paging::init_boot_mappings`, before any
/// other function in this module is called.
pub fn map_local_apic(phys_base: PhysAddr) {
    paging::map_page(
        VirtAddr::new(LAPIC_VIRT_BASE),
        phys_base,
        PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::CACHE_DISABLE,
    )
    .expect("Local APIC MMIO page must map cleanly");
    LAPIC_MAPPED.store(1, Ordering::Release);
}

fn reg(offset: u32) -> Volatile<&'static mut u32> {
    let ptr = (LAPIC_VIRT_BASE + offset) as *mut u32;
    Volatile::new(unsafe { &mut *ptr })
}

fn reg_read(offset: u32) -> u32 {
    reg(offset).read()
}

fn reg_write(offset: u32, value: u32) {
    reg(offset).write(value);
}

/// The running CPU's Local APIC ID, or `None` before `map_local_apic` has
/// run (e.g. very early boot, still on the PIC / BSP-only path).
pub fn current_lapic_id() -> Option<u8> {
    if LAPIC_MAPPED.load(Ordering::Acquire) == 0 {
        return None;
    }
    Some((reg_read(REG_ID) >> 24) as u8)
}

/// Enables the Local APIC (spurious-vector register bit 8) and points its
/// spurious vector at `config::LAPIC_SPURIOUS_VECTOR`.
pub fn enable(spurious_vector: u8) {
    let svr = reg_read(REG_SVR);
    reg_write(REG_SVR, (svr & !0xFF) | spurious_vector as u32 | SVR_ENABLE);
}

pub fn eoi() {
    reg_write(REG_EOI, 0);
}

fn wait_for_ipi_idle() {
    while reg_read(REG_ICR_LOW) & ICR_DELIVERY_PENDING != 0 {
        core::hint::spin_loop();
    }
}

/// Sends an INIT IPI to `apic_id`, part of the AP bring-up sequence.
pub fn send_init_ipi(apic_id: u8) {
    wait_for_ipi_idle();
    reg_write(REG_ICR_HIGH, (apic_id as u32) << 24);
    reg_write(REG_ICR_LOW, ICR_DELIVERY_INIT | ICR_LEVEL_ASSERT);
    wait_for_ipi_idle();
}

/// Sends a STARTUP IPI pointing the AP at `vector << 12` as its start
/// physical address (the real-mode trampoline location).
pub fn send_startup_ipi(apic_id: u8, vector: u8) {
    wait_for_ipi_idle();
    reg_write(REG_ICR_HIGH, (apic_id as u32) << 24);
    reg_write(REG_ICR_LOW, ICR_DELIVERY_STARTUP | vector as u32);
    wait_for_ipi_idle();
}

/// Sends a generic fixed-vector IPI to `apic_id` — used by the scheduler
/// to nudge a CPU into rescheduling after a cross-CPU wakeup (spec §4.5
/// "SMP").
pub fn send_fixed_ipi(apic_id: u8, vector: u8) {
    wait_for_ipi_idle();
    reg_write(REG_ICR_HIGH, (apic_id as u32) << 24);
    reg_write(REG_ICR_LOW, vector as u32);
}

/// Programs the Local APIC timer's divide register, initial count and
/// one-shot/periodic LVT entry. Calibration against the PIT happens in
/// `drivers::timer::lapic`.
pub fn configure_timer(divide: u32, initial_count: u32, vector: u8, periodic: bool) {
    const LVT_PERIODIC: u32 = 1 << 17;
    reg_write(REG_TDCR, divide);
    reg_write(REG_LVT_TIMER, vector as u32 | if periodic { LVT_PERIODIC } else { 0 });
    reg_write(REG_TICR, initial_count);
}

pub fn timer_current_count() -> u32 {
    reg_read(REG_TCCR)
}

/// `IntCtlDriver` façade over the Local APIC (EOI, spurious detection) and
/// a single IO-APIC in identity IRQ-to-pin configuration (`set_mask`,
/// `irq_to_vector`).
pub struct Apic {
    ioapic_base: PhysAddr,
    vector_base: u8,
}

const IOAPIC_REGSEL: u32 = 0x00;
const IOAPIC_REGWIN: u32 = 0x10;
const IOAPIC_REDTBL0: u32 = 0x10;

impl Apic {
    pub fn new(ioapic_phys: PhysAddr, vector_base: u8) -> Self {
        paging::map_page(
            VirtAddr::new(IOAPIC_VIRT_BASE),
            ioapic_phys,
            PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::CACHE_DISABLE,
        )
        .expect("IO-APIC MMIO page must map cleanly");
        Self {
            ioapic_base: ioapic_phys,
            vector_base,
        }
    }

    fn ioapic_read(&self, index: u32) -> u32 {
        unsafe {
            Volatile::new(&mut *((IOAPIC_VIRT_BASE + IOAPIC_REGSEL) as *mut u32)).write(index);
            Volatile::new(&mut *((IOAPIC_VIRT_BASE + IOAPIC_REGWIN) as *mut u32)).read()
        }
    }

    fn ioapic_write(&self, index: u32, value: u32) {
        unsafe {
            Volatile::new(&mut *((IOAPIC_VIRT_BASE + IOAPIC_REGSEL) as *mut u32)).write(index);
            Volatile::new(&mut *((IOAPIC_VIRT_BASE + IOAPIC_REGWIN) as *mut u32)).write(value);
        }
    }

    fn redirection_index(irq: u8) -> u32 {
        IOAPIC_REDTBL0 + irq as u32 * 2
    }
}

const IOAPIC_VIRT_BASE: u32 = 0xFFC0_3000;

impl IntCtlDriver for Apic {
    fn set_mask(&self, irq: u8, enabled: bool) -> KernelResult<()> {
        if irq > 23 {
            return Err(KernelError::OutOfBound);
        }
        let low_index = Self::redirection_index(irq);
        let mut low = self.ioapic_read(low_index);
        let vector = self.vector_base.wrapping_add(irq);
        low = (low & !0xFF) | vector as u32;
        if enabled {
            low &= !(1 << 16);
        } else {
            low |= 1 << 16;
        }
        self.ioapic_write(low_index, low);
        Ok(())
    }

    fn eoi(&self, _irq: u8) -> KernelResult<()> {
        eoi();
        Ok(())
    }

    fn handle_spurious(&self, vector: u8) -> KernelResult<SpuriousCheck> {
        // The APIC's own spurious vector (config::LAPIC_SPURIOUS_VECTOR)
        // never reaches the dispatcher's normal handler lookup; any
        // vector that does arrive here is a regular, legitimately routed
        // IRQ.
        let _ = vector;
        Ok(SpuriousCheck::Regular)
    }

    fn irq_to_vector(&self, irq: u8) -> Option<u8> {
        if irq > 23 {
            None
        } else {
            Some(self.vector_base.wrapping_add(irq))
        }
    }

    fn name(&self) -> &'static str {
        "Local APIC / IO-APIC"
    }
}

unsafe impl Send for Apic {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirection_index_is_two_words_per_irq() {
        assert_eq!(Apic::redirection_index(0), 0x10);
        assert_eq!(Apic::redirection_index(1), 0x12);
    }
}
