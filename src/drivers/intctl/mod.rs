/*
 * Interrupt-Controller Driver Interface (spec §4.2)
 *
 * A polymorphic handle over the legacy 8259 PIC pair and the APIC/IO-APIC
 * pair. The teacher's `drivers/system/pic.rs` and `arch/x86_64/peripheral/
 * pic.rs` hard-code the PIC as the only controller with free functions;
 * per the spec's Design Notes ("function-pointer driver tables ... map to
 * a trait/interface"), this is generalized into a trait object stored as
 * one explicitly-constructed singleton, selected once at init time
 * (APIC if ACPI's MADT reports one, PIC otherwise) and never swapped while
 * interrupts are enabled.
 */

pub mod apic;
pub mod pic;

use spin::Mutex;

use crate::error::{KernelError, KernelResult};

/// Result of asking a controller whether a just-acknowledged interrupt was
/// spurious.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpuriousCheck {
    Spurious,
    Regular,
}

/// Capability set every interrupt-controller implementation exposes.
/// Dynamic dispatch is acceptable here: the indirection cost is amortized
/// against hardware access latency (Design Notes).
pub trait IntCtlDriver: Send {
    /// Enable or disable a single IRQ line.
    fn set_mask(&self, irq: u8, enabled: bool) -> KernelResult<()>;

    /// Acknowledge completion of servicing `irq`.
    fn eoi(&self, irq: u8) -> KernelResult<()>;

    /// Determine whether the interrupt that fired on `vector` was
    /// spurious. Spurious interrupts from the PIC must never receive an
    /// EOI; APIC spurious delivery likewise doesn't need one.
    fn handle_spurious(&self, vector: u8) -> KernelResult<SpuriousCheck>;

    /// Translate an IRQ line number to its CPU-visible vector, or `None`
    /// if the line is out of range for this controller.
    fn irq_to_vector(&self, irq: u8) -> Option<u8>;

    fn name(&self) -> &'static str;
}

static ACTIVE_DRIVER: Mutex<Option<alloc::boxed::Box<dyn IntCtlDriver>>> = Mutex::new(None);

/// Install the controller driver to use for the remainder of kernel
/// uptime. Must be called once at init, before interrupts are enabled.
pub fn install(driver: alloc::boxed::Box<dyn IntCtlDriver>) {
    log::info!("Interrupt controller driver installed: {}", driver.name());
    *ACTIVE_DRIVER.lock() = Some(driver);
}

pub fn set_mask(irq: u8, enabled: bool) -> KernelResult<()> {
    with_driver(|d| d.set_mask(irq, enabled))
}

pub fn eoi(irq: u8) -> KernelResult<()> {
    with_driver(|d| d.eoi(irq))
}

pub fn handle_spurious(vector: u8) -> KernelResult<SpuriousCheck> {
    with_driver(|d| d.handle_spurious(vector))
}

pub fn irq_to_vector(irq: u8) -> Option<u8> {
    ACTIVE_DRIVER
        .lock()
        .as_ref()
        .and_then(|d| d.irq_to_vector(irq))
}

fn with_driver<T>(f: impl FnOnce(&dyn IntCtlDriver) -> KernelResult<T>) -> KernelResult<T> {
    match ACTIVE_DRIVER.lock().as_deref() {
        Some(driver) => f(driver),
        None => Err(KernelError::Uninitialized),
    }
}
