/*
 * Interrupt Dispatcher (spec §4.3)
 *
 * Global table mapping vector numbers to handlers. Separates "IRQ"
 * vectors (passed through the active `drivers::intctl` controller
 * driver) from "software/exception" vectors, masks the per-CPU nesting
 * depth (`cpu::disable_interrupts`/`restore_interrupts`) and restores the
 * hardware interrupt flag deterministically.
 *
 * Grounded in the teacher's `arch/x86_64/idt.rs` (vector layout: 0-31
 * exceptions, IRQ base at a fixed offset, one `extern "x86-interrupt"`
 * stub per vector) and `scheduler/traits.rs` (capability-bounded access
 * pattern, generalized here into a plain registration table instead of a
 * policy trait). The low-level IDT/stub wiring lives in `arch::x86::idt`;
 * this module is architecture-neutral and only deals with the
 * vector -> handler mapping and the dispatch algorithm itself.
 */

use core::cell::UnsafeCell;

use crate::atomics::{CriticalSection, Spinlock};
use crate::config::{PANIC_VECTOR, SCHED_SOFTIRQ_VECTOR};
use crate::cpu::{self, CpuId};
use crate::drivers::intctl::{self, SpuriousCheck};
use crate::error::{KernelError, KernelResult};

const NUM_VECTORS: usize = 256;

/// Which of the two registration classes spec §4.3 distinguishes a
/// vector belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// Passed through the active interrupt-controller driver: spurious
    /// check before dispatch, and the handler is responsible for calling
    /// `set_irq_eoi` itself.
    Irq(u8),
    /// CPU exception or software interrupt; no controller involvement.
    SoftwareOrException,
}

/// `fn(cpu_state, vector, stack_state)` per spec §4.3 — `cpu_state` is the
/// general-purpose/segment register snapshot the assembly stub pushed
/// (mutable so a handler can alter the context a preempted thread resumes
/// into), `stack_state` the hardware-pushed frame (eip/cs/eflags[/esp/ss]).
pub type InterruptHandler =
    fn(cpu_state: &mut crate::scheduler::context::CpuContext, vector: u8, stack_state: &InterruptStackFrame);

/// Hardware-pushed frame for an i386 interrupt/exception (no privilege
/// change: 3 words; ring 3 -> ring 0 additionally pushes `esp`/`ss`, not
/// modeled here since this core never takes an interrupt from ring 3).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct InterruptStackFrame {
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
}

#[derive(Clone, Copy)]
struct HandlerEntry {
    enabled: bool,
    function: InterruptHandler,
    kind: HandlerKind,
}

struct Table {
    entries: [Option<HandlerEntry>; NUM_VECTORS],
}

impl Table {
    const fn new() -> Self {
        Self {
            entries: [None; NUM_VECTORS],
        }
    }
}

/// The table itself is a bare `UnsafeCell`, not a lock — spec §5's shared
/// resource policy states the interrupt handler table's one spinlock is
/// "used only during register/remove (dispatch reads it unlocked, relying
/// on the property that registration is disallowed on an occupied slot)".
/// `dispatch` therefore reads through a raw pointer with no lock at all;
/// `TABLE_LOCK` only ever guards `register`/`remove`, each wrapped in a
/// `CriticalSection` (interrupts off, then spinlock) per spec §4.1, so a
/// registration in progress can never be re-entered by a nested IRQ on the
/// same core.
struct TableCell(UnsafeCell<Table>);

// SAFETY: every write goes through `register`/`remove`, serialized by
// `TABLE_LOCK` with interrupts disabled; `dispatch`'s unlocked read is an
// accepted race per spec §5 (slots are only ever filled once and read
// afterwards; a slot mid-registration is still `None` until the single
// store that publishes it).
unsafe impl Sync for TableCell {}

static TABLE: TableCell = TableCell(UnsafeCell::new(Table::new()));
static TABLE_LOCK: Spinlock = Spinlock::new();

fn is_reserved(vector: u8) -> bool {
    vector == PANIC_VECTOR || vector == SCHED_SOFTIRQ_VECTOR || vector == crate::config::LAPIC_SPURIOUS_VECTOR
}

/// Registers a handler for a hardware IRQ line, translating it through the
/// active controller driver to its CPU vector.
pub fn register_irq_handler(irq: u8, handler: InterruptHandler) -> KernelResult<()> {
    let vector = intctl::irq_to_vector(irq).ok_or(KernelError::OutOfBound)?;
    register(vector, HandlerKind::Irq(irq), handler)
}

pub fn remove_irq_handler(irq: u8) -> KernelResult<()> {
    let vector = intctl::irq_to_vector(irq).ok_or(KernelError::OutOfBound)?;
    remove(vector)
}

/// Registers a handler for a CPU exception or software-interrupt vector
/// (not routed through the IRQ controller).
pub fn register_int_handler(vector: u8, handler: InterruptHandler) -> KernelResult<()> {
    register(vector, HandlerKind::SoftwareOrException, handler)
}

pub fn remove_int_handler(vector: u8) -> KernelResult<()> {
    remove(vector)
}

fn register(vector: u8, kind: HandlerKind, function: InterruptHandler) -> KernelResult<()> {
    if is_reserved(vector) {
        return Err(KernelError::Unauthorized);
    }
    let _guard = CriticalSection::enter(&TABLE_LOCK);
    // SAFETY: `_guard` holds `TABLE_LOCK` with interrupts disabled on this
    // core, so no concurrent writer and no `dispatch` re-entrancy here.
    let table = unsafe { &mut *TABLE.0.get() };
    let slot = &mut table.entries[vector as usize];
    if slot.is_some() {
        return Err(KernelError::AlreadyExists);
    }
    *slot = Some(HandlerEntry {
        enabled: true,
        function,
        kind,
    });
    Ok(())
}

fn remove(vector: u8) -> KernelResult<()> {
    let _guard = CriticalSection::enter(&TABLE_LOCK);
    // SAFETY: see `register`.
    let table = unsafe { &mut *TABLE.0.get() };
    let slot = &mut table.entries[vector as usize];
    if slot.is_none() {
        return Err(KernelError::NotRegistered);
    }
    *slot = None;
    Ok(())
}

/// Enables/disables IRQ delivery for a line without touching its
/// registration.
pub fn set_irq_mask(irq: u8, enabled: bool) -> KernelResult<()> {
    intctl::set_mask(irq, enabled)
}

/// Handlers for IRQ-kind vectors must call this once they've finished the
/// work that has to happen before the controller may deliver another
/// interrupt on that line. Not auto-called by the dispatcher: a timer
/// handler may want to do bookkeeping before re-enabling delivery.
pub fn set_irq_eoi(irq: u8) -> KernelResult<()> {
    intctl::eoi(irq)
}

/// Disables local interrupts and returns the previous state, for callers
/// that need the raw primitive outside a `CriticalSection` (spec §4.3
/// `disable()`/`restore()`).
pub fn disable() -> bool {
    cpu::disable_interrupts()
}

pub fn restore(prev_state: bool) {
    cpu::restore_interrupts(prev_state);
}

pub fn get_state() -> bool {
    cpu::interrupt_disable_depth() == 0
}

/// Sends a fixed-vector IPI nudging `target` to run `schedule()` soon
/// after a cross-CPU wakeup (spec §4.5 "SMP"). A no-op on the PIC path
/// (uniprocessor) or before the APIC has been brought up.
pub fn send_resched_ipi(target: CpuId) {
    if let Some(apic_id) = crate::drivers::intctl::apic::current_lapic_id() {
        if CpuId(apic_id as u32) != target {
            crate::drivers::intctl::apic::send_fixed_ipi(target.0 as u8, SCHED_SOFTIRQ_VECTOR);
        }
    }
}

/// The dispatch algorithm (spec §4.3 "Dispatch algorithm on vector v").
/// Called by the architecture-specific stub (`arch::x86::idt`) for every
/// vector; never called directly by driver code.
pub fn dispatch(vector: u8, cpu_state: &mut crate::scheduler::context::CpuContext, stack_state: &InterruptStackFrame) {
    if vector == PANIC_VECTOR {
        crate::panic::handle_nmi_panic();
        return;
    }

    // Unlocked read (spec §5: "dispatch reads it unlocked"). `HandlerEntry`
    // is `Copy`, so this is a single snapshot load, not a live reference
    // into the table the interrupted code might concurrently mutate.
    let entry = unsafe { (*TABLE.0.get()).entries[vector as usize] };

    let Some(entry) = entry else {
        crate::panic::kernel_panic(file!(), line!(), "unhandled interrupt");
    };

    if !entry.enabled {
        return;
    }

    if let HandlerKind::Irq(irq) = entry.kind {
        match intctl::handle_spurious(vector) {
            Ok(SpuriousCheck::Spurious) => return,
            Ok(SpuriousCheck::Regular) => {}
            Err(_) => {
                // No controller installed yet (very early boot); nothing
                // sensible to do but drop the interrupt.
                return;
            }
        }
        let _ = irq; // the handler itself is responsible for EOI-ing `irq`
    }

    (entry.function)(cpu_state, vector, stack_state);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy(_c: &mut crate::scheduler::context::CpuContext, _v: u8, _s: &InterruptStackFrame) {}

    #[test]
    fn reserved_vectors_cannot_be_registered() {
        assert_eq!(register_int_handler(PANIC_VECTOR, dummy), Err(KernelError::Unauthorized));
        assert_eq!(
            register_int_handler(SCHED_SOFTIRQ_VECTOR, dummy),
            Err(KernelError::Unauthorized)
        );
    }

    #[test]
    fn double_registration_fails() {
        let v = 200;
        assert!(register_int_handler(v, dummy).is_ok());
        assert_eq!(register_int_handler(v, dummy), Err(KernelError::AlreadyExists));
        assert!(remove_int_handler(v).is_ok());
        assert_eq!(remove_int_handler(v), Err(KernelError::NotRegistered));
    }
}
