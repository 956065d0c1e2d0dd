/*
 * Global Descriptor Table (32-bit protected mode)
 *
 * Flat memory model: one kernel code/data pair covering all 4 GiB, one
 * user code/data pair (ring 3) for the same range, and a TSS descriptor
 * used only for its `esp0`/`ss0` fields — the processor reads those on
 * every ring3→ring0 transition to find the kernel stack, there is no
 * software task-switching here.
 *
 * Replaces the teacher's `arch::x86_64::gdt` (built on the `x86_64`
 * crate's long-mode `GlobalDescriptorTable`/`Descriptor` types, which do
 * not model 32-bit segment base/limit/granularity at all). i386 has no
 * equivalent high-level builder in the `x86` crate version pinned here,
 * so this builds raw 8-byte descriptors directly, the traditional
 * protected-mode way. Selectors 0x08/0x10 match the constants already
 * hard-coded in `scheduler::context::CpuContext::new_kernel_thread`.
 */

use core::mem::size_of;

use x86::dtables::{lgdt, DescriptorTablePointer};

pub const KERNEL_CS: u16 = 0x08;
pub const KERNEL_DS: u16 = 0x10;
pub const USER_CS: u16 = 0x18 | 3;
pub const USER_DS: u16 = 0x20 | 3;
pub const TSS_SELECTOR: u16 = 0x28;

const ACCESS_PRESENT: u8 = 1 << 7;
const ACCESS_RING3: u8 = 3 << 5;
const ACCESS_SEGMENT: u8 = 1 << 4; // code/data, not a system descriptor
const ACCESS_EXECUTABLE: u8 = 1 << 3;
const ACCESS_RW: u8 = 1 << 1; // readable (code) / writable (data)
const ACCESS_TSS_AVAILABLE: u8 = 0x9;

const GRAN_4K: u8 = 1 << 7;
const GRAN_32BIT: u8 = 1 << 6;

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct GdtEntry {
    limit_low: u16,
    base_low: u16,
    base_mid: u8,
    access: u8,
    granularity: u8,
    base_high: u8,
}

impl GdtEntry {
    const fn null() -> Self {
        Self {
            limit_low: 0,
            base_low: 0,
            base_mid: 0,
            access: 0,
            granularity: 0,
            base_high: 0,
        }
    }

    const fn new(base: u32, limit: u32, access: u8, granularity: u8) -> Self {
        Self {
            limit_low: (limit & 0xFFFF) as u16,
            base_low: (base & 0xFFFF) as u16,
            base_mid: ((base >> 16) & 0xFF) as u8,
            access,
            granularity: (granularity & 0xF0) | (((limit >> 16) & 0x0F) as u8),
            base_high: ((base >> 24) & 0xFF) as u8,
        }
    }
}

/// Minimal i386 TSS: only `ss0`/`esp0` are consulted by hardware on a
/// ring3→ring0 transition through this kernel's gates; every other field
/// is unused since task-gate switching is not in scope.
#[repr(C, packed)]
struct Tss {
    link: u32,
    esp0: u32,
    ss0: u32,
    _rest: [u32; 22],
    iomap_base: u16,
}

impl Tss {
    const fn zeroed() -> Self {
        Self {
            link: 0,
            esp0: 0,
            ss0: 0,
            _rest: [0; 22],
            iomap_base: size_of::<Tss>() as u16,
        }
    }
}

const NUM_ENTRIES: usize = 6; // null, kcode, kdata, ucode, udata, tss

static mut GDT_ENTRIES: [GdtEntry; NUM_ENTRIES] = [GdtEntry::null(); NUM_ENTRIES];
static mut TSS: Tss = Tss::zeroed();

/// Builds the GDT, loads it, reloads every segment register, and loads
/// the task register. `kernel_stack_top` is the ring-0 stack hardware
/// switches to on privilege-raising interrupts (the BSP's own startup
/// stack is fine before any thread exists; afterwards each thread's
/// kernel stack top should be kept current via `set_kernel_stack`).
pub fn init(kernel_stack_top: u32) {
    unsafe {
        GDT_ENTRIES[1] = GdtEntry::new(
            0,
            0xFFFFF,
            ACCESS_PRESENT | ACCESS_SEGMENT | ACCESS_EXECUTABLE | ACCESS_RW,
            GRAN_4K | GRAN_32BIT,
        );
        GDT_ENTRIES[2] = GdtEntry::new(0, 0xFFFFF, ACCESS_PRESENT | ACCESS_SEGMENT | ACCESS_RW, GRAN_4K | GRAN_32BIT);
        GDT_ENTRIES[3] = GdtEntry::new(
            0,
            0xFFFFF,
            ACCESS_PRESENT | ACCESS_RING3 | ACCESS_SEGMENT | ACCESS_EXECUTABLE | ACCESS_RW,
            GRAN_4K | GRAN_32BIT,
        );
        GDT_ENTRIES[4] = GdtEntry::new(
            0,
            0xFFFFF,
            ACCESS_PRESENT | ACCESS_RING3 | ACCESS_SEGMENT | ACCESS_RW,
            GRAN_4K | GRAN_32BIT,
        );

        TSS.ss0 = KERNEL_DS as u32;
        TSS.esp0 = kernel_stack_top;
        let tss_base = &raw const TSS as u32;
        GDT_ENTRIES[5] = GdtEntry::new(
            tss_base,
            (size_of::<Tss>() - 1) as u32,
            ACCESS_PRESENT | ACCESS_TSS_AVAILABLE,
            0,
        );

        let ptr = DescriptorTablePointer {
            base: GDT_ENTRIES.as_ptr(),
            limit: (size_of::<[GdtEntry; NUM_ENTRIES]>() - 1) as u16,
        };
        lgdt(&ptr);

        reload_segments();
        load_task_register();
    }
    log::info!("gdt: loaded, {} descriptors", NUM_ENTRIES);
}

/// Updates the TSS's ring-0 stack for the next privilege-raising
/// interrupt; called by the scheduler on every context switch so the
/// kernel always lands on the newly-running thread's own stack.
pub fn set_kernel_stack(esp0: u32) {
    unsafe { TSS.esp0 = esp0 };
}

#[unsafe(naked)]
unsafe extern "C" fn reload_segments() {
    core::arch::naked_asm!(
        "mov ax, {kdata}",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",
        "mov ss, ax",
        "push {kcode}",
        "lea eax, [2f]",
        "push eax",
        "retf",
        "2:",
        "ret",
        kdata = const KERNEL_DS,
        kcode = const KERNEL_CS as u32,
    );
}

unsafe fn load_task_register() {
    unsafe {
        core::arch::asm!("ltr ax", in("ax") TSS_SELECTOR, options(nostack, preserves_flags));
    }
}
