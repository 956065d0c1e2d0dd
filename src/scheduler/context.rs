/*
 * Saved CPU Context (spec §3 TCB "saved CPU context (registers +
 * selectors + eflags)")
 *
 * The teacher's `context.rs` was a `SchedContext`/`KernelSchedCtx` policy
 * adapter for a pluggable-scheduling-policy framework this core replaces
 * (see `DESIGN.md`); this file now holds what its name suggests: the
 * register set saved/restored across a context switch, and the low-level
 * `switch_to` routine that performs one. i386 general-purpose registers
 * plus segment selectors and EFLAGS, following the layout the assembly
 * interrupt stub in `arch::x86::idt` pushes on entry.
 */

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CpuContext {
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub esp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,

    pub ds: u32,
    pub es: u32,
    pub fs: u32,
    pub gs: u32,

    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,

    /// Only meaningful for ring-3 contexts (a privilege change pushes
    /// these in addition to the above).
    pub user_esp: u32,
    pub ss: u32,
}

const KERNEL_CS: u32 = 0x08;
const KERNEL_DS: u32 = 0x10;
const EFLAGS_IF: u32 = 1 << 9;
const EFLAGS_RESERVED: u32 = 1 << 1;

impl CpuContext {
    pub const fn zeroed() -> Self {
        Self {
            edi: 0,
            esi: 0,
            ebp: 0,
            esp: 0,
            ebx: 0,
            edx: 0,
            ecx: 0,
            eax: 0,
            ds: 0,
            es: 0,
            fs: 0,
            gs: 0,
            eip: 0,
            cs: 0,
            eflags: 0,
            user_esp: 0,
            ss: 0,
        }
    }

    /// Build the initial context for a brand-new kernel thread: `esp`
    /// points at the top of its (otherwise empty) kernel stack, `eip` at
    /// the trampoline, interrupts enabled.
    pub fn new_kernel_thread(stack_top: u32, trampoline: extern "C" fn() -> !) -> Self {
        Self {
            esp: stack_top,
            eip: trampoline as usize as u32,
            cs: KERNEL_CS,
            ds: KERNEL_DS,
            es: KERNEL_DS,
            fs: KERNEL_DS,
            gs: KERNEL_DS,
            eflags: EFLAGS_RESERVED | EFLAGS_IF,
            ..Self::zeroed()
        }
    }

    /// Set the value the thread's entry trampoline will see as its return
    /// value from whatever blocking call is resuming it (e.g. `fork`'s
    /// child observing 0, spec §4.5).
    pub fn set_return_value(&mut self, value: u32) {
        self.eax = value;
    }
}

/// Loads `to`'s register set and transfers control to it via `iretd`,
/// building a same-privilege interrupt-return frame (`eip`/`cs`/`eflags`)
/// on its own stack. Used the one time per CPU there is no outgoing
/// context to save — the very first thread elected after
/// `kernel_kickstart` — so unlike [`switch_to`] this never returns.
///
/// # Safety
/// `to` must point at a context whose kernel stack is mapped and not in
/// use elsewhere.
#[unsafe(naked)]
pub unsafe extern "C" fn start_first_thread(to: *const CpuContext) -> ! {
    core::arch::naked_asm!(
        "mov eax, [esp + 4]",
        "mov esp, [eax + 12]",
        "mov ebp, [eax + 8]",
        "mov ebx, [eax + 16]",
        "mov edi, [eax + 0]",
        "mov esi, [eax + 4]",
        "mov cx, word ptr [eax + 32]", // ds
        "mov ds, cx",
        "mov cx, word ptr [eax + 36]", // es
        "mov es, cx",
        "mov cx, word ptr [eax + 40]", // fs
        "mov fs, cx",
        "mov cx, word ptr [eax + 44]", // gs
        "mov gs, cx",
        "push dword ptr [eax + 56]", // eflags
        "push dword ptr [eax + 52]", // cs
        "push dword ptr [eax + 48]", // eip
        "iretd",
    );
}

/// Performs one context switch: saves the outgoing thread's register set
/// into `*from`, restores `*to`, and returns into the new thread. Actual
/// register shuffling happens in the naked low-level stub; this wrapper
/// exists so call sites (`sched_core::elect`) stay architecture-neutral
/// Rust rather than embedding `global_asm!` inline.
///
/// # Safety
/// `from` and `to` must each point at a context belonging to a thread
/// whose kernel stack is mapped and not in use elsewhere.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_to(from: *mut CpuContext, to: *const CpuContext) {
    core::arch::naked_asm!(
        // cdecl: [esp+4] = from, [esp+8] = to.
        "mov eax, [esp + 4]",
        "mov edx, [esp + 8]",
        // Save callee-saved registers + esp of the outgoing thread.
        "mov [eax + 8], ebp",
        "mov [eax + 12], esp",
        "mov [eax + 16], ebx",
        "mov [eax + 0], edi",
        "mov [eax + 4], esi",
        "pushfd",
        "pop dword ptr [eax + 56]",
        // Load the incoming thread's stack and callee-saved registers.
        "mov ebp, [edx + 8]",
        "mov esp, [edx + 12]",
        "mov ebx, [edx + 16]",
        "mov edi, [edx + 0]",
        "mov esi, [edx + 4]",
        "push dword ptr [edx + 56]",
        "popfd",
        "ret",
    );
}
