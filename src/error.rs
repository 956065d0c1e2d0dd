/*
 * Kernel Error Taxonomy
 *
 * Replaces the teacher's ad hoc `Result<_, &'static str>` idiom (see
 * `scheduler/process.rs::reap`, `scheduler/thread.rs::exit`) with a typed
 * enum matching the twelve error kinds the core's components are allowed
 * to return. Every public operation in the interrupt, timer, scheduler and
 * sync modules returns `Result<T, KernelError>`; invariant violations still
 * escalate to `kernel_panic!` rather than returning an error (propagation
 * policy, spec §7).
 */

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// A looked-up handle (pid, tid, irq, vector) is absent.
    NoSuchId,
    /// A numeric argument is outside the accepted range.
    OutOfBound,
    /// A required output buffer/pointer is missing.
    NullPointer,
    /// Conflicting registration (slot already occupied).
    AlreadyExists,
    /// Removal of a handler/registration that was never installed.
    NotRegistered,
    /// Protected resource, wrong caller, or reserved vector/line.
    Unauthorized,
    /// Operation attempted on a torn-down primitive.
    Uninitialized,
    /// Non-blocking acquisition failed.
    Locked,
    /// Priority outside `[0, NUM_PRIORITIES)` for a thread operation.
    ForbiddenPriority,
    /// Allocator exhaustion.
    NoMoreMemory,
    /// Capability absent on the currently active driver.
    NotSupported,
    /// ACPI table checksum did not validate.
    ChecksumFailed,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            KernelError::NoSuchId => "no such id",
            KernelError::OutOfBound => "argument out of bound",
            KernelError::NullPointer => "required pointer is null",
            KernelError::AlreadyExists => "already registered / already exists",
            KernelError::NotRegistered => "not registered",
            KernelError::Unauthorized => "unauthorized action",
            KernelError::Uninitialized => "operation on uninitialized object",
            KernelError::Locked => "non-blocking acquisition would block",
            KernelError::ForbiddenPriority => "priority out of range",
            KernelError::NoMoreMemory => "out of memory",
            KernelError::NotSupported => "capability not supported by active driver",
            KernelError::ChecksumFailed => "checksum validation failed",
        };
        f.write_str(msg)
    }
}

pub type KernelResult<T> = Result<T, KernelError>;
