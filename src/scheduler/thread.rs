/*
 * Thread Control Block (spec §3 "Thread (TCB)")
 *
 * Replaces the teacher's policy-oriented `Thread` (state machine of
 * Ready/Running/Blocked/Terminated driven by a pluggable `SchedClass`/
 * `KernelSchedCtx` apparatus) with the fixed shape spec.md's data model
 * calls for: 64 priority levels, an explicit wait-type when blocked, a
 * termination cause distinct from the exit return-state, and the list of
 * acquired "resources" each carrying a cleanup callback (grounded in the
 * teacher's own `Thread::exit_code`/stack-ownership fields, generalized).
 */

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::config::NUM_PRIORITIES;
use crate::scheduler::context::CpuContext;
use crate::scheduler::process::ProcessId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u32);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tid#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadKind {
    Kernel,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    Ready,
    Sleeping,
    Zombie,
    Joining,
    Copying,
    Waiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitType {
    Resource,
    Io,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    Returned,
    Killed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCause {
    Normal,
    DivByZero,
    Panic,
}

/// A priority in `[0, NUM_PRIORITIES)`, 0 is highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Priority(u8);

impl Priority {
    pub const IDLE: Priority = Priority((NUM_PRIORITIES - 1) as u8);

    pub fn new(value: u8) -> Option<Self> {
        if (value as usize) < NUM_PRIORITIES {
            Some(Priority(value))
        } else {
            None
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

/// A resource the thread currently holds, with a cleanup callback run if
/// the thread is killed while still holding it (e.g. releasing a mutex
/// acquired but never `post`ed because the owner was terminated).
pub struct HeldResource {
    pub cleanup: Box<dyn FnMut() + Send>,
}

pub type EntryFn = extern "C" fn(arg: usize) -> usize;

pub struct Thread {
    pub id: ThreadId,
    pub process: ProcessId,
    pub name: String,
    pub kind: ThreadKind,
    pub priority: Priority,
    pub state: ThreadState,
    pub wait_type: Option<WaitType>,
    pub exit_state: Option<ExitState>,
    pub termination_cause: Option<TerminationCause>,

    pub entry: EntryFn,
    pub arg: usize,
    pub return_value: usize,

    pub context: CpuContext,

    pub kernel_stack: Box<[u8]>,
    pub user_stack: Option<Box<[u8]>>,

    /// Monotonic-ms deadline; only meaningful while `state == Sleeping`.
    pub wakeup_time: Option<u64>,

    /// At most one joiner may wait on a given thread (spec invariant).
    pub joiner: Option<ThreadId>,

    pub start_time_ms: u64,
    pub end_time_ms: Option<u64>,

    pub held_resources: Vec<HeldResource>,
}

impl Thread {
    /// A thread in `Zombie` must have an exit state recorded (spec §3
    /// invariant "`zombie` implies `return_state` set").
    pub fn is_consistent(&self) -> bool {
        if self.state == ThreadState::Zombie && self.exit_state.is_none() {
            return false;
        }
        if self.state == ThreadState::Sleeping && self.wakeup_time.is_none() {
            return false;
        }
        true
    }

    pub fn is_idle(&self) -> bool {
        self.priority == Priority::IDLE && self.kind == ThreadKind::Kernel
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("state", &self.state)
            .finish()
    }
}
