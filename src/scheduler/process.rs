/*
 * Process Control Block (spec §3 "Process (PCB)")
 *
 * Replaces the teacher's `Process`/`ProcessManager`/`ProcessState` trio
 * (file-descriptor table, `ProcessType`/`ProcessInitState` classification,
 * a `ProcessManager` ZST forwarding to a global scheduler singleton) with
 * the fields the spec's data model actually names: parent link, thread
 * membership, living/reaped children for `waitpid`, and the page-directory
 * physical root. File descriptors and init-state classification have no
 * counterpart in scope here.
 */

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::memory::types::PhysAddr;
use crate::scheduler::thread::{TerminationCause, ThreadId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u32);

impl ProcessId {
    /// Every kernel boots exactly one process before any `fork()`.
    pub const INIT: ProcessId = ProcessId(1);
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid#{}", self.0)
    }
}

/// One entry per child that has exited but not yet been collected by
/// `waitpid` (spec §4.5 "Fork"/"waitpid").
#[derive(Debug, Clone, Copy)]
pub struct ReapedChild {
    pub pid: ProcessId,
    pub exit_code: i32,
    pub cause: TerminationCause,
}

pub struct Process {
    pub pid: ProcessId,
    pub parent: Option<ProcessId>,
    pub name: String,
    pub exit_code: Option<i32>,
    pub main_thread: ThreadId,
    pub threads: Vec<ThreadId>,
    pub living_children: Vec<ProcessId>,
    pub reaped_children: Vec<ReapedChild>,
    pub page_directory: PhysAddr,
}

impl Process {
    pub fn all_threads_reaped(&self) -> bool {
        self.threads.is_empty()
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("parent", &self.parent)
            .field("name", &self.name)
            .field("threads", &self.threads.len())
            .field("exit_code", &self.exit_code)
            .finish()
    }
}
