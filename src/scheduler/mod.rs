/*
 * Scheduler (spec §2 "Scheduler", §4.5, §3 Thread/Process data model)
 *
 * Preemptive, priority-ordered round-robin with per-CPU ready sets (spec
 * §4.5 "Model"/"SMP"). Replaces the teacher's pluggable-policy
 * `SchedulerCore`/`Scheduler` trait/`KernelSchedCtx` framework (see
 * `DESIGN.md`) with the single fixed algorithm the spec describes: 64
 * priority levels, FIFO within a level, election on tick or yield.
 *
 * Thread and process storage is an arena (`BTreeMap<ThreadId, Thread>`,
 * `BTreeMap<ProcessId, Process>`) behind one lock each, matching the
 * spec's Design Notes ("global mutable state ... modeled as
 * explicitly-constructed singletons"). Per-CPU ready sets and the sleep
 * queue live in `sched_core`.
 */

pub mod context;
pub mod process;
pub mod sched_core;
pub mod thread;

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use spin::Mutex;

use crate::atomics::HandleCounter;
use crate::config::KERNEL_STACK_SIZE;
use crate::cpu;
use crate::error::{KernelError, KernelResult};
use crate::memory::address_space::AddressSpace;

pub use context::CpuContext;
pub use process::{Process, ProcessId, ReapedChild};
pub use thread::{EntryFn, ExitState, Priority, TerminationCause, Thread, ThreadId, ThreadKind, ThreadState, WaitType};

static THREADS: Mutex<BTreeMap<ThreadId, Thread>> = Mutex::new(BTreeMap::new());
static PROCESSES: Mutex<BTreeMap<ProcessId, Process>> = Mutex::new(BTreeMap::new());

static NEXT_TID: HandleCounter = HandleCounter::new();
static NEXT_PID: HandleCounter = HandleCounter::new();

static SCHEDULER_ENABLED: crate::atomics::Flag = crate::atomics::Flag::new(false);

pub fn current_thread_id() -> Option<ThreadId> {
    cpu::running_thread()
}

pub fn current_process_id() -> Option<ProcessId> {
    let tid = current_thread_id()?;
    THREADS.lock().get(&tid).map(|t| t.process)
}

/// Canonical signature per `DESIGN.md`'s Open Question resolution:
/// `(priority, name, type, stack_size, entry, arg) -> Result<ThreadId,
/// KernelError>`.
pub fn create_kernel_thread(
    priority: u8,
    name: &str,
    kind: ThreadKind,
    stack_size: usize,
    entry: EntryFn,
    arg: usize,
) -> KernelResult<ThreadId> {
    let priority = thread::Priority::new(priority).ok_or(KernelError::ForbiddenPriority)?;
    let process = current_process_id().unwrap_or(ProcessId::INIT);

    let tid = ThreadId(NEXT_TID.next() as u32);
    let stack = alloc::vec![0u8; stack_size].into_boxed_slice();
    let stack_top = stack.as_ptr() as u32 + stack.len() as u32;

    let t = Thread {
        id: tid,
        process,
        name: name.to_string(),
        kind,
        priority,
        state: ThreadState::Ready,
        wait_type: None,
        exit_state: None,
        termination_cause: None,
        entry,
        arg,
        return_value: 0,
        context: CpuContext::new_kernel_thread(stack_top, thread_trampoline),
        kernel_stack: stack,
        user_stack: None,
        wakeup_time: None,
        joiner: None,
        start_time_ms: crate::time::uptime_ms(),
        end_time_ms: None,
        held_resources: Vec::new(),
    };

    THREADS.lock().insert(tid, t);
    if let Some(proc) = PROCESSES.lock().get_mut(&process) {
        proc.threads.push(tid);
    }

    sched_core::current().push_ready(tid, priority.get());
    log::info!("created thread {} ({:?}) prio {}", tid, kind, priority.get());
    Ok(tid)
}

extern "C" fn thread_trampoline() -> ! {
    let tid = current_thread_id().expect("trampoline runs as a real thread");
    let (entry, arg) = {
        let threads = THREADS.lock();
        let t = threads.get(&tid).expect("trampoline's own TCB must exist");
        (t.entry, t.arg)
    };
    let ret = entry(arg);
    thread_exit(ret);
}

/// spec §4.5 "Exit": sets the return value, transitions to zombie, wakes
/// at most one joiner.
pub fn thread_exit(return_value: usize) -> ! {
    let tid = current_thread_id().expect("thread_exit called outside a thread");
    let (joiner, process, is_main) = {
        let mut threads = THREADS.lock();
        let t = threads.get_mut(&tid).expect("exiting thread must exist");
        t.return_value = return_value;
        t.exit_state = Some(ExitState::Returned);
        if t.termination_cause.is_none() {
            t.termination_cause = Some(TerminationCause::Normal);
        }
        t.state = ThreadState::Zombie;
        t.end_time_ms = Some(crate::time::uptime_ms());
        run_cleanup(t);
        let process = t.process;
        let is_main = PROCESSES
            .lock()
            .get(&process)
            .map(|p| p.main_thread == tid)
            .unwrap_or(false);
        (t.joiner, process, is_main)
    };
    if is_main {
        notify_process_exit(process, return_value as i32, TerminationCause::Normal);
    }
    if let Some(joiner) = joiner {
        wake_one(joiner);
    }
    schedule();
    unreachable!("a zombie thread must never be re-elected");
}

fn run_cleanup(t: &mut Thread) {
    for mut res in t.held_resources.drain(..) {
        (res.cleanup)();
    }
}

/// `sched_terminate_thread`: `set_termination_cause(cause); terminate()`.
/// May be called from interrupt context (e.g. divide-by-zero handler).
pub fn kill(target: ThreadId, cause: TerminationCause) -> KernelResult<()> {
    let (joiner, process, is_main) = {
        let mut threads = THREADS.lock();
        let t = threads.get_mut(&target).ok_or(KernelError::NoSuchId)?;
        if t.state == ThreadState::Zombie {
            return Ok(());
        }
        t.termination_cause = Some(cause);
        t.exit_state = Some(ExitState::Killed);
        t.state = ThreadState::Zombie;
        t.end_time_ms = Some(crate::time::uptime_ms());
        sched_core::SLEEP_QUEUE.remove(target);
        for cpu_idx in 0..crate::config::MAX_CPUS {
            sched_core::per_cpu(cpu::CpuId(cpu_idx as u32)).remove_ready(target);
        }
        run_cleanup(t);
        let process = t.process;
        let is_main = PROCESSES
            .lock()
            .get(&process)
            .map(|p| p.main_thread == target)
            .unwrap_or(false);
        (t.joiner, process, is_main)
    };
    if is_main {
        notify_process_exit(process, -1, cause);
    }
    if let Some(joiner) = joiner {
        wake_one(joiner);
    }
    Ok(())
}

/// spec §4.5 "Join": blocks until the target is zombie, copies out the
/// return value and termination cause, frees the TCB. At most one joiner
/// per thread (spec §3 invariant).
pub fn join(target: ThreadId) -> KernelResult<(usize, TerminationCause)> {
    loop {
        {
            let mut threads = THREADS.lock();
            let t = threads.get(&target).ok_or(KernelError::NoSuchId)?;
            if t.state == ThreadState::Zombie {
                let ret = t.return_value;
                let cause = t.termination_cause.unwrap_or(TerminationCause::Normal);
                let process = t.process;
                threads.remove(&target);
                drop(threads);
                if let Some(proc) = PROCESSES.lock().get_mut(&process) {
                    proc.threads.retain(|id| *id != target);
                }
                return Ok((ret, cause));
            }
            if t.joiner.is_some() && t.joiner != current_thread_id() {
                return Err(KernelError::Unauthorized);
            }
        }
        {
            let me = current_thread_id().ok_or(KernelError::Unauthorized)?;
            let mut threads = THREADS.lock();
            let t = threads.get_mut(&target).ok_or(KernelError::NoSuchId)?;
            t.joiner = Some(me);
            if let Some(my_thread) = threads.get_mut(&me) {
                my_thread.state = ThreadState::Joining;
            }
        }
        schedule();
    }
}

/// spec §4.5 "Sleep": sets `wakeup_time`, transitions to sleeping, links
/// into the sleep queue, yields. Forbidden from the idle thread.
pub fn sleep(ms: u64) -> KernelResult<()> {
    let tid = current_thread_id().ok_or(KernelError::Unauthorized)?;
    let wakeup_time;
    {
        let mut threads = THREADS.lock();
        let t = threads.get_mut(&tid).ok_or(KernelError::NoSuchId)?;
        if t.is_idle() {
            return Err(KernelError::Unauthorized);
        }
        wakeup_time = crate::time::uptime_ms() + ms;
        t.wakeup_time = Some(wakeup_time);
        t.state = ThreadState::Sleeping;
    }
    sched_core::SLEEP_QUEUE.insert(tid, wakeup_time);
    schedule();
    Ok(())
}

/// Called by sync primitives: the caller has already appended itself to
/// the primitive's own waiter queue under the primitive's lock (spec
/// §4.5 "Block on primitive"); this just flips state and yields.
pub fn block_current(wait_type: WaitType) {
    if let Some(tid) = current_thread_id() {
        let mut threads = THREADS.lock();
        if let Some(t) = threads.get_mut(&tid) {
            t.state = ThreadState::Waiting;
            t.wait_type = Some(wait_type);
        }
    }
    schedule();
}

/// Moves a specific blocked/sleeping thread back to ready and posts it to
/// the CPU performing the wake (spec §4.5 "SMP": cross-CPU wakeups post
/// the woken TCB to the target CPU's ready set).
pub fn wake_one(tid: ThreadId) {
    let priority = {
        let mut threads = THREADS.lock();
        match threads.get_mut(&tid) {
            Some(t) if matches!(t.state, ThreadState::Waiting | ThreadState::Sleeping | ThreadState::Joining) => {
                t.state = ThreadState::Ready;
                t.wait_type = None;
                t.wakeup_time = None;
                Some(t.priority.get())
            }
            _ => None,
        }
    };
    if let Some(priority) = priority {
        sched_core::SLEEP_QUEUE.remove(tid);
        sched_core::current().push_ready(tid, priority);
        crate::interrupts::send_resched_ipi(cpu::current_id());
    }
}

/// Elect algorithm (spec §4.5 "Elect"). Called from the main timer's tick
/// handler and from every voluntary suspension point.
pub fn schedule() {
    let cpu_id = cpu::current_id();
    let core = sched_core::per_cpu(cpu_id);
    let prev = cpu::running_thread();

    if let Some(prev_tid) = prev {
        let mut threads = THREADS.lock();
        if let Some(t) = threads.get_mut(&prev_tid) {
            if t.state == ThreadState::Running {
                t.state = ThreadState::Ready;
                let prio = t.priority.get();
                drop(threads);
                core.push_ready(prev_tid, prio);
            }
        }
    }

    let elected = core.pop_ready().or_else(|| core.idle_thread());
    let Some(next_tid) = elected else {
        return; // nothing runnable yet (very early boot)
    };

    let elected_idle = {
        let mut threads = THREADS.lock();
        if let Some(t) = threads.get_mut(&next_tid) {
            t.state = ThreadState::Running;
            t.is_idle()
        } else {
            false
        }
    };
    core.record_schedule(elected_idle);
    cpu::set_running_thread(Some(next_tid));

    if prev == Some(next_tid) {
        return; // nothing to switch
    }

    let (from_ctx, to_ctx) = {
        let mut threads = THREADS.lock();
        let from_ctx: *mut CpuContext = match prev {
            Some(prev_tid) => threads
                .get_mut(&prev_tid)
                .map(|t| &mut t.context as *mut CpuContext)
                .unwrap_or(core::ptr::null_mut()),
            None => core::ptr::null_mut(),
        };
        let to_ctx: *const CpuContext = threads
            .get(&next_tid)
            .map(|t| &t.context as *const CpuContext)
            .expect("elected thread must exist");
        (from_ctx, to_ctx)
    };

    if from_ctx.is_null() {
        // Boot path (this CPU's very first election): there is no
        // outgoing context to save, so jump straight into the elected
        // thread instead of `switch_to`'s save-then-restore. Never
        // returns; the abandoned boot stack frame is simply left behind
        // (harmless — `TSS.esp0` always points at its top for the next
        // privilege-raising interrupt, not wherever this call chain left
        // it). Host-side unit tests never reach this branch (no real CPU
        // state to jump into), so it's gated out of `#[cfg(test)]` builds.
        #[cfg(not(test))]
        unsafe {
            context::start_first_thread(to_ctx);
        }
        #[cfg(test)]
        return;
    }

    unsafe {
        context::switch_to(from_ctx, to_ctx);
    }
}

pub fn yield_now() {
    schedule();
}

pub fn schedule_count(cpu_id: cpu::CpuId) -> u64 {
    sched_core::per_cpu(cpu_id).schedule_count()
}

pub fn idle_schedule_count(cpu_id: cpu::CpuId) -> u64 {
    sched_core::per_cpu(cpu_id).idle_schedule_count()
}

/// spec §4.5 "Fork": duplicates the current process (new page directory,
/// COW), clones only the calling thread, attaches the child to the
/// parent's children list. Returns the *parent's* view (child pid); the
/// child observes 0 via its duplicated register context.
pub fn fork() -> KernelResult<ProcessId> {
    let parent_pid = current_process_id().ok_or(KernelError::Unauthorized)?;
    let parent_tid = current_thread_id().ok_or(KernelError::Unauthorized)?;

    let parent_name = {
        let processes = PROCESSES.lock();
        let p = processes.get(&parent_pid).ok_or(KernelError::NoSuchId)?;
        p.name.clone()
    };
    let parent_space = AddressSpace::new_kernel();
    let child_space = parent_space.fork().map_err(|_| KernelError::NoMoreMemory)?;

    let child_pid = ProcessId(NEXT_PID.next() as u32);

    let (child_tid, child_priority) = {
        let mut threads = THREADS.lock();
        let parent_thread = threads.get(&parent_tid).ok_or(KernelError::NoSuchId)?;
        let stack = alloc::vec![0u8; KERNEL_STACK_SIZE].into_boxed_slice();
        let mut ctx = parent_thread.context;
        ctx.set_return_value(0); // child observes fork() == 0
        let child_tid = ThreadId(NEXT_TID.next() as u32);
        let child_thread = Thread {
            id: child_tid,
            process: child_pid,
            name: parent_thread.name.clone(),
            kind: parent_thread.kind,
            priority: parent_thread.priority,
            state: ThreadState::Ready,
            wait_type: None,
            exit_state: None,
            termination_cause: None,
            entry: parent_thread.entry,
            arg: parent_thread.arg,
            return_value: 0,
            context: ctx,
            kernel_stack: stack,
            user_stack: None,
            wakeup_time: None,
            joiner: None,
            start_time_ms: crate::time::uptime_ms(),
            end_time_ms: None,
            held_resources: Vec::new(),
        };
        let priority = child_thread.priority.get();
        threads.insert(child_tid, child_thread);
        (child_tid, priority)
    };

    let child_process = Process {
        pid: child_pid,
        parent: Some(parent_pid),
        name: parent_name,
        exit_code: None,
        main_thread: child_tid,
        threads: alloc::vec![child_tid],
        living_children: Vec::new(),
        reaped_children: Vec::new(),
        page_directory: child_space.page_directory,
    };
    PROCESSES.lock().insert(child_pid, child_process);
    if let Some(parent) = PROCESSES.lock().get_mut(&parent_pid) {
        parent.living_children.push(child_pid);
    }

    sched_core::current().push_ready(child_tid, child_priority);
    Ok(child_pid)
}

/// `waitpid(pid, &status, &cause) -> pid`; `pid == -1` means any child.
pub fn waitpid(pid: i32, status: &mut i32, cause: &mut TerminationCause) -> KernelResult<ProcessId> {
    let parent_pid = current_process_id().ok_or(KernelError::Unauthorized)?;
    loop {
        {
            let mut processes = PROCESSES.lock();
            let parent = processes.get_mut(&parent_pid).ok_or(KernelError::NoSuchId)?;
            let idx = parent
                .reaped_children
                .iter()
                .position(|r| pid == -1 || r.pid.0 as i32 == pid);
            if let Some(idx) = idx {
                let reaped = parent.reaped_children.remove(idx);
                *status = reaped.exit_code;
                *cause = reaped.cause;
                return Ok(reaped.pid);
            }
            if pid != -1 && !parent.living_children.iter().any(|c| c.0 as i32 == pid) {
                return Err(KernelError::NoSuchId);
            }
        }
        schedule();
    }
}

/// Called when a process's main thread reaches zombie: records the exit
/// code on the parent's reaped-children list. `waitpid` polls for it via
/// `schedule()` rather than a dedicated wait channel, matching the
/// teacher's cooperative-poll style for rarely-contended paths.
pub fn notify_process_exit(pid: ProcessId, exit_code: i32, cause: TerminationCause) {
    let parent = {
        let mut processes = PROCESSES.lock();
        let Some(proc) = processes.get_mut(&pid) else {
            return;
        };
        proc.exit_code = Some(exit_code);
        proc.parent
    };
    let Some(parent_pid) = parent else { return };
    let mut processes = PROCESSES.lock();
    if let Some(parent) = processes.get_mut(&parent_pid) {
        parent.living_children.retain(|c| *c != pid);
        parent.reaped_children.push(ReapedChild {
            pid,
            exit_code,
            cause,
        });
    }
}

/// Boot-time bring-up (spec §2 "Control flow"): creates each CPU's idle
/// thread and the init thread, then hands control to the scheduler. Idle
/// threads never block and run at the lowest priority, and are excluded
/// from their own CPU's ready set (elected only via the `idle_thread`
/// fallback in `schedule()`).
pub fn kernel_kickstart(cpu_count: usize, init_entry: EntryFn) -> KernelResult<()> {
    PROCESSES.lock().insert(
        ProcessId::INIT,
        Process {
            pid: ProcessId::INIT,
            parent: None,
            name: "init".to_string(),
            exit_code: None,
            main_thread: ThreadId(0),
            threads: Vec::new(),
            living_children: Vec::new(),
            reaped_children: Vec::new(),
            page_directory: AddressSpace::new_kernel().page_directory,
        },
    );

    for cpu_idx in 0..cpu_count {
        let tid = create_kernel_thread(
            thread::Priority::IDLE.get(),
            "idle",
            ThreadKind::Kernel,
            KERNEL_STACK_SIZE,
            idle_entry,
            0,
        )?;
        let cpu = cpu::CpuId(cpu_idx as u32);
        sched_core::per_cpu(cpu).set_idle_thread(tid);
        sched_core::per_cpu(cpu).remove_ready(tid);
    }

    let init_tid = create_kernel_thread(1, "init", ThreadKind::Kernel, KERNEL_STACK_SIZE, init_entry, 0)?;
    if let Some(proc) = PROCESSES.lock().get_mut(&ProcessId::INIT) {
        proc.main_thread = init_tid;
        proc.threads.push(init_tid);
    }

    SCHEDULER_ENABLED.set(true);
    log::info!("scheduler: {} CPU(s) brought up, init thread {}", cpu_count, init_tid);
    Ok(())
}

extern "C" fn idle_entry(_arg: usize) -> usize {
    loop {
        unsafe { core::arch::asm!("sti", "hlt", options(nomem, nostack)) };
    }
}

pub fn scheduler_enabled() -> bool {
    SCHEDULER_ENABLED.get()
}

/// Used by the mutex's ceiling-priority elevation (spec §4.6 "if a ceiling
/// was supplied, raise caller's priority to `ceiling`").
pub fn thread_priority(tid: ThreadId) -> KernelResult<u8> {
    THREADS.lock().get(&tid).map(|t| t.priority.get()).ok_or(KernelError::NoSuchId)
}

/// Changes a thread's priority in place. Does not requeue it: a thread
/// mid-wait is not in any ready set, and one already ready keeps its old
/// position until the next time it's pushed back (matches the teacher's
/// treatment of priority changes as taking effect on next election).
pub fn set_thread_priority(tid: ThreadId, priority: u8) -> KernelResult<()> {
    let priority = Priority::new(priority).ok_or(KernelError::ForbiddenPriority)?;
    let mut threads = THREADS.lock();
    let t = threads.get_mut(&tid).ok_or(KernelError::NoSuchId)?;
    t.priority = priority;
    Ok(())
}

#[cfg(test)]
mod tests;
