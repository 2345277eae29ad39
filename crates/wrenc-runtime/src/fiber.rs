//! Cooperative fibre subsystem (spec 4.M, component M).
//!
//! Strictly single-threaded (spec §5): all user code, and every fibre
//! switch, runs on one OS thread, so the process-wide call chain below is a
//! plain `thread_local` `Vec` with no locking. Each fibre gets a private
//! 2 MiB stack mapped directly with `libc::mmap` plus a guard page; the
//! switch itself goes through the POSIX `ucontext` primitives
//! (`getcontext`/`makecontext`/`swapcontext`) rather than hand-written
//! per-architecture assembly, since this repo has no native backend
//! targeting a specific calling convention — the wire-format and dispatch
//! side of the runtime is ISA-independent and stays that way here too.

use std::cell::RefCell;

use thiserror::Error;

use crate::error::{RuntimeError, RuntimeResult};
use crate::stack::Stack;
use crate::value::Value;

/// Private stack size per fibre (spec 4.M: "2 MiB, page-aligned").
pub const FIBRE_STACK_SIZE: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FibreState {
    NotStarted,
    Running,
    Suspended,
    Finished,
    Failed,
}

#[derive(Debug, Error)]
pub enum FibreError {
    #[error("failed to map fibre stack: {0}")]
    StackMapFailed(std::io::Error),
    #[error("failed to guard fibre stack: {0}")]
    GuardFailed(std::io::Error),
}

type FibreBody = dyn FnOnce(Value) -> Value;

thread_local! {
    /// The currently-active fibre chain: `call` pushes the callee, `yield`
    /// pops back to the immediate caller (spec 4.M / §5: "yield always
    /// resumes the immediate caller, never an arbitrary fibre").
    static CALL_CHAIN: RefCell<Vec<*mut Fibre>> = const { RefCell::new(Vec::new()) };
    /// Handoff slot read by `trampoline` immediately after `makecontext`,
    /// since the C entry point it is given takes no meaningful arguments.
    static STARTING: RefCell<*mut Fibre> = const { RefCell::new(std::ptr::null_mut()) };
}

/// A Fibre: a function to run, a private stack, and the VM operand/local
/// stack (`ObjFibre`, spec §3) that function executes against.
pub struct Fibre {
    mapping_base: *mut u8,
    mapping_len: usize,
    stack_base: *mut u8,
    context: Box<libc::ucontext_t>,
    /// Where `call`'s `swapcontext` should resume to once this fibre
    /// suspends or finishes. Set fresh on every `call`.
    resume_into: *mut libc::ucontext_t,
    state: FibreState,
    body: Option<Box<FibreBody>>,
    /// Value flowing across the most recent switch: the argument to `call`
    /// or `yield`, and later the value handed back to the resumer.
    transfer: Value,
    /// This fibre's own operand/local stack, walked as GC roots while the
    /// fibre is `Running` or `Suspended` (spec 4.L step 1 / 4.M).
    pub vm_stack: Stack,
}

impl Fibre {
    pub fn new(body: Box<FibreBody>) -> Result<Box<Fibre>, FibreError> {
        let (mapping_base, mapping_len, stack_base) = map_guarded_stack()?;
        Ok(Box::new(Fibre {
            mapping_base,
            mapping_len,
            stack_base,
            context: Box::new(unsafe { std::mem::zeroed() }),
            resume_into: std::ptr::null_mut(),
            state: FibreState::NotStarted,
            body: Some(body),
            transfer: Value::NULL,
            vm_stack: Stack::new(),
        }))
    }

    pub fn state(&self) -> FibreState {
        self.state
    }

    /// `Fiber.call(arg)` (4.M): pushes this fibre onto the call chain and
    /// switches into it. Returns once this fibre (or something it
    /// transitively called) yields back to it, or finishes.
    pub fn call(fibre: &mut Fibre, arg: Value) -> RuntimeResult<Value> {
        if !matches!(fibre.state, FibreState::NotStarted | FibreState::Suspended) {
            return Err(RuntimeError::FibreNotResumable(fibre.state));
        }
        fibre.transfer = arg;
        let fibre_ptr: *mut Fibre = fibre;
        CALL_CHAIN.with(|chain| chain.borrow_mut().push(fibre_ptr));

        let mut caller_ctx: libc::ucontext_t = unsafe { std::mem::zeroed() };
        fibre.resume_into = &mut caller_ctx;

        if fibre.state == FibreState::NotStarted {
            unsafe {
                libc::getcontext(fibre.context.as_mut());
                fibre.context.uc_stack.ss_sp = fibre.stack_base as *mut _;
                fibre.context.uc_stack.ss_size = FIBRE_STACK_SIZE;
                fibre.context.uc_link = std::ptr::null_mut();
                STARTING.with(|s| *s.borrow_mut() = fibre_ptr);
                libc::makecontext(fibre.context.as_mut(), trampoline, 0);
            }
        }
        fibre.state = FibreState::Running;
        unsafe { libc::swapcontext(&mut caller_ctx, fibre.context.as_ref()) };

        // Resumed here once the fibre suspended or finished; `transfer` now
        // holds whatever it yielded or returned.
        Ok(fibre.transfer)
    }

    /// `Fiber.yield(arg)` (4.M): pops the current fibre and resumes the one
    /// beneath it on the call chain.
    pub fn yield_current(value: Value) -> RuntimeResult<Value> {
        let fibre_ptr = CALL_CHAIN.with(|chain| chain.borrow_mut().pop()).ok_or(RuntimeError::NoCallerToResumeTo)?;
        let fibre = unsafe { &mut *fibre_ptr };
        fibre.transfer = value;
        fibre.state = FibreState::Suspended;
        let resume_into = fibre.resume_into;
        unsafe { libc::swapcontext(fibre.context.as_mut(), resume_into) };

        // Resumed by a later `call`: `transfer` holds the new argument.
        Ok(fibre.transfer)
    }

    /// The fibre whose stack the GC should treat as the live thread stack
    /// right now (top of the call chain), if any is active.
    pub fn current() -> Option<*mut Fibre> {
        CALL_CHAIN.with(|chain| chain.borrow().last().copied())
    }

    /// Every fibre on the call chain, outermost first — used to mark roots
    /// across the whole suspended chain, not just the running one.
    pub fn call_chain() -> Vec<*mut Fibre> {
        CALL_CHAIN.with(|chain| chain.borrow().clone())
    }
}

impl Drop for Fibre {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.mapping_base as *mut libc::c_void, self.mapping_len);
        }
    }
}

extern "C" fn trampoline() {
    let fibre_ptr = STARTING.with(|s| *s.borrow());
    let fibre = unsafe { &mut *fibre_ptr };
    let body = fibre.body.take().expect("fibre body already consumed");
    let arg = fibre.transfer;

    let result = body(arg);

    fibre.transfer = result;
    fibre.state = FibreState::Finished;
    CALL_CHAIN.with(|chain| {
        chain.borrow_mut().retain(|&p| p != fibre_ptr);
    });
    let resume_into = fibre.resume_into;
    unsafe {
        libc::swapcontext(fibre.context.as_mut(), resume_into);
    }
    unreachable!("a finished fibre is never resumed back into its own context");
}

/// Maps `FIBRE_STACK_SIZE` bytes plus one leading guard page. Returns
/// `(mapping_base, mapping_len, usable_stack_base)`; stacks conventionally
/// grow down, so the guard page sits at the low end, closest to overflow.
fn map_guarded_stack() -> Result<(*mut u8, usize, *mut u8), FibreError> {
    let page = page_size();
    let mapping_len = FIBRE_STACK_SIZE + page;
    let mapping_base = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            mapping_len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if mapping_base == libc::MAP_FAILED {
        return Err(FibreError::StackMapFailed(std::io::Error::last_os_error()));
    }
    let mapping_base = mapping_base as *mut u8;
    if unsafe { libc::mprotect(mapping_base as *mut libc::c_void, page, libc::PROT_NONE) } != 0 {
        let err = std::io::Error::last_os_error();
        unsafe { libc::munmap(mapping_base as *mut libc::c_void, mapping_len) };
        return Err(FibreError::GuardFailed(err));
    }
    let stack_base = unsafe { mapping_base.add(page) };
    Ok((mapping_base, mapping_len, stack_base))
}

fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}
