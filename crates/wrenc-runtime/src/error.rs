//! Runtime error taxonomy (spec §7).
//!
//! The runtime itself never unwinds: per spec §7, "the runtime has no
//! unwinding; errors unconditionally terminate the process after writing a
//! message." `RuntimeError` is the value that message is built from, and is
//! what the embedding CLI (`wrenc-cli`) prints before exiting non-zero; it is
//! also what a foreign method's `Result` carries on the Rust side before the
//! bridge converts it into a pending-error flag (`wrenAbortFiber`, 4.N).

use thiserror::Error;

use wrenc_bytecode::signature::SignatureId;

use crate::object::{ClassId, DispatchError};
use crate::slab::SlabError;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("stack overflow")]
    StackOverflow,

    #[error("stack underflow")]
    StackUnderflow,

    #[error("no active call frame")]
    NoActiveFrame,

    #[error("local index {index} out of bounds (max {max})")]
    LocalOutOfBounds { index: usize, max: usize },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Allocation(#[from] SlabError),

    #[error("fibre is not in a resumable state: {0:?}")]
    FibreNotResumable(crate::fiber::FibreState),

    #[error("cannot yield: no fibre beneath the current one on the call chain")]
    NoCallerToResumeTo,

    #[error("foreign method not bound for {module}.{class}::{signature}")]
    ForeignMethodUnbound { module: String, class: String, signature: SignatureId },

    #[error("class {0:?} has not been registered")]
    UnknownClass(ClassId),

    #[error("{0}")]
    Custom(String),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
