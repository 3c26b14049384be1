//! Ivy runtime: the value model and bytecode interpreter.
//!
//! Key design principles:
//! - `Value`: the single runtime representation every opcode operates on,
//!   replacing the source VM's mix of native booleans and `"true"`/`"false"`
//!   strings on the operand stack.
//! - `FrameTemplate`: produced once per function by the code generator and
//!   shared by every [`Frame`] created for that function during a run.
//! - `Vm`: owns the call stack and the two monotonically-growing heaps
//!   (struct objects, arrays) and drives the dispatch loop.

pub mod error;
pub mod frame;
pub mod io;
pub mod opcode;
pub mod template;
pub mod value;
pub mod vm;

pub use error::{VmError, VmErrorContext};
pub use frame::Frame;
pub use io::{BufferInput, BufferOutput, Input, Output, StdinSource, StdoutSink};
pub use opcode::{Instr, OpCode, Operand};
pub use template::FrameTemplate;
pub use value::Value;
pub use vm::Vm;
