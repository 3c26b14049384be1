//! Runtime fault type raised by the virtual machine.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct VmError {
    pub message: String,
    /// `None` when the fault happened before any frame was pushed (e.g. no
    /// `main` function registered).
    pub context: Option<VmErrorContext>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VmErrorContext {
    pub function_name: String,
    pub pc: usize,
    pub instruction: String,
}

impl VmError {
    pub fn bare(message: impl Into<String>) -> Self {
        VmError {
            message: message.into(),
            context: None,
        }
    }

    pub fn in_frame(
        message: impl Into<String>,
        function_name: impl Into<String>,
        pc: usize,
        instruction: impl Into<String>,
    ) -> Self {
        VmError {
            message: message.into(),
            context: Some(VmErrorContext {
                function_name: function_name.into(),
                pc,
                instruction: instruction.into(),
            }),
        }
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(ctx) => write!(
                f,
                "{} (in {} at {}: {})",
                self.message, ctx.function_name, ctx.pc, ctx.instruction
            ),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for VmError {}
