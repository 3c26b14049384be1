//! Per-function instruction templates, produced once by the code generator
//! and shared by every call frame created for that function during a run.

use crate::opcode::Instr;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct FrameTemplate {
    /// Mangled function name (`main` is left unmangled).
    pub function_name: String,
    pub arg_count: usize,
    pub instructions: Vec<Instr>,
}

impl FrameTemplate {
    pub fn new(function_name: impl Into<String>, arg_count: usize) -> Self {
        FrameTemplate {
            function_name: function_name.into(),
            arg_count,
            instructions: Vec::new(),
        }
    }
}

impl fmt::Display for FrameTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Frame {}", self.function_name)?;
        for (i, instr) in self.instructions.iter().enumerate() {
            writeln!(f, "  {i}: {instr}")?;
        }
        Ok(())
    }
}
