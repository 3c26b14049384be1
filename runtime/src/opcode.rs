//! Bytecode instruction set executed by the virtual machine.

use crate::value::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Push,
    Pop,
    Load,
    Store,
    Add,
    Sub,
    Mul,
    Div,
    CmpLt,
    CmpLe,
    CmpEq,
    CmpNe,
    And,
    Or,
    Not,
    Jmp,
    Jmpf,
    Call,
    Ret,
    Write,
    Read,
    Len,
    Getc,
    ToInt,
    ToDbl,
    ToStr,
    Allocs,
    Setf,
    Getf,
    Alloca,
    Seti,
    Geti,
    Dup,
    Nop,
}

/// A single operand for an instruction. Most opcodes use at most one.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Int(i64),
    Value(Value),
    Name(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    pub opcode: OpCode,
    pub operand: Operand,
}

impl Instr {
    pub fn new(opcode: OpCode, operand: Operand) -> Self {
        Instr { opcode, operand }
    }

    pub fn simple(opcode: OpCode) -> Self {
        Instr {
            opcode,
            operand: Operand::None,
        }
    }

    pub fn push(value: Value) -> Self {
        Instr::new(OpCode::Push, Operand::Value(value))
    }

    pub fn jump_target(index: usize) -> Self {
        Instr::new(OpCode::Jmp, Operand::Int(index as i64))
    }

    pub fn jump_false_target(index: usize) -> Self {
        Instr::new(OpCode::Jmpf, Operand::Int(index as i64))
    }

    pub fn call(mangled_name: impl Into<String>) -> Self {
        Instr::new(OpCode::Call, Operand::Name(mangled_name.into()))
    }

    pub fn slot(opcode: OpCode, index: usize) -> Self {
        Instr::new(opcode, Operand::Int(index as i64))
    }

    pub fn name(opcode: OpCode, name: impl Into<String>) -> Self {
        Instr::new(opcode, Operand::Name(name.into()))
    }

    /// Overwrites a placeholder jump target once the real offset is known.
    pub fn patch_target(&mut self, index: usize) {
        self.operand = Operand::Int(index as i64);
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operand {
            Operand::None => write!(f, "{:?}", self.opcode),
            Operand::Int(i) => write!(f, "{:?} {i}", self.opcode),
            Operand::Value(v) => write!(f, "{:?} {v}", self.opcode),
            Operand::Name(n) => write!(f, "{:?} {n}", self.opcode),
        }
    }
}
