//! A single activation record on the virtual machine's call stack.

use crate::template::FrameTemplate;
use crate::value::Value;
use std::rc::Rc;

#[derive(Debug)]
pub struct Frame {
    pub template: Rc<FrameTemplate>,
    pub pc: usize,
    pub operand_stack: Vec<Value>,
    pub variables: Vec<Value>,
}

impl Frame {
    pub fn new(template: Rc<FrameTemplate>) -> Self {
        Frame {
            template,
            pc: 0,
            operand_stack: Vec::new(),
            variables: Vec::new(),
        }
    }
}
