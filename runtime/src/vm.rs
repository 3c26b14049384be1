//! The bytecode interpreter: call stack, struct heap, array heap, and the
//! instruction dispatch loop.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::error::VmError;
use crate::frame::Frame;
use crate::io::{Input, Output};
use crate::opcode::{Instr, OpCode, Operand};
use crate::template::FrameTemplate;
use crate::value::Value;

const FIRST_OBJECT_ID: i64 = 2024;

pub struct Vm {
    frame_templates: HashMap<String, Rc<FrameTemplate>>,
    struct_heap: HashMap<i64, HashMap<String, Value>>,
    array_heap: HashMap<i64, Vec<Value>>,
    next_obj_id: i64,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

/// Disassembles every registered frame template, sorted by mangled name for
/// a stable dump across runs.
impl fmt::Display for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.frame_templates.keys().collect();
        names.sort();
        for name in names {
            write!(f, "{}", self.frame_templates[name])?;
        }
        Ok(())
    }
}

impl Vm {
    pub fn new() -> Self {
        Vm {
            frame_templates: HashMap::new(),
            struct_heap: HashMap::new(),
            array_heap: HashMap::new(),
            next_obj_id: FIRST_OBJECT_ID,
        }
    }

    pub fn add_frame_template(&mut self, template: FrameTemplate) {
        self.frame_templates
            .insert(template.function_name.clone(), Rc::new(template));
    }

    /// Runs the registered `main` frame to completion, driving `print`
    /// through `output` and `input` through `input_src`.
    pub fn run(
        &mut self,
        output: &mut dyn Output,
        input_src: &mut dyn Input,
    ) -> Result<(), VmError> {
        let main_template = self
            .frame_templates
            .get("main")
            .cloned()
            .ok_or_else(|| VmError::bare("No \"main\" function"))?;

        let mut call_stack: Vec<Frame> = vec![Frame::new(main_template)];

        while let Some(frame) = call_stack.last_mut() {
            if frame.pc >= frame.template.instructions.len() {
                break;
            }
            let instr = frame.template.instructions[frame.pc].clone();
            frame.pc += 1;

            trace!(
                function = %frame.template.function_name,
                pc = frame.pc,
                instr = %instr,
                "dispatch"
            );

            if self.step(&mut call_stack, &instr, output, input_src)? {
                continue;
            }
        }

        Ok(())
    }

    /// Executes one instruction against the top of `call_stack`. Returns
    /// `Ok(true)` unless the VM should stop stepping (never happens today;
    /// kept as the seam where a future single-step debugger would hook in).
    fn step(
        &mut self,
        call_stack: &mut Vec<Frame>,
        instr: &Instr,
        output: &mut dyn Output,
        input_src: &mut dyn Input,
    ) -> Result<bool, VmError> {
        use OpCode::*;

        macro_rules! top {
            () => {
                call_stack.last_mut().expect("call stack non-empty")
            };
        }

        macro_rules! err {
            ($msg:expr) => {{
                let frame = top!();
                let pc = frame.pc - 1;
                let instruction = frame.template.instructions[pc].to_string();
                return Err(VmError::in_frame(
                    $msg,
                    frame.template.function_name.clone(),
                    pc,
                    instruction,
                ));
            }};
        }

        match instr.opcode {
            Push => {
                let v = match &instr.operand {
                    Operand::Value(v) => v.clone(),
                    _ => unreachable!("PUSH operand is always a Value"),
                };
                top!().operand_stack.push(v);
            }
            Pop => {
                top!().operand_stack.pop();
            }
            Load => {
                let idx = int_operand(instr);
                let v = top!().variables[idx].clone();
                top!().operand_stack.push(v);
            }
            Store => {
                let idx = int_operand(instr);
                let data = top!().operand_stack.pop().expect("STORE needs a value");
                let frame = top!();
                if idx == frame.variables.len() {
                    frame.variables.push(data);
                } else {
                    frame.variables[idx] = data;
                }
            }
            Add | Sub | Mul | Div | CmpLt | CmpLe | CmpEq | CmpNe | And | Or => {
                let x = top!().operand_stack.pop().expect("binary op needs rhs");
                let y = top!().operand_stack.pop().expect("binary op needs lhs");
                let result = match self.do_operation(y, x, instr.opcode) {
                    Ok(v) => v,
                    Err(msg) => err!(msg),
                };
                top!().operand_stack.push(result);
            }
            Not => {
                let x = top!().operand_stack.pop().expect("NOT needs a value");
                let b = match x {
                    Value::Bool(b) => b,
                    Value::Null => err!("Invalid value for not operation".to_string()),
                    other => err!(format!("Invalid value for not operation: {other}")),
                };
                top!().operand_stack.push(Value::Bool(!b));
            }
            Jmp => {
                top!().pc = int_operand(instr);
            }
            Jmpf => {
                let target = int_operand(instr);
                let x = top!().operand_stack.pop().expect("JMPF needs a condition");
                let cond = match x {
                    Value::Bool(b) => b,
                    other => err!(format!("Invalid condition for jump: {other}")),
                };
                if !cond {
                    top!().pc = target;
                }
            }
            Call => {
                let name = match &instr.operand {
                    Operand::Name(n) => n.clone(),
                    _ => unreachable!("CALL operand is always a Name"),
                };
                let template = self
                    .frame_templates
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| VmError::bare(format!("Undefined function {name}")))?;
                let mut new_frame = Frame::new(template.clone());
                for _ in 0..template.arg_count {
                    let arg = top!().operand_stack.pop().expect("CALL missing argument");
                    new_frame.operand_stack.push(arg);
                }
                call_stack.push(new_frame);
            }
            Ret => {
                let ret_val = top!().operand_stack.pop().expect("RET needs a value");
                call_stack.pop();
                if let Some(caller) = call_stack.last_mut() {
                    caller.operand_stack.push(ret_val);
                }
            }
            Write => {
                let v = top!().operand_stack.pop().expect("WRITE needs a value");
                output.write(&v.display_for_write());
            }
            Read => {
                let line = input_src
                    .read_line()
                    .map_err(|e| VmError::bare(format!("Failed to read input: {e}")))?;
                top!().operand_stack.push(Value::Str(line));
            }
            Len => {
                let v = top!().operand_stack.pop().expect("LEN needs a value");
                let result = match v {
                    Value::Str(s) => Value::Int(s.chars().count() as i64),
                    Value::Oid(oid) => {
                        let arr = self
                            .array_heap
                            .get(&oid)
                            .ok_or_else(|| VmError::bare("Invalid array reference"))?;
                        Value::Int(arr.len() as i64)
                    }
                    Value::Null => err!("Cannot execute len operation on null value".to_string()),
                    other => err!(format!("Cannot execute len operation on {other}")),
                };
                top!().operand_stack.push(result);
            }
            Getc => {
                let idx_v = top!().operand_stack.pop().expect("GETC needs an index");
                let str_v = top!().operand_stack.pop().expect("GETC needs a string");
                let (s, idx) = match (str_v, idx_v) {
                    (Value::Str(s), Value::Int(i)) => (s, i),
                    _ => err!("Cannot execute getc operation on null value".to_string()),
                };
                let chars: Vec<char> = s.chars().collect();
                if idx < 0 || idx as usize >= chars.len() {
                    err!("Invalid index for getc operation".to_string());
                }
                top!()
                    .operand_stack
                    .push(Value::Str(chars[idx as usize].to_string()));
            }
            ToInt => {
                let x = top!().operand_stack.pop().expect("TOINT needs a value");
                let result = match x {
                    Value::Str(s) => s
                        .parse::<i64>()
                        .map(Value::Int)
                        .map_err(|_| "Cannot convert value to int".to_string()),
                    Value::Double(d) => Ok(Value::Int(d as i64)),
                    Value::Int(i) => Ok(Value::Int(i)),
                    _ => Err("Cannot convert value to int".to_string()),
                };
                match result {
                    Ok(v) => top!().operand_stack.push(v),
                    Err(msg) => err!(msg),
                }
            }
            ToDbl => {
                let x = top!().operand_stack.pop().expect("TODBL needs a value");
                let result = match x {
                    Value::Str(s) => s
                        .parse::<f64>()
                        .map(Value::Double)
                        .map_err(|_| "Cannot convert value to double".to_string()),
                    Value::Int(i) => Ok(Value::Double(i as f64)),
                    Value::Double(d) => Ok(Value::Double(d)),
                    _ => Err("Cannot convert value to double".to_string()),
                };
                match result {
                    Ok(v) => top!().operand_stack.push(v),
                    Err(msg) => err!(msg),
                }
            }
            ToStr => {
                let x = top!().operand_stack.pop().expect("TOSTR needs a value");
                if x.is_null() {
                    err!("Cannot convert null value to string".to_string());
                }
                top!().operand_stack.push(Value::Str(x.to_string()));
            }
            Allocs => {
                let oid = self.next_obj_id;
                self.next_obj_id += 1;
                self.struct_heap.insert(oid, HashMap::new());
                top!().operand_stack.push(Value::Oid(oid));
            }
            Setf => {
                let field = match &instr.operand {
                    Operand::Name(n) => n.clone(),
                    _ => unreachable!("SETF operand is always a Name"),
                };
                let value = top!().operand_stack.pop().expect("SETF needs a value");
                let oid_v = top!().operand_stack.pop().expect("SETF needs an oid");
                let oid = match oid_v {
                    Value::Oid(o) => o,
                    _ => err!("Invalid value for OID or field value for struct".to_string()),
                };
                self.struct_heap
                    .get_mut(&oid)
                    .ok_or_else(|| VmError::bare("Invalid struct reference"))?
                    .insert(field, value);
            }
            Getf => {
                let field = match &instr.operand {
                    Operand::Name(n) => n.clone(),
                    _ => unreachable!("GETF operand is always a Name"),
                };
                let oid_v = top!().operand_stack.pop().expect("GETF needs an oid");
                let oid = match oid_v {
                    Value::Oid(o) => o,
                    _ => err!("Invalid value for OID for struct".to_string()),
                };
                let value = self
                    .struct_heap
                    .get(&oid)
                    .ok_or_else(|| VmError::bare("Invalid struct reference"))?
                    .get(&field)
                    .cloned()
                    .unwrap_or(Value::Null);
                top!().operand_stack.push(value);
            }
            Alloca => {
                let len_v = top!().operand_stack.pop().expect("ALLOCA needs a length");
                let len = match len_v {
                    Value::Int(n) if n >= 0 => n as usize,
                    _ => err!("Invalid value for array length".to_string()),
                };
                let oid = self.next_obj_id;
                self.next_obj_id += 1;
                self.array_heap.insert(oid, vec![Value::Null; len]);
                top!().operand_stack.push(Value::Oid(oid));
            }
            Seti => {
                let value = top!().operand_stack.pop().expect("SETI needs a value");
                let idx_v = top!().operand_stack.pop().expect("SETI needs an index");
                let oid_v = top!().operand_stack.pop().expect("SETI needs an oid");
                let (oid, idx) = match (oid_v, idx_v) {
                    (Value::Oid(o), Value::Int(i)) => (o, i),
                    _ => err!("Invalid value for insert into array".to_string()),
                };
                let arr = self
                    .array_heap
                    .get_mut(&oid)
                    .ok_or_else(|| VmError::bare("Invalid array reference"))?;
                if idx < 0 || idx as usize >= arr.len() {
                    err!("Invalid index for array lookup".to_string());
                }
                arr[idx as usize] = value;
            }
            Geti => {
                let idx_v = top!().operand_stack.pop().expect("GETI needs an index");
                let oid_v = top!().operand_stack.pop().expect("GETI needs an oid");
                let (oid, idx) = match (oid_v, idx_v) {
                    (Value::Oid(o), Value::Int(i)) => (o, i),
                    _ => err!("Invalid value for array lookup".to_string()),
                };
                let arr = self
                    .array_heap
                    .get(&oid)
                    .ok_or_else(|| VmError::bare("Invalid array reference"))?;
                if idx < 0 || idx as usize >= arr.len() {
                    err!("Invalid index for array lookup".to_string());
                }
                top!().operand_stack.push(arr[idx as usize].clone());
            }
            Dup => {
                let x = top!().operand_stack.pop().expect("DUP needs a value");
                top!().operand_stack.push(x.clone());
                top!().operand_stack.push(x);
            }
            Nop => {}
        }
        Ok(true)
    }

    /// Implements `ADD`/`SUB`/`MUL`/`DIV`/`CMP*`/`AND`/`OR`. `y` is the
    /// operand pushed first (the left-hand side), `x` the operand pushed
    /// second (the right-hand side) -- matching the pop order in `step`.
    fn do_operation(&self, y: Value, x: Value, op: OpCode) -> Result<Value, String> {
        use OpCode::*;

        if matches!(y, Value::Null) || matches!(x, Value::Null) {
            if !matches!(op, CmpEq | CmpNe) {
                return Err("Invalid value in operation".to_string());
            }
            return Ok(Value::Bool(match op {
                CmpEq => y == x,
                CmpNe => y != x,
                _ => unreachable!(),
            }));
        }

        match op {
            Add => numeric_binop(y, x, |a, b| a + b, |a, b| a + b),
            Sub => numeric_binop(y, x, |a, b| a - b, |a, b| a - b),
            Mul => numeric_binop(y, x, |a, b| a * b, |a, b| a * b),
            Div => {
                let x_is_zero = match &x {
                    Value::Int(i) => *i == 0,
                    Value::Double(d) => *d == 0.0,
                    _ => return Err("Invalid value for operation".to_string()),
                };
                if x_is_zero {
                    return Err("Invalid value for operation".to_string());
                }
                match (y, x) {
                    (Value::Int(a), Value::Int(b)) => Ok(Value::Int(floor_div(a, b))),
                    (a, b) => {
                        let af = as_f64(&a)?;
                        let bf = as_f64(&b)?;
                        Ok(Value::Double(af / bf))
                    }
                }
            }
            CmpLt => ordered_cmp(y, x, |o| o.is_lt()),
            CmpLe => ordered_cmp(y, x, |o| o.is_le()),
            CmpEq => Ok(Value::Bool(y == x)),
            CmpNe => Ok(Value::Bool(y != x)),
            And => match (y, x) {
                (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a && b)),
                _ => Err("Invalid value in operation".to_string()),
            },
            Or => match (y, x) {
                (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a || b)),
                _ => Err("Invalid value in operation".to_string()),
            },
            _ => Err("Unknown operation".to_string()),
        }
    }
}

fn int_operand(instr: &Instr) -> usize {
    match instr.operand {
        Operand::Int(i) => i as usize,
        _ => unreachable!("operand is always an Int for this opcode"),
    }
}

/// Python-style floor division (`a // b`): rounds the quotient toward
/// negative infinity rather than toward zero, matching the teaching
/// interpreter's literal `DIV` opcode (`7 // -2 == -4`, not `-3`).
fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) {
        q - 1
    } else {
        q
    }
}

fn as_f64(v: &Value) -> Result<f64, String> {
    match v {
        Value::Int(i) => Ok(*i as f64),
        Value::Double(d) => Ok(*d),
        _ => Err("Invalid value in operation".to_string()),
    }
}

/// Per the resolved DIV contradiction (see DESIGN.md): arithmetic other than
/// division promotes to double the moment either operand is a double,
/// otherwise stays integral. DIV itself has its own float/floor branching in
/// `do_operation` because a zero-check precedes it.
fn numeric_binop(
    y: Value,
    x: Value,
    int_op: impl Fn(i64, i64) -> i64,
    dbl_op: impl Fn(f64, f64) -> f64,
) -> Result<Value, String> {
    match (y, x) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(int_op(a, b))),
        (a, b) => {
            let af = as_f64(&a)?;
            let bf = as_f64(&b)?;
            Ok(Value::Double(dbl_op(af, bf)))
        }
    }
}

fn ordered_cmp(y: Value, x: Value, pred: impl Fn(std::cmp::Ordering) -> bool) -> Result<Value, String> {
    let ordering = match (&y, &x) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        _ => {
            let af = as_f64(&y)?;
            let bf = as_f64(&x)?;
            af.partial_cmp(&bf)
                .ok_or_else(|| "Invalid value in operation".to_string())?
        }
    };
    Ok(Value::Bool(pred(ordering)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{BufferInput, BufferOutput};
    use crate::opcode::Instr;

    fn run_main(instructions: Vec<Instr>) -> String {
        let mut vm = Vm::new();
        vm.add_frame_template(FrameTemplate {
            function_name: "main".to_string(),
            arg_count: 0,
            instructions,
        });
        let mut out = BufferOutput::default();
        let mut input = BufferInput::new(Vec::<String>::new());
        vm.run(&mut out, &mut input).unwrap();
        out.buffer
    }

    #[test]
    fn write_prints_hello() {
        let out = run_main(vec![Instr::push(Value::Str("hello".into())), Instr::simple(OpCode::Write)]);
        assert_eq!(out, "hello");
    }

    #[test]
    fn add_int_then_print() {
        let out = run_main(vec![
            Instr::push(Value::Int(2)),
            Instr::push(Value::Int(3)),
            Instr::simple(OpCode::Add),
            Instr::simple(OpCode::ToStr),
            Instr::simple(OpCode::Write),
        ]);
        assert_eq!(out, "5");
    }

    #[test]
    fn display_dumps_every_registered_frame_in_name_order() {
        let mut vm = Vm::new();
        vm.add_frame_template(FrameTemplate {
            function_name: "main".to_string(),
            arg_count: 0,
            instructions: vec![Instr::push(Value::Int(1)), Instr::simple(OpCode::Write)],
        });
        vm.add_frame_template(FrameTemplate {
            function_name: "add_int_int".to_string(),
            arg_count: 2,
            instructions: vec![Instr::simple(OpCode::Add)],
        });
        let dump = vm.to_string();
        let add_pos = dump.find("Frame add_int_int").expect("add_int_int frame present");
        let main_pos = dump.find("Frame main").expect("main frame present");
        assert!(add_pos < main_pos, "frames should be sorted by mangled name");
        assert!(dump.contains("0: Push"));
    }

    #[test]
    fn div_by_zero_errors() {
        let mut vm = Vm::new();
        vm.add_frame_template(FrameTemplate {
            function_name: "main".to_string(),
            arg_count: 0,
            instructions: vec![
                Instr::push(Value::Int(1)),
                Instr::push(Value::Int(0)),
                Instr::simple(OpCode::Div),
            ],
        });
        let mut out = BufferOutput::default();
        let mut input = BufferInput::new(Vec::<String>::new());
        assert!(vm.run(&mut out, &mut input).is_err());
    }

    #[test]
    fn div_floors_toward_negative_infinity() {
        let out = run_main(vec![
            Instr::push(Value::Int(7)),
            Instr::push(Value::Int(-2)),
            Instr::simple(OpCode::Div),
            Instr::simple(OpCode::ToStr),
            Instr::simple(OpCode::Write),
        ]);
        assert_eq!(out, "-4");
    }

    #[test]
    fn equality_permits_null_operands() {
        let out = run_main(vec![
            Instr::push(Value::Null),
            Instr::push(Value::Null),
            Instr::simple(OpCode::CmpEq),
            Instr::simple(OpCode::ToStr),
            Instr::simple(OpCode::Write),
        ]);
        assert_eq!(out, "true");
    }

    #[test]
    fn array_allocation_and_indexing() {
        let out = run_main(vec![
            Instr::push(Value::Int(3)),
            Instr::simple(OpCode::Alloca),
            Instr::simple(OpCode::Dup),
            Instr::push(Value::Int(1)),
            Instr::push(Value::Int(20)),
            Instr::simple(OpCode::Seti),
            Instr::push(Value::Int(1)),
            Instr::simple(OpCode::Geti),
            Instr::simple(OpCode::ToStr),
            Instr::simple(OpCode::Write),
        ]);
        assert_eq!(out, "20");
    }

    #[test]
    fn struct_field_roundtrip() {
        let out = run_main(vec![
            Instr::simple(OpCode::Allocs),
            Instr::simple(OpCode::Dup),
            Instr::push(Value::Int(7)),
            Instr::name(OpCode::Setf, "x"),
            Instr::name(OpCode::Getf, "x"),
            Instr::simple(OpCode::ToStr),
            Instr::simple(OpCode::Write),
        ]);
        assert_eq!(out, "7");
    }

    #[test]
    fn call_passes_arguments_in_order() {
        let mut vm = Vm::new();
        vm.add_frame_template(FrameTemplate {
            function_name: "main".to_string(),
            arg_count: 0,
            instructions: vec![
                Instr::push(Value::Int(10)),
                Instr::push(Value::Int(3)),
                Instr::call("sub_int_int"),
                Instr::simple(OpCode::ToStr),
                Instr::simple(OpCode::Write),
            ],
        });
        vm.add_frame_template(FrameTemplate {
            function_name: "sub_int_int".to_string(),
            arg_count: 2,
            instructions: vec![
                Instr::slot(OpCode::Store, 0),
                Instr::slot(OpCode::Store, 1),
                Instr::slot(OpCode::Load, 0),
                Instr::slot(OpCode::Load, 1),
                Instr::simple(OpCode::Sub),
                Instr::simple(OpCode::Ret),
            ],
        });
        let mut out = BufferOutput::default();
        let mut input = BufferInput::new(Vec::<String>::new());
        vm.run(&mut out, &mut input).unwrap();
        assert_eq!(out.buffer, "7");
    }
}
