//! Lowers a checked AST to per-function bytecode templates.
//!
//! Every helper here assumes the semantic checker has already run and
//! annotated the tree (`Expr::resolved_type`, `CallExpr::resolved_mangled_name`
//! and `resolved_return_type`) -- unwrapping those `Option`s is safe by that
//! point, and a panic on `None` signals a checker bug, not a user error.

use std::collections::HashMap;

use ivy_runtime::{FrameTemplate, Instr, OpCode, Value};

use crate::ast::*;
use crate::builtins;
use crate::mangle::mangle;
use crate::token::{Token, TokenKind};

/// The bytecode opcode a built-in call lowers to. Several builtins share one
/// opcode since the VM is untyped at runtime (`itos`/`dtos` both become
/// `TOSTR`, etc).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinOp {
    Write,
    Read,
    ToStr,
    ToDbl,
    ToInt,
    Len,
    Getc,
}

pub fn generate(program: &Program) -> Vec<FrameTemplate> {
    let structs: HashMap<String, StructDef> = program
        .struct_defs
        .iter()
        .map(|s| (s.name.lexeme.clone(), s.clone()))
        .collect();

    program
        .fun_defs
        .iter()
        .map(|f| generate_fun(f, &structs))
        .collect()
}

fn generate_fun(f: &FunDef, structs: &HashMap<String, StructDef>) -> FrameTemplate {
    let mangled_name = if f.name.lexeme == "main" {
        "main".to_string()
    } else {
        let param_types: Vec<DataType> = f.params.iter().map(|p| p.data_type.clone()).collect();
        mangle(&f.name.lexeme, &param_types)
    };

    let mut gen = FunGen {
        structs,
        instructions: Vec::new(),
        scopes: vec![HashMap::new()],
        next_slot: 0,
    };

    for p in &f.params {
        let slot = gen.declare_var(&p.var_name.lexeme);
        gen.emit(Instr::slot(OpCode::Store, slot));
    }

    for stmt in &f.stmts {
        gen.stmt(stmt);
    }

    if f.return_type.is_void() {
        gen.emit(Instr::push(Value::Null));
        gen.emit(Instr::simple(OpCode::Ret));
    }

    FrameTemplate {
        function_name: mangled_name,
        arg_count: f.params.len(),
        instructions: gen.instructions,
    }
}

struct FunGen<'a> {
    structs: &'a HashMap<String, StructDef>,
    instructions: Vec<Instr>,
    scopes: Vec<HashMap<String, usize>>,
    next_slot: usize,
}

impl<'a> FunGen<'a> {
    fn emit(&mut self, instr: Instr) -> usize {
        self.instructions.push(instr);
        self.instructions.len() - 1
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare_var(&mut self, name: &str) -> usize {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.scopes.last_mut().unwrap().insert(name.to_string(), slot);
        slot
    }

    fn lookup_var(&self, name: &str) -> usize {
        for scope in self.scopes.iter().rev() {
            if let Some(slot) = scope.get(name) {
                return *slot;
            }
        }
        unreachable!("checker guarantees every variable reference is declared");
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::VarDecl(d) => self.var_decl(d),
            Stmt::Assign(a) => self.assign(a),
            Stmt::While(w) => self.while_stmt(w),
            Stmt::For(f) => self.for_stmt(f),
            Stmt::If(i) => self.if_stmt(i),
            Stmt::Return(r) => {
                self.expr(&r.expr);
                self.emit(Instr::simple(OpCode::Ret));
            }
            Stmt::Call(c) => {
                self.call_expr(c);
                let returns_value = c
                    .resolved_return_type
                    .as_ref()
                    .map(|t| !t.is_void())
                    .unwrap_or(false);
                if returns_value {
                    self.emit(Instr::simple(OpCode::Pop));
                }
            }
        }
    }

    fn var_decl(&mut self, d: &VarDeclStmt) {
        match &d.expr {
            Some(e) => self.expr(e),
            None => {
                self.emit(Instr::push(Value::Null));
            }
        }
        let slot = self.declare_var(&d.var_def.var_name.lexeme);
        self.emit(Instr::slot(OpCode::Store, slot));
    }

    fn assign(&mut self, a: &AssignStmt) {
        self.store_path(&a.lvalue, &a.expr);
    }

    /// Navigates the chain of `GETF`/`GETI` links up to (but not including)
    /// the final link, then evaluates the assigned value -- and, for an
    /// indexed final link, its index -- last, before the terminating
    /// `STORE`/`SETF`/`SETI`. Matching the navigate-then-evaluate order means
    /// a side effect in `value` (or in an intermediate index expression)
    /// observes the state the path navigation left behind it, not a value
    /// computed ahead of time and stashed in a scratch local.
    fn store_path(&mut self, path: &[VarRef], value: &Expr) {
        if path.len() == 1 {
            self.store_single(&path[0], value);
            return;
        }

        let head = &path[0];
        let slot = self.lookup_var(&head.var_name.lexeme);
        self.emit(Instr::slot(OpCode::Load, slot));
        if let Some(idx) = &head.array_expr {
            self.expr(idx);
            self.emit(Instr::simple(OpCode::Geti));
        }

        for link in &path[1..path.len() - 1] {
            self.emit(Instr::name(OpCode::Getf, link.var_name.lexeme.clone()));
            if let Some(idx) = &link.array_expr {
                self.expr(idx);
                self.emit(Instr::simple(OpCode::Geti));
            }
        }

        let last = &path[path.len() - 1];
        match &last.array_expr {
            None => {
                self.expr(value);
                self.emit(Instr::name(OpCode::Setf, last.var_name.lexeme.clone()));
            }
            Some(idx) => {
                self.emit(Instr::name(OpCode::Getf, last.var_name.lexeme.clone()));
                self.expr(idx);
                self.expr(value);
                self.emit(Instr::simple(OpCode::Seti));
            }
        }
    }

    fn store_single(&mut self, link: &VarRef, value: &Expr) {
        match &link.array_expr {
            None => {
                self.expr(value);
                let slot = self.lookup_var(&link.var_name.lexeme);
                self.emit(Instr::slot(OpCode::Store, slot));
            }
            Some(idx) => {
                let slot = self.lookup_var(&link.var_name.lexeme);
                self.emit(Instr::slot(OpCode::Load, slot));
                self.expr(idx);
                self.expr(value);
                self.emit(Instr::simple(OpCode::Seti));
            }
        }
    }

    fn while_stmt(&mut self, w: &WhileStmt) {
        let cond_start = self.instructions.len();
        self.expr(&w.cond);
        let jmpf_idx = self.emit(Instr::jump_false_target(0));
        self.push_scope();
        for s in &w.stmts {
            self.stmt(s);
        }
        self.pop_scope();
        self.emit(Instr::jump_target(cond_start));
        let after = self.instructions.len();
        self.instructions[jmpf_idx].patch_target(after);
    }

    fn for_stmt(&mut self, f: &ForStmt) {
        self.push_scope();
        self.var_decl(&f.var_decl);
        let cond_start = self.instructions.len();
        self.expr(&f.cond);
        let jmpf_idx = self.emit(Instr::jump_false_target(0));
        self.push_scope();
        for s in &f.stmts {
            self.stmt(s);
        }
        self.pop_scope();
        self.assign(&f.step_assign);
        self.emit(Instr::jump_target(cond_start));
        let after = self.instructions.len();
        self.instructions[jmpf_idx].patch_target(after);
        self.pop_scope();
    }

    fn if_stmt(&mut self, i: &IfStmt) {
        let mut end_jumps = Vec::new();
        let has_else = !i.else_ifs.is_empty() || !i.else_stmts.is_empty();

        self.if_branch(&i.if_part, !has_else, &mut end_jumps);
        for (idx, ei) in i.else_ifs.iter().enumerate() {
            let is_last = idx == i.else_ifs.len() - 1 && i.else_stmts.is_empty();
            self.if_branch(ei, is_last, &mut end_jumps);
        }
        if !i.else_stmts.is_empty() {
            self.push_scope();
            for s in &i.else_stmts {
                self.stmt(s);
            }
            self.pop_scope();
        }

        let end = self.instructions.len();
        for idx in end_jumps {
            self.instructions[idx].patch_target(end);
        }
    }

    fn if_branch(&mut self, branch: &BasicIf, is_last: bool, end_jumps: &mut Vec<usize>) {
        self.expr(&branch.cond);
        let jmpf_idx = self.emit(Instr::jump_false_target(0));
        self.push_scope();
        for s in &branch.stmts {
            self.stmt(s);
        }
        self.pop_scope();
        if !is_last {
            end_jumps.push(self.emit(Instr::jump_target(0)));
        }
        let after = self.instructions.len();
        self.instructions[jmpf_idx].patch_target(after);
    }

    fn expr(&mut self, expr: &Expr) {
        if let (Some(op), Some(rest)) = (&expr.op, &expr.rest) {
            use TokenKind::*;
            // `>`/`>=` have no dedicated opcode; the VM only knows `CMPLT`/
            // `CMPLE`, computed over (first-pushed, second-pushed). `a > b`
            // is `b < a`, so those two operators push `rest` before `first`
            // and reuse `CMPLT`/`CMPLE` as if comparing the swapped pair.
            if matches!(op.kind, Greater | GreaterEq) {
                self.expr(rest);
                self.term(&expr.first);
            } else {
                self.term(&expr.first);
                self.expr(rest);
            }
            self.emit_binop(op);
        } else {
            self.term(&expr.first);
        }
        if expr.not_op {
            self.emit(Instr::simple(OpCode::Not));
        }
    }

    fn term(&mut self, term: &Term) {
        match term {
            Term::Complex(inner) => self.expr(inner),
            Term::Simple(rvalue) => self.rvalue(rvalue),
        }
    }

    fn emit_binop(&mut self, op: &Token) {
        use TokenKind::*;
        let opcode = match op.kind {
            Plus => OpCode::Add,
            Minus => OpCode::Sub,
            Times => OpCode::Mul,
            Divide => OpCode::Div,
            Less => OpCode::CmpLt,
            LessEq => OpCode::CmpLe,
            Greater => OpCode::CmpLt,
            GreaterEq => OpCode::CmpLe,
            Equal => OpCode::CmpEq,
            NotEqual => OpCode::CmpNe,
            And => OpCode::And,
            Or => OpCode::Or,
            _ => unreachable!("parser only emits binary-op tokens here"),
        };
        self.emit(Instr::simple(opcode));
    }

    fn rvalue(&mut self, rvalue: &RValue) {
        match rvalue {
            RValue::Literal(tok) => self.literal(tok),
            RValue::Var(v) => self.load_path(&v.path),
            RValue::New(n) => self.new_rvalue(n),
            RValue::Call(c) => self.call_expr(c),
        }
    }

    fn literal(&mut self, tok: &Token) {
        use TokenKind::*;
        let value = match tok.kind {
            IntVal => Value::Int(tok.lexeme.parse().expect("lexer guarantees valid int literal")),
            DoubleVal => Value::Double(tok.lexeme.parse().expect("lexer guarantees valid double literal")),
            StringVal => Value::Str(tok.lexeme.clone()),
            BoolVal => Value::Bool(tok.lexeme == "true"),
            NullVal => Value::Null,
            _ => unreachable!("parser only emits literal tokens here"),
        };
        self.emit(Instr::push(value));
    }

    /// Loads a variable or field/index path. No intermediate `DUP` is
    /// emitted between links: each `GETF`/`GETI` consumes exactly the
    /// reference it needs and leaves exactly the next link's receiver.
    fn load_path(&mut self, path: &[VarRef]) {
        let head = &path[0];
        let slot = self.lookup_var(&head.var_name.lexeme);
        self.emit(Instr::slot(OpCode::Load, slot));
        if let Some(idx) = &head.array_expr {
            self.expr(idx);
            self.emit(Instr::simple(OpCode::Geti));
        }

        for link in &path[1..] {
            self.emit(Instr::name(OpCode::Getf, link.var_name.lexeme.clone()));
            if let Some(idx) = &link.array_expr {
                self.expr(idx);
                self.emit(Instr::simple(OpCode::Geti));
            }
        }
    }

    fn new_rvalue(&mut self, n: &NewRValue) {
        match (&n.array_expr, &n.struct_params) {
            (Some(len), _) => {
                self.expr(len);
                self.emit(Instr::simple(OpCode::Alloca));
            }
            (None, Some(args)) => {
                let struct_def = self
                    .structs
                    .get(&n.type_name.lexeme)
                    .expect("checker guarantees struct exists")
                    .clone();
                self.emit(Instr::simple(OpCode::Allocs));
                for (arg, field) in args.iter().zip(struct_def.fields.iter()) {
                    self.emit(Instr::simple(OpCode::Dup));
                    self.expr(arg);
                    self.emit(Instr::name(OpCode::Setf, field.var_name.lexeme.clone()));
                }
            }
            (None, None) => unreachable!("parser always sets one of array_expr/struct_params"),
        }
    }

    fn call_expr(&mut self, c: &CallExpr) {
        for arg in &c.args {
            self.expr(arg);
        }
        if let Some(op) = builtins::opcode_for(&c.fun_name.lexeme) {
            self.emit_builtin(op);
        } else {
            let mangled = c
                .resolved_mangled_name
                .as_ref()
                .expect("checker resolves every user-defined call");
            self.emit(Instr::call(mangled.clone()));
        }
    }

    fn emit_builtin(&mut self, op: BuiltinOp) {
        let opcode = match op {
            BuiltinOp::Write => OpCode::Write,
            BuiltinOp::Read => OpCode::Read,
            BuiltinOp::ToStr => OpCode::ToStr,
            BuiltinOp::ToDbl => OpCode::ToDbl,
            BuiltinOp::ToInt => OpCode::ToInt,
            BuiltinOp::Len => OpCode::Len,
            BuiltinOp::Getc => OpCode::Getc,
        };
        self.emit(Instr::simple(opcode));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::Checker;
    use crate::parser::Parser;
    use crate::source::StrSource;
    use ivy_runtime::{BufferInput, BufferOutput, Vm};

    fn compile_and_run(src: &str) -> String {
        let mut program = Parser::new(StrSource::new(src)).unwrap().parse().unwrap();
        Checker::check(&mut program).unwrap();
        let templates = generate(&program);
        let mut vm = Vm::new();
        for t in templates {
            vm.add_frame_template(t);
        }
        let mut out = BufferOutput::default();
        let mut input = BufferInput::new(Vec::<String>::new());
        vm.run(&mut out, &mut input).unwrap();
        out.buffer
    }

    #[test]
    fn hello_world() {
        assert_eq!(compile_and_run(r#"void main() { print("hello"); }"#), "hello");
    }

    #[test]
    fn arithmetic_with_parens() {
        let src = "void main() { print(itos((1 + 2) * 3)); }";
        assert_eq!(compile_and_run(src), "9");
    }

    #[test]
    fn for_loop_prints_each_index() {
        let src = r#"
            void main() {
                for (int i = 0; i < 3; i = i + 1) {
                    print(itos(i));
                }
            }
        "#;
        assert_eq!(compile_and_run(src), "012");
    }

    #[test]
    fn overload_dispatch_picks_matching_arity() {
        let src = r#"
            void f(int x) { print(itos(x)); }
            void f() { print("none"); }
            void main() {
                f(7);
                f();
            }
        "#;
        assert_eq!(compile_and_run(src), "7none");
    }

    #[test]
    fn struct_field_access_roundtrips() {
        let src = r#"
            struct P { int x; int y; }
            void main() {
                P p = new P(3, 4);
                p.x = p.x + 1;
                print(itos(p.x));
            }
        "#;
        assert_eq!(compile_and_run(src), "4");
    }

    #[test]
    fn array_indexing_roundtrips() {
        let src = r#"
            void main() {
                array int a = new int[3];
                a[1] = 42;
                print(itos(a[1]));
            }
        "#;
        assert_eq!(compile_and_run(src), "42");
    }

    #[test]
    fn nested_field_assignment_evaluates_value_after_navigation() {
        let src = r#"
            struct Inner { int n; }
            struct Outer { Inner inner; }
            int bump(int x) { print("bump"); return x + 1; }
            void main() {
                Outer o = new Outer(new Inner(1));
                o.inner.n = bump(o.inner.n);
                print(itos(o.inner.n));
            }
        "#;
        assert_eq!(compile_and_run(src), "bump2");
    }

    #[test]
    fn indexed_assignment_evaluates_index_before_value() {
        let src = r#"
            int tag(string t) { print(t); return 0; }
            void main() {
                array int a = new int[2];
                a[tag("idx")] = tag("val");
                print(itos(a[0]));
            }
        "#;
        assert_eq!(compile_and_run(src), "idxval0");
    }

    #[test]
    fn greater_than_reuses_cmplt_opcode() {
        assert_eq!(compile_and_run("void main() { if (3 > 2) { print(\"yes\"); } }"), "yes");
        assert_eq!(compile_and_run("void main() { if (2 >= 2) { print(\"yes\"); } }"), "yes");
    }

    #[test]
    fn while_loop_counts_down() {
        let src = r#"
            void main() {
                int i = 2;
                while (i > 0) {
                    print(itos(i));
                    i = i - 1;
                }
            }
        "#;
        assert_eq!(compile_and_run(src), "21");
    }

    #[test]
    fn if_elseif_else_picks_matching_branch() {
        let src = r#"
            void main() {
                int x = 2;
                if (x == 1) {
                    print("one");
                } elseif (x == 2) {
                    print("two");
                } else {
                    print("other");
                }
            }
        "#;
        assert_eq!(compile_and_run(src), "two");
    }
}
