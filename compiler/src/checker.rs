//! Semantic checker: validates an AST against a scoped symbol table and
//! annotates every expression with its resolved type.
//!
//! Function overloading means uniqueness is enforced per *signature*
//! (name + parameter type sequence), not per unqualified name — see
//! DESIGN.md for why this refines the distilled spec's "names are unique"
//! wording rather than contradicting it.

use std::collections::HashMap;

use crate::ast::*;
use crate::builtins::{self, BuiltinArity};
use crate::error::{CompileError, StaticError};
use crate::mangle::mangle;
use crate::token::Token;

struct SymbolTable {
    scopes: Vec<HashMap<String, DataType>>,
}

impl SymbolTable {
    fn new() -> Self {
        SymbolTable {
            scopes: vec![HashMap::new()],
        }
    }

    fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    fn define(&mut self, name: &str, ty: DataType) {
        self.scopes.last_mut().unwrap().insert(name.to_string(), ty);
    }

    fn exists_in_current(&self, name: &str) -> bool {
        self.scopes.last().unwrap().contains_key(name)
    }

    fn get(&self, name: &str) -> Option<&DataType> {
        for scope in self.scopes.iter().rev() {
            if let Some(ty) = scope.get(name) {
                return Some(ty);
            }
        }
        None
    }
}

pub struct Checker {
    structs: HashMap<String, StructDef>,
    functions: HashMap<String, Vec<FunDef>>,
    symbols: SymbolTable,
    current_return_type: DataType,
}

impl Checker {
    pub fn check(program: &mut Program) -> Result<(), CompileError> {
        let mut checker = Checker {
            structs: HashMap::new(),
            functions: HashMap::new(),
            symbols: SymbolTable::new(),
            current_return_type: DataType::base("void"),
        };
        checker.run(program)
    }

    fn run(&mut self, program: &mut Program) -> Result<(), CompileError> {
        for s in &program.struct_defs {
            if self.structs.contains_key(&s.name.lexeme) {
                return Err(self
                    .static_err(format!("Struct '{}' already defined", s.name.lexeme), &s.name)
                    .into());
            }
            self.structs.insert(s.name.lexeme.clone(), s.clone());
        }

        for f in &program.fun_defs {
            if builtins::BUILTIN_NAMES.contains(&f.name.lexeme.as_str()) {
                return Err(self
                    .static_err(
                        format!("Cannot redefine built-in function '{}'", f.name.lexeme),
                        &f.name,
                    )
                    .into());
            }
            let overloads = self.functions.entry(f.name.lexeme.clone()).or_default();
            if overloads
                .iter()
                .any(|existing| param_types_match(existing, f))
            {
                return Err(self
                    .static_err(
                        format!(
                            "Function '{}' redefined with an identical parameter list",
                            f.name.lexeme
                        ),
                        &f.name,
                    )
                    .into());
            }
            overloads.push(f.clone());
        }

        let has_main = program
            .fun_defs
            .iter()
            .any(|f| f.name.lexeme == "main" && f.params.is_empty() && f.return_type.is_void());
        if !has_main {
            return Err(StaticError::new(
                "Program must define a parameterless 'void main()'",
                1,
                1,
            )
            .into());
        }

        for s in &program.struct_defs {
            for field in &s.fields {
                self.check_type_name(&field.data_type, &field.var_name)?;
            }
        }

        for f in &mut program.fun_defs {
            self.check_fun_def(f)?;
        }

        Ok(())
    }

    fn check_fun_def(&mut self, f: &mut FunDef) -> Result<(), CompileError> {
        if !f.return_type.is_void() {
            self.check_type_name(&f.return_type, &f.name)?;
        }
        self.current_return_type = f.return_type.clone();

        self.symbols.push();
        let mut seen = HashMap::new();
        for p in &f.params {
            if seen.insert(p.var_name.lexeme.clone(), ()).is_some() {
                return Err(self
                    .static_err(
                        format!("Duplicate parameter name '{}'", p.var_name.lexeme),
                        &p.var_name,
                    )
                    .into());
            }
            self.check_type_name(&p.data_type, &p.var_name)?;
            self.symbols.define(&p.var_name.lexeme, p.data_type.clone());
        }

        for stmt in &mut f.stmts {
            self.check_stmt(stmt)?;
        }
        self.symbols.pop();
        Ok(())
    }

    fn check_type_name(&self, dt: &DataType, at: &Token) -> Result<(), CompileError> {
        if dt.is_base() || self.structs.contains_key(&dt.type_name) {
            Ok(())
        } else {
            Err(self
                .static_err(format!("Unknown type '{}'", dt.type_name), at)
                .into())
        }
    }

    fn static_err(&self, msg: impl Into<String>, at: &Token) -> StaticError {
        StaticError::new(msg, at.line, at.column)
    }

    fn check_stmt(&mut self, stmt: &mut Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::VarDecl(d) => self.check_var_decl(d),
            Stmt::Assign(a) => self.check_assign(a),
            Stmt::While(w) => {
                let cond_ty = self.check_expr(&mut w.cond)?;
                self.require_bool(&cond_ty, &w.cond)?;
                self.symbols.push();
                for s in &mut w.stmts {
                    self.check_stmt(s)?;
                }
                self.symbols.pop();
                Ok(())
            }
            Stmt::For(f) => {
                self.symbols.push();
                self.check_var_decl(&mut f.var_decl)?;
                let cond_ty = self.check_expr(&mut f.cond)?;
                self.require_bool(&cond_ty, &f.cond)?;
                self.check_assign(&mut f.step_assign)?;
                for s in &mut f.stmts {
                    self.check_stmt(s)?;
                }
                self.symbols.pop();
                Ok(())
            }
            Stmt::If(i) => {
                let cond_ty = self.check_expr(&mut i.if_part.cond)?;
                self.require_bool(&cond_ty, &i.if_part.cond)?;
                self.symbols.push();
                for s in &mut i.if_part.stmts {
                    self.check_stmt(s)?;
                }
                self.symbols.pop();
                for ei in &mut i.else_ifs {
                    let cond_ty = self.check_expr(&mut ei.cond)?;
                    self.require_bool(&cond_ty, &ei.cond)?;
                    self.symbols.push();
                    for s in &mut ei.stmts {
                        self.check_stmt(s)?;
                    }
                    self.symbols.pop();
                }
                self.symbols.push();
                for s in &mut i.else_stmts {
                    self.check_stmt(s)?;
                }
                self.symbols.pop();
                Ok(())
            }
            Stmt::Return(r) => {
                let ty = self.check_expr(&mut r.expr)?;
                if ty.is_void() {
                    return Ok(());
                }
                let expected = self.current_return_type.clone();
                if !types_match(&expected, &ty) {
                    return Err(self
                        .static_err(
                            format!(
                                "Return type mismatch: expected '{}', found '{}'",
                                type_desc(&expected),
                                type_desc(&ty)
                            ),
                            &r.token,
                        )
                        .into());
                }
                Ok(())
            }
            Stmt::Call(c) => {
                let mut expr = Expr::simple(Term::Simple(RValue::Call(c.clone())));
                self.check_expr(&mut expr)?;
                if let Term::Simple(RValue::Call(checked)) = expr.first {
                    *c = checked;
                }
                Ok(())
            }
        }
    }

    fn require_bool(&self, ty: &DataType, expr: &Expr) -> Result<(), CompileError> {
        if ty.is_array || ty.type_name != "bool" {
            return Err(StaticError::new(
                format!("Condition must be 'bool', found '{}'", type_desc(ty)),
                expr_line(expr),
                expr_col(expr),
            )
            .into());
        }
        Ok(())
    }

    fn check_var_decl(&mut self, d: &mut VarDeclStmt) -> Result<(), CompileError> {
        if self.symbols.exists_in_current(&d.var_def.var_name.lexeme) {
            return Err(self
                .static_err(
                    format!("'{}' already declared in this scope", d.var_def.var_name.lexeme),
                    &d.var_def.var_name,
                )
                .into());
        }
        self.check_type_name(&d.var_def.data_type, &d.var_def.var_name)?;
        if let Some(expr) = &mut d.expr {
            let rhs_ty = self.check_expr(expr)?;
            if !(rhs_ty.is_void() && !d.var_def.data_type.is_base())
                && !types_match(&d.var_def.data_type, &rhs_ty)
            {
                return Err(self
                    .static_err(
                        format!(
                            "Cannot assign '{}' to variable of type '{}'",
                            type_desc(&rhs_ty),
                            type_desc(&d.var_def.data_type)
                        ),
                        &d.var_def.var_name,
                    )
                    .into());
            }
        }
        self.symbols
            .define(&d.var_def.var_name.lexeme, d.var_def.data_type.clone());
        Ok(())
    }

    fn check_assign(&mut self, a: &mut AssignStmt) -> Result<(), CompileError> {
        let lvalue_ty = self.resolve_path(&a.lvalue)?;
        let rhs_ty = self.check_expr(&mut a.expr)?;
        if !(rhs_ty.is_void() && !lvalue_ty.is_base()) && !types_match(&lvalue_ty, &rhs_ty) {
            return Err(StaticError::new(
                format!(
                    "Cannot assign '{}' to '{}'",
                    type_desc(&rhs_ty),
                    type_desc(&lvalue_ty)
                ),
                a.lvalue[0].var_name.line,
                a.lvalue[0].var_name.column,
            )
            .into());
        }
        Ok(())
    }

    /// Resolves an lvalue/var-rvalue path: the head is looked up in scope,
    /// each subsequent link is resolved as a field of the previous link's
    /// struct type. Indexing at any link dereferences an array type to its
    /// element type.
    fn resolve_path(&mut self, path: &[VarRef]) -> Result<DataType, CompileError> {
        let head = &path[0];
        let mut current = self
            .symbols
            .get(&head.var_name.lexeme)
            .cloned()
            .ok_or_else(|| {
                self.static_err(
                    format!("Undefined variable '{}'", head.var_name.lexeme),
                    &head.var_name,
                )
            })?;
        current = self.apply_index(current, head)?;

        for link in &path[1..] {
            if current.is_array || current.is_base() {
                return Err(self
                    .static_err(
                        format!("'{}' is not a struct", current.type_name),
                        &link.var_name,
                    )
                    .into());
            }
            let struct_def = self.structs.get(&current.type_name).ok_or_else(|| {
                self.static_err(format!("Unknown struct '{}'", current.type_name), &link.var_name)
            })?;
            let field = struct_def
                .fields
                .iter()
                .find(|f| f.var_name.lexeme == link.var_name.lexeme)
                .ok_or_else(|| {
                    self.static_err(
                        format!(
                            "Struct '{}' has no field '{}'",
                            current.type_name, link.var_name.lexeme
                        ),
                        &link.var_name,
                    )
                })?;
            current = field.data_type.clone();
            current = self.apply_index(current, link)?;
        }
        Ok(current)
    }

    fn apply_index(&self, ty: DataType, link: &VarRef) -> Result<DataType, CompileError> {
        match &link.array_expr {
            None => Ok(ty),
            Some(_) if !ty.is_array => Err(self
                .static_err(
                    format!("'{}' is not an array", link.var_name.lexeme),
                    &link.var_name,
                )
                .into()),
            Some(_) => Ok(DataType::base(ty.type_name)),
        }
    }

    fn check_expr(&mut self, expr: &mut Expr) -> Result<DataType, CompileError> {
        if let Term::Complex(inner) = &mut expr.first {
            let inner_ty = self.check_expr(inner)?;
            inner.resolved_type = Some(inner_ty);
        }
        let first_ty = self.term_type(&mut expr.first)?;

        let ty = if let Some(rest) = &mut expr.rest {
            let op = expr.op.as_ref().unwrap();
            let rest_ty = self.check_expr(rest)?;
            self.check_binop(op, &first_ty, &rest_ty)?
        } else {
            first_ty
        };

        if expr.not_op && (ty.is_array || ty.type_name != "bool") {
            return Err(StaticError::new(
                format!("Cannot negate '{}'", type_desc(&ty)),
                expr_line(expr),
                expr_col(expr),
            )
            .into());
        }

        expr.resolved_type = Some(ty.clone());
        Ok(ty)
    }

    fn term_type(&mut self, term: &mut Term) -> Result<DataType, CompileError> {
        match term {
            Term::Complex(inner) => Ok(inner.resolved_type.clone().unwrap()),
            Term::Simple(rvalue) => self.check_rvalue(rvalue),
        }
    }

    fn check_rvalue(&mut self, rvalue: &mut RValue) -> Result<DataType, CompileError> {
        match rvalue {
            RValue::Literal(tok) => Ok(literal_type(tok)),
            RValue::Var(v) => self.resolve_path(&v.path),
            RValue::New(n) => self.check_new(n),
            RValue::Call(c) => self.check_call(c),
        }
    }

    fn check_new(&mut self, n: &mut NewRValue) -> Result<DataType, CompileError> {
        if let Some(len_expr) = &mut n.array_expr {
            let len_ty = self.check_expr(len_expr)?;
            if len_ty.is_array || len_ty.type_name != "int" {
                return Err(self
                    .static_err("Array length must be 'int'", &n.type_name)
                    .into());
            }
            return Ok(DataType::array_of(n.type_name.lexeme.clone()));
        }

        let args = n.struct_params.as_mut().expect("new struct has args list");
        let struct_def = self
            .structs
            .get(&n.type_name.lexeme)
            .cloned()
            .ok_or_else(|| self.static_err(format!("Unknown struct '{}'", n.type_name.lexeme), &n.type_name))?;
        if args.len() != struct_def.fields.len() {
            return Err(self
                .static_err(
                    format!(
                        "Struct '{}' expects {} field value(s), found {}",
                        n.type_name.lexeme,
                        struct_def.fields.len(),
                        args.len()
                    ),
                    &n.type_name,
                )
                .into());
        }
        for (arg, field) in args.iter_mut().zip(struct_def.fields.iter()) {
            let arg_ty = self.check_expr(arg)?;
            if !(arg_ty.is_void() && !field.data_type.is_base()) && !types_match(&field.data_type, &arg_ty) {
                return Err(self
                    .static_err(
                        format!(
                            "Field '{}' expects '{}', found '{}'",
                            field.var_name.lexeme,
                            type_desc(&field.data_type),
                            type_desc(&arg_ty)
                        ),
                        &n.type_name,
                    )
                    .into());
            }
        }
        Ok(DataType::base(n.type_name.lexeme.clone()))
    }

    fn check_call(&mut self, c: &mut CallExpr) -> Result<DataType, CompileError> {
        let mut arg_types = Vec::with_capacity(c.args.len());
        for arg in &mut c.args {
            arg_types.push(self.check_expr(arg)?);
        }

        if let Some(sig) = builtins::lookup(&c.fun_name.lexeme) {
            self.check_builtin_arity(&c.fun_name, sig.arity, &arg_types)?;
            c.resolved_return_type = Some(sig.return_type.clone());
            return Ok(sig.return_type);
        }

        let overloads = self.functions.get(&c.fun_name.lexeme).cloned().ok_or_else(|| {
            self.static_err(format!("Undefined function '{}'", c.fun_name.lexeme), &c.fun_name)
        })?;

        let matched = overloads.iter().find(|f| {
            f.params.len() == arg_types.len()
                && f.params
                    .iter()
                    .zip(arg_types.iter())
                    .all(|(p, a)| (a.is_void() && !p.data_type.is_base()) || types_match(&p.data_type, a))
        });

        match matched {
            Some(f) => {
                // Null arguments carry no type of their own; mangle by the
                // matched parameter's declared type in that slot so the call
                // site names the same symbol the function definition does.
                let mangled_types: Vec<DataType> = f
                    .params
                    .iter()
                    .zip(arg_types.iter())
                    .map(|(p, a)| if a.is_void() { p.data_type.clone() } else { a.clone() })
                    .collect();
                c.resolved_mangled_name = Some(mangle(&c.fun_name.lexeme, &mangled_types));
                c.resolved_return_type = Some(f.return_type.clone());
                Ok(f.return_type.clone())
            }
            None => Err(self
                .static_err(
                    format!(
                        "No overload of '{}' matches argument types ({})",
                        c.fun_name.lexeme,
                        arg_types.iter().map(type_desc).collect::<Vec<_>>().join(", ")
                    ),
                    &c.fun_name,
                )
                .into()),
        }
    }

    fn check_builtin_arity(
        &self,
        at: &Token,
        arity: BuiltinArity,
        args: &[DataType],
    ) -> Result<(), CompileError> {
        match arity {
            BuiltinArity::None => {
                if !args.is_empty() {
                    return Err(self.static_err("'input' takes no arguments", at).into());
                }
            }
            BuiltinArity::AnyBase => {
                if args.len() != 1 || args[0].is_array {
                    return Err(self
                        .static_err("expects exactly one non-array argument", at)
                        .into());
                }
            }
            BuiltinArity::StringOrArray => {
                if args.len() != 1 || (!args[0].is_array && args[0].type_name != "string") {
                    return Err(self
                        .static_err("expects a string or array argument", at)
                        .into());
                }
            }
            BuiltinArity::Fixed(expected) => {
                if args.len() != expected.len() {
                    return Err(self
                        .static_err(
                            format!("expects {} argument(s), found {}", expected.len(), args.len()),
                            at,
                        )
                        .into());
                }
                for (a, want) in args.iter().zip(expected.iter()) {
                    if a.is_array || &a.type_name != want {
                        return Err(self
                            .static_err(format!("expects '{want}', found '{}'", type_desc(a)), at)
                            .into());
                    }
                }
            }
        }
        Ok(())
    }

    fn check_binop(&self, op: &Token, lhs: &DataType, rhs: &DataType) -> Result<DataType, CompileError> {
        use crate::token::TokenKind::*;
        match op.kind {
            And | Or => {
                if lhs.is_array || rhs.is_array || lhs.type_name != "bool" || rhs.type_name != "bool" {
                    return Err(self.static_err("Operands of 'and'/'or' must be 'bool'", op).into());
                }
                Ok(DataType::base("bool"))
            }
            Equal | NotEqual => {
                if !lhs.is_void() && !rhs.is_void() && !types_match(lhs, rhs) {
                    return Err(self
                        .static_err(
                            format!("Cannot compare '{}' with '{}'", type_desc(lhs), type_desc(rhs)),
                            op,
                        )
                        .into());
                }
                Ok(DataType::base("bool"))
            }
            Less | LessEq | Greater | GreaterEq => {
                if lhs.is_array || rhs.is_array || lhs.type_name == "bool" || !types_match(lhs, rhs) {
                    return Err(self
                        .static_err(
                            format!("Cannot compare '{}' with '{}'", type_desc(lhs), type_desc(rhs)),
                            op,
                        )
                        .into());
                }
                Ok(DataType::base("bool"))
            }
            Plus | Minus | Times | Divide => {
                if lhs.is_array || rhs.is_array || !is_numeric(lhs) || !types_match(lhs, rhs) {
                    return Err(self
                        .static_err(
                            format!(
                                "Arithmetic requires matching numeric operands, found '{}' and '{}'",
                                type_desc(lhs),
                                type_desc(rhs)
                            ),
                            op,
                        )
                        .into());
                }
                Ok(lhs.clone())
            }
            _ => unreachable!("parser only emits binary-op tokens here"),
        }
    }
}

fn param_types_match(a: &FunDef, b: &FunDef) -> bool {
    a.params.len() == b.params.len()
        && a.params.iter().zip(b.params.iter()).all(|(x, y)| {
            x.data_type.is_array == y.data_type.is_array && x.data_type.type_name == y.data_type.type_name
        })
}

fn types_match(a: &DataType, b: &DataType) -> bool {
    a.is_array == b.is_array && a.type_name == b.type_name
}

fn is_numeric(ty: &DataType) -> bool {
    !ty.is_array && matches!(ty.type_name.as_str(), "int" | "double")
}

fn type_desc(ty: &DataType) -> String {
    if ty.is_array {
        format!("array {}", ty.type_name)
    } else {
        ty.type_name.clone()
    }
}

fn literal_type(tok: &Token) -> DataType {
    use crate::token::TokenKind::*;
    match tok.kind {
        IntVal => DataType::base("int"),
        DoubleVal => DataType::base("double"),
        StringVal => DataType::base("string"),
        BoolVal => DataType::base("bool"),
        NullVal => DataType::base("void"),
        _ => unreachable!("parser only emits literal tokens here"),
    }
}

fn expr_line(expr: &Expr) -> usize {
    expr.op.as_ref().map(|t| t.line).unwrap_or(1)
}

fn expr_col(expr: &Expr) -> usize {
    expr.op.as_ref().map(|t| t.column).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::source::StrSource;

    fn check(src: &str) -> Result<Program, CompileError> {
        let mut program = Parser::new(StrSource::new(src))?.parse()?;
        Checker::check(&mut program)?;
        Ok(program)
    }

    #[test]
    fn accepts_hello_world() {
        assert!(check(r#"void main() { print("hello"); }"#).is_ok());
    }

    #[test]
    fn rejects_missing_main() {
        assert!(check("void other() { }").is_err());
    }

    #[test]
    fn rejects_undefined_variable() {
        assert!(check("void main() { print(itos(x)); }").is_err());
    }

    #[test]
    fn rejects_type_mismatch_var_decl() {
        assert!(check("void main() { int x = \"oops\"; }").is_err());
    }

    #[test]
    fn accepts_null_for_struct_field() {
        let src = r#"
            struct P { int x; }
            void main() { P p = null; }
        "#;
        assert!(check(src).is_ok());
    }

    #[test]
    fn resolves_overloaded_function_by_argument_types() {
        let src = r#"
            void f(int x) { print(itos(x)); }
            void f() { print("none"); }
            void main() {
                f(1);
                f();
            }
        "#;
        let program = check(src).unwrap();
        let main = program.fun_defs.iter().find(|f| f.name.lexeme == "main").unwrap();
        match &main.stmts[0] {
            Stmt::Call(c) => assert_eq!(c.args.len(), 1),
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn annotates_expression_with_resolved_type() {
        let program = check("void main() { int x = 2 + 3; }").unwrap();
        match &program.fun_defs[0].stmts[0] {
            Stmt::VarDecl(d) => {
                let ty = d.expr.as_ref().unwrap().resolved_type.as_ref().unwrap();
                assert_eq!(ty.type_name, "int");
            }
            other => panic!("expected var decl, got {other:?}"),
        }
    }

    #[test]
    fn struct_field_path_resolves() {
        let src = r#"
            struct P { int x; }
            void main() {
                P p = new P(3);
                int y = p.x;
            }
        "#;
        assert!(check(src).is_ok());
    }

    #[test]
    fn rejects_field_access_on_non_struct() {
        assert!(check("void main() { int x = 1; int y = x.field; }").is_err());
    }
}
