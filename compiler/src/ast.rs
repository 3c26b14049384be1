//! Abstract syntax tree produced by the parser and consumed by the semantic
//! checker and code generator.

use crate::token::Token;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub struct_defs: Vec<StructDef>,
    pub fun_defs: Vec<FunDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: Token,
    pub fields: Vec<VarDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDef {
    pub data_type: DataType,
    pub var_name: Token,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunDef {
    pub return_type: DataType,
    pub name: Token,
    pub params: Vec<VarDef>,
    pub stmts: Vec<Stmt>,
}

/// `type_name` is a base-type lexeme (`int`, `double`, `bool`, `string`), a
/// declared struct name, or `void` (function return types only).
#[derive(Debug, Clone, PartialEq)]
pub struct DataType {
    pub is_array: bool,
    pub type_name: String,
}

impl DataType {
    pub fn base(name: impl Into<String>) -> Self {
        DataType {
            is_array: false,
            type_name: name.into(),
        }
    }

    pub fn array_of(name: impl Into<String>) -> Self {
        DataType {
            is_array: true,
            type_name: name.into(),
        }
    }

    pub fn is_base(&self) -> bool {
        !self.is_array
            && matches!(self.type_name.as_str(), "int" | "double" | "bool" | "string")
    }

    pub fn is_void(&self) -> bool {
        !self.is_array && self.type_name == "void"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    VarDecl(VarDeclStmt),
    Assign(AssignStmt),
    While(WhileStmt),
    For(ForStmt),
    If(IfStmt),
    Return(ReturnStmt),
    Call(CallExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDeclStmt {
    pub var_def: VarDef,
    pub expr: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignStmt {
    pub lvalue: Vec<VarRef>,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileStmt {
    pub cond: Expr,
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForStmt {
    pub var_decl: VarDeclStmt,
    pub cond: Expr,
    pub step_assign: AssignStmt,
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicIf {
    pub cond: Expr,
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    pub if_part: BasicIf,
    pub else_ifs: Vec<BasicIf>,
    pub else_stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStmt {
    pub token: Token,
    pub expr: Expr,
}

/// One link in an lvalue/rvalue path such as `a.b[i].c`.
#[derive(Debug, Clone, PartialEq)]
pub struct VarRef {
    pub var_name: Token,
    pub array_expr: Option<Box<Expr>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub not_op: bool,
    pub first: Term,
    pub op: Option<Token>,
    pub rest: Option<Box<Expr>>,
    /// Populated by the semantic checker; consumed by the code generator
    /// for exact-type call mangling.
    pub resolved_type: Option<DataType>,
}

impl Expr {
    pub fn simple(first: Term) -> Self {
        Expr {
            not_op: false,
            first,
            op: None,
            rest: None,
            resolved_type: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Simple(RValue),
    Complex(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RValue {
    Literal(Token),
    New(NewRValue),
    Var(VarRValue),
    Call(CallExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRValue {
    pub token: Token,
    pub type_name: Token,
    pub array_expr: Option<Box<Expr>>,
    pub struct_params: Option<Vec<Expr>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarRValue {
    pub path: Vec<VarRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub fun_name: Token,
    pub args: Vec<Expr>,
    /// Populated by the semantic checker for calls to user-defined
    /// functions (`None` for built-ins, which the code generator dispatches
    /// by name instead). See [`Expr::resolved_type`].
    pub resolved_mangled_name: Option<String>,
    /// The call's return type, populated by the semantic checker for both
    /// built-in and user-defined calls. Lets the code generator drop an
    /// unused non-void result when the call appears as a statement.
    pub resolved_return_type: Option<DataType>,
}
