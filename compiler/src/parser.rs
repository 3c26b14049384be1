//! Recursive-descent parser: tokens to an abstract syntax tree.
//!
//! The grammar is intentionally flat — operators associate right-to-left as
//! written, with grouping only through parentheses. This parser does not
//! implement (and must not implement) precedence climbing.

use crate::ast::*;
use crate::error::{CompileError, ParseError};
use crate::lexer::Lexer;
use crate::source::CharSource;
use crate::token::{Token, TokenKind};

pub struct Parser<S: CharSource> {
    lexer: Lexer<S>,
    current: Token,
}

impl<S: CharSource> Parser<S> {
    pub fn new(source: S) -> Result<Self, CompileError> {
        let mut lexer = Lexer::new(source);
        let current = Self::next_significant(&mut lexer)?;
        Ok(Parser { lexer, current })
    }

    fn next_significant(lexer: &mut Lexer<S>) -> Result<Token, CompileError> {
        loop {
            let tok = lexer.next_token()?;
            if tok.kind != TokenKind::Comment {
                return Ok(tok);
            }
        }
    }

    pub fn parse(&mut self) -> Result<Program, CompileError> {
        let mut struct_defs = Vec::new();
        let mut fun_defs = Vec::new();
        while !self.check(TokenKind::Eos) {
            if self.check(TokenKind::Struct) {
                struct_defs.push(self.struct_def()?);
            } else {
                fun_defs.push(self.fun_def()?);
            }
        }
        Ok(Program {
            struct_defs,
            fun_defs,
        })
    }

    // -- token helpers -----------------------------------------------

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn advance(&mut self) -> Result<Token, CompileError> {
        let old = self.current.clone();
        self.current = Self::next_significant(&mut self.lexer)?;
        Ok(old)
    }

    fn eat(&mut self, kind: TokenKind, msg: &str) -> Result<Token, CompileError> {
        if self.check(kind) {
            self.advance()
        } else {
            Err(self.error(msg).into())
        }
    }

    fn error(&self, msg: &str) -> ParseError {
        ParseError::new(
            format!("{msg}, found '{}'", self.current.lexeme),
            self.current.line,
            self.current.column,
        )
    }

    fn is_bin_op(&self) -> bool {
        use TokenKind::*;
        matches!(
            self.current.kind,
            Plus | Minus
                | Times
                | Divide
                | Equal
                | NotEqual
                | Less
                | LessEq
                | Greater
                | GreaterEq
                | And
                | Or
        )
    }

    fn is_type_starter(&self) -> bool {
        use TokenKind::*;
        matches!(self.current.kind, Array | Int | Double | Bool | StringType | Id)
    }

    // -- top-level productions ----------------------------------------

    fn struct_def(&mut self) -> Result<StructDef, CompileError> {
        self.eat(TokenKind::Struct, "Expected 'struct'")?;
        let name = self.eat(TokenKind::Id, "Expected struct name")?;
        self.eat(TokenKind::LBrace, "Expected '{'")?;
        let fields = self.fields()?;
        self.eat(TokenKind::RBrace, "Expected '}'")?;
        Ok(StructDef { name, fields })
    }

    fn fields(&mut self) -> Result<Vec<VarDef>, CompileError> {
        let mut fields = Vec::new();
        while !self.check(TokenKind::RBrace) {
            let data_type = self.data_type()?;
            let var_name = self.eat(TokenKind::Id, "Expected field name")?;
            self.eat(TokenKind::Semicolon, "Expected ';'")?;
            fields.push(VarDef {
                data_type,
                var_name,
            });
        }
        Ok(fields)
    }

    fn fun_def(&mut self) -> Result<FunDef, CompileError> {
        let return_type = if self.check(TokenKind::Void) {
            let t = self.advance()?;
            DataType::base(t.lexeme)
        } else {
            self.data_type()?
        };
        let name = self.eat(TokenKind::Id, "Expected function name")?;
        self.eat(TokenKind::LParen, "Expected '('")?;
        let params = self.params()?;
        self.eat(TokenKind::RParen, "Expected ')'")?;
        self.eat(TokenKind::LBrace, "Expected '{'")?;
        let stmts = self.stmts_until_rbrace()?;
        self.eat(TokenKind::RBrace, "Expected '}'")?;
        Ok(FunDef {
            return_type,
            name,
            params,
            stmts,
        })
    }

    fn params(&mut self) -> Result<Vec<VarDef>, CompileError> {
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            params.push(self.one_param()?);
            while self.check(TokenKind::Comma) {
                self.advance()?;
                params.push(self.one_param()?);
            }
        }
        Ok(params)
    }

    fn one_param(&mut self) -> Result<VarDef, CompileError> {
        let data_type = self.data_type()?;
        let var_name = self.eat(TokenKind::Id, "Expected parameter name")?;
        Ok(VarDef {
            data_type,
            var_name,
        })
    }

    fn data_type(&mut self) -> Result<DataType, CompileError> {
        let is_array = if self.check(TokenKind::Array) {
            self.advance()?;
            true
        } else {
            false
        };
        use TokenKind::*;
        let name = match self.current.kind {
            Int | Double | Bool | StringType | Id => self.advance()?.lexeme,
            _ => return Err(self.error("Expected type name").into()),
        };
        Ok(DataType { is_array, type_name: name })
    }

    // -- statements -----------------------------------------------------

    fn stmts_until_rbrace(&mut self) -> Result<Vec<Stmt>, CompileError> {
        let mut stmts = Vec::new();
        while !self.check(TokenKind::RBrace) {
            stmts.push(self.stmt()?);
        }
        Ok(stmts)
    }

    fn stmt(&mut self) -> Result<Stmt, CompileError> {
        use TokenKind::*;
        match self.current.kind {
            While => self.while_stmt(),
            If => self.if_stmt(),
            For => self.for_stmt(),
            Return => {
                let r = self.return_stmt()?;
                self.eat(Semicolon, "Expected ';'")?;
                Ok(Stmt::Return(r))
            }
            Array | Int | Double | Bool | StringType => {
                let dt = self.data_type()?;
                let decl = self.vdecl_tail(dt)?;
                self.eat(Semicolon, "Expected ';'")?;
                Ok(Stmt::VarDecl(decl))
            }
            Id => {
                let id_tok = self.advance()?;
                if self.check(LParen) {
                    let call = self.call_tail(id_tok)?;
                    self.eat(Semicolon, "Expected ';'")?;
                    Ok(Stmt::Call(call))
                } else if self.check(LBracket) || self.check(Dot) || self.check(Assign) {
                    let assign = self.assign_tail(id_tok)?;
                    self.eat(Semicolon, "Expected ';'")?;
                    Ok(Stmt::Assign(assign))
                } else {
                    let dt = DataType::base(id_tok.lexeme);
                    let decl = self.vdecl_tail(dt)?;
                    self.eat(Semicolon, "Expected ';'")?;
                    Ok(Stmt::VarDecl(decl))
                }
            }
            _ => Err(self.error("Expected statement").into()),
        }
    }

    fn vdecl_tail(&mut self, data_type: DataType) -> Result<VarDeclStmt, CompileError> {
        let var_name = self.eat(TokenKind::Id, "Expected variable name")?;
        let expr = if self.check(TokenKind::Assign) {
            self.advance()?;
            Some(self.expr()?)
        } else {
            None
        };
        Ok(VarDeclStmt {
            var_def: VarDef {
                data_type,
                var_name,
            },
            expr,
        })
    }

    fn assign_tail(&mut self, first: Token) -> Result<AssignStmt, CompileError> {
        let lvalue = self.var_path(first)?;
        self.eat(TokenKind::Assign, "Expected '='")?;
        let expr = self.expr()?;
        Ok(AssignStmt { lvalue, expr })
    }

    fn var_path(&mut self, first: Token) -> Result<Vec<VarRef>, CompileError> {
        let mut path = Vec::new();
        let array_expr = self.optional_bracket_expr()?;
        path.push(VarRef {
            var_name: first,
            array_expr,
        });
        while self.check(TokenKind::Dot) {
            self.advance()?;
            let name = self.eat(TokenKind::Id, "Expected field name")?;
            let array_expr = self.optional_bracket_expr()?;
            path.push(VarRef {
                var_name: name,
                array_expr,
            });
        }
        Ok(path)
    }

    fn optional_bracket_expr(&mut self) -> Result<Option<Box<Expr>>, CompileError> {
        if self.check(TokenKind::LBracket) {
            self.advance()?;
            let e = self.expr()?;
            self.eat(TokenKind::RBracket, "Expected ']'")?;
            Ok(Some(Box::new(e)))
        } else {
            Ok(None)
        }
    }

    fn call_tail(&mut self, fun_name: Token) -> Result<CallExpr, CompileError> {
        self.eat(TokenKind::LParen, "Expected '('")?;
        let args = self.arg_list()?;
        self.eat(TokenKind::RParen, "Expected ')'")?;
        Ok(CallExpr {
            fun_name,
            args,
            resolved_mangled_name: None,
            resolved_return_type: None,
        })
    }

    fn arg_list(&mut self) -> Result<Vec<Expr>, CompileError> {
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            args.push(self.expr()?);
            while self.check(TokenKind::Comma) {
                self.advance()?;
                args.push(self.expr()?);
            }
        }
        Ok(args)
    }

    fn while_stmt(&mut self) -> Result<Stmt, CompileError> {
        self.eat(TokenKind::While, "Expected 'while'")?;
        self.eat(TokenKind::LParen, "Expected '('")?;
        let cond = self.expr()?;
        self.eat(TokenKind::RParen, "Expected ')'")?;
        self.eat(TokenKind::LBrace, "Expected '{'")?;
        let stmts = self.stmts_until_rbrace()?;
        self.eat(TokenKind::RBrace, "Expected '}'")?;
        Ok(Stmt::While(WhileStmt { cond, stmts }))
    }

    fn for_stmt(&mut self) -> Result<Stmt, CompileError> {
        self.eat(TokenKind::For, "Expected 'for'")?;
        self.eat(TokenKind::LParen, "Expected '('")?;
        let dt = self.data_type()?;
        let var_name = self.eat(TokenKind::Id, "Expected loop variable name")?;
        self.eat(TokenKind::Assign, "Expected '='")?;
        let init_expr = self.expr()?;
        let var_decl = VarDeclStmt {
            var_def: VarDef {
                data_type: dt,
                var_name,
            },
            expr: Some(init_expr),
        };
        self.eat(TokenKind::Semicolon, "Expected ';'")?;
        let cond = self.expr()?;
        self.eat(TokenKind::Semicolon, "Expected ';'")?;
        let step_id = self.eat(TokenKind::Id, "Expected loop variable name")?;
        let step_assign = self.assign_tail(step_id)?;
        self.eat(TokenKind::RParen, "Expected ')'")?;
        self.eat(TokenKind::LBrace, "Expected '{'")?;
        let stmts = self.stmts_until_rbrace()?;
        self.eat(TokenKind::RBrace, "Expected '}'")?;
        Ok(Stmt::For(ForStmt {
            var_decl,
            cond,
            step_assign,
            stmts,
        }))
    }

    fn if_stmt(&mut self) -> Result<Stmt, CompileError> {
        self.eat(TokenKind::If, "Expected 'if'")?;
        let if_part = self.basic_if()?;
        let mut else_ifs = Vec::new();
        while self.check(TokenKind::Elseif) {
            self.advance()?;
            else_ifs.push(self.basic_if()?);
        }
        let else_stmts = if self.check(TokenKind::Else) {
            self.advance()?;
            self.eat(TokenKind::LBrace, "Expected '{'")?;
            let stmts = self.stmts_until_rbrace()?;
            self.eat(TokenKind::RBrace, "Expected '}'")?;
            stmts
        } else {
            Vec::new()
        };
        Ok(Stmt::If(IfStmt {
            if_part,
            else_ifs,
            else_stmts,
        }))
    }

    fn basic_if(&mut self) -> Result<BasicIf, CompileError> {
        self.eat(TokenKind::LParen, "Expected '('")?;
        let cond = self.expr()?;
        self.eat(TokenKind::RParen, "Expected ')'")?;
        self.eat(TokenKind::LBrace, "Expected '{'")?;
        let stmts = self.stmts_until_rbrace()?;
        self.eat(TokenKind::RBrace, "Expected '}'")?;
        Ok(BasicIf { cond, stmts })
    }

    fn return_stmt(&mut self) -> Result<ReturnStmt, CompileError> {
        let token = self.eat(TokenKind::Return, "Expected 'return'")?;
        let expr = self.expr()?;
        Ok(ReturnStmt { token, expr })
    }

    // -- expressions ------------------------------------------------------

    /// `not expr` hoists the negated expr's own `first`/`op`/`rest` up into
    /// this node rather than nesting a `ComplexTerm` — matching the shape
    /// the checker and code generator expect to see.
    fn expr(&mut self) -> Result<Expr, CompileError> {
        let not_op = if self.check(TokenKind::Not) {
            self.advance()?;
            true
        } else {
            false
        };
        let inner = self.expr_body()?;
        if not_op {
            Ok(Expr {
                not_op: true,
                first: inner.first,
                op: inner.op,
                rest: inner.rest,
                resolved_type: None,
            })
        } else {
            Ok(inner)
        }
    }

    fn expr_body(&mut self) -> Result<Expr, CompileError> {
        let first = self.term()?;
        if self.is_bin_op() {
            let op = self.advance()?;
            let rest = self.expr()?;
            Ok(Expr {
                not_op: false,
                first,
                op: Some(op),
                rest: Some(Box::new(rest)),
                resolved_type: None,
            })
        } else {
            Ok(Expr::simple(first))
        }
    }

    /// A parenthesized expression with no operator of its own unwraps to
    /// its inner term instead of wrapping a redundant `ComplexTerm`.
    fn term(&mut self) -> Result<Term, CompileError> {
        if self.check(TokenKind::LParen) {
            self.advance()?;
            let inner = self.expr()?;
            self.eat(TokenKind::RParen, "Expected ')'")?;
            if inner.op.is_none() && !inner.not_op {
                Ok(inner.first)
            } else {
                Ok(Term::Complex(Box::new(inner)))
            }
        } else {
            Ok(Term::Simple(self.rvalue()?))
        }
    }

    fn rvalue(&mut self) -> Result<RValue, CompileError> {
        use TokenKind::*;
        match self.current.kind {
            IntVal | DoubleVal | StringVal | BoolVal | NullVal => {
                Ok(RValue::Literal(self.advance()?))
            }
            New => self.new_rvalue(),
            Id => {
                let id_tok = self.advance()?;
                if self.check(LParen) {
                    Ok(RValue::Call(self.call_tail(id_tok)?))
                } else {
                    Ok(RValue::Var(VarRValue {
                        path: self.var_path(id_tok)?,
                    }))
                }
            }
            _ => Err(self.error("Expected expression").into()),
        }
    }

    fn new_rvalue(&mut self) -> Result<RValue, CompileError> {
        use TokenKind::*;
        let token = self.eat(New, "Expected 'new'")?;
        match self.current.kind {
            Int | Double | Bool | StringType => {
                let type_name = self.advance()?;
                self.eat(LBracket, "Expected '['")?;
                let len = self.expr()?;
                self.eat(RBracket, "Expected ']'")?;
                Ok(RValue::New(NewRValue {
                    token,
                    type_name,
                    array_expr: Some(Box::new(len)),
                    struct_params: None,
                }))
            }
            Id => {
                let type_name = self.advance()?;
                if self.check(LBracket) {
                    self.advance()?;
                    let len = self.expr()?;
                    self.eat(RBracket, "Expected ']'")?;
                    Ok(RValue::New(NewRValue {
                        token,
                        type_name,
                        array_expr: Some(Box::new(len)),
                        struct_params: None,
                    }))
                } else {
                    self.eat(LParen, "Expected '('")?;
                    let args = self.arg_list()?;
                    self.eat(RParen, "Expected ')'")?;
                    Ok(RValue::New(NewRValue {
                        token,
                        type_name,
                        array_expr: None,
                        struct_params: Some(args),
                    }))
                }
            }
            _ => Err(self.error("Expected type name after 'new'").into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StrSource;

    fn parse(src: &str) -> Program {
        Parser::new(StrSource::new(src)).unwrap().parse().unwrap()
    }

    #[test]
    fn parses_hello_world() {
        let program = parse(r#"void main() { print("hello"); }"#);
        assert_eq!(program.fun_defs.len(), 1);
        assert_eq!(program.fun_defs[0].name.lexeme, "main");
        assert_eq!(program.fun_defs[0].stmts.len(), 1);
        match &program.fun_defs[0].stmts[0] {
            Stmt::Call(c) => {
                assert_eq!(c.fun_name.lexeme, "print");
                assert_eq!(c.args.len(), 1);
            }
            other => panic!("expected call stmt, got {other:?}"),
        }
    }

    #[test]
    fn parses_struct_and_new() {
        let program = parse(
            r#"
            struct P { int x; int y; }
            void main() {
                P p = new P(3, 4);
            }
            "#,
        );
        assert_eq!(program.struct_defs.len(), 1);
        assert_eq!(program.struct_defs[0].fields.len(), 2);
        match &program.fun_defs[0].stmts[0] {
            Stmt::VarDecl(d) => {
                assert_eq!(d.var_def.data_type.type_name, "P");
                assert!(matches!(
                    d.expr.as_ref().unwrap().first,
                    Term::Simple(RValue::New(_))
                ));
            }
            other => panic!("expected var decl, got {other:?}"),
        }
    }

    #[test]
    fn parses_array_decl_and_index_assign() {
        let program = parse(
            r#"
            void main() {
                array int a = new int[3];
                a[0] = 10;
            }
            "#,
        );
        match &program.fun_defs[0].stmts[0] {
            Stmt::VarDecl(d) => assert!(d.var_def.data_type.is_array),
            other => panic!("expected var decl, got {other:?}"),
        }
        match &program.fun_defs[0].stmts[1] {
            Stmt::Assign(a) => {
                assert_eq!(a.lvalue.len(), 1);
                assert!(a.lvalue[0].array_expr.is_some());
            }
            other => panic!("expected assign stmt, got {other:?}"),
        }
    }

    #[test]
    fn parses_for_loop() {
        let program = parse(
            r#"
            void main() {
                for (int i = 0; i < 3; i = i + 1) {
                    print(itos(i));
                }
            }
            "#,
        );
        match &program.fun_defs[0].stmts[0] {
            Stmt::For(f) => {
                assert_eq!(f.var_decl.var_def.var_name.lexeme, "i");
                assert_eq!(f.stmts.len(), 1);
            }
            other => panic!("expected for stmt, got {other:?}"),
        }
    }

    #[test]
    fn not_hoists_inner_expr_shape() {
        let program = parse("void main() { bool b = not a < b; }");
        match &program.fun_defs[0].stmts[0] {
            Stmt::VarDecl(d) => {
                let e = d.expr.as_ref().unwrap();
                assert!(e.not_op);
                assert!(e.op.is_some());
            }
            other => panic!("expected var decl, got {other:?}"),
        }
    }

    #[test]
    fn field_path_chains_dots() {
        let program = parse("void main() { a.b.c = 1; }");
        match &program.fun_defs[0].stmts[0] {
            Stmt::Assign(a) => assert_eq!(a.lvalue.len(), 3),
            other => panic!("expected assign stmt, got {other:?}"),
        }
    }
}
