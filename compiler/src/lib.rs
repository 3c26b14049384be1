//! Ivy toolchain front end: lexer, parser, semantic checker, and code
//! generator, wired into a single `compile` entry point that hands
//! [`ivy_runtime::FrameTemplate`]s to the virtual machine.

pub mod ast;
pub mod builtins;
pub mod checker;
pub mod codegen;
pub mod error;
pub mod lexer;
pub mod mangle;
pub mod parser;
pub mod source;
pub mod token;

pub use ast::Program;
pub use checker::Checker;
pub use error::CompileError;
pub use parser::Parser;
pub use source::StrSource;

use ivy_runtime::{FrameTemplate, Input, Output, Vm};

/// Runs source text through the lexer, parser, and semantic checker and
/// returns the resulting bytecode templates, one per function.
pub fn compile(source: &str) -> Result<Vec<FrameTemplate>, CompileError> {
    let mut program = Parser::new(StrSource::new(source))?.parse()?;
    Checker::check(&mut program)?;
    Ok(codegen::generate(&program))
}

/// Compiles and immediately runs `source` against `output`/`input`, for
/// callers that don't need the intermediate templates (the CLI, tests).
pub fn compile_and_run(
    source: &str,
    output: &mut dyn Output,
    input: &mut dyn Input,
) -> Result<(), String> {
    let templates = compile(source).map_err(|e| e.to_string())?;
    let mut vm = Vm::new();
    for t in templates {
        vm.add_frame_template(t);
    }
    vm.run(output, input).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ivy_runtime::{BufferInput, BufferOutput};

    #[test]
    fn compiles_and_runs_hello_world() {
        let mut out = BufferOutput::default();
        let mut input = BufferInput::new(Vec::<String>::new());
        compile_and_run(r#"void main() { print("hello, ivy"); }"#, &mut out, &mut input).unwrap();
        assert_eq!(out.buffer, "hello, ivy");
    }

    #[test]
    fn reports_lex_errors_through_compile() {
        assert!(compile("void main() { ! }").is_err());
    }

    #[test]
    fn reports_static_errors_through_compile() {
        assert!(compile("void main() { int x = \"oops\"; }").is_err());
    }
}
