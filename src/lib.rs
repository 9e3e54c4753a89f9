//! A small Lisp-like language compiled through a region-based IR.
//!
//! The pipeline is parse, generate IR, then optionally lower through
//! rewrite-driven passes, and finally interpret. The IR stays executable at
//! every stage, so the same program can be run before or after lowering and
//! must print the same output.
//!
//! ```
//! let mut out = Vec::new();
//! sprig::run_source("(print (+ 1 2))", sprig::Stage::Standard, &mut out).unwrap();
//! assert_eq!(out, b"3\n");
//! ```

pub mod ast;
pub mod diagnostic;
pub mod error;
pub mod interp;
pub mod ir;
pub mod lexeme;
pub mod lexer;
pub mod parser;
pub mod span;

use std::io::Write;
use std::path::Path;

pub use error::{Error, Result};
pub use parser::parse;

/// How far to lower a module before emitting or executing it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Source dialect, as generated from the AST.
    None,
    /// Standard dialect.
    Standard,
    /// Standard dialect with selects rewritten to branchless masks.
    Select,
}

/// Parse and generate a verified IR module.
pub fn compile(source: &str) -> Result<ir::Module> {
    let ast = parser::parse(source)?;
    ir::builder::build(&ast)
}

/// Apply the lowering passes up to the requested stage, re-verifying after
/// each pass.
pub fn lower(module: &mut ir::Module, stage: Stage) -> Result<()> {
    if stage == Stage::None {
        return Ok(());
    }
    ir::lower::lower_to_standard(module);
    ir::verify::verify(module)?;
    if stage == Stage::Select {
        ir::lower::lower_select(module);
        ir::verify::verify(module)?;
    }
    Ok(())
}

/// Compile, lower, and execute a program, writing its output to `out`.
pub fn run_source<W: Write>(source: &str, stage: Stage, out: &mut W) -> Result<()> {
    let mut module = compile(source)?;
    lower(&mut module, stage)?;
    interp::run_module(&module, out)
}

pub fn load_source(path: &Path) -> Result<String> {
    Ok(std::fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_is_stage_independent() {
        let src = "(defun fact (n) (if (<= n 1) 1 (* n (fact (- n 1))))) (print (fact 5))";
        for stage in [Stage::None, Stage::Standard, Stage::Select] {
            let mut out = Vec::new();
            run_source(src, stage, &mut out).unwrap();
            assert_eq!(out, b"120\n", "stage {:?}", stage);
        }
    }

    #[test]
    fn test_load_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "(print 1)").unwrap();
        assert_eq!(load_source(file.path()).unwrap(), "(print 1)");
    }

    #[test]
    fn test_load_source_missing_file() {
        let err = load_source(Path::new("/nonexistent/x.sprig")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
