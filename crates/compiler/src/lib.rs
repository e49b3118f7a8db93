//! Sindarin compiler library
//!
//! The semantic pipeline for the Sindarin language: an arena-allocated
//! AST, a symbol table with lexical scoping, a type checker (including
//! the native-interop boundary rules), an expression-level optimizer and
//! a C code generator. The lexer and parser live in the front-end crate
//! and feed modules in through the factory API on [`AstArena`]; the
//! emitted C links against the `sindarin-runtime` staticlib.
//!
//! # Pipeline
//!
//! ```rust,ignore
//! use bumpalo::Bump;
//! use sinc::{AstArena, CompilerConfig, compile_module};
//!
//! let bump = Bump::new();
//! let mut arena = AstArena::new(&bump);
//! let module = frontend::parse(&mut arena, source, "main.sn")?;
//! let c_source = compile_module(&mut arena, &module, &CompilerConfig::default())?;
//! ```

pub mod arena;
pub mod ast;
pub mod codegen;
pub mod config;
pub mod error;
pub mod optimizer;
pub mod symbol_table;
pub mod token;
pub mod typechecker;
pub mod types;

pub use arena::{AstArena, ExprId, StmtId, TypeId};
pub use ast::{Expr, ExprKind, FunctionDecl, LiteralValue, Module, Param, Stmt, StmtKind};
pub use codegen::CodeGen;
pub use config::{ArithmeticMode, CompilerConfig};
pub use error::{ErrorReporter, Severity, SourceLocation};
pub use optimizer::{Optimizer, OptimizerStats};
pub use symbol_table::{Symbol, SymbolKind, SymbolTable};
pub use token::{Token, TokenKind};
pub use typechecker::{MemoryContext, TypeChecker};
pub use types::{MemoryQualifier, Primitive, Type};

use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;

/// Cache for the host C compiler probe. Stores Ok(()) once `cc` has been
/// found, or the failure message.
static CC_CHECKED: OnceLock<Result<(), String>> = OnceLock::new();

/// Check that a host C compiler is available. The result is cached; the
/// probe only runs once per process.
fn check_host_compiler() -> Result<(), String> {
    CC_CHECKED
        .get_or_init(|| {
            let output = Command::new("cc").arg("--version").output().map_err(|e| {
                format!(
                    "Failed to run cc: {}. A host C compiler is required to link \
                     generated code.",
                    e
                )
            })?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(format!(
                    "cc --version failed with exit code {:?}: {}",
                    output.status.code(),
                    stderr
                ));
            }
            Ok(())
        })
        .clone()
}

/// Run the semantic pipeline over a parsed module and return the emitted
/// C source.
///
/// Type checking annotates every expression; a failed verdict aborts with
/// the number of diagnostics already printed to stderr. The optimizer
/// runs unless disabled in the configuration.
pub fn compile_module<'arena>(
    arena: &mut AstArena<'arena>,
    module: &Module<'arena>,
    config: &CompilerConfig,
) -> Result<String, String> {
    let mut checker = TypeChecker::new(arena);
    if !checker.check_module(module) {
        let count = checker.reporter().error_count();
        return Err(format!(
            "type checking failed with {} error(s)",
            count
        ));
    }

    if config.optimize {
        let mut optimizer = Optimizer::new(arena);
        optimizer.optimize_module(module);
    }

    let mut codegen = CodeGen::new(arena, config);
    codegen.generate_module(module)
}

/// Compile emitted C source into an executable by invoking the host C
/// compiler and linking the Sindarin runtime.
///
/// `runtime_dir` must contain `libsindarin_runtime.a` and the
/// `sindarin_rt.h` header.
pub fn build_c_source(
    c_source: &str,
    output_path: &Path,
    runtime_dir: &Path,
    config: &CompilerConfig,
) -> Result<(), String> {
    check_host_compiler()?;

    let c_path = output_path.with_extension("c");
    fs::write(&c_path, c_source).map_err(|e| format!("Failed to write C file: {}", e))?;

    let mut cc = Command::new("cc");
    cc.arg("-O2")
        .arg(&c_path)
        .arg("-o")
        .arg(output_path)
        .arg("-I")
        .arg(runtime_dir)
        .arg("-L")
        .arg(runtime_dir)
        .arg("-lsindarin_runtime")
        .arg("-lpthread")
        .arg("-lm");
    for lib_path in &config.library_paths {
        cc.arg("-L").arg(lib_path);
    }
    for lib in &config.libraries {
        cc.arg("-l").arg(lib);
    }

    let output = cc
        .output()
        .map_err(|e| format!("Failed to run cc: {}", e))?;

    if !config.keep_c {
        fs::remove_file(&c_path).ok();
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("C compilation failed:\n{}", stderr));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;

    fn ident<'a>(text: &'a str) -> Token<'a> {
        Token::new(TokenKind::Identifier, text, "test.sn", 1, 1)
    }

    /// End-to-end: build the AST for `fn main() -> int => return 5 + 3`,
    /// run the full pipeline, and check the folded result lands in the C.
    #[test]
    fn test_compile_module_end_to_end() {
        let bump = Bump::new();
        let mut arena = AstArena::new(&bump);
        let int = arena.primitive(Primitive::Int);

        let five = arena.int_literal(5, &ident("5"));
        let three = arena.int_literal(3, &ident("3"));
        let sum = arena.binary_expr(five, TokenKind::Plus, three, &ident("+"));
        let ret = arena.return_stmt(&ident("return"), Some(sum));
        let f = arena.function_stmt(&ident("main"), Vec::new(), int, vec![ret], false);
        let mut module = Module::new("demo.sn");
        module.add_statement(f);

        let c_source = compile_module(&mut arena, &module, &CompilerConfig::default()).unwrap();

        // 5 + 3 folds before emission.
        assert!(c_source.contains("return 8LL;"));
        assert!(c_source.contains("int main(int argc, char **argv)"));
    }

    #[test]
    fn test_compile_module_reports_type_errors() {
        let bump = Bump::new();
        let mut arena = AstArena::new(&bump);
        let int = arena.primitive(Primitive::Int);

        // var x: int = true
        let bad = arena.bool_literal(true, &ident("true"));
        let decl = arena.var_decl_stmt(&ident("x"), int, Some(bad));
        let void = arena.primitive(Primitive::Void);
        let f = arena.function_stmt(&ident("main"), Vec::new(), void, vec![decl], false);
        let mut module = Module::new("demo.sn");
        module.add_statement(f);

        let err = compile_module(&mut arena, &module, &CompilerConfig::default()).unwrap_err();
        assert!(err.contains("type checking failed"));
    }

    #[test]
    fn test_compile_module_without_optimizer() {
        let bump = Bump::new();
        let mut arena = AstArena::new(&bump);
        let int = arena.primitive(Primitive::Int);

        let five = arena.int_literal(5, &ident("5"));
        let three = arena.int_literal(3, &ident("3"));
        let sum = arena.binary_expr(five, TokenKind::Plus, three, &ident("+"));
        let ret = arena.return_stmt(&ident("return"), Some(sum));
        let f = arena.function_stmt(&ident("main"), Vec::new(), int, vec![ret], false);
        let mut module = Module::new("demo.sn");
        module.add_statement(f);

        let config = CompilerConfig::new().with_optimize(false);
        let c_source = compile_module(&mut arena, &module, &config).unwrap();

        // Unfolded: checked arithmetic goes through the runtime.
        assert!(c_source.contains("rt_int_add(5LL, 3LL)"));
    }
}
