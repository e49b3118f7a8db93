//! Compiler configuration
//!
//! Options that flow through the whole pipeline: the arithmetic emission
//! mode, whether the optimizer runs, and driver-level settings for the
//! host C compiler step.

use std::path::PathBuf;

/// How arithmetic expressions are emitted.
///
/// `Checked` routes every operation through the runtime, which wraps
/// integer overflow deterministically and reports division by zero.
/// `Unchecked` emits the native C operator inline where one exists;
/// division and modulo still call the runtime because the zero check and
/// error report live there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArithmeticMode {
    #[default]
    Checked,
    Unchecked,
}

#[derive(Debug, Clone)]
pub struct CompilerConfig {
    pub arithmetic_mode: ArithmeticMode,
    /// Run the optimizer passes before code generation.
    pub optimize: bool,
    /// Keep the intermediate .c file after the host compiler runs.
    pub keep_c: bool,
    /// Extra library search paths for the link step.
    pub library_paths: Vec<PathBuf>,
    /// Extra libraries for the link step.
    pub libraries: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            arithmetic_mode: ArithmeticMode::Checked,
            optimize: true,
            keep_c: false,
            library_paths: Vec::new(),
            libraries: Vec::new(),
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_arithmetic_mode(mut self, mode: ArithmeticMode) -> Self {
        self.arithmetic_mode = mode;
        self
    }

    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    pub fn with_library_path(mut self, path: PathBuf) -> Self {
        self.library_paths.push(path);
        self
    }

    pub fn with_library(mut self, lib: impl Into<String>) -> Self {
        self.libraries.push(lib.into());
        self
    }
}
