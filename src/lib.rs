//! yieldless
//!
//! Lowers JavaScript generator functions (`function*` with `yield`) into
//! ES5-style state machine programs. Each generator body becomes a driver
//! function whose body is a single `switch` over `context.nextAddress`; the
//! driver is handed to a runtime (`$jscomp.generator.createGenerator`) that
//! orchestrates suspension, resumption and exception handling.
//!
//! The crate is a library: the core transform lives in
//! [`transforms::generators`], and the surrounding modules supply what it
//! needs to operate stand-alone:
//!
//! - [`ast`] - an arena-backed mutable AST;
//! - [`scanner`] / [`parser`] - source text to AST for the supported subset;
//! - [`printer`] - AST back to JavaScript text;
//! - [`cfg`] - the reachability oracle;
//! - [`decompose`] - expression decomposition for yields buried in compound
//!   expressions;
//! - [`diagnostics`] - user-facing error reporting.
//!
//! # Example
//!
//! ```
//! use yieldless::{lower_program, LoweringOptions};
//!
//! let (out, diagnostics) =
//!     lower_program("function* gen() { yield 1; }", &LoweringOptions::default());
//! assert!(diagnostics.is_empty());
//! assert!(out.contains("$jscomp.generator.createGenerator"));
//! assert!(!out.contains("function*"));
//! ```

pub mod ast;
pub mod cfg;
pub mod decompose;
pub mod diagnostics;
pub mod parser;
pub mod printer;
pub mod scanner;
pub mod span;
pub mod transforms;

pub use diagnostics::DiagnosticBag;
pub use transforms::generators::{GeneratorLowering, LoweringOptions};

/// Parses `source`, lowers every generator function in it, and prints the
/// result. Parse and lowering diagnostics are merged into the returned bag.
pub fn lower_program(source: &str, options: &LoweringOptions) -> (String, DiagnosticBag) {
    let mut parser = parser::ParserState::new(source);
    let root = parser.parse_script();
    let mut diagnostics = parser.take_diagnostics();
    if !diagnostics.has_errors() {
        let mut lowering = GeneratorLowering::new(options.clone());
        lowering.process(&mut parser.arena, root, &mut diagnostics);
    }
    (printer::print(&parser.arena, root), diagnostics)
}
