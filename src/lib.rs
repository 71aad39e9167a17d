//! An embeddable runtime for a small event-driven scripting language.
//!
//! Source text is lexed, parsed into an AST of *units* containing named
//! *handlers*, compiled into bytecode, installed into a [`ModuleManager`],
//! and dispatched by `(unit, handler)` name into a [`vm`] frame. Handlers
//! may call host-registered functions and mint host-owned [`Rule`] handles
//! through a [`HostBridge`]; modules may be hot-swapped while handlers
//! already executing in the previous version run to completion.
//!
//! A typical embedding sequence:
//! ```
//! use unitrun::{Parser, Runtime, compile_unit, vm, io::StdPrint};
//!
//! let mut parser = Parser::new(r#"unit Main { on Start -> () Print("hi"); end }"#)?;
//! let program = parser.parse_program()?;
//! let compiled = compile_unit(&program.units[0])?;
//!
//! let runtime = Runtime::new();
//! runtime.modules().install(unitrun::Module::new("Main".to_owned(), compiled.module));
//!
//! let module = runtime.modules().get("Main").unwrap();
//! vm::execute_handler(&module, runtime.bridge(), &StdPrint, "Start")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
#![expect(clippy::module_name_repetitions, reason = "some re-exports intentionally echo their module name")]

mod ast;
mod bytecode;
mod compiler;
mod error;
mod host;
pub mod io;
mod lexer;
mod manager;
mod module;
mod parser;
mod runtime;
mod value;
pub mod vm;

pub use crate::{
    ast::{Expr, HandlerDecl, Program, Stmt, UnitDecl, SUPER_INIT_HANDLER},
    bytecode::{ByteFunc, ByteModule, CompileError, CompiledUnit, Instruction, Opcode},
    compiler::compile_unit,
    error::RuntimeError,
    host::{HostBridge, HostError, HostFn, RegisteredFunctionGuard},
    lexer::{LexError, Lexer, Token, TokenKind},
    manager::ModuleManager,
    module::Module,
    parser::ParseError,
    parser::Parser,
    runtime::{Runtime, RuntimeConfig},
    value::{Rule, Value},
    vm::RunError,
};
