//! The bytecode container types (spec.md §3.3).
//!
//! Shaped after a classic bytecode chunk: a flat instruction stream plus a
//! constant pool indexed by load instructions, generalized here with a named
//! local-slot table instead of a pure operand stack.

use std::fmt;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::value::Value;

/// The reserved slot name and index for a function's temporary slot
/// (spec.md §3.3): always allocated, always slot `0`.
pub const TMP_SLOT_NAME: &str = "_tmp";
pub const TMP_SLOT: usize = 0;

/// The opcode set the VM honors (spec.md §3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// `locals[b] <- consts[a]` (numeric constant).
    LoadNum,
    /// `locals[b] <- consts[a]` (string constant).
    LoadStr,
    /// `locals[b] <- resolve_global(s)`.
    LoadGlobal,
    /// Reserved; a no-op in this spec.
    StoreGlobal,
    /// Print the highest non-nil slot, or `"nil"` if all are nil.
    Print,
    /// `locals[b] <- HostBridge.create_rule(consts[a])`; `b == -1` writes to
    /// the temp slot.
    Spawn,
    /// `locals[a] <- Nil`; `a == -1` means the last slot.
    Drop,
    /// Clear all locals and return.
    Ret,
    /// No effect.
    Nop,
}

/// One bytecode instruction: an opcode, two integer operands, and an
/// optional string payload (used only by `LOAD_GLOBAL`'s global name).
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub a: i64,
    pub b: i64,
    pub s: Option<String>,
}

impl Instruction {
    pub(crate) const fn new(opcode: Opcode, a: i64, b: i64) -> Self {
        Self { opcode, a, b, s: None }
    }

    pub(crate) fn with_name(opcode: Opcode, b: i64, name: String) -> Self {
        Self {
            opcode,
            a: 0,
            b,
            s: Some(name),
        }
    }
}

/// A compiled function: its instructions, constant pool, and local-slot
/// table. Slot `0` is always `_tmp` (spec.md §3.3).
///
/// `locals` is a `SmallVec` rather than a plain `Vec`: most handlers
/// declare only a handful of locals, so the common case never allocates.
#[derive(Debug, Clone, Default)]
pub struct ByteFunc {
    pub code: Vec<Instruction>,
    pub consts: Vec<Value>,
    pub locals: SmallVec<[String; 4]>,
}

impl ByteFunc {
    /// A fresh function with only the reserved `_tmp` slot allocated.
    pub(crate) fn new() -> Self {
        Self {
            code: Vec::new(),
            consts: Vec::new(),
            locals: smallvec::smallvec![TMP_SLOT_NAME.to_owned()],
        }
    }
}

/// A compiled module: a name plus its handlers, addressed both by name and
/// by index (spec.md §3.3).
#[derive(Debug, Clone, Default)]
pub struct ByteModule {
    pub name: String,
    pub funcs: Vec<ByteFunc>,
    handler_index: IndexMap<String, usize>,
}

impl ByteModule {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            funcs: Vec::new(),
            handler_index: IndexMap::new(),
        }
    }

    pub(crate) fn push_handler(&mut self, name: String, func: ByteFunc) {
        let idx = self.funcs.len();
        self.funcs.push(func);
        self.handler_index.insert(name, idx);
    }

    /// Looks up a handler's index by name.
    #[must_use]
    pub fn handler_index(&self, name: &str) -> Option<usize> {
        self.handler_index.get(name).copied()
    }

    /// The function at `idx`, if in range.
    #[must_use]
    pub fn func(&self, idx: usize) -> Option<&ByteFunc> {
        self.funcs.get(idx)
    }
}

/// A compiled unit: wraps exactly one [`ByteModule`] (spec.md §3.3).
#[derive(Debug, Clone, Default)]
pub struct CompiledUnit {
    pub module: ByteModule,
}

/// A compile-time failure: an unsupported construct in the minimal opcode
/// lowering (spec.md §4.3, §7 item 3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub message: String,
    pub unit: String,
    pub handler: String,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (in {}.{})", self.message, self.unit, self.handler)
    }
}

impl std::error::Error for CompileError {}
