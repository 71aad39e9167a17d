//! The stack-free frame interpreter (spec.md §4.5).
//!
//! A handler's locals live in a flat `Vec<Value>` indexed by slot; there is
//! no operand stack. Dispatch never suspends, so a frame's entire lifetime
//! is a single synchronous call into [`crate::host::HostBridge`]. No path
//! through this module panics on malformed bytecode (spec.md §7 item 5):
//! out-of-range operands are logged and the instruction is skipped.

use std::fmt;

use crate::{
    bytecode::{ByteFunc, Opcode, TMP_SLOT},
    host::HostBridge,
    io::PrintWriter,
    module::Module,
    value::Value,
};

/// A fatal VM failure. Reserved for a host function raising mid-execution
/// (spec.md §7 item 6); the current minimal opcode set never calls into a
/// host function from inside a frame, so no path produces this today, but
/// [`execute_handler_idx`] keeps the fallible signature so a future opcode
/// that does call the host bridge can propagate one without an API break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunError {
    pub message: String,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RunError {}

/// One activation of a [`ByteFunc`]: its local slots plus a program counter.
struct Frame {
    locals: Vec<Value>,
    pc: usize,
}

impl Frame {
    fn new(func: &ByteFunc) -> Self {
        Self {
            locals: vec![Value::Nil; func.locals.len()],
            pc: 0,
        }
    }

    /// Resolves a `LOAD_*`/`SPAWN` slot operand. A negative operand means
    /// the reserved temp slot (spec.md §3.3: "`b=-1` writes to tmp").
    fn resolve_slot(&self, idx: i64) -> Option<usize> {
        if idx < 0 {
            return Some(TMP_SLOT);
        }
        let idx = idx as usize;
        (idx < self.locals.len()).then_some(idx)
    }

    /// Resolves a `DROP` slot operand. A negative operand means the *last*
    /// slot (spec.md §3.3: "`a`=slot, or `-1` meaning last"), which is a
    /// different slot from `SPAWN`'s `-1` whenever a handler has any named
    /// local beyond `_tmp` -- confirmed by `original_source/src/vm.cpp`'s
    /// `OP_DROP` case, which indexes `frame.locals[size-1]` for `-1`.
    fn resolve_drop_slot(&self, idx: i64) -> Option<usize> {
        if idx < 0 {
            return self.locals.len().checked_sub(1);
        }
        let idx = idx as usize;
        (idx < self.locals.len()).then_some(idx)
    }

    fn write_slot(&mut self, idx: i64, value: Value, context: &str) {
        match self.resolve_slot(idx) {
            Some(slot) => self.locals[slot] = value,
            None => log::warn!("{context}: slot index {idx} out of range, write ignored"),
        }
    }

    fn drop_slot(&mut self, idx: i64) {
        match self.resolve_drop_slot(idx) {
            Some(slot) => self.locals[slot] = Value::Nil,
            None => log::warn!("DROP: slot index {idx} out of range, write ignored"),
        }
    }
}

/// Looks up `name` in `module` and runs it, or logs a dispatch miss and
/// returns without fault (spec.md §4.5, §7 item 4).
///
/// # Errors
/// See [`RunError`].
pub fn execute_handler(module: &Module, bridge: &HostBridge, out: &dyn PrintWriter, name: &str) -> Result<(), RunError> {
    match module.bytemodule().handler_index(name) {
        Some(idx) => execute_handler_idx(module, bridge, out, idx),
        None => {
            log::warn!("dispatch miss: unit '{}' has no handler named '{name}'", module.name());
            Ok(())
        }
    }
}

/// Runs the handler at `idx` in `module`, or logs a dispatch miss and
/// returns without fault if `idx` is out of range (spec.md §4.5).
///
/// Increments `module`'s `active_calls` before the first instruction runs
/// and decrements it on every exit path, including an early error, via a
/// drop guard (spec.md §3.6, §7 item 6, property P6).
///
/// # Errors
/// See [`RunError`].
pub fn execute_handler_idx(module: &Module, bridge: &HostBridge, out: &dyn PrintWriter, idx: usize) -> Result<(), RunError> {
    let Some(func) = module.bytemodule().func(idx) else {
        log::warn!("dispatch miss: unit '{}' has no handler at index {idx}", module.name());
        return Ok(());
    };

    let _guard = module.enter_call();
    run_frame(func, bridge, out)
}

fn run_frame(func: &ByteFunc, bridge: &HostBridge, out: &dyn PrintWriter) -> Result<(), RunError> {
    let mut frame = Frame::new(func);

    loop {
        // Falling off the end of the instruction stream is cleanup-
        // equivalent to an explicit RET (spec.md §4.5 item 6).
        let Some(instr) = func.code.get(frame.pc) else {
            return Ok(());
        };
        frame.pc += 1;

        match instr.opcode {
            Opcode::LoadNum | Opcode::LoadStr => match func.consts.get(instr.a as usize) {
                Some(value) => frame.write_slot(instr.b, value.clone(), "LOAD"),
                None => log::warn!("LOAD: const index {} out of range, instruction skipped", instr.a),
            },
            Opcode::LoadGlobal => {
                let Some(name) = instr.s.as_deref() else {
                    log::warn!("LOAD_GLOBAL missing its name operand, instruction skipped");
                    continue;
                };
                let value = bridge.resolve_global(name);
                frame.write_slot(instr.b, value, "LOAD_GLOBAL");
            }
            Opcode::StoreGlobal => {
                // Reserved; a no-op in this spec (spec.md §3.3).
            }
            Opcode::Print => print_highest_non_nil(&frame.locals, out),
            Opcode::Spawn => match func.consts.get(instr.a as usize) {
                Some(Value::String(literal)) => {
                    let rule = bridge.create_rule(literal);
                    frame.write_slot(instr.b, Value::Rule(rule), "SPAWN");
                }
                Some(_) => log::warn!("SPAWN: const index {} is not a string, instruction skipped", instr.a),
                None => log::warn!("SPAWN: const index {} out of range, instruction skipped", instr.a),
            },
            Opcode::Drop => frame.drop_slot(instr.a),
            Opcode::Ret => return Ok(()),
            Opcode::Nop => {}
        }
    }
}

/// Scans locals from the highest slot down and prints the first non-nil
/// value, or `"nil"` if every slot is nil (spec.md §4.5's deliberately
/// preserved quirk -- see the Open Question in spec.md §9).
fn print_highest_non_nil(locals: &[Value], out: &dyn PrintWriter) {
    let value = locals.iter().rev().find(|v| !v.is_nil());
    match value {
        Some(v) => out.print(&v.to_string()),
        None => out.print("nil"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bytecode::Instruction, bytecode::ByteModule, host::HostBridge, io::CollectStringPrint};

    fn bridge() -> HostBridge {
        HostBridge::new()
    }

    fn module_with(func: ByteFunc) -> Module {
        let mut bm = ByteModule::new("Test".to_owned());
        bm.push_handler("H".to_owned(), func);
        Module::new("Test".to_owned(), bm)
    }

    #[test]
    fn load_num_then_print_emits_the_number() {
        let mut func = ByteFunc::new();
        func.consts.push(Value::Number(42.0));
        func.code.push(Instruction::new(Opcode::LoadNum, 0, TMP_SLOT as i64));
        func.code.push(Instruction::new(Opcode::Print, 0, 0));
        func.code.push(Instruction::new(Opcode::Ret, 0, 0));

        let module = module_with(func);
        let out = CollectStringPrint::new();
        execute_handler_idx(&module, &bridge(), &out, 0).unwrap();
        assert_eq!(out.take(), vec!["42".to_owned()]);
        assert_eq!(module.active_calls(), 0);
    }

    #[test]
    fn print_scans_down_from_the_highest_slot() {
        let mut func = ByteFunc::new();
        func.locals.push("x".to_owned());
        func.locals.push("y".to_owned());
        func.consts.push(Value::string("hi"));
        func.code.push(Instruction::new(Opcode::LoadStr, 0, 1));
        func.code.push(Instruction::new(Opcode::Print, 0, 0));
        func.code.push(Instruction::new(Opcode::Ret, 0, 0));

        let module = module_with(func);
        let out = CollectStringPrint::new();
        execute_handler_idx(&module, &bridge(), &out, 0).unwrap();
        assert_eq!(out.take(), vec!["hi".to_owned()]);
    }

    #[test]
    fn print_with_all_slots_nil_prints_nil() {
        let mut func = ByteFunc::new();
        func.code.push(Instruction::new(Opcode::Print, 0, 0));
        func.code.push(Instruction::new(Opcode::Ret, 0, 0));

        let module = module_with(func);
        let out = CollectStringPrint::new();
        execute_handler_idx(&module, &bridge(), &out, 0).unwrap();
        assert_eq!(out.take(), vec!["nil".to_owned()]);
    }

    #[test]
    fn spawn_as_statement_writes_then_drops_the_temp_slot() {
        let mut func = ByteFunc::new();
        func.consts.push(Value::string("Widget"));
        func.code.push(Instruction::new(Opcode::Spawn, 0, -1));
        func.code.push(Instruction::new(Opcode::Drop, -1, 0));
        func.code.push(Instruction::new(Opcode::Ret, 0, 0));

        let module = module_with(func);
        let out = CollectStringPrint::new();
        execute_handler_idx(&module, &bridge(), &out, 0).unwrap();
    }

    /// `SPAWN -1` writes tmp (slot 0); `DROP -1` clears the *last* slot
    /// (spec.md §3.3, confirmed by `original_source/src/vm.cpp`'s
    /// `OP_DROP`) -- not the same slot whenever a named local exists. With
    /// locals `[_tmp, a]`, `a = 1; Spawn("r"); Print("done");` must drop
    /// slot 1 (`a`), leaving `PRINT`'s highest-non-nil scan to find
    /// `"done"` in `_tmp`, not the stale `1` in `a`.
    #[test]
    fn drop_minus_one_clears_the_last_slot_not_the_temp_slot() {
        use crate::{compiler::compile_unit, parser::Parser};

        let mut parser = Parser::new(r#"unit U { on E -> () a = 1; Spawn("r"); Print("done"); end }"#).unwrap();
        let program = parser.parse_program().unwrap();
        let compiled = compile_unit(&program.units[0]).unwrap();
        let func = &compiled.module.funcs[0];
        assert_eq!(func.locals.len(), 2);
        assert_eq!(func.locals[0], "_tmp");
        assert_eq!(func.locals[1], "a");

        let module = Module::new("U".to_owned(), compiled.module);
        let out = CollectStringPrint::new();
        execute_handler_idx(&module, &bridge(), &out, 0).unwrap();
        assert_eq!(out.take(), vec!["done".to_owned()]);
    }

    #[test]
    fn out_of_range_constant_index_is_skipped_not_a_panic() {
        let mut func = ByteFunc::new();
        func.code.push(Instruction::new(Opcode::LoadNum, 99, TMP_SLOT as i64));
        func.code.push(Instruction::new(Opcode::Ret, 0, 0));

        let module = module_with(func);
        let out = CollectStringPrint::new();
        execute_handler_idx(&module, &bridge(), &out, 0).unwrap();
    }

    #[test]
    fn falling_off_the_end_behaves_like_an_implicit_ret() {
        let mut func = ByteFunc::new();
        func.consts.push(Value::Number(1.0));
        func.code.push(Instruction::new(Opcode::LoadNum, 0, TMP_SLOT as i64));
        // no RET

        let module = module_with(func);
        let out = CollectStringPrint::new();
        execute_handler_idx(&module, &bridge(), &out, 0).unwrap();
        assert_eq!(module.active_calls(), 0);
    }

    #[test]
    fn load_global_assigns_nil_for_an_unregistered_name() {
        let mut func = ByteFunc::new();
        func.code
            .push(Instruction::with_name(Opcode::LoadGlobal, TMP_SLOT as i64, "g".to_owned()));
        func.code.push(Instruction::new(Opcode::Print, 0, 0));
        func.code.push(Instruction::new(Opcode::Ret, 0, 0));

        let module = module_with(func);
        let out = CollectStringPrint::new();
        execute_handler_idx(&module, &bridge(), &out, 0).unwrap();
        assert_eq!(out.take(), vec!["nil".to_owned()]);
    }

    #[test]
    fn dispatch_miss_by_name_is_logged_and_returns_ok() {
        let module = module_with(ByteFunc::new());
        let out = CollectStringPrint::new();
        execute_handler(&module, &bridge(), &out, "NoSuchHandler").unwrap();
    }

    #[test]
    fn dispatch_miss_by_index_is_logged_and_returns_ok() {
        let module = module_with(ByteFunc::new());
        let out = CollectStringPrint::new();
        execute_handler_idx(&module, &bridge(), &out, 77).unwrap();
    }
}
