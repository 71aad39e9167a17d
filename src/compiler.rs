//! The bytecode compiler (spec.md §4.3).
//!
//! Lowers each [`crate::ast::UnitDecl`] into a [`CompiledUnit`]. The minimal
//! opcode set only covers a small slice of the parser's full grammar
//! (literal/ident/`Spawn`/`Print` assignments and statements); everything
//! else is a documented extension point and raises [`CompileError`] rather
//! than silently dropping it, per spec.md §4.3's closing paragraph.

use std::collections::HashMap;

use crate::{
    ast::{Expr, HandlerDecl, Stmt, UnitDecl},
    bytecode::{ByteFunc, ByteModule, CompileError, CompiledUnit, Instruction, Opcode, TMP_SLOT},
    value::Value,
};

/// Compiles a single unit into a [`CompiledUnit`].
///
/// # Errors
/// Returns [`CompileError`] on the first handler statement the minimal
/// opcode lowering cannot represent.
pub fn compile_unit(unit: &UnitDecl) -> Result<CompiledUnit, CompileError> {
    let mut module = ByteModule::new(unit.name.clone());
    for handler in &unit.handlers {
        let func = compile_handler(&unit.name, handler)?;
        module.push_handler(handler.name.clone(), func);
    }
    Ok(CompiledUnit { module })
}

struct FuncBuilder {
    func: ByteFunc,
    slots: HashMap<String, usize>,
}

impl FuncBuilder {
    fn new() -> Self {
        let func = ByteFunc::new();
        let mut slots = HashMap::new();
        slots.insert(crate::bytecode::TMP_SLOT_NAME.to_owned(), TMP_SLOT);
        Self { func, slots }
    }

    /// Reserves a fresh slot for `name` on first mention; re-assignment
    /// reuses the existing slot (spec.md §4.3).
    fn slot_for(&mut self, name: &str) -> usize {
        if let Some(&slot) = self.slots.get(name) {
            return slot;
        }
        let slot = self.func.locals.len();
        self.func.locals.push(name.to_owned());
        self.slots.insert(name.to_owned(), slot);
        slot
    }

    fn push_const(&mut self, value: Value) -> i64 {
        let idx = self.func.consts.len();
        self.func.consts.push(value);
        idx as i64
    }

    fn emit(&mut self, instr: Instruction) {
        self.func.code.push(instr);
    }
}

fn compile_handler(unit_name: &str, handler: &HandlerDecl) -> Result<ByteFunc, CompileError> {
    let mut b = FuncBuilder::new();
    let err = |message: &str| CompileError {
        message: message.to_owned(),
        unit: unit_name.to_owned(),
        handler: handler.name.clone(),
    };

    for stmt in &handler.body {
        compile_stmt(&mut b, stmt, &err)?;
    }

    // Every local, slot 0 (`_tmp`) included, is dropped in ascending order,
    // then the function returns (spec.md §4.3).
    for slot in 0..b.func.locals.len() {
        b.emit(Instruction::new(Opcode::Drop, slot as i64, 0));
    }
    b.emit(Instruction::new(Opcode::Ret, 0, 0));

    Ok(b.func)
}

fn compile_stmt(
    b: &mut FuncBuilder,
    stmt: &Stmt,
    err: &impl Fn(&str) -> CompileError,
) -> Result<(), CompileError> {
    match stmt {
        Stmt::Assign { name, rhs } => compile_assign(b, name, rhs, err),
        Stmt::Expr(Expr::Call { callee_name, args }) if callee_name == "Spawn" => {
            compile_spawn_stmt(b, args, err)
        }
        Stmt::Expr(Expr::Call { callee_name, args }) if callee_name == "Print" => {
            compile_print_stmt(b, args, err)
        }
        Stmt::Expr(Expr::Call { callee_name, .. }) => Err(err(&format!(
            "unsupported call to '{callee_name}': only Spawn and Print are supported in the minimal core"
        ))),
        Stmt::LocalDecl { .. } => Err(err("local declarations are not supported by the minimal opcode lowering")),
        Stmt::If { .. } => Err(err("if statements are not supported by the minimal opcode lowering")),
        Stmt::While { .. } => Err(err("while loops are not supported by the minimal opcode lowering")),
        Stmt::Foreach { .. } => Err(err("foreach loops are not supported by the minimal opcode lowering")),
        Stmt::Return { .. } => Err(err("return statements are not supported by the minimal opcode lowering")),
        Stmt::Expr(_) => Err(err("unsupported expression statement")),
    }
}

fn compile_assign(
    b: &mut FuncBuilder,
    name: &str,
    rhs: &Expr,
    err: &impl Fn(&str) -> CompileError,
) -> Result<(), CompileError> {
    match rhs {
        Expr::Number(n) => {
            let slot = b.slot_for(name);
            let c = b.push_const(Value::Number(*n));
            b.emit(Instruction::new(Opcode::LoadNum, c, slot as i64));
        }
        Expr::String(s) => {
            let slot = b.slot_for(name);
            let c = b.push_const(Value::string(s.as_str()));
            b.emit(Instruction::new(Opcode::LoadStr, c, slot as i64));
        }
        Expr::Ident(global_name) => {
            let slot = b.slot_for(name);
            b.emit(Instruction::with_name(Opcode::LoadGlobal, slot as i64, global_name.clone()));
        }
        Expr::Call { callee_name, args } if callee_name == "Spawn" => {
            let literal = spawn_string_literal(args).ok_or_else(|| {
                err("Spawn requires exactly one string-literal argument")
            })?;
            let slot = b.slot_for(name);
            let c = b.push_const(Value::string(literal));
            b.emit(Instruction::new(Opcode::Spawn, c, slot as i64));
        }
        Expr::Call { callee_name, .. } if callee_name == "Print" => {
            return Err(err("cannot assign from Print"));
        }
        _ => return Err(err("unsupported right-hand side in assignment")),
    }
    Ok(())
}

fn compile_spawn_stmt(
    b: &mut FuncBuilder,
    args: &[Expr],
    err: &impl Fn(&str) -> CompileError,
) -> Result<(), CompileError> {
    let literal = spawn_string_literal(args).ok_or_else(|| err("Spawn requires exactly one string-literal argument"))?;
    let c = b.push_const(Value::string(literal));
    b.emit(Instruction::new(Opcode::Spawn, c, -1));
    b.emit(Instruction::new(Opcode::Drop, -1, 0));
    Ok(())
}

fn compile_print_stmt(
    b: &mut FuncBuilder,
    args: &[Expr],
    err: &impl Fn(&str) -> CompileError,
) -> Result<(), CompileError> {
    if args.len() != 1 {
        return Err(err("Print requires exactly one argument"));
    }
    match &args[0] {
        Expr::Number(n) => {
            let c = b.push_const(Value::Number(*n));
            b.emit(Instruction::new(Opcode::LoadNum, c, TMP_SLOT as i64));
        }
        Expr::String(s) => {
            let c = b.push_const(Value::string(s.as_str()));
            b.emit(Instruction::new(Opcode::LoadStr, c, TMP_SLOT as i64));
        }
        Expr::Ident(name) => {
            b.emit(Instruction::with_name(Opcode::LoadGlobal, TMP_SLOT as i64, name.clone()));
        }
        _ => return Err(err("Print's argument must be a number, string, or identifier")),
    }
    b.emit(Instruction::new(Opcode::Print, 0, 0));
    Ok(())
}

fn spawn_string_literal(args: &[Expr]) -> Option<&str> {
    match args {
        [Expr::String(s)] => Some(s.as_str()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn compile_src(src: &str) -> Result<CompiledUnit, CompileError> {
        let mut parser = Parser::new(src).expect("lex ok");
        let program = parser.parse_program().expect("parse ok");
        compile_unit(&program.units[0])
    }

    #[test]
    fn scenario_hello_world_compiles() {
        let unit = compile_src(r#"unit Main { on Start -> () Print("hi"); end }"#).unwrap();
        let func = &unit.module.funcs[0];
        assert!(func.code.iter().any(|i| i.opcode == Opcode::Print));
        assert!(func.code.last().unwrap().opcode == Opcode::Ret);
    }

    #[test]
    fn scenario_spawn_as_statement_drops_tmp() {
        let unit = compile_src(r#"unit U { on E -> () Spawn("X"); end }"#).unwrap();
        let func = &unit.module.funcs[0];
        let spawn = func.code.iter().find(|i| i.opcode == Opcode::Spawn).unwrap();
        assert_eq!(spawn.b, -1);
    }

    #[test]
    fn scenario_spawn_assigned_to_local_uses_its_slot() {
        let unit = compile_src(r#"unit U { on E -> () r = Spawn("X"); end }"#).unwrap();
        let func = &unit.module.funcs[0];
        let spawn = func.code.iter().find(|i| i.opcode == Opcode::Spawn).unwrap();
        assert_eq!(func.locals[spawn.b as usize], "r");
    }

    #[test]
    fn global_load_assigns_from_identifier() {
        let unit = compile_src(r#"unit U { on E -> () x = g; end }"#).unwrap();
        let func = &unit.module.funcs[0];
        let load = func.code.iter().find(|i| i.opcode == Opcode::LoadGlobal).unwrap();
        assert_eq!(load.s.as_deref(), Some("g"));
    }

    #[test]
    fn reassignment_reuses_the_existing_slot() {
        let unit = compile_src(r#"unit U { on E -> () x = 1; x = 2; end }"#).unwrap();
        let func = &unit.module.funcs[0];
        let loads: Vec<_> = func.code.iter().filter(|i| i.opcode == Opcode::LoadNum).collect();
        assert_eq!(loads[0].b, loads[1].b);
    }

    #[test]
    fn spawn_with_non_literal_argument_is_a_compile_error() {
        let err = compile_src(r#"unit U { on E -> () r = Spawn(g); end }"#).unwrap_err();
        assert!(err.message.contains("string-literal"));
    }

    #[test]
    fn assigning_from_print_is_a_compile_error() {
        let err = compile_src(r#"unit U { on E -> () r = Print("x"); end }"#).unwrap_err();
        assert!(err.message.contains("Print"));
    }

    #[test]
    fn unsupported_control_flow_is_a_compile_error() {
        let err = compile_src("unit U { on E -> () if true Print(\"x\"); end end }").unwrap_err();
        assert!(err.message.contains("not supported"));
    }

    #[test]
    fn every_local_gets_a_drop_before_ret() {
        let unit = compile_src(r#"unit U { on E -> () x = 1; y = "a"; end }"#).unwrap();
        let func = &unit.module.funcs[0];
        let drop_count = func.code.iter().filter(|i| i.opcode == Opcode::Drop).count();
        assert_eq!(drop_count, func.locals.len());
        assert_eq!(func.code.last().unwrap().opcode, Opcode::Ret);
    }
}
