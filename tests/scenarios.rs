//! End-to-end scenarios from spec.md §8, exercised through the public
//! embedding API (`Parser` → `compile_unit` → `Runtime` → `vm`).

use std::sync::Once;

use pretty_assertions::assert_eq;
use unitrun::{compile_unit, io::CollectStringPrint, vm, Expr, Module, Parser, Runtime, Stmt};

fn init_logging() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

fn install_source(runtime: &Runtime, unit_name: &str, src: &str) {
    let mut parser = Parser::new(src).expect("lex ok");
    let program = parser.parse_program().expect("parse ok");
    let unit = program.units.iter().find(|u| u.name == unit_name).expect("unit present");
    let compiled = compile_unit(unit).expect("compile ok");
    runtime.modules().install(Module::new(unit_name.to_owned(), compiled.module));
}

#[test]
fn scenario_1_hello_world_prints_hi() {
    init_logging();
    let runtime = Runtime::new();
    install_source(&runtime, "Main", r#"unit Main { on Start -> () Print("hi"); end }"#);

    let module = runtime.modules().get("Main").unwrap();
    let out = CollectStringPrint::new();
    vm::execute_handler(&module, runtime.bridge(), &out, "Start").unwrap();

    assert_eq!(out.take(), vec!["hi".to_owned()]);
}

#[test]
fn scenario_2_spawn_creates_exactly_one_rule_starting_at_one() {
    init_logging();
    let runtime = Runtime::new();
    install_source(&runtime, "U", r#"unit U { on E -> () r = Spawn("X"); end }"#);

    let module = runtime.modules().get("U").unwrap();
    let out = CollectStringPrint::new();
    vm::execute_handler(&module, runtime.bridge(), &out, "E").unwrap();

    // A fresh runtime's bridge starts its rule-id counter at 1 (spec.md §6.4);
    // the handler only spawns once, so the very next id minted is 2.
    let next = runtime.bridge().create_rule("X");
    assert_eq!(next.id(), 2);
}

#[test]
fn scenario_3_global_load_prints_nil() {
    init_logging();
    let runtime = Runtime::new();
    install_source(&runtime, "U", r#"unit U { on E -> () x = g; Print(x); end }"#);

    let module = runtime.modules().get("U").unwrap();
    let out = CollectStringPrint::new();
    vm::execute_handler(&module, runtime.bridge(), &out, "E").unwrap();

    assert_eq!(out.take(), vec!["nil".to_owned()]);
}

#[test]
fn scenario_5_concurrent_spawn_across_eight_threads_yields_contiguous_ids() {
    init_logging();
    let runtime = std::sync::Arc::new(Runtime::new());
    install_source(&runtime, "U", r#"unit U { on E -> () r = Spawn("X"); end }"#);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let runtime = runtime.clone();
            std::thread::spawn(move || {
                let module = runtime.modules().get("U").unwrap();
                let out = CollectStringPrint::new();
                for _ in 0..1000 {
                    vm::execute_handler(&module, runtime.bridge(), &out, "E").unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    // 8000 rules were minted across all threads; the next one issued is 8001.
    let next = runtime.bridge().create_rule("X");
    assert_eq!(next.id(), 8001);
}

#[test]
fn scenario_6_precedence_is_honored_by_the_parser() {
    // The minimal opcode set has no arithmetic opcodes (spec.md §4.3), so
    // "1 + 2 * 3 == 7" can only be checked at the parse layer here; an
    // extended VM evaluating it is out of this crate's scope.
    let parse = |src: &str| -> Expr {
        let mut parser = Parser::new(src).unwrap();
        let program = parser.parse_program().unwrap();
        let Stmt::LocalDecl { init, .. } = &program.units[0].handlers[0].body[0] else {
            panic!("expected a local decl");
        };
        init.clone().unwrap()
    };

    let a = parse("unit U { on E -> () local r = 1 + 2 * 3; end }");
    let Expr::Call { callee_name: a_op, args: a_args } = &a else {
        panic!("expected a call node");
    };
    assert_eq!(a_op, "+");
    assert!(matches!(&a_args[1], Expr::Call { callee_name, .. } if callee_name == "*"));

    let b = parse("unit U { on E -> () local r = 1 * 2 + 3; end }");
    let Expr::Call { callee_name: b_op, args: b_args } = &b else {
        panic!("expected a call node");
    };
    assert_eq!(b_op, "+");
    assert!(matches!(&b_args[0], Expr::Call { callee_name, .. } if callee_name == "*"));
}

#[test]
fn dispatch_miss_on_an_unknown_handler_name_is_non_fatal() {
    init_logging();
    let runtime = Runtime::new();
    install_source(&runtime, "U", r#"unit U { on E -> () Print("hi"); end }"#);

    let module = runtime.modules().get("U").unwrap();
    let out = CollectStringPrint::new();
    vm::execute_handler(&module, runtime.bridge(), &out, "NoSuchHandler").unwrap();
    assert!(out.take().is_empty());
}

#[test]
fn hot_swapping_a_module_is_immediately_visible_to_new_dispatches() {
    init_logging();
    let runtime = Runtime::new();
    install_source(&runtime, "U", r#"unit U { on E -> () Print("v1"); end }"#);
    install_source(&runtime, "U", r#"unit U { on E -> () Print("v2"); end }"#);

    let module = runtime.modules().get("U").unwrap();
    let out = CollectStringPrint::new();
    vm::execute_handler(&module, runtime.bridge(), &out, "E").unwrap();
    assert_eq!(out.take(), vec!["v2".to_owned()]);

    runtime.modules().tick_reclaim();
}
