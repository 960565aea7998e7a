use crate::{
    language::{
        ast::*,
        compiler::{CompileOptions, Compiler},
        errors::OutputError,
    },
    runtime::{ContextManager, Dispatch, RuntimeConfig, RuntimeError},
};
use inkwell::context::Context;
use std::{fs, sync::Arc, thread};
use tempfile::tempdir;

fn counter_program() -> Program {
    Program::new(vec![
        Statement::StructDef(StructDef::new("Counter", &[("int", "hits"), ("float", "ratio")])),
        Statement::FunctionDef(FunctionDef {
            ret: "float".into(),
            name: "score".into(),
            params: vec![Param::new("int", "hits")],
            body: Block::new(vec![
                Statement::StructDecl(StructDecl {
                    ty: "Counter".into(),
                    name: "c".into(),
                }),
                Statement::expr(Expr::assign(Expr::field(Expr::ident("c"), "hits"), Expr::ident("hits"))),
                Statement::Parallel(Block::new(vec![
                    Statement::var(
                        "float",
                        "half",
                        Some(Expr::binary(BinaryOp::Div, Expr::ident("hits"), Expr::Float(2.0))),
                    ),
                    Statement::var(
                        "int",
                        "double",
                        Some(Expr::binary(BinaryOp::Mul, Expr::ident("hits"), Expr::Int(2))),
                    ),
                ])),
                Statement::expr(Expr::assign(
                    Expr::field(Expr::ident("c"), "ratio"),
                    Expr::binary(BinaryOp::Add, Expr::ident("half"), Expr::ident("double")),
                )),
                Statement::ret(Some(Expr::field(Expr::ident("c"), "ratio"))),
            ]),
        }),
    ])
}

#[test]
fn compiled_units_are_written_as_ir_and_objects() {
    let context = Context::create();
    let mut compiler = Compiler::new(&context, CompileOptions::named("counter"));
    compiler.compile(&counter_program()).expect("program compiles");

    let dir = tempdir().expect("temp dir");
    let ir_path = dir.path().join("counter.ll");
    compiler.write_ir_to(&ir_path).expect("ir written");
    let ir = fs::read_to_string(&ir_path).expect("ir readable");
    assert!(ir.contains("; ModuleID = 'counter'"));
    assert!(ir.contains("define double @score(i64"));
    assert!(ir.contains("@__fork_stmt_1"));

    let object_path = dir.path().join("counter.o");
    compiler.write_object_to(&object_path).expect("object written");
    assert!(fs::metadata(&object_path).expect("object exists").len() > 0);
}

#[test]
fn failed_units_write_nothing() {
    let context = Context::create();
    let mut compiler = Compiler::new(&context, CompileOptions::default());
    let program = Program::new(vec![Statement::FunctionDef(FunctionDef {
        ret: "Missing".into(),
        name: "broken".into(),
        params: Vec::new(),
        body: Block::default(),
    })]);
    let errors = compiler.compile(&program).expect_err("unknown return type");
    assert_eq!(errors.len(), 1);

    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("broken.o");
    assert!(matches!(
        compiler.write_object_to(&path),
        Err(OutputError::Suppressed(1))
    ));
    assert!(!path.exists());
}

#[test]
fn concurrent_contexts_share_one_thread_budget() {
    let manager = Arc::new(ContextManager::new(RuntimeConfig::with_max_threads(2)));
    let workers: Vec<_> = (0..4_i64)
        .map(|seed| {
            let manager = manager.clone();
            thread::spawn(move || {
                let cid = manager.make_context();
                for id in 0..3 {
                    manager
                        .schedule(move || seed * 100 + id, id, cid)
                        .expect("scheduled");
                    assert!(manager.in_flight() <= manager.max_threads());
                }
                let results: Vec<i64> = (0..3)
                    .rev()
                    .map(|id| manager.reconcile(0_i64, 0, id, cid).expect("reconciled"))
                    .collect();
                manager.destroy_context(cid).expect("destroyed");
                results
            })
        })
        .collect();
    for (seed, worker) in workers.into_iter().enumerate() {
        let seed = seed as i64;
        assert_eq!(
            worker.join().expect("worker"),
            vec![seed * 100 + 2, seed * 100 + 1, seed * 100]
        );
    }
    assert_eq!(manager.in_flight(), 0);
}

#[test]
fn contexts_are_isolated() {
    let manager = ContextManager::new(RuntimeConfig::with_max_threads(1));
    let first = manager.make_context();
    let second = manager.make_context();
    assert_eq!(manager.schedule(|| 1.0_f64, 0, first), Ok(Dispatch::Threaded));
    assert_eq!(manager.schedule(|| 2.0_f64, 0, second), Ok(Dispatch::Deferred));
    assert_eq!(
        manager.destroy_context(second),
        Err(RuntimeError::OutstandingWork {
            cid: second,
            pending: 1
        })
    );
    assert_eq!(manager.reconcile(0.0, 0.0, 0, first), Ok(1.0));
    manager.destroy_context(first).expect("empty context");
    assert_eq!(
        manager.reconcile(0.0_f64, 0.0, 0, first),
        Err(RuntimeError::UnknownContext { cid: first })
    );
    assert_eq!(manager.reconcile(0.0_f64, 0.0, 0, second), Ok(2.0));
    manager.destroy_context(second).expect("drained context");
    assert_eq!(manager.in_flight(), 0);
}
