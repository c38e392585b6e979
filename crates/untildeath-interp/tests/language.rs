//! End-to-end tests for the evaluator's language-level guarantees: scoping,
//! closures, short-circuit evaluation, entity monotonicity, and composite
//! entity laws. Each test drives a fresh `Interpreter` directly rather than
//! through the CLI, so it can inspect scope bindings without going through
//! stdout.

use std::rc::Rc;

use untildeath_core::ast::Expr;
use untildeath_core::parse;
use untildeath_interp::entity::{CompositeOp, Entity, EntityKind};
use untildeath_interp::Interpreter;

async fn run_src(interpreter: &Interpreter, src: &str) {
    let program = parse(src).unwrap();
    for stmt in &program.statements {
        interpreter.execute(stmt).await.unwrap();
    }
}

fn ident(name: &str) -> Expr {
    Expr::Identifier {
        name: name.to_string(),
        pos: untildeath_core::ast::Pos { line: 0, column: 0 },
    }
}

#[tokio::test]
async fn short_circuit_and_skips_right_operand() {
    let interpreter = Interpreter::new(None, Vec::new());
    run_src(
        &interpreter,
        r#"
        BIRTH called WITH DEAD;
        RITE mark() { called = ALIVE; BEQUEATH ALIVE; }
        BIRTH result WITH DEAD AND mark();
        "#,
    )
    .await;
    let called = interpreter.evaluate(&ident("called")).await.unwrap();
    assert_eq!(called, untildeath_core::value::Value::Bool(false));
}

#[tokio::test]
async fn short_circuit_or_skips_right_operand() {
    let interpreter = Interpreter::new(None, Vec::new());
    run_src(
        &interpreter,
        r#"
        BIRTH called WITH DEAD;
        RITE mark() { called = ALIVE; BEQUEATH ALIVE; }
        BIRTH result WITH ALIVE OR mark();
        "#,
    )
    .await;
    let called = interpreter.evaluate(&ident("called")).await.unwrap();
    assert_eq!(called, untildeath_core::value::Value::Bool(false));
}

#[tokio::test]
async fn rite_body_scope_does_not_leak_into_caller() {
    let interpreter = Interpreter::new(None, Vec::new());
    run_src(
        &interpreter,
        r#"
        BIRTH x WITH 1;
        RITE shadow() { BIRTH x WITH 2; BEQUEATH x; }
        BIRTH inner WITH shadow();
        "#,
    )
    .await;
    let x = interpreter.evaluate(&ident("x")).await.unwrap();
    let inner = interpreter.evaluate(&ident("inner")).await.unwrap();
    assert_eq!(x, untildeath_core::value::Value::Int(1));
    assert_eq!(inner, untildeath_core::value::Value::Int(2));
}

#[tokio::test]
async fn closure_captures_defining_scope() {
    let interpreter = Interpreter::new(None, Vec::new());
    run_src(
        &interpreter,
        r#"
        RITE makeAdder(n) {
            RITE adder(x) { BEQUEATH x + n; }
            BEQUEATH adder;
        }
        BIRTH addFive WITH makeAdder(5);
        BIRTH result WITH addFive(10);
        "#,
    )
    .await;
    let result = interpreter.evaluate(&ident("result")).await.unwrap();
    assert_eq!(result, untildeath_core::value::Value::Int(15));
}

#[tokio::test]
async fn attempt_salvage_binds_error_message_in_its_own_scope() {
    let interpreter = Interpreter::new(None, Vec::new());
    run_src(
        &interpreter,
        r#"
        BIRTH caught WITH "";
        ATTEMPT {
            CONDEMN "oops";
        } SALVAGE e {
            caught = e;
        }
        "#,
    )
    .await;
    let caught = interpreter.evaluate(&ident("caught")).await.unwrap();
    assert_eq!(caught, untildeath_core::value::Value::str("oops"));
    assert!(!interpreter.global_scope.borrow().has("e"));
}

#[tokio::test]
async fn entity_death_is_monotonic() {
    let entity = Entity::new("t", EntityKind::Timer { duration_ms: 1 });
    assert!(entity.is_alive());
    entity.die();
    assert!(entity.is_dead());
    entity.wait_for_death().await;
    entity.die();
    assert!(entity.is_dead());
}

#[tokio::test]
async fn composite_and_dies_only_after_both_children() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let a = Entity::new("a", EntityKind::This);
            let b = Entity::new("b", EntityKind::This);
            let composite = Entity::new(
                "(a && b)",
                EntityKind::Composite {
                    op: CompositeOp::And,
                    children: vec![Rc::clone(&a), Rc::clone(&b)],
                },
            );

            let handle = tokio::task::spawn_local(untildeath_interp::entity::run_lifecycle(
                Rc::clone(&composite),
            ));
            tokio::task::yield_now().await;
            assert!(composite.is_alive());

            a.die();
            tokio::task::yield_now().await;
            assert!(composite.is_alive());

            b.die();
            handle.await.unwrap();
            assert!(composite.is_dead());
        })
        .await;
}

#[tokio::test]
async fn composite_or_dies_as_soon_as_either_child_dies() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let a = Entity::new("a", EntityKind::This);
            let b = Entity::new("b", EntityKind::This);
            let composite = Entity::new(
                "(a || b)",
                EntityKind::Composite {
                    op: CompositeOp::Or,
                    children: vec![Rc::clone(&a), Rc::clone(&b)],
                },
            );
            let handle = tokio::task::spawn_local(untildeath_interp::entity::run_lifecycle(
                Rc::clone(&composite),
            ));
            a.die();
            handle.await.unwrap();
            assert!(composite.is_dead());
            assert!(b.is_alive());
        })
        .await;
}

#[tokio::test]
async fn composite_not_always_dies_within_one_tick() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let a = Entity::new("a", EntityKind::This);
            let composite = Entity::new(
                "(!a)",
                EntityKind::Composite {
                    op: CompositeOp::Not,
                    children: vec![Rc::clone(&a)],
                },
            );
            let handle = tokio::task::spawn_local(untildeath_interp::entity::run_lifecycle(
                Rc::clone(&composite),
            ));
            handle.await.unwrap();
            assert!(composite.is_dead());
            assert!(a.is_alive());
        })
        .await;
}

#[tokio::test]
async fn circular_import_is_detected() {
    let dir = std::env::temp_dir().join(format!("untildeath-circular-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let a_path = dir.join("a.~ATH");
    let b_path = dir.join("b.~ATH");
    std::fs::write(&a_path, r#"import watcher B("b.~ATH");"#).unwrap();
    std::fs::write(&b_path, r#"import watcher A("a.~ATH");"#).unwrap();

    let program = parse(r#"import watcher A("a.~ATH");"#).unwrap();
    let interpreter = Interpreter::new(Some(a_path.clone()), Vec::new());
    let local = tokio::task::LocalSet::new();
    let result = local.run_until(interpreter.run(&program)).await;

    std::fs::remove_dir_all(&dir).ok();

    let err = result.unwrap_err();
    match err {
        untildeath_interp::EvalSignal::Error(untildeath_interp::AthError::Runtime { message, .. }) => {
            assert!(message.contains("Circular import"), "message was: {message}");
        }
        other => panic!("expected a runtime error, got {other:?}"),
    }
}

#[tokio::test]
async fn reimporting_a_module_is_idempotent() {
    let dir = std::env::temp_dir().join(format!("untildeath-reimport-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let module_path = dir.join("lib.~ATH");
    std::fs::write(&module_path, "BIRTH x WITH 7;").unwrap();

    let program = parse(
        r#"
        import watcher W("lib.~ATH");
        BIRTH first WITH W.x;
        import watcher W("lib.~ATH");
        BIRTH second WITH W.x;
        "#,
    )
    .unwrap();

    let main_path = dir.join("main.~ATH");
    let interpreter = Interpreter::new(Some(main_path), Vec::new());
    let local = tokio::task::LocalSet::new();
    local.run_until(interpreter.run(&program)).await.unwrap();

    std::fs::remove_dir_all(&dir).ok();

    let first = interpreter.evaluate(&ident("first")).await.unwrap();
    let second = interpreter.evaluate(&ident("second")).await.unwrap();
    assert_eq!(first, untildeath_core::value::Value::Int(7));
    assert_eq!(second, untildeath_core::value::Value::Int(7));
}
