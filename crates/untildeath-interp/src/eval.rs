//! The tree-walking evaluator: statement execution and expression
//! evaluation over the AST, closures, scopes, and dynamic dispatch over
//! tagged values.

use crate::builtins;
use crate::entity::{run_lifecycle, CompositeOp, Entity, EntityKind};
use crate::error::{AthError, ControlFlow, EvalResult, EvalSignal};
use crate::hook::{EntitySnapshot, StepContext, StepDirective, StepHook};
use crate::module;
use crate::scheduler;
use async_recursion::async_recursion;
use indexmap::IndexMap;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::path::PathBuf;
use std::rc::{Rc, Weak};
use untildeath_core::ast::*;
use untildeath_core::scope::{Scope, ScopeRef, SetError};
use untildeath_core::value::{RiteDef as AstRiteDef, Value};

pub struct Interpreter {
    pub global_scope: ScopeRef,
    current_scope: RefCell<ScopeRef>,
    entities: RefCell<IndexMap<String, Rc<Entity>>>,
    branch_entities: RefCell<HashSet<String>>,
    this_entity: RefCell<Option<Rc<Entity>>>,
    pending_tasks: RefCell<Vec<tokio::task::JoinHandle<()>>>,
    source_file: Option<PathBuf>,
    import_stack: Vec<PathBuf>,
    step_hook: RefCell<Option<Rc<dyn StepHook>>>,
    stepping: Cell<bool>,
    /// A weak handle to this interpreter's own `Rc`, so branch tasks
    /// spawned onto the scheduler can hold a strong, `'static` reference
    /// back into the interpreter that spawned them.
    self_rc: RefCell<Weak<Interpreter>>,
}

impl Interpreter {
    pub fn new(source_file: Option<PathBuf>, import_stack: Vec<PathBuf>) -> Rc<Interpreter> {
        Rc::new_cyclic(|weak| {
            let global_scope = Scope::new_root();
            Interpreter {
                current_scope: RefCell::new(Rc::clone(&global_scope)),
                global_scope,
                entities: RefCell::new(IndexMap::new()),
                branch_entities: RefCell::new(HashSet::new()),
                this_entity: RefCell::new(None),
                pending_tasks: RefCell::new(Vec::new()),
                source_file,
                import_stack,
                step_hook: RefCell::new(None),
                stepping: Cell::new(false),
                self_rc: RefCell::new(weak.clone()),
            }
        })
    }

    pub fn set_step_hook(&self, hook: Rc<dyn StepHook>) {
        *self.step_hook.borrow_mut() = Some(hook);
        self.stepping.set(true);
    }

    fn rc(&self) -> Rc<Interpreter> {
        self.self_rc
            .borrow()
            .upgrade()
            .expect("interpreter dropped while a task still referenced it")
    }

    /// Creates the `THIS` entity if it doesn't already exist. `run` calls
    /// this itself; a REPL that executes statements one at a time outside
    /// `run` needs to call it once up front.
    pub fn ensure_this(&self) {
        if self.this_entity.borrow().is_some() {
            return;
        }
        let this = Entity::new("THIS", EntityKind::This);
        *self.this_entity.borrow_mut() = Some(Rc::clone(&this));
        self.entities.borrow_mut().insert("THIS".to_string(), this);
    }

    /// Runs a whole program: creates `THIS`, executes every top-level
    /// statement, warns if the program ended without `THIS.DIE()`, then
    /// tears down every remaining entity and waits for their tasks.
    pub async fn run(&self, program: &Program) -> EvalResult<()> {
        self.ensure_this();

        let result = self.exec_statements(&program.statements).await;

        if let Some(this) = self.this_entity.borrow().as_ref() {
            if this.is_alive() {
                eprintln!("Warning: Program ended without THIS.DIE();");
            }
        }

        for entity in self.entities.borrow().values() {
            entity.die();
        }
        let handles: Vec<_> = self.pending_tasks.borrow_mut().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }

        result
    }

    #[async_recursion(?Send)]
    pub async fn execute(&self, stmt: &Stmt) -> EvalResult<()> {
        if self.stepping.get() {
            let hook = self.step_hook.borrow().clone();
            if let Some(hook) = hook {
                let scope_guard = self.current_scope.borrow();
                let snapshot = self
                    .entities
                    .borrow()
                    .values()
                    .map(|e| EntitySnapshot {
                        name: e.name.clone(),
                        alive: e.is_alive(),
                    })
                    .collect();
                let ctx = StepContext {
                    node_kind: stmt.kind_name(),
                    pos: stmt.pos(),
                    scope: &scope_guard,
                    branch: scheduler::current_branch(),
                    entities: snapshot,
                };
                let directive = hook.on_step(&ctx);
                drop(scope_guard);
                match directive {
                    StepDirective::Step => {}
                    StepDirective::Run => self.stepping.set(false),
                    StepDirective::Quit => return Err(ControlFlow::DebuggerQuit.into()),
                }
            }
        }

        match stmt {
            Stmt::Import { .. } => self.exec_import(stmt).await,
            Stmt::Bifurcate { entity, branch1, branch2, pos } => {
                self.exec_bifurcate(entity, branch1, branch2, *pos)
            }
            Stmt::AthLoop { entity_expr, body, execute, pos } => {
                self.exec_ath_loop(entity_expr, body, execute, *pos).await
            }
            Stmt::Die { target, .. } => self.exec_die(target),
            Stmt::VarDecl { name, value, .. } => {
                let v = self.evaluate(value).await?;
                self.current_scope.borrow().borrow_mut().define(name, v, false);
                Ok(())
            }
            Stmt::ConstDecl { name, value, .. } => {
                let v = self.evaluate(value).await?;
                self.current_scope.borrow().borrow_mut().define(name, v, true);
                Ok(())
            }
            Stmt::Assignment { target, value, pos } => self.exec_assignment(target, value, *pos).await,
            Stmt::RiteDef { name, params, body, pos } => {
                let rite = Rc::new(AstRiteDef {
                    name: name.clone(),
                    params: params.clone(),
                    body: body.clone(),
                    closure: Rc::clone(&self.current_scope.borrow()),
                    pos: *pos,
                });
                self.current_scope
                    .borrow()
                    .borrow_mut()
                    .define(name, Value::Rite(rite), true);
                Ok(())
            }
            Stmt::Conditional { condition, then_branch, else_branch, .. } => {
                let cond = self.evaluate(condition).await?;
                if cond.truthy() {
                    self.exec_statements(then_branch).await
                } else if let Some(else_branch) = else_branch {
                    self.exec_statements(else_branch).await
                } else {
                    Ok(())
                }
            }
            Stmt::AttemptSalvage { attempt_body, error_name, salvage_body, .. } => {
                self.exec_attempt_salvage(attempt_body, error_name, salvage_body).await
            }
            Stmt::Condemn { message, pos } => {
                let v = self.evaluate(message).await?;
                Err(AthError::User { message: v.stringify(), pos: *pos }.into())
            }
            Stmt::Bequeath { value, .. } => {
                let v = match value {
                    Some(expr) => self.evaluate(expr).await?,
                    None => Value::Void,
                };
                Err(ControlFlow::Return(v).into())
            }
            Stmt::ExprStmt { expression, .. } => {
                self.evaluate(expression).await?;
                Ok(())
            }
        }
    }

    #[async_recursion(?Send)]
    async fn exec_statements(&self, statements: &[Stmt]) -> EvalResult<()> {
        for stmt in statements {
            self.execute(stmt).await?;
        }
        Ok(())
    }

    async fn exec_import(&self, stmt: &Stmt) -> EvalResult<()> {
        let Stmt::Import { entity_type, name, args, pos } = stmt else {
            unreachable!()
        };

        if let Some(old) = self.entities.borrow().get(name) {
            old.die();
        }

        let kind = match entity_type {
            EntityKindLiteral::Timer => {
                let Value::Int(ms) = self.evaluate(&args[0]).await? else {
                    return Err(AthError::runtime_at("Timer requires a duration", *pos).into());
                };
                if ms < 1 {
                    return Err(AthError::runtime_at(
                        format!("Timer duration must be at least 1ms (got {ms}ms)"),
                        *pos,
                    )
                    .into());
                }
                EntityKind::Timer { duration_ms: ms }
            }
            EntityKindLiteral::Process => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.evaluate(arg).await?);
                }
                if values.is_empty() {
                    return Err(AthError::runtime_at("Process requires at least a command", *pos).into());
                }
                let command = values[0].stringify();
                let args = values[1..].iter().map(Value::stringify).collect();
                EntityKind::Process { command, args }
            }
            EntityKindLiteral::Connection => {
                if args.len() != 2 {
                    return Err(AthError::runtime_at("Connection requires host and port", *pos).into());
                }
                let host = self.evaluate(&args[0]).await?;
                let port = self.evaluate(&args[1]).await?;
                let Value::Str(host) = host else {
                    return Err(AthError::runtime_at("Connection host must be a string", *pos).into());
                };
                let Value::Int(port) = port else {
                    return Err(AthError::runtime_at("Connection port must be an integer", *pos).into());
                };
                EntityKind::Connection { host: host.as_str().to_string(), port }
            }
            EntityKindLiteral::Watcher => {
                if args.len() != 1 {
                    return Err(AthError::runtime_at("Watcher requires a filepath", *pos).into());
                }
                let filepath = self.evaluate(&args[0]).await?;
                let Value::Str(filepath) = filepath else {
                    return Err(AthError::runtime_at("Watcher filepath must be a string", *pos).into());
                };
                let resolved = module::resolve_import_path(&filepath, self.source_file.as_deref());
                let kind = EntityKind::Watcher {
                    path: resolved.to_string_lossy().to_string(),
                    exports: RefCell::new(IndexMap::new()),
                    is_module: Cell::new(false),
                };
                if module::is_module_path(&resolved) {
                    self.load_module(&kind, &resolved, *pos).await?;
                }
                kind
            }
        };

        let entity = Entity::new(name.clone(), kind);
        self.entities.borrow_mut().insert(name.clone(), Rc::clone(&entity));

        let task_entity = Rc::clone(&entity);
        let handle = scheduler::spawn_local(async move { run_lifecycle(task_entity).await });
        entity.set_task(handle);
        Ok(())
    }

    async fn load_module(&self, kind: &EntityKind, resolved: &std::path::Path, pos: Pos) -> EvalResult<()> {
        let EntityKind::Watcher { exports, is_module, .. } = kind else {
            unreachable!()
        };

        if self.import_stack.contains(&resolved.to_path_buf()) {
            let mut chain: Vec<String> = self
                .import_stack
                .iter()
                .map(|p| p.to_string_lossy().to_string())
                .collect();
            chain.push(resolved.to_string_lossy().to_string());
            return Err(AthError::runtime_at(
                format!("Circular import detected: {}", chain.join(" -> ")),
                pos,
            )
            .into());
        }

        let source = std::fs::read_to_string(resolved).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AthError::runtime_at(format!("Module file not found: {}", resolved.display()), pos)
            } else {
                AthError::runtime_at(format!("Cannot read module file: {e}"), pos)
            }
        })?;

        let program = untildeath_core::parse(&source)
            .map_err(|e| AthError::runtime_at(format!("Error in module '{}': {e}", resolved.display()), pos))?;

        let mut child_import_stack = self.import_stack.clone();
        child_import_stack.push(resolved.to_path_buf());
        let child = Interpreter::new(Some(resolved.to_path_buf()), child_import_stack);

        child.run(&program).await?;

        let bindings = child.global_scope.borrow().all_own_bindings();
        *exports.borrow_mut() = bindings;
        is_module.set(true);
        Ok(())
    }

    fn exec_bifurcate(&self, entity: &str, branch1: &str, branch2: &str, pos: Pos) -> EvalResult<()> {
        if !self.entities.borrow().contains_key(entity) {
            return Err(AthError::runtime_at(
                format!("Cannot bifurcate unknown entity: {entity}"),
                pos,
            )
            .into());
        }
        let b1 = Entity::new(branch1.to_string(), EntityKind::Branch);
        let b2 = Entity::new(branch2.to_string(), EntityKind::Branch);
        self.entities.borrow_mut().insert(branch1.to_string(), b1);
        self.entities.borrow_mut().insert(branch2.to_string(), b2);
        self.branch_entities.borrow_mut().insert(branch1.to_string());
        self.branch_entities.borrow_mut().insert(branch2.to_string());
        Ok(())
    }

    #[async_recursion(?Send)]
    async fn exec_ath_loop(
        &self,
        entity_expr: &EntityExpr,
        body: &[Stmt],
        execute: &[Stmt],
        pos: Pos,
    ) -> EvalResult<()> {
        if let EntityExpr::Ident { name, .. } = entity_expr {
            if self.branch_entities.borrow().contains(name) {
                return self.exec_branch_mode(name, body, execute).await;
            }
        }

        let entity = self.resolve_entity_expr(entity_expr)?;
        entity.wait_for_death().await;

        let _ = pos;
        // EXEC runs on a freshly spawned task rather than inline, so a chain
        // of further `~ATH(...) { } EXECUTE(...)` doesn't grow this call's
        // stack without bound.
        let interp = self.rc();
        let execute = execute.to_vec();
        let handle = scheduler::spawn_local(async move { interp.exec_statements(&execute).await });
        match handle.await {
            Ok(result) => result,
            Err(join_err) => Err(AthError::runtime(format!("EXEC task panicked: {join_err}")).into()),
        }
    }

    async fn exec_branch_mode(&self, branch_name: &str, body: &[Stmt], execute: &[Stmt]) -> EvalResult<()> {
        let interp = self.rc();
        let branch_name = branch_name.to_string();
        let branch_entity = self
            .entities
            .borrow()
            .get(&branch_name)
            .cloned()
            .ok_or_else(|| AthError::runtime(format!("{branch_name} is not a branch entity")))?;
        let body = body.to_vec();
        let execute = execute.to_vec();

        let branch_for_task = Rc::clone(&branch_entity);
        let branch_name_for_task = branch_name.clone();
        let handle = scheduler::spawn_local(async move {
            let result = scheduler::with_branch(branch_name_for_task, async {
                let r = interp.exec_statements(&body).await;
                if r.is_ok() {
                    interp.exec_statements(&execute).await
                } else {
                    r
                }
            })
            .await;
            branch_for_task.die();
            if let Err(EvalSignal::Error(e)) = result {
                eprintln!("Uncaught error in branch: {}", e.message());
            }
        });
        self.pending_tasks.borrow_mut().push(handle);

        scheduler::yield_now().await;
        Ok(())
    }

    fn resolve_entity_expr(&self, expr: &EntityExpr) -> EvalResult<Rc<Entity>> {
        match expr {
            EntityExpr::Ident { name, pos } => self
                .entities
                .borrow()
                .get(name)
                .cloned()
                .ok_or_else(|| AthError::runtime_at(format!("Unknown entity: {name}"), *pos).into()),
            EntityExpr::And(l, r) => {
                let left = self.resolve_entity_expr(l)?;
                let right = self.resolve_entity_expr(r)?;
                Ok(self.spawn_composite(CompositeOp::And, vec![left, right]))
            }
            EntityExpr::Or(l, r) => {
                let left = self.resolve_entity_expr(l)?;
                let right = self.resolve_entity_expr(r)?;
                Ok(self.spawn_composite(CompositeOp::Or, vec![left, right]))
            }
            EntityExpr::Not(inner, _) => {
                let inner = self.resolve_entity_expr(inner)?;
                Ok(self.spawn_composite(CompositeOp::Not, vec![inner]))
            }
        }
    }

    fn spawn_composite(&self, op: CompositeOp, children: Vec<Rc<Entity>>) -> Rc<Entity> {
        let label = match op {
            CompositeOp::And => format!("({} && {})", children[0].name, children[1].name),
            CompositeOp::Or => format!("({} || {})", children[0].name, children[1].name),
            CompositeOp::Not => format!("(!{})", children[0].name),
        };
        let composite = Entity::new(label, EntityKind::Composite { op, children });
        let task_entity = Rc::clone(&composite);
        let handle = scheduler::spawn_local(async move { run_lifecycle(task_entity).await });
        composite.set_task(handle);
        composite
    }

    fn exec_die(&self, target: &DieTarget) -> EvalResult<()> {
        match target {
            DieTarget::Ident { name, pos } => {
                let entity = self
                    .entities
                    .borrow()
                    .get(name)
                    .cloned()
                    .ok_or_else(|| AthError::runtime_at(format!("Unknown entity: {name}"), *pos))?;
                entity.die();
                Ok(())
            }
            DieTarget::Pair { left, right, .. } => {
                self.exec_die(left)?;
                self.exec_die(right)
            }
        }
    }

    async fn exec_assignment(&self, target: &Expr, value: &Expr, pos: Pos) -> EvalResult<()> {
        let v = self.evaluate(value).await?;
        match target {
            Expr::Identifier { name, .. } => {
                let result = self.current_scope.borrow().borrow_mut().set(name, v);
                match result {
                    Ok(()) => Ok(()),
                    Err(SetError::Unbound) => {
                        Err(AthError::runtime_at(format!("Undefined variable: {name}"), pos).into())
                    }
                    Err(SetError::ReadOnly) => {
                        Err(AthError::runtime_at(format!("Cannot reassign constant: {name}"), pos).into())
                    }
                }
            }
            Expr::Index { object, index, .. } => {
                let obj = self.evaluate(object).await?;
                let idx = self.evaluate(index).await?;
                match obj {
                    Value::Array(arr) => {
                        let Value::Int(i) = idx else {
                            return Err(AthError::runtime_at("Array index must be an integer", pos).into());
                        };
                        let mut arr = arr.borrow_mut();
                        if i < 0 || i as usize >= arr.len() {
                            return Err(AthError::runtime_at(format!("Array index out of bounds: {i}"), pos).into());
                        }
                        arr[i as usize] = v;
                        Ok(())
                    }
                    Value::Map(m) => {
                        m.borrow_mut().insert(idx.stringify(), v);
                        Ok(())
                    }
                    _ => Err(AthError::runtime_at("Cannot index non-collection", pos).into()),
                }
            }
            Expr::Member { object, member, .. } => {
                let obj = self.evaluate(object).await?;
                match obj {
                    Value::Map(m) => {
                        m.borrow_mut().insert(member.clone(), v);
                        Ok(())
                    }
                    _ => Err(AthError::runtime_at("Cannot access member of non-map", pos).into()),
                }
            }
            _ => Err(AthError::runtime_at("Invalid assignment target", pos).into()),
        }
    }

    async fn exec_attempt_salvage(
        &self,
        attempt_body: &[Stmt],
        error_name: &str,
        salvage_body: &[Stmt],
    ) -> EvalResult<()> {
        match self.exec_statements(attempt_body).await {
            Err(EvalSignal::Error(e)) => {
                let parent = self.current_scope.borrow().clone();
                let child = Scope::new_child(&parent);
                let outer = self.current_scope.replace(child);
                self.current_scope
                    .borrow()
                    .borrow_mut()
                    .define(error_name, Value::str(e.message()), false);
                let result = self.exec_statements(salvage_body).await;
                *self.current_scope.borrow_mut() = outer;
                result
            }
            other => other,
        }
    }

    #[async_recursion(?Send)]
    pub async fn evaluate(&self, expr: &Expr) -> EvalResult<Value> {
        match expr {
            Expr::Literal { value, .. } => Ok(literal_to_value(value)),
            Expr::Identifier { name, pos } => self.eval_identifier(name, *pos),
            Expr::Binary { op, left, right, .. } => self.eval_binary(op, left, right, expr.pos()).await,
            Expr::Unary { op, operand, pos } => self.eval_unary(op, operand, *pos).await,
            Expr::Call { callee, args, pos } => self.eval_call(callee, args, *pos).await,
            Expr::Index { object, index, pos } => self.eval_index(object, index, *pos).await,
            Expr::Member { object, member, pos } => self.eval_member(object, member, *pos).await,
            Expr::ArrayLiteral { elements, .. } => {
                let mut values = Vec::with_capacity(elements.len());
                for e in elements {
                    values.push(self.evaluate(e).await?);
                }
                Ok(Value::array(values))
            }
            Expr::MapLiteral { entries, .. } => {
                let mut map = IndexMap::new();
                for (key, value) in entries {
                    map.insert(key.clone(), self.evaluate(value).await?);
                }
                Ok(Value::map(map))
            }
        }
    }

    /// User bindings shadow builtin names, which in turn shadow a same-named
    /// module-watcher entity reference.
    fn eval_identifier(&self, name: &str, pos: Pos) -> EvalResult<Value> {
        if name == "THIS" {
            return Ok(Value::Entity("THIS".to_string()));
        }
        if self.current_scope.borrow().borrow().has(name) {
            return Ok(self.current_scope.borrow().borrow().get(name).unwrap());
        }
        if let Some(canonical) = builtins::canonical_name(name) {
            return Ok(Value::Builtin(canonical));
        }
        if let Some(entity) = self.entities.borrow().get(name) {
            if let EntityKind::Watcher { is_module, .. } = &entity.kind {
                if is_module.get() {
                    return Ok(Value::Entity(name.to_string()));
                }
            }
        }
        Err(AthError::runtime_at(format!("Undefined variable: {name}"), pos).into())
    }

    async fn eval_binary(&self, op: &str, left: &Expr, right: &Expr, pos: Pos) -> EvalResult<Value> {
        if op == "AND" {
            let l = self.evaluate(left).await?;
            if !l.truthy() {
                return Ok(l);
            }
            return self.evaluate(right).await;
        }
        if op == "OR" {
            let l = self.evaluate(left).await?;
            if l.truthy() {
                return Ok(l);
            }
            return self.evaluate(right).await;
        }

        let l = self.evaluate(left).await?;
        let r = self.evaluate(right).await?;
        eval_binary_values(op, &l, &r, pos)
    }

    async fn eval_unary(&self, op: &str, operand: &Expr, pos: Pos) -> EvalResult<Value> {
        let v = self.evaluate(operand).await?;
        match op {
            "NOT" => Ok(Value::Bool(!v.truthy())),
            "-" => match v {
                Value::Int(i) => Ok(Value::Int(-i)),
                Value::Float(f) => Ok(Value::Float(-f)),
                _ => Err(AthError::runtime_at(format!("Cannot negate {}", v.stringify()), pos).into()),
            },
            "~" => match v {
                Value::Int(i) => Ok(Value::Int(!i)),
                _ => Err(AthError::runtime_at("Bitwise NOT expects integer", pos).into()),
            },
            other => Err(AthError::runtime_at(format!("Unknown unary operator: {other}"), pos).into()),
        }
    }

    async fn eval_call(&self, callee: &Expr, args: &[Expr], pos: Pos) -> EvalResult<Value> {
        let direct_builtin = match callee {
            Expr::Identifier { name, .. } if !self.shadows(name) => builtins::lookup(name),
            _ => None,
        };

        let mut values = Vec::with_capacity(args.len());
        for a in args {
            values.push(self.evaluate(a).await?);
        }

        let wrap_pos = |e: EvalSignal| match e {
            EvalSignal::Error(AthError::Runtime { message, .. }) => {
                EvalSignal::Error(AthError::runtime_at(message, pos))
            }
            other => other,
        };

        if let Some(func) = direct_builtin {
            return func(&values).map_err(wrap_pos);
        }

        let callee_val = self.evaluate(callee).await?;
        match callee_val {
            Value::Builtin(name) => {
                let func = builtins::lookup(name)
                    .ok_or_else(|| AthError::runtime_at(format!("Cannot call {name}"), pos))?;
                func(&values).map_err(wrap_pos)
            }
            Value::Rite(rite) => self.call_rite(&rite, values, pos).await,
            other => Err(AthError::runtime_at(format!("Cannot call {}", other.stringify()), pos).into()),
        }
    }

    /// True if `name` is shadowed by a user binding, so a same-named
    /// builtin must not be dispatched directly.
    fn shadows(&self, name: &str) -> bool {
        self.current_scope.borrow().borrow().has(name)
    }

    #[async_recursion(?Send)]
    async fn call_rite(&self, rite: &AstRiteDef, args: Vec<Value>, pos: Pos) -> EvalResult<Value> {
        if args.len() != rite.params.len() {
            return Err(AthError::runtime_at(
                format!(
                    "Rite '{}' expects {} arguments, got {}",
                    rite.name,
                    rite.params.len(),
                    args.len()
                ),
                pos,
            )
            .into());
        }

        let outer = self.current_scope.replace(Scope::new_child(&rite.closure));
        for (param, arg) in rite.params.iter().zip(args) {
            self.current_scope.borrow().borrow_mut().define(param, arg, false);
        }

        let result = self.exec_statements(&rite.body).await;
        *self.current_scope.borrow_mut() = outer;

        match result {
            Ok(()) => Ok(Value::Void),
            Err(EvalSignal::Control(ControlFlow::Return(v))) => Ok(v),
            Err(other) => Err(other),
        }
    }

    async fn eval_index(&self, object: &Expr, index: &Expr, pos: Pos) -> EvalResult<Value> {
        let obj = self.evaluate(object).await?;
        let idx = self.evaluate(index).await?;
        match obj {
            Value::Array(arr) => {
                let Value::Int(i) = idx else {
                    return Err(AthError::runtime_at("Array index must be an integer", pos).into());
                };
                let arr = arr.borrow();
                if i < 0 || i as usize >= arr.len() {
                    return Err(AthError::runtime_at(format!("Array index out of bounds: {i}"), pos).into());
                }
                Ok(arr[i as usize].clone())
            }
            Value::Map(m) => {
                let key = idx.stringify();
                m.borrow()
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| AthError::runtime_at(format!("Key not found in map: {key}"), pos).into())
            }
            Value::Str(s) => {
                let Value::Int(i) = idx else {
                    return Err(AthError::runtime_at("String index must be an integer", pos).into());
                };
                let chars: Vec<char> = s.chars().collect();
                if i < 0 || i as usize >= chars.len() {
                    return Err(AthError::runtime_at(format!("String index out of bounds: {i}"), pos).into());
                }
                Ok(Value::str(chars[i as usize].to_string()))
            }
            other => Err(AthError::runtime_at(format!("Cannot index {}", other.stringify()), pos).into()),
        }
    }

    async fn eval_member(&self, object: &Expr, member: &str, pos: Pos) -> EvalResult<Value> {
        let obj = self.evaluate(object).await?;
        match obj {
            Value::Map(m) => m
                .borrow()
                .get(member)
                .cloned()
                .ok_or_else(|| AthError::runtime_at(format!("Key not found in map: {member}"), pos).into()),
            Value::Entity(name) => {
                let entities = self.entities.borrow();
                let entity = entities
                    .get(&name)
                    .ok_or_else(|| AthError::runtime_at(format!("Unknown entity: {name}"), pos))?;
                if let EntityKind::Watcher { exports, is_module, .. } = &entity.kind {
                    if is_module.get() {
                        return exports
                            .borrow()
                            .get(member)
                            .cloned()
                            .ok_or_else(|| {
                                AthError::runtime_at(
                                    format!("Module '{name}' has no export '{member}'"),
                                    pos,
                                )
                                .into()
                            });
                    }
                }
                Err(AthError::runtime_at(format!("Cannot access member of <entity {name}>"), pos).into())
            }
            other => Err(AthError::runtime_at(format!("Cannot access member of {}", other.stringify()), pos).into()),
        }
    }
}

fn literal_to_value(lit: &LiteralValue) -> Value {
    match lit {
        LiteralValue::Int(i) => Value::Int(*i),
        LiteralValue::Float(f) => Value::Float(*f),
        LiteralValue::Str(s) => Value::str(s.clone()),
        LiteralValue::Bool(b) => Value::Bool(*b),
        LiteralValue::Void => Value::Void,
    }
}

fn eval_binary_values(op: &str, left: &Value, right: &Value, pos: Pos) -> EvalResult<Value> {
    use Value::*;

    match op {
        "+" => {
            if matches!(left, Str(_)) || matches!(right, Str(_)) {
                return Ok(Value::str(format!("{}{}", left.stringify(), right.stringify())));
            }
            numeric_op(left, right, pos, "add", |a, b| a + b, |a, b| a + b)
        }
        "-" => numeric_op(left, right, pos, "subtract", |a, b| a - b, |a, b| a - b),
        "*" => numeric_op(left, right, pos, "multiply", |a, b| a * b, |a, b| a * b),
        "/" => match (left, right) {
            (Int(a), Int(b)) => {
                if *b == 0 {
                    Err(AthError::runtime_at("Division by zero", pos).into())
                } else {
                    Ok(Int(a / b))
                }
            }
            (a, b) if is_number(a) && is_number(b) => {
                let bf = as_f64(b);
                if bf == 0.0 {
                    Err(AthError::runtime_at("Division by zero", pos).into())
                } else {
                    Ok(Float(as_f64(a) / bf))
                }
            }
            _ => Err(AthError::runtime_at(
                format!("Cannot divide {} by {}", left.stringify(), right.stringify()),
                pos,
            )
            .into()),
        },
        "%" => match (left, right) {
            (Int(a), Int(b)) => {
                if *b == 0 {
                    Err(AthError::runtime_at("Modulo by zero", pos).into())
                } else {
                    Ok(Int(a % b))
                }
            }
            _ => Err(AthError::runtime_at(
                format!("Cannot modulo {} by {}", left.stringify(), right.stringify()),
                pos,
            )
            .into()),
        },
        "==" => Ok(Bool(left.equals(right))),
        "!=" => Ok(Bool(!left.equals(right))),
        "<" | ">" | "<=" | ">=" => compare(op, left, right, pos),
        "&" => int_op(left, right, pos, "Bitwise AND expects integers", |a, b| a & b),
        "|" => int_op(left, right, pos, "Bitwise OR expects integers", |a, b| a | b),
        "^" => int_op(left, right, pos, "Bitwise XOR expects integers", |a, b| a ^ b),
        "<<" => int_op(left, right, pos, "Bitwise shift expects integers", |a, b| a << b),
        ">>" => int_op(left, right, pos, "Bitwise shift expects integers", |a, b| a >> b),
        other => Err(AthError::runtime_at(format!("Unknown operator: {other}"), pos).into()),
    }
}

fn is_number(v: &Value) -> bool {
    matches!(v, Value::Int(_) | Value::Float(_))
}

fn as_f64(v: &Value) -> f64 {
    match v {
        Value::Int(i) => *i as f64,
        Value::Float(f) => *f,
        _ => 0.0,
    }
}

fn numeric_op(
    left: &Value,
    right: &Value,
    pos: Pos,
    verb: &str,
    int_op: impl Fn(i64, i64) -> i64,
    float_op: impl Fn(f64, f64) -> f64,
) -> EvalResult<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(int_op(*a, *b))),
        (a, b) if is_number(a) && is_number(b) => Ok(Value::Float(float_op(as_f64(a), as_f64(b)))),
        _ => Err(AthError::runtime_at(
            format!("Cannot {verb} {} and {}", left.stringify(), right.stringify()),
            pos,
        )
        .into()),
    }
}

fn int_op(left: &Value, right: &Value, pos: Pos, msg: &str, f: impl Fn(i64, i64) -> i64) -> EvalResult<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(f(*a, *b))),
        _ => Err(AthError::runtime_at(msg, pos).into()),
    }
}

fn compare(op: &str, left: &Value, right: &Value, pos: Pos) -> EvalResult<Value> {
    use std::cmp::Ordering;
    let ordering = match (left, right) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => None,
    };
    let Some(ordering) = ordering else {
        return Err(AthError::runtime_at(
            format!("Cannot compare {} and {}", left.stringify(), right.stringify()),
            pos,
        )
        .into());
    };
    let result = match op {
        "<" => ordering == Ordering::Less,
        ">" => ordering == Ordering::Greater,
        "<=" => ordering != Ordering::Greater,
        ">=" => ordering != Ordering::Less,
        _ => unreachable!(),
    };
    Ok(Value::Bool(result))
}
