use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::class::{LoxClass, LoxInstance};
use crate::diagnostics::Diagnostics;
use crate::environment::{self, Environment};
use crate::error::{LoxError, Result};
use crate::function::{self, Function};
use crate::object::Object;
use crate::syntax::{Expr, FunctionDecl, LiteralValue, Stmt};
use crate::token::{Token, TokenType};

/// Where `print` sends its output. Tests construct an interpreter in
/// `Capture` mode so assertions can inspect exactly what the program wrote
/// without going through the process's real stdout.
enum Output {
    Stdout,
    Capture(Rc<RefCell<Vec<String>>>),
}

pub struct Interpreter {
    pub globals: Rc<RefCell<Environment>>,
    environment: Rc<RefCell<Environment>>,
    // Keyed by the address of the specific Token a Variable/Assign/This/
    // Super node owns (see Token::id), not by name — two references to the
    // same name at different sites can resolve to different depths.
    locals: HashMap<usize, usize>,
    output: Output,
}

impl Interpreter {
    pub fn new() -> Self {
        let globals = Environment::new();
        globals
            .borrow_mut()
            .define("clock".to_string(), Object::Callable(Rc::new(function::clock())));
        Self {
            environment: Rc::clone(&globals),
            globals,
            locals: HashMap::new(),
            output: Output::Stdout,
        }
    }

    pub fn with_capture() -> (Self, Rc<RefCell<Vec<String>>>) {
        let mut interpreter = Self::new();
        let buffer = Rc::new(RefCell::new(Vec::new()));
        interpreter.output = Output::Capture(Rc::clone(&buffer));
        (interpreter, buffer)
    }

    pub fn resolve(&mut self, name: &Token, depth: usize) {
        self.locals.insert(name.id(), depth);
    }

    /// The side-table is keyed by `Token` address, which is only stable
    /// for the lifetime of the `statements` Vec the resolver just walked.
    /// A persisted `Interpreter` (the REPL keeps one per process) must
    /// drop every prior entry before resolving the next line's AST, or a
    /// stale depth can collide with a freshly-allocated token at a reused
    /// address.
    pub fn reset_locals(&mut self) {
        self.locals.clear();
    }

    #[tracing::instrument(skip(self, statements, diagnostics), level = "trace")]
    pub fn interpret(&mut self, statements: &[Stmt], diagnostics: &mut Diagnostics) {
        for statement in statements {
            if let Err(err) = self.execute(statement) {
                diagnostics.runtime_error(&err);
                return;
            }
        }
    }

    fn execute(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Expression { expression } => {
                self.evaluate(expression)?;
                Ok(())
            }
            Stmt::Print { expression } => {
                let value = self.evaluate(expression)?;
                self.print(&value.to_string());
                Ok(())
            }
            Stmt::Var { name, initializer } => {
                let value = match initializer {
                    Some(init) => self.evaluate(init)?,
                    None => Object::Nil,
                };
                self.environment.borrow_mut().define(name.lexeme.clone(), value);
                Ok(())
            }
            Stmt::Block { statements } => {
                let block_env = Environment::with_enclosing(&self.environment);
                self.execute_block(statements, block_env)
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)
                } else {
                    Ok(())
                }
            }
            Stmt::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    self.execute(body)?;
                }
                Ok(())
            }
            Stmt::Function { declaration } => {
                let function = Function::new_user(
                    Rc::clone(declaration),
                    Rc::clone(&self.environment),
                    false,
                );
                self.environment
                    .borrow_mut()
                    .define(declaration.name.lexeme.clone(), Object::Callable(Rc::new(function)));
                Ok(())
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Object::Nil,
                };
                Err(LoxError::Return { value })
            }
            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.execute_class(name, superclass.as_ref(), methods),
        }
    }

    fn execute_class(
        &mut self,
        name: &Token,
        superclass_expr: Option<&Expr>,
        methods: &[Rc<FunctionDecl>],
    ) -> Result<()> {
        let superclass = match superclass_expr {
            Some(expr) => match self.evaluate(expr)? {
                Object::Class(class) => Some(class),
                _ => {
                    // The parser only ever builds a bare `Variable` node here.
                    let Expr::Variable { name: super_token } = expr else {
                        unreachable!("classDecl only parses an identifier as its superclass")
                    };
                    return Err(LoxError::Runtime {
                        token: super_token.clone(),
                        message: "Superclass must be a class.".to_string(),
                    });
                }
            },
            None => None,
        };

        self.environment
            .borrow_mut()
            .define(name.lexeme.clone(), Object::Nil);

        let methods_closure = if let Some(superclass) = &superclass {
            let env = Environment::with_enclosing(&self.environment);
            env.borrow_mut()
                .define("super".to_string(), Object::Class(Rc::clone(superclass)));
            env
        } else {
            Rc::clone(&self.environment)
        };

        let mut method_table = HashMap::new();
        for method in methods {
            let is_initializer = method.name.lexeme == "init";
            let function = Function::new_user(
                Rc::clone(method),
                Rc::clone(&methods_closure),
                is_initializer,
            );
            method_table.insert(method.name.lexeme.clone(), Rc::new(function));
        }

        let class = Rc::new(RefCell::new(LoxClass {
            name: name.lexeme.clone(),
            superclass,
            methods: method_table,
        }));

        self.environment
            .borrow_mut()
            .assign(name, Object::Class(class))?;
        Ok(())
    }

    /// Runs `statements` against `env`, restoring the previous environment
    /// on every exit path — including the `return` unwind and any runtime
    /// error.
    pub fn execute_block(&mut self, statements: &[Stmt], env: Rc<RefCell<Environment>>) -> Result<()> {
        let previous = std::mem::replace(&mut self.environment, env);
        let result = (|| {
            for statement in statements {
                self.execute(statement)?;
            }
            Ok(())
        })();
        self.environment = previous;
        result
    }

    fn evaluate(&mut self, expr: &Expr) -> Result<Object> {
        match expr {
            Expr::Literal { value } => Ok(literal_to_object(value)),
            Expr::Grouping { expression } => self.evaluate(expression),
            Expr::Unary { operator, right } => self.eval_unary(operator, right),
            Expr::Binary { left, operator, right } => self.eval_binary(left, operator, right),
            Expr::Logical { left, operator, right } => self.eval_logical(left, operator, right),
            Expr::Variable { name } => self.look_up_variable(name),
            Expr::Assign { name, value } => self.eval_assign(name, value),
            Expr::Call { callee, paren, arguments } => self.eval_call(callee, paren, arguments),
            Expr::Get { object, name } => self.eval_get(object, name),
            Expr::Set { object, name, value } => self.eval_set(object, name, value),
            Expr::This { keyword } => self.look_up_variable(keyword),
            Expr::Super { keyword, method } => self.eval_super(keyword, method),
        }
    }

    fn look_up_variable(&self, name: &Token) -> Result<Object> {
        match self.locals.get(&name.id()) {
            Some(&depth) => environment::get_at(&self.environment, depth, name),
            None => self.globals.borrow().get(name),
        }
    }

    fn eval_assign(&mut self, name: &Token, value_expr: &Expr) -> Result<Object> {
        let value = self.evaluate(value_expr)?;
        match self.locals.get(&name.id()) {
            Some(&depth) => environment::assign_at(&self.environment, depth, name, value.clone())?,
            None => self.globals.borrow_mut().assign(name, value.clone())?,
        }
        Ok(value)
    }

    fn eval_unary(&mut self, operator: &Token, right: &Expr) -> Result<Object> {
        let right = self.evaluate(right)?;
        match operator.token_type {
            TokenType::Minus => match right {
                Object::Number(n) => Ok(Object::Number(-n)),
                _ => Err(number_operand_error(operator)),
            },
            TokenType::Bang => Ok(Object::Boolean(!right.is_truthy())),
            _ => unreachable!("parser never produces another unary operator"),
        }
    }

    fn eval_logical(&mut self, left: &Expr, operator: &Token, right: &Expr) -> Result<Object> {
        let left_value = self.evaluate(left)?;
        match operator.token_type {
            TokenType::Or if left_value.is_truthy() => Ok(left_value),
            TokenType::And if !left_value.is_truthy() => Ok(left_value),
            TokenType::Or | TokenType::And => self.evaluate(right),
            _ => unreachable!("parser never produces another logical operator"),
        }
    }

    fn eval_binary(&mut self, left: &Expr, operator: &Token, right: &Expr) -> Result<Object> {
        let left = self.evaluate(left)?;
        let right = self.evaluate(right)?;

        match operator.token_type {
            TokenType::Minus => numeric_op(operator, left, right, |a, b| a - b),
            TokenType::Slash => numeric_op(operator, left, right, |a, b| a / b),
            TokenType::Star => numeric_op(operator, left, right, |a, b| a * b),
            TokenType::Plus => match (left, right) {
                (Object::Number(a), Object::Number(b)) => Ok(Object::Number(a + b)),
                (Object::String(a), Object::String(b)) => Ok(Object::String(a + &b)),
                _ => Err(LoxError::Runtime {
                    token: operator.clone(),
                    message: "Can only combine numbers or strings".to_string(),
                }),
            },
            TokenType::Greater => comparison_op(operator, left, right, |a, b| a > b),
            TokenType::GreaterEqual => comparison_op(operator, left, right, |a, b| a >= b),
            TokenType::Less => comparison_op(operator, left, right, |a, b| a < b),
            TokenType::LessEqual => comparison_op(operator, left, right, |a, b| a <= b),
            TokenType::BangEqual => Ok(Object::Boolean(!left.equals(&right))),
            TokenType::EqualEqual => Ok(Object::Boolean(left.equals(&right))),
            _ => unreachable!("parser never produces another binary operator"),
        }
    }

    fn eval_call(&mut self, callee: &Expr, paren: &Token, arguments: &[Expr]) -> Result<Object> {
        let callee_value = self.evaluate(callee)?;

        let mut evaluated_args = Vec::with_capacity(arguments.len());
        for argument in arguments {
            evaluated_args.push(self.evaluate(argument)?);
        }

        match callee_value {
            Object::Callable(function) => {
                check_arity(paren, function.arity(), evaluated_args.len())?;
                function.call(self, &evaluated_args)
            }
            Object::Class(class) => {
                let arity = class.borrow().arity();
                check_arity(paren, arity, evaluated_args.len())?;
                let instance = LoxInstance::new(&class);
                if let Some(initializer) = class.borrow().find_method("init") {
                    initializer.bind(instance.clone()).call(self, &evaluated_args)?;
                }
                Ok(instance)
            }
            _ => Err(LoxError::Runtime {
                token: paren.clone(),
                message: "Can only call functions and classes.".to_string(),
            }),
        }
    }

    fn eval_get(&mut self, object: &Expr, name: &Token) -> Result<Object> {
        let object_value = self.evaluate(object)?;
        match &object_value {
            Object::Instance(instance) => instance.borrow().get(name, &object_value),
            _ => Err(LoxError::Runtime {
                token: name.clone(),
                message: "Only instances have properties".to_string(),
            }),
        }
    }

    fn eval_set(&mut self, object: &Expr, name: &Token, value_expr: &Expr) -> Result<Object> {
        let object_value = self.evaluate(object)?;
        let Object::Instance(instance) = object_value else {
            return Err(LoxError::Runtime {
                token: name.clone(),
                message: "Only instances have fields.".to_string(),
            });
        };
        let value = self.evaluate(value_expr)?;
        instance.borrow_mut().set(name, value.clone());
        Ok(value)
    }

    fn eval_super(&mut self, keyword: &Token, method: &Token) -> Result<Object> {
        let distance = *self
            .locals
            .get(&keyword.id())
            .expect("resolver always resolves 'super' inside a subclass method");
        let superclass = match environment::get_at(&self.environment, distance, keyword)? {
            Object::Class(class) => class,
            _ => unreachable!("'super' always resolves to a class value"),
        };
        let this = environment::get_at_str(&self.environment, distance - 1, "this")
            .expect("'this' is always bound one scope inside 'super'");

        match superclass.borrow().find_method(&method.lexeme) {
            Some(found) => Ok(Object::Callable(Rc::new(found.bind(this)))),
            None => Err(LoxError::Runtime {
                token: method.clone(),
                message: format!("Undefined property '{}'.", method.lexeme),
            }),
        }
    }

    fn print(&mut self, text: &str) {
        match &self.output {
            Output::Stdout => println!("{text}"),
            Output::Capture(buffer) => buffer.borrow_mut().push(text.to_string()),
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn literal_to_object(value: &LiteralValue) -> Object {
    match value {
        LiteralValue::Number(n) => Object::Number(*n),
        LiteralValue::String(s) => Object::String(s.clone()),
        LiteralValue::Boolean(b) => Object::Boolean(*b),
        LiteralValue::Nil => Object::Nil,
    }
}

fn number_operand_error(operator: &Token) -> LoxError {
    LoxError::Runtime {
        token: operator.clone(),
        message: "Operands must be numbers".to_string(),
    }
}

fn numeric_op(operator: &Token, left: Object, right: Object, op: impl Fn(f64, f64) -> f64) -> Result<Object> {
    match (left, right) {
        (Object::Number(a), Object::Number(b)) => Ok(Object::Number(op(a, b))),
        _ => Err(number_operand_error(operator)),
    }
}

fn comparison_op(operator: &Token, left: Object, right: Object, op: impl Fn(f64, f64) -> bool) -> Result<Object> {
    match (left, right) {
        (Object::Number(a), Object::Number(b)) => Ok(Object::Boolean(op(a, b))),
        _ => Err(number_operand_error(operator)),
    }
}

fn check_arity(paren: &Token, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        Err(LoxError::Runtime {
            token: paren.clone(),
            message: format!("Expected {expected} arguments but got {got}."),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::parser::parse;
    use crate::resolver::Resolver;
    use crate::scanner::Scanner;

    fn run(src: &str) -> (Vec<String>, bool, bool) {
        let mut diagnostics = Diagnostics::new();
        let tokens = Scanner::new(src, &mut diagnostics).scan_tokens();
        let stmts = parse(&tokens, &mut diagnostics);
        let (mut interpreter, buffer) = Interpreter::with_capture();
        if !diagnostics.had_error {
            Resolver::new(&mut interpreter, &mut diagnostics).resolve_stmts(&stmts);
        }
        if !diagnostics.had_error {
            interpreter.interpret(&stmts, &mut diagnostics);
        }
        let output = buffer.borrow().clone();
        (output, diagnostics.had_error, diagnostics.had_runtime_error)
    }

    #[test]
    fn arithmetic() {
        let (out, ..) = run("print 1 + 2;");
        assert_eq!(out, vec!["3.0"]);
    }

    #[test]
    fn block_scoping_shadows_outer_binding() {
        let (out, ..) = run(
            "var foo = 1; var bar = 2; foo = 3;
             { var bar = 4; print foo + bar; }
             print foo + bar;",
        );
        assert_eq!(out, vec!["7.0", "5.0"]);
    }

    #[test]
    fn for_loop_desugars_correctly() {
        let (out, ..) = run("var i = 0; for (;i<5;i = i+2) { print i; }");
        assert_eq!(out, vec!["0.0", "2.0", "4.0"]);
    }

    #[test]
    fn closures_capture_definition_environment() {
        let (out, ..) = run(
            "fun makeCounter() {
                var i = 0;
                fun count() { i = i + 1; print i; }
                return count;
             }
             var counter = makeCounter();
             counter();
             counter();",
        );
        assert_eq!(out, vec!["1.0", "2.0"]);
    }

    #[test]
    fn recursion_and_return() {
        let (out, ..) =
            run("fun fib(n){ if (n<=1) return n; return fib(n-2)+fib(n-1);} print fib(10);");
        assert_eq!(out, vec!["55.0"]);
    }

    #[test]
    fn this_binds_to_receiver() {
        let (out, ..) = run(
            "class Cake { taste(){ var a=\"delicious\"; print \"The \"+this.flavor+\" cake is \"+a+\"!\"; } }
             var c=Cake(); c.flavor=\"German chocolate\"; c.taste();",
        );
        assert_eq!(out, vec!["The German chocolate cake is delicious!"]);
    }

    #[test]
    fn inheritance_and_super() {
        let (out, ..) = run(
            "class Doughnut { cook(){ print \"Fry until golden brown.\"; } }
             class BostonCream < Doughnut { cook(){ super.cook(); print \"Pipe full of custard and coat with chocolate.\"; } }
             BostonCream().cook();",
        );
        assert_eq!(
            out,
            vec![
                "Fry until golden brown.",
                "Pipe full of custard and coat with chocolate."
            ]
        );
    }

    #[test]
    fn initializer_always_returns_the_instance() {
        let (out, had_error, had_runtime_error) = run(
            "class Point { init(x) { this.x = x; } }
             var p = Point(3);
             print p.x;",
        );
        assert!(!had_error && !had_runtime_error);
        assert_eq!(out, vec!["3.0"]);
    }

    #[test]
    fn method_binding_is_stable_across_rebinding() {
        let (out, ..) = run(
            "class Widget { describe() { print this.name; } }
             var w = Widget(); w.name = \"gizmo\";
             var m = w.describe;
             m();",
        );
        assert_eq!(out, vec!["gizmo"]);
    }

    #[test]
    fn short_circuit_or_skips_right_side() {
        let (out, ..) = run(
            "fun sideEffect() { print \"called\"; return true; }
             var a = true or sideEffect();
             print a;",
        );
        assert_eq!(out, vec!["true"]);
    }

    #[test]
    fn short_circuit_and_skips_right_side() {
        let (out, ..) = run(
            "fun sideEffect() { print \"called\"; return true; }
             var a = false and sideEffect();
             print a;",
        );
        assert_eq!(out, vec!["false"]);
    }

    #[test]
    fn adding_number_and_string_is_a_runtime_error() {
        let (_, had_error, had_runtime_error) = run("1 + \"x\";");
        assert!(!had_error);
        assert!(had_runtime_error);
    }

    #[test]
    fn division_by_zero_yields_infinity_not_an_error() {
        let (out, _, had_runtime_error) = run("print 1 / 0;");
        assert!(!had_runtime_error);
        assert_eq!(out, vec!["inf"]);
    }

    #[test]
    fn undefined_field_read_is_a_runtime_error() {
        let (_, _, had_runtime_error) = run("class A {} var a = A(); print a.missing;");
        assert!(had_runtime_error);
    }
}
