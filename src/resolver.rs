use std::collections::HashMap;
use std::mem;

use crate::diagnostics::Diagnostics;
use crate::interpreter::Interpreter;
use crate::syntax::{Expr, Stmt};
use crate::token::Token;

#[derive(Clone, Copy, PartialEq)]
enum FunctionType {
    None,
    Function,
    Method,
    Initializer,
}

#[derive(Clone, Copy, PartialEq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

/// A single pre-order walk over the statement list, computing for every
/// `Variable`/`Assign`/`This`/`Super` node the number of enclosing block
/// scopes between it and the scope that declares its binding. The result is
/// poked directly into the interpreter's side-table as we go, the way the
/// book's resolver holds a reference to the interpreter instead of building
/// a table to hand back.
pub struct Resolver<'i> {
    interpreter: &'i mut Interpreter,
    diagnostics: &'i mut Diagnostics,
    // Only local block scopes live here. Globals are resolved dynamically
    // by the evaluator falling back to `globals` when nothing in this stack
    // claims the name.
    scopes: Vec<HashMap<String, bool>>,
    current_function: FunctionType,
    current_class: ClassType,
    // Mirrors the declare/define straddle a block scope tracks, but for a
    // top-level `var` — there's no entry in `scopes` to hold "declared, not
    // yet defined" at that level, so `var a = a;` at the top of a script
    // needs this side channel to still be caught.
    global_declaring: Option<String>,
}

impl<'i> Resolver<'i> {
    pub fn new(interpreter: &'i mut Interpreter, diagnostics: &'i mut Diagnostics) -> Self {
        Self {
            interpreter,
            diagnostics,
            scopes: Vec::new(),
            current_function: FunctionType::None,
            current_class: ClassType::None,
            global_declaring: None,
        }
    }

    #[tracing::instrument(skip(self, statements), level = "trace")]
    pub fn resolve_stmts(&mut self, statements: &[Stmt]) {
        for statement in statements {
            self.resolve_stmt(statement);
        }
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block { statements } => {
                self.begin_scope();
                self.resolve_stmts(statements);
                self.end_scope();
            }
            Stmt::Var { name, initializer } => {
                self.declare(name);
                let is_global = self.scopes.is_empty();
                if is_global {
                    self.global_declaring = Some(name.lexeme.clone());
                }
                if let Some(init) = initializer {
                    self.resolve_expr(init);
                }
                if is_global {
                    self.global_declaring = None;
                }
                self.define(name);
            }
            Stmt::Function { declaration } => {
                // Declared and defined eagerly, before the body is resolved,
                // so the function can recurse into its own name.
                self.declare(&declaration.name);
                self.define(&declaration.name);
                self.resolve_function(&declaration.params, &declaration.body, FunctionType::Function);
            }
            Stmt::Expression { expression } => self.resolve_expr(expression),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.resolve_stmt(else_branch);
                }
            }
            Stmt::Print { expression } => self.resolve_expr(expression),
            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionType::None {
                    self.diagnostics
                        .parser_error(keyword, "Can't return from top-level code.");
                }
                if let Some(value) = value {
                    if self.current_function == FunctionType::Initializer {
                        self.diagnostics
                            .parser_error(keyword, "Can't return a value from an initializer.");
                    }
                    self.resolve_expr(value);
                }
            }
            Stmt::While { condition, body } => {
                self.resolve_expr(condition);
                self.resolve_stmt(body);
            }
            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.resolve_class(name, superclass.as_ref(), methods),
        }
    }

    fn resolve_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[std::rc::Rc<crate::syntax::FunctionDecl>],
    ) {
        let enclosing_class = mem::replace(&mut self.current_class, ClassType::Class);

        self.declare(name);
        self.define(name);

        if let Some(Expr::Variable { name: super_name }) = superclass {
            if super_name.lexeme == name.lexeme {
                self.diagnostics
                    .parser_error(super_name, "A class can't inherit from itself.");
            }
            self.current_class = ClassType::Subclass;
            self.resolve_expr(superclass.expect("checked Some above"));

            self.begin_scope();
            self.scopes
                .last_mut()
                .expect("scope just pushed")
                .insert("super".to_string(), true);
        }

        self.begin_scope();
        self.scopes
            .last_mut()
            .expect("scope just pushed")
            .insert("this".to_string(), true);

        for method in methods {
            let declaration = if method.name.lexeme == "init" {
                FunctionType::Initializer
            } else {
                FunctionType::Method
            };
            self.resolve_function(&method.params, &method.body, declaration);
        }

        self.end_scope();

        if superclass.is_some() {
            self.end_scope();
        }

        self.current_class = enclosing_class;
    }

    fn resolve_function(&mut self, params: &[Token], body: &[Stmt], kind: FunctionType) {
        let enclosing_function = mem::replace(&mut self.current_function, kind);
        self.begin_scope();
        for param in params {
            self.declare(param);
            self.define(param);
        }
        self.resolve_stmts(body);
        self.end_scope();
        self.current_function = enclosing_function;
    }

    fn resolve_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Variable { name } => {
                if let Some(scope) = self.scopes.last() {
                    if scope.get(&name.lexeme) == Some(&false) {
                        self.diagnostics.parser_error(
                            name,
                            "Can't read local variable in its own initializer.",
                        );
                    }
                } else if self.global_declaring.as_deref() == Some(name.lexeme.as_str()) {
                    self.diagnostics
                        .parser_error(name, "Can't read local variable in its own initializer.");
                }
                self.resolve_local(name);
            }
            Expr::Assign { name, value } => {
                self.resolve_expr(value);
                self.resolve_local(name);
            }
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            Expr::Unary { right, .. } => self.resolve_expr(right),
            Expr::Grouping { expression } => self.resolve_expr(expression),
            Expr::Literal { .. } => {}
            Expr::Call { callee, arguments, .. } => {
                self.resolve_expr(callee);
                for argument in arguments {
                    self.resolve_expr(argument);
                }
            }
            // The property name itself is resolved dynamically at runtime;
            // only the object expression has variables to bind statically.
            Expr::Get { object, .. } => self.resolve_expr(object),
            Expr::Set { object, value, .. } => {
                self.resolve_expr(value);
                self.resolve_expr(object);
            }
            Expr::This { keyword } => {
                if self.current_class == ClassType::None {
                    self.diagnostics
                        .parser_error(keyword, "Can't use 'this' outside of a class.");
                } else {
                    self.resolve_local(keyword);
                }
            }
            Expr::Super { keyword, .. } => match self.current_class {
                ClassType::None => {
                    self.diagnostics
                        .parser_error(keyword, "Can't use 'super' outside of a class.");
                }
                ClassType::Class => {
                    self.diagnostics
                        .parser_error(keyword, "Can't use 'super' in a class with no superclass.");
                }
                ClassType::Subclass => self.resolve_local(keyword),
            },
        }
    }

    fn resolve_local(&mut self, name: &Token) {
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains_key(&name.lexeme) {
                self.interpreter.resolve(name, depth);
                return;
            }
        }
        // Not found in any block scope: left unresolved, the evaluator
        // falls back to a global lookup.
    }

    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            if scope.contains_key(&name.lexeme) {
                self.diagnostics
                    .parser_error(name, "Already a variable with this name in this scope.");
            }
            scope.insert(name.lexeme.clone(), false);
        }
    }

    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.clone(), true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::parser::parse;
    use crate::scanner::Scanner;

    fn resolve(src: &str) -> bool {
        let mut diagnostics = Diagnostics::new();
        let tokens = Scanner::new(src, &mut diagnostics).scan_tokens();
        let stmts = parse(&tokens, &mut diagnostics);
        let mut interpreter = Interpreter::new();
        Resolver::new(&mut interpreter, &mut diagnostics).resolve_stmts(&stmts);
        diagnostics.had_error
    }

    #[test]
    fn self_referential_initializer_is_rejected() {
        assert!(resolve("var a = a;"));
    }

    #[test]
    fn top_level_return_is_rejected() {
        assert!(resolve("return 1;"));
    }

    #[test]
    fn class_inheriting_itself_is_rejected() {
        assert!(resolve("class A < A {}"));
    }

    #[test]
    fn duplicate_local_declaration_is_rejected() {
        assert!(resolve("{ var a = 1; var a = 2; }"));
    }

    #[test]
    fn this_outside_class_is_rejected() {
        assert!(resolve("print this;"));
    }

    #[test]
    fn super_without_superclass_is_rejected() {
        assert!(resolve("class A { m() { super.m(); } }"));
    }

    #[test]
    fn return_value_from_initializer_is_rejected() {
        assert!(resolve("class A { init() { return 1; } }"));
    }

    #[test]
    fn well_formed_program_resolves_cleanly() {
        assert!(!resolve(
            "class A { init(x) { this.x = x; } get() { return this.x; } } var a = A(1); print a.get();"
        ));
    }
}
