use lox_interpreter_rs::{exit_code, Lox};
use pretty_assertions::assert_eq;

fn run(source: &str) -> (Vec<String>, i32) {
    let (mut lox, buffer) = Lox::with_capture();
    let code = lox.run(source);
    let output = buffer.borrow().clone();
    (output, code)
}

#[test]
fn literal_addition() {
    let (out, code) = run("print 1+2;");
    assert_eq!(out, vec!["3.0"]);
    assert_eq!(code, exit_code::OK);
}

#[test]
fn variables_and_block_shadowing() {
    let (out, code) = run(
        "var foo = 1; var bar = 2; foo = 3;
         { var bar = 4; print foo + bar; }
         print foo + bar;",
    );
    assert_eq!(out, vec!["7.0", "5.0"]);
    assert_eq!(code, exit_code::OK);
}

#[test]
fn for_loop_desugaring() {
    let (out, _) = run("var i = 0; for (;i<5;i = i+2) { print i; }");
    assert_eq!(out, vec!["0.0", "2.0", "4.0"]);
}

#[test]
fn function_and_string_concat() {
    let (out, _) = run(r#"fun test(first,last){print first+" "+last;} test("Hello","world!");"#);
    assert_eq!(out, vec!["Hello world!"]);
}

#[test]
fn recursion_and_return() {
    let (out, _) =
        run("fun fib(n){ if (n<=1) return n; return fib(n-2)+fib(n-1);} print fib(10);");
    assert_eq!(out, vec!["55.0"]);
}

#[test]
fn classes_this_and_dynamic_fields() {
    let (out, _) = run(
        r#"class Cake { taste(){ var a="delicious"; print "The "+this.flavor+" cake is "+a+"!"; } }
           var c=Cake(); c.flavor="German chocolate"; c.taste();"#,
    );
    assert_eq!(out, vec!["The German chocolate cake is delicious!"]);
}

#[test]
fn inheritance_and_super() {
    let (out, _) = run(
        r#"class Doughnut { cook(){ print "Fry until golden brown."; } }
           class BostonCream < Doughnut { cook(){ super.cook(); print "Pipe full of custard and coat with chocolate."; } }
           BostonCream().cook();"#,
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
fn self_referential_initializer_is_a_static_error() {
    let (out, code) = run("var a = a;");
    assert!(out.is_empty());
    assert_eq!(code, exit_code::DATAERR);
}

#[test]
fn top_level_return_is_a_static_error() {
    let (_, code) = run("return 1;");
    assert_eq!(code, exit_code::DATAERR);
}

#[test]
fn class_inheriting_itself_is_a_static_error() {
    let (_, code) = run("class A < A {}");
    assert_eq!(code, exit_code::DATAERR);
}

#[test]
fn adding_number_and_string_is_a_runtime_error() {
    let (_, code) = run(r#"1 + "x";"#);
    assert_eq!(code, exit_code::SOFTWARE);
}

#[test]
fn declarations_persist_across_separate_run_calls() {
    let (mut lox, buffer) = Lox::with_capture();
    lox.run("var x = 1;");
    lox.run("x = x + 1;");
    lox.run("print x;");
    assert_eq!(buffer.borrow().clone(), vec!["2.0"]);
}

#[test]
fn error_on_one_call_does_not_poison_the_next() {
    let (mut lox, buffer) = Lox::with_capture();
    let first = lox.run("var a = a;");
    assert_eq!(first, exit_code::DATAERR);
    let second = lox.run("print 1;");
    assert_eq!(second, exit_code::OK);
    assert_eq!(buffer.borrow().clone(), vec!["1.0"]);
}
