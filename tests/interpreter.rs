#[cfg(test)]
mod interpreter_tests {
    use std::cell::RefCell;
    use std::io::{self, Write};
    use std::rc::Rc;

    use opal::ast::ExprId;
    use opal::error::{OpalError, RuntimeError};
    use opal::interpreter::Interpreter;
    use opal::parser::Parser;
    use opal::resolver::Resolver;
    use opal::scanner::Scanner;
    use opal::token::Token;

    /// Cloneable sink capturing everything the interpreter prints.
    #[derive(Clone, Default)]
    struct SharedBuf(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).expect("program output is UTF-8")
        }
    }

    /// Scan → parse → resolve → interpret one chunk on an existing
    /// interpreter, returning the parser's id watermark for the next chunk.
    fn feed(
        interpreter: &mut Interpreter,
        source: &str,
        first_id: ExprId,
    ) -> Result<ExprId, OpalError> {
        let tokens: Vec<Token> = Scanner::new(source).collect::<Result<_, _>>()?;

        let mut parser = Parser::with_first_id(tokens, first_id);
        let statements = parser.parse().map_err(|mut errors| errors.remove(0))?;

        let locals = Resolver::new()
            .resolve(&statements)
            .map_err(|mut errors| errors.remove(0))?;

        interpreter.interpret(&statements, locals)?;

        Ok(parser.id_watermark())
    }

    /// Run a whole program, returning its printed output and result.
    fn run(source: &str) -> (String, Result<(), OpalError>) {
        let sink = SharedBuf::default();
        let mut interpreter = Interpreter::with_output(Box::new(sink.clone()));

        let result = feed(&mut interpreter, source, 0).map(|_| ());

        (sink.contents(), result)
    }

    fn run_ok(source: &str) -> String {
        let (output, result) = run(source);
        result.expect("program should run cleanly");
        output
    }

    fn run_err(source: &str) -> (String, OpalError) {
        let (output, result) = run(source);
        (output, result.expect_err("program should fail"))
    }

    // ── scoping and closures ────────────────────────────────────────────

    #[test]
    fn test_block_shadowing_resolves_to_nearest_declaration() {
        // The shadowing initializer reads the outer `a`; after the block the
        // outer binding is untouched.
        let output = run_ok("var a = 1; { var a = a + 1; print a; } print a;");
        assert_eq!(output, "21");
    }

    #[test]
    fn test_closure_counter_keeps_private_state() {
        let output = run_ok(
            "fun counter() { \
               var i = 0; \
               fun inc() { i = i + 1; return i; } \
               return inc; \
             } \
             var c = counter(); \
             print c(); \
             print c();",
        );
        assert_eq!(output, "12");
    }

    #[test]
    fn test_closures_observe_live_bindings_not_snapshots() {
        let output = run_ok(
            "var x = \"start\"; \
             fun read() { return x; } \
             x = \"changed\"; \
             print read();",
        );
        assert_eq!(output, "changed");
    }

    #[test]
    fn test_outer_scope_observes_closure_mutation() {
        let output = run_ok(
            "var n = 0; \
             fun bump() { n = n + 1; } \
             bump(); bump(); \
             print n;",
        );
        assert_eq!(output, "2");
    }

    #[test]
    fn test_closure_captures_declaration_environment_not_callers() {
        // Lexical, not dynamic, scoping: `f` sees the global `x`, never the
        // caller's local one.
        let output = run_ok(
            "var x = \"global\"; \
             fun f() { print x; } \
             fun g() { var x = \"local\"; f(); } \
             g();",
        );
        assert_eq!(output, "global");
    }

    #[test]
    fn test_for_loop_desugaring_runs_increment() {
        let output = run_ok("for (var i = 0; i < 3; i = i + 1) print i;");
        assert_eq!(output, "012");
    }

    #[test]
    fn test_return_unwinds_out_of_loop() {
        let output = run_ok(
            "fun f() { while (true) { return \"done\"; } } \
             print f();",
        );
        assert_eq!(output, "done");
    }

    #[test]
    fn test_function_without_return_yields_nil() {
        let output = run_ok("fun f() {} print f();");
        assert_eq!(output, "nil");
    }

    // ── classes, instances, inheritance ─────────────────────────────────

    #[test]
    fn test_initializer_stores_field() {
        let output = run_ok(
            "class Foo { init(x) { this.x = x; } } \
             var foo = Foo(5); \
             print foo.x;",
        );
        assert_eq!(output, "5");
    }

    #[test]
    fn test_inherited_method_runs_with_subclass_instance() {
        let output = run_ok(
            "class A { describe() { return this.kind; } } \
             class B < A {} \
             var b = B(); \
             b.kind = \"b-thing\"; \
             print b.describe();",
        );
        assert_eq!(output, "b-thing");
    }

    #[test]
    fn test_super_call_runs_before_subclass_behavior() {
        let output = run_ok(
            "class A { m() { print \"A\"; } } \
             class B < A { m() { super.m(); print \"B\"; } } \
             B().m();",
        );
        assert_eq!(output, "AB");
    }

    #[test]
    fn test_super_method_binds_current_instance() {
        let output = run_ok(
            "class A { who() { return this.name; } } \
             class B < A { who() { return super.who(); } } \
             var b = B(); \
             b.name = \"bee\"; \
             print b.who();",
        );
        assert_eq!(output, "bee");
    }

    #[test]
    fn test_local_methods_shadow_superclass_methods() {
        let output = run_ok(
            "class A { m() { return \"super\"; } } \
             class B < A { m() { return \"sub\"; } } \
             print B().m();",
        );
        assert_eq!(output, "sub");
    }

    #[test]
    fn test_fields_shadow_methods() {
        let output = run_ok(
            "class A { m() { return \"method\"; } } \
             var a = A(); \
             a.m = \"field\"; \
             print a.m;",
        );
        assert_eq!(output, "field");
    }

    #[test]
    fn test_initializer_always_returns_the_instance() {
        let output = run_ok("class Foo { init() { return; } } print Foo();");
        assert_eq!(output, "Foo instance");
    }

    #[test]
    fn test_class_arity_comes_from_initializer() {
        let (_, err) = run_err("class Foo { init(a, b) {} } Foo(1);");
        assert!(err.to_string().contains("Expected 2 arguments but got 1"));

        let (_, err) = run_err("class Bare {} Bare(1);");
        assert!(err.to_string().contains("Expected 0 arguments but got 1"));
    }

    #[test]
    fn test_bound_method_survives_extraction() {
        let output = run_ok(
            "class Greeter { init(name) { this.name = name; } \
                             greet() { return this.name; } } \
             var m = Greeter(\"hi\").greet; \
             print m();",
        );
        assert_eq!(output, "hi");
    }

    #[test]
    fn test_method_body_can_reference_its_own_class() {
        let output = run_ok(
            "class Factory { make() { return Factory(); } } \
             print Factory().make();",
        );
        assert_eq!(output, "Factory instance");
    }

    // ── operators, truthiness, equality ─────────────────────────────────

    #[test]
    fn test_truthiness_only_nil_and_false_are_falsy() {
        let output = run_ok(
            "if (0) print \"zero\"; \
             if (\"\") print \"empty\"; \
             if (nil) print \"nil\"; \
             if (false) print \"false\";",
        );
        assert_eq!(output, "zeroempty");
    }

    #[test]
    fn test_equality_has_no_cross_type_coercion() {
        let output = run_ok(
            "print nil == nil; println(); \
             print nil == false; println(); \
             print \"1\" == 1;",
        );
        assert_eq!(output, "true\nfalse\nfalse");
    }

    #[test]
    fn test_logical_operators_short_circuit() {
        let output = run_ok(
            "fun boom() { print \"boom\"; return true; } \
             print false and boom(); println(); \
             print true or boom();",
        );
        assert_eq!(output, "false\ntrue");
    }

    #[test]
    fn test_logical_operators_return_the_deciding_value() {
        let output = run_ok("print nil or \"fallback\"; print 1 and 2;");
        assert_eq!(output, "fallback2");
    }

    #[test]
    fn test_string_concatenation() {
        let output = run_ok("print \"foo\" + \"bar\";");
        assert_eq!(output, "foobar");
    }

    #[test]
    fn test_modulus_and_power() {
        let output = run_ok("print 7 % 3; println(); print 2 ^ 8;");
        assert_eq!(output, "1\n256");
    }

    #[test]
    fn test_number_formatting_suppresses_trailing_zero() {
        let output = run_ok("print 3.0; println(); print 2.5; println(); print 10 / 4;");
        assert_eq!(output, "3\n2.5\n2.5");
    }

    #[test]
    fn test_print_writes_no_newline_println_does() {
        let output = run_ok("print \"a\"; println(); print \"b\";");
        assert_eq!(output, "a\nb");
    }

    // ── runtime errors ──────────────────────────────────────────────────

    #[test]
    fn test_undefined_variable() {
        let (_, err) = run_err("print ghost;");
        assert!(err.to_string().contains("Undefined variable 'ghost'"));
    }

    #[test]
    fn test_arity_mismatch_never_runs_the_body() {
        let (output, err) = run_err(
            "fun f(a, b) { print \"ran\"; } \
             print \"pre\"; \
             f(1);",
        );
        assert_eq!(output, "pre", "the body must not execute");
        assert!(err.to_string().contains("Expected 2 arguments but got 1"));
    }

    #[test]
    fn test_calling_a_non_callable() {
        let (_, err) = run_err("var x = 1; x();");
        assert!(matches!(
            err,
            OpalError::Runtime(RuntimeError::NotCallable { .. })
        ));
    }

    #[test]
    fn test_property_access_on_non_instance() {
        let (_, err) = run_err("var x = 1; print x.field;");
        assert!(matches!(
            err,
            OpalError::Runtime(RuntimeError::NotAnObject { .. })
        ));
    }

    #[test]
    fn test_undefined_property() {
        let (_, err) = run_err("class Foo {} print Foo().ghost;");
        assert!(err.to_string().contains("Undefined property 'ghost'"));
    }

    #[test]
    fn test_superclass_must_be_a_class() {
        let (_, err) = run_err("var NotClass = 1; class B < NotClass {}");
        assert!(matches!(
            err,
            OpalError::Runtime(RuntimeError::InvalidSuperclass { .. })
        ));
    }

    #[test]
    fn test_division_by_zero_is_an_error() {
        let (_, err) = run_err("print 1 / 0;");
        assert!(matches!(
            err,
            OpalError::Runtime(RuntimeError::DivisionByZero { .. })
        ));

        let (_, err) = run_err("print 1 % 0;");
        assert!(matches!(
            err,
            OpalError::Runtime(RuntimeError::DivisionByZero { .. })
        ));
    }

    #[test]
    fn test_unary_minus_requires_a_number() {
        let (_, err) = run_err("print -\"oops\";");
        assert!(err.to_string().contains("Operand must be a number"));
    }

    #[test]
    fn test_mixed_addition_is_a_type_error() {
        let (_, err) = run_err("print 1 + \"x\";");
        assert!(err
            .to_string()
            .contains("Operands must be two numbers or two strings"));
    }

    #[test]
    fn test_runtime_error_stops_remaining_statements() {
        let (output, _) = run_err("print \"before\"; ghost; print \"after\";");
        assert_eq!(output, "before");
    }

    // ── static errors gate evaluation ───────────────────────────────────

    #[test]
    fn test_static_error_skips_all_execution() {
        let (output, err) = run("print \"side\"; return 1;");
        assert!(matches!(err.unwrap_err(), OpalError::Resolve { .. }));
        assert_eq!(output, "", "no statement may run after a static error");
    }

    // ── natives ─────────────────────────────────────────────────────────

    #[test]
    fn test_native_math_functions() {
        let output = run_ok(
            "print Max(1, 2); \
             print Min(1, 2); \
             print sqrt(16); \
             print sin(0); \
             print cos(0);",
        );
        assert_eq!(output, "21401");
    }

    #[test]
    fn test_clock_returns_a_number() {
        let output = run_ok("print clock() > 0;");
        assert_eq!(output, "true");
    }

    #[test]
    fn test_native_type_failure_reports_the_native() {
        let (_, err) = run_err("sqrt(\"x\");");
        assert!(err.to_string().contains("sqrt"));
    }

    #[test]
    fn test_callable_display_forms() {
        let output = run_ok("fun f() {} print f; print clock; class A {} print A;");
        assert_eq!(output, "<fn f><native fn clock>A");
    }

    // ── sequential interpretation (REPL model) ──────────────────────────

    #[test]
    fn test_interpreter_state_survives_a_runtime_error() {
        let sink = SharedBuf::default();
        let mut interpreter = Interpreter::with_output(Box::new(sink.clone()));

        let watermark = feed(&mut interpreter, "var a = 1;", 0).unwrap();

        let failed = feed(&mut interpreter, "print missing;", watermark);
        assert!(failed.is_err());

        // The same interpreter keeps its globals and accepts new chunks.
        feed(&mut interpreter, "print a;", watermark).unwrap();
        assert_eq!(sink.contents(), "1");
    }

    #[test]
    fn test_closures_from_earlier_chunks_stay_resolved() {
        let sink = SharedBuf::default();
        let mut interpreter = Interpreter::with_output(Box::new(sink.clone()));

        let watermark = feed(
            &mut interpreter,
            "fun adder(n) { fun add(m) { return n + m; } return add; } var plus2 = adder(2);",
            0,
        )
        .unwrap();

        feed(&mut interpreter, "print plus2(3);", watermark).unwrap();
        assert_eq!(sink.contents(), "5");
    }
}
