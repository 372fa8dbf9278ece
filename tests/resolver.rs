#[cfg(test)]
mod resolver_tests {
    use opal::ast::{Expr, Stmt};
    use opal::error::OpalError;
    use opal::parser::Parser;
    use opal::resolver::{Locals, Resolver};
    use opal::scanner::Scanner;
    use opal::token::Token;

    fn parse(source: &str) -> Vec<Stmt> {
        let tokens: Vec<Token> = Scanner::new(source)
            .collect::<Result<_, _>>()
            .expect("source should scan cleanly");

        Parser::new(tokens).parse().expect("source should parse")
    }

    fn resolve(source: &str) -> Result<(Vec<Stmt>, Locals), Vec<OpalError>> {
        let statements = parse(source);
        let locals = Resolver::new().resolve(&statements)?;
        Ok((statements, locals))
    }

    fn errors_of(source: &str) -> Vec<String> {
        resolve(source)
            .expect_err("expected static errors")
            .iter()
            .map(|e| e.to_string())
            .collect()
    }

    // ── static errors ───────────────────────────────────────────────────

    #[test]
    fn test_self_referential_initializer() {
        let errors = errors_of("{ var a = a; }");

        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("its own initializer"), "{}", errors[0]);
    }

    #[test]
    fn test_initializer_may_read_shadowed_global() {
        // The shadowing declaration's initializer reads the outer binding.
        let (_, locals) = resolve("var a = 1; { var a = a + 1; print a; }").unwrap();

        // The initializer's `a` is the global: not recorded.  The `print a`
        // afterwards is the local at depth 0.
        assert_eq!(locals.len(), 1);
        assert!(locals.values().all(|&d| d == 0));
    }

    #[test]
    fn test_initializer_may_read_shadowed_local() {
        let (_, locals) = resolve("{ var a = 1; { var a = a; } }").unwrap();

        // The inner initializer's `a` must reach the outer local, one hop up.
        assert!(locals.values().any(|&d| d == 1));
    }

    #[test]
    fn test_return_outside_function() {
        let errors = errors_of("return 1;");
        assert!(errors[0].contains("top-level"), "{}", errors[0]);
    }

    #[test]
    fn test_return_with_value_in_initializer() {
        let errors = errors_of("class Foo { init() { return 5; } }");
        assert!(errors[0].contains("initializer"), "{}", errors[0]);
    }

    #[test]
    fn test_bare_return_in_initializer_is_allowed() {
        assert!(resolve("class Foo { init() { return; } }").is_ok());
    }

    #[test]
    fn test_class_cannot_inherit_from_itself() {
        let errors = errors_of("class Foo < Foo {}");
        assert!(errors[0].contains("inherit from itself"), "{}", errors[0]);
    }

    #[test]
    fn test_duplicate_declaration_in_same_scope() {
        let errors = errors_of("fun f() { var a = 1; var a = 2; }");
        assert!(errors[0].contains("already declared"), "{}", errors[0]);
    }

    #[test]
    fn test_this_outside_class() {
        let errors = errors_of("print this;");
        assert!(errors[0].contains("'this'"), "{}", errors[0]);
    }

    #[test]
    fn test_super_outside_class() {
        let errors = errors_of("fun f() { super.m(); }");
        assert!(errors[0].contains("'super'"), "{}", errors[0]);
    }

    #[test]
    fn test_super_in_class_without_superclass() {
        let errors = errors_of("class Foo { m() { return super.m(); } }");
        assert!(errors[0].contains("no superclass"), "{}", errors[0]);
    }

    #[test]
    fn test_errors_are_collected_not_short_circuited() {
        let errors = errors_of("return 1; print this;");
        assert_eq!(errors.len(), 2);
    }

    // ── recorded distances ──────────────────────────────────────────────

    #[test]
    fn test_shadowing_distance_equals_nesting_depth() {
        let (statements, locals) = resolve("{ var x = 1; { { print x; } } }").unwrap();

        // Dig out the print's variable reference two blocks down.
        let Stmt::Block(outer) = &statements[0] else {
            panic!("expected block");
        };
        let Stmt::Block(middle) = &outer[1] else {
            panic!("expected block");
        };
        let Stmt::Block(inner) = &middle[0] else {
            panic!("expected block");
        };
        let Stmt::Print(Expr::Variable { id, .. }) = &inner[0] else {
            panic!("expected print of a variable");
        };

        assert_eq!(locals.get(id), Some(&2));
    }

    #[test]
    fn test_closure_reference_distance() {
        let (statements, locals) = resolve("{ var x = 1; fun f() { print x; } }").unwrap();

        let Stmt::Block(block) = &statements[0] else {
            panic!("expected block");
        };
        let Stmt::Function(declaration) = &block[1] else {
            panic!("expected function declaration");
        };
        let Stmt::Print(Expr::Variable { id, .. }) = &declaration.body[0] else {
            panic!("expected print of a variable");
        };

        // One hop: out of the function scope into the block that owns `x`.
        assert_eq!(locals.get(id), Some(&1));
    }

    #[test]
    fn test_this_distance_mirrors_runtime_nesting() {
        let (statements, locals) = resolve("class A { m() { return this; } }").unwrap();

        let Stmt::Class { methods, .. } = &statements[0] else {
            panic!("expected class");
        };
        let Stmt::Return {
            value: Some(Expr::This { id, .. }),
            ..
        } = &methods[0].body[0]
        else {
            panic!("expected return this");
        };

        // Method scope → `this` scope: one hop.
        assert_eq!(locals.get(id), Some(&1));
    }

    #[test]
    fn test_super_distance_mirrors_runtime_nesting() {
        let (statements, locals) =
            resolve("class A {} class B < A { m() { return super.m(); } }").unwrap();

        let Stmt::Class { methods, .. } = &statements[1] else {
            panic!("expected class");
        };
        let Stmt::Return {
            value: Some(Expr::Call { callee, .. }),
            ..
        } = &methods[0].body[0]
        else {
            panic!("expected return super.m()");
        };
        let Expr::Super { id, .. } = callee.as_ref() else {
            panic!("expected super expression");
        };

        // Method scope → `this` scope → `super` scope: two hops.
        assert_eq!(locals.get(id), Some(&2));
    }

    #[test]
    fn test_globals_are_not_recorded() {
        let (_, locals) = resolve("var g = 1; print g; g = 2;").unwrap();

        assert!(locals.is_empty());
    }

    #[test]
    fn test_parameters_resolve_at_depth_zero() {
        let (statements, locals) = resolve("fun id(x) { return x; }").unwrap();

        let Stmt::Function(declaration) = &statements[0] else {
            panic!("expected function declaration");
        };
        let Stmt::Return {
            value: Some(Expr::Variable { id, .. }),
            ..
        } = &declaration.body[0]
        else {
            panic!("expected return x");
        };

        assert_eq!(locals.get(id), Some(&0));
    }
}
