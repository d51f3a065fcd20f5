//! Whole-program parses: statements, recovery, and the unused checker
//! working together.

use pretty_assertions::assert_eq;
use xvr_parser::{parse, Ast, ParseError, UnusedChecker};

const PROGRAM: &str = r#"
// a small but representative program
var limit: int = 10;
var total = 0;

fn weight(n: int, scale: float) -> float {
    return n * scale;
}

for (var i = 0; i < limit; i++) {
    if (i % 2 == 0) {
        total += i;
    } else {
        continue;
    }
}

/* the report */
print "total: " + total astype string;
print weight(total, 1.5);
"#;

#[test]
fn test_whole_program_parses_cleanly() {
    let (nodes, errors) = parse(PROGRAM);
    assert!(errors.is_empty(), "errors: {:?}", errors.errors());
    assert_eq!(nodes.len(), 6);
    assert!(nodes.iter().all(|node| !node.has_error()));
    assert!(matches!(nodes[2], Ast::FnDecl { .. }));
    assert!(matches!(nodes[3], Ast::For { .. }));
}

#[test]
fn test_whole_program_has_no_unused_warnings() {
    let (nodes, errors) = parse(PROGRAM);
    assert!(errors.is_empty());
    let warnings = UnusedChecker::check(&nodes);
    assert_eq!(warnings, vec![]);
}

#[test]
fn test_recovery_spans_multiple_statements() {
    let source = r#"
        var a = 1;
        var = 2;
        print a;
        while (true { pass; }
        print a;
    "#;
    let (nodes, errors) = parse(source);
    assert!(errors.len() >= 2);
    // both print statements survive recovery
    let prints = nodes
        .iter()
        .filter(|node| matches!(node, Ast::Print { .. }))
        .count();
    assert_eq!(prints, 2);
}

#[test]
fn test_error_messages_carry_lines() {
    let source = "var x = 1;\nvar = 2;\n";
    let (_, errors) = parse(source);
    let first = errors.first().expect("one error");
    assert_eq!(first.span().line, 2);
    assert!(matches!(first, ParseError::UnexpectedToken { .. }));
}

#[test]
fn test_statement_shapes() {
    let source = r#"
        pass;
        break;
        continue;
        { pass; }
        import timer;
        assert true, "ok";
        return 1, 2;
    "#;
    // break/continue are parse-legal anywhere; the compiler rejects them
    // outside loops
    let (nodes, errors) = parse(source);
    assert!(errors.is_empty(), "errors: {:?}", errors.errors());
    assert!(matches!(nodes[0], Ast::Pass));
    assert!(matches!(nodes[1], Ast::Break { .. }));
    assert!(matches!(nodes[2], Ast::Continue { .. }));
    assert!(matches!(nodes[3], Ast::Block { .. }));
    assert!(matches!(nodes[4], Ast::Import { .. }));
    assert!(matches!(nodes[5], Ast::Assert { .. }));
    assert!(matches!(&nodes[6], Ast::FnReturn { values } if values.len() == 2));
}

#[test]
fn test_method_calls_and_slices_nest() {
    let source = "var tail = data[1:].length();";
    let (nodes, errors) = parse(source);
    assert!(errors.is_empty(), "errors: {:?}", errors.errors());
    match &nodes[0] {
        Ast::VarDecl {
            initializer: Some(init),
            ..
        } => match init.as_ref() {
            Ast::FnCall {
                name,
                receiver: Some(receiver),
                ..
            } => {
                assert_eq!(name, "length");
                assert!(matches!(receiver.as_ref(), Ast::Index { .. }));
            }
            other => panic!("expected method call, got {other:?}"),
        },
        other => panic!("expected var decl, got {other:?}"),
    }
}
