//! Image round-trips: compile once, run from memory and from disk, and
//! confirm the observable output is identical.

use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use xvr::vm::Interpreter;
use xvr::{api, bytecode};

fn run_image(image: Vec<u8>) -> String {
    let mut interpreter = Interpreter::new();
    let printed = Rc::new(RefCell::new(String::new()));
    let sink = printed.clone();
    interpreter.set_print(move |text| sink.borrow_mut().push_str(text));
    api::run_bytes(&mut interpreter, image).expect("runs");
    let out = printed.borrow().clone();
    out
}

const PROGRAM: &str = r#"
    var total = 0;
    for (var i = 1; i <= 4; i++) {
        total += i;
    }
    fn describe(n: int) -> string {
        return "total:" + n astype string;
    }
    print describe(total);
"#;

#[test]
fn test_compile_is_deterministic() {
    let first = api::compile_str(PROGRAM).expect("compiles");
    let second = api::compile_str(PROGRAM).expect("compiles");
    assert_eq!(first, second);
}

#[test]
fn test_memory_and_disk_runs_match() {
    let image = api::compile_str(PROGRAM).expect("compiles");

    let from_memory = run_image(image.clone());

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("program.xb");
    bytecode::save(&image, &path).expect("save");
    let loaded = bytecode::load(&path).expect("load");
    let from_disk = run_image(loaded);

    assert_eq!(from_memory, "total:10");
    assert_eq!(from_memory, from_disk);
}

#[test]
fn test_header_carries_runtime_version() {
    let image = api::compile_str("print 1;").expect("compiles");
    let (header, _) = bytecode::read_header(&image).expect("header");
    assert_eq!(header.major, bytecode::VERSION_MAJOR);
    assert_eq!(header.minor, bytecode::VERSION_MINOR);
    assert_eq!(header.patch, bytecode::VERSION_PATCH);
    assert_eq!(header.build, bytecode::VERSION_BUILD);
}

#[test]
fn test_newer_minor_is_rejected() {
    let mut image = api::compile_str("print 1;").expect("compiles");
    image[1] = bytecode::VERSION_MINOR + 1;

    let mut interpreter = Interpreter::new();
    interpreter.set_error(|_| {});
    let result = interpreter.run(image);
    assert!(matches!(
        result,
        Err(xvr::RuntimeError::VersionMismatch(_))
    ));
    assert!(interpreter.panicked());
}

#[test]
fn test_different_major_is_rejected() {
    let mut image = api::compile_str("print 1;").expect("compiles");
    image[0] = bytecode::VERSION_MAJOR + 1;

    let mut interpreter = Interpreter::new();
    interpreter.set_error(|_| {});
    assert!(interpreter.run(image).is_err());
}

#[test]
fn test_older_minor_is_accepted() {
    if bytecode::VERSION_MINOR == 0 {
        return;
    }
    let mut image = api::compile_str("print 1;").expect("compiles");
    image[1] = bytecode::VERSION_MINOR - 1;

    let mut interpreter = Interpreter::new();
    interpreter.set_print(|_| {});
    assert!(interpreter.run(image).is_ok());
}

#[test]
fn test_truncated_image_is_rejected() {
    let image = api::compile_str("print 1;").expect("compiles");
    let truncated = image[..image.len() / 2].to_vec();

    let mut interpreter = Interpreter::new();
    interpreter.set_error(|_| {});
    assert!(interpreter.run(truncated).is_err());
}

#[test]
fn test_interpreter_reset_allows_reuse() {
    let image = api::compile_str("var x = 1; print x;").expect("compiles");

    let mut interpreter = Interpreter::new();
    let printed = Rc::new(RefCell::new(String::new()));
    let sink = printed.clone();
    interpreter.set_print(move |text| sink.borrow_mut().push_str(text));

    interpreter.run(image.clone()).expect("first run");
    // without a reset the second run would re-declare x
    interpreter.reset();
    interpreter.run(image).expect("second run");

    assert_eq!(printed.borrow().as_str(), "11");
}
