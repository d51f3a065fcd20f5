//! Host-side integration: installing natives, calling script functions
//! from the host, and carrying opaque values through script code.

use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use xvr::api;
use xvr::vm::Interpreter;
use xvr::{OpaqueValue, Value, ValueArray};

fn doubler(interpreter: &mut Interpreter, args: &mut ValueArray) -> i32 {
    if args.len() != 1 {
        return -1;
    }
    let mut value = args.get_copy(0).expect("arity checked");
    if interpreter.resolve_value(&mut value).is_err() {
        return -1;
    }
    match value {
        Value::Integer(i) => {
            interpreter.push_value(Value::Integer(i * 2));
            1
        }
        _ => -1,
    }
}

#[test]
fn test_installed_native_is_callable_from_scripts() {
    let mut interpreter = Interpreter::new();
    interpreter.install_native("double", doubler);

    let printed = Rc::new(RefCell::new(String::new()));
    let sink = printed.clone();
    interpreter.set_print(move |text| sink.borrow_mut().push_str(text));

    api::run_str(&mut interpreter, "print double(21);").expect("runs");
    assert_eq!(printed.borrow().as_str(), "42");
}

#[test]
fn test_native_arity_failure_propagates() {
    let mut interpreter = Interpreter::new();
    interpreter.install_native("double", doubler);
    interpreter.set_error(|_| {});
    assert!(api::run_str(&mut interpreter, "double(1, 2);").is_err());
}

#[test]
fn test_call_fn_from_host() {
    let mut interpreter = Interpreter::new();
    interpreter.set_print(|_| {});
    api::run_str(
        &mut interpreter,
        "fn add(a: int, b: int) -> int { return a + b; }",
    )
    .expect("declares");

    let args: ValueArray = vec![Value::Integer(2), Value::Integer(3)].into();
    let returns = interpreter.call_fn("add", args).expect("calls");
    assert_eq!(returns.len(), 1);
    assert_eq!(returns.get_copy(0), Some(Value::Integer(5)));
}

#[test]
fn test_call_fn_missing_function() {
    let mut interpreter = Interpreter::new();
    assert!(interpreter.call_fn("nothing", ValueArray::new()).is_err());
}

#[test]
fn test_call_fn_reaches_natives() {
    let mut interpreter = Interpreter::new();
    interpreter.install_native("double", doubler);
    let args: ValueArray = vec![Value::Integer(4)].into();
    let returns = interpreter.call_fn("double", args).expect("calls");
    assert_eq!(returns.get_copy(0), Some(Value::Integer(8)));
}

#[derive(Debug, PartialEq)]
struct HostHandle {
    label: String,
}

const HANDLE_TAG: i32 = 7;

fn make_handle(interpreter: &mut Interpreter, args: &mut ValueArray) -> i32 {
    if !args.is_empty() {
        return -1;
    }
    let handle = OpaqueValue::new(
        HostHandle {
            label: "payload".to_string(),
        },
        HANDLE_TAG,
    );
    interpreter.push_value(Value::Opaque(handle));
    1
}

fn read_handle(interpreter: &mut Interpreter, args: &mut ValueArray) -> i32 {
    if args.len() != 1 {
        return -1;
    }
    let mut value = args.get_copy(0).expect("arity checked");
    if interpreter.resolve_value(&mut value).is_err() {
        return -1;
    }
    let Value::Opaque(opaque) = value else {
        return -1;
    };
    let Some(handle) = opaque.downcast::<HostHandle>(HANDLE_TAG) else {
        return -1;
    };
    interpreter.push_value(Value::string(&handle.label));
    1
}

#[test]
fn test_opaque_values_travel_through_scripts() {
    let mut interpreter = Interpreter::new();
    interpreter.install_native("make_handle", make_handle);
    interpreter.install_native("read_handle", read_handle);

    let printed = Rc::new(RefCell::new(String::new()));
    let sink = printed.clone();
    interpreter.set_print(move |text| sink.borrow_mut().push_str(text));

    let source = r#"
        var h = make_handle();
        print read_handle(h);
    "#;
    api::run_str(&mut interpreter, source).expect("runs");
    assert_eq!(printed.borrow().as_str(), "payload");
}

fn config_reader(interpreter: &mut Interpreter, args: &mut ValueArray) -> i32 {
    if args.len() != 1 {
        return -1;
    }
    let mut key = args.get_copy(0).expect("arity checked");
    if interpreter.resolve_value(&mut key).is_err() {
        return -1;
    }
    let value = interpreter.config().get(&key);
    interpreter.push_value(value);
    1
}

#[test]
fn test_configuration_dictionary_reaches_natives() {
    let mut interpreter = Interpreter::new();
    interpreter
        .config_mut()
        .set(Value::string("mode"), Value::string("strict"));
    interpreter.install_native("config", config_reader);

    let printed = Rc::new(RefCell::new(String::new()));
    let sink = printed.clone();
    interpreter.set_print(move |text| sink.borrow_mut().push_str(text));

    api::run_str(&mut interpreter, "print config(\"mode\");").expect("runs");
    assert_eq!(printed.borrow().as_str(), "strict");
}

#[test]
fn test_value_copy_semantics_across_the_boundary() {
    // values returned from call_fn are copies; mutating them does not
    // disturb the interpreter's state
    let mut interpreter = Interpreter::new();
    interpreter.set_print(|_| {});
    api::run_str(
        &mut interpreter,
        "var data = [1,2,3]; fn snapshot() -> array { return data; }",
    )
    .expect("declares");

    let returns = interpreter
        .call_fn("snapshot", ValueArray::new())
        .expect("calls");
    let mut copy = returns.get_copy(0).expect("one return");
    if let Value::Array(array) = &mut copy {
        array.set(0, Value::Integer(99));
    }

    let fresh = interpreter
        .call_fn("snapshot", ValueArray::new())
        .expect("calls again");
    match fresh.get_copy(0) {
        Some(Value::Array(array)) => assert_eq!(array.get_copy(0), Some(Value::Integer(1))),
        other => panic!("expected an array, got {other:?}"),
    }
}
