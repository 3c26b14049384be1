//! Black-box scenarios driving the full lex -> parse -> check -> codegen ->
//! VM pipeline through `ivy_compiler::compile_and_run`.

use ivy_runtime::{BufferInput, BufferOutput};

fn run(src: &str) -> String {
    let mut out = BufferOutput::default();
    let mut input = BufferInput::new(Vec::<String>::new());
    ivy_compiler::compile_and_run(src, &mut out, &mut input).expect("program should run");
    out.buffer
}

#[test]
fn hello_world() {
    assert_eq!(run(r#"void main() { print("hello, world"); }"#), "hello, world");
}

#[test]
fn arithmetic_respects_parenthesized_grouping() {
    assert_eq!(run("void main() { print(itos((2 + 3) * 4)); }"), "20");
}

#[test]
fn overloaded_functions_dispatch_by_argument_count() {
    let src = r#"
        void greet(string name) { print("hi "); print(name); }
        void greet() { print("hi stranger"); }
        void main() {
            greet("ivy");
            greet();
        }
    "#;
    assert_eq!(run(src), "hi ivyhi stranger");
}

#[test]
fn for_loop_prints_ascending_indices() {
    let src = r#"
        void main() {
            for (int i = 0; i < 3; i = i + 1) {
                print(itos(i));
            }
        }
    "#;
    assert_eq!(run(src), "012");
}

#[test]
fn struct_fields_are_readable_and_writable() {
    let src = r#"
        struct Point { int x; int y; }
        void main() {
            Point p = new Point(1, 2);
            p.x = p.x + p.y;
            print(itos(p.x));
        }
    "#;
    assert_eq!(run(src), "3");
}

#[test]
fn arrays_support_indexed_read_and_write() {
    let src = r#"
        void main() {
            array int nums = new int[5];
            int i = 0;
            while (i < 5) {
                nums[i] = i * i;
                i = i + 1;
            }
            print(itos(nums[3]));
        }
    "#;
    assert_eq!(run(src), "9");
}

#[test]
fn division_floors_for_integers_and_floats_for_doubles() {
    let src = r#"
        void main() {
            print(itos(7 / 2));
            print(" ");
            print(dtos(7.0 / 2.0));
        }
    "#;
    assert_eq!(run(src), "3 3.5");
}

#[test]
fn division_floors_toward_negative_infinity_for_negative_divisors() {
    let src = r#"
        void main() {
            int n = 0 - 2;
            print(itos(7 / n));
        }
    "#;
    assert_eq!(run(src), "-4");
}

#[test]
fn struct_array_and_nested_field_path() {
    let src = r#"
        struct Cell { int value; }
        void main() {
            array Cell cells = new Cell[2];
            cells[0] = new Cell(9);
            print(itos(cells[0].value));
        }
    "#;
    assert_eq!(run(src), "9");
}

#[test]
fn syntax_errors_are_reported_without_panicking() {
    let mut out = BufferOutput::default();
    let mut input = BufferInput::new(Vec::<String>::new());
    let result = ivy_compiler::compile_and_run("void main( { }", &mut out, &mut input);
    assert!(result.is_err());
}
