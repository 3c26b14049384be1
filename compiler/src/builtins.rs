//! Fixed signatures for the built-in functions every program may call
//! without declaring them. Shared by the semantic checker (signature
//! checking) and the code generator (opcode selection).

use crate::ast::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinArity {
    /// Exactly the listed argument types (type names only — arrays are
    /// identified separately below for `length`).
    Fixed(&'static [&'static str]),
    /// `print`: one argument of any non-array base type.
    AnyBase,
    /// `length`: one argument, either a string or any array.
    StringOrArray,
    /// `input`: no arguments.
    None,
}

pub struct BuiltinSig {
    pub name: &'static str,
    pub arity: BuiltinArity,
    pub return_type: DataType,
}

pub const BUILTIN_NAMES: &[&str] = &[
    "print", "input", "itos", "itod", "dtos", "dtoi", "stoi", "stod", "length", "get",
];

pub fn lookup(name: &str) -> Option<BuiltinSig> {
    let dt = DataType::base;
    Some(match name {
        "print" => BuiltinSig {
            name: "print",
            arity: BuiltinArity::AnyBase,
            return_type: dt("void"),
        },
        "input" => BuiltinSig {
            name: "input",
            arity: BuiltinArity::None,
            return_type: dt("string"),
        },
        "itos" => BuiltinSig {
            name: "itos",
            arity: BuiltinArity::Fixed(&["int"]),
            return_type: dt("string"),
        },
        "itod" => BuiltinSig {
            name: "itod",
            arity: BuiltinArity::Fixed(&["int"]),
            return_type: dt("double"),
        },
        "dtos" => BuiltinSig {
            name: "dtos",
            arity: BuiltinArity::Fixed(&["double"]),
            return_type: dt("string"),
        },
        "dtoi" => BuiltinSig {
            name: "dtoi",
            arity: BuiltinArity::Fixed(&["double"]),
            return_type: dt("int"),
        },
        "stoi" => BuiltinSig {
            name: "stoi",
            arity: BuiltinArity::Fixed(&["string"]),
            return_type: dt("int"),
        },
        "stod" => BuiltinSig {
            name: "stod",
            arity: BuiltinArity::Fixed(&["string"]),
            return_type: dt("double"),
        },
        "length" => BuiltinSig {
            name: "length",
            arity: BuiltinArity::StringOrArray,
            return_type: dt("int"),
        },
        "get" => BuiltinSig {
            name: "get",
            arity: BuiltinArity::Fixed(&["int", "string"]),
            return_type: dt("string"),
        },
        _ => return None,
    })
}

/// The bytecode opcode a built-in call lowers to. Several builtins share
/// one opcode since the VM is untyped at runtime (`itos`/`dtos` both become
/// `TOSTR`, etc).
pub fn opcode_for(name: &str) -> Option<crate::codegen::BuiltinOp> {
    use crate::codegen::BuiltinOp::*;
    Some(match name {
        "print" => Write,
        "input" => Read,
        "itos" | "dtos" => ToStr,
        "itod" | "stod" => ToDbl,
        "dtoi" | "stoi" => ToInt,
        "length" => Len,
        "get" => Getc,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_builtin_names_resolve() {
        for name in BUILTIN_NAMES {
            assert!(lookup(name).is_some(), "missing signature for {name}");
            assert!(opcode_for(name).is_some(), "missing opcode for {name}");
        }
    }

    #[test]
    fn itos_and_dtos_share_tostr() {
        assert_eq!(opcode_for("itos"), opcode_for("dtos"));
    }
}
