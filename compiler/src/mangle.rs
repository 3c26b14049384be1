//! Name mangling for overloaded functions.
//!
//! A user-defined function's callable symbol in the virtual machine is its
//! unqualified name followed by one suffix per parameter type, e.g. two
//! declarations of `f` — one taking an `int`, one taking no arguments —
//! become the distinct VM-level symbols `f_int` and `f`. `main` is never
//! mangled (it takes no parameters and is the single designated entry
//! point, so the plain name already suffices as shorthand, matching what
//! the virtual machine looks up to start a run).

use crate::ast::DataType;

pub fn mangle(name: &str, param_types: &[DataType]) -> String {
    if param_types.is_empty() {
        return name.to_string();
    }
    let mut out = String::from(name);
    for ty in param_types {
        out.push('_');
        out.push_str(&type_suffix(ty));
    }
    out
}

fn type_suffix(ty: &DataType) -> String {
    if ty.is_array {
        format!("arr{}", ty.type_name)
    } else {
        ty.type_name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_params_is_unmangled() {
        assert_eq!(mangle("f", &[]), "f");
    }

    #[test]
    fn overloads_differ_by_suffix() {
        let int_param = [DataType::base("int")];
        assert_eq!(mangle("f", &int_param), "f_int");
        assert_eq!(mangle("f", &[]), "f");
    }

    #[test]
    fn array_params_get_arr_prefix() {
        let params = [DataType::array_of("int")];
        assert_eq!(mangle("sum", &params), "sum_arrint");
    }

    #[test]
    fn multiple_params_chain_suffixes() {
        let params = [DataType::base("int"), DataType::base("string")];
        assert_eq!(mangle("f", &params), "f_int_string");
    }
}
