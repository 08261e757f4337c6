//! Python built-ins the compiler knows how to lower.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFunction {
    Print,
    Len,
    Str,
    Int,
    Float,
    Bool,
    Abs,
    Min,
    Max,
    Sum,
    Range,
    Isinstance,
    Ord,
    Chr,
    Sorted,
    Enumerate,
    List,
    Dict,
    Set,
    Bytearray,
    Bytes,
}

impl BuiltinFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        let builtin = match name {
            "print" => Self::Print,
            "len" => Self::Len,
            "str" => Self::Str,
            "int" => Self::Int,
            "float" => Self::Float,
            "bool" => Self::Bool,
            "abs" => Self::Abs,
            "min" => Self::Min,
            "max" => Self::Max,
            "sum" => Self::Sum,
            "range" => Self::Range,
            "isinstance" => Self::Isinstance,
            "ord" => Self::Ord,
            "chr" => Self::Chr,
            "sorted" => Self::Sorted,
            "enumerate" => Self::Enumerate,
            "list" => Self::List,
            "dict" => Self::Dict,
            "set" => Self::Set,
            "bytearray" => Self::Bytearray,
            "bytes" => Self::Bytes,
            _ => return None,
        };
        Some(builtin)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Print => "print",
            Self::Len => "len",
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Abs => "abs",
            Self::Min => "min",
            Self::Max => "max",
            Self::Sum => "sum",
            Self::Range => "range",
            Self::Isinstance => "isinstance",
            Self::Ord => "ord",
            Self::Chr => "chr",
            Self::Sorted => "sorted",
            Self::Enumerate => "enumerate",
            Self::List => "list",
            Self::Dict => "dict",
            Self::Set => "set",
            Self::Bytearray => "bytearray",
            Self::Bytes => "bytes",
        }
    }

    /// Runtime helper taking the arguments unchanged, when one exists.
    pub fn runtime_helper(self) -> Option<&'static str> {
        let helper = match self {
            Self::Len => "py_len",
            Self::Str => "py_str",
            Self::Int => "py_int",
            Self::Float => "py_float",
            Self::Bool => "py_bool",
            Self::Min => "py_min",
            Self::Max => "py_max",
            Self::Sum => "py_sum",
            Self::Range => "py_range",
            Self::Ord => "py_ord",
            Self::Chr => "py_chr",
            Self::Sorted => "py_sorted",
            Self::Enumerate => "py_enumerate",
            Self::List => "py_list",
            Self::Bytearray => "py_bytearray",
            Self::Bytes => "py_bytes",
            Self::Print | Self::Abs | Self::Isinstance | Self::Dict | Self::Set => return None,
        };
        Some(helper)
    }
}

/// Container and string methods with a dedicated lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinMethod {
    Append,
    Extend,
    Insert,
    Pop,
    Clear,
    Get,
    Keys,
    Values,
    Items,
    Add,
    Discard,
    Remove,
    Upper,
    Lower,
    Strip,
    Lstrip,
    Rstrip,
    Startswith,
    Endswith,
    Replace,
    Split,
    Join,
    Find,
    Isdigit,
    Isalpha,
}

impl BuiltinMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        let method = match name {
            "append" => Self::Append,
            "extend" => Self::Extend,
            "insert" => Self::Insert,
            "pop" => Self::Pop,
            "clear" => Self::Clear,
            "get" => Self::Get,
            "keys" => Self::Keys,
            "values" => Self::Values,
            "items" => Self::Items,
            "add" => Self::Add,
            "discard" => Self::Discard,
            "remove" => Self::Remove,
            "upper" => Self::Upper,
            "lower" => Self::Lower,
            "strip" => Self::Strip,
            "lstrip" => Self::Lstrip,
            "rstrip" => Self::Rstrip,
            "startswith" => Self::Startswith,
            "endswith" => Self::Endswith,
            "replace" => Self::Replace,
            "split" => Self::Split,
            "join" => Self::Join,
            "find" => Self::Find,
            "isdigit" => Self::Isdigit,
            "isalpha" => Self::Isalpha,
            _ => return None,
        };
        Some(method)
    }

    /// C# type of the call's result, when it does not depend on the receiver.
    pub fn result_type(self) -> Option<&'static str> {
        let ty = match self {
            Self::Upper
            | Self::Lower
            | Self::Strip
            | Self::Lstrip
            | Self::Rstrip
            | Self::Replace
            | Self::Join => "string",
            Self::Startswith | Self::Endswith | Self::Isdigit | Self::Isalpha => "bool",
            Self::Split => "List<string>",
            Self::Find => "long",
            _ => return None,
        };
        Some(ty)
    }
}

/// C# exception class standing in for a Python built-in exception.
pub fn exception_class(name: &str) -> Option<&'static str> {
    let class = match name {
        "ZeroDivisionError" => "System.DivideByZeroException",
        "KeyError" => "System.Collections.Generic.KeyNotFoundException",
        "IndexError" => "System.IndexOutOfRangeException",
        "Exception" | "BaseException" | "ValueError" | "RuntimeError" | "TypeError"
        | "AssertionError" | "NotImplementedError" | "ArithmeticError" | "LookupError"
        | "OverflowError" | "AttributeError" | "OSError" | "IOError" | "StopIteration" => {
            "System.Exception"
        }
        _ => return None,
    };
    Some(class)
}

/// `math` module members lowered onto `System.Math`.
pub fn math_function(name: &str) -> Option<&'static str> {
    let target = match name {
        "sqrt" => "Math.Sqrt",
        "sin" => "Math.Sin",
        "cos" => "Math.Cos",
        "tan" => "Math.Tan",
        "atan" => "Math.Atan",
        "atan2" => "Math.Atan2",
        "exp" => "Math.Exp",
        "log" => "Math.Log",
        "log10" => "Math.Log10",
        "pow" => "Math.Pow",
        "fabs" => "Math.Abs",
        "floor" => "(long)Math.Floor",
        "ceil" => "(long)Math.Ceiling",
        _ => return None,
    };
    Some(target)
}

pub fn math_constant(name: &str) -> Option<&'static str> {
    match name {
        "pi" => Some("Math.PI"),
        "e" => Some("Math.E"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_builtin_names() {
        assert_eq!(BuiltinFunction::from_name("len"), Some(BuiltinFunction::Len));
        assert_eq!(BuiltinFunction::from_name("len").and_then(BuiltinFunction::runtime_helper), Some("py_len"));
        assert_eq!(BuiltinFunction::from_name("print").and_then(BuiltinFunction::runtime_helper), None);
        assert_eq!(BuiltinFunction::from_name("open"), None);
    }

    #[test]
    fn maps_exceptions_and_math() {
        assert_eq!(exception_class("ValueError"), Some("System.Exception"));
        assert_eq!(exception_class("ZeroDivisionError"), Some("System.DivideByZeroException"));
        assert_eq!(exception_class("MyError"), None);
        assert_eq!(math_function("floor"), Some("(long)Math.Floor"));
        assert_eq!(math_constant("pi"), Some("Math.PI"));
    }
}
