//! Names and text the emitter commits to: the runtime ABI symbol families,
//! the ggLang-to-C type mapping, the translation-unit preamble, and C
//! literal escaping.

use crate::symbols::TypeInfo;

pub const C_HEADERS: &str = r#"#include <stdio.h>
#include <stdlib.h>
#include <string.h>
#include <stdbool.h>

"#;

pub const NO_GC_DEFINE: &str = "#define GG_NO_GC\n";

pub const RUNTIME_INCLUDE: &str = "#include \"gg_runtime.h\"\n\n";

/// C type for a resolved ggLang type. Classes become pointers to their
/// struct; arrays and strings are runtime handles.
pub fn c_type(ty: &TypeInfo) -> String {
    if ty.is_array {
        return "gg_array*".to_string();
    }
    match ty.name.as_str() {
        "int" => "int".to_string(),
        "long" => "long long".to_string(),
        "short" => "short".to_string(),
        "byte" => "unsigned char".to_string(),
        "float" => "float".to_string(),
        "double" => "double".to_string(),
        "bool" => "bool".to_string(),
        "char" => "char".to_string(),
        "string" => "gg_string*".to_string(),
        "void" => "void".to_string(),
        "object" => "void*".to_string(),
        name => format!("{name}*"),
    }
}

/// Element C type used for `gg_array_get_ptr` loads and `sizeof` in
/// `gg_array_new`.
pub fn c_element_type(name: &str) -> String {
    c_type(&TypeInfo::new(name))
}

/// `Console` members with a direct runtime counterpart. `write` and
/// `writeLine` lower to `printf` instead and are handled by the emitter.
pub fn console_fn(method: &str) -> Option<&'static str> {
    match method {
        "readLine" => Some("gg_console_readLine"),
        "readInt" => Some("gg_console_readInt"),
        _ => None,
    }
}

pub fn console_return_type(method: &str) -> Option<TypeInfo> {
    match method {
        "readLine" => Some(TypeInfo::new("string")),
        "readInt" => Some(TypeInfo::new("int")),
        "write" | "writeLine" => Some(TypeInfo::new("void")),
        _ => None,
    }
}

pub const MATH_FUNCTIONS: [&str; 11] = [
    "abs", "sqrt", "pow", "min", "max", "floor", "ceil", "sin", "cos", "tan", "log",
];

pub fn math_fn(method: &str) -> Option<String> {
    if MATH_FUNCTIONS.contains(&method) {
        Some(format!("gg_math_{method}"))
    } else {
        None
    }
}

pub fn math_return_type(method: &str) -> Option<TypeInfo> {
    match method {
        "floor" | "ceil" => Some(TypeInfo::new("int")),
        _ if MATH_FUNCTIONS.contains(&method) => Some(TypeInfo::new("double")),
        _ => None,
    }
}

/// Instance methods on `string` receivers.
pub fn string_method_fn(method: &str) -> Option<String> {
    let known = [
        "length",
        "substring",
        "contains",
        "toUpper",
        "toLower",
        "trim",
        "indexOf",
        "replace",
        "equals",
        "toString",
    ];
    if known.contains(&method) {
        Some(format!("gg_string_{method}"))
    } else {
        None
    }
}

pub fn string_method_return_type(method: &str) -> Option<TypeInfo> {
    match method {
        "length" | "indexOf" => Some(TypeInfo::new("int")),
        "contains" | "equals" => Some(TypeInfo::new("bool")),
        "substring" | "toUpper" | "toLower" | "trim" | "replace" | "toString" => {
            Some(TypeInfo::new("string"))
        }
        _ => None,
    }
}

/// Extension-method call on a primitive receiver:
/// `value.toString()` -> `gg_ext_int_toString(value)`.
pub fn ext_fn(receiver_type: &str, method: &str) -> String {
    format!("gg_ext_{receiver_type}_{method}")
}

pub fn ext_return_type(receiver_type: &str, method: &str) -> TypeInfo {
    match method {
        "toString" => TypeInfo::new("string"),
        "toInt" | "roundToInt" | "length" => TypeInfo::new("int"),
        "toLong" => TypeInfo::new("long"),
        "toDouble" => TypeInfo::new("double"),
        "toFloat" => TypeInfo::new("float"),
        "toBool" => TypeInfo::new("bool"),
        "toChar" => TypeInfo::new("char"),
        "round" | "ceil" | "floor" => TypeInfo::new("double"),
        // abs, clamp and the rest keep the receiver's type.
        _ => TypeInfo::new(receiver_type),
    }
}

pub fn escape_c_string(value: &str) -> String {
    let mut escaped = String::new();
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            '\0' => escaped.push_str("\\0"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

pub fn escape_c_char(value: char) -> String {
    match value {
        '\\' => "\\\\".to_string(),
        '\'' => "\\'".to_string(),
        '\n' => "\\n".to_string(),
        '\r' => "\\r".to_string(),
        '\t' => "\\t".to_string(),
        '\0' => "\\0".to_string(),
        c => c.to_string(),
    }
}
