use std::collections::HashMap;
use std::fmt;

use crate::ast::{Access, TypeRef};
use crate::token::Pos;

/// Static-class names the emitter lowers directly to runtime functions.
/// No instance of these ever exists.
pub const BUILTIN_CLASSES: [&str; 3] = ["Console", "Math", "Memory"];

pub const NUMERIC_TYPES: [&str; 6] = ["byte", "short", "int", "long", "float", "double"];

/// A resolved type: name plus array/nullable flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    pub name: String,
    pub is_array: bool,
    pub is_nullable: bool,
}

impl TypeInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_array: false,
            is_nullable: false,
        }
    }

    pub fn array_of(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_array: true,
            is_nullable: false,
        }
    }

    pub fn nullable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_array: false,
            is_nullable: true,
        }
    }

    pub fn from_type_ref(ty: &TypeRef) -> Self {
        Self {
            name: ty.name.clone(),
            is_array: ty.is_array,
            is_nullable: ty.is_nullable,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !self.is_array && NUMERIC_TYPES.contains(&self.name.as_str())
    }

    pub fn is_primitive(&self) -> bool {
        !self.is_array
            && (self.is_numeric()
                || matches!(self.name.as_str(), "bool" | "char" | "string" | "void"))
    }

    pub fn is_void(&self) -> bool {
        self.name == "void" && !self.is_array
    }

    /// Reference types live on the GC heap: arrays, strings, and class
    /// instances. These are the slots the emitter registers as roots.
    pub fn is_reference(&self) -> bool {
        self.is_array || self.name == "string" || !self.is_primitive()
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if self.is_array {
            write!(f, "[]")?;
        }
        if self.is_nullable {
            write!(f, "?")?;
        }
        Ok(())
    }
}

/// Implicit numeric widening, strictly directional.
pub fn widens_to(from: &str, to: &str) -> bool {
    let wider: &[&str] = match from {
        "byte" => &["short", "int", "long", "float", "double"],
        "short" => &["int", "long", "float", "double"],
        "int" => &["long", "float", "double"],
        "long" => &["float", "double"],
        "float" => &["double"],
        _ => &[],
    };
    wider.contains(&to)
}

/// Declared-type vs. initializer-type compatibility, checked rule by rule.
pub fn is_assignable(declared: &TypeInfo, initializer: &TypeInfo) -> bool {
    // `object` and `void` cannot be verified.
    if declared.name == "object"
        || initializer.name == "object"
        || declared.is_void()
        || initializer.is_void()
    {
        return true;
    }
    if declared.is_array != initializer.is_array {
        return false;
    }
    if declared.name == initializer.name {
        return true;
    }
    if declared.is_numeric()
        && initializer.is_numeric()
        && widens_to(&initializer.name, &declared.name)
    {
        return true;
    }
    // null (a nullable initializer) may flow into any non-primitive slot.
    if initializer.is_nullable && !declared.is_primitive() {
        return true;
    }
    false
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Parameter,
    Field,
    Method,
    Constructor,
    Class,
    Interface,
    Enum,
    Module,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub ty: TypeInfo,
    pub access: Access,
    pub is_static: bool,
    pub is_readonly: bool,
    pub pos: Pos,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind, ty: TypeInfo, pos: Pos) -> Self {
        Self {
            name: name.into(),
            kind,
            ty,
            access: Access::Public,
            is_static: false,
            is_readonly: false,
            pos,
        }
    }
}

/// Lexically scoped name table. Scopes form a stack mirroring the walk
/// (global -> class -> method -> block...); `lookup` walks outward,
/// `lookup_local` does not.
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<HashMap<String, Symbol>>,
}

impl SymbolTable {
    /// A table whose global scope holds the built-in type registry.
    pub fn new() -> Self {
        let mut table = Self {
            scopes: vec![HashMap::new()],
        };
        for name in [
            "int", "long", "byte", "short", "float", "double", "bool", "char", "string",
            "void", "object",
        ] {
            table.insert_global(Symbol::new(
                name,
                SymbolKind::Class,
                TypeInfo::new(name),
                Pos::default(),
            ));
        }
        for name in BUILTIN_CLASSES {
            table.insert_global(Symbol::new(
                name,
                SymbolKind::Class,
                TypeInfo::new(name),
                Pos::default(),
            ));
        }
        table
    }

    fn insert_global(&mut self, symbol: Symbol) {
        self.scopes[0].insert(symbol.name.clone(), symbol);
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn exit_scope(&mut self) {
        debug_assert!(self.scopes.len() > 1, "cannot exit the global scope");
        self.scopes.pop();
    }

    /// Declares a symbol in the innermost scope. Returns the previous
    /// occupant when the name is already taken there.
    pub fn declare(&mut self, symbol: Symbol) -> Result<(), Symbol> {
        let scope = self
            .scopes
            .last_mut()
            .expect("symbol table always has a global scope");
        if let Some(existing) = scope.get(&symbol.name) {
            return Err(existing.clone());
        }
        scope.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
    }

    pub fn lookup_local(&self, name: &str) -> Option<&Symbol> {
        self.scopes.last().and_then(|scope| scope.get(name))
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_parent_scopes_but_local_does_not() {
        let mut table = SymbolTable::new();
        table.enter_scope();
        table
            .declare(Symbol::new(
                "x",
                SymbolKind::Variable,
                TypeInfo::new("int"),
                Pos::new(1, 1),
            ))
            .unwrap();
        table.enter_scope();

        assert!(table.lookup("x").is_some());
        assert!(table.lookup_local("x").is_none());
        table.exit_scope();
        assert!(table.lookup_local("x").is_some());
    }

    #[test]
    fn duplicate_declaration_in_same_scope_is_rejected() {
        let mut table = SymbolTable::new();
        table.enter_scope();
        let symbol = Symbol::new("x", SymbolKind::Variable, TypeInfo::new("int"), Pos::new(1, 1));
        table.declare(symbol.clone()).unwrap();
        assert!(table.declare(symbol).is_err());
    }

    #[test]
    fn globals_hold_builtin_registry() {
        let table = SymbolTable::new();
        for name in ["int", "string", "Console", "Math", "Memory"] {
            assert!(table.lookup(name).is_some(), "missing builtin {name}");
        }
    }

    #[test]
    fn widening_is_strictly_directional() {
        assert!(widens_to("byte", "double"));
        assert!(widens_to("int", "long"));
        assert!(widens_to("int", "float"));
        assert!(widens_to("long", "double"));
        assert!(!widens_to("double", "float"));
        assert!(!widens_to("long", "int"));
        assert!(!widens_to("int", "int"));
    }

    #[test]
    fn assignability_follows_spec_order() {
        let int = TypeInfo::new("int");
        let double = TypeInfo::new("double");
        let string = TypeInfo::new("string");
        let object = TypeInfo::new("object");
        let ints = TypeInfo::array_of("int");
        let null = TypeInfo::nullable("object");
        let dog = TypeInfo::new("Dog");

        assert!(is_assignable(&int, &object));
        assert!(is_assignable(&double, &int));
        assert!(!is_assignable(&int, &double));
        assert!(!is_assignable(&int, &string));
        assert!(!is_assignable(&int, &ints));
        assert!(is_assignable(&ints, &ints));
        assert!(is_assignable(&dog, &null));
        assert!(!is_assignable(&int, &TypeInfo::nullable("string")));
    }

    #[test]
    fn reference_predicate_covers_arrays_strings_and_classes() {
        assert!(TypeInfo::new("string").is_reference());
        assert!(TypeInfo::array_of("int").is_reference());
        assert!(TypeInfo::new("Dog").is_reference());
        assert!(!TypeInfo::new("int").is_reference());
        assert!(!TypeInfo::new("bool").is_reference());
    }
}
