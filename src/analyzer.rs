//! Three-pass semantic analysis: type registration, member registration with
//! inheritance resolution, then a body walk with declaration and
//! compatibility checks. Every problem is reported into the shared bag and
//! analysis always runs to completion.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::ast::{
    Access, Annotation, Block, ClassDecl, CompilationUnit, Expr, Member, Stmt, TypeDecl, VarDecl,
};
use crate::diagnostics::DiagnosticBag;
use crate::symbols::{
    is_assignable, Symbol, SymbolKind, SymbolTable, TypeInfo, BUILTIN_CLASSES,
};
use crate::token::Pos;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Interface,
    Enum,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamInfo {
    pub name: String,
    pub ty: TypeInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub name: String,
    pub ty: TypeInfo,
    pub access: Access,
    pub is_static: bool,
    pub is_readonly: bool,
    /// Class that declared the field; differs from the owner after
    /// inheritance propagation.
    pub declared_in: String,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodInfo {
    pub name: String,
    pub return_type: TypeInfo,
    pub params: Vec<ParamInfo>,
    pub access: Access,
    pub is_static: bool,
    pub is_virtual: bool,
    pub is_override: bool,
    pub is_abstract: bool,
    pub declared_in: String,
    pub pos: Pos,
}

/// Per-class record. After inheritance resolution the member maps hold the
/// fully resolved set, base members first in base declaration order.
#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: String,
    pub kind: TypeKind,
    pub base: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: IndexMap<String, FieldInfo>,
    pub methods: IndexMap<String, MethodInfo>,
    pub has_constructor: bool,
    pub is_abstract: bool,
    pub is_sealed: bool,
    pub pos: Pos,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeprecationNote {
    pub message: Option<String>,
    pub version: Option<String>,
}

/// The analysis result handed to the emitter.
#[derive(Debug, Default)]
pub struct Analysis {
    pub classes: IndexMap<String, ClassInfo>,
    pub deprecated_classes: HashMap<String, DeprecationNote>,
    pub removed_classes: HashMap<String, DeprecationNote>,
    pub deprecated_methods: HashMap<String, DeprecationNote>,
    pub removed_methods: HashMap<String, DeprecationNote>,
}

impl Analysis {
    pub fn class(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name)
    }

    /// Walks the inheritance chain derived-to-base, starting at `name`.
    pub fn chain<'a>(&'a self, name: &str) -> Vec<&'a ClassInfo> {
        let mut chain = Vec::new();
        let mut current = self.classes.get(name);
        let mut seen = HashSet::new();
        while let Some(info) = current {
            if !seen.insert(info.name.clone()) {
                break;
            }
            chain.push(info);
            current = info.base.as_deref().and_then(|b| self.classes.get(b));
        }
        chain
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Class,
    Method,
}

pub fn analyze(unit: &mut CompilationUnit, bag: &mut DiagnosticBag) -> Analysis {
    let mut analyzer = Analyzer {
        bag,
        analysis: Analysis::default(),
        table: SymbolTable::new(),
    };
    analyzer.register_types(unit);
    analyzer.register_members(unit);
    analyzer.resolve_inheritance();
    analyzer.check_bodies(unit);
    analyzer.analysis
}

struct Analyzer<'a> {
    bag: &'a mut DiagnosticBag,
    analysis: Analysis,
    table: SymbolTable,
}

impl Analyzer<'_> {
    // ----- pass 1: type registration -----

    fn register_types(&mut self, unit: &CompilationUnit) {
        for decl in &unit.types {
            let name = decl.name().to_string();
            let pos = decl.pos();
            let kind = match decl {
                TypeDecl::Class(_) => TypeKind::Class,
                TypeDecl::Interface(_) => TypeKind::Interface,
                TypeDecl::Enum(_) => TypeKind::Enum,
            };
            let symbol_kind = match kind {
                TypeKind::Class => SymbolKind::Class,
                TypeKind::Interface => SymbolKind::Interface,
                TypeKind::Enum => SymbolKind::Enum,
            };

            if self.analysis.classes.contains_key(&name) {
                self.bag
                    .error(format!("type '{name}' is already declared"), pos);
                continue;
            }
            let _ = self
                .table
                .declare(Symbol::new(&name, symbol_kind, TypeInfo::new(&name), pos));

            let (base, interfaces, is_abstract, is_sealed) = match decl {
                TypeDecl::Class(class) => (
                    class.base.clone(),
                    class.interfaces.clone(),
                    class.modifiers.is_abstract,
                    class.modifiers.is_sealed,
                ),
                _ => (None, Vec::new(), false, false),
            };
            self.analysis.classes.insert(
                name.clone(),
                ClassInfo {
                    name: name.clone(),
                    kind,
                    base,
                    interfaces,
                    fields: IndexMap::new(),
                    methods: IndexMap::new(),
                    has_constructor: false,
                    is_abstract,
                    is_sealed,
                    pos,
                },
            );

            self.check_annotations(decl.annotations(), Placement::Class, &name, pos);
        }
    }

    // ----- pass 2: member registration -----

    fn register_members(&mut self, unit: &CompilationUnit) {
        for decl in &unit.types {
            let TypeDecl::Class(class) = decl else {
                continue;
            };
            for member in &class.members {
                match member {
                    Member::Field(field) => {
                        let info = FieldInfo {
                            name: field.name.clone(),
                            ty: TypeInfo::from_type_ref(&field.ty),
                            access: field.access,
                            is_static: field.modifiers.is_static,
                            is_readonly: field.modifiers.is_readonly,
                            declared_in: class.name.clone(),
                            pos: field.pos,
                        };
                        let class_info = self
                            .analysis
                            .classes
                            .get_mut(&class.name)
                            .expect("registered in pass 1");
                        if class_info.fields.contains_key(&field.name) {
                            self.bag.error(
                                format!(
                                    "field '{}' is already declared in class '{}'",
                                    field.name, class.name
                                ),
                                field.pos,
                            );
                        } else {
                            class_info.fields.insert(field.name.clone(), info);
                        }
                    }
                    Member::Method(method) => {
                        let info = MethodInfo {
                            name: method.name.clone(),
                            return_type: TypeInfo::from_type_ref(&method.return_type),
                            params: method
                                .params
                                .iter()
                                .map(|p| ParamInfo {
                                    name: p.name.clone(),
                                    ty: TypeInfo::from_type_ref(&p.ty),
                                })
                                .collect(),
                            access: method.access,
                            is_static: method.modifiers.is_static,
                            is_virtual: method.modifiers.is_virtual,
                            is_override: method.modifiers.is_override,
                            is_abstract: method.modifiers.is_abstract,
                            declared_in: class.name.clone(),
                            pos: method.pos,
                        };
                        let class_info = self
                            .analysis
                            .classes
                            .get_mut(&class.name)
                            .expect("registered in pass 1");
                        // Duplicate method names keep the first registration.
                        class_info.methods.entry(method.name.clone()).or_insert(info);

                        let key = format!("{}.{}", class.name, method.name);
                        self.check_annotations(
                            &method.annotations,
                            Placement::Method,
                            &key,
                            method.pos,
                        );
                    }
                    Member::Constructor(ctor) => {
                        let class_info = self
                            .analysis
                            .classes
                            .get_mut(&class.name)
                            .expect("registered in pass 1");
                        class_info.has_constructor = true;
                    }
                }
            }
        }
    }

    // ----- inheritance resolution -----

    fn resolve_inheritance(&mut self) {
        let names: Vec<String> = self.analysis.classes.keys().cloned().collect();
        let mut resolved = HashSet::new();
        for name in names {
            self.resolve_class(&name, &mut resolved);
        }
    }

    /// Resolves `name` after its base, copying base members the derived
    /// class does not shadow. The resolved set caps each class at one visit,
    /// which also neutralizes inheritance cycles.
    fn resolve_class(&mut self, name: &str, resolved: &mut HashSet<String>) {
        if !resolved.insert(name.to_string()) {
            return;
        }
        let Some(info) = self.analysis.classes.get(name) else {
            return;
        };
        let Some(base_name) = info.base.clone() else {
            return;
        };
        let pos = info.pos;

        if !self.analysis.classes.contains_key(&base_name) {
            self.bag
                .error(format!("undefined base class '{base_name}'"), pos);
            return;
        }
        self.resolve_class(&base_name, resolved);

        let base = self.analysis.classes[&base_name].clone();
        let derived = self
            .analysis
            .classes
            .get_mut(name)
            .expect("derived class present");

        let mut fields = IndexMap::new();
        for (field_name, field) in &base.fields {
            if !derived.fields.contains_key(field_name) {
                fields.insert(field_name.clone(), field.clone());
            }
        }
        fields.extend(derived.fields.drain(..));
        derived.fields = fields;

        let mut methods = IndexMap::new();
        for (method_name, method) in &base.methods {
            if !derived.methods.contains_key(method_name) {
                methods.insert(method_name.clone(), method.clone());
            }
        }
        methods.extend(derived.methods.drain(..));
        derived.methods = methods;

        for interface in &base.interfaces {
            if !derived.interfaces.contains(interface) {
                derived.interfaces.push(interface.clone());
            }
        }
    }

    // ----- pass 3: body analysis -----

    fn check_bodies(&mut self, unit: &mut CompilationUnit) {
        for decl in &mut unit.types {
            let TypeDecl::Class(class) = decl else {
                continue;
            };
            self.check_class_bodies(class);
        }
    }

    fn check_class_bodies(&mut self, class: &mut ClassDecl) {
        let class_name = class.name.clone();
        self.table.enter_scope();
        let _ = self.table.declare(Symbol::new(
            "this",
            SymbolKind::Variable,
            TypeInfo::new(&class_name),
            class.pos,
        ));
        let fields: Vec<FieldInfo> = self
            .analysis
            .classes
            .get(&class_name)
            .map(|info| info.fields.values().cloned().collect())
            .unwrap_or_default();
        for field in fields {
            let mut symbol = Symbol::new(&field.name, SymbolKind::Field, field.ty.clone(), field.pos);
            symbol.access = field.access;
            symbol.is_static = field.is_static;
            symbol.is_readonly = field.is_readonly;
            let _ = self.table.declare(symbol);
        }

        for member in &mut class.members {
            match member {
                Member::Method(method) => {
                    self.table.enter_scope();
                    for param in &method.params {
                        let symbol = Symbol::new(
                            &param.name,
                            SymbolKind::Parameter,
                            TypeInfo::from_type_ref(&param.ty),
                            param.pos,
                        );
                        if self.table.declare(symbol).is_err() {
                            self.bag.error(
                                format!("duplicate parameter '{}'", param.name),
                                param.pos,
                            );
                        }
                    }
                    if let Some(body) = &mut method.body {
                        self.check_block(body, &class_name);
                    }
                    self.table.exit_scope();
                }
                Member::Constructor(ctor) => {
                    self.table.enter_scope();
                    for param in &ctor.params {
                        let symbol = Symbol::new(
                            &param.name,
                            SymbolKind::Parameter,
                            TypeInfo::from_type_ref(&param.ty),
                            param.pos,
                        );
                        if self.table.declare(symbol).is_err() {
                            self.bag.error(
                                format!("duplicate parameter '{}'", param.name),
                                param.pos,
                            );
                        }
                    }
                    if let Some(args) = &ctor.base_args {
                        for arg in args {
                            self.check_expr(arg, &class_name);
                        }
                    }
                    self.check_block(&mut ctor.body, &class_name);
                    self.table.exit_scope();
                }
                Member::Field(field) => {
                    if let Some(init) = &field.initializer {
                        self.check_expr(init, &class_name);
                    }
                }
            }
        }
        self.table.exit_scope();
    }

    fn check_block(&mut self, block: &mut Block, class_name: &str) {
        self.table.enter_scope();
        for stmt in &mut block.statements {
            self.check_stmt(stmt, class_name);
        }
        self.table.exit_scope();
    }

    fn check_stmt(&mut self, stmt: &mut Stmt, class_name: &str) {
        match stmt {
            Stmt::Block(block) => self.check_block(block, class_name),
            Stmt::VarDecl(decl) => self.check_var_decl(decl, class_name),
            Stmt::Expr { expr, .. } => self.check_expr(expr, class_name),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                self.check_expr(condition, class_name);
                self.check_stmt(then_branch, class_name);
                if let Some(else_branch) = else_branch {
                    self.check_stmt(else_branch, class_name);
                }
            }
            Stmt::While {
                condition, body, ..
            } => {
                self.check_expr(condition, class_name);
                self.check_stmt(body, class_name);
            }
            Stmt::For {
                init,
                condition,
                step,
                body,
                ..
            } => {
                self.table.enter_scope();
                if let Some(init) = init {
                    self.check_stmt(init, class_name);
                }
                if let Some(condition) = condition {
                    self.check_expr(condition, class_name);
                }
                if let Some(step) = step {
                    self.check_expr(step, class_name);
                }
                self.check_stmt(body, class_name);
                self.table.exit_scope();
            }
            Stmt::Foreach {
                var_ty,
                var_name,
                iterable,
                body,
                pos,
            } => {
                self.check_expr(iterable, class_name);
                self.table.enter_scope();
                let ty = match var_ty {
                    Some(ty) => TypeInfo::from_type_ref(ty),
                    None => {
                        let iterable_ty = self.infer_expr(iterable);
                        if iterable_ty.is_array {
                            TypeInfo::new(&iterable_ty.name)
                        } else {
                            TypeInfo::new("object")
                        }
                    }
                };
                let symbol = Symbol::new(var_name.as_str(), SymbolKind::Variable, ty, *pos);
                if self.table.declare(symbol).is_err() {
                    self.bag.error(
                        format!("variable '{var_name}' is already declared in this scope"),
                        *pos,
                    );
                }
                self.check_stmt(body, class_name);
                self.table.exit_scope();
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    self.check_expr(value, class_name);
                }
            }
            Stmt::Break { .. } | Stmt::Continue { .. } => {}
        }
    }

    fn check_var_decl(&mut self, decl: &mut VarDecl, class_name: &str) {
        if let Some(init) = &decl.initializer {
            self.check_expr(init, class_name);
        }

        let resolved = match (&decl.ty, &decl.initializer) {
            (Some(ty), initializer) => {
                let declared = TypeInfo::from_type_ref(ty);
                if let Some(init) = initializer {
                    let init_ty = self.infer_expr(init);
                    if !is_assignable(&declared, &init_ty) {
                        self.bag.error(
                            format!(
                                "cannot initialize '{}' of type '{}' with a value of type \
                                 '{}'; an explicit cast is required",
                                decl.name, declared, init_ty
                            ),
                            decl.pos,
                        );
                    }
                }
                declared
            }
            (None, Some(init)) => self.infer_expr(init),
            (None, None) => {
                self.bag.error(
                    format!(
                        "variable '{}' needs an explicit type or an initializer",
                        decl.name
                    ),
                    decl.pos,
                );
                TypeInfo::new("object")
            }
        };

        decl.resolved_ty = Some(resolved.clone());

        let symbol = Symbol::new(&decl.name, SymbolKind::Variable, resolved, decl.pos);
        if self.table.declare(symbol).is_err() {
            self.bag.error(
                format!("variable '{}' is already declared in this scope", decl.name),
                decl.pos,
            );
        }
    }

    fn check_expr(&mut self, expr: &Expr, class_name: &str) {
        match expr {
            Expr::Identifier { name, pos } => {
                if self.table.lookup(name).is_none()
                    && !self.analysis.classes.contains_key(name)
                    && !BUILTIN_CLASSES.contains(&name.as_str())
                {
                    self.bag
                        .warning(format!("identifier '{name}' is not defined"), *pos);
                }
            }
            Expr::Unary { operand, .. } | Expr::Postfix { operand, .. } => {
                self.check_expr(operand, class_name);
            }
            Expr::Binary { left, right, .. } => {
                self.check_expr(left, class_name);
                self.check_expr(right, class_name);
            }
            Expr::Assign { target, value, .. } => {
                self.check_expr(target, class_name);
                self.check_expr(value, class_name);
            }
            Expr::Call { callee, args, pos } => {
                match callee.as_ref() {
                    Expr::MemberAccess { target, name, .. } => {
                        self.check_expr(target, class_name);
                        if let Some(target_class) = self.infer_target_class(target, class_name) {
                            self.check_use_of_class(&target_class, *pos);
                            self.check_use_of_method(&target_class, name, *pos);
                        }
                    }
                    // An unqualified call resolves to the enclosing class.
                    // Method names never live in the value scopes, so the
                    // generic identifier check would misfire on them.
                    Expr::Identifier { name, .. } => {
                        let is_sibling_method = self
                            .analysis
                            .classes
                            .get(class_name)
                            .is_some_and(|info| info.methods.contains_key(name));
                        if is_sibling_method {
                            self.check_use_of_method(class_name, name, *pos);
                        } else {
                            self.check_expr(callee, class_name);
                        }
                    }
                    _ => self.check_expr(callee, class_name),
                }
                for arg in args {
                    self.check_expr(arg, class_name);
                }
            }
            Expr::MemberAccess { target, .. } => {
                self.check_expr(target, class_name);
            }
            Expr::ObjectCreation {
                type_name,
                args,
                pos,
            } => {
                if !self.analysis.classes.contains_key(type_name)
                    && self.table.lookup(type_name).is_none()
                {
                    self.bag.warning(
                        format!("unknown type '{type_name}' in object creation"),
                        *pos,
                    );
                }
                self.check_use_of_class(type_name, *pos);
                for arg in args {
                    self.check_expr(arg, class_name);
                }
            }
            Expr::ArrayCreation { size, .. } => self.check_expr(size, class_name),
            Expr::ArrayAccess { target, index, .. } => {
                self.check_expr(target, class_name);
                self.check_expr(index, class_name);
            }
            Expr::Cast { expr, .. } => self.check_expr(expr, class_name),
            Expr::IntLiteral { .. }
            | Expr::FloatLiteral { .. }
            | Expr::StringLiteral { .. }
            | Expr::CharLiteral { .. }
            | Expr::BoolLiteral { .. }
            | Expr::NullLiteral { .. }
            | Expr::This { .. }
            | Expr::Base { .. } => {}
        }
    }

    /// Static class name of a method-call target, when it can be named:
    /// a local/parameter/field of class type, a class name used directly,
    /// or `this`.
    fn infer_target_class(&self, target: &Expr, class_name: &str) -> Option<String> {
        match target {
            Expr::This { .. } => Some(class_name.to_string()),
            Expr::Identifier { name, .. } => {
                if let Some(symbol) = self.table.lookup(name) {
                    match symbol.kind {
                        SymbolKind::Class | SymbolKind::Interface | SymbolKind::Enum => {
                            Some(name.clone())
                        }
                        _ if self.analysis.classes.contains_key(&symbol.ty.name) => {
                            Some(symbol.ty.name.clone())
                        }
                        _ => None,
                    }
                } else if self.analysis.classes.contains_key(name) {
                    Some(name.clone())
                } else {
                    None
                }
            }
            Expr::ObjectCreation { type_name, .. } => Some(type_name.clone()),
            _ => None,
        }
    }

    fn check_use_of_class(&mut self, name: &str, pos: Pos) {
        if let Some(note) = self.analysis.removed_classes.get(name) {
            self.bag
                .error(removal_message("class", name, note), pos);
        } else if let Some(note) = self.analysis.deprecated_classes.get(name) {
            self.bag
                .warning(deprecation_message("class", name, note), pos);
        }
    }

    fn check_use_of_method(&mut self, class: &str, method: &str, pos: Pos) {
        let key = format!("{class}.{method}");
        if let Some(note) = self.analysis.removed_methods.get(&key) {
            self.bag
                .error(removal_message("method", &key, note), pos);
        } else if let Some(note) = self.analysis.deprecated_methods.get(&key) {
            self.bag
                .warning(deprecation_message("method", &key, note), pos);
        }
    }

    // ----- type inference -----

    fn infer_expr(&self, expr: &Expr) -> TypeInfo {
        match expr {
            Expr::IntLiteral { .. } => TypeInfo::new("int"),
            Expr::FloatLiteral { .. } => TypeInfo::new("double"),
            Expr::StringLiteral { .. } => TypeInfo::new("string"),
            Expr::CharLiteral { .. } => TypeInfo::new("char"),
            Expr::BoolLiteral { .. } => TypeInfo::new("bool"),
            Expr::NullLiteral { .. } => TypeInfo::nullable("object"),
            Expr::ObjectCreation { type_name, .. } => TypeInfo::new(type_name),
            Expr::ArrayCreation { element_type, .. } => TypeInfo::array_of(&element_type.name),
            Expr::Identifier { name, .. } => self
                .table
                .lookup(name)
                .map(|symbol| symbol.ty.clone())
                .unwrap_or_else(|| TypeInfo::new("object")),
            _ => TypeInfo::new("object"),
        }
    }

    // ----- annotations -----

    fn check_annotations(
        &mut self,
        annotations: &[Annotation],
        placement: Placement,
        key: &str,
        pos: Pos,
    ) {
        let mut saw_deprecated = false;
        let mut saw_removed = false;

        for annotation in annotations {
            match annotation.name.as_str() {
                "Library" => {
                    self.check_arity(annotation, 2, 2);
                    if placement != Placement::Class {
                        self.bag.error(
                            "annotation '@Library' is only valid on classes",
                            annotation.pos,
                        );
                    }
                }
                "Deprecated" => {
                    self.check_arity(annotation, 0, 2);
                    saw_deprecated = true;
                    let note = self.note_from_args(&annotation.args);
                    match placement {
                        Placement::Class => {
                            self.analysis
                                .deprecated_classes
                                .insert(key.to_string(), note);
                        }
                        Placement::Method => {
                            self.analysis
                                .deprecated_methods
                                .insert(key.to_string(), note);
                        }
                    }
                    self.bag
                        .info(format!("'{key}' is marked deprecated"), pos);
                }
                "Removed" => {
                    self.check_arity(annotation, 0, 2);
                    saw_removed = true;
                    let note = self.note_from_args(&annotation.args);
                    match placement {
                        Placement::Class => {
                            self.analysis.removed_classes.insert(key.to_string(), note);
                        }
                        Placement::Method => {
                            self.analysis.removed_methods.insert(key.to_string(), note);
                        }
                    }
                    self.bag
                        .error(format!("'{key}' has been removed"), pos);
                }
                "Test" => {
                    self.check_arity(annotation, 0, 0);
                }
                // Unknown annotation names are accepted silently.
                _ => {}
            }
        }

        if saw_deprecated && saw_removed {
            self.bag.error(
                format!("'{key}' cannot be marked both deprecated and removed"),
                pos,
            );
        }
    }

    fn check_arity(&mut self, annotation: &Annotation, min: usize, max: usize) {
        let count = annotation.args.len();
        if count < min || count > max {
            let expected = if min == max {
                format!("exactly {min}")
            } else {
                format!("between {min} and {max}")
            };
            self.bag.error(
                format!(
                    "annotation '@{}' expects {expected} argument{}, got {count}",
                    annotation.name,
                    if max == 1 { "" } else { "s" },
                ),
                annotation.pos,
            );
        }
    }

    fn note_from_args(&self, args: &[Expr]) -> DeprecationNote {
        DeprecationNote {
            message: args.first().map(literal_text),
            version: args.get(1).map(literal_text),
        }
    }
}

/// Literal arguments render to their value; anything else falls back to the
/// printed expression.
fn literal_text(expr: &Expr) -> String {
    match expr {
        Expr::StringLiteral { value, .. } => value.clone(),
        Expr::IntLiteral { value, .. } | Expr::FloatLiteral { value, .. } => value.clone(),
        Expr::CharLiteral { value, .. } => value.to_string(),
        Expr::BoolLiteral { value, .. } => value.to_string(),
        other => crate::printer::expr_text(other),
    }
}

fn removal_message(what: &str, name: &str, note: &DeprecationNote) -> String {
    let mut message = format!("{what} '{name}' has been removed");
    if let Some(text) = &note.message {
        message.push_str(&format!(": {text}"));
    }
    if let Some(version) = &note.version {
        message.push_str(&format!(" (since {version})"));
    }
    message
}

fn deprecation_message(what: &str, name: &str, note: &DeprecationNote) -> String {
    let mut message = format!("{what} '{name}' is deprecated");
    if let Some(text) = &note.message {
        message.push_str(&format!(": {text}"));
    }
    if let Some(version) = &note.version {
        message.push_str(&format!(" (removal in {version})"));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;
    use crate::{lexer, parser};
    use indoc::indoc;

    fn analyze_source(source: &str) -> (Analysis, DiagnosticBag) {
        let mut bag = DiagnosticBag::new();
        let tokens = lexer::tokenize(source, &mut bag);
        let mut unit = parser::parse_unit(tokens, &mut bag);
        let analysis = analyze(&mut unit, &mut bag);
        (analysis, bag)
    }

    fn error_messages(bag: &DiagnosticBag) -> Vec<String> {
        bag.iter()
            .filter(|d| d.severity == Severity::Error)
            .map(|d| d.message.clone())
            .collect()
    }

    #[test]
    fn duplicate_type_names_error_once_per_extra_declaration() {
        let (_, bag) = analyze_source("class A { } class A { } class A { }");
        let errors = error_messages(&bag);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|m| m.contains("already declared")));
    }

    #[test]
    fn undefined_base_class_is_an_error() {
        let (_, bag) = analyze_source("class Dog : Animal { }");
        let errors = error_messages(&bag);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("undefined base class 'Animal'"));
    }

    #[test]
    fn inheritance_copies_base_members_without_collision() {
        let (analysis, bag) = analyze_source(indoc! {"
            class Animal {
                string name;
                int age;

                virtual string speak() {
                    return \"...\";
                }
            }

            class Dog : Animal {
                string breed;

                override string speak() {
                    return \"Woof!\";
                }
            }
        "});
        assert!(!bag.has_errors());
        let dog = analysis.class("Dog").expect("Dog resolved");
        assert_eq!(
            dog.fields.keys().collect::<Vec<_>>(),
            vec!["name", "age", "breed"],
        );
        assert_eq!(dog.fields["name"].declared_in, "Animal");
        assert_eq!(dog.fields["breed"].declared_in, "Dog");
        let speak = &dog.methods["speak"];
        assert_eq!(speak.declared_in, "Dog");
        assert!(speak.is_override);
    }

    #[test]
    fn inheritance_cycle_resolves_each_class_once() {
        let (analysis, _) = analyze_source("class A : B { } class B : A { }");
        // No hang, both classes present.
        assert!(analysis.class("A").is_some());
        assert!(analysis.class("B").is_some());
    }

    #[test]
    fn type_mismatch_names_both_types() {
        let (_, bag) = analyze_source(indoc! {"
            class Program {
                static void main() {
                    int a = \"teste\";
                }
            }
        "});
        let errors = error_messages(&bag);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("'int'"));
        assert!(errors[0].contains("'string'"));
        assert!(errors[0].contains("cast"));
    }

    #[test]
    fn int_widens_to_double_silently() {
        let (_, bag) = analyze_source(indoc! {"
            class Program {
                static void main() {
                    double d = 42;
                }
            }
        "});
        assert!(bag.is_empty(), "unexpected: {:?}", bag.sorted());
    }

    #[test]
    fn missing_type_and_initializer_is_an_error() {
        let (_, bag) = analyze_source(indoc! {"
            class Program {
                static void main() {
                    var ghost;
                }
            }
        "});
        let errors = error_messages(&bag);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("ghost"));
    }

    #[test]
    fn var_infers_from_initializer() {
        let mut bag = DiagnosticBag::new();
        let tokens = lexer::tokenize(
            indoc! {"
                class Program {
                    static void main() {
                        var n = 42;
                        var s = \"hi\";
                        var d = new Program();
                    }
                }
            "},
            &mut bag,
        );
        let mut unit = parser::parse_unit(tokens, &mut bag);
        analyze(&mut unit, &mut bag);
        assert!(!bag.has_errors());

        let TypeDecl::Class(class) = &unit.types[0] else {
            panic!()
        };
        let Member::Method(method) = &class.members[0] else {
            panic!()
        };
        let resolved: Vec<String> = method
            .body
            .as_ref()
            .unwrap()
            .statements
            .iter()
            .filter_map(|s| match s {
                Stmt::VarDecl(d) => d.resolved_ty.as_ref().map(|t| t.name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(resolved, vec!["int", "string", "Program"]);
    }

    #[test]
    fn duplicate_variable_in_same_scope_is_an_error() {
        let (_, bag) = analyze_source(indoc! {"
            class Program {
                static void main() {
                    int x = 1;
                    int x = 2;
                }
            }
        "});
        let errors = error_messages(&bag);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("'x' is already declared"));
    }

    #[test]
    fn shadowing_in_inner_block_is_allowed() {
        let (_, bag) = analyze_source(indoc! {"
            class Program {
                static void main() {
                    int x = 1;
                    {
                        int x = 2;
                    }
                }
            }
        "});
        assert!(!bag.has_errors());
    }

    #[test]
    fn duplicate_parameter_is_an_error() {
        let (_, bag) = analyze_source(indoc! {"
            class Program {
                void twice(int a, int a) {
                }
            }
        "});
        let errors = error_messages(&bag);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("duplicate parameter 'a'"));
    }

    #[test]
    fn undefined_identifier_is_a_warning_not_error() {
        let (_, bag) = analyze_source(indoc! {"
            class Program {
                static void main() {
                    Console.writeLine(mystery);
                }
            }
        "});
        assert!(!bag.has_errors());
        assert_eq!(bag.warning_count(), 1);
        let rendered: Vec<String> = bag.iter().map(|d| d.message.clone()).collect();
        assert!(rendered[0].contains("mystery"));
    }

    #[test]
    fn unqualified_sibling_method_call_does_not_warn() {
        let (_, bag) = analyze_source(indoc! {"
            class Calculator {
                int helper(int n) {
                    return n + 1;
                }

                static int twice(int n) {
                    return n * 2;
                }

                int run(int n) {
                    return helper(n - 1) + twice(n);
                }
            }
        "});
        assert!(bag.is_empty(), "unexpected: {:?}", bag.sorted());
    }

    #[test]
    fn unqualified_call_to_inherited_method_does_not_warn() {
        let (_, bag) = analyze_source(indoc! {"
            class Animal {
                int legs() {
                    return 4;
                }
            }

            class Dog : Animal {
                int legPairs() {
                    return legs() / 2;
                }
            }
        "});
        assert!(bag.is_empty(), "unexpected: {:?}", bag.sorted());
    }

    #[test]
    fn unknown_bare_call_still_warns() {
        let (_, bag) = analyze_source(indoc! {"
            class Program {
                static void main() {
                    ghost(1);
                }
            }
        "});
        assert!(!bag.has_errors());
        assert_eq!(bag.warning_count(), 1);
        assert!(bag.sorted()[0].message.contains("ghost"));
    }

    #[test]
    fn builtin_classes_do_not_warn() {
        let (_, bag) = analyze_source(indoc! {"
            class Program {
                static void main() {
                    Console.writeLine(Math.abs(0 - 5));
                    Memory.free(null);
                }
            }
        "});
        assert!(bag.is_empty(), "unexpected: {:?}", bag.sorted());
    }

    #[test]
    fn library_annotation_arity() {
        let (_, bag) = analyze_source("[@Library(\"M\")] class A { }");
        let errors = error_messages(&bag);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("@Library"));

        let (_, bag) = analyze_source("[@Library(\"M\", \"1.0\")] class A { }");
        assert!(!bag.has_errors());
    }

    #[test]
    fn removed_class_errors_at_declaration_and_every_use() {
        let (_, bag) = analyze_source(indoc! {"
            [@Removed]
            class Legacy { }

            class Program {
                static void main() {
                    var a = new Legacy();
                    var b = new Legacy();
                }
            }
        "});
        let errors = error_messages(&bag);
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|m| m.contains("removed")));
    }

    #[test]
    fn deprecated_method_warns_at_use_site() {
        let (_, bag) = analyze_source(indoc! {"
            class Api {
                [@Deprecated(\"use fetchAll\", \"2.0\")]
                int fetch() {
                    return 0;
                }
            }

            class Program {
                static void main() {
                    Api api = new Api();
                    api.fetch();
                }
            }
        "});
        assert!(!bag.has_errors());
        assert_eq!(bag.warning_count(), 1);
        let warning = bag
            .iter()
            .find(|d| d.severity == Severity::Warning)
            .unwrap();
        assert!(warning.message.contains("Api.fetch"));
        assert!(warning.message.contains("use fetchAll"));
        // Declaration site info.
        assert!(bag.iter().any(|d| d.severity == Severity::Info));
    }

    #[test]
    fn deprecated_and_removed_together_is_an_error() {
        let (_, bag) = analyze_source("[@Deprecated] [@Removed] class A { }");
        let errors = error_messages(&bag);
        assert!(errors
            .iter()
            .any(|m| m.contains("both deprecated and removed")));
    }

    #[test]
    fn unknown_annotations_are_accepted_silently() {
        let (_, bag) = analyze_source("[@Experimental] [@Custom(1, 2, 3)] class A { }");
        assert!(bag.is_empty(), "unexpected: {:?}", bag.sorted());
    }

    #[test]
    fn unknown_type_in_object_creation_warns() {
        let (_, bag) = analyze_source(indoc! {"
            class Program {
                static void main() {
                    var x = new Phantom();
                }
            }
        "});
        assert!(!bag.has_errors());
        assert_eq!(bag.warning_count(), 1);
    }
}
