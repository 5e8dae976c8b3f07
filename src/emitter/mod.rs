//! Lowers the analyzed AST to a single C translation unit targeting the
//! `gg_runtime` ABI: structs with embedded base fields, per-class vtables
//! with casting wrappers, constructor/factory pairs, GC root frames and
//! write barriers, and the `Program_main` entry point.
//!
//! The emitter assumes semantic analysis already ran and is gated on a
//! clean error count; it does not re-check types. Identifiers that only
//! produced warnings lower verbatim and are handed off to the C compiler.

use std::collections::{HashMap, HashSet};

use crate::analyzer::{Analysis, ClassInfo, MethodInfo};
use crate::ast::{
    ClassDecl, CompilationUnit, ConstructorDecl, EnumDecl, Expr, Member, MethodDecl, Stmt,
    TypeDecl, VarDecl,
};
use crate::config::ProjectConfig;
use crate::symbols::TypeInfo;

mod abi;

pub fn emit_unit(unit: &CompilationUnit, analysis: &Analysis, config: &ProjectConfig) -> String {
    let entry = find_entry(unit);
    let mut emitter = Emitter {
        analysis,
        config,
        typedefs: String::new(),
        structs: String::new(),
        protos: String::new(),
        impls: String::new(),
        scopes: Vec::new(),
        current_class: String::new(),
        entry: entry.clone(),
        temp_counter: 0,
    };

    for decl in &unit.types {
        match decl {
            TypeDecl::Class(class) => emitter.emit_class(class),
            TypeDecl::Enum(e) => emitter.emit_enum(e),
            TypeDecl::Interface(_) => {}
        }
    }
    if let Some(class_name) = &entry {
        if class_name != "Program" {
            emitter.protos.push_str("void Program_main(void);\n");
            emitter.impls.push_str(&format!(
                "void Program_main(void) {{\n    {class_name}_main();\n}}\n\n"
            ));
        }
    }

    let mut output = String::from(abi::C_HEADERS);
    if !config.gc_enabled() {
        output.push_str(abi::NO_GC_DEFINE);
    }
    output.push_str(abi::RUNTIME_INCLUDE);
    output.push_str(&emitter.typedefs);
    output.push('\n');
    output.push_str(&emitter.structs);
    output.push_str(&emitter.protos);
    output.push('\n');
    output.push_str(&emitter.impls);
    output
}

/// The class holding `static void main()`, when the unit has one.
fn find_entry(unit: &CompilationUnit) -> Option<String> {
    for decl in &unit.types {
        let TypeDecl::Class(class) = decl else {
            continue;
        };
        for member in &class.members {
            if let Member::Method(method) = member {
                if method.name == "main" && method.modifiers.is_static {
                    return Some(class.name.clone());
                }
            }
        }
    }
    None
}

/// A vtable slot: the signature comes from the root declaration, the
/// implementation from the most-derived definition.
struct Slot<'a> {
    decl: &'a MethodInfo,
    implementation: &'a MethodInfo,
}

struct Emitter<'a> {
    analysis: &'a Analysis,
    config: &'a ProjectConfig,
    typedefs: String,
    structs: String,
    protos: String,
    impls: String,
    /// Local/parameter types of the function being emitted, one map per
    /// lexical scope.
    scopes: Vec<HashMap<String, TypeInfo>>,
    current_class: String,
    entry: Option<String>,
    temp_counter: usize,
}

impl<'a> Emitter<'a> {
    // ----- per-class sections -----

    fn emit_class(&mut self, class: &ClassDecl) {
        let Some(info) = self.analysis.class(&class.name) else {
            return;
        };
        let info = info.clone();
        self.current_class = class.name.clone();

        self.typedefs
            .push_str(&format!("typedef struct {0} {0};\n", class.name));
        self.typedefs
            .push_str(&format!("typedef struct {0}_VTable {0}_VTable;\n", class.name));

        let slots = self.vtable_slots(&class.name);
        self.emit_vtable_struct(&class.name, &slots);
        self.emit_struct(&info);
        self.emit_static_fields(class, &info);

        let ctor = class.members.iter().find_map(|m| match m {
            Member::Constructor(c) => Some(c),
            _ => None,
        });
        self.emit_construct_prototype(&class.name, ctor);
        self.emit_create_prototype(&class.name, ctor);
        for member in &class.members {
            if let Member::Method(method) = member {
                self.protos
                    .push_str(&format!("{};\n", self.method_signature(&class.name, method)));
            }
        }
        for slot in &slots {
            if slot.implementation.declared_in != class.name && !slot.implementation.is_abstract {
                self.protos.push_str(&format!(
                    "static {};\n",
                    self.thunk_signature(&class.name, slot.decl)
                ));
            }
        }
        self.protos.push('\n');

        self.emit_thunks(&class.name, &slots);
        self.emit_vtable_instance(&class.name, &slots);
        self.emit_constructor(class, &info, ctor);
        self.emit_create(&class.name, ctor);
        for member in &class.members {
            if let Member::Method(method) = member {
                self.emit_method(class, method);
            }
        }
    }

    fn emit_enum(&mut self, e: &EnumDecl) {
        self.typedefs.push_str("typedef enum {\n");
        for (index, variant) in e.variants.iter().enumerate() {
            let comma = if index + 1 < e.variants.len() { "," } else { "" };
            self.typedefs
                .push_str(&format!("    {}_{}{}\n", e.name, variant, comma));
        }
        self.typedefs.push_str(&format!("}} {};\n", e.name));
    }

    /// Slot order walks the inheritance chain root-first so a derived
    /// vtable begins with its base's slots and a derived pointer can be
    /// reinterpreted as a base pointer.
    fn vtable_slots(&self, class_name: &str) -> Vec<Slot<'a>> {
        let chain = self.analysis.chain(class_name);
        let resolved = match self.analysis.class(class_name) {
            Some(info) => &info.methods,
            None => return Vec::new(),
        };

        let mut slots = Vec::new();
        let mut seen = HashSet::new();
        for &info in chain.iter().rev() {
            for method in info.methods.values() {
                if !(method.is_virtual || method.is_override) {
                    continue;
                }
                if method.declared_in != info.name {
                    continue;
                }
                if !seen.insert(method.name.clone()) {
                    continue;
                }
                if let Some(implementation) = resolved.get(&method.name) {
                    slots.push(Slot {
                        decl: method,
                        implementation,
                    });
                }
            }
        }
        slots
    }

    fn emit_vtable_struct(&mut self, class_name: &str, slots: &[Slot<'a>]) {
        self.structs
            .push_str(&format!("struct {class_name}_VTable {{\n"));
        if slots.is_empty() {
            self.structs.push_str("    void* __reserved;\n");
        }
        for slot in slots {
            let params = self.slot_params(class_name, slot.decl);
            self.structs.push_str(&format!(
                "    {} (*{})({});\n",
                abi::c_type(&slot.decl.return_type),
                slot.decl.name,
                params,
            ));
        }
        self.structs.push_str("};\n\n");
    }

    fn slot_params(&self, class_name: &str, decl: &MethodInfo) -> String {
        let mut params = vec![format!("{class_name}* self")];
        for param in &decl.params {
            params.push(format!("{} {}", abi::c_type(&param.ty), param.name));
        }
        params.join(", ")
    }

    /// The object layout: vtable pointer first, then all resolved instance
    /// fields, base-class fields embedded at the start.
    fn emit_struct(&mut self, info: &ClassInfo) {
        self.structs.push_str(&format!("struct {} {{\n", info.name));
        self.structs
            .push_str(&format!("    {}_VTable* vtable;\n", info.name));
        for field in info.fields.values() {
            if field.is_static {
                continue;
            }
            self.structs.push_str(&format!(
                "    {} {};\n",
                abi::c_type(&field.ty),
                field.name
            ));
        }
        self.structs.push_str("};\n\n");
    }

    fn emit_static_fields(&mut self, class: &ClassDecl, info: &ClassInfo) {
        for field in info.fields.values() {
            if !field.is_static || field.declared_in != class.name {
                continue;
            }
            let initializer = class.members.iter().find_map(|m| match m {
                Member::Field(f) if f.name == field.name => f.initializer.as_ref(),
                _ => None,
            });
            let init_text = match initializer {
                Some(Expr::IntLiteral { value, .. }) => format!(" = {value}"),
                Some(Expr::FloatLiteral { value, .. }) => format!(" = {value}"),
                Some(Expr::BoolLiteral { value, .. }) => format!(" = {value}"),
                Some(Expr::CharLiteral { value, .. }) => {
                    format!(" = '{}'", abi::escape_c_char(*value))
                }
                _ => String::new(),
            };
            self.structs.push_str(&format!(
                "static {} {}_{}{};\n",
                abi::c_type(&field.ty),
                class.name,
                field.name,
                init_text
            ));
        }
    }

    // ----- prototypes -----

    fn construct_params(&self, class_name: &str, ctor: Option<&ConstructorDecl>) -> String {
        let mut params = vec![format!("{class_name}* self")];
        if let Some(ctor) = ctor {
            for param in &ctor.params {
                params.push(format!(
                    "{} {}",
                    abi::c_type(&TypeInfo::from_type_ref(&param.ty)),
                    param.name
                ));
            }
        }
        params.join(", ")
    }

    fn create_params(&self, ctor: Option<&ConstructorDecl>) -> String {
        let params: Vec<String> = ctor
            .map(|c| {
                c.params
                    .iter()
                    .map(|p| {
                        format!(
                            "{} {}",
                            abi::c_type(&TypeInfo::from_type_ref(&p.ty)),
                            p.name
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        if params.is_empty() {
            "void".to_string()
        } else {
            params.join(", ")
        }
    }

    fn emit_construct_prototype(&mut self, class_name: &str, ctor: Option<&ConstructorDecl>) {
        self.protos.push_str(&format!(
            "void {}_construct({});\n",
            class_name,
            self.construct_params(class_name, ctor)
        ));
    }

    fn emit_create_prototype(&mut self, class_name: &str, ctor: Option<&ConstructorDecl>) {
        self.protos.push_str(&format!(
            "{0}* {0}_create({1});\n",
            class_name,
            self.create_params(ctor)
        ));
    }

    fn method_signature(&self, class_name: &str, method: &MethodDecl) -> String {
        let ret = abi::c_type(&TypeInfo::from_type_ref(&method.return_type));
        let mut params = Vec::new();
        if !method.modifiers.is_static {
            params.push(format!("{class_name}* self"));
        }
        for param in &method.params {
            params.push(format!(
                "{} {}",
                abi::c_type(&TypeInfo::from_type_ref(&param.ty)),
                param.name
            ));
        }
        let params = if params.is_empty() {
            "void".to_string()
        } else {
            params.join(", ")
        };
        format!("{ret} {class_name}_{}({params})", method.name)
    }

    fn thunk_signature(&self, class_name: &str, decl: &MethodInfo) -> String {
        format!(
            "{} {}_{}__thunk({})",
            abi::c_type(&decl.return_type),
            class_name,
            decl.name,
            self.slot_params(class_name, decl)
        )
    }

    // ----- implementations -----

    /// Inherited, non-overridden virtual slots point at wrappers that cast
    /// self down to the implementing class and forward the call.
    fn emit_thunks(&mut self, class_name: &str, slots: &[Slot<'a>]) {
        for slot in slots {
            let owner = &slot.implementation.declared_in;
            if owner == class_name || slot.implementation.is_abstract {
                continue;
            }
            self.impls
                .push_str(&format!("static {} {{\n", self.thunk_signature(class_name, slot.decl)));
            let args: Vec<String> = std::iter::once(format!("({owner}*)self"))
                .chain(slot.decl.params.iter().map(|p| p.name.clone()))
                .collect();
            let call = format!("{}_{}({})", owner, slot.decl.name, args.join(", "));
            if slot.decl.return_type.is_void() {
                self.impls.push_str(&format!("    {call};\n"));
            } else {
                self.impls.push_str(&format!("    return {call};\n"));
            }
            self.impls.push_str("}\n\n");
        }
    }

    fn emit_vtable_instance(&mut self, class_name: &str, slots: &[Slot<'a>]) {
        if slots.is_empty() {
            self.impls.push_str(&format!(
                "static {0}_VTable {0}_vtable = {{ 0 }};\n\n",
                class_name
            ));
            return;
        }
        self.impls
            .push_str(&format!("static {0}_VTable {0}_vtable = {{\n", class_name));
        for slot in slots {
            let target = if slot.implementation.is_abstract {
                "0".to_string()
            } else if slot.implementation.declared_in == class_name {
                format!("{}_{}", class_name, slot.decl.name)
            } else {
                format!("{}_{}__thunk", class_name, slot.decl.name)
            };
            self.impls
                .push_str(&format!("    .{} = {},\n", slot.decl.name, target));
        }
        self.impls.push_str("};\n\n");
    }

    /// Constructor order: base chain first, then the vtable pointer, then
    /// declared field initializers, then the constructor body.
    fn emit_constructor(
        &mut self,
        class: &ClassDecl,
        info: &ClassInfo,
        ctor: Option<&ConstructorDecl>,
    ) {
        let mut out = String::new();
        out.push_str(&format!(
            "void {}_construct({}) {{\n",
            class.name,
            self.construct_params(&class.name, ctor)
        ));
        out.push_str("    int __frame = gg_gc_push_root_frame();\n");
        out.push_str("    gg_gc_add_root(&self);\n");

        self.scopes.clear();
        let mut scope = HashMap::new();
        if let Some(ctor) = ctor {
            for param in &ctor.params {
                let ty = TypeInfo::from_type_ref(&param.ty);
                if ty.is_reference() {
                    out.push_str(&format!("    gg_gc_add_root(&{});\n", param.name));
                }
                scope.insert(param.name.clone(), ty);
            }
        }
        self.scopes.push(scope);

        if let Some(base) = &info.base {
            let args: Vec<String> = std::iter::once(format!("({base}*)self"))
                .chain(
                    ctor.and_then(|c| c.base_args.as_ref())
                        .into_iter()
                        .flatten()
                        .map(|arg| self.emit_expr(arg)),
                )
                .collect();
            out.push_str(&format!("    {base}_construct({});\n", args.join(", ")));
        }
        out.push_str(&format!("    self->vtable = &{}_vtable;\n", class.name));

        for member in &class.members {
            let Member::Field(field) = member else {
                continue;
            };
            if field.modifiers.is_static {
                continue;
            }
            if let Some(init) = &field.initializer {
                let value = self.emit_expr(init);
                out.push_str(&format!("    self->{} = {};\n", field.name, value));
            }
        }

        if let Some(ctor) = ctor {
            for stmt in &ctor.body.statements {
                self.emit_stmt(stmt, 1, &mut out);
            }
        }
        if !ends_with_return(ctor.map(|c| c.body.statements.as_slice()).unwrap_or(&[])) {
            out.push_str("    gg_gc_pop_root_frame(__frame);\n");
        }
        out.push_str("}\n\n");
        self.scopes.clear();
        self.impls.push_str(&out);
    }

    /// The factory allocates through the GC-aware allocator and runs the
    /// constructor with the allocation rooted.
    fn emit_create(&mut self, class_name: &str, ctor: Option<&ConstructorDecl>) {
        let mut out = String::new();
        out.push_str(&format!(
            "{0}* {0}_create({1}) {{\n",
            class_name,
            self.create_params(ctor)
        ));
        out.push_str("    int __frame = gg_gc_push_root_frame();\n");
        out.push_str(&format!(
            "    {0}* self = ({0}*)gg_alloc(sizeof({0}));\n",
            class_name
        ));
        out.push_str("    gg_gc_add_root(&self);\n");
        let args: Vec<String> = std::iter::once("self".to_string())
            .chain(
                ctor.map(|c| c.params.iter().map(|p| p.name.clone()).collect::<Vec<_>>())
                    .unwrap_or_default(),
            )
            .collect();
        out.push_str(&format!(
            "    {}_construct({});\n",
            class_name,
            args.join(", ")
        ));
        out.push_str("    gg_gc_pop_root_frame(__frame);\n");
        out.push_str("    return self;\n");
        out.push_str("}\n\n");
        self.impls.push_str(&out);
    }

    fn emit_method(&mut self, class: &ClassDecl, method: &MethodDecl) {
        let Some(body) = &method.body else {
            return;
        };
        let mut out = String::new();
        out.push_str(&format!("{} {{\n", self.method_signature(&class.name, method)));
        out.push_str("    int __frame = gg_gc_push_root_frame();\n");

        self.scopes.clear();
        let mut scope = HashMap::new();
        if !method.modifiers.is_static {
            out.push_str("    gg_gc_add_root(&self);\n");
        }
        for param in &method.params {
            let ty = TypeInfo::from_type_ref(&param.ty);
            if ty.is_reference() {
                out.push_str(&format!("    gg_gc_add_root(&{});\n", param.name));
            }
            scope.insert(param.name.clone(), ty);
        }
        self.scopes.push(scope);

        let is_entry = method.name == "main"
            && method.modifiers.is_static
            && self.entry.as_deref() == Some(class.name.as_str());
        if is_entry && !self.config.memory_limit.is_unlimited() {
            out.push_str(&format!(
                "    gg_gc_set_memory_limit({});\n",
                self.config.memory_limit.bytes()
            ));
        }

        for stmt in &body.statements {
            self.emit_stmt(stmt, 1, &mut out);
        }
        if !ends_with_return(&body.statements) {
            out.push_str("    gg_gc_pop_root_frame(__frame);\n");
        }
        out.push_str("}\n\n");
        self.scopes.clear();
        self.impls.push_str(&out);
    }

    // ----- statements -----

    fn push_line(&self, out: &mut String, indent: usize, line: &str) {
        for _ in 0..indent {
            out.push_str("    ");
        }
        out.push_str(line);
        out.push('\n');
    }

    fn emit_stmt(&mut self, stmt: &Stmt, indent: usize, out: &mut String) {
        match stmt {
            Stmt::Block(block) => {
                self.push_line(out, indent, "{");
                self.scopes.push(HashMap::new());
                for stmt in &block.statements {
                    self.emit_stmt(stmt, indent + 1, out);
                }
                self.scopes.pop();
                self.push_line(out, indent, "}");
            }
            Stmt::VarDecl(decl) => self.emit_var_decl(decl, indent, out),
            Stmt::Expr { expr, .. } => {
                if let Expr::Assign {
                    op, target, value, ..
                } = expr
                {
                    self.emit_assign_stmt(op, target, value, indent, out);
                } else {
                    let text = self.emit_expr(expr);
                    self.push_line(out, indent, &format!("{text};"));
                }
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                let cond = self.emit_expr(condition);
                self.push_line(out, indent, &format!("if ({cond}) {{"));
                self.emit_nested(then_branch, indent, out);
                match else_branch {
                    Some(else_branch) => {
                        self.push_line(out, indent, "} else {");
                        self.emit_nested(else_branch, indent, out);
                        self.push_line(out, indent, "}");
                    }
                    None => self.push_line(out, indent, "}"),
                }
            }
            Stmt::While {
                condition, body, ..
            } => {
                let cond = self.emit_expr(condition);
                self.push_line(out, indent, &format!("while ({cond}) {{"));
                self.emit_nested(body, indent, out);
                self.push_line(out, indent, "}");
            }
            Stmt::For {
                init,
                condition,
                step,
                body,
                ..
            } => {
                self.scopes.push(HashMap::new());
                let init_text = match init.as_deref() {
                    Some(Stmt::VarDecl(decl)) => self.var_decl_text(decl),
                    Some(Stmt::Expr { expr, .. }) => self.emit_expr(expr),
                    _ => String::new(),
                };
                let cond_text = condition
                    .as_ref()
                    .map(|c| self.emit_expr(c))
                    .unwrap_or_default();
                let step_text = step.as_ref().map(|s| self.emit_expr(s)).unwrap_or_default();
                self.push_line(
                    out,
                    indent,
                    &format!("for ({init_text}; {cond_text}; {step_text}) {{"),
                );
                self.emit_nested(body, indent, out);
                self.push_line(out, indent, "}");
                self.scopes.pop();
            }
            Stmt::Foreach {
                var_ty,
                var_name,
                iterable,
                body,
                ..
            } => {
                self.scopes.push(HashMap::new());
                self.temp_counter += 1;
                let seq = format!("__seq{}", self.temp_counter);
                let idx = format!("__i{}", self.temp_counter);
                let elem_ty = match var_ty {
                    Some(ty) => TypeInfo::from_type_ref(ty),
                    None => {
                        let iterable_ty = self.infer_type(iterable);
                        if iterable_ty.is_array {
                            TypeInfo::new(&iterable_ty.name)
                        } else {
                            TypeInfo::new("object")
                        }
                    }
                };
                let elem_cty = abi::c_type(&elem_ty);
                let iterable_text = self.emit_expr(iterable);

                self.push_line(out, indent, "{");
                self.push_line(
                    out,
                    indent + 1,
                    &format!("gg_array* {seq} = {iterable_text};"),
                );
                self.push_line(
                    out,
                    indent + 1,
                    &format!(
                        "for (int {idx} = 0; {idx} < gg_array_length({seq}); {idx}++) {{"
                    ),
                );
                self.push_line(
                    out,
                    indent + 2,
                    &format!(
                        "{elem_cty} {var_name} = *({elem_cty}*)gg_array_get_ptr({seq}, {idx});"
                    ),
                );
                if elem_ty.is_reference() {
                    self.push_line(out, indent + 2, &format!("gg_gc_add_root(&{var_name});"));
                }
                self.scopes
                    .last_mut()
                    .expect("scope pushed above")
                    .insert(var_name.clone(), elem_ty);
                self.emit_nested_statements(body, indent + 2, out);
                self.push_line(out, indent + 1, "}");
                self.push_line(out, indent, "}");
                self.scopes.pop();
            }
            Stmt::Return { value, .. } => {
                self.push_line(out, indent, "gg_gc_pop_root_frame(__frame);");
                match value {
                    Some(value) => {
                        let text = self.emit_expr(value);
                        self.push_line(out, indent, &format!("return {text};"));
                    }
                    None => self.push_line(out, indent, "return;"),
                }
            }
            Stmt::Break { .. } => self.push_line(out, indent, "break;"),
            Stmt::Continue { .. } => self.push_line(out, indent, "continue;"),
        }
    }

    fn emit_nested(&mut self, stmt: &Stmt, indent: usize, out: &mut String) {
        match stmt {
            Stmt::Block(block) => {
                self.scopes.push(HashMap::new());
                for stmt in &block.statements {
                    self.emit_stmt(stmt, indent + 1, out);
                }
                self.scopes.pop();
            }
            other => self.emit_stmt(other, indent + 1, out),
        }
    }

    fn emit_nested_statements(&mut self, stmt: &Stmt, indent: usize, out: &mut String) {
        match stmt {
            Stmt::Block(block) => {
                for stmt in &block.statements {
                    self.emit_stmt(stmt, indent, out);
                }
            }
            other => self.emit_stmt(other, indent, out),
        }
    }

    fn var_decl_type(&self, decl: &VarDecl) -> TypeInfo {
        if let Some(ty) = &decl.resolved_ty {
            return ty.clone();
        }
        if let Some(ty) = &decl.ty {
            return TypeInfo::from_type_ref(ty);
        }
        decl.initializer
            .as_ref()
            .map(|init| self.infer_type(init))
            .unwrap_or_else(|| TypeInfo::new("object"))
    }

    fn var_decl_text(&mut self, decl: &VarDecl) -> String {
        let ty = self.var_decl_type(decl);
        let cty = abi::c_type(&ty);
        let text = match &decl.initializer {
            Some(init) => format!("{cty} {} = {}", decl.name, self.emit_expr(init)),
            None if ty.is_reference() => format!("{cty} {} = NULL", decl.name),
            None => format!("{cty} {}", decl.name),
        };
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(decl.name.clone(), ty);
        }
        text
    }

    /// Reference locals are registered as GC roots at their declaration.
    fn emit_var_decl(&mut self, decl: &VarDecl, indent: usize, out: &mut String) {
        let ty = self.var_decl_type(decl);
        let text = self.var_decl_text(decl);
        self.push_line(out, indent, &format!("{text};"));
        if ty.is_reference() {
            self.push_line(out, indent, &format!("gg_gc_add_root(&{});", decl.name));
        }
    }

    /// Top-level assignments to reference slots route through the write
    /// barrier; array element stores go through the element pointer.
    fn emit_assign_stmt(
        &mut self,
        op: &str,
        target: &Expr,
        value: &Expr,
        indent: usize,
        out: &mut String,
    ) {
        if let Expr::ArrayAccess {
            target: array,
            index,
            ..
        } = target
        {
            let elem = self.element_type(array);
            let cty = abi::c_type(&elem);
            let array_text = self.emit_expr(array);
            let index_text = self.emit_expr(index);
            let value_text = self.emit_expr(value);
            self.push_line(
                out,
                indent,
                &format!("*({cty}*)gg_array_get_ptr({array_text}, {index_text}) {op} {value_text};"),
            );
            return;
        }

        let target_ty = self.infer_type(target);
        let lvalue = self.emit_expr(target);
        if target_ty.is_reference() {
            let new_value = match op {
                "=" => self.emit_expr(value),
                "+=" if target_ty.name == "string" && !target_ty.is_array => {
                    let value_text = self.emit_expr(value);
                    format!("gg_string_concat({lvalue}, {value_text})")
                }
                _ => {
                    let value_text = self.emit_expr(value);
                    self.push_line(out, indent, &format!("{lvalue} {op} {value_text};"));
                    return;
                }
            };
            self.push_line(
                out,
                indent,
                &format!("gg_gc_write_barrier((void**)&{lvalue}, {new_value});"),
            );
            return;
        }

        let value_text = self.emit_expr(value);
        self.push_line(out, indent, &format!("{lvalue} {op} {value_text};"));
    }

    // ----- expressions -----

    fn emit_expr(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::IntLiteral { value, .. } => value.clone(),
            Expr::FloatLiteral { value, .. } => value.clone(),
            Expr::StringLiteral { value, .. } => {
                format!("gg_string_from_cstr(\"{}\")", abi::escape_c_string(value))
            }
            Expr::CharLiteral { value, .. } => format!("'{}'", abi::escape_c_char(*value)),
            Expr::BoolLiteral { value, .. } => value.to_string(),
            Expr::NullLiteral { .. } => "NULL".to_string(),
            Expr::Identifier { name, .. } => self.identifier_text(name),
            Expr::This { .. } => "self".to_string(),
            Expr::Base { .. } => match self.base_class() {
                Some(base) => format!("(({base}*)self)"),
                None => "self".to_string(),
            },
            Expr::Unary { op, operand, .. } => {
                let operand = self.emit_expr(operand);
                format!("({op}{operand})")
            }
            Expr::Postfix { op, operand, .. } => {
                let operand = self.emit_expr(operand);
                format!("({operand}{op})")
            }
            Expr::Binary {
                op, left, right, ..
            } => {
                let left_ty = self.infer_type(left);
                let right_ty = self.infer_type(right);
                let left_text = self.emit_expr(left);
                let right_text = self.emit_expr(right);
                if op == "+" && (is_string(&left_ty) || is_string(&right_ty)) {
                    format!("gg_string_concat({left_text}, {right_text})")
                } else {
                    format!("({left_text} {op} {right_text})")
                }
            }
            Expr::Assign {
                op, target, value, ..
            } => {
                let target_text = self.emit_expr(target);
                let value_text = self.emit_expr(value);
                format!("({target_text} {op} {value_text})")
            }
            Expr::Call { callee, args, .. } => self.emit_call(callee, args),
            Expr::MemberAccess { target, name, .. } => self.emit_member_read(target, name),
            Expr::ObjectCreation {
                type_name, args, ..
            } => {
                let args = self.emit_args(args);
                format!("{type_name}_create({args})")
            }
            Expr::ArrayCreation {
                element_type, size, ..
            } => {
                let size_text = self.emit_expr(size);
                format!(
                    "gg_array_new(sizeof({}), {size_text})",
                    abi::c_element_type(&element_type.name)
                )
            }
            Expr::ArrayAccess { target, index, .. } => {
                let elem = self.element_type(target);
                let cty = abi::c_type(&elem);
                let target_text = self.emit_expr(target);
                let index_text = self.emit_expr(index);
                format!("(*({cty}*)gg_array_get_ptr({target_text}, {index_text}))")
            }
            Expr::Cast {
                expr, target_type, ..
            } => {
                let inner = self.emit_expr(expr);
                let cty = abi::c_type(&TypeInfo::from_type_ref(target_type));
                format!("(({cty}){inner})")
            }
        }
    }

    fn emit_args(&mut self, args: &[Expr]) -> String {
        let rendered: Vec<String> = args.iter().map(|arg| self.emit_expr(arg)).collect();
        rendered.join(", ")
    }

    /// Locals and parameters stay verbatim; fields of the current class
    /// lower to `self->name` (or the static global). Unresolved names are
    /// handed to the C compiler as-is.
    fn identifier_text(&self, name: &str) -> String {
        if self.lookup_local(name).is_some() {
            return name.to_string();
        }
        if let Some(info) = self.analysis.class(&self.current_class) {
            if let Some(field) = info.fields.get(name) {
                if field.is_static {
                    return format!("{}_{}", field.declared_in, name);
                }
                return format!("self->{name}");
            }
        }
        name.to_string()
    }

    fn emit_member_read(&mut self, target: &Expr, name: &str) -> String {
        if let Some(class_name) = self.static_class_target(target) {
            return format!("{class_name}_{name}");
        }
        let target_ty = self.infer_type(target);
        let target_text = self.emit_expr(target);
        if target_ty.is_array && name == "length" {
            return format!("gg_array_length({target_text})");
        }
        if is_string(&target_ty) && name == "length" {
            return format!("gg_string_length({target_text})");
        }
        format!("{target_text}->{name}")
    }

    fn emit_call(&mut self, callee: &Expr, args: &[Expr]) -> String {
        match callee {
            Expr::MemberAccess { target, name, .. } => self.emit_member_call(target, name, args),
            Expr::Identifier { name, .. } => self.emit_unqualified_call(name, args),
            other => {
                let callee_text = self.emit_expr(other);
                let args = self.emit_args(args);
                format!("{callee_text}({args})")
            }
        }
    }

    fn emit_member_call(&mut self, target: &Expr, name: &str, args: &[Expr]) -> String {
        // Built-in static classes lower straight to runtime functions.
        if let Expr::Identifier {
            name: target_name, ..
        } = target
        {
            if self.lookup_local(target_name).is_none() {
                match target_name.as_str() {
                    "Console" => return self.emit_console_call(name, args),
                    "Math" => {
                        let rendered = self.emit_args(args);
                        let function = abi::math_fn(name)
                            .unwrap_or_else(|| format!("gg_math_{name}"));
                        return format!("{function}({rendered})");
                    }
                    "Memory" => {
                        let rendered = self.emit_args(args);
                        return match name {
                            "alloc" => format!("Memory_alloc({rendered})"),
                            "free" => format!("Memory_free({rendered})"),
                            _ => format!("Memory_{name}({rendered})"),
                        };
                    }
                    _ => {}
                }
            }
        }

        if matches!(target, Expr::Base { .. }) {
            if let Some(base) = self.base_class() {
                let args_text = self.call_args(format!("({base}*)self"), args);
                return format!("{base}_{name}({args_text})");
            }
        }

        // Static method call on a class name.
        if let Some(class_name) = self.static_class_target(target) {
            if let Some(info) = self.analysis.class(&class_name) {
                if let Some(method) = info.methods.get(name) {
                    let owner = method.declared_in.clone();
                    let rendered = self.emit_args(args);
                    return format!("{owner}_{name}({rendered})");
                }
            }
            let rendered = self.emit_args(args);
            return format!("{class_name}_{name}({rendered})");
        }

        let target_ty = self.infer_type(target);
        let target_text = self.emit_expr(target);

        if is_string(&target_ty) {
            let function =
                abi::string_method_fn(name).unwrap_or_else(|| abi::ext_fn("string", name));
            let args_text = self.call_args(target_text, args);
            return format!("{function}({args_text})");
        }
        if target_ty.is_primitive() && !target_ty.is_array {
            let args_text = self.call_args(target_text, args);
            return format!("{}({args_text})", abi::ext_fn(&target_ty.name, name));
        }

        if let Some(info) = self.analysis.class(&target_ty.name) {
            if let Some(method) = info.methods.get(name) {
                if method.is_virtual || method.is_override {
                    let args_text = self.call_args(target_text.clone(), args);
                    return format!("{target_text}->vtable->{name}({args_text})");
                }
                let owner = method.declared_in.clone();
                let receiver = if owner == target_ty.name {
                    target_text
                } else {
                    format!("({owner}*){target_text}")
                };
                let args_text = self.call_args(receiver, args);
                return format!("{owner}_{name}({args_text})");
            }
        }

        // Unknown receiver type: hand off a plausible call.
        let args_text = self.call_args(target_text, args);
        format!("{name}({args_text})")
    }

    fn emit_unqualified_call(&mut self, name: &str, args: &[Expr]) -> String {
        if let Some(info) = self.analysis.class(&self.current_class) {
            if let Some(method) = info.methods.get(name) {
                let owner = method.declared_in.clone();
                if method.is_static {
                    let rendered = self.emit_args(args);
                    return format!("{owner}_{name}({rendered})");
                }
                let receiver = if owner == self.current_class {
                    "self".to_string()
                } else {
                    format!("({owner}*)self")
                };
                let args_text = self.call_args(receiver, args);
                return format!("{owner}_{name}({args_text})");
            }
        }
        let rendered = self.emit_args(args);
        format!("{name}({rendered})")
    }

    fn call_args(&mut self, receiver: String, args: &[Expr]) -> String {
        let mut rendered = vec![receiver];
        for arg in args {
            rendered.push(self.emit_expr(arg));
        }
        rendered.join(", ")
    }

    /// `Console.write`/`writeLine` need a format specifier, so the
    /// argument's type is inferred through the class table and the builtin
    /// return-type tables.
    fn emit_console_call(&mut self, name: &str, args: &[Expr]) -> String {
        match name {
            "write" | "writeLine" => {
                let newline = if name == "writeLine" { "\\n" } else { "" };
                let Some(arg) = args.first() else {
                    return format!("printf(\"{newline}\")");
                };
                let ty = self.infer_type(arg);
                let text = self.emit_expr(arg);
                match ty.name.as_str() {
                    _ if ty.is_array => format!("printf(\"%p{newline}\", (void*)({text}))"),
                    "int" | "long" | "short" | "byte" => {
                        format!("printf(\"%lld{newline}\", (long long)({text}))")
                    }
                    "float" | "double" => format!("printf(\"%g{newline}\", {text})"),
                    "string" => format!("printf(\"%s{newline}\", gg_string_cstr({text}))"),
                    "bool" => format!("printf(\"%s{newline}\", ({text}) ? \"true\" : \"false\")"),
                    "char" => format!("printf(\"%c{newline}\", {text})"),
                    _ => format!("printf(\"%p{newline}\", (void*)({text}))"),
                }
            }
            _ => {
                let rendered = self.emit_args(args);
                let function =
                    abi::console_fn(name).map(str::to_string).unwrap_or_else(|| {
                        format!("gg_console_{name}")
                    });
                format!("{function}({rendered})")
            }
        }
    }

    // ----- type inference -----

    fn lookup_local(&self, name: &str) -> Option<&TypeInfo> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn is_class_name(&self, name: &str) -> bool {
        self.analysis.classes.contains_key(name)
    }

    fn base_class(&self) -> Option<String> {
        self.analysis
            .class(&self.current_class)
            .and_then(|info| info.base.clone())
    }

    /// A target expression that names a class (not an instance): used for
    /// static calls and static field access.
    fn static_class_target(&self, target: &Expr) -> Option<String> {
        let Expr::Identifier { name, .. } = target else {
            return None;
        };
        if self.lookup_local(name).is_some() {
            return None;
        }
        if let Some(info) = self.analysis.class(&self.current_class) {
            if info.fields.contains_key(name) {
                return None;
            }
        }
        if self.is_class_name(name) {
            return Some(name.clone());
        }
        None
    }

    fn element_type(&self, array: &Expr) -> TypeInfo {
        let ty = self.infer_type(array);
        if ty.is_array {
            TypeInfo::new(&ty.name)
        } else {
            TypeInfo::new("object")
        }
    }

    fn infer_type(&self, expr: &Expr) -> TypeInfo {
        match expr {
            Expr::IntLiteral { .. } => TypeInfo::new("int"),
            Expr::FloatLiteral { .. } => TypeInfo::new("double"),
            Expr::StringLiteral { .. } => TypeInfo::new("string"),
            Expr::CharLiteral { .. } => TypeInfo::new("char"),
            Expr::BoolLiteral { .. } => TypeInfo::new("bool"),
            Expr::NullLiteral { .. } => TypeInfo::nullable("object"),
            Expr::Identifier { name, .. } => {
                if let Some(ty) = self.lookup_local(name) {
                    return ty.clone();
                }
                if let Some(info) = self.analysis.class(&self.current_class) {
                    if let Some(field) = info.fields.get(name) {
                        return field.ty.clone();
                    }
                }
                if self.is_class_name(name) {
                    return TypeInfo::new(name);
                }
                TypeInfo::new("object")
            }
            Expr::This { .. } => TypeInfo::new(&self.current_class),
            Expr::Base { .. } => self
                .base_class()
                .map(TypeInfo::new)
                .unwrap_or_else(|| TypeInfo::new("object")),
            Expr::Unary { op, operand, .. } => {
                if op == "!" {
                    TypeInfo::new("bool")
                } else {
                    self.infer_type(operand)
                }
            }
            Expr::Postfix { operand, .. } => self.infer_type(operand),
            Expr::Binary {
                op, left, right, ..
            } => match op.as_str() {
                "==" | "!=" | "<" | ">" | "<=" | ">=" | "&&" | "||" => TypeInfo::new("bool"),
                "+" if is_string(&self.infer_type(left)) || is_string(&self.infer_type(right)) => {
                    TypeInfo::new("string")
                }
                _ => promote_numeric(&self.infer_type(left), &self.infer_type(right)),
            },
            Expr::Assign { target, .. } => self.infer_type(target),
            Expr::Call { callee, .. } => self.call_return_type(callee),
            Expr::MemberAccess { target, name, .. } => {
                let target_ty = self.infer_type(target);
                if target_ty.is_array && name == "length" {
                    return TypeInfo::new("int");
                }
                if let Some(class_name) = self.static_class_target(target) {
                    if let Some(info) = self.analysis.class(&class_name) {
                        if let Some(field) = info.fields.get(name) {
                            return field.ty.clone();
                        }
                    }
                    return TypeInfo::new("object");
                }
                if let Some(info) = self.analysis.class(&target_ty.name) {
                    if let Some(field) = info.fields.get(name) {
                        return field.ty.clone();
                    }
                }
                TypeInfo::new("object")
            }
            Expr::ObjectCreation { type_name, .. } => TypeInfo::new(type_name),
            Expr::ArrayCreation { element_type, .. } => TypeInfo::array_of(&element_type.name),
            Expr::ArrayAccess { target, .. } => self.element_type(target),
            Expr::Cast { target_type, .. } => TypeInfo::from_type_ref(target_type),
        }
    }

    fn call_return_type(&self, callee: &Expr) -> TypeInfo {
        match callee {
            Expr::MemberAccess { target, name, .. } => {
                if let Expr::Identifier {
                    name: target_name, ..
                } = target.as_ref()
                {
                    if self.lookup_local(target_name).is_none() {
                        match target_name.as_str() {
                            "Console" => {
                                return abi::console_return_type(name)
                                    .unwrap_or_else(|| TypeInfo::new("void"));
                            }
                            "Math" => {
                                return abi::math_return_type(name)
                                    .unwrap_or_else(|| TypeInfo::new("double"));
                            }
                            "Memory" => {
                                return match name.as_str() {
                                    "alloc" => TypeInfo::new("object"),
                                    _ => TypeInfo::new("void"),
                                };
                            }
                            _ => {}
                        }
                    }
                }
                if let Some(class_name) = self.static_class_target(target) {
                    if let Some(info) = self.analysis.class(&class_name) {
                        if let Some(method) = info.methods.get(name) {
                            return method.return_type.clone();
                        }
                    }
                    return TypeInfo::new("object");
                }
                let target_ty = self.infer_type(target);
                if is_string(&target_ty) {
                    return abi::string_method_return_type(name)
                        .unwrap_or_else(|| TypeInfo::new("object"));
                }
                if target_ty.is_primitive() && !target_ty.is_array {
                    return abi::ext_return_type(&target_ty.name, name);
                }
                if let Some(info) = self.analysis.class(&target_ty.name) {
                    if let Some(method) = info.methods.get(name) {
                        return method.return_type.clone();
                    }
                }
                TypeInfo::new("object")
            }
            Expr::Identifier { name, .. } => self
                .analysis
                .class(&self.current_class)
                .and_then(|info| info.methods.get(name))
                .map(|method| method.return_type.clone())
                .unwrap_or_else(|| TypeInfo::new("object")),
            _ => TypeInfo::new("object"),
        }
    }
}

fn is_string(ty: &TypeInfo) -> bool {
    ty.name == "string" && !ty.is_array
}

fn promote_numeric(left: &TypeInfo, right: &TypeInfo) -> TypeInfo {
    fn rank(name: &str) -> Option<u8> {
        match name {
            "byte" => Some(0),
            "short" => Some(1),
            "int" => Some(2),
            "long" => Some(3),
            "float" => Some(4),
            "double" => Some(5),
            _ => None,
        }
    }
    match (rank(&left.name), rank(&right.name)) {
        (Some(l), Some(r)) => {
            if l >= r {
                left.clone()
            } else {
                right.clone()
            }
        }
        (Some(_), None) => left.clone(),
        (None, Some(_)) => right.clone(),
        (None, None) => TypeInfo::new("int"),
    }
}

fn ends_with_return(statements: &[Stmt]) -> bool {
    matches!(statements.last(), Some(Stmt::Return { .. }))
}
