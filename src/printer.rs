//! Canonical-source renderer for a parsed compilation unit.
//!
//! Printing a parsed AST and re-parsing the output yields a structurally
//! equal AST (positions excepted); the round trip is asserted in tests.

use crate::ast::{
    Access, Annotation, Block, ClassDecl, CompilationUnit, ConstructorDecl, EnumDecl, Expr,
    FieldDecl, InterfaceDecl, Member, MethodDecl, Modifiers, Stmt, TypeDecl, TypeRef, VarDecl,
};

pub fn print_unit(unit: &CompilationUnit) -> String {
    let mut p = Printer::default();
    if let Some(module) = &unit.module {
        p.line(&format!("module {};", module.name));
        p.blank();
    }
    for import in &unit.imports {
        p.line(&format!("import {};", import.name));
    }
    if !unit.imports.is_empty() {
        p.blank();
    }
    for decl in &unit.types {
        match decl {
            TypeDecl::Class(class) => p.class_decl(class),
            TypeDecl::Interface(iface) => p.interface_decl(iface),
            TypeDecl::Enum(e) => p.enum_decl(e),
        }
        p.blank();
    }
    p.output
}

#[derive(Default)]
struct Printer {
    output: String,
    indent: usize,
}

impl Printer {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.output.push_str("    ");
        }
        self.output.push_str(text);
        self.output.push('\n');
    }

    fn blank(&mut self) {
        if !self.output.ends_with("\n\n") && !self.output.is_empty() {
            self.output.push('\n');
        }
    }

    fn annotations(&mut self, annotations: &[Annotation]) {
        for annotation in annotations {
            let mut text = format!("[@{}", annotation.name);
            if !annotation.args.is_empty() {
                text.push('(');
                text.push_str(&join_exprs(&annotation.args));
                text.push(')');
            }
            text.push(']');
            self.line(&text);
        }
    }

    fn class_decl(&mut self, class: &ClassDecl) {
        self.annotations(&class.annotations);
        let mut head = String::new();
        head.push_str(access_text(class.access));
        head.push_str(&modifier_text(&class.modifiers));
        head.push_str("class ");
        head.push_str(&class.name);
        let mut supers: Vec<&str> = Vec::new();
        if let Some(base) = &class.base {
            supers.push(base);
        }
        supers.extend(class.interfaces.iter().map(String::as_str));
        if !supers.is_empty() {
            head.push_str(" : ");
            head.push_str(&supers.join(", "));
        }
        head.push_str(" {");
        self.line(&head);
        self.indent += 1;
        for member in &class.members {
            match member {
                Member::Field(field) => self.field_decl(field),
                Member::Method(method) => self.method_decl(method),
                Member::Constructor(ctor) => self.constructor_decl(ctor),
            }
        }
        self.indent -= 1;
        self.line("}");
    }

    fn interface_decl(&mut self, iface: &InterfaceDecl) {
        self.annotations(&iface.annotations);
        self.line(&format!(
            "{}interface {} {{",
            access_text(iface.access),
            iface.name
        ));
        self.indent += 1;
        for method in &iface.methods {
            self.method_decl(method);
        }
        self.indent -= 1;
        self.line("}");
    }

    fn enum_decl(&mut self, e: &EnumDecl) {
        self.annotations(&e.annotations);
        self.line(&format!("{}enum {} {{", access_text(e.access), e.name));
        self.indent += 1;
        if !e.variants.is_empty() {
            self.line(&e.variants.join(", "));
        }
        self.indent -= 1;
        self.line("}");
    }

    fn field_decl(&mut self, field: &FieldDecl) {
        self.annotations(&field.annotations);
        let mut text = String::new();
        text.push_str(access_text(field.access));
        text.push_str(&modifier_text(&field.modifiers));
        text.push_str(&type_text(&field.ty));
        text.push(' ');
        text.push_str(&field.name);
        if let Some(init) = &field.initializer {
            text.push_str(" = ");
            text.push_str(&expr_text(init));
        }
        text.push(';');
        self.line(&text);
    }

    fn method_decl(&mut self, method: &MethodDecl) {
        self.annotations(&method.annotations);
        let mut head = String::new();
        head.push_str(access_text(method.access));
        head.push_str(&modifier_text(&method.modifiers));
        head.push_str(&type_text(&method.return_type));
        head.push(' ');
        head.push_str(&method.name);
        head.push('(');
        head.push_str(&params_text(method));
        head.push(')');
        match &method.body {
            Some(body) => {
                head.push_str(" {");
                self.line(&head);
                self.indent += 1;
                self.block_inner(body);
                self.indent -= 1;
                self.line("}");
            }
            None => {
                head.push(';');
                self.line(&head);
            }
        }
    }

    fn constructor_decl(&mut self, ctor: &ConstructorDecl) {
        self.annotations(&ctor.annotations);
        let mut head = String::new();
        head.push_str(access_text(ctor.access));
        head.push_str(&ctor.name);
        head.push('(');
        let params: Vec<String> = ctor
            .params
            .iter()
            .map(|p| format!("{} {}", type_text(&p.ty), p.name))
            .collect();
        head.push_str(&params.join(", "));
        head.push(')');
        if let Some(args) = &ctor.base_args {
            head.push_str(" : base(");
            head.push_str(&join_exprs(args));
            head.push(')');
        }
        head.push_str(" {");
        self.line(&head);
        self.indent += 1;
        self.block_inner(&ctor.body);
        self.indent -= 1;
        self.line("}");
    }

    fn block_inner(&mut self, block: &Block) {
        for stmt in &block.statements {
            self.statement(stmt);
        }
    }

    fn statement(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(block) => {
                self.line("{");
                self.indent += 1;
                self.block_inner(block);
                self.indent -= 1;
                self.line("}");
            }
            Stmt::VarDecl(decl) => self.line(&format!("{};", var_decl_text(decl))),
            Stmt::Expr { expr, .. } => self.line(&format!("{};", expr_text(expr))),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                self.line(&format!("if ({})", expr_text(condition)));
                self.nested(then_branch);
                if let Some(else_branch) = else_branch {
                    self.line("else");
                    self.nested(else_branch);
                }
            }
            Stmt::While {
                condition, body, ..
            } => {
                self.line(&format!("while ({})", expr_text(condition)));
                self.nested(body);
            }
            Stmt::For {
                init,
                condition,
                step,
                body,
                ..
            } => {
                let init_text = match init.as_deref() {
                    Some(Stmt::VarDecl(decl)) => var_decl_text(decl),
                    Some(Stmt::Expr { expr, .. }) => expr_text(expr),
                    _ => String::new(),
                };
                let cond_text = condition.as_ref().map(expr_text).unwrap_or_default();
                let step_text = step.as_ref().map(expr_text).unwrap_or_default();
                self.line(&format!("for ({init_text}; {cond_text}; {step_text})"));
                self.nested(body);
            }
            Stmt::Foreach {
                var_ty,
                var_name,
                iterable,
                body,
                ..
            } => {
                let var_text = match var_ty {
                    Some(ty) => format!("{} {}", type_text(ty), var_name),
                    None => var_name.clone(),
                };
                self.line(&format!("foreach ({} in {})", var_text, expr_text(iterable)));
                self.nested(body);
            }
            Stmt::Return { value, .. } => match value {
                Some(value) => self.line(&format!("return {};", expr_text(value))),
                None => self.line("return;"),
            },
            Stmt::Break { .. } => self.line("break;"),
            Stmt::Continue { .. } => self.line("continue;"),
        }
    }

    fn nested(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(block) => {
                self.line("{");
                self.indent += 1;
                self.block_inner(block);
                self.indent -= 1;
                self.line("}");
            }
            other => {
                self.indent += 1;
                self.statement(other);
                self.indent -= 1;
            }
        }
    }
}

fn access_text(access: Access) -> &'static str {
    match access {
        Access::Public => "",
        Access::Private => "private ",
        Access::Protected => "protected ",
    }
}

fn modifier_text(modifiers: &Modifiers) -> String {
    let mut text = String::new();
    if modifiers.is_static {
        text.push_str("static ");
    }
    if modifiers.is_abstract {
        text.push_str("abstract ");
    }
    if modifiers.is_virtual {
        text.push_str("virtual ");
    }
    if modifiers.is_override {
        text.push_str("override ");
    }
    if modifiers.is_sealed {
        text.push_str("sealed ");
    }
    if modifiers.is_readonly {
        text.push_str("readonly ");
    }
    text
}

fn type_text(ty: &TypeRef) -> String {
    let mut text = ty.name.clone();
    if !ty.generic_args.is_empty() {
        let args: Vec<String> = ty.generic_args.iter().map(type_text).collect();
        text.push('<');
        text.push_str(&args.join(", "));
        text.push('>');
    }
    if ty.is_array {
        text.push_str("[]");
    }
    if ty.is_nullable {
        text.push('?');
    }
    text
}

fn params_text(method: &MethodDecl) -> String {
    let params: Vec<String> = method
        .params
        .iter()
        .map(|p| format!("{} {}", type_text(&p.ty), p.name))
        .collect();
    params.join(", ")
}

fn var_decl_text(decl: &VarDecl) -> String {
    let mut text = match &decl.ty {
        Some(ty) => format!("{} {}", type_text(ty), decl.name),
        None => format!("var {}", decl.name),
    };
    if let Some(init) = &decl.initializer {
        text.push_str(" = ");
        text.push_str(&expr_text(init));
    }
    text
}

fn join_exprs(exprs: &[Expr]) -> String {
    let parts: Vec<String> = exprs.iter().map(expr_text).collect();
    parts.join(", ")
}

/// Operands that could re-associate on re-parse are parenthesized.
fn operand_text(expr: &Expr) -> String {
    match expr {
        Expr::Binary { .. } | Expr::Assign { .. } | Expr::Cast { .. } => {
            format!("({})", expr_text(expr))
        }
        _ => expr_text(expr),
    }
}

pub fn expr_text(expr: &Expr) -> String {
    match expr {
        Expr::IntLiteral { value, .. } => value.clone(),
        Expr::FloatLiteral { value, .. } => value.clone(),
        Expr::StringLiteral { value, .. } => format!("\"{}\"", escape(value, '"')),
        Expr::CharLiteral { value, .. } => format!("'{}'", escape(&value.to_string(), '\'')),
        Expr::BoolLiteral { value, .. } => value.to_string(),
        Expr::NullLiteral { .. } => "null".to_string(),
        Expr::Identifier { name, .. } => name.clone(),
        Expr::Unary { op, operand, .. } => format!("{}{}", op, operand_text(operand)),
        Expr::Postfix { op, operand, .. } => format!("{}{}", operand_text(operand), op),
        Expr::Binary {
            op, left, right, ..
        } => format!("{} {} {}", operand_text(left), op, operand_text(right)),
        Expr::Assign {
            op, target, value, ..
        } => format!("{} {} {}", expr_text(target), op, expr_text(value)),
        Expr::Call { callee, args, .. } => {
            format!("{}({})", expr_text(callee), join_exprs(args))
        }
        Expr::MemberAccess { target, name, .. } => {
            format!("{}.{}", operand_text(target), name)
        }
        Expr::ObjectCreation {
            type_name, args, ..
        } => format!("new {}({})", type_name, join_exprs(args)),
        Expr::ArrayCreation {
            element_type, size, ..
        } => format!("new {}[{}]", element_type.name, expr_text(size)),
        Expr::ArrayAccess { target, index, .. } => {
            format!("{}[{}]", operand_text(target), expr_text(index))
        }
        Expr::Cast {
            expr, target_type, ..
        } => format!("{} as {}", operand_text(expr), type_text(target_type)),
        Expr::This { .. } => "this".to_string(),
        Expr::Base { .. } => "base".to_string(),
    }
}

fn escape(value: &str, quote: char) -> String {
    let mut escaped = String::new();
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            '\r' => escaped.push_str("\\r"),
            '\0' => escaped.push_str("\\0"),
            c if c == quote => {
                escaped.push('\\');
                escaped.push(c);
            }
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticBag;
    use crate::{lexer, parser};
    use indoc::indoc;

    fn parse(source: &str) -> CompilationUnit {
        let mut bag = DiagnosticBag::new();
        let tokens = lexer::tokenize(source, &mut bag);
        let unit = parser::parse_unit(tokens, &mut bag);
        assert!(!bag.has_errors(), "parse errors: {:?}", bag.sorted());
        unit
    }

    #[test]
    fn print_then_reparse_is_stable() {
        let source = indoc! {r#"
            module App;
            import System;

            [@Library("Zoo", "1.0")]
            class Animal {
                protected string name;
                static int population = 0;

                Animal(string name) {
                    this.name = name;
                }

                virtual string speak() {
                    return "...";
                }
            }

            class Dog : Animal {
                Dog(string name) : base(name) {
                }

                override string speak() {
                    int volume = 2 * (3 + 4);
                    for (int i = 0; i < volume; i++) {
                        Console.writeLine(i);
                    }
                    foreach (int x in this.sizes()) {
                        volume += x;
                    }
                    Animal? other = this as Animal;
                    bool loud = volume > 5 && !this.quiet;
                    return "Woof!" + this.name;
                }
            }
        "#};

        let first = print_unit(&parse(source));
        let second = print_unit(&parse(&first));
        assert_eq!(first, second);
    }

    #[test]
    fn binary_nesting_survives_round_trip() {
        let source = indoc! {"
            class Program {
                static void main() {
                    int a = 1 - (2 - 3);
                    int b = (1 - 2) - 3;
                    int c = 10 - 4 - 3;
                }
            }
        "};
        let first = print_unit(&parse(source));
        let second = print_unit(&parse(&first));
        assert_eq!(first, second);
        assert!(first.contains("1 - (2 - 3)"));
    }
}
