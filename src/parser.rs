use crate::ast::{
    Access, Annotation, Block, ClassDecl, CompilationUnit, ConstructorDecl, EnumDecl, Expr,
    FieldDecl, ImportDecl, InterfaceDecl, Member, MethodDecl, Modifiers, ModuleDecl, Param, Stmt,
    TypeDecl, TypeRef, VarDecl,
};
use crate::diagnostics::DiagnosticBag;
use crate::token::{Pos, Token, TokenKind};

/// Recursive-descent parser with bounded lookahead (at most three tokens).
///
/// Error handling follows the report-and-continue model: a missing expected
/// token is reported without consuming anything, and the enclosing loop
/// advances a single token to find the next plausible boundary.
pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    bag: &'a mut DiagnosticBag,
}

impl<'a> Parser<'a> {
    pub fn new(mut tokens: Vec<Token>, bag: &'a mut DiagnosticBag) -> Self {
        if tokens.is_empty() {
            tokens.push(Token::eof(Pos::new(1, 1)));
        }
        Self {
            tokens,
            pos: 0,
            bag,
        }
    }

    pub fn parse_unit(mut self) -> CompilationUnit {
        let module = self.parse_module_decl();
        let imports = self.parse_imports();

        let mut types = Vec::new();
        while !self.check(TokenKind::Eof) {
            let before = self.pos;
            if let Some(decl) = self.parse_type_decl() {
                types.push(decl);
            }
            if self.pos == before {
                // Unrecognized leading token: skip it and try again.
                self.advance();
            }
        }

        CompilationUnit {
            module,
            imports,
            types,
        }
    }

    fn parse_module_decl(&mut self) -> Option<ModuleDecl> {
        if !self.check(TokenKind::Module) {
            return None;
        }
        let pos = self.current().pos;
        self.advance();
        let name = self.parse_dotted_name()?;
        self.expect(TokenKind::Semicolon, ";");
        Some(ModuleDecl { name, pos })
    }

    fn parse_imports(&mut self) -> Vec<ImportDecl> {
        let mut imports = Vec::new();
        while self.check(TokenKind::Import) {
            let pos = self.current().pos;
            self.advance();
            if let Some(name) = self.parse_dotted_name() {
                self.expect(TokenKind::Semicolon, ";");
                imports.push(ImportDecl { name, pos });
            } else {
                self.advance();
            }
        }
        imports
    }

    fn parse_dotted_name(&mut self) -> Option<String> {
        let mut name = self.expect_identifier("name")?;
        while self.check(TokenKind::Dot) {
            self.advance();
            let part = self.expect_identifier("name after '.'")?;
            name.push('.');
            name.push_str(&part);
        }
        Some(name)
    }

    // ----- type declarations -----

    fn parse_type_decl(&mut self) -> Option<TypeDecl> {
        let annotations = self.parse_annotations();
        let access = self.parse_access();
        let modifiers = self.parse_modifiers();

        match self.kind() {
            TokenKind::Class => self
                .parse_class(annotations, access, modifiers)
                .map(TypeDecl::Class),
            TokenKind::Interface => self
                .parse_interface(annotations, access)
                .map(TypeDecl::Interface),
            TokenKind::Enum => self.parse_enum(annotations, access).map(TypeDecl::Enum),
            _ => {
                let token = self.current().clone();
                self.bag.error(
                    format!("expected type declaration, found '{}'", describe(&token)),
                    token.pos,
                );
                None
            }
        }
    }

    fn parse_class(
        &mut self,
        annotations: Vec<Annotation>,
        access: Access,
        modifiers: Modifiers,
    ) -> Option<ClassDecl> {
        let pos = self.current().pos;
        self.advance(); // class
        let name = self.expect_identifier("class name")?;

        let mut base = None;
        let mut interfaces = Vec::new();
        if self.check(TokenKind::Colon) {
            self.advance();
            base = self.expect_identifier("base class name");
            while self.check(TokenKind::Comma) {
                self.advance();
                if let Some(iface) = self.expect_identifier("interface name") {
                    interfaces.push(iface);
                }
            }
        }

        self.expect(TokenKind::LBrace, "{");
        let mut members = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            let before = self.pos;
            if let Some(member) = self.parse_member(&name) {
                members.push(member);
            }
            if self.pos == before {
                self.advance();
            }
        }
        self.expect(TokenKind::RBrace, "}");

        Some(ClassDecl {
            name,
            base,
            interfaces,
            members,
            annotations,
            access,
            modifiers,
            pos,
        })
    }

    fn parse_interface(
        &mut self,
        annotations: Vec<Annotation>,
        access: Access,
    ) -> Option<InterfaceDecl> {
        let pos = self.current().pos;
        self.advance(); // interface
        let name = self.expect_identifier("interface name")?;
        self.expect(TokenKind::LBrace, "{");

        let mut methods = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            let before = self.pos;
            if let Some(Member::Method(method)) = self.parse_member(&name) {
                methods.push(method);
            }
            if self.pos == before {
                self.advance();
            }
        }
        self.expect(TokenKind::RBrace, "}");

        Some(InterfaceDecl {
            name,
            methods,
            annotations,
            access,
            pos,
        })
    }

    fn parse_enum(&mut self, annotations: Vec<Annotation>, access: Access) -> Option<EnumDecl> {
        let pos = self.current().pos;
        self.advance(); // enum
        let name = self.expect_identifier("enum name")?;
        self.expect(TokenKind::LBrace, "{");

        let mut variants = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            match self.expect_identifier("enum variant") {
                Some(variant) => variants.push(variant),
                None => break,
            }
            if !self.check(TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        self.expect(TokenKind::RBrace, "}");

        Some(EnumDecl {
            name,
            variants,
            annotations,
            access,
            pos,
        })
    }

    // ----- members -----

    /// Member disambiguation: an identifier equal to the class name followed
    /// by `(` is a constructor; otherwise a type reference followed by a
    /// name, where a trailing `(` selects method over field.
    fn parse_member(&mut self, class_name: &str) -> Option<Member> {
        let annotations = self.parse_annotations();
        let access = self.parse_access();
        let modifiers = self.parse_modifiers();

        if self.check(TokenKind::Identifier)
            && self.current().text == class_name
            && self.peek_kind(1) == TokenKind::LParen
        {
            return self
                .parse_constructor(annotations, access)
                .map(Member::Constructor);
        }

        if !self.starts_type() {
            let token = self.current().clone();
            self.bag.error(
                format!("expected member declaration, found '{}'", describe(&token)),
                token.pos,
            );
            return None;
        }

        let ty = self.parse_type_ref()?;
        let name = self.expect_identifier("member name")?;

        if self.check(TokenKind::LParen) {
            self.parse_method(name, ty, annotations, access, modifiers)
                .map(Member::Method)
        } else {
            self.parse_field(name, ty, annotations, access, modifiers)
                .map(Member::Field)
        }
    }

    fn parse_constructor(
        &mut self,
        annotations: Vec<Annotation>,
        access: Access,
    ) -> Option<ConstructorDecl> {
        let pos = self.current().pos;
        let name = self.expect_identifier("constructor name")?;
        let params = self.parse_params()?;

        let mut base_args = None;
        if self.check(TokenKind::Colon) {
            self.advance();
            self.expect(TokenKind::Base, "base");
            self.expect(TokenKind::LParen, "(");
            base_args = Some(self.parse_args());
        }

        let body = self.parse_block()?;
        Some(ConstructorDecl {
            name,
            params,
            base_args,
            body,
            annotations,
            access,
            pos,
        })
    }

    fn parse_method(
        &mut self,
        name: String,
        return_type: TypeRef,
        annotations: Vec<Annotation>,
        access: Access,
        modifiers: Modifiers,
    ) -> Option<MethodDecl> {
        let pos = return_type.pos;
        let params = self.parse_params()?;

        let body = if modifiers.is_abstract || self.check(TokenKind::Semicolon) {
            if self.check(TokenKind::Semicolon) {
                self.advance();
            }
            None
        } else {
            Some(self.parse_block()?)
        };

        Some(MethodDecl {
            name,
            return_type,
            params,
            body,
            annotations,
            access,
            modifiers,
            pos,
        })
    }

    fn parse_field(
        &mut self,
        name: String,
        ty: TypeRef,
        annotations: Vec<Annotation>,
        access: Access,
        modifiers: Modifiers,
    ) -> Option<FieldDecl> {
        let pos = ty.pos;
        let initializer = if self.check(TokenKind::Assign) {
            self.advance();
            Some(self.parse_expression())
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, ";");

        Some(FieldDecl {
            name,
            ty,
            initializer,
            annotations,
            access,
            modifiers,
            pos,
        })
    }

    fn parse_params(&mut self) -> Option<Vec<Param>> {
        self.expect(TokenKind::LParen, "(");
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let pos = self.current().pos;
                let ty = self.parse_type_ref()?;
                let name = self.expect_identifier("parameter name")?;
                params.push(Param { name, ty, pos });
                if !self.check(TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
        }
        self.expect(TokenKind::RParen, ")");
        Some(params)
    }

    // ----- annotations and heads -----

    /// `[@Name]` or `[@Name(args)]`. The `@` immediately after `[` is what
    /// separates an annotation from indexing.
    fn parse_annotations(&mut self) -> Vec<Annotation> {
        let mut annotations = Vec::new();
        while self.check(TokenKind::LBracket) && self.peek_kind(1) == TokenKind::At {
            let pos = self.current().pos;
            self.advance(); // [
            self.advance(); // @
            let Some(name) = self.expect_identifier("annotation name") else {
                break;
            };
            let args = if self.check(TokenKind::LParen) {
                self.advance();
                self.parse_args()
            } else {
                Vec::new()
            };
            self.expect(TokenKind::RBracket, "]");
            annotations.push(Annotation { name, args, pos });
        }
        annotations
    }

    fn parse_access(&mut self) -> Access {
        let access = match self.kind() {
            TokenKind::Public => Access::Public,
            TokenKind::Private => Access::Private,
            TokenKind::Protected => Access::Protected,
            _ => return Access::Public,
        };
        self.advance();
        access
    }

    fn parse_modifiers(&mut self) -> Modifiers {
        let mut modifiers = Modifiers::default();
        loop {
            match self.kind() {
                TokenKind::Static => modifiers.is_static = true,
                TokenKind::Abstract => modifiers.is_abstract = true,
                TokenKind::Virtual => modifiers.is_virtual = true,
                TokenKind::Override => modifiers.is_override = true,
                TokenKind::Sealed => modifiers.is_sealed = true,
                TokenKind::Readonly => modifiers.is_readonly = true,
                _ => return modifiers,
            }
            self.advance();
        }
    }

    fn starts_type(&self) -> bool {
        self.kind().is_type_keyword() || self.check(TokenKind::Identifier)
    }

    fn parse_type_ref(&mut self) -> Option<TypeRef> {
        let token = self.current().clone();
        let name = if token.kind.is_type_keyword() {
            self.advance();
            token.text.clone()
        } else {
            self.expect_identifier("type name")?
        };

        let mut ty = TypeRef::named(name, token.pos);

        // Generic arguments are recognized syntactically only.
        if self.check(TokenKind::Less)
            && (self.peek_kind(1).is_type_keyword() || self.peek_kind(1) == TokenKind::Identifier)
        {
            self.advance();
            loop {
                let Some(arg) = self.parse_type_ref() else {
                    break;
                };
                ty.generic_args.push(arg);
                if !self.check(TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
            self.expect(TokenKind::Greater, ">");
        }

        if self.check(TokenKind::LBracket) && self.peek_kind(1) == TokenKind::RBracket {
            self.advance();
            self.advance();
            ty.is_array = true;
        }
        if self.check(TokenKind::Question) {
            self.advance();
            ty.is_nullable = true;
        }
        Some(ty)
    }

    // ----- statements -----

    fn parse_block(&mut self) -> Option<Block> {
        let pos = self.current().pos;
        if !self.expect(TokenKind::LBrace, "{") {
            return None;
        }
        let mut statements = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            let before = self.pos;
            if let Some(stmt) = self.parse_statement() {
                statements.push(stmt);
            }
            if self.pos == before {
                self.advance();
            }
        }
        self.expect(TokenKind::RBrace, "}");
        Some(Block { statements, pos })
    }

    /// Local-declaration disambiguation: a primitive type keyword or
    /// `Identifier Identifier` or `Identifier [ ]` starts a typed local;
    /// `var` starts an inferred one; everything else is an expression
    /// statement.
    fn parse_statement(&mut self) -> Option<Stmt> {
        match self.kind() {
            TokenKind::LBrace => self.parse_block().map(Stmt::Block),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Foreach => self.parse_foreach(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Break => {
                let pos = self.current().pos;
                self.advance();
                self.expect(TokenKind::Semicolon, ";");
                Some(Stmt::Break { pos })
            }
            TokenKind::Continue => {
                let pos = self.current().pos;
                self.advance();
                self.expect(TokenKind::Semicolon, ";");
                Some(Stmt::Continue { pos })
            }
            TokenKind::Var => {
                let decl = self.parse_var_decl()?;
                self.expect(TokenKind::Semicolon, ";");
                Some(Stmt::VarDecl(decl))
            }
            kind if kind.is_type_keyword() => {
                let decl = self.parse_typed_decl()?;
                self.expect(TokenKind::Semicolon, ";");
                Some(Stmt::VarDecl(decl))
            }
            TokenKind::Identifier
                if self.peek_kind(1) == TokenKind::Identifier
                    || (self.peek_kind(1) == TokenKind::LBracket
                        && self.peek_kind(2) == TokenKind::RBracket)
                    || (self.peek_kind(1) == TokenKind::Question
                        && self.peek_kind(2) == TokenKind::Identifier) =>
            {
                let decl = self.parse_typed_decl()?;
                self.expect(TokenKind::Semicolon, ";");
                Some(Stmt::VarDecl(decl))
            }
            _ => {
                let pos = self.current().pos;
                let expr = self.parse_expression();
                self.expect(TokenKind::Semicolon, ";");
                Some(Stmt::Expr { expr, pos })
            }
        }
    }

    fn parse_var_decl(&mut self) -> Option<VarDecl> {
        let pos = self.current().pos;
        self.advance(); // var
        let name = self.expect_identifier("variable name")?;
        let initializer = if self.check(TokenKind::Assign) {
            self.advance();
            Some(self.parse_expression())
        } else {
            None
        };
        Some(VarDecl {
            name,
            ty: None,
            initializer,
            resolved_ty: None,
            pos,
        })
    }

    fn parse_typed_decl(&mut self) -> Option<VarDecl> {
        let pos = self.current().pos;
        let ty = self.parse_type_ref()?;
        let name = self.expect_identifier("variable name")?;
        let initializer = if self.check(TokenKind::Assign) {
            self.advance();
            Some(self.parse_expression())
        } else {
            None
        };
        Some(VarDecl {
            name,
            ty: Some(ty),
            initializer,
            resolved_ty: None,
            pos,
        })
    }

    fn parse_if(&mut self) -> Option<Stmt> {
        let pos = self.current().pos;
        self.advance(); // if
        self.expect(TokenKind::LParen, "(");
        let condition = self.parse_expression();
        self.expect(TokenKind::RParen, ")");
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.check(TokenKind::Else) {
            self.advance();
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Some(Stmt::If {
            condition,
            then_branch,
            else_branch,
            pos,
        })
    }

    fn parse_while(&mut self) -> Option<Stmt> {
        let pos = self.current().pos;
        self.advance(); // while
        self.expect(TokenKind::LParen, "(");
        let condition = self.parse_expression();
        self.expect(TokenKind::RParen, ")");
        let body = Box::new(self.parse_statement()?);
        Some(Stmt::While {
            condition,
            body,
            pos,
        })
    }

    fn parse_for(&mut self) -> Option<Stmt> {
        let pos = self.current().pos;
        self.advance(); // for
        self.expect(TokenKind::LParen, "(");

        let init = if self.check(TokenKind::Semicolon) {
            None
        } else if self.check(TokenKind::Var) {
            self.parse_var_decl().map(|d| Box::new(Stmt::VarDecl(d)))
        } else if self.kind().is_type_keyword()
            || (self.check(TokenKind::Identifier) && self.peek_kind(1) == TokenKind::Identifier)
        {
            self.parse_typed_decl().map(|d| Box::new(Stmt::VarDecl(d)))
        } else {
            let expr_pos = self.current().pos;
            let expr = self.parse_expression();
            Some(Box::new(Stmt::Expr {
                expr,
                pos: expr_pos,
            }))
        };
        self.expect(TokenKind::Semicolon, ";");

        let condition = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression())
        };
        self.expect(TokenKind::Semicolon, ";");

        let step = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression())
        };
        self.expect(TokenKind::RParen, ")");

        let body = Box::new(self.parse_statement()?);
        Some(Stmt::For {
            init,
            condition,
            step,
            body,
            pos,
        })
    }

    fn parse_foreach(&mut self) -> Option<Stmt> {
        let pos = self.current().pos;
        self.advance(); // foreach
        self.expect(TokenKind::LParen, "(");

        let var_ty = if self.kind().is_type_keyword()
            || (self.check(TokenKind::Identifier) && self.peek_kind(1) == TokenKind::Identifier)
        {
            self.parse_type_ref()
        } else {
            None
        };
        let var_name = self.expect_identifier("iteration variable")?;
        self.expect(TokenKind::In, "in");
        let iterable = self.parse_expression();
        self.expect(TokenKind::RParen, ")");

        let body = Box::new(self.parse_statement()?);
        Some(Stmt::Foreach {
            var_ty,
            var_name,
            iterable,
            body,
            pos,
        })
    }

    fn parse_return(&mut self) -> Option<Stmt> {
        let pos = self.current().pos;
        self.advance(); // return
        let value = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression())
        };
        self.expect(TokenKind::Semicolon, ";");
        Some(Stmt::Return { value, pos })
    }

    // ----- expressions -----

    pub fn parse_expression(&mut self) -> Expr {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Expr {
        let target = self.parse_logical_or();
        let op = match self.kind() {
            TokenKind::Assign => "=",
            TokenKind::PlusAssign => "+=",
            TokenKind::MinusAssign => "-=",
            TokenKind::StarAssign => "*=",
            TokenKind::SlashAssign => "/=",
            _ => return target,
        };
        let pos = self.current().pos;
        self.advance();
        let value = self.parse_assignment(); // right-associative
        Expr::Assign {
            op: op.to_string(),
            target: Box::new(target),
            value: Box::new(value),
            pos,
        }
    }

    fn parse_logical_or(&mut self) -> Expr {
        let mut left = self.parse_logical_and();
        while self.check(TokenKind::OrOr) {
            let pos = self.current().pos;
            self.advance();
            let right = self.parse_logical_and();
            left = binary("||", left, right, pos);
        }
        left
    }

    fn parse_logical_and(&mut self) -> Expr {
        let mut left = self.parse_equality();
        while self.check(TokenKind::AndAnd) {
            let pos = self.current().pos;
            self.advance();
            let right = self.parse_equality();
            left = binary("&&", left, right, pos);
        }
        left
    }

    fn parse_equality(&mut self) -> Expr {
        let mut left = self.parse_comparison();
        loop {
            let op = match self.kind() {
                TokenKind::EqEq => "==",
                TokenKind::NotEq => "!=",
                _ => return left,
            };
            let pos = self.current().pos;
            self.advance();
            let right = self.parse_comparison();
            left = binary(op, left, right, pos);
        }
    }

    fn parse_comparison(&mut self) -> Expr {
        let mut left = self.parse_bitwise();
        loop {
            let op = match self.kind() {
                TokenKind::Less => "<",
                TokenKind::Greater => ">",
                TokenKind::LessEq => "<=",
                TokenKind::GreaterEq => ">=",
                _ => return left,
            };
            let pos = self.current().pos;
            self.advance();
            let right = self.parse_bitwise();
            left = binary(op, left, right, pos);
        }
    }

    fn parse_bitwise(&mut self) -> Expr {
        let mut left = self.parse_shift();
        loop {
            let op = match self.kind() {
                TokenKind::Amp => "&",
                TokenKind::Pipe => "|",
                TokenKind::Caret => "^",
                _ => return left,
            };
            let pos = self.current().pos;
            self.advance();
            let right = self.parse_shift();
            left = binary(op, left, right, pos);
        }
    }

    fn parse_shift(&mut self) -> Expr {
        let mut left = self.parse_additive();
        loop {
            let op = match self.kind() {
                TokenKind::Shl => "<<",
                TokenKind::Shr => ">>",
                _ => return left,
            };
            let pos = self.current().pos;
            self.advance();
            let right = self.parse_additive();
            left = binary(op, left, right, pos);
        }
    }

    fn parse_additive(&mut self) -> Expr {
        let mut left = self.parse_multiplicative();
        loop {
            let op = match self.kind() {
                TokenKind::Plus => "+",
                TokenKind::Minus => "-",
                _ => return left,
            };
            let pos = self.current().pos;
            self.advance();
            let right = self.parse_multiplicative();
            left = binary(op, left, right, pos);
        }
    }

    fn parse_multiplicative(&mut self) -> Expr {
        let mut left = self.parse_unary();
        loop {
            let op = match self.kind() {
                TokenKind::Star => "*",
                TokenKind::Slash => "/",
                TokenKind::Percent => "%",
                _ => return left,
            };
            let pos = self.current().pos;
            self.advance();
            let right = self.parse_unary();
            left = binary(op, left, right, pos);
        }
    }

    fn parse_unary(&mut self) -> Expr {
        let op = match self.kind() {
            TokenKind::Not => "!",
            TokenKind::Minus => "-",
            TokenKind::Tilde => "~",
            TokenKind::PlusPlus => "++",
            TokenKind::MinusMinus => "--",
            _ => return self.parse_postfix(),
        };
        let pos = self.current().pos;
        self.advance();
        let operand = self.parse_unary();
        Expr::Unary {
            op: op.to_string(),
            operand: Box::new(operand),
            pos,
        }
    }

    /// Postfix chain, left to right: `.name`, `(args)`, `[index]`,
    /// `++`/`--`, `as Type`.
    fn parse_postfix(&mut self) -> Expr {
        let mut expr = self.parse_primary();
        loop {
            match self.kind() {
                TokenKind::Dot => {
                    let pos = self.current().pos;
                    self.advance();
                    let Some(name) = self.expect_identifier("member name after '.'") else {
                        return expr;
                    };
                    expr = Expr::MemberAccess {
                        target: Box::new(expr),
                        name,
                        pos,
                    };
                }
                TokenKind::LParen => {
                    let pos = self.current().pos;
                    self.advance();
                    let args = self.parse_args();
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        pos,
                    };
                }
                TokenKind::LBracket => {
                    let pos = self.current().pos;
                    self.advance();
                    let index = self.parse_expression();
                    self.expect(TokenKind::RBracket, "]");
                    expr = Expr::ArrayAccess {
                        target: Box::new(expr),
                        index: Box::new(index),
                        pos,
                    };
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let pos = self.current().pos;
                    let op = self.current().text.clone();
                    self.advance();
                    expr = Expr::Postfix {
                        op,
                        operand: Box::new(expr),
                        pos,
                    };
                }
                TokenKind::As => {
                    let pos = self.current().pos;
                    self.advance();
                    let Some(target_type) = self.parse_type_ref() else {
                        return expr;
                    };
                    expr = Expr::Cast {
                        expr: Box::new(expr),
                        target_type,
                        pos,
                    };
                }
                _ => return expr,
            }
        }
    }

    fn parse_primary(&mut self) -> Expr {
        let token = self.current().clone();
        match token.kind {
            TokenKind::IntLiteral => {
                self.advance();
                Expr::IntLiteral {
                    value: token.text,
                    pos: token.pos,
                }
            }
            TokenKind::FloatLiteral => {
                self.advance();
                Expr::FloatLiteral {
                    value: token.text,
                    pos: token.pos,
                }
            }
            TokenKind::StringLiteral => {
                self.advance();
                Expr::StringLiteral {
                    value: token.text,
                    pos: token.pos,
                }
            }
            TokenKind::CharLiteral => {
                self.advance();
                Expr::CharLiteral {
                    value: token.text.chars().next().unwrap_or('\0'),
                    pos: token.pos,
                }
            }
            TokenKind::True | TokenKind::False => {
                self.advance();
                Expr::BoolLiteral {
                    value: token.kind == TokenKind::True,
                    pos: token.pos,
                }
            }
            TokenKind::Null => {
                self.advance();
                Expr::NullLiteral { pos: token.pos }
            }
            TokenKind::This => {
                self.advance();
                Expr::This { pos: token.pos }
            }
            TokenKind::Base => {
                self.advance();
                Expr::Base { pos: token.pos }
            }
            TokenKind::Identifier => {
                self.advance();
                Expr::Identifier {
                    name: token.text,
                    pos: token.pos,
                }
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression();
                self.expect(TokenKind::RParen, ")");
                expr
            }
            TokenKind::New => self.parse_creation(),
            _ => {
                self.bag.error(
                    format!("expected expression, found '{}'", describe(&token)),
                    token.pos,
                );
                Expr::NullLiteral { pos: token.pos }
            }
        }
    }

    /// `new Type(args)` for objects, `new Type[size]` for arrays. `new`
    /// accepts dotted type names.
    fn parse_creation(&mut self) -> Expr {
        let pos = self.current().pos;
        self.advance(); // new
        let type_pos = self.current().pos;
        let name = if self.kind().is_type_keyword() {
            let text = self.current().text.clone();
            self.advance();
            text
        } else {
            match self.parse_dotted_name() {
                Some(name) => name,
                None => return Expr::NullLiteral { pos },
            }
        };

        if self.check(TokenKind::LBracket) {
            self.advance();
            let size = self.parse_expression();
            self.expect(TokenKind::RBracket, "]");
            return Expr::ArrayCreation {
                element_type: TypeRef::named(name, type_pos),
                size: Box::new(size),
                pos,
            };
        }

        self.expect(TokenKind::LParen, "(");
        let args = self.parse_args();
        Expr::ObjectCreation {
            type_name: name,
            args,
            pos,
        }
    }

    /// Comma-separated arguments up to the closing `)` (already past `(`).
    fn parse_args(&mut self) -> Vec<Expr> {
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.parse_expression());
                if !self.check(TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
        }
        self.expect(TokenKind::RParen, ")");
        args
    }

    // ----- cursor helpers -----

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn kind(&self) -> TokenKind {
        self.current().kind
    }

    fn peek_kind(&self, ahead: usize) -> TokenKind {
        debug_assert!(ahead <= 3, "lookahead is bounded at three tokens");
        self.tokens
            .get(self.pos + ahead)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    /// Reports and does NOT consume on mismatch, per the recovery model.
    fn expect(&mut self, kind: TokenKind, what: &str) -> bool {
        if self.check(kind) {
            self.advance();
            return true;
        }
        let token = self.current().clone();
        self.bag.error(
            format!("expected '{what}', found '{}'", describe(&token)),
            token.pos,
        );
        false
    }

    fn expect_identifier(&mut self, what: &str) -> Option<String> {
        if self.check(TokenKind::Identifier) {
            return Some(self.advance().text);
        }
        let token = self.current().clone();
        self.bag.error(
            format!("expected {what}, found '{}'", describe(&token)),
            token.pos,
        );
        None
    }
}

fn binary(op: &str, left: Expr, right: Expr, pos: Pos) -> Expr {
    Expr::Binary {
        op: op.to_string(),
        left: Box::new(left),
        right: Box::new(right),
        pos,
    }
}

fn describe(token: &Token) -> String {
    match token.kind {
        TokenKind::Eof => "end of file".to_string(),
        _ => token.text.clone(),
    }
}

/// Parses a token stream into a compilation unit, reporting problems into
/// the bag.
pub fn parse_unit(tokens: Vec<Token>, bag: &mut DiagnosticBag) -> CompilationUnit {
    Parser::new(tokens, bag).parse_unit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;
    use indoc::indoc;

    fn parse(source: &str) -> (CompilationUnit, DiagnosticBag) {
        let mut bag = DiagnosticBag::new();
        let tokens = lexer::tokenize(source, &mut bag);
        let unit = parse_unit(tokens, &mut bag);
        (unit, bag)
    }

    fn parse_ok(source: &str) -> CompilationUnit {
        let (unit, bag) = parse(source);
        assert!(!bag.has_errors(), "unexpected errors: {:?}", bag.sorted());
        unit
    }

    fn only_class(unit: &CompilationUnit) -> &ClassDecl {
        assert_eq!(unit.types.len(), 1);
        match &unit.types[0] {
            TypeDecl::Class(class) => class,
            other => panic!("expected class, got {other:?}"),
        }
    }

    #[test]
    fn parses_class_with_single_method() {
        let unit = parse_ok(indoc! {"
            class Calculator {
                int add(int a, int b) {
                    return a + b;
                }
            }
        "});
        let class = only_class(&unit);
        assert_eq!(class.name, "Calculator");
        assert_eq!(class.members.len(), 1);
        match &class.members[0] {
            Member::Method(method) => {
                assert_eq!(method.name, "add");
                assert_eq!(method.return_type.name, "int");
                assert_eq!(method.params.len(), 2);
            }
            other => panic!("expected method, got {other:?}"),
        }
    }

    #[test]
    fn distinguishes_constructor_from_method() {
        let unit = parse_ok(indoc! {"
            class Dog {
                string name;

                Dog(string name) {
                    this.name = name;
                }

                Dog fetch() {
                    return this;
                }
            }
        "});
        let class = only_class(&unit);
        assert!(matches!(class.members[0], Member::Field(_)));
        assert!(matches!(class.members[1], Member::Constructor(_)));
        // `Dog fetch()` starts with the class name but is a method: the
        // token after the identifier decides.
        assert!(matches!(class.members[2], Member::Method(_)));
    }

    #[test]
    fn parses_base_and_interfaces() {
        let unit = parse_ok("class Dog : Animal, IComparable, IPrintable { }");
        let class = only_class(&unit);
        assert_eq!(class.base.as_deref(), Some("Animal"));
        assert_eq!(class.interfaces, vec!["IComparable", "IPrintable"]);
    }

    #[test]
    fn parses_constructor_base_initializer() {
        let unit = parse_ok(indoc! {"
            class Dog : Animal {
                Dog(string name) : base(name, 4) {
                }
            }
        "});
        let class = only_class(&unit);
        match &class.members[0] {
            Member::Constructor(ctor) => {
                let base_args = ctor.base_args.as_ref().expect("base args");
                assert_eq!(base_args.len(), 2);
            }
            other => panic!("expected constructor, got {other:?}"),
        }
    }

    #[test]
    fn local_declaration_disambiguation() {
        let unit = parse_ok(indoc! {"
            class Program {
                static void main() {
                    int count = 1;
                    Dog rex = new Dog();
                    Dog[] pack = new Dog[3];
                    var inferred = 42;
                    Console.writeLine(count);
                    rex.bark();
                }
            }
        "});
        let class = only_class(&unit);
        let Member::Method(method) = &class.members[0] else {
            panic!("expected method");
        };
        let body = method.body.as_ref().expect("body");
        let kinds: Vec<bool> = body
            .statements
            .iter()
            .map(|s| matches!(s, Stmt::VarDecl(_)))
            .collect();
        assert_eq!(kinds, vec![true, true, true, true, false, false]);

        let Stmt::VarDecl(array_decl) = &body.statements[2] else {
            panic!("expected array declaration");
        };
        assert!(array_decl.ty.as_ref().expect("type").is_array);
    }

    #[test]
    fn object_creation_and_array_creation_are_disjoint() {
        let unit = parse_ok(indoc! {"
            class Program {
                static void main() {
                    var a = new Point(1, 2, 3);
                    var b = new int[8];
                }
            }
        "});
        let class = only_class(&unit);
        let Member::Method(method) = &class.members[0] else {
            panic!("expected method");
        };
        let body = method.body.as_ref().expect("body");

        let Stmt::VarDecl(first) = &body.statements[0] else {
            panic!()
        };
        match first.initializer.as_ref().expect("initializer") {
            Expr::ObjectCreation { type_name, args, .. } => {
                assert_eq!(type_name, "Point");
                assert_eq!(args.len(), 3);
            }
            other => panic!("expected object creation, got {other:?}"),
        }

        let Stmt::VarDecl(second) = &body.statements[1] else {
            panic!()
        };
        assert!(matches!(
            second.initializer.as_ref().expect("initializer"),
            Expr::ArrayCreation { .. }
        ));
    }

    #[test]
    fn postfix_chain_applies_left_to_right() {
        let unit = parse_ok(indoc! {"
            class Program {
                static void main() {
                    items[0].owner.rename(\"new\");
                }
            }
        "});
        let class = only_class(&unit);
        let Member::Method(method) = &class.members[0] else {
            panic!("expected method");
        };
        let Stmt::Expr { expr, .. } = &method.body.as_ref().unwrap().statements[0] else {
            panic!("expected expression statement");
        };
        // call(member(member(index(items, 0), owner), rename), "new")
        let Expr::Call { callee, args, .. } = expr else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 1);
        let Expr::MemberAccess { target, name, .. } = callee.as_ref() else {
            panic!("expected member access");
        };
        assert_eq!(name, "rename");
        assert!(matches!(target.as_ref(), Expr::MemberAccess { .. }));
    }

    #[test]
    fn assignment_is_right_associative() {
        let unit = parse_ok(indoc! {"
            class Program {
                static void main() {
                    a = b = 1;
                }
            }
        "});
        let class = only_class(&unit);
        let Member::Method(method) = &class.members[0] else {
            panic!()
        };
        let Stmt::Expr { expr, .. } = &method.body.as_ref().unwrap().statements[0] else {
            panic!()
        };
        let Expr::Assign { value, .. } = expr else {
            panic!("expected assignment")
        };
        assert!(matches!(value.as_ref(), Expr::Assign { .. }));
    }

    #[test]
    fn parses_annotations_with_arguments() {
        let unit = parse_ok(indoc! {r#"
            [@Library("Collections", "1.2.0")]
            [@Deprecated]
            class OldList { }
        "#});
        let class = only_class(&unit);
        assert_eq!(class.annotations.len(), 2);
        assert_eq!(class.annotations[0].name, "Library");
        assert_eq!(class.annotations[0].args.len(), 2);
        assert_eq!(class.annotations[1].name, "Deprecated");
        assert!(class.annotations[1].args.is_empty());
    }

    #[test]
    fn parses_module_and_imports() {
        let unit = parse_ok(indoc! {"
            module App.Core;
            import System.Collections;
            import Utils;

            class Program { }
        "});
        assert_eq!(unit.module.as_ref().map(|m| m.name.as_str()), Some("App.Core"));
        assert_eq!(unit.imports.len(), 2);
        assert_eq!(unit.imports[0].name, "System.Collections");
    }

    #[test]
    fn parses_control_flow_statements() {
        let unit = parse_ok(indoc! {"
            class Program {
                static void main() {
                    for (int i = 0; i < 10; i++) {
                        if (i % 2 == 0) {
                            continue;
                        } else {
                            Console.writeLine(i);
                        }
                    }
                    foreach (int x in numbers) {
                        total += x;
                    }
                    while (total > 0) {
                        total--;
                    }
                }
            }
        "});
        let class = only_class(&unit);
        let Member::Method(method) = &class.members[0] else {
            panic!()
        };
        let body = method.body.as_ref().unwrap();
        assert!(matches!(body.statements[0], Stmt::For { .. }));
        assert!(matches!(body.statements[1], Stmt::Foreach { .. }));
        assert!(matches!(body.statements[2], Stmt::While { .. }));
    }

    #[test]
    fn parses_cast_and_nullable_types() {
        let unit = parse_ok(indoc! {"
            class Program {
                static void main() {
                    Animal? pet = rex as Animal;
                }
            }
        "});
        let class = only_class(&unit);
        let Member::Method(method) = &class.members[0] else {
            panic!()
        };
        let Stmt::VarDecl(decl) = &method.body.as_ref().unwrap().statements[0] else {
            panic!()
        };
        assert!(decl.ty.as_ref().unwrap().is_nullable);
        assert!(matches!(
            decl.initializer.as_ref().unwrap(),
            Expr::Cast { .. }
        ));
    }

    #[test]
    fn abstract_method_has_no_body() {
        let unit = parse_ok(indoc! {"
            class Shape {
                abstract double area();
            }
        "});
        let class = only_class(&unit);
        let Member::Method(method) = &class.members[0] else {
            panic!()
        };
        assert!(method.body.is_none());
        assert!(method.modifiers.is_abstract);
    }

    #[test]
    fn missing_token_reports_and_continues() {
        let (unit, bag) = parse(indoc! {"
            class Program {
                static void main() {
                    int x = 1
                    int y = 2;
                }
            }
        "});
        assert!(bag.has_errors());
        // The second declaration still parses.
        let class = only_class(&unit);
        let Member::Method(method) = &class.members[0] else {
            panic!()
        };
        let names: Vec<&str> = method
            .body
            .as_ref()
            .unwrap()
            .statements
            .iter()
            .filter_map(|s| match s {
                Stmt::VarDecl(d) => Some(d.name.as_str()),
                _ => None,
            })
            .collect();
        assert!(names.contains(&"y"));
    }

    #[test]
    fn stray_top_level_token_is_skipped_with_diagnostic() {
        let (unit, bag) = parse("; class Program { }");
        assert!(bag.has_errors());
        assert_eq!(unit.types.len(), 1);
    }
}
