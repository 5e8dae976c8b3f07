//! The abstract syntax tree produced by the parser.
//!
//! Nodes are immutable after parsing with one exception: the semantic
//! analyzer writes `VarDecl::resolved_ty` once when it infers the type of a
//! `var` declaration.

use crate::symbols::TypeInfo;
use crate::token::Pos;

#[derive(Debug, Clone, PartialEq)]
pub struct CompilationUnit {
    pub module: Option<ModuleDecl>,
    pub imports: Vec<ImportDecl>,
    pub types: Vec<TypeDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleDecl {
    pub name: String,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub name: String,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeDecl {
    Class(ClassDecl),
    Interface(InterfaceDecl),
    Enum(EnumDecl),
}

impl TypeDecl {
    pub fn name(&self) -> &str {
        match self {
            TypeDecl::Class(c) => &c.name,
            TypeDecl::Interface(i) => &i.name,
            TypeDecl::Enum(e) => &e.name,
        }
    }

    pub fn pos(&self) -> Pos {
        match self {
            TypeDecl::Class(c) => c.pos,
            TypeDecl::Interface(i) => i.pos,
            TypeDecl::Enum(e) => e.pos,
        }
    }

    pub fn annotations(&self) -> &[Annotation] {
        match self {
            TypeDecl::Class(c) => &c.annotations,
            TypeDecl::Interface(i) => &i.annotations,
            TypeDecl::Enum(e) => &e.annotations,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    #[default]
    Public,
    Private,
    Protected,
}

/// Modifier set shared by type and member declaration heads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_virtual: bool,
    pub is_override: bool,
    pub is_sealed: bool,
    pub is_readonly: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub base: Option<String>,
    pub interfaces: Vec<String>,
    pub members: Vec<Member>,
    pub annotations: Vec<Annotation>,
    pub access: Access,
    pub modifiers: Modifiers,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDecl {
    pub name: String,
    pub methods: Vec<MethodDecl>,
    pub annotations: Vec<Annotation>,
    pub access: Access,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDecl {
    pub name: String,
    pub variants: Vec<String>,
    pub annotations: Vec<Annotation>,
    pub access: Access,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Field(FieldDecl),
    Method(MethodDecl),
    Constructor(ConstructorDecl),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeRef,
    pub initializer: Option<Expr>,
    pub annotations: Vec<Annotation>,
    pub access: Access,
    pub modifiers: Modifiers,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub name: String,
    pub return_type: TypeRef,
    pub params: Vec<Param>,
    /// None for abstract methods and `;`-terminated bodies.
    pub body: Option<Block>,
    pub annotations: Vec<Annotation>,
    pub access: Access,
    pub modifiers: Modifiers,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstructorDecl {
    pub name: String,
    pub params: Vec<Param>,
    /// Arguments of the optional `: base(...)` initializer.
    pub base_args: Option<Vec<Expr>>,
    pub body: Block,
    pub annotations: Vec<Annotation>,
    pub access: Access,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
    pub pos: Pos,
}

/// `[@Name]` or `[@Name(arg, ...)]` attached to a declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub name: String,
    pub args: Vec<Expr>,
    pub pos: Pos,
}

/// A syntactic type mention. Generic arguments are parsed but carry no
/// semantic weight in this core.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRef {
    pub name: String,
    pub is_array: bool,
    pub is_nullable: bool,
    pub generic_args: Vec<TypeRef>,
    pub pos: Pos,
}

impl TypeRef {
    pub fn named(name: impl Into<String>, pos: Pos) -> Self {
        Self {
            name: name.into(),
            is_array: false,
            is_nullable: false,
            generic_args: Vec::new(),
            pos,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Block(Block),
    VarDecl(VarDecl),
    Expr { expr: Expr, pos: Pos },
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        pos: Pos,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
        pos: Pos,
    },
    For {
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
        pos: Pos,
    },
    Foreach {
        var_ty: Option<TypeRef>,
        var_name: String,
        iterable: Expr,
        body: Box<Stmt>,
        pos: Pos,
    },
    Return { value: Option<Expr>, pos: Pos },
    Break { pos: Pos },
    Continue { pos: Pos },
}

/// A typed or inferred local declaration. At least one of `ty` and
/// `initializer` must be present; the analyzer reports the missing-both
/// case.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    pub ty: Option<TypeRef>,
    pub initializer: Option<Expr>,
    /// Written once by the semantic analyzer for `var` declarations.
    pub resolved_ty: Option<TypeInfo>,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntLiteral { value: String, pos: Pos },
    FloatLiteral { value: String, pos: Pos },
    StringLiteral { value: String, pos: Pos },
    CharLiteral { value: char, pos: Pos },
    BoolLiteral { value: bool, pos: Pos },
    NullLiteral { pos: Pos },
    Identifier { name: String, pos: Pos },
    Unary {
        op: String,
        operand: Box<Expr>,
        pos: Pos,
    },
    Postfix {
        op: String,
        operand: Box<Expr>,
        pos: Pos,
    },
    Binary {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
        pos: Pos,
    },
    Assign {
        op: String,
        target: Box<Expr>,
        value: Box<Expr>,
        pos: Pos,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        pos: Pos,
    },
    MemberAccess {
        target: Box<Expr>,
        name: String,
        pos: Pos,
    },
    ObjectCreation {
        type_name: String,
        args: Vec<Expr>,
        pos: Pos,
    },
    ArrayCreation {
        element_type: TypeRef,
        size: Box<Expr>,
        pos: Pos,
    },
    ArrayAccess {
        target: Box<Expr>,
        index: Box<Expr>,
        pos: Pos,
    },
    Cast {
        expr: Box<Expr>,
        target_type: TypeRef,
        pos: Pos,
    },
    This { pos: Pos },
    Base { pos: Pos },
}

impl Expr {
    pub fn pos(&self) -> Pos {
        match self {
            Expr::IntLiteral { pos, .. }
            | Expr::FloatLiteral { pos, .. }
            | Expr::StringLiteral { pos, .. }
            | Expr::CharLiteral { pos, .. }
            | Expr::BoolLiteral { pos, .. }
            | Expr::NullLiteral { pos }
            | Expr::Identifier { pos, .. }
            | Expr::Unary { pos, .. }
            | Expr::Postfix { pos, .. }
            | Expr::Binary { pos, .. }
            | Expr::Assign { pos, .. }
            | Expr::Call { pos, .. }
            | Expr::MemberAccess { pos, .. }
            | Expr::ObjectCreation { pos, .. }
            | Expr::ArrayCreation { pos, .. }
            | Expr::ArrayAccess { pos, .. }
            | Expr::Cast { pos, .. }
            | Expr::This { pos }
            | Expr::Base { pos } => *pos,
        }
    }
}
