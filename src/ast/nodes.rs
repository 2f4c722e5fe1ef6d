//! AST node definitions.
//!
//! Large variants keep their payload in a dedicated struct so `NodeKind` stays small.

use symbol_table::GlobalSymbol as Symbol;
use thin_vec::ThinVec;

use crate::ast::NodeRef;
use crate::lexer::{Constant, StringValue};
use crate::source::SourceLocation;

pub use crate::semantic::types::TypeQualifiers;

/// The core enum defining all possible AST node types for C11.
#[derive(Debug, Clone)]
pub enum NodeKind {
    // --- Expressions ---
    Identifier(Symbol),
    Constant(Constant),
    StringLiteral(StringValue),
    GenericSelection(NodeRef /* controlling_expr */, ThinVec<GenericAssociation>),
    CompoundLiteral(NodeRef /* type name */, NodeRef /* initializer list */),

    Index(NodeRef /* array */, NodeRef /* index */),
    Call(NodeRef /* func */, ThinVec<NodeRef> /* args */),
    Member(NodeRef /* object */, Symbol /* field */, bool /* is_arrow */),
    PostIncrement(NodeRef),
    PostDecrement(NodeRef),

    Unary(UnaryOp, NodeRef),
    SizeOfExpr(NodeRef),
    SizeOfType(NodeRef),
    AlignOf(NodeRef),
    Cast(NodeRef /* type name */, NodeRef),
    Binary(BinaryOp, NodeRef, NodeRef),
    Conditional(NodeRef, NodeRef, NodeRef),
    Assignment(BinaryOp, NodeRef /* lhs */, NodeRef /* rhs */),

    TypeName(TypeName),
    InitializerList(ThinVec<DesignatedInitializer>),

    // --- Statements ---
    Compound(ThinVec<NodeRef> /* block items */),
    ExpressionStatement(Option<NodeRef>),
    If(IfStmt),
    While(WhileStmt),
    DoWhile(NodeRef /* body */, NodeRef /* condition */),
    For(ForStmt),
    Switch(NodeRef /* condition */, NodeRef /* body */),
    Case(NodeRef /* const_expr */, NodeRef /* statement */),
    Default(NodeRef),
    Label(Symbol, NodeRef),
    Goto(Symbol),
    Break,
    Continue,
    Return(Option<NodeRef>),

    // --- Declarations & Definitions ---
    Declaration(DeclarationData),
    StaticAssert(NodeRef /* condition */, Option<StringValue> /* message */),
    FunctionDef(FunctionDefData),

    // --- Top Level ---
    TranslationUnit(ThinVec<NodeRef>),
}

impl NodeKind {
    pub fn is_expression(&self) -> bool {
        !matches!(
            self,
            NodeKind::TypeName(_)
                | NodeKind::InitializerList(_)
                | NodeKind::Compound(_)
                | NodeKind::ExpressionStatement(_)
                | NodeKind::If(_)
                | NodeKind::While(_)
                | NodeKind::DoWhile(..)
                | NodeKind::For(_)
                | NodeKind::Switch(..)
                | NodeKind::Case(..)
                | NodeKind::Default(_)
                | NodeKind::Label(..)
                | NodeKind::Goto(_)
                | NodeKind::Break
                | NodeKind::Continue
                | NodeKind::Return(_)
                | NodeKind::Declaration(_)
                | NodeKind::StaticAssert(..)
                | NodeKind::FunctionDef(_)
                | NodeKind::TranslationUnit(_)
        )
    }
}

#[derive(Debug, Clone)]
pub struct IfStmt {
    pub condition: NodeRef,
    pub then_branch: NodeRef,
    pub else_branch: Option<NodeRef>,
}

#[derive(Debug, Clone)]
pub struct WhileStmt {
    pub condition: NodeRef,
    pub body: NodeRef,
}

#[derive(Debug, Clone)]
pub struct ForStmt {
    pub init: Option<NodeRef>, // Declaration or ExpressionStatement
    pub condition: Option<NodeRef>,
    pub increment: Option<NodeRef>,
    pub body: NodeRef,
}

#[derive(Debug, Clone)]
pub struct DeclarationData {
    pub specifiers: ThinVec<DeclSpecifier>,
    pub init_declarators: ThinVec<InitDeclarator>,
}

#[derive(Debug, Clone)]
pub struct InitDeclarator {
    pub declarator: Declarator,
    pub initializer: Option<NodeRef>, // expression or InitializerList
    pub location: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct FunctionDefData {
    pub specifiers: ThinVec<DeclSpecifier>,
    pub declarator: Declarator,
    pub body: NodeRef, // A Compound
}

#[derive(Debug, Clone)]
pub struct TypeName {
    pub specifiers: ThinVec<DeclSpecifier>,
    pub declarator: Declarator,
}

#[derive(Debug, Clone)]
pub struct GenericAssociation {
    pub type_name: Option<NodeRef>, // None for 'default:'
    pub expr: NodeRef,
}

#[derive(Debug, Clone)]
pub struct DesignatedInitializer {
    pub designators: ThinVec<Designator>,
    pub initializer: NodeRef,
}

#[derive(Debug, Clone)]
pub enum Designator {
    FieldName(Symbol),
    ArrayIndex(NodeRef),
}

/// One entry of a declaration-specifier list, in source order.
#[derive(Debug, Clone)]
pub enum DeclSpecifier {
    StorageClass(StorageClass),
    TypeQualifier(TypeQualifiers),
    FunctionSpecifier(FunctionSpecifiers),
    Alignment(AlignmentSpecifier),
    TypeSpecifier(TypeSpecifier, SourceLocation),
}

#[derive(Debug, Clone)]
pub enum TypeSpecifier {
    Void,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Signed,
    Unsigned,
    Bool,
    Complex,
    Atomic(NodeRef /* type name */),
    Record(RecordSpecifier),
    Enum(EnumSpecifier),
    TypedefName(Symbol),
}

impl TypeSpecifier {
    pub fn name(&self) -> &'static str {
        match self {
            TypeSpecifier::Void => "void",
            TypeSpecifier::Char => "char",
            TypeSpecifier::Short => "short",
            TypeSpecifier::Int => "int",
            TypeSpecifier::Long => "long",
            TypeSpecifier::Float => "float",
            TypeSpecifier::Double => "double",
            TypeSpecifier::Signed => "signed",
            TypeSpecifier::Unsigned => "unsigned",
            TypeSpecifier::Bool => "_Bool",
            TypeSpecifier::Complex => "_Complex",
            TypeSpecifier::Atomic(_) => "_Atomic",
            TypeSpecifier::Record(r) if r.is_union => "union",
            TypeSpecifier::Record(_) => "struct",
            TypeSpecifier::Enum(_) => "enum",
            TypeSpecifier::TypedefName(_) => "typedef name",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordSpecifier {
    pub is_union: bool,
    pub tag: Option<Symbol>,
    pub members: Option<ThinVec<MemberDeclaration>>, // None for `struct tag` references
}

#[derive(Debug, Clone)]
pub enum MemberDeclaration {
    Fields {
        specifiers: ThinVec<DeclSpecifier>,
        declarators: ThinVec<MemberDeclarator>,
        location: SourceLocation,
    },
    StaticAssert(NodeRef),
}

#[derive(Debug, Clone)]
pub struct MemberDeclarator {
    pub declarator: Declarator,
    pub bit_width: Option<NodeRef>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct EnumSpecifier {
    pub tag: Option<Symbol>,
    pub enumerators: Option<ThinVec<Enumerator>>,
}

#[derive(Debug, Clone)]
pub struct Enumerator {
    pub name: Symbol,
    pub value: Option<NodeRef>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Typedef,
    Extern,
    Static,
    ThreadLocal, // C11 _Thread_local
    Auto,
    Register,
}

impl StorageClass {
    pub fn name(self) -> &'static str {
        match self {
            StorageClass::Typedef => "typedef",
            StorageClass::Extern => "extern",
            StorageClass::Static => "static",
            StorageClass::ThreadLocal => "_Thread_local",
            StorageClass::Auto => "auto",
            StorageClass::Register => "register",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Deref,
    AddrOf,
    BitNot,
    LogicNot,
    PreIncrement,
    PreDecrement,
}

// Binary Operators (includes assignment types)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    LShift,
    RShift,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    LogicAnd,
    LogicOr,
    Comma,
    Assign,
    AssignAdd,
    AssignSub,
    AssignMul,
    AssignDiv,
    AssignMod,
    AssignBitAnd,
    AssignBitOr,
    AssignBitXor,
    AssignLShift,
    AssignRShift,
}

impl BinaryOp {
    /// Arithmetic operator behind a compound assignment.
    pub fn without_assignment(self) -> Option<BinaryOp> {
        match self {
            BinaryOp::AssignAdd => Some(BinaryOp::Add),
            BinaryOp::AssignSub => Some(BinaryOp::Sub),
            BinaryOp::AssignMul => Some(BinaryOp::Mul),
            BinaryOp::AssignDiv => Some(BinaryOp::Div),
            BinaryOp::AssignMod => Some(BinaryOp::Mod),
            BinaryOp::AssignBitAnd => Some(BinaryOp::BitAnd),
            BinaryOp::AssignBitOr => Some(BinaryOp::BitOr),
            BinaryOp::AssignBitXor => Some(BinaryOp::BitXor),
            BinaryOp::AssignLShift => Some(BinaryOp::LShift),
            BinaryOp::AssignRShift => Some(BinaryOp::RShift),
            _ => None,
        }
    }
}

// Function specifiers
bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct FunctionSpecifiers: u8 {
        const INLINE = 1 << 0;
        const NORETURN = 1 << 1; // C11 _Noreturn
    }
}

#[derive(Debug, Clone)]
pub enum AlignmentSpecifier {
    Type(NodeRef), // _Alignas(type-name)
    Expr(NodeRef), // _Alignas(constant-expression)
}

/// Declarator tree. Wrappers apply to the base type from the outside in.
#[derive(Debug, Clone)]
pub enum Declarator {
    Identifier(Symbol, SourceLocation),
    Abstract,
    Pointer(TypeQualifiers, Box<Declarator>),
    Array(Box<Declarator>, ArraySize),
    Function {
        inner: Box<Declarator>,
        params: ThinVec<ParamData>,
        is_variadic: bool,
        has_prototype: bool,
    },
}

impl Declarator {
    pub fn name(&self) -> Option<Symbol> {
        self.identifier().map(|(name, _)| name)
    }

    pub fn identifier(&self) -> Option<(Symbol, SourceLocation)> {
        match self {
            Declarator::Identifier(name, location) => Some((*name, *location)),
            Declarator::Abstract => None,
            Declarator::Pointer(_, inner) | Declarator::Array(inner, _) => inner.identifier(),
            Declarator::Function { inner, .. } => inner.identifier(),
        }
    }

    /// The function wrapper closest to the identifier, for function definitions.
    pub fn function_parameters(&self) -> Option<&ThinVec<ParamData>> {
        match self {
            Declarator::Function { inner, params, .. } => match inner.as_ref() {
                Declarator::Identifier(..) => Some(params),
                other => other.function_parameters(),
            },
            Declarator::Pointer(_, inner) | Declarator::Array(inner, _) => inner.function_parameters(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamData {
    pub specifiers: ThinVec<DeclSpecifier>,
    pub declarator: Declarator,
    pub location: SourceLocation,
}

#[derive(Debug, Clone)]
pub enum ArraySize {
    Expression {
        expr: NodeRef,
        qualifiers: TypeQualifiers,
        is_static: bool,
    },
    Star {
        qualifiers: TypeQualifiers,
    }, // [*] VLA
    Incomplete {
        qualifiers: TypeQualifiers,
    }, // []
}
