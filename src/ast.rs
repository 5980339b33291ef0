//! Abstract syntax tree for the Ada 83 core.
//!
//! This crate uses ordinary Rust ownership (`Box`/`Vec`) for the tree —
//! idiomatic Rust for a tree a single pass owns outright. The arena
//! (`crate::arena`) is still used for everything that genuinely needs
//! shared, non-owning storage: interned identifier text, and the
//! `Type`/`Symbol` tables an AST node only *references* by id. See
//! `DESIGN.md` for the full rationale.
//!
//! Every node carries a `location`; `ty` and `symbol` are filled in by the
//! semantic pass.

use crate::diagnostics::Location;
use crate::symbols::SymbolId;
use crate::types::TypeId;

/// Resolution metadata attached to a node by the semantic pass.
#[derive(Debug, Clone, Default)]
pub struct Resolved {
    pub ty: Option<TypeId>,
    pub symbol: Option<SymbolId>,
}

// ---------------------------------------------------------------------
// Names / expressions
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Name {
    Identifier(crate::arena::Slice),
    /// `X.Y` — record component or package-qualified name.
    Selected { prefix: Box<Expr>, selector: crate::arena::Slice },
    /// `X.all` — explicit dereference.
    Dereference(Box<Expr>),
    /// `X'Attribute[(arg)]`.
    Attribute { prefix: Box<Expr>, attribute: crate::arena::Slice, arg: Option<Box<Expr>> },
    /// `Type'(Expr)` — qualified expression.
    Qualified { type_mark: Box<Expr>, expr: Box<Expr> },
    /// Unified `prefix(args)` node: call, index, slice, or conversion —
    /// disambiguated only by the semantic pass, never the parser.
    Apply { prefix: Box<Expr>, args: AssociationList },
    /// `lo .. hi`.
    Range { low: Box<Expr>, high: Box<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    And, Or, Xor, AndThen, OrElse,
    Eq, Ne, Lt, Le, Gt, Ge,
    In, NotIn,
    Add, Sub, Concat,
    Mul, Div, Mod, Rem,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Abs,
    Plus,
    Minus,
}

/// One element of a unified association list: used identically by
/// aggregates, call arguments, and generic actuals.
#[derive(Debug, Clone)]
pub struct Association {
    /// Non-empty iff the association is named or `|`-separated.
    pub choices: Vec<Choice>,
    pub value: Expr,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub enum Choice {
    Expr(Expr),
    Range(Expr, Expr),
    Others,
}

pub type AssociationList = Vec<Association>;

#[derive(Debug, Clone)]
pub enum ExprKind {
    IntegerLiteral(i64),
    BigIntegerLiteral(String),
    RealLiteral(f64),
    CharacterLiteral(u8),
    StringLiteral(crate::arena::Slice),
    Name(Name),
    Binary { op: BinOp, left: Box<Expr>, right: Box<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    /// Aggregate; its type comes from context.
    Aggregate(AssociationList),
    /// `new T` / `new T'(expr)`.
    Allocator { type_mark: Box<Expr>, qualifier: Option<Box<Expr>> },
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub location: Location,
    pub resolved: Resolved,
}

impl Expr {
    pub fn new(kind: ExprKind, location: Location) -> Self {
        Expr { kind, location, resolved: Resolved::default() }
    }
}

// ---------------------------------------------------------------------
// Type definitions
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum RangeConstraint {
    Range(Expr, Expr),
    None,
}

#[derive(Debug, Clone)]
pub struct DiscriminantSpec {
    pub name: crate::arena::Slice,
    pub type_mark: Expr,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct ComponentDecl {
    pub names: Vec<crate::arena::Slice>,
    pub subtype: SubtypeIndication,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct VariantPart {
    pub discriminant: crate::arena::Slice,
    pub variants: Vec<Variant>,
}

#[derive(Debug, Clone)]
pub struct Variant {
    pub choices: Vec<Choice>,
    pub components: Vec<ComponentDecl>,
}

/// A base type plus an optional constraint.
#[derive(Debug, Clone)]
pub struct SubtypeIndication {
    pub type_mark: Expr,
    pub constraint: Option<Constraint>,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub enum Constraint {
    Range(Expr, Expr),
    Index(Vec<(Expr, Expr)>),
    Digits(Expr),
    Delta(Expr),
}

#[derive(Debug, Clone)]
pub enum TypeDef {
    Enumeration { literals: Vec<crate::arena::Slice> },
    Integer { low: Expr, high: Expr },
    Modular { modulus: Expr },
    Real { digits: Option<Expr>, delta: Option<Expr>, range: Option<(Expr, Expr)> },
    Array { index_subtypes: Vec<SubtypeIndication>, element: SubtypeIndication, unconstrained: bool },
    Record { discriminants: Vec<DiscriminantSpec>, components: Vec<ComponentDecl>, variant_part: Option<VariantPart> },
    Access { designated: Expr, is_constant: bool },
    Derived { parent: SubtypeIndication },
}

// ---------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Stmt {
    Assignment { target: Expr, value: Expr, location: Location },
    Call { name: Expr, args: AssociationList, location: Location },
    Return { value: Option<Expr>, location: Location },
    If { branches: Vec<(Expr, Vec<Stmt>)>, else_branch: Option<Vec<Stmt>>, location: Location },
    Case { selector: Expr, arms: Vec<CaseArm>, location: Location },
    Loop { label: Option<crate::arena::Slice>, scheme: LoopScheme, body: Vec<Stmt>, location: Location },
    Block { label: Option<crate::arena::Slice>, decls: Vec<Decl>, body: Vec<Stmt>, handlers: Vec<ExceptionHandler>, location: Location },
    Exit { loop_label: Option<crate::arena::Slice>, when: Option<Expr>, location: Location },
    Goto { label: crate::arena::Slice, location: Location },
    Raise { exception: Option<Expr>, location: Location },
    Null { location: Location },
    /// Accept/select/delay/abort are parsed for syntax acceptance only;
    /// tasking is out of scope beyond that.
    Accept { entry: crate::arena::Slice, body: Vec<Stmt>, location: Location },
    Select { arms: Vec<Vec<Stmt>>, location: Location },
    Delay { value: Expr, location: Location },
    Abort { names: Vec<Expr>, location: Location },
}

#[derive(Debug, Clone)]
pub struct CaseArm {
    pub choices: Vec<Choice>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum LoopScheme {
    Plain,
    While(Expr),
    For { var: crate::arena::Slice, range: Expr, reverse: bool },
}

#[derive(Debug, Clone)]
pub struct ExceptionHandler {
    pub names: Vec<Expr>, // empty means `when others`
    pub is_others: bool,
    pub body: Vec<Stmt>,
    pub location: Location,
}

// ---------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Pragma {
    Inline(Vec<crate::arena::Slice>),
    Pack(crate::arena::Slice),
    Suppress { check: crate::arena::Slice, entity: Option<crate::arena::Slice> },
    Import { convention: crate::arena::Slice, name: crate::arena::Slice, external: Option<crate::arena::Slice> },
    Export { convention: crate::arena::Slice, name: crate::arena::Slice, external: Option<crate::arena::Slice> },
    Convention { convention: crate::arena::Slice, name: crate::arena::Slice },
    Unreferenced(Vec<crate::arena::Slice>),
    Pure,
    Preelaborate,
    Elaborate(crate::arena::Slice),
    ElaborateAll(crate::arena::Slice),
    Unknown(crate::arena::Slice),
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub names: Vec<crate::arena::Slice>,
    pub mode: crate::symbols::ParamMode,
    pub type_mark: Expr,
    pub default: Option<Expr>,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct ProcedureSpec {
    pub name: crate::arena::Slice,
    pub params: Vec<ParamSpec>,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct FunctionSpec {
    pub name: crate::arena::Slice,
    pub params: Vec<ParamSpec>,
    pub return_type: Expr,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub enum Decl {
    Object { names: Vec<crate::arena::Slice>, is_constant: bool, subtype: SubtypeIndication, init: Option<Expr>, location: Location },
    TypeDecl { name: crate::arena::Slice, def: TypeDef, location: Location },
    SubtypeDecl { name: crate::arena::Slice, indication: SubtypeIndication, location: Location },
    ExceptionDecl { names: Vec<crate::arena::Slice>, location: Location },
    ProcedureSpecDecl(ProcedureSpec),
    FunctionSpecDecl(FunctionSpec),
    ProcedureBody { spec: ProcedureSpec, decls: Vec<Decl>, body: Vec<Stmt>, handlers: Vec<ExceptionHandler>, end_name: Option<crate::arena::Slice> },
    FunctionBody { spec: FunctionSpec, decls: Vec<Decl>, body: Vec<Stmt>, handlers: Vec<ExceptionHandler>, end_name: Option<crate::arena::Slice> },
    PackageSpec { name: crate::arena::Slice, visible: Vec<Decl>, private: Vec<Decl>, end_name: Option<crate::arena::Slice>, location: Location },
    PackageBody { name: crate::arena::Slice, decls: Vec<Decl>, body: Vec<Stmt>, handlers: Vec<ExceptionHandler>, end_name: Option<crate::arena::Slice>, location: Location },
    /// Parsed for syntax acceptance only.
    GenericDecl { name: crate::arena::Slice, location: Location },
    GenericInst { name: crate::arena::Slice, generic_name: crate::arena::Slice, location: Location },
    UseClause { names: Vec<crate::arena::Slice>, location: Location },
    WithClause { names: Vec<crate::arena::Slice>, location: Location },
    PragmaDecl(Pragma, Location),
}

#[derive(Debug, Clone)]
pub struct Context {
    pub with_clauses: Vec<Decl>,
    pub use_clauses: Vec<Decl>,
}

#[derive(Debug, Clone)]
pub enum Unit {
    Procedure(ProcedureSpec, Vec<Decl>, Vec<Stmt>, Vec<ExceptionHandler>, Option<crate::arena::Slice>),
    Function(FunctionSpec, Vec<Decl>, Vec<Stmt>, Vec<ExceptionHandler>, Option<crate::arena::Slice>),
    PackageSpec { name: crate::arena::Slice, visible: Vec<Decl>, private: Vec<Decl>, end_name: Option<crate::arena::Slice> },
    PackageBody { name: crate::arena::Slice, decls: Vec<Decl>, body: Vec<Stmt>, handlers: Vec<ExceptionHandler>, end_name: Option<crate::arena::Slice> },
}

/// A `compilation_unit` has exactly one unit and one context.
#[derive(Debug, Clone)]
pub struct CompilationUnit {
    pub context: Context,
    pub unit: Unit,
}
