//! Nominal type system with freezing semantics (Ada RM 13.14). `Type_Info`
//! is a tagged variant; size is always in bytes.

use std::cell::Cell;

use crate::arena::Slice;
use crate::symbols::SymbolId;

/// Bitmask of suppressible runtime checks.
pub mod checks {
    pub const RANGE_CHECK: u32 = 1;
    pub const OVERFLOW_CHECK: u32 = 2;
    pub const INDEX_CHECK: u32 = 4;
    pub const LENGTH_CHECK: u32 = 8;
    pub const DIVISION_CHECK: u32 = 16;
    pub const ALL_CHECKS: u32 = 0xFFFF_FFFF;
}

/// A scalar bound: a literal, or (for generic/deferred contexts) an
/// unresolved expression id into the AST arena. Kept as two variants
/// because static bounds (the overwhelming common case) shouldn't need an
/// AST round-trip to read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    Int(i64),
    Float(f64),
    /// Bound is a constant expression resolved during semantic analysis;
    /// index is into `Semantic::resolved_bounds`.
    Expr(u32),
}

#[derive(Debug, Clone)]
pub struct IndexInfo {
    pub index_type: TypeId,
    pub low: Bound,
    pub high: Bound,
}

#[derive(Debug, Clone)]
pub struct ComponentInfo {
    pub name: Slice,
    pub ty: TypeId,
    /// Byte offset within the record, assigned at freeze time.
    pub offset: u32,
    /// Set for discriminants.
    pub is_discriminant: bool,
}

/// Index into the types arena (`Vec<Type>` owned by `TypeTable`).
pub type TypeId = u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Unknown,
    Boolean,
    Character,
    Integer,
    Modular,
    Enumeration,
    Float,
    Fixed,
    Array,
    Record,
    String,
    Access,
    UniversalInteger,
    UniversalReal,
    Task,
    Subprogram,
    Private,
    LimitedPrivate,
    Incomplete,
    Package,
}

#[derive(Debug, Clone)]
pub struct Type {
    pub kind: TypeKind,
    pub name: Slice,
    /// Size in bytes, always — never bits.
    pub size: u32,
    pub alignment: u32,
    pub defining_symbol: Option<SymbolId>,
    /// Subtype -> base type.
    pub base_type: Option<TypeId>,
    /// Derived type -> parent type.
    pub parent_type: Option<TypeId>,
    pub low_bound: Option<Bound>,
    pub high_bound: Option<Bound>,
    pub modulus: Option<u64>,
    pub suppressed_checks: u32,
    pub is_packed: bool,
    frozen: Cell<bool>,
    pub equality_func_name: Option<String>,

    // Per-kind payloads. Only the fields relevant to `kind` are populated;
    // this mirrors the reference's single tagged-variant `Type_Info` with
    // unused payload fields left at their defaults.
    pub indices: Vec<IndexInfo>,
    pub element_type: Option<TypeId>,
    pub is_constrained: bool,
    pub components: Vec<ComponentInfo>,
    pub designated_type: Option<TypeId>,
    pub is_access_constant: bool,
    pub literals: Vec<Slice>,
}

impl Type {
    pub fn new(kind: TypeKind, name: Slice) -> Self {
        Type {
            kind,
            name,
            size: 0,
            alignment: 1,
            defining_symbol: None,
            base_type: None,
            parent_type: None,
            low_bound: None,
            high_bound: None,
            modulus: None,
            suppressed_checks: 0,
            is_packed: false,
            frozen: Cell::new(false),
            equality_func_name: None,
            indices: Vec::new(),
            element_type: None,
            is_constrained: false,
            components: Vec::new(),
            designated_type: None,
            is_access_constant: false,
            literals: Vec::new(),
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.get()
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Boolean
                | TypeKind::Character
                | TypeKind::Integer
                | TypeKind::Modular
                | TypeKind::Enumeration
                | TypeKind::Float
                | TypeKind::Fixed
                | TypeKind::UniversalInteger
                | TypeKind::UniversalReal
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Integer
                | TypeKind::Modular
                | TypeKind::Float
                | TypeKind::Fixed
                | TypeKind::UniversalInteger
                | TypeKind::UniversalReal
        )
    }

    pub fn is_discrete(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Boolean
                | TypeKind::Character
                | TypeKind::Integer
                | TypeKind::Modular
                | TypeKind::Enumeration
                | TypeKind::UniversalInteger
        )
    }

    pub fn is_array_or_string(&self) -> bool {
        matches!(self.kind, TypeKind::Array | TypeKind::String)
    }
}

/// Owns every `Type` created during a compilation unit; `TypeId`s index
/// into `types`. Predefined types are installed first, at fixed ids, by
/// `symbols::Environment::new`.
pub struct TypeTable {
    types: Vec<Type>,
    /// Composite types in freeze order. Unbounded: a growable `Vec` rather
    /// than a fixed-capacity table, since this is per-unit state rather
    /// than a process global.
    frozen_composites: Vec<TypeId>,
}

impl TypeTable {
    pub fn new() -> Self {
        TypeTable { types: Vec::new(), frozen_composites: Vec::new() }
    }

    pub fn push(&mut self, ty: Type) -> TypeId {
        self.types.push(ty);
        (self.types.len() - 1) as TypeId
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id as usize]
    }

    pub fn get_mut(&mut self, id: TypeId) -> &mut Type {
        &mut self.types[id as usize]
    }

    pub fn frozen_composites(&self) -> &[TypeId] {
        &self.frozen_composites
    }

    /// Walk `base_type` to find the ultimate base of a subtype chain.
    pub fn base(&self, mut id: TypeId) -> TypeId {
        let mut guard = 0;
        while let Some(base) = self.get(id).base_type {
            id = base;
            guard += 1;
            if guard > 10_000 {
                break; // malformed chain; avoid hanging on it
            }
        }
        id
    }

    /// `Freeze_Type`: idempotent, marks frozen, recurses to base, parent,
    /// array element/index types and record components. Freezing an access
    /// type does NOT freeze its designated subtype — the visited flag is set before recursion so
    /// mutually-recursive composites can't deadlock.
    pub fn freeze(&mut self, id: TypeId) {
        if self.get(id).is_frozen() {
            return;
        }
        self.get(id).frozen.set(true);

        if let Some(base) = self.get(id).base_type {
            self.freeze(base);
        }
        if let Some(parent) = self.get(id).parent_type {
            self.freeze(parent);
        }

        let kind = self.get(id).kind.clone();
        match kind {
            TypeKind::Array | TypeKind::String => {
                if let Some(elem) = self.get(id).element_type {
                    self.freeze(elem);
                }
                let index_types: Vec<TypeId> = self.get(id).indices.iter().map(|i| i.index_type).collect();
                for it in index_types {
                    self.freeze(it);
                }
                self.assign_equality_name(id);
            }
            TypeKind::Record => {
                let component_types: Vec<TypeId> = self.get(id).components.iter().map(|c| c.ty).collect();
                for ct in component_types {
                    self.freeze(ct);
                }
                self.layout_record(id);
                self.assign_equality_name(id);
            }
            TypeKind::Access => {
                // Deliberately does NOT freeze `designated_type` (RM 13.14).
            }
            _ => {}
        }
    }

    /// Assign byte offsets to record components in declaration order and
    /// compute the record's total size/alignment.
    fn layout_record(&mut self, id: TypeId) {
        let mut offset: u32 = 0;
        let mut max_align: u32 = 1;
        let component_count = self.get(id).components.len();
        for i in 0..component_count {
            let ty = self.get(id).components[i].ty;
            let (size, align) = {
                let t = self.get(ty);
                (t.size.max(1), t.alignment.max(1))
            };
            offset = align_up(offset, align);
            self.get_mut(id).components[i].offset = offset;
            offset += size;
            max_align = max_align.max(align);
        }
        offset = align_up(offset, max_align);
        let rec = self.get_mut(id);
        rec.size = offset;
        rec.alignment = max_align;
    }

    /// At freeze time every composite type is given a unique implicit
    /// equality function name.
    fn assign_equality_name(&mut self, id: TypeId) {
        if self.get(id).equality_func_name.is_some() {
            return;
        }
        let ordinal = self.frozen_composites.len();
        let name = format!("_ada_eq_{}_{}", self.get(id).name.as_str(), ordinal);
        self.get_mut(id).equality_func_name = Some(name);
        self.frozen_composites.push(id);
    }

    /// Type compatibility:
    /// identical -> compatible; universal numeric types unify with any
    /// discrete/real; arrays are compatible if either is `STRING` or their
    /// element types recurse-compatible; otherwise same ultimate base.
    pub fn compatible(&self, a: TypeId, b: TypeId) -> bool {
        if a == b {
            return true;
        }
        let ta = self.get(a);
        let tb = self.get(b);
        if ta.kind == TypeKind::Unknown || tb.kind == TypeKind::Unknown {
            return true; // permissive for unknown/recovered types
        }
        match (&ta.kind, &tb.kind) {
            (TypeKind::UniversalInteger, _) if tb.is_discrete() => true,
            (_, TypeKind::UniversalInteger) if ta.is_discrete() => true,
            (TypeKind::UniversalReal, TypeKind::Float | TypeKind::Fixed) => true,
            (TypeKind::Float | TypeKind::Fixed, TypeKind::UniversalReal) => true,
            (TypeKind::Array | TypeKind::String, TypeKind::Array | TypeKind::String) => {
                if ta.kind == TypeKind::String || tb.kind == TypeKind::String {
                    return true;
                }
                match (ta.element_type, tb.element_type) {
                    (Some(ea), Some(eb)) => self.compatible(ea, eb),
                    _ => true,
                }
            }
            _ => self.base(a) == self.base(b),
        }
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

fn align_up(offset: u32, align: u32) -> u32 {
    if align == 0 {
        return offset;
    }
    (offset + align - 1) / align * align
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    fn mk(arena: &Arena, kind: TypeKind, name: &str) -> Type {
        Type::new(kind, arena.intern(name))
    }

    #[test]
    fn freeze_is_idempotent_and_monotone() {
        let arena = Arena::new();
        let mut table = TypeTable::new();
        let mut rec = mk(&arena, TypeKind::Record, "R");
        let int_id = table.push(mk(&arena, TypeKind::Integer, "INTEGER"));
        table.get_mut(int_id).size = 4;
        table.get_mut(int_id).alignment = 4;
        rec.components.push(ComponentInfo { name: arena.intern("X"), ty: int_id, offset: 0, is_discriminant: false });
        let rec_id = table.push(rec);

        table.freeze(rec_id);
        let size_after_first = table.get(rec_id).size;
        assert!(table.get(rec_id).is_frozen());
        assert_eq!(size_after_first, 4);

        // Freezing again must not change layout.
        table.freeze(rec_id);
        assert_eq!(table.get(rec_id).size, size_after_first);
        assert_eq!(table.get(rec_id).components.len(), 1);
    }

    #[test]
    fn access_does_not_freeze_designated_type() {
        let arena = Arena::new();
        let mut table = TypeTable::new();
        let incomplete = table.push(mk(&arena, TypeKind::Incomplete, "NODE"));
        let mut access = mk(&arena, TypeKind::Access, "NODE_PTR");
        access.designated_type = Some(incomplete);
        let access_id = table.push(access);

        table.freeze(access_id);
        assert!(table.get(access_id).is_frozen());
        assert!(!table.get(incomplete).is_frozen());
    }

    #[test]
    fn record_layout_assigns_offsets_in_order() {
        let arena = Arena::new();
        let mut table = TypeTable::new();
        let int_id = table.push(mk(&arena, TypeKind::Integer, "INTEGER"));
        table.get_mut(int_id).size = 4;
        table.get_mut(int_id).alignment = 4;
        let mut rec = mk(&arena, TypeKind::Record, "PAIR");
        rec.components.push(ComponentInfo { name: arena.intern("A"), ty: int_id, offset: 0, is_discriminant: false });
        rec.components.push(ComponentInfo { name: arena.intern("B"), ty: int_id, offset: 0, is_discriminant: false });
        let rec_id = table.push(rec);
        table.freeze(rec_id);
        assert_eq!(table.get(rec_id).components[0].offset, 0);
        assert_eq!(table.get(rec_id).components[1].offset, 4);
        assert_eq!(table.get(rec_id).size, 8);
    }

    #[test]
    fn universal_integer_compatible_with_any_discrete() {
        let arena = Arena::new();
        let mut table = TypeTable::new();
        let universal = table.push(mk(&arena, TypeKind::UniversalInteger, "universal integer"));
        let integer = table.push(mk(&arena, TypeKind::Integer, "INTEGER"));
        assert!(table.compatible(universal, integer));
        assert!(table.compatible(integer, universal));
    }

    #[test]
    fn string_is_compatible_with_any_array_of_character() {
        let arena = Arena::new();
        let mut table = TypeTable::new();
        let ch = table.push(mk(&arena, TypeKind::Character, "CHARACTER"));
        let mut string_ty = mk(&arena, TypeKind::String, "STRING");
        string_ty.element_type = Some(ch);
        let string_id = table.push(string_ty);
        let mut other_arr = mk(&arena, TypeKind::Array, "NAME");
        other_arr.element_type = Some(ch);
        let other_id = table.push(other_arr);
        assert!(table.compatible(string_id, other_id));
    }
}
