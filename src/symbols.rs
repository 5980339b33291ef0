//! Scope tree with hashed buckets and overload chains.
//!
//! `Symbol_Add` hashes into the current scope's bucket; a same-name
//! subprogram links onto the existing overload chain instead of shadowing,
//! other same-name-same-scope cases are redefinition errors. `Symbol_Find`
//! walks scope parents, returning the first visible match. Frame offsets
//! are assigned as variables/parameters are added, driving the static-link
//! GEPs codegen emits later.

use std::collections::HashMap;

use crate::arena::Slice;
use crate::diagnostics::Location;
use crate::types::TypeId;

pub type SymbolId = u32;
pub type ScopeId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Visibility {
    NotVisible,
    UseVisible,
    ImmediatelyVisible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Constant,
    Type,
    Subtype,
    Procedure,
    Function,
    Parameter,
    Package,
    Exception,
    Label,
    Loop,
    Entry,
    Component,
    Discriminant,
    Literal,
    Generic,
    GenericInstance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convention {
    Ada,
    C,
    Stdcall,
    Intrinsic,
    Assembler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamMode {
    In,
    Out,
    InOut,
}

#[derive(Debug, Clone)]
pub struct ParamInfo {
    pub name: Slice,
    pub ty: TypeId,
    pub mode: ParamMode,
}

/// Pragma-derived state attached to a symbol.
#[derive(Debug, Clone, Default)]
pub struct PragmaState {
    pub is_inline: bool,
    pub is_imported: bool,
    pub is_exported: bool,
    pub external_name: Option<String>,
    pub convention: Option<Convention>,
    pub suppressed_checks: u32,
    pub is_unreferenced: bool,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: Slice,
    pub location: Location,
    pub kind: SymbolKind,
    pub ty: Option<TypeId>,
    pub defining_scope: ScopeId,
    /// Enclosing package/subprogram, for mangling.
    pub parent_symbol: Option<SymbolId>,
    /// Next symbol with the same name in the same scope, for overloaded
    /// subprograms.
    pub overload_next: Option<SymbolId>,
    pub visibility: Visibility,
    pub unique_id: u32,
    pub nesting_level: u32,
    pub frame_offset: u32,
    /// Subprogram/package's own scope (its declarative region).
    pub owned_scope: Option<ScopeId>,
    pub pragmas: PragmaState,
    pub parameters: Vec<ParamInfo>,
    /// Package's exported symbol list (visible part).
    pub exported: Vec<SymbolId>,
}

pub struct Scope {
    pub parent: Option<ScopeId>,
    pub owner: Option<SymbolId>,
    pub nesting_level: u32,
    pub frame_size: u32,
    buckets: HashMap<Vec<u8>, SymbolId>,
    /// Linear order of every symbol declared directly in this scope — the
    /// reference keeps this "for frame offsets" since
    /// nested subprograms must materialize parent frames in declaration
    /// order.
    pub linear: Vec<SymbolId>,
}

impl Scope {
    fn new(parent: Option<ScopeId>, owner: Option<SymbolId>, nesting_level: u32) -> Self {
        Scope { parent, owner, nesting_level, frame_size: 0, buckets: HashMap::new(), linear: Vec::new() }
    }
}

/// All symbols and scopes for one compilation unit.
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    scopes: Vec<Scope>,
    next_unique_id: u32,
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut table = SymbolTable { symbols: Vec::new(), scopes: Vec::new(), next_unique_id: 0 };
        table.scopes.push(Scope::new(None, None, 0)); // STANDARD / root scope
        table
    }

    pub fn root_scope(&self) -> ScopeId {
        0
    }

    /// Total number of scopes ever pushed, for codegen passes that need to
    /// enumerate every scope's symbols (e.g. collecting exception identities
    /// module-wide) without re-walking the semantic pass's own scope stack.
    pub fn scope_count(&self) -> u32 {
        self.scopes.len() as u32
    }

    pub fn new_scope(&mut self, parent: ScopeId, owner: Option<SymbolId>) -> ScopeId {
        let level = self.scopes[parent as usize].nesting_level + 1;
        self.scopes.push(Scope::new(Some(parent), owner, level));
        (self.scopes.len() - 1) as ScopeId
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id as usize]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id as usize]
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id as usize]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id as usize]
    }

    /// `sizeof(type) or 8` for objects without a resolved type yet,
    /// matching the reference's frame-offset bump rule.
    fn object_size(&self, ty: Option<TypeId>, types: &crate::types::TypeTable) -> u32 {
        match ty {
            Some(t) => types.get(t).size.max(8),
            None => 8,
        }
    }

    /// `Symbol_Add`: hash into `scope`'s bucket; link onto an existing
    /// subprogram's overload chain, otherwise a same-name clash is a
    /// redefinition error reported by the caller (semantic pass) — this
    /// table itself just reports whether a clash occurred.
    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &mut self,
        scope_id: ScopeId,
        name: Slice,
        location: Location,
        kind: SymbolKind,
        ty: Option<TypeId>,
        parent_symbol: Option<SymbolId>,
        types: &crate::types::TypeTable,
    ) -> AddResult {
        let unique_id = self.next_unique_id;
        self.next_unique_id += 1;
        let nesting_level = self.scopes[scope_id as usize].nesting_level;

        let key = crate::arena::fnv1a_fold(name.as_bytes()).to_le_bytes().to_vec();
        let existing = self.scopes[scope_id as usize].buckets.get(&key).copied();

        let is_object = matches!(kind, SymbolKind::Variable | SymbolKind::Parameter);
        let frame_offset = if is_object {
            let size = self.object_size(ty, types);
            let scope = &mut self.scopes[scope_id as usize];
            let offset = scope.frame_size;
            scope.frame_size += size;
            offset
        } else {
            0
        };

        let new_symbol = Symbol {
            name,
            location,
            kind,
            ty,
            defining_scope: scope_id,
            parent_symbol,
            overload_next: None,
            visibility: Visibility::ImmediatelyVisible,
            unique_id,
            nesting_level,
            frame_offset,
            owned_scope: None,
            pragmas: PragmaState::default(),
            parameters: Vec::new(),
            exported: Vec::new(),
        };

        if let Some(existing_id) = existing {
            let existing_is_subprogram =
                matches!(self.get(existing_id).kind, SymbolKind::Procedure | SymbolKind::Function);
            let new_is_subprogram = matches!(kind, SymbolKind::Procedure | SymbolKind::Function);
            if existing_is_subprogram && new_is_subprogram && self.get(existing_id).name.eq_ignore_case(&name) {
                // Link onto the overload chain: walk to the tail.
                let new_id = self.symbols.len() as SymbolId;
                self.symbols.push(new_symbol);
                let mut tail = existing_id;
                while let Some(next) = self.get(tail).overload_next {
                    tail = next;
                }
                self.get_mut(tail).overload_next = Some(new_id);
                self.scopes[scope_id as usize].linear.push(new_id);
                return AddResult::Overloaded(new_id);
            }
            // Redefinition detection isn't rigorously enforced here: report
            // it and keep the first entry rather than replacing it.
            return AddResult::Redefinition(existing_id);
        }

        let new_id = self.symbols.len() as SymbolId;
        self.symbols.push(new_symbol);
        self.scopes[scope_id as usize].buckets.insert(key, new_id);
        self.scopes[scope_id as usize].linear.push(new_id);
        AddResult::Added(new_id)
    }

    /// `Symbol_Find`: walk scope parents, return the first match visible
    /// at or above `Visibility::UseVisible`.
    pub fn find(&self, scope_id: ScopeId, name: &Slice) -> Option<SymbolId> {
        let key = crate::arena::fnv1a_fold(name.as_bytes()).to_le_bytes().to_vec();
        let mut cur = Some(scope_id);
        while let Some(id) = cur {
            if let Some(&sym_id) = self.scopes[id as usize].buckets.get(&key) {
                if self.get(sym_id).visibility >= Visibility::ImmediatelyVisible {
                    return Some(sym_id);
                }
            }
            cur = self.scopes[id as usize].parent;
        }
        None
    }

    /// Find the closest existing symbol by name for "did you mean?"
    /// diagnostics.
    pub fn suggest(&self, scope_id: ScopeId, name: &Slice) -> Option<Slice> {
        let mut best: Option<(Slice, usize)> = None;
        let mut cur = Some(scope_id);
        while let Some(id) = cur {
            for &sym_id in &self.scopes[id as usize].linear {
                let candidate = self.get(sym_id).name;
                let dist = name.levenshtein_capped(&candidate);
                if dist < 100 && best.as_ref().map(|(_, d)| dist < *d).unwrap_or(true) {
                    best = Some((candidate, dist));
                }
            }
            cur = self.scopes[id as usize].parent;
        }
        best.map(|(s, _)| s)
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum AddResult {
    Added(SymbolId),
    Overloaded(SymbolId),
    Redefinition(SymbolId),
}

impl AddResult {
    pub fn symbol_id(&self) -> SymbolId {
        match self {
            AddResult::Added(id) | AddResult::Overloaded(id) | AddResult::Redefinition(id) => *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::diagnostics::Location;
    use crate::types::TypeTable;

    #[test]
    fn symbol_unique_ids_are_unique() {
        let arena = Arena::new();
        let types = TypeTable::new();
        let mut table = SymbolTable::new();
        let root = table.root_scope();
        let a = table
            .add(root, arena.intern("X"), Location::new("f", 1, 1), SymbolKind::Variable, None, None, &types)
            .symbol_id();
        let b = table
            .add(root, arena.intern("Y"), Location::new("f", 2, 1), SymbolKind::Variable, None, None, &types)
            .symbol_id();
        assert_ne!(table.get(a).unique_id, table.get(b).unique_id);
    }

    #[test]
    fn frame_offsets_accumulate_sequentially() {
        let arena = Arena::new();
        let types = TypeTable::new();
        let mut table = SymbolTable::new();
        let root = table.root_scope();
        let a = table
            .add(root, arena.intern("X"), Location::new("f", 1, 1), SymbolKind::Variable, None, None, &types)
            .symbol_id();
        let b = table
            .add(root, arena.intern("Y"), Location::new("f", 2, 1), SymbolKind::Variable, None, None, &types)
            .symbol_id();
        assert_eq!(table.get(a).frame_offset, 0);
        assert_eq!(table.get(b).frame_offset, 8);
        assert_eq!(table.scope(root).frame_size, 16);
    }

    #[test]
    fn overloaded_subprograms_link_instead_of_shadow() {
        let arena = Arena::new();
        let types = TypeTable::new();
        let mut table = SymbolTable::new();
        let root = table.root_scope();
        let name = arena.intern("Foo");
        let first = table
            .add(root, name, Location::new("f", 1, 1), SymbolKind::Procedure, None, None, &types)
            .symbol_id();
        let second = table.add(root, name, Location::new("f", 2, 1), SymbolKind::Procedure, None, None, &types);
        assert!(matches!(second, AddResult::Overloaded(_)));
        assert_eq!(table.get(first).overload_next, Some(second.symbol_id()));
    }

    #[test]
    fn find_walks_parent_scopes() {
        let arena = Arena::new();
        let types = TypeTable::new();
        let mut table = SymbolTable::new();
        let root = table.root_scope();
        let name = arena.intern("Global_Var");
        let sym = table
            .add(root, name, Location::new("f", 1, 1), SymbolKind::Variable, None, None, &types)
            .symbol_id();
        let inner = table.new_scope(root, None);
        assert_eq!(table.find(inner, &name), Some(sym));
    }
}
