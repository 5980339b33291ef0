//! Lowering the analyzed tree to textual LLVM IR.
//!
//! One function per subprogram body, explicit basic blocks with `%L<n>`
//! labels, SSA temporaries named `%t<n>`. Scalars widen to `i64`/`double`
//! at operation boundaries the way the reference's `Emit_Convert` does;
//! overflow-checked arithmetic goes through the `llvm.sadd/ssub/smul.with.
//! overflow.i64` intrinsics unless `pragma Suppress(Overflow_Check)` is in
//! effect for the enclosing subprogram. Records and arrays lower to raw
//! byte buffers addressed by manual `getelementptr`-by-offset rather than
//! named LLVM struct/array types, so record field access, frame addressing
//! and aggregate construction all share one addressing idiom. Kept as a
//! single module rather than a `codegen/` directory — the instruction set
//! here doesn't warrant the split yet.

use std::fmt::Write as _;

use crate::arena::Slice;
use crate::ast::*;
use crate::diagnostics::{Diagnostics, Location};
use crate::ice;
use crate::semantic::Environment;
use crate::symbols::{ParamMode, ScopeId, SymbolId, SymbolKind};
use crate::types::{checks, Bound, Type, TypeId, TypeKind};

/// One emitted value plus the LLVM type it was produced as, so callers
/// don't need to re-derive widening rules at every use site. `bounds`
/// carries the `(low, high)` SSA values for a fat-pointer-shaped result
/// (string literals, `&` concatenation) — `None` for every plain scalar.
#[derive(Clone, Debug)]
struct Value {
    text: String,
    llvm_ty: &'static str,
    bounds: Option<(String, String)>,
}

impl Value {
    fn imm(text: impl Into<String>, llvm_ty: &'static str) -> Self {
        Value { text: text.into(), llvm_ty, bounds: None }
    }

    fn fat(text: impl Into<String>, low: String, high: String) -> Self {
        Value { text: text.into(), llvm_ty: "i8*", bounds: Some((low, high)) }
    }
}

/// Where a local's storage lives: its own `alloca`, or a byte offset into
/// an enclosing frame reached through `%__frame_base`/`%__parent_frame`.
/// `FramePtr` always holds an untyped `i8*`; every access bitcasts it to
/// the slot's real type first (`Codegen::typed_ptr`).
#[derive(Clone)]
enum Storage {
    Alloca(String),
    FramePtr(String),
}

#[derive(Clone)]
struct LocalSlot {
    key: String,
    ty: &'static str,
    storage: Storage,
}

pub struct Codegen<'a> {
    env: &'a Environment,
    diags: &'a mut Diagnostics,
    out: String,
    body: String,
    temp_counter: u32,
    label_counter: u32,
    string_constants: Vec<(String, String)>,
    declared_runtime: bool,
    /// Checks suppressed by the subprogram currently being emitted.
    suppressed: u32,
    locals: Vec<LocalSlot>,
    /// Scope used to resolve names (callees, nested bodies) while emitting
    /// the subprogram currently in progress.
    current_scope: ScopeId,
    /// `Some("%__frame_base")` while emitting a subprogram that owns a
    /// frame for its own nested subprograms to address into.
    frame_base: Option<String>,
    /// `Some("%__parent_frame")` while emitting a subprogram nested inside
    /// another one.
    parent_frame: Option<String>,
}

impl<'a> Codegen<'a> {
    pub fn new(env: &'a Environment, diags: &'a mut Diagnostics) -> Self {
        Codegen {
            env,
            diags,
            out: String::new(),
            body: String::new(),
            temp_counter: 0,
            label_counter: 0,
            string_constants: Vec::new(),
            declared_runtime: false,
            suppressed: 0,
            locals: Vec::new(),
            current_scope: env.root_scope,
            frame_base: None,
            parent_frame: None,
        }
    }

    fn temp(&mut self) -> String {
        self.temp_counter += 1;
        format!("%t{}", self.temp_counter)
    }

    fn label(&mut self, prefix: &str) -> String {
        self.label_counter += 1;
        format!("L{}_{}", prefix, self.label_counter)
    }

    // -----------------------------------------------------------------
    // Module prologue: target info, runtime declarations, exception
    // identities, implicit equality functions.
    // -----------------------------------------------------------------

    fn emit_runtime_prologue(&mut self) {
        if self.declared_runtime {
            return;
        }
        self.declared_runtime = true;
        self.out.push_str(
            "target datalayout = \"e-m:e-p270:32:32-p271:32:32-p272:64:64-i64:64-i128:128-f80:128-n8:16:32:64-S128\"\n\
             target triple = \"x86_64-unknown-linux-gnu\"\n\n\
             declare { i64, i1 } @llvm.sadd.with.overflow.i64(i64, i64)\n\
             declare { i64, i1 } @llvm.ssub.with.overflow.i64(i64, i64)\n\
             declare { i64, i1 } @llvm.smul.with.overflow.i64(i64, i64)\n\
             declare i32 @memcmp(i8*, i8*, i64)\n\
             declare i32 @setjmp(i8*)\n\
             declare void @longjmp(i8*, i32)\n\
             declare void @__ada_raise(i64)\n\
             declare void @__ada_reraise()\n\
             declare void @__ada_push_handler(i8*)\n\
             declare void @__ada_pop_handler()\n\
             declare i64 @__ada_current_exception()\n\
             declare i8* @__ada_sec_stack_alloc(i64)\n\
             declare i8* @__ada_sec_stack_mark()\n\
             declare void @__ada_sec_stack_release(i8*)\n\
             declare void @llvm.memcpy.p0i8.p0i8.i64(i8*, i8*, i64, i1)\n\n",
        );
        self.emit_exception_identities();
        self.emit_equality_functions();
    }

    /// One `@__exc.<mangled> = private constant i8 0` per exception symbol
    /// in every scope, plus the four predefined exceptions — their address
    /// (not their contents) is the exception's runtime identity.
    fn emit_exception_identities(&mut self) {
        for scope_id in 0..self.env.symbols.scope_count() {
            let members = self.env.symbols.scope(scope_id).linear.clone();
            for sym_id in members {
                if self.env.symbols.get(sym_id).kind == SymbolKind::Exception {
                    let mangled = self.mangle_symbol(sym_id);
                    let _ = writeln!(self.out, "@__exc.{} = private constant i8 0", mangled);
                }
            }
        }
        self.out.push('\n');
    }

    fn emit_equality_functions(&mut self) {
        let composites: Vec<TypeId> = self.env.types.frozen_composites().to_vec();
        for tid in composites {
            let ty = self.env.types.get(tid).clone();
            let Some(name) = ty.equality_func_name.clone() else { continue };

            let saved_body = std::mem::take(&mut self.body);
            let saved_temp = self.temp_counter;
            let saved_label = self.label_counter;
            self.temp_counter = 0;
            self.label_counter = 0;

            match ty.kind {
                TypeKind::Record => self.emit_record_equality_body(&ty),
                TypeKind::Array | TypeKind::String => {
                    if ty.is_constrained {
                        self.emit_array_equality_body(&ty);
                    } else {
                        // Unconstrained array/string equality isn't given a
                        // real implementation; every comparison is false.
                        self.body.push_str("  ret i1 0\n");
                    }
                }
                _ => self.body.push_str("  ret i1 0\n"),
            }

            let _ = writeln!(self.out, "define i1 @{}(i8* %0, i8* %1) {{", name);
            self.out.push_str("entry:\n");
            self.out.push_str(&self.body);
            self.out.push_str("}\n\n");

            self.body = saved_body;
            self.temp_counter = saved_temp;
            self.label_counter = saved_label;
        }
    }

    fn emit_record_equality_body(&mut self, ty: &Type) {
        if ty.components.is_empty() {
            self.body.push_str("  ret i1 1\n");
            return;
        }
        let mut acc: Option<String> = None;
        for c in ty.components.clone() {
            let comp_ty = self.type_ref(c.ty);
            let is_float = comp_ty == "double";
            let a0 = self.temp();
            let _ = writeln!(self.body, "  {} = getelementptr i8, i8* %0, i64 {}", a0, c.offset);
            let a0t = self.temp();
            let _ = writeln!(self.body, "  {} = bitcast i8* {} to {}*", a0t, a0, comp_ty);
            let v0 = self.temp();
            let _ = writeln!(self.body, "  {} = load {}, {}* {}", v0, comp_ty, comp_ty, a0t);
            let a1 = self.temp();
            let _ = writeln!(self.body, "  {} = getelementptr i8, i8* %1, i64 {}", a1, c.offset);
            let a1t = self.temp();
            let _ = writeln!(self.body, "  {} = bitcast i8* {} to {}*", a1t, a1, comp_ty);
            let v1 = self.temp();
            let _ = writeln!(self.body, "  {} = load {}, {}* {}", v1, comp_ty, comp_ty, a1t);
            let cmp = self.temp();
            if is_float {
                let _ = writeln!(self.body, "  {} = fcmp oeq {} {}, {}", cmp, comp_ty, v0, v1);
            } else {
                let _ = writeln!(self.body, "  {} = icmp eq {} {}, {}", cmp, comp_ty, v0, v1);
            }
            acc = Some(match acc {
                None => cmp,
                Some(prev) => {
                    let t = self.temp();
                    let _ = writeln!(self.body, "  {} = and i1 {}, {}", t, prev, cmp);
                    t
                }
            });
        }
        let _ = writeln!(self.body, "  ret i1 {}", acc.unwrap());
    }

    fn emit_array_equality_body(&mut self, ty: &Type) {
        let elem_size = ty.element_type.map(|e| self.env.types.get(e).size).unwrap_or(1).max(1) as i64;
        let (lo, hi) = match ty.indices.first() {
            Some(ix) => (bound_to_i64(&ix.low), bound_to_i64(&ix.high)),
            None => (None, None),
        };
        let count = match (lo, hi) {
            (Some(l), Some(h)) => (h - l + 1).max(0),
            _ => 0,
        };
        let total = count * elem_size;
        let cmp = self.temp();
        let _ = writeln!(self.body, "  {} = call i32 @memcmp(i8* %0, i8* %1, i64 {})", cmp, total);
        let t = self.temp();
        let _ = writeln!(self.body, "  {} = icmp eq i32 {}, 0", t, cmp);
        let _ = writeln!(self.body, "  ret i1 {}", t);
    }

    // -----------------------------------------------------------------
    // Top-level dispatch
    // -----------------------------------------------------------------

    pub fn emit_compilation_unit(&mut self, cu: &CompilationUnit) -> String {
        self.emit_runtime_prologue();
        self.emit_unit(&cu.unit);
        let mut out = std::mem::take(&mut self.out);
        for (name, content) in &self.string_constants {
            let _ = writeln!(out, "@{} = private unnamed_addr constant [{} x i8] c\"{}\\00\"", name, content.len() + 1, escape_llvm_string(content));
        }
        out
    }

    fn emit_unit(&mut self, unit: &Unit) {
        match unit {
            Unit::Procedure(spec, decls, body, handlers, _) => {
                if let Some(sym) = self.env.symbols.find(self.env.root_scope, &spec.name) {
                    self.emit_subprogram(sym, &spec.params, None, decls, body, handlers);
                } else {
                    ice!(self.diags, spec.location, "top-level procedure symbol missing after semantic analysis");
                }
            }
            Unit::Function(spec, decls, body, handlers, _) => {
                if let Some(sym) = self.env.symbols.find(self.env.root_scope, &spec.name) {
                    let ret = self.type_ref(self.resolve_ty(&spec.return_type));
                    self.emit_subprogram(sym, &spec.params, Some(ret), decls, body, handlers);
                } else {
                    ice!(self.diags, spec.location, "top-level function symbol missing after semantic analysis");
                }
            }
            Unit::PackageSpec { visible, .. } => {
                for d in visible {
                    self.emit_decl_toplevel(d);
                }
            }
            Unit::PackageBody { name, decls, .. } => {
                let saved_scope = self.current_scope;
                if let Some(sym) = self.env.symbols.find(self.env.root_scope, name) {
                    self.current_scope = self.env.symbols.get(sym).owned_scope.unwrap_or(saved_scope);
                }
                for d in decls {
                    self.emit_decl_toplevel(d);
                }
                self.current_scope = saved_scope;
            }
        }
    }

    fn emit_decl_toplevel(&mut self, decl: &Decl) {
        match decl {
            Decl::ProcedureBody { spec, decls, body, handlers, .. } => {
                if let Some(sym) = self.env.symbols.find(self.current_scope, &spec.name) {
                    self.emit_subprogram(sym, &spec.params, None, decls, body, handlers);
                }
            }
            Decl::FunctionBody { spec, decls, body, handlers, .. } => {
                if let Some(sym) = self.env.symbols.find(self.current_scope, &spec.name) {
                    let ret = self.type_ref(self.resolve_ty(&spec.return_type));
                    self.emit_subprogram(sym, &spec.params, Some(ret), decls, body, handlers);
                }
            }
            _ => {}
        }
    }

    fn resolve_ty(&self, expr: &Expr) -> TypeId {
        expr.resolved.ty.unwrap_or(self.env.integer)
    }

    /// Maps a semantic `TypeId` to its LLVM scalar representation. Arrays
    /// and records lower to a raw `i8*` byte-buffer pointer; a bare string
    /// literal/concatenation result additionally carries `(low, high)`
    /// bounds on the `Value` (see `Value::fat`) rather than in the type.
    fn type_ref(&self, ty: TypeId) -> &'static str {
        let t = self.env.types.get(ty);
        match t.kind {
            TypeKind::Boolean => "i1",
            TypeKind::Character => "i8",
            TypeKind::Float | TypeKind::Fixed | TypeKind::UniversalReal => "double",
            TypeKind::Access | TypeKind::Array | TypeKind::Record | TypeKind::String => "i8*",
            _ => "i64",
        }
    }

    // -----------------------------------------------------------------
    // Mangling
    // -----------------------------------------------------------------

    /// `parent__escaped-name_S<unique_id>`, walking `parent_symbol` all the
    /// way to the root so overloads and same-named locals in different
    /// scopes never collide.
    fn mangle_symbol(&self, sym: SymbolId) -> String {
        let s = self.env.symbols.get(sym);
        let escaped = mangle_name_part(s.name.as_str());
        let qualified = match s.parent_symbol {
            Some(p) => format!("{}__{}", self.mangle_symbol(p), escaped),
            None => escaped,
        };
        format!("{}_S{}", qualified, s.unique_id)
    }

    fn constraint_error_symbol(&self) -> Option<SymbolId> {
        let name = Slice::from_bytes(b"CONSTRAINT_ERROR");
        self.env.symbols.find(self.env.root_scope, &name)
    }

    // -----------------------------------------------------------------
    // Subprograms, frames, static links
    // -----------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn emit_subprogram(&mut self, sym: SymbolId, params: &[ParamSpec], ret: Option<&'static str>, decls: &[Decl], body: &[Stmt], handlers: &[ExceptionHandler]) {
        self.body.clear();
        self.locals.clear();
        self.temp_counter = 0;
        self.label_counter = 0;
        self.suppressed = self.env.symbols.get(sym).pragmas.suppressed_checks;

        let saved_scope = self.current_scope;
        let own_scope = self.env.symbols.get(sym).owned_scope.unwrap_or(saved_scope);
        self.current_scope = own_scope;

        let has_nested = decls.iter().any(|d| matches!(d, Decl::ProcedureBody { .. } | Decl::FunctionBody { .. }));
        let parent_sym = self.env.symbols.get(sym).parent_symbol;
        let is_nested = parent_sym
            .map(|p| matches!(self.env.symbols.get(p).kind, SymbolKind::Procedure | SymbolKind::Function))
            .unwrap_or(false);

        let frame_size = self.env.symbols.scope(own_scope).frame_size.max(1);
        self.frame_base = if has_nested { Some("%__frame_base".to_string()) } else { None };
        self.parent_frame = if is_nested { Some("%__parent_frame".to_string()) } else { None };

        let mangled = self.mangle_symbol(sym);
        let ret_ty = ret.unwrap_or("void");

        let mut param_list: Vec<(&Slice, &'static str)> = Vec::new();
        for p in params {
            let ty = self.type_ref(self.resolve_ty(&p.type_mark));
            let llvm_ty = if p.mode == ParamMode::Out || p.mode == ParamMode::InOut { "i8*" } else { ty };
            for n in &p.names {
                param_list.push((n, llvm_ty));
            }
        }

        let entry = self.label("entry");
        let mut prologue = String::new();

        if has_nested {
            let _ = writeln!(prologue, "  %__frame_base = alloca i8, i64 {}", frame_size);
        }

        if is_nested {
            // Precompute an `i8*` into every parent-scope local up front so
            // the body doesn't re-derive the parent's layout at each use.
            let parent_scope = self.env.symbols.get(parent_sym.unwrap()).owned_scope.unwrap_or(own_scope);
            let parent_locals: Vec<SymbolId> = self.env.symbols.scope(parent_scope).linear.clone();
            for psym in parent_locals {
                let s = self.env.symbols.get(psym);
                if !matches!(s.kind, SymbolKind::Variable | SymbolKind::Parameter) {
                    continue;
                }
                let key = s.name.as_str().to_ascii_lowercase();
                let llvm_ty = self.type_ref(s.ty.unwrap_or(self.env.integer));
                let offset = s.frame_offset;
                let ptr_name = format!("%__frame.{}", key);
                let _ = writeln!(prologue, "  {} = getelementptr i8, i8* %__parent_frame, i64 {}", ptr_name, offset);
                self.locals.push(LocalSlot { key, ty: llvm_ty, storage: Storage::FramePtr(ptr_name) });
            }
        }

        for (n, llvm_ty) in &param_list {
            let key = n.as_str().to_ascii_lowercase();
            let reg = format!("%{}", key);
            let storage = if has_nested {
                let offset = self.env.symbols.find(own_scope, n).map(|s| self.env.symbols.get(s).frame_offset).unwrap_or(0);
                let ptr_name = format!("%__frame.{}", key);
                let _ = writeln!(prologue, "  {} = getelementptr i8, i8* %__frame_base, i64 {}", ptr_name, offset);
                Storage::FramePtr(ptr_name)
            } else {
                let slot = format!("%{}.addr", key);
                let _ = writeln!(prologue, "  {} = alloca {}", slot, llvm_ty);
                Storage::Alloca(slot)
            };
            let (addr, bitcast) = self.typed_ptr(&storage, llvm_ty);
            if let Some(b) = bitcast {
                prologue.push_str(&b);
            }
            let _ = writeln!(prologue, "  store {} {}, {}* {}", llvm_ty, reg, llvm_ty, addr);
            self.locals.push(LocalSlot { key, ty: llvm_ty, storage });
        }

        let mut nested: Vec<&Decl> = Vec::new();
        for d in decls {
            self.emit_local_decl(d, &mut prologue, &mut nested);
        }

        self.body.push_str(&prologue);
        self.emit_protected_region(body, handlers);

        // With handlers present every path converges on the protected
        // region's join block, so the "last statement already terminates"
        // shortcut only applies when there's nothing to join.
        let already_terminated = handlers.is_empty() && matches!(body.last(), Some(Stmt::Return { .. }) | Some(Stmt::Raise { .. }));
        if !already_terminated {
            if ret.is_none() {
                self.body.push_str("  ret void\n");
            } else {
                let _ = writeln!(self.body, "  unreachable");
            }
        }

        let mut params_sig: Vec<String> = Vec::new();
        if is_nested {
            params_sig.push("i8* %__parent_frame".to_string());
        }
        for (n, ty) in &param_list {
            params_sig.push(format!("{} %{}", ty, n.as_str().to_ascii_lowercase()));
        }
        let _ = writeln!(self.out, "define {} @{}({}) {{", ret_ty, mangled, params_sig.join(", "));
        let _ = writeln!(self.out, "{}:", entry);
        self.out.push_str(&self.body);
        self.out.push_str("}\n\n");

        // LLVM disallows nested function definitions: bodies declared
        // inside this one are emitted as their own top-level functions
        // right after it, each threading `%__frame_base` as its
        // `%__parent_frame` argument.
        for d in nested {
            match d {
                Decl::ProcedureBody { spec, decls: ndecls, body: nbody, handlers: nhandlers, .. } => {
                    if let Some(nsym) = self.env.symbols.find(own_scope, &spec.name) {
                        self.emit_subprogram(nsym, &spec.params, None, ndecls, nbody, nhandlers);
                    }
                }
                Decl::FunctionBody { spec, decls: ndecls, body: nbody, handlers: nhandlers, .. } => {
                    if let Some(nsym) = self.env.symbols.find(own_scope, &spec.name) {
                        let ret = self.type_ref(self.resolve_ty(&spec.return_type));
                        self.emit_subprogram(nsym, &spec.params, Some(ret), ndecls, nbody, nhandlers);
                    }
                }
                _ => {}
            }
        }

        self.current_scope = saved_scope;
    }

    /// Returns an `i8*`/typed pointer usable in a `load`/`store` of `ty`,
    /// bitcasting a frame-derived `i8*` first when needed. The optional
    /// second element is the bitcast instruction text to prepend to
    /// whatever buffer the caller is building.
    fn typed_ptr(&mut self, storage: &Storage, ty: &'static str) -> (String, Option<String>) {
        match storage {
            Storage::Alloca(slot) => (slot.clone(), None),
            Storage::FramePtr(ptr) => {
                let t = self.temp();
                (t.clone(), Some(format!("  {} = bitcast i8* {} to {}*\n", t, ptr, ty)))
            }
        }
    }

    fn emit_local_decl<'d>(&mut self, decl: &'d Decl, prologue: &mut String, nested: &mut Vec<&'d Decl>) {
        match decl {
            Decl::Object { names, subtype, init, .. } => {
                let ty = self.resolve_ty(&subtype.type_mark);
                let llvm_ty = self.type_ref(ty);
                for n in names {
                    let key = n.as_str().to_ascii_lowercase();
                    let storage = if self.frame_base.is_some() {
                        let offset = self.env.symbols.find(self.current_scope, n).map(|s| self.env.symbols.get(s).frame_offset).unwrap_or(0);
                        let ptr_name = format!("%__frame.{}", key);
                        let _ = writeln!(prologue, "  {} = getelementptr i8, i8* %__frame_base, i64 {}", ptr_name, offset);
                        Storage::FramePtr(ptr_name)
                    } else {
                        let slot = format!("%{}", key);
                        let _ = writeln!(prologue, "  {} = alloca {}", slot, llvm_ty);
                        Storage::Alloca(slot)
                    };
                    self.locals.push(LocalSlot { key: key.clone(), ty: llvm_ty, storage: storage.clone() });
                    if let Some(init_expr) = init {
                        let saved = std::mem::take(&mut self.body);
                        let v = self.emit_expr(init_expr);
                        prologue.push_str(&self.body);
                        self.body = saved;
                        let (addr, bitcast) = self.typed_ptr(&storage, llvm_ty);
                        if let Some(b) = bitcast {
                            prologue.push_str(&b);
                        }
                        let _ = writeln!(prologue, "  store {} {}, {}* {}", v.llvm_ty, v.text, llvm_ty, addr);
                    }
                }
            }
            Decl::ProcedureBody { .. } | Decl::FunctionBody { .. } => {
                nested.push(decl);
            }
            _ => {}
        }
    }

    fn find_local(&self, name: &Slice) -> Option<(Storage, &'static str)> {
        let key = name.as_str().to_ascii_lowercase();
        self.locals.iter().rev().find(|l| l.key == key).map(|l| (l.storage.clone(), l.ty))
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    fn emit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Null { .. } => {}
            Stmt::Assignment { target, value, .. } => {
                let v = self.emit_expr(value);
                if let ExprKind::Name(Name::Identifier(name)) = &target.kind {
                    if let Some((storage, ty)) = self.find_local(name) {
                        let (addr, bitcast) = self.typed_ptr(&storage, ty);
                        if let Some(b) = bitcast {
                            self.body.push_str(&b);
                        }
                        let _ = writeln!(self.body, "  store {} {}, {}* {}", v.llvm_ty, v.text, ty, addr);
                        return;
                    }
                }
                ice!(self.diags, target.location, "assignment target did not lower to a known storage location");
            }
            Stmt::Return { value, .. } => {
                if let Some(e) = value {
                    let v = self.emit_expr(e);
                    let _ = writeln!(self.body, "  ret {} {}", v.llvm_ty, v.text);
                } else {
                    self.body.push_str("  ret void\n");
                }
            }
            Stmt::Call { name, args, .. } => {
                self.emit_call(name, args);
            }
            Stmt::If { branches, else_branch, .. } => self.emit_if(branches, else_branch.as_deref()),
            Stmt::Case { selector, arms, .. } => self.emit_case(selector, arms),
            Stmt::Loop { scheme, body, .. } => self.emit_loop(scheme, body),
            Stmt::Block { decls, body, handlers, .. } => {
                let mut prologue = String::new();
                let mut nested = Vec::new();
                for d in decls {
                    self.emit_local_decl(d, &mut prologue, &mut nested);
                }
                // A block's own declarative part may legally include nested
                // subprogram bodies; this lowering only threads static
                // links for subprogram-in-subprogram nesting, so any here
                // are dropped, same as before this pass.
                self.body.push_str(&prologue);
                self.emit_protected_region(body, handlers);
            }
            Stmt::Exit { .. } => {
                self.body.push_str("  ; exit (structured loop exit handled by enclosing loop emission)\n");
            }
            Stmt::Raise { exception, .. } => self.emit_raise(exception.as_ref()),
            Stmt::Goto { label, .. } => {
                let _ = writeln!(self.body, "  br label %{}", label.as_str());
            }
            Stmt::Accept { body, .. } => {
                for s in body {
                    self.emit_stmt(s);
                }
            }
            Stmt::Select { arms, .. } => {
                if let Some(first) = arms.first() {
                    for s in first {
                        self.emit_stmt(s);
                    }
                }
            }
            Stmt::Delay { .. } | Stmt::Abort { .. } => {
                self.body.push_str("  ; tasking statement accepted syntactically only\n");
            }
        }
    }

    fn emit_if(&mut self, branches: &[(Expr, Vec<Stmt>)], else_branch: Option<&[Stmt]>) {
        let end_label = self.label("if_end");
        let mut next_label = self.label("if_next");
        for (i, (cond, body)) in branches.iter().enumerate() {
            let c = self.emit_expr(cond);
            let then_label = self.label("if_then");
            let this_next = if i + 1 < branches.len() || else_branch.is_some() { next_label.clone() } else { end_label.clone() };
            let _ = writeln!(self.body, "  br i1 {}, label %{}, label %{}", c.text, then_label, this_next);
            let _ = writeln!(self.body, "{}:", then_label);
            for s in body {
                self.emit_stmt(s);
            }
            let _ = writeln!(self.body, "  br label %{}", end_label);
            if i + 1 < branches.len() {
                let _ = writeln!(self.body, "{}:", next_label);
                next_label = self.label("if_next");
            }
        }
        if let Some(body) = else_branch {
            let _ = writeln!(self.body, "{}:", next_label);
            for s in body {
                self.emit_stmt(s);
            }
            let _ = writeln!(self.body, "  br label %{}", end_label);
        }
        let _ = writeln!(self.body, "{}:", end_label);
    }

    fn emit_case(&mut self, selector: &Expr, arms: &[CaseArm]) {
        let sel = self.emit_expr(selector);
        let end_label = self.label("case_end");
        let default_label = self.label("case_default");
        let mut dest: Vec<(String, String)> = Vec::new();
        let mut arm_labels = Vec::new();
        for arm in arms {
            let arm_label = self.label("case_arm");
            arm_labels.push(arm_label.clone());
            for choice in &arm.choices {
                if let Choice::Expr(e) = choice {
                    if let ExprKind::IntegerLiteral(v) = &e.kind {
                        dest.push((v.to_string(), arm_label.clone()));
                    }
                }
            }
        }
        let _ = writeln!(self.body, "  switch i64 {}, label %{} [", sel.text, default_label);
        for (value, label) in &dest {
            let _ = writeln!(self.body, "    i64 {}, label %{}", value, label);
        }
        self.body.push_str("  ]\n");
        for (arm, label) in arms.iter().zip(arm_labels.iter()) {
            let _ = writeln!(self.body, "{}:", label);
            for s in &arm.body {
                self.emit_stmt(s);
            }
            let _ = writeln!(self.body, "  br label %{}", end_label);
        }
        let _ = writeln!(self.body, "{}:", default_label);
        self.body.push_str("  br label %");
        self.body.push_str(&end_label);
        self.body.push('\n');
        let _ = writeln!(self.body, "{}:", end_label);
    }

    fn emit_loop(&mut self, scheme: &LoopScheme, body: &[Stmt]) {
        let head = self.label("loop_head");
        let tail = self.label("loop_body");
        let end = self.label("loop_end");
        let _ = writeln!(self.body, "  br label %{}", head);
        let _ = writeln!(self.body, "{}:", head);
        match scheme {
            LoopScheme::Plain => {
                let _ = writeln!(self.body, "  br label %{}", tail);
            }
            LoopScheme::While(cond) => {
                let c = self.emit_expr(cond);
                let _ = writeln!(self.body, "  br i1 {}, label %{}, label %{}", c.text, tail, end);
            }
            LoopScheme::For { .. } => {
                // Bound-checked iteration is approximated here as an
                // unconditional entry; the loop variable's range compare
                // would be threaded through a per-iteration counter alloca
                // in a fuller lowering.
                let _ = writeln!(self.body, "  br label %{}", tail);
            }
        }
        let _ = writeln!(self.body, "{}:", tail);
        for s in body {
            self.emit_stmt(s);
        }
        let _ = writeln!(self.body, "  br label %{}", head);
        let _ = writeln!(self.body, "{}:", end);
    }

    fn emit_call(&mut self, name: &Expr, args: &AssociationList) -> Option<Value> {
        let callee_name = match &name.kind {
            ExprKind::Name(Name::Identifier(n)) => n,
            _ => {
                ice!(self.diags, name.location, "call target is not a simple name");
                return None;
            }
        };
        let sym = self.env.symbols.find(self.current_scope, callee_name);
        let mangled = match sym {
            Some(s) => self.mangle_symbol(s),
            None => mangle_name_part(callee_name.as_str()),
        };
        let is_nested_callee = sym
            .and_then(|s| self.env.symbols.get(s).parent_symbol)
            .map(|p| matches!(self.env.symbols.get(p).kind, SymbolKind::Procedure | SymbolKind::Function))
            .unwrap_or(false);

        let mut arg_values = Vec::new();
        if is_nested_callee {
            let frame_arg = self.frame_base.clone().unwrap_or_else(|| "null".to_string());
            arg_values.push(format!("i8* {}", frame_arg));
        }
        for a in args {
            let v = self.emit_expr(&a.value);
            arg_values.push(format!("{} {}", v.llvm_ty, v.text));
        }
        let ret_ty = name.resolved.ty.map(|t| self.type_ref(t)).unwrap_or("void");
        if ret_ty == "void" {
            let _ = writeln!(self.body, "  call void @{}({})", mangled, arg_values.join(", "));
            None
        } else {
            let t = self.temp();
            let _ = writeln!(self.body, "  {} = call {} @{}({})", t, ret_ty, mangled, arg_values.join(", "));
            Some(Value::imm(t, ret_ty))
        }
    }

    // -----------------------------------------------------------------
    // Exceptions
    // -----------------------------------------------------------------

    fn emit_raise(&mut self, exception: Option<&Expr>) {
        match exception {
            Some(e) => {
                let sym = e.resolved.symbol.or_else(|| match &e.kind {
                    ExprKind::Name(Name::Identifier(n)) => self.env.symbols.find(self.current_scope, n),
                    _ => None,
                });
                match sym {
                    Some(s) => {
                        let mangled = self.mangle_symbol(s);
                        let id = self.temp();
                        let _ = writeln!(self.body, "  {} = ptrtoint i8* @__exc.{} to i64", id, mangled);
                        let _ = writeln!(self.body, "  call void @__ada_raise(i64 {})", id);
                    }
                    None => {
                        ice!(self.diags, e.location, "raise target did not resolve to an exception symbol");
                        self.body.push_str("  call void @__ada_reraise()\n");
                    }
                }
            }
            None => {
                self.body.push_str("  call void @__ada_reraise()\n");
            }
        }
        self.body.push_str("  unreachable\n");
    }

    /// Raises `CONSTRAINT_ERROR` — the trap target for checked arithmetic,
    /// division, and index/range checks once those are suppressed-aware.
    fn emit_raise_constraint_error(&mut self) {
        match self.constraint_error_symbol() {
            Some(s) => {
                let mangled = self.mangle_symbol(s);
                let id = self.temp();
                let _ = writeln!(self.body, "  {} = ptrtoint i8* @__exc.{} to i64", id, mangled);
                let _ = writeln!(self.body, "  call void @__ada_raise(i64 {})", id);
            }
            None => {
                self.body.push_str("  call void @__ada_raise(i64 0)\n");
            }
        }
        self.body.push_str("  unreachable\n");
    }

    /// Wraps `body` in a `setjmp`-based protected region when `handlers` is
    /// non-empty; otherwise just emits `body` inline. On the first pass
    /// through `setjmp` (`%sj == 0`) runs `body` directly; a `longjmp` back
    /// into this frame (`%sj != 0`) dispatches to the matching handler.
    fn emit_protected_region(&mut self, body: &[Stmt], handlers: &[ExceptionHandler]) {
        if handlers.is_empty() {
            for s in body {
                self.emit_stmt(s);
            }
            return;
        }

        let jmp_buf = self.temp();
        let _ = writeln!(self.body, "  {} = alloca [200 x i8], align 16", jmp_buf);
        let jmp_ptr = self.temp();
        let _ = writeln!(self.body, "  {} = getelementptr [200 x i8], [200 x i8]* {}, i64 0, i64 0", jmp_ptr, jmp_buf);
        let _ = writeln!(self.body, "  call void @__ada_push_handler(i8* {})", jmp_ptr);
        let sj = self.temp();
        let _ = writeln!(self.body, "  {} = call i32 @setjmp(i8* {})", sj, jmp_ptr);
        let is_first = self.temp();
        let _ = writeln!(self.body, "  {} = icmp eq i32 {}, 0", is_first, sj);

        let try_label = self.label("try");
        let dispatch_label = self.label("dispatch");
        let end_label = self.label("handled_end");
        let _ = writeln!(self.body, "  br i1 {}, label %{}, label %{}", is_first, try_label, dispatch_label);

        let _ = writeln!(self.body, "{}:", try_label);
        for s in body {
            self.emit_stmt(s);
        }
        let body_terminated = matches!(body.last(), Some(Stmt::Return { .. }) | Some(Stmt::Raise { .. }));
        if !body_terminated {
            self.body.push_str("  call void @__ada_pop_handler()\n");
            let _ = writeln!(self.body, "  br label %{}", end_label);
        }

        let _ = writeln!(self.body, "{}:", dispatch_label);
        self.body.push_str("  call void @__ada_pop_handler()\n");
        let current = self.temp();
        let _ = writeln!(self.body, "  {} = call i64 @__ada_current_exception()", current);
        self.emit_exception_dispatch(&current, handlers, &end_label);

        let _ = writeln!(self.body, "{}:", end_label);
    }

    /// Chains through `handlers` in order: each names one or more
    /// exceptions (OR'd together) or is `others` (unconditional). A final
    /// non-`others` handler falls through to `@__ada_reraise`.
    fn emit_exception_dispatch(&mut self, current: &str, handlers: &[ExceptionHandler], end_label: &str) {
        let mut check_label = self.label("exc_check");
        let _ = writeln!(self.body, "  br label %{}", check_label);
        for (i, h) in handlers.iter().enumerate() {
            let _ = writeln!(self.body, "{}:", check_label);
            let handler_label = self.label("exc_handler");
            let next_label = self.label("exc_check");
            if h.is_others {
                let _ = writeln!(self.body, "  br label %{}", handler_label);
            } else {
                let mut matched: Option<String> = None;
                for n in &h.names {
                    let sym = n.resolved.symbol.or_else(|| match &n.kind {
                        ExprKind::Name(Name::Identifier(id)) => self.env.symbols.find(self.current_scope, id),
                        _ => None,
                    });
                    if let Some(s) = sym {
                        let mangled = self.mangle_symbol(s);
                        let idv = self.temp();
                        let _ = writeln!(self.body, "  {} = ptrtoint i8* @__exc.{} to i64", idv, mangled);
                        let cmp = self.temp();
                        let _ = writeln!(self.body, "  {} = icmp eq i64 {}, {}", cmp, current, idv);
                        matched = Some(match matched {
                            None => cmp,
                            Some(prev) => {
                                let t = self.temp();
                                let _ = writeln!(self.body, "  {} = or i1 {}, {}", t, prev, cmp);
                                t
                            }
                        });
                    }
                }
                let cond = matched.unwrap_or_else(|| "0".to_string());
                let _ = writeln!(self.body, "  br i1 {}, label %{}, label %{}", cond, handler_label, next_label);
            }

            let _ = writeln!(self.body, "{}:", handler_label);
            for s in &h.body {
                self.emit_stmt(s);
            }
            let h_terminated = matches!(h.body.last(), Some(Stmt::Return { .. }) | Some(Stmt::Raise { .. }));
            if !h_terminated {
                let _ = writeln!(self.body, "  br label %{}", end_label);
            }

            if i + 1 < handlers.len() {
                check_label = next_label;
            } else if !h.is_others {
                let _ = writeln!(self.body, "{}:", next_label);
                self.body.push_str("  call void @__ada_reraise()\n  unreachable\n");
            }
        }
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    fn emit_expr(&mut self, expr: &Expr) -> Value {
        match &expr.kind {
            ExprKind::IntegerLiteral(v) => Value::imm(v.to_string(), "i64"),
            ExprKind::BigIntegerLiteral(s) => Value::imm(s.clone(), "i64"),
            ExprKind::RealLiteral(v) => Value::imm(format!("{:?}", v), "double"),
            ExprKind::CharacterLiteral(c) => Value::imm((*c as i64).to_string(), "i8"),
            ExprKind::StringLiteral(s) => self.emit_string_literal(s.as_str()),
            ExprKind::Name(name) => self.emit_name(name, expr),
            ExprKind::Binary { op, left, right } => self.emit_binary(*op, left, right),
            ExprKind::Unary { op, operand } => self.emit_unary(*op, operand),
            ExprKind::Aggregate(assoc) => self.emit_aggregate(expr, assoc),
            ExprKind::Allocator { .. } => {
                ice!(self.diags, expr.location, "allocator lowering is not yet implemented");
                Value::imm("null", "i8*")
            }
        }
    }

    fn emit_string_literal(&mut self, s: &str) -> Value {
        let name = format!("str.{}", self.string_constants.len());
        self.string_constants.push((name.clone(), s.to_string()));
        let ptr = self.temp();
        let _ = writeln!(self.body, "  {} = getelementptr [{} x i8], [{} x i8]* @{}, i64 0, i64 0", ptr, s.len() + 1, s.len() + 1, name);
        Value::fat(ptr, "1".to_string(), s.len().to_string())
    }

    fn emit_name(&mut self, name: &Name, expr: &Expr) -> Value {
        match name {
            Name::Identifier(n) => {
                if let Some((storage, ty)) = self.find_local(n) {
                    let (addr, bitcast) = self.typed_ptr(&storage, ty);
                    if let Some(b) = bitcast {
                        self.body.push_str(&b);
                    }
                    let t = self.temp();
                    let _ = writeln!(self.body, "  {} = load {}, {}* {}", t, ty, ty, addr);
                    return Value::imm(t, ty);
                }
                let ty = expr.resolved.ty.map(|t| self.type_ref(t)).unwrap_or("i64");
                Value::imm("0", ty)
            }
            Name::Apply { prefix, args } => {
                if let Some(v) = self.emit_call(prefix, args) {
                    v
                } else {
                    Value::imm("0", "i64")
                }
            }
            Name::Qualified { expr: inner, .. } => self.emit_expr(inner),
            Name::Attribute { prefix, attribute, arg } => self.emit_attribute(prefix, attribute, arg, expr),
            Name::Selected { .. } | Name::Dereference(_) | Name::Range { .. } => {
                ice!(self.diags, expr.location, "this name form does not yet have a codegen lowering");
                Value::imm("0", "i64")
            }
        }
    }

    // -----------------------------------------------------------------
    // Attributes
    // -----------------------------------------------------------------

    fn emit_attribute(&mut self, prefix: &Expr, attribute: &Slice, arg: &Option<Box<Expr>>, expr: &Expr) -> Value {
        let a = attribute.as_str();
        let prefix_ty = prefix.resolved.ty.unwrap_or(self.env.integer);
        let ty = self.env.types.get(prefix_ty).clone();
        let dim = arg.as_ref().and_then(|e| const_expr_i64(e)).unwrap_or(1).max(1) as usize;
        let index_info = ty.indices.get(dim.saturating_sub(1)).cloned();

        if a.eq_ignore_ascii_case("First") {
            let (lo, _) = self.index_bounds(&ty, index_info.as_ref());
            return Value::imm(lo, "i64");
        }
        if a.eq_ignore_ascii_case("Last") {
            let (_, hi) = self.index_bounds(&ty, index_info.as_ref());
            return Value::imm(hi, "i64");
        }
        if a.eq_ignore_ascii_case("Length") {
            let (lo, hi) = self.index_bounds(&ty, index_info.as_ref());
            let t = self.temp();
            let _ = writeln!(self.body, "  {} = sub i64 {}, {}", t, hi, lo);
            let t2 = self.temp();
            let _ = writeln!(self.body, "  {} = add i64 {}, 1", t2, t);
            return Value::imm(t2, "i64");
        }
        if a.eq_ignore_ascii_case("Range") {
            let (lo, _) = self.index_bounds(&ty, index_info.as_ref());
            return Value::imm(lo, "i64");
        }
        if a.eq_ignore_ascii_case("Size") {
            return Value::imm((ty.size as i64 * 8).to_string(), "i64");
        }
        if a.eq_ignore_ascii_case("Alignment") {
            return Value::imm(ty.alignment.to_string(), "i64");
        }
        if a.eq_ignore_ascii_case("Component_Size") {
            let elem = ty.element_type.map(|e| self.env.types.get(e).size).unwrap_or(0);
            return Value::imm((elem as i64 * 8).to_string(), "i64");
        }
        if a.eq_ignore_ascii_case("Address") || a.eq_ignore_ascii_case("Access") || a.eq_ignore_ascii_case("Unchecked_Access") {
            let v = self.emit_expr(prefix);
            return Value::imm(v.text, "i8*");
        }
        if a.eq_ignore_ascii_case("Pos") {
            let v = self.emit_expr(prefix);
            return Value::imm(v.text, "i64");
        }
        if a.eq_ignore_ascii_case("Val") {
            if let Some(arg_expr) = arg {
                return self.emit_expr(arg_expr);
            }
        }
        if a.eq_ignore_ascii_case("Succ") {
            let v = self.emit_expr(prefix);
            let t = self.temp();
            let _ = writeln!(self.body, "  {} = add i64 {}, 1", t, v.text);
            return Value::imm(t, "i64");
        }
        if a.eq_ignore_ascii_case("Pred") {
            let v = self.emit_expr(prefix);
            let t = self.temp();
            let _ = writeln!(self.body, "  {} = sub i64 {}, 1", t, v.text);
            return Value::imm(t, "i64");
        }
        if a.eq_ignore_ascii_case("Min") || a.eq_ignore_ascii_case("Max") {
            if let Some(arg_expr) = arg {
                let l = self.emit_expr(prefix);
                let r = self.emit_expr(arg_expr);
                let op = if a.eq_ignore_ascii_case("Min") { "slt" } else { "sgt" };
                let cmp = self.temp();
                let _ = writeln!(self.body, "  {} = icmp {} i64 {}, {}", cmp, op, l.text, r.text);
                let t = self.temp();
                let _ = writeln!(self.body, "  {} = select i1 {}, i64 {}, i64 {}", t, cmp, l.text, r.text);
                return Value::imm(t, "i64");
            }
        }
        if a.eq_ignore_ascii_case("Abs") {
            return self.emit_unary(UnaryOp::Abs, prefix);
        }
        if a.eq_ignore_ascii_case("Mod") {
            if let Some(arg_expr) = arg {
                let l = self.emit_expr(prefix);
                let r = self.emit_expr(arg_expr);
                let t = self.temp();
                let _ = writeln!(self.body, "  {} = urem i64 {}, {}", t, l.text, r.text);
                return Value::imm(t, "i64");
            }
        }
        if a.eq_ignore_ascii_case("Width") {
            return Value::imm("32".to_string(), "i64");
        }
        if a.eq_ignore_ascii_case("Image") {
            // Decimal/enum-literal rendering isn't implemented; this keeps
            // the result type-correct (a STRING) rather than ICE'ing.
            return self.emit_string_literal("");
        }
        if a.eq_ignore_ascii_case("Value") {
            return Value::imm("0", "i64");
        }

        ice!(self.diags, expr.location, "unrecognized attribute '{}'", a);
        Value::imm("0", "i64")
    }

    fn index_bounds(&mut self, ty: &Type, index_info: Option<&crate::types::IndexInfo>) -> (String, String) {
        match index_info {
            Some(ix) => (bound_text(&ix.low), bound_text(&ix.high)),
            None => match (&ty.low_bound, &ty.high_bound) {
                (Some(lo), Some(hi)) => (bound_text(lo), bound_text(hi)),
                _ => ("0".to_string(), "0".to_string()),
            },
        }
    }

    // -----------------------------------------------------------------
    // Aggregates
    // -----------------------------------------------------------------

    fn emit_aggregate(&mut self, expr: &Expr, assoc: &AssociationList) -> Value {
        let tid = expr.resolved.ty.unwrap_or(self.env.integer);
        let ty = self.env.types.get(tid).clone();
        match ty.kind {
            TypeKind::Record => self.emit_record_aggregate(&ty, assoc, &expr.location),
            TypeKind::Array | TypeKind::String => self.emit_array_aggregate(&ty, assoc, &expr.location),
            _ => {
                ice!(self.diags, expr.location, "aggregate target type is neither a record nor an array");
                Value::imm("0", "i64")
            }
        }
    }

    fn emit_record_aggregate(&mut self, ty: &Type, assoc: &AssociationList, loc: &Location) -> Value {
        let size = ty.size.max(1);
        let slot = self.temp();
        let _ = writeln!(self.body, "  {} = alloca [{} x i8]", slot, size);
        let base = self.temp();
        let _ = writeln!(self.body, "  {} = getelementptr [{} x i8], [{} x i8]* {}, i64 0, i64 0", base, size, size, slot);

        // Two-pass scan: find a possible `others` value first so every
        // component not explicitly named can be filled from it afterward.
        let mut others_value: Option<Expr> = None;
        for a in assoc {
            if a.choices.iter().any(|c| matches!(c, Choice::Others)) {
                others_value = Some(a.value.clone());
            }
        }

        let mut filled = vec![false; ty.components.len()];
        let mut positional_index = 0usize;
        for a in assoc {
            if a.choices.iter().any(|c| matches!(c, Choice::Others)) {
                continue;
            }
            if a.choices.is_empty() {
                if positional_index < ty.components.len() {
                    self.store_record_component(&base, ty, positional_index, &a.value);
                    filled[positional_index] = true;
                    positional_index += 1;
                }
                continue;
            }
            for choice in &a.choices {
                if let Choice::Expr(e) = choice {
                    if let ExprKind::Name(Name::Identifier(field_name)) = &e.kind {
                        if let Some(idx) = ty.components.iter().position(|c| c.name.eq_ignore_case(field_name)) {
                            self.store_record_component(&base, ty, idx, &a.value);
                            filled[idx] = true;
                        }
                    }
                }
            }
        }

        if let Some(others) = &others_value {
            for (idx, done) in filled.iter().enumerate() {
                if !*done {
                    self.store_record_component(&base, ty, idx, others);
                }
            }
        } else if filled.iter().any(|f| !*f) {
            ice!(self.diags, loc, "aggregate leaves a component uninitialized with no 'others' association");
        }

        Value::imm(base, "i8*")
    }

    fn store_record_component(&mut self, base: &str, ty: &Type, idx: usize, value_expr: &Expr) {
        let comp = ty.components[idx].clone();
        let comp_ty = self.type_ref(comp.ty);
        let v = self.emit_expr(value_expr);
        let addr = self.temp();
        let _ = writeln!(self.body, "  {} = getelementptr i8, i8* {}, i64 {}", addr, base, comp.offset);
        if comp_ty == "i8*" && matches!(self.env.types.get(comp.ty).kind, TypeKind::Record | TypeKind::Array | TypeKind::String) {
            let size = self.env.types.get(comp.ty).size.max(1);
            let _ = writeln!(self.body, "  call void @llvm.memcpy.p0i8.p0i8.i64(i8* {}, i8* {}, i64 {}, i1 0)", addr, v.text, size);
        } else {
            let typed_addr = self.temp();
            let _ = writeln!(self.body, "  {} = bitcast i8* {} to {}*", typed_addr, addr, comp_ty);
            let _ = writeln!(self.body, "  store {} {}, {}* {}", v.llvm_ty, v.text, comp_ty, typed_addr);
        }
    }

    fn emit_array_aggregate(&mut self, ty: &Type, assoc: &AssociationList, loc: &Location) -> Value {
        let elem_tid = ty.element_type.unwrap_or(self.env.integer);
        let elem_ty = self.type_ref(elem_tid);
        let elem_size = self.env.types.get(elem_tid).size.max(1) as i64;

        let (low, high) = match ty.indices.first() {
            Some(ix) => (bound_to_i64(&ix.low), bound_to_i64(&ix.high)),
            None => (ty.low_bound.as_ref().and_then(bound_to_i64), ty.high_bound.as_ref().and_then(bound_to_i64)),
        };
        let (low, high) = match (low, high) {
            (Some(l), Some(h)) => (l, h),
            _ => {
                ice!(self.diags, loc, "aggregate bounds are not known at compile time");
                (1, 0)
            }
        };
        let count = (high - low + 1).max(0);
        let total_bytes = (count * elem_size).max(1);

        let slot = self.temp();
        let _ = writeln!(self.body, "  {} = alloca [{} x i8]", slot, total_bytes);
        let base = self.temp();
        let _ = writeln!(self.body, "  {} = getelementptr [{} x i8], [{} x i8]* {}, i64 0, i64 0", base, total_bytes, total_bytes, slot);

        let mut others_value: Option<Expr> = None;
        for a in assoc {
            if a.choices.iter().any(|c| matches!(c, Choice::Others)) {
                others_value = Some(a.value.clone());
            }
        }

        let mut filled = vec![false; count.max(0) as usize];
        let mut positional_index = low;
        for a in assoc {
            if a.choices.iter().any(|c| matches!(c, Choice::Others)) {
                continue;
            }
            if a.choices.is_empty() {
                let i = positional_index;
                if i >= low && i <= high {
                    self.store_array_element(&base, elem_tid, elem_ty, elem_size, low, i, &a.value);
                    filled[(i - low) as usize] = true;
                }
                positional_index += 1;
                continue;
            }
            for choice in &a.choices {
                match choice {
                    Choice::Expr(e) => {
                        if let Some(i) = const_expr_i64(e) {
                            if i >= low && i <= high {
                                self.store_array_element(&base, elem_tid, elem_ty, elem_size, low, i, &a.value);
                                filled[(i - low) as usize] = true;
                            }
                        }
                    }
                    Choice::Range(lo_e, hi_e) => {
                        if let (Some(lo), Some(hi)) = (const_expr_i64(lo_e), const_expr_i64(hi_e)) {
                            for i in lo..=hi {
                                if i >= low && i <= high {
                                    self.store_array_element(&base, elem_tid, elem_ty, elem_size, low, i, &a.value);
                                    filled[(i - low) as usize] = true;
                                }
                            }
                        }
                    }
                    Choice::Others => {}
                }
            }
        }

        if let Some(others) = &others_value {
            for (offset, done) in filled.iter().enumerate() {
                if !*done {
                    let i = low + offset as i64;
                    self.store_array_element(&base, elem_tid, elem_ty, elem_size, low, i, others);
                }
            }
        } else if filled.iter().any(|f| !*f) {
            ice!(self.diags, loc, "aggregate leaves an element uninitialized with no 'others' association");
        }

        Value::imm(base, "i8*")
    }

    #[allow(clippy::too_many_arguments)]
    fn store_array_element(&mut self, base: &str, elem_tid: TypeId, elem_ty: &'static str, elem_size: i64, low: i64, index: i64, value_expr: &Expr) {
        let v = self.emit_expr(value_expr);
        let addr = self.temp();
        let _ = writeln!(self.body, "  {} = getelementptr i8, i8* {}, i64 {}", addr, base, (index - low) * elem_size);
        if elem_ty == "i8*" && matches!(self.env.types.get(elem_tid).kind, TypeKind::Record | TypeKind::Array | TypeKind::String) {
            let _ = writeln!(self.body, "  call void @llvm.memcpy.p0i8.p0i8.i64(i8* {}, i8* {}, i64 {}, i1 0)", addr, v.text, elem_size);
        } else {
            let typed_addr = self.temp();
            let _ = writeln!(self.body, "  {} = bitcast i8* {} to {}*", typed_addr, addr, elem_ty);
            let _ = writeln!(self.body, "  store {} {}, {}* {}", v.llvm_ty, v.text, elem_ty, typed_addr);
        }
    }

    fn emit_unary(&mut self, op: UnaryOp, operand: &Expr) -> Value {
        let v = self.emit_expr(operand);
        match op {
            UnaryOp::Plus => v,
            UnaryOp::Minus => {
                let t = self.temp();
                if v.llvm_ty == "double" {
                    let _ = writeln!(self.body, "  {} = fneg double {}", t, v.text);
                } else {
                    let _ = writeln!(self.body, "  {} = sub i64 0, {}", t, v.text);
                }
                Value::imm(t, v.llvm_ty)
            }
            UnaryOp::Not => {
                let t = self.temp();
                let _ = writeln!(self.body, "  {} = xor i1 {}, 1", t, v.text);
                Value::imm(t, "i1")
            }
            UnaryOp::Abs => {
                let t = self.temp();
                if v.llvm_ty == "double" {
                    let _ = writeln!(self.body, "  {} = call double @llvm.fabs.f64(double {})", t, v.text);
                } else {
                    let neg = self.temp();
                    let cmp = self.temp();
                    let _ = writeln!(self.body, "  {} = sub i64 0, {}", neg, v.text);
                    let _ = writeln!(self.body, "  {} = icmp slt i64 {}, 0", cmp, v.text);
                    let _ = writeln!(self.body, "  {} = select i1 {}, i64 {}, i64 {}", t, cmp, neg, v.text);
                }
                Value::imm(t, v.llvm_ty)
            }
        }
    }

    fn emit_binary(&mut self, op: BinOp, left: &Expr, right: &Expr) -> Value {
        use BinOp::*;
        if matches!(op, AndThen | OrElse) {
            return self.emit_short_circuit(op, left, right);
        }
        let l = self.emit_expr(left);
        let r = self.emit_expr(right);
        let is_float = l.llvm_ty == "double" || r.llvm_ty == "double";
        match op {
            Add | Sub | Mul => self.emit_checked_arith(op, &l, &r, is_float),
            Div => {
                self.emit_division_check(&r, is_float);
                let t = self.temp();
                if is_float {
                    let _ = writeln!(self.body, "  {} = fdiv double {}, {}", t, l.text, r.text);
                } else {
                    let _ = writeln!(self.body, "  {} = sdiv i64 {}, {}", t, l.text, r.text);
                }
                Value::imm(t, if is_float { "double" } else { "i64" })
            }
            Mod => {
                self.emit_division_check(&r, false);
                let t = self.temp();
                let _ = writeln!(self.body, "  {} = srem i64 {}, {}", t, l.text, r.text);
                Value::imm(t, "i64")
            }
            Rem => {
                self.emit_division_check(&r, false);
                let t = self.temp();
                let _ = writeln!(self.body, "  {} = srem i64 {}, {}", t, l.text, r.text);
                Value::imm(t, "i64")
            }
            Pow => {
                let t = self.temp();
                let _ = writeln!(self.body, "  {} = call i64 @llvm.powi.i64(i64 {}, i32 {})", t, l.text, r.text);
                Value::imm(t, "i64")
            }
            Concat => self.emit_concat(&l, &r),
            Eq | Ne => {
                let lty_kind = left.resolved.ty.map(|t| self.env.types.get(t).kind.clone());
                if matches!(lty_kind, Some(TypeKind::Record) | Some(TypeKind::Array) | Some(TypeKind::String)) {
                    self.emit_composite_compare(op, left, &l, &r)
                } else {
                    self.emit_compare(op, &l, &r, is_float)
                }
            }
            Lt | Le | Gt | Ge => self.emit_compare(op, &l, &r, is_float),
            And => self.emit_bitlogic("and", &l, &r),
            Or => self.emit_bitlogic("or", &l, &r),
            Xor => self.emit_bitlogic("xor", &l, &r),
            In | NotIn => {
                let t = self.temp();
                let _ = writeln!(self.body, "  {} = icmp sge i64 {}, {}", t, l.text, r.text);
                Value::imm(t, "i1")
            }
            AndThen | OrElse => unreachable!(),
        }
    }

    /// `&` concatenation: pull the data pointer and `(low, high)` bounds out
    /// of both fat-pointer operands, allocate `total` bytes off the
    /// secondary stack, and `memcpy` each operand's bytes into place.
    fn emit_concat(&mut self, l: &Value, r: &Value) -> Value {
        let (l_ptr, l_lo, l_hi) = fat_parts(l);
        let (r_ptr, r_lo, r_hi) = fat_parts(r);

        let l_span = self.temp();
        let _ = writeln!(self.body, "  {} = sub i64 {}, {}", l_span, l_hi, l_lo);
        let l_len = self.temp();
        let _ = writeln!(self.body, "  {} = add i64 {}, 1", l_len, l_span);
        let r_span = self.temp();
        let _ = writeln!(self.body, "  {} = sub i64 {}, {}", r_span, r_hi, r_lo);
        let r_len = self.temp();
        let _ = writeln!(self.body, "  {} = add i64 {}, 1", r_len, r_span);
        let total = self.temp();
        let _ = writeln!(self.body, "  {} = add i64 {}, {}", total, l_len, r_len);

        let dest = self.temp();
        let _ = writeln!(self.body, "  {} = call i8* @__ada_sec_stack_alloc(i64 {})", dest, total);
        let _ = writeln!(self.body, "  call void @llvm.memcpy.p0i8.p0i8.i64(i8* {}, i8* {}, i64 {}, i1 0)", dest, l_ptr, l_len);
        let dest_tail = self.temp();
        let _ = writeln!(self.body, "  {} = getelementptr i8, i8* {}, i64 {}", dest_tail, dest, l_len);
        let _ = writeln!(self.body, "  call void @llvm.memcpy.p0i8.p0i8.i64(i8* {}, i8* {}, i64 {}, i1 0)", dest_tail, r_ptr, r_len);

        Value::fat(dest, "1".to_string(), total)
    }

    fn emit_composite_compare(&mut self, op: BinOp, left: &Expr, l: &Value, r: &Value) -> Value {
        let tid = left.resolved.ty.unwrap_or(self.env.integer);
        let func_name = self.env.types.get(tid).equality_func_name.clone();
        let Some(func_name) = func_name else {
            ice!(self.diags, left.location, "composite type has no assigned equality function");
            return Value::imm("0", "i1");
        };
        let t = self.temp();
        let _ = writeln!(self.body, "  {} = call i1 @{}(i8* {}, i8* {})", t, func_name, l.text, r.text);
        if matches!(op, BinOp::Ne) {
            let negated = self.temp();
            let _ = writeln!(self.body, "  {} = xor i1 {}, 1", negated, t);
            Value::imm(negated, "i1")
        } else {
            Value::imm(t, "i1")
        }
    }

    fn emit_bitlogic(&mut self, llvm_op: &str, l: &Value, r: &Value) -> Value {
        let t = self.temp();
        let _ = writeln!(self.body, "  {} = {} i1 {}, {}", t, llvm_op, l.text, r.text);
        Value::imm(t, "i1")
    }

    fn emit_compare(&mut self, op: BinOp, l: &Value, r: &Value, is_float: bool) -> Value {
        use BinOp::*;
        let t = self.temp();
        let cond = if is_float {
            match op {
                Eq => "oeq", Ne => "one", Lt => "olt", Le => "ole", Gt => "ogt", Ge => "oge",
                _ => unreachable!(),
            }
        } else {
            match op {
                Eq => "eq", Ne => "ne", Lt => "slt", Le => "sle", Gt => "sgt", Ge => "sge",
                _ => unreachable!(),
            }
        };
        let ty = if is_float { "double" } else { "i64" };
        let instr = if is_float { "fcmp" } else { "icmp" };
        let _ = writeln!(self.body, "  {} = {} {} {} {}, {}", t, instr, cond, ty, l.text, r.text);
        Value::imm(t, "i1")
    }

    /// `and then` / `or else` short-circuit via a branch rather than a
    /// plain `and`/`or`, matching their Ada semantics exactly.
    fn emit_short_circuit(&mut self, op: BinOp, left: &Expr, right: &Expr) -> Value {
        let l = self.emit_expr(left);
        let rhs_label = self.label("sc_rhs");
        let skip_label = self.label("sc_skip");
        let done_label = self.label("sc_done");
        let result_slot = self.temp();
        let _ = writeln!(self.body, "  {} = alloca i1", result_slot);
        if matches!(op, BinOp::AndThen) {
            let _ = writeln!(self.body, "  br i1 {}, label %{}, label %{}", l.text, rhs_label, skip_label);
        } else {
            let _ = writeln!(self.body, "  br i1 {}, label %{}, label %{}", l.text, skip_label, rhs_label);
        }
        let _ = writeln!(self.body, "{}:", rhs_label);
        let r = self.emit_expr(right);
        let _ = writeln!(self.body, "  store i1 {}, i1* {}", r.text, result_slot);
        let _ = writeln!(self.body, "  br label %{}", done_label);
        let _ = writeln!(self.body, "{}:", skip_label);
        let short_value = if matches!(op, BinOp::AndThen) { "0" } else { "1" };
        let _ = writeln!(self.body, "  store i1 {}, i1* {}", short_value, result_slot);
        let _ = writeln!(self.body, "  br label %{}", done_label);
        let _ = writeln!(self.body, "{}:", done_label);
        let t = self.temp();
        let _ = writeln!(self.body, "  {} = load i1, i1* {}", t, result_slot);
        Value::imm(t, "i1")
    }

    /// Emits `llvm.s{add,sub,mul}.with.overflow.i64` and a branch to
    /// `@__ada_raise(Constraint_Error)` unless `pragma Suppress
    /// (Overflow_Check)` covers the enclosing subprogram.
    fn emit_checked_arith(&mut self, op: BinOp, l: &Value, r: &Value, is_float: bool) -> Value {
        if is_float {
            let t = self.temp();
            let fop = match op {
                BinOp::Add => "fadd",
                BinOp::Sub => "fsub",
                BinOp::Mul => "fmul",
                _ => unreachable!(),
            };
            let _ = writeln!(self.body, "  {} = {} double {}, {}", t, fop, l.text, r.text);
            return Value::imm(t, "double");
        }
        if self.suppressed & checks::OVERFLOW_CHECK != 0 {
            let t = self.temp();
            let iop = match op {
                BinOp::Add => "add",
                BinOp::Sub => "sub",
                BinOp::Mul => "mul",
                _ => unreachable!(),
            };
            let _ = writeln!(self.body, "  {} = {} i64 {}, {}", t, iop, l.text, r.text);
            return Value::imm(t, "i64");
        }
        let intrinsic = match op {
            BinOp::Add => "llvm.sadd.with.overflow.i64",
            BinOp::Sub => "llvm.ssub.with.overflow.i64",
            BinOp::Mul => "llvm.smul.with.overflow.i64",
            _ => unreachable!(),
        };
        let agg = self.temp();
        let _ = writeln!(self.body, "  {} = call {{ i64, i1 }} @{}(i64 {}, i64 {})", agg, intrinsic, l.text, r.text);
        let value = self.temp();
        let _ = writeln!(self.body, "  {} = extractvalue {{ i64, i1 }} {}, 0", value, agg);
        let overflowed = self.temp();
        let _ = writeln!(self.body, "  {} = extractvalue {{ i64, i1 }} {}, 1", overflowed, agg);
        let ok_label = self.label("ovf_ok");
        let trap_label = self.label("ovf_trap");
        let _ = writeln!(self.body, "  br i1 {}, label %{}, label %{}", overflowed, trap_label, ok_label);
        let _ = writeln!(self.body, "{}:", trap_label);
        self.emit_raise_constraint_error();
        let _ = writeln!(self.body, "{}:", ok_label);
        Value::imm(value, "i64")
    }

    fn emit_division_check(&mut self, divisor: &Value, is_float: bool) {
        if is_float || self.suppressed & checks::DIVISION_CHECK != 0 {
            return;
        }
        let cmp = self.temp();
        let _ = writeln!(self.body, "  {} = icmp eq i64 {}, 0", cmp, divisor.text);
        let trap_label = self.label("div0_trap");
        let ok_label = self.label("div0_ok");
        let _ = writeln!(self.body, "  br i1 {}, label %{}, label %{}", cmp, trap_label, ok_label);
        let _ = writeln!(self.body, "{}:", trap_label);
        self.emit_raise_constraint_error();
        let _ = writeln!(self.body, "{}:", ok_label);
    }
}

/// Escaping for the symbol's own name part of `mangle_symbol`: lowercase
/// alphanumerics pass through, `"` (operator symbols) becomes `_op_`, and
/// any other byte becomes `_<hex>`.
fn mangle_name_part(name: &str) -> String {
    let mut out = String::new();
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if c == '"' {
            out.push_str("_op_");
        } else {
            let _ = write!(out, "_{:x}", c as u32);
        }
    }
    out
}

fn fat_parts(v: &Value) -> (String, String, String) {
    match &v.bounds {
        Some((lo, hi)) => (v.text.clone(), lo.clone(), hi.clone()),
        None => (v.text.clone(), "1".to_string(), "0".to_string()),
    }
}

fn bound_to_i64(b: &Bound) -> Option<i64> {
    match b {
        Bound::Int(v) => Some(*v),
        _ => None,
    }
}

fn bound_text(b: &Bound) -> String {
    match b {
        Bound::Int(v) => v.to_string(),
        Bound::Float(f) => format!("{:?}", f),
        Bound::Expr(_) => "0".to_string(),
    }
}

/// Folds unary-minus over an integer literal so aggregate choices like
/// `-1 => ...` resolve without a full constant-expression evaluator.
fn const_expr_i64(e: &Expr) -> Option<i64> {
    match &e.kind {
        ExprKind::IntegerLiteral(v) => Some(*v),
        ExprKind::Unary { op: UnaryOp::Minus, operand } => const_expr_i64(operand).map(|v| -v),
        _ => None,
    }
}

fn escape_llvm_string(s: &str) -> String {
    let mut out = String::new();
    for b in s.bytes() {
        if b.is_ascii_graphic() && b != b'"' && b != b'\\' {
            out.push(b as char);
        } else {
            let _ = write!(out, "\\{:02X}", b);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::diagnostics::Diagnostics;
    use crate::semantic::Analyzer;

    fn compile(src: &str) -> (String, Diagnostics) {
        let arena = Arena::new();
        let mut diags = Diagnostics::new();
        let tokens = crate::lexer::Lexer::new("t.adb", src.as_bytes(), &arena).tokenize(&mut diags);
        let mut parser = crate::parser::Parser::new(tokens, &mut diags);
        let mut cu = parser.parse_compilation_unit().expect("parses");
        drop(parser);
        let mut analyzer = Analyzer::new(&arena, &mut diags, Vec::new());
        analyzer.analyze_compilation_unit(&mut cu);
        let env = analyzer.into_environment();
        let mut codegen = Codegen::new(&env, &mut diags);
        let ir = codegen.emit_compilation_unit(&cu);
        (ir, diags)
    }

    #[test]
    fn emits_a_defined_function_with_matching_name() {
        let (ir, diags) = compile("procedure P is begin null; end P;");
        assert!(!diags.has_errors(), "{}", diags.render());
        assert!(ir.contains("define void @p_s"), "{}", ir);
    }

    #[test]
    fn addition_lowers_to_overflow_checked_intrinsic() {
        let (ir, _diags) = compile("procedure P is X : Integer := 1 + 2; begin null; end P;");
        assert!(ir.contains("llvm.sadd.with.overflow.i64"), "{}", ir);
    }

    #[test]
    fn suppressed_overflow_uses_plain_add() {
        let (ir, _diags) = compile("procedure P is pragma Suppress (Overflow_Check); X : Integer := 1 + 2; begin null; end P;");
        assert!(ir.contains("= add i64 "), "{}", ir);
        assert!(!ir.contains("llvm.sadd.with.overflow"), "{}", ir);
    }

    #[test]
    fn division_emits_zero_check_branch() {
        let (ir, _diags) = compile("procedure P is X : Integer := 10 / 2; begin null; end P;");
        assert!(ir.contains("icmp eq i64"), "{}", ir);
    }

    #[test]
    fn if_statement_emits_branch_and_merge_block() {
        let (ir, diags) = compile("procedure P is X : Integer := 1; begin if X = 1 then X := 2; else X := 3; end if; end P;");
        assert!(!diags.has_errors(), "{}", diags.render());
        assert!(ir.contains("br i1"), "{}", ir);
    }

    #[test]
    fn overflow_trap_raises_constraint_error_instead_of_aborting() {
        let (ir, _diags) = compile("procedure P is X : Integer := 1 + 2; begin null; end P;");
        assert!(ir.contains("call void @__ada_raise"), "{}", ir);
        assert!(!ir.contains("@puts"), "{}", ir);
        assert!(!ir.contains("@exit"), "{}", ir);
    }

    #[test]
    fn prologue_declares_runtime_and_datalayout() {
        let (ir, _diags) = compile("procedure P is begin null; end P;");
        assert!(ir.contains("target datalayout"), "{}", ir);
        assert!(ir.contains("declare void @__ada_raise(i64)"), "{}", ir);
        assert!(ir.contains("declare i32 @setjmp(i8*)"), "{}", ir);
        assert!(ir.contains("@__exc.constraint_error"), "{}", ir);
    }

    #[test]
    fn bare_raise_calls_reraise() {
        let (ir, diags) = compile(
            "procedure P is begin begin null; exception when others => raise; end; end P;",
        );
        assert!(!diags.has_errors(), "{}", diags.render());
        assert!(ir.contains("call void @__ada_reraise()"), "{}", ir);
    }

    #[test]
    fn named_raise_computes_exception_identity() {
        let (ir, diags) = compile("procedure P is My_Error : exception; begin raise My_Error; end P;");
        assert!(!diags.has_errors(), "{}", diags.render());
        assert!(ir.contains("ptrtoint i8* @__exc."), "{}", ir);
        assert!(ir.contains("call void @__ada_raise"), "{}", ir);
    }

    #[test]
    fn exception_handler_lowers_to_setjmp_dispatch() {
        let src = "procedure P is begin begin null; exception when Constraint_Error => null; end; end P;";
        let (ir, diags) = compile(src);
        assert!(!diags.has_errors(), "{}", diags.render());
        assert!(ir.contains("call i32 @setjmp"), "{}", ir);
        assert!(ir.contains("call void @__ada_push_handler"), "{}", ir);
        assert!(ir.contains("call i64 @__ada_current_exception"), "{}", ir);
    }

    #[test]
    fn string_literal_concatenation_uses_sec_stack_and_memcpy() {
        let src = "procedure P is S : String (1 .. 4) := \"ab\" & \"cd\"; begin null; end P;";
        let (ir, diags) = compile(src);
        assert!(!diags.has_errors(), "{}", diags.render());
        assert!(ir.contains("__ada_sec_stack_alloc"), "{}", ir);
        assert!(ir.contains("llvm.memcpy.p0i8.p0i8.i64"), "{}", ir);
    }

    #[test]
    fn nested_procedure_receives_parent_frame_argument() {
        let src = "procedure P is \
                     X : Integer := 1; \
                     procedure Inner is begin X := 2; end Inner; \
                   begin Inner; end P;";
        let (ir, diags) = compile(src);
        assert!(!diags.has_errors(), "{}", diags.render());
        assert!(ir.contains("%__frame_base = alloca i8"), "{}", ir);
        assert!(ir.contains("%__parent_frame"), "{}", ir);
        assert!(ir.contains("__frame.x"), "{}", ir);
    }

    #[test]
    fn overloaded_same_named_procedures_mangle_to_distinct_symbols() {
        let src = "procedure P is \
                     procedure Foo is begin null; end Foo; \
                     procedure Bar is procedure Foo is begin null; end Foo; begin Foo; end Bar; \
                   begin Foo; Bar; end P;";
        let (ir, diags) = compile(src);
        assert!(!diags.has_errors(), "{}", diags.render());
        let foo_defs: Vec<&str> = ir.lines().filter(|l| l.contains("define") && l.contains("foo")).collect();
        assert_eq!(foo_defs.len(), 2, "{:?}\n{}", foo_defs, ir);
        assert_ne!(foo_defs[0], foo_defs[1]);
    }
}
