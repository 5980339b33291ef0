//! Recursive-descent parser into the tagged AST.
//!
//! Pure recursive descent, one token of lookahead, plus a progress
//! watchdog: if the same `(line, column, kind)` triple is seen twice
//! without a token being consumed, the parser forcibly advances to avoid
//! infinite loops on a malformed input the grammar didn't anticipate.
//! Expressions use precedence climbing; aggregates and call/generic
//! arguments share one "unified association list" helper; any
//! parenthesized postfix `prefix(...)` always parses as the unified
//! `Apply` node — call/index/slice/conversion disambiguation happens only
//! in the semantic pass.

use crate::arena::Slice;
use crate::ast::*;
use crate::diagnostics::{Diagnostics, Location};
use crate::lexer::{Token, TokenKind};
use crate::symbols::ParamMode;

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    diags: &'a mut Diagnostics,
    /// Progress watchdog: `(line, column, discriminant-ish debug string)`
    /// of the last position where we checked for progress.
    last_seen: Option<(u32, u32, String)>,
    panic_mode: bool,
}

type PResult<T> = Result<T, ()>;

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, diags: &'a mut Diagnostics) -> Self {
        Parser { tokens, pos: 0, diags, last_seen: None, panic_mode: false }
    }

    fn cur(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn cur_loc(&self) -> Location {
        self.cur().location.clone()
    }

    fn is_eof(&self) -> bool {
        matches!(self.cur().kind, TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.cur().kind) == std::mem::discriminant(kind)
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(&kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> PResult<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            let loc = self.cur_loc();
            self.error(loc, format!("expected {}", what));
            Err(())
        }
    }

    fn error(&mut self, loc: Location, msg: impl Into<String>) {
        if !self.panic_mode {
            self.diags.report_error(loc, msg);
            self.panic_mode = true;
        }
    }

    /// Advance to the next statement/decl boundary on error.
    fn synchronize(&mut self) {
        self.panic_mode = false;
        while !self.is_eof() {
            if matches!(self.tokens[self.pos.saturating_sub(1).max(0)].kind, TokenKind::Semicolon) {
                return;
            }
            use TokenKind::*;
            if matches!(
                self.cur().kind,
                Begin | End | If | Case | Loop | For | While | Return | Declare | Exception
                    | Procedure | Function | Package | Task | Type | Subtype | Pragma | Accept | Select
            ) {
                return;
            }
            self.advance();
        }
    }

    /// Watchdog: forcibly advance if stuck at the same token twice in a row
    /// without consuming anything.
    fn check_progress(&mut self) {
        let loc = self.cur_loc();
        let key = (loc.line, loc.column, format!("{:?}", self.cur().kind));
        if self.last_seen.as_ref() == Some(&key) {
            self.advance();
            self.last_seen = None;
        } else {
            self.last_seen = Some(key);
        }
    }

    fn ident_slice(&mut self) -> PResult<Slice> {
        match &self.cur().kind {
            TokenKind::Identifier(s) => {
                let s = *s;
                self.advance();
                Ok(s)
            }
            _ => {
                let loc = self.cur_loc();
                self.error(loc, "expected identifier");
                Err(())
            }
        }
    }

    // -----------------------------------------------------------------
    // Top level
    // -----------------------------------------------------------------

    pub fn parse_compilation_unit(&mut self) -> PResult<CompilationUnit> {
        let mut with_clauses = Vec::new();
        let mut use_clauses = Vec::new();
        loop {
            match &self.cur().kind {
                TokenKind::With => with_clauses.push(self.parse_with_clause()?),
                TokenKind::Use => use_clauses.push(self.parse_use_clause()?),
                TokenKind::Pragma => {
                    // Context-level pragmas (rare) are parsed and dropped into with_clauses
                    // position isn't semantically meaningful at this layer; the semantic
                    // pass processes pragmas wherever they occur in a declarative part.
                    let _ = self.parse_pragma()?;
                }
                _ => break,
            }
        }
        let unit = self.parse_unit()?;
        Ok(CompilationUnit { context: Context { with_clauses, use_clauses }, unit })
    }

    fn parse_with_clause(&mut self) -> PResult<Decl> {
        let loc = self.cur_loc();
        self.expect(TokenKind::With, "'with'")?;
        let mut names = vec![self.ident_slice()?];
        while self.eat(TokenKind::Comma) {
            names.push(self.ident_slice()?);
        }
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(Decl::WithClause { names, location: loc })
    }

    fn parse_use_clause(&mut self) -> PResult<Decl> {
        let loc = self.cur_loc();
        self.expect(TokenKind::Use, "'use'")?;
        let mut names = vec![self.ident_slice()?];
        while self.eat(TokenKind::Comma) {
            names.push(self.ident_slice()?);
        }
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(Decl::UseClause { names, location: loc })
    }

    fn parse_unit(&mut self) -> PResult<Unit> {
        match &self.cur().kind {
            TokenKind::Package => self.parse_package_unit(),
            TokenKind::Procedure => {
                let spec = self.parse_procedure_spec()?;
                self.finish_subprogram_unit_procedure(spec)
            }
            TokenKind::Function => {
                let spec = self.parse_function_spec()?;
                self.finish_subprogram_unit_function(spec)
            }
            _ => {
                let loc = self.cur_loc();
                self.error(loc, "expected 'package', 'procedure' or 'function'");
                Err(())
            }
        }
    }

    fn finish_subprogram_unit_procedure(&mut self, spec: ProcedureSpec) -> PResult<Unit> {
        self.expect(TokenKind::Is, "'is'")?;
        let decls = self.parse_declarative_part()?;
        self.expect(TokenKind::Begin, "'begin'")?;
        let (body, handlers) = self.parse_handled_sequence()?;
        self.expect(TokenKind::End, "'end'")?;
        let end_name = self.optional_end_name();
        self.expect(TokenKind::Semicolon, "';'")?;
        self.check_end_name(&spec.name, &end_name, &spec.location);
        Ok(Unit::Procedure(spec, decls, body, handlers, end_name))
    }

    fn finish_subprogram_unit_function(&mut self, spec: FunctionSpec) -> PResult<Unit> {
        self.expect(TokenKind::Is, "'is'")?;
        let decls = self.parse_declarative_part()?;
        self.expect(TokenKind::Begin, "'begin'")?;
        let (body, handlers) = self.parse_handled_sequence()?;
        self.expect(TokenKind::End, "'end'")?;
        let end_name = self.optional_end_name();
        self.expect(TokenKind::Semicolon, "';'")?;
        self.check_end_name(&spec.name, &end_name, &spec.location);
        Ok(Unit::Function(spec, decls, body, handlers, end_name))
    }

    fn parse_package_unit(&mut self) -> PResult<Unit> {
        let loc = self.cur_loc();
        self.expect(TokenKind::Package, "'package'")?;
        let is_body = self.eat(TokenKind::Body);
        let name = self.ident_slice()?;
        self.expect(TokenKind::Is, "'is'")?;
        if is_body {
            let decls = self.parse_declarative_part()?;
            let (body, handlers) = if self.eat(TokenKind::Begin) {
                self.parse_handled_sequence()?
            } else {
                (Vec::new(), Vec::new())
            };
            self.expect(TokenKind::End, "'end'")?;
            let end_name = self.optional_end_name();
            self.expect(TokenKind::Semicolon, "';'")?;
            self.check_end_name(&name, &end_name, &loc);
            Ok(Unit::PackageBody { name, decls, body, handlers, end_name })
        } else {
            let visible = self.parse_declarative_part()?;
            let private = if self.eat(TokenKind::Private) { self.parse_declarative_part()? } else { Vec::new() };
            self.expect(TokenKind::End, "'end'")?;
            let end_name = self.optional_end_name();
            self.expect(TokenKind::Semicolon, "';'")?;
            self.check_end_name(&name, &end_name, &loc);
            Ok(Unit::PackageSpec { name, visible, private, end_name })
        }
    }

    fn optional_end_name(&mut self) -> Option<Slice> {
        if let TokenKind::Identifier(s) = &self.cur().kind {
            let s = *s;
            self.advance();
            Some(s)
        } else {
            None
        }
    }

    /// When `end <name>;` is permitted, a present identifier must match the
    /// opening name case-insensitively; mismatch is non-fatal.
    fn check_end_name(&mut self, opening: &Slice, end_name: &Option<Slice>, loc: &Location) {
        if let Some(end) = end_name {
            if !end.eq_ignore_case(opening) {
                self.diags.report_error(
                    loc.clone(),
                    format!("end name '{}' does not match '{}'", end.as_str(), opening.as_str()),
                );
            }
        }
    }

    // -----------------------------------------------------------------
    // Declarative parts / declarations
    // -----------------------------------------------------------------

    fn parse_declarative_part(&mut self) -> PResult<Vec<Decl>> {
        let mut decls = Vec::new();
        loop {
            self.check_progress();
            match &self.cur().kind {
                TokenKind::Begin | TokenKind::End | TokenKind::Private | TokenKind::Eof => break,
                _ => match self.parse_declaration() {
                    Ok(d) => decls.push(d),
                    Err(()) => {
                        self.synchronize();
                    }
                },
            }
        }
        Ok(decls)
    }

    fn parse_declaration(&mut self) -> PResult<Decl> {
        match &self.cur().kind {
            TokenKind::With => Ok(self.parse_with_clause()?),
            TokenKind::Use => Ok(self.parse_use_clause()?),
            TokenKind::Pragma => Ok(self.parse_pragma()?),
            TokenKind::Type => self.parse_type_decl(),
            TokenKind::Subtype => self.parse_subtype_decl(),
            TokenKind::Procedure => self.parse_procedure_decl_or_body(),
            TokenKind::Function => self.parse_function_decl_or_body(),
            TokenKind::Package => {
                let unit = self.parse_package_unit()?;
                Ok(match unit {
                    Unit::PackageSpec { name, visible, private, end_name } => {
                        Decl::PackageSpec { name, visible, private, end_name, location: self.cur_loc() }
                    }
                    Unit::PackageBody { name, decls, body, handlers, end_name } => {
                        Decl::PackageBody { name, decls, body, handlers, end_name, location: self.cur_loc() }
                    }
                    _ => unreachable!(),
                })
            }
            TokenKind::Generic => self.parse_generic_decl(),
            TokenKind::Identifier(_) => {
                // Could be an object declaration or `Name is new Generic(...)`.
                self.parse_object_or_generic_inst()
            }
            _ => {
                let loc = self.cur_loc();
                self.error(loc, "expected a declaration");
                Err(())
            }
        }
    }

    fn parse_pragma(&mut self) -> PResult<Decl> {
        let loc = self.cur_loc();
        self.expect(TokenKind::Pragma, "'pragma'")?;
        let name = self.ident_slice()?;
        let mut args: Vec<Slice> = Vec::new();
        if self.eat(TokenKind::LParen) {
            loop {
                // Pragma arguments here are always simple names in this
                // core; richer argument
                // forms (strings, numeric) are read generically as a
                // single-token best-effort and ignored.
                match &self.cur().kind {
                    TokenKind::Identifier(s) => {
                        args.push(*s);
                        self.advance();
                    }
                    _ => {
                        self.advance();
                    }
                }
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "')'")?;
        }
        self.expect(TokenKind::Semicolon, "';'")?;
        let pragma = build_pragma(&name, &args);
        Ok(Decl::PragmaDecl(pragma, loc))
    }

    fn parse_type_decl(&mut self) -> PResult<Decl> {
        let loc = self.cur_loc();
        self.expect(TokenKind::Type, "'type'")?;
        let name = self.ident_slice()?;
        let mut discriminants = Vec::new();
        if self.eat(TokenKind::LParen) {
            discriminants = self.parse_discriminant_specs()?;
            self.expect(TokenKind::RParen, "')'")?;
        }
        self.expect(TokenKind::Is, "'is'")?;
        let def = self.parse_type_definition(discriminants)?;
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(Decl::TypeDecl { name, def, location: loc })
    }

    fn parse_discriminant_specs(&mut self) -> PResult<Vec<DiscriminantSpec>> {
        let mut specs = Vec::new();
        loop {
            let loc = self.cur_loc();
            let mut names = vec![self.ident_slice()?];
            while self.eat(TokenKind::Comma) {
                if matches!(self.cur().kind, TokenKind::Colon) {
                    break;
                }
                names.push(self.ident_slice()?);
            }
            self.expect(TokenKind::Colon, "':'")?;
            let type_mark = self.parse_expression()?;
            for n in names {
                specs.push(DiscriminantSpec { name: n, type_mark: type_mark.clone(), location: loc.clone() });
            }
            if !self.eat(TokenKind::Semicolon) {
                break;
            }
        }
        Ok(specs)
    }

    fn parse_type_definition(&mut self, discriminants: Vec<DiscriminantSpec>) -> PResult<TypeDef> {
        match &self.cur().kind {
            TokenKind::LParen => {
                self.advance();
                let mut literals = vec![self.ident_slice()?];
                while self.eat(TokenKind::Comma) {
                    literals.push(self.ident_slice()?);
                }
                self.expect(TokenKind::RParen, "')'")?;
                Ok(TypeDef::Enumeration { literals })
            }
            TokenKind::Range => {
                self.advance();
                let low = self.parse_expression()?;
                self.expect(TokenKind::DotDot, "'..'")?;
                let high = self.parse_expression()?;
                Ok(TypeDef::Integer { low, high })
            }
            TokenKind::Mod => {
                self.advance();
                let modulus = self.parse_expression()?;
                Ok(TypeDef::Modular { modulus })
            }
            TokenKind::Digits => {
                self.advance();
                let digits = self.parse_expression()?;
                let range = self.parse_optional_real_range()?;
                Ok(TypeDef::Real { digits: Some(digits), delta: None, range })
            }
            TokenKind::Delta => {
                self.advance();
                let delta = self.parse_expression()?;
                let range = self.parse_optional_real_range()?;
                Ok(TypeDef::Real { digits: None, delta: Some(delta), range })
            }
            TokenKind::Array => {
                self.advance();
                self.expect(TokenKind::LParen, "'('")?;
                let mut index_subtypes = Vec::new();
                let mut unconstrained = false;
                loop {
                    if matches!(self.cur().kind, TokenKind::Box) {
                        self.advance();
                        unconstrained = true;
                        index_subtypes.push(SubtypeIndication {
                            type_mark: Expr::new(ExprKind::Name(Name::Identifier(Slice::EMPTY)), self.cur_loc()),
                            constraint: None,
                            location: self.cur_loc(),
                        });
                    } else {
                        index_subtypes.push(self.parse_discrete_range_as_subtype()?);
                    }
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RParen, "')'")?;
                self.expect(TokenKind::Of, "'of'")?;
                let element = self.parse_subtype_indication()?;
                Ok(TypeDef::Array { index_subtypes, element, unconstrained })
            }
            TokenKind::Record => {
                self.advance();
                let (components, variant_part) = self.parse_component_list()?;
                self.expect(TokenKind::End, "'end'")?;
                self.expect(TokenKind::Record, "'record'")?;
                Ok(TypeDef::Record { discriminants, components, variant_part })
            }
            TokenKind::Access => {
                self.advance();
                let is_constant = self.eat(TokenKind::Constant);
                let designated = self.parse_expression()?;
                Ok(TypeDef::Access { designated, is_constant })
            }
            TokenKind::New => {
                self.advance();
                let parent = self.parse_subtype_indication()?;
                Ok(TypeDef::Derived { parent })
            }
            _ => {
                let loc = self.cur_loc();
                self.error(loc, "expected a type definition");
                Err(())
            }
        }
    }

    fn parse_optional_real_range(&mut self) -> PResult<Option<(Expr, Expr)>> {
        if self.eat(TokenKind::Range) {
            let low = self.parse_expression()?;
            self.expect(TokenKind::DotDot, "'..'")?;
            let high = self.parse_expression()?;
            Ok(Some((low, high)))
        } else {
            Ok(None)
        }
    }

    fn parse_discrete_range_as_subtype(&mut self) -> PResult<SubtypeIndication> {
        self.parse_subtype_indication()
    }

    fn parse_subtype_indication(&mut self) -> PResult<SubtypeIndication> {
        let loc = self.cur_loc();
        let type_mark = self.parse_expression()?;
        let constraint = if self.eat(TokenKind::Range) {
            let low = self.parse_expression()?;
            self.expect(TokenKind::DotDot, "'..'")?;
            let high = self.parse_expression()?;
            Some(Constraint::Range(low, high))
        } else if self.eat(TokenKind::LParen) {
            let mut ranges = Vec::new();
            loop {
                let lo = self.parse_expression()?;
                self.expect(TokenKind::DotDot, "'..'")?;
                let hi = self.parse_expression()?;
                ranges.push((lo, hi));
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "')'")?;
            Some(Constraint::Index(ranges))
        } else {
            None
        };
        Ok(SubtypeIndication { type_mark, constraint, location: loc })
    }

    fn parse_component_list(&mut self) -> PResult<(Vec<ComponentDecl>, Option<VariantPart>)> {
        let mut components = Vec::new();
        let mut variant_part = None;
        loop {
            self.check_progress();
            match &self.cur().kind {
                TokenKind::End => break,
                TokenKind::Case => {
                    self.advance();
                    let discriminant = self.ident_slice()?;
                    self.expect(TokenKind::Is, "'is'")?;
                    let mut variants = Vec::new();
                    while matches!(self.cur().kind, TokenKind::When) {
                        self.advance();
                        let choices = self.parse_choice_list()?;
                        self.expect(TokenKind::Arrow, "'=>'")?;
                        let (comps, _) = self.parse_component_list_until_when_or_end()?;
                        variants.push(Variant { choices, components: comps });
                    }
                    self.expect(TokenKind::End, "'end'")?;
                    self.expect(TokenKind::Case, "'case'")?;
                    self.expect(TokenKind::Semicolon, "';'")?;
                    variant_part = Some(VariantPart { discriminant, variants });
                }
                TokenKind::Null => {
                    self.advance();
                    self.expect(TokenKind::Semicolon, "';'")?;
                }
                _ => {
                    let loc = self.cur_loc();
                    let mut names = vec![self.ident_slice()?];
                    while self.eat(TokenKind::Comma) {
                        names.push(self.ident_slice()?);
                    }
                    self.expect(TokenKind::Colon, "':'")?;
                    let subtype = self.parse_subtype_indication()?;
                    self.expect(TokenKind::Semicolon, "';'")?;
                    components.push(ComponentDecl { names, subtype, location: loc });
                }
            }
        }
        Ok((components, variant_part))
    }

    fn parse_component_list_until_when_or_end(&mut self) -> PResult<(Vec<ComponentDecl>, Option<VariantPart>)> {
        let mut components = Vec::new();
        loop {
            self.check_progress();
            if matches!(self.cur().kind, TokenKind::When | TokenKind::End) {
                break;
            }
            if matches!(self.cur().kind, TokenKind::Null) {
                self.advance();
                self.expect(TokenKind::Semicolon, "';'")?;
                continue;
            }
            let loc = self.cur_loc();
            let mut names = vec![self.ident_slice()?];
            while self.eat(TokenKind::Comma) {
                names.push(self.ident_slice()?);
            }
            self.expect(TokenKind::Colon, "':'")?;
            let subtype = self.parse_subtype_indication()?;
            self.expect(TokenKind::Semicolon, "';'")?;
            components.push(ComponentDecl { names, subtype, location: loc });
        }
        Ok((components, None))
    }

    fn parse_subtype_decl(&mut self) -> PResult<Decl> {
        let loc = self.cur_loc();
        self.expect(TokenKind::Subtype, "'subtype'")?;
        let name = self.ident_slice()?;
        self.expect(TokenKind::Is, "'is'")?;
        let indication = self.parse_subtype_indication()?;
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(Decl::SubtypeDecl { name, indication, location: loc })
    }

    fn parse_generic_decl(&mut self) -> PResult<Decl> {
        let loc = self.cur_loc();
        self.expect(TokenKind::Generic, "'generic'")?;
        // Generic formal part: skip to the subprogram/package spec that
        // follows.
        while !matches!(self.cur().kind, TokenKind::Procedure | TokenKind::Function | TokenKind::Package | TokenKind::Eof) {
            self.advance();
        }
        let name = match &self.cur().kind {
            TokenKind::Procedure => {
                let spec = self.parse_procedure_spec()?;
                self.expect(TokenKind::Semicolon, "';'")?;
                spec.name
            }
            TokenKind::Function => {
                let spec = self.parse_function_spec()?;
                self.expect(TokenKind::Semicolon, "';'")?;
                spec.name
            }
            _ => {
                self.error(loc.clone(), "expected generic unit spec");
                return Err(());
            }
        };
        Ok(Decl::GenericDecl { name, location: loc })
    }

    fn parse_object_or_generic_inst(&mut self) -> PResult<Decl> {
        let loc = self.cur_loc();
        let mut names = vec![self.ident_slice()?];
        while self.eat(TokenKind::Comma) {
            names.push(self.ident_slice()?);
        }
        self.expect(TokenKind::Colon, "':'")?;
        if self.eat(TokenKind::Is) {
            // `Name : ... is new Generic(...)` is unusual; treat plain
            // `is new` as a generic instantiation.
            self.expect(TokenKind::New, "'new'")?;
            let generic_name = self.ident_slice()?;
            if self.eat(TokenKind::LParen) {
                self.skip_balanced_parens();
            }
            self.expect(TokenKind::Semicolon, "';'")?;
            return Ok(Decl::GenericInst { name: names[0], generic_name, location: loc });
        }
        let is_constant = self.eat(TokenKind::Constant);
        if matches!(self.cur().kind, TokenKind::Exception) {
            self.advance();
            self.expect(TokenKind::Semicolon, "';'")?;
            return Ok(Decl::ExceptionDecl { names, location: loc });
        }
        let subtype = self.parse_subtype_indication()?;
        if self.check(&TokenKind::Is) {
            self.advance();
            self.expect(TokenKind::New, "'new'")?;
            let generic_name = self.ident_slice()?;
            if self.eat(TokenKind::LParen) {
                self.skip_balanced_parens();
            }
            self.expect(TokenKind::Semicolon, "';'")?;
            return Ok(Decl::GenericInst { name: names[0], generic_name, location: loc });
        }
        let init = if self.eat(TokenKind::Assign) { Some(self.parse_expression()?) } else { None };
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(Decl::Object { names, is_constant, subtype, init, location: loc })
    }

    fn skip_balanced_parens(&mut self) {
        let mut depth = 1;
        while depth > 0 && !self.is_eof() {
            match &self.cur().kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => depth -= 1,
                _ => {}
            }
            self.advance();
        }
    }

    fn parse_procedure_spec(&mut self) -> PResult<ProcedureSpec> {
        let loc = self.cur_loc();
        self.expect(TokenKind::Procedure, "'procedure'")?;
        let name = self.ident_slice()?;
        let params = self.parse_optional_param_list()?;
        Ok(ProcedureSpec { name, params, location: loc })
    }

    fn parse_function_spec(&mut self) -> PResult<FunctionSpec> {
        let loc = self.cur_loc();
        self.expect(TokenKind::Function, "'function'")?;
        let name = self.ident_slice()?;
        let params = self.parse_optional_param_list()?;
        self.expect(TokenKind::Return, "'return'")?;
        let return_type = self.parse_expression()?;
        Ok(FunctionSpec { name, params, return_type, location: loc })
    }

    fn parse_optional_param_list(&mut self) -> PResult<Vec<ParamSpec>> {
        let mut params = Vec::new();
        if self.eat(TokenKind::LParen) {
            loop {
                let loc = self.cur_loc();
                let mut names = vec![self.ident_slice()?];
                while self.eat(TokenKind::Comma) {
                    if matches!(self.cur().kind, TokenKind::Colon) {
                        break;
                    }
                    names.push(self.ident_slice()?);
                }
                self.expect(TokenKind::Colon, "':'")?;
                let mode = if self.eat(TokenKind::In) {
                    if self.eat(TokenKind::Out) { ParamMode::InOut } else { ParamMode::In }
                } else if self.eat(TokenKind::Out) {
                    ParamMode::Out
                } else {
                    ParamMode::In
                };
                let type_mark = self.parse_expression()?;
                let default = if self.eat(TokenKind::Assign) { Some(self.parse_expression()?) } else { None };
                params.push(ParamSpec { names, mode, type_mark, default, location: loc });
                if !self.eat(TokenKind::Semicolon) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "')'")?;
        }
        Ok(params)
    }

    fn parse_procedure_decl_or_body(&mut self) -> PResult<Decl> {
        let spec = self.parse_procedure_spec()?;
        if self.eat(TokenKind::Semicolon) {
            return Ok(Decl::ProcedureSpecDecl(spec));
        }
        self.expect(TokenKind::Is, "'is'")?;
        let decls = self.parse_declarative_part()?;
        self.expect(TokenKind::Begin, "'begin'")?;
        let (body, handlers) = self.parse_handled_sequence()?;
        self.expect(TokenKind::End, "'end'")?;
        let end_name = self.optional_end_name();
        self.expect(TokenKind::Semicolon, "';'")?;
        self.check_end_name(&spec.name, &end_name, &spec.location);
        Ok(Decl::ProcedureBody { spec, decls, body, handlers, end_name })
    }

    fn parse_function_decl_or_body(&mut self) -> PResult<Decl> {
        let spec = self.parse_function_spec()?;
        if self.eat(TokenKind::Semicolon) {
            return Ok(Decl::FunctionSpecDecl(spec));
        }
        self.expect(TokenKind::Is, "'is'")?;
        let decls = self.parse_declarative_part()?;
        self.expect(TokenKind::Begin, "'begin'")?;
        let (body, handlers) = self.parse_handled_sequence()?;
        self.expect(TokenKind::End, "'end'")?;
        let end_name = self.optional_end_name();
        self.expect(TokenKind::Semicolon, "';'")?;
        self.check_end_name(&spec.name, &end_name, &spec.location);
        Ok(Decl::FunctionBody { spec, decls, body, handlers, end_name })
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    fn parse_handled_sequence(&mut self) -> PResult<(Vec<Stmt>, Vec<ExceptionHandler>)> {
        let mut body = Vec::new();
        while !matches!(self.cur().kind, TokenKind::Exception | TokenKind::End | TokenKind::Eof) {
            self.check_progress();
            match self.parse_statement() {
                Ok(s) => body.push(s),
                Err(()) => self.synchronize(),
            }
        }
        let mut handlers = Vec::new();
        if self.eat(TokenKind::Exception) {
            while matches!(self.cur().kind, TokenKind::When) {
                let loc = self.cur_loc();
                self.advance();
                let is_others = matches!(self.cur().kind, TokenKind::Others);
                let mut names = Vec::new();
                if is_others {
                    self.advance();
                } else {
                    names.push(self.parse_expression()?);
                    while self.eat(TokenKind::Bar) {
                        names.push(self.parse_expression()?);
                    }
                }
                self.expect(TokenKind::Arrow, "'=>'")?;
                let mut hbody = Vec::new();
                while !matches!(self.cur().kind, TokenKind::When | TokenKind::End | TokenKind::Eof) {
                    self.check_progress();
                    match self.parse_statement() {
                        Ok(s) => hbody.push(s),
                        Err(()) => self.synchronize(),
                    }
                }
                handlers.push(ExceptionHandler { names, is_others, body: hbody, location: loc });
            }
        }
        Ok((body, handlers))
    }

    fn parse_statement(&mut self) -> PResult<Stmt> {
        let loc = self.cur_loc();
        match &self.cur().kind {
            TokenKind::Null => {
                self.advance();
                self.expect(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::Null { location: loc })
            }
            TokenKind::Return => {
                self.advance();
                let value = if !matches!(self.cur().kind, TokenKind::Semicolon) {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                self.expect(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::Return { value, location: loc })
            }
            TokenKind::If => self.parse_if_statement(),
            TokenKind::Case => self.parse_case_statement(),
            TokenKind::Loop => self.parse_loop_statement(None),
            TokenKind::While | TokenKind::For => self.parse_iteration_statement(None),
            TokenKind::Declare => self.parse_block_statement(None),
            TokenKind::Exit => {
                self.advance();
                let loop_label = if let TokenKind::Identifier(s) = &self.cur().kind {
                    let s = *s;
                    self.advance();
                    Some(s)
                } else {
                    None
                };
                let when = if self.eat(TokenKind::When) { Some(self.parse_expression()?) } else { None };
                self.expect(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::Exit { loop_label, when, location: loc })
            }
            TokenKind::Goto => {
                self.advance();
                let label = self.ident_slice()?;
                self.expect(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::Goto { label, location: loc })
            }
            TokenKind::Raise => {
                self.advance();
                let exception = if !matches!(self.cur().kind, TokenKind::Semicolon) {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                self.expect(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::Raise { exception, location: loc })
            }
            TokenKind::Accept => {
                self.advance();
                let entry = self.ident_slice()?;
                if self.eat(TokenKind::LParen) {
                    self.skip_balanced_parens();
                }
                let mut body = Vec::new();
                if self.eat(TokenKind::Do) {
                    while !matches!(self.cur().kind, TokenKind::End | TokenKind::Eof) {
                        self.check_progress();
                        match self.parse_statement() {
                            Ok(s) => body.push(s),
                            Err(()) => self.synchronize(),
                        }
                    }
                    self.expect(TokenKind::End, "'end'")?;
                }
                self.expect(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::Accept { entry, body, location: loc })
            }
            TokenKind::Select => {
                self.advance();
                let mut arms = Vec::new();
                loop {
                    self.eat(TokenKind::When);
                    if !matches!(self.cur().kind, TokenKind::Or | TokenKind::Else | TokenKind::End) {
                        let _ = self.parse_expression();
                        self.eat(TokenKind::Arrow);
                    }
                    let mut arm = Vec::new();
                    while !matches!(self.cur().kind, TokenKind::Or | TokenKind::Else | TokenKind::End | TokenKind::Eof) {
                        self.check_progress();
                        match self.parse_statement() {
                            Ok(s) => arm.push(s),
                            Err(()) => self.synchronize(),
                        }
                    }
                    arms.push(arm);
                    if !self.eat(TokenKind::Or) {
                        break;
                    }
                }
                if self.eat(TokenKind::Else) {
                    let mut arm = Vec::new();
                    while !matches!(self.cur().kind, TokenKind::End | TokenKind::Eof) {
                        self.check_progress();
                        match self.parse_statement() {
                            Ok(s) => arm.push(s),
                            Err(()) => self.synchronize(),
                        }
                    }
                    arms.push(arm);
                }
                self.expect(TokenKind::End, "'end'")?;
                self.eat(TokenKind::Select);
                self.expect(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::Select { arms, location: loc })
            }
            TokenKind::Delay => {
                self.advance();
                let value = self.parse_expression()?;
                self.expect(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::Delay { value, location: loc })
            }
            TokenKind::Abort => {
                self.advance();
                let mut names = vec![self.parse_expression()?];
                while self.eat(TokenKind::Comma) {
                    names.push(self.parse_expression()?);
                }
                self.expect(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::Abort { names, location: loc })
            }
            TokenKind::Identifier(_) => self.parse_label_loop_assignment_or_call(),
            TokenKind::LessLess => {
                // `<<Label>>` statement label, then fall through to the next statement.
                self.advance();
                let _ = self.ident_slice();
                self.expect(TokenKind::GreaterGreater, "'>>'")?;
                self.parse_statement()
            }
            _ => {
                self.error(loc.clone(), "expected a statement");
                Err(())
            }
        }
    }

    fn parse_label_loop_assignment_or_call(&mut self) -> PResult<Stmt> {
        let loc = self.cur_loc();
        // `Label : loop/while/for/declare ...` — a statement label.
        if let TokenKind::Identifier(label) = &self.cur().kind {
            let label = *label;
            if matches!(self.tokens.get(self.pos + 1).map(|t| &t.kind), Some(TokenKind::Colon)) {
                let save = self.pos;
                self.advance();
                self.advance();
                match &self.cur().kind {
                    TokenKind::Loop => return self.parse_loop_statement(Some(label)),
                    TokenKind::While | TokenKind::For => return self.parse_iteration_statement(Some(label)),
                    TokenKind::Declare | TokenKind::Begin => return self.parse_block_statement(Some(label)),
                    _ => {
                        self.pos = save;
                    }
                }
            }
        }
        let expr = self.parse_expression()?;
        if self.eat(TokenKind::Assign) {
            let value = self.parse_expression()?;
            self.expect(TokenKind::Semicolon, "';'")?;
            Ok(Stmt::Assignment { target: expr, value, location: loc })
        } else {
            self.expect(TokenKind::Semicolon, "';'")?;
            let args = match expr.kind {
                ExprKind::Name(Name::Apply { args, .. }) => args,
                _ => Vec::new(),
            };
            Ok(Stmt::Call { name: expr, args, location: loc })
        }
    }

    fn parse_if_statement(&mut self) -> PResult<Stmt> {
        let loc = self.cur_loc();
        self.expect(TokenKind::If, "'if'")?;
        let mut branches = Vec::new();
        loop {
            let cond = self.parse_expression()?;
            self.expect(TokenKind::Then, "'then'")?;
            let mut body = Vec::new();
            while !matches!(self.cur().kind, TokenKind::Elsif | TokenKind::Else | TokenKind::End | TokenKind::Eof) {
                self.check_progress();
                match self.parse_statement() {
                    Ok(s) => body.push(s),
                    Err(()) => self.synchronize(),
                }
            }
            branches.push((cond, body));
            if self.eat(TokenKind::Elsif) {
                continue;
            }
            break;
        }
        let else_branch = if self.eat(TokenKind::Else) {
            let mut body = Vec::new();
            while !matches!(self.cur().kind, TokenKind::End | TokenKind::Eof) {
                self.check_progress();
                match self.parse_statement() {
                    Ok(s) => body.push(s),
                    Err(()) => self.synchronize(),
                }
            }
            Some(body)
        } else {
            None
        };
        self.expect(TokenKind::End, "'end'")?;
        self.expect(TokenKind::If, "'if'")?;
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(Stmt::If { branches, else_branch, location: loc })
    }

    fn parse_case_statement(&mut self) -> PResult<Stmt> {
        let loc = self.cur_loc();
        self.expect(TokenKind::Case, "'case'")?;
        let selector = self.parse_expression()?;
        self.expect(TokenKind::Is, "'is'")?;
        let mut arms = Vec::new();
        while matches!(self.cur().kind, TokenKind::When) {
            self.advance();
            let choices = self.parse_choice_list()?;
            self.expect(TokenKind::Arrow, "'=>'")?;
            let mut body = Vec::new();
            while !matches!(self.cur().kind, TokenKind::When | TokenKind::End | TokenKind::Eof) {
                self.check_progress();
                match self.parse_statement() {
                    Ok(s) => body.push(s),
                    Err(()) => self.synchronize(),
                }
            }
            arms.push(CaseArm { choices, body });
        }
        self.expect(TokenKind::End, "'end'")?;
        self.expect(TokenKind::Case, "'case'")?;
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(Stmt::Case { selector, arms, location: loc })
    }

    fn parse_choice_list(&mut self) -> PResult<Vec<Choice>> {
        let mut choices = Vec::new();
        loop {
            if matches!(self.cur().kind, TokenKind::Others) {
                self.advance();
                choices.push(Choice::Others);
            } else {
                let e = self.parse_expression()?;
                if let ExprKind::Name(Name::Range { low, high }) = e.kind {
                    choices.push(Choice::Range(*low, *high));
                } else {
                    choices.push(Choice::Expr(e));
                }
            }
            if !self.eat(TokenKind::Bar) {
                break;
            }
        }
        Ok(choices)
    }

    fn parse_loop_statement(&mut self, label: Option<Slice>) -> PResult<Stmt> {
        let loc = self.cur_loc();
        self.expect(TokenKind::Loop, "'loop'")?;
        let mut body = Vec::new();
        while !matches!(self.cur().kind, TokenKind::End | TokenKind::Eof) {
            self.check_progress();
            match self.parse_statement() {
                Ok(s) => body.push(s),
                Err(()) => self.synchronize(),
            }
        }
        self.expect(TokenKind::End, "'end'")?;
        self.expect(TokenKind::Loop, "'loop'")?;
        self.optional_end_name();
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(Stmt::Loop { label, scheme: LoopScheme::Plain, body, location: loc })
    }

    fn parse_iteration_statement(&mut self, label: Option<Slice>) -> PResult<Stmt> {
        let loc = self.cur_loc();
        let scheme = if self.eat(TokenKind::While) {
            let cond = self.parse_expression()?;
            LoopScheme::While(cond)
        } else {
            self.expect(TokenKind::For, "'for'")?;
            let var = self.ident_slice()?;
            self.expect(TokenKind::In, "'in'")?;
            let reverse = self.eat(TokenKind::Reverse);
            let range = self.parse_expression()?;
            LoopScheme::For { var, range, reverse }
        };
        self.expect(TokenKind::Loop, "'loop'")?;
        let mut body = Vec::new();
        while !matches!(self.cur().kind, TokenKind::End | TokenKind::Eof) {
            self.check_progress();
            match self.parse_statement() {
                Ok(s) => body.push(s),
                Err(()) => self.synchronize(),
            }
        }
        self.expect(TokenKind::End, "'end'")?;
        self.expect(TokenKind::Loop, "'loop'")?;
        self.optional_end_name();
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(Stmt::Loop { label, scheme, body, location: loc })
    }

    fn parse_block_statement(&mut self, label: Option<Slice>) -> PResult<Stmt> {
        let loc = self.cur_loc();
        let decls = if self.eat(TokenKind::Declare) { self.parse_declarative_part()? } else { Vec::new() };
        self.expect(TokenKind::Begin, "'begin'")?;
        let (body, handlers) = self.parse_handled_sequence()?;
        self.expect(TokenKind::End, "'end'")?;
        self.optional_end_name();
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(Stmt::Block { label, decls, body, handlers, location: loc })
    }

    // -----------------------------------------------------------------
    // Expressions — precedence climbing
    // -----------------------------------------------------------------

    pub fn parse_expression(&mut self) -> PResult<Expr> {
        self.parse_logical()
    }

    fn parse_logical(&mut self) -> PResult<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match &self.cur().kind {
                TokenKind::And => BinOp::And,
                TokenKind::Or => BinOp::Or,
                TokenKind::Xor => BinOp::Xor,
                TokenKind::AndThen => BinOp::AndThen,
                TokenKind::OrElse => BinOp::OrElse,
                _ => break,
            };
            let loc = self.cur_loc();
            self.advance();
            let right = self.parse_relational()?;
            left = Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, loc);
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> PResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let negate_in = matches!(self.cur().kind, TokenKind::Not)
                && matches!(self.tokens.get(self.pos + 1).map(|t| &t.kind), Some(TokenKind::In));
            let op = if negate_in {
                self.advance();
                Some(BinOp::NotIn)
            } else {
                match &self.cur().kind {
                    TokenKind::Equal => Some(BinOp::Eq),
                    TokenKind::SlashEqual => Some(BinOp::Ne),
                    TokenKind::Less => Some(BinOp::Lt),
                    TokenKind::LessEqual => Some(BinOp::Le),
                    TokenKind::Greater => Some(BinOp::Gt),
                    TokenKind::GreaterEqual => Some(BinOp::Ge),
                    TokenKind::In => Some(BinOp::In),
                    _ => None,
                }
            };
            let Some(op) = op else { break };
            let loc = self.cur_loc();
            self.advance();
            // `in`/`not in` with a `..` on the right produces a range node
            // as the RHS.
            let right = self.parse_additive()?;
            let right = if matches!(op, BinOp::In | BinOp::NotIn) && self.check(&TokenKind::DotDot) {
                self.advance();
                let high = self.parse_additive()?;
                Expr::new(ExprKind::Name(Name::Range { low: Box::new(right), high: Box::new(high) }), loc.clone())
            } else {
                right
            };
            left = Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, loc);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match &self.cur().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                TokenKind::Ampersand => BinOp::Concat,
                _ => break,
            };
            let loc = self.cur_loc();
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, loc);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut left = self.parse_exponential()?;
        loop {
            let op = match &self.cur().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Mod => BinOp::Mod,
                TokenKind::Rem => BinOp::Rem,
                _ => break,
            };
            let loc = self.cur_loc();
            self.advance();
            let right = self.parse_exponential()?;
            left = Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, loc);
        }
        Ok(left)
    }

    /// `**` is right-associative; everything else is left-associative.
    fn parse_exponential(&mut self) -> PResult<Expr> {
        let left = self.parse_unary()?;
        if matches!(self.cur().kind, TokenKind::StarStar) {
            let loc = self.cur_loc();
            self.advance();
            let right = self.parse_exponential()?;
            return Ok(Expr::new(ExprKind::Binary { op: BinOp::Pow, left: Box::new(left), right: Box::new(right) }, loc));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let loc = self.cur_loc();
        let op = match &self.cur().kind {
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Abs => Some(UnaryOp::Abs),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Minus => Some(UnaryOp::Minus),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::new(ExprKind::Unary { op, operand: Box::new(operand) }, loc));
        }
        self.parse_postfix()
    }

    /// Unified postfix chain: `.selector`/`.all`, `'attribute[(arg)]`,
    /// `(args)` loop over a primary.
    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match &self.cur().kind {
                TokenKind::Dot => {
                    let loc = self.cur_loc();
                    self.advance();
                    if self.eat(TokenKind::All) {
                        expr = Expr::new(ExprKind::Name(Name::Dereference(Box::new(expr))), loc);
                    } else {
                        let selector = self.ident_slice()?;
                        expr = Expr::new(ExprKind::Name(Name::Selected { prefix: Box::new(expr), selector }), loc);
                    }
                }
                TokenKind::Apostrophe => {
                    let loc = self.cur_loc();
                    self.advance();
                    if self.eat(TokenKind::LParen) {
                        // `Type'(expr)` qualified expression.
                        let inner = self.parse_expression()?;
                        self.expect(TokenKind::RParen, "')'")?;
                        expr = Expr::new(ExprKind::Name(Name::Qualified { type_mark: Box::new(expr), expr: Box::new(inner) }), loc);
                        continue;
                    }
                    let attribute = self.ident_slice()?;
                    let arg = if self.eat(TokenKind::LParen) {
                        let a = self.parse_expression()?;
                        self.expect(TokenKind::RParen, "')'")?;
                        Some(Box::new(a))
                    } else {
                        None
                    };
                    expr = Expr::new(ExprKind::Name(Name::Attribute { prefix: Box::new(expr), attribute, arg }), loc);
                }
                TokenKind::LParen => {
                    let loc = self.cur_loc();
                    let args = self.parse_association_list()?;
                    expr = Expr::new(ExprKind::Name(Name::Apply { prefix: Box::new(expr), args }), loc);
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// One helper parses a comma-separated list where each item is
    /// positional, a named association (`choices => expression` with
    /// `|`-separated choices), or a range for an aggregate-specific choice.
    /// Used identically for aggregates, call arguments and generic actuals.
    fn parse_association_list(&mut self) -> PResult<AssociationList> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut items = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let loc = self.cur_loc();
                items.push(self.parse_one_association(loc)?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(items)
    }

    fn parse_one_association(&mut self, loc: Location) -> PResult<Association> {
        // Try to detect `choice [| choice]... =>` by scanning ahead with a
        // saved position; cheaper than full backtracking because choices
        // are restricted to expressions/`others`/ranges.
        let save = self.pos;
        let mut choices = Vec::new();
        let mut looks_named = false;
        'scan: loop {
            if matches!(self.cur().kind, TokenKind::Others) {
                self.advance();
                choices.push(Choice::Others);
            } else {
                match self.parse_expression() {
                    Ok(e) => {
                        if self.eat(TokenKind::DotDot) {
                            let hi = self.parse_expression().map_err(|_| ())?;
                            choices.push(Choice::Range(e, hi));
                        } else {
                            choices.push(Choice::Expr(e));
                        }
                    }
                    Err(()) => {
                        self.pos = save;
                        choices.clear();
                        break 'scan;
                    }
                }
            }
            if self.eat(TokenKind::Bar) {
                continue;
            }
            if self.eat(TokenKind::Arrow) {
                looks_named = true;
            }
            break;
        }
        if looks_named {
            let value = self.parse_expression()?;
            return Ok(Association { choices, value, location: loc });
        }
        // Not named: rewind and parse a single positional expression.
        self.pos = save;
        let value = self.parse_expression()?;
        Ok(Association { choices: Vec::new(), value, location: loc })
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let loc = self.cur_loc();
        match self.cur().kind.clone() {
            TokenKind::Integer(v) => {
                self.advance();
                Ok(Expr::new(ExprKind::IntegerLiteral(v), loc))
            }
            TokenKind::BigInteger(big) => {
                self.advance();
                Ok(Expr::new(ExprKind::BigIntegerLiteral(big.to_decimal_string()), loc))
            }
            TokenKind::Real(v) => {
                self.advance();
                Ok(Expr::new(ExprKind::RealLiteral(v), loc))
            }
            TokenKind::Character(c) => {
                self.advance();
                Ok(Expr::new(ExprKind::CharacterLiteral(c), loc))
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(Expr::new(ExprKind::StringLiteral(s), loc))
            }
            TokenKind::Identifier(s) => {
                self.advance();
                Ok(Expr::new(ExprKind::Name(Name::Identifier(s)), loc))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::new(ExprKind::Name(Name::Identifier(Slice::EMPTY)), loc))
            }
            TokenKind::New => {
                self.advance();
                let type_mark = self.parse_expression()?;
                Ok(Expr::new(ExprKind::Allocator { type_mark: Box::new(type_mark), qualifier: None }, loc))
            }
            TokenKind::LParen => {
                // `(X)` parenthesized expression, OR an aggregate
                //. Parse the first item; if a `,`, `=>`,
                // `|`, or `with` appears before the closing `)`, treat the
                // whole thing as an aggregate, else it is a parenthesized
                // expression. A single positional element with no
                // separator is NOT an aggregate (Ada 83 requires at least
                // a named association or multiple positional elements).
                self.advance();
                let first_loc = self.cur_loc();
                let first = self.parse_expression()?;
                if self.check(&TokenKind::Comma) || self.check(&TokenKind::Arrow) {
                    let mut items = vec![self.finish_association(first, first_loc)?];
                    while self.eat(TokenKind::Comma) {
                        let iloc = self.cur_loc();
                        let save = self.pos;
                        match self.parse_one_association(iloc.clone()) {
                            Ok(a) => items.push(a),
                            Err(()) => {
                                self.pos = save;
                                let e = self.parse_expression()?;
                                items.push(self.finish_association(e, iloc)?);
                            }
                        }
                    }
                    self.expect(TokenKind::RParen, "')'")?;
                    Ok(Expr::new(ExprKind::Aggregate(items), loc))
                } else {
                    self.expect(TokenKind::RParen, "')'")?;
                    Ok(first)
                }
            }
            _ => {
                self.error(loc.clone(), "expected an expression");
                Err(())
            }
        }
    }

    /// After the *first* element of a parenthesized group has already been
    /// parsed as a plain expression, decide whether `=>`/`|` follow to turn
    /// it into a named association, otherwise it is positional.
    fn finish_association(&mut self, first: Expr, loc: Location) -> PResult<Association> {
        if self.check(&TokenKind::Arrow) || self.check(&TokenKind::Bar) {
            let mut choices = vec![Choice::Expr(first)];
            while self.eat(TokenKind::Bar) {
                choices.push(Choice::Expr(self.parse_expression()?));
            }
            self.expect(TokenKind::Arrow, "'=>'")?;
            let value = self.parse_expression()?;
            Ok(Association { choices, value, location: loc })
        } else {
            Ok(Association { choices: Vec::new(), value: first, location: loc })
        }
    }
}

fn build_pragma(name: &Slice, args: &[Slice]) -> Pragma {
    let n = name.as_str();
    if n.eq_ignore_ascii_case("Inline") {
        Pragma::Inline(args.to_vec())
    } else if n.eq_ignore_ascii_case("Pack") {
        Pragma::Pack(args.first().copied().unwrap_or(Slice::EMPTY))
    } else if n.eq_ignore_ascii_case("Suppress") {
        Pragma::Suppress { check: args.first().copied().unwrap_or(Slice::EMPTY), entity: args.get(1).copied() }
    } else if n.eq_ignore_ascii_case("Import") {
        Pragma::Import {
            convention: args.first().copied().unwrap_or(Slice::EMPTY),
            name: args.get(1).copied().unwrap_or(Slice::EMPTY),
            external: args.get(2).copied(),
        }
    } else if n.eq_ignore_ascii_case("Export") {
        Pragma::Export {
            convention: args.first().copied().unwrap_or(Slice::EMPTY),
            name: args.get(1).copied().unwrap_or(Slice::EMPTY),
            external: args.get(2).copied(),
        }
    } else if n.eq_ignore_ascii_case("Convention") {
        Pragma::Convention { convention: args.first().copied().unwrap_or(Slice::EMPTY), name: args.get(1).copied().unwrap_or(Slice::EMPTY) }
    } else if n.eq_ignore_ascii_case("Unreferenced") {
        Pragma::Unreferenced(args.to_vec())
    } else if n.eq_ignore_ascii_case("Pure") {
        Pragma::Pure
    } else if n.eq_ignore_ascii_case("Preelaborate") {
        Pragma::Preelaborate
    } else if n.eq_ignore_ascii_case("Elaborate") {
        Pragma::Elaborate(args.first().copied().unwrap_or(Slice::EMPTY))
    } else if n.eq_ignore_ascii_case("Elaborate_All") {
        Pragma::ElaborateAll(args.first().copied().unwrap_or(Slice::EMPTY))
    } else {
        Pragma::Unknown(*name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    fn parse(src: &str) -> (PResult<CompilationUnit>, Diagnostics) {
        let arena = Arena::new();
        let mut diags = Diagnostics::new();
        let tokens = crate::lexer::Lexer::new("t.ads", src.as_bytes(), &arena).tokenize(&mut diags);
        let mut parser = Parser::new(tokens, &mut diags);
        let unit = parser.parse_compilation_unit();
        drop(parser);
        (unit, diags)
    }

    #[test]
    fn parses_minimal_procedure() {
        let (unit, diags) = parse("procedure P is begin null; end P;");
        assert!(unit.is_ok(), "{:?}", diags.render());
        assert!(!diags.has_errors());
    }

    #[test]
    fn parses_object_decl_with_initializer() {
        let (unit, diags) = parse("procedure P is X : Integer := 2 + 3 * 4; begin null; end P;");
        assert!(unit.is_ok(), "{:?}", diags.render());
        let Ok(cu) = unit else { unreachable!() };
        if let Unit::Procedure(_, decls, _, _, _) = cu.unit {
            assert_eq!(decls.len(), 1);
        } else {
            panic!("expected procedure unit");
        }
    }

    #[test]
    fn end_name_mismatch_reports_error() {
        let (unit, diags) = parse("procedure P is begin null; end Q;");
        assert!(unit.is_ok());
        assert!(diags.has_errors());
    }

    #[test]
    fn array_aggregate_parses_as_aggregate() {
        let (unit, diags) = parse(
            "procedure Q is type A is array(1..3) of Integer; V : A := (10, 20, 30); begin null; end Q;",
        );
        assert!(unit.is_ok(), "{:?}", diags.render());
    }

    #[test]
    fn singleton_parenthesized_expr_is_not_an_aggregate() {
        let (unit, diags) = parse("procedure P is X : Integer := (5); begin null; end P;");
        assert!(unit.is_ok(), "{:?}", diags.render());
        let Ok(cu) = unit else { unreachable!() };
        if let Unit::Procedure(_, decls, _, _, _) = cu.unit {
            if let Decl::Object { init: Some(e), .. } = &decls[0] {
                assert!(!matches!(e.kind, ExprKind::Aggregate(_)));
            } else {
                panic!("expected object decl with initializer");
            }
        }
    }

    #[test]
    fn exponent_is_right_associative_unary_binds_tighter() {
        let (unit, diags) = parse("procedure P is X : Integer := 2 ** 3 ** 2; begin null; end P;");
        assert!(unit.is_ok(), "{:?}", diags.render());
    }

    #[test]
    fn exception_handler_parses() {
        let (unit, diags) = parse(
            "procedure E is MyErr : exception; begin raise MyErr; exception when MyErr => null; end E;",
        );
        assert!(unit.is_ok(), "{:?}", diags.render());
    }

    #[test]
    fn nested_subprogram_parses() {
        let (unit, diags) = parse(
            "procedure N is X : Integer; procedure Inner is begin X := X + 1; end; begin X := 42; Inner; end N;",
        );
        assert!(unit.is_ok(), "{:?}", diags.render());
    }
}
