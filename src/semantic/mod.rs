//! Semantic analysis for WebQL.
//!
//! The analyzer runs three phases over the AST: symbol resolution (scope
//! construction and binding), type inference, and structural validation.
//! The output is an [`AnnotatedAst`]: the program plus the symbol table and
//! a per-expression type map.
//!
//! Scope discipline: SELECT, NAVIGATE, INSERT, UPDATE, and DELETE each push
//! a query scope; FOR pushes a loop scope; each IF branch pushes a branch
//! scope; subquery sources push a subquery scope; WITH pushes a CTE scope
//! and registers each CTE name there. Pops are balanced via scope guards on
//! every exit path.

pub mod symbol_table;
pub mod types;
pub mod validator;

use crate::ast::statement::{SelectSource, Statement};
use crate::ast::{DataType, Program, SelectField};
use crate::diag::{self, Diag};
pub use symbol_table::{Scope, ScopeGuard, ScopeId, ScopeKind, Symbol, SymbolKind, SymbolTable};
pub use types::{builtin_return_type, TypeChecker, TypeTable, NON_DETERMINISTIC_BUILTINS};
pub use validator::{Validator, ValidatorConfig};

/// Configuration for semantic analysis.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// When true, unresolved identifiers are typed UNKNOWN instead of
    /// erroring; they may resolve to DOM fields at runtime.
    pub allow_undefined_variables: bool,
    /// Maximum statement nesting depth.
    pub max_nesting_depth: usize,
    /// URL schemes accepted by the validator.
    pub allowed_schemes: Vec<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            allow_undefined_variables: true,
            max_nesting_depth: 10,
            allowed_schemes: ValidatorConfig::default().allowed_schemes,
        }
    }
}

/// The AST enriched with semantic information.
#[derive(Debug, Clone)]
pub struct AnnotatedAst {
    /// The analyzed program.
    pub program: Program,
    /// Symbol table with all scopes produced during analysis.
    pub symbols: SymbolTable,
    /// Inferred type for every expression node.
    pub types: TypeTable,
}

/// Semantic analyzer orchestrating symbols, types, and validation.
pub struct SemanticAnalyzer {
    config: AnalyzerConfig,
}

impl SemanticAnalyzer {
    /// Creates an analyzer with default configuration.
    pub fn new() -> Self {
        Self::with_config(AnalyzerConfig::default())
    }

    /// Creates an analyzer with the given configuration.
    pub fn with_config(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Analyzes a program, producing an annotated AST or diagnostics.
    pub fn analyze(&self, program: Program) -> Result<AnnotatedAst, Vec<Diag>> {
        let mut symbols = SymbolTable::new();
        let mut checker = TypeChecker::new(self.config.allow_undefined_variables);
        let mut diagnostics = Vec::new();

        for statement in &program.statements {
            if let Err(fatal) = self.resolve_statement(statement, &mut symbols, &mut checker) {
                diagnostics.push(*fatal);
                break;
            }
        }

        let (types, type_diagnostics) = checker.finish();
        diagnostics.extend(type_diagnostics);

        let validator = Validator::new(ValidatorConfig {
            allowed_schemes: self.config.allowed_schemes.clone(),
        });
        diagnostics.extend(validator.validate_program(&program));

        if diag::has_errors(&diagnostics) {
            return Err(diagnostics);
        }

        Ok(AnnotatedAst {
            program,
            symbols,
            types,
        })
    }

    /// Resolves one statement: pushes its scope, binds the names it defines,
    /// and infers types of its expressions. Returns a fatal diagnostic when
    /// the nesting bound is exceeded.
    fn resolve_statement(
        &self,
        statement: &Statement,
        symbols: &mut SymbolTable,
        checker: &mut TypeChecker,
    ) -> Result<(), Box<Diag>> {
        let guard = ScopeGuard::new(symbols);
        let result = self.resolve_statement_inner(statement, symbols, checker);
        guard.restore(symbols);
        result
    }

    fn resolve_statement_inner(
        &self,
        statement: &Statement,
        symbols: &mut SymbolTable,
        checker: &mut TypeChecker,
    ) -> Result<(), Box<Diag>> {
        match statement {
            Statement::Select(select) => {
                // Resolve the source first so subquery output fields are
                // visible to the outer projection and WHERE clause.
                let mut source_fields: Vec<(smol_str::SmolStr, DataType)> = Vec::new();
                match &select.source {
                    SelectSource::Subquery(subquery, _) => {
                        self.enter_scope(ScopeKind::Subquery, statement, symbols)?;
                        self.resolve_statement_inner(subquery, symbols, checker)?;
                        if let Statement::Select(inner) = subquery.as_ref() {
                            for field in &inner.fields {
                                if !field.is_wildcard() {
                                    let data_type = checker.infer(&field.expr, symbols);
                                    source_fields.push((field.output_name().clone(), data_type));
                                }
                            }
                        }
                        symbols.pop_scope();
                    }
                    SelectSource::Url(_, _) | SelectSource::Variable(_, _) => {}
                }

                self.enter_scope(ScopeKind::Query, statement, symbols)?;
                for (name, data_type) in source_fields {
                    symbols.define(name, SymbolKind::Field, data_type, true, select.span.clone());
                }
                self.define_fields(&select.fields, symbols, checker);
                if let Some(where_clause) = &select.where_clause {
                    checker.infer(where_clause, symbols);
                }
                symbols.pop_scope();
                Ok(())
            }
            Statement::Navigate(navigate) => {
                self.enter_scope(ScopeKind::Query, statement, symbols)?;
                checker.infer(&navigate.url, symbols);
                self.define_fields(&navigate.capture, symbols, checker);
                symbols.pop_scope();
                Ok(())
            }
            Statement::Set(set) => {
                let data_type = checker.infer(&set.value, symbols);
                symbols.define(
                    set.variable_name(),
                    SymbolKind::Variable,
                    data_type,
                    data_type == DataType::Null,
                    set.span.clone(),
                );
                Ok(())
            }
            Statement::Show(_) => Ok(()),
            Statement::For(for_loop) => {
                checker.infer(&for_loop.iterable, symbols);
                self.enter_scope(ScopeKind::ForLoop, statement, symbols)?;
                symbols.define(
                    for_loop.variable.clone(),
                    SymbolKind::Variable,
                    DataType::Unknown,
                    false,
                    for_loop.span.clone(),
                );
                for body_statement in &for_loop.body {
                    self.resolve_statement_inner(body_statement, symbols, checker)?;
                }
                symbols.pop_scope();
                Ok(())
            }
            Statement::If(branch) => {
                checker.infer(&branch.condition, symbols);
                self.enter_scope(ScopeKind::IfBranch, statement, symbols)?;
                for then_statement in &branch.then_branch {
                    self.resolve_statement_inner(then_statement, symbols, checker)?;
                }
                symbols.pop_scope();
                if !branch.else_branch.is_empty() {
                    self.enter_scope(ScopeKind::IfBranch, statement, symbols)?;
                    for else_statement in &branch.else_branch {
                        self.resolve_statement_inner(else_statement, symbols, checker)?;
                    }
                    symbols.pop_scope();
                }
                Ok(())
            }
            Statement::Insert(insert) => {
                self.enter_scope(ScopeKind::Query, statement, symbols)?;
                checker.infer(&insert.target, symbols);
                for value in &insert.values {
                    checker.infer(value, symbols);
                }
                symbols.pop_scope();
                Ok(())
            }
            Statement::Update(update) => {
                self.enter_scope(ScopeKind::Query, statement, symbols)?;
                checker.infer(&update.target, symbols);
                for (_, value) in &update.assignments {
                    checker.infer(value, symbols);
                }
                if let Some(where_clause) = &update.where_clause {
                    checker.infer(where_clause, symbols);
                }
                symbols.pop_scope();
                Ok(())
            }
            Statement::Delete(delete) => {
                self.enter_scope(ScopeKind::Query, statement, symbols)?;
                checker.infer(&delete.target, symbols);
                if let Some(where_clause) = &delete.where_clause {
                    checker.infer(where_clause, symbols);
                }
                symbols.pop_scope();
                Ok(())
            }
            Statement::With(with) => {
                self.enter_scope(ScopeKind::Cte, statement, symbols)?;
                for cte in &with.ctes {
                    self.resolve_statement_inner(&cte.statement, symbols, checker)?;
                    symbols.define(
                        cte.name.clone(),
                        SymbolKind::Cte,
                        DataType::Array,
                        false,
                        cte.span.clone(),
                    );
                }
                self.resolve_statement_inner(&with.body, symbols, checker)?;
                symbols.pop_scope();
                Ok(())
            }
            Statement::Empty(_) => Ok(()),
        }
    }

    fn define_fields(
        &self,
        fields: &[SelectField],
        symbols: &mut SymbolTable,
        checker: &mut TypeChecker,
    ) {
        for field in fields {
            let data_type = checker.infer(&field.expr, symbols);
            if !field.is_wildcard() {
                symbols.define(
                    field.output_name().clone(),
                    SymbolKind::Field,
                    data_type,
                    true,
                    field.span.clone(),
                );
            }
        }
    }

    fn enter_scope(
        &self,
        kind: ScopeKind,
        statement: &Statement,
        symbols: &mut SymbolTable,
    ) -> Result<(), Box<Diag>> {
        symbols.push_scope(kind);
        if symbols.depth() > self.config.max_nesting_depth {
            return Err(Box::new(
                Diag::semantic(format!(
                    "statement nesting exceeds the maximum depth of {}",
                    self.config.max_nesting_depth
                ))
                .at(statement.span(), "nested too deeply")
                .rule("nesting_depth"),
            ));
        }
        Ok(())
    }
}

impl Default for SemanticAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
