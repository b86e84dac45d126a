use std::cell::{RefCell, RefMut};
use std::fmt;

use rustc_hash::FxHashMap;

use crate::ast::{Expression, FunctionDefinition};
use crate::config::Settings;
use crate::model::AchievementScriptContext;
use crate::token::Span;

/// State shared by every scope of one script run.
#[derive(Debug, Default)]
pub struct Runtime {
    settings: Settings,
    output: RefCell<AchievementScriptContext>,
}

impl Runtime {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            output: RefCell::new(AchievementScriptContext::default()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Borrows the output sink. Callers must not hold the borrow across
    /// evaluation.
    pub(crate) fn output(&self) -> RefMut<'_, AchievementScriptContext> {
        self.output.borrow_mut()
    }

    pub fn into_output(self) -> AchievementScriptContext {
        self.output.into_inner()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScopeContext {
    Global,
    FunctionCall { name: String, span: Span },
    Iteration { variable: String },
    /// Resolving the bound value of `name`.
    Resolving { name: String },
}

impl fmt::Display for ScopeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeContext::Global => f.write_str("global scope"),
            ScopeContext::FunctionCall { name, span } => {
                write!(f, "{name} (called at line {}, column {})", span.line, span.column)
            }
            ScopeContext::Iteration { variable } => write!(f, "iteration over {variable}"),
            ScopeContext::Resolving { name } => write!(f, "resolving {name}"),
        }
    }
}

/// One level of the environment chain. Children borrow their parent, so a
/// scope never outlives the frame that created it.
pub struct InterpreterScope<'a> {
    variables: FxHashMap<String, Expression>,
    functions: FxHashMap<String, FunctionDefinition>,
    parent: Option<&'a InterpreterScope<'a>>,
    context: ScopeContext,
    depth: usize,
    runtime: &'a Runtime,
}

impl<'a> InterpreterScope<'a> {
    pub fn global(runtime: &'a Runtime) -> Self {
        Self {
            variables: FxHashMap::default(),
            functions: FxHashMap::default(),
            parent: None,
            context: ScopeContext::Global,
            depth: 0,
            runtime,
        }
    }

    pub fn child(parent: &'a InterpreterScope<'a>, context: ScopeContext) -> Self {
        Self {
            variables: FxHashMap::default(),
            functions: FxHashMap::default(),
            parent: Some(parent),
            context,
            depth: parent.depth,
            runtime: parent.runtime,
        }
    }

    /// Scope for a user function body: a child of the global scope, one
    /// level deeper than the caller.
    pub fn function_call<'s>(&'s self, name: &str, span: Span) -> InterpreterScope<'s> {
        InterpreterScope {
            variables: FxHashMap::default(),
            functions: FxHashMap::default(),
            parent: Some(self.global_scope()),
            context: ScopeContext::FunctionCall {
                name: name.to_string(),
                span,
            },
            depth: self.depth + 1,
            runtime: self.runtime,
        }
    }

    pub fn global_scope(&self) -> &InterpreterScope<'a> {
        let mut scope = self;
        while let Some(parent) = scope.parent {
            scope = parent;
        }
        scope
    }

    pub fn get_variable(&self, name: &str) -> Option<&Expression> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(value) = current.variables.get(name) {
                return Some(value);
            }
            scope = current.parent;
        }
        None
    }

    pub fn assign_variable(&mut self, name: impl Into<String>, value: Expression) {
        self.variables.insert(name.into(), value);
    }

    pub fn remove_local(&mut self, name: &str) -> Option<Expression> {
        self.variables.remove(name)
    }

    pub fn get_function(&self, name: &str) -> Option<&FunctionDefinition> {
        self.global_scope().functions.get(name)
    }

    pub fn define_function(&mut self, definition: FunctionDefinition) {
        self.functions.insert(definition.name.clone(), definition);
    }

    /// Whether `name` is already being resolved somewhere up the chain.
    pub fn is_resolving(&self, name: &str) -> bool {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if matches!(&current.context, ScopeContext::Resolving { name: resolving } if resolving == name)
            {
                return true;
            }
            scope = current.parent;
        }
        false
    }

    pub fn context(&self) -> &ScopeContext {
        &self.context
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn runtime(&self) -> &'a Runtime {
        self.runtime
    }
}
