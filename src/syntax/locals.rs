//! Local variable scopes for one highlight layer

use std::ops::Range;

use super::theme_table::Highlight;

#[derive(Debug, Clone)]
struct LocalDefinition {
    name: String,
    value_range: Range<usize>,
    /// Filled in once, when the defining node's highlight is computed
    highlight: Option<Highlight>,
}

#[derive(Debug, Clone)]
struct LocalScope {
    range: Range<usize>,
    inherits: bool,
    locals: Vec<LocalDefinition>,
}

/// Handle to a definition recorded in a [`ScopeStack`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DefinitionId {
    scope: usize,
    index: usize,
}

/// Stack of nested `local.scope` regions. The root scope covers the whole
/// document and is never popped.
#[derive(Debug, Clone)]
pub(crate) struct ScopeStack {
    scopes: Vec<LocalScope>,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            scopes: vec![LocalScope {
                range: 0..usize::MAX,
                inherits: true,
                locals: Vec::new(),
            }],
        }
    }

    /// Drop scopes that end before `position`
    pub fn pop_finished(&mut self, position: usize) {
        while self.scopes.len() > 1 {
            match self.scopes.last() {
                Some(scope) if position > scope.range.end => {
                    self.scopes.pop();
                }
                _ => break,
            }
        }
    }

    pub fn push_scope(&mut self, range: Range<usize>, inherits: bool) {
        self.scopes.push(LocalScope {
            range,
            inherits,
            locals: Vec::new(),
        });
    }

    /// Record a definition in the innermost scope
    pub fn define(&mut self, name: impl Into<String>, value_range: Range<usize>) -> DefinitionId {
        let scope = self.scopes.len() - 1;
        let locals = &mut self.scopes[scope].locals;
        locals.push(LocalDefinition {
            name: name.into(),
            value_range,
            highlight: None,
        });
        DefinitionId {
            scope,
            index: locals.len() - 1,
        }
    }

    /// Assign the definition's highlight unless one was already assigned
    pub fn resolve_definition(&mut self, id: DefinitionId, highlight: Option<Highlight>) {
        let definition = self
            .scopes
            .get_mut(id.scope)
            .and_then(|scope| scope.locals.get_mut(id.index));
        if let Some(definition) = definition {
            if definition.highlight.is_none() {
                definition.highlight = highlight;
            }
        }
    }

    /// Highlight of the nearest visible definition of `name` whose value ends
    /// at or before `reference_start`.
    ///
    /// Searches from the innermost scope outward and stops after the first
    /// scope that doesn't inherit from its parent. `None` when no definition
    /// is visible or the visible one has no highlight yet.
    pub fn resolve_reference(&self, name: &str, reference_start: usize) -> Option<Highlight> {
        for scope in self.scopes.iter().rev() {
            let definition = scope
                .locals
                .iter()
                .rev()
                .find(|def| def.name == name && reference_start >= def.value_range.end);
            if let Some(definition) = definition {
                return definition.highlight;
            }
            if !scope.inherits {
                break;
            }
        }
        None
    }
}
