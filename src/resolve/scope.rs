//! Symbol tables for index spaces and the label stack for one function body.

use crate::ast::{Id, Index};
use crate::error::Diagnostic;
use crate::wat::Span;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

/// Names bound in one index space, numbered in declaration order.
#[derive(Debug)]
pub struct SymbolTable {
    /// What the space holds, for messages: "function", "type", ...
    space: &'static str,
    names: HashMap<Id, u32>,
    len: u32,
}

impl SymbolTable {
    pub fn new(space: &'static str) -> Self {
        Self {
            space,
            names: HashMap::new(),
            len: 0,
        }
    }

    /// Assign the next index, binding `id` to it if given.
    pub fn push(&mut self, id: Option<&Id>, span: Span) -> Result<u32, Diagnostic> {
        let index = self.len;
        if let Some(id) = id {
            if self.names.insert(id.clone(), index).is_some() {
                return Err(Diagnostic::duplicate(
                    format!("duplicate {} {id}", self.space),
                    span,
                ));
            }
        }
        self.len += 1;
        Ok(index)
    }

    /// Number of entities declared, named or not.
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, id: &Id) -> Option<u32> {
        self.names.get(id).copied()
    }

    /// Replace a symbolic reference with its number. Numeric references are
    /// returned unchanged; range checks belong to validation.
    pub fn resolve(&self, index: &Index) -> Result<Index, Diagnostic> {
        match index {
            Index::Num(..) => Ok(index.clone()),
            Index::Id(id, span) => match self.get(id) {
                Some(n) => Ok(Index::Num(n, *span)),
                None => Err(Diagnostic::unresolved(format!("unknown {} {id}", self.space), *span)),
            },
        }
    }
}

/// Enclosing `block`, `loop` and `if` labels, innermost last.
///
/// The function body itself is the outermost entry. Scopes are entered with
/// [`LabelStack::enter`] and left when the returned guard drops, so an early
/// `?` return cannot leave a stale label behind.
#[derive(Debug)]
pub struct LabelStack {
    labels: Vec<Option<Id>>,
}

impl LabelStack {
    /// A stack holding only the function's own label.
    pub fn for_function() -> Self {
        Self { labels: vec![None] }
    }

    /// A stack with no labels at all, for constant expressions.
    pub fn empty() -> Self {
        Self { labels: Vec::new() }
    }

    pub fn depth(&self) -> usize {
        self.labels.len()
    }

    /// A scope that owns every label pushed through it.
    pub fn scope(&mut self) -> LabelScope<'_> {
        let base = self.labels.len();
        LabelScope { stack: self, base }
    }

    pub fn enter(&mut self, label: Option<Id>) -> LabelScope<'_> {
        let mut scope = self.scope();
        scope.push(label);
        scope
    }

    /// Turn a label reference into a relative depth.
    ///
    /// Names resolve to the innermost match, so an inner label shadows an
    /// outer one with the same name.
    pub fn resolve(&self, index: &Index) -> Result<Index, Diagnostic> {
        match index {
            Index::Num(depth, span) => {
                if (*depth as usize) < self.labels.len() {
                    Ok(index.clone())
                } else {
                    Err(Diagnostic::invalid_label(
                        format!("label depth {depth} exceeds the {} enclosing blocks", self.labels.len()),
                        *span,
                    ))
                }
            }
            Index::Id(id, span) => {
                let position = self
                    .labels
                    .iter()
                    .rev()
                    .position(|label| label.as_ref() == Some(id))
                    .ok_or_else(|| Diagnostic::invalid_label(format!("unknown label {id}"), *span))?;
                Ok(Index::Num(position as u32, *span))
            }
        }
    }
}

/// Labels entered since the scope was opened. All of them are popped when
/// the scope drops.
pub struct LabelScope<'s> {
    stack: &'s mut LabelStack,
    base: usize,
}

impl LabelScope<'_> {
    pub fn push(&mut self, label: Option<Id>) {
        self.stack.labels.push(label);
    }

    /// Leave the innermost label of this scope. Labels from outside the
    /// scope are never popped.
    pub fn pop(&mut self) {
        if self.stack.labels.len() > self.base {
            self.stack.labels.pop();
        }
    }
}

impl Deref for LabelScope<'_> {
    type Target = LabelStack;

    fn deref(&self) -> &LabelStack {
        self.stack
    }
}

impl DerefMut for LabelScope<'_> {
    fn deref_mut(&mut self) -> &mut LabelStack {
        self.stack
    }
}

impl Drop for LabelScope<'_> {
    fn drop(&mut self) {
        self.stack.labels.truncate(self.base);
    }
}
