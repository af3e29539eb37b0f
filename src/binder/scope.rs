// Scope stack - lambda frames visible while binding

use crate::expression::Expr;
use crate::types::Type;

/// One lambda frame: the element type it binds and an optional range variable name
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub ty: Type,
    pub alias: Option<String>,
}

/// Frames of the current parse, root (the compiled element) first.
///
/// `$`/`it` is the innermost frame, `^`/`parent` the one enclosing it and
/// `~`/`root` the outermost.
#[derive(Debug)]
pub struct ScopeStack {
    frames: Vec<Frame>,
}

impl ScopeStack {
    pub fn new(root: Type) -> Self {
        Self {
            frames: vec![Frame {
                ty: root,
                alias: None,
            }],
        }
    }

    pub fn push(&mut self, ty: Type, alias: Option<String>) {
        self.frames.push(Frame { ty, alias });
    }

    /// Pop a lambda frame; the root frame is never popped
    pub fn pop(&mut self) -> Option<Frame> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    fn reference(&self, depth: usize) -> Expr {
        Expr::parameter(depth, self.frames[depth].ty.clone())
    }

    pub fn current(&self) -> Expr {
        self.reference(self.frames.len() - 1)
    }

    pub fn current_type(&self) -> &Type {
        &self.frames[self.frames.len() - 1].ty
    }

    /// Frame enclosing the current one, if any
    pub fn parent(&self) -> Option<Expr> {
        (self.frames.len() >= 2).then(|| self.reference(self.frames.len() - 2))
    }

    pub fn root(&self) -> Expr {
        self.reference(0)
    }

    pub fn root_type(&self) -> &Type {
        &self.frames[0].ty
    }

    pub fn alias(&self, depth: usize) -> Option<&str> {
        self.frames.get(depth).and_then(|f| f.alias.as_deref())
    }

    /// Named range variable, innermost first
    pub fn resolve(&self, name: &str) -> Option<Expr> {
        self.frames
            .iter()
            .rposition(|f| f.alias.as_deref() == Some(name))
            .map(|depth| self.reference(depth))
    }
}
