use rustc_hash::{FxHashMap, FxHashSet};

use super::ident;
use crate::error::{TranspileError, TranspileResult};

/// Outcome of binding a name in the current block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// First binding in this block: emit a declaration.
    Declaration,
    /// Already declared here or in an enclosing block: emit a plain assignment.
    Reuse,
}

/// Names declared in one lexical block of the output.
///
/// Child blocks start from a copy of the parent; nothing declared in a child
/// is visible to the parent or to sibling blocks.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    declared: FxHashSet<String>,
    types: FxHashMap<String, String>,
    branch_local: FxHashSet<String>,
    renamed: FxHashMap<String, String>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        Self {
            declared: self.declared.clone(),
            types: self.types.clone(),
            branch_local: self.branch_local.clone(),
            renamed: self.renamed.clone(),
        }
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.declared.contains(name)
    }

    pub fn declare(&mut self, name: &str, ty: Option<String>) {
        self.declared.insert(name.to_string());
        self.branch_local.remove(name);
        if let Some(ty) = ty {
            self.types.insert(name.to_string(), ty);
        }
    }

    pub fn declare_or_reuse(&mut self, name: &str, ty: Option<String>) -> Binding {
        if self.is_declared(name) {
            tracing::trace!(name, "reusing binding");
            return Binding::Reuse;
        }
        tracing::trace!(name, "declaring binding");
        self.declare(name, ty);
        Binding::Declaration
    }

    /// True when a finished nested block declared `name` and this block has not.
    ///
    /// C# rejects a declaration whose block encloses another declaration of
    /// the same name, so such a binding needs its own identifier.
    pub fn is_branch_local(&self, name: &str) -> bool {
        self.branch_local.contains(name) && !self.declared.contains(name)
    }

    /// Emits `local` in place of `name` from here on.
    pub fn rename(&mut self, name: &str, local: String) {
        tracing::trace!(name, %local, "renaming local");
        self.renamed.insert(name.to_string(), local);
    }

    /// The C# identifier that `name` lowers to in this block.
    pub fn local(&self, name: &str) -> String {
        match self.renamed.get(name) {
            Some(local) => local.clone(),
            None => ident(name),
        }
    }

    pub fn type_of(&self, name: &str) -> Option<&str> {
        self.types.get(name).map(String::as_str)
    }

    /// Records names a finished child block bound that this block never declared.
    pub fn absorb_branch(&mut self, child: &Scope) {
        for name in child.declared.iter().chain(child.branch_local.iter()) {
            if !self.declared.contains(name) {
                self.branch_local.insert(name.clone());
            }
        }
    }

    /// Rejects reads of names that only some branches bound.
    pub fn check_read(&self, name: &str) -> TranspileResult<()> {
        if self.branch_local.contains(name) && !self.declared.contains(name) {
            return Err(TranspileError::ConditionalBinding {
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_binding_declares_then_reuses() {
        let mut scope = Scope::new();
        assert_eq!(scope.declare_or_reuse("x", None), Binding::Declaration);
        assert_eq!(scope.declare_or_reuse("x", None), Binding::Reuse);
    }

    #[test]
    fn child_declarations_stay_in_child() {
        let mut parent = Scope::new();
        parent.declare("outer", Some("long".to_string()));

        let mut child = parent.child();
        assert_eq!(child.declare_or_reuse("outer", None), Binding::Reuse);
        assert_eq!(child.declare_or_reuse("inner", None), Binding::Declaration);
        assert_eq!(child.type_of("outer"), Some("long"));

        let mut sibling = parent.child();
        assert_eq!(sibling.declare_or_reuse("inner", None), Binding::Declaration);
        assert!(!parent.is_declared("inner"));
    }

    #[test]
    fn branch_local_names_reject_reads_until_declared() {
        let mut parent = Scope::new();
        let mut branch = parent.child();
        branch.declare_or_reuse("y", None);
        parent.absorb_branch(&branch);

        assert_eq!(
            parent.check_read("y"),
            Err(TranspileError::ConditionalBinding {
                name: "y".to_string()
            })
        );
        assert_eq!(parent.declare_or_reuse("y", None), Binding::Declaration);
        assert_eq!(parent.check_read("y"), Ok(()));
    }

    #[test]
    fn nested_branch_locals_propagate_outward() {
        let mut outer = Scope::new();
        let mut middle = outer.child();
        let mut inner = middle.child();
        inner.declare("z", None);
        middle.absorb_branch(&inner);
        outer.absorb_branch(&middle);
        assert!(outer.check_read("z").is_err());
    }

    #[test]
    fn renamed_locals_follow_into_children() {
        let mut parent = Scope::new();
        let mut branch = parent.child();
        branch.declare_or_reuse("y", None);
        parent.absorb_branch(&branch);

        assert!(parent.is_branch_local("y"));
        parent.rename("y", "__y_1".to_string());
        assert_eq!(parent.declare_or_reuse("y", None), Binding::Declaration);
        assert!(!parent.is_branch_local("y"));
        assert_eq!(parent.local("y"), "__y_1");
        assert_eq!(parent.child().local("y"), "__y_1");
        assert_eq!(parent.local("string"), "@string");
    }
}
