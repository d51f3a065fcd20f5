//! Lexical scopes
//!
//! Scopes live in an arena owned by the interpreter and are addressed by
//! plain [`ScopeId`] handles, so function values can carry their captured
//! scope as a copyable index. A scope captured by a closure is pinned:
//! it (and, through the child counts, its whole ancestor chain) survives
//! until the interpreter is reset. Unpinned block scopes are recycled
//! through a free list when popped.

use crate::value::{Identifier, TypeValue, Value, ValueDictionary, ValueTag};

/// Handle to one scope in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId(u32);

impl ScopeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
struct ScopeSlot {
    parent: Option<ScopeId>,
    variables: ValueDictionary,
    types: ValueDictionary,
    /// Number of live child scopes.
    children: u32,
    /// Set when a function value captures this scope.
    pinned: bool,
    live: bool,
}

impl ScopeSlot {
    fn fresh(parent: Option<ScopeId>) -> Self {
        Self {
            parent,
            variables: ValueDictionary::new(),
            types: ValueDictionary::new(),
            children: 0,
            pinned: false,
            live: true,
        }
    }
}

/// Failure modes of [`ScopeArena::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetError {
    Undeclared,
    ConstViolation,
    TypeMismatch,
}

/// Arena of scopes for one interpreter.
#[derive(Debug, Default)]
pub struct ScopeArena {
    slots: Vec<ScopeSlot>,
    free: Vec<u32>,
}

impl ScopeArena {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Create a scope chained to `parent`.
    pub fn push(&mut self, parent: Option<ScopeId>) -> ScopeId {
        if let Some(parent_id) = parent {
            self.slots[parent_id.index()].children += 1;
        }
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = ScopeSlot::fresh(parent);
                ScopeId(index)
            }
            None => {
                self.slots.push(ScopeSlot::fresh(parent));
                ScopeId((self.slots.len() - 1) as u32)
            }
        }
    }

    /// Release a scope and return its parent. The slot is recycled only
    /// when nothing can still reach it.
    pub fn pop(&mut self, id: ScopeId) -> Option<ScopeId> {
        let parent = self.slots[id.index()].parent;
        let slot = &self.slots[id.index()];
        if slot.children == 0 && !slot.pinned {
            let recycled = &mut self.slots[id.index()];
            recycled.variables = ValueDictionary::new();
            recycled.types = ValueDictionary::new();
            recycled.live = false;
            self.free.push(id.0);
            if let Some(parent_id) = parent {
                self.slots[parent_id.index()].children -= 1;
            }
        }
        parent
    }

    /// The chain-sharing copy used for closures: a fresh child of `id`,
    /// pinned for the rest of the run.
    pub fn capture(&mut self, id: ScopeId) -> ScopeId {
        let captured = self.push(Some(id));
        self.pin(captured);
        captured
    }

    /// Pin a scope so it survives until [`ScopeArena::clear`].
    pub fn pin(&mut self, id: ScopeId) {
        self.slots[id.index()].pinned = true;
    }

    /// Drop every scope; outstanding ids become invalid.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }

    /// Number of live scopes (for the scope-balance invariant tests).
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.live).count()
    }

    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.slots[id.index()].parent
    }

    /// Declare `name` in exactly this scope; false if it already exists
    /// here.
    pub fn declare(&mut self, id: ScopeId, name: &Identifier, ty: TypeValue) -> bool {
        let key = Value::Identifier(name.clone());
        let slot = &mut self.slots[id.index()];
        if slot.variables.contains(&key) {
            return false;
        }
        slot.variables.set(key.clone(), Value::Null);
        slot.types.set(key, Value::Type(ty));
        true
    }

    /// Search the chain for a declaration of `name`.
    pub fn is_declared(&self, id: ScopeId, name: &Identifier) -> bool {
        self.find_scope(id, name).is_some()
    }

    fn find_scope(&self, id: ScopeId, name: &Identifier) -> Option<ScopeId> {
        let key = Value::Identifier(name.clone());
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if self.slots[current.index()].variables.contains(&key) {
                return Some(current);
            }
            cursor = self.slots[current.index()].parent;
        }
        None
    }

    /// Update an existing binding. The declared type is always enforced;
    /// `check_const` is false only for the initial definition right after
    /// declaration.
    pub fn set(
        &mut self,
        id: ScopeId,
        name: &Identifier,
        value: Value,
        check_const: bool,
    ) -> Result<(), SetError> {
        let Some(owner) = self.find_scope(id, name) else {
            return Err(SetError::Undeclared);
        };
        let key = Value::Identifier(name.clone());

        if let Value::Type(ty) = self.slots[owner.index()].types.get(&key) {
            if check_const && ty.constant {
                return Err(SetError::ConstViolation);
            }
            if !matches_type(&value, &ty) {
                return Err(SetError::TypeMismatch);
            }
        }

        self.slots[owner.index()].variables.set(key, value);
        Ok(())
    }

    /// Copy out the value bound to `name`.
    pub fn get(&self, id: ScopeId, name: &Identifier) -> Option<Value> {
        let owner = self.find_scope(id, name)?;
        let key = Value::Identifier(name.clone());
        Some(self.slots[owner.index()].variables.get(&key))
    }

    /// The declared type of `name`.
    pub fn get_type(&self, id: ScopeId, name: &Identifier) -> Option<TypeValue> {
        let owner = self.find_scope(id, name)?;
        let key = Value::Identifier(name.clone());
        match self.slots[owner.index()].types.get(&key) {
            Value::Type(ty) => Some(ty),
            _ => None,
        }
    }
}

/// Does `value` satisfy the declared type?
pub fn matches_type(value: &Value, ty: &TypeValue) -> bool {
    if ty.tag == ValueTag::Any {
        return true;
    }
    if value.tag() != ty.tag {
        return false;
    }
    match (value, ty.tag) {
        (Value::Array(array), ValueTag::Array) => match ty.subtypes.first() {
            Some(element_ty) => array.iter().all(|element| matches_type(element, element_ty)),
            None => true,
        },
        (Value::Dictionary(dict), ValueTag::Dictionary) => {
            match (ty.subtypes.first(), ty.subtypes.get(1)) {
                (Some(key_ty), Some(value_ty)) => dict
                    .iter()
                    .all(|(k, v)| matches_type(k, key_ty) && matches_type(v, value_ty)),
                _ => true,
            }
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Identifier {
        Identifier::new(name)
    }

    #[test]
    fn test_declare_and_get() {
        let mut arena = ScopeArena::new();
        let root = arena.push(None);
        assert!(arena.declare(root, &ident("x"), TypeValue::any()));
        assert!(arena
            .set(root, &ident("x"), Value::Integer(1), true)
            .is_ok());
        assert_eq!(arena.get(root, &ident("x")), Some(Value::Integer(1)));
    }

    #[test]
    fn test_double_declaration_fails() {
        let mut arena = ScopeArena::new();
        let root = arena.push(None);
        assert!(arena.declare(root, &ident("x"), TypeValue::any()));
        assert!(!arena.declare(root, &ident("x"), TypeValue::any()));
    }

    #[test]
    fn test_lookup_walks_ancestors_but_declares_locally() {
        let mut arena = ScopeArena::new();
        let root = arena.push(None);
        arena.declare(root, &ident("x"), TypeValue::any());
        arena
            .set(root, &ident("x"), Value::Integer(1), false)
            .expect("set");

        let inner = arena.push(Some(root));
        assert!(arena.is_declared(inner, &ident("x")));
        assert_eq!(arena.get(inner, &ident("x")), Some(Value::Integer(1)));

        // a shadowing declaration lands in the inner scope only
        assert!(arena.declare(inner, &ident("x"), TypeValue::any()));
        arena
            .set(inner, &ident("x"), Value::Integer(2), false)
            .expect("set");
        assert_eq!(arena.get(inner, &ident("x")), Some(Value::Integer(2)));
        assert_eq!(arena.get(root, &ident("x")), Some(Value::Integer(1)));
    }

    #[test]
    fn test_const_and_type_enforcement() {
        let mut arena = ScopeArena::new();
        let root = arena.push(None);

        arena.declare(root, &ident("n"), TypeValue::new(ValueTag::Integer, false));
        assert_eq!(
            arena.set(root, &ident("n"), Value::string("no"), true),
            Err(SetError::TypeMismatch)
        );
        assert!(arena.set(root, &ident("n"), Value::Integer(3), true).is_ok());

        arena.declare(root, &ident("k"), TypeValue::new(ValueTag::Integer, true));
        // initial definition skips the check, like declaration does
        assert!(arena.set(root, &ident("k"), Value::Integer(1), false).is_ok());
        assert_eq!(
            arena.set(root, &ident("k"), Value::Integer(2), true),
            Err(SetError::ConstViolation)
        );
    }

    #[test]
    fn test_undeclared_set_fails() {
        let mut arena = ScopeArena::new();
        let root = arena.push(None);
        assert_eq!(
            arena.set(root, &ident("ghost"), Value::Null, true),
            Err(SetError::Undeclared)
        );
    }

    #[test]
    fn test_pop_recycles_unpinned_scopes() {
        let mut arena = ScopeArena::new();
        let root = arena.push(None);
        let child = arena.push(Some(root));
        assert_eq!(arena.live_count(), 2);
        let back = arena.pop(child);
        assert_eq!(back, Some(root));
        assert_eq!(arena.live_count(), 1);

        // the slot is reused
        let again = arena.push(Some(root));
        assert_eq!(again, child);
    }

    #[test]
    fn test_captured_scopes_survive_pop() {
        let mut arena = ScopeArena::new();
        let root = arena.push(None);
        let block = arena.push(Some(root));
        let captured = arena.capture(block);
        arena.declare(captured, &ident("held"), TypeValue::any());
        arena
            .set(captured, &ident("held"), Value::Integer(5), false)
            .expect("set");

        // popping the block scope must not free it: the captured child
        // pins the chain
        arena.pop(block);
        assert_eq!(arena.get(captured, &ident("held")), Some(Value::Integer(5)));
        assert_eq!(arena.live_count(), 3);
    }

    #[test]
    fn test_element_type_checks() {
        let int_array = TypeValue::with_subtypes(
            ValueTag::Array,
            false,
            vec![TypeValue::new(ValueTag::Integer, false)],
        );
        let mut good = crate::value::ValueArray::new();
        good.push(Value::Integer(1));
        assert!(matches_type(&Value::Array(Box::new(good.clone())), &int_array));

        let mut bad = good;
        bad.push(Value::string("oops"));
        assert!(!matches_type(&Value::Array(Box::new(bad)), &int_array));
    }
}
