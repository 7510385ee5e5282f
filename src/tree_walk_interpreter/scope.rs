use rustc_hash::FxHashMap;

use super::{ExecutionErrorKind, Value};

/// Index of a scope record inside [`Scopes`]. Ids are never reused, so an id
/// outliving its scope can only ever report [`ExecutionErrorKind::DiscardedScope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

#[derive(Debug, Clone)]
struct Binding {
    value: Value,
    constant: bool,
}

#[derive(Debug, Clone, Default)]
struct ScopeRecord {
    bindings: FxHashMap<String, Binding>,
    parent: Option<ScopeId>,
}

/// Arena of scopes. Records point at their parent by index, so the chain
/// never needs shared ownership. Discarded records leave an empty slot.
#[derive(Debug, Clone)]
pub struct Scopes {
    records: Vec<Option<ScopeRecord>>,
}

impl Scopes {
    pub const ROOT: ScopeId = ScopeId(0);

    /// Creates the arena with a root scope holding the constants `null`,
    /// `true` and `false`.
    pub fn new() -> Self {
        let mut root = ScopeRecord::default();
        for (name, value) in [
            ("null", Value::Null),
            ("true", Value::Boolean(true)),
            ("false", Value::Boolean(false)),
        ] {
            root.bindings.insert(
                name.to_string(),
                Binding {
                    value,
                    constant: true,
                },
            );
        }

        Self {
            records: vec![Some(root)],
        }
    }

    pub fn push(&mut self, parent: ScopeId) -> ScopeId {
        self.records.push(Some(ScopeRecord {
            bindings: FxHashMap::default(),
            parent: Some(parent),
        }));
        ScopeId(self.records.len() - 1)
    }

    /// Drops `scope` along with every scope nested inside it. The root is
    /// never dropped.
    pub fn discard(&mut self, scope: ScopeId) {
        if scope == Self::ROOT || scope.0 >= self.records.len() {
            return;
        }
        self.records[scope.0] = None;

        // Children always come after their parent.
        for index in scope.0 + 1..self.records.len() {
            let orphaned = match &self.records[index] {
                Some(record) => record
                    .parent
                    .map_or(false, |parent| self.records[parent.0].is_none()),
                None => false,
            };
            if orphaned {
                self.records[index] = None;
            }
        }
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.record(scope).ok().and_then(|record| record.parent)
    }

    pub fn declare(
        &mut self,
        scope: ScopeId,
        name: String,
        value: Value,
        constant: bool,
    ) -> Result<(), ExecutionErrorKind> {
        let record = self.record_mut(scope)?;
        if record.bindings.contains_key(&name) {
            return Err(ExecutionErrorKind::DuplicateDeclaration(name));
        }
        record.bindings.insert(name, Binding { value, constant });
        Ok(())
    }

    /// Finds the nearest scope, starting at `scope`, that binds `name`.
    pub fn resolve_owner(
        &self,
        scope: ScopeId,
        name: &str,
    ) -> Result<ScopeId, ExecutionErrorKind> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let record = self.record(id)?;
            if record.bindings.contains_key(name) {
                return Ok(id);
            }
            current = record.parent;
        }
        Err(ExecutionErrorKind::UndeclaredVariable(name.to_string()))
    }

    pub fn get(&self, scope: ScopeId, name: &str) -> Result<Value, ExecutionErrorKind> {
        let owner = self.resolve_owner(scope, name)?;
        self.record(owner)?
            .bindings
            .get(name)
            .map(|binding| binding.value.clone())
            .ok_or_else(|| ExecutionErrorKind::UndeclaredVariable(name.to_string()))
    }

    pub fn assign(
        &mut self,
        scope: ScopeId,
        name: &str,
        value: Value,
    ) -> Result<(), ExecutionErrorKind> {
        let owner = self.resolve_owner(scope, name)?;
        let binding = self
            .record_mut(owner)?
            .bindings
            .get_mut(name)
            .ok_or_else(|| ExecutionErrorKind::UndeclaredVariable(name.to_string()))?;
        if binding.constant {
            return Err(ExecutionErrorKind::ConstAssignment(name.to_string()));
        }
        binding.value = value;
        Ok(())
    }

    fn record(&self, scope: ScopeId) -> Result<&ScopeRecord, ExecutionErrorKind> {
        self.records
            .get(scope.0)
            .and_then(Option::as_ref)
            .ok_or(ExecutionErrorKind::DiscardedScope)
    }

    fn record_mut(&mut self, scope: ScopeId) -> Result<&mut ScopeRecord, ExecutionErrorKind> {
        self.records
            .get_mut(scope.0)
            .and_then(Option::as_mut)
            .ok_or(ExecutionErrorKind::DiscardedScope)
    }
}

impl Default for Scopes {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_root_is_seeded() {
        let scopes = Scopes::new();
        assert_eq!(scopes.get(Scopes::ROOT, "null").unwrap(), Value::Null);
        assert_eq!(
            scopes.get(Scopes::ROOT, "true").unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            scopes.get(Scopes::ROOT, "false").unwrap(),
            Value::Boolean(false)
        );
    }

    #[test]
    fn test_seeded_literals_are_constant() {
        let mut scopes = Scopes::new();
        assert!(matches!(
            scopes.assign(Scopes::ROOT, "true", Value::Boolean(false)),
            Err(ExecutionErrorKind::ConstAssignment(name)) if name == "true"
        ));
    }

    #[test]
    fn test_declare_and_assign() {
        let mut scopes = Scopes::new();
        scopes
            .declare(Scopes::ROOT, "x".to_string(), Value::Number(1), false)
            .unwrap();
        scopes.assign(Scopes::ROOT, "x", Value::Number(2)).unwrap();
        assert_eq!(scopes.get(Scopes::ROOT, "x").unwrap(), Value::Number(2));
    }

    #[test]
    fn test_duplicate_declaration() {
        let mut scopes = Scopes::new();
        scopes
            .declare(Scopes::ROOT, "x".to_string(), Value::Number(1), false)
            .unwrap();
        assert!(matches!(
            scopes.declare(Scopes::ROOT, "x".to_string(), Value::Number(2), false),
            Err(ExecutionErrorKind::DuplicateDeclaration(name)) if name == "x"
        ));
    }

    #[test]
    fn test_undeclared() {
        let mut scopes = Scopes::new();
        assert!(matches!(
            scopes.get(Scopes::ROOT, "y"),
            Err(ExecutionErrorKind::UndeclaredVariable(_))
        ));
        assert!(matches!(
            scopes.assign(Scopes::ROOT, "y", Value::Null),
            Err(ExecutionErrorKind::UndeclaredVariable(_))
        ));
    }

    #[test]
    fn test_shadowing_in_child_scope() {
        let mut scopes = Scopes::new();
        scopes
            .declare(Scopes::ROOT, "x".to_string(), Value::Number(1), true)
            .unwrap();

        let child = scopes.push(Scopes::ROOT);
        assert_eq!(scopes.parent(child), Some(Scopes::ROOT));
        assert_eq!(scopes.resolve_owner(child, "x").unwrap(), Scopes::ROOT);

        scopes
            .declare(child, "x".to_string(), Value::Number(2), false)
            .unwrap();
        assert_eq!(scopes.resolve_owner(child, "x").unwrap(), child);

        // The shadowing binding is mutable even though the outer one is not.
        scopes.assign(child, "x", Value::Number(3)).unwrap();
        assert_eq!(scopes.get(child, "x").unwrap(), Value::Number(3));
        assert_eq!(scopes.get(Scopes::ROOT, "x").unwrap(), Value::Number(1));
    }

    #[test]
    fn test_assign_through_child_updates_owner() {
        let mut scopes = Scopes::new();
        scopes
            .declare(Scopes::ROOT, "x".to_string(), Value::Number(1), false)
            .unwrap();
        let child = scopes.push(Scopes::ROOT);
        let grandchild = scopes.push(child);

        scopes.assign(grandchild, "x", Value::Number(5)).unwrap();
        assert_eq!(scopes.get(Scopes::ROOT, "x").unwrap(), Value::Number(5));
    }

    #[test]
    fn test_const_in_outer_scope_blocks_assignment_from_child() {
        let mut scopes = Scopes::new();
        scopes
            .declare(Scopes::ROOT, "c".to_string(), Value::Number(1), true)
            .unwrap();
        let child = scopes.push(Scopes::ROOT);
        assert!(matches!(
            scopes.assign(child, "c", Value::Number(2)),
            Err(ExecutionErrorKind::ConstAssignment(_))
        ));
    }

    #[test]
    fn test_discard() {
        let mut scopes = Scopes::new();
        let child = scopes.push(Scopes::ROOT);
        scopes
            .declare(child, "tmp".to_string(), Value::Null, false)
            .unwrap();
        scopes.discard(child);
        assert!(matches!(
            scopes.declare(child, "tmp".to_string(), Value::Null, false),
            Err(ExecutionErrorKind::DiscardedScope)
        ));
        assert!(matches!(
            scopes.get(child, "tmp"),
            Err(ExecutionErrorKind::DiscardedScope)
        ));
        assert!(matches!(
            scopes.assign(child, "tmp", Value::Null),
            Err(ExecutionErrorKind::DiscardedScope)
        ));
        assert_eq!(scopes.parent(child), None);
        assert!(scopes.get(Scopes::ROOT, "null").is_ok());
    }

    #[test]
    fn test_discarded_id_is_not_reused() {
        let mut scopes = Scopes::new();
        let stale = scopes.push(Scopes::ROOT);
        scopes.discard(stale);

        let fresh = scopes.push(Scopes::ROOT);
        assert_ne!(stale, fresh);
        scopes
            .declare(fresh, "secret".to_string(), Value::Number(7), false)
            .unwrap();

        assert!(matches!(
            scopes.get(stale, "secret"),
            Err(ExecutionErrorKind::DiscardedScope)
        ));
        assert!(matches!(
            scopes.assign(stale, "secret", Value::Number(8)),
            Err(ExecutionErrorKind::DiscardedScope)
        ));
        assert_eq!(scopes.get(fresh, "secret").unwrap(), Value::Number(7));
    }

    #[test]
    fn test_discard_drops_nested_scopes_only() {
        let mut scopes = Scopes::new();
        let outer = scopes.push(Scopes::ROOT);
        let sibling = scopes.push(Scopes::ROOT);
        let inner = scopes.push(outer);
        scopes
            .declare(sibling, "kept".to_string(), Value::Number(1), false)
            .unwrap();

        scopes.discard(outer);

        assert!(matches!(
            scopes.resolve_owner(inner, "null"),
            Err(ExecutionErrorKind::DiscardedScope)
        ));
        assert_eq!(scopes.get(sibling, "kept").unwrap(), Value::Number(1));
    }

    #[test]
    fn test_root_survives_discard() {
        let mut scopes = Scopes::new();
        scopes.discard(Scopes::ROOT);
        assert_eq!(scopes.get(Scopes::ROOT, "true").unwrap(), Value::Boolean(true));
    }
}
