//! Single-inheritance type registry with DFS interval stamping.
//!
//! Every registered type gets an `order` from a pre-order walk of the
//! inheritance forest plus the `[min, max]` range of orders covered by its
//! subtree, so a subtype query is two integer comparisons. Intervals are
//! rebuilt from scratch after each registration; registration happens once
//! per class at program start, queries happen constantly.
//!
//! The emitted C# runtime carries the same algorithm; ids handed out here
//! match the ids the generated program will see when it registers classes in
//! declaration order.

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::FxHashMap;
use thiserror::Error;

pub type TypeId = i64;

pub const TID_NONE: TypeId = 0;
pub const TID_BOOL: TypeId = 1;
pub const TID_INT: TypeId = 2;
pub const TID_FLOAT: TypeId = 3;
pub const TID_STR: TypeId = 4;
pub const TID_LIST: TypeId = 5;
pub const TID_DICT: TypeId = 6;
pub const TID_SET: TypeId = 7;
pub const TID_OBJECT: TypeId = 8;
pub const FIRST_USER_TYPE_ID: TypeId = 1000;

/// Built-in ids with their base, in seeding order.
const BUILTIN_TYPES: [(TypeId, Option<TypeId>); 9] = [
    (TID_NONE, None),
    (TID_OBJECT, None),
    (TID_INT, Some(TID_OBJECT)),
    (TID_BOOL, Some(TID_INT)),
    (TID_FLOAT, Some(TID_OBJECT)),
    (TID_STR, Some(TID_OBJECT)),
    (TID_LIST, Some(TID_OBJECT)),
    (TID_DICT, Some(TID_OBJECT)),
    (TID_SET, Some(TID_OBJECT)),
];

/// Maps a Python built-in type name to its lattice id.
pub fn builtin_type_id(name: &str) -> Option<TypeId> {
    let id = match name {
        "None" | "NoneType" => TID_NONE,
        "bool" => TID_BOOL,
        "int" => TID_INT,
        "float" => TID_FLOAT,
        "str" => TID_STR,
        "list" => TID_LIST,
        "dict" => TID_DICT,
        "set" => TID_SET,
        "object" => TID_OBJECT,
        _ => return None,
    };
    Some(id)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LatticeError {
    #[error("unknown base type_id {base}")]
    UnknownBaseType { base: TypeId },
    #[error("type_id {id} is already registered with base {existing:?}, not {requested:?}")]
    ConflictingBase {
        id: TypeId,
        existing: Option<TypeId>,
        requested: Option<TypeId>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeInterval {
    pub order: u32,
    pub min: u32,
    pub max: u32,
}

#[derive(Debug, Clone, Default)]
struct TypeNode {
    base: Option<TypeId>,
    children: BTreeSet<TypeId>,
}

/// Values as the lattice sees them; user objects carry their type tag.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<RuntimeValue>),
    Dict(Vec<(RuntimeValue, RuntimeValue)>),
    Set(Vec<RuntimeValue>),
    Object { type_id: TypeId },
}

#[derive(Debug, Clone)]
pub struct TypeLattice {
    nodes: BTreeMap<TypeId, TypeNode>,
    intervals: FxHashMap<TypeId, TypeInterval>,
    next_user_id: TypeId,
}

impl Default for TypeLattice {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeLattice {
    /// Creates a lattice seeded with the built-in types.
    pub fn new() -> Self {
        let mut lattice = Self {
            nodes: BTreeMap::new(),
            intervals: FxHashMap::default(),
            next_user_id: FIRST_USER_TYPE_ID,
        };
        for (id, base) in BUILTIN_TYPES {
            lattice.insert_node(id, base);
        }
        lattice.recompute();
        lattice
    }

    /// Registers a new type under `base` (default `object`) and returns its id.
    pub fn register(&mut self, base: Option<TypeId>) -> Result<TypeId, LatticeError> {
        let base = base.unwrap_or(TID_OBJECT);
        if !self.nodes.contains_key(&base) {
            return Err(LatticeError::UnknownBaseType { base });
        }
        let mut id = self.next_user_id;
        while self.nodes.contains_key(&id) {
            id += 1;
        }
        self.next_user_id = id + 1;
        self.insert_node(id, Some(base));
        self.recompute();
        tracing::debug!(id, base, "registered type");
        Ok(id)
    }

    /// Registers a caller-chosen id. Re-registering with the same base is a no-op.
    pub fn register_with_id(
        &mut self,
        id: TypeId,
        base: Option<TypeId>,
    ) -> Result<(), LatticeError> {
        if let Some(existing) = self.nodes.get(&id) {
            if existing.base == base {
                return Ok(());
            }
            return Err(LatticeError::ConflictingBase {
                id,
                existing: existing.base,
                requested: base,
            });
        }
        if let Some(base) = base
            && !self.nodes.contains_key(&base)
        {
            return Err(LatticeError::UnknownBaseType { base });
        }
        if id >= self.next_user_id {
            self.next_user_id = id + 1;
        }
        self.insert_node(id, base);
        self.recompute();
        Ok(())
    }

    pub fn contains(&self, id: TypeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn base_of(&self, id: TypeId) -> Option<TypeId> {
        self.nodes.get(&id).and_then(|node| node.base)
    }

    pub fn interval(&self, id: TypeId) -> Option<TypeInterval> {
        self.intervals.get(&id).copied()
    }

    /// `true` when `actual` equals `expected` or descends from it. Unknown ids answer `false`.
    pub fn is_subtype(&self, actual: TypeId, expected: TypeId) -> bool {
        let (Some(actual), Some(expected)) = (self.interval(actual), self.interval(expected))
        else {
            return false;
        };
        expected.min <= actual.order && actual.order <= expected.max
    }

    pub fn issubclass(&self, actual: TypeId, expected: TypeId) -> bool {
        self.is_subtype(actual, expected)
    }

    /// Checks built-ins structurally, in the order bool, int, float, str, list, dict, set.
    pub fn runtime_type_id(&self, value: &RuntimeValue) -> TypeId {
        match value {
            RuntimeValue::None => TID_NONE,
            RuntimeValue::Bool(_) => TID_BOOL,
            RuntimeValue::Int(_) => TID_INT,
            RuntimeValue::Float(_) => TID_FLOAT,
            RuntimeValue::Str(_) => TID_STR,
            RuntimeValue::List(_) => TID_LIST,
            RuntimeValue::Dict(_) => TID_DICT,
            RuntimeValue::Set(_) => TID_SET,
            RuntimeValue::Object { type_id } if self.contains(*type_id) => *type_id,
            RuntimeValue::Object { .. } => TID_OBJECT,
        }
    }

    pub fn isinstance(&self, value: &RuntimeValue, expected: TypeId) -> bool {
        self.is_subtype(self.runtime_type_id(value), expected)
    }

    fn insert_node(&mut self, id: TypeId, base: Option<TypeId>) {
        self.nodes.insert(
            id,
            TypeNode {
                base,
                children: BTreeSet::new(),
            },
        );
        if let Some(base) = base
            && let Some(parent) = self.nodes.get_mut(&base)
        {
            parent.children.insert(id);
        }
    }

    fn recompute(&mut self) {
        self.intervals.clear();
        let mut counter = 0u32;
        let roots = self
            .nodes
            .iter()
            .filter(|(_, node)| node.base.is_none_or(|base| !self.nodes.contains_key(&base)))
            .map(|(id, _)| *id)
            .collect::<Vec<_>>();
        for root in roots {
            stamp(&self.nodes, &mut self.intervals, root, &mut counter);
        }
    }
}

fn stamp(
    nodes: &BTreeMap<TypeId, TypeNode>,
    intervals: &mut FxHashMap<TypeId, TypeInterval>,
    id: TypeId,
    counter: &mut u32,
) {
    if intervals.contains_key(&id) {
        return;
    }
    let order = *counter;
    *counter += 1;
    intervals.insert(
        id,
        TypeInterval {
            order,
            min: order,
            max: order,
        },
    );
    if let Some(node) = nodes.get(&id) {
        for child in &node.children {
            stamp(nodes, intervals, *child, counter);
        }
    }
    let max = *counter - 1;
    if let Some(interval) = intervals.get_mut(&id) {
        interval.max = max;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_builtin_tree() {
        let lattice = TypeLattice::new();
        assert!(lattice.is_subtype(TID_BOOL, TID_INT));
        assert!(lattice.is_subtype(TID_BOOL, TID_OBJECT));
        assert!(lattice.is_subtype(TID_STR, TID_OBJECT));
        assert!(!lattice.is_subtype(TID_INT, TID_BOOL));
        assert!(!lattice.is_subtype(TID_NONE, TID_OBJECT));
        assert!(!lattice.is_subtype(TID_FLOAT, TID_INT));
        assert_eq!(lattice.base_of(TID_BOOL), Some(TID_INT));
        assert_eq!(lattice.base_of(TID_NONE), None);
    }

    #[test]
    fn builtin_intervals_follow_sorted_dfs() {
        let lattice = TypeLattice::new();
        // Roots in id order: none (0) then object (8).
        assert_eq!(
            lattice.interval(TID_NONE),
            Some(TypeInterval {
                order: 0,
                min: 0,
                max: 0
            })
        );
        assert_eq!(
            lattice.interval(TID_OBJECT),
            Some(TypeInterval {
                order: 1,
                min: 1,
                max: 8
            })
        );
        // object's children sorted: int(2) {bool(1)}, float, str, list, dict, set.
        assert_eq!(lattice.interval(TID_INT).map(|i| i.order), Some(2));
        assert_eq!(lattice.interval(TID_BOOL).map(|i| i.order), Some(3));
        assert_eq!(lattice.interval(TID_SET).map(|i| i.order), Some(8));
    }

    #[test]
    fn registers_user_types_from_first_user_id() {
        let mut lattice = TypeLattice::new();
        let animal = lattice.register(None).expect("register animal");
        let dog = lattice.register(Some(animal)).expect("register dog");
        let cat = lattice.register(Some(animal)).expect("register cat");
        assert_eq!((animal, dog, cat), (1000, 1001, 1002));

        assert!(lattice.is_subtype(dog, animal));
        assert!(lattice.is_subtype(dog, dog));
        assert!(lattice.is_subtype(animal, TID_OBJECT));
        assert!(!lattice.is_subtype(animal, dog));
        assert!(!lattice.is_subtype(dog, cat));
        assert!(!lattice.is_subtype(cat, dog));
    }

    #[test]
    fn intervals_nest_for_every_descendant() {
        let mut lattice = TypeLattice::new();
        let a = lattice.register(None).expect("a");
        let b = lattice.register(Some(a)).expect("b");
        let c = lattice.register(Some(b)).expect("c");
        let d = lattice.register(Some(a)).expect("d");
        let ids = [TID_NONE, TID_OBJECT, TID_INT, TID_BOOL, a, b, c, d];
        for &ancestor in &ids {
            for &candidate in &ids {
                let interval = lattice.interval(ancestor).expect("interval");
                let order = lattice.interval(candidate).expect("interval").order;
                let inside = interval.min <= order && order <= interval.max;
                let mut cursor = Some(candidate);
                let mut descends = false;
                while let Some(id) = cursor {
                    if id == ancestor {
                        descends = true;
                        break;
                    }
                    cursor = lattice.base_of(id);
                }
                assert_eq!(inside, descends, "ancestor {ancestor} candidate {candidate}");
            }
        }
    }

    #[test]
    fn later_registrations_keep_existing_answers() {
        let mut lattice = TypeLattice::new();
        let a = lattice.register(None).expect("a");
        let b = lattice.register(Some(a)).expect("b");
        let before = [
            lattice.is_subtype(b, a),
            lattice.is_subtype(a, b),
            lattice.is_subtype(b, TID_INT),
        ];
        let c = lattice.register(Some(a)).expect("c");
        lattice.register(Some(c)).expect("d");
        let after = [
            lattice.is_subtype(b, a),
            lattice.is_subtype(a, b),
            lattice.is_subtype(b, TID_INT),
        ];
        assert_eq!(before, after);
    }

    #[test]
    fn unknown_ids_are_never_subtypes() {
        let lattice = TypeLattice::new();
        assert!(!lattice.is_subtype(4242, TID_OBJECT));
        assert!(!lattice.is_subtype(TID_INT, 4242));
        assert!(!lattice.is_subtype(4242, 4242));
    }

    #[test]
    fn rejects_unknown_base() {
        let mut lattice = TypeLattice::new();
        assert_eq!(
            lattice.register(Some(777)),
            Err(LatticeError::UnknownBaseType { base: 777 })
        );
    }

    #[test]
    fn rejects_second_base_for_existing_id() {
        let mut lattice = TypeLattice::new();
        lattice
            .register_with_id(2000, Some(TID_OBJECT))
            .expect("first registration");
        lattice
            .register_with_id(2000, Some(TID_OBJECT))
            .expect("same base is idempotent");
        let err = lattice
            .register_with_id(2000, Some(TID_INT))
            .expect_err("second base must fail");
        assert!(matches!(err, LatticeError::ConflictingBase { id: 2000, .. }));
        assert_eq!(lattice.register(None), Ok(2001));
    }

    #[test]
    fn runtime_type_ids_prefer_bool_and_fall_back_to_object() {
        let mut lattice = TypeLattice::new();
        let user = lattice.register(None).expect("user");
        assert_eq!(lattice.runtime_type_id(&RuntimeValue::Bool(true)), TID_BOOL);
        assert_eq!(lattice.runtime_type_id(&RuntimeValue::Int(3)), TID_INT);
        assert_eq!(
            lattice.runtime_type_id(&RuntimeValue::List(vec![RuntimeValue::None])),
            TID_LIST
        );
        assert_eq!(
            lattice.runtime_type_id(&RuntimeValue::Object { type_id: user }),
            user
        );
        assert_eq!(
            lattice.runtime_type_id(&RuntimeValue::Object { type_id: 31337 }),
            TID_OBJECT
        );
        assert!(lattice.isinstance(&RuntimeValue::Bool(false), TID_INT));
        assert!(!lattice.isinstance(&RuntimeValue::None, TID_OBJECT));
    }
}
