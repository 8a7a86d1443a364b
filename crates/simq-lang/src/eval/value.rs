use std::{borrow::Cow, cmp::Ordering, collections::BTreeMap, sync::Arc};

use itertools::Itertools;

use crate::ast::node::Node;
use crate::host::EntityRef;
use crate::quantity::Quantity;
use crate::unit::UnitType;

/// The closed runtime value union.
///
/// Collections and lambdas sit behind `Arc` so that values stay cheap to
/// clone; the containers themselves are immutable, so sharing is safe and
/// equality on them is identity, matching the rest of the value semantics.
#[derive(Clone)]
pub enum Value {
    Number(Quantity),
    String(String),
    Entity(EntityRef),
    Collection(Arc<Collection>),
    Lambda(Arc<LambdaClosure>),
}

/// Equality is per-variant: value+unit for numbers, structural for strings,
/// reference identity for entities, identity for collections and lambdas.
/// Cross-kind comparison is always false here; the typed `==` operator
/// rejects it before ever getting this far.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Entity(a), Value::Entity(b)) => a == b,
            (Value::Collection(a), Value::Collection(b)) => Arc::ptr_eq(a, b),
            (Value::Lambda(a), Value::Lambda(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ValueKind {
    Number,
    String,
    Entity,
    Collection,
    Lambda,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Entity => "entity",
            ValueKind::Collection => "collection",
            ValueKind::Lambda => "lambda",
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Value {
    pub const ZERO: Value = Value::Number(Quantity {
        value: 0.0,
        unit: UnitType::DIMENSIONLESS,
    });

    #[inline(always)]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Entity(_) => ValueKind::Entity,
            Value::Collection(_) => ValueKind::Collection,
            Value::Lambda(_) => ValueKind::Lambda,
        }
    }

    #[inline(always)]
    pub fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    #[inline(always)]
    pub fn as_number(&self) -> Option<&Quantity> {
        match self {
            Value::Number(q) => Some(q),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn as_collection(&self) -> Option<&Arc<Collection>> {
        match self {
            Value::Collection(c) => Some(c),
            _ => None,
        }
    }

    /// Unit dimension of this value; non-numbers are dimensionless.
    #[inline(always)]
    pub fn unit(&self) -> UnitType {
        match self {
            Value::Number(q) => q.unit,
            _ => UnitType::DIMENSIONLESS,
        }
    }

    /// Copy with value semantics: collections are copied element by element
    /// rather than shared, so a closure's captures cannot alias the
    /// environment they were captured from.
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::Collection(c) => Value::Collection(Arc::new(c.deep_copy())),
            other => other.clone(),
        }
    }

    /// Literal form: like `Display`, but strings are quoted. Used for
    /// elements inside collections.
    fn literal(&self) -> Cow<'_, str> {
        match self {
            Value::String(s) => Cow::Owned(format!(r#""{}""#, s)),
            other => Cow::Owned(other.to_string()),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text: Cow<'_, str> = match self {
            Value::Number(q) => Cow::Owned(q.to_string()),
            Value::String(s) => Cow::Borrowed(s),
            Value::Entity(e) => Cow::Owned(e.to_string()),
            Value::Collection(c) => Cow::Owned(c.to_string()),
            Value::Lambda(l) => Cow::Owned(format!("lambda/{}", l.arity)),
        };
        write!(f, "{}", text)
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(q) if !q.unit.is_dimensionless() => {
                write!(f, "{}[{}]", q, q.unit.0)
            }
            other => write!(f, "{}", other.literal()),
        }
    }
}

impl From<Quantity> for Value {
    fn from(q: Quantity) -> Self {
        Value::Number(q)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(Quantity::dimensionless(value))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<EntityRef> for Value {
    fn from(e: EntityRef) -> Self {
        Value::Entity(e)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::Collection(Arc::new(Collection::Vector(values)))
    }
}

impl From<BTreeMap<MapKey, Value>> for Value {
    fn from(map: BTreeMap<MapKey, Value>) -> Self {
        Value::Collection(Arc::new(Collection::Map(map)))
    }
}

/// The two concrete container shapes, unified behind one indexing and
/// iteration interface. Sequences use 1-based integer keys; maps use keys of
/// any representable value type.
#[derive(Debug, Clone, PartialEq)]
pub enum Collection {
    Vector(Vec<Value>),
    Map(BTreeMap<MapKey, Value>),
}

impl Collection {
    pub fn len(&self) -> usize {
        match self {
            Collection::Vector(v) => v.len(),
            Collection::Map(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads one element. Out-of-range and missing keys yield a zero of the
    /// element dimension rather than failing; only a key of the wrong kind
    /// is an error.
    pub fn index(&self, key: &Value) -> Result<Value, String> {
        match self {
            Collection::Vector(values) => {
                let q = key.as_number().ok_or_else(|| {
                    format!("collection index must be a number, got {}", key.type_name())
                })?;
                let i = q
                    .as_index()
                    .ok_or_else(|| format!("collection index is not finite: {}", q))?;
                if i >= 1 && (i as usize) <= values.len() {
                    Ok(values[i as usize - 1].clone())
                } else {
                    Ok(Value::Number(Quantity::zero(self.element_unit())))
                }
            }
            Collection::Map(map) => {
                let map_key = MapKey::from_value(key).ok_or_else(|| {
                    format!("{} cannot be used as a collection key", key.type_name())
                })?;
                Ok(map
                    .get(&map_key)
                    .cloned()
                    .unwrap_or(Value::Number(Quantity::zero(self.element_unit()))))
            }
        }
    }

    /// The key sequence: `1..=len` for vectors, the sorted keys for maps.
    /// Each call restarts from the beginning; the container is never consumed.
    pub fn keys(&self) -> Box<dyn Iterator<Item = Value> + '_> {
        match self {
            Collection::Vector(v) => {
                Box::new((1..=v.len()).map(|i| Value::Number(Quantity::from(i))))
            }
            Collection::Map(m) => Box::new(m.keys().map(MapKey::to_value)),
        }
    }

    pub fn values(&self) -> Box<dyn Iterator<Item = &Value> + '_> {
        match self {
            Collection::Vector(v) => Box::new(v.iter()),
            Collection::Map(m) => Box::new(m.values()),
        }
    }

    /// `(key, value)` pairs in key order.
    pub fn entries(&self) -> Box<dyn Iterator<Item = (Value, &Value)> + '_> {
        match self {
            Collection::Vector(v) => Box::new(
                v.iter()
                    .enumerate()
                    .map(|(i, value)| (Value::Number(Quantity::from(i + 1)), value)),
            ),
            Collection::Map(m) => Box::new(m.iter().map(|(k, v)| (k.to_value(), v))),
        }
    }

    /// Dimension used for permissive zero reads: the first numeric element's
    /// unit, or dimensionless.
    pub fn element_unit(&self) -> UnitType {
        self.values()
            .find_map(|v| v.as_number().map(|q| q.unit))
            .unwrap_or(UnitType::DIMENSIONLESS)
    }

    pub fn deep_copy(&self) -> Collection {
        match self {
            Collection::Vector(v) => Collection::Vector(v.iter().map(Value::deep_copy).collect()),
            Collection::Map(m) => Collection::Map(
                m.iter()
                    .map(|(k, v)| (k.clone(), v.deep_copy()))
                    .collect(),
            ),
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Collection::Vector(v) => {
                write!(f, "{{{}}}", v.iter().map(|v| v.literal()).join(", "))
            }
            Collection::Map(m) => write!(
                f,
                "{{{}}}",
                m.iter()
                    .map(|(k, v)| format!("{}: {}", k.to_value().literal(), v.literal()))
                    .join(", ")
            ),
        }
    }
}

/// An associative-collection key. Orders across kinds by rank (numbers,
/// strings, entities), numbers by total order with the unit id as a
/// tiebreaker, so map iteration is deterministic.
#[derive(Debug, Clone)]
pub enum MapKey {
    Number(Quantity),
    String(String),
    Entity(EntityRef),
}

impl MapKey {
    pub fn from_value(value: &Value) -> Option<MapKey> {
        match value {
            Value::Number(q) => Some(MapKey::Number(*q)),
            Value::String(s) => Some(MapKey::String(s.clone())),
            Value::Entity(e) => Some(MapKey::Entity(*e)),
            Value::Collection(_) | Value::Lambda(_) => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Number(q) => Value::Number(*q),
            MapKey::String(s) => Value::String(s.clone()),
            MapKey::Entity(e) => Value::Entity(*e),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            MapKey::Number(_) => 0,
            MapKey::String(_) => 1,
            MapKey::Entity(_) => 2,
        }
    }
}

impl Ord for MapKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (MapKey::Number(a), MapKey::Number(b)) => {
                a.cmp_value(b).then_with(|| a.unit.cmp(&b.unit))
            }
            (MapKey::String(a), MapKey::String(b)) => a.cmp(b),
            (MapKey::Entity(a), MapKey::Entity(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for MapKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for MapKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MapKey {}

/// A lambda value: the body tree, the declared arity, and one owned copy of
/// every captured free-variable value, snapshotted where the literal was
/// evaluated.
#[derive(Debug, Clone)]
pub struct LambdaClosure {
    pub arity: usize,
    pub captured: Vec<Value>,
    pub body: Arc<Node>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::EntityId;
    use rstest::rstest;

    fn vector(values: Vec<Value>) -> Value {
        Value::from(values)
    }

    #[test]
    fn test_equality_per_variant() {
        assert_eq!(Value::from(1.0), Value::from(1.0));
        assert_ne!(
            Value::Number(Quantity::new(1.0, UnitType(1))),
            Value::Number(Quantity::new(1.0, UnitType(2)))
        );
        assert_eq!(Value::from("a"), Value::from("a"));
        assert_ne!(Value::from(1.0), Value::from("1"));

        let e1 = Value::Entity(EntityRef::new(EntityId(1)));
        let e1b = Value::Entity(EntityRef::new(EntityId(1)));
        assert_eq!(e1, e1b);

        // Collections compare by identity, not contents.
        let c = vector(vec![Value::from(1.0)]);
        let d = vector(vec![Value::from(1.0)]);
        assert_eq!(c, c.clone());
        assert_ne!(c, d);
    }

    #[rstest]
    #[case(1, Value::from(10.0))]
    #[case(3, Value::from(30.0))]
    fn test_vector_one_based_index(#[case] index: i64, #[case] expected: Value) {
        let c = Collection::Vector(vec![Value::from(10.0), Value::from(20.0), Value::from(30.0)]);
        assert_eq!(c.index(&Value::from(index as f64)).unwrap(), expected);
    }

    #[rstest]
    #[case(0)]
    #[case(4)]
    #[case(-1)]
    fn test_vector_permissive_out_of_range(#[case] index: i64) {
        let unit = UnitType(5);
        let c = Collection::Vector(vec![Value::Number(Quantity::new(10.0, unit))]);
        assert_eq!(
            c.index(&Value::from(index as f64)).unwrap(),
            Value::Number(Quantity::zero(unit))
        );
    }

    #[test]
    fn test_vector_bad_key_kind() {
        let c = Collection::Vector(vec![Value::from(1.0)]);
        assert!(c.index(&Value::from("x")).is_err());
    }

    #[test]
    fn test_map_index_and_missing_key() {
        let mut m = BTreeMap::new();
        m.insert(
            MapKey::String("a".to_string()),
            Value::Number(Quantity::new(7.0, UnitType(2))),
        );
        let c = Collection::Map(m);
        assert_eq!(
            c.index(&Value::from("a")).unwrap(),
            Value::Number(Quantity::new(7.0, UnitType(2)))
        );
        assert_eq!(
            c.index(&Value::from("missing")).unwrap(),
            Value::Number(Quantity::zero(UnitType(2)))
        );
    }

    #[test]
    fn test_keys_restartable() {
        let c = Collection::Vector(vec![Value::from(5.0), Value::from(6.0)]);
        let first: Vec<Value> = c.keys().collect();
        let second: Vec<Value> = c.keys().collect();
        assert_eq!(first, second);
        assert_eq!(first, vec![Value::from(1.0), Value::from(2.0)]);
    }

    #[test]
    fn test_deep_copy_detaches() {
        let inner = vector(vec![Value::from(1.0)]);
        let outer = vector(vec![inner.clone()]);
        let copied = outer.deep_copy();
        assert_ne!(outer, copied);
        if let (Value::Collection(a), Value::Collection(b)) = (&outer, &copied) {
            assert_eq!(a.len(), b.len());
        } else {
            panic!("expected collections");
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from(42.0).to_string(), "42");
        assert_eq!(Value::from("hi").to_string(), "hi");
        assert_eq!(
            vector(vec![Value::from(1.0), Value::from("a")]).to_string(),
            r#"{1, "a"}"#
        );
        assert_eq!(Value::Entity(EntityRef::NULL).to_string(), "null");
    }

    #[test]
    fn test_map_key_order_is_total() {
        let mut keys = vec![
            MapKey::String("b".to_string()),
            MapKey::Number(Quantity::dimensionless(2.0)),
            MapKey::Entity(EntityRef::new(EntityId(1))),
            MapKey::Number(Quantity::dimensionless(1.0)),
        ];
        keys.sort();
        assert_eq!(
            keys.iter().map(|k| k.rank()).collect::<Vec<_>>(),
            vec![0, 0, 1, 2]
        );
    }
}
