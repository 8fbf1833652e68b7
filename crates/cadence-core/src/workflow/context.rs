use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Well-known context keys.
pub mod keys {
    pub const ENTITY_ID: &str = "entityId";
    pub const ENTITY: &str = "entity";
    pub const ACTOR_ID: &str = "actorId";
    pub const FROM_STAGE: &str = "fromStage";
    pub const TO_STAGE: &str = "toStage";
    pub const TRIGGER: &str = "trigger";
}

/// Data snapshot available to every step of an execution.
///
/// Captured once when the execution starts and persisted with it, so an
/// execution resumed by another process sees exactly the same values. Steps
/// never mutate it; action handlers return updates that are stored on their
/// step execution and layered on top with [`Context::overlay`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    fields: BTreeMap<String, Value>,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a JSON object. Non-object values yield an empty context.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => map.into_iter().collect(),
            _ => Self::default(),
        }
    }

    /// Add a field, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set a field. `null` values are dropped.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let value = value.into();
        if !value.is_null() {
            self.fields.insert(key.into(), value);
        }
    }

    /// Get a raw field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a field as a non-empty string. Numbers are rendered as strings.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Identifier of the entity the execution runs against.
    pub fn entity_id(&self) -> Option<String> {
        self.get_str(keys::ENTITY_ID)
    }

    /// The entity snapshot loaded when the execution started.
    pub fn entity(&self) -> Option<&Value> {
        self.fields.get(keys::ENTITY)
    }

    /// The user whose action raised the triggering event.
    pub fn actor_id(&self) -> Option<String> {
        self.get_str(keys::ACTOR_ID)
    }

    /// Stage the entity left, for stage-change triggers.
    pub fn from_stage(&self) -> Option<&str> {
        self.fields.get(keys::FROM_STAGE).and_then(Value::as_str)
    }

    /// Stage the entity entered, for stage-change triggers.
    pub fn to_stage(&self) -> Option<&str> {
        self.fields.get(keys::TO_STAGE).and_then(Value::as_str)
    }

    /// Follow a dotted path inside a field. Missing segments yield `None`.
    pub fn lookup(&self, root: &str, path: &[String]) -> Option<&Value> {
        let mut current = self.fields.get(root)?;
        for segment in path {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// A copy of this context with `updates` applied on top.
    pub fn overlay(&self, updates: &Map<String, Value>) -> Self {
        let mut next = self.clone();
        for (key, value) in updates {
            if value.is_null() {
                next.fields.remove(key);
            } else {
                next.fields.insert(key.clone(), value.clone());
            }
        }
        next
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the context has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Render as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

impl FromIterator<(String, Value)> for Context {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut ctx = Context::new();
        for (key, value) in iter {
            ctx.insert(key, value);
        }
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_well_known_accessors() {
        let ctx = Context::new()
            .with(keys::ENTITY_ID, 42)
            .with(keys::ACTOR_ID, "user-7")
            .with(keys::FROM_STAGE, "Interview")
            .with(keys::TO_STAGE, "Offer");

        assert_eq!(ctx.entity_id().as_deref(), Some("42"));
        assert_eq!(ctx.actor_id().as_deref(), Some("user-7"));
        assert_eq!(ctx.from_stage(), Some("Interview"));
        assert_eq!(ctx.to_stage(), Some("Offer"));
        assert!(ctx.entity().is_none());
    }

    #[test]
    fn test_blank_strings_are_absent() {
        let ctx = Context::new().with(keys::ACTOR_ID, "   ");
        assert!(ctx.actor_id().is_none());
    }

    #[test]
    fn test_null_values_are_dropped() {
        let ctx = Context::new().with(keys::ACTOR_ID, Value::Null);
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_lookup_nested() {
        let ctx = Context::new().with(
            keys::ENTITY,
            json!({"name": "Ada", "address": {"city": "Leeds"}}),
        );

        assert_eq!(
            ctx.lookup(keys::ENTITY, &["address".into(), "city".into()]),
            Some(&json!("Leeds"))
        );
        assert!(ctx.lookup(keys::ENTITY, &["phone".into()]).is_none());
        assert!(ctx.lookup("missing", &[]).is_none());
    }

    #[test]
    fn test_overlay_does_not_touch_original() {
        let base = Context::new().with("status", "new").with("ownerId", "u1");
        let mut updates = Map::new();
        updates.insert("status".into(), json!("contacted"));
        updates.insert("ownerId".into(), Value::Null);

        let next = base.overlay(&updates);

        assert_eq!(next.get("status"), Some(&json!("contacted")));
        assert!(next.get("ownerId").is_none());
        assert_eq!(base.get("status"), Some(&json!("new")));
    }

    #[test]
    fn test_serde_round_trip_is_plain_object() {
        let ctx = Context::new().with(keys::ENTITY_ID, 42).with(keys::TRIGGER, "entity_created");
        let value = serde_json::to_value(&ctx).unwrap();
        assert_eq!(value, json!({"entityId": 42, "trigger": "entity_created"}));

        let back: Context = serde_json::from_value(value).unwrap();
        assert_eq!(back, ctx);
    }

    #[test]
    fn test_from_value_non_object() {
        assert!(Context::from_value(json!([1, 2, 3])).is_empty());
        assert_eq!(Context::from_value(json!({"a": 1})).len(), 1);
    }
}
