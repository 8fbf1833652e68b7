use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::context::{keys, Context};
use super::definition::TriggerKind;

/// A domain event that may start workflows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEvent {
    pub kind: TriggerKind,
    pub entity_id: String,
    pub actor_id: Option<String>,
    pub from_stage: Option<String>,
    pub to_stage: Option<String>,
    /// Extra payload fields copied into the execution context.
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl TriggerEvent {
    pub fn new(kind: TriggerKind, entity_id: impl Into<String>) -> Self {
        Self {
            kind,
            entity_id: entity_id.into(),
            actor_id: None,
            from_stage: None,
            to_stage: None,
            data: Map::new(),
        }
    }

    pub fn entity_created(entity_id: impl Into<String>) -> Self {
        Self::new(TriggerKind::EntityCreated, entity_id)
    }

    pub fn stage_changed(
        entity_id: impl Into<String>,
        from_stage: impl Into<String>,
        to_stage: impl Into<String>,
    ) -> Self {
        Self::new(TriggerKind::StageChanged, entity_id)
            .with_from_stage(from_stage)
            .with_to_stage(to_stage)
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn with_from_stage(mut self, stage: impl Into<String>) -> Self {
        self.from_stage = Some(stage.into());
        self
    }

    pub fn with_to_stage(mut self, stage: impl Into<String>) -> Self {
        self.to_stage = Some(stage.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Build the initial execution context.
    ///
    /// Payload fields go in first so the well-known keys always win.
    pub fn to_context(&self, entity: Option<Value>) -> Context {
        let mut ctx: Context = self
            .data
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        ctx.insert(keys::ENTITY_ID, self.entity_id.clone());
        ctx.insert(keys::TRIGGER, self.kind.as_str());
        if let Some(actor) = &self.actor_id {
            ctx.insert(keys::ACTOR_ID, actor.clone());
        }
        if let Some(stage) = &self.from_stage {
            ctx.insert(keys::FROM_STAGE, stage.clone());
        }
        if let Some(stage) = &self.to_stage {
            ctx.insert(keys::TO_STAGE, stage.clone());
        }
        if let Some(entity) = entity {
            ctx.insert(keys::ENTITY, entity);
        }
        ctx
    }
}
