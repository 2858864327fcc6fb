//! Output records and their field layout.

use crate::model::EntityId;
use crate::recommender::{Neighbor, NeighborList, Target};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Field names used when rendering a [`SimilarityRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RecordLayout {
    /// Field holding the owner ID, and each neighbor's ID.
    pub id_field: String,
    /// Field holding the neighbor array.
    pub neighbors_field: String,
    /// Field holding each neighbor's score.
    pub value_field: String,
    /// Field holding the record timestamp.
    pub timestamp_field: String,
}

impl RecordLayout {
    /// `user_id` / `users` / `value` / `@timestamp`.
    pub fn users() -> Self {
        Self {
            id_field: "user_id".to_string(),
            neighbors_field: "users".to_string(),
            value_field: "value".to_string(),
            timestamp_field: "@timestamp".to_string(),
        }
    }

    /// `item_id` / `items` / `value` / `@timestamp`.
    pub fn items() -> Self {
        Self {
            id_field: "item_id".to_string(),
            neighbors_field: "items".to_string(),
            value_field: "value".to_string(),
            timestamp_field: "@timestamp".to_string(),
        }
    }

    pub fn for_target(target: Target) -> Self {
        match target {
            Target::Users => Self::users(),
            Target::Items => Self::items(),
        }
    }

    /// Schema description a sink must accept before the run starts.
    ///
    /// ```text
    /// { "properties": {
    ///     <timestamp>: { "type": "date", "format": "date_optional_time" },
    ///     <id>:        { "type": "long" },
    ///     <neighbors>: { "properties": { <id>: long, <value>: double } } } }
    /// ```
    pub fn mapping(&self) -> Value {
        let mut neighbor_props = Map::new();
        neighbor_props.insert(self.id_field.clone(), field_type("long"));
        neighbor_props.insert(self.value_field.clone(), field_type("double"));

        let mut timestamp = Map::new();
        timestamp.insert("type".to_string(), Value::from("date"));
        timestamp.insert("format".to_string(), Value::from("date_optional_time"));

        let mut neighbors = Map::new();
        neighbors.insert("properties".to_string(), Value::Object(neighbor_props));

        let mut props = Map::new();
        props.insert(self.timestamp_field.clone(), Value::Object(timestamp));
        props.insert(self.id_field.clone(), field_type("long"));
        props.insert(self.neighbors_field.clone(), Value::Object(neighbors));

        let mut root = Map::new();
        root.insert("properties".to_string(), Value::Object(props));
        Value::Object(root)
    }
}

fn field_type(name: &str) -> Value {
    let mut m = Map::new();
    m.insert("type".to_string(), Value::from(name));
    Value::Object(m)
}

/// One owner's neighborhood as delivered to a sink.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityRecord {
    pub owner_id: EntityId,
    pub timestamp: DateTime<Utc>,
    pub neighbors: Vec<Neighbor>,
}

impl SimilarityRecord {
    /// Record stamped with the current time.
    pub fn new(owner_id: EntityId, neighbors: &NeighborList) -> Self {
        Self {
            owner_id,
            timestamp: Utc::now(),
            neighbors: neighbors.as_slice().to_vec(),
        }
    }

    /// Render as a JSON document using `layout`'s field names.
    pub fn to_json(&self, layout: &RecordLayout) -> Value {
        let neighbors: Vec<Value> = self
            .neighbors
            .iter()
            .map(|n| {
                let mut m = Map::new();
                m.insert(layout.id_field.clone(), Value::from(n.id));
                m.insert(layout.value_field.clone(), Value::from(n.value));
                Value::Object(m)
            })
            .collect();

        let mut doc = Map::new();
        doc.insert(layout.id_field.clone(), Value::from(self.owner_id));
        doc.insert(
            layout.timestamp_field.clone(),
            Value::from(self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        doc.insert(layout.neighbors_field.clone(), Value::Array(neighbors));
        Value::Object(doc)
    }
}
