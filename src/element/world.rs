//! World Map
//!
//! Areas and rooms bulk-loaded as elements at startup.

use std::collections::HashMap;

use futures::future::join_all;
use tracing::{error, info, warn};

use super::instance::{ElementDetail, ElementInstance};
use super::kind::{AREA, ROOM};
use super::resolver::ElementResolver;
use crate::value::Value;

pub struct World {
    areas: HashMap<String, ElementInstance>,
    rooms: HashMap<String, ElementInstance>,
    room_areas: HashMap<String, String>,
}

impl World {
    /// Load every area record, then the rooms each area contains
    pub async fn load(resolver: &ElementResolver) -> Self {
        let mut world = World {
            areas: HashMap::new(),
            rooms: HashMap::new(),
            room_areas: HashMap::new(),
        };

        let Some(area_table) = resolver.types().model_name(AREA).await else {
            error!("Element type {} has no table, world is empty", AREA);
            return world;
        };

        let records = match resolver.world().records(&area_table).await {
            Ok(records) => records,
            Err(e) => {
                warn!("No areas loaded from {}: {}", area_table, e);
                return world;
            }
        };

        let keys: Vec<String> = records
            .iter()
            .filter_map(|r| r.get("key").and_then(Value::as_str))
            .map(str::to_string)
            .collect();
        let areas = join_all(keys.iter().map(|key| resolver.resolve(AREA, key, None))).await;

        for area in areas {
            let room_keys = match area.detail() {
                ElementDetail::Area { rooms } => rooms.clone(),
                _ => Vec::new(),
            };

            let rooms = join_all(room_keys.iter().map(|key| resolver.resolve(ROOM, key, None))).await;
            for room in rooms {
                world
                    .room_areas
                    .insert(room.key().to_string(), area.key().to_string());
                world.rooms.insert(room.key().to_string(), room);
            }
            world.areas.insert(area.key().to_string(), area);
        }

        info!(
            "Loaded world with {} areas and {} rooms",
            world.areas.len(),
            world.rooms.len()
        );
        world
    }

    pub fn get_area(&self, key: &str) -> Option<&ElementInstance> {
        self.areas.get(key)
    }

    pub fn get_room(&self, key: &str) -> Option<&ElementInstance> {
        self.rooms.get(key)
    }

    /// The area containing a room
    pub fn get_area_by_room(&self, room_key: &str) -> Option<&ElementInstance> {
        self.room_areas
            .get(room_key)
            .and_then(|area| self.areas.get(area))
    }

    pub fn area_count(&self) -> usize {
        self.areas.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
