//! Map icon metadata.
//!
//! Every map item the War API reports carries a numeric `iconType`. Only a
//! handful of those types are territory markers that can change hands
//! (town halls, relic bases, keeps); the rest are facilities, resource
//! fields, and decorations. [`IconCatalog`] maps type ids to their label
//! and whether they are conquerable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata for one map icon type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconType {
    /// Human-readable label (e.g. `Town Base 2`).
    pub label: String,
    /// Whether markers of this type can be captured by a team.
    pub conquerable: bool,
}

/// Lookup table from icon type id to [`IconType`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IconCatalog {
    types: BTreeMap<u32, IconType>,
}

/// `(id, label, conquerable)` rows for the War API icon table.
const WAR_API_ICONS: &[(u32, &str, bool)] = &[
    (5, "Static Base 1", true),
    (6, "Static Base 2", true),
    (7, "Static Base 3", true),
    (8, "Forward Base 1", false),
    (9, "Forward Base 2", false),
    (10, "Forward Base 3", false),
    (11, "Hospital", false),
    (12, "Vehicle Factory", false),
    (13, "Armory", false),
    (14, "Supply Station", false),
    (15, "Workshop", false),
    (16, "Manufacturing Plant", false),
    (17, "Refinery", false),
    (18, "Shipyard", false),
    (19, "Tech Center", false),
    (20, "Salvage Field", false),
    (21, "Component Field", false),
    (22, "Fuel Field", false),
    (23, "Sulfur Field", false),
    (24, "World Map Tent", false),
    (25, "Travel Tent", false),
    (26, "Training Area", false),
    (27, "Keep", true),
    (28, "Observation Tower", false),
    (29, "Fort", false),
    (30, "Troop Ship", false),
    (32, "Sulfur Mine", false),
    (33, "Storage Facility", false),
    (34, "Factory", false),
    (35, "Garrison Station", false),
    (36, "Ammo Factory", false),
    (37, "Rocket Site", false),
    (38, "Salvage Mine", false),
    (39, "Construction Yard", false),
    (40, "Component Mine", false),
    (45, "Relic Base 1", true),
    (46, "Relic Base 2", true),
    (47, "Relic Base 3", true),
    (51, "Mass Production Factory", false),
    (52, "Seaport", false),
    (53, "Coastal Gun", false),
    (54, "Soul Factory", false),
    (56, "Town Base 1", true),
    (57, "Town Base 2", true),
    (58, "Town Base 3", true),
    (59, "Storm Cannon", false),
    (60, "Intel Center", false),
    (61, "Coal Field", false),
    (62, "Oil Field", false),
    (70, "Rocket Target", false),
    (71, "Rocket Ground Zero", false),
    (72, "Rocket Site With Rocket", false),
    (75, "Facility Mine Oil Rig", false),
    (83, "Weather Station", false),
    (84, "Mortar House", false),
];

impl IconCatalog {
    /// Create an empty catalog.
    pub const fn new() -> Self {
        Self {
            types: BTreeMap::new(),
        }
    }

    /// The icon table published by the Foxhole War API.
    pub fn war_api() -> Self {
        WAR_API_ICONS
            .iter()
            .map(|&(id, label, conquerable)| {
                (
                    id,
                    IconType {
                        label: label.to_owned(),
                        conquerable,
                    },
                )
            })
            .collect()
    }

    /// Register (or replace) an icon type.
    pub fn insert(&mut self, type_id: u32, icon: IconType) {
        self.types.insert(type_id, icon);
    }

    /// Look up metadata for a type id.
    pub fn get(&self, type_id: u32) -> Option<&IconType> {
        self.types.get(&type_id)
    }

    /// Return the label of a conquerable type, or `None` if the type is
    /// unknown or purely decorative.
    pub fn conquerable_label(&self, type_id: u32) -> Option<&str> {
        self.get(type_id)
            .filter(|icon| icon.conquerable)
            .map(|icon| icon.label.as_str())
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the catalog has no entries.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl FromIterator<(u32, IconType)> for IconCatalog {
    fn from_iter<I: IntoIterator<Item = (u32, IconType)>>(iter: I) -> Self {
        Self {
            types: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn town_and_relic_bases_are_conquerable() {
        let catalog = IconCatalog::war_api();
        for id in [45, 46, 47, 56, 57, 58, 27] {
            assert!(catalog.conquerable_label(id).is_some(), "type {id}");
        }
        assert_eq!(catalog.conquerable_label(57), Some("Town Base 2"));
    }

    #[test]
    fn facilities_and_unknown_types_are_not() {
        let catalog = IconCatalog::war_api();
        assert_eq!(catalog.conquerable_label(11), None);
        assert_eq!(catalog.conquerable_label(61), None);
        assert_eq!(catalog.conquerable_label(9999), None);
    }

    #[test]
    fn insert_overrides_entry() {
        let mut catalog = IconCatalog::new();
        assert!(catalog.is_empty());
        catalog.insert(
            5,
            IconType {
                label: String::from("Outpost"),
                conquerable: true,
            },
        );
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.conquerable_label(5), Some("Outpost"));
    }
}
