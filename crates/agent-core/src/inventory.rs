//! Carried items and the item-name heuristics used by rules and handlers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Player inventory size (main slots + hotbar).
pub const DEFAULT_SLOT_CAPACITY: u32 = 36;

const FOOD_MARKERS: &[&str] = &[
    "bread", "beef", "pork", "chicken", "cod", "salmon", "fish", "apple", "carrot", "potato",
    "mutton", "cooked", "berries", "melon_slice",
];

/// Weapons in the order they are preferred when defending.
const WEAPON_PREFERENCE: &[&str] = &[
    "netherite_sword",
    "diamond_sword",
    "iron_sword",
    "stone_sword",
    "golden_sword",
    "wooden_sword",
    "diamond_axe",
    "iron_axe",
    "stone_axe",
    "wooden_axe",
];

const TIER_PREFERENCE: &[&str] = &["netherite", "diamond", "iron", "stone", "golden", "wooden"];

/// Tool classes a goal may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolClass {
    Pickaxe,
    Axe,
    Shovel,
    Sword,
    Hoe,
}

impl ToolClass {
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Pickaxe => "_pickaxe",
            Self::Axe => "_axe",
            Self::Shovel => "_shovel",
            Self::Sword => "_sword",
            Self::Hoe => "_hoe",
        }
    }

    pub fn matches(self, item: &str) -> bool {
        item.ends_with(self.suffix())
    }

    /// Cheapest craftable item of this class.
    pub fn starter_item(self) -> String {
        format!("wooden{}", self.suffix())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Inventory {
    pub items: BTreeMap<String, u32>,
    pub used_slots: u32,
    pub slot_capacity: u32,
}

impl Default for Inventory {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
            used_slots: 0,
            slot_capacity: DEFAULT_SLOT_CAPACITY,
        }
    }
}

impl Inventory {
    pub fn count(&self, item: &str) -> u32 {
        self.items.get(item).copied().unwrap_or(0)
    }

    pub fn contains(&self, item: &str) -> bool {
        self.count(item) > 0
    }

    pub fn is_full(&self) -> bool {
        self.slot_capacity > 0 && self.used_slots >= self.slot_capacity
    }

    pub fn total_items(&self) -> u32 {
        self.items.values().sum()
    }

    pub fn has_tool(&self, class: ToolClass) -> bool {
        self.items
            .iter()
            .any(|(name, count)| *count > 0 && class.matches(name))
    }

    /// Best carried tool of a class, by material tier.
    pub fn best_tool(&self, class: ToolClass) -> Option<&str> {
        let carried = |name: &String| self.count(name) > 0 && class.matches(name);
        TIER_PREFERENCE
            .iter()
            .find_map(|tier| {
                self.items
                    .keys()
                    .find(|name| carried(name) && name.starts_with(tier))
            })
            .or_else(|| self.items.keys().find(|name| carried(name)))
            .map(String::as_str)
    }

    pub fn first_food(&self) -> Option<&str> {
        self.items
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(name, _)| name.as_str())
            .find(|name| is_food(name))
    }

    pub fn best_weapon(&self) -> Option<&str> {
        WEAPON_PREFERENCE
            .iter()
            .copied()
            .find(|weapon| self.contains(weapon))
    }
}

pub fn is_food(item: &str) -> bool {
    FOOD_MARKERS.iter().any(|marker| item.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inventory(items: &[(&str, u32)]) -> Inventory {
        Inventory {
            items: items.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            used_slots: items.len() as u32,
            ..Inventory::default()
        }
    }

    #[test]
    fn best_tool_prefers_higher_tier() {
        let inv = inventory(&[("wooden_pickaxe", 1), ("iron_pickaxe", 1), ("stone_axe", 1)]);
        assert_eq!(inv.best_tool(ToolClass::Pickaxe), Some("iron_pickaxe"));
        assert_eq!(inv.best_tool(ToolClass::Axe), Some("stone_axe"));
        assert_eq!(inv.best_tool(ToolClass::Shovel), None);
    }

    #[test]
    fn weapon_and_food_lookup() {
        let inv = inventory(&[("cooked_beef", 3), ("iron_axe", 1), ("stone_sword", 1)]);
        assert_eq!(inv.best_weapon(), Some("stone_sword"));
        assert_eq!(inv.first_food(), Some("cooked_beef"));
        assert!(inventory(&[("dirt", 64)]).first_food().is_none());
    }

    #[test]
    fn full_inventory_uses_slot_count() {
        let mut inv = Inventory::default();
        inv.used_slots = 35;
        assert!(!inv.is_full());
        inv.used_slots = 36;
        assert!(inv.is_full());
    }
}
