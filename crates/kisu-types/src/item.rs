use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::value::DynamicValue;

/// Largest stack amount the host accepts in a single container slot.
pub const MAX_STACK_AMOUNT: u8 = 255;

/// Namespace assumed for item type ids given without one.
const DEFAULT_ITEM_NAMESPACE: &str = "minecraft";

/// A stack of game items.
///
/// The storage layer never inspects a stack beyond what it needs to place it
/// into a container slot; `Clone` produces a fully independent copy, which is
/// what the item store relies on when it takes ownership of caller values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemStack {
    /// Namespaced type id, e.g. `minecraft:diamond`.
    pub type_id: String,
    /// Number of items in the stack.
    pub amount: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lore: Vec<String>,
    /// Per-stack dynamic properties.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, DynamicValue>,
}

impl ItemStack {
    /// Create a stack, qualifying a bare type id with the default namespace.
    ///
    /// Fails for an empty type id or an amount outside `1..=255`.
    pub fn new(type_id: impl AsRef<str>, amount: u8) -> Result<Self, TypeError> {
        let type_id = type_id.as_ref().trim();
        if type_id.is_empty() {
            return Err(TypeError::InvalidItem("type id must not be empty".into()));
        }
        if amount == 0 {
            return Err(TypeError::InvalidItem(format!(
                "amount must be between 1 and {MAX_STACK_AMOUNT}"
            )));
        }
        let type_id = if type_id.contains(':') {
            type_id.to_string()
        } else {
            format!("{DEFAULT_ITEM_NAMESPACE}:{type_id}")
        };
        Ok(Self {
            type_id,
            amount,
            name_tag: None,
            lore: Vec::new(),
            properties: BTreeMap::new(),
        })
    }

    pub fn with_name_tag(mut self, name: impl Into<String>) -> Self {
        self.name_tag = Some(name.into());
        self
    }

    pub fn with_lore(mut self, lore: Vec<String>) -> Self {
        self.lore = lore;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<DynamicValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Whether the host would accept this stack into a container slot.
    pub fn validate(&self) -> Result<(), TypeError> {
        if self.type_id.is_empty() {
            return Err(TypeError::InvalidItem("type id must not be empty".into()));
        }
        if self.amount == 0 {
            return Err(TypeError::InvalidItem(format!(
                "{} has an amount of 0",
                self.type_id
            )));
        }
        Ok(())
    }

    /// The type id without its namespace (`minecraft:oak_log` -> `oak_log`).
    pub fn short_type_id(&self) -> &str {
        self.type_id
            .split_once(':')
            .map_or(self.type_id.as_str(), |(_, name)| name)
    }
}

impl fmt::Display for ItemStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name_tag {
            Some(name) => write!(f, "{name} ({} x{})", self.type_id, self.amount),
            None => write!(f, "{} x{}", self.type_id, self.amount),
        }
    }
}

/// An ordered list of container slots.
///
/// Every slot either holds a stack or is explicitly empty. Interior empty
/// slots are meaningful and survive a save/load cycle; only trailing empty
/// slots of the final container window are dropped when a list is read back.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemList {
    slots: Vec<Option<ItemStack>>,
}

impl ItemList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_slots(slots: Vec<Option<ItemStack>>) -> Self {
        Self { slots }
    }

    /// Number of slots, including empty ones.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[Option<ItemStack>] {
        &self.slots
    }

    pub fn into_slots(self) -> Vec<Option<ItemStack>> {
        self.slots
    }

    /// Contents of slot `index`; `None` for an empty or out-of-range slot.
    pub fn get(&self, index: usize) -> Option<&ItemStack> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// The stack in slot zero, which is where a single stack lives.
    pub fn first(&self) -> Option<&ItemStack> {
        self.get(0)
    }

    pub fn push(&mut self, item: ItemStack) {
        self.slots.push(Some(item));
    }

    pub fn push_empty(&mut self) {
        self.slots.push(None);
    }

    /// Iterate over the occupied slots only.
    pub fn stacks(&self) -> impl Iterator<Item = &ItemStack> {
        self.slots.iter().flatten()
    }

    /// Total item count across every occupied slot.
    pub fn total_amount(&self) -> u64 {
        self.stacks().map(|s| u64::from(s.amount)).sum()
    }

    /// Drop empty slots at the end of the list.
    pub fn trim_trailing_empty(&mut self) {
        while matches!(self.slots.last(), Some(None)) {
            self.slots.pop();
        }
    }
}

impl From<ItemStack> for ItemList {
    fn from(item: ItemStack) -> Self {
        Self {
            slots: vec![Some(item)],
        }
    }
}

impl From<Vec<ItemStack>> for ItemList {
    fn from(items: Vec<ItemStack>) -> Self {
        Self {
            slots: items.into_iter().map(Some).collect(),
        }
    }
}

impl From<&[ItemStack]> for ItemList {
    fn from(items: &[ItemStack]) -> Self {
        Self {
            slots: items.iter().cloned().map(Some).collect(),
        }
    }
}

impl From<Vec<Option<ItemStack>>> for ItemList {
    fn from(slots: Vec<Option<ItemStack>>) -> Self {
        Self { slots }
    }
}

impl FromIterator<ItemStack> for ItemList {
    fn from_iter<I: IntoIterator<Item = ItemStack>>(iter: I) -> Self {
        Self {
            slots: iter.into_iter().map(Some).collect(),
        }
    }
}

impl FromIterator<Option<ItemStack>> for ItemList {
    fn from_iter<I: IntoIterator<Item = Option<ItemStack>>>(iter: I) -> Self {
        Self {
            slots: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for ItemList {
    type Item = Option<ItemStack>;
    type IntoIter = std::vec::IntoIter<Option<ItemStack>>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.into_iter()
    }
}

impl<'a> IntoIterator for &'a ItemList {
    type Item = &'a Option<ItemStack>;
    type IntoIter = std::slice::Iter<'a, Option<ItemStack>>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.iter()
    }
}
