//! Block partitioner
//!
//! A [`ByLevel`] is the sub-table of items sharing one value tuple of the
//! "by" attributes. Inside it, items agreeing on every column the task reads
//! (on, across and the columns of triplet filters) form a [`Cell`], and cells
//! are combined into regressor [`Group`]s keyed by (on value of A, on value of
//! B, across values shared by A and B). Columns the task never reads, such as
//! a per-item identifier, do not split cells.
//!
//! Every valid (A cell, B cell, X cell) combination is found here once, with
//! its closed-form triplet count. Stats sum those counts; the generator
//! expands the very same combinations into items, so the two cannot disagree.

use crate::filter::{Bindings, Filter, Role};
use crate::index::{AttributeIndex, ValueCode, ValueTuple};
use crate::item::ItemId;
use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};

/// Local item index inside a by-level
pub type LocalId = u32;

/// Items sharing the values of every column the task reads
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// Full tuple of the cell's first item; only the key columns are shared
    pub tuple: ValueTuple,
    pub items: Vec<LocalId>,
}

/// Attribute context of a regressor group
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupLabel {
    pub on_a: String,
    pub on_b: String,
    pub across: Vec<String>,
}

/// A valid combination of cells, indices into [`ByLevel::cells`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellTriple {
    pub a: usize,
    pub b: usize,
    pub x: usize,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub label: GroupLabel,
    pub triples: Vec<CellTriple>,
    /// Number of triplets, before any threshold
    pub count: u64,
}

/// Number of (A, B, X) item triplets a cell combination yields
///
/// When A and X come from the same cell the diagonal A == X is excluded.
#[inline]
pub fn triple_count(a: usize, b: usize, x: usize, same_ax: bool) -> u64 {
    let (a, b, x) = (a as u64, b as u64, x as u64);
    if same_ax {
        a * b * x.saturating_sub(1)
    } else {
        a * b * x
    }
}

/// What a by-level needs to know about the task to build its groups
pub(crate) struct Layout<'t> {
    pub index: &'t AttributeIndex,
    pub on: usize,
    pub across: &'t [usize],
    pub filters: &'t [Filter],
    /// Columns that split a by-level into cells
    pub key_columns: &'t [usize],
}

/// Role-tagged view over three cell tuples
pub(crate) struct TripleView<'t> {
    index: &'t AttributeIndex,
    tuples: [&'t ValueTuple; 3],
}

impl<'t> Bindings for TripleView<'t> {
    fn value(&self, role: Option<Role>, attribute: usize) -> &str {
        let tuple = self.tuples[role.map_or(0, |r| r as usize)];
        self.index.value(attribute, tuple[attribute])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ByLevel {
    key: String,
    values: Vec<String>,
    items: Vec<ItemId>,
    /// Distinct full attribute tuples
    nb_tuples: usize,
    cells: Vec<Cell>,
    groups: Vec<Group>,
}

struct Slot {
    on: ValueCode,
    across: ValueTuple,
    cells: Vec<usize>,
}

impl ByLevel {
    pub(crate) fn build(
        key: String,
        values: Vec<String>,
        items: Vec<ItemId>,
        layout: &Layout,
    ) -> Self {
        let index = layout.index;

        let mut tuples: AHashSet<&ValueTuple> = AHashSet::new();
        let mut cells: Vec<Cell> = Vec::new();
        let mut cell_ids: AHashMap<ValueTuple, usize> = AHashMap::new();
        for (local, &item) in items.iter().enumerate() {
            let tuple = index.tuple(item);
            tuples.insert(tuple);
            let cell_key: ValueTuple = layout.key_columns.iter().map(|&c| tuple[c]).collect();
            let id = *cell_ids.entry(cell_key).or_insert_with(|| {
                cells.push(Cell {
                    tuple: tuple.clone(),
                    items: Vec::new(),
                });
                cells.len() - 1
            });
            cells[id].items.push(local as LocalId);
        }
        let nb_tuples = tuples.len();

        let across_of = |cell: &Cell| -> ValueTuple {
            layout.across.iter().map(|&a| cell.tuple[a]).collect()
        };

        let mut slots: Vec<Slot> = Vec::new();
        let mut slot_ids: AHashMap<(ValueCode, ValueTuple), usize> = AHashMap::new();
        for (id, cell) in cells.iter().enumerate() {
            let slot_key = (cell.tuple[layout.on], across_of(cell));
            let slot = *slot_ids.entry(slot_key.clone()).or_insert_with(|| {
                slots.push(Slot {
                    on: slot_key.0,
                    across: slot_key.1,
                    cells: Vec::new(),
                });
                slots.len() - 1
            });
            slots[slot].cells.push(id);
        }

        // Filters on a single role are settled per cell before combining
        let admissible = |role: Role, cell: &Cell| {
            let view = TripleView {
                index,
                tuples: [&cell.tuple; 3],
            };
            layout
                .filters
                .iter()
                .filter(|f| f.single_role() == Some(role))
                .all(|f| f.matches(&view))
        };
        let admits: Vec<[bool; 3]> = cells
            .iter()
            .map(|cell| Role::ALL.map(|role| admissible(role, cell)))
            .collect();
        let joint: Vec<&Filter> = layout
            .filters
            .iter()
            .filter(|f| f.single_role().is_none())
            .collect();

        let mut groups = Vec::new();
        for slot_a in &slots {
            // X shares the on value of A and differs on every across attribute
            let x_cells: Vec<usize> = slots
                .iter()
                .filter(|s| {
                    s.on == slot_a.on
                        && s.across.iter().zip(slot_a.across.iter()).all(|(x, a)| x != a)
                })
                .flat_map(|s| s.cells.iter().copied())
                .filter(|&c| admits[c][Role::X as usize])
                .collect();

            let b_slots = slots
                .iter()
                .filter(|s| s.on != slot_a.on && s.across == slot_a.across);
            for slot_b in b_slots {
                let mut triples = Vec::new();
                for &a in slot_a.cells.iter().filter(|&&c| admits[c][Role::A as usize]) {
                    for &b in slot_b.cells.iter().filter(|&&c| admits[c][Role::B as usize]) {
                        for &x in &x_cells {
                            let count = triple_count(
                                cells[a].items.len(),
                                cells[b].items.len(),
                                cells[x].items.len(),
                                a == x,
                            );
                            if count == 0 {
                                continue;
                            }
                            let view = TripleView {
                                index,
                                tuples: [&cells[a].tuple, &cells[b].tuple, &cells[x].tuple],
                            };
                            if joint.iter().all(|f| f.matches(&view)) {
                                triples.push(CellTriple { a, b, x, count });
                            }
                        }
                    }
                }

                let count: u64 = triples.iter().map(|t| t.count).sum();
                if count == 0 {
                    continue;
                }
                groups.push(Group {
                    label: GroupLabel {
                        on_a: index.value(layout.on, slot_a.on).to_string(),
                        on_b: index.value(layout.on, slot_b.on).to_string(),
                        across: layout
                            .across
                            .iter()
                            .zip(slot_a.across.iter())
                            .map(|(&attr, &code)| index.value(attr, code).to_string())
                            .collect(),
                    },
                    triples,
                    count,
                });
            }
        }

        Self {
            key,
            values,
            items,
            nb_tuples,
            cells,
            groups,
        }
    }

    /// Stable identifier of the by-level (its ordinal as a string)
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Values of the by attributes
    #[inline]
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Global ids of the by-level's items, indexed by local id
    #[inline]
    pub fn items(&self) -> &[ItemId] {
        &self.items
    }

    #[inline]
    pub fn global_id(&self, local: LocalId) -> ItemId {
        self.items[local as usize]
    }

    /// Distinct full attribute tuples among the by-level's items
    #[inline]
    pub fn nb_tuples(&self) -> usize {
        self.nb_tuples
    }

    #[inline]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    #[inline]
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Number of triplets before any threshold
    pub fn triplet_count(&self) -> u64 {
        self.groups.iter().map(|g| g.count).sum()
    }

    /// Distinct on values present in the by-level
    pub fn on_values(&self, on: usize) -> usize {
        let mut codes: Vec<ValueCode> = self.cells.iter().map(|c| c.tuple[on]).collect();
        codes.sort_unstable();
        codes.dedup();
        codes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triple_count_excludes_diagonal() {
        assert_eq!(triple_count(2, 3, 4, false), 24);
        assert_eq!(triple_count(3, 2, 3, true), 12);
        assert_eq!(triple_count(1, 5, 1, true), 0);
    }
}
