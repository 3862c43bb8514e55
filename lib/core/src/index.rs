//! Attribute index
//!
//! Dictionary-encodes every attribute column of an [`ItemTable`]: each distinct
//! value gets a small integer code (in order of first appearance) and a
//! posting list of the items holding it. Items are then described by their
//! code tuple, which is what the partitioner and the generator work on.

use crate::item::{ItemId, ItemTable};
use ahash::AHashMap;
use smallvec::SmallVec;

/// Dictionary code of an attribute value
pub type ValueCode = u32;

/// Codes of one item, one per attribute, in header order
pub type ValueTuple = SmallVec<[ValueCode; 8]>;

#[derive(Debug, Clone, Default)]
struct Column {
    values: Vec<String>,
    codes: AHashMap<String, ValueCode>,
    postings: Vec<Vec<ItemId>>,
}

#[derive(Debug, Clone)]
pub struct AttributeIndex {
    attributes: Vec<String>,
    columns: Vec<Column>,
    tuples: Vec<ValueTuple>,
}

impl AttributeIndex {
    pub fn build(table: &ItemTable) -> Self {
        let attributes = table.attributes().to_vec();
        let mut columns = vec![Column::default(); attributes.len()];
        let mut tuples = Vec::with_capacity(table.len());

        for item in 0..table.len() {
            let tuple: ValueTuple = table
                .row(item)
                .iter()
                .zip(columns.iter_mut())
                .map(|(value, column)| {
                    let code = match column.codes.get(value) {
                        Some(&code) => code,
                        None => {
                            let code = column.values.len() as ValueCode;
                            column.values.push(value.clone());
                            column.codes.insert(value.clone(), code);
                            column.postings.push(Vec::new());
                            code
                        }
                    };
                    column.postings[code as usize].push(item);
                    code
                })
                .collect();
            tuples.push(tuple);
        }

        Self {
            attributes,
            columns,
            tuples,
        }
    }

    #[inline]
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    #[inline]
    pub fn attribute_position(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a == name)
    }

    /// Number of indexed items
    #[inline]
    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Decode a value code
    #[inline]
    pub fn value(&self, attribute: usize, code: ValueCode) -> &str {
        &self.columns[attribute].values[code as usize]
    }

    #[inline]
    pub fn code(&self, attribute: usize, value: &str) -> Option<ValueCode> {
        self.columns[attribute].codes.get(value).copied()
    }

    /// Distinct values of an attribute, indexed by code
    #[inline]
    pub fn distinct_values(&self, attribute: usize) -> &[String] {
        &self.columns[attribute].values
    }

    /// Items holding `value` for `attribute`, ascending
    pub fn items_with(&self, attribute: usize, value: &str) -> &[ItemId] {
        let column = &self.columns[attribute];
        column
            .codes
            .get(value)
            .map(|&code| column.postings[code as usize].as_slice())
            .unwrap_or(&[])
    }

    /// Code tuple of an item
    #[inline]
    pub fn tuple(&self, item: ItemId) -> &ValueTuple {
        &self.tuples[item]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_item_under_exactly_one_value() {
        let table = ItemTable::product(3, 2);
        let index = AttributeIndex::build(&table);

        for attribute in 0..2 {
            let mut seen = vec![0usize; table.len()];
            for value in index.distinct_values(attribute) {
                for &item in index.items_with(attribute, value) {
                    seen[item] += 1;
                }
            }
            assert!(seen.iter().all(|&n| n == 1));
        }
    }

    #[test]
    fn test_codes_follow_first_appearance() {
        let table = ItemTable::new(
            vec!["spk".to_string(), "phone".to_string()],
            vec![
                vec!["bob".to_string(), "a".to_string()],
                vec!["alice".to_string(), "b".to_string()],
                vec!["bob".to_string(), "b".to_string()],
            ],
        )
        .unwrap();
        let index = AttributeIndex::build(&table);

        assert_eq!(index.code(0, "bob"), Some(0));
        assert_eq!(index.code(0, "alice"), Some(1));
        assert_eq!(index.value(1, 1), "b");
        assert_eq!(index.items_with(1, "b"), &[1, 2]);
        assert_eq!(index.tuple(2).as_slice(), &[0, 1]);
        assert!(index.items_with(0, "carol").is_empty());
    }
}
