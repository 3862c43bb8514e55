use crate::block::{ByLevel, Layout};
use crate::filter::{Bindings, Filter, FilterScope, Role};
use crate::index::{AttributeIndex, ValueTuple};
use crate::item::{ItemId, ItemTable};
use crate::stats::Stats;
use crate::{Error, Result};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Configuration of an ABX task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Attribute A and X share and B does not
    pub on: String,
    /// Attributes A and B share and X differs on
    pub across: Vec<String>,
    /// Attributes splitting the items into independent by-levels
    pub by: Vec<String>,
    pub filters: Vec<String>,
}

impl TaskConfig {
    pub fn new(on: impl Into<String>) -> Self {
        Self {
            on: on.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn across<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.across.extend(attributes.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn by<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.by.extend(attributes.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filters.push(filter.into());
        self
    }
}

/// Unscoped view of one item's attribute tuple
struct TupleView<'t> {
    index: &'t AttributeIndex,
    tuple: &'t ValueTuple,
}

impl<'t> Bindings for TupleView<'t> {
    fn value(&self, _role: Option<Role>, attribute: usize) -> &str {
        self.index.value(attribute, self.tuple[attribute])
    }
}

/// An ABX task over an item table
///
/// Construction validates the configuration, compiles the filters, prunes
/// items rejected by unscoped filters and partitions the rest into by-levels.
/// Triplets are only produced by [`Task::generate`].
#[derive(Debug, Clone)]
pub struct Task {
    config: TaskConfig,
    items: ItemTable,
    index: AttributeIndex,
    on: usize,
    across: Vec<usize>,
    by: Vec<usize>,
    item_filters: Vec<Filter>,
    triplet_filters: Vec<Filter>,
    by_levels: Vec<ByLevel>,
}

impl Task {
    pub fn new(items: ItemTable, config: TaskConfig) -> Result<Self> {
        let position = |role: &str, name: &str| -> Result<usize> {
            items.column(name).ok_or_else(|| {
                Error::InvalidConfig(format!("unknown {} attribute `{}`", role, name))
            })
        };

        let on = position("on", &config.on)?;
        let across = config
            .across
            .iter()
            .map(|name| position("across", name))
            .collect::<Result<Vec<_>>>()?;
        let by = config
            .by
            .iter()
            .map(|name| position("by", name))
            .collect::<Result<Vec<_>>>()?;

        let mut seen = vec![on];
        for &attr in across.iter().chain(by.iter()) {
            if seen.contains(&attr) {
                return Err(Error::InvalidConfig(format!(
                    "attribute `{}` is used more than once among on/across/by",
                    items.attributes()[attr]
                )));
            }
            seen.push(attr);
        }

        let mut item_filters = Vec::new();
        let mut triplet_filters = Vec::new();
        for source in &config.filters {
            let filter = Filter::compile(source, items.attributes())?;
            match filter.scope() {
                FilterScope::Item => item_filters.push(filter),
                FilterScope::Triplet => triplet_filters.push(filter),
            }
        }

        let index = AttributeIndex::build(&items);
        let kept = Self::prune(&index, &item_filters);
        debug!(
            "{} of {} items kept by {} item filter(s)",
            kept.len(),
            index.len(),
            item_filters.len()
        );

        // By columns are constant inside a by-level and item filters are
        // already applied, so only these columns can tell two items apart
        let mut key_columns: Vec<usize> = std::iter::once(on)
            .chain(across.iter().copied())
            .chain(triplet_filters.iter().flat_map(Filter::columns))
            .collect();
        key_columns.sort_unstable();
        key_columns.dedup();

        let layout = Layout {
            index: &index,
            on,
            across: &across,
            filters: &triplet_filters,
            key_columns: &key_columns,
        };
        let by_levels = Self::partition(&index, &by, kept, &layout);

        let task = Self {
            config,
            items,
            on,
            across,
            by,
            item_filters,
            triplet_filters,
            by_levels,
            index,
        };
        info!(
            "Task on `{}`: {} by-level(s), {} triplet(s)",
            task.config.on,
            task.by_levels.len(),
            task.by_levels.iter().map(|l| l.triplet_count()).sum::<u64>()
        );
        Ok(task)
    }

    /// Items passing every unscoped filter, evaluated once per distinct tuple
    fn prune(index: &AttributeIndex, filters: &[Filter]) -> Vec<ItemId> {
        if filters.is_empty() {
            return (0..index.len()).collect();
        }

        let mut verdicts: AHashMap<&ValueTuple, bool> = AHashMap::new();
        (0..index.len())
            .filter(|&item| {
                let tuple = index.tuple(item);
                *verdicts.entry(tuple).or_insert_with(|| {
                    let view = TupleView { index, tuple };
                    filters.iter().all(|f| f.matches(&view))
                })
            })
            .collect()
    }

    /// Split items into by-levels, keyed by ordinal in order of first appearance
    fn partition(
        index: &AttributeIndex,
        by: &[usize],
        items: Vec<ItemId>,
        layout: &Layout,
    ) -> Vec<ByLevel> {
        let mut level_ids: AHashMap<ValueTuple, usize> = AHashMap::new();
        let mut levels: Vec<(ValueTuple, Vec<ItemId>)> = Vec::new();

        for item in items {
            let tuple = index.tuple(item);
            let key: ValueTuple = by.iter().map(|&b| tuple[b]).collect();
            let id = *level_ids.entry(key.clone()).or_insert_with(|| {
                levels.push((key, Vec::new()));
                levels.len() - 1
            });
            levels[id].1.push(item);
        }

        levels
            .into_iter()
            .enumerate()
            .map(|(ordinal, (codes, items))| {
                let values = by
                    .iter()
                    .zip(codes.iter())
                    .map(|(&attr, &code)| index.value(attr, code).to_string())
                    .collect();
                ByLevel::build(ordinal.to_string(), values, items, layout)
            })
            .collect()
    }

    #[inline]
    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    #[inline]
    pub fn items(&self) -> &ItemTable {
        &self.items
    }

    #[inline]
    pub fn index(&self) -> &AttributeIndex {
        &self.index
    }

    /// Column of the on attribute
    #[inline]
    pub fn on_column(&self) -> usize {
        self.on
    }

    #[inline]
    pub fn across_columns(&self) -> &[usize] {
        &self.across
    }

    #[inline]
    pub fn by_columns(&self) -> &[usize] {
        &self.by
    }

    pub fn filters(&self) -> impl Iterator<Item = &Filter> {
        self.item_filters.iter().chain(self.triplet_filters.iter())
    }

    #[inline]
    pub fn by_levels(&self) -> &[ByLevel] {
        &self.by_levels
    }

    pub fn by_level(&self, key: &str) -> Result<&ByLevel> {
        self.by_levels
            .iter()
            .find(|l| l.key() == key)
            .ok_or_else(|| Error::ByLevelNotFound(key.to_string()))
    }

    /// Closed-form statistics; no triplet is generated
    pub fn stats(&self) -> Stats {
        Stats::from_levels(&self.by_levels, self.on)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(base: usize, n: usize, config: TaskConfig) -> Task {
        Task::new(ItemTable::product(base, n), config).unwrap()
    }

    #[test]
    fn test_stats_across_and_by() {
        let stats = task(2, 3, TaskConfig::new("c0").across(["c1"]).by(["c2"])).stats();
        assert_eq!(stats.nb_blocks, 8);
        assert_eq!(stats.nb_triplets, 8);
        assert_eq!(stats.nb_by_levels, 2);
    }

    #[test]
    fn test_stats_multiple_across() {
        let stats = task(2, 3, TaskConfig::new("c0").across(["c1", "c2"])).stats();
        assert_eq!(stats.nb_blocks, 8);
        assert_eq!(stats.nb_triplets, 8);
        assert_eq!(stats.nb_by_levels, 1);
    }

    #[test]
    fn test_stats_no_across() {
        let stats = task(2, 3, TaskConfig::new("c0").by(["c2"])).stats();
        assert_eq!(stats.nb_blocks, 8);
        assert_eq!(stats.nb_triplets, 16);
        assert_eq!(stats.nb_by_levels, 2);
    }

    #[test]
    fn test_stats_multiple_by() {
        let stats = task(3, 4, TaskConfig::new("c0").by(["c1", "c2", "c3"])).stats();
        assert_eq!(stats.nb_blocks, 81);
        assert_eq!(stats.nb_triplets, 0);
        assert_eq!(stats.nb_by_levels, 27);
        assert_eq!(stats.empty_levels().count(), 27);
    }

    #[test]
    fn test_stats_item_filter() {
        let config = TaskConfig::new("c0")
            .across(["c1"])
            .by(["c2"])
            .filter("[attr == 0 for attr in c3]");
        let stats = task(2, 4, config).stats();
        assert_eq!(stats.nb_blocks, 8);
        assert_eq!(stats.nb_triplets, 8);
        assert_eq!(stats.nb_by_levels, 2);
    }

    #[test]
    fn test_stats_role_filters() {
        for filter in [
            "[attr == 0 for attr in c0_A]",
            "[attr == 0 for attr in c1_B]",
            "[attr == 0 for attr in c1_X]",
        ] {
            let stats = task(2, 2, TaskConfig::new("c0").filter(filter)).stats();
            assert_eq!(stats.nb_blocks, 4, "{}", filter);
            assert_eq!(stats.nb_triplets, 4, "{}", filter);
            assert_eq!(stats.nb_by_levels, 1, "{}", filter);
        }
    }

    #[test]
    fn test_by_level_keys_and_values() {
        let task = task(2, 3, TaskConfig::new("c0").across(["c1"]).by(["c2"]));
        let level = task.by_level("1").unwrap();
        assert_eq!(level.values(), &["1"]);
        assert_eq!(level.items(), &[4, 5, 6, 7]);
        assert!(matches!(task.by_level("2"), Err(Error::ByLevelNotFound(_))));
    }

    #[test]
    fn test_groups_follow_on_and_across() {
        let task = task(3, 3, TaskConfig::new("c0").across(["c1"]).by(["c2"]));
        let level = &task.by_levels()[0];
        // 3 on values for A, 2 for B, 3 across values
        assert_eq!(level.groups().len(), 18);
        assert!(level.groups().iter().all(|g| g.count == 2));
        assert_eq!(level.groups()[0].label.on_a, "0");
        assert_eq!(level.groups()[0].label.on_b, "1");
        assert_eq!(level.groups()[0].label.across, vec!["0".to_string()]);
    }

    #[test]
    fn test_unread_columns_do_not_split_cells() {
        let rows = (0..300)
            .map(|i| vec![format!("utt{}", i), (i % 2).to_string()])
            .collect();
        let items = ItemTable::new(vec!["id".to_string(), "phone".to_string()], rows).unwrap();
        let task = Task::new(items, TaskConfig::new("phone")).unwrap();

        let stats = task.stats();
        assert_eq!(stats.nb_triplets, 300 * 149 * 150);
        assert_eq!(stats.nb_blocks, 300);

        let level = &task.by_levels()[0];
        assert_eq!(level.cells().len(), 2);
        let stored: usize = level.groups().iter().map(|g| g.triples.len()).sum();
        assert!(stored <= level.cells().len().pow(3));
    }

    #[test]
    fn test_filter_columns_split_cells() {
        let rows = (0..8)
            .map(|i| vec![format!("utt{}", i), (i % 2).to_string(), (i / 4).to_string()])
            .collect();
        let items = ItemTable::new(
            vec!["id".to_string(), "phone".to_string(), "spk".to_string()],
            rows,
        )
        .unwrap();
        let plain = Task::new(items.clone(), TaskConfig::new("phone")).unwrap();
        assert_eq!(plain.by_levels()[0].cells().len(), 2);

        let filtered = Task::new(items, TaskConfig::new("phone").filter("spk_A == spk_X")).unwrap();
        assert_eq!(filtered.by_levels()[0].cells().len(), 4);
        // A and X share a speaker: 8 choices of A, 1 of X, 4 of B
        assert_eq!(filtered.stats().nb_triplets, 8 * 4);
    }

    #[test]
    fn test_unknown_attribute_is_config_error() {
        let err = Task::new(ItemTable::product(2, 2), TaskConfig::new("c7")).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let err = Task::new(
            ItemTable::product(2, 2),
            TaskConfig::new("c0").by(["c0"]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_bad_filter_fails_at_construction() {
        let config = TaskConfig::new("c0").filter("[attr == 0 for attr in c5_A]");
        let err = Task::new(ItemTable::product(2, 2), config).unwrap_err();
        assert!(matches!(err, Error::Filter { .. }));
    }

    #[test]
    fn test_single_on_value_yields_nothing() {
        let items = ItemTable::new(
            vec!["phone".to_string(), "spk".to_string()],
            vec![
                vec!["a".to_string(), "s1".to_string()],
                vec!["a".to_string(), "s2".to_string()],
            ],
        )
        .unwrap();
        let task = Task::new(items, TaskConfig::new("phone").across(["spk"])).unwrap();
        assert_eq!(task.stats().nb_triplets, 0);
        assert_eq!(task.stats().nb_blocks, 2);
    }
}
