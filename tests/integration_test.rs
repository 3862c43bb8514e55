// Integration tests for abx
use abx::cli::task_parser;
use abx_core::{Error, GenerateOptions, ItemTable, Task, TaskConfig};
use abx_similarity::{
    analyze, analyze_to_path, compute_distances, score, summarize, DistanceConfig, Dtw, FeatureSeq,
    InMemoryFeatures, JsonLinesFeatures,
};
use abx_storage::{DistanceFile, ScoreFile, TaskFile};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeSet, HashMap};
use tempfile::TempDir;

type TripletSet = BTreeSet<[u64; 3]>;

fn set(triplets: &[[u64; 3]]) -> TripletSet {
    triplets.iter().copied().collect()
}

/// Write `ItemTable::product(base, n)` to disk, as a user would provide it
fn item_file(dir: &TempDir, base: usize, n: usize) -> std::path::PathBuf {
    let path = dir.path().join("data.item");
    let mut buf = Vec::new();
    ItemTable::product(base, n).write_to(&mut buf).unwrap();
    std::fs::write(&path, buf).unwrap();
    path
}

fn generate(dir: &TempDir, task: &Task, options: &GenerateOptions) -> TaskFile {
    let path = dir.path().join("task.abx");
    TaskFile::write(&path, task, options, &mut StdRng::seed_from_u64(42), Some(42)).unwrap();
    TaskFile::open(&path).unwrap()
}

#[test]
fn test_basic_task() {
    let dir = TempDir::new().unwrap();
    let items = ItemTable::from_path(item_file(&dir, 2, 3)).unwrap();
    let task = Task::new(items, TaskConfig::new("c0").across(["c1"]).by(["c2"])).unwrap();

    let stats = task.stats();
    assert_eq!(stats.nb_blocks, 8);
    assert_eq!(stats.nb_triplets, 8);
    assert_eq!(stats.nb_by_levels, 2);

    let file = generate(&dir, &task, &GenerateOptions::default());
    let expected = set(&[[0, 1, 2], [1, 0, 3], [2, 3, 0], [3, 2, 1]]);
    for key in ["0", "1"] {
        assert_eq!(set(&file.triplets(key).unwrap()), expected);
        assert_eq!(file.pairs(key).unwrap().len(), 4);
    }
}

#[test]
fn test_multiple_across() {
    let dir = TempDir::new().unwrap();
    let task = Task::new(
        ItemTable::product(2, 3),
        TaskConfig::new("c0").across(["c1", "c2"]),
    )
    .unwrap();

    let stats = task.stats();
    assert_eq!((stats.nb_blocks, stats.nb_triplets, stats.nb_by_levels), (8, 8, 1));

    let file = generate(&dir, &task, &GenerateOptions::default());
    assert_eq!(
        set(&file.triplets("0").unwrap()),
        set(&[
            [0, 1, 6],
            [1, 0, 7],
            [2, 3, 4],
            [3, 2, 5],
            [4, 5, 2],
            [5, 4, 3],
            [6, 7, 0],
            [7, 6, 1],
        ])
    );
}

#[test]
fn test_no_across() {
    let dir = TempDir::new().unwrap();
    let task = Task::new(ItemTable::product(2, 3), TaskConfig::new("c0").by(["c2"])).unwrap();
    let stats = task.stats();
    assert_eq!((stats.nb_blocks, stats.nb_triplets, stats.nb_by_levels), (8, 16, 2));

    let file = generate(&dir, &task, &GenerateOptions::default());
    assert_eq!(file.nb_triplets().unwrap(), 16);
    let expected = set(&[
        [0, 1, 2],
        [0, 3, 2],
        [1, 0, 3],
        [1, 2, 3],
        [2, 1, 0],
        [2, 3, 0],
        [3, 0, 1],
        [3, 2, 1],
    ]);
    for key in ["0", "1"] {
        assert_eq!(set(&file.triplets(key).unwrap()), expected);
        // every pair of the by-level's four items is scored
        assert_eq!(file.pairs(key).unwrap().len(), 6);
    }
}

#[test]
fn test_generation_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let task = Task::new(
        ItemTable::product(3, 3),
        TaskConfig::new("c0").across(["c1"]).by(["c2"]),
    )
    .unwrap();
    let write = |name: &str, seed: u64| {
        let path = dir.path().join(name);
        let mut rng = StdRng::seed_from_u64(seed);
        TaskFile::write(&path, &task, &GenerateOptions::default(), &mut rng, Some(seed)).unwrap();
        TaskFile::open(&path).unwrap()
    };

    let first = write("first.abx", 1);
    let second = write("second.abx", 2);
    assert_eq!(first.levels().len(), second.levels().len());
    for level in first.levels() {
        let key = level.key.as_str();
        assert_eq!(set(&first.triplets(key).unwrap()), set(&second.triplets(key).unwrap()));
        let pairs = |file: &TaskFile| -> BTreeSet<(u64, u64)> {
            file.pairs(key).unwrap().into_iter().collect()
        };
        assert_eq!(pairs(&first), pairs(&second));
    }
}

#[test]
fn test_multiple_by() {
    let dir = TempDir::new().unwrap();
    let task = Task::new(
        ItemTable::product(3, 4),
        TaskConfig::new("c0").by(["c1", "c2", "c3"]),
    )
    .unwrap();
    let stats = task.stats();
    assert_eq!((stats.nb_blocks, stats.nb_triplets, stats.nb_by_levels), (81, 0, 27));
    assert!(stats.nb_by_levels <= stats.nb_blocks);

    let file = generate(&dir, &task, &GenerateOptions::default());
    assert_eq!(file.nb_triplets().unwrap(), 0);
    assert_eq!(file.levels().len(), 27);
}

#[test]
fn test_item_filter() {
    let dir = TempDir::new().unwrap();
    let config = TaskConfig::new("c0")
        .across(["c1"])
        .by(["c2"])
        .filter("[attr == 0 for attr in c3]");
    let task = Task::new(ItemTable::product(2, 4), config).unwrap();
    let stats = task.stats();
    assert_eq!((stats.nb_blocks, stats.nb_triplets, stats.nb_by_levels), (8, 8, 2));

    let file = generate(&dir, &task, &GenerateOptions::default());
    let expected = set(&[[0, 1, 2], [1, 0, 3], [2, 3, 0], [3, 2, 1]]);
    for key in ["0", "1"] {
        assert_eq!(set(&file.triplets(key).unwrap()), expected);
    }
}

#[test]
fn test_role_filters() {
    let cases: [(&str, [[u64; 3]; 4]); 3] = [
        ("[attr == 0 for attr in c0_A]", [[0, 1, 2], [0, 3, 2], [2, 1, 0], [2, 3, 0]]),
        ("[attr == 0 for attr in c1_B]", [[0, 1, 2], [1, 0, 3], [2, 1, 0], [3, 0, 1]]),
        ("[attr == 0 for attr in c1_X]", [[2, 1, 0], [2, 3, 0], [3, 0, 1], [3, 2, 1]]),
    ];

    for (filter, expected) in cases {
        let dir = TempDir::new().unwrap();
        let task = Task::new(
            ItemTable::product(2, 2),
            TaskConfig::new("c0").filter(filter),
        )
        .unwrap();
        let stats = task.stats();
        let counts = (stats.nb_blocks, stats.nb_triplets, stats.nb_by_levels);
        assert_eq!(counts, (4, 4, 1), "{}", filter);

        let file = generate(&dir, &task, &GenerateOptions::default());
        assert_eq!(set(&file.triplets("0").unwrap()), set(&expected), "{}", filter);
    }
}

#[test]
fn test_parser_matches_constructor() {
    let dir = TempDir::new().unwrap();
    let db = item_file(&dir, 2, 3);
    let args = task_parser(&format!("{} -o c0 -a c1 -b c2", db.display())).unwrap();
    let parsed = Task::new(ItemTable::from_path(&args.database).unwrap(), args.config()).unwrap();
    let built = Task::new(
        ItemTable::product(2, 3),
        TaskConfig::new("c0").across(["c1"]).by(["c2"]),
    )
    .unwrap();
    assert_eq!(parsed.stats(), built.stats());
    assert_eq!(parsed.triplets("0").unwrap(), built.triplets("0").unwrap());
}

#[test]
fn test_invalid_configurations() {
    let items = ItemTable::product(2, 3);
    for config in [
        TaskConfig::new("c9"),
        TaskConfig::new("c0").across(["c0"]),
        TaskConfig::new("c0").across(["c1"]).by(["c1"]),
        TaskConfig::new("c0").by(["c2", "c2"]),
    ] {
        assert!(matches!(Task::new(items.clone(), config), Err(Error::InvalidConfig(_))));
    }
    assert!(matches!(
        Task::new(items, TaskConfig::new("c0").filter("c1_Q == 0")),
        Err(Error::Filter { .. })
    ));
}

/// Features whose first coordinate is the on value: X always lands with A
fn on_features(items: &ItemTable, on: usize) -> InMemoryFeatures {
    (0..items.len())
        .map(|id| {
            let value: f32 = items.value(id, on).parse().unwrap();
            (id as u64, FeatureSeq::new(vec![vec![value, 1.0], vec![value, 1.0]]).unwrap())
        })
        .collect()
}

fn run_pipeline(
    dir: &TempDir,
    task: &TaskFile,
    features: &InMemoryFeatures,
    config: &DistanceConfig,
) -> Vec<abx_similarity::AnalysisRow> {
    let distances = dir.path().join("distances.abx");
    let scores = dir.path().join("scores.abx");
    compute_distances(features, task, &distances, &Dtw::euclidean(), config).unwrap();
    score(task, &DistanceFile::open(&distances).unwrap(), &scores).unwrap();
    analyze(task, &ScoreFile::open(&scores).unwrap()).unwrap()
}

#[test]
fn test_end_to_end_constant_distance() {
    let dir = TempDir::new().unwrap();
    let task = Task::new(
        ItemTable::product(3, 3),
        TaskConfig::new("c0").across(["c1"]).by(["c2"]),
    )
    .unwrap();
    let file = generate(&dir, &task, &GenerateOptions::default());

    let features: InMemoryFeatures = (0..27u64)
        .map(|id| (id, FeatureSeq::from_vector(vec![1.0])))
        .collect();
    let constant = |_: &FeatureSeq, _: &FeatureSeq| 1.0;

    let distances = dir.path().join("distances.abx");
    let scores = dir.path().join("scores.abx");
    compute_distances(&features, &file, &distances, &constant, &DistanceConfig::default()).unwrap();
    score(&file, &DistanceFile::open(&distances).unwrap(), &scores).unwrap();
    let rows = analyze(&file, &ScoreFile::open(&scores).unwrap()).unwrap();

    let group_sizes: HashMap<(String, String, String, Vec<String>), u64> = task
        .by_levels()
        .iter()
        .flat_map(|level| {
            level.groups().iter().map(move |g| {
                (
                    (
                        level.key().to_string(),
                        g.label.on_a.clone(),
                        g.label.on_b.clone(),
                        g.label.across.clone(),
                    ),
                    g.count,
                )
            })
        })
        .collect();

    assert_eq!(rows.len(), group_sizes.len());
    for row in &rows {
        // Every comparison is a tie
        assert_eq!(row.score, 0.5);
        let key = (row.by_level.clone(), row.on_1.clone(), row.on_2.clone(), row.across.clone());
        assert_eq!(row.n, group_sizes[&key]);
    }
}

#[test]
fn test_end_to_end_threshold() {
    let dir = TempDir::new().unwrap();
    let items = ItemTable::product(3, 3);
    let features = on_features(&items, 0);
    let task = Task::new(items, TaskConfig::new("c0").across(["c1"])).unwrap();
    assert!(task.by_levels()[0].groups().iter().all(|g| g.count > 2));
    let file = generate(&dir, &task, &GenerateOptions::with_threshold(2));

    assert_eq!(file.manifest().threshold, Some(2));
    let rows = run_pipeline(&dir, &file, &features, &DistanceConfig::default());
    assert!(!rows.is_empty());
    for row in &rows {
        assert_eq!(row.n, 2);
        assert_eq!(row.score, 1.0);
    }
}

#[test]
fn test_end_to_end_parallel_matches_sequential() {
    let dir = TempDir::new().unwrap();
    let items = ItemTable::product(3, 3);
    let features = on_features(&items, 0);
    let task = Task::new(items, TaskConfig::new("c0").by(["c2"])).unwrap();
    let file = generate(&dir, &task, &GenerateOptions::default());

    let sequential = run_pipeline(&dir, &file, &features, &DistanceConfig::default());
    let parallel = run_pipeline(
        &dir,
        &file,
        &features,
        &DistanceConfig {
            n_workers: 3,
            shard_size: 2,
        },
    );
    assert_eq!(sequential, parallel);
    assert_eq!(summarize(&sequential).unwrap().score, 1.0);
}

#[test]
fn test_analysis_table_layout() {
    let dir = TempDir::new().unwrap();
    let items = ItemTable::product(2, 3);
    let task = Task::new(items, TaskConfig::new("c0").across(["c1"]).by(["c2"])).unwrap();
    let file = generate(&dir, &task, &GenerateOptions::default());

    let features_path = dir.path().join("features.jsonl");
    let lines: Vec<String> = (0..8)
        .map(|id| format!("{{\"item\": {}, \"features\": [[{}.0, 1.0]]}}", id, id % 2))
        .collect();
    std::fs::write(&features_path, lines.join("\n")).unwrap();
    let features = JsonLinesFeatures::from_path(&features_path).unwrap();

    let distances = dir.path().join("distances.abx");
    let scores = dir.path().join("scores.abx");
    let output = dir.path().join("analysis.tsv");
    let config = DistanceConfig::default();
    compute_distances(&features, &file, &distances, &Dtw::cosine(), &config).unwrap();
    score(&file, &DistanceFile::open(&distances).unwrap(), &scores).unwrap();
    let rows = analyze_to_path(&file, &ScoreFile::open(&scores).unwrap(), &output).unwrap();

    let text = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "c2\tc0_1\tc0_2\tc1\tscore\tn");
    assert_eq!(lines.len(), rows.len() + 1);
    assert_eq!(lines[1].split('\t').count(), 6);
}

#[test]
fn test_stale_files_rejected() {
    let dir = TempDir::new().unwrap();
    let small = Task::new(ItemTable::product(2, 2), TaskConfig::new("c0")).unwrap();
    let file = generate(&dir, &small, &GenerateOptions::default());

    // Distances written for another task
    let other_dir = TempDir::new().unwrap();
    let large = Task::new(ItemTable::product(3, 2), TaskConfig::new("c0")).unwrap();
    let other = generate(&other_dir, &large, &GenerateOptions::default());
    let features: InMemoryFeatures = (0..9u64)
        .map(|id| (id, FeatureSeq::from_vector(vec![id as f32])))
        .collect();
    let distances = other_dir.path().join("distances.abx");
    let config = DistanceConfig::default();
    compute_distances(&features, &other, &distances, &Dtw::euclidean(), &config).unwrap();

    let distances = DistanceFile::open(&distances).unwrap();
    let err = score(&file, &distances, &dir.path().join("s.abx")).unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
}
