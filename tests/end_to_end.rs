//! End-to-end tests for full similarity jobs.
//!
//! These run the configuration-driven pipeline (model -> recommender ->
//! scheduler -> writer -> sink) on synthetic data and check the output
//! against a brute-force reference.

use affinity::config::RunConfig;
use affinity::job;
use affinity::model::{DataModel, EntityId, InMemoryDataModel};
use affinity::recommender::{Recommender, RecommenderBuilder, Target, UserBasedRecommenderBuilder};
use affinity::scheduler::{Scheduler, SchedulerConfig};
use affinity::similarity::{Similarity, TanimotoCoefficient};
use affinity::writer::{JsonLinesSink, MemorySink, RecordLayout, ResultWriter, WriterConfig};
use rand::prelude::*;
use std::collections::{HashMap, HashSet};
use std::io::{BufRead, BufReader, Cursor};
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Random binary preferences: each user picks a few items from a skewed pool.
fn synthetic_model(users: i64, items: i64, seed: u64) -> Arc<InMemoryDataModel> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut prefs = Vec::new();
    for user in 0..users {
        let count = rng.gen_range(1..=8);
        for _ in 0..count {
            // Squaring skews picks toward low item IDs so overlaps are common.
            let r: f64 = rng.gen();
            let item = ((r * r) * items as f64) as i64;
            prefs.push((user, item));
        }
    }
    Arc::new(InMemoryDataModel::from_preferences(prefs).unwrap())
}

/// Brute-force top-n by sorting every candidate.
fn reference_top_n(model: Arc<dyn DataModel>, query: EntityId, n: usize) -> Vec<(EntityId, f64)> {
    let sim = TanimotoCoefficient::new(model.clone());
    let mut scored: Vec<(EntityId, f64)> = model
        .user_ids()
        .unwrap()
        .into_iter()
        .filter(|&other| other != query)
        .map(|other| (other, sim.user_similarity(query, other).unwrap()))
        .filter(|(_, s)| !s.is_nan())
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    scored.truncate(n);
    scored
}

// =============================================================================
// Full job
// =============================================================================

#[test]
fn user_job_matches_brute_force() {
    init_tracing();
    let model = synthetic_model(120, 60, 42);
    let sink = Arc::new(MemorySink::new());
    let config = RunConfig {
        num_of_neighbors: 7,
        num_of_threads: 4,
        ..RunConfig::default()
    };

    let report = job::run(&config, model.clone(), sink.clone()).unwrap();
    assert_eq!(report.run.total, 120);
    assert_eq!(report.run.processed, 120);
    assert_eq!(report.run.failed, 0);
    assert_eq!(report.writer.written, 120);
    assert!(report.close.flush_ok);

    let records = sink.records();
    let owners: HashSet<EntityId> = records.iter().map(|r| r.owner_id).collect();
    assert_eq!(owners.len(), 120, "every user written exactly once");

    for record in &records {
        let expected = reference_top_n(model.clone(), record.owner_id, 7);
        let actual: Vec<(EntityId, f64)> =
            record.neighbors.iter().map(|n| (n.id, n.value)).collect();
        assert_eq!(actual, expected, "user {}", record.owner_id);
    }
}

#[test]
fn thread_count_does_not_change_output() {
    let model = synthetic_model(80, 40, 7);

    let run_with = |threads: usize| {
        let sink = Arc::new(MemorySink::new());
        let config = RunConfig {
            num_of_neighbors: 5,
            num_of_threads: threads,
            ..RunConfig::default()
        };
        job::run(&config, model.clone(), sink.clone()).unwrap();
        let mut out: HashMap<EntityId, Vec<(EntityId, u64)>> = HashMap::new();
        for r in sink.records() {
            out.insert(
                r.owner_id,
                r.neighbors.iter().map(|n| (n.id, n.value.to_bits())).collect(),
            );
        }
        out
    };

    assert_eq!(run_with(1), run_with(6));
}

#[test]
fn item_job_from_json_settings() {
    let model = synthetic_model(50, 30, 3);
    let sink = Arc::new(MemorySink::new());
    let config = RunConfig::from_json_str(
        r#"{
            "target": "items",
            "num_of_items": 3,
            "num_of_threads": 2,
            "similarity": "jaccard",
            "writer": { "cache_size": 0 }
        }"#,
    )
    .unwrap();

    let report = job::run(&config, model.clone(), sink.clone()).unwrap();
    assert_eq!(report.run.total, model.num_items());
    assert_eq!(report.writer.deduplicated, 0);

    let mapping = sink.mapping().unwrap();
    assert!(mapping.to_string().contains("item_id"));
    for record in sink.records() {
        assert!(record.neighbors.len() <= 3);
        assert!(record.neighbors.iter().all(|n| n.id != record.owner_id));
    }
}

// =============================================================================
// Time budget
// =============================================================================

/// Slow user-based recommender; every query sleeps before answering.
struct Sluggish {
    inner: Arc<dyn Recommender>,
    delay: Duration,
}

impl std::fmt::Display for Sluggish {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sluggish({})", self.inner)
    }
}

impl Recommender for Sluggish {
    fn most_similar(&self, id: EntityId, n: usize) -> affinity::Result<affinity::NeighborList> {
        std::thread::sleep(self.delay);
        self.inner.most_similar(id, n)
    }

    fn target(&self) -> Target {
        self.inner.target()
    }
}

struct SluggishBuilder(Duration);

impl RecommenderBuilder for SluggishBuilder {
    fn build_recommender(
        &self,
        model: Arc<dyn DataModel>,
    ) -> affinity::Result<Arc<dyn Recommender>> {
        let inner = UserBasedRecommenderBuilder::default().build_recommender(model)?;
        Ok(Arc::new(Sluggish {
            inner,
            delay: self.0,
        }))
    }
}

#[test]
fn budget_stops_claiming_and_closes_writer() {
    init_tracing();
    let model = synthetic_model(400, 50, 11);
    let sink = Arc::new(MemorySink::new());
    let writer = Arc::new(
        ResultWriter::new(sink.clone(), RecordLayout::users(), WriterConfig::default()).unwrap(),
    );

    let report = job::compute(
        &SluggishBuilder(Duration::from_millis(10)),
        model,
        Target::Users,
        None,
        writer.clone(),
        SchedulerConfig {
            num_threads: 2,
            num_neighbors: 5,
            max_duration: Some(Duration::from_millis(150)),
            grace_period: Duration::from_secs(2),
        },
    )
    .unwrap();

    assert!(report.run.timed_out);
    assert!(report.run.unclaimed > 0);
    assert_eq!(report.run.stragglers, 0);
    assert!(writer.is_closed());
    assert_eq!(sink.flush_count(), 1);

    // Whatever was computed is durable and unique.
    let owners: Vec<EntityId> = sink.records().iter().map(|r| r.owner_id).collect();
    let unique: HashSet<EntityId> = owners.iter().copied().collect();
    assert_eq!(owners.len(), unique.len());
    assert_eq!(owners.len() as u64, report.run.processed);
}

// =============================================================================
// Writer deduplication across runs
// =============================================================================

#[test]
fn rerun_through_same_writer_is_deduplicated() {
    let model: Arc<dyn DataModel> = synthetic_model(60, 30, 5);
    let sink = Arc::new(MemorySink::new());
    let writer = Arc::new(
        ResultWriter::new(
            sink.clone(),
            RecordLayout::users(),
            WriterConfig {
                verbose: true,
                cache_size: 100,
                ..WriterConfig::default()
            },
        )
        .unwrap(),
    );
    let recommender = UserBasedRecommenderBuilder::default()
        .build_recommender(model.clone())
        .unwrap();
    let scheduler = Scheduler::new(SchedulerConfig {
        num_threads: 3,
        num_neighbors: 4,
        ..SchedulerConfig::default()
    })
    .unwrap();

    let ids = model.user_ids().unwrap();
    scheduler.run(recommender.clone(), ids.clone(), writer.clone()).unwrap();
    scheduler.run(recommender, ids, writer.clone()).unwrap();

    let stats = writer.stats();
    assert_eq!(stats.written, 60);
    assert_eq!(stats.deduplicated, 60);
    assert_eq!(sink.write_count(), 60);
}

// =============================================================================
// File output
// =============================================================================

#[test]
fn json_lines_file_output() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("user_similarity.jsonl");

    let input = "\
{\"user_id\": 1, \"item_id\": 10}
{\"user_id\": 1, \"item_id\": 11}
{\"user_id\": 2, \"item_id\": 11}

{\"user_id\": 2, \"item_id\": 12, \"value\": 4.5}
{\"user_id\": 3, \"item_id\": 99}
";
    let model = Arc::new(InMemoryDataModel::from_json_lines(Cursor::new(input))?);
    let sink = Arc::new(JsonLinesSink::create(&path)?);
    let config = RunConfig {
        num_of_threads: 2,
        ..RunConfig::default()
    };

    let report = job::run(&config, model, sink)?;
    assert_eq!(report.run.processed, 3);

    let mut docs: Vec<serde_json::Value> = BufReader::new(std::fs::File::open(&path)?)
        .lines()
        .map(|line| -> anyhow::Result<serde_json::Value> { Ok(serde_json::from_str(&line?)?) })
        .collect::<anyhow::Result<_>>()?;
    docs.sort_by_key(|d| d["user_id"].as_i64());
    assert_eq!(docs.len(), 3);

    // Users 1 and 2 share item 11 out of three distinct items.
    let user1 = &docs[0];
    assert_eq!(user1["user_id"], 1);
    assert_eq!(user1["users"][0]["user_id"], 2);
    let value = user1["users"][0]["value"].as_f64().unwrap();
    assert!((value - 1.0 / 3.0).abs() < 1e-12);
    assert!(user1["@timestamp"].as_str().unwrap().ends_with('Z'));

    // User 3 overlaps nobody.
    assert_eq!(docs[2]["users"].as_array().unwrap().len(), 0);
    Ok(())
}
