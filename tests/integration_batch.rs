//! Batch reconciliation integration tests
//!
//! Drives the full engine (scheduler, circuit, scorer, coordinator, store)
//! against scripted lookup clients, with tokio's paused clock standing in for
//! real backoff and pacing delays.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use reconcilr::batch::{BatchCoordinator, BatchMode, JobContextProvider, PropertyProfile, StaticContextProvider};
use reconcilr::domain::{
    Candidate, CellStatus, Datatype, FormatPattern, JobOutcome, Precision, PropertyConstraints, ReconciliationJob,
    Selection, SourceTier,
};
use reconcilr::error::Result;
use reconcilr::lookup::{LookupErrorKind, LookupHit, Reply, ScriptedLookupClient};
use reconcilr::resilience::{CircuitConfig, CircuitGuard, ManualClock, RetryingScheduler};
use reconcilr::scoring::{ConstraintScorer, ScoringConfig};
use reconcilr::store::ReconciliationStore;
use tempfile::TempDir;

struct Engine {
    coordinator: BatchCoordinator,
    primary: Arc<ScriptedLookupClient>,
    fallback: Arc<ScriptedLookupClient>,
    circuit: Arc<CircuitGuard>,
}

fn engine_with(
    primary: ScriptedLookupClient,
    fallback: ScriptedLookupClient,
    context: Arc<dyn JobContextProvider>,
    store: Arc<ReconciliationStore>,
) -> Engine {
    let primary = Arc::new(primary);
    let fallback = Arc::new(fallback);
    let circuit = Arc::new(CircuitGuard::with_clock(
        CircuitConfig::default(),
        Arc::new(ManualClock::new()),
    ));
    let scheduler = RetryingScheduler::new(primary.clone(), circuit.clone()).with_fallback(fallback.clone());
    let scorer = ConstraintScorer::new(ScoringConfig::default()).unwrap();
    let coordinator = BatchCoordinator::new(Arc::new(scheduler), Arc::new(scorer), store, context);
    Engine {
        coordinator,
        primary,
        fallback,
        circuit,
    }
}

fn engine(primary: ScriptedLookupClient, fallback: ScriptedLookupClient) -> Engine {
    engine_with(
        primary,
        fallback,
        Arc::new(author_profiles()),
        Arc::new(ReconciliationStore::new()),
    )
}

/// P50 holds people; P1 is an untyped free-text property
fn author_profiles() -> StaticContextProvider {
    StaticContextProvider::new().with_profile(
        "P50",
        PropertyProfile {
            constraints: PropertyConstraints {
                expected_entity_types: BTreeSet::from(["Q5".to_string()]),
                format_patterns: vec![FormatPattern::new(r"[A-Z][a-z]+ [A-Z][a-z]+")],
                datatype: Some(Datatype::EntityReference),
            },
            ..Default::default()
        },
    )
}

fn author(item: &str, value: &str) -> ReconciliationJob {
    ReconciliationJob::new(item, "P50", 0, value)
}

/// Scenario A: an untyped decade resolves locally
#[tokio::test(start_paused = true)]
async fn test_decade_resolves_without_lookup() -> Result<()> {
    let e = engine(ScriptedLookupClient::new("primary"), ScriptedLookupClient::new("fallback"));
    let job = ReconciliationJob::new("row-1", "P1", 0, "1990s");

    let report = e.coordinator.run_batch(vec![job.clone()], BatchMode::AutoAccept).await?;

    assert_eq!(e.primary.calls(), 0);
    assert_eq!(e.fallback.calls(), 0);
    assert_eq!(report.summary.auto_accepted, 1);

    let cell = e.coordinator.store().get(&job.key())?;
    assert!(cell.is_auto_accepted());
    match cell.selected_match {
        Some(Selection::Date(value)) => {
            assert_eq!(value.precision, Precision::Decade);
            assert_eq!(value.time, "+1990-00-00T00:00:00Z");
        }
        other => panic!("expected a date selection, got {:?}", other),
    }
    Ok(())
}

/// A short untyped number is looked up, not accepted as a year
#[tokio::test(start_paused = true)]
async fn test_untyped_short_number_is_looked_up() -> Result<()> {
    let e = engine(ScriptedLookupClient::new("primary"), ScriptedLookupClient::new("fallback"));
    let job = ReconciliationJob::new("row-1", "P1", 0, "747");

    let report = e.coordinator.run_batch(vec![job.clone()], BatchMode::AutoAccept).await?;

    assert_eq!(e.primary.calls(), 1);
    assert_eq!(e.primary.queries()[0].text, "747");
    assert_eq!(report.summary.auto_accepted, 0);
    assert_eq!(report.summary.no_matches, 1);
    assert!(e.coordinator.store().get(&job.key())?.selected_match.is_none());
    Ok(())
}

/// Scenario B: a perfect primary hit is auto-accepted
#[tokio::test(start_paused = true)]
async fn test_perfect_match_auto_accepted() -> Result<()> {
    let primary = ScriptedLookupClient::new("primary").with_script(
        "Jane Doe",
        vec![Reply::Hits(vec![LookupHit::new("E1", "Jane Doe").with_score(100.0)])],
    );
    let e = engine(primary, ScriptedLookupClient::new("fallback"));
    let job = author("row-1", "Jane Doe");

    e.coordinator.run_batch(vec![job.clone()], BatchMode::AutoAccept).await?;

    let cell = e.coordinator.store().get(&job.key())?;
    assert_eq!(cell.status, CellStatus::Reconciled);
    assert_eq!(cell.selected_match.as_ref().and_then(|s| s.entity_id()), Some("E1"));
    assert_eq!(cell.matches[0].id, "E1");
    let qualifier = cell.qualifier.expect("qualifier");
    assert!(qualifier.auto_accepted);
    assert_eq!(qualifier.reason, "100% confidence match");
    Ok(())
}

/// Scenario C: primary times out, fallback hit gets the flat score
#[tokio::test(start_paused = true)]
async fn test_fallback_candidate_awaits_review() -> Result<()> {
    let primary = ScriptedLookupClient::failing("primary", LookupErrorKind::Timeout);
    let fallback = ScriptedLookupClient::new("fallback").with_default(Reply::Hits(vec![LookupHit::new(
        "Q42", "Jane Doe",
    )]));
    let e = engine(primary, fallback);
    let job = author("row-1", "Jane Doe");

    let report = e.coordinator.run_batch(vec![job.clone()], BatchMode::AutoAccept).await?;

    assert_eq!(e.primary.calls(), 3);
    assert_eq!(e.fallback.calls(), 1);
    assert_eq!(report.summary.matches_available, 1);
    assert_eq!(report.summary.auto_accepted, 0);

    let cell = e.coordinator.store().get(&job.key())?;
    assert!(cell.awaiting_review());
    assert_eq!(cell.matches.len(), 1);
    let candidate = &cell.matches[0];
    assert_eq!(candidate.original_score, 80.0);
    assert_eq!(candidate.source_tier, SourceTier::FallbackSearch);
    assert!(candidate.score < 100.0);
    Ok(())
}

/// Scenario D: total outage yields no-match, not error
#[tokio::test(start_paused = true)]
async fn test_total_outage_is_no_match() -> Result<()> {
    let e = engine(
        ScriptedLookupClient::failing("primary", LookupErrorKind::Server),
        ScriptedLookupClient::failing("fallback", LookupErrorKind::Network),
    );
    let jobs: Vec<ReconciliationJob> = ["Ada Lovelace", "Alan Turing", "Grace Hopper", "Edsger Dijkstra", "Barbara Liskov"]
        .iter()
        .enumerate()
        .map(|(i, name)| author(&format!("row-{}", i), name))
        .collect();

    let report = e.coordinator.run_batch(jobs.clone(), BatchMode::AutoAccept).await?;

    assert_eq!(report.summary.no_matches, 5);
    assert_eq!(report.summary.errors, 0);
    for job in &jobs {
        assert_eq!(e.coordinator.store().get(&job.key())?.status, CellStatus::NoMatch);
    }
    let failures = e.circuit.failures("primary");
    assert!((1..=5).contains(&failures), "primary failures: {}", failures);
    Ok(())
}

/// Once the primary circuit opens, later jobs go straight to the fallback
#[tokio::test(start_paused = true)]
async fn test_open_circuit_stops_primary_calls() -> Result<()> {
    let e = engine(
        ScriptedLookupClient::failing("primary", LookupErrorKind::RateLimited),
        ScriptedLookupClient::new("fallback"),
    );
    let jobs: Vec<ReconciliationJob> = (0..8).map(|i| author(&format!("row-{}", i), "Jane Doe")).collect();

    e.coordinator.run_batch(jobs, BatchMode::AutoAccept).await?;

    assert!(e.circuit.should_skip("primary"));
    // the circuit opens partway through the second window; the third makes no primary calls
    let calls = e.primary.calls();
    assert!((16..=18).contains(&calls), "primary calls: {}", calls);
    assert_eq!(e.fallback.calls(), 8);
    Ok(())
}

/// Scenario E: type mismatch and failed format stack multiplicatively
#[test]
fn test_constraint_penalties_stack() {
    let scorer = ConstraintScorer::new(ScoringConfig::default()).unwrap();
    let constraints = PropertyConstraints {
        expected_entity_types: BTreeSet::from(["Q5".to_string()]),
        format_patterns: vec![FormatPattern::new(r"\d{4}")],
        datatype: None,
    };
    let candidate = Candidate::new("E7", "Acme", 90.0, SourceTier::PrimaryLookup).with_types(["Q43229"]);

    let scored = scorer.score(&candidate, &constraints, "not a year");

    assert!((scored.score - 50.4).abs() < 1e-9, "score {}", scored.score);
    assert_eq!(scored.original_score, 90.0);
    assert!((scored.constraint_score - 0.56).abs() < 1e-9);
}

/// P2: no adjustment path leaves 0..=100 or boosts more than 1.2x
#[test]
fn test_scores_stay_capped() {
    let scorer = ConstraintScorer::new(ScoringConfig::default()).unwrap();
    let datatypes = [
        None,
        Some(Datatype::ExternalId),
        Some(Datatype::EntityReference),
        Some(Datatype::String),
    ];
    let patterns = [vec![], vec![FormatPattern::new(r"[A-Z]\w+")], vec![FormatPattern::new(r"\d+")]];

    for original in [0.0, 0.0045, 10.0, 42.5, 83.4, 90.0, 99.9, 100.0] {
        for datatype in &datatypes {
            for format_patterns in &patterns {
                for tier in [SourceTier::PrimaryLookup, SourceTier::FallbackSearch] {
                    let constraints = PropertyConstraints {
                        expected_entity_types: BTreeSet::from(["Q5".to_string()]),
                        format_patterns: format_patterns.clone(),
                        datatype: datatype.clone(),
                    };
                    let candidate = Candidate::new("Q42", "Jane", original, tier).with_types(["Q5"]);
                    let scored = scorer.score(&candidate, &constraints, "Jane");
                    assert!((0.0..=100.0).contains(&scored.score));
                    assert!(
                        scored.score <= original * 1.2,
                        "{} -> {} under {:?}",
                        original,
                        scored.score,
                        constraints
                    );
                }
            }
        }
    }
}

/// P3: auto-acceptance follows the final score, not the lookup score
#[tokio::test(start_paused = true)]
async fn test_auto_accept_uses_final_score() -> Result<()> {
    let primary = ScriptedLookupClient::new("primary")
        .with_script(
            "Jane Doe",
            vec![Reply::Hits(vec![LookupHit::new("Q42", "Jane Doe").with_score(90.0).with_types(["Q5"])])],
        )
        .with_script(
            "John Roe",
            vec![Reply::Hits(vec![LookupHit::new("Q7", "John Roe").with_score(100.0).with_types(["Q43229"])])],
        )
        .with_script(
            "Mary Major",
            vec![Reply::Hits(vec![LookupHit::new("Q9", "Mary Major").with_score(99.0).with_types(["Q5"])])],
        );
    let e = engine(primary, ScriptedLookupClient::new("fallback"));
    let boosted = author("row-1", "Jane Doe");
    let penalised = author("row-2", "John Roe");
    let lifted = author("row-3", "Mary Major");

    let report = e
        .coordinator
        .run_batch(vec![boosted.clone(), penalised.clone(), lifted.clone()], BatchMode::Column)
        .await?;

    assert!(report.outcome(&boosted.key()).is_some_and(|o| o.is_auto_accepted()));
    assert!(report.outcome(&lifted.key()).is_some_and(|o| o.is_auto_accepted()));
    match report.outcome(&penalised.key()) {
        Some(JobOutcome::MatchesAvailable { best, .. }) => {
            assert_eq!(best.original_score, 100.0);
            assert!(best.score < 100.0);
        }
        other => panic!("expected matches for review, got {:?}", other),
    }

    for cell in e.coordinator.store().cells()? {
        let top_is_full = cell.matches.first().is_some_and(|c| c.score >= 100.0);
        assert_eq!(cell.is_auto_accepted(), top_is_full, "{}", cell.key);
    }
    Ok(())
}

/// A score just below 100 is left for review, never rounded into acceptance
#[tokio::test(start_paused = true)]
async fn test_near_full_score_awaits_review() -> Result<()> {
    let primary = ScriptedLookupClient::new("primary").with_script(
        "Jane Doe",
        vec![Reply::Hits(vec![LookupHit::new("E1", "Jane Doe").with_score(99.996)])],
    );
    let e = engine_with(
        primary,
        ScriptedLookupClient::new("fallback"),
        Arc::new(StaticContextProvider::new()),
        Arc::new(ReconciliationStore::new()),
    );
    let job = ReconciliationJob::new("row-1", "P1", 0, "Jane Doe");

    let report = e.coordinator.run_batch(vec![job.clone()], BatchMode::AutoAccept).await?;

    match report.outcome(&job.key()) {
        Some(JobOutcome::MatchesAvailable { best, .. }) => assert_eq!(best.score, 99.996),
        other => panic!("expected matches for review, got {:?}", other),
    }
    let cell = e.coordinator.store().get(&job.key())?;
    assert!(cell.awaiting_review());
    assert!(!cell.is_auto_accepted());
    Ok(())
}

/// P5: a bucket of 11 never has more than 3 lookups in flight
#[tokio::test(start_paused = true)]
async fn test_window_bounds_concurrency() -> Result<()> {
    let primary = ScriptedLookupClient::new("primary").with_latency(Duration::from_millis(250));
    let e = engine(primary, ScriptedLookupClient::new("fallback"));
    let jobs: Vec<ReconciliationJob> = (0..11).map(|i| author(&format!("row-{}", i), "Jane Doe")).collect();

    let report = e.coordinator.run_batch(jobs, BatchMode::AutoAccept).await?;

    assert_eq!(e.primary.calls(), 11);
    assert_eq!(e.primary.max_in_flight(), 3);
    assert_eq!(report.results.len(), 11);
    Ok(())
}

/// Column mode widens the window to 5
#[tokio::test(start_paused = true)]
async fn test_column_mode_window() -> Result<()> {
    let primary = ScriptedLookupClient::new("primary").with_latency(Duration::from_millis(250));
    let e = engine(primary, ScriptedLookupClient::new("fallback"));
    let jobs: Vec<ReconciliationJob> = (0..11).map(|i| author(&format!("row-{}", i), "Jane Doe")).collect();

    e.coordinator.run_batch(jobs, BatchMode::Column).await?;

    assert_eq!(e.primary.max_in_flight(), 5);
    Ok(())
}

/// P1: every job gets exactly one outcome, whatever happens underneath
#[tokio::test(start_paused = true)]
async fn test_every_job_classified() -> Result<()> {
    let primary = ScriptedLookupClient::new("primary")
        .with_script(
            "Jane Doe",
            vec![
                Reply::Fail(LookupErrorKind::Timeout),
                Reply::Hits(vec![LookupHit::new("Q42", "Jane Doe").with_score(100.0).with_types(["Q5"])]),
            ],
        )
        .with_script("Acme", vec![Reply::Fail(LookupErrorKind::Permanent)])
        .with_script("Globex", vec![Reply::Hits(vec![LookupHit::new("E5", "Globex Corp").with_score(64.0)])]);
    let fallback = ScriptedLookupClient::failing("fallback", LookupErrorKind::Server);
    let context = author_profiles().with_profile(
        "P577",
        PropertyProfile {
            constraints: PropertyConstraints::with_datatype(Datatype::Time),
            ..Default::default()
        },
    );
    let e = engine_with(
        primary,
        fallback,
        Arc::new(context),
        Arc::new(ReconciliationStore::new()),
    );

    let jobs = vec![
        author("row-1", "Jane Doe"),
        ReconciliationJob::new("row-1", "P1", 0, "Acme"),
        ReconciliationJob::new("row-2", "P1", 0, "Globex"),
        ReconciliationJob::new("row-2", "P1", 1, "   "),
        ReconciliationJob::new("row-3", "P577", 0, "17 May 2020"),
        ReconciliationJob::new("row-4", "P577", 0, "not a date"),
        ReconciliationJob::new("row-5", "P1", 0, "1871"),
    ];

    let report = e.coordinator.run_batch(jobs.clone(), BatchMode::AutoAccept).await?;

    assert_eq!(report.results.len(), jobs.len());
    assert_eq!(report.summary.total(), jobs.len());
    assert_eq!(report.summary.auto_accepted, 3);
    assert_eq!(report.summary.matches_available, 1);
    assert_eq!(report.summary.no_matches, 2);
    assert_eq!(report.summary.errors, 1);

    for job in &jobs {
        let cell = e.coordinator.store().get(&job.key())?;
        assert!(
            !matches!(cell.status, CellStatus::Queued | CellStatus::Processing),
            "{} left in {}",
            job.key(),
            cell.status
        );
    }
    Ok(())
}

/// A restarted batch over a saved snapshot re-queries nothing that settled
#[tokio::test(start_paused = true)]
async fn test_restart_from_snapshot() -> Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("cells.jsonl");
    let jobs = vec![author("row-1", "Jane Doe"), author("row-2", "John Roe")];

    let first = engine(
        ScriptedLookupClient::new("primary").with_script(
            "Jane Doe",
            vec![Reply::Hits(vec![LookupHit::new("E1", "Jane Doe").with_score(100.0)])],
        ),
        ScriptedLookupClient::new("fallback"),
    );
    first.coordinator.run_batch(jobs.clone(), BatchMode::AutoAccept).await?;
    first.coordinator.store().save_jsonl(&path)?;

    let restored = Arc::new(ReconciliationStore::load_jsonl(&path)?);
    let second = engine_with(
        ScriptedLookupClient::new("primary"),
        ScriptedLookupClient::new("fallback"),
        Arc::new(author_profiles()),
        restored,
    );
    let report = second.coordinator.run_batch(jobs, BatchMode::AutoAccept).await?;

    assert_eq!(second.primary.calls(), 0);
    assert_eq!(report.summary.auto_accepted, 1);
    assert_eq!(report.summary.no_matches, 1);
    Ok(())
}

/// P4: threshold, cool-down and a fresh count afterwards
#[test]
fn test_circuit_reset_after_cooldown() {
    let clock = Arc::new(ManualClock::new());
    let circuit = CircuitGuard::with_clock(CircuitConfig::default(), clock.clone());

    for _ in 0..5 {
        circuit.record_failure("primary");
    }
    assert!(circuit.should_skip("primary"));

    clock.advance(Duration::from_secs(61));
    assert!(!circuit.should_skip("primary"));

    circuit.record_failure("primary");
    assert_eq!(circuit.failures("primary"), 1);
    assert!(!circuit.should_skip("primary"));
}
