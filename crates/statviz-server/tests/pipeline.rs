//! End-to-end pipeline tests over an in-memory store and the fixture
//! interpreter. No network, no files.

use serde_json::json;
use statviz_catalog::SchemaCatalog;
use statviz_model::{ChartKind, ChartSpec, Interpretation, NlRequest, QueryRequest};
use statviz_server::llm::{FixtureInterpreter, Interpreter};
use statviz_server::pipeline::ChartPipeline;
use statviz_store::{StoreConfig, StorePool};
use std::sync::Arc;

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

const BUNDESLIGA_PROMPT: &str = "buts totaux par saison en bundesliga";

const BUNDESLIGA_SQL: &str = "SELECT s.seasonLabel AS season, SUM(stm.value) AS goals \
     FROM statTeamMatch stm \
     JOIN statName sn ON stm.statNameId = sn.statNameId \
     JOIN match m ON stm.matchId = m.matchId \
     LEFT JOIN season s ON m.seasonId = s.seasonId \
     WHERE sn.statNameLib = 'SCORE' \
     GROUP BY s.seasonLabel";

fn seeded_connection() -> duckdb::Connection {
    let conn = duckdb::Connection::open_in_memory().unwrap();
    conn.execute_batch(
        r#"
        CREATE TABLE team (teamId INTEGER, teamName VARCHAR, leagueId INTEGER);
        INSERT INTO team VALUES (1, 'Bayern', 1), (2, 'Dortmund', 1);

        CREATE SCHEMA bl1;
        CREATE TABLE bl1.season (seasonId INTEGER, seasonLabel VARCHAR);
        CREATE TABLE bl1."match" (matchId INTEGER, seasonId INTEGER, homeTeamId INTEGER, awayTeamId INTEGER);
        CREATE TABLE bl1.statName (statNameId INTEGER, statNameLib VARCHAR);
        CREATE TABLE bl1.statTeamMatch (matchId INTEGER, teamId INTEGER, statNameId INTEGER, value DOUBLE);

        INSERT INTO bl1.season VALUES (1, '2022/23'), (2, '2023/24');
        INSERT INTO bl1."match" VALUES (10, 1, 1, 2), (11, 2, 1, 2);
        INSERT INTO bl1.statName VALUES (1, 'SCORE');
        INSERT INTO bl1.statTeamMatch VALUES
            (10, 1, 1, 3), (10, 2, 1, 1),
            (11, 1, 1, 2), (11, 2, 1, 2);
        "#,
    )
    .unwrap();
    conn
}

fn pipeline_with(interpreter: Arc<dyn Interpreter>) -> ChartPipeline {
    let catalog = Arc::new(SchemaCatalog::builtin());
    let store = StorePool::from_connections(vec![seeded_connection()], StoreConfig::default());
    ChartPipeline::new(catalog, store, interpreter)
}

fn pipeline() -> ChartPipeline {
    pipeline_with(Arc::new(FixtureInterpreter::new()))
}

fn bundesliga_interpretation() -> Interpretation {
    Interpretation {
        sql: BUNDESLIGA_SQL.to_string(),
        params: serde_json::Map::new(),
        chart: ChartSpec {
            kind: ChartKind::Line,
            x: "season".to_string(),
            y: "goals".to_string(),
            title: Some("Total goals per season".to_string()),
            x_label: None,
            y_label: None,
            options: Default::default(),
        },
        league: Some("Bundesliga".to_string()),
    }
}

#[tokio::test]
async fn test_direct_render_single_point_line() {
    let request: QueryRequest = serde_json::from_value(json!({
        "sql": "SELECT 1 AS x, 2 AS y",
        "chart": {"type": "line", "x": "x", "y": "y"}
    }))
    .unwrap();

    let png = pipeline().render(&request).await.unwrap();
    assert!(!png.is_empty());
    assert_eq!(&png[..8], &PNG_MAGIC);
}

#[tokio::test]
async fn test_render_base64_round_trip() {
    let request: QueryRequest = serde_json::from_value(json!({
        "sql": "SELECT seasonLabel AS season, seasonId AS n FROM season",
        "league": "Bundesliga",
        "chart": {"type": "bar", "x": "season", "y": "n"}
    }))
    .unwrap();

    let p = pipeline();
    let png = p.render(&request).await.unwrap();
    let encoded = p.render_base64(&request).await.unwrap();

    use base64::Engine as _;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.base64)
        .unwrap();
    assert_eq!(decoded, png);
    assert_eq!(encoded.content_type, "image/png");
}

#[tokio::test]
async fn test_dry_run_empty_result_reports_columns() {
    let request: QueryRequest = serde_json::from_value(json!({
        "sql": "SELECT teamName AS label, teamId AS value FROM team WHERE teamId > :min_id",
        "params": {"min_id": 999},
        "chart": {"type": "bar", "x": "label", "y": "value"}
    }))
    .unwrap();

    let preview = pipeline().dry_run(&request).await.unwrap();
    assert_eq!(preview.row_count, 0);
    assert_eq!(preview.columns, vec!["label", "value"]);
    assert!(preview.sample_rows.is_empty());
}

#[tokio::test]
async fn test_dry_run_selects_league_namespace() {
    let request: QueryRequest = serde_json::from_value(json!({
        "sql": "SELECT seasonLabel AS season FROM season",
        "league": "Bundesliga",
        "chart": {"type": "bar", "x": "season", "y": "season"}
    }))
    .unwrap();

    let preview = pipeline().dry_run(&request).await.unwrap();
    assert_eq!(preview.row_count, 2);
}

#[tokio::test]
async fn test_nl_chart_bundesliga_goals_per_season() {
    let interpreter =
        FixtureInterpreter::new().with(BUNDESLIGA_PROMPT, bundesliga_interpretation());
    let p = pipeline_with(Arc::new(interpreter));

    let request = NlRequest {
        prompt: BUNDESLIGA_PROMPT.to_string(),
        league: Some("Bundesliga".to_string()),
        club: None,
    };

    let png = p.nl_chart(&request).await.unwrap();
    assert!(!png.is_empty());
    assert_eq!(&png[..8], &PNG_MAGIC);
}

#[tokio::test]
async fn test_nl_chart_league_resolved_from_hint_alias() {
    // The interpretation leaves the league out; the hinted alias decides.
    let mut interpretation = bundesliga_interpretation();
    interpretation.league = None;
    let interpreter = FixtureInterpreter::new().with(BUNDESLIGA_PROMPT, interpretation);
    let p = pipeline_with(Arc::new(interpreter));

    let request = NlRequest {
        prompt: BUNDESLIGA_PROMPT.to_string(),
        league: None,
        club: None,
    };

    // The prompt itself names bundesliga, so the heuristics pin the league
    let png = p.nl_chart(&request).await.unwrap();
    assert_eq!(&png[..8], &PNG_MAGIC);
}

#[tokio::test]
async fn test_nl_chart_unresolved_prompt_is_ambiguous() {
    let p = pipeline();
    let request = NlRequest {
        prompt: "something entirely inscrutable".to_string(),
        league: None,
        club: None,
    };

    let err = p.nl_chart(&request).await.unwrap_err();
    assert_eq!(err.kind(), "ambiguous_query");
}

#[tokio::test]
async fn test_unsafe_sql_is_rejected() {
    let request: QueryRequest = serde_json::from_value(json!({
        "sql": "DROP TABLE team",
        "chart": {"type": "bar", "x": "x", "y": "y"}
    }))
    .unwrap();

    let err = pipeline().render(&request).await.unwrap_err();
    assert_eq!(err.kind(), "unsafe_query");
}

#[tokio::test]
async fn test_statement_chaining_is_rejected() {
    let request: QueryRequest = serde_json::from_value(json!({
        "sql": "SELECT 1 AS x; SELECT 2 AS y",
        "chart": {"type": "bar", "x": "x", "y": "y"}
    }))
    .unwrap();

    let err = pipeline().render(&request).await.unwrap_err();
    assert_eq!(err.kind(), "unsafe_query");
}

#[tokio::test]
async fn test_chart_column_mismatch_is_invalid_spec() {
    let request: QueryRequest = serde_json::from_value(json!({
        "sql": "SELECT 1 AS x, 2 AS y",
        "chart": {"type": "line", "x": "x", "y": "missing"}
    }))
    .unwrap();

    let err = pipeline().render(&request).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_chart_spec");
}

#[tokio::test]
async fn test_unknown_league_is_ambiguous() {
    let request: QueryRequest = serde_json::from_value(json!({
        "sql": "SELECT 1 AS x, 2 AS y",
        "league": "Kreisliga",
        "chart": {"type": "line", "x": "x", "y": "y"}
    }))
    .unwrap();

    let err = pipeline().render(&request).await.unwrap_err();
    assert_eq!(err.kind(), "ambiguous_query");
}

#[tokio::test]
async fn test_nl_chart_empty_result_renders_placeholder() {
    let mut interpretation = bundesliga_interpretation();
    interpretation.sql = "SELECT s.seasonLabel AS season, SUM(stm.value) AS goals \
         FROM statTeamMatch stm \
         JOIN statName sn ON stm.statNameId = sn.statNameId \
         JOIN match m ON stm.matchId = m.matchId \
         LEFT JOIN season s ON m.seasonId = s.seasonId \
         WHERE sn.statNameLib = 'REBOUNDS' \
         GROUP BY s.seasonLabel"
        .to_string();
    let interpreter = FixtureInterpreter::new().with(BUNDESLIGA_PROMPT, interpretation);
    let p = pipeline_with(Arc::new(interpreter));

    let request = NlRequest {
        prompt: BUNDESLIGA_PROMPT.to_string(),
        league: Some("Bundesliga".to_string()),
        club: None,
    };

    // No SCORE rows match, still a well-formed image
    let png = p.nl_chart(&request).await.unwrap();
    assert_eq!(&png[..8], &PNG_MAGIC);
}
