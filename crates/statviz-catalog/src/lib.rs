//! Schema catalog: leagues, table shapes, and grounding context
//!
//! The store is multi-namespace: one schema per league, every schema holding
//! the same table shape. The catalog describes that shape once, maps league
//! names (and their common aliases) to schemas, and renders the whole thing
//! as text context for the query interpreter.
//!
//! Read-only. Built once at process start, from the store's
//! `information_schema` when a database is reachable, otherwise from the
//! built-in static description.

use duckdb::{Connection, Result as DuckResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("No league schemas found in store")]
    NoLeagueSchemas,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableDef {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// One league namespace in the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct League {
    /// Display name, as stored in `league.leagueName`
    pub name: String,
    /// Schema holding this league's tables
    pub schema: String,
    /// Lowercase spellings accepted when resolving user input
    pub aliases: Vec<String>,
}

/// Static description of the store, shared read-only across requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaCatalog {
    pub leagues: Vec<League>,
    pub tables: Vec<TableDef>,
}

impl SchemaCatalog {
    /// The known store layout: eight league schemas, one common table shape.
    pub fn builtin() -> Self {
        Self {
            leagues: builtin_leagues(),
            tables: builtin_tables(),
        }
    }

    /// Build the catalog from a live store's `information_schema`.
    ///
    /// League schemas are matched against the built-in mapping; table shapes
    /// are read from the first league schema found (they are replicated, so
    /// one schema describes all of them). Foreign keys come from the static
    /// description since the scraper creates them without constraints.
    pub fn from_store(conn: &Connection) -> Result<Self, CatalogError> {
        let known = builtin_leagues();

        let mut stmt = conn.prepare(
            "SELECT DISTINCT table_schema FROM information_schema.tables \
             ORDER BY table_schema",
        )?;
        let schemas: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<DuckResult<Vec<_>>>()?;

        let leagues: Vec<League> = known
            .into_iter()
            .filter(|l| schemas.iter().any(|s| s == &l.schema))
            .collect();

        let shape_schema = leagues
            .first()
            .map(|l| l.schema.clone())
            .ok_or(CatalogError::NoLeagueSchemas)?;

        let mut stmt = conn.prepare(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = ? ORDER BY table_name",
        )?;
        let table_names: Vec<String> = stmt
            .query_map([&shape_schema], |row| row.get(0))?
            .collect::<DuckResult<Vec<_>>>()?;

        let reference = builtin_tables();
        let mut tables = Vec::new();
        for table_name in table_names {
            let mut stmt = conn.prepare(
                "SELECT column_name, data_type, is_nullable \
                 FROM information_schema.columns \
                 WHERE table_schema = ? AND table_name = ? \
                 ORDER BY ordinal_position",
            )?;
            let columns: Vec<ColumnDef> = stmt
                .query_map([&shape_schema, &table_name], |row| {
                    Ok(ColumnDef {
                        name: row.get(0)?,
                        data_type: row.get(1)?,
                        is_nullable: row.get::<_, String>(2)? == "YES",
                    })
                })?
                .collect::<DuckResult<Vec<_>>>()?;

            let foreign_keys = reference
                .iter()
                .find(|t| t.name.eq_ignore_ascii_case(&table_name))
                .map(|t| t.foreign_keys.clone())
                .unwrap_or_default();

            tables.push(TableDef {
                name: table_name,
                columns,
                foreign_keys,
            });
        }

        Ok(Self { leagues, tables })
    }

    /// Resolve a league from its display name or a common alias.
    pub fn resolve_league(&self, name: &str) -> Option<&League> {
        let key = name.trim().to_lowercase();
        if key.is_empty() {
            return None;
        }
        self.leagues
            .iter()
            .find(|l| l.name.to_lowercase() == key || l.aliases.iter().any(|a| a == &key))
    }

    pub fn has_schema(&self, schema: &str) -> bool {
        self.leagues.iter().any(|l| l.schema.eq_ignore_ascii_case(schema))
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.iter().any(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Render the catalog as grounding context for the interpreter.
    pub fn prompt_context(&self) -> String {
        let mut out = String::new();

        out.push_str("Leagues (leagueName -> schema):\n");
        for league in &self.leagues {
            out.push_str(&format!("  {} -> {}\n", league.name, league.schema));
        }

        out.push_str("\nTables (identical shape in every league schema):\n");
        for table in &self.tables {
            let cols: Vec<String> = table
                .columns
                .iter()
                .map(|c| format!("{} {}", c.name, c.data_type))
                .collect();
            out.push_str(&format!("  {}({})\n", table.name, cols.join(", ")));
            for fk in &table.foreign_keys {
                out.push_str(&format!(
                    "    {}.{} -> {}.{}\n",
                    table.name, fk.column, fk.references_table, fk.references_column
                ));
            }
        }

        out
    }
}

fn league(name: &str, schema: &str, aliases: &[&str]) -> League {
    League {
        name: name.to_string(),
        schema: schema.to_string(),
        aliases: aliases.iter().map(|a| a.to_string()).collect(),
    }
}

fn builtin_leagues() -> Vec<League> {
    vec![
        league("NBA", "nba", &["nba"]),
        league("Liqui Moly StarLigue", "lnh", &["starligue", "lnh"]),
        league("La Boulangère Wonderligue", "lbwl", &["wonderligue", "lbwl"]),
        league("Premier League", "pl", &["premier league", "pl", "epl"]),
        league(
            "Ligue 1 McDonald's",
            "ligue1",
            &["ligue 1", "ligue1", "l1"],
        ),
        league("Bundesliga", "bl1", &["bundesliga", "bl1"]),
        league("Serie A", "sa", &["serie a", "sa"]),
        league("LaLiga", "pd", &["la liga", "laliga", "liga", "pd"]),
    ]
}

fn column(name: &str, data_type: &str) -> ColumnDef {
    ColumnDef {
        name: name.to_string(),
        data_type: data_type.to_string(),
        is_nullable: true,
    }
}

fn fk(col: &str, table: &str, references: &str) -> ForeignKey {
    ForeignKey {
        column: col.to_string(),
        references_table: table.to_string(),
        references_column: references.to_string(),
    }
}

fn builtin_tables() -> Vec<TableDef> {
    vec![
        TableDef {
            name: "league".to_string(),
            columns: vec![column("leagueId", "UUID"), column("leagueName", "TEXT")],
            foreign_keys: vec![],
        },
        TableDef {
            name: "season".to_string(),
            columns: vec![column("seasonId", "UUID"), column("seasonLabel", "TEXT")],
            foreign_keys: vec![],
        },
        TableDef {
            name: "stadium".to_string(),
            columns: vec![
                column("stadiumId", "UUID"),
                column("stadiumName", "TEXT"),
                column("city", "TEXT"),
            ],
            foreign_keys: vec![],
        },
        TableDef {
            name: "team".to_string(),
            columns: vec![
                column("teamId", "UUID"),
                column("teamName", "TEXT"),
                column("leagueId", "UUID"),
            ],
            foreign_keys: vec![fk("leagueId", "league", "leagueId")],
        },
        TableDef {
            name: "coach".to_string(),
            columns: vec![
                column("coachId", "UUID"),
                column("coachName", "TEXT"),
                column("teamId", "UUID"),
            ],
            foreign_keys: vec![fk("teamId", "team", "teamId")],
        },
        TableDef {
            name: "player".to_string(),
            columns: vec![
                column("playerId", "UUID"),
                column("playerName", "TEXT"),
                column("teamId", "UUID"),
            ],
            foreign_keys: vec![fk("teamId", "team", "teamId")],
        },
        TableDef {
            name: "match".to_string(),
            columns: vec![
                column("matchId", "UUID"),
                column("seasonId", "UUID"),
                column("homeTeamId", "UUID"),
                column("awayTeamId", "UUID"),
                column("stadiumId", "UUID"),
                column("startDateMatch", "TIMESTAMP"),
            ],
            foreign_keys: vec![
                fk("seasonId", "season", "seasonId"),
                fk("homeTeamId", "team", "teamId"),
                fk("awayTeamId", "team", "teamId"),
                fk("stadiumId", "stadium", "stadiumId"),
            ],
        },
        TableDef {
            name: "statName".to_string(),
            columns: vec![column("statNameId", "UUID"), column("statNameLib", "TEXT")],
            foreign_keys: vec![],
        },
        TableDef {
            name: "statTeamMatch".to_string(),
            columns: vec![
                column("matchId", "UUID"),
                column("teamId", "UUID"),
                column("statNameId", "UUID"),
                column("value", "NUMERIC"),
            ],
            foreign_keys: vec![
                fk("matchId", "match", "matchId"),
                fk("teamId", "team", "teamId"),
                fk("statNameId", "statName", "statNameId"),
            ],
        },
        TableDef {
            name: "statPlayerMatch".to_string(),
            columns: vec![
                column("matchId", "UUID"),
                column("playerId", "UUID"),
                column("statNameId", "UUID"),
                column("value", "NUMERIC"),
            ],
            foreign_keys: vec![
                fk("matchId", "match", "matchId"),
                fk("playerId", "player", "playerId"),
                fk("statNameId", "statName", "statNameId"),
            ],
        },
    ]
}
