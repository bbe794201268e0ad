//! Movie plot embeddings: discover which properties hold the id, title and
//! description on `Movie` nodes, embed `"{title}: {plot}"` per movie and
//! write `movieId,embedding` rows to CSV.

use crate::embeddings::EmbeddingClient;
use crate::error::Result;
use crate::graph::{GraphClient, display_value, node_properties};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::fmt;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

/// Checked in order; the first present wins.
pub const DESCRIPTION_PROPERTIES: &[&str] = &[
    "plot",
    "description",
    "overview",
    "summary",
    "synopsis",
    "storyline",
    "tagline",
    "Plot",
    "Description",
];

pub const ID_PROPERTIES: &[&str] = &["movieId", "id", "ID", "tmdbId", "imdbId", "movie_id"];

const SAMPLE_DISPLAY_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySelection {
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: String,
}

impl fmt::Display for PropertySelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "  - ID: {}",
            self.id.as_deref().unwrap_or("id(m) [Neo4j internal ID]")
        )?;
        writeln!(
            f,
            "  - Title: {}",
            self.title.as_deref().unwrap_or("[No title property found]")
        )?;
        write!(f, "  - Description: {}", self.description)
    }
}

/// `None` when no known description property exists.
pub fn select_properties(props: &BTreeSet<String>) -> Option<PropertySelection> {
    let pick = |candidates: &[&str]| {
        candidates
            .iter()
            .find(|p| props.contains(**p))
            .map(|p| p.to_string())
    };
    let description = pick(DESCRIPTION_PROPERTIES)?;
    let title = pick(&["title", "name"]);
    Some(PropertySelection {
        id: pick(ID_PROPERTIES),
        title,
        description,
    })
}

pub fn build_plot_query(sel: &PropertySelection, limit: Option<usize>) -> String {
    let desc = &sel.description;
    let id = sel
        .id
        .as_ref()
        .filter(|_| sel.title.is_some())
        .map(|p| format!("m.{p}"))
        .unwrap_or_else(|| "id(m)".into());
    let title = sel
        .title
        .as_ref()
        .map(|p| format!("m.{p}"))
        .unwrap_or_else(|| "id(m)".into());

    let mut query = format!(
        "MATCH (m:Movie)\n\
         WHERE m.{desc} IS NOT NULL AND trim(m.{desc}) <> ''\n\
         RETURN {id} AS movieId, {title} AS title, m.{desc} AS plot"
    );
    if let Some(n) = limit {
        query.push_str(&format!("\nLIMIT {n}"));
    }
    query
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoviePlot {
    pub movie_id: Value,
    pub title: String,
    pub plot: String,
}

impl MoviePlot {
    pub fn embedding_input(&self) -> String {
        format!("{}: {}", self.title, self.plot)
    }
}

/// Union of property names over a sample of `Movie` nodes.
pub async fn sample_movie_properties(
    graph: &GraphClient,
    sample_size: usize,
) -> Result<(BTreeSet<String>, Vec<Value>)> {
    let records = graph
        .query(
            "MATCH (m:Movie) RETURN m LIMIT $limit",
            json!({ "limit": sample_size }),
        )
        .await?;
    let nodes: Vec<Value> = records
        .into_iter()
        .filter_map(|mut r| r.remove("m"))
        .collect();
    let props = nodes
        .iter()
        .filter_map(node_properties)
        .flat_map(|p| p.keys().cloned())
        .collect();
    Ok((props, nodes))
}

pub async fn fetch_movie_plots(
    graph: &GraphClient,
    sample_size: usize,
    limit: Option<usize>,
) -> Result<Vec<MoviePlot>> {
    let (props, nodes) = sample_movie_properties(graph, sample_size).await?;
    if nodes.is_empty() {
        println!("No Movie nodes found in database!");
        return Ok(Vec::new());
    }
    println!("Found properties in Movie nodes: {:?}", props);

    let Some(selection) = select_properties(&props) else {
        println!("\nNo description property found!");
        println!("Available properties: {:?}", props);
        println!("\nYou may need to:");
        println!("1. Check if your movies have plot/description data");
        println!("2. Use a different property");
        println!("3. Import plot data into your database");
        return Ok(Vec::new());
    };
    println!("\nUsing properties:\n{selection}");

    let records = graph
        .query(&build_plot_query(&selection, limit), json!({}))
        .await?;
    let movies: Vec<MoviePlot> = records
        .into_iter()
        .map(|r| MoviePlot {
            movie_id: r.get("movieId").cloned().unwrap_or(Value::Null),
            title: r.get("title").map(display_value).unwrap_or_default(),
            plot: r.get("plot").map(display_value).unwrap_or_default(),
        })
        .collect();

    println!(
        "\nFound {} movies with non-empty {}",
        movies.len(),
        selection.description
    );
    Ok(movies)
}

/// Quote a CSV field when it contains a delimiter, quote or line break.
pub fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

pub fn embedding_row(movie_id: &Value, embedding: &[f32]) -> String {
    let vector = format!(
        "[{}]",
        embedding
            .iter()
            .map(|v| format!("{v:?}"))
            .collect::<Vec<_>>()
            .join(", ")
    );
    format!(
        "{},{}",
        csv_field(&display_value(movie_id)),
        csv_field(&vector)
    )
}

/// Returns the number of rows written; zero when nothing could be embedded.
pub async fn generate_embeddings(
    graph: &GraphClient,
    embedder: &EmbeddingClient,
    output: &Path,
    sample_size: usize,
    limit: Option<usize>,
) -> Result<usize> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let movies = fetch_movie_plots(graph, sample_size, limit).await?;
    if movies.is_empty() {
        println!("\nNo movies with descriptions found. Cannot generate embeddings.");
        return Ok(0);
    }

    let mut out = std::io::BufWriter::new(std::fs::File::create(output)?);
    writeln!(out, "movieId,embedding")?;

    for (i, movie) in movies.iter().enumerate() {
        info!("Processing {}/{}: {}", i + 1, movies.len(), movie.title);
        let embedding = embedder.embed_query(&movie.embedding_input()).await?;
        writeln!(out, "{}", embedding_row(&movie.movie_id, &embedding))?;
    }
    out.flush()?;

    println!("\nEmbeddings saved to {}", output.display());
    Ok(movies.len())
}

/// Outcome of the `Movie` schema diagnostics. `None` marks a probe that failed.
#[derive(Debug, Default)]
pub struct SchemaReport {
    pub type_properties: Option<Vec<(String, String)>>,
    pub apoc_properties: Option<Vec<(String, String)>>,
    pub property_keys: Option<Vec<String>>,
    pub sample_properties: BTreeSet<String>,
    pub sample_movie: Vec<(String, String)>,
}

/// Run the schema diagnostics. The procedure-based probes may be missing on
/// older servers or without APOC, so their failures are only logged; the
/// node sample must succeed.
pub async fn probe_movie_schema(graph: &GraphClient) -> Result<SchemaReport> {
    graph.verify_connectivity().await?;
    let mut report = SchemaReport::default();

    match graph
        .query(
            "CALL db.schema.nodeTypeProperties()
             YIELD nodeLabels, propertyName, propertyTypes
             WHERE 'Movie' IN nodeLabels
             RETURN propertyName, propertyTypes
             ORDER BY propertyName",
            json!({}),
        )
        .await
    {
        Ok(rows) => {
            report.type_properties = Some(
                rows.iter()
                    .map(|r| {
                        (
                            r.get("propertyName").map(display_value).unwrap_or_default(),
                            r.get("propertyTypes").map(display_value).unwrap_or_default(),
                        )
                    })
                    .collect(),
            );
        }
        Err(e) => warn!(error = %e, "db.schema.nodeTypeProperties() probe failed"),
    }

    match graph
        .query("CALL apoc.meta.schema() YIELD value RETURN value", json!({}))
        .await
    {
        Ok(rows) => {
            let props: Vec<(String, String)> = rows
                .first()
                .and_then(|r| r.get("value"))
                .and_then(|v| v.get("Movie"))
                .and_then(|m| m.get("properties"))
                .and_then(Value::as_object)
                .map(|p| {
                    p.iter()
                        .map(|(k, v)| (k.clone(), v.to_string()))
                        .collect()
                })
                .unwrap_or_default();
            report.apoc_properties = Some(props);
        }
        Err(e) => warn!(error = %e, "apoc.meta.schema() probe failed"),
    }

    match graph
        .query(
            "CALL db.propertyKeys() YIELD propertyKey RETURN propertyKey ORDER BY propertyKey",
            json!({}),
        )
        .await
    {
        Ok(rows) => {
            report.property_keys = Some(
                rows.iter()
                    .filter_map(|r| r.get("propertyKey").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect(),
            );
        }
        Err(e) => warn!(error = %e, "db.propertyKeys() probe failed"),
    }

    let (props, nodes) = sample_movie_properties(graph, 5).await?;
    report.sample_properties = props;
    if let Some(first) = nodes.first().and_then(node_properties) {
        report.sample_movie = first
            .iter()
            .map(|(k, v)| (k.clone(), truncate_display(&display_value(v))))
            .collect();
    }
    Ok(report)
}

fn truncate_display(s: &str) -> String {
    if s.chars().count() > SAMPLE_DISPLAY_CHARS {
        let head: String = s.chars().take(SAMPLE_DISPLAY_CHARS).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}

impl fmt::Display for SchemaReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.type_properties {
            Some(props) => {
                writeln!(f, "Movie node properties from db.schema.nodeTypeProperties():")?;
                for (name, types) in props {
                    writeln!(f, "  - {name}: {types}")?;
                }
            }
            None => writeln!(
                f,
                "db.schema.nodeTypeProperties() not available (requires Neo4j 5.x)"
            )?,
        }

        match &self.apoc_properties {
            Some(props) if !props.is_empty() => {
                writeln!(f, "\nMovie schema from APOC:")?;
                for (name, details) in props {
                    writeln!(f, "  - {name}: {details}")?;
                }
            }
            Some(_) => {}
            None => writeln!(f, "\nAPOC not available or apoc.meta.schema() failed")?,
        }

        if let Some(keys) = &self.property_keys {
            writeln!(f, "\nAll property keys in database: {keys:?}")?;
        }

        if !self.sample_properties.is_empty() {
            writeln!(f, "\nActual properties found in Movie nodes:")?;
            writeln!(f, "  Properties: {:?}", self.sample_properties)?;
            writeln!(f, "\nSample Movie:")?;
            for (k, v) in &self.sample_movie {
                writeln!(f, "  - {k}: {v}")?;
            }
        }
        Ok(())
    }
}
