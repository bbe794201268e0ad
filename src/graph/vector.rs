use super::{GraphClient, Record, display_value};
use crate::embeddings::EmbeddingClient;
use crate::error::Result;
use serde_json::{Map, Value, json};
use tracing::debug;

const SIMILARITY_QUERY: &str = "
CALL db.index.vector.queryNodes($index, $k, $embedding)
YIELD node, score
RETURN node[$text_property] AS text, score, node {.*} AS metadata
ORDER BY score DESC
";

/// A node returned by similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub page_content: String,
    /// Node properties minus the text and embedding properties.
    pub metadata: Map<String, Value>,
    pub score: f64,
}

impl Document {
    pub fn metadata_str(&self, key: &str) -> String {
        self.metadata
            .get(key)
            .map(display_value)
            .unwrap_or_default()
    }
}

/// Vector index over node embeddings, queried with embedded text.
pub struct VectorStore {
    graph: GraphClient,
    embedder: EmbeddingClient,
    index_name: String,
    text_property: String,
    embedding_property: String,
}

impl VectorStore {
    pub fn new(
        graph: GraphClient,
        embedder: EmbeddingClient,
        index_name: impl Into<String>,
        text_property: impl Into<String>,
        embedding_property: impl Into<String>,
    ) -> Self {
        Self {
            graph,
            embedder,
            index_name: index_name.into(),
            text_property: text_property.into(),
            embedding_property: embedding_property.into(),
        }
    }

    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Document>> {
        let embedding = self.embedder.embed_query(query).await?;
        debug!(index = %self.index_name, k, dims = embedding.len(), "vector similarity search");
        let records = self
            .graph
            .query(
                SIMILARITY_QUERY,
                json!({
                    "index": self.index_name,
                    "k": k,
                    "embedding": embedding,
                    "text_property": self.text_property,
                }),
            )
            .await?;
        Ok(to_documents(
            records,
            &self.text_property,
            &self.embedding_property,
        ))
    }
}

fn to_documents(
    records: Vec<Record>,
    text_property: &str,
    embedding_property: &str,
) -> Vec<Document> {
    records
        .into_iter()
        .map(|mut r| {
            let page_content = r
                .get("text")
                .filter(|v| !v.is_null())
                .map(display_value)
                .unwrap_or_default();
            let score = r.get("score").and_then(Value::as_f64).unwrap_or_default();
            let mut metadata = match r.remove("metadata") {
                Some(Value::Object(m)) => m,
                _ => Map::new(),
            };
            metadata.remove(text_property);
            metadata.remove(embedding_property);
            Document {
                page_content,
                metadata,
                score,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_text_and_embedding_from_metadata() {
        let records: Vec<Record> = vec![
            json!({
                "text": "Aliens invade Earth on July 4th.",
                "score": 0.93,
                "metadata": {"title": "Independence Day", "plot": "Aliens invade Earth on July 4th.", "plotEmbedding": [0.1, 0.2]}
            })
            .as_object()
            .unwrap()
            .clone(),
        ];
        let docs = to_documents(records, "plot", "plotEmbedding");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].page_content, "Aliens invade Earth on July 4th.");
        assert_eq!(docs[0].metadata_str("title"), "Independence Day");
        assert!(!docs[0].metadata.contains_key("plot"));
        assert!(!docs[0].metadata.contains_key("plotEmbedding"));
        assert!((docs[0].score - 0.93).abs() < 1e-9);
    }

    #[test]
    fn missing_fields_default() {
        let records: Vec<Record> = vec![Map::new()];
        let docs = to_documents(records, "plot", "plotEmbedding");
        assert_eq!(docs[0].page_content, "");
        assert!(docs[0].metadata.is_empty());
        assert_eq!(docs[0].metadata_str("title"), "");
    }
}
