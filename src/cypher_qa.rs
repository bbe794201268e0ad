//! Question answering over the graph: the model writes Cypher from the
//! schema, the graph runs it, and the model phrases the rows as an answer.

use crate::error::{Error, Result};
use crate::graph::{GraphClient, Record};
use crate::llm::GeminiClient;
use crate::prompt::PromptTemplate;
use fancy_regex::Regex;
use serde_json::json;
use std::fmt;
use std::sync::LazyLock;
use tracing::{debug, info};

pub const MOVIE_CYPHER_TEMPLATE: &str = r#"
You are an expert Neo4j Developer translating user questions into Cypher to answer questions about movies and provide recommendations.
Convert the user's question based on the schema.

Instructions:
Use only the provided relationship types and properties in the schema.
Do not use any other relationship types or properties that are not provided.
For movie titles that begin with "The", move "the" to the end, For example "The 39 Steps" becomes "39 Steps, The" or "The Matrix" becomes "Matrix, The".

If no data is returned, do not attempt to answer the question.
Only respond to questions that require you to construct a Cypher statement.
Do not include any explanations or apologies in your responses.

Examples:

Find movies and genres:
MATCH (m:Movie)-[:IN_GENRE]->(g)
RETURN m.title, g.name

Schema: {schema}
Question: {question}
"#;

const QA_TEMPLATE: &str = "You turn database results into a short, natural answer.
The information below comes from the database and is authoritative. Never contradict it \
or fill gaps from your own knowledge, and do not mention that the answer is based on it.

Example:
Question: Which actors played in Heat?
Information: [{{\"a.name\": \"Al Pacino\"}}, {{\"a.name\": \"Robert De Niro\"}}]
Helpful Answer: Al Pacino and Robert De Niro played in Heat.

If the information is empty, say that you don't know the answer.
Information:
{context}

Question: {question}
Helpful Answer:";

static FENCED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:cypher|Cypher)?\s*(.*?)```").expect("static regex")
});

#[derive(Debug, Clone)]
pub struct CypherQaOptions {
    /// Generated Cypher runs unreviewed against the database; must be opted into.
    pub allow_dangerous_requests: bool,
    pub verbose: bool,
    /// Max rows handed to the answer prompt.
    pub top_k: usize,
}

impl Default for CypherQaOptions {
    fn default() -> Self {
        Self {
            allow_dangerous_requests: false,
            verbose: false,
            top_k: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CypherAnswer {
    pub query: String,
    pub cypher: String,
    pub context: Vec<Record>,
    pub result: String,
}

impl fmt::Display for CypherAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "query: {}", self.query)?;
        write!(f, "result: {}", self.result)
    }
}

pub struct CypherQaChain {
    llm: GeminiClient,
    graph: GraphClient,
    cypher_prompt: PromptTemplate,
    qa_prompt: PromptTemplate,
    options: CypherQaOptions,
}

impl CypherQaChain {
    pub fn from_llm(
        llm: GeminiClient,
        graph: GraphClient,
        cypher_prompt: PromptTemplate,
        options: CypherQaOptions,
    ) -> Result<Self> {
        if !options.allow_dangerous_requests {
            return Err(Error::config(
                "Cypher QA executes model-written queries against the database; \
                 pass --allow-dangerous-requests to acknowledge this",
            ));
        }
        let vars = cypher_prompt.input_variables();
        if !vars.contains(&"schema") || !vars.contains(&"question") {
            return Err(Error::template(
                "Cypher prompt must use {schema} and {question}",
            ));
        }
        Ok(Self {
            llm,
            graph,
            cypher_prompt,
            qa_prompt: PromptTemplate::new(QA_TEMPLATE)?,
            options,
        })
    }

    pub async fn invoke(&self, question: &str) -> Result<CypherAnswer> {
        let schema = self.graph.schema().await?.to_string();
        let prompt = self
            .cypher_prompt
            .format(&[("schema", schema.as_str()), ("question", question)])?;
        let generated = self.llm.invoke_text(&prompt).await?.content;
        let cypher = extract_cypher(&generated);
        if self.options.verbose {
            info!(cypher = %cypher, "generated Cypher");
        } else {
            debug!(cypher = %cypher, "generated Cypher");
        }

        let mut context = if cypher.is_empty() {
            Vec::new()
        } else {
            self.graph.query(&cypher, json!({})).await?
        };
        context.truncate(self.options.top_k);

        let context_json = serde_json::to_string(&context)
            .map_err(|e| Error::parse(format!("serialize context: {e}")))?;
        if self.options.verbose {
            info!(rows = context.len(), context = %context_json, "full context");
        }

        let qa = self
            .qa_prompt
            .format(&[("context", context_json.as_str()), ("question", question)])?;
        let result = self.llm.invoke_text(&qa).await?.content.trim().to_string();

        Ok(CypherAnswer {
            query: question.to_string(),
            cypher,
            context,
            result,
        })
    }
}

/// Pull the statement out of a fenced block when the model used one.
pub fn extract_cypher(text: &str) -> String {
    match FENCED.captures(text) {
        Ok(Some(caps)) => caps
            .get(1)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default(),
        _ => text.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelProfile, Neo4jCredentials};

    fn clients() -> (GeminiClient, GraphClient) {
        let profile = ModelProfile {
            model: "gemini-test".into(),
            temperature: 0.0,
            max_output_tokens: None,
            max_retries: 0,
            timeout: None,
        };
        let llm = GeminiClient::new("key".into(), "http://127.0.0.1:9".into(), &profile).unwrap();
        let graph = GraphClient::new(&Neo4jCredentials {
            uri: "bolt://localhost:7687".into(),
            username: "neo4j".into(),
            password: "secret".into(),
            database: "neo4j".into(),
        })
        .unwrap();
        (llm, graph)
    }

    #[test]
    fn extracts_fenced_cypher() {
        let text = "Here you go:\n```cypher\nMATCH (p:Person {name: 'Tom Hanks'})-[:DIRECTED]->(m) RETURN m.title\n```";
        assert_eq!(
            extract_cypher(text),
            "MATCH (p:Person {name: 'Tom Hanks'})-[:DIRECTED]->(m) RETURN m.title"
        );
    }

    #[test]
    fn bare_fence_and_plain_text() {
        assert_eq!(extract_cypher("```\nRETURN 1\n```"), "RETURN 1");
        assert_eq!(extract_cypher("  RETURN 2  "), "RETURN 2");
    }

    #[test]
    fn movie_template_takes_schema_and_question() {
        let t = PromptTemplate::new(MOVIE_CYPHER_TEMPLATE).unwrap();
        assert_eq!(t.input_variables(), vec!["schema", "question"]);
        let out = t
            .format(&[("schema", "(:Movie)"), ("question", "What did Tom Hanks direct?")])
            .unwrap();
        assert!(out.contains("Schema: (:Movie)"));
        assert!(out.contains("\"The Matrix\" becomes \"Matrix, The\""));
    }

    #[test]
    fn qa_template_keeps_literal_json() {
        let t = PromptTemplate::new(QA_TEMPLATE).unwrap();
        assert_eq!(t.input_variables(), vec!["context", "question"]);
        let out = t.format(&[("context", "[]"), ("question", "q")]).unwrap();
        assert!(out.contains(r#"[{"a.name": "Al Pacino"}"#));
    }

    #[test]
    fn options_default_refuse_dangerous_requests() {
        let opts = CypherQaOptions::default();
        assert!(!opts.allow_dangerous_requests);
        assert_eq!(opts.top_k, 10);
    }

    #[test]
    fn chain_requires_dangerous_request_opt_in() {
        let (llm, graph) = clients();
        let prompt = PromptTemplate::new(MOVIE_CYPHER_TEMPLATE).unwrap();
        let Err(err) = CypherQaChain::from_llm(llm, graph, prompt, CypherQaOptions::default())
        else {
            panic!("chain built without allow_dangerous_requests");
        };
        assert!(matches!(err, Error::Config(ref m) if m.contains("--allow-dangerous-requests")));
    }

    #[test]
    fn chain_requires_schema_and_question_slots() {
        let (llm, graph) = clients();
        let prompt = PromptTemplate::new("Question: {question}").unwrap();
        let options = CypherQaOptions {
            allow_dangerous_requests: true,
            ..CypherQaOptions::default()
        };
        let Err(err) = CypherQaChain::from_llm(llm, graph, prompt, options) else {
            panic!("chain built without a schema slot");
        };
        assert!(matches!(err, Error::Template(_)));
    }
}
