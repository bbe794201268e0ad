//! One entry point per CLI subcommand. Each builds the clients it needs from
//! config + environment, runs its flow once, and prints the result.

use crate::agent::{self, ChatAgent, tools::MovieTools};
use crate::config::{Config, TaskKind};
use crate::cypher_qa::{CypherQaChain, CypherQaOptions, MOVIE_CYPHER_TEMPLATE};
use crate::embeddings::EmbeddingClient;
use crate::graph::{ChatHistory, GraphClient, VectorStore};
use crate::llm::{GeminiClient, Role};
use crate::plot_embeddings;
use crate::prompt::{ChatPromptTemplate, LlmChain, PromptTemplate};
use crate::youtube::YouTubeSearch;
use anyhow::Result;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

const SURFER_SYSTEM: &str = "You are a surfer dude, having a conversation about the surf \
                             conditions on the beach. Respond using surfer slang.";

fn llm_for(config: &Config, kind: TaskKind) -> Result<GeminiClient> {
    let profile = config.models.profile(kind);
    info!(model = %profile.model, temperature = profile.temperature, "using model");
    Ok(GeminiClient::from_config(&config.gemini, &profile)?)
}

fn graph_for(config: &Config) -> Result<GraphClient> {
    let creds = config.neo4j.credentials()?;
    Ok(GraphClient::new(&creds)?)
}

fn embedder_for(config: &Config) -> Result<EmbeddingClient> {
    Ok(EmbeddingClient::from_config(&config.gemini, &config.embeddings.model)?)
}

pub async fn ask(config: &Config, question: &str) -> Result<()> {
    let llm = llm_for(config, TaskKind::Ask)?;
    let response = llm.invoke_text(question).await?;
    println!("{response}");
    Ok(())
}

pub async fn chat(config: &Config, question: &str) -> Result<()> {
    let llm = llm_for(config, TaskKind::Chat)?;
    let prompt = ChatPromptTemplate::from_messages(&[
        (Role::System, SURFER_SYSTEM),
        (Role::Human, "{question}"),
    ])?;
    let chain = LlmChain::new(prompt, llm);
    let response = chain.invoke(&[("question", question)]).await?;
    println!("{response}");
    Ok(())
}

pub async fn cypher(
    config: &Config,
    question: &str,
    verbose: bool,
    allow_dangerous_requests: bool,
) -> Result<()> {
    let llm = llm_for(config, TaskKind::Cypher)?;
    let graph = graph_for(config)?;
    println!("neo4j url: {}", graph.uri());

    let chain = CypherQaChain::from_llm(
        llm,
        graph,
        PromptTemplate::new(MOVIE_CYPHER_TEMPLATE)?,
        CypherQaOptions {
            allow_dangerous_requests,
            verbose,
            ..CypherQaOptions::default()
        },
    )?;
    let answer = chain.invoke(question).await?;
    if verbose {
        println!("Generated Cypher:\n{}\n", answer.cypher);
    }
    println!("{answer}");
    Ok(())
}

pub async fn corpus(config: &Config, name: &str) -> Result<()> {
    let graph = graph_for(config)?;
    let rows = graph
        .query(
            "MATCH (d:DocumentationCorpus {name: $name}) RETURN d.sourceUrl",
            json!({ "name": name }),
        )
        .await?;
    println!("{}", serde_json::to_string(&rows)?);

    let schema = graph.schema().await?;
    print!("{schema}");
    Ok(())
}

pub async fn embed(
    config: &Config,
    limit: Option<usize>,
    output: Option<PathBuf>,
    skip_probe: bool,
) -> Result<()> {
    let graph = graph_for(config)?;

    if !skip_probe {
        println!("Checking database schema using Neo4j procedures...");
        let report = plot_embeddings::probe_movie_schema(&graph).await?;
        print!("{report}");
        println!("\n{}\n", "=".repeat(50));
    }

    let embedder = embedder_for(config)?;
    let output = output.unwrap_or_else(|| config.embeddings.output.clone());
    let written = plot_embeddings::generate_embeddings(
        &graph,
        &embedder,
        &output,
        config.embeddings.sample_size,
        limit,
    )
    .await?;
    info!(rows = written, path = %output.display(), "embedding run complete");
    Ok(())
}

pub async fn search(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    let store = VectorStore::new(
        graph_for(config)?,
        embedder_for(config)?,
        &config.vector.index_name,
        &config.vector.text_property,
        &config.vector.embedding_property,
    );
    let docs = store
        .similarity_search(query, k.unwrap_or(config.vector.k))
        .await?;
    for doc in &docs {
        println!("{} - {}", doc.metadata_str("title"), doc.page_content);
    }
    Ok(())
}

/// Starts a fresh session unless `session_id` resumes an existing one.
pub async fn agent(config: &Config, session_id: Option<String>) -> Result<()> {
    let session_id = session_id.unwrap_or_else(agent::new_session_id);
    println!("Session ID: {session_id}");

    let llm = llm_for(config, TaskKind::Agent)?;
    let graph = graph_for(config)?;

    let movie_chat = LlmChain::new(agent::tools::movie_expert_prompt()?, llm.clone());
    let trailers = YouTubeSearch::new(config.agent.trailer_results)?;
    let chat_agent = ChatAgent::new(
        llm,
        MovieTools::new(movie_chat, trailers),
        config.agent.max_iterations,
    )?;
    let history = ChatHistory::new(graph, session_id, config.agent.history_window);

    agent::run_session(&chat_agent, &history).await
}

pub async fn forget(config: &Config, session_id: &str) -> Result<()> {
    let history = ChatHistory::new(graph_for(config)?, session_id, config.agent.history_window);
    history.clear().await?;
    println!("Cleared history for session {}", history.session_id());
    Ok(())
}
