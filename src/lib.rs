pub mod agent;
pub mod commands;
pub mod config;
pub mod cypher_qa;
pub mod embeddings;
pub mod error;
pub mod graph;
pub mod http;
pub mod llm;
pub mod plot_embeddings;
pub mod prompt;
pub mod youtube;
