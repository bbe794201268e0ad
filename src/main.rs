use anyhow::Result;
use cinegraph::commands;
use cinegraph::config::Config;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "cinegraph",
    about = "Gemini + Neo4j movie demos: Cypher QA, plot embeddings, vector search and a trailer agent"
)]
struct Cli {
    /// Path to config file (optional; defaults apply when missing)
    #[arg(short, long, global = true, default_value = "cinegraph.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Send one question straight to the model and print the raw response
    Ask {
        #[arg(default_value = "What is neo4j?")]
        question: String,
    },

    /// Ask the surfer-dude chat chain a question
    Chat {
        #[arg(default_value = "What are the surf conditions like today?")]
        question: String,
    },

    /// Answer a question by generating and running Cypher against the movie graph
    Cypher {
        #[arg(default_value = "What movies has Tom Hanks directed and what are the genres?")]
        question: String,

        /// Log the generated Cypher and the rows it returned
        #[arg(short, long)]
        verbose: bool,

        /// Acknowledge that model-written Cypher runs unreviewed against the database
        #[arg(long)]
        allow_dangerous_requests: bool,
    },

    /// Look up a documentation corpus source URL and print the graph schema
    Corpus {
        #[arg(long, default_value = "Google Agent Development Kit Documentation")]
        name: String,
    },

    /// Probe the Movie schema and write plot embeddings to CSV
    Embed {
        /// Only embed this many movies
        #[arg(long, default_value_t = 5)]
        limit: usize,

        /// Embed every movie with a description
        #[arg(long, conflicts_with = "limit")]
        all: bool,

        /// Output CSV path (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip the schema diagnostics
        #[arg(long)]
        skip_probe: bool,
    },

    /// Find movies whose plots are similar to a description
    Search {
        #[arg(default_value = "A movie where aliens land and attack earth.")]
        query: String,

        /// Number of results (overrides config)
        #[arg(short)]
        k: Option<usize>,
    },

    /// Chat with the movie agent (type `exit` to quit)
    Agent {
        /// Resume an existing session instead of starting a new one
        #[arg(long)]
        session: Option<String>,
    },

    /// Delete the stored chat history of a session
    Forget {
        session: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cinegraph=info".parse().unwrap()),
        )
        .init();

    dotenvy::from_path("../.env").ok();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config)?;

    match cli.command {
        Command::Ask { question } => commands::ask(&config, &question).await,
        Command::Chat { question } => commands::chat(&config, &question).await,
        Command::Cypher {
            question,
            verbose,
            allow_dangerous_requests,
        } => {
            // Values in .env win over the shell for this demo.
            dotenvy::dotenv_override().ok();
            commands::cypher(&config, &question, verbose, allow_dangerous_requests).await
        }
        Command::Corpus { name } => commands::corpus(&config, &name).await,
        Command::Embed {
            limit,
            all,
            output,
            skip_probe,
        } => {
            let limit = (!all).then_some(limit);
            commands::embed(&config, limit, output, skip_probe).await
        }
        Command::Search { query, k } => commands::search(&config, &query, k).await,
        Command::Agent { session } => commands::agent(&config, session).await,
        Command::Forget { session } => commands::forget(&config, &session).await,
    }
}
