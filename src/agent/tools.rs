//! Tools the movie agent can call: a movie-expert chat chain and a trailer
//! search. Dispatch is by the exact tool name the model writes after `Action:`.

use crate::error::Result;
use crate::llm::Role;
use crate::prompt::{ChatPromptTemplate, LlmChain};
use crate::youtube::YouTubeSearch;
use tracing::debug;

pub const MOVIE_CHAT: &str = "Movie Chat";
pub const TRAILER_SEARCH: &str = "Movie Trailer Search";

const MOVIE_EXPERT_SYSTEM: &str = "You are a movie expert. You find movies from a genre or plot.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
}

pub fn tool_definitions() -> Vec<ToolDef> {
    vec![
        ToolDef {
            name: MOVIE_CHAT,
            description: "For when you need to chat about movies. The question will be a string. \
                          Return a string.",
        },
        ToolDef {
            name: TRAILER_SEARCH,
            description: "Use when needing to find a movie trailer. The question will include the \
                          word trailer. Return a link to a YouTube video.",
        },
    ]
}

/// `name: description` lines for the `{tools}` slot.
pub fn render_tools(defs: &[ToolDef]) -> String {
    defs.iter()
        .map(|d| format!("{}: {}", d.name, d.description))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn tool_names(defs: &[ToolDef]) -> String {
    defs.iter().map(|d| d.name).collect::<Vec<_>>().join(", ")
}

pub fn movie_expert_prompt() -> Result<ChatPromptTemplate> {
    ChatPromptTemplate::from_messages(&[
        (Role::System, MOVIE_EXPERT_SYSTEM),
        (Role::Human, "{input}"),
    ])
}

/// The trailer tool treats commas as a result-count separator, so strip them.
pub fn trailer_query(input: &str) -> String {
    input.replace(',', " ")
}

pub struct MovieTools {
    movie_chat: LlmChain,
    trailer_search: YouTubeSearch,
}

impl MovieTools {
    pub fn new(movie_chat: LlmChain, trailer_search: YouTubeSearch) -> Self {
        Self {
            movie_chat,
            trailer_search,
        }
    }

    /// Run a tool by name. Unknown names produce an observation, not an error.
    pub async fn dispatch(&self, tool_name: &str, input: &str) -> Result<String> {
        debug!(tool = tool_name, input, "executing tool");
        match tool_name {
            MOVIE_CHAT => self.movie_chat.invoke(&[("input", input)]).await,
            TRAILER_SEARCH => self.trailer_search.run(&trailer_query(input)).await,
            _ => Ok(unknown_tool_observation(tool_name)),
        }
    }
}

pub fn unknown_tool_observation(tool_name: &str) -> String {
    format!(
        "{tool_name} is not a valid tool, try one of [{}].",
        tool_names(&tool_definitions())
    )
}
