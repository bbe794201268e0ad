// Conversational movie agent: ReAct loop over the movie tools, with history
// kept in the graph under a per-run session id.

pub mod react;
pub mod tools;

use crate::error::Result;
use crate::graph::ChatHistory;
use crate::graph::history::format_transcript;
use crate::llm::{ChatMessage, GeminiClient};
use crate::prompt::PromptTemplate;
use anyhow::Context;
use react::{AgentStep, REACT_CHAT_TEMPLATE, STOP_SEQUENCE};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tools::{MovieTools, render_tools, tool_definitions, tool_names};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const ITERATION_LIMIT_OUTPUT: &str = "Agent stopped due to iteration limit or time limit.";

#[derive(Debug, Default)]
pub struct AgentStats {
    pub iterations: u32,
    pub tool_calls: u32,
    pub parse_failures: u32,
}

pub struct ChatAgent {
    llm: GeminiClient,
    tools: MovieTools,
    prompt: PromptTemplate,
    max_iterations: u32,
}

impl ChatAgent {
    pub fn new(llm: GeminiClient, tools: MovieTools, max_iterations: u32) -> Result<Self> {
        Ok(Self {
            llm,
            tools,
            prompt: PromptTemplate::new(REACT_CHAT_TEMPLATE)?,
            max_iterations,
        })
    }

    /// Answer one human input given the prior conversation.
    pub async fn run(&self, input: &str, history: &[ChatMessage]) -> Result<(String, AgentStats)> {
        let defs = tool_definitions();
        let tools_text = render_tools(&defs);
        let names = tool_names(&defs);
        let chat_history = format_transcript(history);

        let mut steps: Vec<(String, String)> = Vec::new();
        let mut stats = AgentStats::default();

        while stats.iterations < self.max_iterations {
            stats.iterations += 1;
            let scratchpad = react::format_scratchpad(&steps);
            let prompt = self.prompt.format(&[
                ("tools", tools_text.as_str()),
                ("tool_names", names.as_str()),
                ("chat_history", chat_history.as_str()),
                ("input", input),
                ("agent_scratchpad", scratchpad.as_str()),
            ])?;

            let response = self
                .llm
                .invoke_with_stop(&[ChatMessage::human(prompt)], &[STOP_SEQUENCE])
                .await?;

            match react::parse_output(&response.content) {
                Ok(AgentStep::Finish { output, .. }) => {
                    debug!(iterations = stats.iterations, "agent finished");
                    return Ok((output, stats));
                }
                Ok(AgentStep::Action { tool, input, log }) => {
                    stats.tool_calls += 1;
                    info!(tool = %tool, input = %input, "agent action");
                    let observation = self.tools.dispatch(&tool, &input).await?;
                    steps.push((log, observation));
                }
                Err(failure) => {
                    stats.parse_failures += 1;
                    warn!(observation = %failure.observation, "unparseable agent output");
                    steps.push((failure.log, failure.observation));
                }
            }
        }

        warn!(max = self.max_iterations, "agent hit iteration limit");
        Ok((ITERATION_LIMIT_OUTPUT.to_string(), stats))
    }
}

pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Interactive loop: `> ` prompt, `exit` or end of input stops.
pub async fn run_session(agent: &ChatAgent, history: &ChatHistory) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question == "exit" {
            break;
        }
        if question.is_empty() {
            continue;
        }

        let prior = history
            .messages()
            .await
            .context("loading chat history")?;
        let (output, stats) = agent.run(question, &prior).await?;
        history
            .add_exchange(question, &output)
            .await
            .context("saving chat history")?;

        debug!(
            session = history.session_id(),
            iterations = stats.iterations,
            tool_calls = stats.tool_calls,
            "turn complete"
        );
        println!("{output}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique_uuids() {
        let a = new_session_id();
        let b = new_session_id();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn react_template_has_agent_slots() {
        let t = PromptTemplate::new(REACT_CHAT_TEMPLATE).unwrap();
        assert_eq!(
            t.input_variables(),
            vec!["tools", "tool_names", "chat_history", "input", "agent_scratchpad"]
        );
    }
}
