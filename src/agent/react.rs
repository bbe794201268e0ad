//! Text-protocol ReAct prompting: the model writes `Thought` / `Action` /
//! `Action Input` lines, we run the tool and append an `Observation`.

use fancy_regex::Regex;
use std::sync::LazyLock;

pub const REACT_CHAT_TEMPLATE: &str = r#"Assistant is a large language model built to help with a wide range of tasks, from answering simple questions to giving in-depth explanations and recommendations. It writes natural, human-like replies that fit the conversation.

Assistant keeps learning from the conversation and can use the tools below to look things up before it answers.

TOOLS:
------

Assistant has access to the following tools:

{tools}

To use a tool, please use the following format:

```
Thought: Do I need to use a tool? Yes
Action: the action to take, should be one of [{tool_names}]
Action Input: the input to the action
Observation: the result of the action
```

When you have a response to say to the Human, or if you do not need to use a tool, you MUST use the format:

```
Thought: Do I need to use a tool? No
Final Answer: [your response here]
```

Begin!

Previous conversation history:
{chat_history}

New input: {input}
{agent_scratchpad}"#;

pub const STOP_SEQUENCE: &str = "\nObservation";

const FINAL_ANSWER: &str = "Final Answer:";

static ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Action\s*\d*\s*:[\s]*(.*?)[\s]*Action\s*\d*\s*Input\s*\d*\s*:[\s]*(.*)")
        .expect("static regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStep {
    Action { tool: String, input: String, log: String },
    Finish { output: String, log: String },
}

/// Unparseable output, carried back to the model as an observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub observation: String,
    pub log: String,
}

pub fn parse_output(text: &str) -> Result<AgentStep, ParseFailure> {
    // The last answer wins when the model drafts more than one.
    if let Some(idx) = text.rfind(FINAL_ANSWER) {
        return Ok(AgentStep::Finish {
            output: text[idx + FINAL_ANSWER.len()..].trim().to_string(),
            log: text.to_string(),
        });
    }

    if let Ok(Some(caps)) = ACTION.captures(text) {
        let tool = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        let raw_input = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        let raw_input = raw_input
            .split(STOP_SEQUENCE)
            .next()
            .unwrap_or_default()
            .trim();
        let input = raw_input.trim_matches('"').to_string();
        if !tool.is_empty() {
            return Ok(AgentStep::Action {
                tool: tool.to_string(),
                input,
                log: text.to_string(),
            });
        }
    }

    let observation = if text.contains("Action") && !text.contains("Action Input") {
        "Invalid Format: Missing 'Action Input:' after 'Action:'"
    } else {
        "Invalid Format: Missing 'Action:' after 'Thought:'"
    };
    Err(ParseFailure {
        observation: observation.to_string(),
        log: text.to_string(),
    })
}

/// Rebuild the scratchpad from `(log, observation)` pairs.
pub fn format_scratchpad(steps: &[(String, String)]) -> String {
    let mut out = String::new();
    for (log, observation) in steps {
        out.push_str(log);
        out.push_str("\nObservation: ");
        out.push_str(observation);
        out.push_str("\nThought: ");
    }
    out
}
