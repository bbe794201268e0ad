//! Session-keyed chat history stored in the graph.
//!
//! Layout: `(:Session {id})-[:LAST_MESSAGE]->(:Message {type, content})`,
//! with older messages reachable through `(older)-[:NEXT]->(newer)`.

use super::{GraphClient, Record};
use crate::error::{Error, Result};
use crate::llm::{ChatMessage, Role};
use serde_json::{Value, json};
use tracing::debug;

const ADD_MESSAGE_QUERY: &str = "
MERGE (s:Session {id: $session_id})
WITH s
OPTIONAL MATCH (s)-[lm:LAST_MESSAGE]->(last_message)
CREATE (s)-[:LAST_MESSAGE]->(new:Message)
SET new += {type: $type, content: $content, createdAt: $created_at}
WITH new, lm, last_message
WHERE last_message IS NOT NULL
CREATE (last_message)-[:NEXT]->(new)
DELETE lm
";

const CLEAR_QUERY: &str = "
MATCH (s:Session {id: $session_id})
OPTIONAL MATCH (s)-[:LAST_MESSAGE]->(last_message)
OPTIONAL MATCH (last_message)<-[:NEXT*0..]-(message)
DETACH DELETE s, message
";

fn read_query(window: usize) -> String {
    let depth = (window * 2).saturating_sub(1);
    format!(
        "
MATCH (s:Session {{id: $session_id}})-[:LAST_MESSAGE]->(last_message)
MATCH p = (last_message)<-[:NEXT*0..{depth}]-()
WITH p, length(p) AS length
ORDER BY length DESC
LIMIT 1
UNWIND reverse(nodes(p)) AS node
RETURN node.type AS type, node.content AS content
"
    )
}

#[derive(Clone)]
pub struct ChatHistory {
    graph: GraphClient,
    session_id: String,
    window: usize,
}

impl ChatHistory {
    /// `window` is the number of human/ai exchanges returned by [`Self::messages`].
    pub fn new(graph: GraphClient, session_id: impl Into<String>, window: usize) -> Self {
        Self {
            graph,
            session_id: session_id.into(),
            window,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn add_message(&self, message: &ChatMessage) -> Result<()> {
        debug!(session = %self.session_id, role = %message.role, "appending history message");
        self.graph
            .query(
                ADD_MESSAGE_QUERY,
                json!({
                    "session_id": self.session_id,
                    "type": message.role.as_str(),
                    "content": message.content,
                    "created_at": chrono::Utc::now().to_rfc3339(),
                }),
            )
            .await
            .map(|_| ())
    }

    pub async fn add_exchange(&self, human: &str, ai: &str) -> Result<()> {
        self.add_message(&ChatMessage::human(human)).await?;
        self.add_message(&ChatMessage::ai(ai)).await
    }

    /// Most recent messages for the session, oldest first.
    pub async fn messages(&self) -> Result<Vec<ChatMessage>> {
        if self.window == 0 {
            return Ok(Vec::new());
        }
        let records = self
            .graph
            .query(
                &read_query(self.window),
                json!({ "session_id": self.session_id }),
            )
            .await?;
        records_to_messages(&records)
    }

    pub async fn clear(&self) -> Result<()> {
        self.graph
            .query(CLEAR_QUERY, json!({ "session_id": self.session_id }))
            .await
            .map(|_| ())
    }
}

fn records_to_messages(records: &[Record]) -> Result<Vec<ChatMessage>> {
    records
        .iter()
        .map(|r| {
            let kind = r.get("type").and_then(Value::as_str).unwrap_or_default();
            let role = Role::parse(kind)
                .ok_or_else(|| Error::parse(format!("unknown history message type '{kind}'")))?;
            let content = r
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Ok(ChatMessage { role, content })
        })
        .collect()
}

/// Render history as `Human: ...` / `AI: ...` lines for text prompts.
pub fn format_transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            let speaker = match m.role {
                Role::Human => "Human",
                Role::Ai => "AI",
                Role::System => "System",
            };
            format!("{speaker}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_depth_covers_window() {
        assert!(read_query(3).contains("[:NEXT*0..5]"));
        assert!(read_query(1).contains("[:NEXT*0..1]"));
    }

    #[test]
    fn records_become_messages() {
        let records: Vec<Record> = vec![
            json!({"type": "human", "content": "Find me a heist movie"}),
            json!({"type": "ai", "content": "Try Heat."}),
        ]
        .into_iter()
        .map(|v| v.as_object().unwrap().clone())
        .collect();
        let msgs = records_to_messages(&records).unwrap();
        assert_eq!(msgs[0], ChatMessage::human("Find me a heist movie"));
        assert_eq!(msgs[1].role, Role::Ai);
    }

    #[test]
    fn unknown_type_is_error() {
        let records: Vec<Record> = vec![json!({"type": "tool", "content": "x"})
            .as_object()
            .unwrap()
            .clone()];
        assert!(records_to_messages(&records).is_err());
    }

    #[test]
    fn transcript_labels_speakers() {
        let text = format_transcript(&[ChatMessage::human("hi"), ChatMessage::ai("hello")]);
        assert_eq!(text, "Human: hi\nAI: hello");
        assert_eq!(format_transcript(&[]), "");
    }
}
