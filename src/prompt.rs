//! Prompt templates and the prompt → model → string chain.
//!
//! Templates use `{name}` placeholders. `{{` and `}}` produce literal braces,
//! so Cypher or JSON examples can be embedded verbatim.

use crate::error::{Error, Result};
use crate::llm::{ChatMessage, GeminiClient, Role};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Var(String),
}

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    pub fn new(template: &str) -> Result<Self> {
        Ok(Self {
            segments: parse(template)?,
        })
    }

    /// Placeholder names in first-seen order, without duplicates.
    pub fn input_variables(&self) -> Vec<&str> {
        let mut vars: Vec<&str> = Vec::new();
        for seg in &self.segments {
            if let Segment::Var(name) = seg
                && !vars.contains(&name.as_str())
            {
                vars.push(name);
            }
        }
        vars
    }

    pub fn format(&self, vars: &[(&str, &str)]) -> Result<String> {
        let mut out = String::new();
        for seg in &self.segments {
            match seg {
                Segment::Literal(text) => out.push_str(text),
                Segment::Var(name) => {
                    let value = vars
                        .iter()
                        .find(|(k, _)| k == name)
                        .map(|(_, v)| *v)
                        .ok_or_else(|| {
                            Error::template(format!("missing value for variable '{name}'"))
                        })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

fn parse(template: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for n in chars.by_ref() {
                    match n {
                        '}' => {
                            closed = true;
                            break;
                        }
                        '{' => return Err(Error::template("nested '{' inside placeholder")),
                        _ => name.push(n),
                    }
                }
                if !closed {
                    return Err(Error::template("unclosed '{' in template"));
                }
                let name = name.trim();
                if name.is_empty() {
                    return Err(Error::template("empty placeholder '{}'"));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Var(name.to_string()));
            }
            '}' => return Err(Error::template("single '}' encountered in template")),
            _ => literal.push(c),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

#[derive(Debug, Clone)]
enum MessageTemplate {
    Message(Role, PromptTemplate),
    /// Slot filled with prior conversation turns.
    History,
}

#[derive(Debug, Clone)]
pub struct ChatPromptTemplate {
    messages: Vec<MessageTemplate>,
}

impl ChatPromptTemplate {
    pub fn from_messages(messages: &[(Role, &str)]) -> Result<Self> {
        let messages = messages
            .iter()
            .map(|(role, text)| Ok(MessageTemplate::Message(*role, PromptTemplate::new(text)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { messages })
    }

    /// Insert the history slot before the last message.
    pub fn with_history(mut self) -> Self {
        let at = self.messages.len().saturating_sub(1);
        self.messages.insert(at, MessageTemplate::History);
        self
    }

    pub fn input_variables(&self) -> Vec<&str> {
        let mut vars: Vec<&str> = Vec::new();
        for m in &self.messages {
            if let MessageTemplate::Message(_, t) = m {
                for v in t.input_variables() {
                    if !vars.contains(&v) {
                        vars.push(v);
                    }
                }
            }
        }
        vars
    }

    pub fn format_messages(&self, vars: &[(&str, &str)]) -> Result<Vec<ChatMessage>> {
        self.format_messages_with_history(vars, &[])
    }

    pub fn format_messages_with_history(
        &self,
        vars: &[(&str, &str)],
        history: &[ChatMessage],
    ) -> Result<Vec<ChatMessage>> {
        let mut out = Vec::with_capacity(self.messages.len() + history.len());
        for m in &self.messages {
            match m {
                MessageTemplate::Message(role, t) => out.push(ChatMessage {
                    role: *role,
                    content: t.format(vars)?,
                }),
                MessageTemplate::History => out.extend(history.iter().cloned()),
            }
        }
        Ok(out)
    }
}

/// prompt | model | string output.
#[derive(Clone)]
pub struct LlmChain {
    prompt: ChatPromptTemplate,
    llm: GeminiClient,
}

impl LlmChain {
    pub fn new(prompt: ChatPromptTemplate, llm: GeminiClient) -> Self {
        Self { prompt, llm }
    }

    pub async fn invoke(&self, vars: &[(&str, &str)]) -> Result<String> {
        let messages = self.prompt.format_messages(vars)?;
        debug!(messages = messages.len(), "invoking chain");
        let response = self.llm.invoke(&messages).await?;
        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_placeholders() {
        let t = PromptTemplate::new("Schema: {schema}\nQuestion: {question}").unwrap();
        assert_eq!(t.input_variables(), vec!["schema", "question"]);
        let out = t
            .format(&[("question", "Who?"), ("schema", "(:Movie)")])
            .unwrap();
        assert_eq!(out, "Schema: (:Movie)\nQuestion: Who?");
    }

    #[test]
    fn doubled_braces_are_literal() {
        let t = PromptTemplate::new("MATCH (m:Movie {{title: '{title}'}}) RETURN m").unwrap();
        assert_eq!(t.input_variables(), vec!["title"]);
        assert_eq!(
            t.format(&[("title", "Matrix, The")]).unwrap(),
            "MATCH (m:Movie {title: 'Matrix, The'}) RETURN m"
        );
    }

    #[test]
    fn repeated_variable_listed_once() {
        let t = PromptTemplate::new("{a} and {a} and { b }").unwrap();
        assert_eq!(t.input_variables(), vec!["a", "b"]);
    }

    #[test]
    fn missing_variable_is_named() {
        let t = PromptTemplate::new("{question}").unwrap();
        let err = t.format(&[]).unwrap_err().to_string();
        assert!(err.contains("question"), "{err}");
    }

    #[test]
    fn malformed_templates_rejected() {
        assert!(PromptTemplate::new("open {brace").is_err());
        assert!(PromptTemplate::new("stray } brace").is_err());
        assert!(PromptTemplate::new("empty {}").is_err());
    }

    #[test]
    fn chat_template_orders_messages() {
        let prompt = ChatPromptTemplate::from_messages(&[
            (Role::System, "You are a surfer dude."),
            (Role::Human, "{question}"),
        ])
        .unwrap();
        assert_eq!(prompt.input_variables(), vec!["question"]);
        let msgs = prompt
            .format_messages(&[("question", "How are the waves?")])
            .unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, Role::System);
        assert_eq!(msgs[1].content, "How are the waves?");
    }

    #[test]
    fn history_slot_goes_before_last_message() {
        let prompt = ChatPromptTemplate::from_messages(&[
            (Role::System, "sys"),
            (Role::Human, "{input}"),
        ])
        .unwrap()
        .with_history();
        let history = vec![ChatMessage::human("hi"), ChatMessage::ai("hello")];
        let msgs = prompt
            .format_messages_with_history(&[("input", "now")], &history)
            .unwrap();
        let contents: Vec<&str> = msgs.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["sys", "hi", "hello", "now"]);
    }
}
