use super::Record;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub(crate) const NODE_PROPERTIES_QUERY: &str = "
CALL db.schema.nodeTypeProperties()
YIELD nodeLabels, propertyName, propertyTypes
RETURN nodeLabels, propertyName, propertyTypes
";

pub(crate) const REL_PROPERTIES_QUERY: &str = "
CALL db.schema.relTypeProperties()
YIELD relType, propertyName, propertyTypes
RETURN relType, propertyName, propertyTypes
";

pub(crate) const PATTERNS_QUERY: &str = "
MATCH (a)-[r]->(b)
UNWIND labels(a) AS start
UNWIND labels(b) AS `end`
RETURN DISTINCT start, type(r) AS type, `end`
LIMIT 200
";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphSchema {
    /// label → [(property, TYPE)]
    pub node_properties: BTreeMap<String, Vec<(String, String)>>,
    /// relationship type → [(property, TYPE)]
    pub rel_properties: BTreeMap<String, Vec<(String, String)>>,
    /// (start label, relationship type, end label)
    pub relationships: Vec<(String, String, String)>,
}

impl GraphSchema {
    pub fn from_records(nodes: &[Record], rels: &[Record], patterns: &[Record]) -> Self {
        let mut schema = Self::default();

        for row in nodes {
            let Some(labels) = row.get("nodeLabels").and_then(Value::as_array) else {
                continue;
            };
            let prop = row.get("propertyName").and_then(Value::as_str);
            // A multi-label node type contributes its properties to every label.
            for label in labels.iter().filter_map(Value::as_str) {
                let entry = schema.node_properties.entry(label.to_string()).or_default();
                if let Some(prop) = prop {
                    entry.push((prop.to_string(), property_type(row.get("propertyTypes"))));
                }
            }
        }

        for row in rels {
            let Some(rel_type) = row.get("relType").and_then(Value::as_str) else {
                continue;
            };
            let rel_type = rel_type.trim_start_matches(':').trim_matches('`');
            if let Some(prop) = row.get("propertyName").and_then(Value::as_str) {
                schema
                    .rel_properties
                    .entry(rel_type.to_string())
                    .or_default()
                    .push((prop.to_string(), property_type(row.get("propertyTypes"))));
            }
        }

        for row in patterns {
            let field = |k: &str| row.get(k).and_then(Value::as_str).map(str::to_string);
            if let (Some(start), Some(rel), Some(end)) =
                (field("start"), field("type"), field("end"))
            {
                schema.relationships.push((start, rel, end));
            }
        }

        for props in schema
            .node_properties
            .values_mut()
            .chain(schema.rel_properties.values_mut())
        {
            props.sort();
            props.dedup();
        }
        schema.relationships.sort();
        schema.relationships.dedup();
        schema
    }

    pub fn is_empty(&self) -> bool {
        self.node_properties.is_empty()
            && self.rel_properties.is_empty()
            && self.relationships.is_empty()
    }
}

/// `["String"]` → `STRING`, `["LongArray"]` → `LIST`.
fn property_type(types: Option<&Value>) -> String {
    let raw = types
        .and_then(Value::as_array)
        .and_then(|t| t.first())
        .and_then(Value::as_str)
        .unwrap_or("Any");
    if raw.ends_with("Array") {
        return "LIST".into();
    }
    match raw {
        "String" => "STRING".into(),
        "Long" | "Integer" => "INTEGER".into(),
        "Double" | "Float" => "FLOAT".into(),
        other => other.to_uppercase(),
    }
}

fn write_props(f: &mut fmt::Formatter<'_>, name: &str, props: &[(String, String)]) -> fmt::Result {
    let body = props
        .iter()
        .map(|(p, t)| format!("{p}: {t}"))
        .collect::<Vec<_>>()
        .join(", ");
    writeln!(f, "{name} {{{body}}}")
}

impl fmt::Display for GraphSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Node properties:")?;
        for (label, props) in &self.node_properties {
            write_props(f, label, props)?;
        }
        writeln!(f, "Relationship properties:")?;
        for (rel, props) in &self.rel_properties {
            write_props(f, rel, props)?;
        }
        writeln!(f, "The relationships:")?;
        for (start, rel, end) in &self.relationships {
            writeln!(f, "(:{start})-[:{rel}]->(:{end})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> Record {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn builds_and_formats_schema() {
        let nodes = vec![
            record(json!({"nodeLabels": ["Movie"], "propertyName": "title", "propertyTypes": ["String"]})),
            record(json!({"nodeLabels": ["Movie"], "propertyName": "released", "propertyTypes": ["Long"]})),
            record(json!({"nodeLabels": ["Genre"], "propertyName": null, "propertyTypes": null})),
        ];
        let rels = vec![record(
            json!({"relType": ":`ACTED_IN`", "propertyName": "roles", "propertyTypes": ["StringArray"]}),
        )];
        let patterns = vec![
            record(json!({"start": "Movie", "type": "IN_GENRE", "end": "Genre"})),
            record(json!({"start": "Person", "type": "ACTED_IN", "end": "Movie"})),
        ];

        let schema = GraphSchema::from_records(&nodes, &rels, &patterns);
        assert!(!schema.is_empty());
        assert_eq!(schema.node_properties["Genre"], vec![]);
        assert_eq!(
            schema.rel_properties["ACTED_IN"],
            vec![("roles".to_string(), "LIST".to_string())]
        );

        let text = schema.to_string();
        assert!(text.contains("Movie {released: INTEGER, title: STRING}"), "{text}");
        assert!(text.contains("ACTED_IN {roles: LIST}"), "{text}");
        assert!(text.contains("(:Movie)-[:IN_GENRE]->(:Genre)"), "{text}");
        assert!(text.find("(:Movie)").unwrap() < text.find("(:Person)").unwrap());
    }

    #[test]
    fn multi_label_nodes_keep_every_label() {
        let nodes = vec![
            record(json!({"nodeLabels": ["Actor", "Person"], "propertyName": "name", "propertyTypes": ["String"]})),
            record(json!({"nodeLabels": ["Director", "Person"], "propertyName": "name", "propertyTypes": ["String"]})),
            record(json!({"nodeLabels": ["Director", "Person"], "propertyName": "born", "propertyTypes": ["Long"]})),
        ];
        let patterns = vec![
            record(json!({"start": "Person", "type": "DIRECTED", "end": "Movie"})),
            record(json!({"start": "Director", "type": "DIRECTED", "end": "Movie"})),
            record(json!({"start": "Person", "type": "DIRECTED", "end": "Movie"})),
        ];
        let schema = GraphSchema::from_records(&nodes, &[], &patterns);

        let labels: Vec<&str> = schema.node_properties.keys().map(String::as_str).collect();
        assert_eq!(labels, vec!["Actor", "Director", "Person"]);
        assert_eq!(
            schema.node_properties["Person"],
            vec![
                ("born".to_string(), "INTEGER".to_string()),
                ("name".to_string(), "STRING".to_string()),
            ]
        );
        assert_eq!(schema.relationships.len(), 2);

        let text = schema.to_string();
        assert!(text.contains("Person {born: INTEGER, name: STRING}"), "{text}");
        assert!(text.contains("(:Person)-[:DIRECTED]->(:Movie)"), "{text}");
    }

    #[test]
    fn patterns_query_expands_all_labels() {
        assert!(PATTERNS_QUERY.contains("UNWIND labels(a)"));
        assert!(PATTERNS_QUERY.contains("UNWIND labels(b)"));
    }

    #[test]
    fn rows_missing_fields_are_skipped() {
        let nodes = vec![record(json!({"propertyName": "x"}))];
        let patterns = vec![record(json!({"start": "A", "type": "R"}))];
        let schema = GraphSchema::from_records(&nodes, &[], &patterns);
        assert!(schema.is_empty());
    }
}
