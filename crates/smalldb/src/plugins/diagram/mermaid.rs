//! Mermaid state diagram reader using chumsky
//!
//! Reads `stateDiagram` / `stateDiagram-v2` text line by line:
//!
//! ```text
//! stateDiagram-v2
//!     %% include review.mmd Editor
//!     [*] --> draft : create
//!     state "In review" as review
//!     state Editor {
//!         draft --> review : submit
//!     }
//!     review --> [*] : delete
//! ```
//!
//! `[*]` is the not-exists pseudo-state. Composite states become diagram
//! groups; a state belongs to the innermost composite it is first
//! mentioned in.

use chumsky::prelude::*;
use tracing::{debug, span, trace, Level};

use crate::core::{
    Diagram, DiagramEdge, DiagramError, DiagramFormat, DiagramGroup, DiagramInclude, DiagramNode, DiagramParser,
};

const TERMINAL: &str = "[*]";

/// One line of a Mermaid state diagram
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `state "label" as id`, `state id`, `id` or `id : label`
    StateDecl { id: String, label: Option<String> },
    /// `from --> to` or `from --> to : label`
    Transition {
        from: String,
        to: String,
        label: Option<String>,
    },
    /// `state id {`
    CompositeStart { id: String },
    /// `}`
    CompositeEnd,
    /// `%% include file [group]`
    Include { file: String, group: Option<String> },
}

/// Mermaid state diagram parser
#[derive(Debug, Clone, Copy, Default)]
pub struct MermaidParser;

impl MermaidParser {
    pub fn new() -> Self {
        Self
    }

    fn ws<'src>() -> impl chumsky::Parser<'src, &'src str, (), extra::Err<Rich<'src, char>>> + Clone {
        one_of(" \t").repeated().ignored()
    }

    fn ws1<'src>() -> impl chumsky::Parser<'src, &'src str, (), extra::Err<Rich<'src, char>>> + Clone {
        one_of(" \t").repeated().at_least(1).ignored()
    }

    /// Parse an identifier (state id)
    fn identifier<'src>() -> impl chumsky::Parser<'src, &'src str, String, extra::Err<Rich<'src, char>>> + Clone {
        any()
            .filter(|c: &char| c.is_alphanumeric() || *c == '_')
            .repeated()
            .at_least(1)
            .collect::<String>()
    }

    /// Parse a state reference (either [*] or identifier)
    fn state_ref<'src>() -> impl chumsky::Parser<'src, &'src str, String, extra::Err<Rich<'src, char>>> + Clone {
        just(TERMINAL).to(TERMINAL.to_string()).or(Self::identifier())
    }

    fn quoted_string<'src>() -> impl chumsky::Parser<'src, &'src str, String, extra::Err<Rich<'src, char>>> + Clone {
        just('"')
            .ignore_then(any().filter(|c| *c != '"').repeated().collect::<String>())
            .then_ignore(just('"'))
    }

    /// `: text` up to the end of the line
    fn description<'src>() -> impl chumsky::Parser<'src, &'src str, Option<String>, extra::Err<Rich<'src, char>>> + Clone
    {
        just(':')
            .padded_by(Self::ws())
            .ignore_then(any().repeated().collect::<String>())
            .map(|s| s.trim().to_string())
            .or_not()
            .map(|label| label.filter(|s| !s.is_empty()))
    }

    fn transition_parser<'src>() -> impl chumsky::Parser<'src, &'src str, Statement, extra::Err<Rich<'src, char>>> + Clone
    {
        Self::state_ref()
            .then_ignore(just("-->").padded_by(Self::ws()))
            .then(Self::state_ref())
            .then_ignore(Self::ws())
            .then(Self::description())
            .map(|((from, to), label)| Statement::Transition { from, to, label })
    }

    fn state_keyword_parser<'src>(
    ) -> impl chumsky::Parser<'src, &'src str, Statement, extra::Err<Rich<'src, char>>> + Clone {
        let labeled = Self::quoted_string()
            .then_ignore(Self::ws1())
            .then_ignore(just("as"))
            .then_ignore(Self::ws1())
            .then(Self::identifier())
            .map(|(label, id)| Statement::StateDecl { id, label: Some(label) });

        let composite = Self::identifier()
            .then_ignore(Self::ws())
            .then_ignore(just('{'))
            .map(|id| Statement::CompositeStart { id });

        let plain = Self::identifier().map(|id| Statement::StateDecl { id, label: None });

        just("state")
            .ignore_then(Self::ws1())
            .ignore_then(choice((labeled, composite, plain)))
    }

    fn bare_state_parser<'src>() -> impl chumsky::Parser<'src, &'src str, Statement, extra::Err<Rich<'src, char>>> + Clone
    {
        Self::identifier()
            .then_ignore(Self::ws())
            .then(Self::description())
            .map(|(id, label)| Statement::StateDecl { id, label })
    }

    fn include_parser<'src>() -> impl chumsky::Parser<'src, &'src str, Statement, extra::Err<Rich<'src, char>>> + Clone {
        let path = any()
            .filter(|c: &char| !c.is_whitespace())
            .repeated()
            .at_least(1)
            .collect::<String>();
        let group = Self::quoted_string().or(Self::identifier());

        just("%%")
            .ignore_then(Self::ws())
            .ignore_then(just("include"))
            .ignore_then(Self::ws1())
            .ignore_then(path)
            .then(Self::ws1().ignore_then(group).or_not())
            .then_ignore(Self::ws())
            .map(|(file, group)| Statement::Include { file, group })
    }

    fn statement_parser<'src>() -> impl chumsky::Parser<'src, &'src str, Statement, extra::Err<Rich<'src, char>>> + Clone
    {
        choice((
            Self::include_parser(),
            just('}').to(Statement::CompositeEnd),
            Self::state_keyword_parser(),
            Self::transition_parser(),
            Self::bare_state_parser(),
        ))
        .padded_by(Self::ws())
        .then_ignore(end())
    }

    /// Parse one line; `line_number` is 1-based and only used in errors
    pub fn parse_statement(&self, line: &str, line_number: usize) -> Result<Statement, DiagramError> {
        Self::statement_parser()
            .parse(line)
            .into_result()
            .map_err(|errors| match errors.first() {
                Some(error) => DiagramError::parse_error(error.to_string(), line_number, error.span().start + 1),
                None => DiagramError::parse_error("invalid statement".to_string(), line_number, 1),
            })
    }

    fn is_header_line(line: &str) -> bool {
        line.to_lowercase().starts_with("statediagram")
    }

    /// Lines that carry presentation only
    fn is_ignored(line: &str) -> bool {
        line == "--"
            || ["direction ", "classDef ", "class ", "style ", "accTitle", "accDescr", "title "]
                .iter()
                .any(|keyword| line.starts_with(keyword))
    }
}

fn node_for<'d>(diagram: &'d mut Diagram, id: &str, group: Option<&String>) -> &'d mut DiagramNode {
    let node = if id == TERMINAL {
        DiagramNode::not_exists(TERMINAL)
    } else if diagram.node(id).is_none() {
        DiagramNode {
            group: group.cloned(),
            ..DiagramNode::new(id)
        }
    } else {
        DiagramNode::new(id)
    };
    diagram.ensure_node(node)
}

impl DiagramParser for MermaidParser {
    fn parse(&self, input: &str) -> Result<Diagram, DiagramError> {
        let parse_span = span!(Level::DEBUG, "parse_mermaid", input_len = input.len());
        let _enter = parse_span.enter();

        let mut diagram = Diagram::new();
        let mut composites: Vec<String> = Vec::new();
        let mut in_note = false;

        for (index, line) in input.lines().enumerate() {
            let line_number = index + 1;
            let trimmed = line.trim();

            if in_note {
                in_note = !trimmed.starts_with("end note");
                continue;
            }
            if trimmed.starts_with("note ") {
                // Multi-line notes have no colon on the opening line
                in_note = !trimmed.contains(':');
                continue;
            }
            if trimmed.is_empty() || Self::is_header_line(trimmed) || Self::is_ignored(trimmed) {
                continue;
            }
            if trimmed.starts_with("%%") && Self::include_parser().parse(trimmed).into_result().is_err() {
                continue;
            }

            let statement = self.parse_statement(trimmed, line_number)?;
            trace!(line = line_number, ?statement, "Parsed statement");
            match statement {
                Statement::StateDecl { id, label } => {
                    let node = node_for(&mut diagram, &id, composites.last());
                    if label.is_some() {
                        node.label = label;
                    }
                }
                Statement::Transition { from, to, label } => {
                    node_for(&mut diagram, &from, composites.last());
                    node_for(&mut diagram, &to, composites.last());
                    let mut edge = DiagramEdge::new(from, to);
                    edge.label = label;
                    diagram.edges.push(edge);
                }
                Statement::CompositeStart { id } => {
                    if !diagram.groups.iter().any(|g| g.id == id) {
                        diagram.groups.push(DiagramGroup { id: id.clone(), name: None });
                    }
                    composites.push(id);
                }
                Statement::CompositeEnd => {
                    if composites.pop().is_none() {
                        return Err(DiagramError::parse_error(
                            "unbalanced '}'".to_string(),
                            line_number,
                            line.find('}').map_or(1, |c| c + 1),
                        ));
                    }
                }
                Statement::Include { file, group } => {
                    diagram.includes.push(DiagramInclude { file, group });
                }
            }
        }

        if let Some(open) = composites.last() {
            return Err(DiagramError::invalid_diagram(format!("composite state '{}' is not closed", open)));
        }

        debug!(
            nodes = diagram.node_count(),
            edges = diagram.edge_count(),
            groups = diagram.groups.len(),
            "Parsed Mermaid diagram"
        );
        Ok(diagram)
    }

    fn format(&self) -> DiagramFormat {
        DiagramFormat::Mermaid
    }

    fn name(&self) -> &'static str {
        "mermaid"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NodeKind;

    #[test]
    fn test_parse_transition_with_label() {
        let parser = MermaidParser::new();
        let result = parser.parse_statement("Idle --> Running : start", 1).unwrap();
        assert_eq!(
            result,
            Statement::Transition {
                from: "Idle".to_string(),
                to: "Running".to_string(),
                label: Some("start".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_terminal_transition() {
        let parser = MermaidParser::new();
        let result = parser.parse_statement("[*]-->Idle", 1).unwrap();
        assert_eq!(
            result,
            Statement::Transition {
                from: "[*]".to_string(),
                to: "Idle".to_string(),
                label: None,
            }
        );
    }

    #[test]
    fn test_parse_state_forms() {
        let parser = MermaidParser::new();
        assert_eq!(
            parser.parse_statement("state \"In review\" as review", 1).unwrap(),
            Statement::StateDecl {
                id: "review".to_string(),
                label: Some("In review".to_string()),
            }
        );
        assert_eq!(
            parser.parse_statement("state draft", 1).unwrap(),
            Statement::StateDecl {
                id: "draft".to_string(),
                label: None,
            }
        );
        assert_eq!(
            parser.parse_statement("draft : Draft article", 1).unwrap(),
            Statement::StateDecl {
                id: "draft".to_string(),
                label: Some("Draft article".to_string()),
            }
        );
        assert_eq!(
            parser.parse_statement("state Editor {", 1).unwrap(),
            Statement::CompositeStart {
                id: "Editor".to_string()
            }
        );
    }

    #[test]
    fn test_parse_include() {
        let parser = MermaidParser::new();
        assert_eq!(
            parser.parse_statement("%% include ../shared/review.mmd Editor", 1).unwrap(),
            Statement::Include {
                file: "../shared/review.mmd".to_string(),
                group: Some("Editor".to_string()),
            }
        );
        assert_eq!(
            parser.parse_statement("%%include a.json", 1).unwrap(),
            Statement::Include {
                file: "a.json".to_string(),
                group: None,
            }
        );
    }

    #[test]
    fn test_parse_full_diagram() {
        let input = r#"
stateDiagram-v2
    direction LR
    %% A plain comment
    %% include shared.json
    [*] --> draft : create
    state Editor {
        draft --> review : submit
        review --> draft : reject
    }
    note right of review : waits for an editor
    review --> published : publish
    published --> [*]
"#;
        let diagram = MermaidParser::new().parse(input).unwrap();

        assert_eq!(diagram.node_count(), 4); // [*], draft, review, published
        assert_eq!(diagram.edge_count(), 5);
        assert_eq!(diagram.includes.len(), 1);
        assert_eq!(diagram.groups.len(), 1);

        // First mentioned outside of the composite
        assert_eq!(diagram.node("draft").unwrap().group, None);
        assert_eq!(diagram.node("review").unwrap().group.as_deref(), Some("Editor"));
        assert_eq!(diagram.node("[*]").unwrap().kind, NodeKind::NotExists);
    }

    #[test]
    fn test_multiline_note_is_skipped() {
        let input = "stateDiagram-v2\n  a --> b\n  note left of a\n    anything --> here\n  end note\n";
        let diagram = MermaidParser::new().parse(input).unwrap();
        assert_eq!(diagram.edge_count(), 1);
    }

    #[test]
    fn test_error_reports_line() {
        let input = "stateDiagram-v2\n  a --> b\n  a -> b\n";
        match MermaidParser::new().parse(input).unwrap_err() {
            DiagramError::ParseError { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unbalanced_composites() {
        assert!(MermaidParser::new().parse("stateDiagram-v2\n}\n").is_err());
        assert!(MermaidParser::new().parse("stateDiagram-v2\nstate A {\n").is_err());
    }
}
