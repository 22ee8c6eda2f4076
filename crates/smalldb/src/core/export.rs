//! Rendering a finished definition as a Mermaid state diagram

use std::fmt::Write;

use super::definition::Definition;
use super::types::StateName;

fn node(state: &StateName) -> &str {
    if state.is_not_exists() {
        "[*]"
    } else {
        state.as_str()
    }
}

/// Render `definition` as `stateDiagram-v2` text.
///
/// The not-exists pseudo-state is drawn as `[*]`. Multi-target transitions
/// become one edge per target, all with the transition name as label.
/// The output reads back with the Mermaid diagram parser.
pub fn to_mermaid(definition: &Definition) -> String {
    let mut out = String::from("stateDiagram-v2\n");

    for state in definition.states() {
        match state.label() {
            Some(label) => {
                let _ = writeln!(out, "    state \"{}\" as {}", label, state.name.as_str());
            }
            None => {
                let _ = writeln!(out, "    {}", state.name.as_str());
            }
        }
    }

    for transition in definition.transitions() {
        for target in &transition.targets {
            let _ = match &transition.name {
                Some(name) => writeln!(out, "    {} --> {} : {}", node(&transition.source), node(target), name),
                None => writeln!(out, "    {} --> {}", node(&transition.source), node(target)),
            };
        }
    }

    out
}
