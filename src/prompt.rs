use crate::request::GenerationRequest;
use std::fmt::Write;

pub const SYSTEM_PROMPT: &str = "\
You are an experienced litigation attorney drafting a formal defense \
(answer to complaint) on behalf of the defendant. Use the facts and the \
supporting material provided. Structure the document with a preliminary \
section, a statement of facts, the legal grounds with citations, and the \
requests to the court. Do not invent statutes or precedents that are not \
in the supporting material.";

/// Renders the user turn from the petition facts and retrieval context.
pub fn user_prompt(req: &GenerationRequest) -> String {
    let facts = &req.facts;
    let mut out = String::new();

    out.push_str("# Petition\n\n");
    if let Some(case_type) = &facts.case_type {
        let _ = writeln!(out, "Case type: {case_type}");
    }
    for (key, value) in &facts.extra {
        match value {
            serde_json::Value::String(s) => {
                let _ = writeln!(out, "{key}: {s}");
            }
            other => {
                let _ = writeln!(out, "{key}: {other}");
            }
        }
    }
    out.push('\n');
    out.push_str("## Facts\n\n");
    out.push_str(facts.facts.trim());
    out.push_str("\n\n");

    if !req.context.trim().is_empty() {
        out.push_str("# Supporting material\n\n");
        out.push_str(req.context.trim());
        out.push_str("\n\n");
    }

    out.push_str("Draft the complete defense now.");
    out
}

/// Rough input size, 4 characters per token.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() / 4) as u64
}
