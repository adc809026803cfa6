// src/template/fields.rs
use crate::data::Payload;
use crate::template::xml::{Element, Node};
use once_cell::sync::Lazy;
use regex::Regex;

/// `MERGEFIELD name`, `MERGEFIELD "quoted name"`, any trailing switches.
static MERGEFIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*(?i:MERGEFIELD)\s+(?:"([^"]+)"|([^\s"]+))"#).expect("static regex")
});

/// Field name from a field instruction, or `None` if it is not a MERGEFIELD.
pub fn parse_instruction(instr: &str) -> Option<String> {
    let caps = MERGEFIELD.captures(instr)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

/// A merge field occupying `nodes[start..=end]` of one parent.
#[derive(Debug)]
struct FieldSpan {
    start: usize,
    end: usize,
    name: String,
    /// Run properties the substituted value inherits.
    rpr: Option<Element>,
}

/// Complex field whose `end` marker has not been seen yet.
struct OpenField {
    start: usize,
    depth: usize,
    nested: bool,
    separated: bool,
    instr: String,
    rpr: Option<Element>,
    result_rpr: Option<Element>,
}

/// Locate merge fields among the direct children of one element.
///
/// Complex fields must begin and end under the same parent. Fields that
/// contain other fields are not reported.
fn find_spans(nodes: &[Node]) -> Vec<FieldSpan> {
    let mut spans = Vec::new();
    let mut open: Option<OpenField> = None;

    for (i, node) in nodes.iter().enumerate() {
        let Node::Element(el) = node else { continue };

        if el.is("w:fldSimple") {
            if open.is_none() {
                if let Some(name) = el.attribute("w:instr").as_deref().and_then(parse_instruction)
                {
                    let rpr = el
                        .first_child("w:r")
                        .and_then(|r| r.first_child("w:rPr"))
                        .cloned();
                    spans.push(FieldSpan {
                        start: i,
                        end: i,
                        name,
                        rpr,
                    });
                }
            }
            continue;
        }
        if !el.is("w:r") {
            continue;
        }

        let fld_char = el
            .first_child("w:fldChar")
            .and_then(|c| c.attribute("w:fldCharType"));

        match (fld_char.as_deref(), open.as_mut()) {
            (Some("begin"), None) => {
                open = Some(OpenField {
                    start: i,
                    depth: 1,
                    nested: false,
                    separated: false,
                    instr: String::new(),
                    rpr: el.first_child("w:rPr").cloned(),
                    result_rpr: None,
                });
            }
            (Some("begin"), Some(field)) => {
                field.depth += 1;
                field.nested = true;
            }
            (Some("separate"), Some(field)) if field.depth == 1 => field.separated = true,
            (Some("end"), Some(field)) if field.depth > 1 => field.depth -= 1,
            (Some("end"), Some(_)) => {
                if let Some(field) = open.take() {
                    let name = parse_instruction(&field.instr).filter(|_| !field.nested);
                    if let Some(name) = name {
                        spans.push(FieldSpan {
                            start: field.start,
                            end: i,
                            name,
                            rpr: field.result_rpr.or(field.rpr),
                        });
                    }
                }
            }
            (None, Some(field)) if field.depth == 1 => {
                let instr: Vec<&Element> =
                    el.child_elements().filter(|c| c.is("w:instrText")).collect();
                if !instr.is_empty() {
                    for part in instr {
                        field.instr.push_str(&part.text());
                    }
                } else if field.separated
                    && field.result_rpr.is_none()
                    && el.first_child("w:t").is_some()
                {
                    field.result_rpr = el.first_child("w:rPr").cloned();
                }
            }
            _ => {}
        }
    }

    spans
}

/// Append merge-field names under `nodes` to `out`, in document order,
/// skipping names already present.
pub fn collect_fields(nodes: &[Node], out: &mut Vec<String>) {
    let spans = find_spans(nodes);
    let mut pending = spans.iter().peekable();
    let mut i = 0;

    while i < nodes.len() {
        if let Some(span) = pending.next_if(|s| s.start == i) {
            if !out.contains(&span.name) {
                out.push(span.name.clone());
            }
            i = span.end + 1;
            continue;
        }
        if let Node::Element(el) = &nodes[i] {
            collect_fields(&el.children, out);
        }
        i += 1;
    }
}

/// Replace every merge field under `nodes` whose name is in `payload`.
pub fn merge_fields(nodes: &mut Vec<Node>, payload: &Payload) {
    let spans = find_spans(nodes);

    for (i, node) in nodes.iter_mut().enumerate() {
        if spans.iter().any(|s| (s.start..=s.end).contains(&i)) {
            continue;
        }
        if let Node::Element(el) = node {
            merge_fields(&mut el.children, payload);
        }
    }

    for span in spans.into_iter().rev() {
        let Some(value) = payload.get(&span.name) else {
            continue;
        };
        let run = value_run(span.rpr, value);
        nodes.splice(span.start..=span.end, [Node::Element(run)]);
    }
}

/// `<w:r>` holding `value`, one `<w:t>` per line separated by `<w:br/>`.
fn value_run(rpr: Option<Element>, value: &str) -> Element {
    let mut run = Element::new("w:r");
    if let Some(rpr) = rpr {
        run.children.push(Node::Element(rpr));
    }
    for (n, line) in value.split('\n').enumerate() {
        if n > 0 {
            run.children.push(Node::Element(Element::new("w:br")));
        }
        let text = Element::new("w:t")
            .with_attribute("xml:space", "preserve")
            .with_text(line.strip_suffix('\r').unwrap_or(line));
        run.children.push(Node::Element(text));
    }
    run
}
