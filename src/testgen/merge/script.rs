use tree_sitter::Node;

use super::{attach_comments, collapse_ws, field_text, merge_items, node_text, parse, Item, Key, MergeError};
use crate::detectors::language::Language;

const DECLARATIONS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "class_declaration",
    "abstract_class_declaration",
    "interface_declaration",
    "type_alias_declaration",
    "enum_declaration",
    "function_signature",
    "module",
    "internal_module",
];

/// The JavaScript grammar covers JSX; TypeScript needs its own dialect.
pub(crate) fn grammar(language: Language) -> Option<tree_sitter::Language> {
    match language {
        Language::JavaScript | Language::Jsx => Some(tree_sitter_javascript::language()),
        Language::TypeScript => Some(tree_sitter_typescript::language_typescript()),
        Language::Tsx => Some(tree_sitter_typescript::language_tsx()),
        Language::Python | Language::Unknown => None,
    }
}

pub(crate) fn merge(language: Language, new: &str, old: &str) -> Result<Option<String>, MergeError> {
    let Some(grammar) = grammar(language) else {
        return Ok(None);
    };

    let Some(old_tree) = parse(&grammar, old)? else {
        return Ok(None);
    };
    let Some(new_tree) = parse(&grammar, new)? else {
        return Ok(None);
    };

    let old_items = collect(old_tree.root_node(), old);
    let new_items = collect(new_tree.root_node(), new);

    Ok(Some(render(merge_items(old_items, new_items))))
}

fn collect(program: Node, src: &str) -> Vec<Item> {
    let mut items: Vec<Item> = Vec::new();
    let mut comments = Vec::new();
    let mut cursor = program.walk();

    for node in program.named_children(&mut cursor) {
        if node.kind() == "comment" {
            comments.push(node_text(node, src));
            continue;
        }

        let text = node_text(node, src);
        let in_prologue = items.iter().all(|i| i.key == Key::Prologue);
        let key = key_for(node, src, &text, in_prologue);
        let block = text.contains('\n');
        items.push(Item::new(key, attach_comments(&mut comments, text), block));
    }

    if !comments.is_empty() {
        let text = comments.join("\n");
        items.push(Item::new(Key::Text(collapse_ws(&text)), text, false));
    }

    items
}

fn key_for(node: Node, src: &str, text: &str, in_prologue: bool) -> Key {
    let fallback = || Key::Text(collapse_ws(text));

    match node.kind() {
        "import_statement" => Key::Import(collapse_ws(text)),

        "export_statement" => match node.child_by_field_name("declaration") {
            Some(decl) => declaration_name(decl, src).map(Key::Named).unwrap_or_else(fallback),
            None if node.child_by_field_name("value").is_some() => Key::Named("default".into()),
            None => fallback(),
        },

        "expression_statement" => {
            let Some(expr) = node.named_child(0) else {
                return fallback();
            };
            match expr.kind() {
                // "use client" and friends
                "string" if in_prologue => Key::Prologue,
                "call_expression" => call_key(expr, src).map(Key::Call).unwrap_or_else(fallback),
                _ => fallback(),
            }
        }

        _ => declaration_name(node, src).map(Key::Named).unwrap_or_else(fallback),
    }
}

fn declaration_name(node: Node, src: &str) -> Option<String> {
    let kind = node.kind();

    if DECLARATIONS.contains(&kind) {
        return field_text(node, "name", src);
    }

    match kind {
        "lexical_declaration" | "variable_declaration" => {
            let mut cursor = node.walk();
            let names: Vec<String> = node
                .named_children(&mut cursor)
                .filter(|c| c.kind() == "variable_declarator")
                .filter_map(|c| field_text(c, "name", src))
                .collect();
            if names.is_empty() {
                None
            } else {
                Some(names.join(","))
            }
        }
        "ambient_declaration" => node.named_child(0).and_then(|d| declaration_name(d, src)),
        _ => None,
    }
}

/// `describe("adds", ...)` keys as `describe("adds")`. Calls without a
/// leading string argument have no stable identity.
fn call_key(call: Node, src: &str) -> Option<String> {
    let callee = field_text(call, "function", src)?;
    let first = call.child_by_field_name("arguments")?.named_child(0)?;

    match first.kind() {
        "string" | "template_string" => {
            let label = first.utf8_text(src.as_bytes()).ok()?;
            Some(format!("{}({})", collapse_ws(&callee), label))
        }
        _ => None,
    }
}

fn render(items: Vec<Item>) -> String {
    let mut prologue = Vec::new();
    let mut imports = Vec::new();
    let mut body = Vec::new();

    for item in items {
        match item.key {
            Key::Prologue => prologue.push(item.text),
            Key::Import(_) => imports.push(item.text),
            _ => body.push(item.text),
        }
    }

    let sections: Vec<String> = [prologue.join("\n"), imports.join("\n"), body.join("\n\n")]
        .into_iter()
        .filter(|s| !s.trim().is_empty())
        .collect();

    let mut out = sections.join("\n\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}
