use tree_sitter::Node;

use super::{attach_comments, collapse_ws, field_text, merge_items, node_text, parse, ClassBody, Item, Key, MergeError};

const INDENT: &str = "    ";

pub(crate) fn grammar() -> tree_sitter::Language {
    tree_sitter_python::language()
}

pub(crate) fn merge(new: &str, old: &str) -> Result<Option<String>, MergeError> {
    let grammar = grammar();

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

/* ============================================================
   Items
   ============================================================ */

fn collect(container: Node, src: &str) -> Vec<Item> {
    let mut items = Vec::new();
    let mut comments = Vec::new();
    let mut cursor = container.walk();

    for node in container.named_children(&mut cursor) {
        if node.kind() == "comment" {
            comments.push(node_text(node, src));
            continue;
        }

        let first = items.is_empty();
        let mut item = classify(node, src, first);
        match item.class.as_mut() {
            Some(body) => body.header = attach_comments(&mut comments, std::mem::take(&mut body.header)),
            None => item.text = attach_comments(&mut comments, item.text),
        }
        items.push(item);
    }

    if !comments.is_empty() {
        let text = comments.join("\n");
        items.push(Item::new(Key::Text(collapse_ws(&text)), text, false));
    }

    items
}

fn classify(node: Node, src: &str, first: bool) -> Item {
    let text = node_text(node, src);

    match node.kind() {
        "import_statement" | "import_from_statement" | "future_import_statement" => {
            Item::new(Key::Import(collapse_ws(&text)), text, false)
        }

        "expression_statement" => {
            let inner = node.named_child(0);
            match inner.map(|n| n.kind()) {
                Some("string") if first => Item::new(Key::Prologue, text, false),
                Some("assignment") => {
                    let target = inner
                        .and_then(|n| n.child_by_field_name("left"))
                        .filter(|l| l.kind() == "identifier")
                        .and_then(|l| l.utf8_text(src.as_bytes()).ok());
                    match target {
                        Some(name) => Item::new(Key::Named(name.to_string()), text, false),
                        None => Item::new(Key::Text(collapse_ws(&text)), text, false),
                    }
                }
                _ => Item::new(Key::Text(collapse_ws(&text)), text, false),
            }
        }

        "function_definition" => named(node, node, src, text),

        "class_definition" => class_item(node, node, src).unwrap_or_else(|| named(node, node, src, text)),

        "decorated_definition" => match node.child_by_field_name("definition") {
            Some(def) if def.kind() == "class_definition" => {
                class_item(node, def, src).unwrap_or_else(|| named(node, def, src, text))
            }
            Some(def) => named(node, def, src, text),
            None => Item::new(Key::Text(collapse_ws(&text)), text, true),
        },

        "if_statement" if is_main_guard(node, src) => Item::new(Key::MainGuard, text, true),

        _ => {
            let block = text.contains('\n');
            Item::new(Key::Text(collapse_ws(&text)), text, block)
        }
    }
}

fn named(outer: Node, def: Node, src: &str, text: String) -> Item {
    match field_text(def, "name", src) {
        Some(name) => Item::new(Key::Named(name), text, true),
        None => Item::new(Key::Text(collapse_ws(&text)), text, outer.end_position().row > outer.start_position().row),
    }
}

/// Only top-level classes are split into members.
fn class_item(outer: Node, class: Node, src: &str) -> Option<Item> {
    if outer.start_position().column != 0 {
        return None;
    }

    let name = field_text(class, "name", src)?;
    let body = class.child_by_field_name("body")?;
    let header = src.get(outer.start_byte()..body.start_byte())?.trim_end().to_string();

    Some(Item {
        key: Key::Named(name),
        text: String::new(),
        block: true,
        class: Some(ClassBody {
            header,
            members: collect(body, src),
        }),
    })
}

fn is_main_guard(node: Node, src: &str) -> bool {
    field_text(node, "condition", src)
        .map(|c| c.contains("__name__") && c.contains("__main__"))
        .unwrap_or(false)
}

/* ============================================================
   Layout
   ============================================================ */

fn render(items: Vec<Item>) -> String {
    let mut prologue = None;
    let mut futures = Vec::new();
    let mut imports = Vec::new();
    let mut body = Vec::new();
    let mut guard = None;

    for item in items {
        match &item.key {
            Key::Prologue => prologue = Some(item.text),
            Key::Import(k) if k.starts_with("from __future__") => futures.push(item.text),
            Key::Import(_) => imports.push(item.text),
            Key::MainGuard => guard = Some(item.text),
            _ => body.push(item),
        }
    }

    let mut out = String::new();

    if let Some(doc) = prologue {
        out.push_str(&doc);
        out.push_str("\n\n");
    }

    futures.extend(imports);
    let has_imports = !futures.is_empty();
    if has_imports {
        out.push_str(&futures.join("\n"));
    }

    let mut prev_block = has_imports;
    let mut first = !has_imports;
    for item in body {
        let text = render_item(&item);
        if !first {
            out.push_str(if prev_block || item.block { "\n\n\n" } else { "\n" });
        }
        out.push_str(&text);
        prev_block = item.block;
        first = false;
    }

    if let Some(g) = guard {
        if !out.trim().is_empty() {
            out.push_str("\n\n\n");
        }
        out.push_str(&g);
    }

    let mut out = out.trim_end().to_string();
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

fn render_item(item: &Item) -> String {
    let Some(class) = &item.class else {
        return item.text.clone();
    };

    let mut members = String::new();
    let mut prev_block = false;
    for (i, m) in class.members.iter().enumerate() {
        if i > 0 {
            members.push_str(if prev_block || m.block { "\n\n" } else { "\n" });
        }
        members.push_str(&render_item(m));
        prev_block = m.block;
    }
    if members.trim().is_empty() {
        members = "pass".to_string();
    }

    format!("{}\n{}", class.header, indent(&members))
}

fn indent(s: &str) -> String {
    s.lines()
        .map(|l| {
            if l.trim().is_empty() {
                String::new()
            } else {
                format!("{INDENT}{l}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
