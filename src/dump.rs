//! Text renderings of message trees (tree view, nested text form, hex).

use crate::tree::NodeRef;

/// Hex bytes separated by spaces.
pub fn hex_string(b: &[u8]) -> String {
    b.iter().map(|x| format!("{:02x}", x)).collect::<Vec<_>>().join(" ")
}

const HEX_COLUMN: usize = 50;
const HEX_PER_LINE: usize = 8;

/// Accept marker, overflow/underflow marker and bracketed `index:name`.
pub fn anchor(node: &NodeRef<'_>) -> String {
    let mut anchor = String::new();
    anchor.push_str(if node.is_accepting() { ">>" } else { "--" });
    if node.has_overflow() {
        anchor.push_str("<OF>");
    } else if node.has_underflow() {
        anchor.push_str("<UF>");
    }
    let (open, close) = if node.is_container() { ('{', '}') } else { ('[', ']') };
    anchor.push(open);
    anchor.push_str(&format!("{}:{}", node.index_offset(), node.name()));
    anchor.push(close);
    anchor
}

/// One line per node, children indented under their parent. Terminals show their
/// bytes in 8-byte hex rows.
pub fn format_tree(node: &NodeRef<'_>) -> String {
    let mut out = String::new();
    write_node(node, "", &mut out);
    out
}

fn write_node(node: &NodeRef<'_>, prefix: &str, out: &mut String) {
    let mut line = format!("{}{} {}", prefix, anchor(node), node.full_type());
    let info = node.info();
    if node.is_terminal() {
        let raw = node.raw_bytes();
        let pad = " ".repeat(HEX_COLUMN.saturating_sub(line.chars().count()));
        line.push_str(&pad);
        let rows: Vec<&[u8]> = if raw.is_empty() {
            vec![&[][..]]
        } else {
            raw.chunks(HEX_PER_LINE).collect()
        };
        for (i, row) in rows.iter().enumerate() {
            if i > 0 {
                out.push_str(&line);
                out.push('\n');
                line = format!("{:width$}", prefix, width = HEX_COLUMN);
            }
            line.push_str(&format!("| {:23} |", hex_string(row)));
        }
        if !info.is_empty() {
            line.push_str(&format!(" {}", info));
        }
        out.push_str(&line);
        out.push('\n');
        return;
    }
    if !info.is_empty() {
        line.push_str(&format!(" ({})", info));
    }
    out.push_str(&line);
    out.push('\n');
    for child in node.children() {
        let child_prefix = if child.has_next() {
            format!("{}  |", prefix)
        } else {
            format!("{}   ", prefix)
        };
        write_node(&child, &child_prefix, out);
    }
}

fn size_string(size: Option<usize>) -> String {
    size.map(|s| s.to_string()).unwrap_or_else(|| "*".to_string())
}

/// Nested text form: `Type("ref", len of size) { ... }` for containers and
/// `Type("ref", len of size) [ hex ] <info>` for terminals.
pub fn as_text(node: &NodeRef<'_>) -> String {
    let head = format!(
        "{}(\"{}\", {} of {})",
        node.static_type(),
        node.ref_name(),
        node.len(),
        size_string(node.size())
    );
    if node.is_terminal() {
        return format!("{} [ {} ] <{}>", head, hex_string(&node.raw_bytes()), node.info());
    }
    let mut text = format!("{} {{", head);
    let children: Vec<_> = node.children().collect();
    if !children.is_empty() {
        text.push('\n');
    }
    for (i, child) in children.iter().enumerate() {
        for line in as_text(child).lines() {
            text.push_str("    ");
            text.push_str(line);
            text.push('\n');
        }
        if i + 1 < children.len() {
            text.pop();
            text.push_str(",\n");
        }
    }
    text.push('}');
    text
}
