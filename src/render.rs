use std::io::Write;

use crate::tree::{Forest, TreeNode, Visit};

const NOT_FOUND: &str = "(not found)";
const NONE: &str = "(none)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextStyle {
    #[default]
    Compact,
    Detailed,
}

fn uuid_str(node: &TreeNode) -> String {
    node.uuid().map_or_else(|| NONE.to_string(), |uuid| uuid.to_string())
}

fn location(node: &TreeNode) -> String {
    node.path()
        .map_or_else(|| NOT_FOUND.to_string(), |path| path.display().to_string())
}

/// Indented listing of the forest. A forest that is just one image is always listed in detail.
pub fn write_text<W: Write>(
    out: &mut W,
    forest: &Forest,
    style: TextStyle,
) -> std::io::Result<()> {
    let style = if forest.is_single() {
        TextStyle::Detailed
    } else {
        style
    };

    forest.walk(0, &mut |node: &TreeNode, level, visit| {
        if visit == Visit::Leave {
            return Ok(());
        }
        let indent = "    ".repeat(level);
        match style {
            TextStyle::Compact => {
                writeln!(out, "{indent}{} [UUID: {}]", location(node), uuid_str(node))
            }
            TextStyle::Detailed => write_detail(out, &indent, node),
        }
    })
}

fn write_detail<W: Write>(out: &mut W, indent: &str, node: &TreeNode) -> std::io::Result<()> {
    let uuid = uuid_str(node);
    writeln!(out, "{indent}- {uuid}")?;
    writeln!(out, "{indent}  {}", "-".repeat(uuid.len()))?;
    writeln!(out, "{indent}  Filename: {}", location(node))?;
    if let Some(header) = node.header() {
        writeln!(out, "{indent}  Type: {}", header.image_type)?;
        match header.snapshot_uuid {
            Some(snapshot) => writeln!(out, "{indent}  Last snapshot: {snapshot}")?,
            None => writeln!(out, "{indent}  Last snapshot: {NONE}")?,
        }
        writeln!(out, "{indent}  Size: {} bytes", header.disk_size)?;
    }
    writeln!(out)
}

/// `MediaRegistry` fragment for a VirtualBox.xml file, nesting each differential disk inside its
/// parent.
pub fn write_xml<W: Write>(out: &mut W, forest: &Forest) -> std::io::Result<()> {
    writeln!(out, "<MediaRegistry>")?;
    forest.walk(1, &mut |node: &TreeNode, level, visit| {
        let indent = "  ".repeat(level);
        match visit {
            Visit::Enter => writeln!(
                out,
                r#"{indent}<HardDisk uuid="{}" location="{}" format="VDI">"#,
                escape_attr(&uuid_str(node)),
                escape_attr(&location(node))
            ),
            Visit::Leave => writeln!(out, "{indent}</HardDisk>"),
        }
    })?;
    writeln!(out, "</MediaRegistry>")
}

fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}
