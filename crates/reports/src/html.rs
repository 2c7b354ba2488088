//! HTML rendering of agent answers for report mails.
//!
//! Agent answers are loose markdown. Only the subset agents actually emit in
//! reports is converted: pipe tables, `**bold**`, `*italic*` and `` `code` ``.
//! Everything else is escaped and kept as one paragraph per line.

const STYLE: &str = r#"
    body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; max-width: 800px; margin: 0 auto; padding: 20px; }
    .header { background-color: #4CAF50; color: white; padding: 20px; border-radius: 5px; margin-bottom: 20px; }
    .info-box { background-color: #f5f5f5; border-left: 4px solid #4CAF50; padding: 15px; margin-bottom: 20px; }
    .info-box strong { color: #4CAF50; }
    .response { background-color: white; border: 1px solid #ddd; padding: 20px; border-radius: 5px; }
    table { border-collapse: collapse; width: 100%; margin: 20px 0; }
    th, td { border: 1px solid #ddd; padding: 12px; text-align: left; }
    th { background-color: #4CAF50; color: white; }
    tr:nth-child(even) { background-color: #f9f9f9; }
    .footer { margin-top: 30px; padding-top: 20px; border-top: 1px solid #ddd; font-size: 12px; color: #666; text-align: center; }
"#;

/// What goes into one report mail.
#[derive(Debug, Clone, Copy)]
pub struct ReportContent<'a> {
    pub task_name: &'a str,
    pub agent_name: &'a str,
    pub prompt: &'a str,
    pub response: &'a str,
    /// Already formatted in the scheduler's timezone.
    pub executed_at: &'a str,
}

pub fn report_subject(task_name: &str, executed_at: &str) -> String {
    format!("Report: {task_name} ({executed_at})")
}

pub fn format_report_html(content: &ReportContent<'_>) -> String {
    let task_name = escape_html(content.task_name);
    let agent_name = escape_html(content.agent_name);
    let executed_at = escape_html(content.executed_at);
    let prompt = escape_html(content.prompt);
    let response = markdown_to_html(content.response);

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<style>{STYLE}</style>
</head>
<body>
<div class="header">
<h1>Scheduled report: {task_name}</h1>
</div>
<div class="info-box">
<p><strong>Agent:</strong> {agent_name}</p>
<p><strong>Executed at:</strong> {executed_at}</p>
<p><strong>Prompt:</strong></p>
<p style="font-style: italic; margin-left: 20px;">"{prompt}"</p>
</div>
<div class="response">
<h2>Response</h2>
{response}
</div>
<div class="footer">
<p>This report was generated automatically by agentdesk.</p>
<p>Schedules can be changed from the admin panel.</p>
</div>
</body>
</html>
"#
    )
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Convert an agent answer to an HTML fragment.
pub fn markdown_to_html(text: &str) -> String {
    let mut blocks = Vec::new();
    let mut table: Vec<Vec<String>> = Vec::new();

    for (i, line) in text.split('\n').enumerate() {
        let stripped = line.trim();

        if is_table_row(stripped) {
            if i > 0 && is_separator_row(stripped) {
                continue;
            }
            table.push(
                stripped
                    .trim_matches('|')
                    .split('|')
                    .map(|cell| inline(cell.trim()))
                    .collect(),
            );
            continue;
        }

        if !table.is_empty() {
            blocks.push(render_table(&std::mem::take(&mut table)));
        }
        if stripped.is_empty() {
            blocks.push("<br>".to_string());
        } else {
            blocks.push(format!("<p>{}</p>", inline(line)));
        }
    }
    if !table.is_empty() {
        blocks.push(render_table(&table));
    }

    blocks.join("\n")
}

fn is_table_row(stripped: &str) -> bool {
    stripped
        .strip_prefix('|')
        .is_some_and(|rest| rest.contains('|'))
}

fn is_separator_row(stripped: &str) -> bool {
    stripped
        .chars()
        .filter(|c| *c != '|')
        .all(|c| matches!(c, '-' | ':' | ' '))
}

/// First row is the header.
fn render_table(rows: &[Vec<String>]) -> String {
    let Some((header, body)) = rows.split_first() else {
        return String::new();
    };

    let mut html = vec!["<table>".to_string(), "<thead><tr>".to_string()];
    html.extend(header.iter().map(|cell| format!("<th>{cell}</th>")));
    html.push("</tr></thead>".to_string());
    if !body.is_empty() {
        html.push("<tbody>".to_string());
        for row in body {
            html.push("<tr>".to_string());
            html.extend(row.iter().map(|cell| format!("<td>{cell}</td>")));
            html.push("</tr>".to_string());
        }
        html.push("</tbody>".to_string());
    }
    html.push("</table>".to_string());
    html.join("\n")
}

fn inline(text: &str) -> String {
    let escaped = escape_html(text);
    let bold = wrap_delimited(&escaped, "**", "strong");
    let italic = wrap_delimited(&bold, "*", "em");
    wrap_delimited(&italic, "`", "code")
}

/// Wrap each non-empty `delim`-enclosed span in `<tag>`. Unpaired
/// delimiters stay literal.
fn wrap_delimited(line: &str, delim: &str, tag: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(open) = rest.find(delim) {
        let after = &rest[open + delim.len()..];
        let Some(first) = after.chars().next() else {
            break;
        };
        let Some(close) = after[first.len_utf8()..].find(delim) else {
            break;
        };
        let inner_len = first.len_utf8() + close;
        out.push_str(&rest[..open]);
        out.push('<');
        out.push_str(tag);
        out.push('>');
        out.push_str(&after[..inner_len]);
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
        rest = &after[inner_len + delim.len()..];
    }
    out.push_str(rest);
    out
}
