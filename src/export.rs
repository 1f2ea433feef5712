//! Document export for generated PRDs
//!
//! Renders one chat message either as a titled markdown file or as a
//! print-ready standalone HTML document. Both entry points return a
//! success flag and never propagate an error to the caller; failures are
//! logged and reported as `false`.

use std::path::Path;

use chrono::Utc;

use crate::session::ChatMessage;

/// Write the message as a titled markdown document.
///
/// Returns true on success; any IO failure is logged and reported as
/// false.
pub fn export_markdown(message: &ChatMessage, title: &str, path: &Path) -> bool {
    let document = format!(
        "# {}\n\nGenerated: {}\n\n---\n\n{}\n",
        title,
        Utc::now().format("%Y-%m-%d %H:%M UTC"),
        message.content
    );

    match std::fs::write(path, document) {
        Ok(()) => {
            tracing::info!("Exported markdown document to {}", path.display());
            true
        }
        Err(e) => {
            tracing::error!("Markdown export to {} failed: {}", path.display(), e);
            false
        }
    }
}

/// Write the message as a standalone, print-ready HTML document.
///
/// Returns true on success; any IO failure is logged and reported as
/// false.
pub fn export_html(message: &ChatMessage, title: &str, path: &Path) -> bool {
    let body = markdown_to_html(&message.content);
    let document = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title}</title>
<style>
body {{
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', 'PingFang SC',
        'Hiragino Sans GB', 'Microsoft YaHei', 'Helvetica Neue', Helvetica,
        Arial, sans-serif;
    line-height: 1.6;
    color: #333;
    max-width: 800px;
    margin: 0 auto;
    padding: 20px;
    background: white;
}}
h1 {{
    color: #2c3e50;
    border-bottom: 3px solid #3498db;
    padding-bottom: 10px;
    font-size: 28px;
}}
h2 {{
    color: #34495e;
    margin-top: 30px;
    font-size: 22px;
    border-left: 4px solid #3498db;
    padding-left: 15px;
}}
h3 {{ color: #2c3e50; margin-top: 25px; font-size: 18px; }}
p {{ margin-bottom: 12px; }}
ul {{ margin-bottom: 15px; padding-left: 30px; }}
code {{
    background-color: #f8f9fa;
    padding: 2px 6px;
    border-radius: 3px;
    font-family: 'Monaco', 'Consolas', 'Courier New', monospace;
    font-size: 14px;
}}
</style>
</head>
<body>
<h1>{title}</h1>
{body}
</body>
</html>
"#,
        title = escape_html(title),
        body = body,
    );

    match std::fs::write(path, document) {
        Ok(()) => {
            tracing::info!("Exported HTML document to {}", path.display());
            true
        }
        Err(e) => {
            tracing::error!("HTML export to {} failed: {}", path.display(), e);
            false
        }
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Line-oriented markdown-to-HTML conversion covering the subset the
/// upstream workflow emits: headings, bullet lists, inline bold and code,
/// and plain paragraphs.
fn markdown_to_html(markdown: &str) -> String {
    let mut html = String::new();
    let mut in_list = false;

    for line in markdown.lines() {
        let line = escape_html(line.trim_end());

        let rendered = if let Some(heading) = line.strip_prefix("### ") {
            close_list(&mut html, &mut in_list);
            format!("<h3>{}</h3>", inline_markup(heading))
        } else if let Some(heading) = line.strip_prefix("## ") {
            close_list(&mut html, &mut in_list);
            format!("<h2>{}</h2>", inline_markup(heading))
        } else if let Some(heading) = line.strip_prefix("# ") {
            close_list(&mut html, &mut in_list);
            format!("<h1>{}</h1>", inline_markup(heading))
        } else if let Some(item) = line.strip_prefix("- ") {
            if !in_list {
                html.push_str("<ul>\n");
                in_list = true;
            }
            format!("<li>{}</li>", inline_markup(item))
        } else if line.is_empty() {
            close_list(&mut html, &mut in_list);
            continue;
        } else {
            close_list(&mut html, &mut in_list);
            format!("<p>{}</p>", inline_markup(&line))
        };

        html.push_str(&rendered);
        html.push('\n');
    }
    close_list(&mut html, &mut in_list);
    html
}

fn close_list(html: &mut String, in_list: &mut bool) {
    if *in_list {
        html.push_str("</ul>\n");
        *in_list = false;
    }
}

/// Replace paired `**bold**` and `` `code` `` spans.
fn inline_markup(text: &str) -> String {
    let text = replace_pairs(text, "**", "<strong>", "</strong>");
    replace_pairs(&text, "`", "<code>", "</code>")
}

fn replace_pairs(text: &str, delimiter: &str, open: &str, close: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let Some(start) = rest.find(delimiter) else {
            result.push_str(rest);
            return result;
        };
        let after = &rest[start + delimiter.len()..];
        let Some(end) = after.find(delimiter) else {
            // Unpaired delimiter stays literal.
            result.push_str(rest);
            return result;
        };
        result.push_str(&rest[..start]);
        result.push_str(open);
        result.push_str(&after[..end]);
        result.push_str(close);
        rest = &after[end + delimiter.len()..];
    }
}
