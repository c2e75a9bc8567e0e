//! HTML for the index and the token prompt, plus the favicon.
//!
//! Presentation only: these functions take the data the handlers produce and
//! return markup. Every key is escaped before it lands in the page.

use crate::models::object::ObjectInfo;

pub const FAVICON_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 64 64"><rect x="6" y="14" width="52" height="40" rx="6" fill="#2563eb"/><rect x="6" y="10" width="24" height="10" rx="3" fill="#1e40af"/><path d="M22 36h20M32 26v20" stroke="#fff" stroke-width="5" stroke-linecap="round"/></svg>"##;

const STYLE: &str = r#"
body { font-family: 'Segoe UI', Arial, sans-serif; background: #f4f6fb; margin: 0; }
.container { background: #fff; max-width: 640px; margin: 3rem auto; padding: 2rem 2.5rem;
  border-radius: 10px; box-shadow: 0 2px 16px rgba(0,0,0,0.08); }
.prompt { text-align: center; }
input[type="text"], input[type="file"] { padding: 0.5rem; border: 1px solid #ccc; border-radius: 5px; }
button { padding: 0.5rem 1.5rem; background: #2563eb; color: #fff; border: none; border-radius: 5px; cursor: pointer; }
button:hover { background: #1e40af; }
ul { list-style: none; padding: 0; }
.file-item { display: flex; justify-content: space-between; align-items: center;
  padding: 0.5rem 0; border-bottom: 1px solid #eee; }
.file-item a { color: #2563eb; text-decoration: none; font-weight: 500; }
.delete-btn { background: none; color: #c00; font-size: 1.2rem; padding: 0 0.5rem; }
.empty { color: #888; }
"#;

/// Standalone page asking for the token; submits it back to `/` as a query
/// parameter.
pub fn token_prompt_page() -> String {
    page(
        "Token Verification",
        r#"<div class="container prompt">
<h1>Enter Token</h1>
<form method="GET" action="/">
<input type="text" name="token" placeholder="Token" required>
<button type="submit">Verify</button>
</form>
</div>"#,
    )
}

/// Upload form followed by one entry per object. `token` is threaded into
/// every link and form so the next request is admitted too.
pub fn index_page(objects: &[ObjectInfo], token: Option<&str>) -> String {
    let hidden_token = token
        .map(|t| format!(r#"<input type="hidden" name="token" value="{}">"#, html_escape(t)))
        .unwrap_or_default();

    let action = html_escape(&root_location(token));
    let mut body = format!(
        r#"<div class="container">
<h1>Object Storage</h1>
<form method="post" action="{action}" enctype="multipart/form-data" class="upload-form">
<input type="file" name="file" required>
{hidden_token}
<button type="submit">Upload</button>
</form>
<h2>Stored Files</h2>
<ul>"#
    );

    if objects.is_empty() {
        body.push_str(r#"<li class="empty">No files uploaded yet.</li>"#);
    }
    for object in objects {
        let key = html_escape(&object.key);
        let href = html_escape(&object_href(&object.key, token));
        body.push_str(&format!(
            r#"<li class="file-item" data-key="{key}">
<a href="{href}" target="_blank">{key}</a>
<form method="post" action="{action}" class="delete-form" onsubmit="return confirm('Delete this file?');">
<input type="hidden" name="action" value="delete">
<input type="hidden" name="key" value="{key}">
{hidden_token}
<button type="submit" class="delete-btn" title="Delete {key}">&times;</button>
</form>
</li>"#
        ));
    }

    body.push_str("</ul>\n</div>");
    page("Object Storage", &body)
}

/// `/` or `/?token=...`; where mutations redirect back to.
pub fn root_location(token: Option<&str>) -> String {
    match token {
        Some(token) => format!("/?token={}", urlencoding::encode(token)),
        None => "/".to_string(),
    }
}

/// Download link for a key. Each byte outside the unreserved set is
/// percent-encoded, so keys containing `/`, `?` or `#` still round-trip.
pub fn object_href(key: &str, token: Option<&str>) -> String {
    let mut href = format!("/{}", urlencoding::encode(key));
    if let Some(token) = token {
        href.push_str("?token=");
        href.push_str(&urlencoding::encode(token));
    }
    href
}

fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<title>{title}</title>
<meta name="viewport" content="width=device-width, initial-scale=1">
<link rel="icon" href="/favicon.svg" type="image/svg+xml">
<style>{STYLE}</style>
</head>
<body>
{body}
</body>
</html>
"#
    )
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
