//! The version landing page.
//!
//! Deliberately plain: a list of archived versions with download links. The
//! interesting rendering happens in readers' ebook software, not here.

use hoard_db::models::StorageRow;
use serde::Serialize;
use std::sync::LazyLock;

const LANDING_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>{{ title }}</title>
</head>
<body>
    <h1>{{ title }}</h1>
    <p>Archived versions of work {{ work_id }}, newest first.</p>
    <ul>
    {% for version in versions %}
        <li>
            <a href="/works/{{ work_id }}?version={{ version.storage_id }}">{{ version.format }}, updated {{ version.updated_time }}</a>
            {% if version.is_head %}(current){% endif %}
        </li>
    {% endfor %}
    </ul>
</body>
</html>
"#;

static ENGINE: LazyLock<upon::Engine<'static>> = LazyLock::new(|| {
    let mut engine = upon::Engine::new();
    engine.add_template("landing", LANDING_TEMPLATE).expect("landing template compiles");
    engine
});

#[derive(Serialize)]
struct LandingContext {
    work_id: i64,
    title: String,
    versions: Vec<LandingVersion>,
}

#[derive(Serialize)]
struct LandingVersion {
    storage_id: i64,
    format: String,
    updated_time: i64,
    is_head: bool,
}

/// Render the landing page for a work's version history.
pub fn render_landing(work_id: i64, history: &[StorageRow]) -> Result<String, upon::Error> {
    let title = history
        .iter()
        .find_map(|entry| entry.title.clone())
        .unwrap_or_else(|| format!("Work {work_id}"));
    let context = LandingContext {
        work_id,
        title,
        versions: history
            .iter()
            .map(|entry| LandingVersion {
                storage_id: entry.storage_id,
                format: entry.format.clone(),
                updated_time: entry.updated_time,
                is_head: entry.is_head(),
            })
            .collect(),
    };
    ENGINE.template("landing").render(&context).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(storage_id: i64, patch_of: Option<i64>, title: Option<&str>) -> StorageRow {
        StorageRow {
            storage_id,
            work_id: 42,
            format: "pdf".to_string(),
            uploaded_time: 1_700_000_000,
            updated_time: 1_000,
            location: format!("42_{storage_id}"),
            patch_of,
            retrieved_from: "worker".to_string(),
            sha1: format!("{storage_id:040}"),
            title: title.map(str::to_string),
            author: None,
        }
    }

    #[test]
    fn test_versions_linked_by_storage_id() {
        let history = vec![entry(2, None, Some("A Title")), entry(1, Some(2), None)];
        let html = render_landing(42, &history).unwrap();
        assert!(html.contains("/works/42?version=2"));
        assert!(html.contains("/works/42?version=1"));
        assert!(html.contains("A Title"));
        assert!(html.contains("(current)"));
    }

    #[test]
    fn test_untitled_work_gets_fallback_title() {
        let html = render_landing(7, &[entry(1, None, None)]).unwrap();
        assert!(html.contains("Work 7"));
    }
}
