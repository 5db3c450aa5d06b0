use std::collections::HashMap;

use scraper::{Html, Selector};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::file::{File, MetaValue};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed JSON response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed file URL {0:?} in listing: {1}")]
    BadUrl(String, #[source] url::ParseError),

    #[error("malformed HTML listing: {0}")]
    Html(String),
}

/// Which of the two simple-repository response encodings a body is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Json,
    Html,
}

/// Picks JSON if the response declared the simple-repository JSON media
/// type, otherwise falls back to HTML. Content negotiation is by response
/// `Content-Type`, not by sniffing the body.
pub fn detect_kind(content_type: Option<&str>) -> ContentKind {
    match content_type {
        Some(ct) if ct.contains("application/vnd.pypi.simple.v1+json") => ContentKind::Json,
        Some(ct) if ct.contains("json") => ContentKind::Json,
        _ => ContentKind::Html,
    }
}

/// Parses a root index listing (project names) from a response body.
///
/// `base_url` is the effective URL the response was fetched from (after
/// redirects), used to resolve relative hrefs in the HTML form. Returns
/// display names in upstream order; callers normalize as needed.
pub fn parse_projects(body: &str, kind: ContentKind, base_url: &Url) -> Result<Vec<String>, ParseError> {
    match kind {
        ContentKind::Json => parse_projects_json(body),
        ContentKind::Html => parse_projects_html(body, base_url),
    }
}

/// Parses a per-project listing (files) from a response body.
pub fn parse_files(body: &str, kind: ContentKind, base_url: &Url) -> Result<Vec<File>, ParseError> {
    match kind {
        ContentKind::Json => parse_files_json(body, base_url),
        ContentKind::Html => parse_files_html(body, base_url),
    }
}

#[derive(Deserialize)]
struct RawProjectsDoc {
    #[serde(default)]
    projects: Vec<RawProject>,
}

#[derive(Deserialize)]
struct RawProject {
    name: String,
}

fn parse_projects_json(body: &str) -> Result<Vec<String>, ParseError> {
    let doc: RawProjectsDoc = serde_json::from_str(body)?;
    Ok(doc.projects.into_iter().map(|p| p.name).collect())
}

#[derive(Deserialize)]
struct RawFilesDoc {
    #[serde(default)]
    files: Vec<RawJsonFile>,
}

#[derive(Deserialize)]
struct RawJsonFile {
    filename: String,
    url: String,
    #[serde(default)]
    hashes: HashMap<String, String>,
    #[serde(default, rename = "requires-python")]
    requires_python: Option<String>,
    #[serde(default)]
    yanked: MetaValue<String>,
    #[serde(default, rename = "core-metadata")]
    core_metadata: Option<MetaValue<HashMap<String, String>>>,
    #[serde(default, rename = "dist-info-metadata")]
    dist_info_metadata: Option<MetaValue<HashMap<String, String>>>,
}

fn parse_files_json(body: &str, base_url: &Url) -> Result<Vec<File>, ParseError> {
    let doc: RawFilesDoc = serde_json::from_str(body)?;
    doc.files
        .into_iter()
        .map(|raw| {
            let url = base_url
                .join(&raw.url)
                .map_err(|e| ParseError::BadUrl(raw.url.clone(), e))?;
            Ok(File {
                name: raw.filename,
                url,
                hashes: raw.hashes,
                requires_python: raw.requires_python,
                yanked: raw.yanked,
                core_metadata: raw
                    .core_metadata
                    .or(raw.dist_info_metadata)
                    .unwrap_or(MetaValue::Absent),
            })
        })
        .collect()
}

fn parse_projects_html(body: &str, _base_url: &Url) -> Result<Vec<String>, ParseError> {
    // HTML parsing is tolerant of documents with no `<body>`; `scraper`
    // already handles that by operating over the whole document fragment.
    let document = Html::parse_document(body);
    let selector = anchor_selector();
    Ok(document
        .select(&selector)
        .map(|a| a.text().collect::<String>().trim().to_string())
        .filter(|name| !name.is_empty())
        .collect())
}

fn parse_files_html(body: &str, base_url: &Url) -> Result<Vec<File>, ParseError> {
    let document = Html::parse_document(body);
    let selector = anchor_selector();
    document
        .select(&selector)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            Some((a, href))
        })
        .map(|(a, href)| {
            let resolved = base_url
                .join(href)
                .map_err(|e| ParseError::BadUrl(href.to_string(), e))?;
            let name = a.text().collect::<String>().trim().to_string();

            let mut hashes = HashMap::new();
            if let Some(fragment) = resolved.fragment() {
                if let Some((algo, hex)) = fragment.split_once('=') {
                    hashes.insert(algo.to_string(), hex.to_string());
                }
            }

            let requires_python = a
                .value()
                .attr("data-requires-python")
                .map(|v| html_unescape(v));

            let yanked = match a.value().attr("data-yanked") {
                None => MetaValue::Absent,
                Some(v) => {
                    let v = html_unescape(v);
                    if v.is_empty() || v.eq_ignore_ascii_case("true") {
                        MetaValue::Bare
                    } else {
                        MetaValue::WithValue(v)
                    }
                }
            };

            let core_metadata = a
                .value()
                .attr("data-core-metadata")
                .or_else(|| a.value().attr("data-dist-info-metadata"))
                .map(parse_meta_attr)
                .unwrap_or(MetaValue::Absent);

            // File URLs are served without their fragment; the hash lives
            // only in the parsed `hashes` map.
            let mut url = resolved;
            url.set_fragment(None);

            Ok(File {
                name,
                url,
                hashes,
                requires_python,
                yanked,
                core_metadata,
            })
        })
        .collect()
}

fn anchor_selector() -> Selector {
    // `Selector::parse` only fails on malformed CSS selectors, never at
    // runtime for a fixed literal, so this cannot actually panic.
    Selector::parse("a").expect("'a' is a valid CSS selector")
}

fn parse_meta_attr(value: &str) -> MetaValue<HashMap<String, String>> {
    let value = html_unescape(value);
    if value.is_empty() || value.eq_ignore_ascii_case("true") {
        return MetaValue::Bare;
    }
    if let Some((algo, hex)) = value.split_once('=') {
        if !algo.is_empty() && !hex.is_empty() {
            let mut map = HashMap::new();
            map.insert(algo.to_string(), hex.to_string());
            return MetaValue::WithValue(map);
        }
    }
    tracing::warn!(attr_value = %value, "unrecognized metadata attribute value, dropping");
    MetaValue::Absent
}

fn html_unescape(value: &str) -> String {
    // `scraper`'s attribute values already come back unescaped from the
    // underlying html5ever tokenizer.
    value.to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    fn base() -> Url {
        Url::parse("https://pypi.org/simple/jinja2/").unwrap()
    }

    #[test]
    fn parses_html_anchor_list() {
        let html = r#"<!DOCTYPE html><html><body>
            <a href="https://files.pythonhosted.org/jinja2-3.1.0-py3-none-any.whl#sha256=abcd1234">jinja2-3.1.0-py3-none-any.whl</a>
        </body></html>"#;
        let files = parse_files_html(html, &base()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "jinja2-3.1.0-py3-none-any.whl");
        assert_eq!(files[0].hashes.get("sha256").unwrap(), "abcd1234");
        assert!(!files[0].url.as_str().contains('#'));
    }

    #[test]
    fn tolerates_missing_body_tag() {
        let html = r#"<a href="jinja2-3.1.0.tar.gz">jinja2-3.1.0.tar.gz</a>"#;
        let files = parse_files_html(html, &base()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].url.as_str(), "https://pypi.org/simple/jinja2/jinja2-3.1.0.tar.gz");
    }

    #[test]
    fn parses_yanked_and_core_metadata_attrs() {
        let html = r#"<a href="a.whl" data-yanked="cve fixed elsewhere" data-core-metadata="sha256=deadbeef">a.whl</a>
                       <a href="b.whl" data-core-metadata="true">b.whl</a>
                       <a href="c.whl" data-yanked>c.whl</a>"#;
        let files = parse_files_html(html, &base()).unwrap();
        assert_eq!(
            files[0].yanked,
            MetaValue::WithValue("cve fixed elsewhere".to_string())
        );
        assert_eq!(
            files[0].core_metadata.as_value().unwrap().get("sha256").unwrap(),
            "deadbeef"
        );
        assert_eq!(files[1].core_metadata, MetaValue::Bare);
        assert_eq!(files[2].yanked, MetaValue::Bare);
    }

    #[test]
    fn parses_json_root_listing() {
        let body = r#"{"meta":{"api-version":"1.0"},"projects":[{"name":"NumPy"},{"name":"jinja2"}]}"#;
        let names = parse_projects_json(body).unwrap();
        assert_eq!(names, vec!["NumPy".to_string(), "jinja2".to_string()]);
    }

    #[test]
    fn parses_json_file_listing_with_relative_url() {
        let body = r#"{"meta":{"api-version":"1.0"},"files":[
            {"filename":"jinja2-3.1.0-py3-none-any.whl","url":"jinja2-3.1.0-py3-none-any.whl","hashes":{"sha256":"abc"},"requires-python":">=3.7","yanked":false}
        ]}"#;
        let files = parse_files_json(body, &base()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(
            files[0].url.as_str(),
            "https://pypi.org/simple/jinja2/jinja2-3.1.0-py3-none-any.whl"
        );
        assert_eq!(files[0].requires_python.as_deref(), Some(">=3.7"));
        assert_eq!(files[0].yanked, MetaValue::Absent);
    }

    #[test]
    fn json_dist_info_metadata_is_legacy_fallback() {
        let body = r#"{"files":[
            {"filename":"a.whl","url":"a.whl","dist-info-metadata":true}
        ]}"#;
        let files = parse_files_json(body, &base()).unwrap();
        assert_eq!(files[0].core_metadata, MetaValue::Bare);
    }

    #[test]
    fn detects_content_kind() {
        assert_eq!(
            detect_kind(Some("application/vnd.pypi.simple.v1+json")),
            ContentKind::Json
        );
        assert_eq!(detect_kind(Some("text/html")), ContentKind::Html);
        assert_eq!(detect_kind(None), ContentKind::Html);
    }
}
