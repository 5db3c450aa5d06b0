//! Renders a project or file listing as either the JSON or the HTML form of
//! the simple-repository protocol (spec.md §6). No templating engine:
//! templating itself is out of scope (spec.md §1), so this stays a thin,
//! hand-built string builder, the same way the other_examples PyPI-shaped
//! registry (`nora-registry`) builds its listing pages directly with
//! `format!` rather than reaching for a template crate.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use proxpi_types::File;
use serde::Serialize;

pub const JSON_MEDIA_TYPE: &str = "application/vnd.pypi.simple.v1+json";
const API_VERSION: &str = "1.0";

#[derive(Serialize)]
struct Meta {
    #[serde(rename = "api-version")]
    api_version: &'static str,
}

#[derive(Serialize)]
struct ProjectsJson<'a> {
    meta: Meta,
    projects: Vec<ProjectNameJson<'a>>,
}

#[derive(Serialize)]
struct ProjectNameJson<'a> {
    name: &'a str,
}

pub fn projects_json(names: &[String]) -> String {
    let doc = ProjectsJson {
        meta: Meta { api_version: API_VERSION },
        projects: names.iter().map(|n| ProjectNameJson { name: n }).collect(),
    };
    serde_json::to_string(&doc).expect("serializing a list of project names cannot fail")
}

pub fn projects_html(names: &[String]) -> String {
    let mut body = String::new();
    for name in names {
        let href = utf8_percent_encode(name, NON_ALPHANUMERIC);
        body.push_str(&format!("    <a href=\"{href}/\">{name}</a>\n"));
    }
    wrap_html("Simple index", &body)
}

#[derive(Serialize)]
struct FilesJson<'a> {
    meta: Meta,
    name: &'a str,
    files: &'a [File],
}

pub fn files_json(project: &str, files: &[File]) -> String {
    let doc = FilesJson {
        meta: Meta { api_version: API_VERSION },
        name: project,
        files,
    };
    serde_json::to_string(&doc).expect("serializing a file listing cannot fail")
}

pub fn files_html(project: &str, files: &[File]) -> String {
    let mut body = String::new();
    for file in files {
        let mut href = file.url.to_string();
        if let Some((algo, hex)) = file.hashes.iter().next() {
            href.push_str(&format!("#{algo}={hex}"));
        }
        let mut attrs = String::new();
        if let Some(rp) = &file.requires_python {
            attrs.push_str(&format!(" data-requires-python=\"{}\"", html_escape(rp)));
        }
        match &file.yanked {
            proxpi_types::MetaValue::Absent => {}
            proxpi_types::MetaValue::Bare => attrs.push_str(" data-yanked"),
            proxpi_types::MetaValue::WithValue(reason) => {
                attrs.push_str(&format!(" data-yanked=\"{}\"", html_escape(reason)))
            }
        }
        body.push_str(&format!(
            "    <a href=\"{href}\"{attrs}>{name}</a>\n",
            name = html_escape(&file.name)
        ));
    }
    wrap_html(&format!("Links for {project}"), &body)
}

fn wrap_html(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head>\n\
         <meta name=\"pypi:repository-version\" content=\"{API_VERSION}\">\n\
         <meta name=\"generator\" content=\"proxpi/{version}\">\n\
         <title>{title}</title>\n\
         </head>\n\
         <body>\n\
         <h1>{title}</h1>\n\
         {body}\
         </body>\n\
         </html>\n",
        version = env!("CARGO_PKG_VERSION"),
    )
}

fn html_escape(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;").replace('<', "&lt;")
}

#[cfg(test)]
mod test {
    use super::*;
    use url::Url;

    #[test]
    fn renders_projects_html_with_normalized_links() {
        let html = projects_html(&["jinja2".to_string()]);
        assert!(html.contains("<a href=\"jinja2/\">jinja2</a>"));
        assert!(html.contains("pypi:repository-version"));
    }

    #[test]
    fn renders_files_json_round_trips_hashes_and_yanked() {
        let mut file = File::new("jinja2-3.1.0.tar.gz", Url::parse("https://example.com/j.tar.gz").unwrap());
        file.hashes.insert("sha256".to_string(), "abc".to_string());
        file.yanked = proxpi_types::MetaValue::WithValue("cve".to_string());

        let json = files_json("jinja2", std::slice::from_ref(&file));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["files"][0]["filename"], "jinja2-3.1.0.tar.gz");
        assert_eq!(value["files"][0]["yanked"], "cve");
        assert_eq!(value["files"][0]["hashes"]["sha256"], "abc");
    }

    #[test]
    fn renders_files_html_embeds_hash_fragment_and_yanked_attr() {
        let mut file = File::new("a.whl", Url::parse("https://example.com/a.whl").unwrap());
        file.hashes.insert("sha256".to_string(), "deadbeef".to_string());
        file.yanked = proxpi_types::MetaValue::Bare;

        let html = files_html("a", &[file]);
        assert!(html.contains("href=\"https://example.com/a.whl#sha256=deadbeef\""));
        assert!(html.contains("data-yanked>"));
    }
}
