//! `output.json` and `report.html` assembly.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::domain::error::{Result, SizewalkError};
use crate::domain::evaluation::{EvaluationResult, EvaluationRun};

/// Template shipped with the binary.
pub const DEFAULT_TEMPLATE: &str = include_str!("../templates/report.html");

/// File name of the JSON document.
pub const JSON_REPORT_FILE: &str = "output.json";

/// File name of the HTML report.
pub const HTML_REPORT_FILE: &str = "report.html";

/// Receives the finished run. Called only after the original branch has
/// been restored.
pub trait ReportSink: Send + Sync {
    fn publish(&self, run: &EvaluationRun) -> Result<()>;
}

/// Turns results into the persisted documents.
#[derive(Debug, Clone)]
pub struct ReportAssembler {
    template: Cow<'static, str>,
}

impl Default for ReportAssembler {
    fn default() -> Self {
        Self {
            template: Cow::Borrowed(DEFAULT_TEMPLATE),
        }
    }
}

impl ReportAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(template: impl Into<String>) -> Self {
        Self {
            template: Cow::Owned(template.into()),
        }
    }

    /// Load a replacement template from disk.
    pub fn from_template_file(path: &Path) -> Result<Self> {
        let template = std::fs::read_to_string(path)?;
        Ok(Self::with_template(template))
    }

    /// Pretty JSON array of results, two-space indented.
    pub fn to_json_document(results: &[EvaluationResult]) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(results)?)
    }

    /// The template with `COMMIT_DATA` assigned right after the `<body>` tag.
    pub fn to_html_report(&self, results: &[EvaluationResult]) -> Result<Vec<u8>> {
        let json = String::from_utf8(Self::to_json_document(results)?)
            .map_err(|e| SizewalkError::Template(e.to_string()))?;
        // No `<` may reach the script element: `</script>` would close it and
        // `<!--` would stop the closing tag from matching.
        let payload = json.replace('<', "\\u003c");

        let insert_at = body_content_offset(&self.template).ok_or_else(|| {
            SizewalkError::Template("template has no <body> tag".to_string())
        })?;

        let script = format!("\n<script>const COMMIT_DATA = {payload};</script>");
        let mut html = String::with_capacity(self.template.len() + script.len());
        html.push_str(&self.template[..insert_at]);
        html.push_str(&script);
        html.push_str(&self.template[insert_at..]);
        Ok(html.into_bytes())
    }
}

/// Elements whose content is not markup, so a `<body` inside them is text.
const RAW_TEXT_ELEMENTS: [&str; 4] = ["script", "style", "title", "textarea"];

/// Byte offset just past the opening `<body ...>` tag.
///
/// Comments and raw-text elements before the tag are skipped, and a `>`
/// inside a quoted attribute value does not end the tag. `None` for a
/// template without a body tag or with an unterminated comment.
fn body_content_offset(template: &str) -> Option<usize> {
    // ASCII lowercasing keeps byte offsets valid for `template`.
    let lower = template.to_ascii_lowercase();
    let mut pos = 0;

    while let Some(found) = lower[pos..].find('<') {
        let at = pos + found;
        let rest = &lower[at..];

        if let Some(comment) = rest.strip_prefix("<!--") {
            pos = at + "<!--".len() + comment.find("-->")? + "-->".len();
        } else if opens_tag(rest, "body") {
            return tag_end(&lower, at + "<body".len()).map(|end| end + 1);
        } else if let Some(raw) = RAW_TEXT_ELEMENTS.iter().find(|raw| opens_tag(rest, raw)) {
            let close = format!("</{raw}");
            pos = at + rest.find(&close)? + close.len();
        } else {
            pos = at + 1;
        }
    }
    None
}

/// Whether `rest` starts with the opening tag `<name`.
fn opens_tag(rest: &str, name: &str) -> bool {
    rest.strip_prefix('<')
        .and_then(|r| r.strip_prefix(name))
        .is_some_and(|after| {
            matches!(after.bytes().next(), Some(b) if b == b'>' || b == b'/' || b.is_ascii_whitespace())
        })
}

/// Index of the `>` closing the tag whose attributes start at `from`.
fn tag_end(html: &str, from: usize) -> Option<usize> {
    let mut quote = None;
    for (i, b) in html.bytes().enumerate().skip(from) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return Some(i),
            None => {}
        }
    }
    None
}

/// Paths written by [`ReportWriter::write`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub html: PathBuf,
}

/// Writes both reports into an output directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    assembler: ReportAssembler,
    output_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(assembler: ReportAssembler, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            assembler,
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn paths(&self) -> ReportPaths {
        ReportPaths {
            json: self.output_dir.join(JSON_REPORT_FILE),
            html: self.output_dir.join(HTML_REPORT_FILE),
        }
    }

    pub fn write(&self, results: &[EvaluationResult]) -> Result<ReportPaths> {
        // Nothing is written unless both documents assembled.
        let json = ReportAssembler::to_json_document(results)?;
        let html = self.assembler.to_html_report(results)?;

        std::fs::create_dir_all(&self.output_dir)?;
        let paths = self.paths();
        std::fs::write(&paths.json, json)?;
        std::fs::write(&paths.html, html)?;

        info!(
            json = %paths.json.display(),
            html = %paths.html.display(),
            results = results.len(),
            "Wrote reports"
        );
        Ok(paths)
    }
}

impl ReportSink for ReportWriter {
    fn publish(&self, run: &EvaluationRun) -> Result<()> {
        self.write(&run.results).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::commit::{CommitId, CommitInfo};
    use chrono::DateTime;

    fn result(hash: &str, message: &str, size: u64) -> EvaluationResult {
        EvaluationResult {
            commit: CommitInfo {
                hash: CommitId::new(hash),
                author: "dev".to_string(),
                date: DateTime::parse_from_rfc3339("2024-02-03T04:05:06+00:00").unwrap(),
                message: message.to_string(),
            },
            build_size: size,
        }
    }

    #[test]
    fn json_document_is_two_space_pretty_array() {
        let doc = ReportAssembler::to_json_document(&[result("abc", "m", 10)]).unwrap();
        let text = String::from_utf8(doc).unwrap();
        let expected = "[\n  {\n    \"hash\": \"abc\",\n    \"author\": \"dev\",\n    \"date\": \"2024-02-03T04:05:06+00:00\",\n    \"message\": \"m\",\n    \"buildSize\": 10\n  }\n]";
        assert_eq!(text, expected);
    }

    #[test]
    fn empty_results_give_empty_array() {
        let doc = ReportAssembler::to_json_document(&[]).unwrap();
        assert_eq!(doc, b"[]");
    }

    #[test]
    fn html_injects_data_after_body_tag() {
        let assembler =
            ReportAssembler::with_template("<html><head></head><body class=\"x\">\n<p>hi</p></body></html>");
        let html = String::from_utf8(assembler.to_html_report(&[result("abc", "m", 1)]).unwrap())
            .unwrap();

        assert!(html.starts_with("<html><head></head><body class=\"x\">\n<script>const COMMIT_DATA = ["));
        assert!(html.ends_with("];</script>\n<p>hi</p></body></html>"));
    }

    #[test]
    fn html_leaves_rest_of_template_untouched() {
        let template = "<!DOCTYPE html><BODY>rest</BODY>";
        let assembler = ReportAssembler::with_template(template);
        let html = String::from_utf8(assembler.to_html_report(&[]).unwrap()).unwrap();
        assert_eq!(
            html,
            "<!DOCTYPE html><BODY>\n<script>const COMMIT_DATA = [];</script>rest</BODY>"
        );
    }

    #[test]
    fn html_skips_lookalike_tags() {
        let template = "<bodyguard></bodyguard><body>x</body>";
        let html = String::from_utf8(
            ReportAssembler::with_template(template)
                .to_html_report(&[])
                .unwrap(),
        )
        .unwrap();
        assert!(html.starts_with("<bodyguard></bodyguard><body>\n<script>"));
    }

    #[test]
    fn html_escapes_script_terminators_in_messages() {
        let assembler = ReportAssembler::new();
        let results = [
            result("abc", "oops </script><b>", 1),
            result("def", "<!--<script>", 2),
        ];
        let html = String::from_utf8(assembler.to_html_report(&results).unwrap()).unwrap();

        assert!(html.contains("oops \\u003c/script>\\u003cb>"));
        assert!(html.contains("\\u003c!--\\u003cscript>"));
        assert!(!html.contains("oops </script>"));
        assert!(!html.contains("<!--<script>"));

        // The injected element is the first script and closes where it should.
        let start = html.find("<script>const COMMIT_DATA = ").unwrap();
        let end = start + html[start..].find(";</script>").unwrap();
        let payload = &html[start + "<script>const COMMIT_DATA = ".len()..end];
        assert!(!payload.contains('<'));
        let parsed: Vec<EvaluationResult> = serde_json::from_str(payload).unwrap();
        assert_eq!(parsed, results.to_vec());
    }

    #[test]
    fn html_ignores_body_inside_comments_and_scripts() {
        let template = "<html><head><!-- <body> --><script>var s = \"<body>\";</script>\
                        <style>body > p {}</style></head><body>x</body></html>";
        let html = String::from_utf8(
            ReportAssembler::with_template(template)
                .to_html_report(&[])
                .unwrap(),
        )
        .unwrap();

        assert!(html.contains("</head><body>\n<script>const COMMIT_DATA = [];</script>x</body>"));
        assert!(html.contains("<!-- <body> -->"));
        assert!(html.contains("var s = \"<body>\";"));
    }

    #[test]
    fn html_body_tag_may_quote_angle_brackets() {
        let template = "<body data-rule=\"a > b\" class='c>d'>x</body>";
        let html = String::from_utf8(
            ReportAssembler::with_template(template)
                .to_html_report(&[])
                .unwrap(),
        )
        .unwrap();

        assert!(html.starts_with(
            "<body data-rule=\"a > b\" class='c>d'>\n<script>const COMMIT_DATA = [];"
        ));
    }

    #[test]
    fn unterminated_comment_hides_body_tag() {
        let err = ReportAssembler::with_template("<!-- <body>x</body>")
            .to_html_report(&[])
            .unwrap_err();
        assert!(matches!(err, SizewalkError::Template(_)));
    }

    #[test]
    fn template_without_body_is_rejected() {
        let err = ReportAssembler::with_template("<html></html>")
            .to_html_report(&[])
            .unwrap_err();
        assert!(matches!(err, SizewalkError::Template(_)));
    }

    #[test]
    fn bundled_template_has_body() {
        assert!(body_content_offset(DEFAULT_TEMPLATE).is_some());
    }

    #[test]
    fn writer_creates_output_dir_and_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reports/nested");
        let writer = ReportWriter::new(ReportAssembler::new(), &out);

        let paths = writer.write(&[result("abc", "m", 5)]).unwrap();

        assert_eq!(paths.json, out.join("output.json"));
        let parsed: Vec<EvaluationResult> =
            serde_json::from_slice(&std::fs::read(&paths.json).unwrap()).unwrap();
        assert_eq!(parsed.len(), 1);
        let html = std::fs::read_to_string(&paths.html).unwrap();
        assert!(html.contains("const COMMIT_DATA = ["));
    }
}
