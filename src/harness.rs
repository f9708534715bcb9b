//! Widget test harness pages.
//!
//! `build_test` runs a readable build and writes, for every locale, one HTML
//! page per test script of the widget plus index pages linking them.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::assemble::fill_placeholders;
use crate::builder::Builder;
use crate::bundle::bundle_file_name;
use crate::discovery::{self, WIDGET_SOURCE};
use crate::error::BuildError;

const TEST_FILE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>$$NAME$$</title>
    <link rel="stylesheet" type="text/css" href="$$CSSFILE$$">
    <script type="text/javascript" src="$$JSFILE$$"></script>
</head>
<body>
    <h1>$$NAME$$</h1>
    <div id="test"></div>
    <script type="text/javascript">
$$BODY$$
    </script>
</body>
</html>"#;

const TEST_LINK: &str = r#"<li><a href="$$FILE$$">$$NAME$$</a></li>"#;

const TEST_LIST: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Widget tests</title>
</head>
<body>
    <ul>
$$LINKS$$
    </ul>
</body>
</html>"#;

const TEST_LANG: &str = r#"<li><a href="$$FILE$$">$$NAME$$</a></li>"#;

const TEST_INDEX: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Widget test locales</title>
</head>
<body>
    <ul>
$$LINKS$$
    </ul>
</body>
</html>"#;

const STYLESHEET: &str = "style.css";

fn write_page(path: &Path, content: &str) -> Result<(), BuildError> {
    fs::write(path, format!("{}\n", content)).map_err(|e| BuildError::io(path, e))
}

impl Builder {
    /// Build, then generate the test pages for `widget`. Returns the test
    /// output directory.
    pub fn build_test(&self, widget: &str) -> Result<PathBuf, BuildError> {
        let test_files = self.widget_test_files(widget)?;
        self.build(false)?;

        let output = self.output_dir();
        let test_output = self.dir(&self.config().test_output);
        fs::create_dir_all(&test_output).map_err(|e| BuildError::io(&test_output, e))?;

        let mut lang_links = Vec::new();
        for locale in discovery::discover_locales(&self.dir(&self.config().locale))? {
            let orig_css = output.join(STYLESHEET);
            let css = test_output.join(STYLESHEET);
            if orig_css.is_file() {
                fs::copy(&orig_css, &css).map_err(|e| BuildError::io(&orig_css, e))?;
            }

            let js_name = bundle_file_name(&locale.name);
            let orig_js = output.join(&js_name);
            fs::copy(&orig_js, test_output.join(&js_name))
                .map_err(|e| BuildError::io(&orig_js, e))?;

            let mut links = Vec::new();
            for test_file in &test_files {
                let name = test_file
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default();
                let source =
                    fs::read_to_string(test_file).map_err(|e| BuildError::io(test_file, e))?;

                let mut values = HashMap::new();
                values.insert("BODY", source.trim().to_string());
                values.insert("CSSFILE", STYLESHEET.to_string());
                values.insert("JSFILE", js_name.clone());
                values.insert("NAME", name.clone());

                let file_name = format!("test_{}.{}.html", name, locale.name);
                write_page(&test_output.join(&file_name), &fill_placeholders(TEST_FILE, &values))?;

                let mut link = HashMap::new();
                link.insert("NAME", name);
                link.insert("FILE", file_name);
                links.push(fill_placeholders(TEST_LINK, &link));
            }

            let mut list = HashMap::new();
            list.insert("LINKS", links.join("\n"));
            let index_name = format!("index.{}.html", locale.name);
            write_page(&test_output.join(&index_name), &fill_placeholders(TEST_LIST, &list))?;

            let mut lang = HashMap::new();
            lang.insert("NAME", locale.name.clone());
            lang.insert("FILE", index_name);
            lang_links.push(fill_placeholders(TEST_LANG, &lang));
        }

        let mut index = HashMap::new();
        index.insert("LINKS", lang_links.join("\n"));
        write_page(&test_output.join("index.html"), &fill_placeholders(TEST_INDEX, &index))?;

        info!("test pages for {} written to {}", widget, test_output.display());
        Ok(test_output)
    }

    /// Test scripts of a widget, failing when the widget, its test directory
    /// or its test scripts are missing.
    fn widget_test_files(&self, widget: &str) -> Result<Vec<PathBuf>, BuildError> {
        let source_file =
            discovery::widget_dir(&self.dir(&self.config().widgets), widget).join(WIDGET_SOURCE);
        if !source_file.is_file() {
            return Err(BuildError::UnknownWidget(widget.to_string()));
        }
        let test_dir = discovery::widget_dir(&self.dir(&self.config().widget_tests), widget);
        if !test_dir.is_dir() {
            return Err(BuildError::MissingTestDir(test_dir));
        }
        let test_files = discovery::files_with_extensions(&test_dir, &["js"])?;
        if test_files.is_empty() {
            return Err(BuildError::NoTestFiles(test_dir));
        }
        Ok(test_files)
    }
}
