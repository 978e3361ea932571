//! Fixtures for tests: synthetic record documents and shard inspection.
//!
//! [`DocumentBuilder`] renders an XML document whose records are easy to
//! count, so conservation properties can be checked across worker counts,
//! batch sizes and scan strategies.
//!
//! ```
//! use ironshard::testing::DocumentBuilder;
//!
//! let xml = DocumentBuilder::new("items", "item")
//!     .numbered(2)
//!     .build();
//! assert!(xml.contains(r#"<item id="0">"#));
//! assert!(xml.contains(r#"<item id="1">"#));
//! ```

use crate::io::shards::{list_shards, read_shard};
use anyhow::{Context, Result};
use quick_xml::escape::escape;
use serde_json::Value;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// A fluent builder for record documents.
#[derive(Clone, Debug)]
pub struct DocumentBuilder {
    root: String,
    record_tag: String,
    declaration: bool,
    body: Vec<String>,
    records: usize,
}

impl DocumentBuilder {
    /// An empty `<root>` whose records are named `record_tag`.
    #[must_use]
    pub fn new(root: impl Into<String>, record_tag: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            record_tag: record_tag.into(),
            declaration: false,
            body: Vec::new(),
            records: 0,
        }
    }

    /// Start the document with an XML declaration.
    #[must_use]
    pub fn with_declaration(mut self) -> Self {
        self.declaration = true;
        self
    }

    /// Append one record with the given attributes and raw inner XML.
    #[must_use]
    pub fn record(mut self, attrs: &[(&str, &str)], inner: &str) -> Self {
        let mut out = format!("<{}", self.record_tag);
        for (name, value) in attrs {
            let _ = write!(out, r#" {name}="{}""#, escape(*value));
        }
        let _ = write!(out, ">{inner}</{}>", self.record_tag);
        self.body.push(out);
        self.records += 1;
        self
    }

    /// Append `n` records `<tag id="i"><value>i</value></tag>`, numbered
    /// after the records already added.
    #[must_use]
    pub fn numbered(mut self, n: usize) -> Self {
        let start = self.records;
        for i in start..start + n {
            let id = i.to_string();
            self = self.record(&[("id", id.as_str())], &format!("<value>{i}</value>"));
        }
        self
    }

    /// Records added so far.
    pub fn record_count(&self) -> usize {
        self.records
    }

    /// Append raw XML between records, e.g. non-record siblings.
    #[must_use]
    pub fn raw(mut self, xml: impl Into<String>) -> Self {
        self.body.push(xml.into());
        self
    }

    #[must_use]
    pub fn build(&self) -> String {
        let mut out = String::new();
        if self.declaration {
            out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        }
        let _ = writeln!(out, "<{}>", self.root);
        for item in &self.body {
            out.push_str("  ");
            out.push_str(item);
            out.push('\n');
        }
        let _ = writeln!(out, "</{}>", self.root);
        out
    }

    /// Write the document to `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        fs::write(path, self.build()).with_context(|| format!("write {}", path.display()))?;
        Ok(path.to_path_buf())
    }
}

/// Every record in every shard of `dir`, in shard id order.
///
/// # Errors
/// Returns an error if a shard cannot be listed or parsed.
pub fn read_all_shards(dir: impl AsRef<Path>) -> Result<Vec<(u64, Vec<Value>)>> {
    list_shards(dir)?
        .into_iter()
        .map(|(id, path)| Ok((id, read_shard(&path)?)))
        .collect()
}

/// The `attr` value of every record across all shards of `dir`, sorted.
///
/// Records without the attribute are ignored.
///
/// # Errors
/// Returns an error if a shard cannot be listed or parsed.
pub fn collect_attr(dir: impl AsRef<Path>, attr: &str) -> Result<Vec<String>> {
    let mut out: Vec<String> = read_all_shards(dir)?
        .into_iter()
        .flat_map(|(_, records)| records)
        .filter_map(|r| r.get(attr).and_then(Value::as_str).map(str::to_string))
        .collect();
    out.sort();
    Ok(out)
}
