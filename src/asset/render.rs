//! HTML link rendering for clientlibs

use super::{Asset, AssetKind};
use std::collections::BTreeMap;
use std::fmt::{self, Write};

/// Renders the tag that references a clientlib from a page
#[derive(Debug, Clone, Default)]
pub struct LinkRenderer {
    url_prefix: String,
}

impl LinkRenderer {
    /// Create a renderer prefixing every asset path with `url_prefix`
    pub fn new(url_prefix: impl Into<String>) -> Self {
        Self {
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    /// Public URL of an asset
    pub fn url(&self, asset: &Asset) -> String {
        format!("{}{}", self.url_prefix, asset.path)
    }

    /// Write the tag for `asset`
    ///
    /// Properties become extra attributes; an empty value renders a boolean
    /// attribute (`async`, `defer`). Keys that are not valid attribute names
    /// are skipped. For `link` assets the `rel` property selects the relation
    /// and defaults to `preload`.
    pub fn render<W: Write + ?Sized>(
        &self,
        asset: &Asset,
        properties: &BTreeMap<String, String>,
        out: &mut W,
    ) -> fmt::Result {
        let url = escape(&self.url(asset));
        match asset.kind {
            AssetKind::Js => {
                write!(out, r#"<script type="text/javascript" src="{}""#, url)?;
                write_attributes(out, properties, &[])?;
                out.write_str("></script>")
            }
            AssetKind::Css => {
                write!(out, r#"<link rel="stylesheet" href="{}""#, url)?;
                write_attributes(out, properties, &["rel"])?;
                out.write_str("/>")
            }
            AssetKind::Link => {
                let rel = properties
                    .get("rel")
                    .map(String::as_str)
                    .unwrap_or("preload");
                write!(out, r#"<link rel="{}" href="{}""#, escape(rel), url)?;
                write_attributes(out, properties, &["rel"])?;
                out.write_str("/>")
            }
        }
    }
}

fn write_attributes<W: Write + ?Sized>(
    out: &mut W,
    properties: &BTreeMap<String, String>,
    reserved: &[&str],
) -> fmt::Result {
    for (key, value) in properties {
        if reserved.contains(&key.as_str()) || !is_attribute_name(key) {
            continue;
        }
        if value.is_empty() {
            write!(out, " {}", key)?;
        } else {
            write!(out, r#" {}="{}""#, key, escape(value))?;
        }
    }
    Ok(())
}

fn is_attribute_name(name: &str) -> bool {
    !name.is_empty()
        && !matches!(name, "src" | "href" | "type")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':')
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            other => escaped.push(other),
        }
    }
    escaped
}
