use crate::config::PathsConfig;
use crate::error::DataError;
use crate::output::write_atomic;
use anyhow::{bail, Context, Result};
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

/// Rewrites root-absolute asset references (`href="/assets/..."`) to relative ones.
pub struct PathRewriter {
    pattern: Regex,
    relative_prefix: String,
}

impl PathRewriter {
    pub fn new(config: &PathsConfig) -> Result<Self> {
        if config.attributes.is_empty() {
            bail!("No attributes configured for path rewriting");
        }
        let attributes: Vec<String> = config.attributes.iter().map(|a| regex::escape(a)).collect();
        let pattern = format!(
            r#"({})="{}"#,
            attributes.join("|"),
            regex::escape(&config.absolute_prefix)
        );
        let pattern = Regex::new(&pattern)
            .with_context(|| format!("Invalid rewrite pattern: {}", pattern))?;

        Ok(Self {
            pattern,
            relative_prefix: config.relative_prefix.clone(),
        })
    }

    /// Returns the rewritten text and how many references changed.
    pub fn rewrite<'a>(&self, html: &'a str) -> (Cow<'a, str>, usize) {
        let count = self.pattern.find_iter(html).count();
        let rewritten = self.pattern.replace_all(html, |caps: &Captures| {
            format!("{}=\"{}", &caps[1], self.relative_prefix)
        });
        (rewritten, count)
    }

    /// Rewrites `path` in place. The file is left untouched when nothing matches.
    pub fn rewrite_file(&self, path: &Path) -> Result<usize> {
        let html = fs::read_to_string(path).map_err(|e| DataError::read(path, e))?;

        let (rewritten, count) = self.rewrite(&html);
        if count == 0 {
            warn!("No absolute asset paths found in {:?}", path);
            return Ok(0);
        }

        write_atomic(path, |writer| writer.write_all(rewritten.as_bytes()))?;
        info!("Fixed {} paths in {:?}", count, path);
        Ok(count)
    }
}

pub fn fix_paths(config: &PathsConfig) -> Result<usize> {
    let rewriter = PathRewriter::new(config)?;
    rewriter.rewrite_file(&config.index_html)
}
