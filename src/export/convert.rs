//! The markup conversion boundary.
//!
//! Chapters are extracted as HTML; turning them into Markdown or plain text
//! is delegated to a converter behind the [`HtmlConverter`] trait. The stock
//! implementation pipes through an external `pandoc` process. When a
//! converter fails, callers degrade to [`plain_text`], which never fails.

use std::io::Write;
use std::process::{Command, Stdio};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::util;

/// Target output format for converted chapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Markdown,
    Plain,
}

impl OutputFormat {
    /// File extension for exported chapter files.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Plain => "txt",
        }
    }

    /// Format name understood by pandoc.
    pub fn converter_name(self) -> &'static str {
        match self {
            OutputFormat::Markdown => "markdown",
            OutputFormat::Plain => "plain",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "plain" | "txt" | "text" => Ok(OutputFormat::Plain),
            other => Err(format!("unknown format '{other}' (expected markdown or plain)")),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.converter_name())
    }
}

/// Converts a chapter's HTML into the requested output format.
pub trait HtmlConverter {
    fn convert(&self, html: &str, format: OutputFormat) -> Result<String>;
}

/// Conversion via an external `pandoc` process.
pub struct PandocConverter {
    program: String,
}

impl PandocConverter {
    pub fn new() -> Self {
        Self::with_program("pandoc")
    }

    /// Use a specific executable instead of `pandoc` from `PATH`.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for PandocConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlConverter for PandocConverter {
    fn convert(&self, html: &str, format: OutputFormat) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(["-f", "html", "-t", format.converter_name(), "--wrap=none"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Conversion(format!("could not launch {}: {e}", self.program)))?;

        if let Some(stdin) = child.stdin.as_mut() {
            stdin
                .write_all(html.as_bytes())
                .map_err(|e| Error::Conversion(format!("writing to {}: {e}", self.program)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| Error::Conversion(format!("waiting for {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Conversion(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Markup-stripping fallback: tags removed, entities decoded, paragraph
/// breaks preserved as single blank lines.
pub fn plain_text(html: &str) -> String {
    let stripped = util::strip_tags(html);
    let decoded = util::decode_entities(&stripped);
    util::collapse_blank_lines(&decoded).trim().to_string()
}
