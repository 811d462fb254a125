//! Pipeline configuration, threaded from the CLI down into the preprocessor.

use serde::{Deserialize, Serialize};

/// A `-D NAME` or `-D NAME=value` command-line define.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Define {
    pub name: String,
    pub value: Option<String>,
}

/// Preprocessing and parsing configuration for a single translation unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// `-I` paths, searched after the current file's directory for `"..."`
    /// includes.
    pub user_include_paths: Vec<String>,
    /// `-isystem` paths, searched for both `"..."` and `<...>` includes.
    pub system_include_paths: Vec<String>,
    pub defines: Vec<Define>,
    pub undefines: Vec<String>,
    pub preserve_comments: bool,
    pub emit_line_markers: bool,
    /// Fall back to invoking the host C compiler's `-E` instead of the
    /// internal preprocessor. Off by default; the internal preprocessor is
    /// the primary path (spec §9: the fallback fails outright on systems
    /// with no `cc`/`gcc`/`clang` in `PATH`).
    pub use_external_preprocessor: bool,
    /// Hard cap on `#include` nesting depth.
    pub max_include_depth: u32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            user_include_paths: Vec::new(),
            system_include_paths: Vec::new(),
            defines: Vec::new(),
            undefines: Vec::new(),
            preserve_comments: false,
            emit_line_markers: false,
            use_external_preprocessor: false,
            max_include_depth: 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_constants() {
        let opts = PipelineOptions::default();
        assert_eq!(opts.max_include_depth, 200);
        assert!(!opts.use_external_preprocessor);
    }

    #[test]
    fn serde_roundtrip() {
        let opts = PipelineOptions {
            defines: vec![Define { name: "DEBUG".into(), value: Some("1".into()) }],
            ..PipelineOptions::default()
        };
        let json = serde_json::to_string(&opts).unwrap();
        let back: PipelineOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(opts, back);
    }
}
