//! Include resolution: search order, guard/`#pragma once` detection, and
//! circular-include / nesting-depth enforcement (spec §4.1).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::PreprocessError;

/// Abstracts file access so the resolver is testable without touching the
/// real filesystem; [`OsFileLoader`] is the production implementation.
pub trait FileLoader {
    fn read(&self, path: &Path) -> Option<String>;
    fn exists(&self, path: &Path) -> bool;
}

#[derive(Debug, Default)]
pub struct OsFileLoader;

impl FileLoader for OsFileLoader {
    fn read(&self, path: &Path) -> Option<String> {
        std::fs::read_to_string(path).ok()
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Tracks resolved-but-already-fully-included files (via guard or
/// `#pragma once`) and the live include stack for one translation unit.
pub struct IncludeResolver<'a, L: FileLoader> {
    loader: &'a L,
    user_paths: Vec<PathBuf>,
    system_paths: Vec<PathBuf>,
    once_guarded: HashSet<PathBuf>,
    macro_guards: std::collections::HashMap<PathBuf, String>,
    stack: Vec<PathBuf>,
    max_depth: u32,
}

impl<'a, L: FileLoader> IncludeResolver<'a, L> {
    pub fn new(
        loader: &'a L,
        user_paths: Vec<PathBuf>,
        system_paths: Vec<PathBuf>,
        max_depth: u32,
    ) -> Self {
        IncludeResolver {
            loader,
            user_paths,
            system_paths,
            once_guarded: HashSet::new(),
            macro_guards: std::collections::HashMap::new(),
            stack: Vec::new(),
            max_depth,
        }
    }

    /// Resolves `name` to an absolute path. `quoted` selects `"..."` search
    /// order (current-file directory first); `angled` (`<...>`) skips it.
    pub fn resolve(&self, name: &str, current_dir: &Path, quoted: bool) -> Option<PathBuf> {
        if quoted {
            let candidate = current_dir.join(name);
            if self.loader.exists(&candidate) {
                return Some(candidate);
            }
        }
        for dir in self.user_paths.iter().chain(self.system_paths.iter()) {
            let candidate = dir.join(name);
            if self.loader.exists(&candidate) {
                return Some(candidate);
            }
        }
        None
    }

    /// Call before reading a resolved file's contents. Returns `Ok(None)`
    /// if the file should be skipped entirely (already `#pragma once`'d or
    /// guard-satisfied), `Ok(Some(text))` with the body to process
    /// otherwise, or an error on circular include / depth overflow.
    pub fn enter(&mut self, path: &Path, defined_macro: impl Fn(&str) -> bool) -> Result<Option<String>, PreprocessError> {
        if self.once_guarded.contains(path) {
            return Ok(None);
        }
        if let Some(guard) = self.macro_guards.get(path) {
            if defined_macro(guard) {
                return Ok(None);
            }
        }
        if self.stack.iter().any(|p| p == path) {
            let mut stack: Vec<String> =
                self.stack.iter().map(|p| p.display().to_string()).collect();
            stack.push(path.display().to_string());
            return Err(PreprocessError::CircularInclude { stack });
        }
        if self.stack.len() as u32 >= self.max_depth {
            return Err(PreprocessError::ExcessiveIncludeDepth { max: self.max_depth });
        }
        let Some(text) = self.loader.read(path) else {
            return Err(PreprocessError::IncludeNotFound {
                file: path.display().to_string(),
                name: path.display().to_string(),
            });
        };
        self.stack.push(path.to_path_buf());
        if let Some(guard) = detect_guard(&text) {
            self.macro_guards.insert(path.to_path_buf(), guard);
        }
        Ok(Some(text))
    }

    pub fn exit(&mut self, path: &Path) {
        self.stack.pop();
        debug_assert!(self.stack.last().map(|p| p != path).unwrap_or(true));
    }

    pub fn mark_pragma_once(&mut self, path: &Path) {
        self.once_guarded.insert(path.to_path_buf());
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

/// Detects the `#ifndef G` / `#define G` idiom at the start of a header's
/// effective content (ignoring leading blank lines and comments). Returns
/// the guard macro name if found.
fn detect_guard(text: &str) -> Option<String> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let first = lines.next()?;
    let guard = first.strip_prefix("#ifndef")?.trim();
    if guard.is_empty() {
        return None;
    }
    let second = lines.next()?;
    let defined = second.strip_prefix("#define")?.trim();
    let defined_name = defined.split_whitespace().next()?;
    if defined_name == guard {
        Some(guard.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct FakeFs(RefCell<HashMap<PathBuf, String>>);

    impl FileLoader for FakeFs {
        fn read(&self, path: &Path) -> Option<String> {
            self.0.borrow().get(path).cloned()
        }
        fn exists(&self, path: &Path) -> bool {
            self.0.borrow().contains_key(path)
        }
    }

    #[test]
    fn detects_well_formed_guard() {
        let text = "#ifndef FOO_H\n#define FOO_H\nint x;\n#endif\n";
        assert_eq!(detect_guard(text), Some("FOO_H".to_string()));
    }

    #[test]
    fn mismatched_guard_name_is_not_detected() {
        let text = "#ifndef FOO_H\n#define BAR_H\nint x;\n#endif\n";
        assert_eq!(detect_guard(text), None);
    }

    #[test]
    fn circular_include_is_rejected() {
        let mut fs = HashMap::new();
        fs.insert(PathBuf::from("/a.h"), "#include \"a.h\"\n".to_string());
        let loader = FakeFs(RefCell::new(fs));
        let mut resolver = IncludeResolver::new(&loader, vec![], vec![], 200);
        let path = PathBuf::from("/a.h");
        resolver.enter(&path, |_| false).unwrap();
        let err = resolver.enter(&path, |_| false).unwrap_err();
        assert!(matches!(err, PreprocessError::CircularInclude { .. }));
    }

    #[test]
    fn guarded_header_is_skipped_on_second_entry() {
        let mut fs = HashMap::new();
        fs.insert(
            PathBuf::from("/h.h"),
            "#ifndef H\n#define H\nint counter;\n#endif\n".to_string(),
        );
        let loader = FakeFs(RefCell::new(fs));
        let mut resolver = IncludeResolver::new(&loader, vec![], vec![], 200);
        let path = PathBuf::from("/h.h");
        let first = resolver.enter(&path, |_| false).unwrap();
        assert!(first.is_some());
        resolver.exit(&path);
        let second = resolver.enter(&path, |name| name == "H").unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn depth_limit_is_enforced() {
        let mut fs = HashMap::new();
        fs.insert(PathBuf::from("/a.h"), "x".to_string());
        let loader = FakeFs(RefCell::new(fs));
        let mut resolver = IncludeResolver::new(&loader, vec![], vec![], 0);
        let err = resolver.enter(&PathBuf::from("/a.h"), |_| false).unwrap_err();
        assert!(matches!(err, PreprocessError::ExcessiveIncludeDepth { .. }));
    }
}
