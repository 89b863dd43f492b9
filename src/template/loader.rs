//! Template loaders - where `get_template` gets its source text

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use super::error::{Result, TemplateError};

/// Source of template text by name
pub trait Loader: Send + Sync {
    /// Load the source of template `name`. A missing template is
    /// [`TemplateError::NotFound`].
    fn load(&self, name: &str) -> Result<String>;
}

impl<F> Loader for F
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    fn load(&self, name: &str) -> Result<String> {
        self(name)
    }
}

/// Loads templates from files under a root directory
#[derive(Debug, Clone)]
pub struct FileSystemLoader {
    root: PathBuf,
    /// Appended to names that have no extension of their own
    extension: Option<String>,
}

impl FileSystemLoader {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            extension: None,
        }
    }

    /// Default extension, with or without the leading dot
    pub fn with_extension(mut self, extension: &str) -> Self {
        let extension = extension.trim_start_matches('.');
        self.extension = (!extension.is_empty()).then(|| extension.to_string());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of template `name`, or `None` if the name escapes the root
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let relative = Path::new(name);
        let inside = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !inside || name.is_empty() {
            return None;
        }

        let path = self.root.join(relative);
        match &self.extension {
            Some(ext) if path.extension().is_none() => Some(path.with_extension(ext)),
            _ => Some(path),
        }
    }

    /// Names of every template under the root, sorted. Hidden files and
    /// directories are skipped.
    pub fn template_names(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Err(TemplateError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Template directory not found: {}", self.root.display()),
            )));
        }

        let mut names = Vec::new();
        for entry in WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let mut name = relative.to_string_lossy().replace('\\', "/");
            if let Some(ext) = &self.extension {
                if let Some(stripped) = name.strip_suffix(&format!(".{}", ext)) {
                    name = stripped.to_string();
                }
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }
}

impl Loader for FileSystemLoader {
    fn load(&self, name: &str) -> Result<String> {
        let path = self
            .resolve(name)
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))?;
        match fs::read_to_string(&path) {
            Ok(source) => {
                tracing::debug!("Loaded template {} from {:?}", name, path);
                Ok(source)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(TemplateError::NotFound(name.to_string()))
            }
            Err(e) => Err(TemplateError::Io(e)),
        }
    }
}

/// In-memory templates, handy for tests and embedded sets
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    templates: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, source: &str) {
        self.templates.insert(name.to_string(), source.to_string());
    }
}

impl<N: Into<String>, S: Into<String>> FromIterator<(N, S)> for MemoryLoader {
    fn from_iter<I: IntoIterator<Item = (N, S)>>(iter: I) -> Self {
        Self {
            templates: iter
                .into_iter()
                .map(|(name, source)| (name.into(), source.into()))
                .collect(),
        }
    }
}

impl Loader for MemoryLoader {
    fn load(&self, name: &str) -> Result<String> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("partials")).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join("base.html"), "base").unwrap();
        fs::write(dir.path().join("partials/nav.html"), "nav").unwrap();
        fs::write(dir.path().join(".git/HEAD"), "ref").unwrap();
        fs::write(dir.path().join(".hidden.html"), "hidden").unwrap();
        dir
    }

    #[test]
    fn test_filesystem_load() {
        let dir = setup();
        let loader = FileSystemLoader::new(dir.path());
        assert_eq!(loader.load("base.html").unwrap(), "base");
        assert_eq!(loader.load("partials/nav.html").unwrap(), "nav");
        assert!(matches!(loader.load("missing.html"), Err(TemplateError::NotFound(_))));
    }

    #[test]
    fn test_filesystem_extension() {
        let dir = setup();
        let loader = FileSystemLoader::new(dir.path()).with_extension(".html");
        assert_eq!(loader.load("base").unwrap(), "base");
        assert_eq!(loader.load("base.html").unwrap(), "base");
        assert_eq!(loader.template_names().unwrap(), vec!["base", "partials/nav"]);
    }

    #[test]
    fn test_filesystem_rejects_escape() {
        let dir = setup();
        let loader = FileSystemLoader::new(dir.path().join("partials"));
        assert!(matches!(loader.load("../base.html"), Err(TemplateError::NotFound(_))));
        assert!(matches!(loader.load("/etc/passwd"), Err(TemplateError::NotFound(_))));
    }

    #[test]
    fn test_template_names_skip_hidden() {
        let dir = setup();
        let loader = FileSystemLoader::new(dir.path());
        assert_eq!(
            loader.template_names().unwrap(),
            vec!["base.html", "partials/nav.html"]
        );
    }

    #[test]
    fn test_missing_root() {
        let loader = FileSystemLoader::new("/definitely/not/here");
        assert!(loader.template_names().is_err());
    }

    #[test]
    fn test_memory_and_closure_loaders() {
        let memory: MemoryLoader = [("a", "A")].into_iter().collect();
        assert_eq!(memory.load("a").unwrap(), "A");
        assert!(memory.load("b").is_err());

        let closure = |name: &str| -> Result<String> { Ok(format!("<{}>", name)) };
        assert_eq!(closure.load("x").unwrap(), "<x>");
    }
}
