use std::fmt;
use std::path::PathBuf;

/// One directory tree configured for backup, with extension-based
/// exclusions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub name: String,
    pub target_dir: PathBuf,
    pub excluded_extensions: Vec<String>,
}

impl Source {
    pub fn new(
        name: impl Into<String>,
        target_dir: impl Into<PathBuf>,
        excluded_extensions: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target_dir: target_dir.into(),
            excluded_extensions,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}", self.name, self.target_dir.display())?;
        if !self.excluded_extensions.is_empty() {
            write!(f, ", excluding *.{}", self.excluded_extensions.join(" *."))?;
        }
        write!(f, ")")
    }
}
