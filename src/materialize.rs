use crate::models::MessageRecord;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Characters escaped when a path becomes a `file://` URI. `#` would be read
/// as a fragment delimiter by the navigating browser; `%` must be escaped so
/// the encoded form stays unambiguous. `/` is never escaped.
const URI_UNSAFE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?');

#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("no HTML artifact found in {}", .0.display())]
    NoHtmlArtifact(PathBuf),
    #[error("workspace io error: {0}")]
    Io(#[from] io::Error),
}

/// An explicit, caller-owned working directory for materialized messages.
/// Passing a fresh workspace per acquisition keeps runs isolated from each
/// other; reusing one path restores the shared-directory behavior.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Creates the directory (and parents) if missing and resolves it to an
    /// absolute path, since `file://` URIs need one.
    pub fn create(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let root = root.canonicalize()?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Removes every file currently in the workspace.
    pub fn clear(&self) -> io::Result<()> {
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

/// How the written artifact is located after a materialize call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanMode {
    /// Return only the artifact produced by this call.
    #[default]
    CurrentCallOnly,
    /// Legacy behavior: return the first `text/html` file anywhere in the
    /// workspace, which may be a leftover from an earlier acquisition.
    WholeDirectory,
}

#[derive(Debug, Clone)]
pub struct MaterializedArtifact {
    pub path: PathBuf,
    pub uri: String,
}

/// Writes an acquired message's HTML body (and optionally its attachments)
/// into a workspace and produces a browser-navigable `file://` URI for it.
#[derive(Debug, Clone)]
pub struct Materializer {
    workspace: Workspace,
    save_attachments: bool,
    scan_mode: ScanMode,
}

impl Materializer {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            save_attachments: false,
            scan_mode: ScanMode::default(),
        }
    }

    pub fn save_attachments(mut self, enabled: bool) -> Self {
        self.save_attachments = enabled;
        self
    }

    pub fn scan_mode(mut self, mode: ScanMode) -> Self {
        self.scan_mode = mode;
        self
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn materialize(
        &self,
        record: &MessageRecord,
    ) -> Result<MaterializedArtifact, MaterializeError> {
        let written = match record.content() {
            Some(content) => {
                let name = format!("{}.html", artifact_stem(record.subject()));
                let path = self.workspace.root.join(name);
                fs::write(&path, content)?;
                debug!(path = %path.display(), "message body written");
                Some(path)
            }
            None => None,
        };

        if self.save_attachments {
            for attachment in record.attachments() {
                let path = self
                    .workspace
                    .root
                    .join(sanitize_file_name(&attachment.filename));
                fs::write(&path, &attachment.bytes)?;
                debug!(path = %path.display(), "attachment written");
            }
        }

        let path = match self.scan_mode {
            ScanMode::CurrentCallOnly => written
                .filter(|path| is_html(path))
                .ok_or_else(|| MaterializeError::NoHtmlArtifact(self.workspace.root.clone()))?,
            ScanMode::WholeDirectory => self.first_html_in_workspace()?,
        };

        let artifact = MaterializedArtifact {
            uri: file_uri(&path),
            path,
        };
        info!(uri = %artifact.uri, "message materialized");
        Ok(artifact)
    }

    /// Scans the whole workspace in name order and returns the first file
    /// probing as `text/html`. Probe failures surface as `Io`, not as a
    /// missing artifact.
    fn first_html_in_workspace(&self) -> Result<PathBuf, MaterializeError> {
        let mut entries: Vec<PathBuf> = fs::read_dir(&self.workspace.root)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<_, io::Error>>()?;
        entries.sort();

        entries
            .into_iter()
            .find(|path| path.is_file() && is_html(path))
            .ok_or_else(|| MaterializeError::NoHtmlArtifact(self.workspace.root.clone()))
    }
}

fn is_html(path: &Path) -> bool {
    mime_guess::from_path(path).first_raw() == Some("text/html")
}

/// Builds a `file://` URI for an absolute path, percent-escaping characters
/// a browser would misread (`#` becomes `%23`).
pub fn file_uri(path: &Path) -> String {
    let encoded = utf8_percent_encode(&path.to_string_lossy(), URI_UNSAFE).to_string();
    format!("file://{encoded}")
}

fn artifact_stem(subject: Option<&str>) -> String {
    let stem = subject.map(sanitize_file_name).unwrap_or_default();
    if stem.is_empty() {
        "message".to_string()
    } else {
        stem
    }
}

/// Keeps the name recognizable while stripping path separators. `#` is legal
/// in a filename and survives; escaping happens at URI construction time.
fn sanitize_file_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
