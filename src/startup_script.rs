//! Startup scripts handed to new instances as `metadata.startup_script`.
//!
//! A script comes from exactly one [`ScriptSource`]: a string given in the
//! configuration or on the command line, or a file on the local machine.
//! Loading checks that the script has content and keeps it byte for byte.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;
use tracing::debug;

/// Errors raised while selecting or loading a startup script.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum StartupScriptError {
    /// Both an inline script and a script file were configured.
    #[error("set either an inline startup script or a startup script file, not both")]
    Conflict,
    /// The script file setting is present but blank.
    #[error("startup script file path is empty")]
    EmptyPath,
    /// The script has no content besides whitespace.
    #[error("startup script from {origin} has no content")]
    Blank {
        /// Where the script came from.
        origin: String,
    },
    /// The script file could not be read.
    #[error("cannot read startup script `{path}`: {message}")]
    Unreadable {
        /// Path after `~/` expansion.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        message: String,
    },
}

/// Where a startup script comes from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ScriptSource {
    /// Script text given directly.
    Inline(String),
    /// Local file holding the script; a leading `~/` is already expanded.
    File(Utf8PathBuf),
}

impl ScriptSource {
    /// Picks the source from the optional inline and file settings.
    ///
    /// # Errors
    ///
    /// Returns [`StartupScriptError::Conflict`] when both are set and
    /// [`StartupScriptError::EmptyPath`] for a blank file path.
    pub fn select(
        inline: Option<&str>,
        file: Option<&str>,
    ) -> Result<Option<Self>, StartupScriptError> {
        match (inline, file) {
            (Some(_), Some(_)) => Err(StartupScriptError::Conflict),
            (Some(script), None) => Ok(Some(Self::Inline(script.to_owned()))),
            (None, Some(path)) if path.trim().is_empty() => Err(StartupScriptError::EmptyPath),
            (None, Some(path)) => Ok(Some(Self::File(expand_home(path)))),
            (None, None) => Ok(None),
        }
    }

    /// Reads the script. File sources hit the filesystem on every call.
    ///
    /// # Errors
    ///
    /// Returns [`StartupScriptError::Unreadable`] when the file cannot be
    /// read and [`StartupScriptError::Blank`] when the script is empty.
    pub fn load(&self) -> Result<StartupScript, StartupScriptError> {
        let body = match self {
            Self::Inline(script) => script.clone(),
            Self::File(path) => read_script(path)?,
        };
        if body.trim().is_empty() {
            return Err(StartupScriptError::Blank {
                origin: self.to_string(),
            });
        }
        debug!(source = %self, bytes = body.len(), "loaded startup script");
        Ok(StartupScript(body))
    }
}

impl fmt::Display for ScriptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline(_) => f.write_str("inline value"),
            Self::File(path) => write!(f, "`{path}`"),
        }
    }
}

/// A startup script with content, kept exactly as written.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StartupScript(String);

impl StartupScript {
    /// Script text.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<StartupScript> for String {
    fn from(script: StartupScript) -> Self {
        script.0
    }
}

/// Loads the script selected by the inline and file settings, if any.
///
/// # Errors
///
/// Same as [`ScriptSource::select`] and [`ScriptSource::load`].
pub fn load_startup_script(
    inline: Option<&str>,
    file: Option<&str>,
) -> Result<Option<StartupScript>, StartupScriptError> {
    ScriptSource::select(inline, file)?
        .map(|source| source.load())
        .transpose()
}

fn expand_home(path: &str) -> Utf8PathBuf {
    match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => Utf8Path::new(&home).join(rest),
        _ => Utf8PathBuf::from(path),
    }
}

fn read_script(path: &Utf8Path) -> Result<String, StartupScriptError> {
    let unreadable = |message: String| StartupScriptError::Unreadable {
        path: path.to_owned(),
        message,
    };
    let name = path
        .file_name()
        .ok_or_else(|| unreadable(String::from("path does not name a file")))?;
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    Dir::open_ambient_dir(parent, ambient_authority())
        .and_then(|dir| dir.read_to_string(name))
        .map_err(|err| unreadable(err.to_string()))
}
