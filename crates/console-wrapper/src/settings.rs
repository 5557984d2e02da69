//! Launch settings for wrapped executables
//!
//! `WrapperSettings` is an immutable value produced by
//! [`WrapperSettingsBuilder`]: every field can be changed freely before
//! `build()`, and nothing can be changed afterwards.

use std::path::{Path, PathBuf};

/// Text encoding used to decode or encode a redirected stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// UTF-8; invalid sequences are replaced with U+FFFD on decode
    #[default]
    Utf8,
    /// ISO-8859-1; characters outside the Latin-1 range encode as `?`
    Latin1,
}

impl Encoding {
    /// Decode raw bytes captured from a child stream
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Encoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        }
    }

    /// Encode a line for the child's input stream
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Encoding::Utf8 => text.as_bytes().to_vec(),
            Encoding::Latin1 => text
                .chars()
                .map(|c| if (c as u32) <= 0xFF { c as u8 } else { b'?' })
                .collect(),
        }
    }
}

/// Per-stream encoding triple
///
/// Encodings are always present; every stream defaults to UTF-8.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodingSettings {
    /// The encoding to use for the standard input stream
    pub standard_input: Encoding,
    /// The encoding to use for the standard output stream
    pub standard_output: Encoding,
    /// The encoding to use for the standard error stream
    pub standard_error: Encoding,
}

/// Immutable launch settings for a wrapped executable
///
/// The defaults redirect all three standard streams, hide the child's
/// window, inherit the host's working directory, and use UTF-8 everywhere.
#[derive(Debug, Clone)]
pub struct WrapperSettings {
    redirect_standard_error: bool,
    redirect_standard_input: bool,
    redirect_standard_output: bool,
    show_window: bool,
    working_directory: Option<PathBuf>,
    encoding: EncodingSettings,
}

impl Default for WrapperSettings {
    fn default() -> Self {
        Self {
            redirect_standard_error: true,
            redirect_standard_input: true,
            redirect_standard_output: true,
            show_window: false,
            working_directory: None,
            encoding: EncodingSettings::default(),
        }
    }
}

impl WrapperSettings {
    /// Create a builder for customized settings
    pub fn builder() -> WrapperSettingsBuilder {
        WrapperSettingsBuilder(Self::default())
    }

    /// Whether the child's standard error stream is captured
    pub fn redirect_standard_error(&self) -> bool {
        self.redirect_standard_error
    }

    /// Whether the child's standard input stream is fed by the wrapper
    pub fn redirect_standard_input(&self) -> bool {
        self.redirect_standard_input
    }

    /// Whether the child's standard output stream is captured
    pub fn redirect_standard_output(&self) -> bool {
        self.redirect_standard_output
    }

    /// Whether the child may display its own window
    ///
    /// Only meaningful on platforms with windowing; a no-op elsewhere.
    pub fn show_window(&self) -> bool {
        self.show_window
    }

    /// The directory the child is launched in, if overridden
    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    /// The per-stream encodings
    pub fn encoding(&self) -> &EncodingSettings {
        &self.encoding
    }
}

/// Builder for [`WrapperSettings`]
pub struct WrapperSettingsBuilder(WrapperSettings);

impl WrapperSettingsBuilder {
    /// Capture the child's standard error stream instead of inheriting
    pub fn redirect_standard_error(mut self, redirect: bool) -> Self {
        self.0.redirect_standard_error = redirect;
        self
    }

    /// Allow writing to the child's standard input stream
    pub fn redirect_standard_input(mut self, redirect: bool) -> Self {
        self.0.redirect_standard_input = redirect;
        self
    }

    /// Capture the child's standard output stream instead of inheriting
    pub fn redirect_standard_output(mut self, redirect: bool) -> Self {
        self.0.redirect_standard_output = redirect;
        self
    }

    /// Allow the child to display its own window
    pub fn show_window(mut self, show: bool) -> Self {
        self.0.show_window = show;
        self
    }

    /// Set the directory the child is launched in
    pub fn working_directory<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.0.working_directory = Some(dir.as_ref().to_owned());
        self
    }

    /// Set the per-stream encodings
    pub fn encoding(mut self, encoding: EncodingSettings) -> Self {
        self.0.encoding = encoding;
        self
    }

    /// Build the immutable settings value
    pub fn build(self) -> WrapperSettings {
        self.0
    }
}
