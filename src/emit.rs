//! File emission: turning encoded variants into addressable files.
//!
//! The pipeline never writes files itself. It hands each kept result to a
//! [`FileEmitter`] and trusts the returned [`EmittedFile`] verbatim. Hosts
//! with their own asset pipeline implement the trait; the CLI uses
//! [`DirectoryEmitter`], which names files from a [template](crate::naming)
//! and writes them under an output root.

use crate::artifact::EmittedFile;
use crate::config::ResponsiveOptions;
use crate::naming::{self, NameParts};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmitError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("file name '{0}' escapes the output directory")]
    InvalidName(String),
}

/// One file to emit.
#[derive(Debug, Clone, Copy)]
pub struct EmitRequest<'a> {
    /// Source file stem, for `[name]`.
    pub name: &'a str,
    /// Extension of the encoded bytes, for `[ext]`.
    pub ext: &'a str,
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
}

/// Host-supplied file emission.
pub trait FileEmitter: Sync {
    fn emit(&self, request: &EmitRequest<'_>) -> Result<EmittedFile, EmitError>;
}

/// Writes files into a directory tree and addresses them by public path.
///
/// `path` = `public_path` + `output_path` + file name; the file itself goes
/// to `root/output_path/file name`.
#[derive(Debug, Clone)]
pub struct DirectoryEmitter {
    root: PathBuf,
    template: String,
    output_path: String,
    public_path: String,
    write: bool,
}

impl DirectoryEmitter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            template: naming::DEFAULT_TEMPLATE.to_string(),
            output_path: String::new(),
            public_path: String::new(),
            write: true,
        }
    }

    /// Configure naming, paths, and `emit_file` from the options record.
    pub fn from_options(root: impl Into<PathBuf>, options: &ResponsiveOptions) -> Self {
        Self {
            root: root.into(),
            template: options.name.clone(),
            output_path: with_trailing_slash(&options.output_path),
            public_path: with_trailing_slash(&options.public_path),
            write: options.emit_file,
        }
    }
}

fn with_trailing_slash(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{}/", prefix)
    }
}

impl FileEmitter for DirectoryEmitter {
    fn emit(&self, request: &EmitRequest<'_>) -> Result<EmittedFile, EmitError> {
        let file_name = naming::interpolate(
            &self.template,
            &NameParts {
                name: request.name,
                ext: request.ext,
                width: request.width,
                height: request.height,
                data: request.data,
            },
        );
        let relative = format!("{}{}", self.output_path, file_name);
        if Path::new(&relative)
            .components()
            .any(|c| !matches!(c, std::path::Component::Normal(_)))
        {
            return Err(EmitError::InvalidName(relative));
        }

        if self.write {
            let target = self.root.join(&relative);
            let write = || -> io::Result<()> {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&target, request.data)
            };
            write().map_err(|source| EmitError::Write {
                path: target.clone(),
                source,
            })?;
        }

        let path = format!("{}{}", self.public_path, relative);
        Ok(EmittedFile {
            src: format!("{} {}w", path, request.width),
            path,
            width: request.width,
            height: request.height,
        })
    }
}
