// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Upload tasks, their byte sources, and object naming

use bytes::Bytes;
use gcsout_config::{sequence, ConfigResult, OutputConfig};
use std::fmt;
use std::io;
use std::path::PathBuf;
use tokio::io::AsyncRead;

/// Boxed async reader accepted as an upload source
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Where a task's bytes come from
pub enum UploadSource {
    /// A local file, opened when the task starts
    File(PathBuf),
    /// An in-memory buffer
    Bytes(Bytes),
    /// Any async reader
    Reader(BoxedReader),
}

impl UploadSource {
    /// Source reading from an async reader
    pub fn reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        UploadSource::Reader(Box::new(reader))
    }

    pub(crate) async fn open(self) -> io::Result<BoxedReader> {
        match self {
            UploadSource::File(path) => {
                let file = tokio::fs::File::open(&path).await.map_err(|e| {
                    io::Error::new(e.kind(), format!("{}: {}", path.display(), e))
                })?;
                Ok(Box::new(file))
            }
            UploadSource::Bytes(bytes) => Ok(Box::new(io::Cursor::new(bytes))),
            UploadSource::Reader(reader) => Ok(reader),
        }
    }
}

impl From<Bytes> for UploadSource {
    fn from(bytes: Bytes) -> Self {
        UploadSource::Bytes(bytes)
    }
}

impl From<Vec<u8>> for UploadSource {
    fn from(bytes: Vec<u8>) -> Self {
        UploadSource::Bytes(Bytes::from(bytes))
    }
}

impl From<PathBuf> for UploadSource {
    fn from(path: PathBuf) -> Self {
        UploadSource::File(path)
    }
}

impl fmt::Debug for UploadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadSource::File(path) => f.debug_tuple("File").field(path).finish(),
            UploadSource::Bytes(bytes) => f.debug_struct("Bytes").field("len", &bytes.len()).finish(),
            UploadSource::Reader(_) => f.write_str("Reader"),
        }
    }
}

/// One unit of upload work
///
/// The object key is either set explicitly or derived from the task and
/// file index by the job's [`ObjectNamer`].
#[derive(Debug)]
pub struct UploadTask {
    pub(crate) index: usize,
    pub(crate) file_index: usize,
    pub(crate) key: Option<String>,
    pub(crate) source: UploadSource,
}

impl UploadTask {
    /// Task `index` uploading `source` under the derived key
    pub fn new(index: usize, source: impl Into<UploadSource>) -> Self {
        UploadTask {
            index,
            file_index: 0,
            key: None,
            source: source.into(),
        }
    }

    /// Use `key` instead of the derived name
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// File index passed to the sequence format (default 0)
    pub fn with_file_index(mut self, file_index: usize) -> Self {
        self.file_index = file_index;
        self
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// Builds object keys as `<path_prefix><sequence_format(task, file)><file_ext>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectNamer {
    path_prefix: String,
    sequence_format: String,
    file_ext: String,
}

impl ObjectNamer {
    pub fn new(
        path_prefix: impl Into<String>,
        sequence_format: impl Into<String>,
        file_ext: impl Into<String>,
    ) -> Self {
        ObjectNamer {
            path_prefix: path_prefix.into(),
            sequence_format: sequence_format.into(),
            file_ext: file_ext.into(),
        }
    }

    /// Namer for the `[output]` settings
    pub fn from_config(output: &OutputConfig) -> Self {
        Self::new(&output.path_prefix, &output.sequence_format, &output.file_ext)
    }

    /// Key for file `file_index` of task `task_index`
    pub fn name(&self, task_index: usize, file_index: usize) -> ConfigResult<String> {
        let sequence = sequence::render(&self.sequence_format, &[task_index, file_index])?;
        Ok(format!("{}{}{}", self.path_prefix, sequence, self.file_ext))
    }

    pub fn prefix(&self) -> &str {
        &self.path_prefix
    }
}
