// SPDX-License-Identifier: AGPL-3.0-or-later
//! Local filesystem backend

use async_trait::async_trait;
use bytes::Bytes;
use rfm_core::{
    backend::{ProviderKind, StorageCapabilities, StorageProvider},
    entry::Entry,
    error::{RfmError, RfmResult},
    metadata::{Metadata, SystemAccess},
    VirtualPath,
};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Local filesystem backend
pub struct LocalBackend {
    id: String,
    root: PathBuf,
    capabilities: StorageCapabilities,
}

impl LocalBackend {
    pub fn new(id: impl Into<String>, root: impl AsRef<Path>) -> Self {
        Self {
            id: id.into(),
            root: root.as_ref().to_path_buf(),
            capabilities: StorageCapabilities::local_filesystem(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn to_real_path(&self, path: &VirtualPath) -> PathBuf {
        let mut real = self.root.clone();
        for seg in &path.segments {
            real.push(seg);
        }
        real
    }

    async fn entry_from_path(&self, path: &VirtualPath, real: &Path) -> RfmResult<Option<Entry>> {
        let meta = match fs::metadata(real).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RfmError::from_io(e, "stat", path)),
        };

        let mut metadata = Metadata::new();
        if let Ok(modified) = meta.modified() {
            metadata.modified = Some(modified.into());
        }
        if let Ok(created) = meta.created() {
            metadata.created = Some(created.into());
        }
        metadata.access = system_access(real, meta.is_dir());

        if meta.is_dir() {
            Ok(Some(Entry::folder(path.clone(), metadata)))
        } else {
            metadata.size = Some(meta.len());
            Ok(Some(Entry::file(path.clone(), metadata)))
        }
    }

    async fn ensure_absent(&self, path: &VirtualPath, real: &Path) -> RfmResult<()> {
        let exists = fs::try_exists(real)
            .await
            .map_err(|e| RfmError::from_io(e, "stat", path))?;
        if exists {
            return Err(RfmError::already_exists(path, path.name().unwrap_or_default()));
        }
        Ok(())
    }
}

/// What `access(2)` grants the process; folders need execute to be writable.
#[cfg(unix)]
fn system_access(real: &Path, is_dir: bool) -> Option<SystemAccess> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(real.as_os_str().as_bytes()).ok()?;
    let write_mode = if is_dir { libc::W_OK | libc::X_OK } else { libc::W_OK };
    // SAFETY: c_path is a valid NUL-terminated string for the duration of both calls.
    let read = unsafe { libc::access(c_path.as_ptr(), libc::R_OK) } == 0;
    let write = unsafe { libc::access(c_path.as_ptr(), write_mode) } == 0;
    Some(SystemAccess { read, write })
}

#[cfg(not(unix))]
fn system_access(_real: &Path, _is_dir: bool) -> Option<SystemAccess> {
    None
}

#[async_trait]
impl StorageProvider for LocalBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    fn capabilities(&self) -> &StorageCapabilities {
        &self.capabilities
    }

    fn absolute_path(&self, path: &VirtualPath) -> String {
        let mut absolute = self.to_real_path(path).to_string_lossy().into_owned();
        if path.is_folder() && !absolute.ends_with('/') {
            absolute.push('/');
        }
        absolute
    }

    async fn stat(&self, path: &VirtualPath) -> RfmResult<Option<Entry>> {
        let real = self.to_real_path(path);
        self.entry_from_path(path, &real).await
    }

    async fn list(&self, folder: &VirtualPath) -> RfmResult<Vec<Entry>> {
        let real = self.to_real_path(folder);
        let mut read_dir = fs::read_dir(&real)
            .await
            .map_err(|e| RfmError::from_io(e, "list", folder))?;

        let mut entries = Vec::new();
        while let Some(child) = read_dir
            .next_entry()
            .await
            .map_err(|e| RfmError::from_io(e, "list", folder))?
        {
            let name = child.file_name().to_string_lossy().into_owned();
            let vpath = folder.child_file(&name);
            // Entries can vanish between read_dir and stat.
            if let Some(entry) = self.entry_from_path(&vpath, &child.path()).await? {
                entries.push(entry);
            }
        }

        entries.sort_by(|a, b| a.path.segments.cmp(&b.path.segments));
        Ok(entries)
    }

    async fn make_dir(&self, path: &VirtualPath) -> RfmResult<()> {
        let real = self.to_real_path(path);
        fs::create_dir(&real)
            .await
            .map_err(|e| RfmError::from_io(e, "make_dir", path))?;
        tracing::info!(path = %real.display(), "created folder");
        Ok(())
    }

    async fn read_file(&self, path: &VirtualPath, range: Option<(u64, u64)>) -> RfmResult<Bytes> {
        let real = self.to_real_path(path);
        let mut file = fs::File::open(&real)
            .await
            .map_err(|e| RfmError::from_io(e, "read", path))?;
        let mut buffer = Vec::new();

        if let Some((start, end)) = range {
            file.seek(std::io::SeekFrom::Start(start))
                .await
                .map_err(|e| RfmError::from_io(e, "read", path))?;
            buffer.resize((end - start + 1) as usize, 0);
            file.read_exact(&mut buffer)
                .await
                .map_err(|e| RfmError::from_io(e, "read", path))?;
        } else {
            file.read_to_end(&mut buffer)
                .await
                .map_err(|e| RfmError::from_io(e, "read", path))?;
        }

        Ok(Bytes::from(buffer))
    }

    async fn write_file(&self, path: &VirtualPath, data: Bytes) -> RfmResult<()> {
        let real = self.to_real_path(path);
        if let Some(parent) = real.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| RfmError::from_io(e, "write", path))?;
        }
        fs::write(&real, &data)
            .await
            .map_err(|e| RfmError::from_io(e, "write", path))?;
        tracing::info!(path = %real.display(), size = data.len(), "wrote file");
        Ok(())
    }

    async fn remove_file(&self, path: &VirtualPath) -> RfmResult<()> {
        let real = self.to_real_path(path);
        fs::remove_file(&real)
            .await
            .map_err(|e| RfmError::from_io(e, "remove_file", path))?;
        tracing::info!(path = %real.display(), "removed file");
        Ok(())
    }

    async fn remove_tree(&self, path: &VirtualPath) -> RfmResult<()> {
        let real = self.to_real_path(path);
        fs::remove_dir_all(&real)
            .await
            .map_err(|e| RfmError::from_io(e, "remove_tree", path))?;
        tracing::info!(path = %real.display(), "removed folder");
        Ok(())
    }

    async fn rename(&self, from: &VirtualPath, to: &VirtualPath) -> RfmResult<()> {
        let src_real = self.to_real_path(from);
        let dst_real = self.to_real_path(to);

        // rename(2) silently replaces files, so refuse up front.
        self.ensure_absent(to, &dst_real).await?;
        fs::rename(&src_real, &dst_real)
            .await
            .map_err(|e| RfmError::from_io(e, "rename", from))?;
        tracing::info!(from = %src_real.display(), to = %dst_real.display(), "renamed");
        Ok(())
    }

    async fn copy_tree(&self, from: &VirtualPath, to: &VirtualPath) -> RfmResult<()> {
        let src_real = self.to_real_path(from);
        let dst_real = self.to_real_path(to);
        self.ensure_absent(to, &dst_real).await?;

        let meta = fs::metadata(&src_real)
            .await
            .map_err(|e| RfmError::from_io(e, "copy", from))?;
        if !meta.is_dir() {
            fs::copy(&src_real, &dst_real)
                .await
                .map_err(|e| RfmError::from_io(e, "copy", from))?;
            tracing::info!(from = %src_real.display(), to = %dst_real.display(), "copied file");
            return Ok(());
        }

        let mut pending = vec![(src_real.clone(), dst_real.clone())];
        while let Some((src_dir, dst_dir)) = pending.pop() {
            fs::create_dir(&dst_dir)
                .await
                .map_err(|e| RfmError::from_io(e, "copy", to))?;
            let mut read_dir = fs::read_dir(&src_dir)
                .await
                .map_err(|e| RfmError::from_io(e, "copy", from))?;
            while let Some(child) = read_dir
                .next_entry()
                .await
                .map_err(|e| RfmError::from_io(e, "copy", from))?
            {
                let target = dst_dir.join(child.file_name());
                let file_type = child
                    .file_type()
                    .await
                    .map_err(|e| RfmError::from_io(e, "copy", from))?;
                if file_type.is_dir() {
                    pending.push((child.path(), target));
                } else {
                    fs::copy(child.path(), &target)
                        .await
                        .map_err(|e| RfmError::from_io(e, "copy", from))?;
                }
            }
        }
        tracing::info!(from = %src_real.display(), to = %dst_real.display(), "copied folder");
        Ok(())
    }

    async fn size_of(&self, path: &VirtualPath) -> RfmResult<u64> {
        let real = self.to_real_path(path);
        let meta = fs::metadata(&real)
            .await
            .map_err(|e| RfmError::from_io(e, "size", path))?;
        if !meta.is_dir() {
            return Ok(meta.len());
        }

        let mut total = 0;
        let mut pending = vec![real];
        while let Some(dir) = pending.pop() {
            let mut read_dir = fs::read_dir(&dir)
                .await
                .map_err(|e| RfmError::from_io(e, "size", path))?;
            while let Some(child) = read_dir
                .next_entry()
                .await
                .map_err(|e| RfmError::from_io(e, "size", path))?
            {
                let meta = child
                    .metadata()
                    .await
                    .map_err(|e| RfmError::from_io(e, "size", path))?;
                if meta.is_dir() {
                    pending.push(child.path());
                } else {
                    total += meta.len();
                }
            }
        }
        Ok(total)
    }
}
