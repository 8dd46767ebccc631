// SPDX-License-Identifier: AGPL-3.0-or-later
//! CLI command implementations

use bytes::Bytes;
use console::style;
use rfm_core::{ByteRange, EntryKind, ErrorPayload, ItemInfo, RfmError, RfmResult};
use rfm_manager::FileManager;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tabled::{Table, Tabled};

#[derive(Serialize)]
struct ErrorResponse {
    errors: Vec<ErrorPayload>,
}

/// Report a failure on stdout as the wire error payload.
pub fn fail(error: &RfmError) -> ExitCode {
    tracing::debug!(error = ?error, "command failed");
    let response = ErrorResponse {
        errors: vec![error.payload()],
    };
    if print_json(&response).is_err() {
        eprintln!("{}: {}", style("error").red().bold(), error);
    }
    ExitCode::FAILURE
}

pub fn print_json<T: Serialize>(value: &T) -> RfmResult<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)
        .map_err(|e| RfmError::from_io(e.into(), "print", "-"))?;
    writeln!(stdout).map_err(|e| RfmError::from_io(e, "print", "-"))
}

async fn read_local(path: &Path) -> RfmResult<Bytes> {
    tokio::fs::read(path)
        .await
        .map(Bytes::from)
        .map_err(|e| RfmError::from_io(e, "read", path.display()))
}

async fn write_local(path: &Path, data: &[u8]) -> RfmResult<()> {
    tokio::fs::write(path, data)
        .await
        .map_err(|e| RfmError::from_io(e, "write", path.display()))
}

fn format_kind(kind: EntryKind) -> String {
    match kind {
        EntryKind::Folder => style("d").cyan().to_string(),
        EntryKind::File => "-".to_string(),
    }
}

fn format_size(size: Option<u64>) -> String {
    size.map(|s| bytesize::ByteSize(s).to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn format_access(item: &ItemInfo) -> String {
    let r = if item.attributes.readable == 1 { 'r' } else { '-' };
    let w = if item.attributes.writable == 1 { 'w' } else { '-' };
    format!("{r}{w}")
}

#[derive(Tabled)]
struct FolderRow {
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Access")]
    access: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Modified")]
    modified: String,
    #[tabled(rename = "Name")]
    name: String,
}

impl From<&ItemInfo> for FolderRow {
    fn from(item: &ItemInfo) -> Self {
        Self {
            kind: format_kind(item.kind),
            access: format_access(item),
            size: format_size(item.attributes.size),
            modified: item.attributes.modified.clone(),
            name: item.attributes.name.clone(),
        }
    }
}

pub async fn get_folder(manager: &FileManager, path: &str, table: bool) -> RfmResult<()> {
    let items = manager.get_folder(path).await?;
    if !table {
        return print_json(&items);
    }

    if items.is_empty() {
        println!("(empty folder)");
    } else {
        let rows: Vec<FolderRow> = items.iter().map(FolderRow::from).collect();
        println!("{}", Table::new(rows));
    }
    Ok(())
}

pub async fn save_file(manager: &FileManager, path: &str, from: &Path) -> RfmResult<()> {
    let data = read_local(from).await?;
    let content = String::from_utf8_lossy(&data);
    print_json(&manager.save_file(path, &content).await?)
}

pub async fn upload(
    manager: &FileManager,
    folder: &str,
    file: &Path,
    name: Option<&str>,
) -> RfmResult<()> {
    let name = match name {
        Some(name) => name.to_string(),
        None => file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| RfmError::InvalidName {
                name: file.display().to_string(),
            })?,
    };
    let data = read_local(file).await?;
    print_json(&manager.upload(folder, &name, data).await?)
}

pub async fn replace(manager: &FileManager, path: &str, file: &Path) -> RfmResult<()> {
    let data = read_local(file).await?;
    print_json(&manager.replace(path, data).await?)
}

#[derive(Serialize)]
struct Saved {
    name: String,
    output: PathBuf,
    size: u64,
}

pub async fn download(manager: &FileManager, path: &str, output: Option<&Path>) -> RfmResult<()> {
    let download = manager.download(path).await?;
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&download.name));
    write_local(&output, &download.data).await?;
    print_json(&Saved {
        name: download.name,
        output,
        size: download.data.len() as u64,
    })
}

pub async fn get_image(
    manager: &FileManager,
    path: &str,
    thumbnail: bool,
    output: &Path,
) -> RfmResult<()> {
    let data = manager.get_image(path, thumbnail).await?;
    write_local(output, &data).await?;
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    print_json(&Saved {
        name,
        output: output.to_path_buf(),
        size: data.len() as u64,
    })
}

/// Raw bytes to stdout; the served range goes to stderr.
pub async fn read_file(manager: &FileManager, path: &str, range: Option<&str>) -> RfmResult<()> {
    let range = match range {
        Some(value) => Some(ByteRange::parse_header(value).ok_or_else(|| {
            RfmError::RangeNotSatisfiable {
                path: path.to_string(),
                size: 0,
            }
        })?),
        None => None,
    };

    let read = manager.read_file(path, range).await?;
    if let Some(content_range) = read.content_range() {
        eprintln!("{} {}", style("Content-Range:").dim(), content_range);
    }
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(&read.data)
        .and_then(|()| stdout.flush())
        .map_err(|e| RfmError::from_io(e, "print", "-"))
}

pub async fn summarize(manager: &FileManager, human: bool) -> RfmResult<()> {
    let summary = manager.summarize().await?;
    if !human {
        return print_json(&summary);
    }

    let s = &summary.attributes;
    println!("Storage root summary");
    println!("  Size:    {}", bytesize::ByteSize(s.size));
    println!("  Files:   {}", s.files);
    println!("  Folders: {}", s.folders);
    if s.size_limit > 0 {
        let pct = (s.size as f64 / s.size_limit as f64) * 100.0;
        println!("  Limit:   {} ({:.1}% used)", bytesize::ByteSize(s.size_limit), pct);
    } else {
        println!("  Limit:   {}", style("unlimited").green());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_shape() {
        let err = RfmError::ForbiddenExtension { path: "/run.sh".into() };
        let response = ErrorResponse {
            errors: vec![err.payload()],
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["errors"][0]["code"], "ForbiddenExtension");
        assert_eq!(json["errors"][0]["arguments"][0], "/run.sh");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(None), "-");
        assert!(format_size(Some(2048)).contains("KiB") || format_size(Some(2048)).contains("kB"));
    }
}
