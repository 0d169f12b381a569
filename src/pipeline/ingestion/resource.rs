//! Resource opener: turns a local path or remote URL into a sequence of
//! sized byte streams, unpacking zip, tar, tar.gz and gzip transparently.
//!
//! Probe order is zip, tar (plain or gzip-compressed), gzip, then plain text.
//! Remote resources are fetched into a scratch file first and probed the same
//! way; the scratch file is removed once the opened resource and every member
//! stream taken from it have been dropped.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use flate2::read::MultiGzDecoder;
use tempfile::TempPath;
use tracing::{debug, info, warn};

use crate::app::ports::HttpClientPort;
use crate::error::{IngestError, Result};
use crate::infra::http_client::ReqwestHttp;
use crate::metrics::IngestMetrics;

const TAR_BLOCK: usize = 512;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const MAX_ERROR_BODY: usize = 512;

/// Container layout detected for a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceFormat {
    Zip,
    Tar { compressed: bool },
    Gzip,
    Plain,
}

impl ResourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceFormat::Zip => "zip",
            ResourceFormat::Tar { compressed: false } => "tar",
            ResourceFormat::Tar { compressed: true } => "tar.gz",
            ResourceFormat::Gzip => "gzip",
            ResourceFormat::Plain => "plain",
        }
    }
}

/// Wraps a reader and counts the bytes pulled through it.
struct CountingReader<R> {
    inner: R,
    consumed: Arc<AtomicU64>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.consumed.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// One readable byte stream with a known size and a running position.
///
/// For gzip members `size` and `position` are measured in compressed bytes,
/// so progress reporting stays proportional to what is read from disk.
pub struct SizedResource {
    pub name: String,
    pub size: u64,
    reader: Box<dyn BufRead + Send>,
    consumed: Arc<AtomicU64>,
    _scratch: Vec<Arc<TempPath>>,
}

impl SizedResource {
    fn new<R: Read + Send + 'static>(
        name: String,
        size: u64,
        inner: R,
        gzipped: bool,
        scratch: Vec<Arc<TempPath>>,
    ) -> Self {
        let consumed = Arc::new(AtomicU64::new(0));
        let counting = CountingReader {
            inner,
            consumed: Arc::clone(&consumed),
        };
        let reader: Box<dyn BufRead + Send> = if gzipped {
            Box::new(BufReader::new(MultiGzDecoder::new(counting)))
        } else {
            Box::new(BufReader::new(counting))
        };
        Self {
            name,
            size,
            reader,
            consumed,
            _scratch: scratch,
        }
    }

    /// Bytes read so far from the underlying stream.
    pub fn position(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }

    /// A handle that keeps reporting the position after the stream is moved
    /// into a record reader.
    pub fn progress(&self) -> Progress {
        Progress {
            size: self.size,
            consumed: Arc::clone(&self.consumed),
        }
    }
}

/// Read progress of one member stream.
#[derive(Debug, Clone)]
pub struct Progress {
    size: u64,
    consumed: Arc<AtomicU64>,
}

impl Progress {
    pub fn position(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }

    pub fn percent(&self) -> f64 {
        if self.size == 0 {
            return 100.0;
        }
        (self.position() as f64 / self.size as f64 * 100.0).min(100.0)
    }
}

impl std::fmt::Debug for SizedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SizedResource")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("position", &self.position())
            .finish()
    }
}

impl Read for SizedResource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl BufRead for SizedResource {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.reader.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.reader.consume(amt)
    }
}

struct TarMember {
    name: String,
    offset: u64,
    size: u64,
}

enum Members {
    Single(Option<SizedResource>),
    Zip {
        archive: zip::ZipArchive<File>,
        next: usize,
    },
    Tar {
        path: PathBuf,
        entries: std::vec::IntoIter<TarMember>,
    },
}

/// An opened resource: iterate it to get each member stream in archive order.
pub struct OpenedResource {
    origin: String,
    local_path: PathBuf,
    format: ResourceFormat,
    members: Members,
    scratch: Vec<Arc<TempPath>>,
}

impl std::fmt::Debug for OpenedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedResource")
            .field("origin", &self.origin)
            .field("local_path", &self.local_path)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl OpenedResource {
    /// The path or URL the resource was opened from
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Where the bytes live on disk (a scratch file for remote resources)
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn format(&self) -> ResourceFormat {
        self.format
    }

    fn next_zip_member(
        archive: &mut zip::ZipArchive<File>,
        next: &mut usize,
        scratch: &[Arc<TempPath>],
    ) -> Option<Result<SizedResource>> {
        while *next < archive.len() {
            let index = *next;
            *next += 1;
            let mut file = match archive.by_index(index) {
                Ok(file) => file,
                Err(e) => return Some(Err(e.into())),
            };
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let (unpacked, unpacked_path, size) = match unpack_to_scratch(&mut file) {
                Ok(parts) => parts,
                Err(e) => return Some(Err(e)),
            };
            debug!(member = %name, size, "Opened zip member");
            let mut member_scratch = scratch.to_vec();
            member_scratch.push(Arc::new(unpacked_path));
            return Some(Ok(SizedResource::new(
                name,
                size,
                unpacked,
                false,
                member_scratch,
            )));
        }
        None
    }

    fn open_tar_member(
        path: &Path,
        member: TarMember,
        scratch: &[Arc<TempPath>],
    ) -> Result<SizedResource> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(member.offset))?;
        debug!(member = %member.name, size = member.size, "Opened tar member");
        Ok(SizedResource::new(
            member.name,
            member.size,
            file.take(member.size),
            false,
            scratch.to_vec(),
        ))
    }
}

impl Iterator for OpenedResource {
    type Item = Result<SizedResource>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.members {
            Members::Single(slot) => slot.take().map(Ok),
            Members::Zip { archive, next } => Self::next_zip_member(archive, next, &self.scratch),
            Members::Tar { path, entries } => {
                let member = entries.next()?;
                Some(Self::open_tar_member(path, member, &self.scratch))
            }
        }
    }
}

/// Opens local paths and remote URLs through an HTTP port.
pub struct ResourceOpener {
    http: Box<dyn HttpClientPort>,
}

impl Default for ResourceOpener {
    fn default() -> Self {
        Self::new(Box::new(ReqwestHttp::default()))
    }
}

impl ResourceOpener {
    pub fn new(http: Box<dyn HttpClientPort>) -> Self {
        Self { http }
    }

    pub fn open(&self, location: &str) -> Result<OpenedResource> {
        if is_remote(location) {
            let fetched = self.fetch(location)?;
            let local_path = fetched.to_path_buf();
            open_local(location, &local_path, vec![Arc::new(fetched)])
        } else {
            open_local(location, Path::new(location), Vec::new())
        }
    }

    fn fetch(&self, url: &str) -> Result<TempPath> {
        let response = self.http.get(url).map_err(|e| IngestError::RemoteFetch {
            url: url.to_string(),
            status: 0,
            body: e,
        })?;

        if !response.is_success() {
            let mut body = String::from_utf8_lossy(&response.bytes).into_owned();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            warn!(url, status = response.status, "Remote fetch failed");
            return Err(IngestError::RemoteFetch {
                url: url.to_string(),
                status: response.status,
                body,
            });
        }

        let mut scratch = tempfile::Builder::new()
            .prefix("kgx_ingest_fetch_")
            .tempfile()?;
        scratch.write_all(&response.bytes)?;
        scratch.flush()?;
        IngestMetrics::record_remote_fetch(response.bytes.len());
        info!(
            url,
            bytes = response.bytes.len(),
            content_type = %response.content_type,
            "Fetched remote resource"
        );
        Ok(scratch.into_temp_path())
    }
}

/// Open a path or URL with the default HTTP client.
pub fn open_resource(location: &str) -> Result<OpenedResource> {
    ResourceOpener::default().open(location)
}

pub fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

fn open_local(
    origin: &str,
    path: &Path,
    mut scratch: Vec<Arc<TempPath>>,
) -> Result<OpenedResource> {
    let not_found = || IngestError::ResourceNotFound {
        path: path.display().to_string(),
    };
    if !path.is_file() {
        return Err(not_found());
    }
    File::open(path).map_err(|_| not_found())?;

    let format = detect_format(path)?;
    debug!(origin, format = format.as_str(), "Detected resource format");
    IngestMetrics::record_resource_opened(format.as_str());

    let (local_path, members) = match format {
        ResourceFormat::Zip => {
            let archive = zip::ZipArchive::new(File::open(path)?)?;
            (path.to_path_buf(), Members::Zip { archive, next: 0 })
        }
        ResourceFormat::Tar { compressed } => {
            let tar_path = if compressed {
                let unpacked = decompress_to_scratch(path)?;
                let unpacked_path = unpacked.to_path_buf();
                scratch.push(Arc::new(unpacked));
                unpacked_path
            } else {
                path.to_path_buf()
            };
            let entries = index_tar(&tar_path)?.into_iter();
            (
                path.to_path_buf(),
                Members::Tar {
                    path: tar_path,
                    entries,
                },
            )
        }
        ResourceFormat::Gzip | ResourceFormat::Plain => {
            let file = File::open(path)?;
            let size = file.metadata()?.len();
            let single = SizedResource::new(
                origin.to_string(),
                size,
                file,
                format == ResourceFormat::Gzip,
                scratch.clone(),
            );
            (path.to_path_buf(), Members::Single(Some(single)))
        }
    };

    Ok(OpenedResource {
        origin: origin.to_string(),
        local_path,
        format,
        members,
        scratch,
    })
}

fn detect_format(path: &Path) -> Result<ResourceFormat> {
    let mut file = File::open(path)?;
    if zip::ZipArchive::new(&mut file).is_ok() {
        return Ok(ResourceFormat::Zip);
    }

    file.seek(SeekFrom::Start(0))?;
    let head = read_block(&mut file)?;
    if is_tar_header(&head) {
        return Ok(ResourceFormat::Tar { compressed: false });
    }

    if head.starts_with(&GZIP_MAGIC) {
        file.seek(SeekFrom::Start(0))?;
        return Ok(match read_block(&mut MultiGzDecoder::new(file)) {
            Ok(inflated) if is_tar_header(&inflated) => ResourceFormat::Tar { compressed: true },
            Ok(_) => ResourceFormat::Gzip,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "gzip magic present but stream is not gzip");
                ResourceFormat::Plain
            }
        });
    }

    Ok(ResourceFormat::Plain)
}

fn read_block<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut block = Vec::with_capacity(TAR_BLOCK);
    reader.take(TAR_BLOCK as u64).read_to_end(&mut block)?;
    Ok(block)
}

/// A tar header block carries the ustar magic or a valid header checksum.
fn is_tar_header(block: &[u8]) -> bool {
    if block.len() < TAR_BLOCK {
        return false;
    }
    if &block[257..262] == b"ustar" {
        return true;
    }
    let field = String::from_utf8_lossy(&block[148..156]);
    let field = field.trim_matches(|c: char| c == '\0' || c == ' ');
    let Ok(expected) = u32::from_str_radix(field, 8) else {
        return false;
    };
    let actual: u32 = block[..TAR_BLOCK]
        .iter()
        .enumerate()
        .map(|(i, b)| if (148..156).contains(&i) { 0x20 } else { *b as u32 })
        .sum();
    expected == actual
}

fn decompress_to_scratch(path: &Path) -> Result<TempPath> {
    let mut decoder = MultiGzDecoder::new(File::open(path)?);
    let mut scratch = tempfile::Builder::new()
        .prefix("kgx_ingest_tar_")
        .tempfile()?;
    io::copy(&mut decoder, &mut scratch)?;
    scratch.flush()?;
    Ok(scratch.into_temp_path())
}

/// Spool a zip member to its own scratch file. The size is what was
/// actually unpacked, not what the archive header claims.
fn unpack_to_scratch(member: &mut impl Read) -> Result<(File, TempPath, u64)> {
    let mut scratch = tempfile::Builder::new()
        .prefix("kgx_ingest_zip_")
        .tempfile()?;
    let size = io::copy(member, &mut scratch)?;
    scratch.flush()?;
    let (mut file, path) = scratch.into_parts();
    file.seek(SeekFrom::Start(0))?;
    Ok((file, path, size))
}

fn index_tar(path: &Path) -> Result<Vec<TarMember>> {
    let mut archive = tar::Archive::new(File::open(path)?);
    let mut members = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        members.push(TarMember {
            name: entry.path()?.to_string_lossy().into_owned(),
            offset: entry.raw_file_position(),
            size: entry.size(),
        });
    }
    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::HttpGetResult;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Read;

    struct FakeHttp {
        status: u16,
        body: Vec<u8>,
    }

    impl HttpClientPort for FakeHttp {
        fn get(&self, _url: &str) -> std::result::Result<HttpGetResult, String> {
            Ok(HttpGetResult {
                status: self.status,
                bytes: self.body.clone(),
                content_type: "text/plain".into(),
                content_length: self.body.len() as u64,
            })
        }
    }

    fn read_all(mut resource: SizedResource) -> String {
        let mut out = String::new();
        resource.read_to_string(&mut out).unwrap();
        out
    }

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    fn tar_bytes(members: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, body) in members {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, body.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn plain_file_is_a_single_member() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodes.tsv");
        std::fs::write(&path, "id\tname\nA:1\tone\n").unwrap();

        let mut opened = open_resource(path.to_str().unwrap()).unwrap();
        assert_eq!(opened.format(), ResourceFormat::Plain);
        let member = opened.next().unwrap().unwrap();
        assert_eq!(member.size, 16);
        assert_eq!(read_all(member), "id\tname\nA:1\tone\n");
        assert!(opened.next().is_none());
    }

    #[test]
    fn gzip_reports_compressed_size_and_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.txt.gz");
        let compressed = gzip(b"line one\nline two\n");
        std::fs::write(&path, &compressed).unwrap();

        let mut opened = open_resource(path.to_str().unwrap()).unwrap();
        assert_eq!(opened.format(), ResourceFormat::Gzip);
        let mut member = opened.next().unwrap().unwrap();
        assert_eq!(member.size, compressed.len() as u64);
        let mut text = String::new();
        member.read_to_string(&mut text).unwrap();
        assert_eq!(text, "line one\nline two\n");
        assert_eq!(member.position(), compressed.len() as u64);
    }

    #[test]
    fn zip_members_come_out_in_order_and_skip_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.zip");
        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        writer.add_directory("data/", options).unwrap();
        writer.start_file("data/a.txt", options).unwrap();
        writer.write_all(b"first").unwrap();
        writer.start_file("data/b.txt", options).unwrap();
        writer.write_all(b"second").unwrap();
        writer.finish().unwrap();

        let opened = open_resource(path.to_str().unwrap()).unwrap();
        let members: Vec<(String, String)> = opened
            .map(|m| {
                let m = m.unwrap();
                (m.name.clone(), read_all(m))
            })
            .collect();
        assert_eq!(
            members,
            vec![
                ("data/a.txt".to_string(), "first".to_string()),
                ("data/b.txt".to_string(), "second".to_string())
            ]
        );
    }

    #[test]
    fn zip_member_outlives_the_archive_and_reports_unpacked_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.zip");
        let body = "A:1\tone\n".repeat(32 * 1024);
        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        writer.start_file("nodes.tsv", options).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
        writer.finish().unwrap();

        let member = {
            let mut opened = open_resource(path.to_str().unwrap()).unwrap();
            opened.next().unwrap().unwrap()
        };
        assert_eq!(member.size, body.len() as u64);
        assert_eq!(read_all(member), body);
    }

    #[test]
    fn unpacked_scratch_file_is_rewound_and_removed_on_drop() {
        let (mut file, path, size) = unpack_to_scratch(&mut "hello".as_bytes()).unwrap();
        assert_eq!(size, 5);
        let mut text = String::new();
        file.read_to_string(&mut text).unwrap();
        assert_eq!(text, "hello");
        let on_disk = path.to_path_buf();
        assert!(on_disk.exists());
        drop(file);
        drop(path);
        assert!(!on_disk.exists());
    }

    #[test]
    fn tar_and_compressed_tar_members_are_streamed() {
        let dir = tempfile::tempdir().unwrap();
        let raw = tar_bytes(&[("a.tsv", "x\n"), ("b.tsv", "yy\n")]);
        let tar_path = dir.path().join("bundle.tar");
        std::fs::write(&tar_path, &raw).unwrap();
        let tgz_path = dir.path().join("bundle.tar.gz");
        std::fs::write(&tgz_path, gzip(&raw)).unwrap();

        for (path, compressed) in [(&tar_path, false), (&tgz_path, true)] {
            let opened = open_resource(path.to_str().unwrap()).unwrap();
            assert_eq!(opened.format(), ResourceFormat::Tar { compressed });
            let members: Vec<(String, u64, String)> = opened
                .map(|m| {
                    let m = m.unwrap();
                    (m.name.clone(), m.size, read_all(m))
                })
                .collect();
            assert_eq!(
                members,
                vec![
                    ("a.tsv".to_string(), 2, "x\n".to_string()),
                    ("b.tsv".to_string(), 3, "yy\n".to_string())
                ]
            );
        }
    }

    #[test]
    fn missing_path_names_the_probed_location() {
        let err = open_resource("/definitely/not/here.tsv").unwrap_err();
        match err {
            IngestError::ResourceNotFound { path } => assert!(path.contains("not/here.tsv")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn remote_resource_is_fetched_then_cleaned_up() {
        let opener = ResourceOpener::new(Box::new(FakeHttp {
            status: 200,
            body: gzip(b"remote rows\n"),
        }));
        let mut opened = opener.open("https://example.org/data.txt.gz").unwrap();
        assert_eq!(opened.format(), ResourceFormat::Gzip);
        let scratch = opened.local_path().to_path_buf();
        assert!(scratch.exists());

        let member = opened.next().unwrap().unwrap();
        assert_eq!(member.name, "https://example.org/data.txt.gz");
        drop(opened);
        assert!(scratch.exists(), "member stream still holds the scratch file");
        assert_eq!(read_all(member), "remote rows\n");
        assert!(!scratch.exists());
    }

    #[test]
    fn remote_error_status_carries_status_and_body() {
        let opener = ResourceOpener::new(Box::new(FakeHttp {
            status: 404,
            body: b"Not Found".to_vec(),
        }));
        match opener.open("http://example.org/missing.tsv") {
            Err(IngestError::RemoteFetch { status, body, .. }) => {
                assert_eq!(status, 404);
                assert_eq!(body, "Not Found");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("fetch should fail on 404"),
        }
    }

    #[test]
    fn tar_header_checksum_is_recognised() {
        let raw = tar_bytes(&[("a", "1")]);
        assert!(is_tar_header(&raw[..TAR_BLOCK]));
        assert!(!is_tar_header(&[0u8; TAR_BLOCK]));
        assert!(!is_tar_header(b"short"));
    }
}
