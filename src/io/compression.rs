//! Transparent decompression of the input document.
//!
//! Multi-gigabyte XML exports are often shipped compressed. [`auto_detect_reader`]
//! wraps a raw file handle in the matching decoder so the extractor always sees
//! the plain document bytes.
//!
//! Built-in decoders, each behind its own feature flag (all on by default):
//!
//! | codec | extensions       | crate   | feature             |
//! |-------|------------------|---------|---------------------|
//! | gzip  | `.gz`, `.gzip`   | `flate2`| `compression-gzip`  |
//! | zstd  | `.zst`, `.zstd`  | `zstd`  | `compression-zstd`  |
//! | bzip2 | `.bz2`, `.bzip2` | `bzip2` | `compression-bzip2` |
//! | xz    | `.xz`            | `xz2`   | `compression-xz`    |
//!
//! The file extension decides first; when it is not recognized the leading
//! bytes are matched against each codec's magic signature. Multi-member
//! streams (concatenated gzip or bzip2 files) decode to the end.
//!
//! Further formats can be plugged in with [`register_codec`].

use anyhow::{Context, Result};
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::sync::{Arc, OnceLock, RwLock};

type DynRead = Box<dyn Read + Send>;

/// A decompressor the input opener can select by extension or magic bytes.
pub trait CompressionCodec: Send + Sync {
    fn name(&self) -> &str;

    /// Lowercase suffixes including the dot, e.g. `".gz"`.
    fn extensions(&self) -> &[&str];

    /// Signature at the start of a stream in this format, if it has one.
    fn magic_bytes(&self) -> Option<&[u8]>;

    /// Wrap `reader` so reads yield decompressed bytes.
    fn wrap_reader_dyn(&self, reader: DynRead) -> io::Result<DynRead>;
}

/// A compiled-in codec, described by a table row.
#[derive(Clone, Copy)]
struct Builtin {
    name: &'static str,
    extensions: &'static [&'static str],
    magic: &'static [u8],
    wrap: fn(DynRead) -> io::Result<DynRead>,
}

impl CompressionCodec for Builtin {
    fn name(&self) -> &str {
        self.name
    }

    fn extensions(&self) -> &[&str] {
        self.extensions
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(self.magic)
    }

    fn wrap_reader_dyn(&self, reader: DynRead) -> io::Result<DynRead> {
        (self.wrap)(reader)
    }
}

const BUILTINS: &[Builtin] = &[
    #[cfg(feature = "compression-gzip")]
    Builtin {
        name: "gzip",
        extensions: &[".gz", ".gzip"],
        magic: &[0x1f, 0x8b],
        wrap: |r| Ok(Box::new(flate2::read::MultiGzDecoder::new(r))),
    },
    #[cfg(feature = "compression-zstd")]
    Builtin {
        name: "zstd",
        extensions: &[".zst", ".zstd"],
        magic: &[0x28, 0xb5, 0x2f, 0xfd],
        wrap: |r| Ok(Box::new(zstd::stream::read::Decoder::new(r)?)),
    },
    #[cfg(feature = "compression-bzip2")]
    Builtin {
        name: "bzip2",
        extensions: &[".bz2", ".bzip2"],
        magic: b"BZh",
        wrap: |r| Ok(Box::new(bzip2::read::MultiBzDecoder::new(r))),
    },
    #[cfg(feature = "compression-xz")]
    Builtin {
        name: "xz",
        extensions: &[".xz"],
        magic: &[0xfd, b'7', b'z', b'X', b'Z', 0x00],
        wrap: |r| Ok(Box::new(xz2::read::XzDecoder::new_multi_decoder(r))),
    },
];

fn registry() -> &'static RwLock<Vec<Arc<dyn CompressionCodec>>> {
    static REGISTRY: OnceLock<RwLock<Vec<Arc<dyn CompressionCodec>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(Vec::new()))
}

/// Register an extra codec. Built-in codecs keep priority.
pub fn register_codec(codec: Arc<dyn CompressionCodec>) {
    registry()
        .write()
        .expect("codec registry poisoned")
        .push(codec);
}

/// Return the first codec, built-ins before registered ones, that `pick` accepts.
fn find_codec(pick: impl Fn(&dyn CompressionCodec) -> bool) -> Option<Arc<dyn CompressionCodec>> {
    if let Some(b) = BUILTINS.iter().find(|b| pick(*b)) {
        return Some(Arc::new(*b));
    }
    registry()
        .read()
        .expect("codec registry poisoned")
        .iter()
        .find(|c| pick(c.as_ref()))
        .cloned()
}

fn by_extension(path: &Path) -> Option<Arc<dyn CompressionCodec>> {
    let name = path.file_name()?.to_string_lossy().to_lowercase();
    find_codec(|c| c.extensions().iter().any(|ext| name.ends_with(ext)))
}

fn by_magic(head: &[u8]) -> Option<Arc<dyn CompressionCodec>> {
    if head.is_empty() {
        return None;
    }
    find_codec(|c| c.magic_bytes().is_some_and(|m| !m.is_empty() && head.starts_with(m)))
}

/// Wrap `reader` in the decoder for its format, or pass it through unchanged.
///
/// `path_hint` is only used for its extension.
///
/// # Errors
/// Returns an error if the leading bytes cannot be read or the decoder fails
/// to initialize.
pub fn auto_detect_reader<R: Read + Send + 'static>(
    reader: R,
    path_hint: impl AsRef<Path>,
) -> Result<DynRead> {
    if let Some(codec) = by_extension(path_hint.as_ref()) {
        return codec
            .wrap_reader_dyn(Box::new(reader))
            .with_context(|| format!("init {} decoder", codec.name()));
    }

    let mut peek = BufReader::new(reader);
    let head = peek.fill_buf().context("read leading bytes")?;
    match by_magic(head) {
        Some(codec) => codec
            .wrap_reader_dyn(Box::new(peek))
            .with_context(|| format!("init {} decoder", codec.name())),
        None => Ok(Box::new(peek)),
    }
}
