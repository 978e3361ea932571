use anyhow::Result;
use ironshard::io::compression::{CompressionCodec, register_codec};
use ironshard::{Element, RecordReader, open_input};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

const DOC: &[u8] = br#"<root><item id="1">a</item><item id="2">b</item><item id="3">c</item></root>"#;

fn ids(path: &Path) -> Result<Vec<String>> {
    let records: Vec<Element> = RecordReader::new(open_input(path)?, "item").collect::<Result<_>>()?;
    Ok(records
        .iter()
        .map(|e| e.attr("id").unwrap_or_default().to_string())
        .collect())
}

#[test]
fn plain_input_passes_through() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("plain.xml");
    std::fs::write(&path, DOC)?;
    assert_eq!(ids(&path)?, vec!["1", "2", "3"]);
    Ok(())
}

#[cfg(feature = "compression-zstd")]
#[test]
fn zstd_input() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("doc.xml.zst");
    std::fs::write(&path, zstd::stream::encode_all(DOC, 3)?)?;
    assert_eq!(ids(&path)?, vec!["1", "2", "3"]);
    Ok(())
}

#[cfg(feature = "compression-bzip2")]
#[test]
fn bzip2_input_detected_by_magic() -> Result<()> {
    use std::io::Write;
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("doc.bin");
    let mut enc = bzip2::write::BzEncoder::new(std::fs::File::create(&path)?, bzip2::Compression::default());
    enc.write_all(DOC)?;
    enc.finish()?;
    assert_eq!(ids(&path)?, vec!["1", "2", "3"]);
    Ok(())
}

#[cfg(feature = "compression-xz")]
#[test]
fn xz_input() -> Result<()> {
    use std::io::Write;
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("doc.xml.xz");
    let mut enc = xz2::write::XzEncoder::new(std::fs::File::create(&path)?, 6);
    enc.write_all(DOC)?;
    enc.finish()?;
    assert_eq!(ids(&path)?, vec!["1", "2", "3"]);
    Ok(())
}

#[cfg(feature = "compression-gzip")]
#[test]
fn concatenated_gzip_members_decode_fully() -> Result<()> {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("doc.xml.gz");
    let (head, tail) = DOC.split_at(DOC.len() / 2);
    let mut bytes = Vec::new();
    for part in [head, tail] {
        let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
        enc.write_all(part)?;
        bytes.extend(enc.finish()?);
    }
    std::fs::write(&path, bytes)?;
    assert_eq!(ids(&path)?, vec!["1", "2", "3"]);
    Ok(())
}

/// Flips every byte; stands in for a proprietary export format.
struct InvertCodec;

struct Invert(Box<dyn Read + Send>);

impl Read for Invert {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.0.read(buf)?;
        for b in &mut buf[..n] {
            *b = !*b;
        }
        Ok(n)
    }
}

impl CompressionCodec for InvertCodec {
    fn name(&self) -> &str {
        "invert"
    }

    fn extensions(&self) -> &[&str] {
        &[".inv"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        None
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read + Send>) -> std::io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(Invert(reader)))
    }
}

#[test]
fn custom_codec_by_extension() -> Result<()> {
    register_codec(Arc::new(InvertCodec));
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("doc.xml.inv");
    std::fs::write(&path, DOC.iter().map(|b| !b).collect::<Vec<u8>>())?;
    assert_eq!(ids(&path)?, vec!["1", "2", "3"]);
    Ok(())
}
