//! Common, IO-related code.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use flate2::{bufread::MultiGzDecoder, write::GzEncoder, Compression};

/// Whether `path` has the `.gz` extension.
fn is_gz<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref().extension().map(|s| s.to_str()) == Some(Some("gz"))
}

/// Transparently open a file with gzip decoder.
pub fn open_read_maybe_gz<P>(path: P) -> Result<Box<dyn BufRead>, anyhow::Error>
where
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())
        .map_err(|e| anyhow::anyhow!("problem opening {:?}: {}", path.as_ref(), e))?;
    if is_gz(&path) {
        tracing::trace!("Opening {:?} as gzip for reading", path.as_ref());
        let bufreader = BufReader::new(file);
        let decoder = MultiGzDecoder::new(bufreader);
        Ok(Box::new(BufReader::new(decoder)))
    } else {
        tracing::trace!("Opening {:?} as plain text for reading", path.as_ref());
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Transparently open a file with gzip encoder.
pub fn open_write_maybe_gz<P>(path: P) -> Result<Box<dyn Write>, anyhow::Error>
where
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())
        .map_err(|e| anyhow::anyhow!("problem creating {:?}: {}", path.as_ref(), e))?;
    if is_gz(&path) {
        tracing::trace!("Opening {:?} as gzip for writing", path.as_ref());
        let bufwriter = BufWriter::new(file);
        let encoder = GzEncoder::new(bufwriter, Compression::default());
        Ok(Box::new(encoder))
    } else {
        tracing::trace!("Opening {:?} as plain text for writing", path.as_ref());
        Ok(Box::new(BufWriter::new(file)))
    }
}
