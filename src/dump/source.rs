use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use bzip2::read::MultiBzDecoder;
use indicatif::ProgressBar;
use tracing::debug;

const READ_BUFFER: usize = 256 * 1024;

/// Decompressed byte stream of a dump file.
pub type DumpSource = Box<dyn BufRead + Send>;

/// Open a dump file for streaming. Files ending in `.bz2` are decompressed on the
/// fly (multi-stream, as Wikimedia publishes them). With a progress bar, the bar
/// tracks bytes consumed from the file on disk.
pub fn open_source(path: &Path, progress: Option<ProgressBar>) -> io::Result<DumpSource> {
    let file = File::open(path)?;
    let on_disk = file.metadata()?.len();

    let raw: Box<dyn Read + Send> = match progress {
        Some(pb) => {
            pb.set_length(on_disk);
            Box::new(ProgressReader::new(file, pb))
        }
        None => Box::new(file),
    };

    if is_bzip2(path) {
        debug!(path = %path.display(), bytes = on_disk, "opening bzip2 dump");
        let decoder = MultiBzDecoder::new(BufReader::with_capacity(READ_BUFFER, raw));
        Ok(Box::new(BufReader::with_capacity(READ_BUFFER, decoder)))
    } else {
        debug!(path = %path.display(), bytes = on_disk, "opening xml dump");
        Ok(Box::new(BufReader::with_capacity(READ_BUFFER, raw)))
    }
}

fn is_bzip2(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("bz2"))
}

/// Counts bytes read from the inner reader into a progress bar.
struct ProgressReader<R: Read> {
    inner: R,
    bar: ProgressBar,
}

impl<R: Read> ProgressReader<R> {
    fn new(inner: R, bar: ProgressBar) -> Self {
        ProgressReader { inner, bar }
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bar.inc(n as u64);
        Ok(n)
    }
}
