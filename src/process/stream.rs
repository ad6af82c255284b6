//! Bodies of the writer and drain tasks.

use std::io::{self, BufRead, BufReader, ErrorKind, Read, Write};

use tracing::debug;

use super::command::LineSink;

/// What a drain task hands back when its stream closes.
#[derive(Debug, Default)]
pub(crate) struct Drained {
    /// Raw bytes in arrival order: one chunk per line with a sink, one bulk
    /// chunk without.
    pub chunks: Vec<Vec<u8>>,
    /// Read failure that ended the drain early.
    pub error: Option<io::Error>,
}

/// Read `reader` to EOF.
pub(crate) fn drain<R: Read>(reader: R, sink: Option<LineSink>) -> Drained {
    match sink {
        Some(sink) => drain_lines(reader, sink.as_ref()),
        None => drain_bulk(reader),
    }
}

fn drain_lines<R: Read>(reader: R, sink: &(dyn Fn(&str) + Send + Sync)) -> Drained {
    let mut reader = BufReader::new(reader);
    let mut drained = Drained::default();

    loop {
        let mut line = Vec::new();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {
                sink(&decode_line(&line));
                drained.chunks.push(line);
            }
            Err(e) => {
                if !line.is_empty() {
                    drained.chunks.push(line);
                }
                drained.error = Some(e);
                break;
            }
        }
    }

    drained
}

fn drain_bulk<R: Read>(mut reader: R) -> Drained {
    let mut buf = Vec::new();
    let error = reader.read_to_end(&mut buf).err();
    Drained {
        chunks: vec![buf],
        error,
    }
}

/// Lossy decode with only the trailing line terminator removed.
pub(crate) fn decode_line(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

/// Join, decode lossily and right-trim captured chunks.
pub(crate) fn finalize(chunks: Vec<Vec<u8>>) -> String {
    let bytes = chunks.concat();
    String::from_utf8_lossy(&bytes).trim_end().to_string()
}

/// Write `data` and close the stream. A reader that went away early is fine.
pub(crate) fn feed<W: Write>(mut writer: W, data: &[u8]) -> io::Result<()> {
    let result = writer.write_all(data).and_then(|()| writer.flush());
    drop(writer);
    match result {
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {
            debug!(bytes = data.len(), "child closed stdin before consuming all input");
            Ok(())
        }
        other => other,
    }
}
