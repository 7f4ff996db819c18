use std::io::{self, BufWriter, Read, Write};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use std::thread::JoinHandle;

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder as _, ImageError, RgbaImage};

/// Encode `image` as PNG into `writer` on a background thread.
///
/// The writer is dropped (closing the pipe) when encoding finishes or fails. If the reader
/// goes away the write fails with `BrokenPipe`, so the thread always terminates.
pub fn spawn_png_writer<W>(image: Arc<RgbaImage>, writer: W) -> JoinHandle<io::Result<()>>
where
    W: Write + Send + 'static,
{
    std::thread::spawn(move || write_png(&image, writer))
}

/// Encode `image` as PNG into `writer`.
///
/// IO failures keep their kind, so a reader that went away shows up as `BrokenPipe`.
pub fn write_png<W: Write>(image: &RgbaImage, writer: W) -> io::Result<()> {
    let mut out = KindTracking::new(BufWriter::new(writer));
    let encoded = PngEncoder::new(&mut out).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ExtendedColorType::Rgba8,
    );
    encoded.map_err(|e| match out.failed {
        Some(kind) => io::Error::new(kind, e),
        None => image_to_io(e),
    })?;
    out.flush()
}

fn image_to_io(e: ImageError) -> io::Error {
    match e {
        ImageError::IoError(io) => io,
        other => io::Error::other(other),
    }
}

/// Remembers the kind of the first failed write. The PNG encoder rewraps IO errors as
/// `Other`, which would hide a closed reader.
struct KindTracking<W> {
    inner: W,
    failed: Option<io::ErrorKind>,
}

impl<W: Write> KindTracking<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            failed: None,
        }
    }

    fn track<T>(&mut self, r: io::Result<T>) -> io::Result<T> {
        match &r {
            Err(e) if e.kind() != io::ErrorKind::Interrupted => {
                self.failed.get_or_insert(e.kind());
            }
            _ => {}
        }
        r
    }
}

impl<W: Write> Write for KindTracking<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let r = self.inner.write(buf);
        self.track(r)
    }

    fn flush(&mut self) -> io::Result<()> {
        let r = self.inner.flush();
        self.track(r)
    }
}

const CHUNK: usize = 64 * 1024;

enum Msg {
    Data(Vec<u8>),
    Eof,
    Fail(io::Error),
}

/// In-process pipe with bounded buffering.
///
/// The writer must end the stream explicitly: [`ChannelWriter::close`] for success or
/// [`ChannelWriter::close_with_error`] for failure. A writer dropped any other way makes the
/// reader fail instead of seeing a clean end of stream.
pub fn channel_pipe(capacity: usize) -> (ChannelWriter, ChannelReader) {
    let (tx, rx) = std::sync::mpsc::sync_channel(capacity.max(1));
    (
        ChannelWriter {
            tx: Some(tx),
            buf: Vec::with_capacity(CHUNK),
        },
        ChannelReader {
            rx,
            chunk: Vec::new(),
            pos: 0,
            end: None,
        },
    )
}

/// Write half of [`channel_pipe`].
pub struct ChannelWriter {
    tx: Option<SyncSender<Msg>>,
    buf: Vec<u8>,
}

impl ChannelWriter {
    fn send(&mut self, msg: Msg) -> io::Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "pipe already closed"))?;
        tx.send(msg)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader went away"))
    }

    fn push_buffered(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let data = std::mem::replace(&mut self.buf, Vec::with_capacity(CHUNK));
        self.send(Msg::Data(data))
    }

    /// Flush and signal a clean end of stream.
    pub fn close(mut self) -> io::Result<()> {
        self.push_buffered()?;
        self.send(Msg::Eof)?;
        self.tx = None;
        Ok(())
    }

    /// Discard buffered data and make the reader fail with `err`.
    pub fn close_with_error(mut self, err: io::Error) {
        self.buf.clear();
        if let Some(tx) = self.tx.take() {
            // A gone reader needs no error.
            let _ = tx.send(Msg::Fail(err));
        }
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.tx.is_none() {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "pipe already closed",
            ));
        }
        self.buf.extend_from_slice(data);
        if self.buf.len() >= CHUNK {
            self.push_buffered()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.push_buffered()
    }
}

impl Drop for ChannelWriter {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let err = io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "pipe writer dropped without closing",
            );
            match tx.try_send(Msg::Fail(err)) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => {}
                // Full: disconnecting is enough, the reader reports the missing end marker.
                Err(TrySendError::Full(_)) => {}
            }
        }
    }
}

/// Read half of [`channel_pipe`].
pub struct ChannelReader {
    rx: Receiver<Msg>,
    chunk: Vec<u8>,
    pos: usize,
    end: Option<Result<(), (io::ErrorKind, String)>>,
}

impl Read for ChannelReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        loop {
            if self.pos < self.chunk.len() {
                let n = out.len().min(self.chunk.len() - self.pos);
                out[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            match &self.end {
                Some(Ok(())) => return Ok(0),
                Some(Err((kind, msg))) => return Err(io::Error::new(*kind, msg.clone())),
                None => {}
            }
            let next = match self.rx.recv() {
                Ok(msg) => msg,
                Err(_) => Msg::Fail(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "pipe writer went away without closing",
                )),
            };
            match next {
                Msg::Data(data) => {
                    self.chunk = data;
                    self.pos = 0;
                }
                Msg::Eof => self.end = Some(Ok(())),
                Msg::Fail(e) => self.end = Some(Err((e.kind(), e.to_string()))),
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/bridge/pipe.rs"]
mod tests;
