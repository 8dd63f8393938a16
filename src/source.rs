//! Where frames come from: the detector's JSON-lines stream, optionally
//! decoupled through a single latest-wins slot.

use anyhow::{Result, bail};
use directories::UserDirs;
use log::{error, info, warn};
use std::{
    collections::VecDeque,
    fs,
    io::{self, BufRead, BufReader},
    os::unix::net::{UnixListener, UnixStream},
    path::{Path, PathBuf},
    sync::{
        Arc, Condvar, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use crate::error::FrameError;
use crate::hand::{Frame, WireFrame};

/// Outcome of one poll of a source.
#[derive(Debug)]
pub enum Next {
    Frame(Frame),
    /// The detector sent something that breaks the frame contract.
    Rejected(FrameError),
    /// Nothing arrived within the poll interval.
    Idle,
    /// The stream is finished.
    Eof,
}

pub trait LandmarkSource {
    fn next_frame(&mut self) -> Result<Next>;

    /// Frames discarded before they could be served.
    fn dropped(&self) -> u64 {
        0
    }
}

impl<S: LandmarkSource + ?Sized> LandmarkSource for Box<S> {
    fn next_frame(&mut self) -> Result<Next> {
        (**self).next_frame()
    }

    fn dropped(&self) -> u64 {
        (**self).dropped()
    }
}

pub fn decode_line(line: &str) -> Result<Frame, FrameError> {
    let wire: WireFrame =
        serde_json::from_str(line).map_err(|e| FrameError::Decode(e.to_string()))?;
    Frame::try_from(wire)
}

/// One JSON frame per line from any buffered reader.
pub struct JsonLines<R> {
    reader: R,
    line: Vec<u8>,
}

impl<R: BufRead> JsonLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
        }
    }
}

impl<R: BufRead> LandmarkSource for JsonLines<R> {
    fn next_frame(&mut self) -> Result<Next> {
        loop {
            // a timed-out read keeps its partial line in `self.line`
            match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) if self.line.is_empty() => return Ok(Next::Eof),
                // final line without a newline
                Ok(0) => {}
                Ok(_) if !self.line.ends_with(b"\n") => continue,
                Ok(_) => {}
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    return Ok(Next::Idle);
                }
                Err(e) => return Err(e.into()),
            }
            let bytes = std::mem::take(&mut self.line);
            let line = match String::from_utf8(bytes) {
                Ok(l) => l,
                Err(e) => return Ok(Next::Rejected(FrameError::Decode(e.to_string()))),
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Ok(match decode_line(trimmed) {
                Ok(f) => Next::Frame(f),
                Err(e) => Next::Rejected(e),
            });
        }
    }
}

pub fn default_socket_path() -> Result<PathBuf> {
    let home = UserDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?
        .home_dir()
        .to_path_buf();
    let dir = home.join(".local").join("run");
    fs::create_dir_all(&dir)?;
    Ok(dir.join("handctl.sock"))
}

/// Accepts one detector connection at a time on a Unix socket. When the
/// detector hangs up the source goes back to waiting for the next one.
pub struct SocketSource {
    listener: UnixListener,
    conn: Option<JsonLines<BufReader<UnixStream>>>,
    poll: Duration,
}

impl SocketSource {
    /// Binds `path`, replacing a stale socket file. Refuses when another
    /// process still accepts connections there.
    pub fn bind(path: &Path, poll: Duration) -> Result<Self> {
        if path.exists() {
            if UnixStream::connect(path).is_ok() {
                bail!("{} is in use by another listener", path.display());
            }
            fs::remove_file(path)?;
        }
        let listener = UnixListener::bind(path)?;
        listener.set_nonblocking(true)?;
        info!("listening for detector frames on {}", path.display());
        Ok(Self {
            listener,
            conn: None,
            poll,
        })
    }
}

impl LandmarkSource for SocketSource {
    fn next_frame(&mut self) -> Result<Next> {
        let Some(conn) = self.conn.as_mut() else {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    stream.set_nonblocking(false)?;
                    stream.set_read_timeout(Some(self.poll))?;
                    info!("detector connected");
                    self.conn = Some(JsonLines::new(BufReader::new(stream)));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(self.poll),
                Err(e) => return Err(e.into()),
            }
            return Ok(Next::Idle);
        };
        match conn.next_frame() {
            Ok(Next::Eof) => {
                info!("detector disconnected");
                self.conn = None;
                Ok(Next::Idle)
            }
            Err(e) => {
                warn!("detector connection dropped: {e}");
                self.conn = None;
                Ok(Next::Idle)
            }
            other => other,
        }
    }
}

/// Rejections waiting beyond this are dropped like stale frames.
const REJECT_BACKLOG: usize = 32;

#[derive(Debug, Default)]
struct SlotState {
    frame: Option<Frame>,
    rejects: VecDeque<FrameError>,
    closed: bool,
    dropped: u64,
}

impl SlotState {
    fn is_empty(&self) -> bool {
        self.frame.is_none() && self.rejects.is_empty()
    }
}

/// Single-slot hand-off where a newer frame replaces an unread one.
/// Rejections queue up so the consumer can count them.
#[derive(Debug, Default)]
pub struct FrameSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl FrameSlot {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn put(&self, frame: Frame) {
        let mut st = self.lock();
        if st.frame.replace(frame).is_some() {
            st.dropped += 1;
        }
        self.ready.notify_one();
    }

    pub fn reject(&self, err: FrameError) {
        let mut st = self.lock();
        if st.rejects.len() >= REJECT_BACKLOG {
            st.rejects.pop_front();
            st.dropped += 1;
        }
        st.rejects.push_back(err);
        self.ready.notify_one();
    }

    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    /// Waits up to `timeout` for a frame. Queued rejections come out first,
    /// and pending items are still handed out after `close`.
    pub fn take(&self, timeout: Duration) -> Next {
        let st = self.lock();
        let (mut st, _) = self
            .ready
            .wait_timeout_while(st, timeout, |s| s.is_empty() && !s.closed)
            .unwrap_or_else(|p| p.into_inner());
        if let Some(e) = st.rejects.pop_front() {
            return Next::Rejected(e);
        }
        match st.frame.take() {
            Some(f) => Next::Frame(f),
            None if st.closed => Next::Eof,
            None => Next::Idle,
        }
    }

    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}

/// Runs another source on a reader thread and serves only its newest frame.
pub struct LatestFrame {
    slot: Arc<FrameSlot>,
    poll: Duration,
    _reader: thread::JoinHandle<()>,
}

impl LatestFrame {
    pub fn spawn<S>(mut inner: S, stop: Arc<AtomicBool>, poll: Duration) -> Self
    where
        S: LandmarkSource + Send + 'static,
    {
        let slot = Arc::new(FrameSlot::default());
        let tx = Arc::clone(&slot);
        let handle = thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                match inner.next_frame() {
                    Ok(Next::Frame(f)) => tx.put(f),
                    Ok(Next::Rejected(e)) => tx.reject(e),
                    Ok(Next::Idle) => {}
                    Ok(Next::Eof) => break,
                    Err(e) => {
                        error!("frame reader failed: {e}");
                        break;
                    }
                }
            }
            tx.close();
        });
        Self {
            slot,
            poll,
            _reader: handle,
        }
    }
}

impl LandmarkSource for LatestFrame {
    fn next_frame(&mut self) -> Result<Next> {
        Ok(self.slot.take(self.poll))
    }

    fn dropped(&self) -> u64 {
        self.slot.dropped()
    }
}
