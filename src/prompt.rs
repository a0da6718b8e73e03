use std::io::BufRead;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use crate::cancel::CancelFlag;

/// Granularity at which a waiting prompt notices cancellation.
const POLL_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadLine {
    Line(String),
    Eof,
    TimedOut,
    Cancelled,
}

pub trait LineSource {
    fn read_line(&mut self) -> ReadLine;
}

/// Reads directly from a `BufRead`; blocks without timeout.
pub struct BlockingLines<R> {
    reader: R,
}

impl<R: BufRead> BlockingLines<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> LineSource for BlockingLines<R> {
    fn read_line(&mut self) -> ReadLine {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => ReadLine::Eof,
            Ok(_) => ReadLine::Line(line),
            Err(err) => {
                tracing::warn!("reading answer failed: {err}");
                ReadLine::Eof
            }
        }
    }
}

/// Lines forwarded from a reader thread, so a prompt can time out or be
/// cancelled while the thread stays blocked on input.
pub struct ChannelLines {
    rx: mpsc::Receiver<Option<String>>,
    timeout: Option<Duration>,
    cancel: CancelFlag,
    closed: bool,
    stale: bool,
}

impl ChannelLines {
    pub fn spawn<R>(reader: R, timeout: Option<Duration>, cancel: CancelFlag) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let mut reader = reader;
            loop {
                let mut line = String::new();
                let next = match reader.read_line(&mut line) {
                    Ok(0) => None,
                    Ok(_) => Some(line),
                    Err(err) => {
                        tracing::warn!("input reader stopped: {err}");
                        None
                    }
                };
                let done = next.is_none();
                if tx.send(next).is_err() || done {
                    break;
                }
            }
        });

        Self {
            rx,
            timeout,
            cancel,
            closed: false,
            stale: false,
        }
    }

    /// After a timeout, anything typed late belongs to the previous question.
    fn drain_stale(&mut self) {
        if !self.stale {
            return;
        }
        self.stale = false;

        while let Ok(next) = self.rx.try_recv() {
            match next {
                Some(line) => tracing::debug!("discarding late answer {:?}", line.trim()),
                None => {
                    self.closed = true;
                    break;
                }
            }
        }
    }
}

impl LineSource for ChannelLines {
    fn read_line(&mut self) -> ReadLine {
        self.drain_stale();
        if self.closed {
            return ReadLine::Eof;
        }

        let deadline = self.timeout.map(|t| Instant::now() + t);
        loop {
            if self.cancel.is_cancelled() {
                return ReadLine::Cancelled;
            }

            let slice = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        self.stale = true;
                        return ReadLine::TimedOut;
                    }
                    left.min(POLL_SLICE)
                }
                None => POLL_SLICE,
            };

            match self.rx.recv_timeout(slice) {
                Ok(Some(line)) => return ReadLine::Line(line),
                Ok(None) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                    self.closed = true;
                    return ReadLine::Eof;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// A reader that never produces a line.
    struct Stalled;

    impl std::io::Read for Stalled {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            thread::sleep(Duration::from_secs(3600));
            Ok(0)
        }
    }

    #[test]
    fn test_blocking_lines_then_eof() {
        let mut lines = BlockingLines::new(Cursor::new("y\n n \n"));
        assert_eq!(lines.read_line(), ReadLine::Line("y\n".into()));
        assert_eq!(lines.read_line(), ReadLine::Line(" n \n".into()));
        assert_eq!(lines.read_line(), ReadLine::Eof);
        assert_eq!(lines.read_line(), ReadLine::Eof);
    }

    #[test]
    fn test_channel_lines_forward_in_order() {
        let mut lines = ChannelLines::spawn(Cursor::new("y\nn"), None, CancelFlag::new());
        assert_eq!(lines.read_line(), ReadLine::Line("y\n".into()));
        assert_eq!(lines.read_line(), ReadLine::Line("n".into()));
        assert_eq!(lines.read_line(), ReadLine::Eof);
        assert_eq!(lines.read_line(), ReadLine::Eof);
    }

    #[test]
    fn test_channel_lines_time_out() {
        let reader = std::io::BufReader::new(Stalled);
        let mut lines =
            ChannelLines::spawn(reader, Some(Duration::from_millis(50)), CancelFlag::new());
        assert_eq!(lines.read_line(), ReadLine::TimedOut);
    }

    #[test]
    fn test_channel_lines_notice_cancel() {
        let cancel = CancelFlag::new();
        let reader = std::io::BufReader::new(Stalled);
        let mut lines = ChannelLines::spawn(reader, None, cancel.clone());
        cancel.cancel();
        assert_eq!(lines.read_line(), ReadLine::Cancelled);
    }
}
