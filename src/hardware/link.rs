use anyhow::{anyhow, Context, Result};
use std::{
    io::{self, BufRead, BufReader, Read, Write},
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use super::{discovery::discover_port, HardwareCommand};
use crate::settings::Settings;

const ENABLE_LOGS: bool = true;
const LOG_TAG: &str = "hardware";

use crate::{log_error, log_info, log_warn};

const READ_TIMEOUT: Duration = Duration::from_millis(100);
/// Back-off after a hard read error (e.g. cable pulled) so the log isn't flooded.
const ERROR_BACKOFF_POLLS: u32 = 20;

type CommandSlot = Arc<Mutex<Option<HardwareCommand>>>;
type Writer = Box<dyn Write + Send>;

/// Serial bridge to the desk display/button board.
///
/// A reader thread keeps only the most recent command: a command nobody polled for is
/// overwritten by the next one. Without a device every call is a silent no-op.
pub struct HardwareLink {
    latest: CommandSlot,
    writer: Mutex<Option<Writer>>,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl HardwareLink {
    /// Finds and opens the board, or falls back to "no hardware" mode. Blocks for the
    /// configured settle time after opening, since the board resets on connect.
    pub fn connect(settings: &Settings) -> Self {
        let port = settings
            .serial_port
            .as_ref()
            .map(PathBuf::from)
            .or_else(discover_port);

        let Some(port) = port else {
            log_info!("no serial device found; running without hardware");
            return Self::disconnected();
        };

        match open_port(&port, settings.serial_baud) {
            Ok((reader, writer)) => {
                thread::sleep(Duration::from_millis(settings.serial_settle_ms));
                log_info!("connected on {}", port.display());
                Self::from_transport(
                    reader,
                    writer,
                    Duration::from_millis(settings.serial_poll_ms),
                )
            }
            Err(err) => {
                log_error!("failed to open {}: {err:#}", port.display());
                Self::disconnected()
            }
        }
    }

    pub fn disconnected() -> Self {
        Self {
            latest: Arc::new(Mutex::new(None)),
            writer: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            reader: None,
        }
    }

    /// Runs the link over an arbitrary byte transport.
    pub fn from_transport(
        reader: Box<dyn Read + Send>,
        writer: Writer,
        poll_interval: Duration,
    ) -> Self {
        let latest: CommandSlot = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));

        let handle = thread::Builder::new()
            .name("hardware-reader".to_string())
            .spawn({
                let latest = Arc::clone(&latest);
                let running = Arc::clone(&running);
                move || read_loop(reader, latest, running, poll_interval)
            });

        let reader = match handle {
            Ok(handle) => Some(handle),
            Err(err) => {
                log_error!("failed to start reader thread: {err}");
                running.store(false, Ordering::SeqCst);
                None
            }
        };

        Self {
            latest,
            writer: Mutex::new(Some(writer)),
            running,
            reader,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.writer.lock().map(|w| w.is_some()).unwrap_or(false)
    }

    /// Takes the pending command, if any.
    pub fn get_command(&self) -> Option<HardwareCommand> {
        self.latest.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Writes `SCORE:<n>|MODE:<mode>|RUN:<0|1>|NOTIF:<text>\n`. Failures are logged only.
    pub fn send_status(&self, score: u8, mode: &str, running: bool, notification: &str) {
        let Ok(mut guard) = self.writer.lock() else {
            return;
        };
        let Some(writer) = guard.as_mut() else {
            return;
        };

        let line = status_line(score, mode, running, notification);
        if let Err(err) = writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.flush())
        {
            log_warn!("status write failed: {err}");
        }
    }

    /// Stops the reader thread and closes the transport. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                log_error!("reader thread panicked");
            }
        }
        if let Ok(mut writer) = self.writer.lock() {
            if writer.take().is_some() {
                log_info!("serial link closed");
            }
        }
    }
}

impl Drop for HardwareLink {
    fn drop(&mut self) {
        self.stop();
    }
}

pub fn status_line(score: u8, mode: &str, running: bool, notification: &str) -> String {
    format!(
        "SCORE:{}|MODE:{}|RUN:{}|NOTIF:{}\n",
        score.min(100),
        mode,
        u8::from(running),
        notification
    )
}

fn read_loop(
    reader: Box<dyn Read + Send>,
    latest: CommandSlot,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
) {
    let mut reader = BufReader::new(reader);
    let mut pending: Vec<u8> = Vec::new();

    while running.load(Ordering::SeqCst) {
        match reader.read_until(b'\n', &mut pending) {
            Ok(0) => thread::sleep(poll_interval),
            Ok(_) if pending.ends_with(b"\n") => {
                let line = String::from_utf8_lossy(&pending).into_owned();
                pending.clear();
                match HardwareCommand::parse(&line) {
                    Some(command) => {
                        log_info!("received {command:?}");
                        if let Ok(mut slot) = latest.lock() {
                            *slot = Some(command);
                        }
                    }
                    None if line.trim().len() > 2 => {
                        log_warn!("ignoring unrecognised line {:?}", line.trim())
                    }
                    None => {}
                }
            }
            // Partial line; the rest arrives on a later read.
            Ok(_) => {}
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                thread::sleep(poll_interval)
            }
            Err(err) => {
                log_error!("read error: {err}");
                pending.clear();
                thread::sleep(poll_interval * ERROR_BACKOFF_POLLS);
            }
        }
    }
    log_info!("reader stopped");
}

/// `serialport` hands out one trait object that is both `Read` and `Write`; this wraps a
/// handle so it can be boxed as either.
struct PortIo(Box<dyn serialport::SerialPort>);

impl Read for PortIo {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for PortIo {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

fn open_port(path: &std::path::Path, baud: u32) -> Result<(Box<dyn Read + Send>, Writer)> {
    let name = path
        .to_str()
        .ok_or_else(|| anyhow!("serial path {} is not UTF-8", path.display()))?;
    let port = serialport::new(name, baud)
        .timeout(READ_TIMEOUT)
        .open()
        .with_context(|| format!("cannot open {name}"))?;
    let reader = port.try_clone().context("cannot clone serial handle")?;
    Ok((Box::new(PortIo(reader)), Box::new(PortIo(port))))
}
