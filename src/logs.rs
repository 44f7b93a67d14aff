//! Per-day service log files.
use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufRead, BufReader, Read, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    thread,
};

use chrono::{Local, NaiveDate};
use tracing::{info, warn};

/// Returns `<log_dir>/<service>-<YYYY-MM-DD>.log`.
pub fn log_path_for(log_dir: &Path, service_name: &str, date: NaiveDate) -> PathBuf {
    log_dir.join(format!("{}-{}.log", service_name, date.format("%Y-%m-%d")))
}

/// Today's log path for a service.
pub fn resolve_log_path(log_dir: &Path, service_name: &str) -> PathBuf {
    log_path_for(log_dir, service_name, Local::now().date_naive())
}

/// Append-only log file shared by the stdout and stderr pumps of one process.
///
/// Closing the log drops the file handle; pumps that are still draining a
/// dying process keep mirroring to the console but stop writing to disk.
#[derive(Debug, Clone)]
pub struct ServiceLog {
    path: PathBuf,
    file: Arc<Mutex<Option<File>>>,
}

impl ServiceLog {
    /// Opens (creating if needed) today's log for `service_name`.
    pub fn open(log_dir: &Path, service_name: &str) -> io::Result<Self> {
        fs::create_dir_all(log_dir)?;
        let path = resolve_log_path(log_dir, service_name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            file: Arc::new(Mutex::new(Some(file))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one timestamped line tagged with its stream.
    pub fn write_line(&self, stream: &str, line: &str) {
        let mut guard = self.file.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(file) = guard.as_mut() {
            let stamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
            if let Err(err) = writeln!(file, "[{stamp}] [{stream}] {line}") {
                warn!("Failed to write to {}: {err}", self.path.display());
            }
        }
    }

    /// Closes the file. Safe to call repeatedly.
    pub fn close(&self) {
        let mut guard = self.file.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(mut file) = guard.take() {
            let _ = file.flush();
        }
    }

    pub fn is_open(&self) -> bool {
        self.file
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }
}

/// Spawns a thread copying `reader` line by line into `log` and the console.
///
/// Lines are decoded lossily and the pipe is drained until EOF, so a child
/// writing invalid UTF-8 never sees its output pipe closed.
pub fn spawn_log_writer<R>(
    service_name: &str,
    reader: R,
    stream: &'static str,
    log: ServiceLog,
) -> thread::JoinHandle<()>
where
    R: Read + Send + 'static,
{
    let service = service_name.to_string();
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let line = decode_line(&buf);
                    if stream == "stderr" {
                        warn!(service = %service, "{line}");
                    } else {
                        info!(service = %service, "{line}");
                    }
                    log.write_line(stream, &line);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(service = %service, "Stopped reading {stream}: {err}");
                    break;
                }
            }
        }
    })
}

fn decode_line(raw: &[u8]) -> String {
    let trimmed = raw.strip_suffix(b"\n").unwrap_or(raw);
    let trimmed = trimmed.strip_suffix(b"\r").unwrap_or(trimmed);
    String::from_utf8_lossy(trimmed).into_owned()
}

/// Prints the last `lines` lines of today's log for a service.
pub fn show_logs(log_dir: &Path, service_name: &str, lines: usize) -> io::Result<()> {
    let log_path = resolve_log_path(log_dir, service_name);

    if !log_path.exists() {
        eprintln!(
            "No log for service '{}' today ({})",
            service_name,
            log_path.display()
        );
        return Ok(());
    }

    for line in tail_lines(&log_path, lines)? {
        println!("{}", line);
    }

    Ok(())
}

/// Reads the last `lines` lines of a file.
pub fn tail_lines(path: &Path, lines: usize) -> io::Result<Vec<String>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let all_lines: Vec<String> = reader.lines().map_while(Result::ok).collect();

    let start = all_lines.len().saturating_sub(lines);
    Ok(all_lines[start..].to_vec())
}
