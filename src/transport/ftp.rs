use crate::{MirrorError, Result};
use crate::scanner::join_path;
use crate::transport::{EntryKind, RemoteEntry, Transport};
use chrono::{DateTime, Datelike, Utc};
use std::io::Write;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use suppaftp::list::File as ListLine;
use suppaftp::native_tls::TlsConnector;
use suppaftp::types::{Features, FileType, Mode};
use suppaftp::{FtpError, FtpResult, NativeTlsConnector, NativeTlsFtpStream};
use tracing::debug;

pub const DEFAULT_PORT: u16 = 21;

/// LIST dates further ahead than this are taken to belong to last year.
const CLOCK_SKEW: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    /// Upgrade the control connection with AUTH TLS (ftps://)
    pub secure: bool,
    pub user: String,
    pub password: String,
    /// Applied to connect and to every read/write on the control and data connections
    pub timeout: Duration,
    /// Skip TLS certificate and server name verification
    pub insecure: bool,
    /// Trace FTP commands at debug level
    pub debug: bool,
}

/// A logged-in FTP session. The session is closed with QUIT on drop.
pub struct FtpConnection {
    stream: NativeTlsFtpStream,
    /// Server advertised MLST, so directories are read with MLSD
    mlsd: bool,
    /// Server advertised MDTM, used to sharpen LIST timestamps
    mdtm: bool,
    debug: bool,
}

impl FtpConnection {
    pub fn connect(config: &FtpConfig) -> Result<Self> {
        let addr = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|e| MirrorError::Connection(format!("Cannot resolve {}:{}: {}", config.host, config.port, e)))?
            .next()
            .ok_or_else(|| MirrorError::Connection(format!("No address for {}", config.host)))?;

        if config.debug {
            debug!("Connecting to {}:{} ({})", config.host, config.port, addr);
        }
        let tcp = TcpStream::connect_timeout(&addr, config.timeout)
            .map_err(|e| MirrorError::Connection(format!("Failed to connect to {}:{}: {}", config.host, config.port, e)))?;
        tcp.set_read_timeout(Some(config.timeout))?;
        tcp.set_write_timeout(Some(config.timeout))?;

        let timeout = config.timeout;
        let mut stream = NativeTlsFtpStream::connect_with_stream(tcp)
            .map_err(|e| MirrorError::Connection(format!("No greeting from {}:{}: {}", config.host, config.port, e)))?
            .passive_stream_builder(move |addr| data_connection(addr, timeout));

        if config.secure {
            let tls = TlsConnector::builder()
                .danger_accept_invalid_certs(config.insecure)
                .danger_accept_invalid_hostnames(config.insecure)
                .build()
                .map_err(|e| MirrorError::Connection(format!("TLS setup failed: {}", e)))?;
            stream = stream
                .into_secure(NativeTlsConnector::from(tls), &config.host)
                .map_err(|e| MirrorError::Connection(format!("AUTH TLS failed: {}", e)))?;
            if config.debug {
                debug!("Control connection secured");
            }
        }

        stream
            .login(config.user.as_str(), config.password.as_str())
            .map_err(|e| MirrorError::Authentication(format!("Login as {} failed: {}", config.user, e)))?;
        stream
            .transfer_type(FileType::Binary)
            .map_err(|e| MirrorError::Connection(format!("TYPE I failed: {}", e)))?;
        stream.set_mode(Mode::Passive);

        let features = stream.feat().unwrap_or_else(|e| {
            debug!("FEAT failed, assuming a bare server: {}", e);
            Features::default()
        });
        let mlsd = has_feature(&features, "MLST");
        let mdtm = has_feature(&features, "MDTM");
        if config.debug {
            debug!("Server features: MLSD={} MDTM={}", mlsd, mdtm);
        }

        Ok(Self { stream, mlsd, mdtm, debug: config.debug })
    }

    fn list_machine(&mut self, path: &str) -> Result<Vec<RemoteEntry>> {
        if self.debug {
            debug!("MLSD {}", path);
        }
        let lines = self.stream
            .mlsd(Some(path))
            .map_err(|e| MirrorError::listing(path, e))?;

        let mut entries = Vec::with_capacity(lines.len());
        for line in lines {
            if let Some(entry) = parse_mlsd_line(&line).map_err(|e| MirrorError::listing(path, e))? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    fn list_long(&mut self, path: &str) -> Result<Vec<RemoteEntry>> {
        if self.debug {
            debug!("LIST {}", path);
        }
        let lines = self.stream
            .list(Some(path))
            .map_err(|e| MirrorError::listing(path, e))?;

        let now = SystemTime::now();
        let mut entries = Vec::with_capacity(lines.len());
        for line in lines {
            if let Some(entry) = parse_list_line(&line, now).map_err(|e| MirrorError::listing(path, e))? {
                entries.push(entry);
            }
        }

        // LIST only carries minutes (or days); MDTM has the exact second.
        if self.mdtm {
            for entry in entries.iter_mut().filter(|e| e.kind == EntryKind::File) {
                let file = join_path(path, &entry.name);
                let modified = self.stream
                    .mdtm(&file)
                    .map_err(|e| MirrorError::listing(&file, format!("MDTM: {}", e)))?;
                entry.mod_time = modified.and_utc().into();
            }
        }
        Ok(entries)
    }
}

impl Transport for FtpConnection {
    fn list_dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>> {
        if self.mlsd {
            self.list_machine(path)
        } else {
            self.list_long(path)
        }
    }

    fn retrieve(&mut self, path: &str, sink: &mut dyn Write) -> Result<u64> {
        if self.debug {
            debug!("RETR {}", path);
        }
        let mut reader = self.stream
            .retr_as_stream(path)
            .map_err(|e| MirrorError::transfer(path, e))?;
        let bytes = std::io::copy(&mut reader, sink).map_err(|e| MirrorError::transfer(path, e))?;
        self.stream
            .finalize_retr_stream(reader)
            .map_err(|e| MirrorError::transfer(path, e))?;
        Ok(bytes)
    }
}

impl Drop for FtpConnection {
    fn drop(&mut self) {
        if let Err(e) = self.stream.quit() {
            debug!("QUIT failed: {}", e);
        }
    }
}

/// Open a passive data connection bounded by the session timeout.
fn data_connection(addr: SocketAddr, timeout: Duration) -> FtpResult<TcpStream> {
    let stream = TcpStream::connect_timeout(&addr, timeout).map_err(FtpError::ConnectionError)?;
    stream.set_read_timeout(Some(timeout)).map_err(FtpError::ConnectionError)?;
    stream.set_write_timeout(Some(timeout)).map_err(FtpError::ConnectionError)?;
    Ok(stream)
}

fn has_feature(features: &Features, name: &str) -> bool {
    features.keys().any(|k| k.eq_ignore_ascii_case(name))
}

/// Parse one MLSD line (`fact=value;...; name`). The `cdir`/`pdir` entries
/// and blank lines yield `None`.
fn parse_mlsd_line(line: &str) -> std::result::Result<Option<RemoteEntry>, String> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Ok(None);
    }
    let (facts, name) = line
        .split_once(' ')
        .ok_or_else(|| format!("unparsable MLSD line {:?}", line))?;

    let mut kind = None;
    let mut size = "0";
    let mut modify = None;
    for fact in facts.split(';') {
        let Some((key, value)) = fact.split_once('=') else { continue };
        match key.to_ascii_lowercase().as_str() {
            "type" => kind = Some(value.to_ascii_lowercase()),
            "size" => size = value,
            // Fractional seconds are dropped; the quick check compares whole seconds.
            "modify" => modify = value.split('.').next(),
            _ => {}
        }
    }

    let kind = match kind.as_deref() {
        Some("cdir") | Some("pdir") => return Ok(None),
        Some("dir") => EntryKind::Directory,
        Some("file") => EntryKind::File,
        Some(_) => EntryKind::Other,
        None => return Err(format!("MLSD line without a type fact {:?}", line)),
    };

    let (size, mod_time) = match modify {
        Some(modify) => {
            let parsed = ListLine::from_mlsx_line(&format!("size={};modify={}; {}", size, modify, name))
                .map_err(|e| format!("unparsable MLSD line {:?}: {:?}", line, e))?;
            (parsed.size() as u64, parsed.modified())
        }
        None if kind == EntryKind::File => return Err(format!("MLSD line without a modify fact {:?}", line)),
        None => (0, UNIX_EPOCH),
    };

    Ok(Some(RemoteEntry { name: name.to_string(), size, mod_time, kind }))
}

/// Parse one LIST line. The "total N" summary and blank lines yield `None`.
fn parse_list_line(line: &str, now: SystemTime) -> std::result::Result<Option<RemoteEntry>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with("total ") {
        return Ok(None);
    }
    let file = ListLine::from_str(trimmed).map_err(|e| format!("unparsable LIST line {:?}: {:?}", trimmed, e))?;
    let kind = if file.is_directory() {
        EntryKind::Directory
    } else if file.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    };
    Ok(Some(RemoteEntry {
        name: file.name().to_string(),
        size: file.size() as u64,
        mod_time: without_future_year(file.modified(), now),
        kind,
    }))
}

/// Year-less LIST dates are read as the current year. A date that lands in
/// the future really belongs to the year before.
fn without_future_year(modified: SystemTime, now: SystemTime) -> SystemTime {
    if modified <= now + CLOCK_SKEW {
        return modified;
    }
    let stamp: DateTime<Utc> = modified.into();
    match stamp.with_year(stamp.year() - 1) {
        Some(last_year) => last_year.into(),
        None => modified - Duration::from_secs(365 * 24 * 60 * 60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use std::net::TcpListener;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> SystemTime {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap().into()
    }

    #[test]
    fn test_parse_list_line_posix() {
        let entry = parse_list_line("-rw-r--r--    1 0        0            2803 Jun 01  2019 ftpd.pem", SystemTime::now())
            .unwrap()
            .unwrap();
        assert_eq!(entry.name, "ftpd.pem");
        assert_eq!(entry.size, 2803);
        assert_eq!(entry.kind, EntryKind::File);
        assert_eq!(entry.mod_time, utc(2019, 6, 1, 0, 0, 0));

        let dir = parse_list_line("drwxr-xr-x    2 0        0            4096 Jun 01  2019 pub", SystemTime::now())
            .unwrap()
            .unwrap();
        assert_eq!(dir.name, "pub");
        assert_eq!(dir.kind, EntryKind::Directory);
    }

    #[test]
    fn test_parse_list_line_without_year_is_never_in_the_future() {
        let now = SystemTime::now();
        let entry = parse_list_line("-rw-r--r-- 1 0 0 10 Dec 15 10:00 x", now).unwrap().unwrap();

        assert!(entry.mod_time <= now + CLOCK_SKEW);
        assert!(entry.mod_time > now - Duration::from_secs(366 * 24 * 60 * 60));
        let stamp: DateTime<Utc> = entry.mod_time.into();
        assert_eq!((stamp.month(), stamp.day(), stamp.hour(), stamp.minute()), (12, 15, 10, 0));
    }

    #[test]
    fn test_future_date_moves_to_last_year() {
        let now = utc(2026, 10, 17, 12, 0, 0);
        assert_eq!(without_future_year(utc(2026, 12, 15, 10, 0, 0), now), utc(2025, 12, 15, 10, 0, 0));
        assert_eq!(without_future_year(utc(2026, 3, 1, 8, 30, 0), now), utc(2026, 3, 1, 8, 30, 0));
        // Within a day of now is clock skew, not last year.
        assert_eq!(without_future_year(utc(2026, 10, 17, 20, 0, 0), now), utc(2026, 10, 17, 20, 0, 0));
    }

    #[test]
    fn test_parse_list_line_symlink() {
        let link = parse_list_line("lrwxrwxrwx    1 0        0               7 Jun 01  2019 latest -> release", SystemTime::now())
            .unwrap()
            .unwrap();
        assert_eq!(link.kind, EntryKind::Other);
    }

    #[test]
    fn test_parse_list_line_skips_summary() {
        assert!(parse_list_line("total 12", SystemTime::now()).unwrap().is_none());
        assert!(parse_list_line("   ", SystemTime::now()).unwrap().is_none());
    }

    #[test]
    fn test_parse_list_line_garbage() {
        assert!(parse_list_line("this is not a listing", SystemTime::now()).is_err());
    }

    #[test]
    fn test_parse_mlsd_line_exact_seconds() {
        let entry = parse_mlsd_line("type=file;size=10;modify=20251215100037;UNIX.mode=0644; x")
            .unwrap()
            .unwrap();
        assert_eq!(entry.name, "x");
        assert_eq!(entry.size, 10);
        assert_eq!(entry.kind, EntryKind::File);
        assert_eq!(entry.mod_time, UNIX_EPOCH + Duration::from_secs(1_765_792_837));

        let fractional = parse_mlsd_line("Type=file;Size=10;Modify=20251215100037.250; x").unwrap().unwrap();
        assert_eq!(fractional.mod_time, entry.mod_time);
    }

    #[test]
    fn test_parse_mlsd_line_kinds() {
        assert!(parse_mlsd_line("type=cdir;modify=20190601000000; /pub").unwrap().is_none());
        assert!(parse_mlsd_line("type=pdir;modify=20190601000000; /").unwrap().is_none());

        let dir = parse_mlsd_line("type=dir;sizd=4096;modify=20190601000000; linux").unwrap().unwrap();
        assert_eq!(dir.kind, EntryKind::Directory);
        assert_eq!(dir.name, "linux");

        let link = parse_mlsd_line("type=OS.unix=slink:/pub/release;modify=20190601000000; latest").unwrap().unwrap();
        assert_eq!(link.kind, EntryKind::Other);

        let spaced = parse_mlsd_line("type=file;size=3;modify=20190601000000; release notes.txt").unwrap().unwrap();
        assert_eq!(spaced.name, "release notes.txt");
    }

    #[test]
    fn test_parse_mlsd_line_rejects_incomplete() {
        assert!(parse_mlsd_line("type=file;size=10; x").is_err());
        assert!(parse_mlsd_line("size=10;modify=20190601000000; x").is_err());
        assert!(parse_mlsd_line("garbage").is_err());
    }

    #[test]
    fn test_data_connection_carries_timeouts() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let timeout = Duration::from_secs(3);

        let stream = data_connection(listener.local_addr().unwrap(), timeout).unwrap();

        assert_eq!(stream.read_timeout().unwrap(), Some(timeout));
        assert_eq!(stream.write_timeout().unwrap(), Some(timeout));
    }

    #[test]
    fn test_has_feature_ignores_case() {
        let features = Features::from([("mlst".to_string(), Some("type*;size*;modify*;".to_string()))]);
        assert!(has_feature(&features, "MLST"));
        assert!(!has_feature(&features, "MDTM"));
    }
}
