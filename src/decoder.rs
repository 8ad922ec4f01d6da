use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use log::{debug, trace};

use crate::error::DecodeError;
use crate::record::FlowRecord;

const DECODER_BIN: &str = "nfdump";

/// Reads `FlowRecord`s from an `nfdump -r <file> -o json` subprocess, one
/// object at a time, without buffering the whole array.
pub struct RecordDecoder {
    path: PathBuf,
    child: Child,
    reader: BufReader<ChildStdout>,
    finished: bool,
    exit_reported: bool,
}

impl RecordDecoder {
    pub fn spawn(path: &Path) -> Result<RecordDecoder, DecodeError> {
        let mut child = Command::new(DECODER_BIN)
            .arg("-r")
            .arg(path)
            .arg("-o")
            .arg("json")
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|source| DecodeError::Spawn {
                path: path.to_path_buf(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .expect("child spawned with Stdio::piped() always has a stdout handle");

        debug!("spawned {} for {}", DECODER_BIN, path.display());

        Ok(RecordDecoder {
            path: path.to_path_buf(),
            child,
            reader: BufReader::new(stdout),
            finished: false,
            exit_reported: false,
        })
    }

    fn next_object(&mut self) -> Result<Option<String>, DecodeError> {
        let mut buf = Vec::new();
        let mut depth: u32 = 0;
        let mut in_string = false;
        let mut escape = false;
        let mut started = false;
        let mut byte = [0u8; 1];

        loop {
            let n = self
                .reader
                .read(&mut byte)
                .map_err(|source| DecodeError::Read {
                    path: self.path.clone(),
                    source,
                })?;
            if n == 0 {
                if started {
                    return Err(DecodeError::MalformedRecord {
                        path: self.path.clone(),
                        reason: "stream ended mid-object".to_string(),
                    });
                }
                return Ok(None);
            }
            let c = byte[0];

            if !started {
                if c == b']' {
                    return Ok(None);
                }
                if c == b'{' {
                    started = true;
                    depth = 1;
                    buf.push(c);
                }
                // whitespace, the opening '[', and the trailing ',' between
                // objects are all skipped while scanning for the next object
                continue;
            }

            buf.push(c);

            if in_string {
                if escape {
                    escape = false;
                } else if c == b'\\' {
                    escape = true;
                } else if c == b'"' {
                    in_string = false;
                }
                continue;
            }

            match c {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(Some(String::from_utf8_lossy(&buf).into_owned()));
                    }
                }
                _ => {}
            }
        }
    }

    fn check_exit(&mut self) -> Result<(), DecodeError> {
        if self.exit_reported {
            return Ok(());
        }
        self.exit_reported = true;

        let status = self.child.wait().map_err(|source| DecodeError::Read {
            path: self.path.clone(),
            source,
        })?;
        if !status.success() {
            return Err(DecodeError::ExitStatus {
                path: self.path.clone(),
                status: status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }
}

impl Iterator for RecordDecoder {
    type Item = Result<FlowRecord, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.next_object() {
            Ok(Some(raw)) => {
                trace!("decoded object from {}: {} bytes", self.path.display(), raw.len());
                let value: serde_json::Value = match serde_json::from_str(&raw) {
                    Ok(v) => v,
                    Err(e) => {
                        self.finished = true;
                        return Some(Err(DecodeError::MalformedRecord {
                            path: self.path.clone(),
                            reason: format!("invalid JSON object: {}", e),
                        }));
                    }
                };
                match FlowRecord::from_json(&value) {
                    Ok(rec) => Some(Ok(rec)),
                    Err(reason) => {
                        self.finished = true;
                        Some(Err(DecodeError::MalformedRecord {
                            path: self.path.clone(),
                            reason,
                        }))
                    }
                }
            }
            Ok(None) => {
                self.finished = true;
                match self.check_exit() {
                    Ok(()) => None,
                    Err(e) => Some(Err(e)),
                }
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl Drop for RecordDecoder {
    fn drop(&mut self) {
        // Make sure a decoder abandoned mid-stream (e.g. because a sibling
        // worker hit a fatal error) doesn't linger as a zombie process.
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
