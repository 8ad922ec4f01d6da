use std::io::Write;

use crate::allowlist::Allowlist;
use crate::error::AppError;

/// Write the allowlist as CSV (`ip,packets`, LF line endings). Row order is
/// unspecified.
pub fn write_allowlist_csv<W: Write>(out: W, allowlist: &Allowlist) -> Result<(), AppError> {
    let mut writer = csv::WriterBuilder::new().terminator(csv::Terminator::Any(b'\n')).from_writer(out);

    writer
        .write_record(&["ip", "packets"])
        .map_err(|e| AppError::io("writing CSV header", to_io_error(e)))?;

    for (ip, packets) in allowlist {
        writer
            .write_record(&[ip.to_string(), packets.to_string()])
            .map_err(|e| AppError::io("writing CSV row", to_io_error(e)))?;
    }
    writer
        .flush()
        .map_err(|source| AppError::io("flushing CSV output", source))?;

    Ok(())
}

fn to_io_error(err: csv::Error) -> std::io::Error {
    match err.into_kind() {
        csv::ErrorKind::Io(io_err) => io_err,
        other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
    }
}
