// CSV/TSV reading and table export

use std::io::Read;
use std::path::Path;

use dosematch_recon::Table;

use crate::error::IoError;
use crate::grid::{Cell, RawGrid};

/// Read a delimited file into an untyped grid. The first record is the header
/// row. The delimiter is sniffed unless given.
pub fn read_grid(path: &Path, delimiter: Option<u8>) -> Result<RawGrid, IoError> {
    let content = read_file_as_utf8(path)?;
    let delimiter = delimiter.unwrap_or_else(|| sniff_delimiter(&content));
    tracing::debug!(path = %path.display(), delimiter = %(delimiter as char).escape_default(), "reading delimited file");
    grid_from_string(&content, delimiter).map_err(|source| IoError::Csv {
        path: path.to_path_buf(),
        source,
    })
}

/// Sniff the delimiter from the first 10 lines.
/// Candidates: tab, semicolon, comma, pipe. Picks the one producing the most
/// consistent field count (>1) across lines, preferring more fields as tiebreaker.
pub fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content.lines().take(10).collect();

    if sample_lines.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        // The header line must split
        if counts.first().copied().unwrap_or(0) <= 1 {
            continue;
        }

        let target = counts[0];
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

/// Read a file as UTF-8, falling back to Windows-1252 (hospital system
/// exports are often not UTF-8).
pub fn read_file_as_utf8(path: &Path) -> Result<String, IoError> {
    let read_err = |source| IoError::Read {
        path: path.to_path_buf(),
        source,
    };
    let mut file = std::fs::File::open(path).map_err(read_err)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(read_err)?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            tracing::debug!(path = %path.display(), "decoded as Windows-1252");
            Ok(decoded.into_owned())
        }
    }
}

fn grid_from_string(content: &str, delimiter: u8) -> Result<RawGrid, csv::Error> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();
    let headers: Vec<String> = match records.next() {
        Some(record) => record?.iter().map(String::from).collect(),
        None => return Ok(RawGrid::default()),
    };

    let mut rows = Vec::new();
    for record in records {
        rows.push(record?.iter().map(Cell::text).collect());
    }
    Ok(RawGrid::new(headers, rows))
}

/// Delimiter for an output path: tab for `.tsv`, comma otherwise.
pub fn delimiter_for(path: &Path) -> u8 {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
        _ => b',',
    }
}

/// Write a table with its header row. Cells use the table's display form.
pub fn export_table(table: &Table, path: &Path) -> Result<(), IoError> {
    let csv_err = |source| IoError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter_for(path))
        .from_path(path)
        .map_err(csv_err)?;

    writer.write_record(table.headers()).map_err(csv_err)?;
    for row in 0..table.len() {
        let record: Vec<String> = table.columns().iter().map(|c| c.data.display(row)).collect();
        writer.write_record(&record).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::info!(path = %path.display(), rows = table.len(), "wrote table");
    Ok(())
}
