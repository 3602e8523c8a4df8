use crate::error::VaultError;
use crate::vault::paths::ChannelPaths;
use crate::vault::record::{HEADER_LINE, MessageRecord};
use anyhow::{Context, Result};
use std::fs;
use std::io::{BufWriter, Write};

/// Rewrite the newest-first archive as `Messages_Chronological.tsv`
/// (oldest first) with a freshly written header. The original file is left
/// untouched; the pair of files marks the archive finalized, which the
/// resume gate refuses to touch again.
///
/// The whole record set is held in memory, which is fine for typical
/// channels but is a known scaling limit.
pub fn reverse_archive(paths: &ChannelPaths) -> Result<usize> {
    if paths.chronological_file.exists() {
        return Err(VaultError::Validation(format!(
            "{} already exists; archive is already finalized",
            paths.chronological_file.display()
        ))
        .into());
    }

    let raw = fs::read_to_string(&paths.archive_file)
        .with_context(|| format!("failed to read {}", paths.archive_file.display()))?;
    let mut lines = raw.lines().filter(|l| !l.trim().is_empty());
    match lines.next() {
        Some(header) if header == HEADER_LINE => {}
        _ => {
            return Err(VaultError::Validation(format!(
                "{} has an unexpected header row",
                paths.archive_file.display()
            ))
            .into());
        }
    }

    // Decode for validation only; the original encoded lines are written
    // back untouched so reversal never alters row contents.
    let mut rows: Vec<&str> = Vec::new();
    for line in lines {
        MessageRecord::decode_line(line)
            .map_err(|err| VaultError::Validation(format!("unparsable record: {err}")))?;
        rows.push(line);
    }

    let file = fs::File::create_new(&paths.chronological_file).with_context(|| {
        format!("failed to create {}", paths.chronological_file.display())
    })?;
    let mut out = BufWriter::new(file);
    writeln!(out, "{HEADER_LINE}").context("failed to write chronological header")?;
    for line in rows.iter().rev() {
        writeln!(out, "{line}").with_context(|| {
            format!("failed to write {}", paths.chronological_file.display())
        })?;
    }
    out.flush()
        .context("failed to flush chronological file")?;

    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::paths::resolve_channel_paths;
    use tempfile::tempdir;

    fn record_line(id: u64) -> String {
        format!("t{id}\tu#0\tbody {id}\t[]\t[]\t[]\t\tFalse\tFalse\t{id}")
    }

    fn write_archive(paths: &ChannelPaths, ids: &[u64]) {
        let mut raw = format!("{HEADER_LINE}\n");
        for id in ids {
            raw.push_str(&record_line(*id));
            raw.push('\n');
        }
        fs::write(&paths.archive_file, raw).expect("write archive");
    }

    fn chronological_ids(paths: &ChannelPaths) -> Vec<u64> {
        fs::read_to_string(&paths.chronological_file)
            .expect("read chronological")
            .lines()
            .skip(1)
            .map(|l| MessageRecord::decode_line(l).expect("decode").id)
            .collect()
    }

    #[test]
    fn reversal_flips_order_and_keeps_contents() {
        let tmp = tempdir().expect("tempdir");
        let paths = resolve_channel_paths(tmp.path(), 1, 2);
        paths.ensure_layout().expect("layout");
        write_archive(&paths, &[30, 20, 10]);

        let count = reverse_archive(&paths).expect("reverse");
        assert_eq!(count, 3);
        assert_eq!(chronological_ids(&paths), vec![10, 20, 30]);

        let original = fs::read_to_string(&paths.archive_file).expect("read");
        let reversed = fs::read_to_string(&paths.chronological_file).expect("read");
        let mut reversed_rows: Vec<&str> = reversed.lines().skip(1).collect();
        reversed_rows.reverse();
        let original_rows: Vec<&str> = original.lines().skip(1).collect();
        assert_eq!(reversed_rows, original_rows);
    }

    #[test]
    fn reversal_of_a_reversal_reproduces_the_original_order() {
        let tmp = tempdir().expect("tempdir");
        let paths = resolve_channel_paths(tmp.path(), 1, 2);
        paths.ensure_layout().expect("layout");
        write_archive(&paths, &[3, 2, 1]);
        reverse_archive(&paths).expect("reverse");

        // Treat the chronological file as an archive in its own right.
        let twice = resolve_channel_paths(tmp.path(), 9, 9);
        fs::create_dir_all(&twice.channel_dir).expect("mkdir");
        fs::copy(&paths.chronological_file, &twice.archive_file).expect("copy");
        reverse_archive(&twice).expect("reverse again");

        assert_eq!(chronological_ids(&twice), vec![3, 2, 1]);
    }

    #[test]
    fn header_only_archive_reverses_to_header_only() {
        let tmp = tempdir().expect("tempdir");
        let paths = resolve_channel_paths(tmp.path(), 1, 2);
        paths.ensure_layout().expect("layout");
        write_archive(&paths, &[]);

        let count = reverse_archive(&paths).expect("reverse");
        assert_eq!(count, 0);
        let raw = fs::read_to_string(&paths.chronological_file).expect("read");
        assert_eq!(raw, format!("{HEADER_LINE}\n"));
    }

    #[test]
    fn existing_chronological_file_is_refused() {
        let tmp = tempdir().expect("tempdir");
        let paths = resolve_channel_paths(tmp.path(), 1, 2);
        paths.ensure_layout().expect("layout");
        write_archive(&paths, &[1]);
        fs::write(&paths.chronological_file, "done").expect("write");

        let err = reverse_archive(&paths).expect_err("refused");
        assert!(VaultError::is_validation(&err));
    }

    #[test]
    fn malformed_rows_fail_validation() {
        let tmp = tempdir().expect("tempdir");
        let paths = resolve_channel_paths(tmp.path(), 1, 2);
        paths.ensure_layout().expect("layout");
        fs::write(&paths.archive_file, format!("{HEADER_LINE}\nnot a record\n")).unwrap();

        let err = reverse_archive(&paths).expect_err("refused");
        assert!(VaultError::is_validation(&err));
        assert!(!paths.chronological_file.exists());
    }
}
