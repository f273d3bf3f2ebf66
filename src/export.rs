//! Turning a stored transcript into upload-sized markdown files.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SplitError;
use crate::models::Ticket;
use crate::splitter::{split_with_headers, PartLabel};

/// One deliverable file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// `transcript-ticket-7-part-03.md`, or `...-part-03.2.md` for a re-split part.
pub fn artifact_filename(ticket_id: i64, label: &PartLabel) -> String {
    match label.sub {
        Some(sub) => format!("transcript-ticket-{}-part-{:02}.{}.md", ticket_id, label.index, sub),
        None => format!("transcript-ticket-{}-part-{:02}.md", ticket_id, label.index),
    }
}

/// Where an exported transcript came from; repeated in every part header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSource<'a> {
    pub ticket_id: i64,
    pub server_id: &'a str,
    pub channel_id: Option<&'a str>,
}

impl<'a> ExportSource<'a> {
    pub fn of(ticket: &'a Ticket) -> Self {
        Self {
            ticket_id: ticket.id,
            server_id: &ticket.server_id,
            channel_id: ticket.channel_id.as_deref(),
        }
    }
}

fn part_header(source: &ExportSource<'_>, label: &PartLabel, total: usize) -> String {
    let origin = match source.channel_id {
        Some(channel) => format!("server {}, channel {}", source.server_id, channel),
        None => format!("server {}", source.server_id),
    };
    format!(
        "> Ticket #{} transcript, part {} of {} ({})\n\n",
        source.ticket_id, label, total, origin
    )
}

/// Split `transcript` so that every artifact, header included, is at most
/// `byte_limit` bytes.
pub fn export_transcript(
    source: &ExportSource<'_>,
    transcript: &str,
    byte_limit: usize,
) -> Result<Vec<Artifact>, SplitError> {
    let parts = split_with_headers(transcript, byte_limit, |label, total| {
        part_header(source, label, total)
    })?;
    Ok(parts
        .into_iter()
        .map(|part| Artifact {
            filename: artifact_filename(source.ticket_id, &part.label),
            bytes: part.into_string().into_bytes(),
        })
        .collect())
}

/// Write each artifact into `dir`, creating it if needed.
pub fn write_artifacts(dir: &Path, artifacts: &[Artifact]) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let mut written = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let path = dir.join(&artifact.filename);
        fs::write(&path, &artifact.bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    const SOURCE: ExportSource<'static> = ExportSource {
        ticket_id: 9,
        server_id: "srv",
        channel_id: Some("c9"),
    };

    fn transcript(lines: usize) -> String {
        let mut doc = String::from("# Ticket #9 transcript\n\n---\n\n");
        for i in 0..lines {
            doc.push_str(&format!("[2024-05-01T12:00:00.000Z] alice: line number {}\n", i));
        }
        doc
    }

    #[test]
    fn test_filenames() {
        assert_eq!(
            artifact_filename(9, &PartLabel::top(3)),
            "transcript-ticket-9-part-03.md"
        );
        assert_eq!(
            artifact_filename(9, &PartLabel::sub(12, 2)),
            "transcript-ticket-9-part-12.2.md"
        );
    }

    #[test]
    fn test_small_transcript_is_one_file() {
        let doc = transcript(3);
        let artifacts = export_transcript(&SOURCE, &doc, 7_800_000).unwrap();
        assert_eq!(artifacts.len(), 1);
        let text = String::from_utf8(artifacts[0].bytes.clone()).unwrap();
        assert!(text.starts_with("> Ticket #9 transcript, part 1 of 1 (server srv, channel c9)\n\n"));
        assert!(text.ends_with(&doc));
    }

    #[test]
    fn test_every_part_names_its_origin() {
        let artifacts = export_transcript(&SOURCE, &transcript(200), 1000).unwrap();
        assert!(artifacts.len() > 1);
        for artifact in &artifacts {
            let text = String::from_utf8(artifact.bytes.clone()).unwrap();
            let (header, _) = text.split_once("\n\n").unwrap();
            assert!(header.starts_with("> Ticket #9 transcript, part "), "{}", artifact.filename);
            assert!(header.ends_with(" (server srv, channel c9)"), "{}", artifact.filename);
        }
    }

    #[test]
    fn test_every_artifact_fits_with_header() {
        let doc = transcript(200);
        let artifacts = export_transcript(&SOURCE, &doc, 1000).unwrap();
        assert!(artifacts.len() > 1);
        for artifact in &artifacts {
            assert!(artifact.len() <= 1000, "{} is {} bytes", artifact.filename, artifact.len());
        }
    }

    #[test]
    fn test_full_part_is_resplit_under_sub_labels() {
        // Ten 100-byte lines fill each top-level part exactly, leaving no
        // room for a header.
        let line = format!("{}\n", "x".repeat(99));
        let doc = line.repeat(20);
        let source = ExportSource {
            ticket_id: 4,
            server_id: "srv",
            channel_id: None,
        };
        let artifacts = export_transcript(&source, &doc, 1000).unwrap();
        let names: Vec<&str> = artifacts.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "transcript-ticket-4-part-01.1.md",
                "transcript-ticket-4-part-01.2.md",
                "transcript-ticket-4-part-02.1.md",
                "transcript-ticket-4-part-02.2.md",
            ]
        );
        let first = String::from_utf8(artifacts[0].bytes.clone()).unwrap();
        assert!(first.starts_with("> Ticket #4 transcript, part 1.1 of 2 (server srv)\n\n"));
    }

    #[test]
    fn test_header_wider_than_limit_fails() {
        let err = export_transcript(&SOURCE, &transcript(1), 10).unwrap_err();
        assert!(matches!(err, SplitError::HeaderTooWide { .. }));
    }

    #[test]
    fn test_write_artifacts() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("exports");
        let artifacts = export_transcript(&SOURCE, &transcript(50), 800).unwrap();
        let paths = write_artifacts(&out, &artifacts).unwrap();
        assert_eq!(paths.len(), artifacts.len());
        for (path, artifact) in paths.iter().zip(&artifacts) {
            assert_eq!(fs::read(path).unwrap(), artifact.bytes);
        }
    }

    proptest! {
        #[test]
        fn prop_exported_bodies_rebuild_transcript(lines in 0usize..120, limit in 120usize..2000) {
            let doc = transcript(lines);
            let artifacts = export_transcript(&SOURCE, &doc, limit).unwrap();
            let mut rebuilt = String::new();
            for artifact in &artifacts {
                prop_assert!(artifact.len() <= limit);
                let text = String::from_utf8(artifact.bytes.clone()).unwrap();
                let (_, body) = text.split_once("\n\n").unwrap();
                rebuilt.push_str(body);
            }
            prop_assert_eq!(rebuilt, doc);
        }
    }
}
