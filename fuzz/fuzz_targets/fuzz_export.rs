#![no_main]

//! Export with part headers: every artifact, header included, must respect
//! the byte budget, and its filename must follow the part naming scheme.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use ticketbox::export::{export_transcript, ExportSource};

#[derive(Arbitrary, Debug)]
struct ExportInput {
    ticket_id: u32,
    server_id: String,
    channel_id: Option<String>,
    transcript: String,
    limit: u16,
}

fuzz_target!(|input: ExportInput| {
    let limit = input.limit as usize;
    let source = ExportSource {
        ticket_id: input.ticket_id as i64,
        server_id: &input.server_id,
        channel_id: input.channel_id.as_deref(),
    };
    let Ok(artifacts) = export_transcript(&source, &input.transcript, limit) else {
        return;
    };

    let prefix = format!("transcript-ticket-{}-part-", input.ticket_id);
    for artifact in &artifacts {
        assert!(artifact.len() <= limit);
        assert!(artifact.filename.starts_with(&prefix));
        assert!(artifact.filename.ends_with(".md"));
        assert!(std::str::from_utf8(&artifact.bytes).is_ok());
    }
});
