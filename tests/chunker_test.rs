//! Chunking of realistic documents

use pocketmind::document::{chunk, DocumentChunk};

const MEETING_NOTES: &str = "# Platform sync

Attendees: Dana, Priya, Luis.

## Decisions
The release train moves to a two-week cadence starting next month. Hotfixes still ship \
on demand, but they need a second reviewer. Luis will update the runbook.

## Open items
Build times on the monorepo are creeping up again. Priya suspects the new code generator, \
which regenerates every schema on each build! Nobody has profiled it yet. \
Dana asked whether caching the generated files is safe (it probably is).

Next sync: Thursday.";

#[test]
fn test_meeting_notes_respect_ceiling_and_order() {
    let chunks = chunk(MEETING_NOTES, 120);

    assert!(chunks.len() > 2);
    assert!(chunks.iter().all(|c| c.char_len() <= 120));

    let indices: Vec<usize> = chunks.iter().map(DocumentChunk::index).collect();
    assert_eq!(indices, (0..chunks.len()).collect::<Vec<_>>());

    let words: Vec<&str> = chunks
        .iter()
        .flat_map(|c| c.text().split_whitespace())
        .collect();
    assert_eq!(words, MEETING_NOTES.split_whitespace().collect::<Vec<_>>());
}

#[test]
fn test_sentences_stay_whole_when_they_fit() {
    let chunks = chunk(MEETING_NOTES, 120);

    assert!(chunks
        .iter()
        .any(|c| c.text().contains("which regenerates every schema on each build!")));
    assert!(chunks
        .iter()
        .all(|c| !c.text().starts_with("regenerates")));
}

#[test]
fn test_whole_document_fits_in_one_chunk() {
    let chunks = chunk(MEETING_NOTES, 2000);

    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].text().starts_with("# Platform sync\nAttendees"));
}

#[test]
fn test_chunks_serialize_for_inspection() {
    let chunks = chunk("First.\nSecond.", 7);
    let json = serde_json::to_value(&chunks).unwrap();

    assert_eq!(json[0]["index"], 0);
    assert_eq!(json[1]["text"], "Second.");
}
