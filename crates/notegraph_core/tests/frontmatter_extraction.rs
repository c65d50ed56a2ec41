use chrono::NaiveDate;
use notegraph_core::db::open_db_in_memory;
use notegraph_core::model::sub_note::{SubNote, SubNoteKind};
use notegraph_core::{IndexConfig, IndexStep, Note, NoteService, StepOutcome};
use serde_json::json;
use uuid::Uuid;

fn markdown(note: &Note, text: &str) -> SubNote {
    SubNote::with_text(note.uuid, SubNoteKind::Markdown, 1.0, text)
}

#[test]
fn leading_block_sets_typed_columns_and_metadata_mapping() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = NoteService::new(&mut conn, IndexConfig::default());
    let note = service
        .create_note(&Note::new(Uuid::new_v4(), "plan", "Plan"))
        .unwrap()
        .record;

    let written = service
        .create_sub_note(&markdown(&note, "---\nstatus: draft\npriority: 2\n---\nbody"))
        .unwrap();
    assert_eq!(
        written.index.outcome(IndexStep::Frontmatter),
        Some(&StepOutcome::Applied)
    );
    // The sub-note text is stored as written.
    assert_eq!(
        written.record.text(),
        Some("---\nstatus: draft\npriority: 2\n---\nbody")
    );

    let loaded = service.get_note(note.uuid).unwrap().unwrap();
    assert_eq!(loaded.frontmatter.status.as_deref(), Some("draft"));
    assert_eq!(loaded.frontmatter.priority, Some(2));
    assert_eq!(
        loaded.metadata["frontmatter"],
        json!({"status": "draft", "priority": "2"})
    );
    assert!(!loaded.metadata.contains_key("frontmatter_raw"));

    // Status joins the note's search vector at weight C.
    assert_eq!(
        loaded.search_vector.as_deref(),
        Some("'draft':2C 'plan':1A")
    );
}

#[test]
fn dates_timestamps_and_unknown_keys() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = NoteService::new(&mut conn, IndexConfig::default());
    let note = service
        .create_note(&Note::new(Uuid::new_v4(), "trip", "Trip"))
        .unwrap()
        .record;

    let text = "---\ndue_date: 2024-06-01\nlast_reviewed_at: 2024-01-02T03:04:05Z\n\
                type: journal\nmood: sunny\n---\n";
    service.create_sub_note(&markdown(&note, text)).unwrap();

    let loaded = service.get_note(note.uuid).unwrap().unwrap();
    assert_eq!(loaded.frontmatter.due_date, NaiveDate::from_ymd_opt(2024, 6, 1));
    assert_eq!(loaded.frontmatter.last_reviewed_at, Some(1_704_164_645_000));
    assert_eq!(loaded.frontmatter.note_type.as_deref(), Some("journal"));
    assert_eq!(loaded.metadata["frontmatter"]["mood"], json!("sunny"));
}

#[test]
fn malformed_block_is_kept_raw_and_leaves_columns_untouched() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = NoteService::new(&mut conn, IndexConfig::default());
    let mut seed = Note::new(Uuid::new_v4(), "list", "List");
    seed.frontmatter.status = Some("open".to_string());
    let note = service.create_note(&seed).unwrap().record;

    let text = "---\ntags:\n  - one\n---\nbody";
    let written = service.create_sub_note(&markdown(&note, text)).unwrap();

    assert!(written.index.is_clean());
    assert_eq!(
        written.index.outcome(IndexStep::Frontmatter),
        Some(&StepOutcome::Degraded("malformed_line"))
    );
    assert!(service.get_sub_note(written.record.uuid).unwrap().is_some());

    let loaded = service.get_note(note.uuid).unwrap().unwrap();
    assert_eq!(loaded.frontmatter.status.as_deref(), Some("open"));
    assert_eq!(
        loaded.metadata["frontmatter_raw"],
        json!("---\ntags:\n  - one\n---")
    );
    assert!(!loaded.metadata.contains_key("frontmatter"));
}

#[test]
fn failed_coercion_writes_nothing_typed() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = NoteService::new(&mut conn, IndexConfig::default());
    let note = service
        .create_note(&Note::new(Uuid::new_v4(), "bad", "Bad"))
        .unwrap()
        .record;

    let written = service
        .create_sub_note(&markdown(&note, "---\nstatus: done\npriority: high\n---\n"))
        .unwrap();
    assert_eq!(
        written.index.outcome(IndexStep::Frontmatter),
        Some(&StepOutcome::Degraded("invalid_integer"))
    );

    let loaded = service.get_note(note.uuid).unwrap().unwrap();
    assert_eq!(loaded.frontmatter.status, None);
    assert_eq!(loaded.frontmatter.priority, None);
    assert_eq!(
        loaded.metadata["frontmatter_raw"],
        json!("---\nstatus: done\npriority: high\n---")
    );
}

#[test]
fn later_successful_parse_clears_raw_block() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = NoteService::new(&mut conn, IndexConfig::default());
    let note = service
        .create_note(&Note::new(Uuid::new_v4(), "fix", "Fix"))
        .unwrap()
        .record;

    let mut sub_note = service
        .create_sub_note(&markdown(&note, "---\njust words\n---\n"))
        .unwrap()
        .record;
    let loaded = service.get_note(note.uuid).unwrap().unwrap();
    assert!(loaded.metadata.contains_key("frontmatter_raw"));

    sub_note.set_text("---\nstatus: done\n---\n");
    service.update_sub_note(&sub_note).unwrap();

    let loaded = service.get_note(note.uuid).unwrap().unwrap();
    assert_eq!(loaded.frontmatter.status.as_deref(), Some("done"));
    assert!(!loaded.metadata.contains_key("frontmatter_raw"));
}

#[test]
fn block_must_open_the_text_and_belong_to_markdown() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = NoteService::new(&mut conn, IndexConfig::default());
    let note = service
        .create_note(&Note::new(Uuid::new_v4(), "skip", "Skip"))
        .unwrap()
        .record;

    let indented = service
        .create_sub_note(&markdown(&note, "\n---\nstatus: draft\n---\n"))
        .unwrap();
    assert_eq!(
        indented.index.outcome(IndexStep::Frontmatter),
        Some(&StepOutcome::Skipped)
    );

    let plain = service
        .create_sub_note(&SubNote::with_text(
            note.uuid,
            SubNoteKind::Text,
            2.0,
            "---\nstatus: draft\n---\n",
        ))
        .unwrap();
    assert_eq!(
        plain.index.outcome(IndexStep::Frontmatter),
        Some(&StepOutcome::Skipped)
    );

    let loaded = service.get_note(note.uuid).unwrap().unwrap();
    assert_eq!(loaded.frontmatter.status, None);
    assert!(!loaded.metadata.contains_key("frontmatter"));
}

#[test]
fn note_update_keeps_extracted_metadata() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = NoteService::new(&mut conn, IndexConfig::default());
    let note = service
        .create_note(&Note::new(Uuid::new_v4(), "keep", "Keep"))
        .unwrap()
        .record;
    service
        .create_sub_note(&markdown(&note, "---\nauthor: kim\n---\n"))
        .unwrap();

    let mut edited = note.clone();
    edited.title = "Keep renamed".to_string();
    edited.metadata.insert("frontmatter".to_string(), json!("overwrite attempt"));
    let updated = service.update_note(&edited).unwrap().record;

    assert_eq!(updated.title, "Keep renamed");
    assert_eq!(updated.metadata["frontmatter"], json!({"author": "kim"}));
}
