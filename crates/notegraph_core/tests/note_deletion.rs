use notegraph_core::db::open_db_in_memory;
use notegraph_core::model::sub_note::{SubNote, SubNoteKind};
use notegraph_core::{IndexConfig, IndexStep, Note, NoteService, ServiceError, StepOutcome};
use uuid::Uuid;

#[test]
fn deleting_a_note_removes_its_edges_and_cache_entries() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = NoteService::new(&mut conn, IndexConfig::default());
    let owner = Uuid::new_v4();
    let mut notes = Vec::new();
    for slug in ["doomed", "left", "right", "fan"] {
        notes.push(
            service
                .create_note(&Note::new(owner, slug, slug))
                .unwrap()
                .record,
        );
    }
    let (doomed, left, right, fan) = (&notes[0], &notes[1], &notes[2], &notes[3]);

    let first = service
        .create_sub_note(&SubNote::with_text(
            doomed.uuid,
            SubNoteKind::Markdown,
            1.0,
            "[[left]]",
        ))
        .unwrap()
        .record;
    let second = service
        .create_sub_note(&SubNote::with_text(
            doomed.uuid,
            SubNoteKind::Text,
            2.0,
            "[[right]]",
        ))
        .unwrap()
        .record;
    service
        .create_sub_note(&SubNote::with_text(
            fan.uuid,
            SubNoteKind::Markdown,
            1.0,
            "[[doomed]] and [[left]]",
        ))
        .unwrap();
    assert_eq!(service.stats().unwrap().links, 4);

    let report = service.delete_note(doomed.uuid).unwrap();
    assert!(report.is_clean());
    assert_eq!(
        report.outcome(IndexStep::OutgoingEdgeCleanup),
        Some(&StepOutcome::Applied)
    );
    assert_eq!(
        report.outcome(IndexStep::IncomingEdgeCleanup),
        Some(&StepOutcome::Applied)
    );

    assert!(service.get_note(doomed.uuid).unwrap().is_none());
    assert!(service.get_sub_note(first.uuid).unwrap().is_none());
    assert!(service.get_sub_note(second.uuid).unwrap().is_none());
    assert_eq!(service.stats().unwrap().links, 1);

    assert!(service.graph_entry(doomed.uuid).unwrap().is_none());
    assert!(service.graph_entry(right.uuid).unwrap().is_none());
    let left_entry = service.graph_entry(left.uuid).unwrap().unwrap();
    assert_eq!(left_entry.strength, 1);
    assert!(left_entry.connected.contains(&fan.uuid));
    assert_eq!(service.graph_entry(fan.uuid).unwrap().unwrap().strength, 1);
    assert!(service.verify_graph_cache().unwrap().is_empty());
}

#[test]
fn deleting_missing_records_reports_not_found() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = NoteService::new(&mut conn, IndexConfig::default());

    let note_id = Uuid::new_v4();
    assert!(matches!(
        service.delete_note(note_id).unwrap_err(),
        ServiceError::NoteNotFound(id) if id == note_id
    ));

    let sub_note_id = Uuid::new_v4();
    assert!(matches!(
        service.delete_sub_note(sub_note_id).unwrap_err(),
        ServiceError::SubNoteNotFound(id) if id == sub_note_id
    ));
}

#[test]
fn updating_a_missing_sub_note_writes_nothing() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = NoteService::new(&mut conn, IndexConfig::default());
    let note = service
        .create_note(&Note::new(Uuid::new_v4(), "page", "Page"))
        .unwrap()
        .record;

    let ghost = SubNote::with_text(note.uuid, SubNoteKind::Text, 1.0, "ghost");
    assert!(matches!(
        service.update_sub_note(&ghost).unwrap_err(),
        ServiceError::SubNoteNotFound(_)
    ));
    assert!(service.list_sub_notes(note.uuid).unwrap().is_empty());
}
