use notegraph_core::db::open_db_in_memory;
use notegraph_core::model::sub_note::{SubNote, SubNoteKind};
use notegraph_core::{
    IndexConfig, IndexStep, LinkSyncMode, LinkType, Note, NoteService, OwnerId, StepOutcome,
};
use uuid::Uuid;

fn create_note(service: &mut NoteService<'_>, owner: OwnerId, slug: &str) -> Note {
    service
        .create_note(&Note::new(owner, slug, format!("Title of {slug}")))
        .unwrap()
        .record
}

fn create_markdown(service: &mut NoteService<'_>, note: &Note, text: &str) -> SubNote {
    let written = service
        .create_sub_note(&SubNote::with_text(
            note.uuid,
            SubNoteKind::Markdown,
            1.0,
            text,
        ))
        .unwrap();
    assert!(written.index.is_clean(), "{:?}", written.index);
    written.record
}

#[test]
fn each_distinct_resolvable_target_yields_one_labeled_edge() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = NoteService::new(&mut conn, IndexConfig::default());
    let owner = Uuid::new_v4();
    let source = create_note(&mut service, owner, "source");
    let alpha = create_note(&mut service, owner, "alpha");
    let beta = create_note(&mut service, owner, "beta");

    create_markdown(
        &mut service,
        &source,
        "See [[alpha]], [[beta|the B]], [[alpha]] again and [[missing]].",
    );

    assert_eq!(service.stats().unwrap().links, 2);

    let alpha_links = service.backlinks(alpha.uuid).unwrap();
    assert_eq!(alpha_links.len(), 1);
    assert_eq!(alpha_links[0].label, "alpha");
    assert_eq!(alpha_links[0].source_note_id, source.uuid);
    assert_eq!(alpha_links[0].link_type, LinkType::Reference);

    let beta_links = service.backlinks(beta.uuid).unwrap();
    assert_eq!(beta_links.len(), 1);
    assert_eq!(beta_links[0].label, "the B");
}

#[test]
fn unresolvable_targets_create_no_edge_and_no_error() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = NoteService::new(&mut conn, IndexConfig::default());
    let owner = Uuid::new_v4();
    let source = create_note(&mut service, owner, "source");

    let written = service
        .create_sub_note(&SubNote::with_text(
            source.uuid,
            SubNoteKind::Text,
            1.0,
            "[[nowhere]] and [[also nowhere|alias]]",
        ))
        .unwrap();

    assert_eq!(
        written.index.outcome(IndexStep::Links),
        Some(&StepOutcome::Applied)
    );
    assert_eq!(service.stats().unwrap().links, 0);
    assert!(service.graph_entry(source.uuid).unwrap().is_none());
}

#[test]
fn targets_resolve_only_within_the_source_owner() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = NoteService::new(&mut conn, IndexConfig::default());
    let source = create_note(&mut service, Uuid::new_v4(), "source");
    let foreign = create_note(&mut service, Uuid::new_v4(), "shared-name");

    create_markdown(&mut service, &source, "[[shared-name]]");

    assert!(service.backlinks(foreign.uuid).unwrap().is_empty());
}

#[test]
fn bang_prefix_stores_an_embed_edge() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = NoteService::new(&mut conn, IndexConfig::default());
    let owner = Uuid::new_v4();
    let source = create_note(&mut service, owner, "source");
    let diagram = create_note(&mut service, owner, "diagram");

    create_markdown(&mut service, &source, "![[diagram]]");

    let links = service.backlinks(diagram.uuid).unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].link_type, LinkType::Embed);
}

#[test]
fn toggling_the_bang_prefix_retypes_the_existing_edge() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = NoteService::new(&mut conn, IndexConfig::default());
    let owner = Uuid::new_v4();
    let source = create_note(&mut service, owner, "source");
    let alpha = create_note(&mut service, owner, "alpha");

    let mut sub_note = create_markdown(&mut service, &source, "[[alpha]]");
    let original = service.backlinks(alpha.uuid).unwrap();
    let entry_before = service.graph_entry(alpha.uuid).unwrap();

    sub_note.set_text("![[alpha]]");
    let written = service.update_sub_note(&sub_note).unwrap();
    assert!(written.index.is_clean());

    let embedded = service.backlinks(alpha.uuid).unwrap();
    assert_eq!(embedded.len(), 1);
    assert_eq!(embedded[0].link_type, LinkType::Embed);
    assert_eq!(embedded[0].link_id, original[0].link_id);
    assert_eq!(service.graph_entry(alpha.uuid).unwrap(), entry_before);

    sub_note.set_text("[[alpha]] then ![[alpha]]");
    service.update_sub_note(&sub_note).unwrap();
    service.update_sub_note(&sub_note).unwrap();
    let mixed = service.backlinks(alpha.uuid).unwrap();
    assert_eq!(mixed.len(), 1);
    assert_eq!(mixed[0].link_type, LinkType::Embed);

    sub_note.set_text("[[alpha]]");
    service.update_sub_note(&sub_note).unwrap();
    assert_eq!(
        service.backlinks(alpha.uuid).unwrap()[0].link_type,
        LinkType::Reference
    );
    assert_eq!(service.stats().unwrap().links, 1);
    assert!(service.verify_graph_cache().unwrap().is_empty());
}

#[test]
fn non_textual_sub_notes_are_not_scanned() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = NoteService::new(&mut conn, IndexConfig::default());
    let owner = Uuid::new_v4();
    let source = create_note(&mut service, owner, "source");
    create_note(&mut service, owner, "alpha");

    let mut code = SubNote::new(source.uuid, SubNoteKind::Code, 1.0);
    code.set_field("code", "let x = items[[alpha]];");
    let written = service.create_sub_note(&code).unwrap();

    assert_eq!(
        written.index.outcome(IndexStep::Links),
        Some(&StepOutcome::Skipped)
    );
    assert_eq!(service.stats().unwrap().links, 0);
}

#[test]
fn re_extracting_unchanged_text_changes_nothing() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = NoteService::new(&mut conn, IndexConfig::default());
    let owner = Uuid::new_v4();
    let source = create_note(&mut service, owner, "source");
    let alpha = create_note(&mut service, owner, "alpha");

    let sub_note = create_markdown(&mut service, &source, "[[alpha]]");
    let entry_before = service.graph_entry(alpha.uuid).unwrap();

    service.update_sub_note(&sub_note).unwrap();
    service.update_sub_note(&sub_note).unwrap();

    assert_eq!(service.stats().unwrap().links, 1);
    assert_eq!(service.graph_entry(alpha.uuid).unwrap(), entry_before);
    assert_eq!(entry_before.unwrap().strength, 1);
}

#[test]
fn append_only_mode_keeps_edges_removed_from_text() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = NoteService::new(&mut conn, IndexConfig::default());
    let owner = Uuid::new_v4();
    let source = create_note(&mut service, owner, "source");
    let alpha = create_note(&mut service, owner, "alpha");

    let mut sub_note = create_markdown(&mut service, &source, "[[alpha]]");
    sub_note.set_text("no links any more");
    service.update_sub_note(&sub_note).unwrap();

    // Known gap of append-only extraction: the edge and its cache
    // contribution outlive the reference.
    assert_eq!(service.backlinks(alpha.uuid).unwrap().len(), 1);
    assert_eq!(service.graph_entry(alpha.uuid).unwrap().unwrap().strength, 1);
}

#[test]
fn reconcile_mode_drops_edges_removed_from_text() {
    let mut conn = open_db_in_memory().unwrap();
    let config = IndexConfig {
        link_sync: LinkSyncMode::Reconcile,
    };
    let mut service = NoteService::new(&mut conn, config);
    let owner = Uuid::new_v4();
    let source = create_note(&mut service, owner, "source");
    let alpha = create_note(&mut service, owner, "alpha");
    let beta = create_note(&mut service, owner, "beta");

    let mut sub_note = create_markdown(&mut service, &source, "[[alpha]] [[beta]]");
    sub_note.set_text("only [[beta]] now");
    let written = service.update_sub_note(&sub_note).unwrap();
    assert!(written.index.is_clean());

    assert!(service.backlinks(alpha.uuid).unwrap().is_empty());
    assert!(service.graph_entry(alpha.uuid).unwrap().is_none());
    assert_eq!(service.backlinks(beta.uuid).unwrap().len(), 1);

    let source_entry = service.graph_entry(source.uuid).unwrap().unwrap();
    assert_eq!(source_entry.strength, 1);
    assert!(source_entry.connected.contains(&beta.uuid));
    assert!(service.verify_graph_cache().unwrap().is_empty());
}

#[test]
fn deleting_a_sub_note_removes_its_edges_and_cache_contribution() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = NoteService::new(&mut conn, IndexConfig::default());
    let owner = Uuid::new_v4();
    let source = create_note(&mut service, owner, "source");
    let alpha = create_note(&mut service, owner, "alpha");

    let sub_note = create_markdown(&mut service, &source, "[[alpha]]");
    let report = service.delete_sub_note(sub_note.uuid).unwrap();

    assert_eq!(
        report.outcome(IndexStep::OutgoingEdgeCleanup),
        Some(&StepOutcome::Applied)
    );
    assert_eq!(service.stats().unwrap().links, 0);
    assert!(service.graph_entry(alpha.uuid).unwrap().is_none());
    assert!(service.graph_entry(source.uuid).unwrap().is_none());
}
