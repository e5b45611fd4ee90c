use super::*;
use crate::{
    error::IntegrityViolation,
    obs::sink::{MetricsEvent, MetricsSink},
    persist::{Command, CommandKind, MemoryStore},
    test_support::{
        Author, BLOG_MODEL, Blog, POST_MODEL, POST_TAG_MODEL, Post, Profile, TAG_MODEL, Tag,
        session, session_with,
    },
    value::Value,
};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use ulid::Ulid;

// Attach Blog 1 holding Post 10, with the foreign key already consistent.
fn attach_blog_with_post(session: &mut Session) -> (Handle<Blog>, Handle<Post>) {
    let mut post = Post::new(10, "hello");
    post.blog_id = 1;
    let post = session.create(post).unwrap();

    let mut blog = Blog::new(1, "news");
    blog.posts.push(post);
    let blog = session.create(blog).unwrap();
    session.attach(blog).unwrap();

    (blog, post)
}

fn attach<E: EntityKind>(session: &mut Session, entity: E) -> Handle<E> {
    let handle = session.create(entity).unwrap();
    session.attach(handle).unwrap()
}

fn state<E: EntityKind>(session: &Session, handle: Handle<E>) -> EntityState {
    session.entry_ref(handle).unwrap().state()
}

fn join_entries(session: &mut Session) -> Vec<(KeyValue, EntityState)> {
    session
        .entries()
        .unwrap()
        .into_iter()
        .filter(|entry| entry.entity_name() == POST_TAG_MODEL.name)
        .map(|entry| (entry.key(), entry.state()))
        .collect()
}

fn post_tag_key(post: i64, tag: i64) -> KeyValue {
    KeyValue::new(vec![Value::Int(post), Value::Int(tag)])
}

fn seeded_store() -> MemoryStore {
    let mut store = MemoryStore::new();
    store
        .seed(&BLOG_MODEL, Row::new().with("id", 1_i64).with("name", "news"))
        .unwrap();
    store
        .seed(&BLOG_MODEL, Row::new().with("id", 2_i64).with("name", "other"))
        .unwrap();
    store
        .seed(
            &POST_MODEL,
            Row::new()
                .with("id", 10_i64)
                .with("title", "hello")
                .with("blog_id", 1_i64)
                .with("version", 0_u64),
        )
        .unwrap();
    store
        .seed(&TAG_MODEL, Row::new().with("id", 3_i64).with("label", "rust"))
        .unwrap();

    store
}

// ----------------------------------------------------------------------
// Unit of work
// ----------------------------------------------------------------------

#[test]
fn blog_lifecycle_round_trips_through_the_store() {
    let mut session = session();
    let mut store = MemoryStore::new();

    let post = session.create(Post::new(0, "first")).unwrap();
    let mut blog = Blog::new(0, "news");
    blog.posts.push(post);
    let blog = session.create(blog).unwrap();
    session.add(blog).unwrap();

    assert_eq!(session.get(blog).unwrap().id, -1);
    assert_eq!(session.get(post).unwrap().blog_id, -1);
    assert_eq!(session.get(post).unwrap().blog, Some(blog));
    assert!(session.entry_ref(post).unwrap().has_temporary_values());

    let summary = session.submit(&mut store).unwrap();
    assert_eq!(
        summary,
        SubmitSummary {
            inserts: 2,
            updates: 0,
            deletes: 0
        }
    );
    assert_eq!(session.get(blog).unwrap().id, 1);
    assert_eq!(session.get(post).unwrap().id, 1);
    assert_eq!(session.get(post).unwrap().blog_id, 1);
    assert_eq!(session.find::<Blog>(1_i64), Some(blog));
    assert_eq!(state(&session, post), EntityState::Unchanged);
    assert_eq!(
        store
            .row("Post", &KeyValue::from(1_i64))
            .and_then(|row| row.get("blog_id")),
        Some(&Value::Int(1))
    );

    session.get_mut(post).unwrap().title = "edited".to_string();
    let summary = session.submit(&mut store).unwrap();
    assert_eq!(summary.updates, 1);
    assert_eq!(
        store.log().last().map(Command::kind),
        Some(CommandKind::Update)
    );

    session.remove(blog).unwrap();
    assert_eq!(state(&session, post), EntityState::Deleted);
    let summary = session.submit(&mut store).unwrap();
    assert_eq!(summary.deletes, 2);
    assert!(store.is_empty());
    assert_eq!(session.tracked_count(), 0);
}

#[test]
fn stale_token_is_reported_as_a_conflict() {
    let mut session = session();
    let mut store = seeded_store();
    let posts = session.load::<Post>(&store).unwrap();
    let post = posts[0];

    session.get_mut(post).unwrap().title = "edited".to_string();
    store
        .touch("Post", &KeyValue::from(10_i64), "version", Value::Uint(1))
        .unwrap();

    let err = session.submit(&mut store).unwrap_err();

    assert!(err.is_conflict(), "{err}");
    assert_eq!(state(&session, post), EntityState::Modified);
    assert_eq!(
        store
            .row("Post", &KeyValue::from(10_i64))
            .and_then(|row| row.get("title")),
        Some(&Value::Text("hello".into()))
    );
}

#[test]
fn has_changes_follows_auto_detection() {
    let mut session = session();
    let (blog, _) = attach_blog_with_post(&mut session);
    assert!(!session.has_changes().unwrap());

    session.get_mut(blog).unwrap().name = "renamed".to_string();
    assert!(session.has_changes().unwrap());

    session.set_auto_detect_changes(false);
    session.get_mut(blog).unwrap().name = "news".to_string();
    // Stale until detection runs.
    assert!(session.has_changes().unwrap());
    session.detect_changes().unwrap();
    assert!(!session.has_changes().unwrap());
}

#[test]
fn entries_are_ordered_by_entity_then_key() {
    let mut session = session();
    attach(&mut session, Blog::new(2, "second"));
    attach(&mut session, Blog::new(1, "first"));
    attach(&mut session, Tag::new(3, "rust"));

    let blogs: Vec<KeyValue> = session
        .entries_of::<Blog>()
        .unwrap()
        .iter()
        .map(EntryRef::key)
        .collect();
    assert_eq!(blogs, vec![KeyValue::from(1_i64), KeyValue::from(2_i64)]);
    assert_eq!(session.entries().unwrap().len(), 3);
}

#[test]
fn clearing_untracks_everything() {
    let mut session = session();
    let (blog, post) = attach_blog_with_post(&mut session);

    session.clear();

    assert_eq!(session.tracked_count(), 0);
    assert_eq!(session.find::<Blog>(1_i64), None);
    assert_eq!(state(&session, blog), EntityState::Detached);
    assert_eq!(session.get(post).unwrap().title, "hello");
}

// ----------------------------------------------------------------------
// Fixup
// ----------------------------------------------------------------------

#[test]
fn setting_the_reference_moves_the_post() {
    let mut session = session();
    let (first, post) = attach_blog_with_post(&mut session);
    let second = attach(&mut session, Blog::new(2, "other"));

    session.get_mut(post).unwrap().blog = Some(second);
    session.detect_changes().unwrap();

    assert_eq!(session.get(post).unwrap().blog_id, 2);
    assert!(session.get(first).unwrap().posts.is_empty());
    assert_eq!(session.get(second).unwrap().posts, vec![post]);
    assert_eq!(state(&session, post), EntityState::Modified);
}

#[test]
fn adding_to_another_collection_moves_without_orphaning() {
    let mut session = session();
    let (first, post) = attach_blog_with_post(&mut session);
    let second = attach(&mut session, Blog::new(2, "other"));

    session.get_mut(second).unwrap().posts.push(post);
    session.detect_changes().unwrap();

    assert_eq!(state(&session, post), EntityState::Modified);
    assert_eq!(session.get(post).unwrap().blog, Some(second));
    assert_eq!(session.get(post).unwrap().blog_id, 2);
    assert!(session.get(first).unwrap().posts.is_empty());
}

#[test]
fn removing_from_a_required_collection_deletes_the_orphan() {
    let mut session = session();
    let (blog, post) = attach_blog_with_post(&mut session);

    session.get_mut(blog).unwrap().posts.clear();
    session.detect_changes().unwrap();

    assert_eq!(state(&session, post), EntityState::Deleted);
    assert_eq!(session.get(post).unwrap().blog, None);
}

#[test]
fn removed_post_is_deleted_from_the_store_on_submit() {
    let mut session = session();
    let mut store = MemoryStore::new();
    store
        .seed(&BLOG_MODEL, Row::new().with("id", 1_i64).with("name", "news"))
        .unwrap();
    for id in [1_i64, 2] {
        store
            .seed(
                &POST_MODEL,
                Row::new()
                    .with("id", id)
                    .with("title", "hello")
                    .with("blog_id", 1_i64)
                    .with("version", 0_u64),
            )
            .unwrap();
    }
    let blog = session.load::<Blog>(&store).unwrap()[0];
    let posts = session.load::<Post>(&store).unwrap();
    let (first, second) = (posts[0], posts[1]);
    assert_eq!(session.get(blog).unwrap().posts, vec![first, second]);

    session.get_mut(blog).unwrap().posts.retain(|post| *post != second);
    session.detect_changes().unwrap();

    assert_eq!(session.get(blog).unwrap().posts, vec![first]);
    assert_eq!(state(&session, second), EntityState::Deleted);

    let summary = session.submit(&mut store).unwrap();

    assert_eq!(summary.deletes, 1);
    assert_eq!(state(&session, second), EntityState::Detached);
    assert_eq!(session.find::<Post>(2_i64), None);
    assert_eq!(store.len("Post"), 1);
    assert!(store.row("Post", &KeyValue::from(1_i64)).is_some());
}

#[test]
fn orphan_revives_when_reparented() {
    let mut session = session();
    let mut store = seeded_store();
    let (first, post) = attach_blog_with_post(&mut session);
    let second = attach(&mut session, Blog::new(2, "other"));

    session.get_mut(first).unwrap().posts.clear();
    session.detect_changes().unwrap();
    assert_eq!(state(&session, post), EntityState::Deleted);

    session.get_mut(second).unwrap().posts.push(post);
    session.detect_changes().unwrap();

    assert_eq!(state(&session, post), EntityState::Modified);
    assert_eq!(session.get(post).unwrap().blog_id, 2);

    let summary = session.submit(&mut store).unwrap();
    assert_eq!(summary.updates, 1);
    assert_eq!(summary.deletes, 0);
    assert_eq!(
        store
            .row("Post", &KeyValue::from(10_i64))
            .and_then(|row| row.get("blog_id")),
        Some(&Value::Int(2))
    );
}

#[test]
fn removing_from_an_optional_collection_nulls_the_key() {
    let mut session = session();
    let author_id = Ulid::from_parts(1, 7);

    let mut blog = Blog::new(1, "news");
    blog.author_id = Some(author_id);
    let blog = session.create(blog).unwrap();
    let mut author = Author::new("ann");
    author.id = author_id;
    author.blogs.push(blog);
    let author = session.create(author).unwrap();
    session.attach(author).unwrap();
    assert_eq!(session.get(blog).unwrap().author, Some(author));

    session.get_mut(author).unwrap().blogs.clear();
    session.detect_changes().unwrap();

    let blog_ref = session.get(blog).unwrap();
    assert_eq!(blog_ref.author_id, None);
    assert_eq!(blog_ref.author, None);
    assert_eq!(state(&session, blog), EntityState::Modified);
}

#[test]
fn deleting_a_principal_cascades_transitively() {
    let mut session = session();
    let mut store = seeded_store();
    store
        .seed(
            &POST_TAG_MODEL,
            Row::new().with("post_id", 10_i64).with("tag_id", 3_i64),
        )
        .unwrap();

    let tag = session.create(Tag::new(3, "rust")).unwrap();
    let mut post = Post::new(10, "hello");
    post.blog_id = 1;
    post.tags.push(tag);
    let post = session.create(post).unwrap();
    let mut blog = Blog::new(1, "news");
    blog.posts.push(post);
    let blog = session.create(blog).unwrap();
    session.attach(blog).unwrap();
    assert_eq!(
        join_entries(&mut session),
        vec![(post_tag_key(10, 3), EntityState::Unchanged)]
    );

    session.remove(blog).unwrap();

    assert_eq!(state(&session, post), EntityState::Deleted);
    assert_eq!(state(&session, tag), EntityState::Unchanged);
    assert_eq!(
        join_entries(&mut session),
        vec![(post_tag_key(10, 3), EntityState::Deleted)]
    );

    session.submit(&mut store).unwrap();
    let deleted: Vec<_> = store.log().iter().map(|c| c.model().name).collect();
    assert_eq!(deleted, vec!["PostTag", "Post", "Blog"]);
    assert_eq!(session.tracked_count(), 1);
}

#[test]
fn deleting_an_author_nulls_blogs_and_removes_the_profile() {
    let mut session = session();
    let author_id = Ulid::from_parts(1, 9);

    let mut blog = Blog::new(1, "news");
    blog.author_id = Some(author_id);
    let blog = session.create(blog).unwrap();
    let mut profile = Profile::new(5, "bio");
    profile.author_id = author_id;
    let profile = session.create(profile).unwrap();
    let mut author = Author::new("ann");
    author.id = author_id;
    author.blogs.push(blog);
    author.profile = Some(profile);
    let author = session.create(author).unwrap();
    session.attach(author).unwrap();

    session.remove(author).unwrap();

    assert_eq!(state(&session, author), EntityState::Deleted);
    assert_eq!(state(&session, profile), EntityState::Deleted);
    assert_eq!(state(&session, blog), EntityState::Modified);
    assert_eq!(session.get(blog).unwrap().author_id, None);
}

#[test]
fn replacing_a_one_to_one_dependent_deletes_the_old_one() {
    let mut session = session();
    let author_id = Ulid::from_parts(2, 1);

    let mut old = Profile::new(5, "old");
    old.author_id = author_id;
    let old = session.create(old).unwrap();
    let mut author = Author::new("ann");
    author.id = author_id;
    author.profile = Some(old);
    let author = session.create(author).unwrap();
    session.attach(author).unwrap();

    let new = session.create(Profile::new(6, "new")).unwrap();
    session.add(new).unwrap();
    session.get_mut(author).unwrap().profile = Some(new);
    session.detect_changes().unwrap();

    assert_eq!(state(&session, old), EntityState::Deleted);
    assert_eq!(state(&session, new), EntityState::Added);
    assert_eq!(session.get(new).unwrap().author_id, author_id);
    assert_eq!(session.get(new).unwrap().author, Some(author));
    assert_eq!(session.get(author).unwrap().profile, Some(new));
}

#[test]
fn deferred_cascades_wait_for_cascade_changes() {
    let mut session = session();
    session.set_cascade_timing(Timing::OnSubmit);
    let (blog, post) = attach_blog_with_post(&mut session);

    session.remove(blog).unwrap();
    assert_eq!(state(&session, post), EntityState::Unchanged);

    session.cascade_changes().unwrap();
    assert_eq!(state(&session, post), EntityState::Deleted);
}

#[test]
fn cascade_changes_sees_undetected_collection_edits() {
    let mut session = session();
    session.set_orphan_timing(Timing::OnSubmit);
    let (blog, post) = attach_blog_with_post(&mut session);

    session.get_mut(blog).unwrap().posts.clear();
    session.cascade_changes().unwrap();

    assert_eq!(state(&session, post), EntityState::Deleted);
    assert_eq!(session.get(post).unwrap().blog, None);
}

#[test]
fn disabled_cascades_block_submission() {
    let mut session = session();
    let mut store = seeded_store();
    session.set_cascade_timing(Timing::Never);
    let (blog, post) = attach_blog_with_post(&mut session);

    session.remove(blog).unwrap();
    session.cascade_changes().unwrap();
    assert_eq!(state(&session, post), EntityState::Unchanged);

    let err = session.submit(&mut store).unwrap_err();
    let report = err.integrity_report().expect("integrity detail");
    assert!(matches!(
        report.violations.as_slice(),
        [IntegrityViolation::DependentsRemain { dependent: "Post", .. }]
    ));
    assert!(store.log().is_empty());
}

#[test]
fn tag_membership_creates_and_removes_join_records() {
    let mut session = session();
    let mut store = seeded_store();
    let mut post = Post::new(10, "hello");
    post.blog_id = 1;
    let post = attach(&mut session, post);
    let tag = attach(&mut session, Tag::new(3, "rust"));

    session.get_mut(post).unwrap().tags.push(tag);
    session.detect_changes().unwrap();

    assert_eq!(session.get(tag).unwrap().posts, vec![post]);
    assert_eq!(
        join_entries(&mut session),
        vec![(post_tag_key(10, 3), EntityState::Added)]
    );
    assert_eq!(session.submit(&mut store).unwrap().inserts, 1);
    assert_eq!(store.len("PostTag"), 1);

    session.get_mut(post).unwrap().tags.clear();
    session.detect_changes().unwrap();

    assert!(session.get(tag).unwrap().posts.is_empty());
    assert_eq!(
        join_entries(&mut session),
        vec![(post_tag_key(10, 3), EntityState::Deleted)]
    );
    assert_eq!(session.submit(&mut store).unwrap().deletes, 1);
    assert_eq!(store.len("PostTag"), 0);
}

#[test]
fn unsaved_join_records_vanish_when_membership_is_undone() {
    let mut session = session();
    let post = attach(&mut session, Post::new(10, "hello"));
    let tag = attach(&mut session, Tag::new(3, "rust"));

    session.get_mut(post).unwrap().tags.push(tag);
    session.detect_changes().unwrap();
    session.get_mut(post).unwrap().tags.clear();
    session.detect_changes().unwrap();

    assert!(join_entries(&mut session).is_empty());
    assert!(!session.has_changes().unwrap());
}

// ----------------------------------------------------------------------
// Identity
// ----------------------------------------------------------------------

#[test]
fn duplicate_identity_is_rejected_by_default() {
    let mut session = session();
    attach(&mut session, Blog::new(1, "news"));
    let duplicate = session.create(Blog::new(1, "dup")).unwrap();

    let err = session.attach(duplicate).unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(session.tracked_count(), 1);
    assert_eq!(state(&session, duplicate), EntityState::Detached);
}

#[test]
fn preserve_existing_returns_the_tracked_instance() {
    let mut session = session();
    session.set_identity_resolution(IdentityResolution::PreserveExisting);
    let first = attach(&mut session, Blog::new(1, "news"));

    let resolved = attach(&mut session, Blog::new(1, "dup"));

    assert_eq!(resolved, first);
    assert_eq!(session.get(first).unwrap().name, "news");
    assert!(!session.has_changes().unwrap());
}

#[test]
fn merge_incoming_copies_values_onto_the_tracked_instance() {
    let mut session = session();
    session.set_identity_resolution(IdentityResolution::MergeIncoming);
    let first = attach(&mut session, Blog::new(1, "news"));

    let resolved = attach(&mut session, Blog::new(1, "merged"));

    assert_eq!(resolved, first);
    assert_eq!(session.get(first).unwrap().name, "merged");
    assert_eq!(session.entry(first).unwrap().state(), EntityState::Modified);
}

#[test]
fn duplicates_inside_a_graph_are_rewired() {
    let mut session = session();
    session.set_identity_resolution(IdentityResolution::PreserveExisting);
    let tracked = attach(&mut session, Blog::new(1, "news"));

    let stale = session.create(Blog::new(1, "stale")).unwrap();
    let mut post = Post::new(10, "hello");
    post.blog = Some(stale);
    let post = attach(&mut session, post);

    assert_eq!(session.get(post).unwrap().blog, Some(tracked));
    assert_eq!(session.get(post).unwrap().blog_id, 1);
    assert_eq!(session.get(tracked).unwrap().posts, vec![post]);
    assert_eq!(state(&session, stale), EntityState::Detached);
}

// ----------------------------------------------------------------------
// Loading
// ----------------------------------------------------------------------

#[test]
fn loading_rows_rebuilds_navigations_and_join_membership() {
    let mut session = session();
    let mut store = seeded_store();
    store
        .seed(
            &POST_TAG_MODEL,
            Row::new().with("post_id", 10_i64).with("tag_id", 3_i64),
        )
        .unwrap();

    let blogs = session.load::<Blog>(&store).unwrap();
    let posts = session.load::<Post>(&store).unwrap();
    let tags = session.load::<Tag>(&store).unwrap();
    let joins = session.load_entity(&store, "PostTag").unwrap();

    assert_eq!((blogs.len(), posts.len(), tags.len(), joins.len()), (2, 1, 1, 1));
    let (blog, post, tag) = (blogs[0], posts[0], tags[0]);
    assert_eq!(session.get(blog).unwrap().posts, vec![post]);
    assert_eq!(session.get(post).unwrap().blog, Some(blog));
    assert_eq!(session.get(post).unwrap().tags, vec![tag]);
    assert_eq!(session.get(tag).unwrap().posts, vec![post]);
    assert!(!session.has_changes().unwrap());
}

#[test]
fn reloading_keeps_local_edits() {
    let mut session = session();
    let store = seeded_store();
    let blogs = session.load::<Blog>(&store).unwrap();
    session.get_mut(blogs[0]).unwrap().name = "local".to_string();

    let again = session.load::<Blog>(&store).unwrap();

    assert_eq!(again, blogs);
    assert_eq!(session.get(blogs[0]).unwrap().name, "local");
    assert_eq!(session.tracked_count(), 2);
}

#[test]
fn reloading_reuses_tracked_slots() {
    let mut session = session();
    let store = seeded_store();
    session.load::<Blog>(&store).unwrap();
    let arena = session.tracker.arena_len();

    for _ in 0..3 {
        session.load::<Blog>(&store).unwrap();
    }

    assert_eq!(session.tracker.arena_len(), arena);
}

#[test]
fn merge_incoming_materialization_takes_the_incoming_values() {
    let mut session = session();
    session.set_identity_resolution(IdentityResolution::MergeIncoming);
    let first = session.materialize(Blog::new(1, "old")).unwrap();

    let second = session.materialize(Blog::new(1, "new")).unwrap();

    assert_eq!(second, first);
    assert_eq!(session.get(first).unwrap().name, "new");
    let entry = session.entry(first).unwrap();
    assert_eq!(entry.state(), EntityState::Unchanged);
    assert_eq!(
        entry.property("name").map(|p| p.original.clone()),
        Some(Value::Text("new".into()))
    );
}

#[test]
fn merge_incoming_reload_follows_stored_foreign_keys() {
    let mut session = session();
    session.set_identity_resolution(IdentityResolution::MergeIncoming);
    let mut store = seeded_store();
    let blogs = session.load::<Blog>(&store).unwrap();
    let post = session.load::<Post>(&store).unwrap()[0];
    let (first, second) = (blogs[0], blogs[1]);
    let arena = session.tracker.arena_len();

    store
        .touch("Post", &KeyValue::from(10_i64), "blog_id", Value::Int(2))
        .unwrap();
    store
        .touch("Post", &KeyValue::from(10_i64), "title", Value::Text("moved".into()))
        .unwrap();
    assert_eq!(session.load::<Post>(&store).unwrap(), vec![post]);

    assert_eq!(session.tracker.arena_len(), arena);
    assert_eq!(session.get(post).unwrap().title, "moved");
    assert_eq!(session.get(post).unwrap().blog, Some(second));
    assert!(session.get(first).unwrap().posts.is_empty());
    assert_eq!(session.get(second).unwrap().posts, vec![post]);
    assert!(!session.has_changes().unwrap());
}

#[test]
fn unknown_entities_cannot_be_loaded() {
    let mut session = session();
    let store = MemoryStore::new();

    assert!(session.load_entity(&store, "Missing").is_err());
}

// ----------------------------------------------------------------------
// Observability
// ----------------------------------------------------------------------

struct TrackedCounter {
    tracked: AtomicUsize,
}

impl MetricsSink for TrackedCounter {
    fn record(&self, event: MetricsEvent) {
        if matches!(event, MetricsEvent::Tracked { .. }) {
            self.tracked.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[test]
fn session_sink_receives_tracking_events() {
    let sink: &'static TrackedCounter = Box::leak(Box::new(TrackedCounter {
        tracked: AtomicUsize::new(0),
    }));
    let mut session = session().metrics_sink(sink);

    attach_blog_with_post(&mut session);

    assert_eq!(sink.tracked.load(Ordering::SeqCst), 2);
}

#[test]
fn short_debug_view_lists_one_line_per_entry() {
    let mut session = session();
    let (blog, _) = attach_blog_with_post(&mut session);
    session.get_mut(blog).unwrap().name = "renamed".to_string();
    session.detect_changes().unwrap();

    assert_eq!(
        session.debug_view(DebugViewMode::Short),
        "Blog {id: 1} Modified\nPost {id: 10} Unchanged\n"
    );
}

#[test]
fn long_debug_view_annotates_properties_and_navigations() {
    let mut session = session();
    let (blog, _) = attach_blog_with_post(&mut session);
    session.get_mut(blog).unwrap().name = "renamed".to_string();
    attach(&mut session, Blog::new(0, "draft"));
    session.detect_changes().unwrap();

    let view = session.debug_view(DebugViewMode::Long);

    for line in [
        "Blog {id: -1} Added",
        "  id: -1 PK Temporary",
        "  id: 1 PK",
        "  name: 'renamed' Modified Originally 'news'",
        "  author_id: <null> FK",
        "  posts: [{id: 10}]",
        "  blog_id: 1 FK",
        "  blog: {id: 1}",
    ] {
        assert!(view.lines().any(|l| l == line), "missing {line:?} in\n{view}");
    }
}

#[test]
fn insensitive_debug_view_redacts_values() {
    let mut session = session_with(TrackingOptions {
        sensitive_debug_values: false,
        ..TrackingOptions::default()
    });
    let (blog, _) = attach_blog_with_post(&mut session);
    session.get_mut(blog).unwrap().name = "renamed".to_string();
    session.detect_changes().unwrap();

    let view = session.debug_view(DebugViewMode::Long);

    assert!(view.contains("  name: <redacted> Modified Originally <redacted>"));
    assert!(view.contains("  blog_id: 1 FK"));
    assert!(!view.contains("renamed"));
}

// ----------------------------------------------------------------------
// Properties
// ----------------------------------------------------------------------

#[derive(Clone, Debug)]
enum Edit {
    Rename(usize, String),
    Move(usize, i64),
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0..3_usize, "[a-z]{1,6}").prop_map(|(post, title)| Edit::Rename(post, title)),
        (0..3_usize, 1..=2_i64).prop_map(|(post, blog)| Edit::Move(post, blog)),
    ]
}

proptest! {
    #[test]
    fn detection_converges_to_consistent_graphs(edits in prop::collection::vec(edit(), 0..12)) {
        let mut session = session();
        let mut first = Blog::new(1, "one");
        let mut posts = Vec::new();
        for id in 10..13 {
            let mut post = Post::new(id, "post");
            post.blog_id = 1;
            let post = session.create(post).unwrap();
            first.posts.push(post);
            posts.push(post);
        }
        let first = attach(&mut session, first);
        let second = attach(&mut session, Blog::new(2, "two"));

        for edit in edits {
            match edit {
                Edit::Rename(post, title) => session.get_mut(posts[post]).unwrap().title = title,
                Edit::Move(post, blog) => session.get_mut(posts[post]).unwrap().blog_id = blog,
            }
        }

        session.tracker.detect_all().unwrap();
        prop_assert!(!session.tracker.detect_all().unwrap().changed());

        for &post in &posts {
            let blog_id = session.get(post).unwrap().blog_id;
            let (owner, other) = if blog_id == 1 { (first, second) } else { (second, first) };
            prop_assert_eq!(session.get(post).unwrap().blog, Some(owner));
            prop_assert!(session.get(owner).unwrap().posts.contains(&post));
            prop_assert!(!session.get(other).unwrap().posts.contains(&post));
        }
    }
}
